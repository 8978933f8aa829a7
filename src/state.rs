//! The four-state controller that decides which backend writes land in and
//! which backend reads are drawn from.

use std::fmt::{self, Display, Formatter};

/// Where a call should read from or write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Database,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Steady disk-mode / fully-drained-to-disk state: writes and reads
    /// both go through the database.
    Database,
    /// Draining the database while new writes already land in memory.
    DatabaseToMemory,
    /// Steady memory-mode state: writes and reads both stay in memory.
    Memory,
    /// Draining memory while new writes already land in the database.
    MemoryToDatabase,
}

impl State {
    pub fn write_destination(self) -> Backend {
        match self {
            State::Database | State::MemoryToDatabase => Backend::Database,
            State::DatabaseToMemory | State::Memory => Backend::Memory,
        }
    }

    pub fn read_source(self) -> Backend {
        match self {
            State::Database | State::DatabaseToMemory => Backend::Database,
            State::MemoryToDatabase | State::Memory => Backend::Memory,
        }
    }

    /// Whether the current destination for new writes is memory, as
    /// reported through `state_info`.
    pub fn destination_is_memory(self) -> bool {
        self.write_destination() == Backend::Memory
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Database => "database",
            State::DatabaseToMemory => "database->memory",
            State::Memory => "memory",
            State::MemoryToDatabase => "memory->database",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_matches_table() {
        assert_eq!(State::Database.write_destination(), Backend::Database);
        assert_eq!(State::Database.read_source(), Backend::Database);

        assert_eq!(State::DatabaseToMemory.write_destination(), Backend::Memory);
        assert_eq!(State::DatabaseToMemory.read_source(), Backend::Database);

        assert_eq!(State::Memory.write_destination(), Backend::Memory);
        assert_eq!(State::Memory.read_source(), Backend::Memory);

        assert_eq!(State::MemoryToDatabase.write_destination(), Backend::Database);
        assert_eq!(State::MemoryToDatabase.read_source(), Backend::Memory);
    }

    #[test]
    fn destination_is_memory_flag() {
        assert!(!State::Database.destination_is_memory());
        assert!(State::DatabaseToMemory.destination_is_memory());
        assert!(State::Memory.destination_is_memory());
        assert!(!State::MemoryToDatabase.destination_is_memory());
    }
}
