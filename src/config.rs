//! Buffer configuration: storage mode and the tunables that govern memory
//! pressure and DB retention.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::error::BufferError;

/// Backend selection for the proxy buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every record goes straight to the database; memory is not used.
    Disk,
    /// Records stay in memory only; never spills to the database.
    Memory,
    /// Memory is preferred, falling back to the database under pressure.
    Hybrid,
}

impl Mode {
    /// Parses the `mode` configuration string. Empty string and `"disk"`
    /// both mean [`Mode::Disk`], matching the upstream daemon's historical
    /// default.
    pub fn parse(raw: &str) -> Result<Self, BufferError> {
        match raw {
            "" | "disk" => Ok(Mode::Disk),
            "memory" => Ok(Mode::Memory),
            "hybrid" => Ok(Mode::Hybrid),
            other => Err(BufferError::InvalidMode(other.to_string())),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Disk => write!(f, "disk"),
            Mode::Memory => write!(f, "memory"),
            Mode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Disk
    }
}

/// The retry policy around a DB id-gap read is fixed, not configurable;
/// see `src/store.rs`.
pub const DB_GAP_RETRY_DELAY: Duration = Duration::from_millis(100);
pub const DB_GAP_MAX_RETRIES: u32 = 1;

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub mode: Mode,

    /// Byte budget for the in-memory arena. Required (and must be nonzero)
    /// for `Memory` and `Hybrid` modes; ignored in `Disk` mode.
    pub size: usize,

    /// Age, in seconds, past which the oldest record in a list triggers a
    /// memory-to-database transition in hybrid mode.
    pub max_age: Duration,

    /// Maximum time records may sit unsent in the database before the
    /// external retention job reclaims them. Tracked here only for
    /// `state_info`/introspection purposes; enforcement lives in the
    /// external database collaborator.
    pub offline_buffer: Duration,
}

impl BufferConfig {
    pub fn validate(&self) -> Result<(), BufferError> {
        if matches!(self.mode, Mode::Memory | Mode::Hybrid) && self.size == 0 {
            return Err(BufferError::InvalidMode(
                "size must be nonzero in memory/hybrid mode".to_string(),
            ));
        }
        Ok(())
    }

    fn to_string(&self) -> String {
        format!(
            "{{Mode: {}, Size: {}, MaxAge: {:?}, OfflineBuffer: {:?}}}",
            self.mode, self.size, self.max_age, self.offline_buffer
        )
    }
}

impl Display for BufferConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            mode: Mode::Disk,
            size: 0,
            max_age: Duration::from_secs(3600),
            offline_buffer: Duration::from_secs(3600),
        }
    }
}
