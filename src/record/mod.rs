//! The three record kinds the buffer ferries between memory, the database,
//! and the upstream server.

pub mod autoreg;
pub mod discovery;
pub mod history;

pub use autoreg::AutoregRecord;
pub use discovery::DiscoveryRecord;
pub use history::HistoryRecord;

/// Fixed per-row overhead charged against the arena in addition to a
/// record's variable-length fields, accounting for the slab slot and
/// bookkeeping each list node carries.
pub const ROW_OVERHEAD_BYTES: usize = 64;

/// Common shape every record kind exposes to the store/eviction machinery.
pub trait Record {
    fn id(&self) -> u64;
    fn set_id(&mut self, id: u64);

    /// Epoch-seconds timestamp used by the eviction policy's age ordering.
    fn clock(&self) -> i64;

    /// Conservative estimate of the bytes this record will occupy once
    /// charged to the arena.
    fn estimated_size(&self) -> usize;
}
