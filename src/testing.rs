//! Test-only helpers for building a buffer over a [`MockDatabase`] whose
//! contents remain inspectable after the buffer takes ownership of it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::buffer::ProxyBuffer;
use crate::config::{BufferConfig, Mode};
use crate::database::{MockDatabase, ProxyDatabase, RecordKind, Row};
use crate::error::BufferError;

/// A `ProxyDatabase` that delegates to a shared, clonable handle, so a
/// test can keep inspecting the database after handing a `Box` of this
/// type to `ProxyBuffer::init`.
#[derive(Clone, Default)]
pub struct SharedMockDatabase(Arc<Mutex<MockDatabase>>);

impl SharedMockDatabase {
    pub fn new() -> Self {
        SharedMockDatabase::default()
    }

    pub fn set_down(&self, down: bool) {
        self.0.lock().set_down(down);
    }

    pub fn row_count(&self, kind: RecordKind) -> usize {
        self.0.lock().select_after(kind, 0, usize::MAX).unwrap_or_default().len()
    }
}

impl ProxyDatabase for SharedMockDatabase {
    fn insert_rows(&mut self, kind: RecordKind, rows: Vec<Row>) -> Result<(), BufferError> {
        self.0.lock().insert_rows(kind, rows)
    }

    fn select_after(&mut self, kind: RecordKind, after: u64, limit: usize) -> Result<Vec<Row>, BufferError> {
        self.0.lock().select_after(kind, after, limit)
    }

    fn max_row_id(&mut self, kind: RecordKind) -> Result<u64, BufferError> {
        self.0.lock().max_row_id(kind)
    }

    fn fetch_lastid(&mut self, kind: RecordKind) -> Result<u64, BufferError> {
        self.0.lock().fetch_lastid(kind)
    }

    fn set_lastid(&mut self, kind: RecordKind, lastid: u64) -> Result<(), BufferError> {
        self.0.lock().set_lastid(kind, lastid)
    }
}

/// A buffer plus a handle onto the mock database backing it, for
/// assertions that need to peek past the public API.
pub struct TestHarness {
    pub buffer: ProxyBuffer,
    pub db: SharedMockDatabase,
}

impl TestHarness {
    pub fn new(mode: Mode, size: usize) -> Self {
        Self::with_max_age(mode, size, Duration::from_secs(3600))
    }

    pub fn with_max_age(mode: Mode, size: usize, max_age: Duration) -> Self {
        let db = SharedMockDatabase::new();
        let config = BufferConfig {
            mode,
            size,
            max_age,
            offline_buffer: Duration::from_secs(3600),
        };
        let buffer = ProxyBuffer::init(config, Box::new(db.clone())).expect("test buffer init");
        TestHarness { buffer, db }
    }
}
