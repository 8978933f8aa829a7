//! The boundary to the external database collaborator.
//!
//! The proxy buffer never talks SQL directly; it calls through
//! [`ProxyDatabase`], which a real implementation backs with the actual
//! `proxy_history` / `proxy_dhistory` / `proxy_autoreg_host` tables and the
//! `ids` cursor table described in the upload contract. [`MockDatabase`] is
//! an in-memory stand-in used by this crate's own test suite.

use std::collections::BTreeMap;

use bytes::BytesMut;
use fnv::FnvHashMap;

use crate::error::BufferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    History,
    Discovery,
    Autoreg,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::History, RecordKind::Discovery, RecordKind::Autoreg];

    /// The `(table_name, field_name)` pair the `ids` cursor table uses for
    /// this record kind's last-sent-id row.
    pub fn lastid_key(self) -> (&'static str, &'static str) {
        match self {
            RecordKind::History => ("proxy_history", "history_lastid"),
            RecordKind::Discovery => ("proxy_dhistory", "dhistory_lastid"),
            RecordKind::Autoreg => ("proxy_autoreg_host", "autoreg_host_lastid"),
        }
    }
}

/// A single persisted row: its id plus an opaque, already-encoded payload.
/// The buffer never interprets row bytes once handed to the database; only
/// `src/schema.rs` knows how to produce and the uploader how to consume
/// them.
pub type Row = (u64, BytesMut);

pub trait ProxyDatabase: Send {
    /// Persists `rows` for `kind`. Rows are already id-assigned by the
    /// caller's monotonic `next_id` cursor; the database only stores them.
    fn insert_rows(&mut self, kind: RecordKind, rows: Vec<Row>) -> Result<(), BufferError>;

    /// Returns up to `limit` rows with `id > after`, in ascending id order.
    fn select_after(&mut self, kind: RecordKind, after: u64, limit: usize) -> Result<Vec<Row>, BufferError>;

    /// Greatest row id currently stored for `kind`, or 0 if empty.
    fn max_row_id(&mut self, kind: RecordKind) -> Result<u64, BufferError>;

    /// Reads the persisted last-acknowledged id from the `ids` table.
    fn fetch_lastid(&mut self, kind: RecordKind) -> Result<u64, BufferError>;

    /// Upserts the persisted last-acknowledged id, and deletes any rows
    /// with `id <= lastid` that are no longer needed.
    fn set_lastid(&mut self, kind: RecordKind, lastid: u64) -> Result<(), BufferError>;

    /// True if `kind` has rows persisted past its recorded `lastid` --
    /// used during hybrid-mode bootstrap to decide the initial state.
    fn has_unsent_residue(&mut self, kind: RecordKind) -> Result<bool, BufferError> {
        Ok(self.max_row_id(kind)? > self.fetch_lastid(kind)?)
    }
}

/// An in-memory `ProxyDatabase` used by this crate's own tests. Rows are
/// kept in id order per kind; `force_down` lets a test simulate the
/// database becoming unreachable.
#[derive(Default)]
pub struct MockDatabase {
    rows: FnvHashMap<RecordKind, BTreeMap<u64, BytesMut>>,
    lastids: FnvHashMap<RecordKind, u64>,
    force_down: bool,
}

impl MockDatabase {
    pub fn new() -> Self {
        MockDatabase::default()
    }

    pub fn set_down(&mut self, down: bool) {
        self.force_down = down;
    }

    fn check_up(&self) -> Result<(), BufferError> {
        if self.force_down {
            Err(BufferError::DbDown("mock database is down".to_string()))
        } else {
            Ok(())
        }
    }
}

impl ProxyDatabase for MockDatabase {
    fn insert_rows(&mut self, kind: RecordKind, rows: Vec<Row>) -> Result<(), BufferError> {
        self.check_up()?;
        let table = self.rows.entry(kind).or_default();
        for (id, payload) in rows {
            table.insert(id, payload);
        }
        Ok(())
    }

    fn select_after(&mut self, kind: RecordKind, after: u64, limit: usize) -> Result<Vec<Row>, BufferError> {
        self.check_up()?;
        let table = self.rows.entry(kind).or_default();
        Ok(table
            .range((after + 1)..)
            .take(limit)
            .map(|(id, payload)| (*id, payload.clone()))
            .collect())
    }

    fn max_row_id(&mut self, kind: RecordKind) -> Result<u64, BufferError> {
        self.check_up()?;
        Ok(self
            .rows
            .get(&kind)
            .and_then(|table| table.keys().next_back())
            .copied()
            .unwrap_or(0))
    }

    fn fetch_lastid(&mut self, kind: RecordKind) -> Result<u64, BufferError> {
        self.check_up()?;
        Ok(*self.lastids.get(&kind).unwrap_or(&0))
    }

    fn set_lastid(&mut self, kind: RecordKind, lastid: u64) -> Result<(), BufferError> {
        self.check_up()?;
        self.lastids.insert(kind, lastid);
        if let Some(table) = self.rows.get_mut(&kind) {
            table.retain(|id, _| *id > lastid);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_select_after() {
        let mut db = MockDatabase::new();
        db.insert_rows(
            RecordKind::History,
            vec![(1, BytesMut::from(&b"a"[..])), (2, BytesMut::from(&b"b"[..]))],
        )
        .unwrap();
        let rows = db.select_after(RecordKind::History, 0, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 1);
    }

    #[test]
    fn set_lastid_prunes_acknowledged_rows() {
        let mut db = MockDatabase::new();
        db.insert_rows(
            RecordKind::Discovery,
            vec![(1, BytesMut::new()), (2, BytesMut::new()), (3, BytesMut::new())],
        )
        .unwrap();
        db.set_lastid(RecordKind::Discovery, 2).unwrap();
        let remaining = db.select_after(RecordKind::Discovery, 0, 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, 3);
    }

    #[test]
    fn forced_down_surfaces_db_down() {
        let mut db = MockDatabase::new();
        db.set_down(true);
        assert!(matches!(
            db.insert_rows(RecordKind::Autoreg, vec![]),
            Err(BufferError::DbDown(_))
        ));
    }

    #[test]
    fn unsent_residue_detection() {
        let mut db = MockDatabase::new();
        assert!(!db.has_unsent_residue(RecordKind::History).unwrap());
        db.insert_rows(RecordKind::History, vec![(1, BytesMut::new())]).unwrap();
        assert!(db.has_unsent_residue(RecordKind::History).unwrap());
        db.set_lastid(RecordKind::History, 1).unwrap();
        assert!(!db.has_unsent_residue(RecordKind::History).unwrap());
    }
}
