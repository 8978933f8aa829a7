//! Per-record-type storage: the memory list plus the cursors that track
//! where that record type stands relative to the database and the
//! upstream server.

use std::thread;

use bytes::BytesMut;

use crate::arena::Arena;
use crate::config::{DB_GAP_MAX_RETRIES, DB_GAP_RETRY_DELAY};
use crate::database::{ProxyDatabase, RecordKind, Row};
use crate::error::BufferError;
use crate::list::FifoList;
use crate::record::Record;

/// Result of a `get_rows` call: the encoded rows, the id of the last row
/// returned (0 if none), and whether more rows remain beyond this batch.
pub struct GetRowsResult {
    pub rows: Vec<BytesMut>,
    pub lastid: u64,
    pub more: bool,
}

pub struct RecordStore<T: Record> {
    kind: RecordKind,
    encode: fn(&T) -> BytesMut,
    list: FifoList<T>,
    next_id: u64,
    lastid_memory: u64,
    lastid_db: u64,
    lastid_sent: u64,
    handleid: u64,
}

impl<T: Record> RecordStore<T> {
    pub fn new(kind: RecordKind, encode: fn(&T) -> BytesMut) -> Self {
        RecordStore {
            kind,
            encode,
            list: FifoList::new(),
            next_id: 1,
            lastid_memory: 0,
            lastid_db: 0,
            lastid_sent: 0,
            handleid: 0,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn lastid_sent(&self) -> u64 {
        self.lastid_sent
    }

    pub fn lastid_memory(&self) -> u64 {
        self.lastid_memory
    }

    pub fn lastid_db(&self) -> u64 {
        self.lastid_db
    }

    pub fn handleid(&self) -> u64 {
        self.handleid
    }

    pub fn memory_len(&self) -> usize {
        self.list.len()
    }

    pub fn memory_is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Initializes `next_id`/`lastid_db`/`lastid_sent` from database state
    /// at bootstrap. Called once per store during `ProxyBuffer::init`.
    pub fn bootstrap_from_db(&mut self, db: &mut dyn ProxyDatabase) -> Result<(), BufferError> {
        let max_id = db.max_row_id(self.kind)?;
        let lastid = db.fetch_lastid(self.kind)?;
        self.lastid_db = max_id;
        self.lastid_sent = lastid;
        self.next_id = max_id + 1;
        Ok(())
    }

    /// Appends `rec` to the in-memory list, charging its estimated size to
    /// `arena`. Assigns the next id regardless of backend, so a single
    /// counter orders a record type's stream end to end.
    ///
    /// On failure `rec` is handed back so the caller can retry after
    /// eviction or reroute it to the database.
    pub fn add_memory(&mut self, mut rec: T, arena: &mut Arena) -> Result<(), (T, BufferError)> {
        let size = rec.estimated_size();
        if let Err(e) = arena.try_reserve(size) {
            return Err((rec, e));
        }
        let id = self.next_id;
        rec.set_id(id);
        self.next_id += 1;
        self.list.push_back(rec);
        self.lastid_memory = id;
        Ok(())
    }

    /// Persists `rec` directly to the database, bypassing memory.
    pub fn add_db(&mut self, mut rec: T, db: &mut dyn ProxyDatabase) -> Result<(), BufferError> {
        let id = self.next_id;
        rec.set_id(id);
        self.next_id += 1;
        let payload = (self.encode)(&rec);
        db.insert_rows(self.kind, vec![(id, payload)])?;
        self.lastid_db = id;
        Ok(())
    }

    /// Drains up to `batch_limit` rows from memory, starting after
    /// whatever has already been acknowledged, stopping early once
    /// `size_limit` encoded bytes have accumulated.
    pub fn get_rows_memory(&mut self, batch_limit: usize, size_limit: usize) -> GetRowsResult {
        let mut rows = Vec::new();
        let mut total = 0usize;
        let mut lastid = 0u64;
        let mut more = false;

        for rec in self.list.iter() {
            if rec.id() <= self.lastid_sent {
                continue;
            }
            if rows.len() >= batch_limit {
                more = true;
                break;
            }
            let payload = (self.encode)(rec);
            if total + payload.len() > size_limit && !rows.is_empty() {
                more = true;
                break;
            }
            total += payload.len();
            lastid = rec.id();
            rows.push(payload);
        }

        if rows.len() == batch_limit {
            more = more || self.list.iter().any(|r| r.id() > lastid);
        }
        if lastid > 0 {
            self.handleid = lastid;
        }
        GetRowsResult { rows, lastid, more }
    }

    /// Drains up to `batch_limit` rows from the database, tolerating a
    /// single id gap by waiting once and retrying before giving up on the
    /// missing ids for good.
    pub fn get_rows_db(
        &mut self,
        batch_limit: usize,
        size_limit: usize,
        db: &mut dyn ProxyDatabase,
    ) -> Result<GetRowsResult, BufferError> {
        let mut retries = 0;
        let after = self.lastid_sent;
        loop {
            let batch = db.select_after(self.kind, after, batch_limit)?;
            if batch.is_empty() {
                return Ok(GetRowsResult {
                    rows: Vec::new(),
                    lastid: 0,
                    more: false,
                });
            }

            let mut prev = after;
            let gapped = batch.iter().any(|(id, _)| {
                let jumped = *id > prev + 1;
                prev = *id;
                jumped
            });
            if gapped && retries < DB_GAP_MAX_RETRIES {
                retries += 1;
                thread::sleep(DB_GAP_RETRY_DELAY);
                continue;
            }

            let mut rows = Vec::new();
            let mut total = 0usize;
            let mut lastid = after;
            let mut more = false;
            for (id, payload) in &batch {
                if total + payload.len() > size_limit && !rows.is_empty() {
                    more = true;
                    break;
                }
                total += payload.len();
                lastid = *id;
                rows.push(payload.clone());
            }
            more = more || batch.len() == batch_limit;
            if lastid > after {
                self.handleid = lastid;
            }
            return Ok(GetRowsResult { rows, lastid, more });
        }
    }

    /// Acknowledges everything in memory up to and including `id`, freeing
    /// the corresponding arena reservations.
    pub fn set_lastid_memory(&mut self, id: u64, arena: &mut Arena) {
        while let Some(front) = self.list.peek_front() {
            if front.id() > id {
                break;
            }
            let rec = self.list.pop_front().expect("front just peeked");
            arena.release(rec.estimated_size());
        }
        self.lastid_sent = self.lastid_sent.max(id);
        if self.handleid <= id {
            self.handleid = 0;
        }
    }

    /// Acknowledges everything in the database up to and including `id`.
    pub fn set_lastid_db(&mut self, id: u64, db: &mut dyn ProxyDatabase) -> Result<(), BufferError> {
        db.set_lastid(self.kind, id)?;
        self.lastid_sent = self.lastid_sent.max(id);
        if self.handleid <= id {
            self.handleid = 0;
        }
        Ok(())
    }

    /// Frees every in-memory row, releasing its arena reservation.
    pub fn clear_memory(&mut self, arena: &mut Arena) {
        while let Some(rec) = self.list.pop_front() {
            arena.release(rec.estimated_size());
        }
    }

    /// Copies every in-memory row into the database in insertion order,
    /// then clears memory. Used by the hybrid state machine's
    /// memory-to-database transition.
    pub fn flush_to_db(&mut self, arena: &mut Arena, db: &mut dyn ProxyDatabase) -> Result<(), BufferError> {
        let mut rows = Vec::new();
        for rec in self.list.iter() {
            rows.push((rec.id(), (self.encode)(rec)));
        }
        if rows.is_empty() {
            return Ok(());
        }
        let max_id = rows.last().map(|(id, _)| *id).unwrap_or(0);
        db.insert_rows(self.kind, rows)?;
        self.lastid_db = self.lastid_db.max(max_id);
        self.clear_memory(arena);
        Ok(())
    }
}

/// Type-erased view eviction needs: the front record's age and how to pop
/// it. Implemented for every `RecordStore<T>` regardless of `T`, so the
/// three differently-typed stores can be compared uniformly.
pub trait Evictable {
    fn kind(&self) -> RecordKind;
    fn peek_front_clock(&self) -> Option<i64>;
    fn evict_front(&mut self, arena: &mut Arena) -> Option<usize>;
}

impl<T: Record> Evictable for RecordStore<T> {
    fn kind(&self) -> RecordKind {
        self.kind
    }

    fn peek_front_clock(&self) -> Option<i64> {
        self.list.peek_front().map(|r| r.clock())
    }

    fn evict_front(&mut self, arena: &mut Arena) -> Option<usize> {
        let rec = self.list.pop_front()?;
        let size = rec.estimated_size();
        arena.release(size);
        Some(size)
    }
}
