//! The public, coarsely-locked proxy buffer.
//!
//! A single `parking_lot::Mutex` guards the state machine, every cursor,
//! the three in-memory lists, and the database handle together. Records
//! are small and operations are short, so one lock is simpler and safe
//! against the ordering bugs a finer-grained scheme would risk across a
//! backend transition; see `SPEC_FULL.md` section 9 for the rationale.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::arena::Arena;
use crate::config::BufferConfig;
use crate::config::Mode;
use crate::database::{ProxyDatabase, RecordKind};
use crate::error::BufferError;
use crate::eviction;
use crate::record::{AutoregRecord, DiscoveryRecord, HistoryRecord};
use crate::schema::{encode_autoreg, encode_discovery, encode_history};
use crate::state::{Backend, State};
use crate::store::{Evictable, GetRowsResult, RecordStore};

pub struct MemInfo {
    pub total_bytes: usize,
    pub used_bytes: usize,
}

pub struct StateInfo {
    pub destination_is_memory: bool,
    pub changes_num: u64,
}

struct Inner {
    mode: Mode,
    max_age_secs: i64,
    state: State,
    arena: Option<Arena>,
    history: RecordStore<HistoryRecord>,
    discovery: RecordStore<DiscoveryRecord>,
    autoreg: RecordStore<AutoregRecord>,
    db: Box<dyn ProxyDatabase>,
    changes_num: u64,
    disabled: bool,
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

impl Inner {
    fn bootstrap(config: BufferConfig, mut db: Box<dyn ProxyDatabase>) -> Result<Self, BufferError> {
        config.validate()?;

        let mut history = RecordStore::new(RecordKind::History, encode_history);
        let mut discovery = RecordStore::new(RecordKind::Discovery, encode_discovery);
        let mut autoreg = RecordStore::new(RecordKind::Autoreg, encode_autoreg);
        history.bootstrap_from_db(db.as_mut())?;
        discovery.bootstrap_from_db(db.as_mut())?;
        autoreg.bootstrap_from_db(db.as_mut())?;

        let (arena, state) = match config.mode {
            Mode::Disk => (None, State::Database),
            Mode::Memory => (Some(Arena::new(config.size)?), State::Memory),
            Mode::Hybrid => {
                let residue = db.has_unsent_residue(RecordKind::History)?
                    || db.has_unsent_residue(RecordKind::Discovery)?
                    || db.has_unsent_residue(RecordKind::Autoreg)?;
                let state = if residue { State::Database } else { State::Memory };
                (Some(Arena::new(config.size)?), state)
            }
        };

        Ok(Inner {
            mode: config.mode,
            max_age_secs: config.max_age.as_secs() as i64,
            state,
            arena,
            history,
            discovery,
            autoreg,
            db,
            changes_num: 0,
            disabled: false,
        })
    }

    fn check_enabled(&self) -> Result<(), BufferError> {
        if self.disabled {
            Err(BufferError::Disabled)
        } else {
            Ok(())
        }
    }

    fn make_room_any(&mut self, target: usize) -> Result<(), ()> {
        let arena = self.arena.as_mut().expect("memory/hybrid mode always has an arena");
        let mut stores: Vec<&mut dyn Evictable> = vec![&mut self.history, &mut self.discovery, &mut self.autoreg];
        eviction::make_room(&mut stores, target, arena)
    }

    fn memory_pressure(&self) -> bool {
        self.arena.as_ref().map(|a| a.free_size() == 0).unwrap_or(false)
    }

    fn oldest_memory_age_exceeds_max_age(&self) -> bool {
        let now = now_epoch();
        [
            self.history.peek_front_clock(),
            self.discovery.peek_front_clock(),
            self.autoreg.peek_front_clock(),
        ]
        .into_iter()
        .flatten()
        .any(|clock| now - clock > self.max_age_secs)
    }

    fn memory_all_drained(&self) -> bool {
        self.history.memory_is_empty() && self.discovery.memory_is_empty() && self.autoreg.memory_is_empty()
    }

    fn db_all_drained(&self) -> bool {
        self.history.lastid_sent() >= self.history.lastid_db()
            && self.discovery.lastid_sent() >= self.discovery.lastid_db()
            && self.autoreg.lastid_sent() >= self.autoreg.lastid_db()
    }

    fn all_handles_clear(&self) -> bool {
        self.history.handleid() == 0 && self.discovery.handleid() == 0 && self.autoreg.handleid() == 0
    }

    fn commit_lastid_cursors_to_db(&mut self) -> Result<(), BufferError> {
        self.db.set_lastid(RecordKind::History, self.history.lastid_sent())?;
        self.db.set_lastid(RecordKind::Discovery, self.discovery.lastid_sent())?;
        self.db.set_lastid(RecordKind::Autoreg, self.autoreg.lastid_sent())?;
        Ok(())
    }

    /// Moves to `new`, applying the original daemon's counting rule: a
    /// transition only counts against `changes_num` when it leaves one of
    /// the two terminal states (`Database`/`Memory`), not when it arrives
    /// at one.
    fn transition_to(&mut self, new: State) {
        if matches!(self.state, State::Database | State::Memory) {
            self.changes_num += 1;
        }
        log::info!("proxy buffer: {} -> {}", self.state, new);
        self.state = new;
    }

    /// Re-checks the current state's exit conditions and advances the
    /// state machine at most one step. Called after every mutating public
    /// operation and by the explicit `update_state` tick.
    fn evaluate_transitions(&mut self) {
        if self.mode != Mode::Hybrid {
            return;
        }
        match self.state {
            State::Memory => {
                if self.memory_pressure() || self.oldest_memory_age_exceeds_max_age() {
                    self.transition_to(State::MemoryToDatabase);
                }
            }
            State::MemoryToDatabase => {
                if self.memory_all_drained() {
                    match self.commit_lastid_cursors_to_db() {
                        Ok(()) => self.transition_to(State::Database),
                        Err(e) => log::warn!("proxy buffer: deferring memory->database exit, {e}"),
                    }
                }
            }
            State::Database => {
                if self.db_all_drained() {
                    self.transition_to(State::DatabaseToMemory);
                }
            }
            State::DatabaseToMemory => {
                if self.db_all_drained() && self.all_handles_clear() {
                    self.transition_to(State::Memory);
                }
            }
        }
    }

    fn flush_all(&mut self) -> Result<(), BufferError> {
        if let Some(arena) = self.arena.as_mut() {
            self.history.flush_to_db(arena, self.db.as_mut())?;
            self.discovery.flush_to_db(arena, self.db.as_mut())?;
            self.autoreg.flush_to_db(arena, self.db.as_mut())?;
        }
        self.transition_to(State::Database);
        Ok(())
    }
}

macro_rules! impl_add {
    ($name:ident, $store:ident, $rec_ty:ty) => {
        fn $name(&mut self, rec: $rec_ty) -> Result<(), BufferError> {
            self.check_enabled()?;
            let dest = self.state.write_destination();
            let result = match dest {
                Backend::Memory => {
                    let arena = self.arena.as_mut().expect("memory/hybrid mode always has an arena");
                    match self.$store.add_memory(rec, arena) {
                        Ok(()) => Ok(()),
                        Err((rec, BufferError::NoMemory)) => {
                            if self.mode == Mode::Hybrid {
                                // Memory is full: start draining it to the database
                                // instead of evicting unsent records, and route this
                                // write (and subsequent ones) there until memory
                                // drains and the state machine cycles back.
                                self.transition_to(State::MemoryToDatabase);
                                self.$store.add_db(rec, self.db.as_mut())
                            } else {
                                let size = rec.estimated_size();
                                if self.make_room_any(size).is_ok() {
                                    let arena = self.arena.as_mut().unwrap();
                                    self.$store.add_memory(rec, arena).map_err(|(_, e)| e)
                                } else {
                                    log::warn!(concat!(stringify!($store), ": dropping record, buffer full"));
                                    Err(BufferError::NoMemory)
                                }
                            }
                        }
                        Err((_, e)) => Err(e),
                    }
                }
                Backend::Database => self.$store.add_db(rec, self.db.as_mut()),
            };
            self.evaluate_transitions();
            result
        }
    };
}

macro_rules! impl_get {
    ($name:ident, $store:ident) => {
        fn $name(&mut self, batch_limit: usize, size_limit: usize) -> Result<GetRowsResult, BufferError> {
            self.check_enabled()?;
            let result = match self.state.read_source() {
                Backend::Memory => Ok(self.$store.get_rows_memory(batch_limit, size_limit)),
                Backend::Database => self.$store.get_rows_db(batch_limit, size_limit, self.db.as_mut()),
            };
            self.evaluate_transitions();
            result
        }
    };
}

macro_rules! impl_set_lastid {
    ($name:ident, $store:ident) => {
        fn $name(&mut self, id: u64) -> Result<(), BufferError> {
            self.check_enabled()?;
            match self.state.read_source() {
                Backend::Memory => {
                    let arena = self.arena.as_mut().expect("memory/hybrid mode always has an arena");
                    self.$store.set_lastid_memory(id, arena);
                }
                Backend::Database => self.$store.set_lastid_db(id, self.db.as_mut())?,
            }
            self.evaluate_transitions();
            Ok(())
        }
    };
}

impl Inner {
    impl_add!(add_history, history, HistoryRecord);
    impl_add!(add_discovery, discovery, DiscoveryRecord);
    impl_add!(add_autoreg, autoreg, AutoregRecord);

    impl_get!(get_history, history);
    impl_get!(get_discovery, discovery);
    impl_get!(get_autoreg, autoreg);

    impl_set_lastid!(set_lastid_history, history);
    impl_set_lastid!(set_lastid_discovery, discovery);
    impl_set_lastid!(set_lastid_autoreg, autoreg);
}

/// The process-lifetime hybrid memory/disk cache. Cheap to share: hold it
/// behind an `Arc` and call its methods from any number of collector and
/// uploader threads.
pub struct ProxyBuffer {
    inner: Mutex<Inner>,
}

impl ProxyBuffer {
    /// Builds and bootstraps a buffer from `config`, probing `db` for
    /// residual undelivered rows when `config.mode` is `Hybrid`. Fails
    /// fatally (no instance is produced) if the configured arena size
    /// cannot be reserved from the OS, or the database is unreachable.
    pub fn init(config: BufferConfig, db: Box<dyn ProxyDatabase>) -> Result<Self, BufferError> {
        let inner = Inner::bootstrap(config, db)?;
        Ok(ProxyBuffer { inner: Mutex::new(inner) })
    }

    pub fn add_history(&self, rec: HistoryRecord) -> Result<(), BufferError> {
        self.inner.lock().add_history(rec)
    }

    pub fn add_discovery(&self, rec: DiscoveryRecord) -> Result<(), BufferError> {
        self.inner.lock().add_discovery(rec)
    }

    pub fn add_autoreg(&self, rec: AutoregRecord) -> Result<(), BufferError> {
        self.inner.lock().add_autoreg(rec)
    }

    pub fn get_history(&self, batch_limit: usize, size_limit: usize) -> Result<GetRowsResult, BufferError> {
        self.inner.lock().get_history(batch_limit, size_limit)
    }

    pub fn get_discovery(&self, batch_limit: usize, size_limit: usize) -> Result<GetRowsResult, BufferError> {
        self.inner.lock().get_discovery(batch_limit, size_limit)
    }

    pub fn get_autoreg(&self, batch_limit: usize, size_limit: usize) -> Result<GetRowsResult, BufferError> {
        self.inner.lock().get_autoreg(batch_limit, size_limit)
    }

    pub fn set_lastid_history(&self, id: u64) -> Result<(), BufferError> {
        self.inner.lock().set_lastid_history(id)
    }

    pub fn set_lastid_discovery(&self, id: u64) -> Result<(), BufferError> {
        self.inner.lock().set_lastid_discovery(id)
    }

    pub fn set_lastid_autoreg(&self, id: u64) -> Result<(), BufferError> {
        self.inner.lock().set_lastid_autoreg(id)
    }

    /// Re-evaluates the state machine's exit conditions without waiting
    /// for the next mutating call. Intended to be polled periodically by
    /// the owning process so age-triggered transitions fire even when
    /// idle.
    pub fn update_state(&self) {
        self.inner.lock().evaluate_transitions();
    }

    /// Forces an immediate flush of all in-memory records to the
    /// database and pins the state to `Database`, skipping the normal
    /// transitional draining. Used for hybrid-mode shutdown and for
    /// `disable()`.
    pub fn flush(&self) -> Result<(), BufferError> {
        self.inner.lock().flush_all()
    }

    /// Permanently disables memory/hybrid operation: flushes any
    /// in-memory records to the database, then pins mode and state to
    /// disk/database until the process restarts (a new `ProxyBuffer` must
    /// be constructed).
    pub fn disable(&self) {
        let mut inner = self.inner.lock();
        if let Err(e) = inner.flush_all() {
            log::warn!("proxy buffer: flush during disable failed, {e}");
        }
        inner.mode = Mode::Disk;
        inner.state = State::Database;
        inner.disabled = true;
    }

    pub fn mem_info(&self) -> Result<MemInfo, BufferError> {
        let inner = self.inner.lock();
        inner.check_enabled()?;
        Ok(match &inner.arena {
            Some(arena) => MemInfo {
                total_bytes: arena.total_size(),
                used_bytes: arena.used_size(),
            },
            None => MemInfo { total_bytes: 0, used_bytes: 0 },
        })
    }

    pub fn state_info(&self) -> Result<StateInfo, BufferError> {
        let inner = self.inner.lock();
        inner.check_enabled()?;
        Ok(StateInfo {
            destination_is_memory: inner.state.destination_is_memory(),
            changes_num: inner.changes_num,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::database::MockDatabase;
    use std::time::Duration;

    fn config(mode: Mode, size: usize) -> BufferConfig {
        BufferConfig {
            mode,
            size,
            max_age: Duration::from_secs(3600),
            offline_buffer: Duration::from_secs(3600),
        }
    }

    #[test]
    fn disk_mode_round_trip() {
        let buf = ProxyBuffer::init(config(Mode::Disk, 0), Box::new(MockDatabase::new())).unwrap();
        buf.add_history(HistoryRecord::new(1, 100, 0, "42")).unwrap();
        let result = buf.get_history(10, 1 << 20).unwrap();
        assert_eq!(result.rows.len(), 1);
        buf.set_lastid_history(result.lastid).unwrap();
        assert_eq!(buf.state_info().unwrap().changes_num, 0);
    }

    #[test]
    fn memory_mode_drains_fully() {
        let buf = ProxyBuffer::init(config(Mode::Memory, 1 << 20), Box::new(MockDatabase::new())).unwrap();
        for i in 0..100u64 {
            buf.add_autoreg(AutoregRecord::new(format!("host{i}"), 0)).unwrap();
        }
        let first = buf.get_autoreg(10, 1 << 20).unwrap();
        assert_eq!(first.rows.len(), 10);
        assert!(first.more);
        buf.set_lastid_autoreg(first.lastid).unwrap();

        let rest = buf.get_autoreg(200, 1 << 20).unwrap();
        assert_eq!(rest.rows.len(), 90);
        assert!(!rest.more);
        buf.set_lastid_autoreg(rest.lastid).unwrap();

        assert_eq!(buf.mem_info().unwrap().used_bytes, 0);
    }

    #[test]
    fn hybrid_spills_to_database_under_pressure() {
        let buf = ProxyBuffer::init(config(Mode::Hybrid, page_size::get()), Box::new(MockDatabase::new())).unwrap();
        for i in 0..2000u64 {
            let _ = buf.add_history(HistoryRecord::new(i, 0, 0, "x".repeat(64)));
        }
        assert!(buf.state_info().unwrap().destination_is_memory == false || buf.mem_info().unwrap().used_bytes > 0);
    }

    #[test]
    fn disable_pins_disk_mode() {
        let buf = ProxyBuffer::init(config(Mode::Memory, 1 << 20), Box::new(MockDatabase::new())).unwrap();
        buf.add_history(HistoryRecord::new(1, 0, 0, "v")).unwrap();
        buf.disable();
        assert!(matches!(buf.mem_info(), Err(BufferError::Disabled)));
    }
}
