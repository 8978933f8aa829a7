use super::{Record, ROW_OVERHEAD_BYTES};

/// A single historical measurement awaiting upload.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    id: u64,
    pub itemid: u64,
    pub clock: i64,
    pub ns: i32,
    pub value: String,
    pub source: String,
    pub state: i32,
    pub lastlogsize: u64,
}

impl HistoryRecord {
    pub fn new(itemid: u64, clock: i64, ns: i32, value: impl Into<String>) -> Self {
        HistoryRecord {
            id: 0,
            itemid,
            clock,
            ns,
            value: value.into(),
            source: String::new(),
            state: 0,
            lastlogsize: 0,
        }
    }
}

impl Record for HistoryRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn clock(&self) -> i64 {
        self.clock
    }

    fn estimated_size(&self) -> usize {
        ROW_OVERHEAD_BYTES + self.value.len() + self.source.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_has_no_id() {
        let rec = HistoryRecord::new(5, 100, 0, "42");
        assert_eq!(rec.id(), 0);
    }

    #[test]
    fn estimated_size_grows_with_value() {
        let short = HistoryRecord::new(1, 0, 0, "x");
        let long = HistoryRecord::new(1, 0, 0, "x".repeat(100));
        assert!(long.estimated_size() > short.estimated_size());
    }
}
