use super::{Record, ROW_OVERHEAD_BYTES};

/// A network discovery event (rule/check hit) awaiting upload.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryRecord {
    id: u64,
    pub druleid: u64,
    pub dcheckid: u64,
    pub clock: i64,
    pub value: String,
    pub ip: String,
    pub dns: String,
    pub port: u16,
    pub status: i32,
}

impl DiscoveryRecord {
    pub fn new(druleid: u64, dcheckid: u64, clock: i64, ip: impl Into<String>) -> Self {
        DiscoveryRecord {
            id: 0,
            druleid,
            dcheckid,
            clock,
            value: String::new(),
            ip: ip.into(),
            dns: String::new(),
            port: 0,
            status: 0,
        }
    }
}

impl Record for DiscoveryRecord {
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
        ROW_OVERHEAD_BYTES + self.value.len() + self.ip.len() + self.dns.len()
    }
}
