use bitflags::bitflags;

use super::{Record, ROW_OVERHEAD_BYTES};

bitflags! {
    /// TLS connection types a host is willing to accept, mirrored from the
    /// upstream protocol's accepted-connection bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TlsAccepted: u8 {
        const UNENCRYPTED = 0x01;
        const PSK         = 0x02;
        const CERTIFICATE = 0x04;
    }
}

impl Default for TlsAccepted {
    fn default() -> Self {
        TlsAccepted::UNENCRYPTED
    }
}

/// An autoregistration event for a host not yet known to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoregRecord {
    id: u64,
    pub host: String,
    pub host_metadata: String,
    pub listen_ip: String,
    pub listen_dns: String,
    pub listen_port: u16,
    pub flags: i32,
    pub tls_accepted: TlsAccepted,
    pub clock: i64,
}

impl AutoregRecord {
    pub fn new(host: impl Into<String>, clock: i64) -> Self {
        AutoregRecord {
            id: 0,
            host: host.into(),
            host_metadata: String::new(),
            listen_ip: String::new(),
            listen_dns: String::new(),
            listen_port: 0,
            flags: 0,
            tls_accepted: TlsAccepted::default(),
            clock,
        }
    }
}

impl Record for AutoregRecord {
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
        ROW_OVERHEAD_BYTES
            + self.host.len()
            + self.host_metadata.len()
            + self.listen_ip.len()
            + self.listen_dns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tls_accepted_is_unencrypted() {
        let rec = AutoregRecord::new("host1", 0);
        assert_eq!(rec.tls_accepted, TlsAccepted::UNENCRYPTED);
    }

    #[test]
    fn tls_accepted_combines_flags() {
        let combo = TlsAccepted::PSK | TlsAccepted::CERTIFICATE;
        assert!(combo.contains(TlsAccepted::PSK));
        assert!(combo.contains(TlsAccepted::CERTIFICATE));
        assert!(!combo.contains(TlsAccepted::UNENCRYPTED));
    }
}
