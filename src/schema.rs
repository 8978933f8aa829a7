//! Default-value elision for the wire representation shipped upstream.
//!
//! Each record field has a schema-declared default; when a record's value
//! equals that default it is omitted from the serialized object rather than
//! sent as an explicit zero/empty string, shrinking upload payloads the way
//! the upstream protocol expects.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use once_cell::sync::Lazy;

use crate::record::{AutoregRecord, DiscoveryRecord, HistoryRecord};

/// A lazily built table of a record kind's field defaults, keyed by field
/// name. Values are compared textually, matching how the upstream daemon
/// elides fields after formatting.
pub struct DefaultTable(HashMap<&'static str, &'static str>);

impl DefaultTable {
    fn is_default(&self, field: &str, value: &str) -> bool {
        self.0.get(field).is_some_and(|default| *default == value)
    }
}

pub static HISTORY_DEFAULTS: Lazy<DefaultTable> = Lazy::new(|| {
    DefaultTable(HashMap::from([
        ("source", ""),
        ("state", "0"),
        ("ns", "0"),
        ("lastlogsize", "0"),
    ]))
});

pub static DISCOVERY_DEFAULTS: Lazy<DefaultTable> = Lazy::new(|| {
    DefaultTable(HashMap::from([
        ("value", ""),
        ("dns", ""),
        ("port", "0"),
        ("status", "0"),
    ]))
});

pub static AUTOREG_DEFAULTS: Lazy<DefaultTable> = Lazy::new(|| {
    DefaultTable(HashMap::from([
        ("host_metadata", ""),
        ("listen_ip", ""),
        ("listen_dns", ""),
        ("listen_port", "0"),
        ("flags", "0"),
    ]))
});

/// Appends `"field":value,` to `buf` unless `value` equals the field's
/// schema default, in which case nothing is written.
fn put_field(buf: &mut BytesMut, table: &DefaultTable, field: &'static str, value: &str, quoted: bool) {
    if table.is_default(field, value) {
        return;
    }
    buf.put_slice(b"\"");
    buf.put_slice(field.as_bytes());
    buf.put_slice(b"\":");
    if quoted {
        buf.put_slice(b"\"");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\"");
    } else {
        buf.put_slice(value.as_bytes());
    }
    buf.put_slice(b",");
}

/// Serializes a history record to a size-accountable JSON-ish object,
/// eliding default-valued fields. The exact wire grammar is owned by the
/// external serializer; this produces the row payload it wraps.
pub fn encode_history(rec: &HistoryRecord) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_slice(b"{");
    put_field(&mut buf, &HISTORY_DEFAULTS, "itemid", &rec.itemid.to_string(), false);
    put_field(&mut buf, &HISTORY_DEFAULTS, "clock", &rec.clock.to_string(), false);
    put_field(&mut buf, &HISTORY_DEFAULTS, "ns", &rec.ns.to_string(), false);
    put_field(&mut buf, &HISTORY_DEFAULTS, "value", &rec.value, true);
    put_field(&mut buf, &HISTORY_DEFAULTS, "source", &rec.source, true);
    put_field(&mut buf, &HISTORY_DEFAULTS, "state", &rec.state.to_string(), false);
    put_field(
        &mut buf,
        &HISTORY_DEFAULTS,
        "lastlogsize",
        &rec.lastlogsize.to_string(),
        false,
    );
    buf.put_slice(b"}");
    buf
}

pub fn encode_discovery(rec: &DiscoveryRecord) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_slice(b"{");
    put_field(&mut buf, &DISCOVERY_DEFAULTS, "druleid", &rec.druleid.to_string(), false);
    put_field(&mut buf, &DISCOVERY_DEFAULTS, "dcheckid", &rec.dcheckid.to_string(), false);
    put_field(&mut buf, &DISCOVERY_DEFAULTS, "clock", &rec.clock.to_string(), false);
    put_field(&mut buf, &DISCOVERY_DEFAULTS, "value", &rec.value, true);
    put_field(&mut buf, &DISCOVERY_DEFAULTS, "ip", &rec.ip, true);
    put_field(&mut buf, &DISCOVERY_DEFAULTS, "dns", &rec.dns, true);
    put_field(&mut buf, &DISCOVERY_DEFAULTS, "port", &rec.port.to_string(), false);
    put_field(&mut buf, &DISCOVERY_DEFAULTS, "status", &rec.status.to_string(), false);
    buf.put_slice(b"}");
    buf
}

pub fn encode_autoreg(rec: &AutoregRecord) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_slice(b"{");
    put_field(&mut buf, &AUTOREG_DEFAULTS, "host", &rec.host, true);
    put_field(&mut buf, &AUTOREG_DEFAULTS, "host_metadata", &rec.host_metadata, true);
    put_field(&mut buf, &AUTOREG_DEFAULTS, "listen_ip", &rec.listen_ip, true);
    put_field(&mut buf, &AUTOREG_DEFAULTS, "listen_dns", &rec.listen_dns, true);
    put_field(
        &mut buf,
        &AUTOREG_DEFAULTS,
        "listen_port",
        &rec.listen_port.to_string(),
        false,
    );
    put_field(&mut buf, &AUTOREG_DEFAULTS, "flags", &rec.flags.to_string(), false);
    put_field(&mut buf, &AUTOREG_DEFAULTS, "clock", &rec.clock.to_string(), false);
    buf.put_slice(b"}");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fields_are_elided() {
        let rec = HistoryRecord::new(1, 100, 0, "42");
        let encoded = encode_history(&rec);
        let text = String::from_utf8(encoded.to_vec()).unwrap();
        assert!(!text.contains("\"ns\""));
        assert!(!text.contains("\"state\""));
        assert!(text.contains("\"value\":\"42\""));
    }

    #[test]
    fn non_default_fields_are_kept() {
        let mut rec = HistoryRecord::new(1, 100, 0, "42");
        rec.ns = 7;
        let encoded = encode_history(&rec);
        let text = String::from_utf8(encoded.to_vec()).unwrap();
        assert!(text.contains("\"ns\":7"));
    }
}
