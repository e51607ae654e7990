//! Information element typing and rendering.
//!
//! Maps the standard NetFlow v9 / IPFIX information elements onto the
//! canonical record attribute names and decodes their wire representation
//! into record values. Unknown standard elements render as `ie{id}`;
//! enterprise-specific elements render under `{enterprise}.{id}`.

use std::net::{Ipv4Addr, Ipv6Addr};

use flowkube_record::Value;

/// Wire representation of an information element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Big-endian unsigned integer, 1-8 bytes
    Unsigned,
    Ipv4,
    Ipv6,
    Mac,
    /// Seconds since the UNIX epoch
    DateTimeSeconds,
    /// Milliseconds since the UNIX epoch, exported as seconds
    DateTimeMilliseconds,
    /// Milliseconds of system uptime, converted against the export header
    SysUptimeMilliseconds,
    String,
    /// Unknown layout: integer when it fits, hex otherwise
    Default,
}

/// Name and wire type of a standard information element
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo {
    pub name: &'static str,
    pub field_type: FieldType,
}

const fn info(name: &'static str, field_type: FieldType) -> FieldInfo {
    FieldInfo { name, field_type }
}

/// Standard information elements (IANA "ipfix" registry, NetFlow v9
/// compatible subset).
pub fn standard_field(id: u16) -> Option<FieldInfo> {
    use FieldType::*;
    let field = match id {
        1 => info("Bytes", Unsigned),
        2 => info("Packets", Unsigned),
        3 => info("FlowCount", Unsigned),
        4 => info("Proto", Unsigned),
        5 => info("IPTos", Unsigned),
        6 => info("TCPFlags", Unsigned),
        7 => info("SrcPort", Unsigned),
        8 => info("SrcAddr", Ipv4),
        9 => info("SrcNet", Unsigned),
        10 => info("InIf", Unsigned),
        11 => info("DstPort", Unsigned),
        12 => info("DstAddr", Ipv4),
        13 => info("DstNet", Unsigned),
        14 => info("OutIf", Unsigned),
        15 => info("NextHop", Ipv4),
        16 => info("SrcAS", Unsigned),
        17 => info("DstAS", Unsigned),
        21 => info("TimeFlowEnd", SysUptimeMilliseconds),
        22 => info("TimeFlowStart", SysUptimeMilliseconds),
        23 => info("OutBytes", Unsigned),
        24 => info("OutPackets", Unsigned),
        27 => info("SrcAddr", Ipv6),
        28 => info("DstAddr", Ipv6),
        29 => info("SrcNet", Unsigned),
        30 => info("DstNet", Unsigned),
        31 => info("IPv6FlowLabel", Unsigned),
        32 => info("IcmpTypeCode", Unsigned),
        34 => info("SamplingRate", Unsigned),
        48 => info("SamplerId", Unsigned),
        56 => info("SrcMac", Mac),
        58 => info("SrcVlan", Unsigned),
        59 => info("DstVlan", Unsigned),
        60 => info("IPVersion", Unsigned),
        61 => info("FlowDirection", Unsigned),
        62 => info("NextHop", Ipv6),
        80 => info("DstMac", Mac),
        89 => info("ForwardingStatus", Unsigned),
        136 => info("FlowEndReason", Unsigned),
        148 => info("FlowId", Unsigned),
        150 => info("TimeFlowStart", DateTimeSeconds),
        151 => info("TimeFlowEnd", DateTimeSeconds),
        152 => info("TimeFlowStart", DateTimeMilliseconds),
        153 => info("TimeFlowEnd", DateTimeMilliseconds),
        192 => info("IPTTL", Unsigned),
        256 => info("Etype", Unsigned),
        _ => return None,
    };
    Some(field)
}

/// Export-header context needed to resolve uptime-relative timestamps
#[derive(Debug, Clone, Copy)]
pub struct TimeContext {
    /// Export time, seconds since the UNIX epoch
    pub export_secs: u64,
    /// Exporter uptime at export time, milliseconds (0 for IPFIX)
    pub sys_uptime_ms: u64,
}

impl TimeContext {
    /// Absolute seconds for an uptime-relative millisecond timestamp
    pub fn absolute_secs(&self, uptime_ms: u64) -> i64 {
        let delta_ms = self.sys_uptime_ms as i64 - uptime_ms as i64;
        self.export_secs as i64 - delta_ms / 1000
    }
}

/// Decode one field's wire bytes.
///
/// Returns `None` when the data is shorter than the type requires; the
/// caller drops the field (not the record).
pub fn render(field_type: FieldType, data: &[u8], time: &TimeContext) -> Option<Value> {
    match field_type {
        FieldType::Unsigned => Some(Value::from(be_uint(data)?)),
        FieldType::Ipv4 => {
            let octets: [u8; 4] = data.get(..4)?.try_into().ok()?;
            Some(Value::String(Ipv4Addr::from(octets).to_string()))
        }
        FieldType::Ipv6 => {
            let octets: [u8; 16] = data.get(..16)?.try_into().ok()?;
            Some(Value::String(Ipv6Addr::from(octets).to_string()))
        }
        FieldType::Mac => {
            let b = data.get(..6)?;
            Some(Value::String(format!(
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                b[0], b[1], b[2], b[3], b[4], b[5]
            )))
        }
        FieldType::DateTimeSeconds => Some(Value::from(be_uint(data)?)),
        FieldType::DateTimeMilliseconds => Some(Value::from(be_uint(data)? / 1000)),
        FieldType::SysUptimeMilliseconds => {
            Some(Value::Int(time.absolute_secs(be_uint(data)?)))
        }
        FieldType::String => {
            let text = std::str::from_utf8(data).ok()?;
            Some(Value::String(text.trim_matches('\0').to_string()))
        }
        FieldType::Default => Some(render_default(data)),
    }
}

/// Unknown layout: big-endian integer up to 8 bytes, hex beyond
pub fn render_default(data: &[u8]) -> Value {
    match be_uint(data) {
        Some(v) => Value::from(v),
        None => Value::String(hex(data)),
    }
}

fn be_uint(data: &[u8]) -> Option<u64> {
    if data.is_empty() || data.len() > 8 {
        return None;
    }
    let mut value = 0u64;
    for byte in data {
        value = value << 8 | u64::from(*byte);
    }
    Some(value)
}

fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
#[path = "fields_test.rs"]
mod fields_test;
