//! Tests for information element rendering

use flowkube_record::Value;

use super::{render, render_default, standard_field, FieldType, TimeContext};

fn ctx() -> TimeContext {
    TimeContext {
        export_secs: 1_700_000_000,
        sys_uptime_ms: 600_000,
    }
}

#[test]
fn test_standard_field_names() {
    assert_eq!(standard_field(8).unwrap().name, "SrcAddr");
    assert_eq!(standard_field(12).unwrap().name, "DstAddr");
    assert_eq!(standard_field(27).unwrap().name, "SrcAddr");
    assert_eq!(standard_field(56).unwrap().name, "SrcMac");
    assert_eq!(standard_field(80).unwrap().name, "DstMac");
    assert_eq!(standard_field(150).unwrap().name, "TimeFlowStart");
    assert!(standard_field(9999).is_none());
}

#[test]
fn test_render_ipv4() {
    let value = render(FieldType::Ipv4, &[10, 0, 0, 1], &ctx()).unwrap();
    assert_eq!(value, Value::String("10.0.0.1".to_string()));
}

#[test]
fn test_render_ipv6_canonical() {
    let mut addr = [0u8; 16];
    addr[0] = 0xfd;
    addr[15] = 0x01;
    let value = render(FieldType::Ipv6, &addr, &ctx()).unwrap();
    assert_eq!(value, Value::String("fd00::1".to_string()));
}

#[test]
fn test_render_mac() {
    let value = render(FieldType::Mac, &[0xaa, 0xbb, 0xcc, 0x00, 0x11, 0x22], &ctx()).unwrap();
    assert_eq!(value, Value::String("aa:bb:cc:00:11:22".to_string()));
}

#[test]
fn test_render_unsigned_widths() {
    assert_eq!(render(FieldType::Unsigned, &[7], &ctx()).unwrap(), Value::Int(7));
    assert_eq!(
        render(FieldType::Unsigned, &[0x01, 0x00], &ctx()).unwrap(),
        Value::Int(256)
    );
    assert_eq!(
        render(FieldType::Unsigned, &[0, 0, 0, 0, 0, 0, 0x04, 0x00], &ctx()).unwrap(),
        Value::Int(1024)
    );
}

#[test]
fn test_render_short_data_dropped() {
    assert!(render(FieldType::Ipv4, &[10, 0], &ctx()).is_none());
    assert!(render(FieldType::Mac, &[1, 2, 3], &ctx()).is_none());
    assert!(render(FieldType::Unsigned, &[], &ctx()).is_none());
}

#[test]
fn test_render_datetime_milliseconds_scaled_to_seconds() {
    let ms: u64 = 1_700_000_123_456;
    let value = render(
        FieldType::DateTimeMilliseconds,
        &ms.to_be_bytes(),
        &ctx(),
    )
    .unwrap();
    assert_eq!(value, Value::Int(1_700_000_123));
}

#[test]
fn test_render_sysuptime_relative() {
    // flow ended 100s before export time
    let uptime_ms: u32 = 500_000;
    let value = render(
        FieldType::SysUptimeMilliseconds,
        &uptime_ms.to_be_bytes(),
        &ctx(),
    )
    .unwrap();
    assert_eq!(value, Value::Int(1_700_000_000 - 100));
}

#[test]
fn test_render_default_integer_or_hex() {
    assert_eq!(render_default(&[0x02]), Value::Int(2));
    assert_eq!(
        render_default(&[1, 2, 3, 4, 5, 6, 7, 8, 9]),
        Value::String("010203040506070809".to_string())
    );
}
