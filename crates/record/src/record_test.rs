//! Tests for the record model

use std::collections::BTreeMap;

use crate::{Record, Value};

#[test]
fn test_set_get_roundtrip() {
    let mut record = Record::new();
    record.set("SrcAddr", "10.0.0.1");
    record.set("Bytes", 1500u64);
    record.set("Sampled", true);
    record.set("Rate", 0.25);

    assert_eq!(record.get_str("SrcAddr"), Some("10.0.0.1"));
    assert_eq!(record.get("Bytes"), Some(&Value::Int(1500)));
    assert_eq!(record.get("Sampled"), Some(&Value::Bool(true)));
    assert_eq!(record.get("Rate"), Some(&Value::Float(0.25)));
    assert_eq!(record.get("Missing"), None);
    assert_eq!(record.len(), 4);
}

#[test]
fn test_get_str_rejects_non_strings() {
    let mut record = Record::new();
    record.set("Bytes", 42i64);
    assert_eq!(record.get_str("Bytes"), None);
}

#[test]
fn test_remove() {
    let mut record = Record::new();
    record.set("foo", "bar");
    assert_eq!(record.remove("foo"), Some(Value::String("bar".into())));
    assert!(!record.contains("foo"));
    assert_eq!(record.remove("foo"), None);
}

#[test]
fn test_json_roundtrip() {
    let raw = r#"{"SrcAddr":"10.0.0.1","Bytes":1500,"Rate":0.5,"Up":true}"#;
    let record = Record::from_json(raw).unwrap();

    assert_eq!(record.get_str("SrcAddr"), Some("10.0.0.1"));
    assert_eq!(record.get("Bytes"), Some(&Value::Int(1500)));
    assert_eq!(record.get("Rate"), Some(&Value::Float(0.5)));
    assert_eq!(record.get("Up"), Some(&Value::Bool(true)));

    let encoded = record.to_json().unwrap();
    let reparsed = Record::from_json(&encoded).unwrap();
    assert_eq!(record, reparsed);
}

#[test]
fn test_json_nested_map() {
    let raw = r#"{"Meta":{"Exporter":"router1","Domain":7}}"#;
    let record = Record::from_json(raw).unwrap();

    let mut expected = BTreeMap::new();
    expected.insert("Exporter".to_string(), Value::String("router1".into()));
    expected.insert("Domain".to_string(), Value::Int(7));
    assert_eq!(record.get("Meta"), Some(&Value::Map(expected)));
}

#[test]
fn test_json_rejects_arrays() {
    assert!(Record::from_json(r#"{"Tags":["a","b"]}"#).is_err());
}

#[test]
fn test_json_rejects_null() {
    assert!(Record::from_json(r#"{"Gone":null}"#).is_err());
}

#[test]
fn test_large_u64_keeps_magnitude() {
    let v = Value::from(u64::MAX);
    assert!(matches!(v, Value::Float(_)));
    let v = Value::from(123u64);
    assert_eq!(v, Value::Int(123));
}

#[test]
fn test_value_display() {
    assert_eq!(Value::String("abc".into()).to_string(), "abc");
    assert_eq!(Value::Int(42).to_string(), "42");
    assert_eq!(Value::Float(1.5).to_string(), "1.5");
    assert_eq!(Value::Bool(false).to_string(), "false");
}

#[test]
fn test_value_as_f64() {
    assert_eq!(Value::Int(7).as_f64(), Some(7.0));
    assert_eq!(Value::Float(1.25).as_f64(), Some(1.25));
    assert_eq!(Value::String("7".into()).as_f64(), None);
    assert_eq!(Value::Bool(true).as_f64(), None);
}
