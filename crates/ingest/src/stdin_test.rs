//! Tests for the framed stdin sources

use std::time::Duration;

use prost::Message;
use tokio_util::sync::CancellationToken;

use flowkube_pipeline::Ingester;
use flowkube_record::Value;

use crate::pb::FlowMessage;
use crate::stdin::{JsonLineIngester, ProtobufIngester};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn drain<I: Ingester>(ingester: I) -> Vec<flowkube_record::Record> {
    let mut rx = Box::new(ingester).start(CancellationToken::new());
    let mut records = Vec::new();
    let collected = tokio::time::timeout(TIMEOUT, async {
        while let Some(record) = rx.recv().await {
            records.push(record);
        }
        records
    })
    .await;
    collected.expect("ingester did not close its channel")
}

#[tokio::test]
async fn test_json_lines() {
    let input: &[u8] = b"{\"SrcAddr\":\"10.0.0.1\",\"Bytes\":100}\n{\"SrcAddr\":\"10.0.0.2\"}\n";
    let records = drain(JsonLineIngester::new(input)).await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get_str("SrcAddr"), Some("10.0.0.1"));
    assert_eq!(records[0].get("Bytes"), Some(&Value::Int(100)));
    assert_eq!(records[1].get_str("SrcAddr"), Some("10.0.0.2"));
}

#[tokio::test]
async fn test_json_bad_lines_skipped() {
    let input: &[u8] = b"not json\n{\"SrcAddr\":\"10.0.0.1\"}\n\n{\"Tags\":[1]}\n{\"DstAddr\":\"10.0.0.2\"}\n";
    let records = drain(JsonLineIngester::new(input)).await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get_str("SrcAddr"), Some("10.0.0.1"));
    assert_eq!(records[1].get_str("DstAddr"), Some("10.0.0.2"));
}

#[tokio::test]
async fn test_json_cancellation_closes_channel() {
    // a reader that never produces data
    let (_keep_alive, reader) = tokio::io::duplex(64);
    let cancel = CancellationToken::new();
    let mut rx = Box::new(JsonLineIngester::new(reader)).start(cancel.clone());

    cancel.cancel();
    let closed = tokio::time::timeout(TIMEOUT, rx.recv()).await;
    assert_eq!(closed.expect("timed out"), None);
}

fn sample_message() -> FlowMessage {
    FlowMessage {
        time_received: 1_700_000_000,
        sequence_num: 5,
        sampling_rate: 0,
        sampler_address: vec![192, 168, 0, 1],
        time_flow_start: 1_699_999_990,
        time_flow_end: 1_699_999_999,
        bytes: 2048,
        packets: 3,
        src_addr: vec![10, 0, 0, 1],
        dst_addr: vec![10, 0, 0, 2],
        etype: 0x0800,
        proto: 6,
        src_port: 443,
        dst_port: 33000,
        in_if: 1,
        out_if: 2,
        src_mac: 0x0000_aabb_ccdd_eeff,
        dst_mac: 0x0000_1122_3344_5566,
    }
}

fn encode_delimited(messages: &[FlowMessage]) -> Vec<u8> {
    let mut buf = Vec::new();
    for message in messages {
        let body = message.encode_to_vec();
        let mut len = body.len() as u64;
        // varint length prefix
        loop {
            let mut byte = (len & 0x7F) as u8;
            len >>= 7;
            if len != 0 {
                byte |= 0x80;
            }
            buf.push(byte);
            if len == 0 {
                break;
            }
        }
        buf.extend_from_slice(&body);
    }
    buf
}

#[tokio::test]
async fn test_protobuf_messages() {
    let input = encode_delimited(&[sample_message(), sample_message()]);
    let records = drain(ProtobufIngester::new(std::io::Cursor::new(input))).await;

    assert_eq!(records.len(), 2);
    let record = &records[0];
    assert_eq!(record.get_str("SrcAddr"), Some("10.0.0.1"));
    assert_eq!(record.get_str("DstAddr"), Some("10.0.0.2"));
    assert_eq!(record.get_str("SamplerAddress"), Some("192.168.0.1"));
    assert_eq!(record.get_str("SrcMac"), Some("aa:bb:cc:dd:ee:ff"));
    assert_eq!(record.get_str("DstMac"), Some("11:22:33:44:55:66"));
    assert_eq!(record.get("Proto"), Some(&Value::Int(6)));
    assert_eq!(record.get("Bytes"), Some(&Value::Int(2048)));
    assert_eq!(record.get("TimeReceived"), Some(&Value::Int(1_700_000_000)));
    assert_eq!(record.get("TimeFlowEnd"), Some(&Value::Int(1_699_999_999)));
}

#[tokio::test]
async fn test_protobuf_ipv6_addresses() {
    let mut message = sample_message();
    let mut v6 = [0u8; 16];
    v6[0] = 0xfd;
    v6[15] = 0x07;
    message.src_addr = v6.to_vec();

    let input = encode_delimited(&[message]);
    let records = drain(ProtobufIngester::new(std::io::Cursor::new(input))).await;
    assert_eq!(records[0].get_str("SrcAddr"), Some("fd00::7"));
}

#[tokio::test]
async fn test_protobuf_truncated_length_is_end_of_stream() {
    // a lone continuation byte: varint never completes
    let input: &[u8] = &[0x80];
    let records = drain(ProtobufIngester::new(input)).await;
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_protobuf_truncated_body_stops() {
    let mut input = encode_delimited(&[sample_message()]);
    input.truncate(input.len() - 4);
    let records = drain(ProtobufIngester::new(std::io::Cursor::new(input))).await;
    assert!(records.is_empty());
}
