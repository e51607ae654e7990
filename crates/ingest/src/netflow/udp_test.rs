//! Tests for the UDP NetFlow source

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use flowkube_health::Metrics;
use flowkube_pipeline::Ingester;

use super::{UdpIngester, UdpIngesterError};

const TIMEOUT: Duration = Duration::from_secs(5);

fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new().unwrap())
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// v9 datagram carrying one template (SrcAddr/DstAddr) and one data record
fn v9_self_contained() -> Vec<u8> {
    let mut buf = Vec::new();
    push_u16(&mut buf, 9);
    push_u16(&mut buf, 2);
    push_u32(&mut buf, 0);
    push_u32(&mut buf, 1_700_000_000);
    push_u32(&mut buf, 1);
    push_u32(&mut buf, 42);
    // template flowset
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 16);
    push_u16(&mut buf, 256);
    push_u16(&mut buf, 2);
    push_u16(&mut buf, 8);
    push_u16(&mut buf, 4);
    push_u16(&mut buf, 12);
    push_u16(&mut buf, 4);
    // data flowset
    push_u16(&mut buf, 256);
    push_u16(&mut buf, 12);
    buf.extend_from_slice(&[10, 0, 0, 1]);
    buf.extend_from_slice(&[10, 0, 0, 2]);
    buf
}

#[test]
fn test_bind_rejects_bad_urls() {
    assert!(matches!(
        UdpIngester::bind("https://localhost:2055", metrics()),
        Err(UdpIngesterError::UnknownScheme(_))
    ));
    assert!(matches!(
        UdpIngester::bind("netflow://localhost", metrics()),
        Err(UdpIngesterError::MissingPort(_))
    ));
    assert!(UdpIngester::bind("not a url", metrics()).is_err());
}

#[test]
fn test_bind_legacy_scheme() {
    let ingester = UdpIngester::bind("nfl://127.0.0.1:0", metrics()).unwrap();
    assert!(ingester.legacy);
    assert_eq!(ingester.local_addr().unwrap().ip().to_string(), "127.0.0.1");
}

#[tokio::test]
async fn test_receive_decode_and_cancel() {
    let m = metrics();
    let ingester = UdpIngester::bind("netflow://127.0.0.1:0", Arc::clone(&m)).unwrap();
    let addr = ingester.local_addr().unwrap();

    let cancel = CancellationToken::new();
    let mut records = Box::new(ingester).start(cancel.clone());

    let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(&v9_self_contained(), addr).unwrap();

    let record = tokio::time::timeout(TIMEOUT, records.recv())
        .await
        .expect("timed out waiting for a record")
        .expect("channel closed early");
    assert_eq!(record.get_str("SrcAddr"), Some("10.0.0.1"));
    assert_eq!(record.get_str("DstAddr"), Some("10.0.0.2"));
    assert_eq!(record.get_str("SamplerAddress"), Some("127.0.0.1"));

    let text = m.gather_text().unwrap();
    assert!(text.contains("flow_process_nf_count{router=\"127.0.0.1\",version=\"9\"} 1"));
    assert!(text.contains(
        "flow_templates_count{router=\"127.0.0.1\",type=\"template\",version=\"9\"} 1"
    ));

    // malformed datagram is counted, not fatal
    client.send_to(&[0xde, 0xad], addr).unwrap();
    // another valid one still decodes
    client.send_to(&v9_self_contained(), addr).unwrap();
    let record = tokio::time::timeout(TIMEOUT, records.recv())
        .await
        .expect("timed out after malformed datagram")
        .expect("channel closed early");
    assert_eq!(record.get_str("SrcAddr"), Some("10.0.0.1"));

    // cancellation closes the channel
    cancel.cancel();
    let closed = tokio::time::timeout(TIMEOUT, async {
        while records.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok());
}
