//! Protobuf flow message for the stdin ingester.
//!
//! The message layout follows the goflow collector's flow protobuf, which
//! is what upstream flow-to-protobuf pipelines emit. Rendering applies the
//! same canonical attribute names and string forms as the UDP decoder
//! (addresses in canonical notation, MACs as colon-hex).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use flowkube_record::{Record, Value};

/// goflow-compatible flow message (the subset the enrichment pipeline
/// consumes)
#[derive(Clone, PartialEq, prost::Message)]
pub struct FlowMessage {
    #[prost(uint64, tag = "2")]
    pub time_received: u64,
    #[prost(uint32, tag = "4")]
    pub sequence_num: u32,
    #[prost(uint64, tag = "3")]
    pub sampling_rate: u64,
    #[prost(bytes = "vec", tag = "11")]
    pub sampler_address: Vec<u8>,
    #[prost(uint64, tag = "38")]
    pub time_flow_start: u64,
    #[prost(uint64, tag = "5")]
    pub time_flow_end: u64,
    #[prost(uint64, tag = "9")]
    pub bytes: u64,
    #[prost(uint64, tag = "10")]
    pub packets: u64,
    #[prost(bytes = "vec", tag = "6")]
    pub src_addr: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub dst_addr: Vec<u8>,
    #[prost(uint32, tag = "30")]
    pub etype: u32,
    #[prost(uint32, tag = "20")]
    pub proto: u32,
    #[prost(uint32, tag = "21")]
    pub src_port: u32,
    #[prost(uint32, tag = "22")]
    pub dst_port: u32,
    #[prost(uint32, tag = "18")]
    pub in_if: u32,
    #[prost(uint32, tag = "19")]
    pub out_if: u32,
    #[prost(uint64, tag = "27")]
    pub src_mac: u64,
    #[prost(uint64, tag = "28")]
    pub dst_mac: u64,
}

/// Render a flow message into the canonical record shape
pub fn render_message(message: &FlowMessage) -> Record {
    let mut record = Record::new();

    if let Some(addr) = render_ip(&message.src_addr) {
        record.set("SrcAddr", addr);
    }
    if let Some(addr) = render_ip(&message.dst_addr) {
        record.set("DstAddr", addr);
    }
    if let Some(addr) = render_ip(&message.sampler_address) {
        record.set("SamplerAddress", addr);
    }
    record.set("SrcMac", render_mac(message.src_mac));
    record.set("DstMac", render_mac(message.dst_mac));
    record.set("SrcPort", message.src_port);
    record.set("DstPort", message.dst_port);
    record.set("Proto", message.proto);
    record.set("Etype", message.etype);
    record.set("Bytes", message.bytes);
    record.set("Packets", message.packets);
    record.set("InIf", message.in_if);
    record.set("OutIf", message.out_if);
    record.set("TimeReceived", message.time_received);
    record.set("TimeFlowStart", message.time_flow_start);
    record.set("TimeFlowEnd", message.time_flow_end);
    record.set("SequenceNum", message.sequence_num);
    if message.sampling_rate > 0 {
        record.set("SamplingRate", message.sampling_rate);
    }

    record
}

fn render_ip(raw: &[u8]) -> Option<Value> {
    let addr = match raw.len() {
        4 => {
            let octets: [u8; 4] = raw.try_into().ok()?;
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = raw.try_into().ok()?;
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    Some(Value::String(addr.to_string()))
}

fn render_mac(mac: u64) -> String {
    let b = mac.to_be_bytes();
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        b[2], b[3], b[4], b[5], b[6], b[7]
    )
}
