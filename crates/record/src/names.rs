//! Canonical attribute names produced by the ingesters and consumed by the
//! enricher and exporters.

pub const SRC_ADDR: &str = "SrcAddr";
pub const DST_ADDR: &str = "DstAddr";
pub const SRC_PORT: &str = "SrcPort";
pub const DST_PORT: &str = "DstPort";
pub const SRC_MAC: &str = "SrcMac";
pub const DST_MAC: &str = "DstMac";
pub const PROTO: &str = "Proto";
pub const ETYPE: &str = "Etype";
pub const BYTES: &str = "Bytes";
pub const PACKETS: &str = "Packets";
pub const TIME_RECEIVED: &str = "TimeReceived";
pub const TIME_FLOW_START: &str = "TimeFlowStart";
pub const TIME_FLOW_END: &str = "TimeFlowEnd";
pub const SAMPLER_ADDRESS: &str = "SamplerAddress";
pub const SEQUENCE_NUM: &str = "SequenceNum";

// Suffixes appended to a configured output prefix (e.g. `Src` + `Pod`) by
// the enricher.
pub const SUFFIX_POD: &str = "Pod";
pub const SUFFIX_NAMESPACE: &str = "Namespace";
pub const SUFFIX_HOST_IP: &str = "HostIP";
pub const SUFFIX_WORKLOAD: &str = "Workload";
pub const SUFFIX_WORKLOAD_KIND: &str = "WorkloadKind";
pub const SUFFIX_WARN: &str = "Warn";
