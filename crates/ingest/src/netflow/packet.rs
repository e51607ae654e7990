//! Datagram decoding for NetFlow v5, NetFlow v9 and IPFIX.
//!
//! One [`Decoder`] instance lives per UDP socket and owns the template
//! memory of every observation domain behind it. Decoding is tolerant
//! where the protocol allows it: a data set referencing an unknown
//! template is counted and skipped, only a structurally broken datagram
//! is rejected as a whole.

use flowkube_record::{Record, SEQUENCE_NUM, TIME_FLOW_END, TIME_FLOW_START, TIME_RECEIVED};
use thiserror::Error;

use super::fields::{render, render_default, standard_field, FieldType, TimeContext};
use super::templates::{FieldSpec, Template, TemplateStore};

/// Largest datagram a collector accepts
pub const MAX_DATAGRAM: usize = 65535;

const V5_HEADER_LEN: usize = 24;
const V5_RECORD_LEN: usize = 48;
const V9_HEADER_LEN: usize = 20;
const IPFIX_HEADER_LEN: usize = 16;

/// Set ids carrying (options-)templates
const V9_TEMPLATE_SET: u16 = 0;
const V9_OPTIONS_SET: u16 = 1;
const IPFIX_TEMPLATE_SET: u16 = 2;
const IPFIX_OPTIONS_SET: u16 = 3;
const MIN_DATA_SET: u16 = 256;

const VARIABLE_LENGTH: u16 = 0xFFFF;

/// Decoding failures that discard the whole datagram
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("datagram too short ({len} bytes)")]
    TooShort { len: usize },

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    #[error("malformed {0}")]
    Malformed(&'static str),
}

impl DecodeError {
    /// Error category used as a metrics label
    pub fn category(&self) -> &'static str {
        match self {
            DecodeError::TooShort { .. } => "too_short",
            DecodeError::UnsupportedVersion(_) => "unsupported_version",
            DecodeError::Malformed(_) => "malformed",
        }
    }
}

/// Outcome of decoding one datagram
#[derive(Debug, Default)]
pub struct Decoded {
    pub version: u16,
    pub records: Vec<Record>,
    /// Template records installed from this datagram
    pub templates: usize,
    /// Options-template records installed from this datagram
    pub options_templates: usize,
    /// Data sets dropped because their template is not (yet) known
    pub unknown_templates: usize,
}

/// Stateful decoder for one socket
pub struct Decoder {
    templates: TemplateStore,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            templates: TemplateStore::new(),
        }
    }

    /// Templates currently installed across all observation domains
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Decode one datagram. `now_secs` stamps `TimeReceived`.
    pub fn decode(&mut self, datagram: &[u8], now_secs: u64) -> Result<Decoded, DecodeError> {
        if datagram.len() < 2 {
            return Err(DecodeError::TooShort {
                len: datagram.len(),
            });
        }
        match be_u16(datagram, 0) {
            5 => self.decode_v5(datagram, now_secs),
            9 => self.decode_v9(datagram, now_secs),
            10 => self.decode_ipfix(datagram, now_secs),
            other => Err(DecodeError::UnsupportedVersion(other)),
        }
    }

    fn decode_v5(&mut self, buf: &[u8], now_secs: u64) -> Result<Decoded, DecodeError> {
        if buf.len() < V5_HEADER_LEN {
            return Err(DecodeError::TooShort { len: buf.len() });
        }
        let count = be_u16(buf, 2) as usize;
        let time = TimeContext {
            export_secs: be_u32(buf, 8) as u64,
            sys_uptime_ms: be_u32(buf, 4) as u64,
        };
        let sequence = be_u32(buf, 16);

        if buf.len() < V5_HEADER_LEN + count * V5_RECORD_LEN {
            return Err(DecodeError::Malformed("v5 record block"));
        }

        let mut decoded = Decoded {
            version: 5,
            ..Default::default()
        };
        for i in 0..count {
            let r = &buf[V5_HEADER_LEN + i * V5_RECORD_LEN..][..V5_RECORD_LEN];
            let mut record = Record::new();
            record.set("SrcAddr", ipv4(r, 0));
            record.set("DstAddr", ipv4(r, 4));
            record.set("NextHop", ipv4(r, 8));
            record.set("InIf", be_u16(r, 12));
            record.set("OutIf", be_u16(r, 14));
            record.set("Packets", be_u32(r, 16));
            record.set("Bytes", be_u32(r, 20));
            record.set(TIME_FLOW_START, time.absolute_secs(be_u32(r, 24) as u64));
            record.set(TIME_FLOW_END, time.absolute_secs(be_u32(r, 28) as u64));
            record.set("SrcPort", be_u16(r, 32));
            record.set("DstPort", be_u16(r, 34));
            record.set("TCPFlags", u64::from(r[37]));
            record.set("Proto", u64::from(r[38]));
            record.set("IPTos", u64::from(r[39]));
            record.set("SrcAS", be_u16(r, 40));
            record.set("DstAS", be_u16(r, 42));
            record.set(TIME_RECEIVED, now_secs);
            record.set(SEQUENCE_NUM, sequence);
            decoded.records.push(record);
        }
        Ok(decoded)
    }

    fn decode_v9(&mut self, buf: &[u8], now_secs: u64) -> Result<Decoded, DecodeError> {
        if buf.len() < V9_HEADER_LEN {
            return Err(DecodeError::TooShort { len: buf.len() });
        }
        let time = TimeContext {
            export_secs: be_u32(buf, 8) as u64,
            sys_uptime_ms: be_u32(buf, 4) as u64,
        };
        let obs_domain = be_u32(buf, 16);

        let mut decoded = Decoded {
            version: 9,
            ..Default::default()
        };
        self.walk_sets(&buf[V9_HEADER_LEN..], 9, obs_domain, &time, now_secs, &mut decoded)?;
        Ok(decoded)
    }

    fn decode_ipfix(&mut self, buf: &[u8], now_secs: u64) -> Result<Decoded, DecodeError> {
        if buf.len() < IPFIX_HEADER_LEN {
            return Err(DecodeError::TooShort { len: buf.len() });
        }
        let total_len = be_u16(buf, 2) as usize;
        if total_len > buf.len() || total_len < IPFIX_HEADER_LEN {
            return Err(DecodeError::Malformed("ipfix message length"));
        }
        let time = TimeContext {
            export_secs: be_u32(buf, 4) as u64,
            sys_uptime_ms: 0,
        };
        let obs_domain = be_u32(buf, 12);

        let mut decoded = Decoded {
            version: 10,
            ..Default::default()
        };
        self.walk_sets(
            &buf[IPFIX_HEADER_LEN..total_len],
            10,
            obs_domain,
            &time,
            now_secs,
            &mut decoded,
        )?;
        Ok(decoded)
    }

    /// Iterate the (flow)sets of a v9/IPFIX message body
    fn walk_sets(
        &mut self,
        mut body: &[u8],
        version: u16,
        obs_domain: u32,
        time: &TimeContext,
        now_secs: u64,
        decoded: &mut Decoded,
    ) -> Result<(), DecodeError> {
        while body.len() >= 4 {
            let set_id = be_u16(body, 0);
            let set_len = be_u16(body, 2) as usize;
            if set_len < 4 || set_len > body.len() {
                return Err(DecodeError::Malformed("set length"));
            }
            let content = &body[4..set_len];

            match (version, set_id) {
                (9, V9_TEMPLATE_SET) | (10, IPFIX_TEMPLATE_SET) => {
                    decoded.templates +=
                        self.parse_templates(content, version, obs_domain, false)?;
                }
                (9, V9_OPTIONS_SET) => {
                    decoded.options_templates += self.parse_v9_options(content, obs_domain)?;
                }
                (10, IPFIX_OPTIONS_SET) => {
                    decoded.options_templates +=
                        self.parse_templates(content, version, obs_domain, true)?;
                }
                (_, id) if id >= MIN_DATA_SET => {
                    match self.templates.get(obs_domain, id) {
                        Some(template) if template.options => {
                            // stored but not rendered
                        }
                        Some(template) => {
                            decode_data_records(template, content, time, now_secs, &mut decoded.records);
                        }
                        None => {
                            decoded.unknown_templates += 1;
                            tracing::debug!(
                                obs_domain,
                                template_id = id,
                                "data set references unknown template"
                            );
                        }
                    }
                }
                (_, id) => {
                    tracing::debug!(set_id = id, "skipping reserved set");
                }
            }

            body = &body[set_len..];
        }
        Ok(())
    }

    /// Parse the template records of a template set.
    ///
    /// IPFIX options templates go through here too (`options = true`): the
    /// scope-field count only partitions fields we treat uniformly.
    fn parse_templates(
        &mut self,
        mut content: &[u8],
        version: u16,
        obs_domain: u32,
        options: bool,
    ) -> Result<usize, DecodeError> {
        let mut installed = 0;
        while content.len() >= 4 {
            let template_id = be_u16(content, 0);
            if template_id == 0 {
                // padding
                break;
            }
            let field_count = be_u16(content, 2) as usize;
            let mut offset = 4;
            if options {
                // ipfix options templates carry a scope-field count
                if content.len() < 6 {
                    return Err(DecodeError::Malformed("options template header"));
                }
                offset = 6;
            }

            let mut fields = Vec::with_capacity(field_count);
            for _ in 0..field_count {
                if content.len() < offset + 4 {
                    return Err(DecodeError::Malformed("template field"));
                }
                let raw_id = be_u16(content, offset);
                let length = be_u16(content, offset + 2);
                offset += 4;

                let enterprise = if version == 10 && raw_id & 0x8000 != 0 {
                    if content.len() < offset + 4 {
                        return Err(DecodeError::Malformed("enterprise id"));
                    }
                    let enterprise = be_u32(content, offset);
                    offset += 4;
                    Some(enterprise)
                } else {
                    None
                };

                fields.push(FieldSpec {
                    enterprise,
                    id: raw_id & 0x7FFF,
                    length,
                });
            }

            let replaced = self.templates.insert(
                obs_domain,
                Template {
                    id: template_id,
                    fields,
                    options,
                },
            );
            if replaced {
                tracing::debug!(obs_domain, template_id, "template retransmitted");
            }
            installed += 1;
            content = &content[offset..];
        }
        Ok(installed)
    }

    /// NetFlow v9 options templates declare scope and option lengths in
    /// bytes instead of a field count.
    fn parse_v9_options(&mut self, mut content: &[u8], obs_domain: u32) -> Result<usize, DecodeError> {
        let mut installed = 0;
        while content.len() >= 6 {
            let template_id = be_u16(content, 0);
            if template_id == 0 {
                break;
            }
            let scope_len = be_u16(content, 2) as usize;
            let option_len = be_u16(content, 4) as usize;
            let specs_len = scope_len + option_len;
            if specs_len % 4 != 0 || content.len() < 6 + specs_len {
                return Err(DecodeError::Malformed("v9 options template"));
            }

            let mut fields = Vec::with_capacity(specs_len / 4);
            let mut offset = 6;
            while offset < 6 + specs_len {
                fields.push(FieldSpec {
                    enterprise: None,
                    id: be_u16(content, offset),
                    length: be_u16(content, offset + 2),
                });
                offset += 4;
            }

            self.templates.insert(
                obs_domain,
                Template {
                    id: template_id,
                    fields,
                    options: true,
                },
            );
            installed += 1;
            content = &content[offset..];
        }
        Ok(installed)
    }
}

/// Render every data record of a set against its template
fn decode_data_records(
    template: &Template,
    content: &[u8],
    time: &TimeContext,
    now_secs: u64,
    out: &mut Vec<Record>,
) {
    let min_len = template.min_record_len();
    if min_len == 0 {
        return;
    }

    let mut offset = 0;
    while content.len() - offset >= min_len {
        let mut record = Record::new();
        let mut broken = false;

        for spec in &template.fields {
            let length = if spec.length == VARIABLE_LENGTH {
                match variable_length(content, &mut offset) {
                    Some(len) => len,
                    None => {
                        broken = true;
                        break;
                    }
                }
            } else {
                spec.length as usize
            };
            if content.len() < offset + length {
                broken = true;
                break;
            }
            let data = &content[offset..offset + length];
            offset += length;

            match spec.enterprise {
                Some(enterprise) => {
                    record.set(format!("{enterprise}.{}", spec.id), render_default(data));
                }
                None => match standard_field(spec.id) {
                    Some(info) => {
                        if let Some(value) = render(info.field_type, data, time) {
                            record.set(info.name, value);
                        }
                    }
                    None => {
                        record.set(format!("ie{}", spec.id), render_default(data));
                    }
                },
            }
        }

        if broken {
            // remaining bytes are set padding or a truncated record
            break;
        }
        record.set(TIME_RECEIVED, now_secs);
        out.push(record);
    }
}

/// IPFIX variable-length field: 1-byte length, 255 escapes to 2 bytes
fn variable_length(content: &[u8], offset: &mut usize) -> Option<usize> {
    let first = *content.get(*offset)?;
    *offset += 1;
    if first < 255 {
        return Some(first as usize);
    }
    if content.len() < *offset + 2 {
        return None;
    }
    let len = be_u16(content, *offset) as usize;
    *offset += 2;
    Some(len)
}

fn be_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn be_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn ipv4(buf: &[u8], offset: usize) -> String {
    std::net::Ipv4Addr::new(buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3])
        .to_string()
}

#[cfg(test)]
#[path = "packet_test.rs"]
mod packet_test;
