//! NetFlow/IPFIX UDP source
//!
//! Binds one UDP socket and decodes datagrams into flow records. Template
//! state lives in the decoder for the socket's lifetime; records flow
//! through a small internal buffer before reaching the pipeline's bounded
//! stage channel.
//!
//! # Protocol Support
//!
//! - **NetFlow v5** - fixed-layout records
//! - **NetFlow v9** - template/options-template/data flowsets
//! - **IPFIX** - template/options-template/data sets, enterprise fields,
//!   variable-length fields
//!
//! The URL scheme selects the expected dialect (`netflow://` for v9/IPFIX,
//! `nfl://` for legacy v5) but the decoder discriminates on the version
//! field of each datagram, so a mixed exporter population still works.
//!
//! Malformed datagrams are logged and counted, never fatal: the reader
//! loop only terminates on cancellation.

mod fields;
mod packet;
mod templates;

pub use packet::{Decoded, DecodeError, Decoder, MAX_DATAGRAM};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use flowkube_health::Metrics;
use flowkube_pipeline::{Ingester, CHANNEL_CAPACITY};
use flowkube_record::{Record, SAMPLER_ADDRESS};

/// Capacity of the internal buffer between the decoder and the stage
/// channel
const DECODER_BUFFER: usize = 5;

/// Kernel receive buffer, sized for datagram bursts
const SOCKET_RECV_BUFFER: usize = 4 * 64 * 1024;

const NETFLOW_SCHEME: &str = "netflow";
const LEGACY_SCHEME: &str = "nfl";

/// Errors creating the UDP source. All of them are configuration-shaped
/// and fatal at startup.
#[derive(Debug, Error)]
pub enum UdpIngesterError {
    #[error("invalid listen URL {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unknown listening protocol: {0}")]
    UnknownScheme(String),

    #[error("listen URL {0} carries no port")]
    MissingPort(String),

    #[error("cannot resolve listen address {0}")]
    Unresolvable(String),

    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// UDP NetFlow/IPFIX ingester
pub struct UdpIngester {
    socket: std::net::UdpSocket,
    legacy: bool,
    metrics: Arc<Metrics>,
}

impl UdpIngester {
    /// Parse the listen URL and bind the socket.
    ///
    /// Binding happens here so that address problems abort startup instead
    /// of surfacing as an empty pipeline.
    pub fn bind(listen: &str, metrics: Arc<Metrics>) -> Result<Self, UdpIngesterError> {
        let url = url::Url::parse(listen).map_err(|source| UdpIngesterError::Url {
            url: listen.to_string(),
            source,
        })?;

        let legacy = match url.scheme() {
            NETFLOW_SCHEME => false,
            LEGACY_SCHEME => true,
            other => return Err(UdpIngesterError::UnknownScheme(other.to_string())),
        };

        let port = url
            .port()
            .ok_or_else(|| UdpIngesterError::MissingPort(listen.to_string()))?;
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => "::".to_string(),
        };

        let addr = std::net::ToSocketAddrs::to_socket_addrs(&(host.as_str(), port))
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| UdpIngesterError::Unresolvable(listen.to_string()))?;

        let socket = bind_socket(addr).map_err(|source| UdpIngesterError::Bind { addr, source })?;

        Ok(Self {
            socket,
            legacy,
            metrics,
        })
    }

    /// The bound local address (useful with port 0)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn run(self, tx: mpsc::Sender<Record>, cancel: CancellationToken) {
        let Self {
            socket,
            legacy,
            metrics,
        } = self;

        let local = socket.local_addr().ok();
        let socket = match UdpSocket::from_std(socket) {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(error = %e, "failed to register UDP socket with the runtime");
                return;
            }
        };

        tracing::info!(addr = ?local, legacy, "NetFlow ingester listening");

        let mut decoder = Decoder::new();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                result = socket.recv_from(&mut buf) => match result {
                    Ok((len, peer)) => {
                        if !process(&metrics, legacy, &mut decoder, &buf[..len], peer, &tx).await {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "UDP receive error");
                    }
                },
            }
        }

        tracing::info!(templates = decoder.template_count(), "NetFlow ingester stopped");
    }
}

/// Decode one datagram and forward its records.
///
/// Returns false when the downstream channel is gone.
async fn process(
    metrics: &Metrics,
    legacy: bool,
    decoder: &mut Decoder,
    datagram: &[u8],
    peer: SocketAddr,
    tx: &mpsc::Sender<Record>,
) -> bool {
    let router = peer.ip().to_string();
    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let decoded = match decoder.decode(datagram, now_secs) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!(router = %router, error = %e, "dropping malformed datagram");
            metrics
                .nf_errors
                .with_label_values(&[&router, e.category()])
                .inc();
            return true;
        }
    };

    let version = decoded.version.to_string();
    if legacy && decoded.version != 5 {
        tracing::debug!(router = %router, version = %version, "non-legacy datagram on nfl listener");
    }

    if decoded.templates > 0 {
        metrics
            .nf_templates
            .with_label_values(&[&router, &version, "template"])
            .inc_by(decoded.templates as u64);
    }
    if decoded.options_templates > 0 {
        metrics
            .nf_templates
            .with_label_values(&[&router, &version, "options_template"])
            .inc_by(decoded.options_templates as u64);
    }
    if decoded.unknown_templates > 0 {
        metrics
            .nf_errors
            .with_label_values(&[&router, "unknown_template"])
            .inc_by(decoded.unknown_templates as u64);
    }
    if !decoded.records.is_empty() {
        metrics
            .nf_count
            .with_label_values(&[&router, &version])
            .inc_by(decoded.records.len() as u64);
    }

    for mut record in decoded.records {
        if !record.contains(SAMPLER_ADDRESS) {
            record.set(SAMPLER_ADDRESS, router.as_str());
        }
        if tx.send(record).await.is_err() {
            return false;
        }
    }
    true
}

impl Ingester for UdpIngester {
    fn start(self: Box<Self>, cancel: CancellationToken) -> mpsc::Receiver<Record> {
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (decoded_tx, mut decoded_rx) = mpsc::channel(DECODER_BUFFER);

        // bridge between the decoder buffer and the stage channel
        tokio::spawn(async move {
            while let Some(record) = decoded_rx.recv().await {
                if out_tx.send(record).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(self.run(decoded_tx, cancel));

        out_rx
    }
}

fn bind_socket(addr: SocketAddr) -> std::io::Result<std::net::UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    if let Err(e) = socket.set_recv_buffer_size(SOCKET_RECV_BUFFER) {
        tracing::warn!(
            error = %e,
            requested_size = SOCKET_RECV_BUFFER,
            "failed to set UDP SO_RCVBUF"
        );
    }

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[cfg(test)]
#[path = "udp_test.rs"]
mod udp_test;
