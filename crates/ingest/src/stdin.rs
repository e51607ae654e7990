//! Framed stdin sources: line-delimited JSON and varint-length-prefixed
//! protobuf.
//!
//! Both are generic over any `AsyncRead`, so tests feed them in-memory
//! buffers while the collector hands them `tokio::io::stdin()`. Reaching
//! the end of input closes the output channel, which shuts the pipeline
//! down cleanly.

use prost::Message;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use flowkube_pipeline::{Ingester, CHANNEL_CAPACITY};
use flowkube_record::Record;

use crate::pb::{render_message, FlowMessage};

/// Reads one JSON object per line
pub struct JsonLineIngester<R> {
    input: R,
}

impl<R> JsonLineIngester<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R> Ingester for JsonLineIngester<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn start(self: Box<Self>, cancel: CancellationToken) -> mpsc::Receiver<Record> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut lines = BufReader::new(self.input).lines();
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,

                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if line.is_empty() {
                                continue;
                            }
                            match Record::from_json(&line) {
                                Ok(record) => {
                                    if tx.send(record).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "can't read record, skipping line");
                                }
                            }
                        }
                        Ok(None) => {
                            tracing::info!("reached end of input, stopping");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "input read error, stopping");
                            break;
                        }
                    },
                }
            }
        });
        rx
    }
}

/// Reads varint-length-prefixed protobuf flow messages
pub struct ProtobufIngester<R> {
    input: R,
}

impl<R> ProtobufIngester<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R> Ingester for ProtobufIngester<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn start(self: Box<Self>, cancel: CancellationToken) -> mpsc::Receiver<Record> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut input = BufReader::new(self.input);
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,

                    message = next_message(&mut input) => match message {
                        Ok(Some(record)) => {
                            if tx.send(record).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {
                            tracing::info!("reached end of input, stopping");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "can't read record, stopping");
                            break;
                        }
                    },
                }
            }
        });
        rx
    }
}

/// Read one length-prefixed message; `Ok(None)` on a clean end-of-stream
/// (EOF before the first length byte).
async fn next_message<R>(input: &mut R) -> Result<Option<Record>, ProtobufReadError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let len = match read_varint(input).await? {
        Some(len) => len as usize,
        None => return Ok(None),
    };
    if len > crate::netflow::MAX_DATAGRAM {
        return Err(ProtobufReadError::OversizedMessage { len });
    }

    let mut body = vec![0u8; len];
    input.read_exact(&mut body).await?;

    let message = FlowMessage::decode(body.as_slice())?;
    Ok(Some(render_message(&message)))
}

/// Decode a varint; `Ok(None)` when the stream ends at or inside the
/// length header (a short read of the varint is a normal end-of-stream).
async fn read_varint<R>(input: &mut R) -> Result<Option<u64>, ProtobufReadError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = match input.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(Some(value));
        }
        shift += 7;
        if shift >= 64 {
            return Err(ProtobufReadError::BadVarint);
        }
    }
}

/// Errors while reading the protobuf stream
#[derive(Debug, thiserror::Error)]
pub enum ProtobufReadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse message length")]
    BadVarint,

    #[error("message length {len} exceeds limit")]
    OversizedMessage { len: usize },

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

#[cfg(test)]
#[path = "stdin_test.rs"]
mod stdin_test;
