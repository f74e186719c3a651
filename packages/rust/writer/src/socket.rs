//! Raw socket delivery.
//!
//! Synchronous mode frames the notice as an HTTP/1.1 POST over TCP (or TLS
//! when `secure`). Async mode sends the bare XML over UDP, split into JSON
//! chunk envelopes when it exceeds [`CHUNK_SIZE`]. Failures are logged and
//! never returned.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use errbit_errors::ErrorRecord;
use errbit_notice::{Notice, NoticeOptions};
use errbit_shared::{NOTICES_PATH, ResolvedConfig, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{Delivery, Transport, Writer};

/// Largest async payload sent in one datagram; larger ones are chunked.
pub const CHUNK_SIZE: usize = 7000;

/// One piece of a chunked async payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEnvelope {
    pub messageid: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<bool>,
}

/// Writes notices straight to a socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketWriter;

impl SocketWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Writer for SocketWriter {
    #[instrument(skip_all, fields(host = %options.config.host, port = options.config.port))]
    async fn write(&self, record: &ErrorRecord, options: &NoticeOptions) -> Result<Delivery> {
        let config = &options.config;
        let payload = build_payload(record, options);

        match frame_payload(&payload, config) {
            Ok(frames) => {
                debug!(
                    transport = %Transport::for_config(config),
                    bytes = payload.len(),
                    frames = frames.len(),
                    "sending notice"
                );
                if let Err(e) = deliver(&frames, config).await {
                    warn!(error = %e, "socket delivery failed");
                }
            }
            Err(e) => warn!(error = %e, "failed to frame notice"),
        }

        Ok(Delivery::Discarded)
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Notice XML, wrapped in an HTTP/1.1 request unless in async mode.
pub fn build_payload(record: &ErrorRecord, options: &NoticeOptions) -> String {
    let body = Notice::new(record, options).to_xml();
    let config = &options.config;
    if config.async_mode {
        return body;
    }

    let headers = [
        format!("POST {NOTICES_PATH} HTTP/1.1"),
        format!("Host: {}", config.host),
        format!("User-Agent: {}", config.agent),
        "Content-Type: text/xml".to_string(),
        "Accept: text/xml, application/xml".to_string(),
        format!("Content-Length: {}", body.len()),
        "Connection: close".to_string(),
    ];
    format!("{}\r\n\r\n{body}", headers.join("\r\n"))
}

/// Split an async payload over [`CHUNK_SIZE`] bytes into serialized
/// [`ChunkEnvelope`]s sharing one message id. Anything else is sent as is.
pub fn frame_payload(payload: &str, config: &ResolvedConfig) -> serde_json::Result<Vec<String>> {
    if !config.async_mode || payload.len() <= CHUNK_SIZE {
        return Ok(vec![payload.to_string()]);
    }

    let messageid = Uuid::now_v7().simple().to_string();
    let chunks = split_chunks(payload, CHUNK_SIZE);
    let count = chunks.len();

    chunks
        .into_iter()
        .enumerate()
        .map(|(idx, data)| {
            serde_json::to_string(&ChunkEnvelope {
                messageid: messageid.clone(),
                data: data.to_string(),
                last: (idx + 1 == count).then_some(true),
            })
        })
        .collect()
}

/// Split into pieces of at most `max` bytes without cutting a character.
fn split_chunks(input: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < input.len() {
        let mut end = (start + max).min(input.len());
        while !input.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // `max` is smaller than the next character.
            end = start + input[start..].chars().next().map_or(1, char::len_utf8);
        }
        chunks.push(&input[start..end]);
        start = end;
    }
    chunks
}

// ---------------------------------------------------------------------------
// I/O
// ---------------------------------------------------------------------------

async fn deliver(frames: &[String], config: &ResolvedConfig) -> io::Result<()> {
    let addr = (config.host.as_str(), config.port);
    let drain = if frames.len() == 1 {
        config.proxy_read_bytes
    } else {
        None
    };

    match Transport::for_config(config) {
        Transport::Udp => {
            let target = bounded(config.connect_timeout, resolve(&config.host, config.port)).await?;
            let local: SocketAddr = if target.is_ipv4() {
                ([0, 0, 0, 0], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };
            let socket = UdpSocket::bind(local).await?;
            socket.connect(target).await?;
            for frame in frames {
                bounded(config.write_timeout, socket.send(frame.as_bytes())).await?;
            }
            Ok(())
        }
        Transport::Tcp => {
            let stream = bounded(config.connect_timeout, TcpStream::connect(addr)).await?;
            write_frames(stream, frames, drain, config.write_timeout).await
        }
        Transport::Tls => {
            let stream = bounded(config.connect_timeout, async {
                let tcp = TcpStream::connect(addr).await?;
                let server_name = ServerName::try_from(config.host.clone())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                tls_connector()?.connect(server_name, tcp).await
            })
            .await?;
            write_frames(stream, frames, drain, config.write_timeout).await
        }
    }
}

async fn write_frames<S>(
    mut stream: S,
    frames: &[String],
    drain: Option<usize>,
    write_timeout: Duration,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for frame in frames {
        bounded(write_timeout, stream.write_all(frame.as_bytes())).await?;
    }
    bounded(write_timeout, stream.flush()).await?;

    if let Some(limit) = drain {
        let read = drain_response(&mut stream, limit, write_timeout).await;
        debug!(read, "drained response bytes");
    }

    // Close errors are irrelevant once the payload is out.
    let _ = bounded(write_timeout, stream.shutdown()).await;
    Ok(())
}

/// Read and discard up to `limit` response bytes, giving up after
/// `deadline`. Returns how many bytes were read.
async fn drain_response<S>(stream: &mut S, limit: usize, deadline: Duration) -> usize
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; limit.min(8192)];
    let mut total = 0;
    let read_loop = async {
        while total < limit {
            let want = (limit - total).min(buf.len());
            match stream.read(&mut buf[..want]).await {
                Ok(0) | Err(_) => break,
                Ok(n) => total += n,
            }
        }
    };
    let _ = timeout(deadline, read_loop).await;
    total
}

async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}")))
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    timeout(limit, fut)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "socket operation timed out"))?
}

fn tls_connector() -> io::Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(io::Error::other)?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}
