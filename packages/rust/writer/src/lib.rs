//! Transport writers for the Errbit notifier.
//!
//! This crate provides:
//! - [`Writer`] — the delivery strategy trait
//! - [`SocketWriter`] — raw TCP/TLS/UDP delivery, never fails
//! - [`HttpWriter`] — delivery through a pooled `reqwest` client
//! - [`Delivery`] — what a notify attempt produced

mod http;
mod socket;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use errbit_errors::ErrorRecord;
use errbit_notice::NoticeOptions;
use errbit_shared::{ResolvedConfig, Result, WriterKind};
use tokio::task::JoinHandle;

pub use http::HttpWriter;
pub use socket::{CHUNK_SIZE, ChunkEnvelope, SocketWriter, build_payload, frame_payload};

/// Outcome of one notify call.
#[derive(Debug)]
pub enum Delivery {
    /// A skip rule matched; nothing was written.
    Skipped,
    /// Written by a writer that does not report results.
    Discarded,
    /// Response of a synchronous HTTP delivery.
    Response(reqwest::Response),
    /// In-flight asynchronous HTTP delivery. Awaiting it is up to the caller.
    Pending(JoinHandle<Result<reqwest::Response>>),
}

impl Delivery {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// A strategy for delivering notices.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Render `record` with `options` and deliver it.
    async fn write(&self, record: &ErrorRecord, options: &NoticeOptions) -> Result<Delivery>;
}

/// Instantiate the writer named by `default_writer`.
pub fn writer_for(kind: WriterKind) -> Result<Arc<dyn Writer>> {
    Ok(match kind {
        WriterKind::Socket => Arc::new(SocketWriter::new()),
        WriterKind::Http => Arc::new(HttpWriter::new()?),
    })
}

// ---------------------------------------------------------------------------
// Connection schemes
// ---------------------------------------------------------------------------

/// Transport used by [`SocketWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tls,
    Tcp,
}

impl Transport {
    /// Async mode wins over `secure`.
    pub fn for_config(config: &ResolvedConfig) -> Self {
        if config.async_mode {
            Self::Udp
        } else if config.secure {
            Self::Tls
        } else {
            Self::Tcp
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tls => write!(f, "ssl"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// `udp://host`, `ssl://host` or `tcp://host`.
pub fn socket_scheme(config: &ResolvedConfig) -> String {
    format!("{}://{}", Transport::for_config(config), config.host)
}

/// `https://host:port` or `http://host:port`.
pub fn http_scheme(config: &ResolvedConfig) -> String {
    let proto = if config.secure { "https" } else { "http" };
    format!("{proto}://{}:{}", config.host, config.port)
}

#[cfg(test)]
mod tests {
    use errbit_shared::NotifierConfig;

    use super::*;

    fn resolve(f: impl FnOnce(&mut NotifierConfig)) -> ResolvedConfig {
        let mut config = NotifierConfig::new("k", "h");
        f(&mut config);
        config.resolve().expect("valid config")
    }

    #[test]
    fn socket_scheme_selection() {
        assert_eq!(socket_scheme(&resolve(|_| {})), "tcp://h");
        assert_eq!(socket_scheme(&resolve(|c| c.secure = Some(true))), "ssl://h");
        assert_eq!(
            socket_scheme(&resolve(|c| {
                c.secure = Some(true);
                c.async_mode = Some(true);
            })),
            "udp://h"
        );
    }

    #[test]
    fn http_scheme_includes_port() {
        let config = resolve(|c| {
            c.secure = Some(true);
            c.port = Some(443);
        });
        assert_eq!(http_scheme(&config), "https://h:443");
        assert_eq!(http_scheme(&resolve(|_| {})), "http://h:80");
        assert_eq!(http_scheme(&resolve(|c| c.port = Some(8080))), "http://h:8080");
    }

    #[test]
    fn writer_for_each_kind() {
        assert!(writer_for(WriterKind::Socket).is_ok());
        assert!(writer_for(WriterKind::Http).is_ok());
    }
}
