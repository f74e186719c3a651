//! Delivery through a pooled HTTP client.

use async_trait::async_trait;
use errbit_errors::ErrorRecord;
use errbit_notice::{Notice, NoticeOptions};
use errbit_shared::{ErrbitError, NOTICES_PATH, PROJECT_NAME, Result, VERSION};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, instrument};

use crate::{Delivery, Writer, http_scheme};

/// Writes notices with an HTTP POST.
///
/// Unlike [`SocketWriter`](crate::SocketWriter), transport failures are
/// returned: as an error in synchronous mode, or from the pending handle in
/// async mode.
#[derive(Debug, Clone)]
pub struct HttpWriter {
    client: Client,
}

impl HttpWriter {
    /// Writer with its own connection pool.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("{PROJECT_NAME}/{VERSION}"))
            .build()
            .map_err(|e| ErrbitError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Writer sharing an existing client and its pool.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Writer for HttpWriter {
    #[instrument(skip_all, fields(host = %options.config.host, port = options.config.port))]
    async fn write(&self, record: &ErrorRecord, options: &NoticeOptions) -> Result<Delivery> {
        let config = &options.config;
        let url = format!("{}{NOTICES_PATH}", http_scheme(config));
        let body = Notice::new(record, options).to_xml();
        debug!(%url, bytes = body.len(), async_mode = config.async_mode, "posting notice");

        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "text/xml")
            .header(ACCEPT, "text/xml, application/xml")
            .header(USER_AGENT, &config.agent)
            .timeout(config.connect_timeout + config.write_timeout)
            .body(body);

        if config.async_mode {
            let handle = tokio::spawn(async move {
                request
                    .send()
                    .await
                    .map_err(|e| ErrbitError::network(format!("POST {url} failed: {e}")))
            });
            return Ok(Delivery::Pending(handle));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ErrbitError::network(format!("POST {url} failed: {e}")))?;
        debug!(status = %response.status(), "notice delivered");
        Ok(Delivery::Response(response))
    }
}

#[cfg(test)]
mod tests {
    use errbit_shared::NotifierConfig;
    use wiremock::matchers::{body_string_contains, header, headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn options_for(server: &MockServer, async_mode: bool) -> NoticeOptions {
        let mut config = NotifierConfig::new("api-key-1", "127.0.0.1");
        config.port = Some(server.address().port());
        config.async_mode = Some(async_mode);
        config.agent = Some("errbitTest".into());
        NoticeOptions::new(config.resolve().expect("valid config"))
    }

    async fn mount_notices(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/notifier_api/v2/notices/"))
            .and(header("content-type", "text/xml"))
            .and(headers("accept", vec!["text/xml", "application/xml"]))
            .and(header("user-agent", "errbitTest"))
            .and(body_string_contains("<api-key>api-key-1</api-key>"))
            .respond_with(ResponseTemplate::new(201).set_body_string("<notice/>"))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn sync_post_returns_response() {
        let server = MockServer::start().await;
        mount_notices(&server).await;

        let record = ErrorRecord::error("boom", 3, "lib.rs");
        let delivery = HttpWriter::new()
            .expect("client")
            .write(&record, &options_for(&server, false))
            .await
            .expect("delivered");

        let response = match delivery {
            Delivery::Response(response) => response,
            other => panic!("expected a response, got {other:?}"),
        };
        assert_eq!(response.status().as_u16(), 201);
        assert_eq!(response.text().await.expect("body"), "<notice/>");
    }

    #[tokio::test]
    async fn async_post_returns_pending_handle() {
        let server = MockServer::start().await;
        mount_notices(&server).await;

        let record = ErrorRecord::error("boom", 3, "lib.rs");
        let delivery = HttpWriter::with_client(Client::new())
            .write(&record, &options_for(&server, true))
            .await
            .expect("spawned");

        let handle = match delivery {
            Delivery::Pending(handle) => handle,
            other => panic!("expected a pending handle, got {other:?}"),
        };
        let response = handle.await.expect("task").expect("delivered");
        assert_eq!(response.status().as_u16(), 201);
    }

    #[tokio::test]
    async fn error_status_is_still_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let record = ErrorRecord::notice("n", 1, "");
        let delivery = HttpWriter::new()
            .expect("client")
            .write(&record, &options_for(&server, false))
            .await
            .expect("delivered");
        assert!(matches!(delivery, Delivery::Response(r) if r.status().as_u16() == 422));
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_network_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let mut config = NotifierConfig::new("k", "127.0.0.1");
        config.port = Some(port);
        config.connect_timeout = Some(1);
        config.write_timeout = Some(1);
        let options = NoticeOptions::new(config.resolve().expect("valid config"));

        let record = ErrorRecord::error("boom", 1, "main.rs");
        let err = HttpWriter::new()
            .expect("client")
            .write(&record, &options)
            .await
            .expect_err("nothing is listening");
        assert!(matches!(err, ErrbitError::Network(_)));
    }
}
