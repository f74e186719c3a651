//! The notifier client: configuration, skip rules, writer dispatch and
//! observers.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, instrument, warn};

use errbit_errors::ErrorRecord;
use errbit_notice::{NoticeOptions, RequestContext};
use errbit_shared::{NotifierConfig, ResolvedConfig, Result, WriterKind};
use errbit_writer::{Delivery, Writer};

/// Callback run after every written notice.
pub type NotifyObserver = Arc<dyn Fn(&ErrorRecord, &ResolvedConfig) + Send + Sync>;

/// Per-call overrides for [`Errbit::notify`].
#[derive(Debug, Clone, Default)]
pub struct NotifyOptions {
    /// Merged over the client's persistent configuration.
    pub config: NotifierConfig,
    /// Merged over the client's ambient request context.
    pub request: RequestContext,
}

impl NotifyOptions {
    pub fn with_config(mut self, config: NotifierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = request;
        self
    }
}

/// An Errbit notifier.
///
/// Configuration and writer changes take `&mut self`; [`notify`](Self::notify)
/// takes `&self`, so a configured client can be shared as `Arc<Errbit>`.
pub struct Errbit {
    config: NotifierConfig,
    request: RequestContext,
    writer: Option<Arc<dyn Writer>>,
    default_writers: Mutex<Vec<(WriterKind, Arc<dyn Writer>)>>,
    observers: Vec<NotifyObserver>,
}

impl Errbit {
    /// Client with `config` as its persistent configuration. Validation is
    /// deferred to [`configure`](Self::configure) and every notify.
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config,
            request: RequestContext::default(),
            writer: None,
            default_writers: Mutex::new(Vec::new()),
            observers: Vec::new(),
        }
    }

    /// Merge `patch` into the persistent configuration.
    ///
    /// The merged result is validated first; on error nothing changes.
    pub fn configure(&mut self, patch: NotifierConfig) -> Result<&mut Self> {
        let merged = self.config.merged(&patch);
        merged.resolve()?;
        self.config = merged;
        Ok(self)
    }

    /// Persistent configuration as set so far.
    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Validated persistent configuration with every default filled.
    pub fn resolved_config(&self) -> Result<ResolvedConfig> {
        self.config.resolve()
    }

    /// Use `writer` for every notice instead of the configured default.
    pub fn set_writer(&mut self, writer: Arc<dyn Writer>) -> &mut Self {
        self.writer = Some(writer);
        self
    }

    /// Ambient request context, merged under each call's own.
    pub fn set_request_context(&mut self, request: RequestContext) -> &mut Self {
        self.request = request;
        self
    }

    pub fn request_context(&self) -> &RequestContext {
        &self.request
    }

    /// Register an observer, called with the record and the resolved config
    /// after each write attempt. Skipped notices do not reach observers.
    pub fn on_notify<F>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(&ErrorRecord, &ResolvedConfig) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Report `record`.
    ///
    /// Returns a configuration error before any I/O if the merged
    /// configuration is invalid, and [`Delivery::Skipped`] if a skip rule
    /// matches. Otherwise the writer's result is returned after observers ran.
    #[instrument(skip_all, fields(class = %record.class_name()))]
    pub async fn notify(&self, record: &ErrorRecord, options: NotifyOptions) -> Result<Delivery> {
        let config = self.config.merged(&options.config).resolve()?;
        let request = self.request.merged(&options.request);

        if let Some(skipped) = config
            .skipped_exceptions
            .iter()
            .find(|t| record.is_type(t))
        {
            debug!(%skipped, "error type is skipped");
            return Ok(Delivery::Skipped);
        }

        if let Some(agent) = request
            .user_agent()
            .filter(|ua| config.is_ignored_user_agent(ua))
        {
            debug!(%agent, "user agent is ignored");
            return Ok(Delivery::Skipped);
        }

        let writer = self.writer_for(config.default_writer)?;
        let options = NoticeOptions { config, request };
        let result = writer.write(record, &options).await;
        if let Err(e) = &result {
            warn!(error = %e, "notice delivery failed");
        }

        for observer in &self.observers {
            observer(record, &options.config);
        }

        result
    }

    /// Report any `std::error::Error` as an exception.
    pub async fn notify_error<E>(&self, err: &E) -> Result<Delivery>
    where
        E: std::error::Error + ?Sized + 'static,
    {
        let record = ErrorRecord::from_error(err);
        self.notify(&record, NotifyOptions::default()).await
    }

    fn writer_for(&self, kind: WriterKind) -> Result<Arc<dyn Writer>> {
        if let Some(writer) = &self.writer {
            return Ok(Arc::clone(writer));
        }

        let mut cache = self
            .default_writers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((_, writer)) = cache.iter().find(|(k, _)| *k == kind) {
            return Ok(Arc::clone(writer));
        }

        debug!(%kind, "creating default writer");
        let writer = errbit_writer::writer_for(kind)?;
        cache.push((kind, Arc::clone(&writer)));
        Ok(writer)
    }
}

impl fmt::Debug for Errbit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Errbit")
            .field("config", &self.config)
            .field("request", &self.request)
            .field("custom_writer", &self.writer.is_some())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use errbit_notice::Vars;
    use errbit_shared::ErrbitError;

    use super::*;

    /// Writer that records what it was asked to send.
    #[derive(Default)]
    pub(crate) struct RecordingWriter {
        pub(crate) writes: Mutex<Vec<(ErrorRecord, NoticeOptions)>>,
        pub(crate) fail: bool,
    }

    impl RecordingWriter {
        pub(crate) fn count(&self) -> usize {
            self.writes.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl Writer for RecordingWriter {
        async fn write(&self, record: &ErrorRecord, options: &NoticeOptions) -> Result<Delivery> {
            self.writes
                .lock()
                .expect("lock")
                .push((record.clone(), options.clone()));
            if self.fail {
                Err(ErrbitError::network("connection reset"))
            } else {
                Ok(Delivery::Discarded)
            }
        }
    }

    pub(crate) fn client_with(
        config: NotifierConfig,
        writer: &Arc<RecordingWriter>,
    ) -> (Errbit, Arc<AtomicUsize>) {
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&observed);
        let mut client = Errbit::new(config);
        client
            .set_writer(Arc::clone(writer) as Arc<dyn Writer>)
            .on_notify(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        (client, observed)
    }

    #[tokio::test]
    async fn skipped_type_never_reaches_writer() {
        let writer = Arc::new(RecordingWriter::default());
        let mut config = NotifierConfig::new("k", "h");
        config.skipped_exceptions = Some(vec!["Notice".into()]);
        let (client, observed) = client_with(config, &writer);

        let delivery = client
            .notify(&ErrorRecord::notice("T", 8, "test.php"), NotifyOptions::default())
            .await
            .expect("notify returns normally");

        assert!(delivery.is_skipped());
        assert_eq!(writer.count(), 0);
        assert_eq!(observed.load(Ordering::SeqCst), 0);

        client
            .notify(&ErrorRecord::warning("W", 1, ""), NotifyOptions::default())
            .await
            .expect("warning is sent");
        assert_eq!(writer.count(), 1);
    }

    #[tokio::test]
    async fn skip_list_matches_full_type_path() {
        let writer = Arc::new(RecordingWriter::default());
        let mut config = NotifierConfig::new("k", "h");
        config.skipped_exceptions = Some(vec!["app::errors::NotFound".into()]);
        let (client, _) = client_with(config, &writer);

        let record = ErrorRecord::exception(
            "app::errors::NotFound",
            errbit_errors::ErrorDetails::new("missing"),
        );
        let delivery = client
            .notify(&record, NotifyOptions::default())
            .await
            .expect("notify");
        assert!(delivery.is_skipped());
    }

    #[tokio::test]
    async fn ignored_user_agent_is_skipped() {
        let writer = Arc::new(RecordingWriter::default());
        let mut config = NotifierConfig::new("k", "h");
        config.ignore_user_agent = Some(vec!["Googlebot".into()]);
        let (mut client, observed) = client_with(config, &writer);
        client.set_request_context(RequestContext::new().with_cgi_data(
            Vars::new().with("HTTP_USER_AGENT", "Mozilla/5.0 (compatible; Googlebot/2.1)"),
        ));

        let record = ErrorRecord::error("boom", 1, "a.rs");
        let delivery = client
            .notify(&record, NotifyOptions::default())
            .await
            .expect("notify");
        assert!(delivery.is_skipped());
        assert_eq!(writer.count(), 0);
        assert_eq!(observed.load(Ordering::SeqCst), 0);

        // A per-call context replaces the ambient CGI data.
        let options = NotifyOptions::default().with_request(
            RequestContext::new().with_cgi_data(Vars::new().with("HTTP_USER_AGENT", "curl/8")),
        );
        client.notify(&record, options).await.expect("notify");
        assert_eq!(writer.count(), 1);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_io() {
        let writer = Arc::new(RecordingWriter::default());
        let (client, observed) = client_with(NotifierConfig::default(), &writer);

        let err = client
            .notify(&ErrorRecord::error("boom", 1, ""), NotifyOptions::default())
            .await
            .expect_err("api_key is missing");
        assert!(err.is_config());
        assert_eq!(writer.count(), 0);
        assert_eq!(observed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn per_call_options_are_merged() {
        let writer = Arc::new(RecordingWriter::default());
        let (mut client, observed) = client_with(NotifierConfig::new("k", "h"), &writer);
        client.set_request_context(RequestContext::new().with_controller("Orders"));

        let mut per_call = NotifierConfig::default();
        per_call.environment_name = Some("production".into());
        let options = NotifyOptions::default()
            .with_config(per_call)
            .with_request(RequestContext::new().with_action("create"));
        client
            .notify(&ErrorRecord::error("boom", 1, ""), options)
            .await
            .expect("notify");

        let writes = writer.writes.lock().expect("lock");
        let (_, sent) = &writes[0];
        assert_eq!(sent.config.environment_name, "production");
        assert_eq!(sent.config.api_key, "k");
        assert_eq!(sent.request.controller.as_deref(), Some("Orders"));
        assert_eq!(sent.request.action.as_deref(), Some("create"));
        assert_eq!(observed.load(Ordering::SeqCst), 1);
        // Persistent config is untouched.
        assert_eq!(client.config().environment_name, None);
    }

    #[tokio::test]
    async fn observers_run_when_write_fails() {
        let writer = Arc::new(RecordingWriter {
            fail: true,
            ..RecordingWriter::default()
        });
        let (client, observed) = client_with(NotifierConfig::new("k", "h"), &writer);

        let result = client
            .notify(&ErrorRecord::error("boom", 1, ""), NotifyOptions::default())
            .await;
        assert!(matches!(result, Err(ErrbitError::Network(_))));
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn observers_receive_record_and_resolved_config() {
        let writer = Arc::new(RecordingWriter::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut client = Errbit::new(NotifierConfig::new("k", "h"));
        client
            .set_writer(writer)
            .on_notify(move |record, config| {
                sink.lock()
                    .expect("lock")
                    .push(format!("{record} @ {}:{}", config.host, config.port));
            });

        client
            .notify(&ErrorRecord::fatal("oom", 1, ""), NotifyOptions::default())
            .await
            .expect("notify");
        assert_eq!(*seen.lock().expect("lock"), ["Fatal Error: oom @ h:80"]);
    }

    #[tokio::test]
    async fn notify_error_uses_the_error_type() {
        #[derive(Debug, thiserror::Error)]
        #[error("payment declined")]
        struct PaymentDeclined;

        let writer = Arc::new(RecordingWriter::default());
        let (client, _) = client_with(NotifierConfig::new("k", "h"), &writer);
        client.notify_error(&PaymentDeclined).await.expect("notify");

        let writes = writer.writes.lock().expect("lock");
        assert_eq!(writes[0].0.class_name(), "PaymentDeclined");
        assert_eq!(writes[0].0.message(), "payment declined");
    }

    #[tokio::test]
    async fn notify_error_accepts_boxed_errors() {
        let writer = Arc::new(RecordingWriter::default());
        let (client, _) = client_with(NotifierConfig::new("k", "h"), &writer);
        let err: Box<dyn std::error::Error + Send + Sync> = "socket closed".into();
        client.notify_error(err.as_ref()).await.expect("notify");

        let writes = writer.writes.lock().expect("lock");
        assert_eq!(writes[0].0.class_name(), "Error");
        assert_eq!(writes[0].0.message(), "socket closed");
    }

    #[test]
    fn configure_validates_and_fills_defaults() {
        let mut client = Errbit::new(NotifierConfig::default());
        let err = client
            .configure(NotifierConfig {
                host: Some("h".into()),
                ..NotifierConfig::default()
            })
            .expect_err("api_key is missing");
        assert!(err.is_config());
        assert_eq!(client.config().host, None);

        client
            .configure(NotifierConfig::new("k", "h"))
            .expect("valid");
        let resolved = client.resolved_config().expect("valid");
        assert_eq!((resolved.port, resolved.secure), (80, false));

        client
            .configure(NotifierConfig {
                port: Some(443),
                ..NotifierConfig::default()
            })
            .expect("valid");
        let resolved = client.resolved_config().expect("valid");
        assert_eq!((resolved.port, resolved.secure), (443, true));
    }

    #[tokio::test]
    async fn default_writer_is_created_lazily() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let mut config = NotifierConfig::new("k", "127.0.0.1");
        config.port = Some(port);
        config.connect_timeout = Some(1);
        let client = Errbit::new(config);

        let record = ErrorRecord::error("boom", 1, "");
        for _ in 0..2 {
            let delivery = client
                .notify(&record, NotifyOptions::default())
                .await
                .expect("socket writer swallows failures");
            assert!(matches!(delivery, Delivery::Discarded));
        }
        assert_eq!(client.default_writers.lock().expect("lock").len(), 1);
    }
}
