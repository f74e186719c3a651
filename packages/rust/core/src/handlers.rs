//! Entry points for host-level error hooks.

use std::panic::PanicHookInfo;
use std::sync::Arc;

use tracing::warn;

use errbit_errors::{ErrorCode, ErrorDetails, ErrorRecord, StackFrame, capture_backtrace, convert};
use errbit_shared::Result;
use errbit_writer::Delivery;

use crate::client::{Errbit, NotifyOptions};

/// Class reported for panics.
pub const PANIC_CLASS: &str = "Panic";

/// Routes runtime errors and panics to a shared client.
#[derive(Debug, Clone)]
pub struct Handlers {
    client: Arc<Errbit>,
}

impl Handlers {
    pub fn new(client: Arc<Errbit>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<Errbit> {
        &self.client
    }

    /// Classify a raw runtime error code and report it.
    pub async fn on_error(
        &self,
        code: impl Into<ErrorCode>,
        message: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        backtrace: Vec<StackFrame>,
    ) -> Result<Delivery> {
        let record = convert(code, message, None, file, line, backtrace);
        self.client.notify(&record, NotifyOptions::default()).await
    }

    /// Report every panic before the previously installed hook runs.
    ///
    /// Inside a tokio runtime the report is spawned onto it; elsewhere it is
    /// sent on a private current-thread runtime before the hook returns.
    pub fn install_panic_hook(&self) {
        let client = Arc::clone(&self.client);
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            report_panic(&client, panic_record(info));
            previous(info);
        }));
    }
}

/// Build the record for a panic: payload message, location and backtrace.
pub fn panic_record(info: &PanicHookInfo<'_>) -> ErrorRecord {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Box<dyn Any>".to_string());

    let mut details = ErrorDetails::new(message).with_backtrace(capture_backtrace());
    if let Some(location) = info.location() {
        details = details.at(location.file(), location.line());
    }
    ErrorRecord::exception(PANIC_CLASS, details)
}

fn report_panic(client: &Arc<Errbit>, record: ErrorRecord) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        let client = Arc::clone(client);
        handle.spawn(async move {
            if let Err(e) = client.notify(&record, NotifyOptions::default()).await {
                warn!(error = %e, "failed to report panic");
            }
        });
        return;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "no runtime to report panic");
            return;
        }
    };
    if let Err(e) = runtime.block_on(client.notify(&record, NotifyOptions::default())) {
        warn!(error = %e, "failed to report panic");
    }
}
