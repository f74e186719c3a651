//! Errbit notifier client.
//!
//! This crate ties the error model, notice builder and transport writers
//! into the caller-facing API:
//! - [`Errbit`] — configure, set a writer, register observers, notify
//! - [`Handlers`] — runtime error codes and panics routed to a client
//!
//! ```no_run
//! use errbit_core::{Errbit, ErrorRecord, NotifierConfig, NotifyOptions};
//!
//! # async fn run() -> errbit_core::Result<()> {
//! let mut client = Errbit::new(NotifierConfig::new("api-key", "errbit.example.com"));
//! client.on_notify(|record, config| println!("sent {record} to {}", config.host));
//!
//! let record = ErrorRecord::error("Undefined index: user", 42, "src/main.rs");
//! client.notify(&record, NotifyOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod handlers;

pub use client::{Errbit, NotifyObserver, NotifyOptions};
pub use handlers::{Handlers, PANIC_CLASS, panic_record};

// Re-exported so hosts depend on one crate.
pub use errbit_errors::{ErrorCode, ErrorDetails, ErrorRecord, StackFrame};
pub use errbit_notice::{RequestContext, SharedVars, Var, Vars};
pub use errbit_shared::{ErrbitError, NotifierConfig, ResolvedConfig, Result, WriterKind};
pub use errbit_writer::{Delivery, HttpWriter, SocketWriter, Writer};
