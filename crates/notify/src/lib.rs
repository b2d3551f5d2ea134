//! Build-result email notifications for CI jobs.
//!
//! This crate provides:
//! - `Notifier`, which picks a mail transport once (platform discovery,
//!   explicit SMTP config, stub, or no-op) and sends through it
//! - `MailTransport` trait with SMTP (`lettre`), stub and no-op implementations
//! - Helpers that turn job output and timings into email-ready text

pub mod config;
pub mod discovery;
pub mod format;
pub mod notifier;
pub mod smtp;
pub mod stub;
pub mod traits;

pub use config::{MailerConfig, SmtpAuth, SmtpConfig, SmtpSecurity};
pub use discovery::{NoDiscovery, PaasDiscovery, SmtpDiscovery};
pub use format::{elapsed_between, elapsed_time, format_stdmerged, EmailFormat};
pub use notifier::{Email, Notifier, SendHandle, TransportKind};
pub use smtp::{SmtpMailTransport, SmtpSettings};
pub use stub::{NoopMailTransport, StubMailTransport};
pub use traits::{MailError, MailMessage, MailTransport, SendResponse, SendResult};
