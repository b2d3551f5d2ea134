//! The build-result notifier.
//!
//! A [`Notifier`] picks its transport once, when it is built, by walking
//! an ordered list of sources: platform discovery, explicit SMTP
//! configuration, explicit stub mode. The first source that yields a
//! working transport wins; if none does, mail is dropped with a warning.
//! Sends run on their own Tokio task and never fail past this boundary:
//! every outcome, including transport errors, comes back as a
//! [`SendResult`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use lettre::message::Mailboxes;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::MailerConfig;
use crate::discovery::{PaasDiscovery, SmtpDiscovery};
use crate::format::{self, EmailFormat};
use crate::smtp::{SmtpMailTransport, SmtpSettings};
use crate::stub::{NoopMailTransport, StubMailTransport};
use crate::traits::{MailError, MailMessage, MailTransport, SendResult};

/// Which transport a [`Notifier`] ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// SMTP settings reported by the hosting platform.
    DiscoveredSmtp,
    /// SMTP settings from the mailer config.
    ConfiguredSmtp,
    /// JSON stub, no network I/O.
    Stub,
    /// Nothing configured; mail is dropped.
    Noop,
    /// Supplied directly through [`Notifier::from_transport`].
    Custom,
}

/// Places a transport can come from, in priority order.
#[derive(Debug, Clone, Copy)]
enum TransportSource {
    Discovery,
    Config,
    Stub,
}

const SOURCE_CHAIN: [TransportSource; 3] = [
    TransportSource::Discovery,
    TransportSource::Config,
    TransportSource::Stub,
];

type Selected = (Arc<dyn MailTransport>, TransportKind);

impl TransportSource {
    /// `None` when this source has nothing to offer.
    fn select(
        self,
        config: &MailerConfig,
        discovery: &dyn SmtpDiscovery,
    ) -> Option<Result<Selected, MailError>> {
        match self {
            Self::Discovery => {
                let settings = discovery.discover()?;
                tracing::debug!(discovery = discovery.name(), ?settings, "using discovered SMTP transport");
                Some(smtp(settings, TransportKind::DiscoveredSmtp))
            }
            Self::Config => {
                let smtp_config = config.smtp.as_ref()?;
                let settings = SmtpSettings::from_config(smtp_config);
                tracing::debug!(?settings, "using SMTP transport from config");
                Some(smtp(settings, TransportKind::ConfiguredSmtp))
            }
            Self::Stub => {
                if !config.stub_smtp {
                    return None;
                }
                tracing::debug!("stubbing smtp");
                let stub: Arc<dyn MailTransport> = Arc::new(StubMailTransport::new());
                Some(Ok((stub, TransportKind::Stub)))
            }
        }
    }
}

fn smtp(settings: SmtpSettings, kind: TransportKind) -> Result<Selected, MailError> {
    let transport: Arc<dyn MailTransport> = Arc::new(SmtpMailTransport::new(settings)?);
    Ok((transport, kind))
}

/// A caller's request to send one email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    /// Explicit sender; falls back to the configured default.
    pub from: Option<String>,
}

impl Email {
    /// `to` may hold an address list such as `a@x.org, "Doe, Jane" <b@y.org>`.
    pub fn new(to: &str, subject: impl Into<String>) -> Self {
        Self::with_recipients(split_recipients(to), subject)
    }

    /// Recipients already split into individual addresses.
    pub fn with_recipients(to: Vec<String>, subject: impl Into<String>) -> Self {
        Self {
            to,
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    pub fn from(mut self, sender: impl Into<String>) -> Self {
        self.from = Some(sender.into());
        self
    }
}

/// Split an RFC 5322 address list into individual addresses.
///
/// Quoted display names may contain commas. A list that does not parse
/// is kept whole so delivery reports the bad address.
pub fn split_recipients(to: &str) -> Vec<String> {
    let to = to.trim();
    if to.is_empty() {
        return Vec::new();
    }
    match to.parse::<Mailboxes>() {
        Ok(mailboxes) => mailboxes.iter().map(ToString::to_string).collect(),
        Err(_) => vec![to.to_string()],
    }
}

/// Spawn onto the current Tokio runtime, if there is one.
fn spawn_on_runtime<F>(future: F) -> Result<JoinHandle<F::Output>, MailError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let runtime = Handle::try_current().map_err(|e| MailError::Aborted(e.to_string()))?;
    Ok(runtime.spawn(future))
}

/// Resolves to the outcome of a [`Notifier::send`].
#[derive(Debug)]
pub struct SendHandle {
    task: Result<JoinHandle<SendResult>, Option<MailError>>,
}

impl Future for SendHandle {
    type Output = SendResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.task {
            Ok(task) => Pin::new(task).poll(cx).map(|joined| {
                joined.unwrap_or_else(|e| Err(MailError::Aborted(e.to_string())))
            }),
            Err(spawn_error) => Poll::Ready(Err(spawn_error
                .take()
                .unwrap_or_else(|| MailError::Aborted("send handle polled after completion".to_string())))),
        }
    }
}

/// Sends build-result emails through the transport chosen at construction.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    kind: TransportKind,
    default_from: Option<String>,
    log_responses: bool,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("transport", &self.transport.transport_name())
            .field("kind", &self.kind)
            .field("default_from", &self.default_from)
            .finish()
    }
}

impl Notifier {
    /// Build a notifier, consulting platform variables in the environment first.
    pub fn new(config: MailerConfig) -> Self {
        Self::with_discovery(config, &PaasDiscovery::from_env())
    }

    /// Build a notifier with an explicit discovery source.
    pub fn with_discovery(config: MailerConfig, discovery: &dyn SmtpDiscovery) -> Self {
        let (transport, kind) = SOURCE_CHAIN
            .iter()
            .find_map(|source| match source.select(&config, discovery)? {
                Ok(selected) => Some(selected),
                Err(e) => {
                    tracing::warn!(?source, error = %e, "failed to configure mail transport");
                    None
                }
            })
            .unwrap_or_else(|| {
                tracing::warn!("no SMTP transport detected nor configured, emails will not be sent");
                let noop: Arc<dyn MailTransport> = Arc::new(NoopMailTransport);
                (noop, TransportKind::Noop)
            });

        Self {
            transport,
            kind,
            default_from: config.default_from().map(str::to_string),
            log_responses: config.stub_smtp,
        }
    }

    /// Wrap an existing transport.
    pub fn from_transport(transport: Arc<dyn MailTransport>, default_from: Option<String>) -> Self {
        Self {
            transport,
            kind: TransportKind::Custom,
            default_from,
            log_responses: false,
        }
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    pub fn transport_name(&self) -> &str {
        self.transport.transport_name()
    }

    pub fn default_from(&self) -> Option<&str> {
        self.default_from.as_deref()
    }

    /// Resolve the sender and produce the message handed to the transport.
    pub fn compose(&self, email: Email) -> MailMessage {
        MailMessage {
            from: email.from.or_else(|| self.default_from.clone()),
            to: email.to,
            subject: email.subject,
            text: email.text,
            html: email.html,
        }
    }

    /// Start sending `email` and return immediately.
    ///
    /// Outside a Tokio runtime the handle resolves to [`MailError::Aborted`].
    pub fn send(&self, email: Email) -> SendHandle {
        let task = spawn_on_runtime(self.delivery(email)).map_err(|e| {
            tracing::warn!(error = %e, "cannot schedule email send");
            Some(e)
        });
        SendHandle { task }
    }

    /// Start sending `email`; `callback` runs once with the outcome, after
    /// the transport has finished and never before this returns.
    ///
    /// Outside a Tokio runtime nothing is scheduled, the callback is
    /// dropped unused and [`MailError::Aborted`] is returned.
    pub fn send_with<F>(&self, email: Email, callback: F) -> Result<JoinHandle<()>, MailError>
    where
        F: FnOnce(SendResult) + Send + 'static,
    {
        let delivery = self.delivery(email);
        spawn_on_runtime(async move { callback(delivery.await) })
    }

    /// Send `email` and wait for the outcome.
    pub async fn deliver(&self, email: Email) -> SendResult {
        self.delivery(email).await
    }

    fn delivery(&self, email: Email) -> impl Future<Output = SendResult> + Send + 'static {
        let transport = Arc::clone(&self.transport);
        let log_responses = self.log_responses;
        let message = self.compose(email);

        async move {
            let result = transport.deliver(&message).await;
            match &result {
                Err(e) => tracing::warn!(
                    transport = transport.transport_name(),
                    subject = %message.subject,
                    error = %e,
                    "error sending email"
                ),
                Ok(response) if log_responses => {
                    tracing::debug!(
                        response = response.message.as_deref().unwrap_or("(none)"),
                        "stub response"
                    );
                }
                Ok(_) => {}
            }
            result
        }
    }

    /// See [`format::format_stdmerged`].
    pub fn format_stdmerged(&self, stdmerged: &str, email_format: impl Into<EmailFormat>) -> String {
        format::format_stdmerged(stdmerged, email_format)
    }

    /// See [`format::elapsed_time`].
    pub fn elapsed_time(&self, start_ms: i64, finish_ms: i64) -> String {
        format::elapsed_time(start_ms, finish_ms)
    }
}
