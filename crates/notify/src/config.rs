use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::format::EmailFormat;
use crate::traits::MailError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

pub(crate) const DEFAULT_SMTP_PORT: u16 = 587;

fn default_port() -> u16 {
    DEFAULT_SMTP_PORT
}

/// Accepts either `587` or `"587"`.
fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(n) => Ok(n),
        PortRepr::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid SMTP port '{s}'"))),
    }
}

// ── Top-level config ──────────────────────────────────────────

/// Mailer configuration, as consumed by [`crate::Notifier`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Explicit SMTP settings. Absent means "not configured".
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    /// Use the stub transport (no network I/O) when nothing else is configured.
    #[serde(default, alias = "stubSmtp")]
    pub stub_smtp: bool,
    /// Body format for log excerpts. Only `"plaintext"` opts out of HTML.
    #[serde(default, alias = "emailFormat")]
    pub email_format: EmailFormat,
}

impl MailerConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `BUILDMAIL_PROFILE`. When set (e.g. `CI`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_opt("BUILDMAIL_PROFILE").unwrap_or_default().to_uppercase();
        Self::from_env_profiled(&profile)
    }

    pub fn from_env_profiled(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            smtp: SmtpConfig::from_env_profiled(p),
            stub_smtp: profiled_env_bool(p, "SMTP_STUB"),
            email_format: profiled_env_opt(p, "EMAIL_FORMAT")
                .map(EmailFormat::from)
                .unwrap_or_default(),
        }
    }

    /// Load config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MailError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MailError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "loading mailer config");
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, MailError> {
        toml::from_str(content).map_err(|e| MailError::Config(e.to_string()))
    }

    /// Default sender taken from the explicit SMTP settings.
    pub fn default_from(&self) -> Option<&str> {
        self.smtp.as_ref().and_then(|s| s.from.as_deref())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        match &self.smtp {
            Some(smtp) => tracing::info!(
                host = %smtp.host,
                port = smtp.port,
                security = %smtp.security,
                authenticated = smtp.auth.as_ref().is_some_and(SmtpAuth::is_complete),
                from = smtp.from.as_deref().unwrap_or("(none)"),
                email_format = %self.email_format,
                "mailer config: smtp"
            ),
            None if self.stub_smtp => tracing::info!("mailer config: stub transport"),
            None => tracing::info!("mailer config: no smtp settings"),
        }
    }
}

// ── SMTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: Option<SmtpAuth>,
    /// Default sender address.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub security: SmtpSecurity,
    /// Connection/command timeout. `None` keeps the transport default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
            from: None,
            security: SmtpSecurity::default(),
            timeout_secs: None,
        }
    }

    fn from_env_profiled(p: &str) -> Option<Self> {
        let host = profiled_env_opt(p, "SMTP_HOST")?;
        let user = profiled_env_opt(p, "SMTP_USER");
        let pass = profiled_env_opt(p, "SMTP_PASS");
        let auth = (user.is_some() || pass.is_some()).then_some(SmtpAuth { user, pass });

        let security = match profiled_env_opt(p, "SMTP_SECURITY") {
            Some(raw) => raw.parse::<SmtpSecurity>().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring SMTP_SECURITY");
                SmtpSecurity::default()
            }),
            None => SmtpSecurity::default(),
        };

        Some(Self {
            host,
            port: profiled_env_u16(p, "SMTP_PORT", DEFAULT_SMTP_PORT),
            auth,
            from: profiled_env_opt(p, "SMTP_FROM"),
            security,
            timeout_secs: profiled_env_opt(p, "SMTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()),
        })
    }
}

/// SMTP credentials. Either half may be missing in the raw config.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SmtpAuth {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
}

impl SmtpAuth {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            pass: Some(pass.into()),
        }
    }

    /// Both user and pass are present and non-empty.
    pub fn is_complete(&self) -> bool {
        self.pair().is_some()
    }

    /// The credential pair, only when both halves are usable.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.pass.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

impl fmt::Debug for SmtpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpAuth")
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "***"))
            .finish()
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection, no TLS at all.
    None,
    /// Upgrade with STARTTLS when the server offers it.
    #[default]
    Opportunistic,
    /// Require STARTTLS.
    Starttls,
    /// Implicit TLS from the first byte (usually port 465).
    Tls,
}

impl FromStr for SmtpSecurity {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "plain" => Ok(Self::None),
            "opportunistic" => Ok(Self::Opportunistic),
            "starttls" => Ok(Self::Starttls),
            "tls" | "ssl" | "implicit" => Ok(Self::Tls),
            other => Err(MailError::Config(format!("unknown SMTP security mode '{other}'"))),
        }
    }
}

impl fmt::Display for SmtpSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Opportunistic => "opportunistic",
            Self::Starttls => "starttls",
            Self::Tls => "tls",
        };
        f.write_str(s)
    }
}
