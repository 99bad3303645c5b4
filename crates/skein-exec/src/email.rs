//! Email task execution over SMTP.

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use crate::error::ExecFailure;

const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

/// SMTP endpoint and credentials, sourced from the environment.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
  pub host: String,
  pub sender: String,
  pub password: String,
}

impl SmtpSettings {
  /// Read `SENDER_EMAIL` and `APP_PASSWORD` (required) and `SMTP_HOST`
  /// (optional, defaults to Gmail's relay).
  pub fn from_env() -> Result<Self, ExecFailure> {
    let sender = std::env::var("SENDER_EMAIL").map_err(|_| ExecFailure::SmtpCredentials)?;
    let password = std::env::var("APP_PASSWORD").map_err(|_| ExecFailure::SmtpCredentials)?;
    let host = std::env::var("SMTP_HOST").unwrap_or_else(|_| DEFAULT_SMTP_HOST.to_string());
    Ok(Self {
      host,
      sender,
      password,
    })
  }
}

/// Send a plain-text message to each recipient over TLS.
///
/// Per-recipient failures are logged and do not fail the task; the task
/// succeeds once every recipient was attempted. Missing credentials or an
/// unreachable relay fail the task before any send.
pub(crate) async fn run(
  subject: &str,
  body: &str,
  recipients: &[String],
) -> Result<serde_json::Value, ExecFailure> {
  let settings = SmtpSettings::from_env()?;

  let sender: Mailbox = settings
    .sender
    .parse()
    .map_err(|source| ExecFailure::SenderAddress {
      address: settings.sender.clone(),
      source,
    })?;

  let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
    .credentials(Credentials::new(
      settings.sender.clone(),
      settings.password.clone(),
    ))
    .build();

  for recipient in recipients {
    let to: Mailbox = match recipient.parse() {
      Ok(mailbox) => mailbox,
      Err(e) => {
        warn!(recipient = %recipient, error = %e, "skipping invalid recipient address");
        continue;
      }
    };

    let message = Message::builder()
      .from(sender.clone())
      .to(to)
      .subject(subject)
      .body(body.to_string())?;

    match transport.send(message).await {
      Ok(_) => debug!(recipient = %recipient, "email sent"),
      Err(e) => warn!(recipient = %recipient, error = %e, "failed to send email"),
    }
  }

  Ok(serde_json::Value::String(
    "all recipients attempted".to_string(),
  ))
}
