//! Mail delivery seam and the outbox implementation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Errors raised while delivering mail.
#[derive(Debug, Error)]
pub enum MailError {
    /// The recipient is not an email address.
    #[error("invalid recipient `{0}`")]
    InvalidRecipient(String),

    /// A header value contains a line break.
    #[error("header `{0}` must not contain line breaks")]
    HeaderInjection(&'static str),

    /// Writing the message failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A message ready for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl OutgoingMail {
    /// Checks the recipient and header values.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::InvalidRecipient`] or
    /// [`MailError::HeaderInjection`].
    pub fn validate(&self) -> Result<(), MailError> {
        let to = self.to.trim();
        let well_formed = to
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
        if !well_formed || to.contains(char::is_whitespace) {
            return Err(MailError::InvalidRecipient(self.to.clone()));
        }
        if self.subject.contains(['\r', '\n']) {
            return Err(MailError::HeaderInjection("Subject"));
        }
        Ok(())
    }
}

/// Delivers messages on behalf of the `send_email` tool.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers one message and returns a delivery reference.
    async fn send(&self, mail: &OutgoingMail) -> Result<String, MailError>;
}

/// Mailer that writes one RFC 5322 `.eml` file per message.
#[derive(Debug)]
pub struct OutboxMailer {
    sender: String,
    dir: PathBuf,
    sequence: AtomicU64,
}

impl OutboxMailer {
    /// Creates a mailer spooling into `dir` with `sender` as `From`.
    #[must_use]
    pub fn new(sender: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            sender: sender.into(),
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the outbox directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn render(&self, mail: &OutgoingMail) -> String {
        let body = mail.body.replace("\r\n", "\n").replace('\n', "\r\n");
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{body}\r\n",
            self.sender,
            mail.to.trim(),
            mail.subject,
        )
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<String, MailError> {
        mail.validate()?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| MailError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis());
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("{millis}-{sequence:04}.eml"));
        fs::write(&path, self.render(mail))
            .await
            .map_err(|source| MailError::Io {
                path: path.clone(),
                source,
            })?;

        info!(to = %mail.to.trim(), path = %path.display(), "mail spooled");
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            to: to.into(),
            subject: "Weather Update".into(),
            body: "Hyderabad: +31°C\nHumid".into(),
        }
    }

    #[test]
    fn rejects_bad_recipients_and_headers() {
        assert!(mail("ops@example.com").validate().is_ok());
        assert!(matches!(
            mail("not-an-address").validate(),
            Err(MailError::InvalidRecipient(_))
        ));
        assert!(mail("@example.com").validate().is_err());
        assert!(mail("a b@example.com").validate().is_err());

        let mut injected = mail("ops@example.com");
        injected.subject = "hi\r\nBcc: everyone@example.com".into();
        assert!(matches!(
            injected.validate(),
            Err(MailError::HeaderInjection("Subject"))
        ));
    }

    #[tokio::test]
    async fn spools_one_file_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let mailer = OutboxMailer::new("agent@localhost", &outbox);

        let first = mailer.send(&mail("ops@example.com")).await.unwrap();
        let second = mailer.send(&mail("dev@example.com")).await.unwrap();
        assert_ne!(first, second);

        let written = std::fs::read_to_string(&first).unwrap();
        assert!(written.starts_with("From: agent@localhost\r\nTo: ops@example.com\r\n"));
        assert!(written.contains("Subject: Weather Update\r\n"));
        assert!(written.ends_with("Hyderabad: +31°C\r\nHumid\r\n"));
        assert_eq!(std::fs::read_dir(&outbox).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn invalid_mail_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = OutboxMailer::new("agent@localhost", dir.path());
        assert!(mailer.send(&mail("nobody")).await.is_err());
        assert_eq!(std::fs::read_dir(mailer.dir()).unwrap().count(), 0);
    }
}
