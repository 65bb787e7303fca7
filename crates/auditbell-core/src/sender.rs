//! Delivery of rendered notifications.
//!
//! Transport (SMTP, chat, ticketing) belongs to the host. The core ships a
//! JSON-lines sender so the CLI can hand reminders to any downstream
//! process over a pipe.

use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Mutex;

use crate::error::DeliveryError;

pub trait NotificationSender {
    fn send(
        &self,
        recipients: &BTreeSet<String>,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError>;
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    to: &'a BTreeSet<String>,
    subject: &'a str,
    body: &'a str,
}

/// Writes one JSON object per message to the wrapped writer.
pub struct JsonlSender<W: Write> {
    out: Mutex<W>,
}

impl<W: Write> JsonlSender<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write> NotificationSender for JsonlSender<W> {
    fn send(
        &self,
        recipients: &BTreeSet<String>,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        if recipients.is_empty() {
            return Err(DeliveryError::NoRecipients);
        }
        let line = serde_json::to_string(&OutboundMessage {
            to: recipients,
            subject,
            body,
        })
        .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let mut out = self
            .out
            .lock()
            .map_err(|_| DeliveryError::Transport("output lock poisoned".into()))?;
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owners() -> BTreeSet<String> {
        ["gary@a.co".to_string(), "zorkian@a.co".to_string()]
            .into_iter()
            .collect()
    }

    #[test]
    fn writes_one_line_per_message() {
        let sender = JsonlSender::new(Vec::new());
        sender.send(&owners(), "subject one", "body\nwith newline").unwrap();
        sender.send(&owners(), "subject two", "body").unwrap();

        let written = String::from_utf8(sender.into_inner()).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["to"], serde_json::json!(["gary@a.co", "zorkian@a.co"]));
        assert_eq!(first["body"], "body\nwith newline");
    }

    #[test]
    fn empty_recipients_is_a_delivery_error() {
        let sender = JsonlSender::new(Vec::new());
        assert_eq!(
            sender.send(&BTreeSet::new(), "s", "b"),
            Err(DeliveryError::NoRecipients)
        );
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_is_a_transport_error() {
        let sender = JsonlSender::new(BrokenPipe);
        assert!(matches!(
            sender.send(&owners(), "s", "b"),
            Err(DeliveryError::Transport(_))
        ));
    }
}
