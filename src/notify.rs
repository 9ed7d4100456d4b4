//! Outbound delivery of notification batches.
//!
//! The tracking core only knows the [`Notifier`] capability; which chat
//! platform (or terminal) sits behind it is decided in `main.rs`.

use std::fmt;
use std::io::Write;

use async_trait::async_trait;

use crate::error::DeliveryError;

/// Where a group's notifications go (a chat id for chat transports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationId(pub i64);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sends a formatted batch to a destination.
///
/// Called concurrently from every running session.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: DestinationId, text: &str) -> Result<(), DeliveryError>;
}

/// Writes batches to stdout, one block per delivery.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, destination: DestinationId, text: &str) -> Result<(), DeliveryError> {
        // One locked write per batch so concurrent sessions don't interleave.
        let mut out = std::io::stdout().lock();
        write!(out, "[{destination}] {text}")
            .and_then(|_| if text.ends_with('\n') { Ok(()) } else { writeln!(out) })
            .and_then(|_| out.flush())
            .map_err(|e| DeliveryError {
                destination: destination.to_string(),
                reason: e.to_string(),
            })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_displays_raw_id() {
        assert_eq!(DestinationId(-1001).to_string(), "-1001");
    }

    #[tokio::test]
    async fn console_notifier_accepts_batches() {
        let n = ConsoleNotifier;
        n.send(DestinationId(1), "Watch: 1.00\thttps://ay.by/lot/1\n")
            .await
            .unwrap();
    }
}
