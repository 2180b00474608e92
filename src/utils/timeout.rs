//! Deadline helpers.
//!
//! A `None` deadline means "wait forever", matching a node configured
//! without handshake or read timeouts.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Default deadline for receiving a peer's handshake
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `run` waits for the coordination loop after a shutdown request
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `fut`, failing with `ProtocolError::Timeout` once `deadline` elapses.
pub async fn with_timeout_error<F, T>(fut: F, deadline: Option<Duration>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(duration) => tokio::time::timeout(duration, fut)
            .await
            .map_err(|_| ProtocolError::Timeout)?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_elapses() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        };
        let result = with_timeout_error(slow, Some(Duration::from_millis(20))).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn test_no_deadline_waits() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(7)
        };
        let result = with_timeout_error(slow, None).await;
        assert!(matches!(result, Ok(7)));
    }
}
