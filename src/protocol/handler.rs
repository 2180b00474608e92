use crate::error::{ProtocolError, Result};
use crate::protocol::message::Message;
use std::io::Read;
use tracing::info;

/// Application-level interpretation of inbound payloads.
///
/// Called from the coordination loop once per message, in the order each
/// peer's messages were read. An error closes the originating connection.
pub trait Handler: Send + Sync + 'static {
    fn handle_message(&self, msg: Message) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(Message) -> Result<()> + Send + Sync + 'static,
{
    fn handle_message(&self, msg: Message) -> Result<()> {
        self(msg)
    }
}

/// Drains each payload and logs where it came from. No game logic.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

impl Handler for DefaultHandler {
    fn handle_message(&self, msg: Message) -> Result<()> {
        let mut content = Vec::with_capacity(msg.len());
        msg.payload_reader()
            .read_to_end(&mut content)
            .map_err(|e| ProtocolError::HandlerFailure(e.to_string()))?;

        info!(
            from = %msg.from,
            bytes = content.len(),
            content = %String::from_utf8_lossy(&content),
            "Received message"
        );
        Ok(())
    }
}
