//! Output targets for emitted messages.

use std::path::PathBuf;
use std::sync::Arc;

use streampulse_types::StreamMessage;
use tokio::sync::mpsc;

use crate::{Hub, SimError};

/// Where the [`Emitter`](crate::Emitter) sends its messages.
#[derive(Debug)]
pub enum Output {
    /// Publish to every client connected to a hub.
    Hub(Arc<Hub>),

    /// Write the latest metrics snapshot to a JSON file.
    ///
    /// The file is overwritten on each `metrics` message; alerts are not
    /// written.
    File(PathBuf),

    /// Send messages through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    Channel(mpsc::Sender<StreamMessage>),
}

impl Output {
    pub fn hub(hub: Arc<Hub>) -> Self {
        Output::Hub(hub)
    }

    /// Create a file output.
    ///
    /// ```rust
    /// use streampulse_sim::Output;
    ///
    /// let output = Output::file("latest.json");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// ```rust
    /// use streampulse_sim::Output;
    ///
    /// let (output, mut rx) = Output::channel(16);
    /// ```
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<StreamMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Emit a message to this output.
    ///
    /// Channel sends are best effort: a full channel drops the message.
    pub(crate) async fn emit(&self, message: &StreamMessage) -> Result<(), SimError> {
        match self {
            Output::Hub(hub) => {
                hub.publish(message.clone());
            }
            Output::File(path) => {
                if let StreamMessage::Metrics(snapshot) = message {
                    let json = serde_json::to_string_pretty(snapshot)?;
                    tokio::fs::write(path, json).await?;
                }
            }
            Output::Channel(tx) => match tx.try_send(message.clone()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(SimError::ChannelClosed),
            },
        }
        Ok(())
    }
}
