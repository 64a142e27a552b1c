use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::Result;

/// Write task: drains the outgoing queue into the WebSocket sink
///
/// Ends when every sender is gone or the sink rejects a message.
pub async fn spawn_write_task<S, M>(mut write: S, mut outgoing_rx: mpsc::Receiver<M>) -> Result<()>
where
    S: Sink<M> + Unpin,
    S::Error: Display,
{
    while let Some(message) = outgoing_rx.recv().await {
        if let Err(e) = write.send(message).await {
            error!("Failed to send message: {}", e);
            break;
        }
    }

    debug!("Write task exiting");
    Ok(())
}
