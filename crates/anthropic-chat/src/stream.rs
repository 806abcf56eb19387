//! Streamed chunk types and the consumer-side stream handle.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};

use crate::errors::{AbortController, ChatError};
use crate::types::Usage;

/// Incremental delta carried by a streamed chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Content block type the delta belongs to (`text`, `tool_use`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Partial tool input JSON; fragments concatenate across chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<String>,
}

/// One streamed snapshot of the completion being assembled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub model: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<ChunkDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Stream of chunk snapshots from [`ChatClient::stream`].
///
/// Aborting, through [`abort`](Self::abort) or any cloned controller, makes
/// the next poll yield [`ChatError::Cancelled`] exactly once and then end
/// the stream; snapshots the producer buffered before the abort are
/// discarded, and the producer stops reading the network at its next check.
/// Dropping the stream also stops the producer.
///
/// [`ChatClient::stream`]: crate::client::ChatClient::stream
#[derive(Debug)]
pub struct ChatCompletionStream {
    receiver: mpsc::UnboundedReceiver<Result<ChatCompletionChunk, ChatError>>,
    controller: AbortController,
    terminated: bool,
}

impl ChatCompletionStream {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<Result<ChatCompletionChunk, ChatError>>,
        controller: AbortController,
    ) -> Self {
        Self {
            receiver,
            controller,
            terminated: false,
        }
    }

    /// A controller handle for aborting from other tasks.
    pub fn controller(&self) -> AbortController {
        self.controller.clone()
    }

    /// Cancels the stream cooperatively.
    pub fn abort(&self) {
        self.controller.abort();
    }
}

impl Stream for ChatCompletionStream {
    type Item = Result<ChatCompletionChunk, ChatError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }
        if this.controller.signal().is_aborted() {
            this.terminated = true;
            this.receiver.close();
            return Poll::Ready(Some(Err(ChatError::Cancelled)));
        }
        match Pin::new(&mut this.receiver).poll_next(cx) {
            // Every error is terminal for the call.
            Poll::Ready(Some(Err(error))) => {
                this.terminated = true;
                this.receiver.close();
                Poll::Ready(Some(Err(error)))
            }
            other => other,
        }
    }
}
