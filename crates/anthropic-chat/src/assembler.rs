//! Typed stream frames and the chunk assembly state machine.
//!
//! Frames fold into an accumulating chunk one at a time; every emission is
//! an independent snapshot of the accumulator taken at fold time, so later
//! folds never mutate what a consumer already received.

use serde::Deserialize;
use tracing::debug;

use crate::stream::{ChatCompletionChunk, ChunkDelta};
use crate::types::Usage;

/// One decoded `data:` frame. Unrecognized tags land on `Unknown`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    MessageStart {
        message: FrameMessageStart,
    },
    ContentBlockStart {
        content_block: FrameContentBlock,
    },
    ContentBlockDelta {
        delta: FrameContentDelta,
    },
    ContentBlockStop,
    MessageDelta {
        delta: FrameMessageDelta,
        #[serde(default)]
        usage: Option<FrameUsageDelta>,
    },
    MessageStop,
    Error {
        #[serde(default)]
        error: Option<FrameErrorDetail>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameMessageStart {
    pub id: String,
    pub role: String,
    pub model: String,
    #[serde(default)]
    pub usage: Option<FrameUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameContentDelta {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub partial_json: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameMessageDelta {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameUsageDelta {
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of folding one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Deliver this snapshot to the consumer.
    Emit(ChatCompletionChunk),
    /// Frame consumed, nothing to deliver.
    Skip,
    /// Terminal `message_stop`; stop reading.
    Stop,
    /// Terminal in-band error event.
    Fail(String),
}

/// Accumulator folding frames into chunk snapshots.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    chunk: ChatCompletionChunk,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit state transition: one frame in, at most one emission out.
    pub fn apply(&mut self, frame: StreamFrame) -> Transition {
        match frame {
            StreamFrame::MessageStart { message } => {
                self.chunk.id = message.id;
                self.chunk.role = message.role;
                self.chunk.model = message.model;
                // Usage exists only once both counts have been reported.
                self.chunk.usage = match message.usage {
                    Some(FrameUsage {
                        input_tokens: Some(input_tokens),
                        output_tokens: Some(output_tokens),
                    }) => Some(Usage {
                        input_tokens,
                        output_tokens,
                    }),
                    _ => None,
                };
                Transition::Emit(self.chunk.clone())
            }
            StreamFrame::ContentBlockStart { content_block } => {
                self.chunk.delta = Some(ChunkDelta {
                    kind: content_block.kind,
                    text: None,
                    tool_name: content_block.name,
                    tool_input: None,
                });
                Transition::Emit(self.chunk.clone())
            }
            StreamFrame::ContentBlockDelta { delta } => {
                if let Some(current) = self.chunk.delta.as_mut() {
                    current.text = delta.text;
                    current.tool_input = delta.partial_json;
                }
                Transition::Emit(self.chunk.clone())
            }
            StreamFrame::MessageDelta { delta, usage } => {
                if let Some(current) = self.chunk.delta.as_mut() {
                    current.text = None;
                    current.tool_input = None;
                }
                self.chunk.stop_reason = delta.stop_reason;
                self.chunk.stop_sequence = delta.stop_sequence;
                // Absolute output count for the whole turn, not an increment.
                if let (Some(current), Some(output_tokens)) = (
                    self.chunk.usage.as_mut(),
                    usage.and_then(|usage| usage.output_tokens),
                ) {
                    current.output_tokens = output_tokens;
                }
                Transition::Emit(self.chunk.clone())
            }
            StreamFrame::MessageStop => Transition::Stop,
            StreamFrame::ContentBlockStop => Transition::Skip,
            StreamFrame::Error { error } => Transition::Fail(
                error
                    .and_then(|detail| detail.message)
                    .unwrap_or_else(|| "unknown stream error".to_string()),
            ),
            StreamFrame::Unknown => {
                debug!("skipping unrecognized stream frame");
                Transition::Skip
            }
        }
    }
}
