//! Stream events and response reconstruction.
//!
//! Each record of the response body decodes into one [`StreamEvent`], tagged by
//! its `type` field. A [`ResponseAssembler`] folds events, in arrival order, into
//! a reconstructed [`Response`]:
//!
//! ```text
//! response.created              -> fresh Response shell
//! response.output_item.added    -> push item onto response.output
//! response.content_part.added   -> push part onto output[output_index] (assistant messages only)
//! response.output_text.delta    -> append to output[output_index].content[content_index] (output_text only)
//! response.output_text.done     -> replace that part's text with the final text
//! response.output_item.done     -> replace output[output_index] with its final form
//! response.completed            -> the carried Response supersedes the reconstruction
//! ```
//!
//! Events that address an output item or content part the reconstruction does
//! not have are structural errors. [`ResponseAssembler::apply`] reports them as a
//! [`StructuralError`] and leaves the reconstruction untouched; callers log and
//! continue.

use crate::types::{ConversationItem, OutputContent, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A wire-level notification from the response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "response.created")]
    Created(ResponseCreatedEvent),
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded(OutputItemEvent),
    #[serde(rename = "response.output_item.done")]
    OutputItemDone(OutputItemEvent),
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded(ContentPartAddedEvent),
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta(OutputTextDeltaEvent),
    #[serde(rename = "response.output_text.done")]
    OutputTextDone(OutputTextDoneEvent),
    #[serde(rename = "response.completed")]
    Completed(ResponseCompletedEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseCreatedEvent {
    pub response: Response,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItemEvent {
    pub output_index: usize,
    pub item: ConversationItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPartAddedEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub output_index: usize,
    pub content_index: usize,
    pub part: OutputContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTextDeltaEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub output_index: usize,
    pub content_index: usize,
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTextDoneEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub output_index: usize,
    pub content_index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseCompletedEvent {
    pub response: Response,
}

impl StreamEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Created(_) => "response.created",
            StreamEvent::OutputItemAdded(_) => "response.output_item.added",
            StreamEvent::OutputItemDone(_) => "response.output_item.done",
            StreamEvent::ContentPartAdded(_) => "response.content_part.added",
            StreamEvent::OutputTextDelta(_) => "response.output_text.delta",
            StreamEvent::OutputTextDone(_) => "response.output_text.done",
            StreamEvent::Completed(_) => "response.completed",
        }
    }
}

/// Why an event could not be applied to the reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// An item or part event arrived before `response.created`.
    NoResponse,
    /// `output_index` is past the end of `response.output`.
    MissingOutputItem(usize),
    /// The addressed output item is not an assistant message.
    NotAnOutputMessage(usize),
    /// `content_index` is past the end of the message's content.
    MissingContentPart { output_index: usize, content_index: usize },
    /// The addressed content part is not `output_text`.
    NotOutputText { output_index: usize, content_index: usize },
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::NoResponse => write!(f, "no response has been created yet"),
            StructuralError::MissingOutputItem(i) => write!(f, "no output item at index {}", i),
            StructuralError::NotAnOutputMessage(i) => {
                write!(f, "output item {} is not an assistant message", i)
            }
            StructuralError::MissingContentPart {
                output_index,
                content_index,
            } => write!(
                f,
                "output item {} has no content part at index {}",
                output_index, content_index
            ),
            StructuralError::NotOutputText {
                output_index,
                content_index,
            } => write!(
                f,
                "content part {}.{} is not output_text",
                output_index, content_index
            ),
        }
    }
}

impl std::error::Error for StructuralError {}

/// Reconstructs a [`Response`] from its stream of events.
///
/// Output items are positional: `output_item.added` appends, and later events
/// address items by `output_index`. Item kinds the client does not model decode
/// as [`ConversationItem::Unknown`] and still occupy their index.
#[derive(Debug, Default, Clone)]
pub struct ResponseAssembler {
    response: Option<Response>,
    completed: bool,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reconstruction so far (or the completed response).
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn into_response(self) -> Option<Response> {
        self.response
    }

    /// Whether `response.completed` has been applied.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Apply one event. On error the reconstruction is unchanged.
    pub fn apply(&mut self, event: &StreamEvent) -> Result<(), StructuralError> {
        match event {
            StreamEvent::Created(e) => {
                self.response = Some(e.response.clone());
                self.completed = false;
                Ok(())
            }
            StreamEvent::Completed(e) => {
                self.response = Some(e.response.clone());
                self.completed = true;
                Ok(())
            }
            StreamEvent::OutputItemAdded(e) => {
                let response = self.response.as_mut().ok_or(StructuralError::NoResponse)?;
                response.output.push(e.item.clone());
                Ok(())
            }
            StreamEvent::OutputItemDone(e) => {
                let response = self.response.as_mut().ok_or(StructuralError::NoResponse)?;
                let slot = response
                    .output
                    .get_mut(e.output_index)
                    .ok_or(StructuralError::MissingOutputItem(e.output_index))?;
                *slot = e.item.clone();
                Ok(())
            }
            StreamEvent::ContentPartAdded(e) => {
                let content = self.message_content(e.output_index)?;
                content.push(e.part.clone());
                Ok(())
            }
            StreamEvent::OutputTextDelta(e) => {
                let text = self.output_text(e.output_index, e.content_index)?;
                text.push_str(&e.delta);
                Ok(())
            }
            StreamEvent::OutputTextDone(e) => {
                let text = self.output_text(e.output_index, e.content_index)?;
                text.clone_from(&e.text);
                Ok(())
            }
        }
    }

    fn message_content(
        &mut self,
        output_index: usize,
    ) -> Result<&mut Vec<OutputContent>, StructuralError> {
        let response = self.response.as_mut().ok_or(StructuralError::NoResponse)?;
        let item = response
            .output
            .get_mut(output_index)
            .ok_or(StructuralError::MissingOutputItem(output_index))?;
        item.as_output_message_mut()
            .map(|message| &mut message.content)
            .ok_or(StructuralError::NotAnOutputMessage(output_index))
    }

    fn output_text(
        &mut self,
        output_index: usize,
        content_index: usize,
    ) -> Result<&mut String, StructuralError> {
        let part = self
            .message_content(output_index)?
            .get_mut(content_index)
            .ok_or(StructuralError::MissingContentPart {
                output_index,
                content_index,
            })?;
        match part {
            OutputContent::OutputText { text, .. } => Ok(text),
            OutputContent::Refusal { .. } => Err(StructuralError::NotOutputText {
                output_index,
                content_index,
            }),
        }
    }
}
