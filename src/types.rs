//! Core types for the structured streaming client

use crate::retry::RetryConfig;
use crate::tools::Tool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Options for configuring a conversation session
#[derive(Clone)]
pub struct SessionOptions {
    /// System instructions, fixed for the lifetime of the session
    pub instructions: String,

    /// Endpoint that accepts the streaming POST
    pub endpoint: String,

    /// Bearer token (omitted from the request when empty)
    pub api_key: String,

    /// Connection establishment timeout in seconds
    pub connect_timeout: u64,

    /// Maximum silence between two body chunks before the stream is abandoned
    pub idle_timeout: Option<Duration>,

    /// Maximum follow-up requests issued for tool outputs within one turn
    pub max_tool_rounds: u32,

    /// Retry policy for opening the connection (disabled when `None`)
    pub retry: Option<RetryConfig>,

    /// Tools the model may call
    pub tools: Vec<Arc<Tool>>,
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("instructions", &self.instructions)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"***")
            .field("connect_timeout", &self.connect_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .field("retry", &self.retry)
            .field("tools", &format!("{} tools", self.tools.len()))
            .finish()
    }
}

impl SessionOptions {
    /// Create a new builder for SessionOptions
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::default()
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn connect_timeout(&self) -> u64 {
        self.connect_timeout
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    pub fn max_tool_rounds(&self) -> u32 {
        self.max_tool_rounds
    }

    pub fn retry(&self) -> Option<&RetryConfig> {
        self.retry.as_ref()
    }

    pub fn tools(&self) -> &[Arc<Tool>] {
        &self.tools
    }
}

/// Builder for SessionOptions
#[derive(Default)]
pub struct SessionOptionsBuilder {
    instructions: Option<String>,
    endpoint: Option<String>,
    api_key: Option<String>,
    connect_timeout: Option<u64>,
    idle_timeout: Option<Option<Duration>>,
    max_tool_rounds: Option<u32>,
    retry: Option<RetryConfig>,
    tools: Vec<Arc<Tool>>,
}

impl std::fmt::Debug for SessionOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptionsBuilder")
            .field("instructions", &self.instructions)
            .field("endpoint", &self.endpoint)
            .field("tools", &format!("{} tools", self.tools.len()))
            .finish()
    }
}

impl SessionOptionsBuilder {
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = Some(seconds);
        self
    }

    /// `None` disables the idle timeout.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = Some(rounds);
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools.into_iter().map(Arc::new));
        self
    }

    pub fn build(self) -> crate::Result<SessionOptions> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| crate::Error::config("endpoint is required"))?;

        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(crate::Error::config(format!(
                "endpoint must be an http(s) URL, got '{}'",
                endpoint
            )));
        }

        let connect_timeout = self.connect_timeout.unwrap_or(30);
        if connect_timeout == 0 {
            return Err(crate::Error::config("connect_timeout must be positive"));
        }

        for (i, tool) in self.tools.iter().enumerate() {
            if self.tools[..i].iter().any(|t| t.name() == tool.name()) {
                return Err(crate::Error::config(format!(
                    "tool '{}' registered twice",
                    tool.name()
                )));
            }
        }

        Ok(SessionOptions {
            instructions: self.instructions.unwrap_or_default(),
            endpoint,
            api_key: self.api_key.unwrap_or_default(),
            connect_timeout,
            idle_timeout: self
                .idle_timeout
                .unwrap_or(Some(Duration::from_secs(60))),
            max_tool_rounds: self.max_tool_rounds.unwrap_or(8),
            retry: self.retry,
            tools: self.tools,
        })
    }
}

pub(crate) fn new_item_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// One unit of dialogue, discriminated on the wire by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message(Message),
    FunctionCall(FunctionCall),
    FunctionCallOutput(FunctionCallOutput),
    WebSearchCall(WebSearchCall),
    /// An item kind this client does not model (`reasoning`, ...). It keeps its
    /// slot in the response output so later indices stay aligned; its fields
    /// are not retained.
    #[serde(other)]
    Unknown,
}

impl ConversationItem {
    /// A user message with a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        ConversationItem::Message(Message::User(InputMessage::text(text)))
    }

    /// A developer message with a single text part.
    pub fn developer_text(text: impl Into<String>) -> Self {
        ConversationItem::Message(Message::Developer(InputMessage::text(text)))
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        ConversationItem::FunctionCallOutput(FunctionCallOutput::new(call_id, output))
    }

    pub fn id(&self) -> &str {
        match self {
            ConversationItem::Message(Message::User(m) | Message::Developer(m)) => &m.id,
            ConversationItem::Message(Message::Assistant(m)) => &m.id,
            ConversationItem::FunctionCall(c) => &c.id,
            ConversationItem::FunctionCallOutput(o) => &o.id,
            ConversationItem::WebSearchCall(w) => &w.id,
            ConversationItem::Unknown => "",
        }
    }

    pub fn as_output_message(&self) -> Option<&OutputMessage> {
        match self {
            ConversationItem::Message(Message::Assistant(m)) => Some(m),
            _ => None,
        }
    }

    pub fn as_output_message_mut(&mut self) -> Option<&mut OutputMessage> {
        match self {
            ConversationItem::Message(Message::Assistant(m)) => Some(m),
            _ => None,
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            ConversationItem::FunctionCall(c) => Some(c),
            _ => None,
        }
    }
}

/// A message item, discriminated on the wire by `role`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User(InputMessage),
    Developer(InputMessage),
    Assistant(OutputMessage),
}

/// A message sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(default)]
    pub id: String,
    pub content: Vec<InputContent>,
}

impl InputMessage {
    pub fn new(content: Vec<InputContent>) -> Self {
        Self {
            id: new_item_id("msg"),
            content,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![InputContent::text(text)])
    }
}

/// Content part of an input message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContent {
    InputText {
        text: String,
    },
    InputImage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    InputFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_data: Option<String>,
    },
}

impl InputContent {
    pub fn text(text: impl Into<String>) -> Self {
        InputContent::InputText { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        InputContent::InputImage {
            image_url: Some(url.into()),
            file_id: None,
            detail: None,
        }
    }

    pub fn file_id(file_id: impl Into<String>) -> Self {
        InputContent::InputFile {
            file_id: Some(file_id.into()),
            filename: None,
            file_data: None,
        }
    }
}

/// A message produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub id: String,
    #[serde(default)]
    pub content: Vec<OutputContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Content part of an output message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        annotations: Vec<serde_json::Value>,
    },
    Refusal {
        refusal: String,
    },
}

impl OutputContent {
    pub fn text(text: impl Into<String>) -> Self {
        OutputContent::OutputText {
            text: text.into(),
            annotations: Vec::new(),
        }
    }
}

/// A request from the model to invoke a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    /// Correlation id echoed by the matching [`FunctionCallOutput`]
    pub call_id: String,
    pub name: String,
    /// Raw JSON argument payload
    #[serde(default)]
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Result of a tool invocation fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOutput {
    #[serde(default)]
    pub id: String,
    pub call_id: String,
    pub output: String,
}

impl FunctionCallOutput {
    pub fn new(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: new_item_id("fco"),
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

/// Record of a server-side web search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchCall {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
    Incomplete,
}

/// A server-side turn result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub output: Vec<ConversationItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

impl Response {
    /// An empty in-progress response.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ResponseStatus::InProgress,
            output: Vec::new(),
            previous_response_id: None,
        }
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.output.iter().filter_map(ConversationItem::as_function_call)
    }

    /// Concatenated `output_text` of every assistant message.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter_map(ConversationItem::as_output_message)
            .flat_map(|m| m.content.iter())
            .filter_map(|part| match part {
                OutputContent::OutputText { text, .. } => Some(text.as_str()),
                OutputContent::Refusal { .. } => None,
            })
            .collect()
    }
}
