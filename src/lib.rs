//! # Structured Stream
//!
//! A streaming client for schema-constrained generation. A prompt and a JSON
//! Schema go out; a line-delimited event stream comes back, and every text delta
//! is folded into a best-effort, partially populated typed value that callers
//! can render while the model is still writing.
//!
//! ## Key Features
//!
//! - **Partial results**: a tolerant JSON parser distinguishes "not finished yet"
//!   from "invalid", so every prefix of the output yields the fields completed so far
//! - **Deterministic schemas**: result types describe themselves through
//!   [`Generable`] and encode to byte-identical JSON Schema on every request
//! - **Tool round trips**: function calls in a completed response are dispatched
//!   to registered [`Tool`]s and the follow-up stream is spliced into the turn
//! - **Continuation**: the server's response id is threaded into the next request
//! - **Failure isolation**: a malformed record, a misaddressed delta or a failing
//!   tool never ends the stream
//!
//! ## Typed turns
//!
//! ```rust,no_run
//! use structured_stream::prelude::*;
//! use futures::StreamExt;
//! use serde::Deserialize;
//!
//! struct Recipe;
//!
//! #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
//! #[serde(default)]
//! struct PartialRecipe {
//!     title: Option<String>,
//!     steps: Option<Vec<String>>,
//! }
//!
//! impl Generable for Recipe {
//!     type Partial = PartialRecipe;
//!
//!     fn type_description() -> TypeDescription {
//!         TypeDescription::new("Recipe")
//!             .field("title", SchemaType::String, "Name of the dish")
//!             .field("steps", SchemaType::array(SchemaType::String), "")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let options = SessionOptions::builder()
//!         .instructions("You write recipes.")
//!         .endpoint("http://localhost:8080/v1/responses")
//!         .build()?;
//!     let mut session = Session::new(options)?;
//!
//!     let mut partials = session.stream_typed::<Recipe>([ConversationItem::user_text("Sourdough")]);
//!     while let Some(partial) = partials.next().await {
//!         println!("{:?}", partial?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **schema**: type descriptions and the JSON Schema encoder
//! - **request**: request body and headers
//! - **types**: conversation items, responses and session options
//! - **events**: stream events and response reconstruction
//! - **stream**: line-oriented event reader with idle timeout
//! - **transport**: the HTTP seam
//! - **partial**: tolerant parser for incomplete JSON
//! - **accumulator**: delta accumulation and typed projection
//! - **tools** / **dispatch**: tool definitions and function-call execution
//! - **session**: conversation state and turns
//! - **retry**: backoff for opening connections
//! - **config**: environment helpers

mod accumulator;
mod config;
mod dispatch;
mod error;
mod events;
mod partial;
mod request;
mod schema;
mod session;
mod stream;
mod tools;
mod transport;
mod types;

/// Retry configuration and backoff helpers.
pub mod retry;

// --- Sessions ---

pub use session::{PartialStream, Session};

// --- Configuration ---

pub use config::{API_KEY_VAR, ENDPOINT_VAR, get_api_key, get_endpoint};
pub use retry::RetryConfig;

// --- Error Handling ---

pub use error::{Error, Result};

// --- Schemas and partial results ---

pub use accumulator::{PartialAccumulator, project};
pub use partial::{PartialParse, parse_partial};
pub use schema::{Field, Generable, SchemaEncoder, SchemaType, TypeDescription, encode_schema};

// --- Tool System ---

pub use dispatch::dispatch_function_calls;
pub use tools::{Tool, ToolBuilder, ToolDescriptor, ToolRegistry, tool};

// --- Wire types ---

pub use events::{
    ContentPartAddedEvent, OutputItemEvent, OutputTextDeltaEvent, OutputTextDoneEvent,
    ResponseAssembler, ResponseCompletedEvent, ResponseCreatedEvent, StreamEvent,
    StructuralError,
};
pub use request::{RequestBody, RequestContext, request_headers};
pub use stream::{EventStream, LineDecoder, decode_line, read_events};
pub use transport::{ByteStream, HttpTransport, Transport};
pub use types::{
    ConversationItem, FunctionCall, FunctionCallOutput, InputContent, InputMessage, Message,
    OutputContent, OutputMessage, Response, ResponseStatus, SessionOptions,
    SessionOptionsBuilder, WebSearchCall,
};

/// The types most callers need.
///
/// ```rust
/// use structured_stream::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ConversationItem, Error, Generable, Response, Result, SchemaType, Session,
        SessionOptions, StreamEvent, Tool, TypeDescription, tool,
    };
}
