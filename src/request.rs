//! Outbound request construction.
//!
//! [`RequestContext`] is a read-only view of the session state a request needs
//! (instructions, tools, continuation id). Building a body from it never touches
//! the session.

use crate::tools::{ToolDescriptor, ToolRegistry};
use crate::types::ConversationItem;
use crate::{Error, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Body of one streaming POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestBody {
    pub instructions: String,
    pub input: Vec<ConversationItem>,
    pub tools: Vec<ToolDescriptor>,
    /// Omitted for untyped turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// The wire format carries the flag as a string
    #[serde(serialize_with = "flag_as_string")]
    pub stream: bool,
    #[serde(
        rename = "previousResponseId",
        skip_serializing_if = "Option::is_none"
    )]
    pub previous_response_id: Option<String>,
}

fn flag_as_string<S: Serializer>(flag: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(if *flag { "true" } else { "false" })
}

/// Snapshot of the session fields that go into a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub instructions: &'a str,
    pub tools: &'a ToolRegistry,
    pub previous_response_id: Option<&'a str>,
}

impl RequestContext<'_> {
    pub fn build(&self, input: Vec<ConversationItem>, schema: Option<Value>) -> RequestBody {
        RequestBody {
            instructions: self.instructions.to_string(),
            input,
            tools: self.tools.descriptors(),
            schema,
            stream: true,
            previous_response_id: self.previous_response_id.map(str::to_string),
        }
    }
}

/// Headers sent with every request.
///
/// The bearer token is only attached when `api_key` is non-empty.
pub fn request_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

    if !api_key.is_empty() {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| Error::config("api key contains characters not allowed in a header"))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}
