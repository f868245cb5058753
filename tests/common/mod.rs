//! Shared fixtures: a scripted transport and builders for wire records.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use structured_stream::{
    ByteStream, Error, RequestBody, Result, Session, SessionOptions, Tool, Transport,
};

/// One scripted answer to a request.
pub enum Reply {
    /// 2xx with these record lines as the body, one chunk per line
    Lines(Vec<String>),
    /// Non-2xx with this status
    Status(u16),
    /// 2xx with these record lines, then the connection stays open and silent
    Stalled(Vec<String>),
}

/// Transport that replays scripted replies and records every request body.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Value>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Request bodies as sent, in order.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, body: &RequestBody) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(serde_json::to_value(body)?);

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Lines(lines)) => Ok(Box::pin(futures::stream::iter(chunks(lines)))),
            Some(Reply::Stalled(lines)) => Ok(Box::pin(
                futures::stream::iter(chunks(lines)).chain(futures::stream::pending()),
            )),
            Some(Reply::Status(status)) => Err(Error::status(status, "scripted failure")),
            None => Err(Error::other("no scripted reply left")),
        }
    }
}

fn chunks(lines: Vec<String>) -> Vec<Result<Bytes>> {
    lines
        .into_iter()
        .map(|line| Ok(Bytes::from(format!("{}\n", line))))
        .collect()
}

pub fn session_with(tools: Vec<Tool>, transport: Arc<ScriptedTransport>) -> Session {
    session_with_options(
        SessionOptions::builder()
            .instructions("You are a kitchen assistant.")
            .endpoint("http://localhost:8080/v1/responses")
            .tools(tools),
        transport,
    )
}

pub fn session_with_options(
    builder: structured_stream::SessionOptionsBuilder,
    transport: Arc<ScriptedTransport>,
) -> Session {
    Session::with_transport(builder.build().unwrap(), transport).unwrap()
}

// --- Wire records ---

pub fn created(id: &str) -> String {
    json!({
        "type": "response.created",
        "response": {"id": id, "status": "in_progress", "output": []}
    })
    .to_string()
}

pub fn message_added(output_index: usize) -> String {
    json!({
        "type": "response.output_item.added",
        "output_index": output_index,
        "item": {
            "type": "message",
            "role": "assistant",
            "id": format!("msg_{}", output_index),
            "content": []
        }
    })
    .to_string()
}

pub fn part_added(output_index: usize) -> String {
    json!({
        "type": "response.content_part.added",
        "output_index": output_index,
        "content_index": 0,
        "part": {"type": "output_text", "text": ""}
    })
    .to_string()
}

pub fn delta(output_index: usize, text: &str) -> String {
    json!({
        "type": "response.output_text.delta",
        "output_index": output_index,
        "content_index": 0,
        "delta": text
    })
    .to_string()
}

pub fn completed_with_text(id: &str, text: &str) -> String {
    json!({
        "type": "response.completed",
        "response": {
            "id": id,
            "status": "completed",
            "output": [{
                "type": "message",
                "role": "assistant",
                "id": "msg_0",
                "content": [{"type": "output_text", "text": text}]
            }]
        }
    })
    .to_string()
}

/// `calls` are `(call_id, tool name, raw arguments)`.
pub fn completed_with_calls(id: &str, calls: &[(&str, &str, &str)]) -> String {
    let output: Vec<Value> = calls
        .iter()
        .map(|(call_id, name, arguments)| {
            json!({
                "type": "function_call",
                "id": format!("fc_{}", call_id),
                "call_id": call_id,
                "name": name,
                "arguments": arguments
            })
        })
        .collect();

    json!({
        "type": "response.completed",
        "response": {"id": id, "status": "completed", "output": output}
    })
    .to_string()
}

/// A complete text response streamed as `deltas`.
pub fn text_response(id: &str, deltas: &[&str]) -> Vec<String> {
    let mut lines = vec![created(id), message_added(0), part_added(0)];
    lines.extend(deltas.iter().map(|d| delta(0, d)));
    lines.push(completed_with_text(id, &deltas.concat()));
    lines
}

/// A response that only calls tools.
pub fn call_response(id: &str, calls: &[(&str, &str, &str)]) -> Vec<String> {
    vec![created(id), completed_with_calls(id, calls)]
}
