//! Conversation sessions.
//!
//! A [`Session`] owns one logical conversation: the fixed instructions, the
//! registered tools, the continuation id and a transcript of every item that
//! was exchanged. Turns are started with [`Session::stream`] (raw events),
//! [`Session::stream_typed`] (partial results) or their collecting forms
//! [`Session::respond`] and [`Session::generate`].
//!
//! # Turn flow
//!
//! ```text
//! input items ──► request ──► events ──► caller
//!                                │
//!                      response.completed with function calls
//!                                │
//!                  dispatch tools ──► function_call_output items
//!                                │
//!                   follow-up request (same turn, spliced after)
//! ```
//!
//! Follow-up events are drained in arrival order before the turn ends. The
//! number of follow-up requests per turn is capped by
//! [`SessionOptions::max_tool_rounds`].
//!
//! # One turn at a time
//!
//! Every turn stream borrows the session mutably, so a second turn cannot start
//! while one is still being consumed. The continuation id is written when each
//! `response.created` event arrives and read when the next request is built.
//!
//! # Example
//!
//! ```rust,no_run
//! use structured_stream::{ConversationItem, Session, SessionOptions, StreamEvent};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = SessionOptions::builder()
//!     .instructions("You are a helpful baker.")
//!     .endpoint("http://localhost:8080/v1/responses")
//!     .build()?;
//! let mut session = Session::new(options)?;
//!
//! let mut events = session.stream([ConversationItem::user_text("Suggest a bread")]);
//! while let Some(event) = events.next().await {
//!     if let StreamEvent::OutputTextDelta(delta) = event? {
//!         print!("{}", delta.delta);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::accumulator::PartialAccumulator;
use crate::dispatch::dispatch_function_calls;
use crate::events::{ResponseAssembler, StreamEvent};
use crate::request::RequestContext;
use crate::schema::{Generable, encode_schema};
use crate::stream::{EventStream, boxed, read_events};
use crate::tools::ToolRegistry;
use crate::transport::{HttpTransport, Transport};
use crate::types::{ConversationItem, Response, ResponseStatus, SessionOptions};
use crate::{Error, Result};
use async_stream::try_stream;
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How often a waiting turn re-checks the interrupt flag.
const INTERRUPT_POLL: Duration = Duration::from_millis(20);

/// Stream of partial results for one typed turn.
pub type PartialStream<'a, P> = Pin<Box<dyn Stream<Item = Result<P>> + Send + 'a>>;

/// One logical conversation with the model.
pub struct Session {
    options: SessionOptions,
    registry: ToolRegistry,
    transport: Arc<dyn Transport>,
    previous_response_id: Option<String>,
    transcript: Vec<ConversationItem>,
    interrupted: Arc<AtomicBool>,
}

impl Session {
    /// Create a session that talks HTTP to `options.endpoint`.
    pub fn new(options: SessionOptions) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&options)?);
        Self::with_transport(options, transport)
    }

    /// Create a session over a custom transport.
    pub fn with_transport(options: SessionOptions, transport: Arc<dyn Transport>) -> Result<Self> {
        let registry = ToolRegistry::try_from(options.tools())?;
        Ok(Self {
            options,
            registry,
            transport,
            previous_response_id: None,
            transcript: Vec::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Id of the most recently created response.
    pub fn previous_response_id(&self) -> Option<&str> {
        self.previous_response_id.as_deref()
    }

    /// Every item sent and every completed output item, in order.
    pub fn transcript(&self) -> &[ConversationItem] {
        &self.transcript
    }

    /// Forget the conversation: clears the continuation id and transcript.
    pub fn reset(&mut self) {
        self.previous_response_id = None;
        self.transcript.clear();
    }

    /// Stop the active turn. It yields nothing further and drops its connection.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Shared flag behind [`Session::interrupt`], usable from other tasks.
    ///
    /// The flag is cleared when the next turn starts.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Start an untyped turn and stream its events, follow-ups included.
    pub fn stream(&mut self, input: impl Into<Vec<ConversationItem>>) -> EventStream<'_> {
        self.run_turn(input.into(), None)
    }

    /// Start a typed turn and stream successive partial results.
    ///
    /// The schema is encoded before anything is sent; an encoding failure is the
    /// only item of the stream. When the turn ends the final output must be one
    /// complete JSON document matching `T`, otherwise the stream ends with
    /// [`Error::Output`].
    pub fn stream_typed<T>(
        &mut self,
        input: impl Into<Vec<ConversationItem>>,
    ) -> PartialStream<'_, T::Partial>
    where
        T: Generable + 'static,
    {
        let input = input.into();
        let schema = encode_schema::<T>();
        let interrupted = self.interrupted.clone();

        boxed_partials(try_stream! {
            let schema = schema?;
            let mut events = self.run_turn(input, Some(schema));
            let mut assembler = ResponseAssembler::new();
            let mut accumulator = PartialAccumulator::<T::Partial>::new();

            while let Some(event) = events.next().await {
                let event = event?;

                // Only the last response of a turn carries the structured output.
                if let StreamEvent::Created(_) = event {
                    accumulator = PartialAccumulator::new();
                }

                if let Err(e) = assembler.apply(&event) {
                    tracing::debug!(event = event.kind(), error = %e, "dropping event that does not fit the response");
                    continue;
                }

                let update = match &event {
                    StreamEvent::OutputTextDelta(delta) => accumulator.push(&delta.delta),
                    // Servers that skip deltas still send the final text.
                    StreamEvent::OutputTextDone(done) if accumulator.buffer().is_empty() => {
                        accumulator.push(&done.text)
                    }
                    _ => None,
                };
                if let Some(partial) = update {
                    yield partial;
                }
            }
            drop(events);

            if !interrupted.load(Ordering::SeqCst) {
                let last = accumulator.current();
                let finished = accumulator.finish()?;
                if last.as_ref() != Some(&finished) {
                    yield finished;
                }
            }
        })
    }

    /// Run an untyped turn to the end and return the last completed response.
    ///
    /// A final response the server marks `failed` or `incomplete` is an
    /// [`Error::Api`].
    pub async fn respond(&mut self, input: impl Into<Vec<ConversationItem>>) -> Result<Response> {
        let mut events = self.stream(input);
        let mut completed = None;
        while let Some(event) = events.next().await {
            if let StreamEvent::Completed(e) = event? {
                completed = Some(e.response);
            }
        }
        let response = completed
            .ok_or_else(|| Error::stream("stream ended before the response completed"))?;

        match response.status {
            ResponseStatus::Failed | ResponseStatus::Incomplete => Err(Error::api(format!(
                "response {} ended with status {:?}",
                response.id, response.status
            ))),
            ResponseStatus::Completed | ResponseStatus::InProgress => Ok(response),
        }
    }

    /// Run a typed turn to the end and return the final result.
    pub async fn generate<T>(&mut self, input: impl Into<Vec<ConversationItem>>) -> Result<T::Partial>
    where
        T: Generable + 'static,
    {
        let mut partials = self.stream_typed::<T>(input);
        let mut last = None;
        while let Some(partial) = partials.next().await {
            last = Some(partial?);
        }
        last.ok_or_else(|| Error::output("turn ended without a result"))
    }

    fn request_context(&self) -> RequestContext<'_> {
        RequestContext {
            instructions: self.options.instructions(),
            tools: &self.registry,
            previous_response_id: self.previous_response_id.as_deref(),
        }
    }

    fn set_continuation(&mut self, response_id: &str) {
        tracing::debug!(
            previous = ?self.previous_response_id,
            current = response_id,
            "continuation id updated"
        );
        self.previous_response_id = Some(response_id.to_string());
    }

    fn run_turn(&mut self, input: Vec<ConversationItem>, schema: Option<Value>) -> EventStream<'_> {
        self.interrupted.store(false, Ordering::SeqCst);

        boxed(try_stream! {
            let mut input = input;
            let mut rounds = 0;

            'turn: loop {
                let body = self.request_context().build(input, schema.clone());
                let bytes = self.transport.open(&body).await?;
                self.transcript.extend(body.input);

                let mut events = read_events(bytes, self.options.idle_timeout());
                let mut completed = None;

                loop {
                    // A silent connection must not delay an interrupt.
                    let next = tokio::select! {
                        biased;
                        _ = wait_for_interrupt(&self.interrupted) => None,
                        event = events.next() => Some(event),
                    };
                    let Some(next) = next else {
                        tracing::debug!("turn interrupted");
                        break 'turn;
                    };
                    let Some(event) = next else {
                        break;
                    };

                    let event = event?;
                    match &event {
                        StreamEvent::Created(e) => self.set_continuation(&e.response.id),
                        StreamEvent::Completed(e) => {
                            self.transcript.extend(e.response.output.iter().cloned());
                            completed = Some(e.response.clone());
                        }
                        _ => {}
                    }
                    yield event;
                }

                let Some(response) = completed else {
                    break;
                };
                if response.function_calls().next().is_none() {
                    break;
                }

                if rounds >= self.options.max_tool_rounds() {
                    tracing::warn!(rounds, "tool round limit reached, ending turn");
                    break;
                }

                let outputs = dispatch_function_calls(&self.registry, &response).await;
                if self.interrupted.load(Ordering::SeqCst) {
                    tracing::debug!("turn interrupted during tool calls");
                    break;
                }
                if outputs.is_empty() {
                    break;
                }
                rounds += 1;
                input = outputs;
            }
        })
    }
}

/// Resolves once `flag` is set.
async fn wait_for_interrupt(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(INTERRUPT_POLL).await;
    }
}

fn boxed_partials<'a, P, S>(stream: S) -> PartialStream<'a, P>
where
    S: Stream<Item = Result<P>> + Send + 'a,
{
    Box::pin(stream)
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("previous_response_id", &self.previous_response_id)
            .field("transcript", &format!("{} items", self.transcript.len()))
            .finish()
    }
}
