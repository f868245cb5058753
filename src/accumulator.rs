//! Incremental accumulation of structured output.
//!
//! [`PartialAccumulator`] owns the text buffer of one response. Every text
//! delta is appended, the whole buffer is re-parsed with
//! [`parse_partial`](crate::partial::parse_partial), and when the parsed value
//! has changed it is projected into the caller's partial type. The buffer only
//! ever grows; intermediate failures simply produce no update.
//!
//! At the end of the response [`PartialAccumulator::finish`] requires the buffer
//! to be one complete JSON document that projects cleanly. Anything else is an
//! [`Error::Output`].

use crate::partial::{PartialParse, parse_partial};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Project a generic JSON value into a typed (partial) result.
///
/// Projection has no hidden state: the same value always yields the same result.
pub fn project<P: DeserializeOwned>(value: &Value) -> Result<P> {
    P::deserialize(value).map_err(|e| Error::output(format!("cannot project output: {}", e)))
}

/// Accumulates text deltas of one response into successive partial results.
#[derive(Debug)]
pub struct PartialAccumulator<P> {
    buffer: String,
    last: Option<Value>,
    _partial: PhantomData<fn() -> P>,
}

impl<P> Default for PartialAccumulator<P> {
    fn default() -> Self {
        Self {
            buffer: String::new(),
            last: None,
            _partial: PhantomData,
        }
    }
}

impl<P: DeserializeOwned> PartialAccumulator<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Append `delta` and return a new partial result if the parseable content
    /// changed and projects into `P`.
    pub fn push(&mut self, delta: &str) -> Option<P> {
        self.buffer.push_str(delta);

        let value = match parse_partial(&self.buffer) {
            PartialParse::Complete(value) | PartialParse::Incomplete(Some(value)) => value,
            PartialParse::Incomplete(None) => return None,
            PartialParse::Invalid(reason) => {
                tracing::trace!(%reason, "structured output not parseable yet");
                return None;
            }
        };

        if self.last.as_ref() == Some(&value) {
            return None;
        }

        match project::<P>(&value) {
            Ok(partial) => {
                self.last = Some(value);
                Some(partial)
            }
            Err(e) => {
                tracing::trace!(error = %e, "partial output does not project yet");
                None
            }
        }
    }

    /// The most recently yielded partial result.
    pub fn current(&self) -> Option<P> {
        self.last.as_ref().and_then(|value| project(value).ok())
    }

    /// Validate the final buffer and return the last result.
    pub fn finish(self) -> Result<P> {
        if self.buffer.trim().is_empty() {
            return Err(Error::output("model produced no structured output"));
        }
        let value: Value = serde_json::from_str(&self.buffer)
            .map_err(|e| Error::output(format!("final output is not valid JSON: {}", e)))?;
        project(&value)
    }
}
