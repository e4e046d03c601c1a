//! Normalization of backend streams into incremental text.
//!
//! Backends either send deltas or resend their whole output on every update.
//! Downstream consumers only ever see deltas: for cumulative streams the
//! normalizer remembers how much it has already emitted and yields the
//! remainder of each snapshot.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;

use crate::error::{LlmError, LlmResult};
use crate::types::{RawChunk, StreamShape};

/// Stateful converter for one stream.
#[derive(Debug)]
pub struct StreamNormalizer {
    shape: StreamShape,
    /// Bytes of the cumulative text already emitted
    emitted_len: usize,
}

impl StreamNormalizer {
    pub fn new(shape: StreamShape) -> Self {
        Self {
            shape,
            emitted_len: 0,
        }
    }

    pub fn shape(&self) -> StreamShape {
        self.shape
    }

    /// Feed one raw chunk. Returns the new text, or `None` when the chunk
    /// added nothing.
    pub fn push(&mut self, chunk: RawChunk) -> LlmResult<Option<String>> {
        match (self.shape, chunk) {
            (StreamShape::Incremental, RawChunk::Delta(text)) => {
                Ok((!text.is_empty()).then_some(text))
            }
            (StreamShape::Cumulative, RawChunk::Snapshot(value)) => {
                let text = snapshot_text(&value)?;
                self.take_suffix(text)
            }
            (shape, chunk) => Err(LlmError::stream_shape(format!(
                "{} chunk in a {} stream",
                chunk.kind(),
                shape
            ))),
        }
    }

    fn take_suffix(&mut self, snapshot: &str) -> LlmResult<Option<String>> {
        if snapshot.len() < self.emitted_len {
            return Err(LlmError::stream_shape(format!(
                "cumulative text shrank from {} to {} bytes",
                self.emitted_len,
                snapshot.len()
            )));
        }
        if !snapshot.is_char_boundary(self.emitted_len) {
            return Err(LlmError::stream_shape(format!(
                "emitted prefix of {} bytes splits a character",
                self.emitted_len
            )));
        }

        let suffix = &snapshot[self.emitted_len..];
        self.emitted_len = snapshot.len();
        Ok((!suffix.is_empty()).then(|| suffix.to_string()))
    }
}

/// Extract the cumulative text from a snapshot payload.
///
/// Accepts a bare string, or a non-empty list whose first element is a string
/// or an object with a string `text` field.
pub fn snapshot_text(value: &Value) -> LlmResult<&str> {
    let text = match value {
        Value::String(text) => Some(text.as_str()),
        Value::Array(items) => match items.first() {
            Some(Value::String(text)) => Some(text.as_str()),
            Some(Value::Object(fields)) => fields.get("text").and_then(Value::as_str),
            _ => None,
        },
        _ => None,
    };

    text.ok_or_else(|| LlmError::stream_shape(format!("unrecognized snapshot payload: {}", value)))
}

/// Normalize a raw backend stream into text deltas.
///
/// Chunks that add no text are skipped. The stream ends after the first
/// error, whether it came from the backend or from a shape violation.
pub fn normalize<S>(shape: StreamShape, raw: S) -> BoxStream<'static, LlmResult<String>>
where
    S: Stream<Item = LlmResult<RawChunk>> + Send + 'static,
{
    let state = (raw.boxed(), StreamNormalizer::new(shape), false);

    stream::unfold(state, |(mut raw, mut normalizer, failed)| async move {
        if failed {
            return None;
        }
        loop {
            let pushed = match raw.next().await? {
                Ok(chunk) => normalizer.push(chunk),
                Err(e) => Err(e),
            };
            match pushed {
                Ok(Some(text)) => return Some((Ok(text), (raw, normalizer, false))),
                Ok(None) => continue,
                Err(e) => return Some((Err(e), (raw, normalizer, true))),
            }
        }
    })
    .boxed()
}
