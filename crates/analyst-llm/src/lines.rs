//! Line framing for streamed HTTP bodies.
//!
//! Ollama streams newline-delimited JSON and Gemini streams server-sent
//! events; both reduce to "split the byte stream on `\n`". Bytes are
//! buffered until a full line is available so multi-byte characters split
//! across network chunks survive intact.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use crate::error::LlmError;

struct LineState<S> {
    inner: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turn a stream of byte chunks into a stream of complete, non-empty lines.
///
/// Trailing `\r` is removed. A final unterminated line is emitted when the
/// body ends.
pub fn line_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let state = LineState {
        inner: Box::pin(bytes),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                return Some((Ok(line), state));
            }
            if state.finished {
                return None;
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    while let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                        let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                        push_line(&mut state.pending, &raw[..raw.len() - 1]);
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((
                        Err(LlmError::Transport(format!("stream read error: {}", e))),
                        state,
                    ));
                }
                None => {
                    state.finished = true;
                    let rest = std::mem::take(&mut state.buffer);
                    push_line(&mut state.pending, &rest);
                }
            }
        }
    })
}

fn push_line(pending: &mut VecDeque<String>, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\r');
    if !line.trim().is_empty() {
        pending.push_back(line.to_string());
    }
}
