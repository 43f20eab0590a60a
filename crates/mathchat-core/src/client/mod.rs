//! Streaming chat client for the model backend.
//!
//! One call to [`StreamingClient::send`] is one request/response
//! exchange: post the context, decode the NDJSON body as it arrives,
//! route each frame's deltas to the reasoning or answer channel, and
//! invoke the per-channel callbacks with the cumulative text so far.
//! Callbacks always receive the full prefix, never a bare delta, so a
//! stateless formatter can be re-applied on every update.

pub mod ndjson;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, ChatResult};
use crate::message::ContextMessage;
use ndjson::{FrameDecoder, StreamFrame};

const CHAT_PATH: &str = "/api/chat";

/// Returned when the stream settled without a single delta on either
/// channel.
pub const NO_RESPONSE: &str = "No response";

/// Cancellation handle for one in-flight exchange.
///
/// Wraps a [`CancellationToken`] together with a flag recording
/// whether the owner itself requested the cancellation. A token that
/// fires without the flag is reported as an unexpected cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    user_initiated: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the cancellation as user-initiated, then fires the token.
    pub fn cancel(&self) {
        self.user_initiated.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    /// Fires the token without the user flag. Used on teardown paths
    /// that are not a user action; the failure surfaces as an
    /// unexpected cancellation.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn error(&self) -> ChatError {
        ChatError::Cancelled {
            user_initiated: self.user_initiated.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ContextMessage],
    stream: bool,
}

/// Client for the backend's streaming chat endpoint.
#[derive(Debug, Clone)]
pub struct StreamingClient {
    http: reqwest::Client,
    base_url: String,
}

impl StreamingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}{CHAT_PATH}", self.base_url.trim_end_matches('/'))
    }

    /// Sends one chat request and streams the response.
    ///
    /// `on_reasoning` and `on_answer` each receive the cumulative text
    /// of their channel after every delta, in strictly increasing
    /// length. Resolves with the cumulative answer; with the
    /// cumulative reasoning when no answer delta ever arrived; with
    /// [`NO_RESPONSE`] when nothing arrived at all.
    ///
    /// Does not touch session state; recording the result in history
    /// is the caller's job after `send` settles.
    ///
    /// # Errors
    /// `NoModelSelected` when `model` is empty, `Backend` on a
    /// non-success status, `Cancelled` when the handle fires, and
    /// `Transport` for network failures.
    pub async fn send(
        &self,
        model: &str,
        messages: &[ContextMessage],
        on_reasoning: impl FnMut(&str),
        on_answer: impl FnMut(&str),
        cancel: &CancelHandle,
    ) -> ChatResult<String> {
        if model.trim().is_empty() {
            return Err(ChatError::NoModelSelected);
        }

        let request = ChatRequest {
            model,
            messages,
            stream: true,
        };

        if cancel.is_cancelled() {
            return Err(cancel.error());
        }
        let response = tokio::select! {
            () = cancel.token.cancelled() => return Err(cancel.error()),
            sent = self.http.post(self.chat_url()).json(&request).send() => {
                sent.map_err(|err| ChatError::Transport(err.to_string()))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Backend {
                status: status.as_u16(),
                status_text: status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string(),
            });
        }

        read_stream(response.bytes_stream(), on_reasoning, on_answer, cancel).await
    }
}

/// Drives the frame decoder over the body stream, routing each frame's
/// deltas to its channel accumulator.
async fn read_stream<S, E>(
    mut body: S,
    mut on_reasoning: impl FnMut(&str),
    mut on_answer: impl FnMut(&str),
    cancel: &CancelHandle,
) -> ChatResult<String>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut decoder = FrameDecoder::new();
    let mut reasoning = String::new();
    let mut answer = String::new();
    let mut done = false;

    'read: loop {
        if cancel.is_cancelled() {
            return Err(cancel.error());
        }
        let chunk = tokio::select! {
            () = cancel.token.cancelled() => return Err(cancel.error()),
            next = body.next() => next,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk.map_err(|err| ChatError::Transport(err.to_string()))?;

        for frame in decoder.feed(&chunk) {
            route_frame(
                &frame,
                &mut reasoning,
                &mut answer,
                &mut on_reasoning,
                &mut on_answer,
            );
            if frame.done {
                done = true;
                break 'read;
            }
        }
    }

    if !done && let Some(frame) = decoder.finish() {
        route_frame(
            &frame,
            &mut reasoning,
            &mut answer,
            &mut on_reasoning,
            &mut on_answer,
        );
    }

    Ok(final_text(reasoning, answer))
}

/// Appends a frame's deltas to the channel accumulators and notifies
/// the matching callbacks with the grown prefix.
fn route_frame(
    frame: &StreamFrame,
    reasoning: &mut String,
    answer: &mut String,
    on_reasoning: &mut impl FnMut(&str),
    on_answer: &mut impl FnMut(&str),
) {
    let Some(message) = &frame.message else {
        return;
    };
    if let Some(delta) = message.thinking.as_deref()
        && !delta.is_empty()
    {
        reasoning.push_str(delta);
        on_reasoning(reasoning);
    }
    if let Some(delta) = message.content.as_deref()
        && !delta.is_empty()
    {
        answer.push_str(delta);
        on_answer(answer);
    }
}

fn final_text(reasoning: String, answer: String) -> String {
    if !answer.is_empty() {
        answer
    } else if !reasoning.is_empty() {
        reasoning
    } else {
        NO_RESPONSE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures_util::stream;

    use super::*;

    fn ok_chunks(
        lines: &[&str],
    ) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        let chunks: Vec<Result<Bytes, Infallible>> = lines
            .iter()
            .map(|line| Ok(Bytes::from(format!("{line}\n"))))
            .collect();
        stream::iter(chunks)
    }

    #[tokio::test]
    async fn reasoning_then_answer_callbacks_are_cumulative_and_ordered() {
        let body = ok_chunks(&[
            r#"{"message":{"thinking":"a"}}"#,
            r#"{"message":{"thinking":"b"}}"#,
            r#"{"message":{"thinking":"c"}}"#,
            r#"{"message":{"content":"x"}}"#,
            r#"{"message":{"content":"y"}}"#,
        ]);

        let mut reasoning_updates = Vec::new();
        let mut answer_updates = Vec::new();
        let cancel = CancelHandle::new();

        let result = read_stream(
            body,
            |text: &str| reasoning_updates.push(text.to_string()),
            |text: &str| answer_updates.push(text.to_string()),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(reasoning_updates, vec!["a", "ab", "abc"]);
        assert_eq!(answer_updates, vec!["x", "xy"]);
        assert_eq!(result, "xy");
    }

    #[tokio::test]
    async fn both_channels_in_one_frame() {
        let body = ok_chunks(&[r#"{"message":{"thinking":"think","content":"answer"}}"#]);

        let mut reasoning_updates = Vec::new();
        let mut answer_updates = Vec::new();
        let cancel = CancelHandle::new();

        let result = read_stream(
            body,
            |text: &str| reasoning_updates.push(text.to_string()),
            |text: &str| answer_updates.push(text.to_string()),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(reasoning_updates, vec!["think"]);
        assert_eq!(answer_updates, vec!["answer"]);
        assert_eq!(result, "answer");
    }

    #[tokio::test]
    async fn falls_back_to_reasoning_when_no_answer_arrived() {
        let body = ok_chunks(&[
            r#"{"message":{"thinking":"only "}}"#,
            r#"{"message":{"thinking":"thoughts"}}"#,
        ]);
        let cancel = CancelHandle::new();

        let result = read_stream(body, |_: &str| {}, |_: &str| {}, &cancel)
            .await
            .unwrap();
        assert_eq!(result, "only thoughts");
    }

    #[tokio::test]
    async fn empty_stream_yields_sentinel() {
        let body = ok_chunks(&[]);
        let cancel = CancelHandle::new();

        let result = read_stream(body, |_: &str| {}, |_: &str| {}, &cancel)
            .await
            .unwrap();
        assert_eq!(result, NO_RESPONSE);
    }

    #[tokio::test]
    async fn done_flag_ends_the_loop_early() {
        let body = ok_chunks(&[
            r#"{"message":{"content":"kept"}}"#,
            r#"{"done":true}"#,
            r#"{"message":{"content":" dropped"}}"#,
        ]);
        let cancel = CancelHandle::new();

        let result = read_stream(body, |_: &str| {}, |_: &str| {}, &cancel)
            .await
            .unwrap();
        assert_eq!(result, "kept");
    }

    #[tokio::test]
    async fn malformed_lines_do_not_fault_the_exchange() {
        let body = ok_chunks(&["not json", r#"{"message":{"content":"ok"}}"#, "{}"]);

        let mut answer_updates = Vec::new();
        let cancel = CancelHandle::new();

        let result = read_stream(
            body,
            |_: &str| {},
            |text: &str| answer_updates.push(text.to_string()),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(answer_updates, vec!["ok"]);
        assert_eq!(result, "ok");
    }

    #[tokio::test]
    async fn cancel_before_first_chunk_reports_user_initiated() {
        let body = stream::pending::<Result<Bytes, Infallible>>();
        let cancel = CancelHandle::new();
        cancel.cancel();

        let callbacks = std::cell::Cell::new(0u32);
        let result = read_stream(
            body,
            |_: &str| callbacks.set(callbacks.get() + 1),
            |_: &str| callbacks.set(callbacks.get() + 1),
            &cancel,
        )
        .await;

        assert_eq!(
            result,
            Err(ChatError::Cancelled {
                user_initiated: true,
            })
        );
        assert_eq!(callbacks.get(), 0);
    }

    #[tokio::test]
    async fn token_fired_without_flag_is_unexpected() {
        let body = stream::pending::<Result<Bytes, Infallible>>();
        let cancel = CancelHandle::new();
        cancel.abort();

        let result = read_stream(body, |_: &str| {}, |_: &str| {}, &cancel).await;
        assert_eq!(
            result,
            Err(ChatError::Cancelled {
                user_initiated: false,
            })
        );
    }

    #[tokio::test]
    async fn transport_error_mid_stream_propagates() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"message\":{\"content\":\"x\"}}\n")),
            Err(std::io::Error::other("connection reset")),
        ];
        let cancel = CancelHandle::new();

        let result =
            read_stream(stream::iter(chunks), |_: &str| {}, |_: &str| {}, &cancel).await;
        assert!(matches!(result, Err(ChatError::Transport(_))));
    }

    #[tokio::test]
    async fn trailing_unterminated_record_is_flushed() {
        let chunks: Vec<Result<Bytes, Infallible>> =
            vec![Ok(Bytes::from_static(b"{\"message\":{\"content\":\"tail\"}}"))];
        let cancel = CancelHandle::new();

        let result =
            read_stream(stream::iter(chunks), |_: &str| {}, |_: &str| {}, &cancel)
                .await
                .unwrap();
        assert_eq!(result, "tail");
    }

    #[tokio::test]
    async fn empty_model_is_rejected_before_any_io() {
        let client = StreamingClient::new("http://localhost:0");
        let cancel = CancelHandle::new();
        let result = client
            .send("", &[], |_: &str| {}, |_: &str| {}, &cancel)
            .await;
        assert_eq!(result, Err(ChatError::NoModelSelected));
    }
}
