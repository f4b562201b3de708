//! Streaming response pipeline.
//!
//! A spawned pump task owns the upstream byte stream, the frame parser,
//! the scrubber, and the keep-alive timer for one response. It writes
//! re-serialized SSE frames into a bounded channel that backs the HTTP
//! response body, so a slow client suspends consumption of the upstream
//! stream instead of letting frames pile up. Dropping the task (normal
//! end, upstream error, or client disconnect surfacing as a closed
//! channel) cancels the timer with it.

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::sse::{FrameParser, SseFrame};
use crate::scrub::TagScrubber;

/// Bounded frame backlog towards the client.
const CHANNEL_CAPACITY: usize = 32;

/// Out-of-band comment any compliant SSE consumer ignores.
const KEEP_ALIVE_COMMENT: &[u8] = b": keep-alive\n\n";

/// Terminal sentinel frame.
const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Build the event-stream response and spawn its pump task.
pub fn streaming_response(upstream: reqwest::Response, heartbeat: Duration) -> Response {
    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(CHANNEL_CAPACITY);
    tokio::spawn(pump(upstream.bytes_stream(), heartbeat, tx));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap()
}

/// Consume the upstream stream to completion, forwarding scrubbed frames.
async fn pump<S, E>(chunks: S, heartbeat: Duration, tx: mpsc::Sender<std::io::Result<Bytes>>)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut chunks = Box::pin(chunks);
    let mut parser = FrameParser::new();
    let mut scrubber = TagScrubber::new();

    // interval_at panics on a zero period; a zero heartbeat turns the
    // keep-alive comments off instead.
    let heartbeat_enabled = !heartbeat.is_zero();
    let period = if heartbeat_enabled {
        heartbeat
    } else {
        Duration::from_secs(86_400)
    };
    // First tick after one full interval, not immediately.
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);

    let mut done_seen = false;

    'outer: loop {
        tokio::select! {
            chunk = chunks.next() => match chunk {
                Some(Ok(bytes)) => {
                    for frame in parser.push_chunk(&bytes) {
                        match frame {
                            SseFrame::Done => {
                                done_seen = true;
                                break 'outer;
                            }
                            SseFrame::Data(value) => {
                                if let Some(out) = scrub_frame(value, &mut scrubber) {
                                    if tx.send(Ok(out)).await.is_err() {
                                        // Client went away.
                                        return;
                                    }
                                }
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    tracing::error!(error = %err, "error reading upstream stream");
                    break 'outer;
                }
                None => break 'outer,
            },
            _ = ticker.tick(), if heartbeat_enabled => {
                if tx.send(Ok(Bytes::from_static(KEEP_ALIVE_COMMENT))).await.is_err() {
                    return;
                }
            }
        }
    }

    // A final line may have arrived without its newline.
    if !done_seen {
        if let Some(SseFrame::Data(value)) = parser.finish() {
            if let Some(out) = scrub_frame(value, &mut scrubber) {
                if tx.send(Ok(out)).await.is_err() {
                    return;
                }
            }
        }
    }

    let _ = tx.send(Ok(Bytes::from_static(DONE_FRAME))).await;
}

/// Scrub the delta content of one chunk and re-serialize it as an SSE frame.
///
/// Only the text increment is read or mutated; every other field passes
/// through unchanged. Returns `None` for a frame whose delta carried
/// nothing but content that scrubbed to empty, unless the chunk also
/// carries a finish_reason.
fn scrub_frame(mut value: serde_json::Value, scrubber: &mut TagScrubber) -> Option<Bytes> {
    let has_finish_reason = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("finish_reason"))
        .map(|f| !f.is_null())
        .unwrap_or(false);

    let mut drop_frame = false;
    if let Some(delta) = value
        .get_mut("choices")
        .and_then(|c| c.as_array_mut())
        .and_then(|c| c.first_mut())
        .and_then(|c| c.get_mut("delta"))
        .and_then(|d| d.as_object_mut())
    {
        if let Some(content) = delta.get("content").and_then(|c| c.as_str()) {
            let had_text = !content.is_empty();
            let scrubbed = scrubber.scrub_fragment(content);
            let fully_scrubbed = had_text && scrubbed.is_empty();
            delta.insert("content".to_string(), serde_json::Value::String(scrubbed));

            // A delta that was all thinking, with nothing else on it,
            // is withheld entirely.
            drop_frame = fully_scrubbed && delta.len() == 1 && !has_finish_reason;
        }
    }

    if drop_frame {
        return None;
    }
    Some(Bytes::from(format!("data: {}\n\n", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn keep_alive_comment_while_upstream_stalls() {
        let (chunk_tx, chunk_rx) = mpsc::channel::<std::io::Result<Bytes>>(4);
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(pump(
            ReceiverStream::new(chunk_rx),
            Duration::from_secs(10),
            tx,
        ));

        // Nothing from upstream yet: after one interval the first thing
        // out is a keep-alive comment, not a data frame.
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(&first[..], KEEP_ALIVE_COMMENT);

        chunk_tx
            .send(Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n",
            )))
            .await
            .unwrap();

        let data = rx.recv().await.unwrap().unwrap();
        assert!(std::str::from_utf8(&data).unwrap().contains("\"hi\""));
        let last = rx.recv().await.unwrap().unwrap();
        assert_eq!(&last[..], DONE_FRAME);
        // The sentinel ends the stream; no keep-alives after it.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn zero_heartbeat_streams_without_panic() {
        let (chunk_tx, chunk_rx) = mpsc::channel::<std::io::Result<Bytes>>(4);
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(pump(ReceiverStream::new(chunk_rx), Duration::ZERO, tx));

        chunk_tx
            .send(Ok(Bytes::from_static(b"data: {\"x\":1}\n\ndata: [DONE]\n\n")))
            .await
            .unwrap();
        drop(chunk_tx);

        let data = rx.recv().await.unwrap().unwrap();
        assert!(std::str::from_utf8(&data).unwrap().starts_with("data: "));
        let last = rx.recv().await.unwrap().unwrap();
        assert_eq!(&last[..], DONE_FRAME);
        handle.await.unwrap();
    }

    fn content_of(bytes: &Bytes) -> serde_json::Value {
        let text = std::str::from_utf8(bytes).unwrap();
        let payload = text.strip_prefix("data: ").unwrap().trim_end();
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn scrub_frame_passthrough() {
        let mut scrubber = TagScrubber::new();
        let out = scrub_frame(
            json!({"choices":[{"delta":{"content":"Hello"}}]}),
            &mut scrubber,
        )
        .unwrap();
        assert_eq!(
            content_of(&out)["choices"][0]["delta"]["content"],
            "Hello"
        );
    }

    #[test]
    fn scrub_frame_splits_across_frames() {
        let mut scrubber = TagScrubber::new();

        let first = scrub_frame(
            json!({"choices":[{"delta":{"content":"Hello <think>"}}]}),
            &mut scrubber,
        )
        .unwrap();
        assert_eq!(
            content_of(&first)["choices"][0]["delta"]["content"],
            "Hello "
        );

        let second = scrub_frame(
            json!({"choices":[{"delta":{"content":"secret</think> world"}}]}),
            &mut scrubber,
        )
        .unwrap();
        assert_eq!(
            content_of(&second)["choices"][0]["delta"]["content"],
            " world"
        );
    }

    #[test]
    fn all_thinking_delta_dropped() {
        let mut scrubber = TagScrubber::new();
        scrub_frame(
            json!({"choices":[{"delta":{"content":"<think>"}}]}),
            &mut scrubber,
        );

        let mid = scrub_frame(
            json!({"choices":[{"delta":{"content":"pure reasoning"}}]}),
            &mut scrubber,
        );
        assert!(mid.is_none(), "fully scrubbed content-only frame is dropped");
    }

    #[test]
    fn finish_reason_frame_survives_scrubbing() {
        let mut scrubber = TagScrubber::new();
        scrub_frame(
            json!({"choices":[{"delta":{"content":"<think>"}}]}),
            &mut scrubber,
        );

        let last = scrub_frame(
            json!({"choices":[{"delta":{"content":"trailing thought"},"finish_reason":"stop"}]}),
            &mut scrubber,
        )
        .unwrap();
        let value = content_of(&last);
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["choices"][0]["delta"]["content"], "");
    }

    #[test]
    fn role_delta_without_content_untouched() {
        let mut scrubber = TagScrubber::new();
        let out = scrub_frame(
            json!({"choices":[{"delta":{"role":"assistant"}}]}),
            &mut scrubber,
        )
        .unwrap();
        assert_eq!(content_of(&out)["choices"][0]["delta"]["role"], "assistant");
    }

    #[test]
    fn frame_fields_pass_through() {
        let mut scrubber = TagScrubber::new();
        let out = scrub_frame(
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "usage": {"prompt_tokens": 3},
                "choices": [{"delta":{"content":"hi"}}]
            }),
            &mut scrubber,
        )
        .unwrap();
        let value = content_of(&out);
        assert_eq!(value["id"], "chatcmpl-1");
        assert_eq!(value["usage"]["prompt_tokens"], 3);
    }
}
