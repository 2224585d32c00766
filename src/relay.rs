//! Forwards one image to the LLaVA server and turns its event stream into
//! plain text fragments.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::fmt::Display;

use crate::config::UpstreamConfig;
use crate::error::ApiError;
use crate::frames::{FrameDecoder, parse_frame};
use crate::metrics::{ACTIVE_STREAMS, FRAGMENTS_FORWARDED, FRAMES_SKIPPED, UPSTREAM_CONNECT_SECONDS};
use crate::models::{CompletionRequest, ImagePayload};

/// Open the streaming completion call.
///
/// Fails with [`ApiError::UpstreamUnavailable`] when the server can't be
/// reached or answers with a non-2xx status; nothing has been sent to the
/// client at that point.
pub async fn connect(
    client: &reqwest::Client,
    config: &UpstreamConfig,
    image: &ImagePayload,
) -> Result<reqwest::Response, ApiError> {
    let payload = CompletionRequest::new(config, image);
    tracing::debug!(url = %config.url, n_predict = config.n_predict, "calling LLaVA server");

    let timer = UPSTREAM_CONNECT_SECONDS.start_timer();
    let result = client
        .post(&config.url)
        .json(&payload)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);
    timer.observe_duration();

    result.map_err(|e| {
        tracing::warn!(url = %config.url, "LLaVA server unavailable: {e}");
        ApiError::UpstreamUnavailable(e.to_string())
    })
}

/// Translate the upstream body into text fragments, in arrival order.
///
/// Frames that fail to parse are dropped. A read error ends the stream
/// quietly, keeping whatever was already forwarded. Dropping the returned
/// stream drops `byte_stream` and with it the upstream connection.
pub fn translate<E>(
    byte_stream: impl Stream<Item = Result<Bytes, E>> + Send + 'static,
) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static
where
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let _active = ActiveStream::enter();
        let mut decoder = FrameDecoder::new();
        let mut byte_stream = std::pin::pin!(byte_stream);
        let mut forwarded = 0usize;

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(forwarded, "upstream stream broke off: {e}");
                    return;
                }
            };

            let lines = decoder.push(&chunk);
            let dropped = decoder.take_dropped();
            if dropped > 0 {
                FRAMES_SKIPPED.inc_by(dropped as f64);
                tracing::debug!(dropped, "skipping oversized upstream frames");
            }

            for line in lines {
                if let Some(fragment) = extract(&line) {
                    forwarded += 1;
                    yield Ok::<_, Infallible>(fragment);
                }
            }
        }

        if let Some(fragment) = decoder.finish().as_deref().and_then(extract) {
            forwarded += 1;
            yield Ok::<_, Infallible>(fragment);
        }

        tracing::info!(forwarded, "description stream finished");
    }
}

fn extract(line: &[u8]) -> Option<String> {
    match parse_frame(line) {
        Ok(Some(fragment)) => {
            FRAGMENTS_FORWARDED.inc();
            Some(fragment)
        }
        Ok(None) => None,
        Err(e) => {
            FRAMES_SKIPPED.inc();
            tracing::debug!("skipping upstream frame: {e}");
            None
        }
    }
}

// Keeps the active-streams gauge right even when the client hangs up mid-stream
struct ActiveStream;

impl ActiveStream {
    fn enter() -> Self {
        ACTIVE_STREAMS.inc();
        ActiveStream
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        ACTIVE_STREAMS.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::MAX_LINE_BYTES;
    use futures::stream;
    use std::io;

    async fn run(chunks: Vec<Result<&'static str, io::Error>>) -> Vec<String> {
        let body = stream::iter(
            chunks
                .into_iter()
                .map(|chunk| chunk.map(|text| Bytes::from_static(text.as_bytes()))),
        );
        translate(body)
            .map(|fragment| match fragment {
                Ok(text) => text,
                Err(never) => match never {},
            })
            .collect()
            .await
    }

    #[tokio::test]
    async fn forwards_content_and_skips_bad_frames() {
        let out = run(vec![
            Ok("data: {\"content\":\"Hello\"}\n\n"),
            Ok("data: {\"content\":\" world\"}\n\n"),
            Ok("data: not-json\n\n"),
            Ok("data: {\"content\":\"\"}\n\n"),
        ])
        .await;

        assert_eq!(out, vec!["Hello", " world"]);
        assert_eq!(out.concat(), "Hello world");
    }

    #[tokio::test]
    async fn rechunking_does_not_change_output() {
        let whole =
            "data: {\"content\":\"A\"}\n\ndata: {\"content\":\" dog\"}\n\ndata: {\"content\":\" runs\"}\n\n";
        let (left, right) = whole.split_at(17);

        let merged = run(vec![Ok(whole)]).await.concat();
        let split = run(vec![Ok(left), Ok(right)]).await.concat();

        assert_eq!(merged, "A dog runs");
        assert_eq!(split, merged);
    }

    #[tokio::test]
    async fn read_error_keeps_partial_output() {
        let out = run(vec![
            Ok("data: {\"content\":\"partial\"}\n\n"),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok("data: {\"content\":\"never\"}\n\n"),
        ])
        .await;

        assert_eq!(out, vec!["partial"]);
    }

    #[tokio::test]
    async fn trailing_frame_without_newline_is_forwarded() {
        let out = run(vec![Ok("data: {\"content\":\"end\"}")]).await;
        assert_eq!(out, vec!["end"]);
    }

    #[tokio::test]
    async fn oversized_frame_does_not_stop_the_stream() {
        let junk: &'static str = Box::leak("x".repeat(MAX_LINE_BYTES + 1).into_boxed_str());
        let out = run(vec![
            Ok("data: {\"content\":\"before\"}\n\ndata: "),
            Ok(junk),
            Ok("\n\ndata: {\"content\":\" after\"}\n\n"),
        ])
        .await;

        assert_eq!(out.concat(), "before after");
    }

    #[tokio::test]
    async fn keep_alive_only_stream_is_empty() {
        let out = run(vec![Ok(": ping\n\n"), Ok("\n")]).await;
        assert!(out.is_empty());
    }
}
