use std::convert::Infallible;

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::error::ProxyError;
use crate::protocol::chunk::StreamChunk;
use crate::rewrite::fim::END_OF_SENTENCE_TOKEN;
use crate::util::unix_now_secs;

use super::frame_reader::ReaderSignal;
use super::sse::{done_event, encode_sse_event, DONE_PAYLOAD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TranslatorState {
    Streaming,
    /// Upstream sent `[DONE]`; waiting for the reader to report exhaustion.
    Draining,
    Done,
}

/// Re-encodes upstream chunks for the code completion client and owns the
/// single finish chunk and terminator.
#[derive(Debug)]
pub struct StreamTranslator {
    response_id: String,
    model: String,
    blank_end_of_sentence: bool,
    state: TranslatorState,
}

impl StreamTranslator {
    #[must_use]
    pub fn new(response_id: String, model: String, blank_end_of_sentence: bool) -> Self {
        Self {
            response_id,
            model,
            blank_end_of_sentence,
            state: TranslatorState::Streaming,
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == TranslatorState::Done
    }

    /// Translate one upstream payload into at most one client event.
    pub fn on_frame(&mut self, payload: &str) -> Option<Bytes> {
        if self.state != TranslatorState::Streaming {
            return None;
        }
        if payload == DONE_PAYLOAD {
            self.state = TranslatorState::Draining;
            return None;
        }

        let mut chunk = match parse_chunk(payload) {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::warn!(
                    request_id = %self.response_id,
                    error = %err,
                    payload,
                    "skipping undecodable stream frame"
                );
                return None;
            }
        };
        if self.blank_end_of_sentence {
            chunk.blank_first_content_if(END_OF_SENTENCE_TOKEN);
        }

        match serde_json::to_string(&chunk) {
            Ok(json) => Some(encode_sse_event(&json)),
            Err(err) => {
                tracing::error!(
                    request_id = %self.response_id,
                    error = %err,
                    "failed to encode stream chunk"
                );
                None
            }
        }
    }

    /// Upstream ended: emit the finish chunk and the terminator, exactly once.
    pub fn on_exhausted(&mut self, created: i64) -> Option<(Bytes, Bytes)> {
        if self.is_done() {
            return None;
        }
        self.state = TranslatorState::Done;

        let finish = StreamChunk::finish(&self.response_id, created, &self.model);
        let finish = match serde_json::to_string(&finish) {
            Ok(json) => encode_sse_event(&json),
            Err(err) => {
                tracing::error!(
                    request_id = %self.response_id,
                    error = %err,
                    "failed to encode finish chunk"
                );
                return Some((Bytes::new(), done_event()));
            }
        };
        Some((finish, done_event()))
    }
}

fn parse_chunk(payload: &str) -> Result<StreamChunk, ProxyError> {
    serde_json::from_str(payload).map_err(|err| ProxyError::FrameDecode(err.to_string()))
}

struct BodyState {
    signals: mpsc::Receiver<ReaderSignal>,
    translator: StreamTranslator,
    pending: Option<Bytes>,
}

/// Client body: one item per SSE event, ending after the terminator.
pub fn translated_body(
    signals: mpsc::Receiver<ReaderSignal>,
    translator: StreamTranslator,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    futures_util::stream::unfold(
        BodyState {
            signals,
            translator,
            pending: None,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.take() {
                    return Some((Ok(event), state));
                }
                if state.translator.is_done() {
                    return None;
                }

                match state.signals.recv().await {
                    Some(ReaderSignal::Frame(payload)) => {
                        if let Some(event) = state.translator.on_frame(&payload) {
                            return Some((Ok(event), state));
                        }
                    }
                    Some(ReaderSignal::Exhausted) | None => {
                        let (finish, done) = state.translator.on_exhausted(unix_now_secs())?;
                        state.pending = Some(done);
                        if !finish.is_empty() {
                            return Some((Ok(finish), state));
                        }
                    }
                }
            }
        },
    )
}
