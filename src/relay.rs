//! Stream relay decoder — turns the provider's SSE byte stream into a text
//! stream of content deltas.
//!
//! The provider frames events as `data: <json>` lines terminated by a blank
//! line. Frames arrive split across transport chunks at arbitrary byte
//! offsets, and several frames may share one chunk, so [`FrameDecoder`] keeps
//! the trailing incomplete fragment between chunks and re-splits on the frame
//! delimiter independent of chunk boundaries. [`relay`] pumps decoded deltas
//! to the caller immediately, in frame-completion order — the caller starts
//! receiving output while the provider is still generating, which is the whole
//! point of streaming mode.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt as _};
use serde_json::Value;
use tokio::sync::mpsc;

/// Outbound stream of content deltas handed to the HTTP response body.
pub type DeltaStream = Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send>>;

/// SSE frame delimiter: a blank line.
const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Prefix of data-carrying frames; anything else (comments, event names) is
/// ignored, not an error.
const DATA_PREFIX: &str = "data:";

/// Payload marking the end of the stream.
const DONE_SENTINEL: &str = "[DONE]";

/// A decoded event frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// One incremental text fragment, to be forwarded as-is.
    Delta(String),
    /// The termination sentinel — no further deltas will follow.
    Done,
}

/// Incremental SSE frame parser.
///
/// Owns the carry-over buffer for the duration of one request. Operates on
/// bytes rather than text so a multi-byte character split across two chunks
/// is reassembled before UTF-8 decoding.
#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    carry: Vec<u8>,
    finished: bool,
    parse_failures: u32,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many frames failed to parse so far. A nonzero count is only a
    /// failure when no delta was ever produced — see [`relay`].
    pub fn parse_failures(&self) -> u32 {
        self.parse_failures
    }

    /// Feed one transport chunk; returns the frames it completed, in order.
    ///
    /// After [`Frame::Done`] has been produced all further input is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.finished {
            return frames;
        }
        // CR bytes can only be line-ending framing: JSON escapes control
        // characters inside strings, and 0x0D is never a UTF-8 continuation
        // byte. Stripping them up front makes CRLF providers look like LF ones.
        self.carry.extend(chunk.iter().filter(|&&b| b != b'\r'));

        while let Some(pos) = find_delimiter(&self.carry) {
            let raw: Vec<u8> = self.carry.drain(..pos + FRAME_DELIMITER.len()).collect();
            match self.parse_frame(&raw[..pos]) {
                Some(Frame::Done) => {
                    self.finished = true;
                    self.carry.clear();
                    frames.push(Frame::Done);
                    return frames;
                }
                Some(frame) => frames.push(frame),
                None => {}
            }
        }
        frames
    }

    /// Parse one complete frame. `None` means "nothing to forward": a non-data
    /// frame, a delta-less chunk, or a malformed payload (logged and skipped —
    /// one corrupt frame must not lose the rest of the stream). Malformed
    /// payloads additionally bump `parse_failures`.
    fn parse_frame(&mut self, raw: &[u8]) -> Option<Frame> {
        let frame = match std::str::from_utf8(raw) {
            Ok(s) => s.trim(),
            Err(e) => {
                self.parse_failures += 1;
                tracing::debug!(error = %e, "skipping non-UTF-8 stream frame");
                return None;
            }
        };

        let payload = frame.strip_prefix(DATA_PREFIX)?.trim();
        if payload == DONE_SENTINEL {
            return Some(Frame::Done);
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(event) => event
                .pointer("/choices/0/delta/content")
                .and_then(Value::as_str)
                .map(|text| Frame::Delta(text.to_string())),
            Err(e) => {
                self.parse_failures += 1;
                tracing::debug!(error = %e, "skipping malformed stream frame");
                None
            }
        }
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
}

/// Pump the provider's byte stream through a [`FrameDecoder`] and forward each
/// delta to the returned [`DeltaStream`] as soon as its frame completes.
///
/// Termination:
/// - `[DONE]` sentinel → outbound channel closes, remaining inbound is ignored;
/// - natural inbound end without the sentinel → clean close (some providers
///   omit the sentinel on cooperative shutdown);
/// - inbound transport failure → one `Err` item, then close;
/// - every frame malformed and not a single delta produced → one `Err` item at
///   stream end, so the caller sees a failure instead of a silent empty body;
/// - caller disconnect → the send fails, the task returns and the inbound
///   stream is dropped within one chunk-read cycle. No orphaned work remains.
pub fn relay<S, E>(inbound: S) -> DeltaStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::channel::<anyhow::Result<Bytes>>(32);

    tokio::spawn(async move {
        let mut inbound = std::pin::pin!(inbound);
        let mut decoder = FrameDecoder::new();
        let mut deltas_sent = 0usize;

        while let Some(chunk) = inbound.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx
                        .send(Err(anyhow::Error::new(e).context("reading provider stream")))
                        .await;
                    return;
                }
            };

            for frame in decoder.feed(&bytes) {
                match frame {
                    Frame::Delta(text) => {
                        if tx.send(Ok(Bytes::from(text))).await.is_err() {
                            return; // caller disconnected — stop reading inbound
                        }
                        deltas_sent += 1;
                    }
                    Frame::Done => {
                        report_empty_if_all_malformed(&tx, deltas_sent, &decoder).await;
                        return;
                    }
                }
            }
        }
        // inbound ended without a sentinel — normal completion
        report_empty_if_all_malformed(&tx, deltas_sent, &decoder).await;
    });

    Box::pin(futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx)))
}

/// A corrupt frame among good ones is skipped, but a stream that produced
/// nothing except corrupt frames is a provider failure, not an empty answer.
async fn report_empty_if_all_malformed(
    tx: &mpsc::Sender<anyhow::Result<Bytes>>,
    deltas_sent: usize,
    decoder: &FrameDecoder,
) {
    if deltas_sent == 0 && decoder.parse_failures() > 0 {
        let _ = tx
            .send(Err(anyhow::anyhow!(
                "provider stream contained only malformed frames ({} parse failures, no content)",
                decoder.parse_failures()
            )))
            .await;
    }
}
