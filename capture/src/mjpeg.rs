use bytes::{Buf, Bytes, BytesMut};
use preesense_common::frame::{EOI, SOI};
use tracing::{debug, warn};

/// Smallest cap that can still hold one marker pair.
const MIN_BUFFER: usize = SOI.len() + EOI.len();

/// Incremental demultiplexer for a motion-JPEG elementary stream.
///
/// Frames are concatenated back-to-back with no length prefix, so the only
/// framing is the SOI/EOI marker pair. Chunks may split a frame (or a marker)
/// anywhere. Only the newest frame in each chunk is surfaced; a live preview
/// has no use for stale ones.
///
/// Buffer invariant between calls: the buffer is empty, holds a single
/// `0xFF` that may begin a split SOI, or starts with SOI and contains no EOI
/// after it.
pub struct MjpegExtractor {
    buffer: BytesMut,
    latest: Option<Bytes>,
    max_buffer: usize,
    /// Where the EOI search resumes. Always `>= SOI.len()` and only
    /// meaningful while the buffer starts with SOI.
    eoi_scan_from: usize,
}

impl MjpegExtractor {
    pub fn new(max_buffer: usize) -> Self {
        let max_buffer = max_buffer.max(MIN_BUFFER);
        Self {
            buffer: BytesMut::with_capacity(max_buffer.min(256 * 1024)),
            latest: None,
            max_buffer,
            eoi_scan_from: SOI.len(),
        }
    }

    /// Append `chunk` and cut out every complete frame now in the buffer.
    ///
    /// Returns the last frame completed by this call, if any.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut newest = None;
        let mut dropped = 0usize;

        loop {
            let Some(start) = find_subsequence(&self.buffer, &SOI) else {
                self.discard_markerless();
                break;
            };
            if start > 0 {
                // Leading garbage, including any EOI with no SOI before it.
                self.buffer.advance(start);
                self.eoi_scan_from = SOI.len();
            }

            match find_subsequence(&self.buffer[self.eoi_scan_from..], &EOI) {
                Some(pos) => {
                    let end = self.eoi_scan_from + pos + EOI.len();
                    if newest.is_some() {
                        dropped += 1;
                    }
                    newest = Some(self.buffer.split_to(end).freeze());
                    self.eoi_scan_from = SOI.len();
                }
                None => {
                    // The last byte may be the first half of a split EOI.
                    self.eoi_scan_from = (self.buffer.len() - 1).max(SOI.len());
                    break;
                }
            }
        }

        self.enforce_cap();

        if dropped > 0 {
            debug!(dropped, "skipped older frames in chunk");
        }
        if let Some(frame) = &newest {
            self.latest = Some(frame.clone());
        }
        newest
    }

    /// Forget all buffered bytes and the latest frame.
    pub fn reset(&mut self) {
        self.discard_pending();
        self.latest = None;
    }

    /// Forget buffered bytes but keep the latest frame.
    pub fn discard_pending(&mut self) {
        self.buffer.clear();
        self.eoi_scan_from = SOI.len();
    }

    pub fn latest(&self) -> Option<&Bytes> {
        self.latest.as_ref()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_buffer(&self) -> usize {
        self.max_buffer
    }

    fn discard_markerless(&mut self) {
        let keep = usize::from(self.buffer.last() == Some(&SOI[0]));
        let discard = self.buffer.len() - keep;
        self.buffer.advance(discard);
        self.eoi_scan_from = SOI.len();
    }

    /// Bound memory under a stalled or malformed stream. After the scan loop
    /// the buffer starts at the earliest pending SOI, so a later SOI means the
    /// earlier frame was abandoned mid-way by the producer.
    fn enforce_cap(&mut self) {
        let len = self.buffer.len();
        if len <= self.max_buffer {
            return;
        }

        match rfind_subsequence(&self.buffer, &SOI) {
            Some(pos) if pos > 0 && len - pos <= self.max_buffer => {
                warn!(
                    buffered = len,
                    cap = self.max_buffer,
                    kept = len - pos,
                    "MJPEG buffer over cap, resyncing at last start marker"
                );
                self.buffer.advance(pos);
            }
            _ => {
                warn!(
                    buffered = len,
                    cap = self.max_buffer,
                    "MJPEG buffer over cap, clearing"
                );
                self.buffer.clear();
            }
        }
        self.eoi_scan_from = SOI.len();
    }
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Find the position of the last occurrence of `needle` in `haystack`.
fn rfind_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}
