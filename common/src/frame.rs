use bytes::Bytes;

/// JPEG start-of-image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// A complete JPEG still cut out of a camera stream, with capture metadata.
///
/// The bytes are kept exactly as they arrived so a snapshot can be written
/// verbatim and submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegFrame {
    data: Bytes,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl JpegFrame {
    pub fn new(data: Bytes, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            data,
            captured_at_ms,
            seq,
        }
    }

    /// Stamp `data` with the current wall-clock time.
    pub fn now(data: Bytes, seq: u64) -> Self {
        Self::new(data, chrono::Utc::now().timestamp_millis(), seq)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the bytes begin with SOI and end with EOI.
    pub fn has_markers(&self) -> bool {
        self.data.len() >= SOI.len() + EOI.len()
            && self.data.starts_with(&SOI)
            && self.data.ends_with(&EOI)
    }

    /// Generate a file name for a captured still.
    pub fn snapshot_file_name(&self, prefix: &str) -> String {
        let dt = chrono::DateTime::from_timestamp_millis(self.captured_at_ms)
            .unwrap_or_else(chrono::Utc::now);
        let ts = dt.format("%Y%m%dT%H%M%S%3fZ");
        format!("{prefix}{ts}_{seq:06}.jpg", seq = self.seq)
    }
}
