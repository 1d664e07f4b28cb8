use preesense_common::config::CameraConfig;
use preesense_common::frame::JpegFrame;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::check::{self, FrameCheck};
use crate::mjpeg::MjpegExtractor;
use crate::source::FrameSource;
use crate::CaptureError;

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const SNAPSHOT_PREFIX: &str = "sample_";

/// A still written to disk by [`Camera::snapshot`].
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub frame: JpegFrame,
    pub path: PathBuf,
}

/// One camera feed: the upstream source, the extractor cutting frames out
/// of it, and the last frame that passed the frame check.
///
/// A single owner drives everything; nothing here is shared across tasks.
pub struct Camera {
    config: CameraConfig,
    extractor: MjpegExtractor,
    check: Box<dyn FrameCheck>,
    source: Option<FrameSource>,
    latest: Option<JpegFrame>,
    seq: u64,
}

impl Camera {
    pub fn new(config: CameraConfig) -> Self {
        let check = check::for_config(config.verify_decode);
        Self::with_check(config, check)
    }

    pub fn with_check(config: CameraConfig, check: Box<dyn FrameCheck>) -> Self {
        Self {
            extractor: MjpegExtractor::new(config.max_buffer_bytes),
            config,
            check,
            source: None,
            latest: None,
            seq: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.source.is_some()
    }

    /// Last accepted frame, kept across stall restarts.
    pub fn latest(&self) -> Option<&JpegFrame> {
        self.latest.as_ref()
    }

    /// Start the upstream source if it is not already running.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.source.is_none() {
            self.source = Some(FrameSource::open(&self.config).await?);
            debug!(check = self.check.name(), "camera started");
        }
        Ok(())
    }

    /// Stop the upstream source and forget every frame from this generation.
    pub async fn stop(&mut self) {
        if let Some(source) = self.source.take() {
            source.stop().await;
        }
        self.extractor.reset();
        self.latest = None;
    }

    /// Restart the upstream source, keeping the last accepted frame on screen.
    pub async fn restart(&mut self) -> Result<(), CaptureError> {
        self.pause().await;
        self.start().await
    }

    /// Stop the upstream source and drop the partial frame it left behind.
    async fn pause(&mut self) {
        if let Some(source) = self.source.take() {
            source.stop().await;
        }
        self.extractor.discard_pending();
    }

    /// Feed raw stream bytes. Returns the frame accepted from this chunk.
    pub fn ingest(&mut self, chunk: &[u8]) -> Option<&JpegFrame> {
        let data = self.extractor.feed(chunk)?;
        if !self.check.accept(&data) {
            return None;
        }
        self.seq += 1;
        let frame = JpegFrame::now(data, self.seq);
        debug!(seq = frame.seq, bytes = frame.len(), "frame accepted");
        self.latest = Some(frame);
        self.latest.as_ref()
    }

    /// Read from the source until a frame is accepted.
    ///
    /// Fails with [`CaptureError::NoFrame`] when the stall timeout passes
    /// without one, which is how a hung capture process is detected.
    pub async fn next_frame(&mut self) -> Result<JpegFrame, CaptureError> {
        self.start().await?;
        let stall_timeout = self.config.stall_timeout();
        let deadline = Instant::now() + stall_timeout;

        loop {
            let source = self.source.as_mut().ok_or(CaptureError::StreamEnded)?;
            let chunk = match tokio::time::timeout_at(deadline, source.read_chunk()).await {
                Ok(Ok(Some(chunk))) => chunk,
                Ok(Ok(None)) => return Err(CaptureError::StreamEnded),
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(CaptureError::NoFrame(stall_timeout)),
            };
            if let Some(frame) = self.ingest(&chunk) {
                return Ok(frame.clone());
            }
        }
    }

    /// Capture a fresh frame and write its bytes verbatim to `path`. When
    /// `path` is an existing directory the file is named after the frame's
    /// timestamp and sequence number.
    pub async fn snapshot(&mut self, path: &Path) -> Result<Snapshot, CaptureError> {
        let frame = self.next_frame().await?;
        let path = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => path.join(frame.snapshot_file_name(SNAPSHOT_PREFIX)),
            _ => path.to_path_buf(),
        };
        write_snapshot(&frame, &path).await?;
        info!(path = %path.display(), seq = frame.seq, bytes = frame.len(), "snapshot saved");
        Ok(Snapshot { frame, path })
    }

    /// Live preview loop. Calls `on_frame` for every accepted frame until
    /// `shutdown` resolves; restarts the upstream source with exponential
    /// backoff when it stalls, ends or fails.
    pub async fn run_preview<F, S>(&mut self, mut on_frame: F, shutdown: S)
    where
        F: FnMut(&JpegFrame),
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut backoff = INITIAL_BACKOFF;
        let mut frames: u64 = 0;

        'preview: loop {
            let outcome = tokio::select! {
                _ = &mut shutdown => None,
                res = self.next_frame() => Some(res),
            };

            match outcome {
                None => break 'preview,
                Some(Ok(frame)) => {
                    backoff = INITIAL_BACKOFF;
                    frames += 1;
                    if frames % 100 == 0 {
                        debug!(frames, "preview frames delivered");
                    }
                    on_frame(&frame);
                }
                Some(Err(e)) => {
                    error!(error = %e, "camera error, restarting in {:?}", backoff);
                    self.pause().await;

                    loop {
                        let slept = tokio::select! {
                            _ = &mut shutdown => false,
                            _ = tokio::time::sleep(backoff) => true,
                        };
                        if !slept {
                            break 'preview;
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        match self.restart().await {
                            Ok(()) => break,
                            Err(e) => {
                                error!(error = %e, "camera restart failed, retrying in {:?}", backoff)
                            }
                        }
                    }
                }
            }
        }

        info!(frames, "preview stopped");
        self.stop().await;
    }
}

async fn write_snapshot(frame: &JpegFrame, path: &Path) -> Result<(), CaptureError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CaptureError::Snapshot(path.to_path_buf(), e))?;
    }
    tokio::fs::write(path, frame.data())
        .await
        .map_err(|e| CaptureError::Snapshot(path.to_path_buf(), e))?;
    if !frame.has_markers() {
        warn!(path = %path.display(), "snapshot written without JPEG markers");
    }
    Ok(())
}
