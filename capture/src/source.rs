use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use preesense_common::config::{CameraConfig, SourceKind};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::CaptureError;

const READ_CHUNK: usize = 64 * 1024;

/// A running producer of motion-JPEG bytes.
pub enum FrameSource {
    Process(ProcessSource),
    Http(HttpSource),
}

impl FrameSource {
    pub async fn open(config: &CameraConfig) -> Result<Self, CaptureError> {
        match config.source {
            SourceKind::Process => {
                ProcessSource::spawn(&config.program, &config.args).map(Self::Process)
            }
            SourceKind::Http => HttpSource::connect(&config.url).await.map(Self::Http),
        }
    }

    /// Next chunk of stream bytes, or `None` once the producer is done.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>, CaptureError> {
        match self {
            Self::Process(p) => p.read_chunk().await,
            Self::Http(h) => h.read_chunk().await,
        }
    }

    pub async fn stop(self) {
        match self {
            Self::Process(p) => p.stop().await,
            Self::Http(_) => debug!("closing HTTP MJPEG stream"),
        }
    }
}

/// A capture program writing MJPEG to its stdout.
pub struct ProcessSource {
    child: Child,
    stdout: ChildStdout,
    read_buf: Vec<u8>,
}

impl ProcessSource {
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, CaptureError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CaptureError::CameraUnavailable(format!("{program} not found"))
                }
                _ => CaptureError::Spawn(e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::Spawn(std::io::Error::other("could not get stdout handle"))
        })?;

        info!(program, pid = child.id(), "capture process started");

        Ok(Self {
            child,
            stdout,
            read_buf: vec![0u8; READ_CHUNK],
        })
    }

    async fn read_chunk(&mut self) -> Result<Option<Bytes>, CaptureError> {
        let n = self
            .stdout
            .read(&mut self.read_buf)
            .await
            .map_err(CaptureError::Read)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(&self.read_buf[..n])))
    }

    async fn stop(mut self) {
        if let Err(e) = self.child.start_kill() {
            // already exited
            debug!(error = %e, "capture process kill failed");
        }
        match self.child.wait().await {
            Ok(status) => info!(%status, "capture process stopped"),
            Err(e) => warn!(error = %e, "failed to reap capture process"),
        }
    }
}

/// An MJPEG-over-HTTP endpoint. Multipart boundaries and part headers are
/// left in the byte stream; the extractor skips them as inter-frame garbage.
pub struct HttpSource {
    stream: BoxStream<'static, reqwest::Result<Bytes>>,
}

impl HttpSource {
    pub async fn connect(url: &str) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(CaptureError::HttpConnect)?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    CaptureError::CameraUnavailable(format!("{url}: {e}"))
                } else {
                    CaptureError::HttpConnect(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(CaptureError::HttpStatus(response.status().as_u16()));
        }

        info!(url, status = %response.status(), "connected to MJPEG stream");

        Ok(Self {
            stream: response.bytes_stream().boxed(),
        })
    }

    async fn read_chunk(&mut self) -> Result<Option<Bytes>, CaptureError> {
        match self.stream.next().await {
            Some(chunk) => chunk.map(Some).map_err(CaptureError::HttpStream),
            None => Ok(None),
        }
    }
}
