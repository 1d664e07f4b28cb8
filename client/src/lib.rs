//! HTTP client for the urinalysis analysis server.
//!
//! Contract:
//! - `GET  /api/users`  -> JSON array of [`RegisteredUser`]
//! - `POST /api/users`  JSON [`NewPatient`] -> `{"id": ...}`
//! - `POST /analyze`    multipart `name`, `age`, `sex`, optional `user_id`,
//!   file `image` -> [`AnalysisResult`]

pub mod patient;
pub mod report;

pub use patient::{
    search_users, Age, NewPatient, PatientError, PatientSummary, RegisteredUser, Sex, UserId,
};
pub use report::{report_qr, AnalysisResult, Reading, ResultSummary, UtiFlag};

use bytes::Bytes;
use preesense_common::config::ServerConfig;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name the captured still is uploaded under.
pub const IMAGE_FILE_NAME: &str = "captured_sample.jpg";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(reqwest::Error),
    #[error("upstream request failed: {0}")]
    Request(reqwest::Error),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response shape: {0}")]
    InvalidResponse(String),
    #[error("failed to read image {0}: {1}")]
    ReadImage(PathBuf, std::io::Error),
}

#[derive(Debug, Deserialize)]
struct CreatedUser {
    id: UserId,
}

#[derive(Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
}

impl AnalysisClient {
    pub fn new(config: &ServerConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn list_users(&self) -> Result<Vec<RegisteredUser>, ClientError> {
        let response = self
            .http
            .get(self.url("/api/users"))
            .send()
            .await
            .map_err(ClientError::Request)?;
        let users: Vec<RegisteredUser> = decode(response).await?;
        debug!(count = users.len(), "fetched registered users");
        Ok(users)
    }

    pub async fn create_user(&self, patient: &NewPatient) -> Result<UserId, ClientError> {
        let response = self
            .http
            .post(self.url("/api/users"))
            .json(patient)
            .send()
            .await
            .map_err(ClientError::Request)?;
        let created: CreatedUser = decode(response).await?;
        info!(id = %created.id, name = patient.full_name(), "registered new patient");
        Ok(created.id)
    }

    /// Submit a captured JPEG for analysis.
    pub async fn analyze(
        &self,
        patient: &PatientSummary,
        image: Bytes,
    ) -> Result<AnalysisResult, ClientError> {
        let image_len = image.len();
        let part = Part::bytes(image.to_vec())
            .file_name(IMAGE_FILE_NAME)
            .mime_str("image/jpeg")
            .map_err(ClientError::Request)?;

        let mut form = Form::new()
            .text("name", patient.name.clone())
            .text("age", patient.age.clone())
            .text("sex", patient.sex.clone());
        if let Some(id) = &patient.user_id {
            form = form.text("user_id", id.to_string());
        }
        form = form.part("image", part);

        info!(name = patient.name, bytes = image_len, "submitting sample for analysis");

        let response = self
            .http
            .post(self.url("/analyze"))
            .multipart(form)
            .send()
            .await
            .map_err(ClientError::Request)?;
        decode(response).await
    }

    pub async fn analyze_file(
        &self,
        patient: &PatientSummary,
        path: &Path,
    ) -> Result<AnalysisResult, ClientError> {
        let image = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::ReadImage(path.to_path_buf(), e))?;
        self.analyze(patient, Bytes::from(image)).await
    }
}

/// Check the status, then parse the body as JSON into `T`.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await.map_err(ClientError::Request)?;

    if !status.is_success() {
        warn!(status = status.as_u16(), "analysis server rejected request");
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}
