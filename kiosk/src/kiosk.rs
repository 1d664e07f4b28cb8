use chrono::Local;
use preesense_capture::{Camera, CaptureError};
use preesense_client::{
    search_users, AnalysisClient, ClientError, NewPatient, PatientError, PatientSummary,
    RegisteredUser, ResultSummary, UserId,
};
use preesense_common::config::Config;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::keyboard::{KeyboardError, OnScreenKeyboard};

#[derive(Debug, thiserror::Error)]
pub enum KioskError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Patient(#[from] PatientError),
    #[error(transparent)]
    Keyboard(#[from] KeyboardError),
    #[error("no registered user with id {0}")]
    UnknownUser(UserId),
    #[error("failed to read input: {0}")]
    Input(std::io::Error),
}

/// The kiosk controller. Owns every long-lived resource (camera, server
/// client, on-screen keyboard) and runs the capture flows against them.
pub struct Kiosk {
    config: Config,
    camera: Camera,
    client: AnalysisClient,
    keyboard: OnScreenKeyboard,
}

impl Kiosk {
    pub fn new(config: Config) -> Result<Self, KioskError> {
        Ok(Self {
            camera: Camera::new(config.camera.clone()),
            client: AnalysisClient::new(&config.server)?,
            keyboard: OnScreenKeyboard::new(&config.keyboard),
            config,
        })
    }

    /// Live preview until Ctrl-C.
    pub async fn preview(&mut self) {
        info!(source = ?self.config.camera.source, "starting live preview");
        self.camera
            .run_preview(
                |frame| {
                    if frame.seq == 1 || frame.seq % 100 == 0 {
                        info!(seq = frame.seq, bytes = frame.len(), "preview frame");
                    }
                },
                async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "failed to listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                },
            )
            .await;
    }

    pub async fn find_users(&self, query: &str) -> Result<Vec<RegisteredUser>, KioskError> {
        let users = self.client.list_users().await?;
        Ok(search_users(&users, query).into_iter().cloned().collect())
    }

    /// New-patient flow: register, capture, analyze.
    pub async fn register_and_analyze(
        &mut self,
        patient: &NewPatient,
    ) -> Result<String, KioskError> {
        let id = self.client.create_user(patient).await?;
        self.capture_and_analyze(PatientSummary::from_new(patient, id))
            .await
    }

    /// Registered-patient flow: look up, capture, analyze.
    pub async fn analyze_registered(&mut self, id: &UserId) -> Result<String, KioskError> {
        let users = self.client.list_users().await?;
        let user = users
            .iter()
            .find(|u| &u.id == id)
            .ok_or_else(|| KioskError::UnknownUser(id.clone()))?;
        self.capture_and_analyze(PatientSummary::from(user)).await
    }

    async fn capture_and_analyze(
        &mut self,
        patient: PatientSummary,
    ) -> Result<String, KioskError> {
        let path = self.config.camera.snapshot_path.clone();
        let snapshot = self.camera.snapshot(&path).await;
        self.camera.stop().await;
        let snapshot = snapshot?;

        let result = self.client.analyze_file(&patient, &snapshot.path).await?;
        let summary = ResultSummary {
            patient: &patient,
            result: &result,
            at: Local::now(),
        };
        Ok(summary.to_string())
    }

    /// Ask for patient details on the terminal, with the on-screen keyboard
    /// up while the fields have focus.
    pub async fn prompt_patient(&mut self) -> Result<NewPatient, KioskError> {
        if let Err(e) = self.keyboard.show() {
            warn!(error = %e, "continuing without on-screen keyboard");
        }
        let answers = read_fields(&[
            "First name",
            "Middle name",
            "Last name",
            "Age",
            "Sex (Male/Female)",
        ])
        .await;
        if let Err(e) = self.keyboard.hide().await {
            warn!(error = %e, "failed to hide on-screen keyboard");
        }

        let answers = answers.map_err(KioskError::Input)?;
        Ok(NewPatient::validate(
            &answers[0],
            &answers[1],
            &answers[2],
            &answers[3],
            &answers[4],
        )?)
    }
}

async fn read_fields(labels: &[&str]) -> std::io::Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut answers = Vec::with_capacity(labels.len());
    for label in labels {
        stdout.write_all(format!("{label}: ").as_bytes()).await?;
        stdout.flush().await?;
        let line = lines.next_line().await?.unwrap_or_default();
        answers.push(line);
    }
    Ok(answers)
}
