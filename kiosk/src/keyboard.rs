use preesense_common::config::KeyboardConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum KeyboardError {
    #[error("no on-screen keyboard program found (tried {0})")]
    NotFound(String),
    #[error("failed to launch on-screen keyboard {0}: {1}")]
    Spawn(PathBuf, std::io::Error),
    #[error("failed to run keyboard hide command: {0}")]
    HideCommand(std::io::Error),
}

/// Owned handle to the on-screen keyboard helper process.
///
/// Shown when a text field gains focus, hidden when it loses focus.
/// Dropping the handle terminates the helper.
pub struct OnScreenKeyboard {
    programs: Vec<String>,
    hide_command: Vec<String>,
    child: Option<Child>,
}

impl OnScreenKeyboard {
    pub fn new(config: &KeyboardConfig) -> Self {
        Self {
            programs: config.programs.clone(),
            hide_command: config.hide_command.clone(),
            child: None,
        }
    }

    /// First configured program that exists, either as a path or on `PATH`.
    pub fn locate(&self) -> Option<PathBuf> {
        self.programs.iter().find_map(|p| {
            let path = Path::new(p);
            if path.is_absolute() {
                path.is_file().then(|| path.to_path_buf())
            } else {
                which::which(p).ok()
            }
        })
    }

    pub fn is_showing(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(%status, "on-screen keyboard exited on its own");
                self.child = None;
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to poll on-screen keyboard");
                self.child = None;
                false
            }
        }
    }

    /// Launch the keyboard. A no-op while it is already showing.
    pub fn show(&mut self) -> Result<(), KeyboardError> {
        if self.is_showing() {
            return Ok(());
        }
        let program = self
            .locate()
            .ok_or_else(|| KeyboardError::NotFound(self.programs.join(", ")))?;

        let child = Command::new(&program)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KeyboardError::Spawn(program.clone(), e))?;

        info!(program = %program.display(), pid = child.id(), "on-screen keyboard shown");
        self.child = Some(child);
        Ok(())
    }

    /// Terminate the keyboard we launched, then run the configured hide
    /// command for keyboards that detach from their launcher.
    pub async fn hide(&mut self) -> Result<(), KeyboardError> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "on-screen keyboard already gone");
            }
            if let Err(e) = child.wait().await {
                warn!(error = %e, "failed to reap on-screen keyboard");
            }
            debug!("on-screen keyboard hidden");
        }

        if let Some((program, args)) = self.hide_command.split_first() {
            let status = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(KeyboardError::HideCommand)?;
            if !status.success() {
                // taskkill fails when nothing matched, which is fine
                debug!(%status, %program, "keyboard hide command returned non-zero");
            }
        }
        Ok(())
    }
}
