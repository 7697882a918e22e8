pub mod create;
pub mod delete;
pub mod events;
pub mod status;
pub mod update;

use indicatif::{ProgressBar, ProgressStyle};
use stackpilot_core::{CancelToken, Coordinator, CoreError, OperationResult, SystemClock};
use stackpilot_remote::{ControlPlane, HttpControlPlane, RemoteConfig, RemoteError};
use stackpilot_schema::{DefinitionError, OperationKind, StackStatus};
use std::fmt;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_DEFINITION_ERROR: u8 = 2;
pub const EXIT_REMOTE_ERROR: u8 = 3;
pub const EXIT_TIMEOUT: u8 = 4;

/// A failed command: message for stderr plus the process exit code.
#[derive(Debug)]
pub struct CommandError {
    pub code: u8,
    pub message: String,
}

impl CommandError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: EXIT_FAILURE,
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<CoreError> for CommandError {
    fn from(e: CoreError) -> Self {
        let code = match e {
            CoreError::Transport(_) => EXIT_REMOTE_ERROR,
            CoreError::Timeout { .. } | CoreError::Cancelled { .. } => EXIT_TIMEOUT,
            CoreError::UnexpectedState { .. } | CoreError::OperationFailed { .. } => EXIT_FAILURE,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl From<RemoteError> for CommandError {
    fn from(e: RemoteError) -> Self {
        Self {
            code: EXIT_REMOTE_ERROR,
            message: format!("remote error: {e}"),
        }
    }
}

impl From<DefinitionError> for CommandError {
    fn from(e: DefinitionError) -> Self {
        Self {
            code: EXIT_DEFINITION_ERROR,
            message: format!("definition error: {e}"),
        }
    }
}

/// Connection to the control plane plus the wait settings chosen on the
/// command line.
pub struct Session {
    plane: Box<dyn ControlPlane>,
    cancel: CancelToken,
    timeout: Option<Duration>,
}

impl Session {
    pub fn new(
        plane: Box<dyn ControlPlane>,
        cancel: CancelToken,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            plane,
            cancel,
            timeout,
        }
    }

    pub fn connect(
        remote_url: Option<&str>,
        cancel: CancelToken,
        timeout: Option<Duration>,
    ) -> Result<Self, CommandError> {
        let plane = make_control_plane(remote_url)?;
        Ok(Self::new(Box::new(plane), cancel, timeout))
    }

    pub fn plane(&self) -> &dyn ControlPlane {
        self.plane.as_ref()
    }

    pub fn coordinator(&self) -> Coordinator<'_> {
        let mut coordinator =
            Coordinator::new(self.plane(), &SystemClock).with_cancel(self.cancel.clone());
        if let Some(timeout) = self.timeout {
            for kind in OperationKind::ALL {
                let settings = coordinator.settings(kind).with_timeout(timeout);
                coordinator = coordinator.with_settings(kind, settings);
            }
        }
        coordinator
    }
}

pub fn make_control_plane(remote_url: Option<&str>) -> Result<HttpControlPlane, CommandError> {
    let config = if let Some(url) = remote_url {
        RemoteConfig::new(url)
    } else {
        RemoteConfig::load_default().map_err(|e| CommandError {
            code: EXIT_REMOTE_ERROR,
            message: format!("no --remote and no config: {e}"),
        })?
    };
    Ok(HttpControlPlane::new(config))
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, CommandError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CommandError::failure(format!("JSON serialization failed: {e}")))
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_status(status: StackStatus) -> String {
    use console::Style;
    let text = status.as_str();
    let style = if text.ends_with("_FAILED") {
        Style::new().red().bold()
    } else if text.contains("ROLLBACK") {
        Style::new().yellow()
    } else if text.ends_with("_IN_PROGRESS") {
        Style::new().cyan()
    } else if status == StackStatus::DeleteComplete {
        Style::new().dim()
    } else if text.ends_with("_COMPLETE") {
        Style::new().green()
    } else {
        Style::new()
    };
    style.apply_to(text).to_string()
}

/// Wait on a lifecycle operation behind a spinner, then print its result.
pub fn drive(
    pending: &str,
    done: &str,
    json: bool,
    operation: impl FnOnce() -> Result<OperationResult, CoreError>,
) -> Result<u8, CommandError> {
    let pb = spinner(pending);
    let result = operation().map_err(|e| {
        spin_fail(&pb, &format!("{pending} failed"));
        if let CoreError::OperationFailed { ref reasons, .. } = e {
            for reason in reasons {
                eprintln!("  - {reason}");
            }
        }
        CommandError::from(e)
    })?;
    spin_ok(&pb, done);

    if json {
        println!("{}", json_pretty(&result)?);
    } else {
        println!("status: {}", colorize_status(result.final_status));
        if let Some(ref identity) = result.identity {
            println!("stack:  {identity}");
        } else if let Some(ref id) = result.stack_id {
            println!("stack:  {id}");
        }
    }
    Ok(EXIT_SUCCESS)
}
