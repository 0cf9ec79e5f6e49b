use crate::config::LaunchMode;
use crate::error::ConvoyError;
use crate::process::{FailureCause, ProcessRegistry, ProcessState, UnitId};
use serde::{Deserialize, Serialize};

/// Terminal summary of a single unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub name: String,
    pub mode: LaunchMode,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
    pub exit_code: Option<i32>,
    pub failure: Option<FailureCause>,
}

/// Final report of a supervision pass: every terminal unit state, the
/// primary failure (if any) and the supervisor's own exit code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorReport {
    pub units: Vec<UnitReport>,
    pub first_failure: Option<String>,
    pub exit_code: i32,
}

impl SupervisorReport {
    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.name == name)
    }
}

/// Compute the final report.
///
/// Exit status: the first failed unit (by launch order) decides; with no
/// failed unit a startup error that never marked a unit (a dependency that
/// exited cleanly too early) decides; otherwise 0 exactly when the blocking
/// unit ended in `Exited`.
pub(super) fn build(
    registry: &ProcessRegistry,
    blocking_id: UnitId,
    startup_error: Option<&ConvoyError>,
) -> SupervisorReport {
    let units: Vec<UnitReport> = registry
        .units()
        .map(|u| UnitReport {
            name: u.name.clone(),
            mode: u.spec.mode,
            state: u.state.clone(),
            pid: u.pid,
            uptime_secs: u.uptime().map(|d| d.as_secs()),
            exit_code: u.exit_code,
            failure: u.failure.clone(),
        })
        .collect();

    let first_failure = registry.first_failure();

    let exit_code = if let Some(failed) = first_failure {
        failed
            .failure
            .as_ref()
            .map(|cause| cause.exit_code())
            .unwrap_or(1)
    } else if let Some(error) = startup_error {
        error_exit_code(error)
    } else if registry.get(blocking_id).state == ProcessState::Exited {
        0
    } else {
        1
    };

    SupervisorReport {
        units,
        first_failure: first_failure.map(|u| u.name.clone()),
        exit_code,
    }
}

/// Exit code for startup errors that did not mark any unit failed
fn error_exit_code(error: &ConvoyError) -> i32 {
    match error {
        ConvoyError::SpawnError(_, _) => 3,
        ConvoyError::ReadinessTimeout(_, _) => 4,
        ConvoyError::DependencyTimeout { .. } => 5,
        _ => 1,
    }
}
