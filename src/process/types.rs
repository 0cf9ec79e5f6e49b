use crate::config::ProcessSpec;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Index of a unit in the registry, assigned in launch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(usize);

impl UnitId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Pending,
    Starting,
    Running,
    Stopping,
    Exited,
    Failed,
}

impl ProcessState {
    /// Terminal states latch: no transition leaves them
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Exited | ProcessState::Failed)
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Pending => write!(f, "pending"),
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Exited => write!(f, "exited"),
            ProcessState::Failed => write!(f, "failed"),
        }
    }
}

/// Why a unit ended in the `Failed` state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    /// The OS could not spawn the process
    Launch(String),
    /// A detached unit never became ready within its probe timeout
    ReadinessTimeout,
    /// Non-zero exit code, or killed by a signal outside shutdown
    AbnormalExit(Option<i32>),
    /// The unit ignored its stop signal for the whole grace period
    ShutdownTimeout,
}

impl FailureCause {
    /// Supervisor exit code identifying this failure kind.
    ///
    /// An abnormal exit surfaces the child's own code so the launcher is
    /// transparent to callers; the other kinds use fixed codes.
    pub fn exit_code(&self) -> i32 {
        match self {
            FailureCause::AbnormalExit(Some(code)) if *code != 0 => *code,
            FailureCause::AbnormalExit(_) => 1,
            FailureCause::Launch(_) => 3,
            FailureCause::ReadinessTimeout => 4,
            FailureCause::ShutdownTimeout => 6,
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::Launch(reason) => write!(f, "launch failure: {}", reason),
            FailureCause::ReadinessTimeout => write!(f, "readiness timeout"),
            FailureCause::AbnormalExit(Some(code)) => write!(f, "exited with code {}", code),
            FailureCause::AbnormalExit(None) => write!(f, "killed by signal"),
            FailureCause::ShutdownTimeout => write!(f, "shutdown timeout"),
        }
    }
}

/// Runtime instance of a descriptor, owned exclusively by the supervisor
#[derive(Debug)]
pub struct ManagedProcess {
    pub id: UnitId,
    pub name: String,
    pub spec: ProcessSpec,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub started_at: Option<SystemTime>,
    pub exit_code: Option<i32>,
    pub failure: Option<FailureCause>,
    /// The waiter task observed the child's termination (the OS process is gone)
    pub reaped: bool,
}

impl ManagedProcess {
    pub fn new(id: UnitId, spec: ProcessSpec) -> Self {
        Self {
            id,
            name: spec.name.clone(),
            spec,
            state: ProcessState::Pending,
            pid: None,
            started_at: None,
            exit_code: None,
            failure: None,
            reaped: false,
        }
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.started_at
            .map(|t| SystemTime::now().duration_since(t).unwrap_or_default())
    }

    pub fn mark_starting(&mut self, pid: u32) {
        if self.state.is_terminal() {
            return;
        }
        self.state = ProcessState::Starting;
        self.pid = Some(pid);
        self.started_at = Some(SystemTime::now());
    }

    pub fn mark_running(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = ProcessState::Running;
    }

    pub fn mark_stopping(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = ProcessState::Stopping;
    }

    /// Record a termination observed from the waiter task.
    ///
    /// First event wins: a unit already in a terminal state only has its
    /// exit code backfilled. A unit that was asked to stop counts as
    /// `Exited` whatever the raw status, since dying to the stop signal is
    /// the cooperative contract.
    pub fn record_exit(&mut self, code: Option<i32>) {
        self.reaped = true;
        if self.exit_code.is_none() {
            self.exit_code = code;
        }

        if self.state.is_terminal() {
            return;
        }

        match (&self.state, code) {
            (ProcessState::Stopping, _) => self.state = ProcessState::Exited,
            (_, Some(0)) => self.state = ProcessState::Exited,
            (_, code) => {
                self.state = ProcessState::Failed;
                self.failure = Some(FailureCause::AbnormalExit(code));
            }
        }
    }

    pub fn mark_failed(&mut self, cause: FailureCause) {
        if self.state.is_terminal() {
            return;
        }
        self.state = ProcessState::Failed;
        self.failure = Some(cause);
    }
}
