// Supervisor module - launch sequencing, monitoring and shutdown coordination

mod report;

pub use report::{SupervisorReport, UnitReport};

use crate::config::{DescriptorSet, FailurePolicy, LaunchMode, ProcessSpec, ReadinessSpec};
use crate::error::{ConvoyError, Result};
use crate::probe;
use crate::process::spawner::spawn_unit;
use crate::process::{FailureCause, ProcessRegistry, ProcessState, UnitId};
use std::future::Future;
use std::time::Duration;
use tokio::process::Child;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

/// Poll interval while waiting for a dependency to become running
const DEPENDENCY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on reaping a unit after SIGKILL
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Termination notification from a waiter task
#[derive(Debug)]
struct ExitEvent {
    id: UnitId,
    code: Option<i32>,
}

/// Global overrides applied to every unit, typically from the CLI
#[derive(Debug, Clone, Default)]
pub struct SupervisorOptions {
    /// Override every unit's shutdown grace period (seconds)
    pub grace_period_secs: Option<u64>,
    /// Override every unit's dependency-wait timeout (seconds)
    pub startup_timeout_secs: Option<u64>,
    /// Override the configured detached-failure policy
    pub on_detached_failure: Option<FailurePolicy>,
}

/// Owns every ManagedProcess and its OS-level handle; launches units in
/// dependency order, waits on termination events and drives the
/// reverse-order shutdown.
pub struct Supervisor {
    registry: ProcessRegistry,
    policy: FailurePolicy,
    blocking_id: UnitId,
    events_tx: mpsc::UnboundedSender<ExitEvent>,
    events_rx: mpsc::UnboundedReceiver<ExitEvent>,
}

impl Supervisor {
    /// Build a supervisor from a validated descriptor set.
    ///
    /// Units are re-ordered into launch order (topological, blocking unit
    /// last) and the CLI overrides are folded into each spec.
    pub fn new(set: DescriptorSet, options: SupervisorOptions) -> Result<Self> {
        set.validate()?;

        let order = set.launch_order()?;
        let mut specs: Vec<ProcessSpec> = order
            .iter()
            .map(|&i| set.processes[i].clone())
            .collect();

        for spec in &mut specs {
            if let Some(grace) = options.grace_period_secs {
                spec.stop_timeout_secs = grace;
            }
            if let Some(startup) = options.startup_timeout_secs {
                spec.startup_timeout_secs = startup;
            }
        }

        let blocking_index = specs
            .iter()
            .position(|s| s.mode == LaunchMode::Blocking)
            .ok_or_else(|| {
                ConvoyError::ConfigValidationError("No blocking unit in descriptor set".to_string())
            })?;

        let policy = options
            .on_detached_failure
            .unwrap_or(set.settings.on_detached_failure);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            registry: ProcessRegistry::from_specs(specs),
            policy,
            blocking_id: UnitId::new(blocking_index),
            events_tx,
            events_rx,
        })
    }

    /// Run the full supervision pass: launch every unit, monitor until the
    /// blocking unit terminates (or a failure/interrupt forces the issue),
    /// tear down the rest, and report.
    pub async fn run(mut self) -> SupervisorReport {
        info!(
            "Launching {} unit(s) (policy: {:?})",
            self.registry.len(),
            self.policy
        );

        // Armed before the first launch: an interrupt landing in a
        // dependency or readiness wait must still drive the reverse-order
        // shutdown instead of killing the supervisor outright.
        let interrupt = wait_for_interrupt();
        tokio::pin!(interrupt);

        let startup_error = tokio::select! {
            result = self.launch_all() => match result {
                Ok(()) => {
                    self.monitor(&mut interrupt).await;
                    None
                }
                Err(e) => {
                    error!("Startup aborted: {}", e);
                    Some(e)
                }
            },
            _ = &mut interrupt => {
                info!("Received shutdown signal during startup");
                None
            }
        };

        self.shutdown_remaining().await;

        let report = report::build(&self.registry, self.blocking_id, startup_error.as_ref());
        info!("Supervisor finished with exit code {}", report.exit_code);
        report
    }

    /// Launch Sequencer: bring each unit from Pending to Running in launch
    /// order. Ends when the blocking unit is running; any startup error
    /// aborts the sequence.
    async fn launch_all(&mut self) -> Result<()> {
        for index in 0..self.registry.len() {
            let id = UnitId::new(index);

            self.drain_events();
            if self.policy == FailurePolicy::AbortAll {
                if let Some(failed) = self.registry.first_failure() {
                    return Err(ConvoyError::Other(format!(
                        "Unit '{}' failed during startup ({})",
                        failed.name,
                        failed.failure.as_ref().map(|c| c.to_string()).unwrap_or_default()
                    )));
                }
            }

            if let Some(dep_name) = self.registry.get(id).spec.depends_on.clone() {
                self.wait_for_dependency(id, &dep_name).await?;
            }

            let spec = self.registry.get(id).spec.clone();
            let spawned = match spawn_unit(&spec).await {
                Ok(spawned) => spawned,
                Err(e) => {
                    self.registry
                        .get_mut(id)
                        .mark_failed(FailureCause::Launch(e.to_string()));
                    return Err(e);
                }
            };

            self.registry.get_mut(id).mark_starting(spawned.pid);
            self.watch_exit(id, spawned.child);

            info!(
                "Launched unit '{}' (pid {}, mode: {})",
                spec.name, spawned.pid, spec.mode
            );

            match spec.mode {
                LaunchMode::Detached => {
                    if let Some(ref probe_spec) = spec.readiness {
                        self.wait_until_ready(id, probe_spec).await?;
                    }
                    self.registry.get_mut(id).mark_running();
                    debug!("Unit '{}' is running", spec.name);
                }
                LaunchMode::Blocking => {
                    // Terminal step of the startup sequence; the sequencer
                    // hands over to the monitor.
                    self.registry.get_mut(id).mark_running();
                    break;
                }
            }
        }

        Ok(())
    }

    /// Block until the dependency is Running, bounded by the dependent's
    /// startup timeout. A dependency in a terminal state fails immediately.
    async fn wait_for_dependency(&mut self, id: UnitId, dep_name: &str) -> Result<()> {
        let unit_name = self.registry.get(id).name.clone();
        let dep_id = self
            .registry
            .units()
            .find(|u| u.name == dep_name)
            .map(|u| u.id)
            .ok_or_else(|| ConvoyError::UnitNotFound(dep_name.to_string()))?;

        let deadline = Instant::now() + self.registry.get(id).spec.startup_timeout();

        loop {
            self.drain_events();

            let dep = self.registry.get(dep_id);
            if dep.state == ProcessState::Running {
                return Ok(());
            }
            if dep.state.is_terminal() {
                return Err(ConvoyError::DependencyTimeout {
                    unit: unit_name,
                    dependency: dep_name.to_string(),
                    reason: format!("dependency is {}", dep.state),
                });
            }
            if Instant::now() >= deadline {
                return Err(ConvoyError::DependencyTimeout {
                    unit: unit_name,
                    dependency: dep_name.to_string(),
                    reason: "wait timed out".to_string(),
                });
            }

            sleep(DEPENDENCY_POLL_INTERVAL).await;
        }
    }

    /// Poll the readiness probe until it succeeds or the probe timeout
    /// expires. An early termination of the probed unit aborts the wait.
    async fn wait_until_ready(&mut self, id: UnitId, probe_spec: &ReadinessSpec) -> Result<()> {
        let name = self.registry.get(id).name.clone();
        let deadline = Instant::now() + probe_spec.timeout();

        debug!(
            "Waiting up to {}s for unit '{}' to accept connections on {}:{}",
            probe_spec.timeout_secs, name, probe_spec.host, probe_spec.port
        );

        loop {
            if probe::attempt(probe_spec).await {
                return Ok(());
            }

            self.drain_events();
            if self.registry.get(id).state.is_terminal() {
                return Err(ConvoyError::Other(format!(
                    "Unit '{}' terminated while waiting for readiness",
                    name
                )));
            }

            if Instant::now() >= deadline {
                self.registry
                    .get_mut(id)
                    .mark_failed(FailureCause::ReadinessTimeout);
                return Err(ConvoyError::ReadinessTimeout(name, probe_spec.timeout_secs));
            }

            sleep(probe_spec.poll_interval()).await;
        }
    }

    /// Monitor role: wait for the blocking unit's termination, a decisive
    /// detached failure, or an operator interrupt. The first decisive event
    /// wins; everything after it is handled by the shutdown sequence.
    async fn monitor(&mut self, interrupt: &mut (impl Future<Output = ()> + Unpin)) {
        // An event drain during the last launch steps may already have
        // recorded the decisive failure; it will never reappear on the
        // channel, so it must be acted on before parking.
        self.drain_events();
        if self.policy == FailurePolicy::AbortAll {
            if let Some(failed) = self.registry.first_failure() {
                warn!(
                    "Unit '{}' failed during startup, aborting all units",
                    failed.name
                );
                return;
            }
        }

        info!("All units launched, monitoring");

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    // The supervisor holds a sender, so the channel never closes
                    let Some(event) = event else { return };
                    let id = event.id;
                    self.registry.record_exit(id, event.code);

                    let unit = self.registry.get(id);
                    if id == self.blocking_id {
                        info!(
                            "Blocking unit '{}' terminated ({})",
                            unit.name, unit.state
                        );
                        return;
                    }

                    match unit.state {
                        ProcessState::Failed => {
                            if self.policy == FailurePolicy::AbortAll {
                                warn!(
                                    "Unit '{}' failed ({}), aborting all units",
                                    unit.name,
                                    unit.failure.as_ref().map(|c| c.to_string()).unwrap_or_default()
                                );
                                return;
                            }
                            warn!("Unit '{}' failed, policy is ignore", unit.name);
                        }
                        ProcessState::Exited => {
                            warn!("Unit '{}' exited early with code 0", unit.name);
                        }
                        _ => {}
                    }
                }
                _ = &mut *interrupt => {
                    info!("Received shutdown signal");
                    return;
                }
            }
        }
    }

    /// Shutdown Coordinator: stop every spawned, unreaped unit in reverse
    /// launch order, graceful signal first, SIGKILL after the grace period.
    async fn shutdown_remaining(&mut self) {
        self.drain_events();

        let order = self.registry.shutdown_order();
        if order.is_empty() {
            return;
        }

        info!(
            "Shutting down {} remaining unit(s) in reverse launch order",
            order.len()
        );

        for id in order {
            self.stop_unit(id).await;
        }
    }

    /// Stop a single unit: graceful stop signal, wait up to the grace
    /// period for its termination event, then escalate to SIGKILL and mark
    /// the unit failed with a shutdown timeout.
    async fn stop_unit(&mut self, id: UnitId) {
        self.drain_events();
        if self.registry.get(id).reaped {
            return;
        }

        let (name, grace, stop_signal) = {
            let unit = self.registry.get(id);
            (
                unit.name.clone(),
                unit.spec.stop_timeout(),
                unit.spec.stop_signal.clone(),
            )
        };

        self.registry.get_mut(id).mark_stopping();

        info!("Stopping unit '{}' with {}", name, stop_signal);
        if let Err(e) = self.registry.signal_unit(id) {
            // Most likely the unit died between the drain and the signal;
            // the waiter event below settles it either way.
            warn!("Failed to signal unit '{}': {}", name, e);
        }

        let deadline = Instant::now() + grace;
        while !self.registry.get(id).reaped {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match timeout(remaining, self.events_rx.recv()).await {
                Ok(Some(event)) => self.registry.record_exit(event.id, event.code),
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if self.registry.get(id).reaped {
            debug!("Unit '{}' stopped within its grace period", name);
            return;
        }

        warn!(
            "Unit '{}' did not exit within {:?}, sending SIGKILL",
            name, grace
        );
        self.registry
            .get_mut(id)
            .mark_failed(FailureCause::ShutdownTimeout);
        if let Err(e) = self.registry.force_kill(id) {
            error!("Failed to force-kill unit '{}': {}", name, e);
        }

        // SIGKILL is prompt; bound the reap wait so a wedged wait() cannot
        // hang the whole shutdown sequence.
        let reap_deadline = Instant::now() + REAP_TIMEOUT;
        while !self.registry.get(id).reaped {
            let remaining = reap_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                error!("Unit '{}' could not be reaped", name);
                break;
            }
            match timeout(remaining, self.events_rx.recv()).await {
                Ok(Some(event)) => self.registry.record_exit(event.id, event.code),
                _ => break,
            }
        }
    }

    /// Install the termination observer for a spawned unit
    fn watch_exit(&self, id: UnitId, mut child: Child) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(_) => None,
            };
            let _ = tx.send(ExitEvent { id, code });
        });
    }

    /// Apply every already-delivered termination event without blocking
    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.registry.record_exit(event.id, event.code);
        }
    }
}

/// Resolve when the operator requests shutdown (SIGINT or SIGTERM)
async fn wait_for_interrupt() {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("Failed to setup SIGTERM handler");

    tokio::select! {
        _ = signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
