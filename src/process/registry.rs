use crate::config::ProcessSpec;
use crate::error::{ConvoyError, Result};
use crate::process::types::{ManagedProcess, UnitId};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::debug;

/// Arena-style registry of managed units, indexed by launch order.
///
/// The supervisor task is the single writer; exit notifications from waiter
/// tasks arrive over a channel and are applied here, never concurrently.
pub struct ProcessRegistry {
    units: Vec<ManagedProcess>,
}

impl ProcessRegistry {
    /// Build the registry from specs already sorted into launch order.
    /// Exactly one ManagedProcess exists per descriptor for the lifetime of
    /// the supervisor.
    pub fn from_specs(specs: Vec<ProcessSpec>) -> Self {
        let units = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| ManagedProcess::new(UnitId::new(i), spec))
            .collect();

        Self { units }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, id: UnitId) -> &ManagedProcess {
        &self.units[id.index()]
    }

    pub fn get_mut(&mut self, id: UnitId) -> &mut ManagedProcess {
        &mut self.units[id.index()]
    }

    pub fn units(&self) -> impl Iterator<Item = &ManagedProcess> {
        self.units.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().map(|u| u.id)
    }

    /// Units that were spawned and not yet reaped, in reverse launch order
    /// (the shutdown order)
    pub fn shutdown_order(&self) -> Vec<UnitId> {
        self.units
            .iter()
            .rev()
            .filter(|u| u.pid.is_some() && !u.reaped)
            .map(|u| u.id)
            .collect()
    }

    /// Apply a termination event observed by a waiter task
    pub fn record_exit(&mut self, id: UnitId, code: Option<i32>) {
        let unit = self.get_mut(id);
        debug!("Unit '{}' (id: {}) terminated with code {:?}", unit.name, id, code);
        unit.record_exit(code);
    }

    /// The failure that decides the supervisor's exit status: first by
    /// launch order, and launch order subsumes time for units that failed
    /// concurrently.
    pub fn first_failure(&self) -> Option<&ManagedProcess> {
        self.units.iter().find(|u| u.failure.is_some())
    }

    /// Send the unit's configured stop signal
    pub fn signal_unit(&self, id: UnitId) -> Result<()> {
        let unit = self.get(id);
        let signal = parse_signal(&unit.spec.stop_signal)?;
        self.send_signal(unit, signal)
    }

    /// Escalate to SIGKILL after the grace period expires
    pub fn force_kill(&self, id: UnitId) -> Result<()> {
        self.send_signal(self.get(id), Signal::SIGKILL)
    }

    fn send_signal(&self, unit: &ManagedProcess, signal: Signal) -> Result<()> {
        let pid = unit
            .pid
            .ok_or_else(|| ConvoyError::UnitNotFound(unit.name.clone()))?;

        signal::kill(Pid::from_raw(pid as i32), signal).map_err(|e| {
            ConvoyError::SignalError(unit.name.clone(), format!("Failed to send {}: {}", signal, e))
        })
    }
}

/// Map a configured signal name to a nix signal
fn parse_signal(signal_name: &str) -> Result<Signal> {
    match signal_name {
        "SIGTERM" => Ok(Signal::SIGTERM),
        "SIGINT" => Ok(Signal::SIGINT),
        "SIGQUIT" => Ok(Signal::SIGQUIT),
        "SIGKILL" => Ok(Signal::SIGKILL),
        "SIGHUP" => Ok(Signal::SIGHUP),
        "SIGUSR1" => Ok(Signal::SIGUSR1),
        "SIGUSR2" => Ok(Signal::SIGUSR2),
        _ => Err(ConvoyError::SignalError(
            signal_name.to_string(),
            "Invalid signal name".to_string(),
        )),
    }
}
