use crate::error::{ConvoyError, Result};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a unit is launched relative to the startup sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Spawn and wait for termination; the sequencer does not proceed further
    Blocking,
    /// Spawn and proceed to the next unit without waiting for exit
    Detached,
}

impl std::fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchMode::Blocking => write!(f, "blocking"),
            LaunchMode::Detached => write!(f, "detached"),
        }
    }
}

/// What to do when a detached unit fails while the blocking unit is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Terminate everything and fail fast (default)
    AbortAll,
    /// Let the remaining units continue
    Ignore,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "abort-all" => Ok(FailurePolicy::AbortAll),
            "ignore" => Ok(FailurePolicy::Ignore),
            _ => Err(format!(
                "Invalid failure policy: '{}'. Expected 'abort-all' or 'ignore'",
                s
            )),
        }
    }
}

/// TCP readiness probe for a detached unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSpec {
    /// Host to probe
    #[serde(default = "default_probe_host")]
    pub host: String,

    /// Port that must accept connections before the unit counts as running
    pub port: u16,

    /// Maximum time to wait for the port to open (in seconds)
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,

    /// Delay between connection attempts (in milliseconds)
    #[serde(default = "default_probe_interval")]
    pub poll_interval_ms: u64,
}

impl ReadinessSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Configuration for a single managed unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Unit name (unique identifier)
    pub name: String,

    /// Executable to run (resolved via PATH if not absolute)
    pub command: String,

    /// Command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the process
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Environment variables forwarded to the process
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Launch mode (blocking or detached)
    pub mode: LaunchMode,

    /// Unit that must be running before this one launches
    #[serde(default)]
    pub depends_on: Option<String>,

    /// Optional readiness probe polled after a detached spawn
    #[serde(default)]
    pub readiness: Option<ReadinessSpec>,

    /// Maximum wait for the dependency to become running (in seconds)
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Signal to send on shutdown (default: SIGTERM)
    #[serde(default = "default_stop_signal")]
    pub stop_signal: String,

    /// Grace period before force kill (in seconds)
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

// Default value functions for serde
fn default_probe_host() -> String {
    "127.0.0.1".to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_probe_interval() -> u64 {
    100
}

fn default_startup_timeout() -> u64 {
    10
}

fn default_stop_signal() -> String {
    "SIGTERM".to_string()
}

fn default_stop_timeout() -> u64 {
    10
}

impl ProcessSpec {
    /// Get dependency wait timeout as Duration
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Get shutdown grace period as Duration
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Validate a single unit specification
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConvoyError::MissingConfigField("name".to_string()));
        }

        if self.command.is_empty() {
            return Err(ConvoyError::MissingConfigField("command".to_string()));
        }

        let valid_signals = [
            "SIGTERM", "SIGINT", "SIGQUIT", "SIGKILL", "SIGHUP", "SIGUSR1", "SIGUSR2",
        ];
        if !valid_signals.contains(&self.stop_signal.as_str()) {
            return Err(ConvoyError::ConfigValidationError(format!(
                "Invalid stop_signal for unit '{}': {}. Must be one of: {}",
                self.name,
                self.stop_signal,
                valid_signals.join(", ")
            )));
        }

        if let Some(ref dep) = self.depends_on {
            if dep == &self.name {
                return Err(ConvoyError::ConfigValidationError(format!(
                    "Unit '{}' depends on itself",
                    self.name
                )));
            }
        }

        if let Some(ref cwd) = self.cwd {
            if !cwd.is_dir() {
                return Err(ConvoyError::ConfigValidationError(format!(
                    "Working directory for unit '{}' is not a directory: {}",
                    self.name,
                    cwd.display()
                )));
            }
        }

        Ok(())
    }

    /// Expand environment variables in configuration fields
    fn expand_env_vars(&mut self) {
        self.command = expand_env_in_string(&self.command);

        if let Some(ref cwd) = self.cwd {
            self.cwd = Some(PathBuf::from(expand_env_in_string(
                &cwd.to_string_lossy(),
            )));
        }

        self.args = self.args.iter().map(|a| expand_env_in_string(a)).collect();

        self.env = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_in_string(v)))
            .collect();
    }
}

/// Expand `$VAR` and `${VAR}` references in a string.
///
/// Single left-to-right scan so `$HOST` inside `$HOSTNAME` is never
/// mistaken for the shorter name. Unset variables are left as written.
fn expand_env_in_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];

        if let Some(braced) = rest.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    let name = &braced[..end];
                    match std::env::var(name) {
                        Ok(value) => out.push_str(&value),
                        Err(_) => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &braced[end + 1..];
                }
                // Unterminated brace, keep the literal text
                None => out.push('$'),
            }
        } else {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if end == 0 {
                out.push('$');
            } else {
                let name = &rest[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('$');
                        out.push_str(name);
                    }
                }
                rest = &rest[end..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Supervisor-level settings shared by all units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Policy when a detached unit fails before the blocking unit terminates
    #[serde(default = "default_failure_policy")]
    pub on_detached_failure: FailurePolicy,
}

fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::AbortAll
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            on_detached_failure: default_failure_policy(),
        }
    }
}

/// Static, immutable set of unit descriptors supplied at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorSet {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub processes: Vec<ProcessSpec>,
}

impl DescriptorSet {
    /// Load a descriptor set from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConvoyError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut set: DescriptorSet = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| ConvoyError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| ConvoyError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(ConvoyError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        for spec in &mut set.processes {
            spec.expand_env_vars();
        }

        set.validate()?;

        Ok(set)
    }

    /// Validate the whole set: per-unit fields, name uniqueness, dependency
    /// references, and the single-blocking-unit contract
    pub fn validate(&self) -> Result<()> {
        if self.processes.is_empty() {
            return Err(ConvoyError::InvalidConfig(
                "No unit configuration found".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.processes {
            spec.validate()?;

            if !seen.insert(spec.name.as_str()) {
                return Err(ConvoyError::ConfigValidationError(format!(
                    "Duplicate unit name: {}",
                    spec.name
                )));
            }
        }

        for spec in &self.processes {
            if let Some(ref dep) = spec.depends_on {
                if !self.processes.iter().any(|p| &p.name == dep) {
                    return Err(ConvoyError::ConfigValidationError(format!(
                        "Unit '{}' depends on unknown unit '{}'",
                        spec.name, dep
                    )));
                }
            }
        }

        let blocking: Vec<&ProcessSpec> = self
            .processes
            .iter()
            .filter(|p| p.mode == LaunchMode::Blocking)
            .collect();

        match blocking.as_slice() {
            [] => {
                return Err(ConvoyError::ConfigValidationError(
                    "Exactly one unit must use mode = \"blocking\"".to_string(),
                ))
            }
            [single] => {
                // The blocking unit is the terminal step of the startup
                // sequence, so nothing may launch after it.
                if let Some(dependent) = self
                    .processes
                    .iter()
                    .find(|p| p.depends_on.as_deref() == Some(single.name.as_str()))
                {
                    return Err(ConvoyError::ConfigValidationError(format!(
                        "Unit '{}' depends on blocking unit '{}'",
                        dependent.name, single.name
                    )));
                }
            }
            multiple => {
                return Err(ConvoyError::ConfigValidationError(format!(
                    "Only one blocking unit is allowed, found {}: {}",
                    multiple.len(),
                    multiple
                        .iter()
                        .map(|p| p.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )))
            }
        }

        // Run the topological sort so cycles are rejected before any launch
        self.launch_order().map(|_| ())
    }

    /// Enumerate descriptor indices in dependency order.
    ///
    /// The blocking unit is moved to the end of the order: the sequencer
    /// parks on it, so every detached unit must launch first even when it
    /// shares no edge with the blocking unit.
    pub fn launch_order(&self) -> Result<Vec<usize>> {
        let index_by_name: HashMap<&str, usize> = self
            .processes
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.as_str(), i))
            .collect();

        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<_> = (0..self.processes.len())
            .map(|i| graph.add_node(i))
            .collect();

        for (i, spec) in self.processes.iter().enumerate() {
            if let Some(ref dep) = spec.depends_on {
                let d = *index_by_name.get(dep.as_str()).ok_or_else(|| {
                    ConvoyError::ConfigValidationError(format!(
                        "Unit '{}' depends on unknown unit '{}'",
                        spec.name, dep
                    ))
                })?;
                graph.add_edge(nodes[d], nodes[i], ());
            }
        }

        let sorted = toposort(&graph, None).map_err(|cycle| {
            ConvoyError::DependencyCycle(self.processes[graph[cycle.node_id()]].name.clone())
        })?;

        let mut order: Vec<usize> = sorted.into_iter().map(|n| graph[n]).collect();

        if let Some(pos) = order
            .iter()
            .position(|&i| self.processes[i].mode == LaunchMode::Blocking)
        {
            let blocking = order.remove(pos);
            order.push(blocking);
        }

        Ok(order)
    }

    /// Look up a unit specification by name
    pub fn get(&self, name: &str) -> Option<&ProcessSpec> {
        self.processes.iter().find(|p| p.name == name)
    }
}
