// Process module - spawning, state tracking and the managed-unit registry

pub mod registry;
pub mod spawner;
pub mod types;

pub use registry::ProcessRegistry;
pub use types::{FailureCause, ManagedProcess, ProcessState, UnitId};
