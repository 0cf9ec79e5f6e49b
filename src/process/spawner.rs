use crate::config::ProcessSpec;
use crate::error::{ConvoyError, Result};
use tokio::process::{Child, Command};

/// Metadata returned when spawning a unit
#[derive(Debug)]
pub struct SpawnedUnit {
    /// The child process handle
    pub child: Child,

    /// Process ID assigned by the OS
    pub pid: u32,
}

/// Spawn a unit based on its specification.
///
/// The command is resolved via PATH when not absolute, so existence is not
/// pre-checked; a spawn failure is the authority. Stdout and stderr are
/// inherited, the launched services write to the supervisor's terminal.
pub async fn spawn_unit(spec: &ProcessSpec) -> Result<SpawnedUnit> {
    let mut command = Command::new(&spec.command);

    if !spec.args.is_empty() {
        command.args(&spec.args);
    }

    if let Some(ref cwd) = spec.cwd {
        command.current_dir(cwd);
    }

    for (key, value) in &spec.env {
        command.env(key, value);
    }

    let child = command
        .spawn()
        .map_err(|e| ConvoyError::SpawnError(spec.name.clone(), e.to_string()))?;

    let pid = child.id().ok_or_else(|| {
        ConvoyError::SpawnError(spec.name.clone(), "Failed to get PID".to_string())
    })?;

    Ok(SpawnedUnit { child, pid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaunchMode;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_spec(name: &str, command: &str) -> ProcessSpec {
        ProcessSpec {
            name: name.to_string(),
            command: command.to_string(),
            args: vec![],
            cwd: None,
            env: HashMap::new(),
            mode: LaunchMode::Detached,
            depends_on: None,
            readiness: None,
            startup_timeout_secs: 10,
            stop_signal: "SIGTERM".to_string(),
            stop_timeout_secs: 10,
        }
    }

    #[tokio::test]
    async fn test_spawn_simple_unit() {
        let spec = create_test_spec("test-echo", "/bin/echo");

        let result = spawn_unit(&spec).await;
        assert!(result.is_ok());

        let mut spawned = result.unwrap();
        assert!(spawned.pid > 0);
        let _ = spawned.child.wait().await;
    }

    #[tokio::test]
    async fn test_spawn_with_args_and_env() {
        let mut spec = create_test_spec("test-env", "/bin/sh");
        spec.args = vec!["-c".to_string(), "test \"$TEST_VAR\" = value".to_string()];
        spec.env
            .insert("TEST_VAR".to_string(), "value".to_string());

        let mut spawned = spawn_unit(&spec).await.unwrap();
        let status = spawned.child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_spawn_with_working_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut spec = create_test_spec("test-pwd", "/bin/pwd");
        spec.cwd = Some(temp_dir.path().to_path_buf());

        let result = spawn_unit(&spec).await;
        assert!(result.is_ok());
        let _ = result.unwrap().child.wait().await;
    }

    #[tokio::test]
    async fn test_spawn_resolves_via_path() {
        let spec = create_test_spec("test-path", "true");

        let result = spawn_unit(&spec).await;
        assert!(result.is_ok());
        let _ = result.unwrap().child.wait().await;
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_command() {
        let spec = create_test_spec("test-nonexistent", "/nonexistent/binary");

        let result = spawn_unit(&spec).await;
        match result {
            Err(ConvoyError::SpawnError(name, _)) => {
                assert_eq!(name, "test-nonexistent");
            }
            other => panic!("Expected SpawnError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_invalid_working_directory() {
        let mut spec = create_test_spec("test-invalid-cwd", "/bin/echo");
        spec.cwd = Some(PathBuf::from("/nonexistent/directory"));

        let result = spawn_unit(&spec).await;
        assert!(matches!(result, Err(ConvoyError::SpawnError(_, _))));
    }
}
