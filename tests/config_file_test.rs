use convoy::config::{DescriptorSet, FailurePolicy, LaunchMode};
use convoy::error::ConvoyError;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_full_toml_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "convoy.toml",
        r#"
            [settings]
            on_detached_failure = "abort-all"

            [[processes]]
            name = "web"
            command = "/bin/sleep"
            args = ["30"]
            mode = "detached"
            readiness = { port = 8000, timeout_secs = 5 }
            stop_signal = "SIGINT"
            stop_timeout_secs = 4

            [[processes]]
            name = "bot"
            command = "/bin/sleep"
            args = ["30"]
            mode = "blocking"
            depends_on = "web"
            startup_timeout_secs = 15
        "#,
    );

    let set = DescriptorSet::from_file(&path).unwrap();
    assert_eq!(set.settings.on_detached_failure, FailurePolicy::AbortAll);
    assert_eq!(set.processes.len(), 2);

    let web = set.get("web").unwrap();
    assert_eq!(web.mode, LaunchMode::Detached);
    assert_eq!(web.stop_signal, "SIGINT");
    assert_eq!(web.stop_timeout_secs, 4);
    assert_eq!(web.readiness.as_ref().unwrap().port, 8000);

    let bot = set.get("bot").unwrap();
    assert_eq!(bot.mode, LaunchMode::Blocking);
    assert_eq!(bot.depends_on.as_deref(), Some("web"));
    assert_eq!(bot.startup_timeout_secs, 15);
}

#[test]
fn test_load_json_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "convoy.json",
        r#"
            {
                "settings": { "on_detached_failure": "ignore" },
                "processes": [
                    {
                        "name": "web",
                        "command": "/bin/sleep",
                        "args": ["30"],
                        "mode": "detached"
                    },
                    {
                        "name": "bot",
                        "command": "/bin/sleep",
                        "args": ["30"],
                        "mode": "blocking",
                        "depends_on": "web"
                    }
                ]
            }
        "#,
    );

    let set = DescriptorSet::from_file(&path).unwrap();
    assert_eq!(set.settings.on_detached_failure, FailurePolicy::Ignore);
    assert_eq!(set.processes.len(), 2);
}

#[test]
fn test_launch_order_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "convoy.toml",
        r#"
            [[processes]]
            name = "bot"
            command = "/bin/sleep"
            args = ["1"]
            mode = "blocking"
            depends_on = "web"

            [[processes]]
            name = "web"
            command = "/bin/sleep"
            args = ["1"]
            mode = "detached"
            depends_on = "cache"

            [[processes]]
            name = "cache"
            command = "/bin/sleep"
            args = ["1"]
            mode = "detached"
        "#,
    );

    let set = DescriptorSet::from_file(&path).unwrap();
    let order = set.launch_order().unwrap();
    let names: Vec<&str> = order
        .iter()
        .map(|&i| set.processes[i].name.as_str())
        .collect();

    assert_eq!(names, vec!["cache", "web", "bot"]);
}

#[test]
fn test_missing_file() {
    let result = DescriptorSet::from_file(std::path::Path::new("/nonexistent/convoy.toml"));
    assert!(matches!(result, Err(ConvoyError::ConfigError(_))));
}

#[test]
fn test_cycle_rejected_at_load() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "convoy.toml",
        r#"
            [[processes]]
            name = "a"
            command = "/bin/sleep"
            mode = "detached"
            depends_on = "b"

            [[processes]]
            name = "b"
            command = "/bin/sleep"
            mode = "detached"
            depends_on = "a"

            [[processes]]
            name = "bot"
            command = "/bin/sleep"
            mode = "blocking"
        "#,
    );

    let result = DescriptorSet::from_file(&path);
    assert!(matches!(result, Err(ConvoyError::DependencyCycle(_))));
}

#[test]
fn test_missing_blocking_unit_rejected_at_load() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "convoy.toml",
        r#"
            [[processes]]
            name = "web"
            command = "/bin/sleep"
            mode = "detached"
        "#,
    );

    let result = DescriptorSet::from_file(&path);
    assert!(matches!(result, Err(ConvoyError::ConfigValidationError(_))));
}
