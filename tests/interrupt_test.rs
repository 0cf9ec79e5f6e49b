//! Operator-interrupt handling against a live supervisor.
//!
//! Both phases share a single test function: the signal goes to the whole
//! test process, so no other supervision run may be in flight when it lands.

use convoy::config::{DescriptorSet, LaunchMode, ProcessSpec, ReadinessSpec, Settings};
use convoy::process::ProcessState;
use convoy::supervisor::{Supervisor, SupervisorOptions};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::net::TcpListener;
use std::time::Duration;

fn shell_spec(name: &str, mode: LaunchMode, depends_on: Option<&str>, script: &str) -> ProcessSpec {
    ProcessSpec {
        name: name.to_string(),
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        cwd: None,
        env: HashMap::new(),
        mode,
        depends_on: depends_on.map(|s| s.to_string()),
        readiness: None,
        startup_timeout_secs: 5,
        stop_signal: "SIGTERM".to_string(),
        stop_timeout_secs: 5,
    }
}

fn descriptor_set(processes: Vec<ProcessSpec>) -> DescriptorSet {
    DescriptorSet {
        settings: Settings::default(),
        processes,
    }
}

#[tokio::test]
async fn test_interrupt_drives_reverse_order_shutdown_in_any_phase() {
    // Interrupt lands while the sequencer is parked in a readiness wait:
    // the already-started unit must be torn down and the blocking unit
    // must never launch.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut web = shell_spec("web", LaunchMode::Detached, None, "sleep 30");
    web.readiness = Some(ReadinessSpec {
        host: "127.0.0.1".to_string(),
        port,
        timeout_secs: 30,
        poll_interval_ms: 50,
    });

    let set = descriptor_set(vec![
        web,
        shell_spec("bot", LaunchMode::Blocking, Some("web"), "exit 0"),
    ]);

    let supervisor = Supervisor::new(set, SupervisorOptions::default()).unwrap();
    let handle = tokio::spawn(supervisor.run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    kill(Pid::this(), Signal::SIGTERM).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("supervisor did not shut down after the interrupt")
        .unwrap();

    assert!(report.first_failure.is_none());
    let web = report.unit("web").unwrap();
    assert_eq!(web.state, ProcessState::Exited);
    let bot = report.unit("bot").unwrap();
    assert_eq!(bot.state, ProcessState::Pending);
    assert!(bot.pid.is_none());
    assert_eq!(report.exit_code, 1);

    // Interrupt lands while the monitor owns the supervisor: every unit
    // stops cooperatively and the run counts as clean.
    let set = descriptor_set(vec![
        shell_spec("web", LaunchMode::Detached, None, "sleep 30"),
        shell_spec("bot", LaunchMode::Blocking, Some("web"), "sleep 30"),
    ]);

    let supervisor = Supervisor::new(set, SupervisorOptions::default()).unwrap();
    let handle = tokio::spawn(supervisor.run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    kill(Pid::this(), Signal::SIGTERM).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("supervisor did not shut down after the interrupt")
        .unwrap();

    assert_eq!(report.exit_code, 0);
    assert!(report.first_failure.is_none());
    assert_eq!(report.unit("web").unwrap().state, ProcessState::Exited);
    assert_eq!(report.unit("bot").unwrap().state, ProcessState::Exited);
}
