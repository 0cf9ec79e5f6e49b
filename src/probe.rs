use crate::config::ReadinessSpec;
use std::time::Duration;
use tokio::net::TcpStream;

/// Upper bound on a single connection attempt so a dropped SYN cannot eat
/// the whole probe budget.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Make one readiness attempt: does the port accept a TCP connection?
///
/// The polling loop lives in the sequencer, which needs to interleave
/// attempts with draining exit events; this function is a single bounded
/// attempt.
pub async fn attempt(spec: &ReadinessSpec) -> bool {
    let addr = format!("{}:{}", spec.host, spec.port);
    matches!(
        tokio::time::timeout(ATTEMPT_TIMEOUT, TcpStream::connect(&addr)).await,
        Ok(Ok(_))
    )
}
