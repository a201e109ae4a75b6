// src/supervisor/ports.rs

//! Best-effort discovery of the TCP port a started process listens on.
//!
//! Given the root pid of a pipeline step, we enumerate its process-group
//! members with `pgrep -g` and ask `lsof` for listening TCP sockets owned by
//! any of them. Wrapper scripts routinely hand the actual server off to a
//! child, which is why the whole group is checked rather than just the root.
//!
//! Failing to find a port is not an error: the probe gives up silently after
//! a bounded number of attempts and the project simply stays portless.

use std::time::Duration;

use tokio::process::Command;
use tokio::time::sleep;
use tracing::debug;

/// Polling cadence for the probe. The defaults give a started process about
/// thirty seconds to bind; tests shrink both values.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

/// Poll until a listening port shows up in the process group of `pid`, or
/// the attempt budget runs out.
pub async fn discover_port(pid: u32, config: &ProbeConfig) -> Option<String> {
    for attempt in 0..config.attempts {
        sleep(config.interval).await;
        if let Some(port) = find_port_for_pid(pid).await {
            debug!(pid, attempt, port = %port, "discovered listening port");
            return Some(port);
        }
    }
    debug!(pid, "port probe gave up");
    None
}

/// One-shot lookup: group members via `pgrep -g`, then listening sockets via
/// `lsof -Pan -p <pids> -i -sTCP:LISTEN`.
async fn find_port_for_pid(pid: u32) -> Option<String> {
    let mut pids: Vec<String> = vec![pid.to_string()];
    if let Ok(out) = Command::new("pgrep")
        .arg("-g")
        .arg(pid.to_string())
        .output()
        .await
    {
        for line in String::from_utf8_lossy(&out.stdout).lines() {
            let s = line.trim();
            if !s.is_empty() && !pids.iter().any(|p| p == s) {
                pids.push(s.to_string());
            }
        }
    }

    // lsof exits non-zero when nothing matches; only the stdout matters.
    let out = Command::new("lsof")
        .args(["-Pan", "-p"])
        .arg(pids.join(","))
        .args(["-i", "-sTCP:LISTEN"])
        .output()
        .await
        .ok()?;

    parse_listen_port(&String::from_utf8_lossy(&out.stdout))
}

/// Extract the first port from `lsof` output, e.g.
/// `node 12345 user 20u IPv4 0t0 TCP *:3000 (LISTEN)` -> `3000`.
///
/// Only the trailing `:port` token is considered; IPv4/IPv6/wildcard bind
/// addresses are not distinguished.
fn parse_listen_port(out: &str) -> Option<String> {
    for line in out.lines().filter(|l| l.contains("(LISTEN)")) {
        for field in line.split_whitespace() {
            if let Some(idx) = field.rfind(':') {
                let port = &field[idx + 1..];
                if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) {
                    return Some(port.to_string());
                }
            }
        }
    }
    None
}
