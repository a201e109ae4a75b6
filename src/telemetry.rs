// src/telemetry.rs

//! Host health sampling: CPU, memory, temperature, and disk usage read from
//! `/proc` and sysfs. One sample is appended to the store at startup and
//! then once per minute until shutdown.
//!
//! Every reading is best-effort: a missing file or unexpected format yields
//! 0.0 rather than an error, since a partially populated sample is still
//! worth charting.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;

use crate::store::{HealthSample, Store};

const SAMPLE_PERIOD: Duration = Duration::from_secs(60);

/// Spawn the background collector loop.
pub fn spawn_collector(store: Arc<Store>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        store.add_health_sample(collect_sample().await);

        let mut ticker = interval(SAMPLE_PERIOD);
        // The first tick completes immediately; we already sampled.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    store.add_health_sample(collect_sample().await);
                }
            }
        }
    })
}

/// Take one full health reading.
pub async fn collect_sample() -> HealthSample {
    let cpu_usage = cpu_usage().await;
    let (mem_total, mem_available) = mem_info();
    let memory_percent = if mem_total > 0 {
        (mem_total - mem_available) as f64 / mem_total as f64 * 100.0
    } else {
        0.0
    };

    HealthSample {
        time: Utc::now(),
        cpu_usage,
        memory_percent,
        temperature: temperature(),
        disk_percent: disk_percent("/"),
    }
}

/// CPU utilisation over a 100 ms window, from two `/proc/stat` readings.
async fn cpu_usage() -> f64 {
    let (idle1, total1) = read_cpu_stat();
    sleep(Duration::from_millis(100)).await;
    let (idle2, total2) = read_cpu_stat();

    let idle_delta = idle2.saturating_sub(idle1);
    let total_delta = total2.saturating_sub(total1);
    if total_delta == 0 {
        return 0.0;
    }
    (1.0 - idle_delta as f64 / total_delta as f64) * 100.0
}

fn read_cpu_stat() -> (u64, u64) {
    match fs::read_to_string("/proc/stat") {
        Ok(contents) => parse_cpu_stat(&contents),
        Err(_) => (0, 0),
    }
}

/// Parse the aggregate `cpu ` line: returns (idle, total) jiffies.
fn parse_cpu_stat(contents: &str) -> (u64, u64) {
    let Some(line) = contents.lines().find(|l| l.starts_with("cpu ")) else {
        return (0, 0);
    };
    let mut idle = 0u64;
    let mut total = 0u64;
    // Field 4 (1-indexed after the "cpu" label) is idle time.
    for (i, field) in line.split_whitespace().skip(1).enumerate() {
        let val: u64 = field.parse().unwrap_or(0);
        total += val;
        if i == 3 {
            idle = val;
        }
    }
    (idle, total)
}

/// (total, available) bytes from `/proc/meminfo`.
fn mem_info() -> (u64, u64) {
    match fs::read_to_string("/proc/meminfo") {
        Ok(contents) => parse_meminfo(&contents),
        Err(_) => (0, 0),
    }
}

fn parse_meminfo(contents: &str) -> (u64, u64) {
    let mut total = 0u64;
    let mut available = 0u64;
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("MemTotal:") => {
                total = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0) * 1024;
            }
            Some("MemAvailable:") => {
                available = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0) * 1024;
            }
            _ => {}
        }
    }
    (total, available)
}

/// Degrees Celsius from the first readable thermal sysfs file, 0.0 if none.
fn temperature() -> f64 {
    let paths = [
        "/sys/class/thermal/thermal_zone0/temp",
        "/sys/class/hwmon/hwmon0/temp1_input",
    ];
    for path in paths {
        if let Ok(contents) = fs::read_to_string(path) {
            if let Ok(millidegrees) = contents.trim().parse::<f64>() {
                return millidegrees / 1000.0;
            }
        }
    }
    0.0
}

#[cfg(unix)]
fn disk_percent(path: &str) -> f64 {
    match nix::sys::statvfs::statvfs(path) {
        Ok(stat) => {
            let total = stat.blocks() as u64 * stat.fragment_size() as u64;
            let free = stat.blocks_free() as u64 * stat.fragment_size() as u64;
            if total == 0 {
                return 0.0;
            }
            (total - free) as f64 / total as f64 * 100.0
        }
        Err(_) => 0.0,
    }
}

#[cfg(not(unix))]
fn disk_percent(_path: &str) -> f64 {
    0.0
}
