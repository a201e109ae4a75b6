// src/supervisor/runner.rs

//! The pipeline run task: sequential step execution with live status,
//! streamed output, and two-tier cancellation.
//!
//! Cancellation is cooperative between steps (checked before each one) and
//! forceful within a step: a watcher task waits on the shared token and
//! SIGKILLs the step's whole process group, because a blocking child wait
//! cannot be interrupted cooperatively.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::store::{PipelineStep, Project, ProjectStatus, Store};

use super::ports::{self, ProbeConfig};
use super::registry::TaskRegistry;

/// Mutable state shared between the step loop, the output pumps, and the
/// port probe of one run. The mutex serializes sibling tasks of the run;
/// the store's own lock handles visibility to everyone else.
struct RunState {
    project: Project,
    log: String,
}

impl RunState {
    fn append(&mut self, text: &str) {
        self.log.push_str(text);
    }

    /// Publish the current full record to the store. Each call is one
    /// reader-visible update.
    fn publish(&mut self, store: &Store) {
        self.project.last_log = self.log.clone();
        store.add_project(self.project.clone());
    }
}

enum StepResult {
    Completed,
    Failed,
}

/// Body of the detached run task registered by `Supervisor::start`.
///
/// The project record arrives already reset to BOOTING / progress 0 with a
/// cleared log.
pub(super) async fn run_pipeline(
    store: Arc<Store>,
    registry: Arc<TaskRegistry>,
    project: Project,
    token: CancellationToken,
    probe: ProbeConfig,
) {
    let id = project.id.clone();
    let steps: Vec<PipelineStep> = project.pipeline.clone();
    let total = steps.len();

    let state = Arc::new(Mutex::new(RunState {
        project,
        log: String::new(),
    }));

    let mut failed = false;
    for (idx, step) in steps.iter().enumerate() {
        if token.is_cancelled() {
            break;
        }
        let i = idx + 1;

        {
            let mut st = state.lock().await;
            st.project.current_step = step.name.clone();
            st.project.progress = (i * 100 / total) as u8;
            st.append(&format!("===> [{i}/{total}] Running step: {}\n", step.name));
            st.publish(&store);
        }

        match run_step(&store, &state, step, &token, &probe).await {
            StepResult::Completed => {
                let mut st = state.lock().await;
                st.append("\n");
                st.publish(&store);
            }
            StepResult::Failed => {
                failed = true;
                break;
            }
        }
    }

    // An explicit stop may have removed the handle before the token state is
    // observable here; both count as "stopped by user", even if a command
    // error occurred on the way down.
    let stopped = token.is_cancelled() || !registry.contains(&id);
    {
        let mut st = state.lock().await;
        st.project.current_step.clear();
        if stopped {
            st.project.status = ProjectStatus::Idle;
            st.project.progress = 0;
            st.append("\nStopped by user.\n");
        } else if failed {
            st.project.status = ProjectStatus::Failed;
        } else {
            st.project.status = ProjectStatus::Active;
        }
        st.publish(&store);
        info!(project = %id, status = ?st.project.status, "pipeline run finished");
    }

    registry.remove(&id);
    // Release the cancellation watchers of completed steps; their pids are
    // reaped by now, so the group kill inside them is a no-op.
    token.cancel();

    if let Err(err) = store.snapshot() {
        error!(project = %id, error = %err, "snapshot after run failed");
    }
}

/// Execute one pipeline step to completion (or forced termination).
async fn run_step(
    store: &Arc<Store>,
    state: &Arc<Mutex<RunState>>,
    step: &PipelineStep,
    token: &CancellationToken,
    probe: &ProbeConfig,
) -> StepResult {
    let (dir, needs_probe) = {
        let st = state.lock().await;
        (st.project.path.clone(), st.project.port.is_none())
    };

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&step.cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &dir {
        cmd.current_dir(dir);
    }
    // Fresh process group so stop can terminate descendants as a unit.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            // Treated exactly like a runtime step failure: terminal, logged,
            // never retried.
            let mut st = state.lock().await;
            st.append(&format!("Failed to start: {err}\n"));
            st.publish(store);
            return StepResult::Failed;
        }
    };

    let mut pumps: Vec<JoinHandle<()>> = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump_output(stdout, state.clone(), store.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump_output(stderr, state.clone(), store.clone()));
    }

    if let Some(pid) = child.id() {
        if needs_probe {
            spawn_port_probe(pid, state.clone(), store.clone(), probe.clone());
        }

        // Forceful tier of cancellation: on the token firing, resolve the
        // step's process-group id and kill the whole group. If the shell has
        // already been reaped the pgid lookup fails and nothing happens.
        let token = token.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            kill_process_group(pid);
        });
    }

    let status = child.wait().await;
    // Drain remaining output before appending markers, so the log keeps
    // byte order within this step.
    for pump in pumps {
        let _ = pump.await;
    }

    match status {
        Ok(status) if status.success() => StepResult::Completed,
        Ok(status) => {
            let mut st = state.lock().await;
            st.append(&format!("\nERROR in step '{}': {status}\n", step.name));
            st.publish(store);
            StepResult::Failed
        }
        Err(err) => {
            warn!(step = %step.name, error = %err, "waiting for step process failed");
            let mut st = state.lock().await;
            st.append(&format!("\nERROR in step '{}': {err}\n", step.name));
            st.publish(store);
            StepResult::Failed
        }
    }
}

/// Stream one output pipe into the run log, republishing the record on every
/// chunk so observers see near-real-time output.
fn pump_output<R>(reader: R, state: Arc<Mutex<RunState>>, store: Arc<Store>) -> JoinHandle<()>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    let mut st = state.lock().await;
                    st.append(&chunk);
                    st.publish(&store);
                }
            }
        }
    })
}

/// Detached probe: writes the discovered port into the project exactly once,
/// only while the run is still live and no port has been set meanwhile.
fn spawn_port_probe(
    pid: u32,
    state: Arc<Mutex<RunState>>,
    store: Arc<Store>,
    probe: ProbeConfig,
) {
    tokio::spawn(async move {
        if let Some(port) = ports::discover_port(pid, &probe).await {
            let mut st = state.lock().await;
            if st.project.is_running() && st.project.port.is_none() {
                st.project.port = Some(port);
                st.publish(&store);
            }
        }
    });
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::{Pid, getpgid};

    // A failed pgid lookup means the process is already gone; nothing left
    // to kill.
    if let Ok(pgid) = getpgid(Some(Pid::from_raw(pid as i32))) {
        if let Err(err) = killpg(pgid, Signal::SIGKILL) {
            warn!(pid, error = %err, "killing process group failed");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
