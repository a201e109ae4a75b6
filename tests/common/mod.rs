use std::sync::{Arc, Once};
use std::time::Duration;

use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, fmt};

use helmsman::store::{PipelineStep, Project, Store};
use helmsman::supervisor::{ProbeConfig, Supervisor};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
#[allow(dead_code)]
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// A store snapshotting into a temp dir plus a supervisor with actions
/// enabled and a short port-probe window.
#[allow(dead_code)]
pub fn supervisor_fixture() -> (Arc<Store>, Arc<Supervisor>, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(Store::new(dir.path().join("state.json")));
    let supervisor = Arc::new(
        Supervisor::new(store.clone(), true).with_probe(ProbeConfig {
            attempts: 2,
            interval: Duration::from_millis(50),
        }),
    );
    (store, supervisor, dir)
}

/// Build a project whose pipeline is the given (name, cmd) pairs.
#[allow(dead_code)]
pub fn project(id: &str, steps: &[(&str, &str)]) -> Project {
    Project {
        id: id.to_string(),
        pipeline: steps
            .iter()
            .map(|(name, cmd)| PipelineStep {
                name: (*name).to_string(),
                cmd: (*cmd).to_string(),
            })
            .collect(),
        ..Default::default()
    }
}

/// Poll the store until the project satisfies `pred`, panicking after
/// `timeout`.
#[allow(dead_code)]
pub async fn wait_for_project(
    store: &Arc<Store>,
    id: &str,
    timeout: Duration,
    pred: impl Fn(&Project) -> bool,
) -> Project {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(p) = store.get_project(id) {
            if pred(&p) {
                return p;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            let current = store.get_project(id);
            panic!("timed out waiting for project '{id}'; last seen: {current:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
