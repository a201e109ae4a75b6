// src/store/state.rs

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::model::{HealthSample, Project};

/// Retention cap for the health history: 30 days at one sample per minute.
pub const HISTORY_CAP: usize = 43_200;

/// On-disk shape of the projects snapshot.
#[derive(Serialize, Deserialize)]
struct ProjectsSnapshot {
    projects: Vec<Project>,
}

struct Inner {
    projects: HashMap<String, Project>,
    history: VecDeque<HealthSample>,
}

/// Concurrency-safe store for project records and health history.
///
/// Reads return copies taken under the shared lock; writes mutate in memory
/// only. [`Store::snapshot`] is the single persistence path and is safe to
/// call from any task.
pub struct Store {
    inner: RwLock<Inner>,
    path: PathBuf,
}

impl Store {
    /// Create an empty store that will snapshot to `path` (and the sibling
    /// `-history` path).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                projects: HashMap::new(),
                history: VecDeque::new(),
            }),
            path: path.into(),
        }
    }

    /// Best-effort hydration from the last on-disk snapshot.
    ///
    /// A missing or malformed file leaves the corresponding part of the store
    /// at its empty default; neither case is fatal.
    pub fn load(&self) {
        let mut inner = self.inner.write().expect("store lock poisoned");

        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<ProjectsSnapshot>(&contents) {
                Ok(snap) => {
                    inner.projects = snap
                        .projects
                        .into_iter()
                        .map(|p| (p.id.clone(), p))
                        .collect();
                    debug!(projects = inner.projects.len(), "loaded projects snapshot");
                }
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "malformed projects snapshot, starting empty");
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read projects snapshot");
            }
        }

        let hist_path = self.history_path();
        match fs::read_to_string(&hist_path) {
            Ok(contents) => match serde_json::from_str::<Vec<HealthSample>>(&contents) {
                Ok(history) => {
                    inner.history = history.into_iter().collect();
                    // A hand-edited or foreign file may exceed the cap; the
                    // retention policy applies on hydration too.
                    while inner.history.len() > HISTORY_CAP {
                        inner.history.pop_front();
                    }
                    debug!(samples = inner.history.len(), "loaded health history");
                }
                Err(err) => {
                    warn!(path = %hist_path.display(), error = %err, "malformed health history, starting empty");
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %hist_path.display(), error = %err, "failed to read health history");
            }
        }
    }

    /// Upsert a project by id. The full record is replaced in one critical
    /// section, so readers never observe a partial update.
    pub fn add_project(&self, project: Project) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.projects.insert(project.id.clone(), project);
    }

    /// Remove a project by id. Removing an unknown id is a no-op.
    pub fn remove_project(&self, id: &str) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.projects.remove(id);
    }

    pub fn get_project(&self, id: &str) -> Option<Project> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.projects.get(id).cloned()
    }

    /// All projects, sorted by id for stable API output.
    pub fn get_projects(&self) -> Vec<Project> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut out: Vec<Project> = inner.projects.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Append a health sample, evicting from the oldest end past
    /// [`HISTORY_CAP`].
    pub fn add_health_sample(&self, sample: HealthSample) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.history.push_back(sample);
        while inner.history.len() > HISTORY_CAP {
            inner.history.pop_front();
        }
    }

    pub fn history(&self) -> Vec<HealthSample> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.history.iter().cloned().collect()
    }

    /// Persist a full snapshot of projects and history.
    ///
    /// The copy is taken under the read lock and the lock released before any
    /// disk I/O. Each data set is written to a fresh temp file in the target
    /// directory and renamed over the destination, so a crash mid-write
    /// leaves the previous snapshot intact. The two renames are not atomic
    /// with respect to each other; a crash between them can leave projects
    /// and history from different points in time (accepted limitation).
    pub fn snapshot(&self) -> Result<()> {
        let (projects, history) = {
            let inner = self.inner.read().expect("store lock poisoned");
            let mut projects: Vec<Project> = inner.projects.values().cloned().collect();
            projects.sort_by(|a, b| a.id.cmp(&b.id));
            let history: Vec<HealthSample> = inner.history.iter().cloned().collect();
            (projects, history)
        };

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;

        write_atomic(
            dir,
            &self.path,
            &serde_json::to_vec_pretty(&ProjectsSnapshot { projects })?,
        )?;
        write_atomic(dir, &self.history_path(), &serde_json::to_vec(&history)?)?;

        debug!(path = %self.path.display(), "snapshot written");
        Ok(())
    }

    /// Sibling path for the health history: `-history` inserted before the
    /// extension of the base path.
    pub fn history_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut name = format!("{stem}-history");
        if let Some(ext) = self.path.extension() {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        self.path.with_file_name(name)
    }
}

/// Encode-flush-rename write: the destination either keeps its old contents
/// or gets the complete new ones, never a partial document.
fn write_atomic(dir: &Path, dest: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest)
        .with_context(|| format!("renaming snapshot into place at {}", dest.display()))?;
    Ok(())
}
