//! StateManager — durable workflow records, one JSON file per job.
//!
//! Storage path: `<state_dir>/{job_id}.json`
//!
//! Writes go to `.{job_id}.json.tmp` first and are renamed into place, so a
//! reader never sees a half-written record. The in-memory cache is a
//! read-through accelerator; the files are authoritative.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tokio::sync::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::models::{NewWorkflowState, StateUpdate, WorkflowMetrics, WorkflowState, WorkflowStatus};

/// Filter for [`StateManager::list`].
#[derive(Debug, Clone)]
pub struct ListFilter {
    pub status: Option<WorkflowStatus>,
    pub workflow_type: Option<String>,
    pub limit: usize,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            status: None,
            workflow_type: None,
            limit: 100,
        }
    }
}

#[derive(Clone)]
pub struct StateManager {
    state_dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, WorkflowState>>>,
}

impl StateManager {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Create and persist a new record in status INITIATED.
    pub async fn create(&self, input: NewWorkflowState) -> CoreResult<WorkflowState> {
        validate_job_id(&input.job_id)?;

        // Held until the record is on disk so two creates cannot both pass the check.
        let mut cache = self.cache.write().await;
        let exists = cache.contains_key(&input.job_id)
            || fs::try_exists(self.record_path(&input.job_id)).await?;
        if exists {
            return Err(CoreError::Conflict(format!(
                "Workflow state already exists for job {}",
                input.job_id
            )));
        }

        let state = WorkflowState::new(input);
        self.persist(&state).await?;
        cache.insert(state.job_id.clone(), state.clone());
        drop(cache);

        tracing::info!(
            "[StateManager] Created workflow state for job {} ({})",
            state.job_id,
            state.workflow_type
        );
        Ok(state)
    }

    /// Apply a partial update, refresh `updated_at`, and persist.
    pub async fn update(&self, job_id: &str, update: StateUpdate) -> CoreResult<WorkflowState> {
        validate_job_id(job_id)?;

        let mut state = self
            .load(job_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("No workflow state for job {}", job_id)))?;

        if let Some(next) = update.status {
            if !state.status.can_transition_to(next) {
                return Err(CoreError::InvalidTransition {
                    job_id: job_id.to_string(),
                    from: state.status.to_string(),
                    to: next.to_string(),
                });
            }
            if state.status != next {
                tracing::info!(
                    "[StateManager] Job {} status {} -> {}",
                    job_id,
                    state.status,
                    next
                );
            }
            state.status = next;
        }
        state.apply_fields(update);
        state.updated_at = Utc::now();

        self.persist(&state).await?;
        self.cache
            .write()
            .await
            .insert(job_id.to_string(), state.clone());
        Ok(state)
    }

    /// Fetch a record; `Ok(None)` when it does not exist.
    pub async fn get(&self, job_id: &str) -> CoreResult<Option<WorkflowState>> {
        validate_job_id(job_id)?;
        self.load(job_id).await
    }

    /// Scan every durable record, newest update first.
    ///
    /// Unreadable or corrupt files are skipped with a warning.
    pub async fn list(&self, filter: &ListFilter) -> CoreResult<Vec<WorkflowState>> {
        let mut entries = match fs::read_dir(&self.state_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut states = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_record {
                continue;
            }

            match read_record(&path).await {
                Ok(state) => states.push(state),
                Err(e) => {
                    tracing::warn!("[StateManager] Skipping {}: {}", path.display(), e);
                }
            }
        }

        states.retain(|s| {
            filter.status.map_or(true, |status| s.status == status)
                && filter
                    .workflow_type
                    .as_deref()
                    .map_or(true, |variant| s.workflow_type == variant)
        });
        states.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        states.truncate(filter.limit);
        Ok(states)
    }

    /// Remove a record from cache and disk. Returns whether anything was
    /// removed; deleting a missing record is not an error.
    pub async fn delete(&self, job_id: &str) -> CoreResult<bool> {
        validate_job_id(job_id)?;

        let cached = self.cache.write().await.remove(job_id).is_some();
        let on_disk = match fs::remove_file(self.record_path(job_id)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if cached || on_disk {
            tracing::info!("[StateManager] Deleted workflow state for job {}", job_id);
        }
        Ok(cached || on_disk)
    }

    pub async fn metrics(&self, job_id: &str) -> CoreResult<WorkflowMetrics> {
        let state = self
            .get(job_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("No workflow state for job {}", job_id)))?;
        Ok(WorkflowMetrics::from_state(&state))
    }

    // ─── Internals ──────────────────────────────────────────────────────

    fn record_path(&self, job_id: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", job_id))
    }

    /// Cache first, then disk. A disk hit is cached.
    async fn load(&self, job_id: &str) -> CoreResult<Option<WorkflowState>> {
        if let Some(state) = self.cache.read().await.get(job_id) {
            return Ok(Some(state.clone()));
        }

        let state = match read_record(&self.record_path(job_id)).await {
            Ok(state) => state,
            Err(CoreError::Io(e)) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        self.cache
            .write()
            .await
            .insert(job_id.to_string(), state.clone());
        Ok(Some(state))
    }

    async fn persist(&self, state: &WorkflowState) -> CoreResult<()> {
        fs::create_dir_all(&self.state_dir).await?;

        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.state_dir.join(format!(".{}.json.tmp", state.job_id));
        fs::write(&tmp, json).await?;
        if let Err(e) = fs::rename(&tmp, self.record_path(&state.job_id)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

async fn read_record(path: &Path) -> CoreResult<WorkflowState> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Job ids become file names, so they must be a single plain path segment.
fn validate_job_id(job_id: &str) -> CoreResult<()> {
    let trimmed = job_id.trim();
    if trimmed.is_empty() {
        return Err(CoreError::BadRequest("job id must not be empty".to_string()));
    }
    if trimmed != job_id
        || job_id.starts_with('.')
        || job_id.contains(['/', '\\'])
        || job_id.contains('\0')
    {
        return Err(CoreError::BadRequest(format!("invalid job id: {:?}", job_id)));
    }
    Ok(())
}
