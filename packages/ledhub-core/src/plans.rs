//! PLANNED-mode plan storage: on-disk JSON documents plus a read-through
//! mtime/TTL cache so the planner doesn't hit disk on every tick.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const VALID_MODE: &str = "4ch_v1";
const VALID_MODE_CHANNELS: usize = 4;
const MAX_PLAN_ID_LEN: usize = 64;
const MAX_NAME_LEN: usize = 100;

/// A full plan: name, mode, interval, and the per-step channel sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub plan_id: String,
    pub name: String,
    pub mode: String,
    pub channels: usize,
    #[serde(default = "default_intensity_scale")]
    pub intensity_scale: String,
    pub interval_ms: u64,
    pub steps: Vec<Vec<u8>>,
    pub created_at: f64,
    pub updated_at: f64,
}

fn default_intensity_scale() -> String {
    "0-100".to_string()
}

/// Lightweight plan info for listing, omitting the (potentially large) step
/// sequence.
#[derive(Debug, Clone, Serialize)]
pub struct PlanMetadata {
    pub plan_id: String,
    pub name: String,
    pub mode: String,
    pub channels: usize,
    pub interval_ms: u64,
    pub step_count: usize,
    pub created_at: f64,
    pub updated_at: f64,
}

impl Plan {
    fn to_metadata(&self) -> PlanMetadata {
        PlanMetadata {
            plan_id: self.plan_id.clone(),
            name: self.name.clone(),
            mode: self.mode.clone(),
            channels: self.channels,
            interval_ms: self.interval_ms,
            step_count: self.steps.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A plan submitted by an operator, prior to id assignment and timestamping.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    pub name: String,
    pub mode: String,
    #[serde(default)]
    pub channels: Option<usize>,
    #[serde(default = "default_intensity_scale")]
    pub intensity_scale: String,
    pub interval_ms: u64,
    pub steps: Vec<Vec<f64>>,
}

/// Errors from plan storage and validation.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan not found: {0}")]
    NotFound(String),
    #[error("invalid plan: {0}")]
    Invalid(String),
    #[error("plan store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validates a plan request, returning the effective channel count on success.
fn validate(req: &PlanRequest) -> Result<usize, PlanError> {
    if req.mode != VALID_MODE {
        return Err(PlanError::Invalid(format!(
            "invalid mode: {}, must be {VALID_MODE}",
            req.mode
        )));
    }
    let expected_channels = VALID_MODE_CHANNELS;
    let channels = req.channels.unwrap_or(expected_channels);
    if channels != expected_channels {
        return Err(PlanError::Invalid(format!(
            "mode {VALID_MODE} requires {expected_channels} channels, got {channels}"
        )));
    }
    if req.interval_ms == 0 {
        return Err(PlanError::Invalid("interval_ms must be positive".to_string()));
    }
    if req.steps.is_empty() {
        return Err(PlanError::Invalid("steps must be a non-empty list".to_string()));
    }
    for (i, step) in req.steps.iter().enumerate() {
        if step.len() != expected_channels {
            return Err(PlanError::Invalid(format!(
                "step {i} must have {expected_channels} values, got {}",
                step.len()
            )));
        }
        for (j, value) in step.iter().enumerate() {
            if !(0.0..=100.0).contains(value) {
                return Err(PlanError::Invalid(format!(
                    "step {i}, channel {j}: value must be 0-100, got {value}"
                )));
            }
        }
    }
    let trimmed = req.name.trim();
    if trimmed.is_empty() {
        return Err(PlanError::Invalid("name must be a non-empty string".to_string()));
    }
    if req.name.len() > MAX_NAME_LEN {
        return Err(PlanError::Invalid(format!(
            "name must be {MAX_NAME_LEN} characters or less"
        )));
    }
    Ok(channels)
}

fn sanitize_plan_id(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    sanitized.chars().take(MAX_PLAN_ID_LEN).collect()
}

/// Millisecond-rounded Unix timestamp. Rounding avoids sub-millisecond float
/// noise that wouldn't otherwise round-trip bit-for-bit through a JSON save
/// and reload.
fn unix_time_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs_f64() * 1000.0).round() / 1000.0)
        .unwrap_or(0.0)
}

/// On-disk plan storage, one JSON file per plan under `dir`.
pub struct PlanStore {
    dir: PathBuf,
}

impl PlanStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn ensure_dir(&self) -> Result<(), PlanError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn plan_path(&self, plan_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_plan_id(plan_id)))
    }

    /// Lists all plans, sorted by most-recently-updated first. Plans that
    /// fail to parse are skipped and logged, not treated as fatal (§7e).
    pub fn list(&self) -> Result<Vec<PlanMetadata>, PlanError> {
        self.ensure_dir()?;
        let mut metas = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path).ok().and_then(|text| {
                serde_json::from_str::<Plan>(&text).ok()
            }) {
                Some(plan) => metas.push(plan.to_metadata()),
                None => log::warn!("failed to load plan file {}", path.display()),
            }
        }
        metas.sort_by(|a, b| b.updated_at.partial_cmp(&a.updated_at).unwrap());
        Ok(metas)
    }

    pub fn load(&self, plan_id: &str) -> Result<Plan, PlanError> {
        let path = self.plan_path(plan_id);
        if !path.exists() {
            return Err(PlanError::NotFound(plan_id.to_string()));
        }
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text)
            .map_err(|e| PlanError::Invalid(format!("corrupt plan file {plan_id}: {e}")))
    }

    /// Saves a new or updated plan. Updates keep `created_at` and the
    /// original id; new plans derive an id from the name, disambiguating on
    /// collision (matching the source's `save_plan`).
    pub fn save(&self, req: PlanRequest, existing_plan_id: Option<&str>) -> Result<Plan, PlanError> {
        self.ensure_dir()?;
        let channels = validate(&req)?;
        let now = unix_time_secs();

        let (final_id, created_at) = match existing_plan_id {
            Some(id) => {
                let created_at = self.load(id).map(|p| p.created_at).unwrap_or(now);
                (id.to_string(), created_at)
            }
            None => {
                let base_id = sanitize_plan_id(&req.name.to_lowercase().replace(' ', "_"));
                let mut final_id = base_id.clone();
                let mut counter = 1;
                while self.plan_path(&final_id).exists() {
                    final_id = format!("{base_id}_{counter}");
                    counter += 1;
                }
                (final_id, now)
            }
        };

        let steps: Vec<Vec<u8>> = req
            .steps
            .iter()
            .map(|step| step.iter().map(|v| v.round() as u8).collect())
            .collect();

        let plan = Plan {
            plan_id: final_id.clone(),
            name: req.name,
            mode: req.mode,
            channels,
            intensity_scale: req.intensity_scale,
            interval_ms: req.interval_ms,
            steps,
            created_at,
            updated_at: now,
        };

        let path = self.plan_path(&final_id);
        let temp_path = self.dir.join(format!("{final_id}.json.tmp"));
        let contents = serde_json::to_string_pretty(&plan)?;
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &path)?;
        log::info!("saved plan {final_id}");
        Ok(plan)
    }

    pub fn delete(&self, plan_id: &str) -> Result<(), PlanError> {
        let path = self.plan_path(plan_id);
        if !path.exists() {
            return Err(PlanError::NotFound(plan_id.to_string()));
        }
        std::fs::remove_file(&path)?;
        log::info!("deleted plan {plan_id}");
        Ok(())
    }
}

impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        PlanError::Invalid(err.to_string())
    }
}

struct CacheEntry {
    plan: Plan,
    mtime: SystemTime,
    cached_at: Instant,
}

/// Read-through cache in front of a [`PlanStore`], keyed by mtime so an
/// externally-edited plan file is picked up without waiting out the TTL.
pub struct PlanCache {
    store: PlanStore,
    ttl: std::time::Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl PlanCache {
    pub fn new(store: PlanStore, ttl: std::time::Duration) -> Self {
        Self {
            store,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a plan, reloading from disk if the file's mtime changed or
    /// the cached entry's TTL expired.
    pub fn get(&self, plan_id: &str) -> Option<Plan> {
        let path = self.store.plan_path(plan_id);
        let current_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(plan_id) {
            if entry.mtime == current_mtime && entry.cached_at.elapsed() < self.ttl {
                return Some(entry.plan.clone());
            }
        }

        match self.store.load(plan_id) {
            Ok(plan) => {
                entries.insert(
                    plan_id.to_string(),
                    CacheEntry {
                        plan: plan.clone(),
                        mtime: current_mtime,
                        cached_at: Instant::now(),
                    },
                );
                Some(plan)
            }
            Err(_) => {
                entries.remove(plan_id);
                None
            }
        }
    }

    pub fn invalidate(&self, plan_id: &str) {
        self.entries.lock().remove(plan_id);
    }

    pub fn store(&self) -> &PlanStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, steps: Vec<Vec<f64>>) -> PlanRequest {
        PlanRequest {
            name: name.to_string(),
            mode: VALID_MODE.to_string(),
            channels: None,
            intensity_scale: default_intensity_scale(),
            interval_ms: 100,
            steps,
        }
    }

    #[test]
    fn save_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let saved = store.save(req("Sunrise", vec![vec![0.0, 10.0, 20.0, 30.0]]), None).unwrap();
        let loaded = store.load(&saved.plan_id).unwrap();
        assert_eq!(loaded.steps, vec![vec![0, 10, 20, 30]]);
    }

    #[test]
    fn name_collision_disambiguates_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let a = store.save(req("Dusk", vec![vec![1.0, 1.0, 1.0, 1.0]]), None).unwrap();
        let b = store.save(req("Dusk", vec![vec![2.0, 2.0, 2.0, 2.0]]), None).unwrap();
        assert_ne!(a.plan_id, b.plan_id);
    }

    #[test]
    fn wrong_channel_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let result = store.save(req("Bad", vec![vec![1.0, 2.0]]), None);
        assert!(matches!(result, Err(PlanError::Invalid(_))));
    }

    #[test]
    fn out_of_range_value_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let result = store.save(req("Bad", vec![vec![1.0, 2.0, 3.0, 200.0]]), None);
        assert!(matches!(result, Err(PlanError::Invalid(_))));
    }

    #[test]
    fn update_preserves_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let first = store.save(req("Loop", vec![vec![1.0, 1.0, 1.0, 1.0]]), None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        let updated = store
            .save(req("Loop", vec![vec![2.0, 2.0, 2.0, 2.0]]), Some(&first.plan_id))
            .unwrap();
        assert_eq!(updated.created_at, first.created_at);
        assert!(updated.updated_at > first.created_at);
    }

    #[test]
    fn cache_reflects_external_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let saved = store.save(req("Cached", vec![vec![1.0, 1.0, 1.0, 1.0]]), None).unwrap();
        let cache = PlanCache::new(store, std::time::Duration::from_secs(5));

        let first = cache.get(&saved.plan_id).unwrap();
        assert_eq!(first.steps, vec![vec![1, 1, 1, 1]]);

        std::thread::sleep(std::time::Duration::from_millis(10));
        cache
            .store()
            .save(
                req("Cached", vec![vec![9.0, 9.0, 9.0, 9.0]]),
                Some(&saved.plan_id),
            )
            .unwrap();

        let second = cache.get(&saved.plan_id).unwrap();
        assert_eq!(second.steps, vec![vec![9, 9, 9, 9]]);
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let saved = store.save(req("Gone", vec![vec![1.0, 1.0, 1.0, 1.0]]), None).unwrap();
        store.delete(&saved.plan_id).unwrap();
        assert!(matches!(store.load(&saved.plan_id), Err(PlanError::NotFound(_))));
    }
}
