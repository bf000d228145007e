//! Persistence for finished runs, planned routes and the runner profile.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::models::{ProfileStats, Route, RunRecord, UserProfile};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid data in {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Stores a finished run, replacing any run with the same id, and
    /// recounts the profile stats. Saving the same run again after a
    /// failure never duplicates it.
    async fn save_run(&self, run: &RunRecord) -> Result<(), StoreError>;

    /// All runs, most recent first.
    async fn list_runs(&self) -> Result<Vec<RunRecord>, StoreError>;

    async fn get_run(&self, id: &str) -> Result<RunRecord, StoreError>;

    async fn profile(&self) -> Result<UserProfile, StoreError>;

    /// Inserts a route, replacing any route with the same id.
    async fn save_route(&self, route: &Route) -> Result<(), StoreError>;

    /// All routes, most recently created first.
    async fn list_routes(&self) -> Result<Vec<Route>, StoreError>;

    async fn get_route(&self, id: &str) -> Result<Route, StoreError>;
}

fn run_not_found(id: &str) -> StoreError {
    StoreError::NotFound {
        kind: "run",
        id: id.to_string(),
    }
}

fn route_not_found(id: &str) -> StoreError {
    StoreError::NotFound {
        kind: "route",
        id: id.to_string(),
    }
}

fn upsert_run(runs: &mut Vec<RunRecord>, run: &RunRecord) {
    match runs.iter_mut().find(|r| r.id == run.id) {
        Some(existing) => *existing = run.clone(),
        None => runs.insert(0, run.clone()),
    }
}

fn upsert_route(routes: &mut Vec<Route>, route: &Route) {
    routes.retain(|r| r.id != route.id);
    routes.insert(0, route.clone());
    routes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[derive(Debug, Default)]
struct Snapshot {
    runs: Vec<RunRecord>,
    routes: Vec<Route>,
    profile: UserProfile,
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn save_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        upsert_run(&mut inner.runs, run);
        inner.profile.stats = ProfileStats::from_runs(&inner.runs);
        Ok(())
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        Ok(self.inner.read().await.runs.clone())
    }

    async fn get_run(&self, id: &str) -> Result<RunRecord, StoreError> {
        self.inner
            .read()
            .await
            .runs
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| run_not_found(id))
    }

    async fn profile(&self) -> Result<UserProfile, StoreError> {
        Ok(self.inner.read().await.profile.clone())
    }

    async fn save_route(&self, route: &Route) -> Result<(), StoreError> {
        upsert_route(&mut self.inner.write().await.routes, route);
        Ok(())
    }

    async fn list_routes(&self) -> Result<Vec<Route>, StoreError> {
        Ok(self.inner.read().await.routes.clone())
    }

    async fn get_route(&self, id: &str) -> Result<Route, StoreError> {
        self.inner
            .read()
            .await
            .routes
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| route_not_found(id))
    }
}

const RUNS_FILE: &str = "runs.json";
const ROUTES_FILE: &str = "routes.json";
const PROFILE_FILE: &str = "profile.json";

/// JSON documents in a data directory: `runs.json`, `routes.json` and
/// `profile.json`. Every write replaces the whole document through a
/// temporary file and a rename, so readers never see a partial file.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens `dir`, creating it when missing.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        tracing::info!("Using data directory {}", dir.display());
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_or_default<T>(&self, name: &str) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Serde { path, source })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(T::default()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serde {
            path: path.clone(),
            source,
        })?;
        let tmp = self.dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io { path, source })
    }
}

#[async_trait]
impl RunStore for JsonFileStore {
    async fn save_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut runs: Vec<RunRecord> = self.read_or_default(RUNS_FILE).await?;
        let mut profile: UserProfile = self.read_or_default(PROFILE_FILE).await?;
        upsert_run(&mut runs, run);
        profile.stats = ProfileStats::from_runs(&runs);

        self.write(RUNS_FILE, &runs).await?;
        self.write(PROFILE_FILE, &profile).await?;
        tracing::info!(
            "Run saved: {} ({:.2} km, {} runs total)",
            run.id,
            run.distance_km,
            profile.stats.total_runs
        );
        Ok(())
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        let runs: Vec<RunRecord> = self.read_or_default(RUNS_FILE).await?;
        tracing::debug!("Retrieved {} runs", runs.len());
        Ok(runs)
    }

    async fn get_run(&self, id: &str) -> Result<RunRecord, StoreError> {
        self.list_runs()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| run_not_found(id))
    }

    async fn profile(&self) -> Result<UserProfile, StoreError> {
        self.read_or_default(PROFILE_FILE).await
    }

    async fn save_route(&self, route: &Route) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut routes: Vec<Route> = self.read_or_default(ROUTES_FILE).await?;
        upsert_route(&mut routes, route);
        self.write(ROUTES_FILE, &routes).await?;
        tracing::info!("Route saved: {} ({})", route.name, route.id);
        Ok(())
    }

    async fn list_routes(&self) -> Result<Vec<Route>, StoreError> {
        self.read_or_default(ROUTES_FILE).await
    }

    async fn get_route(&self, id: &str) -> Result<Route, StoreError> {
        self.list_routes()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| route_not_found(id))
    }
}
