// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup and shutdown.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use cadence_core::{SystemClock, TokioScheduler, UuidIdGen};
use cadence_engine::{JobQueue, Runtime, RuntimeDeps};
use cadence_storage::{MemoryStore, Seed, SeedError, SnapshotError, SnapshotStore};
use fs2::FileExt;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::sender::DaemonSender;

/// Runtime with the daemon's concrete adapters
pub type DaemonRuntime =
    Runtime<DaemonSender, MemoryStore, MemoryStore, SystemClock, UuidIdGen, TokioScheduler>;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("failed to acquire lock {0}: daemon already running?")]
    LockFailed(PathBuf, #[source] std::io::Error),

    #[error("seed error: {0}")]
    Seed(#[from] SeedError),

    #[error("queue snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("sender error: {0}")]
    Sender(cadence_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A running daemon
pub struct Daemon {
    pub config: Config,
    // NOTE(lifetime): held to keep the exclusive lock; released on drop
    lock_file: Option<File>,
    pub runtime: DaemonRuntime,
    pub started_at: Instant,
}

impl Daemon {
    /// Stop the runtime, write the final queue snapshot and release the lock
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        info!("shutting down daemon");
        self.runtime.shutdown().await;

        let stats = self.runtime.queue().stats();
        info!(
            waiting = stats.waiting,
            delayed = stats.delayed,
            failed = stats.failed,
            completed = stats.completed,
            uptime_secs = self.started_at.elapsed().as_secs(),
            "daemon stopped"
        );

        if let Some(path) = self.config.lock_path() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove pid file");
            }
        }
        drop(self.lock_file);
        Ok(())
    }
}

/// Check the configuration and seed without starting anything
pub fn check(config: &Config) -> Result<(), LifecycleError> {
    config.runtime_config()?;
    if let Some(path) = &config.seed_path {
        Seed::load(path)?;
    }
    DaemonSender::from_config(&config.sender).map_err(LifecycleError::Sender)?;
    Ok(())
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<Daemon, LifecycleError> {
    // Lock FIRST so a second daemon fails before touching shared state
    let lock_file = match config.lock_path() {
        Some(path) => Some(acquire_lock(&path)?),
        None => None,
    };

    match startup_inner(config, lock_file) {
        Ok(daemon) => Ok(daemon),
        Err(e) => {
            if let Some(path) = config.lock_path() {
                let _ = std::fs::remove_file(path);
            }
            Err(e)
        }
    }
}

fn startup_inner(config: &Config, lock_file: Option<File>) -> Result<Daemon, LifecycleError> {
    let runtime_config = config.runtime_config()?;
    let store = load_store(config.seed_path.as_deref())?;

    let clock = SystemClock;
    let queue = match config.snapshot_dir() {
        Some(dir) => JobQueue::open(config.queue.clone(), clock, SnapshotStore::open(dir)?)?,
        None => {
            warn!("no state_dir configured, the job queue will not survive a restart");
            JobQueue::new(config.queue.clone(), clock)
        }
    };

    let sender = DaemonSender::from_config(&config.sender).map_err(LifecycleError::Sender)?;
    let sender_kind = sender.kind();

    let runtime = Runtime::new(
        RuntimeDeps {
            sender,
            enrollments: store.clone(),
            logs: store,
            queue,
        },
        clock,
        UuidIdGen,
        TokioScheduler,
        runtime_config,
    );
    runtime.start();

    info!(
        sender = sender_kind,
        workers = config.workers.concurrency,
        tick_interval_ms = config.scheduler.tick_interval.as_millis() as u64,
        "daemon started"
    );

    Ok(Daemon {
        config: config.clone(),
        lock_file,
        runtime,
        started_at: Instant::now(),
    })
}

/// Take the exclusive pid lock, then record our pid in it
fn acquire_lock(path: &Path) -> Result<File, LifecycleError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // no truncate: the file may belong to a running daemon
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(|e| LifecycleError::LockFailed(path.to_path_buf(), e))?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

fn load_store(seed_path: Option<&Path>) -> Result<MemoryStore, LifecycleError> {
    let Some(path) = seed_path else {
        warn!("no seed_path configured, starting with an empty store");
        return Ok(MemoryStore::new());
    };
    let seed = Seed::load(path)?;
    info!(
        path = %path.display(),
        subjects = seed.subjects.len(),
        programs = seed.programs.len(),
        steps = seed.steps.len(),
        enrollments = seed.enrollments.len(),
        "loaded seed"
    );
    Ok(MemoryStore::from_seed(seed))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
