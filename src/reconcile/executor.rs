//! Execution of a work plan against the IaC binary.

use super::mutex::{DirectoryGuard, DirectoryMutex};
use super::pending::{PendingWork, WorkPlan};
use crate::runner::IacCli;
use crate::types::{CommandOutput, PassReport, ProjectOutcome, WorkKind};

use futures::future::join_all;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Runs the init and module-fetch work of a pass.
///
/// Init projects whose directory is free go to one consolidated `init` call.
/// A directory still busy with an earlier pass gets its own `init` once it is
/// released, so a free project never waits on a busy one. Every fetch project
/// gets its own call. Each unit runs as its own task, so a failing (or
/// panicking) unit never stops its siblings.
#[derive(Clone)]
pub struct BatchExecutor {
    cli: Arc<dyn IacCli>,
    mutex: Arc<DirectoryMutex>,
    pending: Arc<Mutex<PendingWork>>,
    init_args: String,
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("init_args", &self.init_args)
            .finish_non_exhaustive()
    }
}

impl BatchExecutor {
    /// Create an executor sharing the service's mutex and pending sets.
    pub fn new(
        cli: Arc<dyn IacCli>,
        mutex: Arc<DirectoryMutex>,
        pending: Arc<Mutex<PendingWork>>,
        init_args: impl Into<String>,
    ) -> Self {
        Self {
            cli,
            mutex,
            pending,
            init_args: init_args.into(),
        }
    }

    /// Execute `plan` on behalf of the pass armed with `sequence`.
    pub async fn execute(&self, plan: WorkPlan, sequence: u64) -> PassReport {
        let mut report = PassReport {
            sequence,
            started_at: Some(chrono::Utc::now()),
            ..PassReport::default()
        };

        let (ready, busy) = self.claim(plan.init);
        let mut init_tasks: Vec<(Vec<PathBuf>, JoinHandle<Vec<ProjectOutcome>>)> = Vec::new();
        if !ready.is_empty() {
            let dirs = ready.iter().map(|g| g.dir().to_path_buf()).collect();
            let this = self.clone();
            init_tasks.push((dirs, tokio::spawn(async move { this.run_init(ready, sequence).await })));
        }
        for dir in busy {
            tracing::debug!(dir = %dir.display(), "Directory busy, init queued behind it");
            let this = self.clone();
            let task_dir = dir.clone();
            init_tasks.push((
                vec![dir],
                tokio::spawn(async move {
                    let guard = this.mutex.lock(&task_dir).await;
                    this.run_init(vec![guard], sequence).await
                }),
            ));
        }

        let fetch_tasks: Vec<_> = plan
            .fetch
            .into_iter()
            .map(|dir| {
                let this = self.clone();
                let task_dir = dir.clone();
                (dir, tokio::spawn(async move { this.run_fetch(task_dir, sequence).await }))
            })
            .collect();

        let (fetch_dirs, fetch_handles): (Vec<_>, Vec<_>) = fetch_tasks.into_iter().unzip();
        let fetch_results = join_all(fetch_handles).await;

        for (dir, result) in fetch_dirs.into_iter().zip(fetch_results) {
            match result {
                Ok(Some(outcome)) => report.fetch.push(outcome),
                Ok(None) => {}
                Err(e) => {
                    self.settle(&[dir.clone()], WorkKind::ModuleFetch, sequence)
                        .await;
                    report.fetch.push(ProjectOutcome {
                        dir,
                        kind: WorkKind::ModuleFetch,
                        output: CommandOutput::failed(format!("module fetch task failed: {e}")),
                    });
                }
            }
        }

        let (init_dirs, init_handles): (Vec<_>, Vec<_>) = init_tasks.into_iter().unzip();
        let init_results = join_all(init_handles).await;

        for (dirs, result) in init_dirs.into_iter().zip(init_results) {
            match result {
                Ok(outcomes) => report.init.extend(outcomes),
                Err(e) => {
                    self.settle(&dirs, WorkKind::Init, sequence).await;
                    report.init.extend(dirs.into_iter().map(|dir| ProjectOutcome {
                        dir,
                        kind: WorkKind::Init,
                        output: CommandOutput::failed(format!("init task failed: {e}")),
                    }));
                }
            }
        }

        for outcome in report.init.iter().chain(&report.fetch) {
            if outcome.succeeded() {
                tracing::info!(
                    dir = %outcome.dir.display(),
                    operation = %outcome.kind,
                    "Project reconciled"
                );
            } else {
                tracing::error!(
                    dir = %outcome.dir.display(),
                    operation = %outcome.kind,
                    stderr = %outcome.output.stderr.trim(),
                    "Reconciliation failed"
                );
            }
        }

        report
    }

    /// Lock every free directory now; the rest are returned as busy.
    fn claim(&self, dirs: BTreeSet<PathBuf>) -> (Vec<DirectoryGuard>, Vec<PathBuf>) {
        let mut ready = Vec::new();
        let mut busy = Vec::new();
        for dir in dirs {
            match self.mutex.try_lock(&dir) {
                Some(guard) => ready.push(guard),
                None => busy.push(dir),
            }
        }
        (ready, busy)
    }

    async fn run_init(&self, guards: Vec<DirectoryGuard>, sequence: u64) -> Vec<ProjectOutcome> {
        let guards: Vec<DirectoryGuard> = {
            let pending = self.pending.lock().await;
            guards
                .into_iter()
                .filter(|g| pending.contains(g.dir(), WorkKind::Init))
                .collect()
        };
        if guards.is_empty() {
            tracing::debug!(sequence, "Init work already settled by an earlier pass");
            return Vec::new();
        }

        let targets: Vec<PathBuf> = guards.iter().map(|g| g.dir().to_path_buf()).collect();
        tracing::info!(sequence, projects = targets.len(), "Running init");

        let mut outputs = self.cli.init(&targets, &self.init_args).await;
        let outcomes = targets
            .iter()
            .map(|dir| {
                let output = outputs
                    .iter()
                    .position(|(d, _)| d == dir)
                    .map(|i| outputs.swap_remove(i).1)
                    .unwrap_or_else(|| CommandOutput::failed("init reported no result"));
                ProjectOutcome {
                    dir: dir.clone(),
                    kind: WorkKind::Init,
                    output,
                }
            })
            .collect();

        self.settle(&targets, WorkKind::Init, sequence).await;
        drop(guards);

        outcomes
    }

    async fn run_fetch(&self, dir: PathBuf, sequence: u64) -> Option<ProjectOutcome> {
        let guard = self.mutex.lock(&dir).await;

        {
            let pending = self.pending.lock().await;
            if pending.contains(&dir, WorkKind::Init) {
                tracing::debug!(dir = %dir.display(), "Module fetch superseded by pending init");
                return None;
            }
            if !pending.contains(&dir, WorkKind::ModuleFetch) {
                tracing::debug!(dir = %dir.display(), "Module fetch already settled by an earlier pass");
                return None;
            }
        }

        tracing::info!(sequence, dir = %dir.display(), "Fetching modules");
        let output = self.cli.fetch_modules(&dir).await;

        self.settle(std::slice::from_ref(&dir), WorkKind::ModuleFetch, sequence)
            .await;
        guard.release();

        Some(ProjectOutcome {
            dir,
            kind: WorkKind::ModuleFetch,
            output,
        })
    }

    async fn settle(&self, dirs: &[PathBuf], kind: WorkKind, sequence: u64) {
        let mut pending = self.pending.lock().await;
        for dir in dirs {
            pending.settle(dir, kind, sequence);
        }
    }
}
