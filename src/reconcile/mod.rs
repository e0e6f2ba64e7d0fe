//! Debounced background reconciliation of IaC projects.
//!
//! File events are classified one at a time by
//! [`ReconcileService::handle_file_event`]. A file that declares providers
//! which are not installed marks its directory for `init`; a file that
//! declares modules marks it for a module fetch. Every classified event bumps
//! a sequence number and arms a timer. When a timer fires it runs an
//! execution pass only if no newer event arrived in the meantime, so a burst
//! of saves collapses into one pass.
//!
//! ```text
//!   event ──► classify ──► mark pending ──► sleep(delay) ──► seq current? ──► execute
//!                                                                │ no
//!                                                                └──► no-op
//! ```
//!
//! Each project operation runs under its directory lock ([`DirectoryMutex`]),
//! so two passes never touch the same directory at the same time.

mod executor;
mod mutex;
mod pending;

pub use executor::BatchExecutor;
pub use mutex::{DirectoryGuard, DirectoryMutex};
pub use pending::{PendingWork, WorkPlan};

use crate::config::Config;
use crate::error::Result;
use crate::parser::{is_in_state_dir, ConfigFileParser, HclConfigParser};
use crate::project::{FsProjectInspector, ProjectInspector};
use crate::provider::IacProvider;
use crate::runner::{IacCli, ProcessIacCli};
use crate::types::{DeclaredProvider, DeclaredResources, PassReport, WorkKind};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

/// Capacity of the pass report channel.
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// What a file event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Project directory of the changed file
    pub dir: PathBuf,
    /// Sequence number the event was stamped with
    pub sequence: u64,
    /// Work marked for the project, if any
    pub work: Option<WorkKind>,
}

/// The reconciliation service.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct ReconcileService {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<Config>,
    provider: &'static dyn IacProvider,
    parser: Arc<dyn ConfigFileParser>,
    inspector: Arc<dyn ProjectInspector>,
    mutex: Arc<DirectoryMutex>,
    pending: Arc<Mutex<PendingWork>>,
    executor: BatchExecutor,
    sequence: AtomicU64,
    reports: broadcast::Sender<PassReport>,
}

impl std::fmt::Debug for ReconcileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileService")
            .field("tool", &self.inner.provider.name())
            .field("sequence", &self.sequence())
            .finish_non_exhaustive()
    }
}

impl ReconcileService {
    /// Create a service from its collaborators.
    pub fn new(
        config: Arc<Config>,
        parser: Arc<dyn ConfigFileParser>,
        inspector: Arc<dyn ProjectInspector>,
        cli: Arc<dyn IacCli>,
    ) -> Self {
        let mutex = Arc::new(DirectoryMutex::new());
        let pending = Arc::new(Mutex::new(PendingWork::new()));
        let executor = BatchExecutor::new(
            cli,
            Arc::clone(&mutex),
            Arc::clone(&pending),
            config.iac.init_args.clone(),
        );
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                provider: config.iac.tool.provider(),
                config,
                parser,
                inspector,
                mutex,
                pending,
                executor,
                sequence: AtomicU64::new(0),
                reports,
            }),
        }
    }

    /// Create a service using the HCL parser, the filesystem inspector and the
    /// configured binary.
    pub fn from_config(config: Arc<Config>) -> Self {
        let cli = Arc::new(ProcessIacCli::new(config.binary()));
        Self::new(
            config,
            Arc::new(HclConfigParser::new()),
            Arc::new(FsProjectInspector::new()),
            cli,
        )
    }

    /// Current value of the sequence counter.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.inner.sequence.load(Ordering::SeqCst)
    }

    /// The per-directory locks used by execution passes.
    #[must_use]
    pub fn mutex(&self) -> &DirectoryMutex {
        &self.inner.mutex
    }

    /// Receive the report of every pass armed from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PassReport> {
        self.inner.reports.subscribe()
    }

    /// Snapshot of the pending work.
    pub async fn pending_plan(&self) -> WorkPlan {
        self.inner.pending.lock().await.plan()
    }

    /// Classify one changed configuration file and schedule a pass.
    ///
    /// Events must be delivered one after the other. Returns `None` if the
    /// event was dropped: the path is inside a state directory, both automatic
    /// operations are disabled, the project is filtered out, or the file
    /// declares nothing actionable.
    pub async fn handle_file_event(&self, path: &Path) -> Option<Classification> {
        let inner = &self.inner;
        let options = &inner.config.reconcile;

        if is_in_state_dir(path) {
            tracing::trace!(path = %path.display(), "Ignoring change inside state directory");
            return None;
        }
        if !options.any_enabled() {
            return None;
        }

        let dir = path.parent()?.to_path_buf();

        if options.only_initialized_projects && !inner.inspector.is_initialized(&dir).await {
            tracing::trace!(dir = %dir.display(), "Ignoring change in uninitialized project");
            return None;
        }

        let Some(resources) = inner.parser.parse(path).await.filter(|r| !r.is_empty()) else {
            tracing::debug!(path = %path.display(), "No modules or providers declared");
            return None;
        };

        let work = match self.required_work(&dir, &resources).await {
            Ok(work) => work,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Could not inspect project, dropping event");
                return None;
            }
        };

        let sequence = inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(kind) = work {
            inner.pending.lock().await.mark(&dir, kind, sequence);
            tracing::debug!(dir = %dir.display(), sequence, work = %kind, "Project marked");
        }

        // A newer stamp turns every armed timer stale, so a timer is armed
        // even without new work to keep earlier marks from being stranded.
        self.schedule(sequence);

        Some(Classification {
            dir,
            sequence,
            work,
        })
    }

    async fn required_work(&self, dir: &Path, resources: &DeclaredResources) -> Result<Option<WorkKind>> {
        let options = &self.inner.config.reconcile;

        if options.enable_auto_provider_init && !resources.providers.is_empty() {
            let satisfied = providers_satisfied(
                self.inner.inspector.as_ref(),
                self.inner.provider.registry_domain(),
                dir,
                &resources.providers,
            )
            .await?;
            if !satisfied {
                return Ok(Some(WorkKind::Init));
            }
        }

        if options.enable_auto_module_fetch && !resources.modules.is_empty() {
            return Ok(Some(WorkKind::ModuleFetch));
        }

        Ok(None)
    }

    fn schedule(&self, sequence: u64) {
        let service = self.clone();
        let delay = Duration::from_millis(self.inner.config.reconcile.processing_delay_ms);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let report = service.execute_pass(sequence).await;
            if service.inner.reports.send(report).is_err() {
                tracing::trace!(sequence, "No pass report subscribers");
            }
        });
    }

    /// Run the pass armed with `sequence`.
    ///
    /// A pass whose sequence is no longer current does nothing and leaves the
    /// pending work to the newer pass.
    pub async fn execute_pass(&self, sequence: u64) -> PassReport {
        let current = self.sequence();
        if current != sequence {
            tracing::trace!(sequence, current, "Skipping stale pass");
            return PassReport::stale(sequence);
        }

        let plan = self.inner.pending.lock().await.plan();
        if plan.is_empty() {
            tracing::trace!(sequence, "Nothing pending");
            return PassReport {
                sequence,
                ..PassReport::default()
            };
        }

        tracing::info!(
            sequence,
            init = plan.init.len(),
            fetch = plan.fetch.len(),
            "Starting reconciliation pass"
        );

        let report = self.inner.executor.execute(plan, sequence).await;

        tracing::info!(
            sequence,
            projects = report.init.len() + report.fetch.len(),
            failures = report.failure_count(),
            "Reconciliation pass finished"
        );

        report
    }
}

/// Check whether every declared provider is installed, satisfies its
/// constraint and is present in the provider cache.
///
/// # Errors
///
/// Returns an error if the installed providers cannot be read.
pub async fn providers_satisfied(
    inspector: &dyn ProjectInspector,
    registry_domain: &str,
    dir: &Path,
    declared: &[DeclaredProvider],
) -> Result<bool> {
    let installed = inspector.installed_providers(dir).await?;
    if installed.is_empty() {
        return Ok(declared.is_empty());
    }

    for provider in declared {
        let key = provider.full_source(registry_domain);

        let Some(locked) = installed.iter().find(|l| l.key.eq_ignore_ascii_case(&key)) else {
            tracing::debug!(dir = %dir.display(), provider = %key, "Provider not installed");
            return Ok(false);
        };
        let Some(version) = locked.version.as_deref() else {
            tracing::debug!(dir = %dir.display(), provider = %key, "Provider has no locked version");
            return Ok(false);
        };
        if !locked.satisfies(provider.version.as_deref()) {
            tracing::debug!(
                dir = %dir.display(),
                provider = %key,
                locked = %version,
                constraint = provider.version.as_deref().unwrap_or_default(),
                "Locked provider does not satisfy constraint"
            );
            return Ok(false);
        }
        if !inspector
            .provider_cache_entry_exists(dir, &locked.key, version)
            .await
        {
            tracing::debug!(dir = %dir.display(), provider = %key, version, "Provider missing from cache");
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::MockConfigFileParser;
    use crate::project::MockProjectInspector;
    use crate::runner::MockIacCli;
    use crate::types::{DeclaredModule, LockedProvider};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn aws(constraint: Option<&str>) -> DeclaredProvider {
        DeclaredProvider {
            key: "aws".to_string(),
            source: Some("hashicorp/aws".to_string()),
            version: constraint.map(String::from),
        }
    }

    fn locked_aws(version: Option<&str>) -> LockedProvider {
        LockedProvider {
            key: "registry.terraform.io/hashicorp/aws".to_string(),
            version: version.map(String::from),
            version_constraints: Vec::new(),
        }
    }

    fn inspector(installed: Vec<LockedProvider>, cached: bool) -> MockProjectInspector {
        let mut inspector = MockProjectInspector::new();
        inspector
            .expect_installed_providers()
            .returning(move |_| Ok(installed.clone()));
        inspector
            .expect_provider_cache_entry_exists()
            .returning(move |_, _, _| cached);
        inspector.expect_is_initialized().returning(|_| true);
        inspector
    }

    #[test_case(vec![], true, Some(">= 5.0"), false ; "nothing installed")]
    #[test_case(vec![locked_aws(Some("5.31.0"))], true, Some(">= 5.0"), true ; "satisfied")]
    #[test_case(vec![locked_aws(Some("5.31.0"))], true, None, true ; "no constraint")]
    #[test_case(vec![locked_aws(Some("4.67.0"))], true, Some("~> 5.0"), false ; "constraint not met")]
    #[test_case(vec![locked_aws(None)], true, None, false ; "no locked version")]
    #[test_case(vec![locked_aws(Some("5.31.0"))], false, Some(">= 5.0"), false ; "cache entry missing")]
    #[test_case(vec![locked_aws(Some("5.31.0"))], true, Some("totally bogus"), false ; "unparseable constraint")]
    #[tokio::test]
    async fn test_providers_satisfied(
        installed: Vec<LockedProvider>,
        cached: bool,
        constraint: Option<&str>,
        expected: bool,
    ) {
        let inspector = inspector(installed, cached);
        let satisfied = providers_satisfied(
            &inspector,
            "registry.terraform.io",
            Path::new("/work"),
            &[aws(constraint)],
        )
        .await
        .unwrap();
        assert_eq!(satisfied, expected);
    }

    #[tokio::test]
    async fn test_provider_from_other_registry_is_missing() {
        let inspector = inspector(vec![locked_aws(Some("5.31.0"))], true);
        let satisfied = providers_satisfied(
            &inspector,
            "registry.opentofu.org",
            Path::new("/work"),
            &[aws(None)],
        )
        .await
        .unwrap();
        assert!(!satisfied);
    }

    fn resources(providers: Vec<DeclaredProvider>, modules: usize) -> DeclaredResources {
        DeclaredResources {
            modules: (0..modules)
                .map(|i| DeclaredModule {
                    key: format!("m{i}"),
                    source: "./modules/x".to_string(),
                    version: None,
                })
                .collect(),
            providers,
            required_versions: Vec::new(),
        }
    }

    fn service(
        config: Config,
        parsed: Option<DeclaredResources>,
        inspector: MockProjectInspector,
    ) -> ReconcileService {
        let mut parser = MockConfigFileParser::new();
        parser.expect_parse().returning(move |_| parsed.clone());
        ReconcileService::new(
            Arc::new(config),
            Arc::new(parser),
            Arc::new(inspector),
            Arc::new(MockIacCli::new()),
        )
    }

    fn delay_config() -> Config {
        let mut config = Config::default();
        config.reconcile.processing_delay_ms = 60_000;
        config
    }

    #[tokio::test]
    async fn test_state_dir_events_are_ignored() {
        let service = service(
            delay_config(),
            Some(resources(vec![aws(None)], 0)),
            inspector(vec![], false),
        );

        let result = service
            .handle_file_event(Path::new("/work/.terraform/modules/vpc/main.tf"))
            .await;
        assert_eq!(result, None);
        assert_eq!(service.sequence(), 0);
    }

    #[tokio::test]
    async fn test_disabled_features_short_circuit() {
        let mut config = delay_config();
        config.reconcile.enable_auto_module_fetch = false;
        config.reconcile.enable_auto_provider_init = false;
        let service = service(config, Some(resources(vec![aws(None)], 1)), inspector(vec![], false));

        assert_eq!(service.handle_file_event(Path::new("/work/main.tf")).await, None);
        assert_eq!(service.sequence(), 0);
    }

    #[test_case(None ; "parse failure")]
    #[test_case(Some(resources(vec![], 0)) ; "nothing declared")]
    #[tokio::test]
    async fn test_unactionable_file_changes_nothing(parsed: Option<DeclaredResources>) {
        let service = service(delay_config(), parsed, inspector(vec![], false));

        assert_eq!(service.handle_file_event(Path::new("/work/main.tf")).await, None);
        assert_eq!(service.sequence(), 0);
        assert!(service.pending_plan().await.is_empty());
    }

    #[tokio::test]
    async fn test_uninitialized_project_is_filtered() {
        let mut config = delay_config();
        config.reconcile.only_initialized_projects = true;
        let mut inspector = MockProjectInspector::new();
        inspector.expect_is_initialized().returning(|_| false);
        let service = service(config, Some(resources(vec![aws(None)], 0)), inspector);

        assert_eq!(service.handle_file_event(Path::new("/work/main.tf")).await, None);
    }

    #[tokio::test]
    async fn test_inspection_failure_drops_event() {
        let mut inspector = MockProjectInspector::new();
        inspector.expect_installed_providers().returning(|dir| {
            Err(crate::err!(LockFileParse {
                file: dir.join(".terraform.lock.hcl"),
                message: "broken".to_string(),
            }))
        });
        let service = service(delay_config(), Some(resources(vec![aws(None)], 1)), inspector);

        assert_eq!(service.handle_file_event(Path::new("/work/main.tf")).await, None);
        assert!(service.pending_plan().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_provider_marks_init_only() {
        let service = service(
            delay_config(),
            Some(resources(vec![aws(Some(">= 5.0"))], 2)),
            inspector(vec![], false),
        );

        let result = service
            .handle_file_event(Path::new("/work/main.tf"))
            .await
            .unwrap();
        assert_eq!(
            result,
            Classification {
                dir: PathBuf::from("/work"),
                sequence: 1,
                work: Some(WorkKind::Init),
            }
        );

        let plan = service.pending_plan().await;
        assert_eq!(plan.init.len(), 1);
        assert!(plan.fetch.is_empty());
    }

    #[tokio::test]
    async fn test_satisfied_providers_fall_through_to_fetch() {
        let service = service(
            delay_config(),
            Some(resources(vec![aws(Some(">= 5.0"))], 1)),
            inspector(vec![locked_aws(Some("5.31.0"))], true),
        );

        let result = service
            .handle_file_event(Path::new("/work/main.tf"))
            .await
            .unwrap();
        assert_eq!(result.work, Some(WorkKind::ModuleFetch));
    }

    #[tokio::test]
    async fn test_classification_is_idempotent() {
        let service = service(
            delay_config(),
            Some(resources(vec![aws(Some(">= 5.0"))], 1)),
            inspector(vec![locked_aws(Some("4.0.0"))], true),
        );

        let first = service.handle_file_event(Path::new("/work/main.tf")).await.unwrap();
        let second = service.handle_file_event(Path::new("/work/main.tf")).await.unwrap();

        assert_eq!(first.work, second.work);
        assert_eq!(first.dir, second.dir);
        assert_eq!(second.sequence, first.sequence + 1);
        assert_eq!(service.pending_plan().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_pass_is_a_no_op() {
        let service = service(
            delay_config(),
            Some(resources(vec![aws(None)], 0)),
            inspector(vec![], false),
        );

        service.handle_file_event(Path::new("/work/main.tf")).await;
        service.handle_file_event(Path::new("/work/main.tf")).await;

        let report = service.execute_pass(1).await;
        assert!(report.skipped_stale);
        assert!(report.is_empty());
        assert_eq!(service.pending_plan().await.len(), 1);
    }
}
