//! Concurrent per-package changelog pipeline.
//!
//! One task per package walks a small state machine:
//!
//! ```text
//! Pending ──► Fetching ──► Cached ──► Summarizing ──► Done
//!    │            │  └──────────────────►┘              ▲
//!    │            ├──► Done (NotFound) ──────────────────┘
//!    │            └──► Errored
//!    └──► Skipped | Errored
//! ```
//!
//! Tasks run concurrently up to a limit, fail independently, and report
//! progress through a channel (see [`progress`]). External work goes through
//! the collaborator traits defined here so the pipeline never sees HTTP.

pub mod progress;
mod task;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::artifact::ArtifactCache;
use crate::sources::{ChangelogSources, SourceDescriptor, normalize_package_name};

pub use progress::{ProgressEvent, ProgressReceiver, ProgressSender, log_progress, progress_channel};
use progress::ProgressSink;

/// Lifecycle of one package task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Fetching,
    Cached,
    Summarizing,
    Done,
    Skipped,
    Errored,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Skipped | TaskState::Errored)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Fetching | Skipped | Errored)
                | (Fetching, Cached | Summarizing | Done | Errored)
                | (Cached, Summarizing)
                | (Summarizing, Done | Errored)
        )
    }

    /// Progress percentage reported with this state.
    pub fn percent(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Fetching => 25,
            TaskState::Cached => 50,
            TaskState::Summarizing => 75,
            TaskState::Done | TaskState::Skipped | TaskState::Errored => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetrievalStatus {
    Success,
    Failure,
    NotFound,
}

/// Outcome of fetching (and possibly summarizing) one changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub status: RetrievalStatus,
    /// Changelog text on success, otherwise a short reason.
    pub text: String,
    pub summary: Option<String>,
}

impl RetrievalResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self { status: RetrievalStatus::Success, text: text.into(), summary: None }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self { status: RetrievalStatus::Failure, text: reason.into(), summary: None }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self { status: RetrievalStatus::NotFound, text: reason.into(), summary: None }
    }
}

/// A package to check, as read from a requirements file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub current_version: String,
    #[serde(default)]
    pub ignored: bool,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, current_version: impl Into<String>) -> Self {
        Self { name: name.into(), current_version: current_version.into(), ignored: false }
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

/// Latest published version of a package.
#[async_trait]
pub trait VersionLookup: Send + Sync {
    /// `Ok(None)` when the index does not know the package.
    async fn latest_version(&self, package: &str) -> Result<Option<String>, CollaboratorError>;
}

/// Parameters for one changelog retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogRequest {
    pub package: String,
    pub from_version: String,
    pub to_version: String,
    pub source: SourceDescriptor,
}

/// Fetches changelog text restricted to `(from_version, to_version]`.
#[async_trait]
pub trait ChangelogRetriever: Send + Sync {
    /// [`CollaboratorError::NotFound`] when the source has nothing for the range.
    async fn retrieve(&self, request: &ChangelogRequest) -> Result<String, CollaboratorError>;
}

/// Parameters for one summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub package: String,
    pub from_version: String,
    pub to_version: String,
    pub changelog: String,
    pub snippets: Vec<String>,
}

/// Turns a changelog plus usage context into a short summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, CollaboratorError>;
}

/// Code context for a package, handed to the summarizer.
#[async_trait]
pub trait SnippetSource: Send + Sync {
    async fn snippets(&self, package: &str) -> Result<Vec<String>, CollaboratorError>;
}

/// Final state of one package task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub task_id: usize,
    pub package: String,
    pub current_version: String,
    pub latest_version: Option<String>,
    pub state: TaskState,
    /// Absent for tasks that never reached retrieval.
    pub result: Option<RetrievalResult>,
    pub message: String,
}

impl TaskOutcome {
    /// Whether a newer release was found, regardless of retrieval outcome.
    pub fn has_update(&self) -> bool {
        self.latest_version.is_some() && self.result.is_some()
    }
}

/// Everything a run produced, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<TaskOutcome>,
    /// Tasks that reached a terminal state.
    pub completed: usize,
}

impl RunReport {
    pub fn count(&self, state: TaskState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn updates(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.has_update())
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.outcomes.len() && self.outcomes.iter().all(|o| o.state.is_terminal())
    }
}

/// The collaborators a pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    pub versions: Arc<dyn VersionLookup>,
    pub retriever: Arc<dyn ChangelogRetriever>,
    pub summarizer: Arc<dyn Summarizer>,
    pub snippets: Option<Arc<dyn SnippetSource>>,
}

#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) collaborators: Collaborators,
    pub(crate) sources: Arc<ChangelogSources>,
    pub(crate) cache: Option<ArtifactCache>,
    pub(crate) call_timeout: Duration,
}

/// Bounded-concurrency runner over a list of packages.
#[derive(Clone)]
pub struct Pipeline {
    shared: Shared,
    max_concurrency: usize,
}

impl Pipeline {
    pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(20);

    /// `sources` is the package registry for this pipeline; nothing is looked up globally.
    pub fn new(collaborators: Collaborators, sources: ChangelogSources) -> Self {
        Self {
            shared: Shared {
                collaborators,
                sources: Arc::new(sources),
                cache: None,
                call_timeout: Self::DEFAULT_CALL_TIMEOUT,
            },
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Consult and populate `cache` before calling the retriever.
    pub fn with_cache(mut self, cache: ArtifactCache) -> Self {
        self.shared.cache = Some(cache);
        self
    }

    /// Upper bound for every collaborator call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.shared.call_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Run one task per package and wait for all of them.
    ///
    /// Packages are deduplicated by normalized name so each one is owned by a
    /// single task. Never fails: every problem is recorded on its task.
    pub async fn run(&self, packages: Vec<PackageSpec>, events: Option<ProgressSender>) -> RunReport {
        let packages = dedupe(packages);
        let total = packages.len();
        let sink = ProgressSink::new(events, total);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let shared = Arc::new(self.shared.clone());

        let mut join_set = JoinSet::new();
        for (task_id, spec) in packages.iter().cloned().enumerate() {
            let shared = shared.clone();
            let sink = sink.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                // Hold the permit for the whole task.
                let _permit = semaphore.acquire_owned().await.ok();
                task::run_task(&shared, &sink, task_id, spec).await
            });
        }

        let mut slots: Vec<Option<TaskOutcome>> = vec![None; total];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    let slot = outcome.task_id;
                    slots[slot] = Some(outcome);
                }
                Err(e) => tracing::error!(error = %e, "pipeline task aborted"),
            }
        }

        let outcomes = slots
            .into_iter()
            .zip(packages)
            .enumerate()
            .map(|(task_id, (slot, spec))| {
                slot.unwrap_or_else(|| {
                    sink.emit(task_id, &spec.name, TaskState::Errored, "Task aborted".to_string());
                    TaskOutcome {
                        task_id,
                        package: spec.name,
                        current_version: spec.current_version,
                        latest_version: None,
                        state: TaskState::Errored,
                        result: Some(RetrievalResult::failure("task aborted")),
                        message: "Task aborted".to_string(),
                    }
                })
            })
            .collect();

        let report = RunReport { outcomes, completed: sink.completed() };
        tracing::info!(
            total,
            done = report.count(TaskState::Done),
            skipped = report.count(TaskState::Skipped),
            errored = report.count(TaskState::Errored),
            "pipeline run finished"
        );
        report
    }
}

fn dedupe(packages: Vec<PackageSpec>) -> Vec<PackageSpec> {
    let mut seen = std::collections::HashSet::new();
    packages
        .into_iter()
        .filter(|spec| {
            let fresh = seen.insert(normalize_package_name(&spec.name));
            if !fresh {
                tracing::warn!(package = %spec.name, "package listed twice; keeping first entry");
            }
            fresh
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct ScriptedVersions(HashMap<&'static str, Result<Option<String>, CollaboratorError>>);

    #[async_trait]
    impl VersionLookup for ScriptedVersions {
        async fn latest_version(&self, package: &str) -> Result<Option<String>, CollaboratorError> {
            self.0.get(package).cloned().unwrap_or(Ok(None))
        }
    }

    #[derive(Default)]
    struct ScriptedRetriever {
        failing: Vec<&'static str>,
        missing: Vec<&'static str>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChangelogRetriever for ScriptedRetriever {
        async fn retrieve(&self, request: &ChangelogRequest) -> Result<String, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let package = request.package.as_str();
            if self.failing.iter().any(|p| *p == package) {
                return Err(CollaboratorError::Network("connection reset".into()));
            }
            if self.missing.iter().any(|p| *p == package) {
                return Err(CollaboratorError::NotFound("no entries in range".into()));
            }
            Ok(format!("## {}\n- changes for {package}", request.to_version))
        }
    }

    struct EchoSummarizer;

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        async fn summarize(&self, request: &SummaryRequest) -> Result<String, CollaboratorError> {
            Ok(format!("{} {}->{} ({} snippets)", request.package, request.from_version, request.to_version, request.snippets.len()))
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _request: &SummaryRequest) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::Other("quota exceeded".into()))
        }
    }

    struct FixedSnippets;

    #[async_trait]
    impl SnippetSource for FixedSnippets {
        async fn snippets(&self, package: &str) -> Result<Vec<String>, CollaboratorError> {
            Ok(vec![format!("File: app.py\nImport {package}\nimport {package}\n")])
        }
    }

    fn versions(pairs: &[(&'static str, &str)]) -> Arc<ScriptedVersions> {
        Arc::new(ScriptedVersions(pairs.iter().map(|(p, v)| (*p, Ok(Some(v.to_string())))).collect()))
    }

    fn sources(packages: &[&str]) -> ChangelogSources {
        let mut sources = ChangelogSources::new();
        for package in packages {
            sources.insert(package, SourceDescriptor::http(&format!("https://example.invalid/{package}")));
        }
        sources
    }

    fn pipeline(
        versions: Arc<dyn VersionLookup>, retriever: Arc<ScriptedRetriever>, summarizer: Arc<dyn Summarizer>,
        known: &[&str],
    ) -> Pipeline {
        let collaborators = Collaborators { versions, retriever, summarizer, snippets: None };
        Pipeline::new(collaborators, sources(known))
    }

    #[test]
    fn test_transition_table() {
        use TaskState::*;
        assert!(Pending.can_transition_to(Fetching));
        assert!(Pending.can_transition_to(Skipped));
        assert!(Fetching.can_transition_to(Cached));
        assert!(Cached.can_transition_to(Summarizing));
        assert!(Summarizing.can_transition_to(Done));
        assert!(!Pending.can_transition_to(Done));
        assert!(!Cached.can_transition_to(Fetching));
        for terminal in [Done, Skipped, Errored] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Pending));
        }
    }

    #[test]
    fn test_retrieval_status_wire_names() {
        assert_eq!(serde_json::to_string(&RetrievalStatus::NotFound).unwrap(), "\"NOT_FOUND\"");
        assert_eq!(serde_json::to_string(&RetrievalStatus::Success).unwrap(), "\"SUCCESS\"");
    }

    #[tokio::test]
    async fn test_one_failing_task_does_not_affect_siblings() {
        let retriever = Arc::new(ScriptedRetriever { failing: vec!["two"], ..Default::default() });
        let pipeline = pipeline(
            versions(&[("one", "2.0"), ("two", "2.0"), ("three", "2.0")]),
            retriever,
            Arc::new(EchoSummarizer),
            &["one", "two", "three"],
        );
        let packages = vec![PackageSpec::new("one", "1.0"), PackageSpec::new("two", "1.0"), PackageSpec::new("three", "1.0")];

        let (tx, rx) = progress_channel();
        let observer = tokio::spawn(log_progress(rx));
        let report = pipeline.run(packages, Some(tx)).await;

        let states: Vec<_> = report.outcomes.iter().map(|o| o.state).collect();
        assert_eq!(states, vec![TaskState::Done, TaskState::Errored, TaskState::Done]);
        assert_eq!(report.completed, 3);
        assert!(report.is_complete());

        let failed = report.outcomes[1].result.as_ref().unwrap();
        assert_eq!(failed.status, RetrievalStatus::Failure);
        assert_eq!(report.outcomes[0].result.as_ref().unwrap().summary.as_deref(), Some("one 1.0->2.0 (0 snippets)"));

        assert_eq!(observer.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_skips_ignored_and_up_to_date() {
        let retriever = Arc::new(ScriptedRetriever::default());
        let pipeline = pipeline(
            versions(&[("pinned", "3.0"), ("current", "1.2.0"), ("older", "1.0")]),
            retriever.clone(),
            Arc::new(EchoSummarizer),
            &["pinned", "current", "older"],
        );
        let packages = vec![
            PackageSpec::new("pinned", "1.0").ignored(),
            PackageSpec::new("current", "1.2"),
            PackageSpec::new("older", "1.1"),
            PackageSpec::new("unknown", "0.1"),
        ];

        let report = pipeline.run(packages, None).await;

        assert!(report.outcomes.iter().all(|o| o.state == TaskState::Skipped));
        assert_eq!(report.updates().count(), 0);
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.completed, 4);
    }

    #[tokio::test]
    async fn test_version_lookup_failure_is_errored() {
        let versions = Arc::new(ScriptedVersions(HashMap::from([(
            "flaky",
            Err(CollaboratorError::Network("dns".into())),
        )])));
        let pipeline = pipeline(versions, Arc::new(ScriptedRetriever::default()), Arc::new(EchoSummarizer), &["flaky"]);

        let report = pipeline.run(vec![PackageSpec::new("flaky", "1.0")], None).await;

        assert_eq!(report.outcomes[0].state, TaskState::Errored);
        assert_eq!(report.outcomes[0].result.as_ref().unwrap().status, RetrievalStatus::Failure);
    }

    #[tokio::test]
    async fn test_not_found_skips_summary() {
        let retriever = Arc::new(ScriptedRetriever { missing: vec!["quiet"], ..Default::default() });
        let pipeline = pipeline(
            versions(&[("quiet", "2.0"), ("unlisted", "2.0")]),
            retriever,
            Arc::new(FailingSummarizer),
            &["quiet"],
        );

        let report = pipeline.run(vec![PackageSpec::new("quiet", "1.0"), PackageSpec::new("unlisted", "1.0")], None).await;

        for outcome in &report.outcomes {
            assert_eq!(outcome.state, TaskState::Done);
            let result = outcome.result.as_ref().unwrap();
            assert_eq!(result.status, RetrievalStatus::NotFound);
            assert!(result.summary.is_none());
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_retriever_and_miss_populates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        cache.set(&crate::artifact::CacheKey::new("warm", "1.0", "2.0"), "## 2.0\n- cached").await.unwrap();

        let retriever = Arc::new(ScriptedRetriever::default());
        let pipeline = pipeline(
            versions(&[("warm", "2.0"), ("cold", "2.0")]),
            retriever.clone(),
            Arc::new(EchoSummarizer),
            &["warm", "cold"],
        )
        .with_cache(cache.clone());

        let (tx, mut rx) = progress_channel();
        let report = pipeline.run(vec![PackageSpec::new("warm", "1.0"), PackageSpec::new("cold", "1.0")], Some(tx)).await;

        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.outcomes[0].result.as_ref().unwrap().text, "## 2.0\n- cached");
        assert!(report.outcomes[0].result.as_ref().unwrap().summary.is_some());
        assert!(cache.contains(&crate::artifact::CacheKey::new("cold", "1.0", "2.0")).await);

        let mut warm_states = Vec::new();
        while let Some(event) = rx.recv().await {
            if event.package == "warm" {
                warm_states.push(event.state);
            }
        }
        assert_eq!(
            warm_states,
            vec![TaskState::Pending, TaskState::Fetching, TaskState::Cached, TaskState::Summarizing, TaskState::Done]
        );

        // Second run: both keys cached, no further fetches.
        let again = pipeline.run(vec![PackageSpec::new("warm", "1.0"), PackageSpec::new("cold", "1.0")], None).await;
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
        assert_eq!(again.count(TaskState::Done), 2);
    }

    #[tokio::test]
    async fn test_duplicate_packages_fetch_once() {
        let retriever = Arc::new(ScriptedRetriever::default());
        let pipeline = pipeline(versions(&[("faker", "20.0")]), retriever.clone(), Arc::new(EchoSummarizer), &["faker"]);

        let report = pipeline.run(vec![PackageSpec::new("faker", "19.0"), PackageSpec::new("Faker", "19.0")], None).await;

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_retriever_times_out() {
        let retriever = Arc::new(ScriptedRetriever { delay: Some(Duration::from_secs(30)), ..Default::default() });
        let pipeline = pipeline(versions(&[("slow", "2.0")]), retriever, Arc::new(EchoSummarizer), &["slow"])
            .with_call_timeout(Duration::from_millis(50));

        let report = pipeline.run(vec![PackageSpec::new("slow", "1.0")], None).await;

        assert_eq!(report.outcomes[0].state, TaskState::Errored);
        assert_eq!(report.outcomes[0].result.as_ref().unwrap().status, RetrievalStatus::Failure);
    }

    #[tokio::test]
    async fn test_summary_failure_keeps_changelog() {
        let pipeline = pipeline(
            versions(&[("ruff", "0.5.0")]),
            Arc::new(ScriptedRetriever::default()),
            Arc::new(FailingSummarizer),
            &["ruff"],
        );

        let report = pipeline.run(vec![PackageSpec::new("ruff", "0.4.0")], None).await;
        let outcome = &report.outcomes[0];

        assert_eq!(outcome.state, TaskState::Errored);
        let result = outcome.result.as_ref().unwrap();
        assert_eq!(result.status, RetrievalStatus::Success);
        assert!(result.text.contains("changes for ruff"));
        assert!(result.summary.is_none());
    }

    #[tokio::test]
    async fn test_snippets_reach_summarizer() {
        let collaborators = Collaborators {
            versions: versions(&[("requests", "2.32.3")]),
            retriever: Arc::new(ScriptedRetriever::default()),
            summarizer: Arc::new(EchoSummarizer),
            snippets: Some(Arc::new(FixedSnippets)),
        };
        let pipeline = Pipeline::new(collaborators, sources(&["requests"])).with_max_concurrency(1);

        let report = pipeline.run(vec![PackageSpec::new("requests", "2.31.0")], None).await;

        let summary = report.outcomes[0].result.as_ref().unwrap().summary.clone().unwrap();
        assert!(summary.ends_with("(1 snippets)"));
    }
}
