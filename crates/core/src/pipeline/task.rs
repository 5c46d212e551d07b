//! The per-package state machine.

use std::future::Future;
use std::time::Duration;

use super::progress::ProgressSink;
use super::{
    ChangelogRequest, CollaboratorError, PackageSpec, RetrievalResult, Shared, SummaryRequest, TaskOutcome, TaskState,
};
use crate::artifact::CacheKey;
use crate::version::is_newer;

/// Bound a collaborator call; a timeout becomes [`CollaboratorError::Timeout`].
async fn bounded<T>(
    limit: Duration, call: impl Future<Output = Result<T, CollaboratorError>>,
) -> Result<T, CollaboratorError> {
    tokio::time::timeout(limit, call).await.unwrap_or(Err(CollaboratorError::Timeout(limit)))
}

struct Task<'a> {
    sink: &'a ProgressSink,
    outcome: TaskOutcome,
}

impl Task<'_> {
    fn advance(&mut self, next: TaskState, message: impl Into<String>) {
        debug_assert!(
            self.outcome.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.outcome.state,
            next
        );
        let message = message.into();
        self.outcome.state = next;
        self.outcome.message.clone_from(&message);
        self.sink.emit(self.outcome.task_id, &self.outcome.package, next, message);
    }

    fn finish(mut self, next: TaskState, message: impl Into<String>, result: Option<RetrievalResult>) -> TaskOutcome {
        self.outcome.result = result;
        self.advance(next, message);
        self.outcome
    }
}

pub(super) async fn run_task(shared: &Shared, sink: &ProgressSink, task_id: usize, spec: PackageSpec) -> TaskOutcome {
    let package = spec.name.clone();
    let mut task = Task {
        sink,
        outcome: TaskOutcome {
            task_id,
            package: spec.name,
            current_version: spec.current_version,
            latest_version: None,
            state: TaskState::Pending,
            result: None,
            message: String::new(),
        },
    };
    sink.emit(task_id, &package, TaskState::Pending, format!("Processing {package}"));

    if spec.ignored {
        tracing::debug!(package = %package, "ignored by policy");
        return task.finish(TaskState::Skipped, format!("Ignored {package}"), None);
    }

    let limit = shared.call_timeout;
    let latest = match bounded(limit, shared.collaborators.versions.latest_version(&package)).await {
        Ok(Some(latest)) => latest,
        Ok(None) => {
            return task.finish(TaskState::Skipped, format!("{package} not found on package index"), None);
        }
        Err(e) => {
            tracing::warn!(package = %package, error = %e, "version lookup failed");
            let result = RetrievalResult::failure(format!("version lookup failed: {e}"));
            return task.finish(TaskState::Errored, format!("Error fetching version for {package}"), Some(result));
        }
    };
    task.outcome.latest_version = Some(latest.clone());

    let current = task.outcome.current_version.clone();
    if !is_newer(&latest, &current) {
        return task.finish(TaskState::Skipped, format!("{package} is up to date ({current})"), None);
    }

    task.advance(TaskState::Fetching, format!("Fetching changelog for {package}"));
    let key = CacheKey::new(&package, &current, &latest);
    let cached = match &shared.cache {
        Some(cache) => cache.get(&key).await,
        None => None,
    };

    let changelog = if let Some(text) = cached {
        tracing::debug!(package = %package, key = %key.entry_key(), "changelog cache hit");
        task.advance(TaskState::Cached, format!("Using cached changelog for {package}"));
        text
    } else {
        let Some(source) = shared.sources.get(&package) else {
            let result = RetrievalResult::not_found(format!("no changelog source for {package}"));
            return task.finish(TaskState::Done, format!("No changelog source for {package}"), Some(result));
        };
        let request = ChangelogRequest {
            package: package.clone(),
            from_version: current.clone(),
            to_version: latest.clone(),
            source: source.clone(),
        };
        match bounded(limit, shared.collaborators.retriever.retrieve(&request)).await {
            Ok(text) => {
                if let Some(cache) = &shared.cache
                    && let Err(e) = cache.set(&key, &text).await
                {
                    tracing::warn!(package = %package, error = %e, "failed to cache changelog");
                }
                text
            }
            Err(CollaboratorError::NotFound(reason)) => {
                let result = RetrievalResult::not_found(reason);
                return task.finish(TaskState::Done, format!("No changelog found for {package}"), Some(result));
            }
            Err(e) => {
                tracing::warn!(package = %package, error = %e, "changelog retrieval failed");
                let result = RetrievalResult::failure(e.to_string());
                return task.finish(TaskState::Errored, format!("Error fetching changelog for {package}"), Some(result));
            }
        }
    };

    task.advance(TaskState::Summarizing, format!("Summarizing changes for {package}"));
    let snippets = match &shared.collaborators.snippets {
        Some(source) => bounded(limit, source.snippets(&package)).await.unwrap_or_else(|e| {
            tracing::warn!(package = %package, error = %e, "snippet lookup failed; summarizing without context");
            Vec::new()
        }),
        None => Vec::new(),
    };
    let request = SummaryRequest {
        package: package.clone(),
        from_version: current,
        to_version: latest,
        changelog: changelog.clone(),
        snippets,
    };

    let mut result = RetrievalResult::success(changelog);
    match bounded(limit, shared.collaborators.summarizer.summarize(&request)).await {
        Ok(summary) => {
            result.summary = Some(summary);
            task.finish(TaskState::Done, format!("Completed {package}"), Some(result))
        }
        Err(e) => {
            tracing::warn!(package = %package, error = %e, "summarization failed");
            task.finish(TaskState::Errored, format!("Error summarizing {package}: {e}"), Some(result))
        }
    }
}
