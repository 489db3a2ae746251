//! Priority-ordered fan-out over linked catalog accounts.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use super::{CatalogError, CatalogResult, CatalogSource};
use crate::track::TrackMeta;

/// A single source's failure inside a fan-out.
#[derive(Debug)]
pub struct SourceFailure {
    pub label: String,
    pub error: CatalogError,
}

impl std::fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.label, self.error)
    }
}

/// Joins failures into a single human-readable line.
pub(crate) fn describe_failures(failures: &[SourceFailure]) -> String {
    if failures.is_empty() {
        return "no catalog sources configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Ordered list of capability-equivalent catalog sources.
///
/// Operations try sources in configuration order and short-circuit on the
/// first success.
#[derive(Clone, Default)]
pub struct CatalogChain {
    sources: Vec<Arc<dyn CatalogSource>>,
}

impl CatalogChain {
    /// Creates a chain; `sources` order is the priority order.
    pub fn new(sources: Vec<Arc<dyn CatalogSource>>) -> Self {
        Self { sources }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns the account labels in priority order.
    pub fn labels(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.label().to_string()).collect()
    }

    /// Looks up a source by its account label.
    pub fn get(&self, label: &str) -> Option<Arc<dyn CatalogSource>> {
        self.sources.iter().find(|s| s.label() == label).cloned()
    }

    /// Runs `operation` against each source in order until one succeeds.
    ///
    /// Returns every source's failure, in order, if none succeed.
    pub async fn first_success<T, F, Fut>(
        &self,
        action: &str,
        mut operation: F,
    ) -> Result<T, Vec<SourceFailure>>
    where
        F: FnMut(Arc<dyn CatalogSource>) -> Fut,
        Fut: Future<Output = CatalogResult<T>>,
    {
        let mut failures = Vec::new();
        for source in &self.sources {
            match operation(Arc::clone(source)).await {
                Ok(value) => {
                    if !failures.is_empty() {
                        log::info!(
                            "[Catalog] {} succeeded on '{}' after {} failure(s)",
                            action,
                            source.label(),
                            failures.len()
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    log::warn!("[Catalog] {} failed on '{}': {}", action, source.label(), error);
                    failures.push(SourceFailure {
                        label: source.label().to_string(),
                        error,
                    });
                }
            }
        }
        Err(failures)
    }

    /// Fetches each source's liked tracks independently, in priority order.
    pub async fn liked_tracks_by_source(&self) -> Vec<(String, CatalogResult<Vec<TrackMeta>>)> {
        let mut results = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            results.push((source.label().to_string(), source.liked_tracks().await));
        }
        results
    }

    /// Merges every source's liked tracks, dropping duplicate ids.
    ///
    /// The first occurrence (highest-priority source) of each id wins. Sources
    /// that fail are skipped; the call fails only if every source fails.
    pub async fn liked_tracks(&self) -> Result<Vec<TrackMeta>, Vec<SourceFailure>> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        let mut failures = Vec::new();

        for (label, result) in self.liked_tracks_by_source().await {
            match result {
                Ok(tracks) => {
                    merged.extend(tracks.into_iter().filter(|t| seen.insert(t.id.clone())));
                }
                Err(error) => {
                    log::warn!("[Catalog] liked_tracks failed on '{}': {}", label, error);
                    failures.push(SourceFailure { label, error });
                }
            }
        }

        if !self.sources.is_empty() && failures.len() == self.sources.len() {
            return Err(failures);
        }
        Ok(merged)
    }
}
