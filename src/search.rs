//! Note search with last-writer-wins cancellation.
//!
//! Each new query cancels the one still in flight, so a slow earlier query
//! can never overwrite the results of a later one.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;

/// Fuzzy search over a workspace's note paths.
///
/// Implementations should stop early once `cancel` fires and may then
/// return [`SearchError::Cancelled`]. They must tolerate overlapping calls.
#[async_trait]
pub trait NotePathSearcher: Send + Sync {
    /// Matching wsPaths, best match first, at most `limit`. An empty query
    /// matches every note.
    async fn search_note_paths(
        &self,
        cancel: CancellationToken,
        ws_name: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, SearchError>;
}

/// Tuning for [`NoteSearch`].
///
/// The default asks the searcher for 64 results per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Results requested per query.
    pub limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { limit: 64 }
    }
}

/// Matches split into recently opened notes and the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Recent notes among the matches, most recent first.
    pub recent: Vec<String>,
    /// Remaining matches in ranking order.
    pub other: Vec<String>,
}

impl SearchResult {
    /// Split `matches` against `recent_ws_paths`. With an empty query every
    /// recent path counts, matched or not.
    pub fn split(query: &str, matches: Vec<String>, recent_ws_paths: &[String]) -> Self {
        let recent: Vec<String> = if query.is_empty() {
            recent_ws_paths.to_vec()
        } else {
            recent_ws_paths
                .iter()
                .filter(|p| matches.contains(p))
                .cloned()
                .collect()
        };
        let other = matches.into_iter().filter(|p| !recent.contains(p)).collect();
        Self { recent, other }
    }
}

/// Runs queries against a [`NotePathSearcher`], one logical search at a
/// time.
pub struct NoteSearch {
    searcher: Arc<dyn NotePathSearcher>,
    config: SearchConfig,
    in_flight: Mutex<CancellationToken>,
    latest: watch::Sender<Arc<SearchResult>>,
}

impl NoteSearch {
    /// Create a search over `searcher`.
    ///
    /// # Arguments
    ///
    /// * `searcher` - Backend that matches note paths for one query.
    /// * `config` - Result limit passed to every call.
    ///
    /// # Returns
    ///
    /// A search with no query in flight and an empty published result.
    pub fn new(searcher: Arc<dyn NotePathSearcher>, config: SearchConfig) -> Self {
        let (latest, _) = watch::channel(Arc::default());
        Self {
            searcher,
            config,
            in_flight: Mutex::new(CancellationToken::new()),
            latest,
        }
    }

    /// Receives the result of every query that was not superseded.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SearchResult>> {
        self.latest.subscribe()
    }

    /// The last published result.
    pub fn latest(&self) -> Arc<SearchResult> {
        Arc::clone(&self.latest.borrow())
    }

    /// Cancel the query in flight, if any.
    pub fn cancel(&self) {
        self.in_flight.lock().expect("search lock poisoned").cancel();
    }

    /// Run `query`, cancelling the previous one.
    ///
    /// Returns `Ok(None)` when a newer query superseded this one before it
    /// finished; its results are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Backend`] if the searcher failed.
    pub async fn search(
        &self,
        ws_name: &str,
        query: &str,
        recent_ws_paths: &[String],
    ) -> Result<Option<Arc<SearchResult>>, SearchError> {
        let token = CancellationToken::new();
        {
            let mut in_flight = self.in_flight.lock().expect("search lock poisoned");
            in_flight.cancel();
            *in_flight = token.clone();
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.searcher.search_note_paths(token.clone(), ws_name, query, self.config.limit) => Some(result),
        };
        let matches = match outcome {
            None | Some(Err(SearchError::Cancelled)) => {
                tracing::debug!(query, "search superseded");
                return Ok(None);
            }
            Some(Err(err)) => return Err(err),
            Some(Ok(matches)) => matches,
        };

        let result = Arc::new(SearchResult::split(query, matches, recent_ws_paths));
        // Publishing under the lock orders it against a newer query's cancel.
        let in_flight = self.in_flight.lock().expect("search lock poisoned");
        if token.is_cancelled() {
            tracing::debug!(query, "search superseded");
            return Ok(None);
        }
        self.latest.send_replace(Arc::clone(&result));
        drop(in_flight);
        tracing::debug!(
            query,
            recent = result.recent.len(),
            other = result.other.len(),
            "search finished"
        );
        Ok(Some(result))
    }
}

impl std::fmt::Debug for NoteSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteSearch")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
