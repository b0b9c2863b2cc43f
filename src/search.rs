use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{SearchConfig, SuggestionFilter};
use crate::error::SpotOnError;
use crate::locality::LocalityLookup;
use crate::models::{Coordinates, LocalityRecord, SuggestionSeed};

/// Result of a locality selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectOutcome {
    /// Lookup succeeded and the record is now current
    Selected(LocalityRecord),
    /// Lookup failed; the previous record is untouched
    Failed(String),
    /// A newer selection was issued while this one was in flight
    Superseded,
    /// Nothing to look up
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSnapshot {
    pub query: String,
    pub suggestions_visible: bool,
    pub suggestions: Vec<String>,
    pub pending: bool,
    pub error: Option<String>,
    pub selected: Option<LocalityRecord>,
}

struct SearchState {
    query: String,
    suggestions_visible: bool,
    selected: Option<LocalityRecord>,
    pending: bool,
    error: Option<String>,
    latest_seq: u64,
    hide_timer: Option<CancellationToken>,
}

struct Inner {
    lookup: Arc<dyn LocalityLookup>,
    seeds: Vec<SuggestionSeed>,
    filter: SuggestionFilter,
    blur_grace: Duration,
    state: Mutex<SearchState>,
}

/// Owns the search input, suggestion visibility and the selected locality.
#[derive(Clone)]
pub struct SearchController {
    inner: Arc<Inner>,
}

impl SearchController {
    pub fn new(lookup: Arc<dyn LocalityLookup>, config: &SearchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                lookup,
                seeds: config.suggestions.clone(),
                filter: config.filter,
                blur_grace: Duration::from_millis(config.blur_grace_ms),
                state: Mutex::new(SearchState {
                    query: String::new(),
                    suggestions_visible: false,
                    selected: None,
                    pending: false,
                    error: None,
                    latest_seq: 0,
                    hide_timer: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SearchState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keystroke handler. Never touches the network.
    pub fn on_input_change(&self, text: &str) {
        let mut state = self.state();
        state.query = text.to_string();
        state.suggestions_visible = true;
        if let Some(timer) = state.hide_timer.take() {
            timer.cancel();
        }
    }

    /// Hides suggestions after the grace delay, unless input arrives first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_blur(&self) {
        let token = CancellationToken::new();
        if let Some(previous) = self.state().hide_timer.replace(token.clone()) {
            previous.cancel();
        }

        let this = self.clone();
        let grace = self.inner.blur_grace;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Suggestion hide timer cancelled");
                }
                _ = tokio::time::sleep(grace) => {
                    let mut state = this.state();
                    if !token.is_cancelled() {
                        state.suggestions_visible = false;
                        state.hide_timer = None;
                    }
                }
            }
        });
    }

    /// Looks up the locality the user picked and makes it current on success.
    pub async fn on_suggestion_select(&self, name: &str) -> SelectOutcome {
        self.select_with(name, |_| ()).await.0
    }

    /// Like `on_suggestion_select`, but runs `commit` in the same critical
    /// section that installs the new record, so dependent views can switch
    /// over in one transition.
    pub async fn select_with<T>(
        &self,
        name: &str,
        commit: impl FnOnce(&LocalityRecord) -> T,
    ) -> (SelectOutcome, Option<T>) {
        if name.trim().is_empty() {
            let err = SpotOnError::Validation("empty locality name".to_string());
            let message = err.user_message().to_string();
            self.state().error = Some(message.clone());
            return (SelectOutcome::Rejected(message), None);
        }

        let seq = {
            let mut state = self.state();
            state.latest_seq += 1;
            state.pending = true;
            state.error = None;
            state.latest_seq
        };
        tracing::info!("Selecting locality '{}' (request {})", name, seq);

        let result = self.inner.lookup.lookup(name).await;

        let mut state = self.state();
        if seq != state.latest_seq {
            tracing::debug!(
                "Discarding stale lookup for '{}' (request {}, latest {})",
                name,
                seq,
                state.latest_seq
            );
            return (SelectOutcome::Superseded, None);
        }

        state.pending = false;
        state.suggestions_visible = false;
        if let Some(timer) = state.hide_timer.take() {
            timer.cancel();
        }

        match result {
            Ok(record) => {
                let record = LocalityRecord {
                    name: name.to_string(),
                    ..record
                };
                let committed = commit(&record);
                state.selected = Some(record.clone());
                state.query = name.to_string();
                (SelectOutcome::Selected(record), Some(committed))
            }
            Err(e) => {
                tracing::error!("Error fetching locality data for '{}': {}", name, e);
                let message = e.user_message().to_string();
                state.error = Some(message.clone());
                (SelectOutcome::Failed(message), None)
            }
        }
    }

    /// Submits whatever is typed in the search box.
    pub async fn submit(&self) -> SelectOutcome {
        let query = self.state().query.clone();
        self.on_suggestion_select(&query).await
    }

    /// Drops pending timers and in-flight lookups.
    pub fn shutdown(&self) {
        let mut state = self.state();
        state.latest_seq += 1;
        state.pending = false;
        if let Some(timer) = state.hide_timer.take() {
            timer.cancel();
        }
    }

    pub fn selected(&self) -> Option<LocalityRecord> {
        self.state().selected.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.state().pending
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    /// Known coordinates for a seeded suggestion.
    pub fn seed_coordinates(&self, name: &str) -> Option<Coordinates> {
        self.inner
            .seeds
            .iter()
            .find(|seed| seed.name.eq_ignore_ascii_case(name.trim()))
            .and_then(|seed| seed.coordinates)
    }

    /// Candidates for `query` under the configured filter.
    pub fn candidates(&self, query: &str) -> Vec<String> {
        let names = self.inner.seeds.iter().map(|seed| seed.name.clone());
        let query = query.trim();
        if query.is_empty() {
            return names.collect();
        }

        match self.inner.filter {
            SuggestionFilter::All => names.collect(),
            SuggestionFilter::Prefix => {
                let query = query.to_lowercase();
                names
                    .filter(|name| name.to_lowercase().starts_with(&query))
                    .collect()
            }
            SuggestionFilter::Fuzzy => {
                let matcher = SkimMatcherV2::default();
                let mut scored: Vec<(i64, String)> = names
                    .filter_map(|name| matcher.fuzzy_match(&name, query).map(|score| (score, name)))
                    .collect();
                // Stable sort keeps seed order among equal scores
                scored.sort_by(|a, b| b.0.cmp(&a.0));
                scored.into_iter().map(|(_, name)| name).collect()
            }
        }
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.snapshot_with(|_| ()).0
    }

    /// Snapshot plus `read`, evaluated while no selection can commit.
    pub fn snapshot_with<T>(&self, read: impl FnOnce(&SearchSnapshot) -> T) -> (SearchSnapshot, T) {
        let state = self.state();
        let suggestions = if state.suggestions_visible {
            self.candidates(&state.query)
        } else {
            Vec::new()
        };
        let snapshot = SearchSnapshot {
            query: state.query.clone(),
            suggestions_visible: state.suggestions_visible,
            suggestions,
            pending: state.pending,
            error: state.error.clone(),
            selected: state.selected.clone(),
        };
        let extra = read(&snapshot);
        (snapshot, extra)
    }
}
