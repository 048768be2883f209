//! Per-session short-term memory and paper reference resolution.
//!
//! A session remembers the papers most recently listed for it and the paper
//! most recently acted on. Both memories expire lazily: reads past the TTL
//! clear the field and report it as absent. Sessions are created on first
//! write and never destroyed.
//!
//! Key rules:
//!
//! - `last_papers` is truncated to `max_papers` on every write.
//! - `last_papers` expiry is checked against `updated_at`;
//!   `last_active_paper_id` expiry is checked independently against
//!   `last_active_at`.
//! - Resolution never errors: any reference that cannot be mapped yields
//!   `None`.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;

use folio_core::Paper;

/// Ordinal reference like `第3篇`, `第 3`, or a bare `3`.
static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:第)?\s*([0-9]+)\s*(?:篇)?$").expect("static regex"));

/// A caller-supplied pointer to a paper in a session's recent results.
///
/// The variant is decided once at the calling boundary (tool dispatch / RPC
/// adapter), not re-derived inside the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperRef {
    /// 1-based position in the session's recent papers.
    Index(i64),
    /// Ordinal phrase, exact paper id, or title fragment.
    Text(String),
    /// "The paper most recently acted on."
    Unspecified,
}

impl From<i64> for PaperRef {
    fn from(index: i64) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for PaperRef {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Mutable per-session state. All access goes through [`SessionStore`]'s lock.
#[derive(Debug)]
struct SessionState {
    last_papers: Vec<Paper>,
    last_active_paper_id: Option<String>,
    updated_at: Instant,
    last_active_at: Instant,
}

impl SessionState {
    fn new(now: Instant) -> Self {
        Self {
            last_papers: Vec::new(),
            last_active_paper_id: None,
            updated_at: now,
            last_active_at: now,
        }
    }

    /// Current papers, clearing them first if the TTL has lapsed.
    fn papers(&mut self, ttl: Duration, now: Instant) -> &[Paper] {
        if now.duration_since(self.updated_at) > ttl {
            self.last_papers.clear();
        }
        &self.last_papers
    }

    /// Current last-active id, clearing it first if the TTL has lapsed.
    fn active_id(&mut self, ttl: Duration, now: Instant) -> Option<String> {
        if now.duration_since(self.last_active_at) > ttl {
            self.last_active_paper_id = None;
        }
        self.last_active_paper_id.clone()
    }
}

/// Session-scoped short-term memory with TTL-based lazy expiry.
///
/// One coarse mutex guards the whole session map, so compound reads
/// (papers + timestamps) are atomic relative to writers.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
    ttl: Duration,
    max_papers: usize,
}

impl SessionStore {
    /// Create a store with the given expiry and per-session capacity.
    #[must_use]
    pub fn new(ttl: Duration, max_papers: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_papers,
        }
    }

    /// Replace the session's recent papers, truncated to `max_papers`.
    pub fn set_last_papers(&self, session_id: &str, mut papers: Vec<Paper>) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(now));
        papers.truncate(self.max_papers);
        state.last_papers = papers;
        state.updated_at = now;
    }

    /// The session's recent papers; empty once the TTL has lapsed.
    #[must_use]
    pub fn get_last_papers(&self, session_id: &str) -> Vec<Paper> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(session_id) {
            Some(state) => state.papers(self.ttl, now).to_vec(),
            None => Vec::new(),
        }
    }

    /// Record the paper most recently acted on.
    pub fn set_last_active_paper_id(&self, session_id: &str, paper_id: &str) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(now));
        state.last_active_paper_id = Some(paper_id.to_string());
        state.last_active_at = now;
    }

    /// The paper most recently acted on; `None` once the TTL has lapsed.
    #[must_use]
    pub fn get_last_active_paper_id(&self, session_id: &str) -> Option<String> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        sessions
            .get_mut(session_id)?
            .active_id(self.ttl, now)
    }

    /// Map a reference to a concrete paper from the session's recent papers.
    ///
    /// Resolution order:
    /// 1. [`PaperRef::Unspecified`] — the last-active id, found by exact id
    ///    within the current `last_papers` only (no further fallback).
    /// 2. [`PaperRef::Index`] — bounds-checked 1-based index.
    /// 3. [`PaperRef::Text`] fully matching an ordinal phrase — the digits as
    ///    a 1-based index.
    /// 4. Exact id match.
    /// 5. Case-insensitive substring match against the title; first wins.
    ///
    /// Every failure mode yields `None`.
    #[must_use]
    pub fn resolve_paper(&self, session_id: &str, reference: &PaperRef) -> Option<Paper> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let state = sessions.get_mut(session_id)?;

        match reference {
            PaperRef::Unspecified => {
                let active = state.active_id(self.ttl, now)?;
                state
                    .papers(self.ttl, now)
                    .iter()
                    .find(|p| p.id == active)
                    .cloned()
            }
            PaperRef::Index(i) => by_index(state.papers(self.ttl, now), *i),
            PaperRef::Text(text) => {
                let s = text.trim();
                let papers = state.papers(self.ttl, now);
                if papers.is_empty() {
                    return None;
                }

                if let Some(caps) = ORDINAL_RE.captures(s) {
                    // An ordinal phrase decides the outcome by itself; an
                    // out-of-range ordinal does not fall through to id/title.
                    let i: i64 = caps[1].parse().ok()?;
                    return by_index(papers, i);
                }

                if let Some(paper) = papers.iter().find(|p| p.id == s) {
                    return Some(paper.clone());
                }

                let needle = s.to_lowercase();
                papers
                    .iter()
                    .find(|p| p.title.to_lowercase().contains(&needle))
                    .cloned()
            }
        }
    }
}

fn by_index(papers: &[Paper], i: i64) -> Option<Paper> {
    if i < 1 {
        return None;
    }
    let idx = usize::try_from(i - 1).ok()?;
    papers.get(idx).cloned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl: Duration) -> SessionStore {
        SessionStore::new(ttl, 50)
    }

    fn papers(n: usize) -> Vec<Paper> {
        (1..=n)
            .map(|i| Paper::new(format!("2401.{i:05}"), format!("Paper number {i}")))
            .collect()
    }

    #[test]
    fn set_last_papers_truncates_to_max() {
        let store = SessionStore::new(Duration::from_secs(60), 3);
        store.set_last_papers("s1", papers(10));
        let got = store.get_last_papers("s1");
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].id, "2401.00001");
        assert_eq!(got[2].id, "2401.00003");
    }

    #[test]
    fn unknown_session_reads_are_empty() {
        let store = store(Duration::from_secs(60));
        assert!(store.get_last_papers("nope").is_empty());
        assert!(store.get_last_active_paper_id("nope").is_none());
        assert!(store.resolve_paper("nope", &PaperRef::Index(1)).is_none());
    }

    #[test]
    fn last_papers_expire_lazily() {
        let store = store(Duration::from_millis(20));
        store.set_last_papers("s1", papers(2));
        assert_eq!(store.get_last_papers("s1").len(), 2);
        std::thread::sleep(Duration::from_millis(60));
        assert!(store.get_last_papers("s1").is_empty());
    }

    #[test]
    fn last_active_ttl_is_independent_of_papers_ttl() {
        let store = store(Duration::from_millis(200));
        store.set_last_papers("s1", papers(2));
        std::thread::sleep(Duration::from_millis(120));
        store.set_last_active_paper_id("s1", "2401.00001");
        std::thread::sleep(Duration::from_millis(120));
        // Papers are past their TTL, the active id is not.
        assert!(store.get_last_papers("s1").is_empty());
        assert_eq!(
            store.get_last_active_paper_id("s1").as_deref(),
            Some("2401.00001")
        );
    }

    #[test]
    fn expired_active_id_reads_none() {
        let store = store(Duration::from_millis(20));
        store.set_last_active_paper_id("s1", "2401.00001");
        std::thread::sleep(Duration::from_millis(60));
        assert!(store.get_last_active_paper_id("s1").is_none());
    }

    #[test]
    fn resolve_by_index_is_one_based_and_bounds_checked() {
        let store = store(Duration::from_secs(60));
        store.set_last_papers("s1", papers(3));
        assert_eq!(
            store.resolve_paper("s1", &PaperRef::Index(1)).unwrap().id,
            "2401.00001"
        );
        assert_eq!(
            store.resolve_paper("s1", &PaperRef::Index(3)).unwrap().id,
            "2401.00003"
        );
        assert!(store.resolve_paper("s1", &PaperRef::Index(0)).is_none());
        assert!(store.resolve_paper("s1", &PaperRef::Index(4)).is_none());
        assert!(store.resolve_paper("s1", &PaperRef::Index(-1)).is_none());
    }

    #[test]
    fn resolve_ordinal_phrase_equals_index() {
        let store = store(Duration::from_secs(60));
        store.set_last_papers("s1", papers(5));
        let by_phrase = store.resolve_paper("s1", &PaperRef::Text("第3篇".into()));
        let by_index = store.resolve_paper("s1", &PaperRef::Index(3));
        assert_eq!(by_phrase, by_index);
        assert!(by_phrase.is_some());
        // Variants of the phrase resolve the same way.
        assert_eq!(
            store.resolve_paper("s1", &PaperRef::Text("第 3".into())),
            by_index
        );
        assert_eq!(
            store.resolve_paper("s1", &PaperRef::Text("3".into())),
            by_index
        );
    }

    #[test]
    fn out_of_range_ordinal_does_not_fall_through() {
        let store = store(Duration::from_secs(60));
        store.set_last_papers("s1", papers(2));
        assert!(
            store
                .resolve_paper("s1", &PaperRef::Text("第9篇".into()))
                .is_none()
        );
    }

    #[test]
    fn resolve_by_exact_id() {
        let store = store(Duration::from_secs(60));
        store.set_last_papers("s1", papers(3));
        let got = store
            .resolve_paper("s1", &PaperRef::Text("2401.00002".into()))
            .unwrap();
        assert_eq!(got.title, "Paper number 2");
    }

    #[test]
    fn resolve_by_title_substring_case_insensitive_first_wins() {
        let store = store(Duration::from_secs(60));
        store.set_last_papers(
            "s1",
            vec![
                Paper::new("a1", "Graph Neural Networks for Routing"),
                Paper::new("a2", "Neural Machine Translation"),
            ],
        );
        let got = store
            .resolve_paper("s1", &PaperRef::Text("NEURAL".into()))
            .unwrap();
        assert_eq!(got.id, "a1");
    }

    #[test]
    fn resolve_no_match_is_none() {
        let store = store(Duration::from_secs(60));
        store.set_last_papers("s1", papers(3));
        assert!(
            store
                .resolve_paper("s1", &PaperRef::Text("quantum chromodynamics".into()))
                .is_none()
        );
    }

    #[test]
    fn resolve_unspecified_uses_last_active_within_current_papers() {
        let store = store(Duration::from_secs(60));
        store.set_last_papers("s1", papers(3));
        store.set_last_active_paper_id("s1", "2401.00002");
        let got = store.resolve_paper("s1", &PaperRef::Unspecified).unwrap();
        assert_eq!(got.id, "2401.00002");
    }

    #[test]
    fn resolve_unspecified_without_active_id_is_none() {
        let store = store(Duration::from_secs(60));
        store.set_last_papers("s1", papers(3));
        assert!(store.resolve_paper("s1", &PaperRef::Unspecified).is_none());
    }

    #[test]
    fn resolve_unspecified_active_id_not_in_papers_is_none() {
        let store = store(Duration::from_secs(60));
        store.set_last_papers("s1", papers(3));
        store.set_last_active_paper_id("s1", "9999.99999");
        assert!(store.resolve_paper("s1", &PaperRef::Unspecified).is_none());
    }

    #[test]
    fn resolve_unspecified_after_papers_expired_is_none() {
        let store = store(Duration::from_millis(200));
        store.set_last_papers("s1", papers(3));
        store.set_last_active_paper_id("s1", "2401.00001");
        std::thread::sleep(Duration::from_millis(120));
        // Keep the active id fresh while the papers age out.
        store.set_last_active_paper_id("s1", "2401.00001");
        std::thread::sleep(Duration::from_millis(120));
        assert!(store.resolve_paper("s1", &PaperRef::Unspecified).is_none());
    }

    #[test]
    fn sessions_are_isolated() {
        let store = store(Duration::from_secs(60));
        store.set_last_papers("s1", papers(2));
        store.set_last_papers("s2", papers(1));
        assert_eq!(store.get_last_papers("s1").len(), 2);
        assert_eq!(store.get_last_papers("s2").len(), 1);
    }
}
