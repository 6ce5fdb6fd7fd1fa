//! Result merging, relevance filtering and scoring.
//!
//! [`ResultSet`] is a reducer over the event stream: records are appended
//! to an arrival log exactly once per (source, page, id) and every ranked
//! view is derived from that log. Scoring and sorting are pure.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use strsim::normalized_levenshtein;

use crate::protocol::StreamEvent;
use crate::types::VideoRecord;

const EXACT_SCORE: f64 = 100.0;
const PREFIX_SCORE: f64 = 80.0;
const SUBSTRING_SCORE: f64 = 60.0;
const TOKEN_OVERLAP_WEIGHT: f64 = 40.0;
const SIMILARITY_WEIGHT: f64 = 10.0;

/// Lowercases and drops whitespace and punctuation.
pub fn normalize_title(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn query_tokens(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(normalize_title)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Minimum lexical match a title needs to enter the visible set.
///
/// Accepts when the normalized title contains the normalized query, when
/// every query token appears in it, or when the two are at least
/// `min_similarity` similar. An empty query accepts everything.
pub fn matches_query(title: &str, query: &str, min_similarity: f64) -> bool {
    let query_norm = normalize_title(query);
    if query_norm.is_empty() {
        return true;
    }
    let title_norm = normalize_title(title);

    if title_norm.contains(&query_norm) {
        return true;
    }

    let tokens = query_tokens(query);
    if !tokens.is_empty() && tokens.iter().all(|token| title_norm.contains(token.as_str())) {
        return true;
    }

    normalized_levenshtein(&title_norm, &query_norm) >= min_similarity
}

/// Relevance of `title` for `query`.
///
/// Exact match 100, prefix 80, substring 60, otherwise 40 times the share
/// of query tokens found in the title; plus 10 times the normalized edit
/// similarity.
pub fn relevance_score(title: &str, query: &str) -> f64 {
    let query_norm = normalize_title(query);
    if query_norm.is_empty() {
        return 0.0;
    }
    let title_norm = normalize_title(title);

    let base = if title_norm == query_norm {
        EXACT_SCORE
    } else if title_norm.starts_with(&query_norm) {
        PREFIX_SCORE
    } else if title_norm.contains(&query_norm) {
        SUBSTRING_SCORE
    } else {
        let tokens = query_tokens(query);
        let found = tokens
            .iter()
            .filter(|token| title_norm.contains(token.as_str()))
            .count();
        TOKEN_OVERLAP_WEIGHT * found as f64 / tokens.len().max(1) as f64
    };

    base + SIMILARITY_WEIGHT * normalized_levenshtein(&title_norm, &query_norm)
}

/// Ordering of a derived view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Highest score first
    #[default]
    Relevance,
    /// Order of arrival
    Arrival,
    /// Fastest source first
    Latency,
}

/// A record in the visible set, with its ranking data.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredVideo {
    pub video: VideoRecord,
    pub score: f64,
    /// Page the record came from
    pub page: u32,
    /// Position in the arrival log
    pub arrival: usize,
}

/// Stable sort; ties keep their current relative order.
pub fn sort_videos(videos: &mut [ScoredVideo], order: SortOrder) {
    match order {
        SortOrder::Relevance => videos.sort_by(|a, b| b.score.total_cmp(&a.score)),
        SortOrder::Arrival => videos.sort_by_key(|v| v.arrival),
        SortOrder::Latency => videos.sort_by(|a, b| match a.video.latency.cmp(&b.video.latency) {
            Ordering::Equal => b.score.total_cmp(&a.score),
            other => other,
        }),
    }
}

/// Accumulated results of one search session.
#[derive(Debug, Clone)]
pub struct ResultSet {
    query: String,
    min_similarity: f64,
    arrivals: Vec<ScoredVideo>,
    seen: HashSet<(String, u32, String)>,
    latencies: BTreeMap<String, u64>,
    events: Vec<StreamEvent>,
    rejected: usize,
}

impl ResultSet {
    pub fn new(query: impl Into<String>, min_similarity: f64) -> Self {
        Self {
            query: query.into(),
            min_similarity,
            arrivals: Vec::new(),
            seen: HashSet::new(),
            latencies: BTreeMap::new(),
            events: Vec::new(),
            rejected: 0,
        }
    }

    /// Rebuilds a result set from a recorded event log without re-fetching.
    pub fn replay(
        query: impl Into<String>,
        min_similarity: f64,
        events: impl IntoIterator<Item = StreamEvent>,
    ) -> Self {
        let mut set = Self::new(query, min_similarity);
        for event in events {
            set.apply(&event);
        }
        set
    }

    /// Applies one event, returning how many records were appended.
    pub fn apply(&mut self, event: &StreamEvent) -> usize {
        self.events.push(event.clone());

        let StreamEvent::Videos {
            source,
            videos,
            latency,
            page,
            ..
        } = event
        else {
            return 0;
        };

        self.latencies.entry(source.clone()).or_insert(*latency);

        let mut appended = 0;
        for video in videos {
            if !self.seen.insert((source.clone(), *page, video.id.clone())) {
                continue;
            }
            if !matches_query(&video.title, &self.query, self.min_similarity) {
                self.rejected += 1;
                continue;
            }
            self.arrivals.push(ScoredVideo {
                score: relevance_score(&video.title, &self.query),
                video: video.clone(),
                page: *page,
                arrival: self.arrivals.len(),
            });
            appended += 1;
        }
        appended
    }

    /// Ranked copy of the visible set.
    pub fn view(&self, order: SortOrder) -> Vec<ScoredVideo> {
        let mut videos = self.arrivals.clone();
        sort_videos(&mut videos, order);
        videos
    }

    /// Every event applied so far, in order.
    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    /// Latency per source, as first reported.
    pub fn latencies(&self) -> &BTreeMap<String, u64> {
        &self.latencies
    }

    /// Records dropped by the relevance filter.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn len(&self) -> usize {
        self.arrivals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn videos_event(source: &str, page: u32, latency: u64, titles: &[(&str, &str)]) -> StreamEvent {
        StreamEvent::Videos {
            source: source.to_string(),
            videos: titles
                .iter()
                .map(|(id, title)| {
                    let mut video = VideoRecord::new(*id, *title, source);
                    video.latency = latency;
                    video
                })
                .collect(),
            completed_sources: 1,
            total_sources: 2,
            latency,
            page,
        }
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("The Dark-Knight: Rises!"), "thedarkknightrises");
        assert_eq!(normalize_title("  "), "");
    }

    #[test]
    fn test_matches_query() {
        assert!(matches_query("Inception (2010)", "inception", 0.6));
        assert!(matches_query("Knight, The Dark", "dark knight", 0.6));
        assert!(matches_query("Incepshun", "Inception", 0.6));
        assert!(!matches_query("Totally Unrelated", "Inception", 0.6));
        assert!(matches_query("Anything", "  !! ", 0.6));
    }

    #[test]
    fn test_relevance_score_tiers() {
        let exact = relevance_score("Inception", "inception");
        let prefix = relevance_score("Inception 2", "inception");
        let substring = relevance_score("The Inception Files", "inception");
        let tokens = relevance_score("Knight of the Dark", "dark knight");

        assert!((exact - 110.0).abs() < 1e-9);
        assert!(prefix > 80.0 && prefix < exact);
        assert!(substring > 60.0 && substring < prefix);
        assert!(tokens >= 40.0 && tokens < substring);
    }

    #[test]
    fn test_result_set_dedups_and_filters() {
        let mut set = ResultSet::new("Inception", 0.6);

        let first = videos_event("a", 1, 120, &[("1", "Inception"), ("2", "Cooking Show")]);
        assert_eq!(set.apply(&first), 1);
        assert_eq!(set.apply(&first), 0);
        assert_eq!(set.apply(&videos_event("a", 2, 300, &[("1", "Inception")])), 1);
        assert_eq!(set.apply(&videos_event("b", 1, 50, &[("1", "Inception 2")])), 1);

        assert_eq!(set.len(), 3);
        assert_eq!(set.rejected(), 1);
        assert_eq!(set.latencies().get("a"), Some(&120));
        assert_eq!(set.latencies().get("b"), Some(&50));
        assert_eq!(set.events().len(), 4);
    }

    #[test]
    fn test_views_by_order() {
        let mut set = ResultSet::new("Inception", 0.6);
        set.apply(&videos_event("slow", 1, 900, &[("1", "The Inception Files")]));
        set.apply(&videos_event("fast", 1, 100, &[("2", "Inception 2")]));
        set.apply(&videos_event("mid", 1, 400, &[("3", "Inception")]));

        let ids = |order| {
            set.view(order)
                .into_iter()
                .map(|v| v.video.id)
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(SortOrder::Relevance), vec!["3", "2", "1"]);
        assert_eq!(ids(SortOrder::Arrival), vec!["1", "2", "3"]);
        assert_eq!(ids(SortOrder::Latency), vec!["2", "3", "1"]);
    }

    #[test]
    fn test_replay_rebuilds_identical_view() {
        let mut live = ResultSet::new("Inception", 0.6);
        live.apply(&StreamEvent::Start { total_sources: 2 });
        live.apply(&videos_event("a", 1, 120, &[("1", "Inception"), ("2", "Inception 2")]));
        live.apply(&StreamEvent::Complete {
            total_videos_found: 2,
            total_sources: 2,
            max_page_count: 1,
        });

        let replayed = ResultSet::replay("Inception", 0.6, live.events().to_vec());

        assert_eq!(
            replayed.view(SortOrder::Relevance),
            live.view(SortOrder::Relevance)
        );
        assert_eq!(replayed.events(), live.events());
    }

    proptest! {
        #[test]
        fn prop_resort_is_idempotent(
            titles in prop::collection::vec("[a-z ]{0,12}", 0..24),
            latencies in prop::collection::vec(0u64..5, 24),
            query in "[a-z ]{0,8}",
        ) {
            let scored: Vec<ScoredVideo> = titles
                .iter()
                .enumerate()
                .map(|(i, title)| {
                    let mut video = VideoRecord::new(i.to_string(), title.clone(), "s");
                    video.latency = latencies[i];
                    ScoredVideo {
                        score: relevance_score(title, &query),
                        video,
                        page: 1,
                        arrival: i,
                    }
                })
                .collect();

            for order in [SortOrder::Relevance, SortOrder::Arrival, SortOrder::Latency] {
                let mut once = scored.clone();
                sort_videos(&mut once, order);
                let mut twice = once.clone();
                sort_videos(&mut twice, order);
                prop_assert_eq!(once, twice);
            }
        }
    }
}
