//! Corpus storage, query scoring and the background search worker.
//!
//! Scoring is substring-tiered: a query is tokenized and every token must
//! land somewhere in a record (key, token vocabulary or full content) for
//! the record to stay in; each token contributes its single best tier and a
//! multi-token query that appears in order earns one sequential bonus.
//! Results and completion candidates are published as atomically swapped
//! snapshots so readers on other threads never block the worker.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::bus::CommandBus;
use crate::command::Command;

const SCORE_SEQUENTIAL_KEY: i32 = 5000;
const SCORE_SEQUENTIAL_CONTENT: i32 = 3000;
const SCORE_KEY_PREFIX: i32 = 2000;
const SCORE_KEY_CONTAINS: i32 = 1000;
const SCORE_WORD_PREFIX: i32 = 100;
const SCORE_WORD_CONTAINS: i32 = 50;
const SCORE_CONTENT: i32 = 10;
const SCORE_DEFAULT: i32 = 1;

pub const MAX_RESULTS: usize = 10_000;

const SEARCH_TICK: Duration = Duration::from_millis(30);

/// One searchable catalog entry, immutable for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub content: String,
    /// Lowercased alphanumeric tokens of `content`, duplicates preserved.
    pub words: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredMatch {
    /// Position of the record in the corpus.
    pub index: usize,
    pub score: i32,
}

/// Splits on whitespace, strips non-alphanumeric characters and lowercases.
/// Tokens that strip down to nothing are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|raw| {
            let word: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            (!word.is_empty()).then_some(word)
        })
        .collect()
}

/// True when every word occurs in `text` in order, each occurrence starting
/// at or after the end of the previous one.
fn has_sequential_match(text_lower: &str, words: &[String]) -> bool {
    let mut pos = 0;
    for word in words {
        match text_lower[pos..].find(word.as_str()) {
            Some(found) => pos += found + word.len(),
            None => return false,
        }
    }
    !words.is_empty()
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.to_lowercase().starts_with(&prefix.to_lowercase())
}

/// Byte length of the case-insensitive common prefix of `a` and `b`,
/// measured on `a`.
fn common_prefix_len(a: &str, b: &str) -> usize {
    let mut len = 0;
    let mut others = b.chars();
    for c in a.chars() {
        match others.next() {
            Some(other) if c.eq_ignore_ascii_case(&other) => len += c.len_utf8(),
            _ => break,
        }
    }
    len
}

/// Splits a query into everything up to and including the last space or tab,
/// and the word being typed after it.
fn split_last_word(query: &str) -> (&str, &str) {
    match query.rfind(&[' ', '\t'][..]) {
        Some(pos) => (&query[..=pos], &query[pos + 1..]),
        None => ("", query),
    }
}

pub struct SearchEngine {
    entries: Vec<Record>,
    query: ArcSwap<String>,
    results: ArcSwap<Vec<ScoredMatch>>,
    completions: ArcSwap<Vec<String>>,
    search_needed: AtomicBool,
}

impl SearchEngine {
    pub fn new(entries: Vec<Record>) -> Self {
        Self {
            entries,
            query: ArcSwap::from_pointee(String::new()),
            results: ArcSwap::from_pointee(Vec::new()),
            completions: ArcSwap::from_pointee(Vec::new()),
            search_needed: AtomicBool::new(false),
        }
    }

    pub fn record_count(&self) -> usize {
        self.entries.len()
    }

    pub fn get_record(&self, index: usize) -> Option<&Record> {
        self.entries.get(index)
    }

    /// Replaces the published query and flags the worker for a recompute.
    /// Never blocks on scoring.
    pub fn update_query(&self, query: &str) {
        self.query.store(Arc::new(query.to_string()));
        self.search_needed.store(true, Ordering::Release);
    }

    pub fn get_query(&self) -> Arc<String> {
        self.query.load_full()
    }

    /// Current ranked matches: score descending, ties by ascending content.
    pub fn get_results(&self) -> Arc<Vec<ScoredMatch>> {
        self.results.load_full()
    }

    /// Completion candidates for the word under the cursor, deduplicated
    /// and in ascending order.
    pub fn get_completions(&self) -> Arc<Vec<String>> {
        self.completions.load_full()
    }

    /// Longest common prefix of the published candidates spliced back into
    /// the query. `None` when the trailing word is empty, already complete,
    /// or the candidates diverge immediately.
    pub fn get_completion(&self) -> Option<String> {
        let completions = self.completions.load_full();
        if completions.is_empty() {
            return None;
        }
        let query = self.query.load_full();
        if query.is_empty() {
            return None;
        }
        let (prefix, word) = split_last_word(&query);
        if word.is_empty() {
            return None;
        }

        let mut common = completions[0].clone();
        for candidate in completions.iter().skip(1) {
            common.truncate(common_prefix_len(&common, candidate));
            if common.is_empty() {
                return None;
            }
        }

        if common.len() > word.len() && starts_with_ignore_case(&common, word) {
            Some(format!("{prefix}{common}"))
        } else {
            None
        }
    }

    /// Spawns the scoring worker. It checks the recompute flag every tick,
    /// publishes fresh snapshots and posts a viewport refresh on the bus.
    pub fn start(
        self: Arc<Self>,
        bus: Arc<CommandBus<Command>>,
        stop: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                if !self.search_needed.swap(false, Ordering::AcqRel) {
                    thread::sleep(SEARCH_TICK);
                    continue;
                }
                let query = self.query.load_full();
                self.recompute(&query);
                bus.push(Command::RefreshDisplay {
                    scroll_offset: 0,
                    selected: None,
                });
            }
        })
    }

    /// Scores the whole corpus against `query` and publishes the ranked
    /// results plus the completion candidates.
    pub fn recompute(&self, query: &str) {
        let started = Instant::now();
        let words = tokenize(query);

        let mut matches: Vec<ScoredMatch> = Vec::new();
        for (index, record) in self.entries.iter().enumerate() {
            let score = score_record(record, &words);
            if score > 0 {
                matches.push(ScoredMatch { index, score });
            }
        }
        // Stable sort keeps corpus order for full ties, so identical
        // queries always produce identical orderings.
        matches.sort_by(|a, b| {
            b.score.cmp(&a.score).then_with(|| {
                self.entries[a.index]
                    .content
                    .cmp(&self.entries[b.index].content)
            })
        });
        matches.truncate(MAX_RESULTS);

        let completions = self.find_completions(query);

        debug!(
            query,
            matches = matches.len(),
            completions = completions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recomputed results"
        );

        self.results.store(Arc::new(matches));
        self.completions.store(Arc::new(completions));
    }

    /// Every key and record word that extends the trailing query word.
    fn find_completions(&self, query: &str) -> Vec<String> {
        if query.is_empty() || self.entries.is_empty() {
            return Vec::new();
        }
        let (_, word) = split_last_word(query);
        if word.is_empty() {
            return Vec::new();
        }
        let word_lower = word.to_lowercase();

        let mut candidates = BTreeSet::new();
        for record in &self.entries {
            collect_candidate(&mut candidates, &record.key, &word_lower);
            for entry_word in &record.words {
                collect_candidate(&mut candidates, entry_word, &word_lower);
            }
        }
        candidates.into_iter().collect()
    }
}

fn collect_candidate(out: &mut BTreeSet<String>, candidate: &str, word_lower: &str) {
    if candidate.is_empty() {
        return;
    }
    let lower = candidate.to_lowercase();
    if lower.len() > word_lower.len() && lower.starts_with(word_lower) {
        out.insert(candidate.to_string());
    }
}

/// Scores one record against the tokenized query. Zero excludes the record;
/// an empty token list keeps every record in at the default score.
fn score_record(record: &Record, words: &[String]) -> i32 {
    if words.is_empty() {
        return SCORE_DEFAULT;
    }

    let key_lower = record.key.to_lowercase();
    let content_lower = record.content.to_lowercase();
    let mut total = 0;

    // At most one sequential bonus, key checked before content.
    if words.len() > 1 {
        if has_sequential_match(&key_lower, words) {
            total += SCORE_SEQUENTIAL_KEY;
        } else if has_sequential_match(&content_lower, words) {
            total += SCORE_SEQUENTIAL_CONTENT;
        }
    }

    for word in words {
        let mut word_score = 0;

        if key_lower.starts_with(word.as_str()) {
            word_score = SCORE_KEY_PREFIX;
        } else if key_lower.contains(word.as_str()) {
            word_score = SCORE_KEY_CONTAINS;
        }

        for entry_word in &record.words {
            if entry_word.starts_with(word.as_str()) {
                word_score = word_score.max(SCORE_WORD_PREFIX);
            } else if entry_word.contains(word.as_str()) {
                word_score = word_score.max(SCORE_WORD_CONTAINS);
            }
        }

        if content_lower.contains(word.as_str()) {
            word_score = word_score.max(SCORE_CONTENT);
        }

        if word_score == 0 {
            return 0;
        }
        total += word_score;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(key: &str, content: &str) -> Record {
        Record {
            key: key.to_string(),
            content: content.to_string(),
            words: tokenize(content),
        }
    }

    fn doom_engine() -> SearchEngine {
        SearchEngine::new(vec![
            record("DOOM", "DOOM 1993 id Software"),
            record("DOOM II", "DOOM II Hell on Earth 1994 id Software"),
        ])
    }

    fn keys_of(engine: &SearchEngine) -> Vec<String> {
        engine
            .get_results()
            .iter()
            .map(|m| engine.get_record(m.index).unwrap().key.clone())
            .collect()
    }

    #[test]
    fn tokenize_strips_punctuation_and_lowercases() {
        assert_eq!(
            tokenize("DOOM II: Hell on Earth!"),
            vec!["doom", "ii", "hell", "on", "earth"]
        );
        assert_eq!(tokenize("  "), Vec::<String>::new());
        assert_eq!(tokenize("!!! ---"), Vec::<String>::new());
    }

    #[test]
    fn key_prefix_token_scores_above_zero() {
        let engine = doom_engine();
        engine.recompute("doo");
        let results = engine.get_results();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|m| m.score > 0));
    }

    #[test]
    fn equal_scores_break_ties_by_content_order() {
        let engine = doom_engine();
        engine.recompute("doom");
        let results = engine.get_results();
        assert_eq!(results[0].score, results[1].score);
        assert_eq!(keys_of(&engine), vec!["DOOM", "DOOM II"]);
    }

    #[test]
    fn empty_query_ranks_everything_by_content() {
        let engine = SearchEngine::new(vec![
            record("B", "beta"),
            record("A", "alpha"),
            record("C", "gamma"),
        ]);
        engine.recompute("");
        let results = engine.get_results();
        assert!(results.iter().all(|m| m.score == 1));
        assert_eq!(keys_of(&engine), vec!["A", "B", "C"]);
    }

    #[test]
    fn punctuation_only_query_behaves_like_empty() {
        let engine = doom_engine();
        engine.recompute("!!!");
        assert_eq!(engine.get_results().len(), 2);
        assert!(engine.get_results().iter().all(|m| m.score == 1));
    }

    #[test]
    fn token_missing_everywhere_excludes_the_record() {
        let engine = doom_engine();
        engine.recompute("doom zzz");
        assert!(engine.get_results().is_empty());
    }

    #[test]
    fn sequential_content_match_keeps_only_doom_ii() {
        let engine = doom_engine();
        engine.recompute("1994 id");
        let results = engine.get_results();
        assert_eq!(keys_of(&engine), vec!["DOOM II"]);
        // 3000 sequential-content + word prefix for each token
        assert_eq!(results[0].score, 3200);
    }

    #[test]
    fn sequential_key_match_outranks_content_match() {
        let engine = doom_engine();
        engine.recompute("doom ii");
        let results = engine.get_results();
        assert_eq!(keys_of(&engine), vec!["DOOM II"]);
        // 5000 sequential-key + 2000 key prefix + 1000 key contains
        assert_eq!(results[0].score, 8000);
    }

    #[test]
    fn single_token_earns_no_sequential_bonus() {
        let words = tokenize("doom");
        let entry = record("DOOM", "DOOM 1993 id Software");
        assert_eq!(score_record(&entry, &words), SCORE_KEY_PREFIX);
    }

    #[test]
    fn sequential_scan_does_not_reuse_earlier_text() {
        // Both tokens exist, but not in order after the first match.
        assert!(has_sequential_match("doom ii", &tokenize("doom ii")));
        assert!(!has_sequential_match("ii doom", &tokenize("doom ii")));
    }

    #[test]
    fn recompute_is_deterministic() {
        let engine = doom_engine();
        engine.recompute("id software");
        let first = engine.get_results();
        engine.recompute("id software");
        let second = engine.get_results();
        assert_eq!(*first, *second);
    }

    #[test]
    fn results_truncate_at_the_cap() {
        let entries: Vec<Record> = (0..MAX_RESULTS + 1)
            .map(|i| record(&format!("K{i:05}"), &format!("entry {i:05}")))
            .collect();
        let engine = SearchEngine::new(entries);
        engine.recompute("");
        assert_eq!(engine.get_results().len(), MAX_RESULTS);
    }

    #[test]
    fn update_query_is_visible_immediately() {
        let engine = doom_engine();
        engine.update_query("hell");
        assert_eq!(engine.get_query().as_str(), "hell");
    }

    #[test]
    fn get_record_checks_bounds() {
        let engine = doom_engine();
        assert!(engine.get_record(0).is_some());
        assert!(engine.get_record(99).is_none());
    }

    #[test]
    fn completion_extends_the_trailing_word() {
        let engine = doom_engine();
        engine.update_query("hell do");
        engine.recompute("hell do");
        assert_eq!(engine.get_completion(), Some("hell DOOM".to_string()));
    }

    #[test]
    fn completion_takes_casing_from_first_candidate() {
        let engine = SearchEngine::new(vec![record("DOOM", "DOOM 1993 id Software")]);
        engine.update_query("do");
        engine.recompute("do");
        // Candidates are {"DOOM", "doom"}; the set orders "DOOM" first.
        assert_eq!(engine.get_completion(), Some("DOOM".to_string()));
    }

    #[test]
    fn completing_a_complete_word_returns_nothing() {
        let engine = SearchEngine::new(vec![record("DOOM", "DOOM 1993 id Software")]);
        engine.update_query("do");
        engine.recompute("do");
        let completed = engine.get_completion().unwrap();
        engine.update_query(&completed);
        engine.recompute(&completed);
        assert_eq!(engine.get_completion(), None);
    }

    #[test]
    fn completion_list_is_sorted_and_deduplicated() {
        let engine = doom_engine();
        engine.recompute("do");
        let completions = engine.get_completions();
        // Keys keep their casing, record words are lowercased, the set
        // both deduplicates across records and orders ascending.
        assert_eq!(
            *completions,
            vec!["DOOM".to_string(), "DOOM II".to_string(), "doom".to_string()]
        );
    }

    #[test]
    fn query_ending_in_space_offers_no_completion() {
        let engine = doom_engine();
        engine.update_query("doom ");
        engine.recompute("doom ");
        assert!(engine.get_completions().is_empty());
        assert_eq!(engine.get_completion(), None);
    }

    #[test]
    fn worker_publishes_results_and_posts_a_refresh() {
        let engine = Arc::new(doom_engine());
        let bus = Arc::new(CommandBus::new());
        let stop = Arc::new(AtomicBool::new(false));
        let handle = Arc::clone(&engine).start(Arc::clone(&bus), Arc::clone(&stop));

        engine.update_query("doom");
        let mut published = false;
        for _ in 0..100 {
            if !engine.get_results().is_empty() {
                published = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        assert!(published, "worker never published results");
        assert_eq!(
            bus.pop_timeout(Duration::from_millis(100)),
            Some(Command::RefreshDisplay {
                scroll_offset: 0,
                selected: None,
            })
        );
    }
}
