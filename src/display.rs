//! Viewport measurement and ANSI frame rendering.
//!
//! Every repaint rebuilds the whole frame into one buffer and writes it with
//! a single flush. The terminal is in raw mode for the whole session, so
//! frames use explicit `\r\n` line endings.

use std::{
    io::{self, Write},
    sync::Arc,
    time::{Duration, Instant},
};

use crossterm::terminal;
use tracing::error;

use crate::command::{DisplayState, ViewportMetrics, MIN_LINES_PER_RESULT};
use crate::engine::{ScoredMatch, SearchEngine};

const CLEAR_AND_HOME: &str = "\x1b[2J\x1b[H";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[96m";
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const GRAY: &str = "\x1b[90m";
const SELECTED_BG: &str = "\x1b[48;5;24m\x1b[97m";

const HEADER_LINES: u16 = 3;
const FOOTER_LINES: u16 = 3;
const MIN_VISIBLE_RESULTS: usize = 2;
const SEPARATOR_LEN: usize = 60;
const MAX_PREVIEW_CHARS: usize = 80;
const MAX_EXIT_INDEX: usize = 255;

const HEIGHT_CACHE_TTL: Duration = Duration::from_millis(500);

const HELP_LINE: &str =
    "↑/↓: Select | PgUp/PgDn: Scroll | Enter: Confirm | Tab: Complete | Esc: Cancel";

/// Derives how many result rows fit at the given terminal height. Reuses
/// `old` untouched while it is clean and the height is unchanged; degenerate
/// terminals are clamped to a two-row viewport rather than zero.
fn measure(old: &ViewportMetrics, current_height: u16) -> ViewportMetrics {
    if !old.dirty && old.terminal_height == current_height && current_height > 0 {
        return *old;
    }

    let mut metrics = ViewportMetrics {
        terminal_height: current_height,
        header_lines: HEADER_LINES,
        footer_lines: FOOTER_LINES,
        available_lines: 0,
        lines_per_result: MIN_LINES_PER_RESULT,
        max_visible_results: 0,
        dirty: false,
    };

    let min_space = MIN_VISIBLE_RESULTS as u16 * MIN_LINES_PER_RESULT;
    let used = HEADER_LINES + FOOTER_LINES;
    if current_height > used + min_space {
        metrics.available_lines = current_height - used;
        metrics.max_visible_results = usize::from(metrics.available_lines / MIN_LINES_PER_RESULT)
            .max(MIN_VISIBLE_RESULTS);
    } else {
        metrics.available_lines = min_space;
        metrics.max_visible_results = MIN_VISIBLE_RESULTS;
    }
    metrics
}

/// The completion hint with the already-typed prefix stripped, leaving only
/// the word the Tab key would produce.
fn hint_preview<'a>(query: &str, hint: &'a str) -> &'a str {
    match query.rfind(&[' ', '\t'][..]) {
        None => hint,
        Some(pos) => hint.get(pos + 1..).unwrap_or(""),
    }
}

fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

pub struct Display {
    engine: Arc<SearchEngine>,
    cached_height: u16,
    last_height_check: Option<Instant>,
}

impl Display {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self {
            engine,
            cached_height: 0,
            last_height_check: None,
        }
    }

    fn terminal_height_cached(&mut self) -> u16 {
        let stale = self
            .last_height_check
            .map_or(true, |at| at.elapsed() > HEIGHT_CACHE_TTL);
        if self.cached_height == 0 || stale {
            self.cached_height = terminal::size().map(|(_, rows)| rows).unwrap_or(0);
            self.last_height_check = Some(Instant::now());
        }
        self.cached_height
    }

    /// Repaints the viewport from the engine's current snapshots and stores
    /// the metrics used back into `state`.
    pub fn render(&mut self, state: &mut DisplayState) {
        let frame = self.build_frame(state);
        self.flush_frame(&frame);
    }

    fn build_frame(&mut self, state: &mut DisplayState) -> String {
        let query = self.engine.get_query();
        let results = self.engine.get_results();
        let completions = self.engine.get_completions();

        let mut frame = String::with_capacity(4096);
        frame.push_str(CLEAR_AND_HOME);
        self.push_header(&mut frame, &query, completions.len());

        let current_height = self.terminal_height_cached();
        let mut metrics = measure(&state.metrics, current_height);
        if state.last_terminal_height != current_height {
            state.last_terminal_height = current_height;
            state.metrics.dirty = true;
            metrics = measure(&state.metrics, current_height);
        }

        if results.is_empty() {
            if !query.is_empty() {
                frame.push_str("No matches found.\r\n");
            }
            state.metrics = metrics;
            return frame;
        }

        let display_count = metrics
            .max_visible_results
            .min(results.len().saturating_sub(state.scroll_offset));
        for i in 0..display_count {
            let idx = state.scroll_offset + i;
            let Some(result) = results.get(idx) else {
                break;
            };
            self.push_result(&mut frame, result, idx, state.selected == Some(idx));
        }
        self.push_footer(&mut frame, state.scroll_offset, display_count, results.len());

        state.metrics = metrics;
        frame
    }

    fn push_header(&self, frame: &mut String, query: &str, completion_count: usize) {
        frame.push_str(&format!(
            "{BOLD}{CYAN}Search: {RESET}{query}{CYAN}_{RESET}\r\n"
        ));

        if completion_count > 0 && !query.is_empty() {
            if let Some(hint) = self.engine.get_completion() {
                let preview = hint_preview(query, &hint);
                if !preview.is_empty() {
                    frame.push_str(&format!("{DIM}Tab: {RESET}{GREEN}{preview}{RESET}"));
                    if completion_count > 1 {
                        frame.push_str(&format!(
                            "{DIM} {RESET}{GRAY}({YELLOW}{completion_count} completions)"
                        ));
                    }
                    frame.push_str("\r\n");
                }
            }
        }

        frame.push_str(RESET);
        frame.push_str(GRAY);
        frame.push_str(&"=".repeat(SEPARATOR_LEN));
        frame.push_str("\r\n");
    }

    fn push_result(
        &self,
        frame: &mut String,
        result: &ScoredMatch,
        display_index: usize,
        selected: bool,
    ) {
        let Some(entry) = self.engine.get_record(result.index) else {
            return;
        };

        if selected {
            frame.push_str(SELECTED_BG);
        }
        frame.push(if selected { '>' } else { ' ' });
        frame.push_str(&format!("{BOLD}[{}] {RESET}", display_index + 1));
        if selected {
            frame.push_str(SELECTED_BG);
        }
        frame.push_str(&format!(
            "{}{DIM} (score: {}){RESET}\r\n    ",
            entry.key, result.score
        ));
        frame.push_str(&truncate_with_ellipsis(&entry.content, MAX_PREVIEW_CHARS));
        frame.push_str("\r\n\r\n");
    }

    fn push_footer(
        &self,
        frame: &mut String,
        scroll_offset: usize,
        display_count: usize,
        total: usize,
    ) {
        frame.push_str(RESET);
        frame.push_str("\r\n");
        frame.push_str(&format!(
            "{BOLD}{CYAN}Showing {}-{} of {} results{RESET}\r\n",
            scroll_offset + 1,
            scroll_offset + display_count,
            total
        ));
        frame.push_str(&format!("{DIM}{HELP_LINE}{RESET}\r\n"));
    }

    fn flush_frame(&self, frame: &str) {
        let mut out = io::stdout().lock();
        if let Err(err) = out.write_all(frame.as_bytes()).and_then(|()| out.flush()) {
            error!("display write failed: {err}");
        }
    }

    /// Prints the confirmation for a resolved selection and returns its exit
    /// code, `min(corpus index, 255)`. `None` when the index does not name a
    /// live result.
    pub fn select(&self, index: Option<usize>) -> Option<i32> {
        let results = self.engine.get_results();
        let result = results.get(index?)?;
        let entry = self.engine.get_record(result.index)?;

        let mut out = io::stdout().lock();
        if let Err(err) = write!(
            out,
            "\r\n\r\nSelected: {}\r\n{}\r\n",
            entry.key, entry.content
        )
        .and_then(|()| out.flush())
        {
            error!("selection write failed: {err}");
        }
        Some(result.index.min(MAX_EXIT_INDEX) as i32)
    }
}

#[cfg(test)]
impl Display {
    /// Fakes the measured terminal height so layout tests do not depend on
    /// the terminal the tests happen to run in.
    pub(crate) fn pin_height(&mut self, height: u16) {
        self.cached_height = height;
        self.last_height_check = Some(Instant::now());
    }
}
