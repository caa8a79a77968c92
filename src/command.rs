//! Messages exchanged between the input poller, the scoring worker and the
//! dispatcher, plus the view state the dispatcher owns.

pub const MIN_LINES_PER_RESULT: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Adopt fresh results: reset the viewport and repaint.
    RefreshDisplay {
        scroll_offset: usize,
        selected: Option<usize>,
    },
    UpdateQuery(String),
    /// Move the selection by a signed delta, clamped to the result list.
    MoveSelection(i32),
    PageScroll(ScrollDirection),
    /// Confirm a result; `None` means whatever is currently selected.
    SelectResult(Option<usize>),
    Exit(i32),
}

/// Layout derived from the terminal height. Carried inside [`DisplayState`]
/// and recomputed only when `dirty` or the height changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportMetrics {
    pub terminal_height: u16,
    pub header_lines: u16,
    pub footer_lines: u16,
    pub available_lines: u16,
    pub lines_per_result: u16,
    pub max_visible_results: usize,
    pub dirty: bool,
}

impl Default for ViewportMetrics {
    fn default() -> Self {
        Self {
            terminal_height: 0,
            header_lines: 0,
            footer_lines: 0,
            available_lines: 0,
            lines_per_result: MIN_LINES_PER_RESULT,
            max_visible_results: 0,
            dirty: true,
        }
    }
}

/// Mutable session view state. Written only by the dispatcher thread.
#[derive(Debug, Clone, Default)]
pub struct DisplayState {
    pub scroll_offset: usize,
    pub selected: Option<usize>,
    pub metrics: ViewportMetrics,
    pub last_terminal_height: u16,
}
