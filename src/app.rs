//! Session orchestration: one input poller, one scoring worker, one
//! dispatcher that owns all mutable view state.

use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::Result;
use tracing::error;

use crate::{
    bus::CommandBus,
    command::{Command, DisplayState, ScrollDirection},
    display::Display,
    engine::{Record, SearchEngine},
    input::InputReader,
};

const IO_TICK: Duration = Duration::from_millis(50);

/// Consumes the bus and folds commands into the display state. Runs on its
/// own thread as the only writer of that state.
struct Dispatcher {
    engine: Arc<SearchEngine>,
    bus: Arc<CommandBus<Command>>,
    running: Arc<AtomicBool>,
    exit_code: Arc<AtomicI32>,
    display: Display,
    state: DisplayState,
}

impl Dispatcher {
    fn run(&mut self) {
        while self.running.load(Ordering::Acquire) {
            let Some(command) = self.bus.pop_timeout(IO_TICK) else {
                if self.bus.is_shut_down() {
                    break;
                }
                continue;
            };
            self.dispatch(command);
        }
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::RefreshDisplay {
                scroll_offset,
                selected,
            } => {
                self.state.scroll_offset = scroll_offset;
                self.state.selected = selected;
                self.state.metrics.dirty = true;
                self.display.render(&mut self.state);
            }
            Command::UpdateQuery(query) => self.engine.update_query(&query),
            Command::MoveSelection(delta) => self.handle_move(delta),
            Command::PageScroll(direction) => self.handle_page_scroll(direction),
            Command::SelectResult(index) => self.handle_select(index),
            Command::Exit(code) => self.finish(code),
        }
    }

    fn handle_move(&mut self, delta: i32) {
        let results = self.engine.get_results();
        if results.is_empty() {
            return;
        }
        let last = results.len() - 1;
        let selected = match self.state.selected {
            None => 0,
            Some(current) => {
                let moved = current as i64 + i64::from(delta);
                moved.clamp(0, last as i64) as usize
            }
        };
        self.state.selected = Some(selected);

        let max_visible = self.state.metrics.max_visible_results;
        if max_visible > 0 {
            self.scroll_into_view(selected, max_visible);
        }
        self.display.render(&mut self.state);
    }

    fn handle_page_scroll(&mut self, direction: ScrollDirection) {
        let results = self.engine.get_results();
        if results.is_empty() {
            return;
        }
        let max_visible = self.state.metrics.max_visible_results;
        if max_visible == 0 {
            return;
        }

        // An unset selection pages as if it sat just above the first row.
        let page = max_visible.saturating_sub(1).max(1) as i64;
        let current = self.state.selected.map_or(-1, |s| s as i64);
        let target = match direction {
            ScrollDirection::Up => (current - page).max(0),
            ScrollDirection::Down => (current + page).min(results.len() as i64 - 1),
        };
        let selected = target as usize;
        self.state.selected = Some(selected);
        self.scroll_into_view(selected, max_visible);
        self.display.render(&mut self.state);
    }

    fn handle_select(&mut self, index: Option<usize>) {
        let results = self.engine.get_results();

        let target = match index {
            Some(explicit) => Some(explicit),
            None => match self.state.selected {
                Some(current) => Some(current),
                None if results.len() == 1 => Some(0),
                None if results.len() > 1 => {
                    // First Enter highlights the top row; the next confirms.
                    self.state.selected = Some(0);
                    self.display.render(&mut self.state);
                    return;
                }
                None => None,
            },
        };

        if let Some(code) = self.display.select(target) {
            self.finish(code);
        }
    }

    /// Minimal scroll that keeps the selection inside the window.
    fn scroll_into_view(&mut self, selected: usize, max_visible: usize) {
        if selected < self.state.scroll_offset {
            self.state.scroll_offset = selected;
        } else if selected >= self.state.scroll_offset + max_visible {
            self.state.scroll_offset = selected - max_visible + 1;
        }
    }

    fn finish(&mut self, code: i32) {
        self.exit_code.store(code, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }
}

pub struct App {
    engine: Arc<SearchEngine>,
    bus: Arc<CommandBus<Command>>,
    running: Arc<AtomicBool>,
    exit_code: Arc<AtomicI32>,
    stop_search: Arc<AtomicBool>,
}

impl App {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            engine: Arc::new(SearchEngine::new(records)),
            bus: Arc::new(CommandBus::new()),
            running: Arc::new(AtomicBool::new(true)),
            exit_code: Arc::new(AtomicI32::new(0)),
            stop_search: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the interactive session to completion. Returns 0 for a
    /// cancelled session, otherwise the selected record's corpus position
    /// clamped to 255.
    pub fn run(self) -> Result<i32> {
        let mut input = InputReader::open()?;
        clear_screen();
        self.engine.update_query("");

        let worker = Arc::clone(&self.engine)
            .start(Arc::clone(&self.bus), Arc::clone(&self.stop_search));
        let dispatcher = {
            let mut dispatcher = Dispatcher {
                engine: Arc::clone(&self.engine),
                bus: Arc::clone(&self.bus),
                running: Arc::clone(&self.running),
                exit_code: Arc::clone(&self.exit_code),
                display: Display::new(Arc::clone(&self.engine)),
                state: DisplayState::default(),
            };
            thread::spawn(move || dispatcher.run())
        };

        while self.running.load(Ordering::Acquire) {
            if let Some(command) = input.poll(&self.engine) {
                self.bus.push(command);
            }
            thread::sleep(IO_TICK);
        }

        self.bus.shutdown();
        self.stop_search.store(true, Ordering::Release);
        if worker.join().is_err() {
            error!("search worker panicked");
        }
        if dispatcher.join().is_err() {
            error!("dispatcher panicked");
        }
        drop(input); // cooked mode back before the goodbye line

        let code = self.exit_code.load(Ordering::Acquire);
        if code == 0 {
            println!("\n\nSearch terminated.");
        } else {
            println!("\n\nSearch completed.");
        }
        Ok(code)
    }
}

fn clear_screen() {
    let mut out = io::stdout().lock();
    let _ = out.write_all(b"\x1b[2J\x1b[H");
    let _ = out.flush();
}
