//! Raw-terminal keyboard input.
//!
//! Bytes are read straight off stdin and decoded by hand: printables edit
//! the query, control bytes map to session commands and escape sequences go
//! through a small state machine. A lone Esc is only distinguishable from
//! the start of a CSI sequence by waiting, so each continuation byte gets a
//! short timeout; the split is best effort by nature.

use std::{mem, ptr, time::Duration};

use anyhow::{Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::command::{Command, ScrollDirection};
use crate::engine::SearchEngine;

const CTRL_C: u8 = 0x03;
const TAB: u8 = 0x09;
const CTRL_H: u8 = 0x08;
const BACKSPACE: u8 = 0x7F;
const ESC: u8 = 0x1B;

/// How long to wait for each escape-sequence continuation byte.
const BYTE_TIMEOUT: Duration = Duration::from_millis(10);

/// Byte-level access to the keyboard, separable from the real terminal.
pub trait ByteSource {
    /// Next byte if one is already pending.
    fn poll_byte(&mut self) -> Option<u8>;
    /// Next byte, waiting at most `timeout` for it.
    fn read_byte_timeout(&mut self, timeout: Duration) -> Option<u8>;
    /// Drops whatever is typed ahead. Collapses key-repeat bursts into one
    /// decoded step.
    fn discard_pending(&mut self);
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Stdin in raw mode for the lifetime of the value.
pub struct TtyInput {
    _raw: RawModeGuard,
}

impl TtyInput {
    pub fn open() -> Result<Self> {
        enable_raw_mode().context("cannot put the terminal into raw mode")?;
        Ok(Self {
            _raw: RawModeGuard,
        })
    }
}

fn stdin_ready(timeout: Duration) -> bool {
    let mut fds: libc::fd_set = unsafe { mem::zeroed() };
    unsafe {
        libc::FD_ZERO(&mut fds);
        libc::FD_SET(libc::STDIN_FILENO, &mut fds);
    }
    let mut tv = libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    let ready = unsafe {
        libc::select(
            libc::STDIN_FILENO + 1,
            &mut fds,
            ptr::null_mut(),
            ptr::null_mut(),
            &mut tv,
        )
    };
    ready > 0
}

fn read_stdin_byte() -> Option<u8> {
    let mut byte = 0u8;
    let n = unsafe {
        libc::read(
            libc::STDIN_FILENO,
            &mut byte as *mut u8 as *mut libc::c_void,
            1,
        )
    };
    (n == 1).then_some(byte)
}

impl ByteSource for TtyInput {
    fn poll_byte(&mut self) -> Option<u8> {
        stdin_ready(Duration::ZERO).then(read_stdin_byte).flatten()
    }

    fn read_byte_timeout(&mut self, timeout: Duration) -> Option<u8> {
        stdin_ready(timeout).then(read_stdin_byte).flatten()
    }

    fn discard_pending(&mut self) {
        unsafe {
            libc::tcflush(libc::STDIN_FILENO, libc::TCIFLUSH);
        }
    }
}

/// Decodes keyboard bytes into commands. Owns the editable query text; the
/// engine is consulted only when Tab asks for a completion.
pub struct InputReader<S: ByteSource = TtyInput> {
    source: S,
    query: String,
}

impl InputReader<TtyInput> {
    /// Opens stdin in raw mode for the life of the reader.
    pub fn open() -> Result<Self> {
        Ok(Self::with_source(TtyInput::open()?))
    }
}

impl<S: ByteSource> InputReader<S> {
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            query: String::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Non-blocking poll for one decoded command. `None` when no byte is
    /// pending or the pending bytes decode to nothing.
    pub fn poll(&mut self, engine: &SearchEngine) -> Option<Command> {
        let byte = self.source.poll_byte()?;
        match byte {
            CTRL_C => Some(Command::Exit(0)),
            TAB => {
                let completion = engine.get_completion()?;
                self.query = completion;
                Some(Command::UpdateQuery(self.query.clone()))
            }
            BACKSPACE | CTRL_H => self
                .query
                .pop()
                .map(|_| Command::UpdateQuery(self.query.clone())),
            b'\r' | b'\n' => Some(Command::SelectResult(None)),
            ESC => self.decode_escape(),
            0x20..=0x7E => {
                self.query.push(char::from(byte));
                Some(Command::UpdateQuery(self.query.clone()))
            }
            _ => None,
        }
    }

    /// After a lone Esc nothing else arrives, which means cancel. Everything
    /// else is a CSI sequence; once its introducer is consumed the pending
    /// input is flushed whether or not the sequence was recognized.
    fn decode_escape(&mut self) -> Option<Command> {
        let Some(second) = self.source.read_byte_timeout(BYTE_TIMEOUT) else {
            return Some(Command::Exit(0));
        };
        if second != b'[' {
            self.source.discard_pending();
            return None;
        }
        let Some(third) = self.source.read_byte_timeout(BYTE_TIMEOUT) else {
            self.source.discard_pending();
            return None;
        };
        let command = match third {
            b'A' => Some(Command::MoveSelection(-1)),
            b'B' => Some(Command::MoveSelection(1)),
            b'5' | b'6' => {
                let closing = self.source.read_byte_timeout(BYTE_TIMEOUT);
                (closing == Some(b'~')).then(|| {
                    if third == b'5' {
                        Command::PageScroll(ScrollDirection::Up)
                    } else {
                        Command::PageScroll(ScrollDirection::Down)
                    }
                })
            }
            _ => None,
        };
        self.source.discard_pending();
        command
    }
}
