//! Line-oriented console I/O used by the console prompter.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[cfg(unix)]
use log::*;
#[cfg(unix)]
use nix::sys::termios::{self, SetArg, Termios};

/// Blocking console operations. `Ok(None)` means end of input.
pub trait Terminal: Send + Sync + 'static {
    fn write_line(&self, line: &str) -> io::Result<()>;

    fn read_line(&self, prompt: &str) -> io::Result<Option<String>>;

    /// Read a value without echoing it.
    fn read_secret(&self, prompt: &str) -> io::Result<Option<String>>;

    /// Put back the terminal mode an abandoned `read_secret` changed.
    fn restore(&self) {}
}

/// Prompts on stderr so stdout stays clean for response bodies; reads stdin.
#[derive(Debug, Default)]
pub struct StdTerminal {
    /// Mode of the controlling tty while a secret read has echo turned off.
    #[cfg(unix)]
    saved_mode: Mutex<Option<Termios>>,
}

impl StdTerminal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(unix)]
impl StdTerminal {
    fn saved_mode(&self) -> std::sync::MutexGuard<'_, Option<Termios>> {
        self.saved_mode
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save_mode(&self) {
        let mode = std::fs::File::open("/dev/tty")
            .ok()
            .and_then(|tty| termios::tcgetattr(&tty).ok());
        *self.saved_mode() = mode;
    }

    fn restore_mode(&self) {
        let Some(mode) = self.saved_mode().take() else {
            return;
        };
        let restored = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/tty")
            .map_err(|e| e.to_string())
            .and_then(|tty| {
                termios::tcsetattr(&tty, SetArg::TCSANOW, &mode).map_err(|e| e.to_string())
            });
        match restored {
            Ok(()) => debug!("Restored terminal mode after an interrupted secret read"),
            Err(e) => warn!("Failed to restore terminal mode: {}", e),
        }
    }
}

impl Terminal for StdTerminal {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{line}")
    }

    fn read_line(&self, prompt: &str) -> io::Result<Option<String>> {
        {
            let mut stderr = io::stderr().lock();
            write!(stderr, "{prompt}")?;
            stderr.flush()?;
        }
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn read_secret(&self, prompt: &str) -> io::Result<Option<String>> {
        #[cfg(unix)]
        self.save_mode();
        let read = rpassword::prompt_password(prompt);
        #[cfg(unix)]
        self.saved_mode().take();

        match read {
            Ok(secret) => Ok(Some(secret)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn restore(&self) {
        #[cfg(unix)]
        self.restore_mode();
    }
}

/// Answers from a queue and records everything shown, for automation and tests.
///
/// Secret prompts are recorded by prompt text only.
#[derive(Debug, Default)]
pub struct ScriptedTerminal {
    answers: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<String>>,
    restores: AtomicUsize,
}

impl ScriptedTerminal {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            transcript: Mutex::new(Vec::new()),
            restores: AtomicUsize::new(0),
        }
    }

    /// How many times an interrupted prompt asked for the terminal to be restored.
    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }

    /// Everything written or prompted so far.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn remaining_answers(&self) -> usize {
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn record(&self, line: &str) {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
    }

    fn next_answer(&self) -> Option<String> {
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }
}

impl Terminal for ScriptedTerminal {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.record(line);
        Ok(())
    }

    fn read_line(&self, prompt: &str) -> io::Result<Option<String>> {
        self.record(prompt);
        Ok(self.next_answer())
    }

    fn read_secret(&self, prompt: &str) -> io::Result<Option<String>> {
        self.record(prompt);
        Ok(self.next_answer())
    }

    fn restore(&self) {
        self.restores.fetch_add(1, Ordering::SeqCst);
    }
}
