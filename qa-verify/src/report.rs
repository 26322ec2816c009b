use std::io::{self, Write};

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Pass,
    Fail,
    Info,
}

impl Mark {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mark::Pass => "[PASS]",
            Mark::Fail => "[FAIL]",
            Mark::Info => "[?]",
        }
    }
}

/// Line-oriented run log: one marker-prefixed line per event.
pub struct Reporter {
    out: Box<dyn Write + Send>,
    passed: usize,
    failed: usize,
    write_failed: bool,
}

impl Reporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            passed: 0,
            failed: 0,
            write_failed: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn log(&mut self, mark: Mark, message: impl AsRef<str>) {
        match mark {
            Mark::Pass => self.passed += 1,
            Mark::Fail => self.failed += 1,
            Mark::Info => {}
        }
        let written = writeln!(self.out, "{} {}", mark.as_str(), message.as_ref())
            .and_then(|()| self.out.flush());
        if let Err(err) = written {
            // Warn once; the tallies keep counting either way.
            if !self.write_failed {
                self.write_failed = true;
                warn!(error = %err, "failed to write run log");
            }
        }
    }

    /// True once a marker line could not be written.
    pub fn write_failed(&self) -> bool {
        self.write_failed
    }

    pub fn pass(&mut self, message: impl AsRef<str>) {
        self.log(Mark::Pass, message);
    }

    pub fn fail(&mut self, message: impl AsRef<str>) {
        self.log(Mark::Fail, message);
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.log(Mark::Info, message);
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}
