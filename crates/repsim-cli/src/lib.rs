//! Command-file front end for the repsim engine.
//!
//! Parses the textual command surface, dispatches to the engine, and
//! renders the engine's notices one line at a time.

use std::io::{self, BufRead, Write};

use repsim_engine::{Notice, TransactionManager};

pub mod command;

pub use command::{parse_line, Command, ParseError};

/// One interactive engine plus the dispatch glue.
#[derive(Debug, Default)]
pub struct Session {
    engine: TransactionManager,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            engine: TransactionManager::new(),
        }
    }

    /// The engine behind this session.
    #[must_use]
    pub const fn engine(&self) -> &TransactionManager {
        &self.engine
    }

    /// Execute one parsed command.
    pub fn apply(&mut self, command: &Command) -> Vec<Notice> {
        match command {
            Command::Begin { txn } => self.engine.begin(txn, false),
            Command::BeginRo { txn } => self.engine.begin(txn, true),
            Command::Read { txn, var } => self.engine.read(txn, var),
            Command::Write { txn, var, value } => self.engine.write(txn, var, *value),
            Command::End { txn } => self.engine.end(txn),
            Command::Fail { site } => self.engine.fail_site(*site),
            Command::Recover { site } => self.engine.recover_site(*site),
            Command::Dump => self.engine.dump(),
        }
    }

    /// Execute a whole script and collect the rendered output lines.
    /// Unparseable lines are reported on stderr and skipped, like the
    /// interactive loop does.
    pub fn run_script(&mut self, script: &str) -> Vec<String> {
        let mut lines = Vec::new();
        for line in script.lines() {
            match parse_line(line) {
                Ok(Some(command)) => {
                    lines.extend(self.apply(&command).iter().map(ToString::to_string));
                }
                Ok(None) => {}
                Err(err) => eprintln!("{err}"),
            }
        }
        lines
    }
}

/// Drive a full session from `reader` to `writer`, one command per line.
pub fn run(reader: impl BufRead, mut writer: impl Write) -> io::Result<()> {
    let mut session = Session::new();
    for line in reader.lines() {
        let line = line?;
        match parse_line(&line) {
            Ok(Some(command)) => {
                for notice in session.apply(&command) {
                    writeln!(writer, "{notice}")?;
                }
            }
            Ok(None) => {}
            Err(err) => eprintln!("{err}"),
        }
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_renders_notices_per_line() {
        let script = b"begin(T1)\nW(T1,x2,22)\nend(T1)\n" as &[u8];
        let mut out = Vec::new();
        run(script, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            [
                "Transaction T1 started.",
                "Write of 22 to x2 buffered for transaction T1",
                "T1 committed."
            ]
        );
    }

    #[test]
    fn test_comments_and_blanks_produce_nothing() {
        let script = b"// header\n\n/ note\n" as &[u8];
        let mut out = Vec::new();
        run(script, &mut out).unwrap();
        assert!(out.is_empty());
    }
}
