//! The textual command surface.
//!
//! One command per line, `name(arg, ...)` form. Blank lines and comment
//! lines starting with `/` are skipped.

use thiserror::Error;

/// A parsed simulator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Begin { txn: String },
    BeginRo { txn: String },
    Read { txn: String, var: String },
    Write { txn: String, var: String, value: i64 },
    End { txn: String },
    Fail { site: u64 },
    Recover { site: u64 },
    Dump,
}

/// Why a line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed arguments in '{0}'")]
    BadArguments(String),
    #[error("expected an integer in '{0}'")]
    BadInteger(String),
}

/// Parse one input line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('/') {
        return Ok(None);
    }

    let (head, args) = split_call(line).ok_or_else(|| ParseError::UnknownCommand(line.to_owned()))?;
    let command = match (head, args.as_slice()) {
        ("begin", [txn]) => Command::Begin { txn: txn.clone() },
        ("beginRO", [txn]) => Command::BeginRo { txn: txn.clone() },
        ("R", [txn, var]) => Command::Read {
            txn: txn.clone(),
            var: var.clone(),
        },
        ("W", [txn, var, value]) => Command::Write {
            txn: txn.clone(),
            var: var.clone(),
            value: value
                .parse()
                .map_err(|_| ParseError::BadInteger(line.to_owned()))?,
        },
        ("end", [txn]) => Command::End { txn: txn.clone() },
        ("fail", [site]) => Command::Fail {
            site: site
                .parse()
                .map_err(|_| ParseError::BadInteger(line.to_owned()))?,
        },
        ("recover", [site]) => Command::Recover {
            site: site
                .parse()
                .map_err(|_| ParseError::BadInteger(line.to_owned()))?,
        },
        ("dump", []) => Command::Dump,
        ("begin" | "beginRO" | "R" | "W" | "end" | "fail" | "recover" | "dump", _) => {
            return Err(ParseError::BadArguments(line.to_owned()))
        }
        _ => return Err(ParseError::UnknownCommand(line.to_owned())),
    };
    Ok(Some(command))
}

/// Split `name(a, b)` into the name and trimmed argument list. An empty
/// parenthesis pair yields no arguments.
fn split_call(line: &str) -> Option<(&str, Vec<String>)> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if close < open || !line[close + 1..].trim().is_empty() {
        return None;
    }
    let head = line[..open].trim();
    let body = line[open + 1..close].trim();
    let args = if body.is_empty() {
        Vec::new()
    } else {
        body.split(',').map(|arg| arg.trim().to_owned()).collect()
    };
    Some((head, args))
}
