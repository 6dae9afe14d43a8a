//! Script loading and statement parsing
//!
//! Each line is parsed once into a [`Statement`]. Function-call forms are
//! split into a command name and an argument string, then dispatched through
//! a table keyed on the exact name, so adding a command cannot shadow another.

use crate::eval::{parse_int, Condition};
use crate::ScriptError;

const TRIM_CHARS: &[char] = &[' ', '\t', '\r', '\n'];

/// Host-facing command invoked by a script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    WsConnect { url: String },
    WsSend { message: String },
    WsReceive,
    WsDisconnect,
    SetVar { key: String, value: String },
    GetVar { key: String },
    Sleep { ms: u64 },
}

/// One parsed script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    While(Condition),
    End,
    If(Condition),
    Else,
    Call(Command),
    Increment(String),
    /// `name := expr`; a non-numeric right-hand side assigns nothing
    Assign { name: String, value: Option<i64> },
    /// Raises the error when executed in an active block
    Fail(ScriptError),
    Nop,
}

/// An executable line of a script
#[derive(Debug, Clone)]
pub struct Line {
    /// 1-based position among executable lines
    pub number: usize,
    /// 1-based line number in the script file
    pub source_line: usize,
    pub text: String,
    pub statement: Statement,
}

/// A loaded script: trimmed, non-empty, non-comment lines
#[derive(Debug, Clone, Default)]
pub struct Program {
    lines: Vec<Line>,
    /// For each `while`/`if` line, the index of its matching `end`
    ends: Vec<Option<usize>>,
}

impl Program {
    pub fn parse(source: &str) -> Self {
        let lines: Vec<Line> = source
            .split('\n')
            .enumerate()
            .map(|(idx, raw)| (idx + 1, raw.trim_matches(TRIM_CHARS)))
            .filter(|(_, text)| !text.is_empty() && !text.starts_with(';'))
            .enumerate()
            .map(|(pos, (source_line, text))| Line {
                number: pos + 1,
                source_line,
                text: text.to_string(),
                statement: parse_statement(text),
            })
            .collect();

        let mut ends = vec![None; lines.len()];
        let mut open = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            match line.statement {
                Statement::While(_) | Statement::If(_) => open.push(idx),
                Statement::End => {
                    if let Some(start) = open.pop() {
                        ends[start] = Some(idx);
                    }
                }
                _ => {}
            }
        }

        Self { lines, ends }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn get(&self, pc: usize) -> Option<&Line> {
        self.lines.get(pc)
    }

    /// Index of the `end` closing the block opened at `pc`
    pub fn matching_end(&self, pc: usize) -> Option<usize> {
        self.ends.get(pc).copied().flatten()
    }

    /// Lines that fail unconditionally when reached in an active block
    pub fn failing_lines(&self) -> impl Iterator<Item = (&Line, &ScriptError)> {
        self.lines.iter().filter_map(|line| match &line.statement {
            Statement::Fail(err) => Some((line, err)),
            _ => None,
        })
    }
}

/// Parse a single trimmed line
pub fn parse_statement(line: &str) -> Statement {
    if let Some(cond) = line.strip_prefix("while ") {
        return Statement::While(Condition::parse(cond));
    }
    if line == "end" {
        return Statement::End;
    }
    if let Some(cond) = line.strip_prefix("if ") {
        return Statement::If(Condition::parse(cond));
    }
    if line == "else" {
        return Statement::Else;
    }

    if let Some((name, args)) = split_call(line) {
        if let Some((_, build)) = COMMANDS.iter().find(|(n, _)| *n == name) {
            return build(args, line);
        }
    }

    if line.len() >= 3 && line.ends_with("++") {
        let name = line[..line.len() - 2].trim_matches(TRIM_CHARS);
        return Statement::Increment(name.to_string());
    }

    if let Some((name, rhs)) = line.split_once(":=") {
        return Statement::Assign {
            name: name.trim_matches(TRIM_CHARS).to_string(),
            value: parse_int(rhs.trim_matches(TRIM_CHARS)),
        };
    }

    if line.contains('(') && line.ends_with(')') {
        return Statement::Fail(ScriptError::UnsupportedFunction(line.to_string()));
    }

    Statement::Nop
}

/// Split `Name(args)` into the name and the raw argument text
fn split_call(line: &str) -> Option<(&str, &str)> {
    let inner = line.strip_suffix(')')?;
    let open = inner.find('(')?;
    Some((&inner[..open], &inner[open + 1..]))
}

/// Strip one pair of matching single or double quotes
pub fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &text[1..text.len() - 1];
        }
    }
    text
}

fn single_arg(args: &str) -> String {
    unquote(args.trim_matches(TRIM_CHARS)).to_string()
}

fn key_value(args: &str) -> Option<(String, String)> {
    let (key, value) = args.split_once(',')?;
    Some((single_arg(key), single_arg(value)))
}

type Builder = fn(&str, &str) -> Statement;

const COMMANDS: &[(&str, Builder)] = &[
    ("WebSocketConnect", |args, _| {
        Statement::Call(Command::WsConnect { url: single_arg(args) })
    }),
    ("WebSocketSend", |args, _| {
        Statement::Call(Command::WsSend { message: single_arg(args) })
    }),
    ("WebSocketReceive", |args, line| no_args(args, line, Command::WsReceive)),
    ("WebSocketDisconnect", |args, line| no_args(args, line, Command::WsDisconnect)),
    ("ThreadSetVar", |args, _| match key_value(args) {
        Some((key, value)) => Statement::Call(Command::SetVar { key, value }),
        None => Statement::Fail(ScriptError::MissingArgument("ThreadSetVar")),
    }),
    ("ThreadGetVar", |args, _| {
        Statement::Call(Command::GetVar { key: single_arg(args) })
    }),
    ("Sleep", |args, _| {
        let ms = parse_int(args.trim_matches(TRIM_CHARS)).unwrap_or(0).max(0);
        Statement::Call(Command::Sleep { ms: ms.unsigned_abs() })
    }),
    ("SetVar", |args, _| match key_value(args) {
        Some((key, value)) => Statement::Call(Command::SetVar { key, value }),
        None => Statement::Nop,
    }),
];

/// Zero-argument commands only match their exact `Name()` spelling
fn no_args(args: &str, line: &str, command: Command) -> Statement {
    if args.is_empty() {
        Statement::Call(command)
    } else {
        Statement::Fail(ScriptError::UnsupportedFunction(line.to_string()))
    }
}
