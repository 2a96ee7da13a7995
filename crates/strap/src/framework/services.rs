//! Built-in services wired by [`super::bootstrap`]

use std::{
    cell::RefCell,
    io::{self, IsTerminal, Write},
};

use colored::Colorize;
use indexmap::IndexMap;

use super::Value;

/// A parsed command line: `<command> [--name=value | --flag | positional]...`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    command: Option<String>,
    named: IndexMap<String, Value>,
    positional: Vec<Value>,
}

impl Request {
    pub fn from_env() -> Self {
        Self::from_args(std::env::args().skip(1))
    }

    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut request = Self::default();
        let mut only_positional = false;

        for arg in args {
            let arg = arg.as_ref();
            if only_positional || !arg.starts_with("--") {
                if request.command.is_none() {
                    request.command = Some(arg.to_owned());
                } else {
                    request.positional.push(Value::parse(arg));
                }
                continue;
            }

            let option = &arg[2..];
            if option.is_empty() {
                only_positional = true;
            } else if let Some((name, value)) = option.split_once('=') {
                request.named.insert(name.to_owned(), Value::parse(value));
            } else if let Some(name) = option.strip_prefix("no-") {
                request.named.insert(name.to_owned(), Value::Bool(false));
            } else {
                request.named.insert(option.to_owned(), Value::Bool(true));
            }
        }

        request
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn named(&self) -> &IndexMap<String, Value> {
        &self.named
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }
}

enum Sink {
    Stdout,
    Buffer(Vec<u8>),
}

/// Output channel for command results
pub struct Response {
    sink: RefCell<Sink>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &*self.sink.borrow() {
            Sink::Stdout => "stdout",
            Sink::Buffer(_) => "buffer",
        };
        f.debug_struct("Response").field("sink", &kind).finish()
    }
}

impl Response {
    pub fn stdout() -> Self {
        Self {
            sink: RefCell::new(Sink::Stdout),
        }
    }

    /// A response that collects output in memory
    pub fn buffered() -> Self {
        Self {
            sink: RefCell::new(Sink::Buffer(Vec::new())),
        }
    }

    pub fn write_line(&self, line: &str) -> io::Result<()> {
        match &mut *self.sink.borrow_mut() {
            Sink::Stdout => writeln!(io::stdout().lock(), "{line}"),
            Sink::Buffer(buffer) => writeln!(buffer, "{line}"),
        }
    }

    /// Buffered output so far; empty for stdout responses
    pub fn contents(&self) -> String {
        match &*self.sink.borrow() {
            Sink::Stdout => String::new(),
            Sink::Buffer(buffer) => String::from_utf8_lossy(buffer).into_owned(),
        }
    }
}

/// ANSI styling that can be switched off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    enabled: bool,
}

impl Style {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Parse `always`, `never` or `auto` (color only when stdout is a terminal)
    pub fn from_mode(mode: &str) -> anyhow::Result<Self> {
        match mode {
            "always" => Ok(Self::new(true)),
            "never" => Ok(Self::new(false)),
            "auto" => Ok(Self::new(io::stdout().is_terminal())),
            other => anyhow::bail!("unknown color mode `{other}`"),
        }
    }

    pub fn is_enabled(self) -> bool {
        self.enabled
    }

    pub fn heading(self, text: &str) -> String {
        self.paint(text, |t| t.bold().yellow().to_string())
    }

    pub fn name(self, text: &str) -> String {
        self.paint(text, |t| t.green().to_string())
    }

    pub fn error(self, text: &str) -> String {
        self.paint(text, |t| t.red().bold().to_string())
    }

    pub fn muted(self, text: &str) -> String {
        self.paint(text, |t| t.dimmed().to_string())
    }

    fn paint(self, text: &str, paint: impl FnOnce(&str) -> String) -> String {
        if self.enabled {
            paint(text)
        } else {
            text.to_owned()
        }
    }
}

/// A parsed doc comment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocBlock {
    pub summary: String,
    pub body: String,
    /// `@tag value` lines in order
    pub tags: Vec<(String, String)>,
}

/// Turns `/** ... */` comments into help text
#[derive(Debug, Clone, Copy, Default)]
pub struct DocParser;

impl DocParser {
    pub fn parse(self, comment: &str) -> DocBlock {
        let inner = comment.trim();
        let inner = inner.strip_prefix("/**").unwrap_or(inner);
        let inner = inner.strip_suffix("*/").unwrap_or(inner);

        let mut block = DocBlock::default();
        let mut paragraphs: Vec<Vec<&str>> = vec![Vec::new()];
        for line in inner.lines() {
            let line = line.trim();
            let line = line.strip_prefix('*').map_or(line, str::trim_start).trim_end();
            if let Some(tag) = line.strip_prefix('@') {
                let (name, value) = tag.split_once(char::is_whitespace).unwrap_or((tag, ""));
                block.tags.push((name.to_owned(), value.trim().to_owned()));
            } else if line.is_empty() {
                if paragraphs.last().is_some_and(|p| !p.is_empty()) {
                    paragraphs.push(Vec::new());
                }
            } else if let Some(paragraph) = paragraphs.last_mut() {
                paragraph.push(line);
            }
        }

        let mut paragraphs = paragraphs.into_iter().filter(|p| !p.is_empty());
        if let Some(first) = paragraphs.next() {
            block.summary = first.join(" ");
        }
        block.body = paragraphs
            .map(|p| p.join(" "))
            .collect::<Vec<_>>()
            .join("\n\n");
        block
    }
}
