//! Load statement neutralization
//!
//! When several script files are concatenated into one bundle, a literal
//! `require 'x.php'` left in place would load `x.php` a second time and
//! redeclare its symbols. This module walks the token stream of a file with a
//! two-state machine and disables every load statement whose target is
//! statically known, while statements whose target depends on a run-time value
//! are left executable and byte-identical.

use std::{borrow::Cow, ops::Range};

use cow_utils::CowUtils;
use indexmap::IndexSet;
use log::trace;
use thiserror::Error;

use crate::tokenizer::{Token, TokenKind, tokenize, tokenize_code};

/// Replacement expression emitted after a disabled load statement
const NO_OP: &str = "null";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadKind {
    Include,
    IncludeOnce,
    Require,
    RequireOnce,
}

impl LoadKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "include" => Some(Self::Include),
            "include_once" => Some(Self::IncludeOnce),
            "require" => Some(Self::Require),
            "require_once" => Some(Self::RequireOnce),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::IncludeOnce => "include_once",
            Self::Require => "require",
            Self::RequireOnce => "require_once",
        }
    }

    /// `require` variants abort the script when their target is missing
    pub fn is_required(self) -> bool {
        matches!(self, Self::Require | Self::RequireOnce)
    }
}

impl std::fmt::Display for LoadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A load statement found in a token stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStatement {
    pub kind: LoadKind,
    /// Byte span from the keyword up to and including the terminator
    pub span: Range<usize>,
    /// Raw text of the target expression, between keyword and terminator
    pub expression: String,
    /// Target expression trimmed of quotes, parentheses and newlines
    pub target: String,
    pub is_dynamic: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NeutralizeError {
    #[error("unterminated `{keyword}` statement starting at byte {offset}")]
    MalformedSource { keyword: LoadKind, offset: usize },
}

/// Result of neutralizing a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neutralized {
    pub source: String,
    /// Deduplicated load targets in order of first appearance
    pub targets: Vec<String>,
    pub statements: Vec<LoadStatement>,
}

#[derive(Debug, Clone, Copy)]
struct OpenStatement {
    kind: LoadKind,
    /// Token index of the load keyword
    start: usize,
    is_dynamic: bool,
    /// Bracket nesting inside the statement; only a depth-0 `;` terminates it
    depth: usize,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Outside,
    InLoadStatement(OpenStatement),
}

/// Disable static load statements in `source`, leaving dynamic ones executable
pub fn neutralize_includes(source: &str) -> Result<Neutralized, NeutralizeError> {
    neutralize_tokens(&tokenize(source))
}

/// Token-level variant of [`neutralize_includes`]
pub fn neutralize_tokens(tokens: &[Token<'_>]) -> Result<Neutralized, NeutralizeError> {
    let capacity = tokens.last().map_or(0, Token::end);
    let mut output = String::with_capacity(capacity + capacity / 8);
    let mut statements = Vec::new();
    let mut targets = IndexSet::new();
    let mut previous: Option<&Token<'_>> = None;
    let mut state = State::Outside;

    for (index, token) in tokens.iter().enumerate() {
        state = match state {
            State::Outside => match load_keyword(token, previous) {
                Some(kind) => State::InLoadStatement(OpenStatement {
                    kind,
                    start: index,
                    is_dynamic: false,
                    depth: 0,
                }),
                None => {
                    output.push_str(token.text);
                    State::Outside
                }
            },
            State::InLoadStatement(mut open) => {
                match token.kind {
                    TokenKind::Variable | TokenKind::InterpolatedString => open.is_dynamic = true,
                    TokenKind::Symbol => match token.text {
                        // `${'name'}` and `$$name` are variable references too
                        "$" => open.is_dynamic = true,
                        "(" | "[" | "{" => open.depth += 1,
                        ")" | "]" | "}" => open.depth = open.depth.saturating_sub(1),
                        _ => {}
                    },
                    _ => {}
                }

                let terminates = (open.depth == 0 && token.is_symbol(";"))
                    || token.kind == TokenKind::CloseTag;
                if terminates {
                    let statement = close_statement(tokens, open, index, &mut output);
                    trace!(
                        "{} `{}` ({})",
                        if statement.is_dynamic { "kept" } else { "disabled" },
                        statement.target,
                        statement.kind
                    );
                    targets.insert(statement.target.clone());
                    statements.push(statement);
                    State::Outside
                } else {
                    State::InLoadStatement(open)
                }
            }
        };

        if !token.kind.is_trivia() {
            previous = Some(token);
        }
    }

    if let State::InLoadStatement(open) = state {
        return Err(NeutralizeError::MalformedSource {
            keyword: open.kind,
            offset: tokens[open.start].offset,
        });
    }

    Ok(Neutralized {
        source: output,
        targets: targets.into_iter().collect(),
        statements,
    })
}

/// A load keyword starts a statement unless it names a member or a declaration
fn load_keyword(token: &Token<'_>, previous: Option<&Token<'_>>) -> Option<LoadKind> {
    if token.kind != TokenKind::Identifier {
        return None;
    }
    let kind = LoadKind::from_keyword(token.text)?;
    let is_member_or_declaration = previous.is_some_and(|prev| {
        prev.is_symbol("->")
            || prev.is_symbol("?->")
            || prev.is_symbol("::")
            || prev.is_keyword("function")
            || prev.is_keyword("const")
    });
    (!is_member_or_declaration).then_some(kind)
}

/// Emit the rewritten statement and describe it
fn close_statement(
    tokens: &[Token<'_>],
    open: OpenStatement,
    terminator_index: usize,
    output: &mut String,
) -> LoadStatement {
    let keyword = &tokens[open.start];
    let terminator = &tokens[terminator_index];
    let body: String = tokens[open.start..terminator_index]
        .iter()
        .map(|t| t.text)
        .collect();
    let expression: String = tokens[open.start + 1..terminator_index]
        .iter()
        .map(|t| t.text)
        .collect();

    if open.is_dynamic {
        output.push_str(&body);
    } else {
        output.push_str("/* ");
        output.push_str(&body.cow_replace("*/", "* /"));
        output.push_str(" */ ");
        output.push_str(NO_OP);
    }
    output.push_str(terminator.text);

    LoadStatement {
        kind: open.kind,
        span: keyword.offset..terminator.end(),
        target: clean_target(&expression),
        expression,
        is_dynamic: open.is_dynamic,
    }
}

fn clean_target(expression: &str) -> String {
    let mut target = expression.trim();
    if target.starts_with('(') && target.ends_with(')') && target.len() >= 2 {
        target = target[1..target.len() - 1].trim();
    }
    target
        .trim_matches(|c: char| matches!(c, '\'' | '"' | '\n' | '\r'))
        .to_owned()
}

/// Remove the open tag at the start and the close tag at the end of a file
///
/// Tags in the middle of a file are left alone, since a `?> ... <?php` pair
/// stays valid inside a concatenated bundle. A trailing `?>` also ends the
/// statement before it, so it is replaced with a `;`.
pub fn strip_delimiters(source: &str) -> Cow<'_, str> {
    let body = strip_open_tag(source);
    let Some(code) = body.trim_end().strip_suffix("?>") else {
        return Cow::Borrowed(body);
    };
    let ends_in_line_comment = tokenize_code(code)
        .last()
        .is_some_and(|token| token.kind == TokenKind::Comment && !token.text.starts_with("/*"));
    let separator = if ends_in_line_comment { "\n" } else { "" };
    Cow::Owned(format!("{code}{separator};\n"))
}

/// Remove a leading `<?php` open tag, if any
pub fn strip_open_tag(source: &str) -> &str {
    let leading = source.trim_start();
    match leading.get(..5) {
        Some(tag) if tag.eq_ignore_ascii_case("<?php") => &leading[5..],
        _ => source,
    }
}

/// Drop a leading `#!` interpreter line
pub fn strip_shebang(source: &str) -> &str {
    if source.starts_with("#!") {
        source.find('\n').map_or("", |i| &source[i + 1..])
    } else {
        source
    }
}
