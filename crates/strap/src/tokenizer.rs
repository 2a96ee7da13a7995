//! Lexer for PHP-style script sources
//!
//! The lexer produces a flat token stream that covers its input byte for byte:
//! concatenating the `text` of every token yields the original source. Rewrites
//! therefore operate on the token list and re-serialize it, instead of splicing
//! strings by offset.
//!
//! Only the distinctions the bundler needs are made. Keywords are plain
//! [`TokenKind::Identifier`]s, and a string literal is classified only by
//! whether it interpolates variables.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Text outside of `<?php ... ?>` blocks
    InlineHtml,
    /// `<?php` including the single whitespace character that follows it
    OpenTag,
    /// `<?=`
    OpenTagWithEcho,
    /// `?>` including a single trailing newline
    CloseTag,
    Whitespace,
    /// `//`, `#` and `/* */` comments
    Comment,
    /// `/** */` comments
    DocComment,
    /// `$name`
    Variable,
    /// Names, keywords, magic constants and namespaced names (`Foo\Bar`)
    Identifier,
    /// Single-quoted strings, nowdocs and double-quoted strings without interpolation
    ConstantString,
    /// Double-quoted strings, heredocs and backticks that interpolate variables
    InterpolatedString,
    Number,
    /// Operators and punctuation
    Symbol,
}

impl TokenKind {
    /// Whitespace and comments
    pub fn is_trivia(self) -> bool {
        matches!(self, Self::Whitespace | Self::Comment | Self::DocComment)
    }

    pub fn is_string(self) -> bool {
        matches!(self, Self::ConstantString | Self::InterpolatedString)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the token in the lexed source
    pub offset: usize,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    /// Case-insensitive keyword comparison, as PHP keywords are case-insensitive
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Multi-character operators, longest first
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "**=", "...", "<=>", "===", "!==", "?->", "??=", "->", "=>", "::", "++", "--",
    "==", "!=", "<>", "<=", ">=", "&&", "||", "??", "+=", "-=", "*=", "/=", ".=", "%=", "&=", "|=",
    "^=", "<<", ">>", "**",
];

/// Tokenize a complete script file, which starts out in inline HTML mode
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    Lexer::new(source, false).run()
}

/// Tokenize a code fragment that has no open tag, such as a single expression
pub fn tokenize_code(source: &str) -> Vec<Token<'_>> {
    Lexer::new(source, true).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    in_code: bool,
    tokens: Vec<Token<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, in_code: bool) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            in_code,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token<'a>> {
        while self.pos < self.bytes.len() {
            if self.in_code {
                self.lex_code();
            } else {
                self.lex_html();
            }
        }
        self.tokens
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn byte_at(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    fn push(&mut self, kind: TokenKind, end: usize) {
        let end = end.min(self.bytes.len());
        self.tokens.push(Token {
            kind,
            text: &self.src[self.pos..end],
            offset: self.pos,
        });
        self.pos = end;
    }

    fn lex_html(&mut self) {
        match find_open_tag(self.rest()) {
            Some((start, len, kind)) => {
                if start > 0 {
                    self.push(TokenKind::InlineHtml, self.pos + start);
                }
                self.push(kind, self.pos + len);
                self.in_code = true;
            }
            None => self.push(TokenKind::InlineHtml, self.bytes.len()),
        }
    }

    fn lex_code(&mut self) {
        let rest = self.rest();
        let start = self.pos;
        let next = self.byte_at(start + 1);

        match self.bytes[start] {
            b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c => {
                let len = rest
                    .bytes()
                    .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c))
                    .count();
                self.push(TokenKind::Whitespace, start + len);
            }
            b'#' if next == Some(b'[') => self.push(TokenKind::Symbol, start + 2),
            b'#' => {
                let end = self.line_comment_end(start + 1);
                self.push(TokenKind::Comment, end);
            }
            b'/' if next == Some(b'/') => {
                let end = self.line_comment_end(start + 2);
                self.push(TokenKind::Comment, end);
            }
            b'/' if next == Some(b'*') => {
                let end = rest[2..].find("*/").map_or(self.bytes.len(), |i| start + i + 4);
                let is_doc = rest.starts_with("/**")
                    && self
                        .byte_at(start + 3)
                        .is_some_and(|b| b.is_ascii_whitespace());
                let kind = if is_doc {
                    TokenKind::DocComment
                } else {
                    TokenKind::Comment
                };
                self.push(kind, end);
            }
            b'?' if next == Some(b'>') => {
                let mut end = start + 2;
                if rest[2..].starts_with("\r\n") {
                    end += 2;
                } else if rest[2..].starts_with('\n') {
                    end += 1;
                }
                self.push(TokenKind::CloseTag, end);
                self.in_code = false;
            }
            b'$' if next.is_some_and(is_ident_start) => {
                let len = 1 + rest[1..].bytes().take_while(|b| is_ident_continue(*b)).count();
                self.push(TokenKind::Variable, start + len);
            }
            b'\'' => {
                let end = self.single_quoted_end(start + 1);
                self.push(TokenKind::ConstantString, end);
            }
            quote @ (b'"' | b'`') => {
                let end = self.double_quoted_end(start + 1, quote);
                let body = &self.bytes[start + 1..end.saturating_sub(1).max(start + 1)];
                let kind = if quote == b'`' || has_interpolation(body) {
                    TokenKind::InterpolatedString
                } else {
                    TokenKind::ConstantString
                };
                self.push(kind, end);
            }
            b'<' if rest.starts_with("<<<") => match self.heredoc() {
                Some((end, kind)) => self.push(kind, end),
                None => self.push(TokenKind::Symbol, start + 2),
            },
            b'0'..=b'9' => self.number(),
            b'.' if next.is_some_and(|b| b.is_ascii_digit()) => self.number(),
            b if is_ident_start(b) || (b == b'\\' && next.is_some_and(is_ident_start)) => {
                let mut end = start + 1;
                while let Some(b) = self.byte_at(end) {
                    let namespaced =
                        b == b'\\' && self.byte_at(end + 1).is_some_and(is_ident_start);
                    if is_ident_continue(b) || namespaced {
                        end += 1;
                    } else {
                        break;
                    }
                }
                self.push(TokenKind::Identifier, end);
            }
            _ => {
                let len = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .map_or(1, |op| op.len());
                self.push(TokenKind::Symbol, start + len);
            }
        }
    }

    /// Line comments stop before a newline or a close tag
    fn line_comment_end(&self, from: usize) -> usize {
        let rest = &self.src[from..];
        let end = match (rest.find('\n'), rest.find("?>")) {
            (Some(newline), Some(close)) => newline.min(close),
            (Some(at), None) | (None, Some(at)) => at,
            (None, None) => rest.len(),
        };
        from + end
    }

    fn single_quoted_end(&self, mut index: usize) -> usize {
        while let Some(b) = self.byte_at(index) {
            match b {
                b'\\' => index += 2,
                b'\'' => return index + 1,
                _ => index += 1,
            }
        }
        self.bytes.len()
    }

    fn double_quoted_end(&self, mut index: usize, quote: u8) -> usize {
        while let Some(b) = self.byte_at(index) {
            if b == b'\\' {
                index += 2;
            } else if b == quote {
                return index + 1;
            } else {
                index += 1;
            }
        }
        self.bytes.len()
    }

    fn number(&mut self) {
        let mut end = self.pos;
        while let Some(b) = self.byte_at(end) {
            let fraction = b == b'.' && self.byte_at(end + 1).is_some_and(|n| n.is_ascii_digit());
            if b.is_ascii_alphanumeric() || b == b'_' || fraction {
                end += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Number, end);
    }

    /// Lex a heredoc or nowdoc starting at `<<<`, returning its end and kind
    fn heredoc(&self) -> Option<(usize, TokenKind)> {
        let mut index = self.pos + 3;
        while matches!(self.byte_at(index), Some(b' ' | b'\t')) {
            index += 1;
        }

        let quote = match self.byte_at(index) {
            Some(q @ (b'\'' | b'"')) => {
                index += 1;
                Some(q)
            }
            _ => None,
        };

        let label_start = index;
        if !self.byte_at(index).is_some_and(is_ident_start) {
            return None;
        }
        while self.byte_at(index).is_some_and(is_ident_continue) {
            index += 1;
        }
        let label = &self.src[label_start..index];

        if let Some(q) = quote {
            if self.byte_at(index) != Some(q) {
                return None;
            }
            index += 1;
        }
        if self.byte_at(index) == Some(b'\r') {
            index += 1;
        }
        if self.byte_at(index) != Some(b'\n') {
            return None;
        }
        let body_start = index + 1;

        let mut line_start = body_start;
        let end = loop {
            if line_start >= self.bytes.len() {
                break self.bytes.len();
            }
            let mut cursor = line_start;
            while matches!(self.byte_at(cursor), Some(b' ' | b'\t')) {
                cursor += 1;
            }
            let closes = self.src[cursor..].starts_with(label)
                && !self
                    .byte_at(cursor + label.len())
                    .is_some_and(is_ident_continue);
            if closes {
                break cursor + label.len();
            }
            line_start = self.src[line_start..]
                .find('\n')
                .map_or(self.bytes.len(), |i| line_start + i + 1);
        };

        let is_nowdoc = quote == Some(b'\'');
        let body = &self.bytes[body_start.min(end)..end];
        let kind = if !is_nowdoc && has_interpolation(body) {
            TokenKind::InterpolatedString
        } else {
            TokenKind::ConstantString
        };
        Some((end, kind))
    }
}

/// Locate the next open tag, returning its start, length and kind
fn find_open_tag(html: &str) -> Option<(usize, usize, TokenKind)> {
    let bytes = html.as_bytes();
    for (start, _) in html.match_indices("<?") {
        let after = start + 2;
        if bytes.get(after) == Some(&b'=') {
            return Some((start, 3, TokenKind::OpenTagWithEcho));
        }
        let is_php = bytes
            .get(after..after + 3)
            .is_some_and(|b| b.eq_ignore_ascii_case(b"php"));
        if !is_php {
            continue;
        }
        let tag_end = after + 3;
        match bytes.get(tag_end) {
            None => return Some((start, 5, TokenKind::OpenTag)),
            Some(b'\r') if bytes.get(tag_end + 1) == Some(&b'\n') => {
                return Some((start, 7, TokenKind::OpenTag));
            }
            Some(b) if b.is_ascii_whitespace() => return Some((start, 6, TokenKind::OpenTag)),
            Some(_) => {}
        }
    }
    None
}

/// Whether a string body interpolates a variable (`$name`, `{$expr}` or `${expr}`)
fn has_interpolation(body: &[u8]) -> bool {
    let mut index = 0;
    while index < body.len() {
        match body[index] {
            b'\\' => index += 2,
            b'$' if body
                .get(index + 1)
                .is_some_and(|b| is_ident_start(*b) || *b == b'{') =>
            {
                return true;
            }
            b'{' if body.get(index + 1) == Some(&b'$') => return true,
            _ => index += 1,
        }
    }
    false
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, &str)> {
        tokenize(source)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_tokens_cover_source() {
        let source = "<html><?php\n// comment\n$a = \"x$b\" . 'y'; ?>\ntail <?= $c ?>";
        let joined: String = tokenize(source).iter().map(|t| t.text).collect();
        assert_eq!(joined, source);
    }

    #[test]
    fn test_open_and_close_tags() {
        assert_eq!(
            kinds("head<?php echo 1; ?>\nfoot"),
            vec![
                (TokenKind::InlineHtml, "head"),
                (TokenKind::OpenTag, "<?php "),
                (TokenKind::Identifier, "echo"),
                (TokenKind::Number, "1"),
                (TokenKind::Symbol, ";"),
                (TokenKind::CloseTag, "?>\n"),
                (TokenKind::InlineHtml, "foot"),
            ]
        );
    }

    #[test]
    fn test_string_classification() {
        let tokens = kinds("<?php 'a$b' \"plain\" \"has $var\" \"{$obj->x}\" \"esc \\$x\"");
        assert_eq!(
            tokens[1..],
            [
                (TokenKind::ConstantString, "'a$b'"),
                (TokenKind::ConstantString, "\"plain\""),
                (TokenKind::InterpolatedString, "\"has $var\""),
                (TokenKind::InterpolatedString, "\"{$obj->x}\""),
                (TokenKind::ConstantString, "\"esc \\$x\""),
            ]
        );
    }

    #[test]
    fn test_heredoc_and_nowdoc() {
        let source = "<?php $a = <<<EOT\nhello $name\nEOT;\n$b = <<<'RAW'\n$not\n  RAW;\n";
        let strings: Vec<_> = tokenize(source)
            .into_iter()
            .filter(|t| t.kind.is_string())
            .map(|t| (t.kind, t.text))
            .collect();
        assert_eq!(
            strings,
            vec![
                (TokenKind::InterpolatedString, "<<<EOT\nhello $name\nEOT"),
                (TokenKind::ConstantString, "<<<'RAW'\n$not\n  RAW"),
            ]
        );
    }

    #[test]
    fn test_comments_and_operators() {
        assert_eq!(
            kinds("<?php $x->y ?? /** doc */ # hash\nFoo::BAR"),
            vec![
                (TokenKind::OpenTag, "<?php "),
                (TokenKind::Variable, "$x"),
                (TokenKind::Symbol, "->"),
                (TokenKind::Identifier, "y"),
                (TokenKind::Symbol, "??"),
                (TokenKind::DocComment, "/** doc */"),
                (TokenKind::Comment, "# hash"),
                (TokenKind::Identifier, "Foo"),
                (TokenKind::Symbol, "::"),
                (TokenKind::Identifier, "BAR"),
            ]
        );
    }

    #[test]
    fn test_line_comment_stops_at_close_tag() {
        assert_eq!(
            kinds("<?php // note ?>after"),
            vec![
                (TokenKind::OpenTag, "<?php "),
                (TokenKind::Comment, "// note "),
                (TokenKind::CloseTag, "?>"),
                (TokenKind::InlineHtml, "after"),
            ]
        );
    }

    #[test]
    fn test_namespaced_identifier() {
        assert_eq!(
            tokenize_code("new \\App\\Console\\Kernel()")
                .into_iter()
                .filter(|t| t.kind == TokenKind::Identifier)
                .map(|t| t.text)
                .collect::<Vec<_>>(),
            vec!["new", "\\App\\Console\\Kernel"]
        );
    }

    #[test]
    fn test_short_open_tag_is_html() {
        assert_eq!(
            kinds("<?xml version=\"1.0\"?>"),
            vec![(TokenKind::InlineHtml, "<?xml version=\"1.0\"?>")]
        );
    }
}
