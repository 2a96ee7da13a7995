//! Whitespace and comment stripping
//!
//! Tokens are never altered; only whitespace and comment runs between them are
//! dropped or collapsed to one separator. Doc comments survive because command
//! help text is read from them.

use crate::tokenizer::{Token, TokenKind, tokenize};

/// Return `source` with comments removed and insignificant whitespace collapsed
pub fn strip_whitespace(source: &str) -> String {
    let tokens = tokenize(source);
    let mut output = String::with_capacity(source.len());
    let mut previous: Option<&Token<'_>> = None;
    let mut gap = false;

    for token in &tokens {
        if matches!(token.kind, TokenKind::Whitespace | TokenKind::Comment) {
            gap = true;
            continue;
        }

        if gap {
            if let Some(prev) = previous {
                if is_heredoc(prev) {
                    output.push('\n');
                } else if needs_separator(prev, token) {
                    output.push(' ');
                }
            }
            gap = false;
        }

        output.push_str(token.text);
        previous = Some(token);
    }

    output
}

fn is_heredoc(token: &Token<'_>) -> bool {
    token.kind.is_string() && token.text.starts_with("<<<")
}

/// Whether dropping the gap between two tokens could change how they lex
fn needs_separator(prev: &Token<'_>, next: &Token<'_>) -> bool {
    let mode_boundary = matches!(
        prev.kind,
        TokenKind::OpenTag | TokenKind::OpenTagWithEcho | TokenKind::CloseTag | TokenKind::InlineHtml
    ) || matches!(next.kind, TokenKind::CloseTag | TokenKind::InlineHtml);

    !(mode_boundary || is_self_delimiting(prev) || is_self_delimiting(next))
}

fn is_self_delimiting(token: &Token<'_>) -> bool {
    match token.kind {
        TokenKind::ConstantString | TokenKind::InterpolatedString | TokenKind::DocComment => {
            !is_heredoc(token)
        }
        TokenKind::Symbol => matches!(token.text, ";" | "," | "(" | ")" | "{" | "}" | "[" | "]"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_collapses_whitespace_and_comments() {
        let source = "<?php\n\n// helper\nfunction  add( $a ,  $b )\n{\n    return $a + $b; # sum\n}\n";
        assert_eq!(
            strip_whitespace(source),
            "<?php\nfunction add($a,$b){return $a + $b;}"
        );
    }

    #[test]
    fn test_keeps_strings_and_doc_comments() {
        let source = "<?php\n/**\n * Greets.\n */\necho   'a  //  b' ;";
        assert_eq!(
            strip_whitespace(source),
            "<?php\n/**\n * Greets.\n */echo'a  //  b';"
        );
    }

    #[test]
    fn test_operators_stay_apart() {
        assert_eq!(strip_whitespace("<?php $a = $b + +$c;"), "<?php $a = $b + +$c;");
        assert_eq!(strip_whitespace("<?php echo 1 . 2;"), "<?php echo 1 . 2;");
    }

    #[test]
    fn test_heredoc_keeps_line_break() {
        let source = "<?php $x = <<<EOT\n  text\nEOT\n  ;";
        assert_eq!(strip_whitespace(source), "<?php $x = <<<EOT\n  text\nEOT\n;");
    }

    #[test]
    fn test_inline_html_untouched() {
        let source = "<p>  a  </p>\n<?php   echo 1 ?>\n  <b> x </b>";
        assert_eq!(strip_whitespace(source), "<p>  a  </p>\n<?php echo 1?>\n  <b> x </b>");
    }
}
