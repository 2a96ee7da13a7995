//! Namespace scoping for concatenated files
//!
//! `namespace Foo;` applies to everything after it up to the end of its file.
//! Once files are concatenated, the last such declaration would also capture
//! the bootstrap call and the entry code. A bundle containing any namespace
//! declaration is therefore assembled from bracketed blocks only:
//! `namespace Foo { ... }` for namespaced code and `namespace { ... }` for
//! global code.
//!
//! `declare(strict_types=...)` must be the first statement of a file, so it is
//! lifted out of every file before concatenation.

use log::trace;

use crate::tokenizer::{Token, TokenKind, tokenize_code};

/// A `namespace` declaration at the top level of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Declaration {
    /// Token index of the `namespace` keyword
    keyword: usize,
    /// Token index of the `;` or `{` ending the declaration
    opener: usize,
    bracketed: bool,
}

/// Code with its top-level `declare(strict_types=...)` statements removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifted {
    pub code: String,
    /// The first removed statement
    pub strict_types: Option<String>,
}

/// Whether `code` declares a namespace at its top level
///
/// `code` is a file body without its open tag.
pub fn declares_namespace(code: &str) -> bool {
    !declarations(&tokenize_code(code)).is_empty()
}

/// Rewrite `code` so that all of it sits inside bracketed namespace blocks
///
/// Files already using the bracketed form are returned unchanged, since PHP
/// does not allow mixing the two forms in one file.
pub fn bracket_namespaces(code: &str) -> String {
    let tokens = tokenize_code(code);
    let declarations = declarations(&tokens);
    if declarations.iter().any(|declaration| declaration.bracketed) {
        return code.to_owned();
    }

    let mut out = String::with_capacity(code.len() + 32);
    let first = declarations
        .first()
        .map_or(tokens.len(), |declaration| declaration.keyword);
    let prelude = &tokens[..first];
    if prelude.iter().all(|token| token.kind.is_trivia()) {
        push_tokens(&mut out, prelude);
    } else {
        out.push_str("namespace {\n");
        push_tokens(&mut out, prelude);
        close_block(&mut out, prelude);
    }

    for (position, declaration) in declarations.iter().enumerate() {
        let end = declarations
            .get(position + 1)
            .map_or(tokens.len(), |next| next.keyword);
        let header = &tokens[declaration.keyword..declaration.opener];
        trace!(
            "Bracketing `{}`",
            header.iter().map(|token| token.text).collect::<String>()
        );
        push_tokens(&mut out, header);
        out.push_str(" {");
        let body = &tokens[declaration.opener + 1..end];
        push_tokens(&mut out, body);
        close_block(&mut out, body);
    }
    out
}

/// Remove every top-level `declare(strict_types=...);` from `code`
pub fn lift_strict_types(code: &str) -> Lifted {
    let tokens = tokenize_code(code);
    let mut out = String::with_capacity(code.len());
    let mut strict_types = None;
    let mut depth = 0usize;
    let mut index = 0;

    while index < tokens.len() {
        let token = &tokens[index];
        if depth == 0
            && token.is_keyword("declare")
            && !follows_member_access(&tokens, index)
            && let Some(end) = strict_types_end(&tokens, index)
        {
            let statement: String = tokens[index..=end].iter().map(|t| t.text).collect();
            trace!("Lifting `{statement}`");
            strict_types.get_or_insert(statement);
            index = end + 1;
            continue;
        }
        if token.is_symbol("{") {
            depth += 1;
        } else if token.is_symbol("}") {
            depth = depth.saturating_sub(1);
        }
        out.push_str(token.text);
        index += 1;
    }

    Lifted {
        code: out,
        strict_types,
    }
}

fn declarations(tokens: &[Token<'_>]) -> Vec<Declaration> {
    let mut found = Vec::new();
    let mut depth = 0usize;

    for (index, token) in tokens.iter().enumerate() {
        if token.is_symbol("{") {
            depth += 1;
        } else if token.is_symbol("}") {
            depth = depth.saturating_sub(1);
        } else if depth == 0
            && token.is_keyword("namespace")
            && !follows_member_access(tokens, index)
            && let Some(declaration) = declaration_at(tokens, index)
        {
            found.push(declaration);
        }
    }
    found
}

fn declaration_at(tokens: &[Token<'_>], keyword: usize) -> Option<Declaration> {
    let mut next = next_significant(tokens, keyword + 1)?;
    if tokens[next].kind == TokenKind::Identifier {
        next = next_significant(tokens, next + 1)?;
    }
    let opener = &tokens[next];
    (opener.is_symbol(";") || opener.is_symbol("{")).then(|| Declaration {
        keyword,
        opener: next,
        bracketed: opener.is_symbol("{"),
    })
}

/// Index of the `;` ending a `declare(...)` that names `strict_types`
fn strict_types_end(tokens: &[Token<'_>], keyword: usize) -> Option<usize> {
    let open = next_significant(tokens, keyword + 1)?;
    if !tokens[open].is_symbol("(") {
        return None;
    }
    let close = (open + 1..tokens.len()).find(|&i| tokens[i].is_symbol(")"))?;
    let names_strict_types = tokens[open + 1..close]
        .iter()
        .any(|token| token.is_keyword("strict_types"));
    let end = next_significant(tokens, close + 1)?;
    (names_strict_types && tokens[end].is_symbol(";")).then_some(end)
}

fn follows_member_access(tokens: &[Token<'_>], index: usize) -> bool {
    tokens[..index]
        .iter()
        .rev()
        .find(|token| !token.kind.is_trivia())
        .is_some_and(|prev| prev.is_symbol("->") || prev.is_symbol("?->") || prev.is_symbol("::"))
}

fn next_significant(tokens: &[Token<'_>], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&i| !tokens[i].kind.is_trivia())
}

fn push_tokens(out: &mut String, tokens: &[Token<'_>]) {
    for token in tokens {
        out.push_str(token.text);
    }
}

/// Close a block, switching back to code first if `body` ends in inline HTML
fn close_block(out: &mut String, body: &[Token<'_>]) {
    let ends_in_html = body
        .iter()
        .rev()
        .find(|token| {
            matches!(
                token.kind,
                TokenKind::OpenTag | TokenKind::OpenTagWithEcho | TokenKind::CloseTag
            )
        })
        .is_some_and(|token| token.kind == TokenKind::CloseTag);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    if ends_in_html {
        out.push_str("<?php\n");
    }
    out.push_str("}\n");
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_statement_namespaces_become_blocks() {
        let code = "\nnamespace App\\Console;\n\nuse Foo\\Bar;\nclass Kernel {}\nnamespace App\\Http;\nclass Router {}";
        assert_eq!(
            bracket_namespaces(code),
            "\nnamespace App\\Console {\n\nuse Foo\\Bar;\nclass Kernel {}\n}\n\
             namespace App\\Http {\nclass Router {}\n}\n"
        );
    }

    #[test]
    fn test_global_code_gets_a_global_block() {
        assert_eq!(
            bracket_namespaces("\\Strap\\Container::bootstrap();\n$x = 1;\n"),
            "namespace {\n\\Strap\\Container::bootstrap();\n$x = 1;\n}\n"
        );
    }

    #[test]
    fn test_code_before_first_namespace_is_global() {
        assert_eq!(
            bracket_namespaces("run();\nnamespace Lib;\nfunction f() {}\n"),
            "namespace {\nrun();\n}\nnamespace Lib {\nfunction f() {}\n}\n"
        );
    }

    #[test]
    fn test_bracketed_files_are_unchanged() {
        let code = "\nnamespace A {\nclass One {}\n}\nnamespace {\necho 1;\n}\n";
        assert_eq!(bracket_namespaces(code), code);
    }

    #[test]
    fn test_block_ending_in_html_reopens_code() {
        assert_eq!(
            bracket_namespaces("echo 1; ?>\n<p>done</p>\n"),
            "namespace {\necho 1; ?>\n<p>done</p>\n<?php\n}\n"
        );
    }

    #[test]
    fn test_relative_namespace_names_are_not_declarations() {
        assert!(!declares_namespace("namespace\\helper();\n$a->namespace;\n"));
        assert!(declares_namespace("\nnamespace Vendor\\A;\n"));
        assert!(declares_namespace("namespace {\n}\n"));
    }

    #[test]
    fn test_strict_types_is_lifted() {
        let lifted = lift_strict_types("\ndeclare(strict_types=1);\nnamespace A;\n");
        assert_eq!(lifted.code, "\n\nnamespace A;\n");
        assert_eq!(lifted.strict_types.as_deref(), Some("declare(strict_types=1);"));
    }

    #[test]
    fn test_other_declares_stay() {
        let code = "\ndeclare(ticks=1);\nfunction f() { declare(strict_types=1); }\n";
        let lifted = lift_strict_types(code);
        assert_eq!(lifted.code, code);
        assert_eq!(lifted.strict_types, None);
    }
}
