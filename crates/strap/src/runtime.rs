//! The script runtime seen by the bundler
//!
//! The bundler never interprets scripts itself. It asks a [`ScriptRuntime`] to
//! execute the entry file, then enumerates the types that execution declared
//! together with the file each one lives in.
//!
//! [`StaticRuntime`] "executes" an entry file without an interpreter: it
//! follows every statically resolvable load statement depth-first and records
//! type declarations in the order execution would reach them.

use std::{
    fmt, fs,
    hash::BuildHasherDefault,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use indexmap::{IndexMap, IndexSet};
use log::{debug, trace, warn};
use rustc_hash::FxHasher;

use crate::{
    container::Container,
    neutralizer::{LoadStatement, neutralize_tokens},
    tokenizer::{Token, TokenKind, tokenize, tokenize_code},
};

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;
type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Interface,
    Trait,
    Enum,
}

impl TypeKind {
    fn from_keyword(token: &Token<'_>) -> Option<Self> {
        if token.kind != TokenKind::Identifier {
            return None;
        }
        match token.text.to_ascii_lowercase().as_str() {
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "trait" => Some(Self::Trait),
            "enum" => Some(Self::Enum),
            _ => None,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Enum => "enum",
        })
    }
}

/// A fully-qualified type name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub name: String,
    pub kind: TypeKind,
}

/// Whether the entry file runs for real or to be bundled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Run,
    Build,
}

pub trait ScriptRuntime {
    /// Execute `entry`; commands it defines are registered on the application
    /// resolved from `container`
    fn execute_entry(
        &mut self,
        entry: &Path,
        mode: ExecutionMode,
        container: &mut Container,
    ) -> Result<()>;

    /// Every type known after execution, in declaration order
    fn declared_types(&self) -> Vec<TypeRef>;

    /// The file declaring `type_name`; `None` for types without a source file
    fn source_of(&self, type_name: &str) -> Option<PathBuf>;
}

/// Callback run after the entry file has been loaded, standing in for the
/// entry file's own top-level code
pub type EntryHook = Box<dyn FnMut(&Path, ExecutionMode, &mut Container) -> Result<()>>;

#[derive(Debug, Clone)]
struct Declaration {
    reference: TypeRef,
    path: PathBuf,
}

#[derive(Debug)]
enum Event {
    Declare(TypeRef),
    Load(LoadStatement),
}

#[derive(Default)]
pub struct StaticRuntime {
    include_paths: Vec<PathBuf>,
    loaded: FxIndexSet<PathBuf>,
    /// Keyed by lowercased name; type names are case-insensitive
    types: FxIndexMap<String, Declaration>,
    hooks: Vec<EntryHook>,
}

impl fmt::Debug for StaticRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticRuntime")
            .field("include_paths", &self.include_paths)
            .field("loaded", &self.loaded)
            .field("types", &self.types.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl StaticRuntime {
    /// A runtime resolving relative load targets against `include_paths`
    /// after the including file's own directory
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self {
            include_paths,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn on_entry<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Path, ExecutionMode, &mut Container) -> Result<()> + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Files loaded by the last execution, in load order
    pub fn loaded_files(&self) -> impl Iterator<Item = &Path> {
        self.loaded.iter().map(PathBuf::as_path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let path = path
            .canonicalize()
            .with_context(|| format!("failed to locate {}", path.display()))?;
        if !self.loaded.insert(path.clone()) {
            trace!("Already loaded {}", path.display());
            return Ok(());
        }
        debug!("Loading {}", path.display());

        let source = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let tokens = tokenize(&source);

        for event in scan_events(&tokens, &path) {
            match event {
                Event::Declare(reference) => self.declare(reference, &path),
                Event::Load(statement) => self.follow(&statement, &path)?,
            }
        }
        Ok(())
    }

    fn declare(&mut self, reference: TypeRef, path: &Path) {
        let key = reference.name.to_ascii_lowercase();
        if let Some(existing) = self.types.get(&key) {
            debug!(
                "{} {} already declared in {}; ignoring the declaration in {}",
                reference.kind,
                reference.name,
                existing.path.display(),
                path.display()
            );
            return;
        }
        trace!("Declared {} {}", reference.kind, reference.name);
        self.types.insert(
            key,
            Declaration {
                reference,
                path: path.to_path_buf(),
            },
        );
    }

    fn follow(&mut self, statement: &LoadStatement, current: &Path) -> Result<()> {
        if statement.is_dynamic {
            debug!(
                "Skipping dynamic {} `{}` in {}",
                statement.kind,
                statement.target,
                current.display()
            );
            return Ok(());
        }

        let Some(target) = evaluate_target(&statement.expression, current) else {
            debug!(
                "Cannot evaluate {} `{}` in {}",
                statement.kind,
                statement.target,
                current.display()
            );
            return Ok(());
        };

        match self.resolve_target(&target, current) {
            Some(path) => self
                .load(&path)
                .with_context(|| format!("while loading `{target}` from {}", current.display())),
            None if statement.kind.is_required() => {
                warn!(
                    "{} target `{target}` in {} does not exist",
                    statement.kind,
                    current.display()
                );
                Ok(())
            }
            None => {
                debug!("Optional include `{target}` in {} not found", current.display());
                Ok(())
            }
        }
    }

    /// Absolute and `./`-relative targets are taken as-is; other relative
    /// targets are searched in the include paths, then next to `current`
    fn resolve_target(&self, target: &str, current: &Path) -> Option<PathBuf> {
        let candidate = Path::new(target);
        let current_dir = current.parent().unwrap_or_else(|| Path::new("."));

        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        if target.starts_with("./") || target.starts_with("../") {
            let path = current_dir.join(candidate);
            return path.is_file().then_some(path);
        }

        self.include_paths
            .iter()
            .map(PathBuf::as_path)
            .chain(std::iter::once(current_dir))
            .map(|base| base.join(candidate))
            .find(|path| path.is_file())
    }
}

impl ScriptRuntime for StaticRuntime {
    fn execute_entry(
        &mut self,
        entry: &Path,
        mode: ExecutionMode,
        container: &mut Container,
    ) -> Result<()> {
        self.loaded.clear();
        self.types.clear();

        self.load(entry)
            .with_context(|| format!("failed to execute {}", entry.display()))?;
        debug!(
            "Executed {} in {mode:?} mode: {} file(s), {} type(s)",
            entry.display(),
            self.loaded.len(),
            self.types.len()
        );

        for hook in &mut self.hooks {
            hook(entry, mode, container)?;
        }
        Ok(())
    }

    fn declared_types(&self) -> Vec<TypeRef> {
        self.types
            .values()
            .map(|declaration| declaration.reference.clone())
            .collect()
    }

    fn source_of(&self, type_name: &str) -> Option<PathBuf> {
        let key = type_name.trim_start_matches('\\').to_ascii_lowercase();
        self.types.get(&key).map(|declaration| declaration.path.clone())
    }
}

/// Declarations and load statements of one file, in source order
fn scan_events(tokens: &[Token<'_>], path: &Path) -> Vec<Event> {
    let mut events: Vec<(usize, Event)> = scan_declarations(tokens)
        .into_iter()
        .map(|(offset, reference)| (offset, Event::Declare(reference)))
        .collect();

    match neutralize_tokens(tokens) {
        Ok(neutralized) => events.extend(
            neutralized
                .statements
                .into_iter()
                .map(|statement| (statement.span.start, Event::Load(statement))),
        ),
        Err(err) => warn!("Not following loads in {}: {err}", path.display()),
    }

    events.sort_by_key(|(offset, _)| *offset);
    events.into_iter().map(|(_, event)| event).collect()
}

/// Find `class`, `interface`, `trait` and `enum` declarations with their
/// namespace-qualified names
fn scan_declarations(tokens: &[Token<'_>]) -> Vec<(usize, TypeRef)> {
    let significant: Vec<&Token<'_>> = tokens.iter().filter(|t| !t.kind.is_trivia()).collect();
    let mut namespace = String::new();
    let mut declarations = Vec::new();

    for (index, token) in significant.iter().enumerate() {
        let previous = index.checked_sub(1).map(|i| significant[i]);
        let next = significant.get(index + 1);
        let is_member_access = previous
            .is_some_and(|p| p.is_symbol("::") || p.is_symbol("->") || p.is_symbol("?->"));

        if token.is_keyword("namespace") && !is_member_access {
            match next {
                Some(name) if name.kind == TokenKind::Identifier => {
                    name.text.trim_start_matches('\\').clone_into(&mut namespace);
                }
                Some(brace) if brace.is_symbol("{") => namespace.clear(),
                _ => {}
            }
            continue;
        }

        let Some(kind) = TypeKind::from_keyword(token) else {
            continue;
        };
        if is_member_access || previous.is_some_and(|p| p.is_keyword("new")) {
            continue;
        }
        let Some(name) = next.filter(|n| n.kind == TokenKind::Identifier) else {
            continue;
        };
        if kind == TypeKind::Enum {
            let after = significant.get(index + 2);
            let is_declaration = after.is_some_and(|t| {
                t.is_symbol("{") || t.is_symbol(":") || t.is_keyword("implements")
            });
            if !is_declaration {
                continue;
            }
        }

        let name = if namespace.is_empty() {
            name.text.to_owned()
        } else {
            format!("{namespace}\\{}", name.text)
        };
        declarations.push((token.offset, TypeRef { name, kind }));
    }

    declarations
}

/// Statically evaluate a load target made of string literals, `__DIR__`,
/// `__FILE__`, `dirname(...)` and `.` concatenation
fn evaluate_target(expression: &str, current: &Path) -> Option<String> {
    let tokens = tokenize_code(expression);
    let current_dir = current.parent().unwrap_or_else(|| Path::new("."));
    let mut result = String::new();
    let mut expect_operand = true;
    let mut dirname_depth = 0usize;
    let mut operand: Option<String> = None;

    for token in tokens.iter().filter(|t| !t.kind.is_trivia()) {
        match token.kind {
            TokenKind::Symbol if token.text == "(" => {}
            TokenKind::Symbol if token.text == ")" => {
                if dirname_depth > 0 {
                    let value = operand.take()?;
                    operand = Some(parent_of(&value));
                    dirname_depth -= 1;
                }
            }
            TokenKind::Symbol if token.text == "." && !expect_operand => {
                result.push_str(&operand.take()?);
                expect_operand = true;
            }
            TokenKind::Identifier if expect_operand && token.is_keyword("dirname") => {
                dirname_depth += 1;
            }
            TokenKind::Identifier if expect_operand && token.text == "__DIR__" => {
                operand = Some(current_dir.to_string_lossy().into_owned());
                expect_operand = false;
            }
            TokenKind::Identifier if expect_operand && token.text == "__FILE__" => {
                operand = Some(current.to_string_lossy().into_owned());
                expect_operand = false;
            }
            TokenKind::ConstantString if expect_operand && !token.text.starts_with("<<<") => {
                operand = Some(unquote(token.text));
                expect_operand = false;
            }
            _ => return None,
        }
    }

    if expect_operand || dirname_depth > 0 {
        return None;
    }
    result.push_str(&operand?);
    Some(result)
}

fn parent_of(path: &str) -> String {
    Path::new(path)
        .parent()
        .map_or_else(|| ".".to_owned(), |p| p.to_string_lossy().into_owned())
}

fn unquote(literal: &str) -> String {
    let quote = literal.chars().next().unwrap_or('\'');
    let inner = literal
        .get(1..literal.len().saturating_sub(1))
        .unwrap_or_default();
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(escaped) if escaped == quote || escaped == '\\' => out.push(escaped),
            Some('$') if quote == '"' => out.push('$'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
