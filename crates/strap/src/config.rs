//! Layered build configuration
//!
//! Layers, lowest precedence first: built-in defaults, the user config file,
//! the project `strap.toml` (or the file named by `--config`/`STRAP_CONFIG`),
//! and finally command-line overrides. A layer only overrides the keys it
//! sets; pattern and path lists accumulate across layers.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;

use crate::{
    dirs::{CONFIG_FILE_NAME, user_config_file},
    framework::{BindingPolicy, Value},
};

pub const CONFIG_ENV_VAR: &str = "STRAP_CONFIG";

pub const DEFAULT_HEADER: &str = "#!/usr/bin/env php";
pub const DEFAULT_OPEN_TAG: &str = "<?php";
pub const DEFAULT_BOOTSTRAP: &str = "\\Strap\\Container::bootstrap();";
pub const DEFAULT_TARGET_PREFIX: &str = "built-";
/// Used when no layer sets any include pattern
pub const DEFAULT_INCLUDE: &str = ".*";

/// Per-command build-time arguments: command name to parameter name to value
pub type CommandArguments = IndexMap<String, IndexMap<String, Value>>;

/// How the entry file is placed at the end of the artifact
///
/// Neutralized is the default because the entry's own static loads name
/// files that are already bundled, and loading them again would redeclare
/// their types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySection {
    /// Static loads disabled like every other unit
    #[default]
    Neutralized,
    /// Verbatim apart from the shebang and open tag
    Raw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub header: String,
    pub open_tag: String,
    pub bootstrap: String,
    /// Explicit artifact path; derived from the entry name when unset
    pub target: Option<PathBuf>,
    pub target_prefix: String,
    pub minimize: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub binding: BindingPolicy,
    pub entry: EntrySection,
    pub include_paths: Vec<PathBuf>,
    pub arguments: CommandArguments,
}

impl Default for Config {
    fn default() -> Self {
        PartialConfig::default().resolve()
    }
}

impl Config {
    /// Load every layer for a build of `entry`
    ///
    /// `explicit` is the `--config` path; `STRAP_CONFIG` is consulted when it
    /// is absent, then `strap.toml` next to the entry file.
    pub fn load(entry: &Path, explicit: Option<&Path>, cli: PartialConfig) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let explicit = explicit.map(Path::to_path_buf).or(from_env);
        Self::load_layers(user_config_file(), entry, explicit.as_deref(), cli)
    }

    pub fn load_layers(
        user_file: Option<PathBuf>,
        entry: &Path,
        explicit: Option<&Path>,
        cli: PartialConfig,
    ) -> Result<Self> {
        let mut merged = PartialConfig::default();

        if let Some(user_file) = user_file.filter(|path| path.is_file()) {
            debug!("Loading user config {}", user_file.display());
            merged.merge(PartialConfig::from_file(&user_file)?);
        }

        match explicit {
            Some(path) => {
                debug!("Loading config {}", path.display());
                merged.merge(PartialConfig::from_file(path)?);
            }
            None => {
                let project = entry
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(CONFIG_FILE_NAME);
                if project.is_file() {
                    debug!("Loading project config {}", project.display());
                    merged.merge(PartialConfig::from_file(&project)?);
                }
            }
        }

        merged.merge(cli);
        Ok(merged.resolve())
    }

    /// Arguments configured for `command`, empty when none are
    pub fn arguments_for(&self, command: &str) -> IndexMap<String, Value> {
        self.arguments.get(command).cloned().unwrap_or_default()
    }
}

/// One configuration layer; unset keys fall through to lower layers
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    pub header: Option<String>,
    pub open_tag: Option<String>,
    pub bootstrap: Option<String>,
    pub target: Option<PathBuf>,
    pub target_prefix: Option<String>,
    pub minimize: Option<bool>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub binding: Option<BindingPolicy>,
    pub entry: Option<EntrySection>,
    pub include_paths: Vec<PathBuf>,
    pub arguments: CommandArguments,
}

impl PartialConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Parse a config file; relative paths in it are taken relative to the
    /// file's directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut layer = Self::from_toml(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if let Some(target) = layer.target.as_mut() {
            if target.is_relative() {
                *target = base.join(&*target);
            }
        }
        for include_path in &mut layer.include_paths {
            if include_path.is_relative() {
                *include_path = base.join(&*include_path);
            }
        }
        Ok(layer)
    }

    /// Overlay `other` on top of `self`
    pub fn merge(&mut self, other: Self) {
        fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        overlay(&mut self.header, other.header);
        overlay(&mut self.open_tag, other.open_tag);
        overlay(&mut self.bootstrap, other.bootstrap);
        overlay(&mut self.target, other.target);
        overlay(&mut self.target_prefix, other.target_prefix);
        overlay(&mut self.minimize, other.minimize);
        overlay(&mut self.binding, other.binding);
        overlay(&mut self.entry, other.entry);
        self.include.extend(other.include);
        self.exclude.extend(other.exclude);
        self.include_paths.extend(other.include_paths);

        for (command, values) in other.arguments {
            self.arguments.entry(command).or_default().extend(values);
        }
    }

    /// Fill unset keys with built-in defaults
    pub fn resolve(self) -> Config {
        let include = if self.include.is_empty() {
            vec![DEFAULT_INCLUDE.to_owned()]
        } else {
            self.include
        };

        Config {
            header: self.header.unwrap_or_else(|| DEFAULT_HEADER.to_owned()),
            open_tag: self.open_tag.unwrap_or_else(|| DEFAULT_OPEN_TAG.to_owned()),
            bootstrap: self.bootstrap.unwrap_or_else(|| DEFAULT_BOOTSTRAP.to_owned()),
            target: self.target,
            target_prefix: self
                .target_prefix
                .unwrap_or_else(|| DEFAULT_TARGET_PREFIX.to_owned()),
            minimize: self.minimize.unwrap_or(true),
            include,
            exclude: self.exclude,
            binding: self.binding.unwrap_or_default(),
            entry: self.entry.unwrap_or_default(),
            include_paths: self.include_paths,
            arguments: self.arguments,
        }
    }
}
