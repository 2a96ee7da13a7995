//! Build orchestration
//!
//! A build executes the entry file in build mode, runs every registered
//! command once with its configured arguments, collects the files declaring
//! bundle-eligible types, and concatenates their neutralized sources into a
//! single executable artifact:
//!
//! ```text
//! <header line>
//! <open tag>
//! [entry strict_types declaration]
//! <unit 1> ... <unit n>
//! <bootstrap call>
//! <entry file>
//! ```
//!
//! When any of these declares a namespace, each unit and the bootstrap call
//! plus entry file are emitted as bracketed namespace blocks instead.

use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::{Context, Result};
use indexmap::{IndexMap, IndexSet};
use log::{debug, info, trace, warn};

use crate::{
    bundle::BundleBuffer,
    config::{Config, EntrySection},
    container::Container,
    error::BuildError,
    filter::ClassFilter,
    framework::{APPLICATION_ALIAS, Application, BindingPolicy, bind_arguments},
    minify::strip_whitespace,
    namespaces::{bracket_namespaces, declares_namespace, lift_strict_types},
    neutralizer::{neutralize_includes, strip_delimiters, strip_open_tag, strip_shebang},
    runtime::{ExecutionMode, ScriptRuntime, TypeRef},
};

/// Outcome of a successful build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub target: PathBuf,
    /// Bundled files in discovery order
    pub units: Vec<PathBuf>,
    pub included_types: Vec<String>,
    pub excluded_types: Vec<String>,
    /// Static load targets disabled across all units, first occurrence order
    pub load_targets: Vec<String>,
    pub bytes: usize,
}

/// One discovered type and the filter's verdict on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub reference: TypeRef,
    pub source: Option<PathBuf>,
    pub allowed: bool,
}

#[derive(Debug, Default)]
struct Units {
    files: IndexMap<PathBuf, Vec<String>>,
    excluded: Vec<String>,
}

#[derive(Debug)]
pub struct BundleOrchestrator<R> {
    config: Config,
    runtime: R,
    container: Container,
}

impl<R: ScriptRuntime> BundleOrchestrator<R> {
    /// `container` should already carry the framework wiring, see
    /// [`crate::framework::bootstrap`]
    pub fn new(config: Config, runtime: R, container: Container) -> Self {
        Self {
            config,
            runtime,
            container,
        }
    }

    /// Bundle `entry` into one artifact and write it
    pub fn build(&mut self, entry: &Path) -> Result<BuildReport> {
        let entry_source = read_source(entry)?;
        let filter = self.filter()?;

        self.runtime
            .execute_entry(entry, ExecutionMode::Build, &mut self.container)
            .with_context(|| format!("failed to execute {} in build mode", entry.display()))?;
        let application = self
            .container
            .resolve_as::<Application>(APPLICATION_ALIAS)
            .map_err(BuildError::from)?;
        self.run_commands(&application)?;

        let units = self.collect_units(entry, &filter);
        let mut load_targets = IndexSet::new();
        let artifact = self.assemble(&units, entry, &entry_source, &mut load_targets)?;

        let target = self.target_path(entry);
        write_artifact(&target, &artifact)?;

        let report = BuildReport {
            target,
            units: units.files.keys().cloned().collect(),
            included_types: units.files.values().flatten().cloned().collect(),
            excluded_types: units.excluded,
            load_targets: load_targets.into_iter().collect(),
            bytes: artifact.len(),
        };
        info!(
            "Bundled {} file(s) declaring {} type(s) into {} ({} bytes)",
            report.units.len(),
            report.included_types.len(),
            report.target.display(),
            report.bytes
        );
        Ok(report)
    }

    /// Execute `entry` and report every discovered type without building
    pub fn scan(&mut self, entry: &Path) -> Result<Vec<ScanEntry>> {
        read_source(entry)?;
        let filter = self.filter()?;
        self.runtime
            .execute_entry(entry, ExecutionMode::Build, &mut self.container)
            .with_context(|| format!("failed to execute {} in build mode", entry.display()))?;

        Ok(self
            .runtime
            .declared_types()
            .into_iter()
            .map(|reference| ScanEntry {
                source: self.runtime.source_of(&reference.name),
                allowed: filter.is_allowed(&reference.name),
                reference,
            })
            .collect())
    }

    fn filter(&self) -> Result<ClassFilter, BuildError> {
        Ok(ClassFilter::from_patterns(
            &self.config.include,
            &self.config.exclude,
        )?)
    }

    /// Invoke every registered command once for its build-time side effects
    fn run_commands(&self, application: &Rc<Application>) -> Result<(), BuildError> {
        let commands = application.commands();

        for name in self.config.arguments.keys() {
            if commands.iter().all(|command| command.name() != name) {
                match self.config.binding {
                    BindingPolicy::Strict => return Err(BuildError::UnknownCommand(name.clone())),
                    BindingPolicy::Lenient => {
                        warn!("Arguments configured for unknown command `{name}`");
                    }
                }
            }
        }

        for command in commands {
            let supplied = self.config.arguments_for(command.name());
            let arguments = bind_arguments(&command, &supplied, application, self.config.binding)?;
            debug!("Running build-time command `{}`", command.name());
            command
                .invoke(&arguments)
                .map_err(|source| BuildError::Command {
                    command: command.name().to_owned(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Files declaring at least one eligible type, in discovery order
    fn collect_units(&self, entry: &Path, filter: &ClassFilter) -> Units {
        let entry = canonical(entry);
        let mut units = Units::default();

        for reference in self.runtime.declared_types() {
            if !filter.is_allowed(&reference.name) {
                debug!("Excluding {} {}", reference.kind, reference.name);
                units.excluded.push(reference.name);
                continue;
            }
            let Some(path) = self.runtime.source_of(&reference.name) else {
                debug!("{} {} has no source file", reference.kind, reference.name);
                continue;
            };
            if canonical(&path) == entry {
                trace!("{} is declared by the entry file", reference.name);
                continue;
            }
            debug!(
                "Including {} {} from {}",
                reference.kind,
                reference.name,
                path.display()
            );
            units.files.entry(path).or_default().push(reference.name);
        }
        units
    }

    fn assemble(
        &self,
        units: &Units,
        entry: &Path,
        entry_source: &str,
        load_targets: &mut IndexSet<String>,
    ) -> Result<String, BuildError> {
        let mut sections = Vec::with_capacity(units.files.len());
        for path in units.files.keys() {
            let source = read_unit(path)?;
            let source = if self.config.minimize {
                strip_whitespace(&source)
            } else {
                source
            };
            let unit = neutralize(&source, path, load_targets)?;
            let unit = lift_strict_types(&strip_delimiters(&unit));
            if let Some(statement) = unit.strict_types {
                debug!("Dropping `{statement}` from {}", path.display());
            }
            sections.push(unit.code);
        }

        let entry_body = strip_shebang(entry_source);
        let entry_code = match self.config.entry {
            EntrySection::Neutralized => {
                lift_strict_types(strip_open_tag(&neutralize(entry_body, entry, load_targets)?))
            }
            EntrySection::Raw => lift_strict_types(strip_open_tag(entry_body)),
        };
        let tail = format!("{}\n{}", self.config.bootstrap, entry_code.code);

        let mut buffer = BundleBuffer::new();
        if sections.iter().any(|code| declares_namespace(code)) || declares_namespace(&tail) {
            debug!("Bundle declares namespaces, assembling bracketed namespace blocks");
            for code in &sections {
                buffer.append_line(&bracket_namespaces(code));
            }
            buffer.append_line(&bracket_namespaces(&tail));
        } else {
            for code in &sections {
                buffer.append_line(code);
            }
            buffer.append(&tail);
        }

        if let Some(statement) = entry_code.strict_types {
            buffer.prepend(format!("{statement}\n"));
        }
        buffer.prepend(format!("{}\n", self.config.open_tag));
        if !self.config.header.is_empty() {
            buffer.prepend(format!("{}\n", self.config.header));
        }
        Ok(buffer.into_string())
    }

    /// The configured target, or the entry's name with the target prefix
    /// inserted, next to the entry file
    pub fn target_path(&self, entry: &Path) -> PathBuf {
        if let Some(target) = &self.config.target {
            return target.clone();
        }
        let file_name = entry
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        entry.with_file_name(format!("{}{file_name}", self.config.target_prefix))
    }
}

fn read_source(path: &Path) -> Result<String, BuildError> {
    fs::read_to_string(path).map_err(|source| BuildError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

fn read_unit(path: &Path) -> Result<String, BuildError> {
    fs::read_to_string(path).map_err(|source| BuildError::UnitUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

fn neutralize(
    source: &str,
    path: &Path,
    load_targets: &mut IndexSet<String>,
) -> Result<String, BuildError> {
    let neutralized = neutralize_includes(source).map_err(|source| BuildError::MalformedSource {
        path: path.to_path_buf(),
        source,
    })?;
    for target in neutralized.targets {
        trace!("Neutralized load of `{target}` in {}", path.display());
        load_targets.insert(target);
    }
    Ok(neutralized.source)
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn write_artifact(target: &Path, artifact: &str) -> Result<(), BuildError> {
    let unwritable = |source| BuildError::TargetUnwritable {
        path: target.to_path_buf(),
        source,
    };
    fs::write(target, artifact).map_err(unwritable)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let executable = fs::metadata(target).map(|metadata| {
            let mut permissions = metadata.permissions();
            permissions.set_mode(permissions.mode() | 0o111);
            permissions
        });
        if let Err(err) = executable.and_then(|permissions| fs::set_permissions(target, permissions))
        {
            warn!("Could not mark {} executable: {err}", target.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::runtime::StaticRuntime;

    fn orchestrator(config: Config) -> BundleOrchestrator<StaticRuntime> {
        BundleOrchestrator::new(config, StaticRuntime::new(Vec::new()), Container::new())
    }

    #[test]
    fn test_target_path_inserts_prefix() {
        let orchestrator = orchestrator(Config::default());
        assert_eq!(
            orchestrator.target_path(Path::new("/srv/tools/app.php")),
            PathBuf::from("/srv/tools/built-app.php")
        );
        assert_eq!(
            orchestrator.target_path(Path::new("deploy")),
            PathBuf::from("built-deploy")
        );
    }

    #[test]
    fn test_explicit_target_wins() {
        let config = Config {
            target: Some(PathBuf::from("/tmp/out/tool")),
            ..Config::default()
        };
        assert_eq!(
            orchestrator(config).target_path(Path::new("app.php")),
            PathBuf::from("/tmp/out/tool")
        );
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let config = Config {
            exclude: vec!["(".to_owned()],
            ..Config::default()
        };
        let err = orchestrator(config).filter().unwrap_err();
        assert!(matches!(err, BuildError::InvalidPattern(_)));
    }
}
