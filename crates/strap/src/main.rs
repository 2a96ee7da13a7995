use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use log::{debug, error};
use strap::{
    BundleOrchestrator, Config, PartialConfig, StaticRuntime,
    config::{CONFIG_ENV_VAR, EntrySection},
    container::Container,
    framework::{BindingPolicy, Value, bootstrap},
};

#[derive(Parser, Debug)]
#[command(name = "strap", version, about = "Bundle a PHP CLI application into one executable script")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the bundled artifact
    Build(BuildArgs),
    /// List discovered types, their files and whether they would be bundled
    Scan(DiscoveryArgs),
}

#[derive(Args, Debug)]
struct DiscoveryArgs {
    /// Entry script of the application
    #[arg(short, long)]
    entry: PathBuf,

    /// Config file; defaults to strap.toml next to the entry script
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Regex a type name must match to be bundled (repeatable)
    #[arg(long)]
    include: Vec<String>,

    /// Regex excluding matching type names (repeatable, wins over --include)
    #[arg(long)]
    exclude: Vec<String>,

    /// Directory searched for relative load targets (repeatable)
    #[arg(long = "include-path")]
    include_paths: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    discovery: DiscoveryArgs,

    /// Artifact path; defaults to the entry name prefixed with `built-`
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep whitespace and comments in bundled files
    #[arg(long)]
    no_minimize: bool,

    /// First line of the artifact
    #[arg(long)]
    header: Option<String>,

    /// Build-time command argument (repeatable)
    #[arg(long = "arg", value_name = "COMMAND.PARAM=VALUE", value_parser = parse_command_argument)]
    arguments: Vec<(String, String, Value)>,

    /// Fail when a build-time command lacks a required argument
    #[arg(long)]
    strict: bool,

    /// Append the entry script verbatim instead of neutralizing its loads
    #[arg(long)]
    raw_entry: bool,
}

fn parse_command_argument(text: &str) -> Result<(String, String, Value), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected COMMAND.PARAM=VALUE, got `{text}`"))?;
    let (command, parameter) = key
        .split_once('.')
        .filter(|(command, parameter)| !command.is_empty() && !parameter.is_empty())
        .ok_or_else(|| format!("expected COMMAND.PARAM before `=`, got `{key}`"))?;
    Ok((command.to_owned(), parameter.to_owned(), Value::parse(value)))
}

impl DiscoveryArgs {
    fn layer(&self) -> PartialConfig {
        PartialConfig {
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            include_paths: self.include_paths.clone(),
            ..PartialConfig::default()
        }
    }
}

impl BuildArgs {
    fn layer(&self) -> PartialConfig {
        let mut layer = self.discovery.layer();
        layer.target.clone_from(&self.output);
        layer.header.clone_from(&self.header);
        if self.no_minimize {
            layer.minimize = Some(false);
        }
        if self.strict {
            layer.binding = Some(BindingPolicy::Strict);
        }
        if self.raw_entry {
            layer.entry = Some(EntrySection::Raw);
        }
        for (command, parameter, value) in &self.arguments {
            layer
                .arguments
                .entry(command.clone())
                .or_default()
                .insert(parameter.clone(), value.clone());
        }
        layer
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Build(args) => {
            let entry = &args.discovery.entry;
            let config = Config::load(entry, args.discovery.config.as_deref(), args.layer())?;
            debug!("Resolved config: {config:?}");

            let report = orchestrator(entry, config).build(entry)?;
            writeln!(
                io::stdout().lock(),
                "{} {} ({} files, {} bytes)",
                "Wrote".green().bold(),
                report.target.display(),
                report.units.len(),
                report.bytes
            )?;
        }
        Commands::Scan(args) => {
            let config = Config::load(&args.entry, args.config.as_deref(), args.layer())?;
            let entries = orchestrator(&args.entry, config).scan(&args.entry)?;

            let mut out = io::stdout().lock();
            for entry in entries {
                let verdict = if entry.allowed {
                    "include".green()
                } else {
                    "exclude".red()
                };
                let source = entry
                    .source
                    .map_or_else(|| "-".to_owned(), |path| path.display().to_string());
                writeln!(
                    out,
                    "{verdict:7} {:9} {} {}",
                    entry.reference.kind.to_string(),
                    entry.reference.name,
                    source.dimmed()
                )?;
            }
        }
    }
    Ok(())
}

fn orchestrator(entry: &Path, config: Config) -> BundleOrchestrator<StaticRuntime> {
    let name = entry
        .file_stem()
        .map_or_else(|| "app".to_owned(), |stem| stem.to_string_lossy().into_owned());
    let mut container = Container::new();
    bootstrap(&mut container, &name, env!("CARGO_PKG_VERSION"));

    let runtime = StaticRuntime::new(config.include_paths.clone());
    BundleOrchestrator::new(config, runtime, container)
}
