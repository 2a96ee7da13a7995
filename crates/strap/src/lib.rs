//! A small CLI application framework and the bundler that packs an
//! application built on it into one executable PHP script.

pub mod bundle;
pub mod config;
pub mod container;
pub mod dirs;
pub mod error;
pub mod filter;
pub mod framework;
pub mod minify;
pub mod namespaces;
pub mod neutralizer;
pub mod orchestrator;
pub mod runtime;
pub mod tokenizer;

pub use config::{Config, PartialConfig};
pub use container::{Container, ContainerError};
pub use error::BuildError;
pub use filter::ClassFilter;
pub use orchestrator::{BuildReport, BundleOrchestrator};
pub use runtime::{ScriptRuntime, StaticRuntime};
