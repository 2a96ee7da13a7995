//! The command-line micro-framework
//!
//! An [`Application`] owns an ordered table of [`Command`]s. Each command
//! declares its [`Parameter`]s so callers can bind arguments by name, both when
//! dispatching a [`Request`] and when the bundler runs commands at build time.

mod application;
mod binding;
mod bootstrap;
mod command;
mod services;

pub use application::Application;
pub use binding::{BindingPolicy, MissingArgument, bind_arguments};
pub use bootstrap::{
    APPLICATION_ALIAS, DOC_PARSER_ALIAS, REQUEST_ALIAS, RESPONSE_ALIAS, STYLE_ALIAS, bootstrap,
};
pub use command::{Argument, Command, Parameter, ParameterKind, Value};
pub use services::{DocBlock, DocParser, Request, Response, Style};
