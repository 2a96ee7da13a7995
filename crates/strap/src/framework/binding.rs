//! Matching supplied arguments against a command's parameter list

use std::rc::Rc;

use indexmap::IndexMap;
use log::warn;
use serde::Deserialize;
use thiserror::Error;

use super::{Application, Argument, Command, ParameterKind, Value};

/// What happens when a required parameter has no supplied value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingPolicy {
    /// Pass `null` and invoke the command anyway
    #[default]
    Lenient,
    /// Refuse to invoke the command
    Strict,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("command `{command}` is missing required argument `{parameter}`")]
pub struct MissingArgument {
    pub command: String,
    pub parameter: String,
}

/// Build the argument list for `command` from named values
///
/// Application parameters are injected rather than taken from `supplied`.
/// Optional parameters fall back to their default. Supplied names that match
/// no parameter are ignored.
pub fn bind_arguments(
    command: &Command,
    supplied: &IndexMap<String, Value>,
    application: &Rc<Application>,
    policy: BindingPolicy,
) -> Result<Vec<Argument>, MissingArgument> {
    let mut arguments = Vec::with_capacity(command.parameters().len());

    for parameter in command.parameters() {
        if parameter.kind == ParameterKind::Application {
            arguments.push(Argument::Application(Rc::clone(application)));
            continue;
        }

        let value = match supplied.get(&parameter.name) {
            Some(value) => value.clone(),
            None if parameter.optional => parameter.default.clone().unwrap_or(Value::Null),
            None => match policy {
                BindingPolicy::Strict => {
                    return Err(MissingArgument {
                        command: command.name().to_owned(),
                        parameter: parameter.name.clone(),
                    });
                }
                BindingPolicy::Lenient => {
                    warn!(
                        "Command `{}` has no value for required argument `{}`; passing null",
                        command.name(),
                        parameter.name
                    );
                    Value::Null
                }
            },
        };
        arguments.push(Argument::Value(value));
    }

    Ok(arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Parameter;

    fn command() -> Command {
        Command::new("publish", |_| Ok(()))
            .param(Parameter::application("app"))
            .param(Parameter::required("target"))
            .param(Parameter::optional("retries", Value::Int(3)))
    }

    fn supplied(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn test_binds_in_parameter_order() {
        let app = Rc::new(Application::new("demo", "1.0"));
        let args = bind_arguments(
            &command(),
            &supplied(&[("retries", Value::Int(5)), ("target", Value::Str("dist".into()))]),
            &app,
            BindingPolicy::Strict,
        )
        .unwrap();

        assert!(Rc::ptr_eq(args[0].application().unwrap(), &app));
        assert_eq!(args[1].as_str(), Some("dist"));
        assert_eq!(args[2].value(), Some(&Value::Int(5)));
    }

    #[test]
    fn test_optional_parameter_uses_default() {
        let app = Rc::new(Application::new("demo", "1.0"));
        let args = bind_arguments(
            &command(),
            &supplied(&[("target", Value::Str("dist".into()))]),
            &app,
            BindingPolicy::Strict,
        )
        .unwrap();
        assert_eq!(args[2].value(), Some(&Value::Int(3)));
    }

    #[test]
    fn test_lenient_policy_substitutes_null_for_missing_required() {
        let app = Rc::new(Application::new("demo", "1.0"));
        let args =
            bind_arguments(&command(), &IndexMap::new(), &app, BindingPolicy::Lenient).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args[1].value(), Some(&Value::Null));
    }

    #[test]
    fn test_strict_policy_rejects_missing_required() {
        let app = Rc::new(Application::new("demo", "1.0"));
        let err =
            bind_arguments(&command(), &IndexMap::new(), &app, BindingPolicy::Strict).unwrap_err();
        assert_eq!(
            err,
            MissingArgument {
                command: "publish".into(),
                parameter: "target".into(),
            }
        );
    }

    #[test]
    fn test_application_parameter_ignores_supplied_value() {
        let app = Rc::new(Application::new("demo", "1.0"));
        let args = bind_arguments(
            &command(),
            &supplied(&[("app", Value::Str("spoofed".into())), ("target", Value::Null)]),
            &app,
            BindingPolicy::Strict,
        )
        .unwrap();
        assert!(args[0].application().is_some());
    }
}
