//! Commands and their introspectable parameter lists

use std::{fmt, rc::Rc};

use serde::Deserialize;

use super::Application;

/// A user-supplied argument value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Interpret command-line text: booleans and integers are typed, everything
    /// else stays a string
    pub fn parse(text: &str) -> Self {
        match text {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            "null" => Self::Null,
            _ => text
                .parse::<i64>()
                .map_or_else(|_| Self::Str(text.to_owned()), Self::Int),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
            Self::List(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// What a parameter receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// A user-supplied value
    Value,
    /// The running application, injected automatically
    Application,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub optional: bool,
    pub default: Option<Value>,
}

impl Parameter {
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: ParameterKind::Value,
            optional: false,
            default: None,
        }
    }

    pub fn optional(name: &str, default: Value) -> Self {
        Self {
            name: name.to_owned(),
            kind: ParameterKind::Value,
            optional: true,
            default: Some(default),
        }
    }

    pub fn application(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: ParameterKind::Application,
            optional: false,
            default: None,
        }
    }
}

/// A bound argument, in parameter order
#[derive(Clone)]
pub enum Argument {
    Value(Value),
    Application(Rc<Application>),
}

impl Argument {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Application(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value().and_then(Value::as_str)
    }

    pub fn application(&self) -> Option<&Rc<Application>> {
        match self {
            Self::Application(app) => Some(app),
            Self::Value(_) => None,
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Application(app) => f.debug_tuple("Application").field(&app.name()).finish(),
        }
    }
}

type Handler = dyn Fn(&[Argument]) -> anyhow::Result<()>;

/// A named handler with a declared parameter list
#[derive(Clone)]
pub struct Command {
    name: String,
    description: String,
    parameters: Vec<Parameter>,
    handler: Rc<Handler>,
}

impl Command {
    pub fn new<F>(name: &str, handler: F) -> Self
    where
        F: Fn(&[Argument]) -> anyhow::Result<()> + 'static,
    {
        Self {
            name: name.to_owned(),
            description: String::new(),
            parameters: Vec::new(),
            handler: Rc::new(handler),
        }
    }

    /// Description text; doc-comment syntax is accepted
    #[must_use]
    pub fn describe(mut self, description: &str) -> Self {
        description.clone_into(&mut self.description);
        self
    }

    #[must_use]
    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn invoke(&self, arguments: &[Argument]) -> anyhow::Result<()> {
        (self.handler)(arguments)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse("42"), Value::Int(42));
        assert_eq!(Value::parse("true"), Value::Bool(true));
        assert_eq!(Value::parse("null"), Value::Null);
        assert_eq!(Value::parse("dist/app"), Value::Str("dist/app".into()));
    }

    #[test]
    fn test_value_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Holder {
            values: Vec<Value>,
        }
        let holder: Holder = toml::from_str(r#"values = [1, "two", true, [3]]"#).unwrap();
        assert_eq!(
            holder.values,
            vec![
                Value::Int(1),
                Value::Str("two".into()),
                Value::Bool(true),
                Value::List(vec![Value::Int(3)]),
            ]
        );
    }

    #[test]
    fn test_value_display() {
        let list = Value::List(vec![Value::Int(1), Value::Str("a".into()), Value::Null]);
        assert_eq!(list.to_string(), "[1, a, null]");
    }
}
