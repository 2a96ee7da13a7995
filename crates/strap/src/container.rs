//! Alias-keyed dependency container
//!
//! A [`Container`] maps aliases to descriptors (a concrete type plus an
//! ordered argument list) and caches every instance it materializes, so each
//! alias is constructed at most once unless a fresh instance is requested
//! explicitly. The container is an ordinary value owned by its caller; there is
//! no process-wide registry.

use std::{any::Any, fmt, rc::Rc};

use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};
use thiserror::Error;

/// A materialized service
pub type Instance = Rc<dyn Any>;

type ConstructorFn = dyn Fn(&[Resolved]) -> anyhow::Result<Instance>;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("unknown alias `{0}`")]
    UnknownAlias(String),

    #[error("cyclic dependency: {}", chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("alias `{alias}` resolved to `{actual}`, not `{expected}`")]
    TypeMismatch {
        alias: String,
        expected: &'static str,
        actual: String,
    },

    #[error("failed to construct `{alias}` as `{concrete}`")]
    Construction {
        alias: String,
        concrete: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A constructor argument after resolution
#[derive(Clone)]
pub enum Resolved {
    Instance(Instance),
    Literal(String),
}

impl Resolved {
    /// Downcast an instance argument to its concrete type
    pub fn instance<T: Any>(&self) -> anyhow::Result<Rc<T>> {
        match self {
            Self::Instance(instance) => Rc::clone(instance).downcast::<T>().map_err(|_| {
                anyhow::anyhow!("argument is not a `{}`", std::any::type_name::<T>())
            }),
            Self::Literal(text) => Err(anyhow::anyhow!(
                "expected a `{}` instance, got literal `{text}`",
                std::any::type_name::<T>()
            )),
        }
    }

    pub fn literal(&self) -> anyhow::Result<&str> {
        match self {
            Self::Literal(text) => Ok(text),
            Self::Instance(_) => Err(anyhow::anyhow!("expected a literal, got an instance")),
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(_) => f.write_str("Instance(..)"),
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
        }
    }
}

/// How a descriptor argument is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Must name a cached or registered alias
    Alias(String),
    /// A cached instance, else a registered alias, else the text as a literal
    Auto(String),
    /// Always passed as literal text
    Literal(String),
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Auto(value.to_owned())
    }
}

/// The concrete type an alias is built as
#[derive(Clone)]
pub struct Concrete {
    name: String,
    construct: Rc<ConstructorFn>,
}

impl Concrete {
    pub fn new<F>(name: impl Into<String>, construct: F) -> Self
    where
        F: Fn(&[Resolved]) -> anyhow::Result<Instance> + 'static,
    {
        Self {
            name: name.into(),
            construct: Rc::new(construct),
        }
    }

    /// Concrete type named after `T`, whose constructor returns a plain `T`
    pub fn of<T, F>(construct: F) -> Self
    where
        T: Any,
        F: Fn(&[Resolved]) -> anyhow::Result<T> + 'static,
    {
        Self::new(std::any::type_name::<T>(), move |args| {
            construct(args).map(|value| Rc::new(value) as Instance)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Concrete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Concrete").field("name", &self.name).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct Descriptor {
    alias: String,
    concrete: Concrete,
    args: Vec<Arg>,
}

#[derive(Default)]
pub struct Container {
    descriptors: IndexMap<String, Descriptor>,
    instances: IndexMap<String, Instance>,
    /// Aliases currently under construction, in resolution order
    resolving: IndexSet<String>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("descriptors", &self.descriptors.keys().collect::<Vec<_>>())
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the descriptor for `alias`
    ///
    /// Replacing a descriptor evicts the instance cached for the old one.
    pub fn register<A>(&mut self, alias: &str, concrete: Concrete, args: A) -> &mut Self
    where
        A: IntoIterator,
        A::Item: Into<Arg>,
    {
        let descriptor = Descriptor {
            alias: alias.to_owned(),
            concrete,
            args: args.into_iter().map(Into::into).collect(),
        };
        debug!(
            "Registering `{alias}` as `{}` with {} argument(s)",
            descriptor.concrete.name(),
            descriptor.args.len()
        );
        if self
            .descriptors
            .insert(alias.to_owned(), descriptor)
            .is_some()
        {
            self.instances.shift_remove(alias);
        }
        self
    }

    /// Cache a ready-made instance under `alias`
    pub fn set_instance(&mut self, alias: &str, instance: Instance) -> &mut Self {
        self.instances.insert(alias.to_owned(), instance);
        self
    }

    pub fn is_cached(&self, alias: &str) -> bool {
        self.instances.contains_key(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    /// Resolve `alias`, constructing and caching it on first use
    ///
    /// With `force_new` a fresh instance is constructed and replaces the
    /// cached one; its dependencies are still taken from the cache.
    pub fn resolve(&mut self, alias: &str, force_new: bool) -> Result<Instance, ContainerError> {
        if !force_new {
            if let Some(instance) = self.instances.get(alias) {
                return Ok(Rc::clone(instance));
            }
        }

        let descriptor = self
            .descriptors
            .get(alias)
            .cloned()
            .ok_or_else(|| ContainerError::UnknownAlias(alias.to_owned()))?;

        if !self.resolving.insert(alias.to_owned()) {
            let mut chain: Vec<String> = self.resolving.iter().cloned().collect();
            chain.push(alias.to_owned());
            self.resolving.clear();
            return Err(ContainerError::CyclicDependency { chain });
        }

        let constructed = self.construct(&descriptor);
        self.resolving.shift_remove(alias);
        let instance = constructed?;

        trace!("Materialized `{alias}` as `{}`", descriptor.concrete.name());
        self.instances
            .insert(alias.to_owned(), Rc::clone(&instance));
        Ok(instance)
    }

    /// Resolve `alias` and downcast it to `T`
    pub fn resolve_as<T: Any>(&mut self, alias: &str) -> Result<Rc<T>, ContainerError> {
        let instance = self.resolve(alias, false)?;
        instance
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                alias: alias.to_owned(),
                expected: std::any::type_name::<T>(),
                actual: self
                    .descriptors
                    .get(alias)
                    .map_or_else(|| "<instance>".to_owned(), |d| d.concrete.name().to_owned()),
            })
    }

    /// Materialize every registered alias that is not cached yet
    pub fn resolve_all(&mut self) -> Result<(), ContainerError> {
        let pending: Vec<String> = self
            .descriptors
            .keys()
            .filter(|alias| !self.instances.contains_key(*alias))
            .cloned()
            .collect();
        for alias in pending {
            self.resolve(&alias, false)?;
        }
        Ok(())
    }

    fn construct(&mut self, descriptor: &Descriptor) -> Result<Instance, ContainerError> {
        let mut resolved = Vec::with_capacity(descriptor.args.len());
        for arg in &descriptor.args {
            let value = match arg {
                Arg::Alias(alias) => Resolved::Instance(self.resolve(alias, false)?),
                Arg::Auto(name) => {
                    if self.instances.contains_key(name) || self.descriptors.contains_key(name) {
                        Resolved::Instance(self.resolve(name, false)?)
                    } else {
                        Resolved::Literal(name.clone())
                    }
                }
                Arg::Literal(text) => Resolved::Literal(text.clone()),
            };
            resolved.push(value);
        }

        (descriptor.concrete.construct)(&resolved).map_err(|source| {
            ContainerError::Construction {
                alias: descriptor.alias.clone(),
                concrete: descriptor.concrete.name().to_owned(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[derive(Debug)]
    struct Greeter {
        greeting: String,
    }

    #[derive(Debug)]
    struct Service {
        greeter: Rc<Greeter>,
        name: String,
    }

    fn greeter() -> Concrete {
        Concrete::of(|args: &[Resolved]| {
            Ok(Greeter {
                greeting: args[0].literal()?.to_owned(),
            })
        })
    }

    fn service() -> Concrete {
        Concrete::of(|args: &[Resolved]| {
            Ok(Service {
                greeter: args[0].instance::<Greeter>()?,
                name: args[1].literal()?.to_owned(),
            })
        })
    }

    #[test]
    fn test_resolve_returns_cached_instance() {
        let mut container = Container::new();
        container.register("greeter", greeter(), [Arg::Literal("hi".into())]);

        let first = container.resolve("greeter", false).unwrap();
        let second = container.resolve("greeter", false).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_force_new_constructs_again() {
        let built = Rc::new(Cell::new(0));
        let counter = Rc::clone(&built);
        let mut container = Container::new();
        container.register(
            "counted",
            Concrete::of(move |_: &[Resolved]| {
                counter.set(counter.get() + 1);
                Ok(())
            }),
            Vec::<Arg>::new(),
        );

        let first = container.resolve("counted", false).unwrap();
        let fresh = container.resolve("counted", true).unwrap();
        let cached = container.resolve("counted", false).unwrap();
        assert_eq!(built.get(), 2);
        assert!(!Rc::ptr_eq(&first, &fresh));
        assert!(Rc::ptr_eq(&fresh, &cached));
    }

    #[test]
    fn test_recursive_wiring_shares_dependencies() {
        let mut container = Container::new();
        container
            .register("greeter", greeter(), [Arg::Literal("hello".into())])
            .register("service", service(), ["greeter", "main"]);

        let service = container.resolve_as::<Service>("service").unwrap();
        let greeter = container.resolve_as::<Greeter>("greeter").unwrap();
        assert!(Rc::ptr_eq(&service.greeter, &greeter));
        assert_eq!(service.greeter.greeting, "hello");
        assert_eq!(service.name, "main");
    }

    #[test]
    fn test_unknown_alias() {
        let mut container = Container::new();
        let err = container.resolve("missing", false).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownAlias(alias) if alias == "missing"));
    }

    #[test]
    fn test_unregistered_auto_argument_is_literal() {
        let mut container = Container::new();
        container.register("greeter", greeter(), ["not-an-alias"]);

        let greeter = container.resolve_as::<Greeter>("greeter").unwrap();
        assert_eq!(greeter.greeting, "not-an-alias");
    }

    #[test]
    fn test_unregistered_alias_argument_is_an_error() {
        let mut container = Container::new();
        container.register(
            "service",
            service(),
            [Arg::Alias("greeter".into()), Arg::Literal("x".into())],
        );

        let err = container.resolve("service", false).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownAlias(alias) if alias == "greeter"));
        assert!(!container.is_cached("service"));
    }

    #[test]
    fn test_cached_instance_without_descriptor() {
        let mut container = Container::new();
        container.set_instance(
            "greeter",
            Rc::new(Greeter {
                greeting: "preset".into(),
            }),
        );
        container.register("service", service(), ["greeter", "svc"]);

        let service = container.resolve_as::<Service>("service").unwrap();
        assert_eq!(service.greeter.greeting, "preset");
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut container = Container::new();
        let passthrough = || Concrete::new("Node", |_: &[Resolved]| Ok(Rc::new(()) as Instance));
        container
            .register("a", passthrough(), [Arg::Alias("b".into())])
            .register("b", passthrough(), [Arg::Alias("c".into())])
            .register("c", passthrough(), [Arg::Alias("a".into())]);

        let err = container.resolve("a", false).unwrap_err();
        match err {
            ContainerError::CyclicDependency { chain } => {
                assert_eq!(chain, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }

        // A failed resolution leaves the container usable
        container.register("c", passthrough(), Vec::<Arg>::new());
        assert!(container.resolve("a", false).is_ok());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut container = Container::new();
        container.register("me", greeter(), ["me"]);
        assert!(matches!(
            container.resolve("me", false),
            Err(ContainerError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let mut container = Container::new();
        container.register("greeter", greeter(), ["x"]);
        let err = container.resolve_as::<Service>("greeter").unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_construction_error_names_alias() {
        let mut container = Container::new();
        container.register("service", service(), ["only-a-literal", "x"]);
        let err = container.resolve("service", false).unwrap_err();
        assert!(
            matches!(err, ContainerError::Construction { ref alias, .. } if alias == "service"),
            "{err}"
        );
    }

    #[test]
    fn test_resolve_all_and_reregistration() {
        let mut container = Container::new();
        container
            .register("greeter", greeter(), [Arg::Literal("one".into())])
            .register("service", service(), ["greeter", "s"]);
        container.resolve_all().unwrap();
        assert!(container.is_cached("greeter") && container.is_cached("service"));

        container.register("greeter", greeter(), [Arg::Literal("two".into())]);
        assert!(!container.is_cached("greeter"));
        let greeter = container.resolve_as::<Greeter>("greeter").unwrap();
        assert_eq!(greeter.greeting, "two");
    }
}
