//! Stable identifiers for snapshotable generator methods.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a registered generator method: an opaque name plus an
/// optional namespace qualifier. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodId {
    /// Declaring scope, if any.
    scope: Option<String>,
    /// Method name within the scope.
    name: String,
}

impl MethodId {
    /// Construct a scoped identifier.
    #[must_use]
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            name: name.into(),
        }
    }

    /// Construct an unscoped identifier.
    #[must_use]
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            scope: None,
            name: name.into(),
        }
    }

    /// Derive a stable identifier from a Rust type.
    ///
    /// The module path of `T` becomes the scope and the trailing type name
    /// the method name. Generic parameters are stripped so the identifier
    /// stays stable across instantiations.
    #[must_use]
    pub fn of_type<T: 'static>() -> Self {
        let full = std::any::type_name::<T>();
        let base = full.split('<').next().unwrap_or(full);
        match base.rsplit_once("::") {
            Some((scope, name)) => Self::new(scope, name),
            None => Self::global(base),
        }
    }

    /// Declaring scope, if any.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{scope}::{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<&str> for MethodId {
    fn from(value: &str) -> Self {
        match value.rsplit_once("::") {
            Some((scope, name)) if !scope.is_empty() => Self::new(scope, name),
            _ => Self::global(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample;

    #[test]
    fn of_type_splits_module_path() {
        let id = MethodId::of_type::<Sample>();
        assert_eq!(id.name(), "Sample");
        assert!(id.scope().is_some_and(|s| s.ends_with("identity::tests")));
    }

    #[test]
    fn of_type_strips_generics() {
        let id = MethodId::of_type::<Vec<String>>();
        assert_eq!(id.name(), "Vec");
    }

    #[test]
    fn display_round_trips_through_parse() {
        let id = MethodId::new("demo", "delay");
        assert_eq!(id.to_string(), "demo::delay");
        assert_eq!(MethodId::from("demo::delay"), id);
        assert_eq!(MethodId::from("delay"), MethodId::global("delay"));
    }

    #[test]
    fn identifiers_order_structurally() {
        let a = MethodId::new("a", "x");
        let b = MethodId::new("b", "x");
        assert!(a < b);
        assert_ne!(MethodId::global("x"), MethodId::new("a", "x"));
    }
}
