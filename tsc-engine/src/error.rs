//! Errors come in two very different flavours.  Construction errors
//! mean the tree declaration itself is broken, and the tree must not
//! be used at all.  Predicate errors are local to one node and one
//! context: the engine records them and keeps going.
use thiserror::Error;

/// Construction errors, reported by `build` before any tree is
/// handed out.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum BuildError {
    /// Two children of the same node share an identifier.
    #[error("duplicate identifier '{identifier}' under '{parent}'")]
    DuplicateIdentifier {
        /// Path of the parent node.
        parent: String,
        /// The repeated identifier.
        identifier: String,
    },

    /// Identifiers must be non-empty and may not contain `/`, the
    /// path separator.
    #[error("invalid identifier '{identifier}' under '{parent}'")]
    InvalidIdentifier {
        /// Path of the parent node, empty for the root.
        parent: String,
        /// The rejected identifier.
        identifier: String,
    },

    /// Only container nodes may have children.
    #[error("leaf node '{node}' has children")]
    LeafWithChildren {
        /// Path of the offending node.
        node: String,
    },

    /// Monitor names must be unique on each node.
    #[error("duplicate monitor '{monitor}' on '{node}'")]
    DuplicateMonitor {
        /// Path of the offending node.
        node: String,
        /// The repeated monitor name.
        monitor: String,
    },

    /// An exclusive node must offer at least one choice.
    #[error("exclusive node '{node}' has no children")]
    EmptyExclusive {
        /// Path of the offending node.
        node: String,
    },

    /// `Bounded { min, max }` needs `min <= max <= children`.
    #[error("bounded node '{node}' has range [{min}, {max}] but {children} children")]
    InvalidBounds {
        /// Path of the offending node.
        node: String,
        /// Declared lower bound.
        min: usize,
        /// Declared upper bound.
        max: usize,
        /// Number of declared children.
        children: usize,
    },

    /// The root is always present; it may not carry a condition.
    #[error("root node '{node}' must not have a condition")]
    ConditionalRoot {
        /// Identifier of the root.
        node: String,
    },

    /// A node refers to a projection tag the tree never declared.
    #[error("node '{node}' refers to undeclared projection '{tag}'")]
    UndeclaredProjection {
        /// Path of the offending node.
        node: String,
        /// The dangling tag.
        tag: String,
    },

    /// The tree declares the same projection tag twice.
    #[error("projection '{tag}' declared more than once")]
    DuplicateProjection {
        /// The repeated tag.
        tag: String,
    },

    /// A named condition or monitor is missing from the registry.
    #[error("node '{node}' refers to unknown predicate '{name}'")]
    UnknownPredicate {
        /// Path of the offending node.
        node: String,
        /// The unresolved predicate name.
        name: String,
    },
}

/// A predicate could not decide on a context, e.g., because the
/// segment lacks the data it needs.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("predicate '{predicate}' failed: {message}")]
pub struct PredicateError {
    pub predicate: String,
    pub message: String,
}

impl PredicateError {
    #[must_use]
    pub fn new(predicate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
            message: message.into(),
        }
    }
}

#[test]
fn test_messages() {
    let err = BuildError::InvalidBounds {
        node: "Root/Signs".into(),
        min: 2,
        max: 1,
        children: 3,
    };
    assert_eq!(
        err.to_string(),
        "bounded node 'Root/Signs' has range [2, 1] but 3 children"
    );

    let err = PredicateError::new("isInJunction", "no lane data");
    assert_eq!(
        err.to_string(),
        "predicate 'isInJunction' failed: no lane data"
    );
}
