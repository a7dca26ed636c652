//! Instances are what evaluating a classification tree on a context
//! produces: the tree of selected node identifiers, plus auxiliary
//! facts (monitor results and warnings) about that selection.
//!
//! Instances own all their data and do not refer back to the tree,
//! so they can be handed off to a reporting layer freely.
use crate::error::PredicateError;
use serde::{Deserialize, Serialize};

/// A selected node, and the selected subset of its children.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct InstanceNode {
    pub label: String,
    pub children: Vec<InstanceNode>,
}

impl InstanceNode {
    #[must_use]
    pub fn new(label: &str, children: Vec<InstanceNode>) -> Self {
        Self {
            label: label.into(),
            children,
        }
    }

    #[must_use]
    pub fn leaf(label: &str) -> Self {
        Self::new(label, Vec::new())
    }

    /// Slash-separated paths from this node to each selected leaf, in
    /// declaration order.  Sibling identifiers are unique, so these
    /// paths fully determine the instance.
    #[must_use]
    pub fn leaf_paths(&self) -> Vec<String> {
        if self.children.is_empty() {
            return vec![self.label.clone()];
        }

        self.children
            .iter()
            .flat_map(InstanceNode::leaf_paths)
            .map(|suffix| format!("{}/{}", self.label, suffix))
            .collect()
    }

    /// Returns true iff the slash-separated `path`, starting with this
    /// node's label, names a node of the instance.
    #[must_use]
    pub fn contains_path(&self, path: &str) -> bool {
        let mut parts = path.split('/');
        if parts.next() != Some(self.label.as_str()) {
            return false;
        }

        let mut current = self;
        for part in parts {
            match current.children.iter().find(|child| child.label == part) {
                Some(child) => current = child,
                None => return false,
            }
        }

        true
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(InstanceNode::node_count)
            .sum::<usize>()
    }
}

/// Renders as `Root(Weather(Clear), Junction)`.
impl std::fmt::Display for InstanceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)?;
        if self.children.is_empty() {
            return Ok(());
        }

        write!(f, "(")?;
        for (index, child) in self.children.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", child)?;
        }
        write!(f, ")")
    }
}

/// Outcome of one monitor on one node of a valid instance.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct MonitorResult {
    pub node: String,
    pub monitor: String,
    pub passed: bool,
}

/// Non-fatal anomalies attached to an instance.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum EvaluationWarning {
    /// Several children of an exclusive node held at once.  This
    /// points at overlapping predicates (or inconsistent data), not
    /// at the tree.
    ExclusiveViolation { node: String, holding: Vec<String> },
    /// A monitor's predicate failed; its result is missing from the
    /// instance.
    MonitorFailed {
        node: String,
        monitor: String,
        message: String,
    },
}

/// A valid instance of a tree for one context.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Instance {
    pub root: InstanceNode,
    pub monitors: Vec<MonitorResult>,
    pub warnings: Vec<EvaluationWarning>,
}

impl Instance {
    /// The root label, followed by the path to each selected leaf
    /// below the root, e.g., `[Root, Weather/Clear, Junction]`.
    #[must_use]
    pub fn path(&self) -> Vec<String> {
        std::iter::once(self.root.label.clone())
            .chain(self.root.children.iter().flat_map(InstanceNode::leaf_paths))
            .collect()
    }

    /// Monitors that reported a deviation.
    pub fn failed_monitors(&self) -> impl Iterator<Item = &MonitorResult> {
        self.monitors.iter().filter(|result| !result.passed)
    }

    #[must_use]
    pub fn is_flagged(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A condition predicate failed on some node; that node was treated
/// as not holding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PredicateFailure {
    pub node: String,
    pub error: PredicateError,
}

/// Everything `instantiate` learned about one context.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Instantiation {
    pub instances: Vec<Instance>,
    pub failures: Vec<PredicateFailure>,
}

impl Instantiation {
    /// Iterates over all the warnings of all the instances.
    pub fn warnings(&self) -> impl Iterator<Item = &EvaluationWarning> {
        self.instances
            .iter()
            .flat_map(|instance| instance.warnings.iter())
    }
}

#[cfg(test)]
fn sample() -> InstanceNode {
    InstanceNode::new(
        "Root",
        vec![
            InstanceNode::new("Weather", vec![InstanceNode::leaf("Clear")]),
            InstanceNode::leaf("Junction"),
        ],
    )
}

#[test]
fn test_paths() {
    let node = sample();

    assert_eq!(node.leaf_paths(), ["Root/Weather/Clear", "Root/Junction"]);
    assert_eq!(node.node_count(), 4);
    assert!(node.contains_path("Root/Weather/Clear"));
    assert!(node.contains_path("Root"));
    assert!(!node.contains_path("Root/Weather/Rain"));
    assert!(!node.contains_path("Weather"));

    let instance = Instance {
        root: node,
        monitors: vec![
            MonitorResult {
                node: "Root/Junction".into(),
                monitor: "slow".into(),
                passed: false,
            },
            MonitorResult {
                node: "Root".into(),
                monitor: "ok".into(),
                passed: true,
            },
        ],
        warnings: Vec::new(),
    };
    assert_eq!(instance.path(), ["Root", "Weather/Clear", "Junction"]);
    assert_eq!(instance.failed_monitors().count(), 1);
    assert!(!instance.is_flagged());
}

#[test]
fn test_display() {
    assert_eq!(sample().to_string(), "Root(Weather(Clear), Junction)");
    assert_eq!(InstanceNode::leaf("Root").to_string(), "Root");
}
