//! Classification trees are declared as plain nested data
//! (`NodeSpec`s under a `TreeSpec`), and turned into an immutable
//! `Tree` by a single validating pass.  The declaration may name its
//! predicates instead of capturing closures; names are resolved
//! against a `PredicateRegistry` during that pass.
//!
//! Every structural invariant is checked here, once, so that
//! projection, instantiation and counting never need to second-guess
//! the tree: a `Tree` value is always well-formed.
use crate::error::BuildError;
use crate::node::{Node, NodeId, NodeKind, ProjectionMembership, Tree};
use crate::predicate::{ConditionRef, Predicate, PredicateRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Declaration of one node and, recursively, of its children.
pub struct NodeSpec<C> {
    identifier: String,
    kind: NodeKind,
    condition: Option<ConditionRef<C>>,
    monitors: Vec<(String, ConditionRef<C>)>,
    projections: Vec<ProjectionMembership>,
    children: Vec<NodeSpec<C>>,
}

impl<C> NodeSpec<C> {
    #[must_use]
    pub fn new(kind: NodeKind, identifier: &str) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            condition: None,
            monitors: Vec::new(),
            projections: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn leaf(identifier: &str) -> Self {
        Self::new(NodeKind::Leaf, identifier)
    }

    #[must_use]
    pub fn all(identifier: &str) -> Self {
        Self::new(NodeKind::All, identifier)
    }

    #[must_use]
    pub fn optional(identifier: &str) -> Self {
        Self::new(NodeKind::Optional, identifier)
    }

    #[must_use]
    pub fn exclusive(identifier: &str) -> Self {
        Self::new(NodeKind::Exclusive, identifier)
    }

    #[must_use]
    pub fn bounded(identifier: &str, min: usize, max: usize) -> Self {
        Self::new(NodeKind::Bounded { min, max }, identifier)
    }

    /// Sets the node's condition; without one, the node always holds.
    #[must_use]
    pub fn condition(mut self, condition: impl Into<ConditionRef<C>>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Attaches monitor `name`, evaluated on instances that include
    /// this node.
    #[must_use]
    pub fn monitor(mut self, name: &str, predicate: impl Into<ConditionRef<C>>) -> Self {
        self.monitors.push((name.into(), predicate.into()));
        self
    }

    /// Adds this node (only) to projection `tag`.
    #[must_use]
    pub fn projection(self, tag: &str) -> Self {
        self.member_of(tag, false)
    }

    /// Adds this node and all its descendants to projection `tag`.
    #[must_use]
    pub fn projection_recursive(self, tag: &str) -> Self {
        self.member_of(tag, true)
    }

    fn member_of(mut self, tag: &str, recursive: bool) -> Self {
        match self.projections.iter_mut().find(|m| m.tag == tag) {
            Some(existing) => existing.recursive |= recursive,
            None => self.projections.push(ProjectionMembership {
                tag: tag.into(),
                recursive,
            }),
        }

        self
    }

    #[must_use]
    pub fn child(mut self, child: NodeSpec<C>) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn children<I: IntoIterator<Item = NodeSpec<C>>>(mut self, children: I) -> Self {
        self.children.extend(children);
        self
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Declaration of a whole tree: a label, the projection tags nodes
/// may refer to, and the root node.
pub struct TreeSpec<C> {
    label: String,
    projections: Vec<String>,
    root: NodeSpec<C>,
}

impl<C> TreeSpec<C> {
    #[must_use]
    pub fn new(label: &str, root: NodeSpec<C>) -> Self {
        Self {
            label: label.into(),
            projections: Vec::new(),
            root,
        }
    }

    /// Declares projection tags that nodes may refer to.
    #[must_use]
    pub fn projections<'a, I: IntoIterator<Item = &'a str>>(mut self, tags: I) -> Self {
        self.projections.extend(tags.into_iter().map(String::from));
        self
    }

    /// Validates the declaration and returns the corresponding tree.
    ///
    /// # Errors
    ///
    /// See `build`.
    pub fn build(self, registry: &PredicateRegistry<C>) -> Result<Tree<C>, BuildError> {
        build(self, registry)
    }
}

/// Converts `spec` into an immutable `Tree`, resolving named
/// predicates in `registry`.
///
/// # Errors
///
/// Returns `Err` when the declaration violates a structural
/// invariant: conditional root, invalid or repeated sibling
/// identifiers, leaf with children, exclusive node without children,
/// invalid bounded range, projection tag used but not declared (or
/// declared twice), repeated monitor name, or predicate name missing
/// from `registry`.
pub fn build<C>(spec: TreeSpec<C>, registry: &PredicateRegistry<C>) -> Result<Tree<C>, BuildError> {
    let TreeSpec {
        label,
        projections,
        root,
    } = spec;

    let mut declared = HashSet::new();
    for tag in &projections {
        if !declared.insert(tag.clone()) {
            return Err(BuildError::DuplicateProjection { tag: tag.clone() });
        }
    }

    if root.condition.is_some() {
        return Err(BuildError::ConditionalRoot {
            node: root.identifier,
        });
    }

    let mut state = BuildState {
        registry,
        declared,
        next_id: 0,
    };
    let root = state.build_node(root, "")?;
    debug!(
        tree = %label,
        nodes = state.next_id,
        projections = projections.len(),
        "built classification tree"
    );

    Ok(Tree::new(label, None, projections, root))
}

struct BuildState<'a, C> {
    registry: &'a PredicateRegistry<C>,
    declared: HashSet<String>,
    next_id: u32,
}

impl<'a, C> BuildState<'a, C> {
    fn build_node(&mut self, spec: NodeSpec<C>, parent: &str) -> Result<Arc<Node<C>>, BuildError> {
        if spec.identifier.is_empty() || spec.identifier.contains('/') {
            return Err(BuildError::InvalidIdentifier {
                parent: parent.into(),
                identifier: spec.identifier,
            });
        }

        let path = if parent.is_empty() {
            spec.identifier.clone()
        } else {
            format!("{}/{}", parent, spec.identifier)
        };

        check_arity(spec.kind, spec.children.len(), &path)?;

        let mut siblings = HashSet::new();
        for child in &spec.children {
            if !siblings.insert(child.identifier.as_str()) {
                return Err(BuildError::DuplicateIdentifier {
                    parent: path,
                    identifier: child.identifier.clone(),
                });
            }
        }

        for membership in &spec.projections {
            if !self.declared.contains(&membership.tag) {
                return Err(BuildError::UndeclaredProjection {
                    node: path,
                    tag: membership.tag.clone(),
                });
            }
        }

        let condition = match &spec.condition {
            Some(condition) => Some(self.resolve(condition, &path)?),
            None => None,
        };

        let mut monitors: Vec<(String, Predicate<C>)> = Vec::with_capacity(spec.monitors.len());
        for (name, predicate) in &spec.monitors {
            if monitors.iter().any(|(existing, _)| existing == name) {
                return Err(BuildError::DuplicateMonitor {
                    node: path,
                    monitor: name.clone(),
                });
            }

            monitors.push((name.clone(), self.resolve(predicate, &path)?));
        }

        // Pre-order numbering: parents before their children.
        let id = NodeId::new(self.next_id);
        self.next_id += 1;

        let mut children = Vec::with_capacity(spec.children.len());
        for child in spec.children {
            children.push(self.build_node(child, &path)?);
        }

        Ok(Arc::new(Node {
            id,
            identifier: spec.identifier,
            path,
            kind: spec.kind,
            condition,
            monitors,
            projections: spec.projections,
            children,
        }))
    }

    fn resolve(&self, condition: &ConditionRef<C>, path: &str) -> Result<Predicate<C>, BuildError> {
        self.registry
            .resolve(condition)
            .ok_or_else(|| BuildError::UnknownPredicate {
                node: path.into(),
                name: condition.name().into(),
            })
    }
}

/// Checks the child count against the node's kind.
fn check_arity(kind: NodeKind, children: usize, path: &str) -> Result<(), BuildError> {
    match kind {
        NodeKind::Leaf if children > 0 => Err(BuildError::LeafWithChildren { node: path.into() }),
        NodeKind::Exclusive if children == 0 => {
            Err(BuildError::EmptyExclusive { node: path.into() })
        }
        NodeKind::Bounded { min, max } if min > max || max > children => {
            Err(BuildError::InvalidBounds {
                node: path.into(),
                min,
                max,
                children,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
fn weather_spec() -> TreeSpec<u32> {
    TreeSpec::new(
        "weather",
        NodeSpec::all("Root")
            .projection_recursive("all")
            .child(
                NodeSpec::exclusive("Weather")
                    .projection("static")
                    .child(NodeSpec::leaf("Clear").condition("clear"))
                    .child(NodeSpec::leaf("Rain").condition("rain")),
            )
            .child(
                NodeSpec::leaf("Junction")
                    .condition("junction")
                    .monitor("slow", "slow"),
            ),
    )
    .projections(vec!["all", "static"])
}

#[cfg(test)]
fn weather_registry() -> PredicateRegistry<u32> {
    PredicateRegistry::new()
        .with(Predicate::infallible("clear", |x| x & 1 != 0))
        .with(Predicate::infallible("rain", |x| x & 2 != 0))
        .with(Predicate::infallible("junction", |x| x & 4 != 0))
        .with(Predicate::infallible("slow", |x| x & 8 != 0))
}

#[test]
fn test_build_happy_path() {
    let tree = weather_spec().build(&weather_registry()).expect("ok");

    assert_eq!(tree.label(), "weather");
    assert_eq!(tree.projection(), None);
    assert_eq!(tree.declared_projections(), ["all", "static"]);
    assert_eq!(tree.node_count(), 5);

    let rain = tree.node("Root/Weather/Rain").expect("present");
    assert_eq!(rain.id().index(), 3);
    assert_eq!(rain.kind(), NodeKind::Leaf);
    assert_eq!(rain.condition().expect("has condition").name(), "rain");

    let junction = tree.node("Root/Junction").expect("present");
    assert_eq!(junction.monitors().len(), 1);
    assert_eq!(junction.monitors()[0].0, "slow");

    assert!(tree.root().condition().is_none());
    assert_eq!(tree.root().membership("all"), Some(true));
}

#[test]
fn test_duplicate_sibling() {
    let spec = TreeSpec::new(
        "dup",
        NodeSpec::<u32>::all("Root")
            .child(NodeSpec::leaf("A"))
            .child(NodeSpec::optional("B").child(NodeSpec::leaf("A")))
            .child(NodeSpec::leaf("A")),
    );

    assert_eq!(
        spec.build(&PredicateRegistry::new()).unwrap_err(),
        BuildError::DuplicateIdentifier {
            parent: "Root".into(),
            identifier: "A".into(),
        }
    );
}

#[test]
fn test_same_identifier_in_different_subtrees() {
    let spec = TreeSpec::new(
        "cousins",
        NodeSpec::<u32>::all("Root")
            .child(NodeSpec::optional("A").child(NodeSpec::leaf("X")))
            .child(NodeSpec::optional("B").child(NodeSpec::leaf("X"))),
    );

    let tree = spec.build(&PredicateRegistry::new()).expect("ok");
    assert!(tree.node("Root/A/X").is_some());
    assert!(tree.node("Root/B/X").is_some());
}

#[test]
fn test_structural_errors() {
    let registry = PredicateRegistry::<u32>::new();

    let empty_exclusive = TreeSpec::new(
        "t",
        NodeSpec::all("Root").child(NodeSpec::exclusive("Choice")),
    );
    assert_eq!(
        empty_exclusive.build(&registry).unwrap_err(),
        BuildError::EmptyExclusive {
            node: "Root/Choice".into()
        }
    );

    let bad_bounds = TreeSpec::new(
        "t",
        NodeSpec::bounded("Root", 1, 3)
            .child(NodeSpec::leaf("A"))
            .child(NodeSpec::leaf("B")),
    );
    assert_eq!(
        bad_bounds.build(&registry).unwrap_err(),
        BuildError::InvalidBounds {
            node: "Root".into(),
            min: 1,
            max: 3,
            children: 2,
        }
    );

    let inverted = TreeSpec::new(
        "t",
        NodeSpec::bounded("Root", 2, 1)
            .child(NodeSpec::leaf("A"))
            .child(NodeSpec::leaf("B")),
    );
    assert!(matches!(
        inverted.build(&registry),
        Err(BuildError::InvalidBounds { .. })
    ));

    let leaf_parent = TreeSpec::new(
        "t",
        NodeSpec::all("Root").child(NodeSpec::leaf("A").child(NodeSpec::leaf("B"))),
    );
    assert_eq!(
        leaf_parent.build(&registry).unwrap_err(),
        BuildError::LeafWithChildren {
            node: "Root/A".into()
        }
    );

    let slash = TreeSpec::new("t", NodeSpec::all("Root").child(NodeSpec::leaf("A/B")));
    assert!(matches!(
        slash.build(&registry),
        Err(BuildError::InvalidIdentifier { .. })
    ));
}

#[test]
fn test_conditional_root() {
    let registry = weather_registry();
    let spec = TreeSpec::new("t", NodeSpec::all("Root").condition("clear"));

    assert_eq!(
        spec.build(&registry).unwrap_err(),
        BuildError::ConditionalRoot {
            node: "Root".into()
        }
    );
}

#[test]
fn test_projection_declarations() {
    let registry = PredicateRegistry::<u32>::new();

    let dangling = TreeSpec::new(
        "t",
        NodeSpec::all("Root").child(NodeSpec::leaf("A").projection_recursive("dynamic")),
    )
    .projections(vec!["static"]);
    assert_eq!(
        dangling.build(&registry).unwrap_err(),
        BuildError::UndeclaredProjection {
            node: "Root/A".into(),
            tag: "dynamic".into(),
        }
    );

    let twice = TreeSpec::new("t", NodeSpec::all("Root")).projections(vec!["a", "a"]);
    assert_eq!(
        twice.build(&registry).unwrap_err(),
        BuildError::DuplicateProjection { tag: "a".into() }
    );
}

#[test]
fn test_membership_merge() {
    let spec = TreeSpec::new(
        "t",
        NodeSpec::<u32>::all("Root")
            .projection("a")
            .projection_recursive("a"),
    )
    .projections(vec!["a"]);

    let tree = spec.build(&PredicateRegistry::new()).expect("ok");
    assert_eq!(tree.root().projections().len(), 1);
    assert_eq!(tree.root().membership("a"), Some(true));
}

#[test]
fn test_predicate_resolution() {
    let spec = TreeSpec::new(
        "t",
        NodeSpec::all("Root").child(NodeSpec::leaf("A").condition("missing")),
    );
    assert_eq!(
        spec.build(&weather_registry()).unwrap_err(),
        BuildError::UnknownPredicate {
            node: "Root/A".into(),
            name: "missing".into(),
        }
    );

    let monitors = TreeSpec::new(
        "t",
        NodeSpec::all("Root").child(
            NodeSpec::leaf("A")
                .monitor("m", Predicate::always("yes"))
                .monitor("m", "slow"),
        ),
    );
    assert_eq!(
        monitors.build(&weather_registry()).unwrap_err(),
        BuildError::DuplicateMonitor {
            node: "Root/A".into(),
            monitor: "m".into(),
        }
    );
}
