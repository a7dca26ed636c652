//! A classification tree is a hierarchy of typed nodes.  The type of
//! a node (its `NodeKind`) decides how many of its children may hold
//! together in one instance; its condition decides whether the node
//! itself holds for a given context.
//!
//! Nodes are immutable once built, and shared via `Arc`: projections
//! reuse whole subtrees of the source tree, and the same tree is
//! evaluated concurrently on many contexts.
use crate::predicate::Predicate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The structural operator of a node, i.e., the constraint on the set
/// of its children that appear in an instance.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum NodeKind {
    /// Terminal node, without children.
    Leaf,
    /// Every child must hold.
    All,
    /// Any subset of the children, including the empty one.
    Optional,
    /// Exactly one child.
    Exclusive,
    /// The number of holding children lies in `[min, max]`.
    Bounded { min: usize, max: usize },
}

/// Nodes are numbered in pre-order when a tree is built.  Projections
/// keep the numbers of the source tree, so ids are unique within any
/// tree, but not contiguous in projections.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Membership of a node in a named projection.  A recursive
/// membership extends to every descendant of the node.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ProjectionMembership {
    pub tag: String,
    pub recursive: bool,
}

/// A node of a built tree.  Only the builder creates nodes; the
/// projector derives pruned copies with `with_children`.
pub struct Node<C> {
    pub(crate) id: NodeId,
    pub(crate) identifier: String,
    pub(crate) path: String,
    pub(crate) kind: NodeKind,
    pub(crate) condition: Option<Predicate<C>>,
    pub(crate) monitors: Vec<(String, Predicate<C>)>,
    pub(crate) projections: Vec<ProjectionMembership>,
    pub(crate) children: Vec<Arc<Node<C>>>,
}

impl<C> Node<C> {
    /// Returns a copy of this node with `children` instead of its own.
    pub(crate) fn with_children(&self, children: Vec<Arc<Node<C>>>) -> Self {
        Self {
            id: self.id,
            identifier: self.identifier.clone(),
            path: self.path.clone(),
            kind: self.kind,
            condition: self.condition.clone(),
            monitors: self.monitors.clone(),
            projections: self.projections.clone(),
            children,
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Slash-separated identifiers from the root down to this node.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[must_use]
    pub fn condition(&self) -> Option<&Predicate<C>> {
        self.condition.as_ref()
    }

    #[must_use]
    pub fn monitors(&self) -> &[(String, Predicate<C>)] {
        &self.monitors
    }

    #[must_use]
    pub fn projections(&self) -> &[ProjectionMembership] {
        &self.projections
    }

    #[must_use]
    pub fn children(&self) -> &[Arc<Node<C>>] {
        &self.children
    }

    /// A node without children instantiates like a leaf, whatever its
    /// kind.  Projections may leave containers in that state.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns `Some(recursive)` if the node itself is a member of
    /// projection `tag`.
    #[must_use]
    pub fn membership(&self, tag: &str) -> Option<bool> {
        self.projections
            .iter()
            .find(|membership| membership.tag == tag)
            .map(|membership| membership.recursive)
    }

    #[must_use]
    pub fn child(&self, identifier: &str) -> Option<&Arc<Node<C>>> {
        self.children
            .iter()
            .find(|child| child.identifier == identifier)
    }

    /// Calls `visitor` on every node of the subtree, in pre-order.
    pub fn visit<F: FnMut(&Node<C>)>(&self, visitor: &mut F) {
        visitor(self);
        for child in &self.children {
            child.visit(visitor);
        }
    }
}

impl<C> std::fmt::Debug for Node<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("condition", &self.condition)
            .field("monitors", &self.monitors)
            .field("projections", &self.projections)
            .field("children", &self.children)
            .finish()
    }
}

/// A built classification tree, or a projection of one.
pub struct Tree<C> {
    label: String,
    projection: Option<String>,
    declared_projections: Vec<String>,
    root: Arc<Node<C>>,
}

impl<C> Tree<C> {
    pub(crate) fn new(
        label: String,
        projection: Option<String>,
        declared_projections: Vec<String>,
        root: Arc<Node<C>>,
    ) -> Self {
        Self {
            label,
            projection,
            declared_projections,
            root,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The projection tag this tree was derived for, `None` for a
    /// full tree.
    #[must_use]
    pub fn projection(&self) -> Option<&str> {
        self.projection.as_deref()
    }

    /// Label and projection tag, e.g., `"layer-1"` or
    /// `"layer-1[static]"`.
    #[must_use]
    pub fn qualified_label(&self) -> String {
        match &self.projection {
            Some(tag) => format!("{}[{}]", self.label, tag),
            None => self.label.clone(),
        }
    }

    /// Every projection tag declared for the source tree, in
    /// declaration order.
    #[must_use]
    pub fn declared_projections(&self) -> &[String] {
        &self.declared_projections
    }

    #[must_use]
    pub fn root(&self) -> &Node<C> {
        &self.root
    }

    pub(crate) fn root_arc(&self) -> &Arc<Node<C>> {
        &self.root
    }

    /// Looks up a node by its slash-separated path, root identifier
    /// included.
    #[must_use]
    pub fn node(&self, path: &str) -> Option<&Node<C>> {
        let mut parts = path.split('/');
        if parts.next()? != self.root.identifier() {
            return None;
        }

        let mut current: &Node<C> = &self.root;
        for part in parts {
            current = current.child(part)?;
        }

        Some(current)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.root.visit(&mut |_| count += 1);
        count
    }
}

impl<C> Clone for Tree<C> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            projection: self.projection.clone(),
            declared_projections: self.declared_projections.clone(),
            root: self.root.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Tree<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("label", &self.label)
            .field("projection", &self.projection)
            .field("declared_projections", &self.declared_projections)
            .field("root", &self.root)
            .finish()
    }
}

#[test]
fn test_node_accessors() {
    let leaf = Arc::new(Node::<()> {
        id: NodeId::new(1),
        identifier: "Clear".into(),
        path: "Root/Clear".into(),
        kind: NodeKind::Leaf,
        condition: None,
        monitors: Vec::new(),
        projections: vec![ProjectionMembership {
            tag: "static".into(),
            recursive: false,
        }],
        children: Vec::new(),
    });
    let root = Node {
        id: NodeId::new(0),
        identifier: "Root".into(),
        path: "Root".into(),
        kind: NodeKind::All,
        condition: None,
        monitors: Vec::new(),
        projections: Vec::new(),
        children: vec![leaf],
    };

    assert!(!root.is_terminal());
    assert_eq!(root.child("Clear").expect("present").path(), "Root/Clear");
    assert!(root.child("Rain").is_none());
    assert_eq!(root.children()[0].membership("static"), Some(false));
    assert_eq!(root.children()[0].membership("dynamic"), None);

    let mut seen = Vec::new();
    root.visit(&mut |node| seen.push(node.id().index()));
    assert_eq!(seen, [0, 1]);

    let pruned = root.with_children(Vec::new());
    assert!(pruned.is_terminal());
    assert_eq!(pruned.kind(), NodeKind::All);

    let tree = Tree::new("demo".into(), None, Vec::new(), Arc::new(root));
    assert_eq!(tree.node_count(), 2);
    assert!(tree.node("Root/Clear").is_some());
    assert!(tree.node("Other/Clear").is_none());
    assert_eq!(tree.qualified_label(), "demo");
}
