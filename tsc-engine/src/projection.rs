//! A projection is a named view of a classification tree: the same
//! tree, restricted to the nodes that are members of the projection.
//! Membership is declared per node, either for the node alone, or
//! recursively for the node's whole subtree.
//!
//! The root is part of every projection.  Any other node is part of
//! the projection for `tag` iff its parent is, and either the node is
//! a member of `tag`, or one of its ancestors is a recursive member.
//! Node kinds are preserved verbatim; a container whose children are
//! all pruned away instantiates and counts as a leaf.
use crate::node::{Node, Tree};
use std::sync::Arc;
use tracing::debug;

/// Returns the projection of `tree` for `tag`.  Projecting for a tag
/// no node refers to yields a root-only tree.
#[must_use]
pub fn project<C>(tree: &Tree<C>, tag: &str) -> Tree<C> {
    let root = tree.root_arc();
    let projected = if root.membership(tag) == Some(true) {
        root.clone()
    } else {
        Arc::new(root.with_children(project_children(root, tag)))
    };

    let result = Tree::new(
        tree.label().into(),
        Some(tag.into()),
        tree.declared_projections().to_vec(),
        projected,
    );
    debug!(
        tree = %tree.label(),
        projection = tag,
        nodes = result.node_count(),
        "projected classification tree"
    );
    result
}

/// Returns one projection per distinct tag referenced in `tree`, in
/// the order tags are first found by a pre-order traversal.
#[must_use]
pub fn build_projections<C>(tree: &Tree<C>) -> Vec<Tree<C>> {
    projection_tags(tree)
        .iter()
        .map(|tag| project(tree, tag))
        .collect()
}

/// Lists the distinct tags referenced by nodes of `tree`, in
/// pre-order of first reference.
#[must_use]
pub fn projection_tags<C>(tree: &Tree<C>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();

    tree.root().visit(&mut |node| {
        for membership in node.projections() {
            if !tags.contains(&membership.tag) {
                tags.push(membership.tag.clone());
            }
        }
    });

    tags
}

fn project_children<C>(node: &Node<C>, tag: &str) -> Vec<Arc<Node<C>>> {
    node.children()
        .iter()
        .filter_map(|child| project_node(child, tag))
        .collect()
}

fn project_node<C>(node: &Arc<Node<C>>, tag: &str) -> Option<Arc<Node<C>>> {
    match node.membership(tag) {
        // Recursive members keep their whole subtree, which we can
        // share with the source tree.
        Some(true) => Some(node.clone()),
        Some(false) => Some(Arc::new(node.with_children(project_children(node, tag)))),
        None => None,
    }
}

#[cfg(test)]
fn layered_tree() -> Tree<()> {
    use crate::builder::{NodeSpec, TreeSpec};
    use crate::predicate::PredicateRegistry;

    TreeSpec::new(
        "layers",
        NodeSpec::all("Root")
            .projection_recursive("all")
            .child(
                NodeSpec::exclusive("Weather")
                    .projection("static")
                    .projection("weather")
                    .child(NodeSpec::leaf("Clear").projection("weather"))
                    .child(NodeSpec::leaf("Rain").projection("weather")),
            )
            .child(
                NodeSpec::optional("Traffic")
                    .projection_recursive("dynamic")
                    .child(NodeSpec::leaf("Follows"))
                    .child(NodeSpec::leaf("Oncoming")),
            )
            .child(
                NodeSpec::all("Road")
                    .child(NodeSpec::leaf("Junction").projection("static")),
            ),
    )
    .projections(vec!["all", "static", "weather", "dynamic"])
    .build(&PredicateRegistry::new())
    .expect("ok")
}

#[cfg(test)]
fn paths<C>(tree: &Tree<C>) -> Vec<String> {
    let mut result = Vec::new();
    tree.root().visit(&mut |node| result.push(node.path().to_string()));
    result
}

#[test]
fn test_tag_order() {
    let tree = layered_tree();
    assert_eq!(
        projection_tags(&tree),
        ["all", "static", "weather", "dynamic"]
    );

    let projections = build_projections(&tree);
    let tags: Vec<_> = projections
        .iter()
        .map(|p| p.projection().expect("projected").to_string())
        .collect();
    assert_eq!(tags, ["all", "static", "weather", "dynamic"]);
}

#[test]
fn test_recursive_root_is_identity() {
    let tree = layered_tree();
    let all = project(&tree, "all");

    assert_eq!(paths(&all), paths(&tree));
    assert!(Arc::ptr_eq(all.root_arc(), tree.root_arc()));
    assert_eq!(all.qualified_label(), "layers[all]");
}

#[test]
fn test_non_recursive_prunes() {
    let tree = layered_tree();

    // `Weather` is kept, but its leaves are not members of `static`:
    // it degenerates to a leaf.  `Junction` is a member, but its
    // parent `Road` is not, so it is unreachable.
    let static_view = project(&tree, "static");
    assert_eq!(paths(&static_view), ["Root", "Root/Weather"]);
    assert!(static_view
        .node("Root/Weather")
        .expect("kept")
        .is_terminal());

    let weather = project(&tree, "weather");
    assert_eq!(
        paths(&weather),
        ["Root", "Root/Weather", "Root/Weather/Clear", "Root/Weather/Rain"]
    );
}

#[test]
fn test_recursive_subtree() {
    let tree = layered_tree();
    let dynamic = project(&tree, "dynamic");

    assert_eq!(
        paths(&dynamic),
        [
            "Root",
            "Root/Traffic",
            "Root/Traffic/Follows",
            "Root/Traffic/Oncoming"
        ]
    );
    // Node ids come from the source tree.
    assert_eq!(
        dynamic.node("Root/Traffic/Follows").expect("kept").id(),
        tree.node("Root/Traffic/Follows").expect("present").id()
    );
}

#[test]
fn test_unused_tag() {
    let tree = layered_tree();
    let empty = project(&tree, "nothing");

    assert_eq!(paths(&empty), ["Root"]);
    assert_eq!(empty.projection(), Some("nothing"));
}

#[test]
fn test_deterministic() {
    let tree = layered_tree();
    let first: Vec<_> = build_projections(&tree).iter().map(paths).collect();
    let second: Vec<_> = build_projections(&tree).iter().map(paths).collect();

    assert_eq!(first, second);
}
