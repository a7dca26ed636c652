//! Static enumeration of every instance a classification tree can
//! produce, regardless of conditions.  The number of instances grows
//! exponentially with the tree; `count::possible_instance_count`
//! returns the length of this list without building it.
//!
//! Each container kind is a range of how many children it selects:
//! `All` selects all of them, `Optional` any number, `Exclusive`
//! exactly one, and `Bounded { min, max }` between `min` and `max`.
use crate::instance::InstanceNode;
use crate::node::{Node, NodeKind, Tree};

/// Returns every possible instance of `tree`, in a deterministic
/// order: at each node, leaving a child out comes before selecting
/// it, and children's alternatives are listed in their own order.
#[must_use]
pub fn possible_instances<C>(tree: &Tree<C>) -> Vec<InstanceNode> {
    enumerate_node(tree.root())
}

fn enumerate_node<C>(node: &Node<C>) -> Vec<InstanceNode> {
    if node.is_terminal() {
        return vec![InstanceNode::leaf(node.identifier())];
    }

    let children: Vec<Vec<InstanceNode>> = node
        .children()
        .iter()
        .map(|child| enumerate_node(child))
        .collect();
    let (min, max) = selection_range(node.kind(), children.len());

    let mut selections = Vec::new();
    select(&children, min, max, &mut Vec::new(), &mut selections);

    selections
        .into_iter()
        .map(|selected| InstanceNode::new(node.identifier(), selected))
        .collect()
}

/// The range of how many children a node of `kind` with `children`
/// children selects.
fn selection_range(kind: NodeKind, children: usize) -> (usize, usize) {
    match kind {
        NodeKind::Leaf | NodeKind::All => (children, children),
        NodeKind::Optional => (0, children),
        NodeKind::Exclusive => (1, 1),
        NodeKind::Bounded { min, max } => (min, max),
    }
}

/// Pushes to `out` every extension of `chosen` that picks at most one
/// alternative from each entry of `children`, such that the total
/// number of picks is in `[min, max]`.
fn select(
    children: &[Vec<InstanceNode>],
    min: usize,
    max: usize,
    chosen: &mut Vec<InstanceNode>,
    out: &mut Vec<Vec<InstanceNode>>,
) {
    // Not enough children left to reach `min`.
    if chosen.len() + children.len() < min {
        return;
    }

    let (first, rest) = match children.split_first() {
        Some(split) => split,
        None => {
            out.push(chosen.clone());
            return;
        }
    };

    select(rest, min, max, chosen, out);
    if chosen.len() < max {
        for alternative in first {
            chosen.push(alternative.clone());
            select(rest, min, max, chosen, out);
            chosen.pop();
        }
    }
}

#[cfg(test)]
fn build(root: crate::builder::NodeSpec<()>) -> Tree<()> {
    use crate::builder::TreeSpec;
    use crate::predicate::PredicateRegistry;

    TreeSpec::new("enumerate", root)
        .build(&PredicateRegistry::new())
        .expect("ok")
}

#[test]
fn test_small_trees() {
    use crate::builder::NodeSpec;

    let exclusive = build(
        NodeSpec::exclusive("Weather")
            .child(NodeSpec::leaf("Clear"))
            .child(NodeSpec::leaf("Rain")),
    );
    let rendered: Vec<String> = possible_instances(&exclusive)
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(rendered, ["Weather(Rain)", "Weather(Clear)"]);

    let optional = build(
        NodeSpec::optional("Traffic")
            .child(NodeSpec::leaf("Follows"))
            .child(NodeSpec::leaf("Oncoming")),
    );
    let rendered: Vec<String> = possible_instances(&optional)
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        rendered,
        [
            "Traffic",
            "Traffic(Oncoming)",
            "Traffic(Follows)",
            "Traffic(Follows, Oncoming)"
        ]
    );
}

#[test]
fn test_bounded_selection() {
    use crate::builder::NodeSpec;

    let tree = build(
        NodeSpec::bounded("Lanes", 2, 2)
            .child(NodeSpec::leaf("A"))
            .child(NodeSpec::leaf("B"))
            .child(NodeSpec::leaf("C")),
    );
    let rendered: Vec<String> = possible_instances(&tree)
        .iter()
        .map(ToString::to_string)
        .collect();

    assert_eq!(rendered, ["Lanes(B, C)", "Lanes(A, C)", "Lanes(A, B)"]);
}

#[test]
fn test_matches_count() {
    use crate::builder::NodeSpec;
    use crate::count::possible_instance_count;
    use std::collections::BTreeSet;

    let tree = build(
        NodeSpec::all("Root")
            .child(
                NodeSpec::exclusive("Weather")
                    .child(NodeSpec::leaf("Clear"))
                    .child(NodeSpec::leaf("Rain"))
                    .child(NodeSpec::leaf("Snow")),
            )
            .child(
                NodeSpec::optional("Traffic")
                    .child(NodeSpec::leaf("Follows"))
                    .child(
                        NodeSpec::exclusive("Oncoming")
                            .child(NodeSpec::leaf("Car"))
                            .child(NodeSpec::leaf("Truck")),
                    ),
            )
            .child(
                NodeSpec::bounded("Signals", 0, 1)
                    .child(NodeSpec::leaf("StopSign"))
                    .child(NodeSpec::leaf("RedLight")),
            )
            .child(NodeSpec::optional("Empty")),
    );

    let instances = possible_instances(&tree);
    let distinct: BTreeSet<_> = instances.iter().cloned().collect();

    assert_eq!(instances.len() as u128, possible_instance_count(&tree));
    assert_eq!(distinct.len(), instances.len());
    assert_eq!(instances.len(), 3 * (2 * 3) * 3);
    assert!(instances.iter().all(|instance| instance.contains_path("Root/Empty")));
}
