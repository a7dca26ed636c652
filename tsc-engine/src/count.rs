//! The number of distinct instances a classification tree can
//! produce only depends on its structure, not on any context.  Each
//! node kind composes its children's counts differently:
//!
//! - a childless node (leaf, or pruned container) has one instance;
//! - `All` picks one instance of every child: the product;
//! - `Optional` picks, for each child, nothing or one of its
//!   instances: the product of `count + 1`;
//! - `Exclusive` picks exactly one child: the sum;
//! - `Bounded { min, max }` picks between `min` and `max` children:
//!   for each subset size `k`, the sum over all `k`-subsets of the
//!   product of their counts, i.e., the elementary symmetric
//!   polynomial `e_k` of the children's counts.
//!
//! Counts grow very quickly; arithmetic saturates at `u128::MAX`.
use crate::node::{Node, NodeKind, Tree};

/// Returns the number of distinct instances `tree` can produce.
#[must_use]
pub fn possible_instance_count<C>(tree: &Tree<C>) -> u128 {
    count_node(tree.root())
}

fn count_node<C>(node: &Node<C>) -> u128 {
    if node.is_terminal() {
        return 1;
    }

    let counts: Vec<u128> = node.children().iter().map(|c| count_node(c)).collect();
    match node.kind() {
        NodeKind::Leaf | NodeKind::All => {
            counts.iter().fold(1, |acc, c| acc.saturating_mul(*c))
        }
        NodeKind::Optional => counts
            .iter()
            .fold(1, |acc, c| acc.saturating_mul(c.saturating_add(1))),
        NodeKind::Exclusive => counts.iter().fold(0, |acc, c| acc.saturating_add(*c)),
        NodeKind::Bounded { min, max } => {
            let symmetric = elementary_symmetric(&counts);
            // Projections may leave fewer than `max` (or even `min`)
            // children.
            let max = max.min(counts.len());
            if min > max {
                return 0;
            }

            symmetric[min..=max]
                .iter()
                .fold(0, |acc, e| acc.saturating_add(*e))
        }
    }
}

/// Returns `[e_0, e_1, ..., e_n]`, the elementary symmetric
/// polynomials of `values`: `e_k` is the sum, over all `k`-subsets of
/// `values`, of the product of the subset's elements.
fn elementary_symmetric(values: &[u128]) -> Vec<u128> {
    let mut result = vec![0u128; values.len() + 1];
    result[0] = 1;

    for (seen, value) in values.iter().enumerate() {
        // Iterate downward so that each value is used at most once
        // per subset.
        for k in (1..=seen + 1).rev() {
            result[k] = result[k].saturating_add(result[k - 1].saturating_mul(*value));
        }
    }

    result
}

#[cfg(test)]
fn build(root: crate::builder::NodeSpec<()>) -> Tree<()> {
    use crate::builder::TreeSpec;
    use crate::predicate::PredicateRegistry;

    TreeSpec::new("count", root)
        .build(&PredicateRegistry::new())
        .expect("ok")
}

#[cfg(test)]
fn leaves(prefix: &str, n: usize) -> Vec<crate::builder::NodeSpec<()>> {
    use crate::builder::NodeSpec;

    (0..n)
        .map(|i| NodeSpec::leaf(&format!("{}{}", prefix, i)))
        .collect()
}

/// A container whose children have counts `[1, 2, 3]`.
#[cfg(test)]
fn with_counts_123(root: crate::builder::NodeSpec<()>) -> Tree<()> {
    use crate::builder::NodeSpec;

    build(
        root.child(NodeSpec::leaf("One"))
            .child(NodeSpec::exclusive("Two").children(leaves("t", 2)))
            .child(NodeSpec::exclusive("Three").children(leaves("h", 3))),
    )
}

#[test]
fn test_elementary_symmetric() {
    assert_eq!(elementary_symmetric(&[]), [1]);
    assert_eq!(elementary_symmetric(&[1, 2, 3]), [1, 6, 11, 6]);
    assert_eq!(elementary_symmetric(&[1, 1, 1, 1]), [1, 4, 6, 4, 1]);
}

#[test]
fn test_optional_power_of_two() {
    use crate::builder::NodeSpec;

    for n in 0..6 {
        let tree = build(NodeSpec::optional("Root").children(leaves("l", n)));
        assert_eq!(possible_instance_count(&tree), 1 << n);
    }
}

#[test]
fn test_kinds_compose_counts() {
    use crate::builder::NodeSpec;

    assert_eq!(
        possible_instance_count(&with_counts_123(NodeSpec::exclusive("Root"))),
        6
    );
    assert_eq!(
        possible_instance_count(&with_counts_123(NodeSpec::all("Root"))),
        6
    );
    assert_eq!(
        possible_instance_count(&with_counts_123(NodeSpec::optional("Root"))),
        2 * 3 * 4
    );
    // e_1 + e_2 = 6 + 11
    assert_eq!(
        possible_instance_count(&with_counts_123(NodeSpec::bounded("Root", 1, 2))),
        17
    );
    assert_eq!(
        possible_instance_count(&with_counts_123(NodeSpec::bounded("Root", 0, 3))),
        possible_instance_count(&with_counts_123(NodeSpec::optional("Root")))
    );
    assert_eq!(
        possible_instance_count(&with_counts_123(NodeSpec::bounded("Root", 3, 3))),
        possible_instance_count(&with_counts_123(NodeSpec::all("Root")))
    );
}

#[test]
fn test_bounded_one_is_exclusive() {
    use crate::builder::NodeSpec;

    for n in 1..6 {
        let bounded = build(NodeSpec::bounded("Root", 1, 1).children(leaves("l", n)));
        let exclusive = build(NodeSpec::exclusive("Root").children(leaves("l", n)));

        assert_eq!(possible_instance_count(&bounded), n as u128);
        assert_eq!(possible_instance_count(&exclusive), n as u128);
    }
}

#[test]
fn test_signals() {
    use crate::builder::NodeSpec;

    // Stop sign and red light never both apply: each is a `(0, 1)`
    // choice, and so is the pair.
    let tree = build(
        NodeSpec::all("Root")
            .child(
                NodeSpec::bounded("Signals", 0, 1)
                    .child(NodeSpec::leaf("StopSign"))
                    .child(NodeSpec::leaf("RedLight")),
            )
            .child(
                NodeSpec::exclusive("Weather")
                    .child(NodeSpec::leaf("Clear"))
                    .child(NodeSpec::leaf("Rain")),
            ),
    );

    assert_eq!(possible_instance_count(&tree), 3 * 2);
}

#[test]
fn test_projection_counts() {
    use crate::builder::{NodeSpec, TreeSpec};
    use crate::predicate::PredicateRegistry;
    use crate::projection::project;

    let tree = TreeSpec::new(
        "projected",
        NodeSpec::<()>::all("Root")
            .child(
                NodeSpec::exclusive("Weather")
                    .projection("coarse")
                    .children(leaves("w", 3)),
            )
            .child(
                NodeSpec::bounded("Lanes", 2, 2)
                    .projection("coarse")
                    .child(NodeSpec::leaf("Left").projection("coarse"))
                    .child(NodeSpec::leaf("Right")),
            ),
    )
    .projections(vec!["coarse"])
    .build(&PredicateRegistry::new())
    .expect("ok");

    assert_eq!(possible_instance_count(&tree), 3);
    // `Weather` degenerates to a leaf; `Lanes` keeps its range but
    // only one child, so it can never hold.
    assert_eq!(possible_instance_count(&project(&tree, "coarse")), 0);
    assert_eq!(possible_instance_count(&project(&tree, "unused")), 1);
}

#[test]
fn test_saturation() {
    use crate::builder::NodeSpec;

    let children =
        (0..130).map(|i| NodeSpec::optional(&format!("o{}", i)).children(leaves("l", 1)));
    let tree = build(NodeSpec::all("Root").children(children));

    assert_eq!(possible_instance_count(&tree), u128::MAX);
}
