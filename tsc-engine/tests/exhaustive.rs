//! Cross-checks the structural counter and enumerator against the
//! instantiator: on small random trees where every non-root node is
//! conditioned, evaluating every truth assignment must produce
//! exactly the possible instances.
use proptest::prelude::*;
use std::collections::BTreeSet;
use tsc_engine::{
    instantiate, possible_instance_count, possible_instances, project, ExclusivityPolicy,
    InstanceNode, InstantiationOptions, NodeSpec, Predicate, PredicateRegistry, Tree, TreeSpec,
};

const MAX_NODES: u32 = 10;

/// Raw tree shapes; `kind`, `a` and `b` are normalised into a valid
/// node kind once the number of children is known.
#[derive(Clone, Debug)]
enum Shape {
    Leaf,
    Container {
        kind: u8,
        a: usize,
        b: usize,
        children: Vec<Shape>,
    },
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    Just(Shape::Leaf).prop_recursive(3, 12, 4, |inner| {
        (0u8..4, 0usize..8, 0usize..8, prop::collection::vec(inner, 0..=4)).prop_map(
            |(kind, a, b, children)| Shape::Container {
                kind,
                a,
                b,
                children,
            },
        )
    })
}

/// Converts `shape` to a node spec, consuming one unit of `budget` per
/// node.  Children beyond the budget are dropped.  Every node but the
/// root gets a condition on its own bit of the `u32` context.
fn to_spec(shape: &Shape, budget: &mut u32, is_root: bool) -> NodeSpec<u32> {
    let index = MAX_NODES - *budget;
    *budget -= 1;

    let name = format!("n{}", index);
    let mut children = Vec::new();
    let spec = match shape {
        Shape::Leaf => NodeSpec::leaf(&name),
        Shape::Container {
            kind,
            a,
            b,
            children: shapes,
        } => {
            for child in shapes {
                if *budget == 0 {
                    break;
                }

                children.push(to_spec(child, budget, false));
            }

            let n = children.len();
            match *kind {
                0 => NodeSpec::all(&name),
                1 => NodeSpec::optional(&name),
                2 if n > 0 => NodeSpec::exclusive(&name),
                2 => NodeSpec::leaf(&name),
                _ => {
                    let min = *a % (n + 1);
                    let max = min + *b % (n - min + 1);
                    NodeSpec::bounded(&name, min, max)
                }
            }
        }
    };

    let spec = spec.children(children);
    if is_root {
        return spec;
    }

    let bit = 1u32 << index;
    spec.condition(Predicate::infallible(&name, move |bits: &u32| bits & bit != 0))
}

fn build_tree(shape: &Shape) -> (Tree<u32>, u32) {
    let mut budget = MAX_NODES;
    let root = to_spec(shape, &mut budget, true);
    let tree = TreeSpec::new("random", root)
        .build(&PredicateRegistry::new())
        .expect("generated trees are valid");

    (tree, MAX_NODES - budget)
}

/// Unions the instances of `tree` over every assignment of the
/// `nodes - 1` conditioned nodes.
fn observed_instances(tree: &Tree<u32>, nodes: u32, policy: ExclusivityPolicy) -> BTreeSet<InstanceNode> {
    let options = InstantiationOptions {
        exclusivity: policy,
    };
    let mut observed = BTreeSet::new();

    // Bit 0 is the root's, and the root has no condition.
    for assignment in 0..(1u32 << nodes) {
        if assignment & 1 != 0 {
            continue;
        }

        let result = instantiate(tree, &assignment, &options);
        assert!(result.failures.is_empty());
        if policy == ExclusivityPolicy::FirstMatch {
            assert!(result.instances.len() <= 1);
        }

        observed.extend(result.instances.into_iter().map(|instance| instance.root));
    }

    observed
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn prop_count_matches_exhaustive_instantiation(shape in shape_strategy()) {
        let (tree, nodes) = build_tree(&shape);
        let possible = possible_instances(&tree);
        let distinct: BTreeSet<InstanceNode> = possible.iter().cloned().collect();

        prop_assert_eq!(distinct.len(), possible.len());
        prop_assert_eq!(possible.len() as u128, possible_instance_count(&tree));

        for policy in [ExclusivityPolicy::ReportAll, ExclusivityPolicy::FirstMatch].iter() {
            let observed = observed_instances(&tree, nodes, *policy);
            prop_assert_eq!(&observed, &distinct);
        }
    }

    #[test]
    fn prop_unused_projection_is_root_only(shape in shape_strategy()) {
        let (tree, _) = build_tree(&shape);
        let projected = project(&tree, "unused");

        prop_assert_eq!(projected.node_count(), 1);
        prop_assert_eq!(possible_instance_count(&projected), 1);
        prop_assert_eq!(
            possible_instances(&projected),
            vec![InstanceNode::leaf(tree.root().identifier())]
        );
    }
}
