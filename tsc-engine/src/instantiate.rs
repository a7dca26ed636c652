//! Instantiation evaluates a classification tree on one context, and
//! returns the valid instances: selections of nodes that satisfy both
//! their conditions and every structural constraint on the way from
//! the root.
//!
//! The evaluation is bottom-up: each node yields the list of its
//! alternatives, i.e., the sub-instances rooted at that node.  A node
//! "holds" iff it yields at least one alternative.  For consistent
//! input (predicates of exclusive siblings never overlap), every node
//! yields at most one alternative, and the tree at most one instance.
//! Overlapping exclusive siblings are the only source of multiple
//! alternatives; the `ExclusivityPolicy` decides what to do with them,
//! and the affected instances are always flagged.
//!
//! Monitors are evaluated after the fact, only for the nodes of valid
//! instances, and never affect validity.
use crate::instance::{
    EvaluationWarning, Instance, InstanceNode, Instantiation, MonitorResult, PredicateFailure,
};
use crate::node::{Node, NodeId, NodeKind, Tree};
use crate::predicate::Predicate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{trace, warn};

/// What to do when several children of an exclusive node hold at the
/// same time.  Both policies flag the resulting instances with an
/// `EvaluationWarning::ExclusiveViolation`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusivityPolicy {
    /// Yield one alternative per holding child.
    ReportAll,
    /// Only yield the first holding child, in declaration order.
    FirstMatch,
}

impl Default for ExclusivityPolicy {
    fn default() -> Self {
        ExclusivityPolicy::ReportAll
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct InstantiationOptions {
    pub exclusivity: ExclusivityPolicy,
}

/// Evaluates `tree` on `context` and returns all valid instances, in
/// a deterministic order, along with the condition predicates that
/// failed.
///
/// A failed condition only disqualifies its own node (and thus the
/// paths through it); the rest of the tree is evaluated as usual.
pub fn instantiate<C>(
    tree: &Tree<C>,
    context: &C,
    options: &InstantiationOptions,
) -> Instantiation {
    let mut evaluation = Evaluation {
        context,
        options,
        failures: Vec::new(),
        monitors: HashMap::new(),
    };

    let root = tree.root();
    let alternatives = evaluation.alternatives(root);
    let instances: Vec<Instance> = alternatives
        .into_iter()
        .map(|alternative| {
            let mut monitors = Vec::new();
            let mut warnings = alternative.warnings;
            evaluation.collect_monitors(root, &alternative.node, &mut monitors, &mut warnings);

            Instance {
                root: alternative.node,
                monitors,
                warnings,
            }
        })
        .collect();

    trace!(
        tree = %tree.qualified_label(),
        instances = instances.len(),
        failures = evaluation.failures.len(),
        "instantiated classification tree"
    );

    Instantiation {
        instances,
        failures: evaluation.failures,
    }
}

/// A sub-instance rooted at some node, with the warnings raised while
/// selecting it.
struct Alternative {
    node: InstanceNode,
    warnings: Vec<EvaluationWarning>,
}

type MonitorOutcome = Result<MonitorResult, EvaluationWarning>;

struct Evaluation<'a, C> {
    context: &'a C,
    options: &'a InstantiationOptions,
    failures: Vec<PredicateFailure>,
    // Monitor outcomes only depend on the node and the context.
    monitors: HashMap<NodeId, Vec<MonitorOutcome>>,
}

impl<'a, C> Evaluation<'a, C> {
    /// Returns true iff `node`'s own condition holds.  Failed
    /// predicates are recorded and count as false.
    fn holds(&mut self, node: &Node<C>) -> bool {
        let predicate = match node.condition() {
            Some(predicate) => predicate,
            None => return true,
        };

        match predicate.evaluate(self.context) {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    node = node.path(),
                    predicate = predicate.name(),
                    %error,
                    "condition failed, node does not hold"
                );
                self.failures.push(PredicateFailure {
                    node: node.path().into(),
                    error,
                });
                false
            }
        }
    }

    fn alternatives(&mut self, node: &Node<C>) -> Vec<Alternative> {
        if !self.holds(node) {
            return Vec::new();
        }

        if node.is_terminal() {
            return vec![Alternative {
                node: InstanceNode::leaf(node.identifier()),
                warnings: Vec::new(),
            }];
        }

        let children: Vec<Vec<Alternative>> = node
            .children()
            .iter()
            .map(|child| self.alternatives(child))
            .collect();

        match node.kind() {
            // Leaves never have children; only reachable through a
            // hand-made node.
            NodeKind::Leaf | NodeKind::All => {
                if children.iter().any(Vec::is_empty) {
                    return Vec::new();
                }

                combine(node.identifier(), children, Vec::new())
            }
            NodeKind::Optional => combine(
                node.identifier(),
                children.into_iter().filter(|alts| !alts.is_empty()),
                Vec::new(),
            ),
            NodeKind::Bounded { min, max } => {
                let holding = children.iter().filter(|alts| !alts.is_empty()).count();
                if holding < min || holding > max {
                    return Vec::new();
                }

                combine(
                    node.identifier(),
                    children.into_iter().filter(|alts| !alts.is_empty()),
                    Vec::new(),
                )
            }
            NodeKind::Exclusive => self.choose_exclusive(node, children),
        }
    }

    fn choose_exclusive(
        &mut self,
        node: &Node<C>,
        children: Vec<Vec<Alternative>>,
    ) -> Vec<Alternative> {
        let holding: Vec<(usize, Vec<Alternative>)> = children
            .into_iter()
            .enumerate()
            .filter(|(_, alts)| !alts.is_empty())
            .collect();

        if holding.len() <= 1 {
            return holding
                .into_iter()
                .flat_map(|(_, alts)| {
                    combine_one(node.identifier(), alts, Vec::new())
                })
                .collect();
        }

        let names: Vec<String> = holding
            .iter()
            .map(|(index, _)| node.children()[*index].identifier().to_string())
            .collect();
        warn!(
            node = node.path(),
            holding = ?names,
            policy = ?self.options.exclusivity,
            "several children of an exclusive node hold"
        );
        let violation = EvaluationWarning::ExclusiveViolation {
            node: node.path().into(),
            holding: names,
        };

        let selected: Vec<Vec<Alternative>> = match self.options.exclusivity {
            ExclusivityPolicy::ReportAll => holding.into_iter().map(|(_, alts)| alts).collect(),
            ExclusivityPolicy::FirstMatch => holding
                .into_iter()
                .take(1)
                .map(|(_, alts)| alts)
                .collect(),
        };

        selected
            .into_iter()
            .flat_map(|alts| combine_one(node.identifier(), alts, vec![violation.clone()]))
            .collect()
    }

    /// Appends the results of the monitors on every node of
    /// `selected` (an instance of `node`) to `results`, or a warning
    /// to `warnings` for monitors that failed.
    fn collect_monitors(
        &mut self,
        node: &Node<C>,
        selected: &InstanceNode,
        results: &mut Vec<MonitorResult>,
        warnings: &mut Vec<EvaluationWarning>,
    ) {
        let context = self.context;
        let outcomes = self
            .monitors
            .entry(node.id())
            .or_insert_with(|| {
                node.monitors()
                    .iter()
                    .map(|(name, predicate)| run_monitor(node, name, predicate, context))
                    .collect()
            });

        for outcome in outcomes.iter() {
            match outcome {
                Ok(result) => results.push(result.clone()),
                Err(warning) => warnings.push(warning.clone()),
            }
        }

        for sub in &selected.children {
            if let Some(child) = node.child(&sub.label) {
                self.collect_monitors(child, sub, results, warnings);
            }
        }
    }
}

fn run_monitor<C>(node: &Node<C>, name: &str, predicate: &Predicate<C>, context: &C) -> MonitorOutcome {
    match predicate.evaluate(context) {
        Ok(passed) => Ok(MonitorResult {
            node: node.path().into(),
            monitor: name.into(),
            passed,
        }),
        Err(error) => {
            warn!(node = node.path(), monitor = name, %error, "monitor failed");
            Err(EvaluationWarning::MonitorFailed {
                node: node.path().into(),
                monitor: name.into(),
                message: error.to_string(),
            })
        }
    }
}

/// Wraps each alternative of a single child under `label`.
fn combine_one(
    label: &str,
    alternatives: Vec<Alternative>,
    extra: Vec<EvaluationWarning>,
) -> Vec<Alternative> {
    combine(label, std::iter::once(alternatives), extra)
}

/// Builds every combination that picks one alternative from each
/// entry of `selected`, and roots it under `label`.  `extra` warnings
/// are attached to every result.
fn combine<I>(label: &str, selected: I, extra: Vec<EvaluationWarning>) -> Vec<Alternative>
where
    I: IntoIterator<Item = Vec<Alternative>>,
{
    let mut partial: Vec<(Vec<InstanceNode>, Vec<EvaluationWarning>)> = vec![(Vec::new(), extra)];

    for alternatives in selected {
        let mut next = Vec::with_capacity(partial.len() * alternatives.len());
        for (nodes, warnings) in &partial {
            for alternative in &alternatives {
                let mut nodes = nodes.clone();
                let mut warnings = warnings.clone();
                nodes.push(alternative.node.clone());
                warnings.extend(alternative.warnings.iter().cloned());
                next.push((nodes, warnings));
            }
        }

        partial = next;
    }

    partial
        .into_iter()
        .map(|(children, warnings)| Alternative {
            node: InstanceNode::new(label, children),
            warnings,
        })
        .collect()
}

#[cfg(test)]
type Facts = std::collections::HashSet<&'static str>;

#[cfg(test)]
fn fact(name: &'static str) -> Predicate<Facts> {
    Predicate::infallible(name, move |facts: &Facts| facts.contains(name))
}

#[cfg(test)]
fn facts(names: &[&'static str]) -> Facts {
    names.iter().copied().collect()
}

#[cfg(test)]
fn weather_tree() -> Tree<Facts> {
    use crate::builder::{NodeSpec, TreeSpec};
    use crate::predicate::PredicateRegistry;

    TreeSpec::new(
        "weather",
        NodeSpec::all("Root")
            .child(
                NodeSpec::exclusive("Weather")
                    .child(NodeSpec::leaf("Clear").condition(fact("clear")))
                    .child(NodeSpec::leaf("Rain").condition(fact("rain"))),
            )
            .child(NodeSpec::leaf("Junction").condition(fact("junction"))),
    )
    .build(&PredicateRegistry::new())
    .expect("ok")
}

#[test]
fn test_end_to_end() {
    let tree = weather_tree();
    let result = instantiate(
        &tree,
        &facts(&["clear", "junction"]),
        &InstantiationOptions::default(),
    );

    assert_eq!(result.instances.len(), 1);
    assert!(result.failures.is_empty());

    let instance = &result.instances[0];
    assert_eq!(instance.path(), ["Root", "Weather/Clear", "Junction"]);
    assert!(!instance.is_flagged());
    assert_eq!(crate::count::possible_instance_count(&tree), 2);
}

#[test]
fn test_missing_requirement() {
    let tree = weather_tree();
    let options = InstantiationOptions::default();

    // `Junction` is required by the root.
    assert!(instantiate(&tree, &facts(&["clear"]), &options)
        .instances
        .is_empty());
    // `Weather` must pick one child.
    assert!(instantiate(&tree, &facts(&["junction"]), &options)
        .instances
        .is_empty());
}

#[test]
fn test_exclusive_violation_report_all() {
    let tree = weather_tree();
    let result = instantiate(
        &tree,
        &facts(&["clear", "rain", "junction"]),
        &InstantiationOptions {
            exclusivity: ExclusivityPolicy::ReportAll,
        },
    );

    let paths: Vec<_> = result.instances.iter().map(Instance::path).collect();
    assert_eq!(
        paths,
        [
            ["Root", "Weather/Clear", "Junction"],
            ["Root", "Weather/Rain", "Junction"]
        ]
    );

    let expected = EvaluationWarning::ExclusiveViolation {
        node: "Root/Weather".into(),
        holding: vec!["Clear".into(), "Rain".into()],
    };
    for instance in &result.instances {
        assert_eq!(instance.warnings, [expected.clone()]);
    }
    assert_eq!(result.warnings().count(), 2);
}

#[test]
fn test_exclusive_violation_first_match() {
    let tree = weather_tree();
    let result = instantiate(
        &tree,
        &facts(&["clear", "rain", "junction"]),
        &InstantiationOptions {
            exclusivity: ExclusivityPolicy::FirstMatch,
        },
    );

    assert_eq!(result.instances.len(), 1);
    let instance = &result.instances[0];
    assert_eq!(instance.path(), ["Root", "Weather/Clear", "Junction"]);
    assert!(instance.is_flagged());
    assert!(matches!(
        instance.warnings[0],
        EvaluationWarning::ExclusiveViolation { .. }
    ));
}

#[test]
fn test_optional_and_bounded() {
    use crate::builder::{NodeSpec, TreeSpec};
    use crate::predicate::PredicateRegistry;

    let tree = TreeSpec::new(
        "mixed",
        NodeSpec::all("Root")
            .child(
                NodeSpec::optional("Traffic")
                    .child(NodeSpec::leaf("Follows").condition(fact("follows")))
                    .child(NodeSpec::leaf("Oncoming").condition(fact("oncoming"))),
            )
            .child(
                NodeSpec::bounded("Signals", 0, 1)
                    .child(NodeSpec::leaf("StopSign").condition(fact("stop")))
                    .child(NodeSpec::leaf("RedLight").condition(fact("red"))),
            ),
    )
    .build(&PredicateRegistry::new())
    .expect("ok");
    let options = InstantiationOptions::default();

    let nothing = instantiate(&tree, &facts(&[]), &options);
    assert_eq!(nothing.instances.len(), 1);
    assert_eq!(
        nothing.instances[0].root.to_string(),
        "Root(Traffic, Signals)"
    );

    let busy = instantiate(&tree, &facts(&["follows", "oncoming", "red"]), &options);
    assert_eq!(busy.instances.len(), 1);
    assert_eq!(
        busy.instances[0].root.to_string(),
        "Root(Traffic(Follows, Oncoming), Signals(RedLight))"
    );

    // Two signals exceed the upper bound: not an anomaly, just no
    // valid instance.
    let both = instantiate(&tree, &facts(&["stop", "red"]), &options);
    assert!(both.instances.is_empty());
    assert_eq!(both.warnings().count(), 0);
}

#[test]
fn test_bounded_lower_bound() {
    use crate::builder::{NodeSpec, TreeSpec};
    use crate::predicate::PredicateRegistry;

    let tree = TreeSpec::new(
        "bounded",
        NodeSpec::bounded("Root", 2, 3)
            .child(NodeSpec::leaf("A").condition(fact("a")))
            .child(NodeSpec::leaf("B").condition(fact("b")))
            .child(NodeSpec::leaf("C").condition(fact("c"))),
    )
    .build(&PredicateRegistry::new())
    .expect("ok");
    let options = InstantiationOptions::default();

    assert!(instantiate(&tree, &facts(&["a"]), &options)
        .instances
        .is_empty());

    let result = instantiate(&tree, &facts(&["a", "c"]), &options);
    assert_eq!(result.instances.len(), 1);
    assert_eq!(result.instances[0].root.to_string(), "Root(A, C)");
}

#[test]
fn test_predicate_failure() {
    use crate::builder::{NodeSpec, TreeSpec};
    use crate::error::PredicateError;
    use crate::predicate::PredicateRegistry;

    let broken = Predicate::new("broken", |_: &Facts| {
        Err(PredicateError::new("broken", "missing lane data"))
    });
    let tree = TreeSpec::new(
        "failing",
        NodeSpec::all("Root").child(
            NodeSpec::optional("Road")
                .child(NodeSpec::leaf("Junction").condition(broken))
                .child(NodeSpec::leaf("Highway").condition(fact("highway"))),
        ),
    )
    .build(&PredicateRegistry::new())
    .expect("ok");

    let result = instantiate(
        &tree,
        &facts(&["highway"]),
        &InstantiationOptions::default(),
    );

    assert_eq!(result.instances.len(), 1);
    assert_eq!(
        result.instances[0].root.to_string(),
        "Root(Road(Highway))"
    );
    assert_eq!(
        result.failures,
        [PredicateFailure {
            node: "Root/Road/Junction".into(),
            error: PredicateError::new("broken", "missing lane data"),
        }]
    );
}

#[test]
fn test_monitors() {
    use crate::builder::{NodeSpec, TreeSpec};
    use crate::error::PredicateError;
    use crate::predicate::PredicateRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = {
        let calls = calls.clone();
        Predicate::infallible("counted", move |_: &Facts| {
            calls.fetch_add(1, Ordering::Relaxed);
            true
        })
    };
    let broken = Predicate::new("broken", |_: &Facts| {
        Err(PredicateError::new("broken", "no speed data"))
    });

    let tree = TreeSpec::new(
        "monitored",
        NodeSpec::all("Root")
            .monitor("speedLimit", fact("legal"))
            .child(
                NodeSpec::exclusive("Weather")
                    .child(
                        NodeSpec::leaf("Clear")
                            .condition(fact("clear"))
                            .monitor("counted", counted.clone())
                            .monitor("broken", broken),
                    )
                    .child(
                        NodeSpec::leaf("Rain")
                            .condition(fact("rain"))
                            .monitor("counted", counted),
                    ),
            ),
    )
    .build(&PredicateRegistry::new())
    .expect("ok");

    let result = instantiate(&tree, &facts(&["clear"]), &InstantiationOptions::default());
    assert_eq!(result.instances.len(), 1);

    let instance = &result.instances[0];
    assert_eq!(
        instance.monitors,
        [
            MonitorResult {
                node: "Root".into(),
                monitor: "speedLimit".into(),
                passed: false,
            },
            MonitorResult {
                node: "Root/Weather/Clear".into(),
                monitor: "counted".into(),
                passed: true,
            },
        ]
    );
    assert_eq!(instance.failed_monitors().count(), 1);
    assert_eq!(
        instance.warnings,
        [EvaluationWarning::MonitorFailed {
            node: "Root/Weather/Clear".into(),
            monitor: "broken".into(),
            message: "predicate 'broken' failed: no speed data".into(),
        }]
    );
    // Monitors on `Rain` never ran.
    assert_eq!(calls.load(Ordering::Relaxed), 1);

    // Monitors never affect validity.
    let invalid = instantiate(&tree, &facts(&["legal"]), &InstantiationOptions::default());
    assert!(invalid.instances.is_empty());
}

#[test]
fn test_false_container_skips_children() {
    use crate::builder::{NodeSpec, TreeSpec};
    use crate::predicate::PredicateRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = {
        let calls = calls.clone();
        Predicate::infallible("counted", move |_: &Facts| {
            calls.fetch_add(1, Ordering::Relaxed);
            true
        })
    };

    let tree = TreeSpec::new(
        "gated",
        NodeSpec::optional("Root").child(
            NodeSpec::all("Urban")
                .condition(fact("urban"))
                .child(NodeSpec::leaf("Pedestrian").condition(counted)),
        ),
    )
    .build(&PredicateRegistry::new())
    .expect("ok");

    let result = instantiate(&tree, &facts(&[]), &InstantiationOptions::default());
    assert_eq!(result.instances.len(), 1);
    assert_eq!(result.instances[0].root.to_string(), "Root");
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn test_projection_degenerate_leaf() {
    use crate::builder::{NodeSpec, TreeSpec};
    use crate::predicate::PredicateRegistry;
    use crate::projection::project;

    let tree = TreeSpec::new(
        "projected",
        NodeSpec::all("Root").child(
            NodeSpec::exclusive("Weather")
                .condition(fact("daylight"))
                .projection("coarse")
                .child(NodeSpec::leaf("Clear").condition(fact("clear")))
                .child(NodeSpec::leaf("Rain").condition(fact("rain"))),
        ),
    )
    .projections(vec!["coarse"])
    .build(&PredicateRegistry::new())
    .expect("ok");
    let coarse = project(&tree, "coarse");
    let options = InstantiationOptions::default();

    // No weather leaf holds: the full tree has no instance, but the
    // pruned `Weather` only depends on its own condition.
    assert!(instantiate(&tree, &facts(&["daylight"]), &options)
        .instances
        .is_empty());
    let result = instantiate(&coarse, &facts(&["daylight"]), &options);
    assert_eq!(result.instances.len(), 1);
    assert_eq!(result.instances[0].path(), ["Root", "Weather"]);
}

#[test]
fn test_concurrent_contexts() {
    use std::sync::Arc;

    let tree = Arc::new(weather_tree());
    let handles: Vec<_> = [
        &["clear", "junction"][..],
        &["rain", "junction"][..],
        &["rain"][..],
    ]
    .iter()
    .map(|names| {
        let tree = tree.clone();
        let context = facts(names);
        std::thread::spawn(move || {
            instantiate(&tree, &context, &InstantiationOptions::default())
                .instances
                .len()
        })
    })
    .collect();

    let counts: Vec<usize> = handles
        .into_iter()
        .map(|handle| handle.join().expect("no panic"))
        .collect();
    assert_eq!(counts, [1, 1, 0]);
}
