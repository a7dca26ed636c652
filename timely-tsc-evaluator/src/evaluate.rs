//! Batch evaluation runs every tree (and, optionally, each of its
//! projections) on every context of a batch, across a set of timely
//! workers.  Context `i` is evaluated on worker `i % workers`; each
//! instance becomes one `Category` record in a differential
//! collection, from which we derive:
//!
//! - the number of occurrences of each category (`count`);
//! - the number of distinct categories observed per tree or view
//!   (`distinct`, then `count` on the label).
//!
//! Both aggregates are reified through sinks.  Everything that only
//! concerns one context (instances, predicate failures, warnings) is
//! returned directly by the worker that evaluated it.
use crate::category::Category;
use crate::config::EvaluatorConfig;
use crate::error::EvaluationError;
use crate::sink::{DistinctSink, OccurrenceSink};
use differential_dataflow::input::Input;
use differential_dataflow::operators::{Count, Threshold};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use timely::dataflow::operators::probe::Handle;
use tracing::{debug, info, info_span};
use tsc_engine::{
    build_projections, instantiate, possible_instance_count, EvaluationWarning, Instantiation,
    Tree,
};

/// The instantiation of one view (a tree or one of its projections)
/// on one context.
#[derive(Clone, Debug)]
pub struct ViewResult {
    pub view: String,
    pub instantiation: Instantiation,
}

/// Everything learned about one context of the batch.
#[derive(Clone, Debug)]
pub struct SegmentResult {
    /// Position of the context in the batch.
    pub index: usize,
    pub views: Vec<ViewResult>,
}

/// Aggregates for one view over the whole batch.
#[derive(Clone, Debug, Default)]
pub struct ViewReport {
    pub view: String,
    pub possible_instances: u128,
    /// Number of distinct categories observed at least once.
    pub observed_categories: usize,
    /// Occurrences of each observed category, keyed on instance path.
    pub occurrences: BTreeMap<Vec<String>, usize>,
    /// Warnings raised on this view's instances, with the index of
    /// the offending context.
    pub warnings: Vec<(usize, EvaluationWarning)>,
}

impl ViewReport {
    /// Share of the possible categories observed in the batch.
    #[must_use]
    pub fn coverage(&self) -> f64 {
        if self.possible_instances == 0 {
            return 0.0;
        }

        self.observed_categories as f64 / self.possible_instances as f64
    }
}

#[derive(Clone, Debug, Default)]
pub struct EvaluationReport {
    /// One entry per view, trees first, each followed by its
    /// projections.
    pub views: Vec<ViewReport>,
    /// Per-context results, ordered by context index.
    pub segments: Vec<SegmentResult>,
}

impl EvaluationReport {
    /// Finds the report for a view, by qualified label (e.g.,
    /// `weather` or `weather[static]`).
    #[must_use]
    pub fn view(&self, label: &str) -> Option<&ViewReport> {
        self.views.iter().find(|view| view.view == label)
    }

    /// Number of predicate failures over all segments and views.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.segments
            .iter()
            .flat_map(|segment| segment.views.iter())
            .map(|view| view.instantiation.failures.len())
            .sum()
    }
}

/// Lists the views to evaluate for `trees`: each tree, followed by its
/// projections when `include_projections` is set.
#[must_use]
pub fn evaluation_views<C>(trees: &[Tree<C>], include_projections: bool) -> Vec<Tree<C>> {
    let mut views = Vec::new();

    for tree in trees {
        views.push(tree.clone());
        if include_projections {
            views.extend(build_projections(tree));
        }
    }

    views
}

/// Evaluates every view of `trees` on every context, and aggregates
/// the results.
///
/// # Errors
///
/// Returns `Err` when `config` is invalid, when two views share a
/// qualified label, or when timely fails to start or join a worker.  Predicate failures are not errors; they
/// are listed in the corresponding `SegmentResult`.
pub fn evaluate_segments<C>(
    trees: &[Tree<C>],
    contexts: Vec<C>,
    config: &EvaluatorConfig,
) -> Result<EvaluationReport, EvaluationError>
where
    C: Send + Sync + 'static,
{
    config.validate()?;

    let views = evaluation_views(trees, config.include_projections);
    // Aggregates are keyed on the qualified label.
    let mut labels = HashSet::new();
    for view in &views {
        let label = view.qualified_label();
        if !labels.insert(label.clone()) {
            return Err(EvaluationError::InvalidConfig(format!(
                "duplicate view label '{}'",
                label
            )));
        }
    }

    let views = Arc::new(views);
    let contexts = Arc::new(contexts);
    let options = config.instantiation_options();
    let occurrences = OccurrenceSink::new();
    let distinct = DistinctSink::new();

    info!(
        views = views.len(),
        contexts = contexts.len(),
        workers = config.workers,
        "starting batch evaluation"
    );

    let worker_views = views.clone();
    let occurrence_writer = occurrences.writer();
    let distinct_writer = distinct.writer();
    let guards = timely::execute(timely::Config::process(config.workers), move |worker| {
        let index = worker.index();
        let peers = worker.peers();

        let occurrence_writer = occurrence_writer.clone();
        let distinct_writer = distinct_writer.clone();
        let (mut input, probe) = worker.dataflow::<u64, _, _>(move |scope| {
            let (input, categories) = scope.new_collection::<Category, isize>();
            let mut probe = Handle::new();

            occurrence_writer
                .attach(&categories.count())
                .probe_with(&mut probe);
            distinct_writer
                .attach(&categories.distinct().map(|category| category.tree).count())
                .probe_with(&mut probe);

            (input, probe)
        });

        let mut segments = Vec::new();
        for (position, context) in contexts.iter().enumerate() {
            if position % peers != index {
                continue;
            }

            let span = info_span!("segment", index = position, worker = index);
            let _guard = span.enter();

            let mut views = Vec::with_capacity(worker_views.len());
            for view in worker_views.iter() {
                let label = view.qualified_label();
                let instantiation = instantiate(view, context, &options);
                for instance in &instantiation.instances {
                    input.insert(Category::from_instance(&label, instance));
                }

                debug!(
                    view = %label,
                    instances = instantiation.instances.len(),
                    failures = instantiation.failures.len(),
                    "evaluated view"
                );
                views.push(ViewResult {
                    view: label,
                    instantiation,
                });
            }

            segments.push(SegmentResult {
                index: position,
                views,
            });
        }

        // The timestamp change isn't guaranteed to be visible until
        // flushed.
        input.advance_to(1);
        input.flush();
        worker.step_while(|| probe.less_than(input.time()));

        segments
    })
    .map_err(EvaluationError::Worker)?;

    let mut segments = Vec::new();
    for result in guards.join() {
        segments.extend(result.map_err(EvaluationError::Worker)?);
    }
    segments.sort_by_key(|segment| segment.index);

    let report = EvaluationReport {
        views: summarise_views(&views, &segments, &occurrences, &distinct),
        segments,
    };
    info!(
        views = report.views.len(),
        segments = report.segments.len(),
        failures = report.failure_count(),
        "finished batch evaluation"
    );
    Ok(report)
}

fn summarise_views<C>(
    views: &[Tree<C>],
    segments: &[SegmentResult],
    occurrences: &OccurrenceSink,
    distinct: &DistinctSink,
) -> Vec<ViewReport> {
    let mut reports: Vec<ViewReport> = views
        .iter()
        .map(|view| ViewReport {
            view: view.qualified_label(),
            possible_instances: possible_instance_count(view),
            ..ViewReport::default()
        })
        .collect();
    let positions: BTreeMap<String, usize> = reports
        .iter()
        .enumerate()
        .map(|(position, report)| (report.view.clone(), position))
        .collect();

    occurrences.with_snapshot(|map| {
        for ((category, count), multiplicity) in map {
            if *multiplicity <= 0 || *count <= 0 {
                continue;
            }

            if let Some(position) = positions.get(&category.tree) {
                reports[*position]
                    .occurrences
                    .insert(category.paths.clone(), *count as usize);
            }
        }
    });

    distinct.with_snapshot(|map| {
        for ((label, count), multiplicity) in map {
            if *multiplicity <= 0 || *count <= 0 {
                continue;
            }

            if let Some(position) = positions.get(label) {
                reports[*position].observed_categories = *count as usize;
            }
        }
    });

    for segment in segments {
        for result in &segment.views {
            if let Some(position) = positions.get(&result.view) {
                reports[*position].warnings.extend(
                    result
                        .instantiation
                        .warnings()
                        .cloned()
                        .map(|warning| (segment.index, warning)),
                );
            }
        }
    }

    reports
}

#[cfg(test)]
type Facts = std::collections::HashSet<&'static str>;

#[cfg(test)]
fn facts(names: &[&'static str]) -> Facts {
    names.iter().copied().collect()
}

/// `Root { Weather { Clear, Rain }, Junction }`, where `Weather` is
/// in the `static` projection, and `Rain` fails on broken contexts.
#[cfg(test)]
fn weather_tree() -> Tree<Facts> {
    use tsc_engine::{NodeSpec, Predicate, PredicateError, PredicateRegistry, TreeSpec};

    let registry = PredicateRegistry::new()
        .with(Predicate::infallible("clear", |facts: &Facts| {
            facts.contains("clear")
        }))
        .with(Predicate::new("rain", |facts: &Facts| {
            if facts.contains("broken") {
                return Err(PredicateError::new("rain", "sensor offline"));
            }

            Ok(facts.contains("rain"))
        }))
        .with(Predicate::infallible("junction", |facts: &Facts| {
            facts.contains("junction")
        }));

    TreeSpec::new(
        "weather",
        NodeSpec::all("Root")
            .child(
                NodeSpec::exclusive("Weather")
                    .projection("static")
                    .child(NodeSpec::leaf("Clear").condition("clear"))
                    .child(NodeSpec::leaf("Rain").condition("rain")),
            )
            .child(NodeSpec::leaf("Junction").condition("junction")),
    )
    .projections(vec!["static"])
    .build(&registry)
    .expect("ok")
}

#[cfg(test)]
fn contexts() -> Vec<Facts> {
    vec![
        facts(&["clear", "junction"]),
        facts(&["rain", "junction"]),
        facts(&["clear", "junction"]),
        facts(&["clear", "rain", "junction"]),
        facts(&["clear"]),
        facts(&["broken", "clear", "junction"]),
    ]
}

#[cfg(test)]
fn path(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

#[test]
fn test_evaluation_views() {
    let tree = weather_tree();
    let labels = |views: Vec<Tree<Facts>>| -> Vec<String> {
        views.iter().map(Tree::qualified_label).collect()
    };

    assert_eq!(
        labels(evaluation_views(&[tree.clone()], true)),
        ["weather", "weather[static]"]
    );
    assert_eq!(labels(evaluation_views(&[tree], false)), ["weather"]);
}

#[test]
fn test_evaluate_segments() {
    let config = EvaluatorConfig {
        workers: 2,
        ..EvaluatorConfig::default()
    };
    let report = evaluate_segments(&[weather_tree()], contexts(), &config).expect("ok");

    let indices: Vec<usize> = report.segments.iter().map(|segment| segment.index).collect();
    assert_eq!(indices, [0, 1, 2, 3, 4, 5]);
    assert!(report.segments.iter().all(|segment| segment.views.len() == 2));
    assert_eq!(report.failure_count(), 1);

    let full = report.view("weather").expect("present");
    assert_eq!(full.possible_instances, 2);
    assert_eq!(full.observed_categories, 2);
    assert_eq!(
        full.occurrences,
        [
            (path(&["Root", "Weather/Clear", "Junction"]), 4),
            (path(&["Root", "Weather/Rain", "Junction"]), 2),
        ]
        .iter()
        .cloned()
        .collect()
    );
    // Both instances of the overlapping context are flagged.
    assert_eq!(full.warnings.len(), 2);
    assert!(full.warnings.iter().all(|(index, warning)| *index == 3
        && matches!(warning, EvaluationWarning::ExclusiveViolation { .. })));
    assert!((full.coverage() - 1.0).abs() < 1e-9);

    // The static view only sees a degenerate `Weather`, which always
    // holds.
    let coarse = report.view("weather[static]").expect("present");
    assert_eq!(coarse.possible_instances, 1);
    assert_eq!(coarse.observed_categories, 1);
    assert_eq!(
        coarse.occurrences,
        [(path(&["Root", "Weather"]), 6)].iter().cloned().collect()
    );
    assert!(coarse.warnings.is_empty());
}

#[test]
fn test_first_match_without_projections() {
    use tsc_engine::ExclusivityPolicy;

    let config = EvaluatorConfig::from_toml_str(
        r#"
workers = 3
include_projections = false
exclusivity = "first_match"
"#,
    )
    .expect("ok");
    let report = evaluate_segments(&[weather_tree()], contexts(), &config).expect("ok");

    assert_eq!(config.exclusivity, ExclusivityPolicy::FirstMatch);
    assert_eq!(report.views.len(), 1);
    assert!(report.view("weather[static]").is_none());

    let full = report.view("weather").expect("present");
    assert_eq!(
        full.occurrences,
        [
            (path(&["Root", "Weather/Clear", "Junction"]), 4),
            (path(&["Root", "Weather/Rain", "Junction"]), 1),
        ]
        .iter()
        .cloned()
        .collect()
    );
    assert_eq!(full.warnings.len(), 1);

    let overlapping = &report.segments[3].views[0].instantiation;
    assert_eq!(overlapping.instances.len(), 1);
    assert!(overlapping.instances[0].is_flagged());
}

#[test]
fn test_large_batch() {
    let config = EvaluatorConfig {
        workers: 4,
        ..EvaluatorConfig::default()
    };
    let batch: Vec<Facts> = contexts().into_iter().cycle().take(240).collect();
    let report = evaluate_segments(&[weather_tree()], batch, &config).expect("ok");

    assert_eq!(report.segments.len(), 240);
    assert_eq!(report.failure_count(), 40);

    let full = report.view("weather").expect("present");
    assert_eq!(full.observed_categories, 2);
    assert_eq!(
        full.occurrences,
        [
            (path(&["Root", "Weather/Clear", "Junction"]), 160),
            (path(&["Root", "Weather/Rain", "Junction"]), 80),
        ]
        .iter()
        .cloned()
        .collect()
    );
    assert_eq!(full.warnings.len(), 80);

    let coarse = report.view("weather[static]").expect("present");
    assert_eq!(coarse.observed_categories, 1);
    assert_eq!(
        coarse.occurrences,
        [(path(&["Root", "Weather"]), 240)].iter().cloned().collect()
    );
}

#[test]
fn test_empty_batch() {
    let report =
        evaluate_segments(&[weather_tree()], Vec::new(), &EvaluatorConfig::default()).expect("ok");

    assert!(report.segments.is_empty());
    assert_eq!(report.views.len(), 2);
    assert!(report.views.iter().all(|view| view.observed_categories == 0
        && view.occurrences.is_empty()
        && view.coverage() == 0.0));
}

#[test]
fn test_invalid_config() {
    let config = EvaluatorConfig {
        workers: 0,
        ..EvaluatorConfig::default()
    };

    assert!(matches!(
        evaluate_segments(&[weather_tree()], contexts(), &config),
        Err(EvaluationError::InvalidConfig(_))
    ));
}

#[test]
fn test_duplicate_view_labels() {
    let result = evaluate_segments(
        &[weather_tree(), weather_tree()],
        contexts(),
        &EvaluatorConfig::default(),
    );

    match result {
        Err(EvaluationError::InvalidConfig(message)) => {
            assert!(message.contains("'weather'"));
        }
        other => panic!("unexpected result {:?}", other.map(|report| report.views.len())),
    }
}
