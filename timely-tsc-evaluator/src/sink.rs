//! Differential Dataflow collections are closer to pipes that
//! describe a computation's dataflow than to concrete collections.
//! In order to get aggregates out of the evaluation dataflow, we
//! listen to a collection's change stream, and reify the result into
//! a plain map.
//!
//! The write end is decoupled from the read (snapshot) end: writers
//! move into the per-worker dataflow closures, while the sink itself
//! stays with the caller, which reads it once all workers are done.
use crate::category::Category;
use differential_dataflow::{Collection, Data};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use timely::dataflow::Scope;

/// Occurrence counts for each category.
pub type OccurrenceSink = Sink<(Category, isize)>;
pub type OccurrenceWriter = SinkWriter<(Category, isize)>;
/// Number of distinct categories observed for each tree label.
pub type DistinctSink = Sink<(String, isize)>;
pub type DistinctWriter = SinkWriter<(String, isize)>;

/// A Sink exposes a running multiplicity snapshot for all the data it
/// has received (so far) from differential dataflow collections.
///
/// In order to hook up a collection to a Sink, one must first gain
/// ownership of a `SinkWriter`, by calling `Sink::writer()`.
#[derive(Clone, Debug)]
pub struct Sink<D: Data + Eq + Hash> {
    inner: Arc<SinkImpl<D>>,
}

impl<D: Data + Eq + Hash> Sink<D> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SinkImpl::new()),
        }
    }

    /// Returns a fresh writer for the sink.
    pub fn writer(&self) -> SinkWriter<D> {
        SinkWriter {
            inner: self.inner.clone(),
        }
    }

    /// Collects all the values with non-zero multiplicities.
    pub fn values<Ret: std::iter::FromIterator<D>>(&self) -> Ret {
        self.with_snapshot(|map| map.keys().cloned().collect())
    }

    /// Calls `handler` with a snapshot of the data in the sink.  The
    /// key in the map is the data, and the value its multiplicity.
    /// There is never a zero-valued entry.
    pub fn with_snapshot<F, Ret>(&self, handler: F) -> Ret
    where
        F: FnOnce(&HashMap<D, isize>) -> Ret,
    {
        self.inner.with_snapshot(handler)
    }
}

impl<D: Data + Eq + Hash> Default for Sink<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct SinkWriter<D: Data + Eq + Hash> {
    inner: Arc<SinkImpl<D>>,
}

impl<D: Data + Eq + Hash> SinkWriter<D> {
    /// Attaches an `inspect`or closure to `collection`; the `Sink`'s
    /// state will be updated to reflect the multiplicity of the data
    /// in that collection.  Probe the returned collection to know
    /// when the sink has caught up.
    ///
    /// Attaching the same sink to multiple collections (e.g., one per
    /// worker) is equivalent to attaching it to their concatenation.
    pub fn attach<G: Scope>(
        &self,
        collection: &Collection<G, D, isize>,
    ) -> Collection<G, D, isize> {
        SinkImpl::attach(self.inner.clone(), collection)
    }
}

#[derive(Debug)]
struct SinkImpl<D: Data + Eq + Hash> {
    counts: Mutex<HashMap<D, isize>>,
}

impl<D: Data + Eq + Hash> SinkImpl<D> {
    fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    fn with_snapshot<F, Ret>(&self, handler: F) -> Ret
    where
        F: FnOnce(&HashMap<D, isize>) -> Ret,
    {
        let counts = self.counts.lock().unwrap();
        handler(&counts)
    }

    fn attach<G: Scope>(
        this: Arc<Self>,
        collection: &Collection<G, D, isize>,
    ) -> Collection<G, D, isize> {
        collection.inspect(move |(data, _time, diff)| {
            let mut counts = this.counts.lock().unwrap();
            let count = counts.entry(data.clone()).or_insert(0);
            *count += *diff;
            if *count == 0 {
                counts.remove(data);
            }
        })
    }
}

#[cfg(test)]
fn category(tree: &str, leaf: &str) -> Category {
    Category::new(tree, vec!["Root".into(), leaf.into()])
}

#[test]
fn test_happy_path() {
    use differential_dataflow::input::InputSession;
    use std::collections::HashSet;

    let sink: Sink<Category> = Sink::new();
    let writer = sink.writer();

    timely::execute::example(move |scope| {
        let mut input = InputSession::<u64, Category, isize>::new();

        writer.attach(&input.to_collection(scope));

        input.advance_to(0);
        for leaf in &["Clear", "Rain", "Snow"] {
            input.insert(category("weather", leaf));
        }

        input.flush();
        input.advance_to(1);
    });

    assert_eq!(
        sink.values::<HashSet<_>>(),
        ["Clear", "Rain", "Snow"]
            .iter()
            .map(|leaf| category("weather", leaf))
            .collect()
    );
}

#[test]
fn test_multi_counts() {
    use differential_dataflow::input::InputSession;

    let sink: Sink<Category> = Sink::new();
    let writer = sink.writer();

    timely::execute::example(move |scope| {
        let mut input = InputSession::<u64, Category, isize>::new();

        writer.attach(&input.to_collection(scope));

        input.advance_to(0);
        input.insert(category("weather", "Clear"));
        input.insert(category("weather", "Rain"));
        input.insert(category("weather", "Snow"));
        input.flush();
        input.advance_to(1);
        input.insert(category("weather", "Clear"));
        input.remove(category("weather", "Snow"));
        input.remove(category("weather", "Fog"));
        input.flush();
        input.advance_to(2);
    });

    assert_eq!(
        sink.with_snapshot(|map| map.clone()),
        [
            (category("weather", "Clear"), 2),
            (category("weather", "Rain"), 1),
            (category("weather", "Fog"), -1),
        ]
        .iter()
        .cloned()
        .collect()
    );
}

#[test]
fn test_counted_occurrences() {
    use differential_dataflow::input::InputSession;
    use differential_dataflow::operators::Count;

    let sink = OccurrenceSink::new();
    let writer = sink.writer();

    timely::execute::example(move |scope| {
        let mut input = InputSession::<u64, Category, isize>::new();

        writer.attach(&input.to_collection(scope).count());

        input.advance_to(0);
        input.insert(category("weather", "Clear"));
        input.insert(category("weather", "Clear"));
        input.insert(category("weather", "Rain"));
        input.flush();
        input.advance_to(1);
    });

    assert_eq!(
        sink.values::<std::collections::BTreeSet<_>>(),
        [
            (category("weather", "Clear"), 2),
            (category("weather", "Rain"), 1),
        ]
        .iter()
        .cloned()
        .collect()
    );
}
