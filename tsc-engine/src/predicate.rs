//! Predicates are the only place where a classification tree looks
//! at data.  The engine treats them as opaque boolean functions of a
//! caller-defined context type `C`, and never inspects the context
//! itself.
//!
//! Relational predicates ("ego follows some other vehicle") quantify
//! over the other entities in the context; `Predicate::exists_other`
//! and `Predicate::for_all_others` turn a binary relation into the
//! unary closure the engine calls.
use crate::error::PredicateError;
use std::collections::HashMap;
use std::sync::Arc;

pub type PredicateResult = Result<bool, PredicateError>;

/// Contexts that expose a primary entity and the set of entities it
/// may relate to.
pub trait EntityContext {
    type EntityId: Eq;

    /// The entity whose behaviour is being classified.
    fn primary_entity(&self) -> &Self::EntityId;

    /// Every entity present in the context, primary included.
    fn entity_ids(&self) -> &[Self::EntityId];
}

/// A named, shareable boolean function over contexts.
///
/// Predicates must be side-effect free and safe to call from several
/// threads at once: the same tree is evaluated concurrently on
/// different contexts.
pub struct Predicate<C> {
    name: Arc<str>,
    fun: Arc<dyn Fn(&C) -> PredicateResult + Send + Sync>,
}

impl<C: 'static> Predicate<C> {
    /// Wraps a fallible predicate.
    pub fn new<F>(name: &str, fun: F) -> Self
    where
        F: Fn(&C) -> PredicateResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fun: Arc::new(fun),
        }
    }

    /// Wraps a predicate that always decides.
    pub fn infallible<F>(name: &str, fun: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        Self::new(name, move |ctx| Ok(fun(ctx)))
    }

    /// A predicate that always holds.
    #[must_use]
    pub fn always(name: &str) -> Self {
        Self::new(name, |_| Ok(true))
    }
}

impl<C> Predicate<C> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the predicate on `context`.
    ///
    /// # Errors
    ///
    /// Returns the predicate's own error when it cannot decide.
    #[inline]
    pub fn evaluate(&self, context: &C) -> PredicateResult {
        (self.fun)(context)
    }
}

impl<C: EntityContext + 'static> Predicate<C> {
    /// Holds iff `relation(context, other)` holds for at least one
    /// entity `other` distinct from the primary entity.
    pub fn exists_other<F>(name: &str, relation: F) -> Self
    where
        F: Fn(&C, &C::EntityId) -> bool + Send + Sync + 'static,
    {
        Self::infallible(name, move |ctx: &C| {
            let primary = ctx.primary_entity();
            ctx.entity_ids()
                .iter()
                .filter(|other| *other != primary)
                .any(|other| relation(ctx, other))
        })
    }

    /// Holds iff `relation(context, other)` holds for every entity
    /// `other` distinct from the primary entity (vacuously true when
    /// the primary entity is alone).
    pub fn for_all_others<F>(name: &str, relation: F) -> Self
    where
        F: Fn(&C, &C::EntityId) -> bool + Send + Sync + 'static,
    {
        Self::infallible(name, move |ctx: &C| {
            let primary = ctx.primary_entity();
            ctx.entity_ids()
                .iter()
                .filter(|other| *other != primary)
                .all(|other| relation(ctx, other))
        })
    }
}

impl<C> Clone for Predicate<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            fun: self.fun.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Predicate<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Predicate({})", self.name)
    }
}

/// Tree declarations refer to predicates either directly, or by name
/// in a `PredicateRegistry` supplied at build time.
pub enum ConditionRef<C> {
    Inline(Predicate<C>),
    Named(String),
}

impl<C> ConditionRef<C> {
    /// The name of the predicate, whether or not it is resolved yet.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ConditionRef::Inline(predicate) => predicate.name(),
            ConditionRef::Named(name) => name,
        }
    }
}

impl<C> Clone for ConditionRef<C> {
    fn clone(&self) -> Self {
        match self {
            ConditionRef::Inline(predicate) => ConditionRef::Inline(predicate.clone()),
            ConditionRef::Named(name) => ConditionRef::Named(name.clone()),
        }
    }
}

impl<C> std::fmt::Debug for ConditionRef<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionRef::Inline(predicate) => write!(f, "Inline({})", predicate.name()),
            ConditionRef::Named(name) => write!(f, "Named({})", name),
        }
    }
}

impl<C> From<Predicate<C>> for ConditionRef<C> {
    fn from(predicate: Predicate<C>) -> Self {
        ConditionRef::Inline(predicate)
    }
}

impl<C> From<&str> for ConditionRef<C> {
    fn from(name: &str) -> Self {
        ConditionRef::Named(name.into())
    }
}

/// Maps names to predicates, so that tree declarations need not
/// capture closures themselves.
pub struct PredicateRegistry<C> {
    predicates: HashMap<String, Predicate<C>>,
}

impl<C> PredicateRegistry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }

    /// Registers `predicate` under its own name, and returns the
    /// predicate it replaced, if any.
    pub fn register(&mut self, predicate: Predicate<C>) -> Option<Predicate<C>> {
        self.predicates.insert(predicate.name().into(), predicate)
    }

    /// Chaining variant of `register`.
    #[must_use]
    pub fn with(mut self, predicate: Predicate<C>) -> Self {
        self.register(predicate);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Predicate<C>> {
        self.predicates.get(name)
    }

    /// Returns the predicate `condition` refers to, or `None` for an
    /// unknown name.
    #[must_use]
    pub fn resolve(&self, condition: &ConditionRef<C>) -> Option<Predicate<C>> {
        match condition {
            ConditionRef::Inline(predicate) => Some(predicate.clone()),
            ConditionRef::Named(name) => self.get(name).cloned(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl<C> Default for PredicateRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
struct Scene {
    ego: u32,
    ids: Vec<u32>,
}

#[cfg(test)]
impl EntityContext for Scene {
    type EntityId = u32;

    fn primary_entity(&self) -> &u32 {
        &self.ego
    }

    fn entity_ids(&self) -> &[u32] {
        &self.ids
    }
}

#[test]
fn test_relational() {
    let follows = Predicate::<Scene>::exists_other("follows", |_, other| *other == 7);
    let all_far = Predicate::<Scene>::for_all_others("allFar", |ctx, other| *other > ctx.ego);

    let scene = Scene {
        ego: 1,
        ids: vec![1, 3, 7],
    };
    assert_eq!(follows.evaluate(&scene), Ok(true));
    assert_eq!(all_far.evaluate(&scene), Ok(true));

    // The primary entity never counts as "other".
    let alone = Scene {
        ego: 7,
        ids: vec![7],
    };
    assert_eq!(follows.evaluate(&alone), Ok(false));
    assert_eq!(all_far.evaluate(&alone), Ok(true));
}

#[test]
fn test_registry_resolve() {
    let registry = PredicateRegistry::<u32>::new()
        .with(Predicate::infallible("even", |x| x % 2 == 0))
        .with(Predicate::new("failing", |_| {
            Err(PredicateError::new("failing", "no data"))
        }));

    assert_eq!(registry.len(), 2);

    let even = registry.resolve(&"even".into()).expect("registered");
    assert_eq!(even.name(), "even");
    assert_eq!(even.evaluate(&4), Ok(true));
    assert_eq!(even.evaluate(&3), Ok(false));

    assert!(registry.resolve(&"odd".into()).is_none());
    assert!(registry
        .get("failing")
        .expect("registered")
        .evaluate(&0)
        .is_err());

    let inline = Predicate::<u32>::always("yes").into();
    assert_eq!(
        registry.resolve(&inline).expect("inline").evaluate(&1),
        Ok(true)
    );
}
