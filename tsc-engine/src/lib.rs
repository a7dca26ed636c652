//! A scenario classification tree (TSC) sorts scenario contexts into
//! categories: each node of the tree carries an optional boolean
//! predicate over the context, and container nodes constrain how
//! many of their children may hold at once.
//!
//! Trees are declared with `TreeSpec`/`NodeSpec` and validated once by
//! `build`.  After that, a `Tree` is immutable: `project` derives
//! named views of it, `instantiate` evaluates it on a context, and
//! `possible_instance_count`/`possible_instances` describe the space
//! of categories it can produce independently of any context.
mod builder;
mod count;
mod enumerate;
mod error;
mod instance;
mod instantiate;
mod node;
mod predicate;
mod projection;

pub use builder::build;
pub use builder::NodeSpec;
pub use builder::TreeSpec;
pub use count::possible_instance_count;
pub use enumerate::possible_instances;
pub use error::BuildError;
pub use error::PredicateError;
pub use instance::EvaluationWarning;
pub use instance::Instance;
pub use instance::InstanceNode;
pub use instance::Instantiation;
pub use instance::MonitorResult;
pub use instance::PredicateFailure;
pub use instantiate::instantiate;
pub use instantiate::ExclusivityPolicy;
pub use instantiate::InstantiationOptions;
pub use node::Node;
pub use node::NodeId;
pub use node::NodeKind;
pub use node::ProjectionMembership;
pub use node::Tree;
pub use predicate::ConditionRef;
pub use predicate::EntityContext;
pub use predicate::Predicate;
pub use predicate::PredicateRegistry;
pub use predicate::PredicateResult;
pub use projection::build_projections;
pub use projection::project;
pub use projection::projection_tags;
