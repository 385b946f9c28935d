//! The built-in verifier nodes.
//!
//! Registration order and dependencies mirror the check semantics:
//! numeric validity first, range sanity and jump dynamics over it, then the
//! cross-field, physics, and safety rules over range sanity.

mod cross_field;
mod jump_dynamics;
mod numeric_validity;
mod physics;
mod range_sanity;
mod safety;

pub use cross_field::CrossFieldConsistencyChecker;
pub use jump_dynamics::JumpDynamicsChecker;
pub use numeric_validity::NumericValidityChecker;
pub use physics::PhysicsConstraintChecker;
pub use range_sanity::RangeSanityChecker;
pub use safety::SafetyConstraintChecker;

use crate::config::EvalConfig;
use crate::graph::VerifierGraph;

/// Build the standard six-node graph for a frozen configuration.
pub fn standard_graph(config: &EvalConfig) -> VerifierGraph {
    let mut graph = VerifierGraph::new();
    graph.add(Box::new(NumericValidityChecker::new()), &[]);
    graph.add(
        Box::new(RangeSanityChecker::new(config)),
        &[numeric_validity::ID],
    );
    graph.add(
        Box::new(JumpDynamicsChecker::new(config)),
        &[numeric_validity::ID],
    );
    graph.add(
        Box::new(CrossFieldConsistencyChecker::new()),
        &[range_sanity::ID],
    );
    graph.add(
        Box::new(PhysicsConstraintChecker::new(config)),
        &[range_sanity::ID],
    );
    graph.add(
        Box::new(SafetyConstraintChecker::new()),
        &[range_sanity::ID],
    );
    graph
}
