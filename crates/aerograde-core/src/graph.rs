//! The verifier graph: a DAG of deterministic check nodes.
//!
//! Nodes are registered with optional dependency IDs and executed in
//! topological order, each exactly once per sample. Adding a check is a
//! pure addition: implement [`Verifier`], register it, done.
//!
//! A node that errors internally is isolated: its output is replaced with a
//! single critical atom citing the checker, and the remaining nodes proceed
//! so the audit trail stays complete.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::evidence::{AtomDraft, EvidencePack, EvidenceType, Scope, Severity};
use crate::schema::{FieldMap, FieldValue, TaskId};

/// Internal failure inside one verifier. Isolated per node, never fatal.
#[derive(Error, Debug)]
#[error("verifier {checker} failed in rule {rule}: {message}")]
pub struct VerifierError {
    pub checker: &'static str,
    pub rule: &'static str,
    pub message: String,
}

/// Read-only context shared by all verifiers for one sample.
pub struct VerifyContext<'a> {
    pub task: TaskId,
    /// The required schema fields, in order.
    pub required_fields: &'a [&'static str],
    /// Committed predictions from this model's previous sample, per field.
    pub previous: Option<&'a BTreeMap<String, FieldValue>>,
    /// Reference next-state, when available.
    pub gold: Option<&'a FieldMap>,
}

/// A deterministic check node.
pub trait Verifier: Send + Sync {
    /// Stable node ID used for dependency registration.
    fn id(&self) -> &'static str;

    /// The evidence family this node emits.
    fn evidence_type(&self) -> EvidenceType;

    /// Constraint IDs this node can check, for checklist generation.
    fn capabilities(&self) -> &'static [&'static str];

    /// Run the check and return evidence drafts in emission order.
    fn verify(
        &self,
        fields: &FieldMap,
        ctx: &VerifyContext<'_>,
    ) -> Result<Vec<AtomDraft>, VerifierError>;
}

struct Node {
    verifier: Box<dyn Verifier>,
    dependencies: Vec<&'static str>,
}

/// Registered verifiers plus their dependency edges.
#[derive(Default)]
pub struct VerifierGraph {
    nodes: Vec<Node>,
}

impl VerifierGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Dependencies are ordering-only: they name nodes that
    /// must have run first, not values passed between nodes.
    pub fn add(&mut self, verifier: Box<dyn Verifier>, dependencies: &[&'static str]) {
        self.nodes.push(Node {
            verifier,
            dependencies: dependencies.to_vec(),
        });
    }

    /// All capabilities across registered nodes, in registration order.
    pub fn capabilities(&self) -> Vec<&'static str> {
        self.nodes
            .iter()
            .flat_map(|n| n.verifier.capabilities().iter().copied())
            .collect()
    }

    pub fn node_ids(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|n| n.verifier.id()).collect()
    }

    /// Execute every node once, in topological order, appending atoms to the
    /// pack. Node errors are replaced with a single critical atom.
    pub fn execute(&self, fields: &FieldMap, ctx: &VerifyContext<'_>, pack: &mut EvidencePack) {
        for index in self.topological_order() {
            let node = &self.nodes[index];
            match node.verifier.verify(fields, ctx) {
                Ok(drafts) => pack.extend(drafts),
                Err(err) => {
                    tracing::warn!(
                        checker = err.checker,
                        rule = err.rule,
                        "verifier failed internally, replacing output"
                    );
                    pack.push(
                        AtomDraft::fail(
                            node.verifier.evidence_type(),
                            Severity::Critical,
                            format!("verifier internal error: {}", err),
                        )
                        .scope(Scope::Sample)
                        .meta("checker", err.checker)
                        .meta("rule", err.rule),
                    );
                }
            }
        }
    }

    /// Kahn's algorithm over registration order; unknown dependency IDs are
    /// ignored with a warning, cycles fall back to registration order for
    /// the remainder.
    fn topological_order(&self) -> Vec<usize> {
        let ids: Vec<&str> = self.nodes.iter().map(|n| n.verifier.id()).collect();
        let mut indegree = vec![0usize; self.nodes.len()];
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                match ids.iter().position(|id| id == dep) {
                    Some(j) => {
                        edges[j].push(i);
                        indegree[i] += 1;
                    }
                    None => {
                        tracing::warn!(dependency = dep, node = ids[i], "unknown dependency id");
                    }
                }
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut ready: Vec<usize> = (0..self.nodes.len()).filter(|&i| indegree[i] == 0).collect();
        while let Some(next) = ready.first().copied() {
            ready.remove(0);
            order.push(next);
            for &succ in &edges[next] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    ready.push(succ);
                    ready.sort_unstable();
                }
            }
        }

        // A cycle leaves nodes unordered; run them in registration order
        // rather than dropping checks.
        if order.len() < self.nodes.len() {
            tracing::warn!("dependency cycle detected in verifier graph");
            for i in 0..self.nodes.len() {
                if !order.contains(&i) {
                    order.push(i);
                }
            }
        }
        order
    }
}
