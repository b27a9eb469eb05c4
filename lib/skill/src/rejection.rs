//! Rejection graph.
//!
//! Parameters may declare that they were derived from other parameters
//! (`depends_on`). When the user rejects a confirmation, the rejected
//! parameter is invalidated together with:
//!
//! - everything it was derived from, transitively (a wrong address proposed
//!   from a postal code means the postal code is wrong), and
//! - everything derived from any of those, transitively (values computed
//!   from a wrong input are stale).
//!
//! Edges point from a dependency to its dependent. The graph is computed
//! once per skill from the union of every catalog spec's declarations.

use crate::error::SkillError;
use crate::parameter::ParameterSpec;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Dependency adjacency between parameter names.
#[derive(Debug, Clone, Default)]
pub struct RejectionGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl RejectionGraph {
    /// Builds the graph from parameter specs.
    ///
    /// # Errors
    ///
    /// Returns [`SkillError::UnknownDependency`] if a spec depends on a name
    /// that no spec in `specs` provides.
    pub fn from_specs<'a>(
        skill: &str,
        specs: impl IntoIterator<Item = &'a ParameterSpec>,
    ) -> Result<Self, SkillError> {
        let specs: Vec<&ParameterSpec> = specs.into_iter().collect();
        let mut this = Self::default();

        for spec in &specs {
            this.node(spec.name());
        }

        for spec in &specs {
            let dependent = this.index[spec.name()];
            for dependency in spec.dependencies() {
                let Some(&source) = this.index.get(dependency) else {
                    return Err(SkillError::UnknownDependency {
                        skill: skill.to_string(),
                        parameter: spec.name().to_string(),
                        dependency: dependency.clone(),
                    });
                };
                if this.graph.find_edge(source, dependent).is_none() {
                    this.graph.add_edge(source, dependent, ());
                }
            }
        }

        Ok(this)
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Parameters `name` was derived from, transitively.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> BTreeSet<String> {
        let mut found = self.walk([name], Direction::Incoming);
        found.remove(name);
        found
    }

    /// Parameters derived from `name`, transitively.
    #[must_use]
    pub fn dependents(&self, name: &str) -> BTreeSet<String> {
        let mut found = self.walk([name], Direction::Outgoing);
        found.remove(name);
        found
    }

    /// Every parameter invalidated when `name` is rejected, including `name`.
    #[must_use]
    pub fn cascade(&self, name: &str) -> BTreeSet<String> {
        let upstream = self.walk([name], Direction::Incoming);
        let mut cleared = self.walk(upstream.iter().map(String::as_str), Direction::Outgoing);
        cleared.extend(upstream);
        cleared
    }

    /// Breadth-first walk from `starts`, including the starts themselves.
    fn walk<'a>(
        &self,
        starts: impl IntoIterator<Item = &'a str>,
        direction: Direction,
    ) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::new();

        for start in starts {
            found.insert(start.to_string());
            if let Some(&idx) = self.index.get(start) {
                queue.push_back(idx);
            }
        }

        while let Some(idx) = queue.pop_front() {
            for next in self.graph.neighbors_directed(idx, direction) {
                if found.insert(self.graph[next].clone()) {
                    queue.push_back(next);
                }
            }
        }

        found
    }
}
