//! Step Dependency Graph
//!
//! Adjacency stored as `step -> steps it depends on`. Ordering uses Kahn's
//! algorithm with a min-heap, so among ready steps the lowest index always
//! runs first and a graph whose edges all point backwards yields plain
//! index order.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Dependency graph over step indices
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    #[serde(with = "edge_list")]
    edges: BTreeMap<usize, BTreeSet<usize>>,
}

/// Edges as a sequence of `[node, [deps..]]` pairs. JSON object keys are
/// strings, which do not read back as `usize` once the graph sits inside a
/// flattened struct.
mod edge_list {
    use std::collections::{BTreeMap, BTreeSet};

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        edges: &BTreeMap<usize, BTreeSet<usize>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(edges)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<usize, BTreeSet<usize>>, D::Error> {
        Ok(Vec::<(usize, BTreeSet<usize>)>::deserialize(deserializer)?
            .into_iter()
            .collect())
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each node depends solely on the node before it
    pub fn linear_chain(nodes: impl IntoIterator<Item = usize>) -> Self {
        let mut graph = Self::new();
        let mut previous = None;
        for node in nodes {
            graph.add_node(node);
            if let Some(prev) = previous {
                graph.add_dependency(node, prev);
            }
            previous = Some(node);
        }
        graph
    }

    pub fn add_node(&mut self, node: usize) {
        self.edges.entry(node).or_default();
    }

    /// Record that `node` consumes the output of `dependency`
    pub fn add_dependency(&mut self, node: usize, dependency: usize) {
        self.edges.entry(node).or_default().insert(dependency);
    }

    pub fn dependencies(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges.get(&node).into_iter().flatten().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.edges.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Every dependency must be a known node with a smaller index
    pub fn validate(&self) -> Result<(), GraphError> {
        for (&node, deps) in &self.edges {
            for &dependency in deps {
                if !self.edges.contains_key(&dependency) {
                    return Err(GraphError::UnknownNode { node, dependency });
                }
                if dependency >= node {
                    return Err(GraphError::ForwardDependency { node, dependency });
                }
            }
        }
        Ok(())
    }

    /// Full execution order (Kahn's algorithm, lowest ready index first)
    pub fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
        let (mut in_degree, dependents) = self.degrees()?;

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| Reverse(*node))
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &dependent in dependents.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }

        self.ensure_complete(&order)?;
        Ok(order)
    }

    /// Execution waves: every node in a layer depends only on earlier layers.
    ///
    /// Nodes within a layer are sorted and may run concurrently.
    pub fn layers(&self) -> Result<Vec<Vec<usize>>, GraphError> {
        let (mut in_degree, dependents) = self.degrees()?;

        let mut current: Vec<usize> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut layers = Vec::new();
        let mut seen = Vec::with_capacity(self.edges.len());

        while !current.is_empty() {
            let mut next = Vec::new();
            for &node in &current {
                for &dependent in dependents.get(&node).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(&dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent);
                        }
                    }
                }
            }
            next.sort_unstable();
            seen.extend_from_slice(&current);
            layers.push(std::mem::replace(&mut current, next));
        }

        self.ensure_complete(&seen)?;
        Ok(layers)
    }

    #[allow(clippy::type_complexity)]
    fn degrees(
        &self,
    ) -> Result<(BTreeMap<usize, usize>, BTreeMap<usize, Vec<usize>>), GraphError> {
        let mut in_degree = BTreeMap::new();
        let mut dependents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

        for (&node, deps) in &self.edges {
            in_degree.insert(node, deps.len());
            for &dependency in deps {
                if !self.edges.contains_key(&dependency) {
                    return Err(GraphError::UnknownNode { node, dependency });
                }
                dependents.entry(dependency).or_default().push(node);
            }
        }
        Ok((in_degree, dependents))
    }

    fn ensure_complete(&self, visited: &[usize]) -> Result<(), GraphError> {
        if visited.len() == self.edges.len() {
            return Ok(());
        }
        let visited: BTreeSet<usize> = visited.iter().copied().collect();
        let nodes = self.nodes().filter(|n| !visited.contains(n)).collect();
        Err(GraphError::Cycle { nodes })
    }
}
