//! Graph checks and ordering for the resolver.
//!
//! Nodes are target indices; an edge runs from a dependency to its
//! dependent. Cycle detection goes through petgraph, the topological order
//! is a Kahn walk that breaks ties by declaration index so plans are
//! deterministic across runs.

use std::collections::BTreeSet;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// Verify that the dependency graph is acyclic.
///
/// `dependencies[i]` lists the nodes that must precede node `i`. On failure
/// returns the members of one strongly connected component, in declaration
/// order, for error reporting.
pub(crate) fn verify_acyclic(dependencies: &[Vec<usize>]) -> Result<(), Vec<usize>> {
  let mut graph = DiGraph::<usize, ()>::new();
  let nodes: Vec<NodeIndex> = (0..dependencies.len()).map(|i| graph.add_node(i)).collect();

  for (dependent, deps) in dependencies.iter().enumerate() {
    for &dep in deps {
      graph.add_edge(nodes[dep], nodes[dependent], ());
    }
  }

  for component in tarjan_scc(&graph) {
    let cyclic = component.len() > 1
      || component
        .first()
        .is_some_and(|&node| graph.find_edge(node, node).is_some());

    if cyclic {
      let mut members: Vec<usize> = component.into_iter().map(|node| graph[node]).collect();
      members.sort_unstable();
      return Err(members);
    }
  }

  Ok(())
}

/// Topological order over an acyclic dependency graph, ties broken by
/// declaration index.
pub(crate) fn topological_order(dependencies: &[Vec<usize>]) -> Vec<usize> {
  let count = dependencies.len();
  let mut in_degree = vec![0usize; count];
  let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

  for (dependent, deps) in dependencies.iter().enumerate() {
    in_degree[dependent] = deps.len();
    for &dep in deps {
      dependents[dep].push(dependent);
    }
  }

  let mut ready: BTreeSet<usize> = in_degree
    .iter()
    .enumerate()
    .filter(|&(_, &degree)| degree == 0)
    .map(|(i, _)| i)
    .collect();

  let mut order = Vec::with_capacity(count);
  while let Some(&next) = ready.iter().next() {
    ready.remove(&next);
    order.push(next);

    for &dependent in &dependents[next] {
      in_degree[dependent] -= 1;
      if in_degree[dependent] == 0 {
        ready.insert(dependent);
      }
    }
  }

  debug_assert_eq!(order.len(), count, "topological_order requires an acyclic graph");
  order
}
