use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use serde::Serialize;

use crate::model::DependencyGraph;

/// A strongly connected component of the dependency graph.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Cycle {
    /// Sorted member names.
    pub members: Vec<String>,
    /// One shortest cyclic path through the first member, starting and
    /// ending with it.
    pub path: Vec<String>,
}

impl Cycle {
    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|member| member == name)
    }
}

/// Every component with more than one member, plus self-loops as one-member
/// cycles, sorted by member names.
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Cycle> {
    let inner = graph.graph();
    let mut cycles = Vec::new();
    for component in tarjan_scc(inner) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|node| inner.contains_edge(*node, *node));
        if !is_cycle {
            continue;
        }
        let mut sorted = component.clone();
        sorted.sort_by(|a, b| graph.name(*a).cmp(graph.name(*b)));
        let members: HashSet<NodeIndex> = component.into_iter().collect();
        let path = shortest_cycle(graph, sorted[0], &members)
            .into_iter()
            .map(|node| graph.name(node).to_string())
            .collect();
        cycles.push(Cycle {
            members: sorted
                .into_iter()
                .map(|node| graph.name(node).to_string())
                .collect(),
            path,
        });
    }
    cycles.sort();
    cycles
}

/// Whether the graph contains no cycle at all.
pub fn is_acyclic(graph: &DependencyGraph) -> bool {
    find_cycles(graph).is_empty()
}

fn shortest_cycle(
    graph: &DependencyGraph,
    start: NodeIndex,
    members: &HashSet<NodeIndex>,
) -> Vec<NodeIndex> {
    let inner = graph.graph();
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let mut successors: Vec<NodeIndex> = inner
            .neighbors(node)
            .filter(|next| members.contains(next))
            .collect();
        successors.sort_by(|a, b| graph.name(*a).cmp(graph.name(*b)));
        successors.dedup();
        for next in successors {
            if next == start {
                let mut path = vec![start];
                let mut current = node;
                loop {
                    path.push(current);
                    if current == start {
                        break;
                    }
                    match parent.get(&current) {
                        Some(previous) => current = *previous,
                        None => break,
                    }
                }
                path.reverse();
                return path;
            }
            if parent.contains_key(&next) {
                continue;
            }
            parent.insert(next, node);
            queue.push_back(next);
        }
    }
    vec![start]
}
