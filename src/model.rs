use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;

use crate::descriptor::top_level_class;
use crate::extract::ClassImports;

/// Directed graph over qualified names. Node handles are stable for the
/// lifetime of the graph; every edge remembers the classes that cause it.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, BTreeSet<String>>,
    nodes: BTreeMap<String, NodeIndex>,
}

/// One directed edge and the classes responsible for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Edge<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub causes: &'a BTreeSet<String>,
}

/// Incoming (afferent) and outgoing (efferent) edge counts of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Coupling {
    pub afferent: usize,
    pub efferent: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of `name`, registering the node on first reference.
    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(index) = self.nodes.get(name) {
            return *index;
        }
        let index = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), index);
        index
    }

    /// Record `from -> to`. Returns `false` when the edge already existed;
    /// the cause is merged either way.
    pub fn add_edge(&mut self, from: &str, to: &str, cause: Option<&str>) -> bool {
        let source = self.add_node(from);
        let target = self.add_node(to);
        let (edge, inserted) = match self.graph.find_edge(source, target) {
            Some(edge) => (edge, false),
            None => (self.graph.add_edge(source, target, BTreeSet::new()), true),
        };
        if let Some(cause) = cause {
            self.graph[edge].insert(cause.to_string());
        }
        inserted
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node names in sorted order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Sorted names `name` depends on.
    pub fn targets(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Sorted names depending on `name`.
    pub fn sources(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(index) = self.nodes.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(*index, direction)
            .map(|neighbor| self.graph[neighbor].as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.nodes.get(from), self.nodes.get(to)) {
            (Some(source), Some(target)) => self.graph.contains_edge(*source, *target),
            _ => false,
        }
    }

    /// Classes causing `from -> to`, if that edge exists.
    pub fn causes(&self, from: &str, to: &str) -> Option<&BTreeSet<String>> {
        let source = self.nodes.get(from)?;
        let target = self.nodes.get(to)?;
        let edge = self.graph.find_edge(*source, *target)?;
        Some(&self.graph[edge])
    }

    /// All edges sorted by `(source, target)`.
    pub fn edges(&self) -> Vec<Edge<'_>> {
        let mut edges: Vec<Edge<'_>> = self
            .graph
            .edge_references()
            .map(|edge| Edge {
                source: self.graph[edge.source()].as_str(),
                target: self.graph[edge.target()].as_str(),
                causes: edge.weight(),
            })
            .collect();
        edges.sort_by(|a, b| (a.source, a.target).cmp(&(b.source, b.target)));
        edges
    }

    /// Whether `to` is reachable from `from` (every node reaches itself).
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        match (self.nodes.get(from), self.nodes.get(to)) {
            (Some(source), Some(target)) => {
                has_path_connecting(&self.graph, *source, *target, None)
            }
            _ => false,
        }
    }

    pub fn coupling(&self, name: &str) -> Option<Coupling> {
        let index = self.nodes.get(name)?;
        Some(Coupling {
            afferent: self
                .graph
                .neighbors_directed(*index, Direction::Incoming)
                .count(),
            efferent: self
                .graph
                .neighbors_directed(*index, Direction::Outgoing)
                .count(),
        })
    }

    /// Add every node and edge of `other`.
    pub fn merge(&mut self, other: &DependencyGraph) {
        for name in other.nodes() {
            self.add_node(name);
        }
        for edge in other.edges() {
            self.add_edge(edge.source, edge.target, None);
            for cause in edge.causes {
                self.add_edge(edge.source, edge.target, Some(cause.as_str()));
            }
        }
    }

    pub(crate) fn graph(&self) -> &DiGraph<String, BTreeSet<String>> {
        &self.graph
    }

    pub(crate) fn name(&self, index: NodeIndex) -> &str {
        &self.graph[index]
    }
}

/// An analyzed class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JavaClass {
    pub name: String,
    pub package: String,
    pub source_file: Option<String>,
    pub imports: BTreeSet<String>,
}

/// A package, either analyzed (owning classes) or only referenced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct JavaPackage {
    pub name: String,
    pub classes: BTreeSet<String>,
    pub imports: BTreeSet<String>,
}

impl JavaPackage {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Whether any analyzed class belongs to this package.
    pub fn is_analyzed(&self) -> bool {
        !self.classes.is_empty()
    }
}

/// Registry of packages and classes for one analysis run, with the package
/// and class level dependency graphs derived from them.
#[derive(Clone, Debug, Default)]
pub struct Model {
    packages: BTreeMap<String, JavaPackage>,
    classes: BTreeMap<String, JavaClass>,
    package_graph: DependencyGraph,
    class_graph: DependencyGraph,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one class's imports. Adding the same class again only unions
    /// its imports.
    pub fn add_class(&mut self, imports: ClassImports) {
        let ClassImports {
            class_name,
            package,
            source_file,
            imports,
            referenced_classes,
            ..
        } = imports;

        self.package_graph.add_node(&package);
        for import in &imports {
            self.package_entry(import);
            self.package_graph
                .add_edge(&package, import, Some(class_name.as_str()));
        }
        let owner = self.package_entry(&package);
        owner.classes.insert(class_name.clone());
        owner.imports.extend(imports.iter().cloned());

        let top_level = top_level_class(&class_name).unwrap_or_else(|| class_name.clone());
        self.class_graph.add_node(&top_level);
        for referenced in &referenced_classes {
            self.class_graph
                .add_edge(&top_level, referenced, Some(class_name.as_str()));
        }

        let class = self
            .classes
            .entry(class_name.clone())
            .or_insert_with(|| JavaClass {
                name: class_name,
                package,
                source_file: None,
                imports: BTreeSet::new(),
            });
        if class.source_file.is_none() {
            class.source_file = source_file;
        }
        class.imports.extend(imports);
    }

    /// Fold another run's registry into this one; same names are the same node.
    pub fn merge(&mut self, other: Model) {
        for (name, package) in other.packages {
            let entry = self.package_entry(&name);
            entry.classes.extend(package.classes);
            entry.imports.extend(package.imports);
        }
        for (name, class) in other.classes {
            match self.classes.get_mut(&name) {
                Some(existing) => {
                    existing.imports.extend(class.imports);
                    if existing.source_file.is_none() {
                        existing.source_file = class.source_file;
                    }
                }
                None => {
                    self.classes.insert(name, class);
                }
            }
        }
        self.package_graph.merge(&other.package_graph);
        self.class_graph.merge(&other.class_graph);
    }

    fn package_entry(&mut self, name: &str) -> &mut JavaPackage {
        self.packages
            .entry(name.to_string())
            .or_insert_with(|| JavaPackage::new(name))
    }

    pub fn package(&self, name: &str) -> Option<&JavaPackage> {
        self.packages.get(name)
    }

    pub fn class(&self, name: &str) -> Option<&JavaClass> {
        self.classes.get(name)
    }

    /// All packages, analyzed or referenced, sorted by name.
    pub fn packages(&self) -> impl Iterator<Item = &JavaPackage> {
        self.packages.values()
    }

    pub fn analyzed_packages(&self) -> impl Iterator<Item = &JavaPackage> {
        self.packages.values().filter(|package| package.is_analyzed())
    }

    pub fn classes(&self) -> impl Iterator<Item = &JavaClass> {
        self.classes.values()
    }

    pub fn package_graph(&self) -> &DependencyGraph {
        &self.package_graph
    }

    pub fn class_graph(&self) -> &DependencyGraph {
        &self.class_graph
    }
}
