//! Declared dependency rules and their check against an actual graph.
//!
//! Rules are declared over named placeholders, each bound to a
//! [`NamePattern`]. A source placeholder lists the placeholders it may (or
//! must, or must not) depend upon; [`SELF`] stands for the source itself.
//! External patterns name nodes outside the analyzed code that anything may
//! depend upon.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::Serialize;

use crate::error::RuleError;
use crate::model::DependencyGraph;
use crate::pattern::NamePattern;

/// Reserved placeholder denoting the rule's own source node.
pub const SELF: &str = "$self";

/// What happens to dependencies no rule mentions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Baseline {
    #[default]
    DenyAll,
    AllowAll,
}

/// Whether declared-but-unused allowances are violations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum MatchMode {
    #[default]
    Exact,
    Subset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Verb {
    MayUse,
    MustUse,
    MustNotUse,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Verb::MayUse => "may_use",
            Verb::MustUse => "must_use",
            Verb::MustNotUse => "must_not_use",
        }
    }
}

#[derive(Clone, Debug)]
struct Declaration {
    source: String,
    verb: Verb,
    targets: Vec<String>,
}

/// Collects placeholder and rule declarations; [`RulesBuilder::build`]
/// validates and compiles them.
#[derive(Clone, Debug, Default)]
pub struct RulesBuilder {
    baseline: Baseline,
    externals: Vec<String>,
    nodes: Vec<(String, String)>,
    declarations: Vec<Declaration>,
}

impl RulesBuilder {
    /// Every dependency not explicitly allowed is illegal.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// Every dependency not explicitly denied is legal.
    pub fn allow_all() -> Self {
        Self {
            baseline: Baseline::AllowAll,
            ..Self::default()
        }
    }

    pub fn with_externals<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.externals.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Bind `placeholder` to the nodes matching `pattern`.
    pub fn node(&mut self, placeholder: &str, pattern: &str) -> &mut Self {
        self.nodes.push((placeholder.to_string(), pattern.to_string()));
        self
    }

    pub fn may_use(&mut self, source: &str, targets: &[&str]) -> &mut Self {
        self.declare(source, Verb::MayUse, targets)
    }

    /// Same as [`RulesBuilder::may_use`].
    pub fn may_depend_upon(&mut self, source: &str, targets: &[&str]) -> &mut Self {
        self.declare(source, Verb::MayUse, targets)
    }

    /// Like `may_use`, but an absent dependency is reported in every mode.
    pub fn must_use(&mut self, source: &str, targets: &[&str]) -> &mut Self {
        self.declare(source, Verb::MustUse, targets)
    }

    /// The dependency is illegal whatever else allows it.
    pub fn must_not_use(&mut self, source: &str, targets: &[&str]) -> &mut Self {
        self.declare(source, Verb::MustNotUse, targets)
    }

    fn declare(&mut self, source: &str, verb: Verb, targets: &[&str]) -> &mut Self {
        self.declarations.push(Declaration {
            source: source.to_string(),
            verb,
            targets: targets.iter().map(|target| target.to_string()).collect(),
        });
        self
    }

    pub fn build(&self) -> Result<DependencyRules, RuleError> {
        let externals = self
            .externals
            .iter()
            .map(|pattern| NamePattern::parse(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        let mut index = BTreeMap::new();
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (placeholder, pattern) in &self.nodes {
            if placeholder == SELF {
                return Err(RuleError::DuplicateRule(SELF.to_string()));
            }
            if index.insert(placeholder.clone(), nodes.len()).is_some() {
                return Err(RuleError::DuplicateRule(placeholder.clone()));
            }
            nodes.push(RuleNode {
                placeholder: placeholder.clone(),
                pattern: NamePattern::parse(pattern)?,
            });
        }

        let resolve = |name: &str| -> Result<usize, RuleError> {
            index
                .get(name)
                .copied()
                .ok_or_else(|| RuleError::UnknownPlaceholder(name.to_string()))
        };

        let mut seen = BTreeSet::new();
        let mut rules = BTreeSet::new();
        for declaration in &self.declarations {
            let source = resolve(&declaration.source)?;
            if !seen.insert((source, declaration.verb)) {
                return Err(RuleError::DuplicateRule(format!(
                    "{} {}",
                    declaration.source,
                    declaration.verb.as_str()
                )));
            }
            for target in &declaration.targets {
                let target = if target == SELF {
                    Target::SelfNode
                } else {
                    Target::Node(resolve(target)?)
                };
                rules.insert(Rule {
                    source,
                    verb: declaration.verb,
                    target,
                });
            }
        }

        debug!(
            "compiled {} placeholders, {} rules, {} externals",
            nodes.len(),
            rules.len(),
            externals.len()
        );
        Ok(DependencyRules {
            baseline: self.baseline,
            externals,
            nodes,
            rules: rules.into_iter().collect(),
        })
    }
}

#[derive(Clone, Debug)]
struct RuleNode {
    placeholder: String,
    pattern: NamePattern,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Target {
    SelfNode,
    Node(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Rule {
    source: usize,
    verb: Verb,
    target: Target,
}

/// Compiled rule set, ready to check graphs.
#[derive(Clone, Debug)]
pub struct DependencyRules {
    baseline: Baseline,
    externals: Vec<NamePattern>,
    nodes: Vec<RuleNode>,
    rules: Vec<Rule>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ViolationKind {
    /// An actual dependency no rule allows (or a rule forbids).
    IllegalDependency,
    /// A declared dependency that does not occur.
    UnusedDeclaration,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Node name for illegal dependencies, placeholder pattern for unused ones.
    pub source: String,
    pub target: String,
    /// Classes causing an illegal dependency.
    pub causes: Vec<String>,
}

/// Outcome of checking one graph against a rule set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuleCheck {
    /// Sorted by kind, then source, then target.
    pub violations: Vec<Violation>,
    /// Placeholders whose pattern matches no node (reported in exact mode).
    pub nonexistent: Vec<String>,
}

impl RuleCheck {
    pub fn illegal(&self) -> impl Iterator<Item = &Violation> {
        self.of_kind(ViolationKind::IllegalDependency)
    }

    pub fn unused(&self) -> impl Iterator<Item = &Violation> {
        self.of_kind(ViolationKind::UnusedDeclaration)
    }

    fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(move |violation| violation.kind == kind)
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.nonexistent.is_empty()
    }
}

impl DependencyRules {
    /// Deny-all rules with nothing declared.
    pub fn deny_all() -> Self {
        Self {
            baseline: Baseline::DenyAll,
            externals: Vec::new(),
            nodes: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.externals.iter().any(|pattern| pattern.matches(name))
    }

    /// The placeholder that owns `name`: an exact pattern wins over
    /// wildcards, longer wildcards over shorter ones.
    fn owner(&self, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.pattern.matches(name))
            .max_by_key(|(index, node)| {
                (
                    !node.pattern.is_wildcard(),
                    node.pattern.as_str().len(),
                    std::cmp::Reverse(*index),
                )
            })
            .map(|(index, _)| index)
    }

    fn target_matches(&self, rule: &Rule, name: &str) -> bool {
        let node = match rule.target {
            Target::SelfNode => rule.source,
            Target::Node(index) => index,
        };
        self.nodes[node].pattern.matches(name)
    }

    fn rules_of(&self, source: usize, verb: Verb) -> impl Iterator<Item = &Rule> {
        self.rules
            .iter()
            .filter(move |rule| rule.source == source && rule.verb == verb)
    }

    fn is_allowed(&self, source: &str, target: &str) -> bool {
        let owner = self.owner(source);
        if let Some(owner) = owner {
            if self
                .rules_of(owner, Verb::MustNotUse)
                .any(|rule| self.target_matches(rule, target))
            {
                return false;
            }
        }
        if self.is_external(target) || self.baseline == Baseline::AllowAll {
            return true;
        }
        owner.is_some_and(|owner| {
            self.rules_of(owner, Verb::MayUse)
                .chain(self.rules_of(owner, Verb::MustUse))
                .any(|rule| self.target_matches(rule, target))
        })
    }

    /// Check the actual graph: set difference between actual and allowed
    /// edges in both directions.
    pub fn check(&self, graph: &DependencyGraph, mode: MatchMode) -> RuleCheck {
        let edges = graph.edges();
        let mut violations = Vec::new();
        for edge in &edges {
            if !self.is_allowed(edge.source, edge.target) {
                violations.push(Violation {
                    kind: ViolationKind::IllegalDependency,
                    source: edge.source.to_string(),
                    target: edge.target.to_string(),
                    causes: edge.causes.iter().cloned().collect(),
                });
            }
        }

        for rule in &self.rules {
            let reportable = match rule.verb {
                Verb::MayUse => mode == MatchMode::Exact,
                Verb::MustUse => true,
                Verb::MustNotUse => false,
            };
            if !reportable || rule.target == Target::SelfNode {
                continue;
            }
            let used = edges.iter().any(|edge| {
                self.owner(edge.source) == Some(rule.source)
                    && self.target_matches(rule, edge.target)
            });
            if !used {
                let Target::Node(target) = rule.target else {
                    continue;
                };
                violations.push(Violation {
                    kind: ViolationKind::UnusedDeclaration,
                    source: self.nodes[rule.source].pattern.to_string(),
                    target: self.nodes[target].pattern.to_string(),
                    causes: Vec::new(),
                });
            }
        }
        violations.sort();
        violations.dedup();

        let nonexistent = if mode == MatchMode::Exact {
            self.nodes
                .iter()
                .filter(|node| !graph.nodes().any(|name| node.pattern.matches(name)))
                .map(|node| node.placeholder.clone())
                .collect()
        } else {
            Vec::new()
        };

        debug!(
            "rule check: {} violations, {} nonexistent placeholders",
            violations.len(),
            nonexistent.len()
        );
        RuleCheck {
            violations,
            nonexistent,
        }
    }
}
