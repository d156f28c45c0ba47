use log::{debug, info, warn};
use serde::Serialize;

use crate::classfile::parse_class;
use crate::cycles::{Cycle, find_cycles};
use crate::error::AnalysisError;
use crate::extract::{ClassImports, extract_imports};
use crate::filter::{PackageAcceptor, PackageFilter};
use crate::model::{DependencyGraph, Model};
use crate::rules::{DependencyRules, MatchMode, RuleCheck, Violation};

/// Raw bytes of one class file and where they came from.
#[derive(Clone, Debug)]
pub struct ClassInput {
    /// Path or archive entry URI, used in failure reports.
    pub origin: String,
    pub bytes: Vec<u8>,
}

impl ClassInput {
    pub fn new(origin: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            origin: origin.into(),
            bytes,
        }
    }
}

/// Which graph rules are checked against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Granularity {
    #[default]
    Package,
    Class,
}

/// An input that could not be analyzed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub origin: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: AnalysisError,
}

/// A non-fatal problem in an analyzed class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileWarning {
    pub origin: String,
    pub class_name: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: AnalysisError,
}

fn serialize_error<S>(error: &AnalysisError, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(error)
}

/// Snapshot of one analysis run.
#[derive(Clone, Debug)]
pub struct AnalysisResult {
    model: Model,
    granularity: Granularity,
    package_cycles: Vec<Cycle>,
    class_cycles: Vec<Cycle>,
    rule_check: RuleCheck,
    failures: Vec<FileFailure>,
    warnings: Vec<FileWarning>,
    skipped: usize,
}

impl AnalysisResult {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// The graph rules were checked against.
    pub fn graph(&self) -> &DependencyGraph {
        match self.granularity {
            Granularity::Package => self.model.package_graph(),
            Granularity::Class => self.model.class_graph(),
        }
    }

    /// Cycles of the checked graph.
    pub fn cycles(&self) -> &[Cycle] {
        match self.granularity {
            Granularity::Package => &self.package_cycles,
            Granularity::Class => &self.class_cycles,
        }
    }

    pub fn package_cycles(&self) -> &[Cycle] {
        &self.package_cycles
    }

    pub fn class_cycles(&self) -> &[Cycle] {
        &self.class_cycles
    }

    pub fn rule_check(&self) -> &RuleCheck {
        &self.rule_check
    }

    pub fn violations(&self) -> &[Violation] {
        &self.rule_check.violations
    }

    /// Check the same graph against a different rule set.
    pub fn check(&self, rules: &DependencyRules, mode: MatchMode) -> RuleCheck {
        rules.check(self.graph(), mode)
    }

    pub fn failures(&self) -> &[FileFailure] {
        &self.failures
    }

    pub fn warnings(&self) -> &[FileWarning] {
        &self.warnings
    }

    /// Classes left out because the filter rejected their own package.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Configures and runs an analysis over class file inputs.
pub struct Analyzer {
    acceptor: Box<dyn PackageAcceptor>,
    rules: DependencyRules,
    mode: MatchMode,
    granularity: Granularity,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

enum Outcome {
    Imports(ClassImports),
    Skipped(String),
    Failed(AnalysisError),
}

impl Analyzer {
    /// Accept every package, check package granularity against deny-all
    /// rules in exact mode.
    pub fn new() -> Self {
        Self {
            acceptor: Box::new(PackageFilter::accept_all()),
            rules: DependencyRules::deny_all(),
            mode: MatchMode::Exact,
            granularity: Granularity::Package,
        }
    }

    pub fn with_filter(mut self, acceptor: impl PackageAcceptor + 'static) -> Self {
        self.acceptor = Box::new(acceptor);
        self
    }

    pub fn with_rules(mut self, rules: DependencyRules, mode: MatchMode) -> Self {
        self.rules = rules;
        self.mode = mode;
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Parse and extract one input. Pure; touches no shared state.
    fn process(&self, input: &ClassInput) -> Outcome {
        let class = match parse_class(&input.bytes) {
            Ok(class) => class,
            Err(err) => return Outcome::Failed(err),
        };
        match extract_imports(&class, self.acceptor.as_ref()) {
            Ok(imports) if !self.acceptor.accept(&imports.package) => {
                Outcome::Skipped(imports.class_name)
            }
            Ok(imports) => Outcome::Imports(imports),
            Err(err) => Outcome::Failed(err),
        }
    }

    pub fn analyze<I>(&self, inputs: I) -> AnalysisResult
    where
        I: IntoIterator<Item = ClassInput>,
    {
        let mut model = Model::new();
        let mut failures = Vec::new();
        let mut warnings = Vec::new();
        let mut skipped = 0;
        let mut analyzed = 0;

        for input in inputs {
            match self.process(&input) {
                Outcome::Imports(mut imports) => {
                    for error in imports.warnings.drain(..) {
                        warnings.push(FileWarning {
                            origin: input.origin.clone(),
                            class_name: imports.class_name.clone(),
                            error,
                        });
                    }
                    analyzed += 1;
                    model.add_class(imports);
                }
                Outcome::Skipped(class_name) => {
                    debug!("skipping {class_name}: package not accepted");
                    skipped += 1;
                }
                Outcome::Failed(error) => {
                    warn!("failed to analyze {}: {error}", input.origin);
                    failures.push(FileFailure {
                        origin: input.origin,
                        error,
                    });
                }
            }
        }

        let package_cycles = find_cycles(model.package_graph());
        let class_cycles = find_cycles(model.class_graph());
        let checked = match self.granularity {
            Granularity::Package => model.package_graph(),
            Granularity::Class => model.class_graph(),
        };
        let rule_check = self.rules.check(checked, self.mode);

        info!(
            "analyzed {} classes ({} skipped, {} failed): {} package cycles, {} violations",
            analyzed,
            skipped,
            failures.len(),
            package_cycles.len(),
            rule_check.violations.len()
        );
        AnalysisResult {
            model,
            granularity: self.granularity,
            package_cycles,
            class_cycles,
            rule_check,
            failures,
            warnings,
            skipped,
        }
    }
}
