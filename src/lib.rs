//! Package dependency analysis for JVM class files.
//!
//! Class files are parsed ([`classfile`]), their references to other
//! packages extracted ([`extract`]), and merged into package and class level
//! graphs ([`model`]). The graphs are searched for cycles ([`cycles`]) and
//! checked against declared dependency rules ([`rules`]). [`analysis`] ties
//! the steps together for one run.

pub mod analysis;
pub mod annotation;
mod bytes;
pub mod classfile;
pub mod cycles;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod filter;
pub mod model;
pub mod pattern;
pub mod rules;
pub mod signature;

#[cfg(test)]
pub(crate) mod testing;

pub use analysis::{AnalysisResult, Analyzer, ClassInput, Granularity};
pub use error::{AnalysisError, RuleError};
pub use filter::{PackageAcceptor, PackageFilter};
pub use rules::{DependencyRules, MatchMode, RulesBuilder, SELF};
