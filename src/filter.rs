use crate::error::RuleError;
use crate::pattern::NamePattern;

/// Decides whether a candidate package takes part in the analysis.
pub trait PackageAcceptor {
    fn accept(&self, package: &str) -> bool;
}

impl<F> PackageAcceptor for F
where
    F: Fn(&str) -> bool,
{
    fn accept(&self, package: &str) -> bool {
        self(package)
    }
}

/// Include/exclude pattern filter. An empty include list includes everything;
/// excludes always win.
#[derive(Clone, Debug, Default)]
pub struct PackageFilter {
    includes: Vec<NamePattern>,
    excludes: Vec<NamePattern>,
}

impl PackageFilter {
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn including<I, S>(mut self, patterns: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self.includes.push(NamePattern::parse(pattern.as_ref())?);
        }
        Ok(self)
    }

    pub fn excluding<I, S>(mut self, patterns: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self.excludes.push(NamePattern::parse(pattern.as_ref())?);
        }
        Ok(self)
    }
}

impl PackageAcceptor for PackageFilter {
    fn accept(&self, package: &str) -> bool {
        let included = self.includes.is_empty()
            || self.includes.iter().any(|pattern| pattern.matches(package));
        included && !self.excludes.iter().any(|pattern| pattern.matches(package))
    }
}
