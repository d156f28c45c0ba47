use std::fmt;

use crate::error::RuleError;

/// Name pattern with optional leading and/or trailing `*` wildcard.
///
/// `java*` matches `java`, `java.util` and `javax.swing`; `*.internal`
/// matches any name ending in `.internal`; a bare `*` matches everything.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamePattern {
    source: String,
    body: String,
    leading: bool,
    trailing: bool,
}

impl NamePattern {
    pub fn parse(source: &str) -> Result<Self, RuleError> {
        let leading = source.starts_with('*');
        let trailing = source.len() > usize::from(leading) && source.ends_with('*');
        let start = usize::from(leading);
        let end = source.len() - usize::from(trailing);
        let body = source.get(start..end).unwrap_or_default();
        if source.is_empty() || body.contains('*') {
            return Err(RuleError::InvalidPattern(source.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            body: body.to_string(),
            leading,
            trailing,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        match (self.leading, self.trailing) {
            (false, false) => name == self.body,
            (false, true) => name.starts_with(&self.body),
            (true, false) => name.ends_with(&self.body),
            (true, true) => name.contains(&self.body),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.leading || self.trailing
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
