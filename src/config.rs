use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jdepcheck::{DependencyRules, MatchMode, PackageFilter, RulesBuilder};
use jsonschema::JSONSchema;
use serde::Deserialize;
use serde_json::Value;

const RULES_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "additionalProperties": false,
  "properties": {
    "baseline": { "enum": ["deny-all", "allow-all"] },
    "mode": { "enum": ["exact", "subset"] },
    "include": { "$ref": "#/definitions/patterns" },
    "exclude": { "$ref": "#/definitions/patterns" },
    "externals": { "$ref": "#/definitions/patterns" },
    "nodes": {
      "type": "object",
      "additionalProperties": { "type": "string", "minLength": 1 }
    },
    "rules": {
      "type": "object",
      "additionalProperties": {
        "type": "object",
        "additionalProperties": false,
        "properties": {
          "may_use": { "$ref": "#/definitions/names" },
          "may_depend_upon": { "$ref": "#/definitions/names" },
          "must_use": { "$ref": "#/definitions/names" },
          "must_not_use": { "$ref": "#/definitions/names" }
        }
      }
    }
  },
  "definitions": {
    "patterns": { "type": "array", "items": { "type": "string", "minLength": 1 } },
    "names": { "type": "array", "items": { "type": "string", "minLength": 1 } }
  }
}"##;

/// Rules, match mode and package filter loaded from a rules file.
pub(crate) struct RulesConfig {
    pub(crate) rules: DependencyRules,
    pub(crate) mode: MatchMode,
    pub(crate) filter: PackageFilter,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            rules: DependencyRules::deny_all(),
            mode: MatchMode::Exact,
            filter: PackageFilter::accept_all(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum BaselineName {
    #[default]
    DenyAll,
    AllowAll,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ModeName {
    #[default]
    Exact,
    Subset,
}

#[derive(Debug, Default, Deserialize)]
struct RuleEntry {
    #[serde(default)]
    may_use: Vec<String>,
    #[serde(default)]
    may_depend_upon: Vec<String>,
    #[serde(default)]
    must_use: Vec<String>,
    #[serde(default)]
    must_not_use: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default)]
    baseline: BaselineName,
    #[serde(default)]
    mode: ModeName,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    externals: Vec<String>,
    #[serde(default)]
    nodes: BTreeMap<String, String>,
    #[serde(default)]
    rules: BTreeMap<String, RuleEntry>,
}

pub(crate) fn load_rules(path: &Path) -> Result<RulesConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_rules(&text).with_context(|| format!("invalid rules file {}", path.display()))
}

pub(crate) fn parse_rules(text: &str) -> Result<RulesConfig> {
    let value: Value = serde_json::from_str(text).context("rules file is not valid JSON")?;
    validate(&value)?;
    let file: RulesFile = serde_json::from_value(value).context("failed to read rules")?;

    let mut builder = match file.baseline {
        BaselineName::DenyAll => RulesBuilder::deny_all(),
        BaselineName::AllowAll => RulesBuilder::allow_all(),
    }
    .with_externals(file.externals);
    for (placeholder, pattern) in &file.nodes {
        builder.node(placeholder, pattern);
    }
    for (source, entry) in &file.rules {
        let may_use: Vec<&str> = entry
            .may_use
            .iter()
            .chain(&entry.may_depend_upon)
            .map(String::as_str)
            .collect();
        if !may_use.is_empty() {
            builder.may_use(source, &may_use);
        }
        if !entry.must_use.is_empty() {
            builder.must_use(source, &as_strs(&entry.must_use));
        }
        if !entry.must_not_use.is_empty() {
            builder.must_not_use(source, &as_strs(&entry.must_not_use));
        }
    }
    let rules = builder.build()?;

    let filter = PackageFilter::accept_all()
        .including(&file.include)?
        .excluding(&file.exclude)?;
    let mode = match file.mode {
        ModeName::Exact => MatchMode::Exact,
        ModeName::Subset => MatchMode::Subset,
    };

    Ok(RulesConfig {
        rules,
        mode,
        filter,
    })
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn validate(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(RULES_SCHEMA).context("failed to parse rules schema")?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| anyhow!("failed to compile rules schema: {err}"))?;
    if let Err(errors) = compiled.validate(value) {
        let messages: Vec<String> = errors
            .map(|err| format!("{}: {}", err.instance_path, err))
            .collect();
        anyhow::bail!("rules file does not match schema:\n{}", messages.join("\n"));
    }
    Ok(())
}
