use jdepcheck::analysis::{AnalysisResult, Granularity};
use jdepcheck::rules::{Violation, ViolationKind};
use serde_json::json;
use serde_sarif::sarif::{
    Artifact, ArtifactLocation, Invocation, Location, LogicalLocation, Message, PhysicalLocation,
    Result as SarifResult, ResultLevel, Run, SCHEMA_URL, Sarif, Tool, ToolComponent,
};

pub(crate) const CYCLE_RULE: &str = "DEPENDENCY_CYCLE";
pub(crate) const ILLEGAL_RULE: &str = "ILLEGAL_DEPENDENCY";
pub(crate) const UNUSED_RULE: &str = "UNUSED_DECLARATION";
pub(crate) const NONEXISTENT_RULE: &str = "NONEXISTENT_NODE";
pub(crate) const CLASS_FILE_RULE: &str = "CLASS_FILE_ERROR";
pub(crate) const SIGNATURE_RULE: &str = "INVALID_SIGNATURE";

pub(crate) fn build_invocation(successful: bool) -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(successful)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

/// Render a run as SARIF: cycles first, then rule violations, unmatched
/// placeholders, unreadable inputs and ignored signatures.
pub(crate) fn build_sarif(
    result: &AnalysisResult,
    artifacts: Vec<Artifact>,
    invocation: Invocation,
) -> Sarif {
    let kind = node_kind(result.granularity());
    let mut results = Vec::new();

    for cycle in result.cycles() {
        let locations: Vec<Location> = cycle
            .members
            .iter()
            .map(|member| logical_location(member, kind))
            .collect();
        results.push(
            SarifResult::builder()
                .rule_id(CYCLE_RULE)
                .message(result_message(format!(
                    "Dependency cycle: {}",
                    cycle.path.join(" -> ")
                )))
                .locations(locations)
                .build(),
        );
    }

    for violation in result.violations() {
        results.push(violation_result(violation, kind));
    }

    for placeholder in &result.rule_check().nonexistent {
        results.push(
            SarifResult::builder()
                .rule_id(NONEXISTENT_RULE)
                .message(result_message(format!(
                    "Rule placeholder {placeholder} matches no {kind}"
                )))
                .build(),
        );
    }

    for failure in result.failures() {
        results.push(
            SarifResult::builder()
                .rule_id(CLASS_FILE_RULE)
                .message(result_message(failure.error.to_string()))
                .locations(vec![origin_location(&failure.origin)])
                .build(),
        );
    }

    for warning in result.warnings() {
        results.push(
            SarifResult::builder()
                .rule_id(SIGNATURE_RULE)
                .level(ResultLevel::Warning)
                .message(result_message(format!(
                    "{}: {}",
                    warning.class_name, warning.error
                )))
                .locations(vec![origin_location(&warning.origin)])
                .build(),
        );
    }

    let driver = ToolComponent::builder().name("jdepcheck").build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let run = if artifacts.is_empty() {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .build()
    } else {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .artifacts(artifacts)
            .build()
    };

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

fn violation_result(violation: &Violation, kind: &str) -> SarifResult {
    match violation.kind {
        ViolationKind::IllegalDependency => {
            let mut text = format!(
                "Illegal dependency: {} -> {}",
                violation.source, violation.target
            );
            if !violation.causes.is_empty() {
                text.push_str(&format!(" (from {})", violation.causes.join(", ")));
            }
            let mut locations = vec![logical_location(&violation.source, kind)];
            locations.extend(
                violation
                    .causes
                    .iter()
                    .map(|cause| logical_location(cause, "type")),
            );
            SarifResult::builder()
                .rule_id(ILLEGAL_RULE)
                .message(result_message(text))
                .locations(locations)
                .build()
        }
        ViolationKind::UnusedDeclaration => SarifResult::builder()
            .rule_id(UNUSED_RULE)
            .message(result_message(format!(
                "Declared dependency {} -> {} does not occur",
                violation.source, violation.target
            )))
            .build(),
    }
}

fn node_kind(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Package => "namespace",
        Granularity::Class => "type",
    }
}

fn logical_location(name: &str, kind: &str) -> Location {
    let logical = LogicalLocation::builder().name(name).kind(kind).build();
    Location::builder().logical_locations(vec![logical]).build()
}

fn origin_location(origin: &str) -> Location {
    let location = ArtifactLocation::builder().uri(origin).build();
    let physical = PhysicalLocation::builder().artifact_location(location).build();
    Location::builder().physical_location(physical).build()
}

fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdepcheck::{Analyzer, ClassInput};

    fn empty_invocation() -> Invocation {
        Invocation::builder()
            .execution_successful(true)
            .arguments(Vec::<String>::new())
            .build()
    }

    #[test]
    fn sarif_is_minimal_and_valid_shape() {
        let result = Analyzer::new().analyze(Vec::<ClassInput>::new());
        let sarif = build_sarif(&result, Vec::new(), empty_invocation());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        assert_eq!(value["version"], "2.1.0");
        assert_eq!(value["$schema"], SCHEMA_URL);
        assert_eq!(value["runs"][0]["tool"]["driver"]["name"], "jdepcheck");
        assert!(
            value["runs"][0]["results"]
                .as_array()
                .expect("results array")
                .is_empty()
        );
        assert_eq!(
            value["runs"][0]["invocations"][0]["executionSuccessful"],
            true
        );
    }

    #[test]
    fn failures_are_reported_with_their_origin() {
        let result = Analyzer::new().analyze(vec![ClassInput::new("Broken.class", vec![0; 3])]);
        let sarif = build_sarif(&result, Vec::new(), empty_invocation());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        let reported = &value["runs"][0]["results"][0];
        assert_eq!(reported["ruleId"], CLASS_FILE_RULE);
        assert_eq!(
            reported["locations"][0]["physicalLocation"]["artifactLocation"]["uri"],
            "Broken.class"
        );
        assert!(
            reported["message"]["text"]
                .as_str()
                .expect("message")
                .starts_with("malformed class file")
        );
    }

    /// `a/Foo` with one field `f` of type `Lb/B;` whose signature is cut off.
    fn class_with_broken_field_signature() -> Vec<u8> {
        let mut bytes = vec![0xca, 0xfe, 0xba, 0xbe, 0, 0, 0, 52, 0, 7];
        for text in ["a/Foo", "f", "Lb/B;", "Signature", "Lb/B<"] {
            bytes.push(1);
            bytes.extend_from_slice(&(text.len() as u16).to_be_bytes());
            bytes.extend_from_slice(text.as_bytes());
        }
        // #6 Class a/Foo
        bytes.extend_from_slice(&[7, 0, 1]);
        // access, this, super, no interfaces
        bytes.extend_from_slice(&[0, 0x21, 0, 6, 0, 0, 0, 0]);
        // one field carrying one Signature attribute
        bytes.extend_from_slice(&[0, 1, 0, 0, 0, 2, 0, 3, 0, 1]);
        bytes.extend_from_slice(&[0, 4, 0, 0, 0, 2, 0, 5]);
        // no methods, no class attributes
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes
    }

    #[test]
    fn ignored_signatures_are_warnings() {
        let result = Analyzer::new().analyze(vec![ClassInput::new(
            "a/Foo.class",
            class_with_broken_field_signature(),
        )]);
        assert!(result.failures().is_empty());

        let sarif = build_sarif(&result, Vec::new(), empty_invocation());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        let reported = &value["runs"][0]["results"][0];
        assert_eq!(reported["ruleId"], SIGNATURE_RULE);
        assert_eq!(reported["level"], "warning");
        assert_eq!(
            reported["locations"][0]["physicalLocation"]["artifactLocation"]["uri"],
            "a/Foo.class"
        );
        assert!(
            reported["message"]["text"]
                .as_str()
                .expect("message")
                .starts_with("a.Foo: ")
        );
    }

    #[test]
    fn illegal_dependency_message_names_causes() {
        let violation = Violation {
            kind: ViolationKind::IllegalDependency,
            source: "a".to_string(),
            target: "b".to_string(),
            causes: vec!["a.Foo".to_string()],
        };

        let sarif_result = violation_result(&violation, "namespace");

        assert_eq!(sarif_result.rule_id.as_deref(), Some(ILLEGAL_RULE));
        assert_eq!(
            sarif_result.message.text.as_deref(),
            Some("Illegal dependency: a -> b (from a.Foo)")
        );
        assert_eq!(sarif_result.locations.map(|locations| locations.len()), Some(2));
    }
}
