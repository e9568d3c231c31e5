//! Property tests for the project document format.

use proptest::prelude::*;
use reelforge_project::{
    DecidedBy, Decision, Diagnostic, DiagnosticKind, GenerationResult, LineStatus, Project,
    ScriptLine, Stage, parse, to_document_string,
};
use serde_json::Value;
use std::collections::BTreeMap;

fn text_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 ,.!?\u{4e00}-\u{4e10}]{0,24}".prop_map(|s| format!("x{s}"))
}

fn result_strategy() -> impl Strategy<Value = GenerationResult> {
    (
        any::<bool>(),
        prop::collection::vec("[a-z0-9/_.]{1,20}", 1..3),
        prop::collection::btree_map("[a-z_]{1,8}", any::<i32>().prop_map(Value::from), 0..3),
        prop::option::of(0u64..600_000),
    )
        .prop_map(|(ok, artifacts, meta, duration_ms)| GenerationResult {
            ok,
            artifacts,
            meta,
            duration_ms,
        })
}

fn decision_strategy() -> impl Strategy<Value = Decision> {
    (
        "[a-z_]{1,16}",
        (0u32..=100).prop_map(|n| f64::from(n) / 100.0),
        prop_oneof![
            Just(DecidedBy::Model),
            Just(DecidedBy::Fallback),
            Just(DecidedBy::Manual)
        ],
        any::<bool>(),
    )
        .prop_map(|(method, confidence, decided_by, low)| {
            let decision = Decision::new(method, confidence, decided_by);
            if low {
                decision.flagged_low_confidence()
            } else {
                decision
            }
        })
}

fn diagnostic_strategy() -> impl Strategy<Value = Diagnostic> {
    (
        prop_oneof![Just(Stage::Decision), Just(Stage::Audio), Just(Stage::Media)],
        prop_oneof![
            Just(DiagnosticKind::RouterUnavailable),
            Just(DiagnosticKind::MethodFailed),
            Just(DiagnosticKind::Timeout)
        ],
        "[a-z ]{0,30}",
    )
        .prop_map(|(stage, kind, message)| Diagnostic::new(stage, kind, message))
}

fn line_strategy() -> impl Strategy<Value = ScriptLine> {
    (
        text_strategy(),
        prop::option::of("[a-z ]{0,20}"),
        prop::option::of("[a-z ]{0,20}"),
        prop::option::of(decision_strategy()),
        prop::option::of(result_strategy()),
        prop::option::of(result_strategy()),
        prop::option::of(any::<bool>()),
        prop::option::of(diagnostic_strategy()),
        prop::collection::btree_map("x_[a-z]{1,6}", "[a-z]{0,6}".prop_map(Value::from), 0..2),
    )
        .prop_map(
            |(text, prompt, context, decision, generation, audio, skipped, diagnostic, extra)| {
                let mut line = ScriptLine::new("placeholder", text);
                line.prompt = prompt;
                line.context = context;
                // Stage results require a decision
                if decision.is_some() {
                    line.generation = generation;
                    line.audio_generation = audio;
                }
                line.decision = decision;
                line.audio_skipped = skipped;
                line.diagnostic = diagnostic;
                line.extra = extra;
                line
            },
        )
}

fn project_strategy() -> impl Strategy<Value = Project> {
    (
        "[a-z][a-z0-9_-]{0,12}",
        prop::collection::vec(line_strategy(), 0..6),
        prop::collection::btree_map("x_[a-z]{1,6}", any::<u16>().prop_map(Value::from), 0..3),
    )
        .prop_map(|(name, lines, extra)| {
            let mut project = Project::new(name);
            project.script = lines
                .into_iter()
                .enumerate()
                .map(|(i, mut line)| {
                    line.id = format!("L{}", i + 1);
                    line
                })
                .collect();
            project.extra = extra;
            project
        })
}

proptest! {
    #[test]
    fn prop_parse_inverts_serialization(project in project_strategy()) {
        let doc = to_document_string(&project).unwrap();
        let reparsed = parse(&doc, "prop.json").unwrap();
        prop_assert_eq!(&reparsed, &project);
    }

    #[test]
    fn prop_save_load_is_byte_identical(project in project_strategy()) {
        let first = to_document_string(&project).unwrap();
        let second = to_document_string(&parse(&first, "prop.json").unwrap()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_status_is_consistent(line in line_strategy()) {
        let status = line.status();
        prop_assert_eq!(status == LineStatus::Failed, line.has_failure());
        match status {
            LineStatus::Done => {
                prop_assert!(line.is_satisfied(Stage::Media));
                prop_assert!(line.is_satisfied(Stage::Audio));
            }
            LineStatus::MediaDone => prop_assert!(line.is_satisfied(Stage::Media)),
            LineStatus::AudioDone | LineStatus::AudioSkipped => {
                prop_assert!(line.is_satisfied(Stage::Audio));
                prop_assert!(!line.is_satisfied(Stage::Media));
            }
            LineStatus::Decided => prop_assert!(line.decision.is_some()),
            LineStatus::Pending | LineStatus::Failed => {}
        }
    }
}

#[test]
fn test_written_status_matches_derivation() {
    let mut project = Project::from_texts("demo", ["A", "B"]);
    project.script[0].decision = Some(Decision::new("subtitle_only", 1.0, DecidedBy::Model));

    let doc: Value = serde_json::from_str(&to_document_string(&project).unwrap()).unwrap();
    let statuses: Vec<_> = doc["script"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["status"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["decided", "pending"]);
    assert!(doc.get("created_at").is_some());
    let _: BTreeMap<String, Value> = serde_json::from_value(doc).unwrap();
}
