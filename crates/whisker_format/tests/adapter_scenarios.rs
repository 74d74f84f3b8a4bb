//! Cross-format scenarios: dialect imports, Ink export shapes, and the
//! export/import round-trip laws.

use serde_json::Value as Json;

use whisker_compile::{compile, CompileOptions};
use whisker_format::{
    export, import, ExportOptions, FormatRegistry, ImportOptions, TwineDialect,
};
use whisker_story::{BinaryOp, ContentNode, Expr, Story, Value};

// ---------------------------------------------------------------------------
// Harlowe import
// ---------------------------------------------------------------------------

#[test]
fn harlowe_set_and_if_import_to_assignment_and_conditional() {
    let html = r#"<tw-storydata name="T" startnode="1" format="Harlowe" ifid="ABC"><tw-passagedata pid="1" name="Start">(set: $x to 2)
(if: $x is 2)[Hello]</tw-passagedata></tw-storydata>"#;

    let result = import(html, None);
    let story = result.story.expect("story imports");
    assert_eq!(story.metadata.title, "T");
    assert_eq!(story.metadata.ifid.as_deref(), Some("ABC"));
    assert_eq!(story.start_passage, "Start");

    let passage = story.get_passage("Start").expect("Start exists");

    let assignment = passage
        .content
        .iter()
        .find_map(|n| match n {
            ContentNode::Assignment { var, expr } => Some((var.clone(), expr.clone())),
            _ => None,
        })
        .expect("assignment node");
    assert_eq!(assignment.0, "x");
    assert_eq!(assignment.1, Expr::literal(Value::Int(2)));

    let conditional = passage
        .content
        .iter()
        .find_map(|n| match n {
            ContentNode::Conditional {
                condition,
                then_body,
                ..
            } => Some((condition.clone(), then_body.clone())),
            _ => None,
        })
        .expect("conditional node");
    assert_eq!(
        conditional.0,
        Expr::binary(BinaryOp::Eq, Expr::variable("x"), Expr::literal(Value::Int(2)))
    );
    assert!(matches!(
        &conditional.1[0],
        ContentNode::Text { text, .. } if text == "Hello"
    ));
}

#[test]
fn twine_positions_survive_import() {
    let html = r#"<tw-storydata name="T" startnode="1" format="Harlowe"><tw-passagedata pid="1" name="Start" position="600,300">hi</tw-passagedata></tw-storydata>"#;
    let story = import(html, None).story.expect("imports");
    let passage = story.get_passage("Start").unwrap();
    assert_eq!(passage.position, Some((600.0, 300.0)));
    assert_eq!(passage.metadata.get("pid").map(String::as_str), Some("1"));
}

// ---------------------------------------------------------------------------
// Ink export
// ---------------------------------------------------------------------------

#[test]
fn ink_export_matches_the_documented_shape() {
    // Passages "Start" and "End 1", with a divert between them.
    let mut story = Story::new("Trial");
    let mut start = whisker_story::Passage::new("Start");
    start.content.push(ContentNode::text("Hello"));
    start.content.push(ContentNode::Divert {
        target: "End 1".into(),
    });
    story.add_passage(start).unwrap();
    let mut end = whisker_story::Passage::new("End 1");
    end.content.push(ContentNode::text("Bye"));
    story.add_passage(end).unwrap();

    let result = export(&story, "ink", &ExportOptions::default());
    let doc: Json = serde_json::from_str(&result.content).expect("valid JSON");

    assert_eq!(doc["inkVersion"], 20);

    let root = doc["root"].as_array().expect("root array");
    assert_eq!(root[0], serde_json::json!(["->", "start"]));
    assert_eq!(root[1], serde_json::json!("done"));
    assert_eq!(root[2], serde_json::json!(["#f", 1]));

    let knots = root[3].as_object().expect("knot containers");
    assert!(knots.contains_key("end_1"), "knot key end_1 missing");
    let start_knot = knots["start"].as_array().unwrap();
    assert!(start_knot.contains(&serde_json::json!(["->", "end_1"])));
}

// ---------------------------------------------------------------------------
// Round-trip laws
// ---------------------------------------------------------------------------

const SOURCE: &str = "@@ title: Roundtrip\n@@ var $hp = 10\n\n:: Start\nHello there\n~ $hp = $hp - 1\n{ if $hp > 5 }\nStill strong\n{ endif }\n+ [Go on] -> End\n+ [Wait] { if $hp > 0 -> Start }\n\n:: End\nBye\n";

fn compile_story(source: &str) -> Story {
    let result = compile(source, &CompileOptions::default());
    assert!(
        !whisker_base::has_errors(&result.diagnostics),
        "compile errors: {:?}",
        result.diagnostics
    );
    result.story
}

/// Lossless structural comparison for round trips: ids, targets, guards,
/// assignments. Text runs are compared joined, since dialects split runs
/// differently.
fn skeleton(story: &Story) -> Vec<(String, Vec<String>)> {
    story
        .get_all_passages()
        .map(|p| {
            let mut facts = Vec::new();
            for node in &p.content {
                node.walk(&mut |n| match n {
                    ContentNode::Choice { choice } => {
                        facts.push(format!(
                            "choice:{}->{}",
                            choice.text,
                            choice.target.clone().unwrap_or_default()
                        ));
                    }
                    ContentNode::Divert { target } => facts.push(format!("divert:{}", target)),
                    ContentNode::Assignment { var, .. } => facts.push(format!("set:{}", var)),
                    _ => {}
                });
            }
            (p.id.clone(), facts)
        })
        .collect()
}

#[test]
fn whisker_export_import_is_the_identity() {
    let story = compile_story(SOURCE);
    let exported = export(&story, "whisker", &ExportOptions::default());
    assert!(
        !whisker_base::has_errors(&exported.diagnostics),
        "{:?}",
        exported.diagnostics
    );
    let reimported = import(&exported.content, Some("whisker"))
        .story
        .expect("reimports");
    assert_eq!(story, reimported, "exported:\n{}", exported.content);
}

#[test]
fn harlowe_round_trip_preserves_structure() {
    let story = compile_story(SOURCE);
    let options = ExportOptions {
        twine_format: TwineDialect::Harlowe,
        ..ExportOptions::default()
    };
    let exported = export(&story, "harlowe", &options);
    let reimported = import(&exported.content, None).story.expect("reimports");
    assert_eq!(
        skeleton(&story),
        skeleton(&reimported),
        "exported:\n{}",
        exported.content
    );
}

#[test]
fn sugarcube_round_trip_preserves_structure() {
    let story = compile_story(SOURCE);
    let options = ExportOptions {
        twine_format: TwineDialect::Sugarcube,
        ..ExportOptions::default()
    };
    let exported = export(&story, "sugarcube", &options);
    let reimported = import(&exported.content, None).story.expect("reimports");
    assert_eq!(
        skeleton(&story),
        skeleton(&reimported),
        "exported:\n{}",
        exported.content
    );
}

#[test]
fn compile_of_pretty_print_is_stable() {
    // compile(print(compile(src))) == compile(src), modulo whitespace.
    let first = compile_story(SOURCE);
    let printed = export(&first, "whisker", &ExportOptions::default());
    let second = compile_story(&printed.content);
    assert_eq!(first, second);
}

#[test]
fn registry_detection_is_exclusive_per_dialect() {
    let registry = FormatRegistry::with_builtins();
    let sugarcube_html = r#"<tw-storydata name="T" format="SugarCube" format-version="2.36.1"><tw-passagedata pid="1" name="S"><<set $x to 1>></tw-passagedata></tw-storydata>"#;
    let detected = registry.detect(sugarcube_html, None).expect("detects");
    assert_eq!(detected.name(), "sugarcube");

    // The Harlowe adapter refuses a SugarCube archive.
    let harlowe = registry.by_name("harlowe").unwrap();
    assert!(!harlowe.can_import(sugarcube_html));
}

#[test]
fn chapbook_and_snowman_import_basic_stories() {
    let chapbook = r#"<tw-storydata name="C" startnode="1" format="Chapbook"><tw-passagedata pid="1" name="Start">gold: 10
--
You have {gold} coins. [[Shop->Market]]</tw-passagedata><tw-passagedata pid="2" name="Market">Welcome</tw-passagedata></tw-storydata>"#;
    let story = import(chapbook, None).story.expect("chapbook imports");
    let start = story.get_passage("Start").unwrap();
    assert!(start
        .content
        .iter()
        .any(|n| matches!(n, ContentNode::Assignment { var, .. } if var == "gold")));

    let snowman = r#"<tw-storydata name="S" startnode="1" format="Snowman"><tw-passagedata pid="1" name="Start">HP: <%= s.hp %> <a data-passage="End">leave</a></tw-passagedata><tw-passagedata pid="2" name="End">done</tw-passagedata></tw-storydata>"#;
    let story = import(snowman, None).story.expect("snowman imports");
    let start = story.get_passage("Start").unwrap();
    assert!(start
        .content
        .iter()
        .any(|n| matches!(n, ContentNode::Interpolation { .. })));
    assert!(start.content.iter().any(|n| matches!(
        n,
        ContentNode::Choice { choice } if choice.target.as_deref() == Some("End")
    )));
}

#[test]
fn ink_import_export_round_trip_on_supported_shapes() {
    let mut story = Story::new("Ink RT");
    let mut start = whisker_story::Passage::new("start");
    start.content.push(ContentNode::text("Pick:"));
    start.content.push(ContentNode::Choice {
        choice: whisker_story::Choice::to_target("Go", "finale"),
    });
    story.add_passage(start).unwrap();
    let mut end = whisker_story::Passage::new("finale");
    end.content.push(ContentNode::text("Bye"));
    story.add_passage(end).unwrap();

    let exported = export(&story, "ink", &ExportOptions::default());
    let reimported = import(&exported.content, Some("ink")).story.expect("imports");
    assert_eq!(skeleton(&story), skeleton(&reimported));
}

#[test]
fn convert_macros_off_keeps_whisker_syntax_in_the_archive() {
    let story = compile_story(SOURCE);
    let options = ExportOptions {
        convert_macros: false,
        ..ExportOptions::default()
    };
    let exported = export(&story, "harlowe", &options);
    // The passage text carries WhiskerScript, not Harlowe macros.
    assert!(exported.content.contains("~ $hp = $hp - 1"), "{}", exported.content);
    assert!(!exported.content.contains("(set:"), "{}", exported.content);
}

#[test]
fn duplicate_import_policy_defaults_to_first_wins() {
    let html = r#"<tw-storydata name="T" startnode="1" format="Harlowe"><tw-passagedata pid="1" name="Twin">first</tw-passagedata><tw-passagedata pid="2" name="Twin">second</tw-passagedata></tw-storydata>"#;
    let registry = FormatRegistry::with_builtins();
    let format = registry.by_name("harlowe").unwrap();

    let result = format.import(html, &ImportOptions::default());
    let story = result.story.expect("story");
    assert_eq!(story.passage_count(), 1);
    assert!(matches!(
        &story.get_passage("Twin").unwrap().content[0],
        ContentNode::Text { text, .. } if text == "first"
    ));
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == whisker_base::DiagCode::DuplicatePassage));
}
