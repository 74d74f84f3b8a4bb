use whisker_base::{DiagCode, SourceFile};
use whisker_story::{BinaryOp, Expr, LogicalOp, Value};

use crate::ast::{Module, NodeKind};
use crate::parser::parse;

fn parse_module(source: &str) -> Module {
    let file = SourceFile::new("test.ws", source);
    parse(&file).module
}

fn parse_ok(source: &str) -> Module {
    let file = SourceFile::new("test.ws", source);
    let out = parse(&file);
    assert!(
        out.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        out.diagnostics
    );
    out.module
}

#[test]
fn parses_two_linear_passages() {
    let module = parse_ok(":: Start\nHello\n+ [Go] -> End\n\n:: End\nBye\n");
    assert_eq!(module.passages.len(), 2);
    assert_eq!(module.passages[0].name, "Start");
    assert_eq!(module.passages[1].name, "End");

    let choice = module.passages[0]
        .body
        .iter()
        .find_map(|n| match &n.kind {
            NodeKind::Choice { text, target, .. } => Some((text.clone(), target.clone())),
            _ => None,
        })
        .expect("choice node");
    assert_eq!(choice.0, "Go");
    assert_eq!(choice.1.as_deref(), Some("End"));
}

#[test]
fn parses_passage_tags() {
    let module = parse_ok(":: Cave [dark, scary]\ntext\n");
    assert_eq!(module.passages[0].tags, vec!["dark", "scary"]);
}

#[test]
fn parses_story_metadata_and_variables() {
    let module = parse_ok("@@ title: A Tale\n@@ author: kit\n@@ var $hp = 10\n\n:: Start\nhi\n");
    assert_eq!(module.metadata.len(), 2);
    assert_eq!(module.metadata[0].key, "title");
    assert_eq!(module.metadata[0].value, "A Tale");
    assert_eq!(module.variables.len(), 1);
    assert_eq!(module.variables[0].name, "hp");
    assert_eq!(
        module.variables[0].initial.expr,
        Expr::literal(Value::Int(10))
    );
}

#[test]
fn parses_assignment_with_arithmetic() {
    let module = parse_ok(":: S\n~ $hp = $hp - 1\n");
    let assign = module.passages[0]
        .body
        .iter()
        .find_map(|n| match &n.kind {
            NodeKind::Assignment { var, expr } => Some((var.clone(), expr.expr.clone())),
            _ => None,
        })
        .expect("assignment");
    assert_eq!(assign.0, "hp");
    assert_eq!(
        assign.1,
        Expr::binary(BinaryOp::Sub, Expr::variable("hp"), Expr::literal(Value::Int(1)))
    );
}

#[test]
fn parses_interpolation_in_text() {
    let module = parse_ok(":: S\nYou have {$gold} coins\n");
    let kinds: Vec<_> = module.passages[0]
        .body
        .iter()
        .map(|n| std::mem::discriminant(&n.kind))
        .collect();
    assert_eq!(kinds.len(), 4); // text, interpolation, text, newline text
    assert!(module.passages[0].body.iter().any(|n| matches!(
        &n.kind,
        NodeKind::Interpolation { expr } if expr.expr == Expr::variable("gold")
    )));
}

#[test]
fn parses_conditional_with_elsif_and_else() {
    let source = ":: S\n{ if $n > 2 }\nbig\n{ elsif $n > 0 }\nsmall\n{ else }\nnone\n{ endif }\n";
    let module = parse_ok(source);
    let cond = module.passages[0]
        .body
        .iter()
        .find_map(|n| match &n.kind {
            NodeKind::Conditional {
                condition,
                then_body,
                elsif,
                else_body,
            } => Some((condition, then_body, elsif, else_body)),
            _ => None,
        })
        .expect("conditional");
    assert_eq!(
        cond.0.expr,
        Expr::binary(BinaryOp::Gt, Expr::variable("n"), Expr::literal(Value::Int(2)))
    );
    assert!(!cond.1.is_empty());
    assert_eq!(cond.2.len(), 1);
    assert!(cond.3.is_some());
}

#[test]
fn parses_for_loop() {
    let module = parse_ok(":: S\n{ for item in $inventory }\n- {item}\n{ endfor }\n");
    let found = module.passages[0].body.iter().any(|n| {
        matches!(
            &n.kind,
            NodeKind::ForEach { binder, collection, body }
                if binder == "item"
                    && collection.expr == Expr::variable("inventory")
                    && !body.is_empty()
        )
    });
    assert!(found);
}

#[test]
fn parses_choice_guard() {
    let module = parse_ok(":: S\n+ [Push on] { if $hp > 0 -> Forest }\n");
    let choice = module.passages[0]
        .body
        .iter()
        .find_map(|n| match &n.kind {
            NodeKind::Choice {
                text,
                target,
                guard,
                ..
            } => Some((text.clone(), target.clone(), guard.clone())),
            _ => None,
        })
        .expect("choice");
    assert_eq!(choice.0, "Push on");
    assert_eq!(choice.1.as_deref(), Some("Forest"));
    assert!(choice.2.is_some());
}

#[test]
fn parses_choice_inline_body() {
    let module = parse_ok(":: S\n+ [Look around] { You see nothing. }\n");
    let choice = module.passages[0]
        .body
        .iter()
        .find_map(|n| match &n.kind {
            NodeKind::Choice { target, body, .. } => Some((target.clone(), body.clone())),
            _ => None,
        })
        .expect("choice");
    assert!(choice.0.is_none());
    assert!(matches!(&choice.1[0].kind, NodeKind::Text { text, .. } if text.contains("nothing")));
}

#[test]
fn parses_multi_line_choice_body() {
    let module = parse_ok(":: S\n+ [Dig] {\n~ $gold = $gold + 1\nYou found gold!\n}\nAfter.\n");
    let choice = module.passages[0]
        .body
        .iter()
        .find_map(|n| match &n.kind {
            NodeKind::Choice { body, .. } => Some(body.clone()),
            _ => None,
        })
        .expect("choice");
    assert!(choice
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::Assignment { var, .. } if var == "gold")));
    assert!(choice
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::Text { text, .. } if text.contains("found gold"))));
    // Content after the closing brace belongs to the passage, not the choice.
    assert!(module.passages[0]
        .body
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::Text { text, .. } if text.contains("After"))));
}

#[test]
fn parses_divert_line() {
    let module = parse_ok(":: S\n-> End 1\n");
    assert!(module.passages[0]
        .body
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::Divert { target } if target == "End 1")));
}

#[test]
fn parses_wiki_link_as_choice() {
    let module = parse_ok(":: S\n[[the door|Hall]]\n");
    let found = module.passages[0].body.iter().any(|n| {
        matches!(
            &n.kind,
            NodeKind::Choice { text, target, .. }
                if text == "the door" && target.as_deref() == Some("Hall")
        )
    });
    assert!(found);
}

#[test]
fn parses_named_hook() {
    let module = parse_ok(":: S\n|status>[healthy]\n");
    let found = module.passages[0].body.iter().any(|n| {
        matches!(
            &n.kind,
            NodeKind::NamedHook { name, visible, body }
                if name == "status" && *visible && !body.is_empty()
        )
    });
    assert!(found);
}

#[test]
fn parses_script_fence_as_script_block() {
    let module = parse_ok(":: S\n```script\nconsole.log(1)\n```\n");
    assert!(module.passages[0]
        .body
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::ScriptBlock { text } if text.contains("console"))));
}

#[test]
fn parses_code_fence_with_language() {
    let module = parse_ok(":: S\n```lua\nprint(1)\n```\n");
    let found = module.passages[0].body.iter().any(|n| {
        matches!(
            &n.kind,
            NodeKind::Text { text, flags }
                if text == "print(1)" && flags.codeblock.as_deref() == Some("lua")
        )
    });
    assert!(found);
}

#[test]
fn parses_bold_flags_on_text() {
    let module = parse_ok(":: S\nplain **bold** plain\n");
    let bold_runs: Vec<_> = module.passages[0]
        .body
        .iter()
        .filter_map(|n| match &n.kind {
            NodeKind::Text { text, flags } if flags.bold => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(bold_runs, vec!["bold"]);
}

#[test]
fn parses_blockquote_and_list() {
    let module = parse_ok(":: S\n> quoted\n- item one\n1. item two\n");
    let body = &module.passages[0].body;
    assert!(body
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::Blockquote { depth: 1, .. })));
    assert!(body
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::ListItem { ordered: false, .. })));
    assert!(body
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::ListItem { ordered: true, .. })));
}

#[test]
fn operator_precedence_binds_and_over_or() {
    let module = parse_ok(":: S\n~ $x = $a or $b and $c\n");
    let expr = module.passages[0]
        .body
        .iter()
        .find_map(|n| match &n.kind {
            NodeKind::Assignment { expr, .. } => Some(expr.expr.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        expr,
        Expr::logical(
            LogicalOp::Or,
            Expr::variable("a"),
            Expr::logical(LogicalOp::And, Expr::variable("b"), Expr::variable("c")),
        )
    );
}

#[test]
fn stray_content_before_header_is_reported_once() {
    let file = SourceFile::new("test.ws", "hello\nworld\n\n:: S\nok\n");
    let out = parse(&file);
    let count = out
        .diagnostics
        .iter()
        .filter(|d| d.code == DiagCode::ExpectedPassageHeader)
        .count();
    assert_eq!(count, 1);
    assert_eq!(out.module.passages.len(), 1);
}

#[test]
fn recovers_from_bad_assignment() {
    let file = SourceFile::new("test.ws", ":: S\n~ oops\ngood text\n+ [Go] -> S\n");
    let out = parse(&file);
    assert!(!out.diagnostics.is_empty());
    // The rest of the passage still parses.
    assert!(out.module.passages[0]
        .body
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::Choice { .. })));
}

#[test]
fn missing_endif_is_reported_but_body_kept() {
    let file = SourceFile::new("test.ws", ":: S\n{ if $x }\ninside\n");
    let out = parse(&file);
    assert!(out
        .diagnostics
        .iter()
        .any(|d| d.code == DiagCode::UnterminatedConditional));
    assert!(out.module.passages[0]
        .body
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::Conditional { .. })));
}

#[test]
fn nested_conditionals_parse() {
    let source = ":: S\n{ if $a }\n{ if $b }\nboth\n{ endif }\n{ endif }\n";
    let module = parse_ok(source);
    let outer = module.passages[0]
        .body
        .iter()
        .find_map(|n| match &n.kind {
            NodeKind::Conditional { then_body, .. } => Some(then_body),
            _ => None,
        })
        .unwrap();
    assert!(outer
        .iter()
        .any(|n| matches!(&n.kind, NodeKind::Conditional { .. })));
}

#[test]
fn map_and_array_literals_parse() {
    let module = parse_ok(":: S\n~ $stats = { str: 3, dex: 5 }\n~ $bag = [1, 2, 3]\n");
    let exprs: Vec<_> = module.passages[0]
        .body
        .iter()
        .filter_map(|n| match &n.kind {
            NodeKind::Assignment { expr, .. } => Some(expr.expr.clone()),
            _ => None,
        })
        .collect();
    assert!(matches!(&exprs[0], Expr::MapLiteral { pairs } if pairs.len() == 2));
    assert!(matches!(&exprs[1], Expr::ArrayLiteral { items } if items.len() == 3));
}

#[test]
fn function_calls_parse_with_args() {
    let module = parse_module(":: S\n~ $m = min($a, 3)\n");
    let expr = module.passages[0]
        .body
        .iter()
        .find_map(|n| match &n.kind {
            NodeKind::Assignment { expr, .. } => Some(expr.expr.clone()),
            _ => None,
        })
        .unwrap();
    assert!(matches!(&expr, Expr::Call { name, args } if name == "min" && args.len() == 2));
}

#[test]
fn spans_point_into_source() {
    let source = ":: S\n~ $hp = 5\n";
    let module = parse_ok(source);
    let node = module.passages[0]
        .body
        .iter()
        .find(|n| matches!(&n.kind, NodeKind::Assignment { .. }))
        .unwrap();
    assert_eq!(node.span.start.line, 2);
    assert_eq!(node.span.start.column, 1);
}
