//! End-to-end parse-then-compile flow over realistic model replies.

use lares_parser::{compile_ir, CommandParser, ParserConfig, Quantifier};

#[test]
fn test_named_device_command_flows_to_ir() {
    let mut parser = CommandParser::new();
    let outcome =
        parser.parse(r#"[{"a": "打开", "s": "客厅", "n": "主灯", "t": "Light", "q": "one"}]"#);

    assert!(!outcome.degraded);
    assert_eq!(outcome.commands.len(), 1);

    let ir = compile_ir(&outcome.commands[0], "打开客厅主灯");
    assert_eq!(ir.action, "打开");
    assert_eq!(ir.name_hint.as_deref(), Some("主灯"));
    assert!(ir.scope_include.contains("客厅"));
    assert_eq!(ir.type_hint, "Light");
    assert_eq!(ir.quantifier, Quantifier::One);
}

#[test]
fn test_except_command_flows_to_ir() {
    let mut parser = CommandParser::new();
    let outcome = parser
        .parse(r#"[{"a": "打开", "s": ["*", "!卧室"], "n": "*", "t": "Light", "q": "except"}]"#);

    assert!(!outcome.degraded);

    let ir = compile_ir(&outcome.commands[0], "打开除卧室以外的灯");
    assert_eq!(ir.quantifier, Quantifier::Except);
    assert!(ir.scope_include.is_empty());
    assert!(ir.scope_exclude.contains("卧室"));
    assert!(ir.is_bulk());
}

#[test]
fn test_garbage_reply_flows_to_empty_ir() {
    let mut parser = CommandParser::new();
    let outcome = parser.parse("sorry, I cannot help with that");

    assert!(outcome.degraded);
    let ir = compile_ir(&outcome.commands[0], "帮我写首诗");
    assert!(ir.action.is_empty());
    assert!(ir.name_hint.is_none());
}

#[test]
fn test_metrics_survive_across_a_session() {
    let mut parser = CommandParser::with_config(ParserConfig::new());

    for reply in [
        r#"[{"a": "打开", "s": "客厅", "t": "Light"}]"#,
        r#"[{"a": "UNKNOWN"}]"#,
        "not json at all",
        r#"[{"a": "关闭", "s": "卧室", "t": "Light"}]"#,
    ] {
        parser.parse(reply);
    }

    let metrics = parser.metrics();
    assert_eq!(metrics.total_outputs, 4);
    assert_eq!(metrics.unknown_outputs, 2);
    assert_eq!(metrics.degraded_outputs, 2);
    assert!((metrics.unknown_ratio() - 0.5).abs() < 1e-9);
}
