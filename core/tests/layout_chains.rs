use tether_core::variables::{parse_expression, Node};
use tether_core::{EngineError, Operand, System, VariableState};

/// Horizontal box model: left/right edges, width, and center.
fn box_model(sys: &mut System, id: &str) {
    let w = format!("{id}.width");
    let l = format!("{id}.left");
    let r = format!("{id}.right");
    let c = format!("{id}.center");
    sys.set(&w, format!("{r} - {l}")).unwrap();
    sys.set(&c, format!("{l} + {w} / 2")).unwrap();
}

#[test]
fn test_box_from_edges() {
    let mut sys = System::new();
    box_model(&mut sys, "#box");
    sys.assign("#box.left", 10.0).unwrap();
    sys.assign("#box.right", 20.0).unwrap();

    let report = sys.solve(1).unwrap();

    assert!(report.is_settled());
    assert_eq!(sys.get("#box.width"), Some(10.0));
    assert_eq!(sys.get("#box.center"), Some(15.0));
}

#[test]
fn test_box_from_left_and_center() {
    let mut sys = System::new();
    box_model(&mut sys, "#box");
    sys.assign("#box.left", 10.0).unwrap();
    sys.assign("#box.center", 15.0).unwrap();

    sys.solve(1).unwrap();

    assert_eq!(sys.get("#box.width"), Some(10.0));
    assert_eq!(sys.get("#box.right"), Some(20.0));
}

#[test]
fn test_stacked_boxes_share_edges() {
    let mut sys = System::new();
    box_model(&mut sys, "a");
    box_model(&mut sys, "b");
    sys.set("b.left", "a.right + 8").unwrap();
    sys.set("b.right", "b.left + a.width * 2").unwrap();
    sys.assign_environment("a.left", 0.0).unwrap();
    sys.assign_environment("a.right", 50.0).unwrap();

    sys.solve(1).unwrap();

    assert_eq!(sys.get("b.left"), Some(58.0));
    assert_eq!(sys.get("b.width"), Some(100.0));
    assert_eq!(sys.get("b.right"), Some(158.0));
    assert_eq!(sys.get("b.center"), Some(108.0));
}

#[test]
fn test_digests_follow_environment_changes() {
    let mut sys = System::new();
    box_model(&mut sys, "panel");
    sys.assign_environment("panel.left", 0.0).unwrap();

    for (digest, right) in [(1, 100.0), (2, 240.0), (3, 60.0)] {
        sys.assign_environment("panel.right", right).unwrap();
        sys.solve(digest).unwrap();
        assert_eq!(sys.get("panel.center"), Some(right / 2.0));
        assert_eq!(sys.state("panel.center"), Some(VariableState::Solved));
    }
}

#[test]
fn test_overconstrained_box_contradicts() {
    let mut sys = System::new();
    box_model(&mut sys, "#box");
    sys.assign("#box.left", 10.0).unwrap();
    sys.assign("#box.right", 20.0).unwrap();
    sys.assign("#box.center", 40.0).unwrap();

    let err = sys.solve(1).unwrap_err();
    match err {
        EngineError::Contradiction { variable, held, attempted } => {
            assert_eq!(variable, "#box.center");
            assert_eq!(held, 40.0);
            assert_eq!(attempted, 15.0);
        }
        other => panic!("Expected contradiction, got {other:?}"),
    }
}

#[test]
fn test_custom_clamp_function() {
    let mut sys = System::new();
    sys.func(
        "clamp",
        |args: &[f64]| args[0].max(args[1]).min(args[2]),
        Some(3),
    )
    .unwrap();
    sys.set("raw", "viewport - 40").unwrap();
    sys.call(
        "clamp",
        "width",
        vec![Operand::from("raw"), Operand::from(200.0), Operand::from(960.0)],
    )
    .unwrap();

    for (digest, viewport, expected) in [(1, 100.0, 200.0), (2, 800.0, 760.0), (3, 2000.0, 960.0)] {
        sys.assign_environment("viewport", viewport).unwrap();
        sys.solve(digest).unwrap();
        assert_eq!(sys.get("width"), Some(expected));
    }
}

#[test]
fn test_host_supplied_ast() {
    let mut sys = System::new();
    sys.func("max", |args: &[f64]| args[0].max(args[1]), Some(2))
        .unwrap();
    let ast = Node::from_json(
        r#"{"type": "func_call", "name": "max", "params": [
            {"type": "ident", "value": "content.height"},
            {"type": "op", "operator": "*", "left": {"type": "ident", "value": "content.width"},
                                             "right": {"type": "number", "value": 0.5}}
        ]}"#,
    )
    .unwrap();

    let height = sys.variable("card.height");
    let out = sys.evaluate(&ast).unwrap();
    sys.equals(height, out).unwrap();
    sys.assign("content.height", 120.0).unwrap();
    sys.assign("content.width", 300.0).unwrap();

    sys.solve(1).unwrap();
    assert_eq!(sys.get("card.height"), Some(150.0));
}

#[test]
fn test_parsed_text_matches_evaluated_tree() {
    let node = parse_expression("a.right - a.left").unwrap();
    assert_eq!(
        node,
        Node::op("-", Node::ident("a.right"), Node::ident("a.left"))
    );
}

#[test]
fn test_tear_down_one_box_leaves_the_other() {
    let mut sys = System::new();
    box_model(&mut sys, "a");
    box_model(&mut sys, "b");
    let before = sys.relationship_count();

    sys.destroy("a.width");
    sys.destroy("a.center");

    assert_eq!(sys.relationship_count(), before / 2);
    assert!(!sys.has("a.left"));
    assert!(!sys.has("a.right"));
    assert!(sys.has("b.width"));
    assert!(sys.describe(Some("a.")).is_empty());
}
