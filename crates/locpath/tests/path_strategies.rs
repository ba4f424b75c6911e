use locpath::engine::runtime::Focus;
use locpath::simple_node::{attr, doc, elem, text};
use locpath::{
    Axis, CompareOp, DynamicContext, DynamicContextBuilder, ErrorCode, Expr, NodeTest, Path, PathPlan, SimpleNode,
    StaticContext, StaticContextBuilder, Step, XdmAtomicValue, XdmItem, XdmNode, compile_path,
};
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type E = Expr<SimpleNode>;

fn step(axis: Axis, test: NodeTest) -> E {
    Expr::step(axis, test)
}

fn name(local: &str) -> NodeTest {
    NodeTest::name(local)
}

/// Uncompiled relative path, compiled together with the enclosing expression.
fn relative(pipeline: Vec<E>) -> E {
    Expr::Path(Box::new(PathPlan::Generic(Path::new(Expr::ContextItem, pipeline).unwrap())))
}

fn ctx_for(node: &SimpleNode) -> DynamicContext<SimpleNode> {
    DynamicContextBuilder::new().with_context_item(XdmItem::Node(node.clone())).build()
}

fn labels(seq: &[XdmItem<SimpleNode>]) -> Vec<String> {
    seq.iter()
        .map(|i| match i {
            XdmItem::Node(n) => match n.name() {
                Some(q) => q.local.to_string(),
                None => format!("{:?}", n.kind()),
            },
            XdmItem::Atomic(a) => a.lexical(),
        })
        .collect()
}

// <r><a id="1"><b/><c>x</c></a><a id="2"><b>y</b></a><d><a id="3"/></d></r>
#[fixture]
fn document() -> SimpleNode {
    doc()
        .child(
            elem("r")
                .child(elem("a").attr(attr("id", "1")).child(elem("b")).child(elem("c").child(text("x"))))
                .child(elem("a").attr(attr("id", "2")).child(elem("b").child(text("y"))))
                .child(elem("d").child(elem("a").attr(attr("id", "3")))),
        )
        .build()
}

fn fast() -> StaticContext {
    StaticContext::default()
}

fn general() -> StaticContext {
    StaticContextBuilder::new().with_steps_fast_path(false).with_single_step_specialization(false).build()
}

#[rstest]
fn descendant_then_child_scenario() {
    // <r><a><b/><c/></a><a/></r>
    let d = doc().child(elem("r").child(elem("a").child(elem("b")).child(elem("c"))).child(elem("a"))).build();
    let pipeline = vec![step(Axis::Descendant, name("a")), step(Axis::Child, NodeTest::Wildcard)];
    for sc in [fast(), general()] {
        let plan = compile_path(Expr::Root, pipeline.clone(), &sc).unwrap();
        let out = plan.evaluate(&mut ctx_for(&d)).unwrap();
        assert_eq!(labels(&out), ["b", "c"]);
    }
}

#[rstest]
#[case::child_chain(vec![step(Axis::Child, name("r")), step(Axis::Child, name("a")), step(Axis::Child, NodeTest::Wildcard)])]
#[case::shared_parents(vec![step(Axis::Descendant, name("b")), step(Axis::Parent, NodeTest::AnyKind)])]
#[case::reverse_axis(vec![step(Axis::Descendant, name("b")), step(Axis::Ancestor, NodeTest::Wildcard)])]
#[case::merged(vec![step(Axis::DescendantOrSelf, NodeTest::AnyKind), step(Axis::Child, name("a")), step(Axis::Child, name("b"))])]
#[case::positional(vec![
    step(Axis::Descendant, NodeTest::Wildcard),
    Step::new(Axis::Child, NodeTest::Wildcard).with_predicate(Expr::integer(1)).into(),
])]
#[case::descendant_positional(vec![
    step(Axis::DescendantOrSelf, NodeTest::AnyKind),
    Step::new(Axis::Child, name("a")).with_predicate(Expr::integer(2)).into(),
])]
#[case::filtered(vec![
    Step::new(Axis::Descendant, name("a")).with_predicate(relative(vec![step(Axis::Child, name("b"))])).into(),
    step(Axis::DescendantOrSelf, NodeTest::AnyKind),
])]
#[case::numeric_path_predicate(vec![
    step(Axis::DescendantOrSelf, NodeTest::AnyKind),
    Step::new(Axis::Child, name("a")).with_predicate(relative(vec![Expr::integer(2)])).into(),
])]
#[case::siblings(vec![step(Axis::Descendant, name("a")), step(Axis::FollowingSibling, NodeTest::Wildcard)])]
#[case::attributes(vec![step(Axis::Descendant, name("a")), step(Axis::Attribute, name("id"))])]
#[case::texts(vec![step(Axis::Descendant, NodeTest::Wildcard), step(Axis::Child, NodeTest::Text)])]
fn fast_path_matches_general_pipeline(document: SimpleNode, #[case] pipeline: Vec<E>) {
    let by_steps = compile_path(Expr::Root, pipeline.clone(), &fast()).unwrap().evaluate(&mut ctx_for(&document));
    let by_pipeline = compile_path(Expr::Root, pipeline, &general()).unwrap().evaluate(&mut ctx_for(&document));
    assert_eq!(by_steps.unwrap(), by_pipeline.unwrap());
}

#[rstest]
fn merge_preserves_results(document: SimpleNode) {
    let pipeline = vec![
        step(Axis::DescendantOrSelf, NodeTest::AnyKind),
        step(Axis::Child, name("a")),
        step(Axis::Attribute, name("id")),
    ];
    let merged = compile_path(Expr::Root, pipeline.clone(), &fast()).unwrap();
    let unmerged_sc = StaticContextBuilder::new().with_merge_descendant_steps(false).build();
    let unmerged = compile_path(Expr::Root, pipeline, &unmerged_sc).unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(unmerged.len(), 3);
    let a = merged.evaluate(&mut ctx_for(&document)).unwrap();
    let b = unmerged.evaluate(&mut ctx_for(&document)).unwrap();
    assert_eq!(a, b);
    assert_eq!(labels(&a), ["id", "id", "id"]);
}

#[rstest]
fn numeric_path_predicate_is_not_merged() {
    // <r><p><x/><x/></p><q><x/><x/></q></r>, then //x[./2]
    let d = doc()
        .child(elem("r").child(elem("p").child(elem("x")).child(elem("x"))).child(elem("q").child(elem("x")).child(elem("x"))))
        .build();
    let pipeline = vec![
        step(Axis::DescendantOrSelf, NodeTest::AnyKind),
        Step::new(Axis::Child, name("x")).with_predicate(relative(vec![Expr::integer(2)])).into(),
    ];
    let plan = compile_path(Expr::Root, pipeline.clone(), &fast()).unwrap();
    assert_eq!(plan.len(), 2, "{plan}");
    let unmerged_sc = StaticContextBuilder::new().with_merge_descendant_steps(false).build();
    let unmerged = compile_path(Expr::Root, pipeline, &unmerged_sc).unwrap();
    let out = plan.evaluate(&mut ctx_for(&d)).unwrap();
    assert_eq!(out, unmerged.evaluate(&mut ctx_for(&d)).unwrap());
    let parents: Vec<String> = out.iter().map(|i| i.as_node().unwrap().parent().unwrap().name().unwrap().local.to_string()).collect();
    assert_eq!(parents, ["p", "q"]);
}

#[rstest]
fn positional_predicate_keeps_per_parent_positions(document: SimpleNode) {
    // //a[1]: the first a child of every parent, not the first a in the document
    let pipeline = vec![
        step(Axis::DescendantOrSelf, NodeTest::AnyKind),
        Step::new(Axis::Child, name("a")).with_predicate(Expr::integer(1)).into(),
    ];
    let out = compile_path(Expr::Root, pipeline, &fast()).unwrap().evaluate(&mut ctx_for(&document)).unwrap();
    let ids: Vec<String> = out.iter().map(|i| i.as_node().unwrap().attributes().next().unwrap().string_value()).collect();
    assert_eq!(ids, ["1", "3"]);
}

#[rstest]
fn single_result_skips_the_builder(document: SimpleNode) {
    let pipeline = vec![step(Axis::Child, name("r")), step(Axis::Child, name("d"))];
    let plan = compile_path(Expr::Root, pipeline, &fast()).unwrap();
    let mut ctx = ctx_for(&document);
    let out = plan.evaluate(&mut ctx).unwrap();
    assert_eq!(labels(&out), ["d"]);
    assert_eq!(ctx.stats.node_builds, 0);

    let many = compile_path(Expr::Root, vec![step(Axis::Child, name("r")), step(Axis::Child, name("a"))], &fast());
    let out = many.unwrap().evaluate(&mut ctx).unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(ctx.stats.node_builds, 1);
}

#[rstest]
fn empty_results_are_empty(document: SimpleNode) {
    let pipeline = vec![step(Axis::Child, name("r")), step(Axis::Child, name("missing"))];
    for sc in [fast(), general()] {
        let mut ctx = ctx_for(&document);
        let out = compile_path(Expr::Root, pipeline.clone(), &sc).unwrap().evaluate(&mut ctx).unwrap();
        assert!(out.is_empty());
        assert_eq!(ctx.stats.node_builds, 0);
    }
}

#[rstest]
#[case::node_then_atomic(vec![Expr::ContextItem, Expr::integer(1)])]
#[case::atomic_then_node(vec![Expr::integer(1), Expr::ContextItem])]
fn results_never_mix_nodes_and_atomics(document: SimpleNode, #[case] items: Vec<E>) {
    let plan = compile_path(Expr::Root, vec![Expr::Sequence(items)], &fast()).unwrap();
    let err = plan.evaluate(&mut ctx_for(&document)).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0018);
    assert!(err.is_mixed_result_type());
}

#[rstest]
fn atomic_results_pass_through_unchanged(document: SimpleNode) {
    let pipeline = vec![
        step(Axis::Child, name("r")),
        step(Axis::Child, name("a")),
        Expr::call("string", vec![relative(vec![step(Axis::Attribute, name("id"))])]).unwrap(),
    ];
    let out = compile_path(Expr::Root, pipeline, &fast()).unwrap().evaluate(&mut ctx_for(&document)).unwrap();
    assert_eq!(
        out,
        vec![
            XdmItem::Atomic(XdmAtomicValue::String("1".into())),
            XdmItem::Atomic(XdmAtomicValue::String("2".into())),
        ]
    );
}

#[rstest]
#[case::expression_after_atomic(vec![Expr::string("x"), Expr::ContextItem])]
#[case::step_after_atomic(vec![Expr::string("x"), step(Axis::Child, NodeTest::AnyKind)])]
fn non_node_context_is_rejected(document: SimpleNode, #[case] pipeline: Vec<E>) {
    let plan = compile_path(Expr::Root, pipeline, &fast()).unwrap();
    let err = plan.evaluate(&mut ctx_for(&document)).unwrap_err();
    assert!(err.is_non_node_context(), "{err}");
}

#[rstest]
fn atomic_root_is_rejected() {
    let plan = compile_path::<SimpleNode>(Expr::integer(3), vec![step(Axis::Child, NodeTest::AnyKind)], &fast());
    let err = plan.unwrap().evaluate(&mut DynamicContext::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0019);
}

#[rstest]
fn focus_is_restored_after_failure(document: SimpleNode) {
    let r = document.children().next().unwrap();
    let mut ctx = ctx_for(&document);
    ctx.focus = Focus { item: Some(XdmItem::Node(r.clone())), size: 5, position: 3 };
    let before = ctx.focus.clone();

    let mixed = Expr::Sequence(vec![Expr::ContextItem, Expr::integer(1)]);
    let failing = compile_path(Expr::ContextItem, vec![step(Axis::Child, name("a")), mixed], &fast()).unwrap();
    assert!(failing.evaluate(&mut ctx).is_err());
    assert_eq!(ctx.focus, before);

    let on_atomic = compile_path(Expr::ContextItem, vec![Expr::string("x"), Expr::ContextItem], &fast()).unwrap();
    let err = on_atomic.evaluate(&mut ctx).unwrap_err();
    assert!(err.is_non_node_context(), "{err}");
    assert_eq!(ctx.focus, before);

    let fine = compile_path(Expr::ContextItem, vec![step(Axis::Child, name("a"))], &general()).unwrap();
    assert_eq!(fine.evaluate(&mut ctx).unwrap().len(), 2);
    assert_eq!(ctx.focus, before);
}

#[rstest]
fn predicates_see_path_local_positions(document: SimpleNode) {
    // /r/a[position() = last()]
    let last_a = Step::new(Axis::Child, name("a")).with_predicate(Expr::compare(CompareOp::Eq, Expr::Position, Expr::Last));
    let pipeline = vec![step(Axis::Child, name("r")), last_a.into()];
    let out = compile_path(Expr::Root, pipeline, &fast()).unwrap().evaluate(&mut ctx_for(&document)).unwrap();
    let id = out[0].as_node().unwrap().attributes().next().unwrap().string_value();
    assert_eq!(id, "2");
}

#[rstest]
fn variables_in_predicates(document: SimpleNode) {
    let pick = Step::new(Axis::Descendant, name("a")).with_predicate(Expr::compare(
        CompareOp::Eq,
        relative(vec![step(Axis::Attribute, name("id"))]),
        Expr::variable("want"),
    ));
    let plan = compile_path(Expr::Root, vec![pick.into(), step(Axis::Child, name("b"))], &fast()).unwrap();
    let mut ctx = DynamicContextBuilder::new()
        .with_context_item(XdmItem::Node(document.clone()))
        .with_variable(locpath::QName::local("want"), vec![XdmItem::Atomic(XdmAtomicValue::Integer(2))])
        .build();
    let out = plan.evaluate(&mut ctx).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].as_node().unwrap().string_value(), "y");
}

#[rstest]
fn cancellation_stops_both_strategies(document: SimpleNode) {
    let flag = Arc::new(AtomicBool::new(true));
    let pipeline = vec![step(Axis::Descendant, NodeTest::Wildcard), step(Axis::Child, NodeTest::AnyKind)];
    for sc in [fast(), general()] {
        let plan = compile_path(Expr::Root, pipeline.clone(), &sc).unwrap();
        let mut ctx = DynamicContextBuilder::new()
            .with_context_item(XdmItem::Node(document.clone()))
            .with_cancel_flag(flag.clone())
            .build();
        assert_eq!(plan.evaluate(&mut ctx).unwrap_err().code, ErrorCode::FOER0000);
    }
    flag.store(false, Ordering::Relaxed);
    let plan = compile_path(Expr::Root, pipeline, &fast()).unwrap();
    let mut ctx =
        DynamicContextBuilder::new().with_context_item(XdmItem::Node(document.clone())).with_cancel_flag(flag).build();
    assert!(plan.evaluate(&mut ctx).is_ok());
}

#[rstest]
fn static_conflict_through_a_relative_path() {
    // self::node()/attribute::a/self::b
    let pipeline = vec![
        step(Axis::SelfAxis, NodeTest::AnyKind),
        step(Axis::Attribute, name("a")),
        step(Axis::SelfAxis, name("b")),
    ];
    let err = compile_path::<SimpleNode>(Expr::ContextItem, pipeline, &fast()).unwrap_err();
    assert!(err.is_static_conflict());
    assert!(err.to_string().contains("self::b"), "{err}");
}

#[rstest]
fn nested_paths_are_compiled_with_the_outer_expression() {
    let nested = relative(vec![step(Axis::DescendantOrSelf, NodeTest::AnyKind), step(Axis::Child, name("b"))]);
    let outer = Step::new(Axis::Child, name("a")).with_predicate(nested);
    let plan = compile_path::<SimpleNode>(Expr::Root, vec![step(Axis::Child, name("r")), outer.into()], &fast()).unwrap();
    assert_eq!(plan.to_string(), "/child::r/child::a[descendant::b]");

    let conflicting = relative(vec![step(Axis::Attribute, name("x")), step(Axis::Child, NodeTest::AnyKind)]);
    let bad = Step::new(Axis::Child, name("a")).with_predicate(conflicting);
    let err = compile_path::<SimpleNode>(Expr::Root, vec![bad.into()], &fast()).unwrap_err();
    assert!(err.is_static_conflict());
}
