use super::{Path, PathPlan, SingleStepPath};
use crate::compiler::compile_all;
use crate::compiler::ir::{Axis, Dependency, Expr, Step};
use crate::engine::runtime::{Error, StaticContext};
use crate::model::{NodeKind, XdmNode};
use core::cell::RefCell;

impl<N: XdmNode> Path<N> {
    /// Compiles the path into its evaluation plan.
    ///
    /// Fails with `err:XPST0005` when the first step cannot apply to the root, or when a pair of
    /// adjacent steps can never select anything.
    pub fn compile(self, sc: &StaticContext) -> Result<PathPlan<N>, Error> {
        if self.compiled {
            return Ok(PathPlan::Generic(self));
        }
        let root = self.root.compile(sc)?;
        let mut pipeline = compile_all(self.pipeline, sc)?;
        check_root(&root, &pipeline)?;

        let all_steps = pipeline.iter().all(|e| e.as_step().is_some());
        let mut cacheable = false;
        if all_steps {
            if sc.merge_descendant_steps {
                let before = pipeline.len();
                merge_descendant_steps(&mut pipeline);
                if pipeline.len() < before {
                    tracing::debug!(
                        merged = before - pipeline.len(),
                        steps = pipeline.len(),
                        "rewrote descendant-or-self::node()/child steps"
                    );
                }
            }
            check_adjacent_steps(&pipeline)?;
            cacheable = sc.cache_results && !pipeline.iter().any(|e| e.depends_on(Dependency::Variable));

            if sc.specialize_single_steps
                && pipeline.len() == 1
                && pipeline[0].as_step().is_some_and(is_streamable)
                && let Some(Expr::Step(step)) = pipeline.pop()
            {
                tracing::debug!(axis = %step.axis, test = %step.test, "specialized single-step path");
                return Ok(PathPlan::SingleStep(SingleStepPath { root, step }));
            }
        }

        Ok(PathPlan::Generic(Path {
            root,
            pipeline,
            all_steps,
            cacheable,
            expand_steps: sc.steps_fast_path,
            compiled: true,
            cache: RefCell::new(None),
        }))
    }
}

fn is_streamable<N: XdmNode>(step: &Step<N>) -> bool {
    step.predicates.is_empty() && matches!(step.axis, Axis::Child | Axis::Descendant | Axis::DescendantOrSelf)
}

/// Rejects a first step that can never apply to a document or attribute root.
fn check_root<N: XdmNode>(root: &Expr<N>, pipeline: &[Expr<N>]) -> Result<(), Error> {
    let Some(step) = pipeline.first().and_then(Expr::as_step) else {
        return Ok(());
    };
    let Some(kind) = root.static_kind() else {
        return Ok(());
    };
    // `self::document-node()` on a document or `self::attribute()` on an attribute still matches
    let self_mismatch = step.axis == Axis::SelfAxis && step.test.kind(Axis::SelfAxis).is_some_and(|k| k != kind);
    let conflict = match kind {
        NodeKind::Document => matches!(step.axis, Axis::Attribute | Axis::Parent) || self_mismatch,
        NodeKind::Attribute => matches!(step.axis, Axis::Attribute | Axis::Child) || self_mismatch,
        _ => false,
    };
    if conflict {
        return Err(Error::static_conflict(format!("{step} cannot apply to a {kind:?} root")));
    }
    Ok(())
}

/// Collapses `descendant-or-self::node()/child::x[p]` into `descendant::x[p]` until no pair is left.
/// A child step whose predicates observe positions keeps its own context and is never merged.
fn merge_descendant_steps<N: XdmNode>(pipeline: &mut Vec<Expr<N>>) {
    let mut i = 1;
    while i < pipeline.len() {
        let mergeable = matches!(
            (&pipeline[i - 1], &pipeline[i]),
            (Expr::Step(prev), Expr::Step(next))
                if prev.is_trivial(Axis::DescendantOrSelf) && next.axis == Axis::Child && !next.is_positional()
        );
        if mergeable {
            pipeline.remove(i - 1);
            if let Expr::Step(merged) = &mut pipeline[i - 1] {
                merged.axis = Axis::Descendant;
            }
        } else {
            i += 1;
        }
    }
}

fn check_adjacent_steps<N: XdmNode>(pipeline: &[Expr<N>]) -> Result<(), Error> {
    for pair in pipeline.windows(2) {
        let (Some(prev), Some(cur)) = (pair[0].as_step(), pair[1].as_step()) else {
            continue;
        };
        if never_matches(prev, cur) {
            return Err(Error::static_conflict(format!("{cur} after {prev}")));
        }
    }
    Ok(())
}

fn never_matches<N: XdmNode>(prev: &Step<N>, cur: &Step<N>) -> bool {
    let after_leaf = prev.axis == Axis::Attribute || prev.test.is_text();
    match cur.axis {
        Axis::SelfAxis | Axis::DescendantOrSelf if cur.test.is_wildcard() => false,
        Axis::SelfAxis => {
            let different_names = matches!((prev.test.qname(), cur.test.qname()), (Some(a), Some(b)) if a != b);
            prev.axis == Axis::Attribute || (prev.test.is_text() && !cur.test.is_text()) || different_names
        }
        Axis::DescendantOrSelf => prev.axis == Axis::Attribute || (prev.test.is_text() && !cur.test.is_text()),
        Axis::Descendant | Axis::Child => after_leaf,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::NodeTest;
    use crate::engine::runtime::{ErrorCode, StaticContextBuilder};
    use crate::simple_node::SimpleNode;
    use rstest::rstest;

    type E = Expr<SimpleNode>;

    fn step(axis: Axis, test: NodeTest) -> E {
        Expr::step(axis, test)
    }

    fn dos() -> E {
        step(Axis::DescendantOrSelf, NodeTest::AnyKind)
    }

    fn compile(root: E, pipeline: Vec<E>) -> Result<PathPlan<SimpleNode>, Error> {
        Path::new(root, pipeline)?.compile(&StaticContext::default())
    }

    #[rstest]
    #[case(vec![dos(), step(Axis::Child, NodeTest::name("a")), step(Axis::Child, NodeTest::name("b"))], "/descendant::a/child::b")]
    #[case(vec![dos(), dos(), step(Axis::Child, NodeTest::name("a")), step(Axis::Child, NodeTest::Wildcard)], "/descendant-or-self::node()/descendant::a/child::*")]
    #[case(vec![step(Axis::Child, NodeTest::name("r")), dos(), step(Axis::Child, NodeTest::Text)], "/child::r/descendant::text()")]
    fn merges_descendant_steps(#[case] pipeline: Vec<E>, #[case] expected: &str) {
        assert_eq!(compile(Expr::Root, pipeline).unwrap().to_string(), expected);
    }

    #[rstest]
    fn positional_child_step_is_not_merged() {
        let positional = Step::new(Axis::Child, NodeTest::name("a")).with_predicate(Expr::integer(1));
        let plan = compile(Expr::Root, vec![dos(), positional.into()]).unwrap();
        assert_eq!(plan.to_string(), "/descendant-or-self::node()/child::a[1]");
    }

    #[rstest]
    fn merge_can_be_disabled() {
        let sc = StaticContextBuilder::new().with_merge_descendant_steps(false).build();
        let plan = Path::<SimpleNode>::new(Expr::Root, vec![dos(), step(Axis::Child, NodeTest::name("a"))])
            .unwrap()
            .compile(&sc)
            .unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[rstest]
    #[case(Expr::Root, vec![step(Axis::Attribute, NodeTest::name("a"))])]
    #[case(Expr::Root, vec![step(Axis::Parent, NodeTest::AnyKind)])]
    #[case(Expr::Root, vec![step(Axis::SelfAxis, NodeTest::name("a"))])]
    #[case(Expr::Node(crate::simple_node::attr("id", "1")), vec![step(Axis::Child, NodeTest::AnyKind)])]
    #[case(Expr::ContextItem, vec![step(Axis::SelfAxis, NodeTest::AnyKind), step(Axis::Attribute, NodeTest::name("a")), step(Axis::SelfAxis, NodeTest::name("b"))])]
    #[case(Expr::ContextItem, vec![step(Axis::Child, NodeTest::Text), step(Axis::Child, NodeTest::AnyKind)])]
    #[case(Expr::ContextItem, vec![step(Axis::Child, NodeTest::name("a")), step(Axis::SelfAxis, NodeTest::name("b"))])]
    #[case(Expr::ContextItem, vec![step(Axis::Attribute, NodeTest::Wildcard), step(Axis::DescendantOrSelf, NodeTest::Wildcard)])]
    fn static_conflicts(#[case] root: E, #[case] pipeline: Vec<E>) {
        let err = compile(root, pipeline).unwrap_err();
        assert_eq!(err.code, ErrorCode::XPST0005);
        assert!(err.is_static_conflict());
    }

    #[rstest]
    #[case(Expr::Root, vec![step(Axis::SelfAxis, NodeTest::Document), step(Axis::Child, NodeTest::Wildcard)])]
    #[case(Expr::Root, vec![step(Axis::SelfAxis, NodeTest::AnyKind), step(Axis::Child, NodeTest::Wildcard)])]
    #[case(Expr::Node(crate::simple_node::attr("id", "1")), vec![step(Axis::Parent, NodeTest::AnyKind)])]
    #[case(Expr::ContextItem, vec![step(Axis::Attribute, NodeTest::name("a")), step(Axis::SelfAxis, NodeTest::AnyKind)])]
    #[case(Expr::ContextItem, vec![step(Axis::Child, NodeTest::Text), step(Axis::SelfAxis, NodeTest::Text)])]
    fn satisfiable_paths_compile(#[case] root: E, #[case] pipeline: Vec<E>) {
        assert!(compile(root, pipeline).is_ok());
    }

    #[rstest]
    fn variable_predicates_disable_the_cache() {
        let pred = Step::new(Axis::Child, NodeTest::name("a"))
            .with_predicate(Expr::compare(crate::compiler::ir::CompareOp::Eq, Expr::ContextItem, Expr::variable("v")));
        let plan = compile(Expr::Root, vec![pred.into(), step(Axis::Child, NodeTest::name("b"))]).unwrap();
        let PathPlan::Generic(path) = plan else { panic!("expected generic plan") };
        assert!(path.is_all_steps());
        assert!(!path.is_cacheable());
    }

    #[rstest]
    #[case(Axis::Child, true)]
    #[case(Axis::Descendant, true)]
    #[case(Axis::DescendantOrSelf, true)]
    #[case(Axis::Following, false)]
    fn single_steps_are_specialized(#[case] axis: Axis, #[case] specialized: bool) {
        let plan = compile(Expr::Root, vec![step(axis, NodeTest::name("a"))]).unwrap();
        assert_eq!(matches!(plan, PathPlan::SingleStep(_)), specialized);
    }

    #[rstest]
    fn specialization_ignores_the_cache_flag() {
        let sc = StaticContextBuilder::new().with_result_cache(false).build();
        let plan = Path::<SimpleNode>::new(Expr::Root, vec![step(Axis::Descendant, NodeTest::name("a"))])
            .unwrap()
            .compile(&sc)
            .unwrap();
        assert!(matches!(plan, PathPlan::SingleStep(_)));
    }

    #[rstest]
    fn mixed_pipelines_are_neither_rewritten_nor_checked() {
        let plan = compile(
            Expr::ContextItem,
            vec![dos(), Expr::string("x"), step(Axis::Child, NodeTest::name("a"))],
        )
        .unwrap();
        let PathPlan::Generic(path) = plan else { panic!("expected generic plan") };
        assert!(!path.is_all_steps());
        assert_eq!(path.pipeline().len(), 3);
    }
}
