pub mod ir;

use crate::engine::runtime::{Error, StaticContext};
use crate::model::XdmNode;
use crate::path::{Path, PathPlan};
use ir::{Expr, Step};

/// Builds and compiles a location path in one go.
///
/// ```
/// use locpath::compiler::ir::{Axis, Expr, NodeTest};
/// use locpath::engine::runtime::StaticContext;
/// use locpath::{PathPlan, SimpleNode, compile_path};
///
/// let plan = compile_path::<SimpleNode>(
///     Expr::Root,
///     vec![Expr::step(Axis::DescendantOrSelf, NodeTest::AnyKind), Expr::step(Axis::Child, NodeTest::name("a"))],
///     &StaticContext::default(),
/// )
/// .unwrap();
/// // merged into descendant::a, then specialized into a streaming single-step plan
/// assert!(matches!(plan, PathPlan::SingleStep(_)));
/// assert_eq!(plan.to_string(), "/descendant::a");
/// ```
pub fn compile_path<N: XdmNode>(
    root: Expr<N>,
    pipeline: Vec<Expr<N>>,
    static_ctx: &StaticContext,
) -> Result<PathPlan<N>, Error> {
    Path::new(root, pipeline)?.compile(static_ctx)
}

impl<N: XdmNode> Expr<N> {
    /// Compiles this expression and everything below it. Paths are rewritten into their final plan.
    pub fn compile(self, sc: &StaticContext) -> Result<Expr<N>, Error> {
        Ok(match self {
            Expr::Sequence(items) => Expr::Sequence(compile_all(items, sc)?),
            Expr::Compare { op, left, right } => {
                Expr::Compare { op, left: Box::new(left.compile(sc)?), right: Box::new(right.compile(sc)?) }
            }
            Expr::Call { function, args } => Expr::Call { function, args: compile_all(args, sc)? },
            Expr::Step(step) => Expr::Step(step.compile(sc)?),
            Expr::Path(plan) => Expr::Path(Box::new((*plan).compile(sc)?)),
            leaf => leaf,
        })
    }
}

impl<N: XdmNode> Step<N> {
    pub fn compile(self, sc: &StaticContext) -> Result<Step<N>, Error> {
        let Step { axis, test, predicates } = self;
        Ok(Step { axis, test, predicates: compile_all(predicates, sc)? })
    }
}

pub(crate) fn compile_all<N: XdmNode>(exprs: Vec<Expr<N>>, sc: &StaticContext) -> Result<Vec<Expr<N>>, Error> {
    exprs.into_iter().map(|e| e.compile(sc)).collect()
}
