//! Location paths: a root expression followed by a pipeline of steps or other expressions.
//!
//! A [`Path`] is built from its parts with [`Path::new`] and turned into a [`PathPlan`] by
//! [`Path::compile`](crate::path::Path::compile). Compilation validates the path, simplifies the
//! pipeline and decides how the path will be evaluated:
//!
//! - pipelines made of axis steps only are expanded depth first, one context node at a time;
//! - variable-free step pipelines remember their last result per document;
//! - a single predicate-free `child`/`descendant`/`descendant-or-self` step becomes a
//!   [`SingleStepPath`] whose result is an axis stream that is never materialized;
//! - anything else runs through the general pipeline.
//!
//! All of these strategies yield the same sequence for the same input.
mod compile;
mod evaluate;

use crate::compiler::ir::{Dependency, Expr, Step};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode, StaticContext};
use crate::model::{NodeKind, XdmNode};
use crate::xdm::{XdmSequence, XdmSequenceStream};
use core::cell::RefCell;
use core::fmt::{self, Write as _};

/// General location path.
#[derive(Debug)]
pub struct Path<N> {
    root: Expr<N>,
    pipeline: Vec<Expr<N>>,
    /// Every pipeline element is an axis step.
    all_steps: bool,
    /// Results may be memoized per document identity.
    cacheable: bool,
    /// Evaluate step-only pipelines by depth-first expansion.
    expand_steps: bool,
    compiled: bool,
    cache: RefCell<Option<CachedResult<N>>>,
}

/// Last result of a cacheable path. The context node is held (not just its identity) so that
/// the identity cannot be handed out to another node while the entry is alive.
#[derive(Debug)]
struct CachedResult<N> {
    context: N,
    result: XdmSequence<N>,
}

impl<N: Clone> Clone for Path<N> {
    /// Clones share no cache.
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            pipeline: self.pipeline.clone(),
            all_steps: self.all_steps,
            cacheable: self.cacheable,
            expand_steps: self.expand_steps,
            compiled: self.compiled,
            cache: RefCell::new(None),
        }
    }
}

impl<N: XdmNode> Path<N> {
    /// Creates an uncompiled path. The pipeline must not be empty.
    pub fn new(root: Expr<N>, pipeline: Vec<Expr<N>>) -> Result<Self, Error> {
        if pipeline.is_empty() {
            return Err(Error::from_code(ErrorCode::XPST0003, format!("path rooted at {root} has no steps")));
        }
        Ok(Self {
            root,
            pipeline,
            all_steps: false,
            cacheable: false,
            expand_steps: false,
            compiled: false,
            cache: RefCell::new(None),
        })
    }

    pub fn root(&self) -> &Expr<N> {
        &self.root
    }

    pub fn pipeline(&self) -> &[Expr<N>] {
        &self.pipeline
    }

    pub fn is_all_steps(&self) -> bool {
        self.all_steps
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step<N>> {
        self.pipeline.iter().filter_map(Expr::as_step)
    }
}

/// Path specialized for one predicate-free `child`, `descendant` or `descendant-or-self` step.
#[derive(Debug, Clone)]
pub struct SingleStepPath<N> {
    root: Expr<N>,
    step: Step<N>,
}

impl<N: XdmNode> SingleStepPath<N> {
    pub fn root(&self) -> &Expr<N> {
        &self.root
    }

    pub fn step(&self) -> &Step<N> {
        &self.step
    }
}

/// Compiled form of a location path.
#[derive(Debug, Clone)]
pub enum PathPlan<N> {
    Generic(Path<N>),
    SingleStep(SingleStepPath<N>),
}

impl<N: XdmNode> PathPlan<N> {
    /// Compiling a plan twice is a no-op.
    pub fn compile(self, sc: &StaticContext) -> Result<PathPlan<N>, Error> {
        match self {
            PathPlan::Generic(p) => p.compile(sc),
            specialized @ PathPlan::SingleStep(_) => Ok(specialized),
        }
    }

    pub fn evaluate(&self, ctx: &mut DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
        match self {
            PathPlan::Generic(p) => p.evaluate(ctx),
            PathPlan::SingleStep(p) => p.evaluate(ctx),
        }
    }

    /// Evaluates to a restartable sequence. Only single-step plans stream; other plans are
    /// materialized first.
    pub fn evaluate_stream(&self, ctx: &mut DynamicContext<N>) -> Result<XdmSequenceStream<N>, Error> {
        match self {
            PathPlan::Generic(p) => p.evaluate(ctx).map(XdmSequenceStream::from_vec),
            PathPlan::SingleStep(p) => p.evaluate_stream(ctx),
        }
    }

    pub fn root(&self) -> &Expr<N> {
        match self {
            PathPlan::Generic(p) => &p.root,
            PathPlan::SingleStep(p) => &p.root,
        }
    }

    /// Number of pipeline elements after compilation.
    pub fn len(&self) -> usize {
        match self {
            PathPlan::Generic(p) => p.pipeline.len(),
            PathPlan::SingleStep(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The context item only reaches the path through its root. Positions and sizes inside the
    /// pipeline are the path's own, so only the root is asked about them as well.
    pub fn depends_on(&self, dep: Dependency) -> bool {
        match dep {
            Dependency::ContextItem | Dependency::Position => self.root().depends_on(dep),
            Dependency::Variable => {
                self.root().depends_on(dep)
                    || match self {
                        PathPlan::Generic(p) => p.pipeline.iter().any(|e| e.depends_on(dep)),
                        PathPlan::SingleStep(p) => p.step.depends_on(dep),
                    }
            }
        }
    }

    /// Node kind of every result item, when statically known.
    pub fn static_kind(&self) -> Option<NodeKind> {
        match self {
            PathPlan::Generic(p) => p.pipeline.last().and_then(Expr::static_kind),
            PathPlan::SingleStep(p) => p.step.static_kind(),
        }
    }

    /// Multi-line description of the plan and the decisions compilation took.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        // writing to a String cannot fail
        let _ = self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            PathPlan::Generic(p) => {
                let strategy = if p.all_steps && p.expand_steps { "steps" } else { "pipeline" };
                writeln!(out, "{pad}path strategy={strategy} cacheable={}", p.cacheable)?;
                explain_expr(out, "root", &p.root, depth + 1)?;
                for e in &p.pipeline {
                    explain_expr(out, if e.as_step().is_some() { "step" } else { "expr" }, e, depth + 1)?;
                }
            }
            PathPlan::SingleStep(p) => {
                writeln!(out, "{pad}single-step path")?;
                explain_expr(out, "root", &p.root, depth + 1)?;
                writeln!(out, "{pad}  step: {}", p.step)?;
            }
        }
        Ok(())
    }
}

fn explain_expr<N: XdmNode>(out: &mut String, label: &str, e: &Expr<N>, depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    match e {
        Expr::Path(plan) => {
            writeln!(out, "{pad}{label}:")?;
            plan.explain_into(out, depth + 1)
        }
        other => writeln!(out, "{pad}{label}: {other}"),
    }
}

/// A relative path starting with a step prints bare; any other first element needs `./`.
fn write_path<N: XdmNode>(
    f: &mut fmt::Formatter<'_>,
    root: &Expr<N>,
    pipeline: &[&dyn fmt::Display],
    starts_with_step: bool,
) -> fmt::Result {
    let bare = matches!(root, Expr::ContextItem) && starts_with_step;
    match root {
        Expr::Root => {}
        Expr::ContextItem if bare => {}
        other => write!(f, "{other}")?,
    }
    for (i, e) in pipeline.iter().enumerate() {
        if i > 0 || !bare {
            f.write_char('/')?;
        }
        write!(f, "{e}")?;
    }
    Ok(())
}

impl<N: XdmNode> fmt::Display for Path<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&dyn fmt::Display> = self.pipeline.iter().map(|e| e as &dyn fmt::Display).collect();
        let starts_with_step = self.pipeline.first().is_some_and(|e| e.as_step().is_some());
        write_path(f, &self.root, &parts, starts_with_step)
    }
}

impl<N: XdmNode> fmt::Display for SingleStepPath<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_path(f, &self.root, &[&self.step as &dyn fmt::Display], true)
    }
}

impl<N: XdmNode> fmt::Display for PathPlan<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPlan::Generic(p) => write!(f, "{p}"),
            PathPlan::SingleStep(p) => write!(f, "{p}"),
        }
    }
}
