use super::{CachedResult, Path, SingleStepPath};
use crate::compiler::ir::{Expr, Step};
use crate::engine::axes::navigate;
use crate::engine::builder::{NodeBuilder, SequenceBuilder};
use crate::engine::runtime::{DynamicContext, Error};
use crate::model::XdmNode;
use crate::xdm::{XdmItem, XdmSequence, XdmSequenceStream};
use smallvec::SmallVec;

impl<N: XdmNode> Path<N> {
    /// Evaluates the path under the caller's focus. The focus is the same afterwards, whether
    /// evaluation succeeded or not.
    pub fn evaluate(&self, ctx: &mut DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
        let input = self.root.evaluate(ctx)?;
        let document = match input.as_slice() {
            [item @ XdmItem::Node(n)] if item.dynamic_type().is_document() => Some(n.clone()),
            _ => None,
        };
        if self.cacheable {
            if let Some(hit) = document.as_ref().and_then(|d| self.cached(d)) {
                ctx.stats.cache_hits += 1;
                tracing::trace!(path = %self, "path cache hit");
                return Ok(hit);
            }
            tracing::trace!(path = %self, "path cache miss");
        }

        let result = {
            let mut scope = ctx.scoped_focus();
            if let [item] = input.as_slice() {
                scope.set_item(item.clone());
            }
            if self.all_steps && self.expand_steps {
                tracing::trace!(path = %self, strategy = "steps", "evaluating path");
                self.expand(input, &mut scope)?
            } else {
                tracing::trace!(path = %self, strategy = "pipeline", "evaluating path");
                self.run_pipeline(input, &mut scope)?
            }
        };

        if self.cacheable {
            *self.cache.borrow_mut() = document.map(|context| CachedResult { context, result: result.clone() });
        }
        Ok(result)
    }

    fn cached(&self, document: &N) -> Option<XdmSequence<N>> {
        let cache = self.cache.borrow();
        let entry = cache.as_ref()?;
        (entry.context.identity() == document.identity()).then(|| entry.result.clone())
    }

    fn require_node<'a>(&self, item: &'a XdmItem<N>) -> Result<&'a N, Error> {
        item.as_node().ok_or_else(|| Error::non_node_context(self, item.dynamic_type()))
    }

    /// Depth-first expansion of a step-only pipeline.
    fn expand(&self, input: XdmSequence<N>, ctx: &mut DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
        let steps: SmallVec<[&Step<N>; 8]> = self.steps().collect();
        let mut found = Vec::new();
        for item in &input {
            let node = self.require_node(item)?.clone();
            descend(&steps, node, &mut found, ctx)?;
        }
        if found.len() < 2 {
            return Ok(found.into_iter().map(XdmItem::Node).collect());
        }
        let mut builder = NodeBuilder::with_capacity(found.len());
        for n in found {
            builder.add(n);
        }
        ctx.stats.node_builds += 1;
        builder.finish()
    }

    fn run_pipeline(&self, input: XdmSequence<N>, ctx: &mut DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
        let mut current = input;
        for expr in &self.pipeline {
            ctx.check_cancel()?;
            current = match expr {
                Expr::Step(step) => self.apply_step(step, current, ctx)?,
                other => self.apply_expr(other, current, ctx)?,
            };
        }
        self.finish(current, ctx)
    }

    /// Steps take their context node explicitly, so no focus change is needed here.
    fn apply_step(
        &self,
        step: &Step<N>,
        current: XdmSequence<N>,
        ctx: &mut DynamicContext<N>,
    ) -> Result<XdmSequence<N>, Error> {
        match current.as_slice() {
            [] => Ok(Vec::new()),
            [item] => {
                let node = self.require_node(item)?.clone();
                let mut nodes = step.select(node, ctx)?;
                if step.axis.is_reverse() {
                    nodes.reverse();
                }
                Ok(nodes.into_iter().map(XdmItem::Node).collect())
            }
            items => {
                let mut builder = NodeBuilder::new();
                for item in items {
                    let node = self.require_node(item)?.clone();
                    for n in step.select(node, ctx)? {
                        builder.add(n);
                    }
                }
                ctx.stats.node_builds += 1;
                builder.finish()
            }
        }
    }

    fn apply_expr(
        &self,
        expr: &Expr<N>,
        current: XdmSequence<N>,
        ctx: &mut DynamicContext<N>,
    ) -> Result<XdmSequence<N>, Error> {
        let size = current.len();
        let mut out = SequenceBuilder::default();
        let mut scope = ctx.scoped_focus();
        for (i, item) in current.into_iter().enumerate() {
            self.require_node(&item)?;
            scope.set_focus(item, i + 1, size);
            out.add_all(expr.evaluate(&mut scope)?);
        }
        Ok(out.finish())
    }

    /// The final sequence is either all nodes (deduplicated, document order) or all atomic values.
    fn finish(&self, seq: XdmSequence<N>, ctx: &mut DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
        if seq.is_empty() {
            return Ok(seq);
        }
        if !seq[0].is_node() {
            return if seq.iter().any(XdmItem::is_node) { Err(Error::mixed_result_type()) } else { Ok(seq) };
        }
        let mut builder = NodeBuilder::with_capacity(seq.len());
        for item in seq {
            match item {
                XdmItem::Node(n) => builder.add(n),
                XdmItem::Atomic(_) => return Err(Error::mixed_result_type()),
            }
        }
        ctx.stats.node_builds += 1;
        builder.finish()
    }
}

/// Expands `node` through the remaining `steps`; nodes reaching the end are results.
fn descend<N: XdmNode>(
    steps: &[&Step<N>],
    node: N,
    out: &mut Vec<N>,
    ctx: &mut DynamicContext<N>,
) -> Result<(), Error> {
    let Some((step, rest)) = steps.split_first() else {
        ctx.check_cancel()?;
        out.push(node);
        return Ok(());
    };
    if step.predicates.is_empty() {
        ctx.stats.navigations += 1;
        for next in navigate(step.axis, node, &step.test) {
            descend(rest, next, out, ctx)?;
        }
    } else {
        for next in step.select(node, ctx)? {
            descend(rest, next, out, ctx)?;
        }
    }
    Ok(())
}

impl<N: XdmNode> SingleStepPath<N> {
    pub fn evaluate(&self, ctx: &mut DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
        Ok(self.evaluate_stream(ctx)?.materialize())
    }

    /// Streams the step's axis from the root node. Each `iter()` on the returned stream walks the
    /// axis again; nothing is buffered, deduplicated or cached.
    pub fn evaluate_stream(&self, ctx: &mut DynamicContext<N>) -> Result<XdmSequenceStream<N>, Error> {
        let input = self.root.evaluate(ctx)?;
        match input.as_slice() {
            [] => Ok(XdmSequenceStream::default()),
            [XdmItem::Node(origin)] => {
                ctx.stats.navigations += 1;
                Ok(XdmSequenceStream::Axis { origin: origin.clone(), axis: self.step.axis, test: self.step.test.clone() })
            }
            items => {
                // results from several roots may overlap
                let mut builder = NodeBuilder::new();
                for item in items {
                    let node = item.as_node().ok_or_else(|| Error::non_node_context(self, item.dynamic_type()))?;
                    ctx.stats.navigations += 1;
                    for n in navigate(self.step.axis, node.clone(), &self.step.test) {
                        builder.add(n);
                    }
                }
                ctx.stats.node_builds += 1;
                Ok(XdmSequenceStream::from_vec(builder.finish()?))
            }
        }
    }
}
