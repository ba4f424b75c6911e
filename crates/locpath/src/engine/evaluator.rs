//! Evaluation of the expression set surrounding location paths.
//!
//! All evaluation goes through an explicit `&mut DynamicContext`; sub-expressions that need a
//! different focus (predicates, path elements) obtain it through [`DynamicContext::scoped_focus`]
//! so the caller's focus is back in place however the sub-evaluation ends.
use crate::compiler::ir::{CompareOp, Expr, Function, Step};
use crate::engine::axes::navigate;
use crate::engine::builder::SequenceBuilder;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::{NodeKind, XdmNode};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence};
use core::cmp::Ordering;

/// Evaluates a compiled plan against `ctx`.
pub fn evaluate<N: XdmNode>(expr: &Expr<N>, ctx: &mut DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
    expr.evaluate(ctx)
}

impl<N: XdmNode> Expr<N> {
    pub fn evaluate(&self, ctx: &mut DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
        match self {
            Expr::ContextItem => Ok(vec![context_item(ctx)?.clone()]),
            Expr::Root => {
                let node = context_node(ctx)?;
                let root = node.root();
                if root.kind() != NodeKind::Document {
                    return Err(Error::from_code(
                        ErrorCode::XPDY0050,
                        format!("root of the context node is a {:?} node, not a document", root.kind()),
                    ));
                }
                Ok(vec![XdmItem::Node(root)])
            }
            Expr::Literal(a) => Ok(vec![XdmItem::Atomic(a.clone())]),
            Expr::Node(n) => Ok(vec![XdmItem::Node(n.clone())]),
            Expr::Variable(name) => ctx
                .variable(name)
                .cloned()
                .ok_or_else(|| Error::from_code(ErrorCode::XPST0008, format!("undeclared variable ${name}"))),
            Expr::Position => {
                context_item(ctx)?;
                Ok(vec![integer(ctx.focus.position)])
            }
            Expr::Last => {
                context_item(ctx)?;
                Ok(vec![integer(ctx.focus.size)])
            }
            Expr::Sequence(items) => {
                let mut out = SequenceBuilder::default();
                for e in items {
                    out.add_all(e.evaluate(ctx)?);
                }
                Ok(out.finish())
            }
            Expr::Compare { op, left, right } => {
                let l = left.evaluate(ctx)?;
                let r = right.evaluate(ctx)?;
                Ok(vec![XdmItem::Atomic(XdmAtomicValue::Boolean(general_compare(*op, &l, &r)))])
            }
            Expr::Call { function, args } => call(*function, args, ctx),
            Expr::Step(step) => {
                let node = context_node(ctx)?.clone();
                let mut nodes = step.select(node, ctx)?;
                if step.axis.is_reverse() {
                    nodes.reverse();
                }
                Ok(nodes.into_iter().map(XdmItem::Node).collect())
            }
            Expr::Path(plan) => plan.evaluate(ctx),
        }
    }
}

impl<N: XdmNode> Step<N> {
    /// Nodes selected by this step from `node`, in axis order, after applying every predicate.
    pub fn select(&self, node: N, ctx: &mut DynamicContext<N>) -> Result<Vec<N>, Error> {
        ctx.stats.navigations += 1;
        let mut nodes: Vec<N> = navigate(self.axis, node, &self.test).collect();
        for predicate in &self.predicates {
            if nodes.is_empty() {
                break;
            }
            nodes = filter(nodes, predicate, ctx)?;
        }
        Ok(nodes)
    }
}

/// Keeps the nodes for which `predicate` holds, with position and size taken from `nodes`.
fn filter<N: XdmNode>(nodes: Vec<N>, predicate: &Expr<N>, ctx: &mut DynamicContext<N>) -> Result<Vec<N>, Error> {
    let size = nodes.len();
    let mut kept = Vec::with_capacity(size);
    let mut scope = ctx.scoped_focus();
    for (i, n) in nodes.into_iter().enumerate() {
        scope.check_cancel()?;
        scope.set_focus(XdmItem::Node(n.clone()), i + 1, size);
        let value = predicate.evaluate(&mut scope)?;
        if predicate_truth(&value, i + 1)? {
            kept.push(n);
        }
    }
    Ok(kept)
}

/// A single numeric value selects by position; anything else is reduced to its effective boolean value.
fn predicate_truth<N: XdmNode>(value: &XdmSequence<N>, position: usize) -> Result<bool, Error> {
    if let [XdmItem::Atomic(a)] = value.as_slice()
        && a.is_numeric()
    {
        return Ok(a.as_f64().is_some_and(|v| v == position as f64));
    }
    effective_boolean(value)
}

pub fn effective_boolean<N: XdmNode>(value: &XdmSequence<N>) -> Result<bool, Error> {
    match value.as_slice() {
        [] => Ok(false),
        [XdmItem::Node(_), ..] => Ok(true),
        [XdmItem::Atomic(a)] => Ok(match a {
            XdmAtomicValue::Boolean(b) => *b,
            XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) => !s.is_empty(),
            XdmAtomicValue::Integer(i) => *i != 0,
            XdmAtomicValue::Double(d) => *d != 0.0 && !d.is_nan(),
        }),
        _ => Err(Error::from_code(
            ErrorCode::FORG0006,
            "effective boolean value is not defined for a sequence of two or more atomic values",
        )),
    }
}

fn context_item<N>(ctx: &DynamicContext<N>) -> Result<&XdmItem<N>, Error> {
    ctx.focus.item.as_ref().ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context item is undefined"))
}

fn context_node<N: XdmNode>(ctx: &DynamicContext<N>) -> Result<&N, Error> {
    match context_item(ctx)? {
        XdmItem::Node(n) => Ok(n),
        XdmItem::Atomic(a) => {
            Err(Error::from_code(ErrorCode::XPTY0020, format!("context item {a} is not a node")))
        }
    }
}

fn integer<N>(v: usize) -> XdmItem<N> {
    XdmItem::Atomic(XdmAtomicValue::Integer(i64::try_from(v).unwrap_or(i64::MAX)))
}

fn boolean<N>(b: bool) -> XdmSequence<N> {
    vec![XdmItem::Atomic(XdmAtomicValue::Boolean(b))]
}

fn string<N>(s: String) -> XdmSequence<N> {
    vec![XdmItem::Atomic(XdmAtomicValue::String(s))]
}

fn call<N: XdmNode>(function: Function, args: &[Expr<N>], ctx: &mut DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
    let arg = match args.first() {
        Some(e) => e.evaluate(ctx)?,
        None => vec![context_item(ctx)?.clone()],
    };
    match function {
        Function::Count => Ok(vec![integer(arg.len())]),
        Function::Exists => Ok(boolean(!arg.is_empty())),
        Function::Empty => Ok(boolean(arg.is_empty())),
        Function::Not => Ok(boolean(!effective_boolean(&arg)?)),
        Function::Boolean => Ok(boolean(effective_boolean(&arg)?)),
        Function::String => Ok(string(match zero_or_one(function, &arg)? {
            None => String::new(),
            Some(XdmItem::Node(n)) => n.string_value(),
            Some(XdmItem::Atomic(a)) => a.lexical(),
        })),
        Function::Name | Function::LocalName => {
            let name = match zero_or_one(function, &arg)? {
                None => None,
                Some(XdmItem::Node(n)) => n.name(),
                Some(XdmItem::Atomic(_)) => {
                    return Err(Error::from_code(
                        ErrorCode::XPTY0004,
                        format!("{}() expects a node argument", function.as_str()),
                    ));
                }
            };
            Ok(string(match name {
                None => String::new(),
                Some(q) if function == Function::LocalName => q.local.to_string(),
                Some(q) => match q.prefix {
                    Some(p) => format!("{p}:{}", q.local),
                    None => q.local.to_string(),
                },
            }))
        }
    }
}

fn zero_or_one<N>(function: Function, arg: &XdmSequence<N>) -> Result<Option<&XdmItem<N>>, Error> {
    match arg.as_slice() {
        [] => Ok(None),
        [item] => Ok(Some(item)),
        _ => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("{}() expects at most one item, got {}", function.as_str(), arg.len()),
        )),
    }
}

/// Existential comparison over the atomized operands.
fn general_compare<N: XdmNode>(op: CompareOp, left: &XdmSequence<N>, right: &XdmSequence<N>) -> bool {
    let right: Vec<XdmAtomicValue> = right.iter().map(XdmItem::atomize).collect();
    left.iter().map(XdmItem::atomize).any(|l| right.iter().any(|r| compare_atomic(op, &l, r)))
}

fn compare_atomic(op: CompareOp, l: &XdmAtomicValue, r: &XdmAtomicValue) -> bool {
    use XdmAtomicValue as V;
    let ordering = match (l, r) {
        (V::Boolean(a), V::Boolean(b)) => Some(a.cmp(b)),
        (V::Boolean(a), other) | (other, V::Boolean(a)) => {
            // untyped and strings compare to booleans through their effective boolean value
            let b = match other {
                V::String(s) | V::UntypedAtomic(s) => !s.is_empty(),
                n => n.as_f64().is_some_and(|v| v != 0.0),
            };
            let ord = a.cmp(&b);
            Some(if matches!(l, V::Boolean(_)) { ord } else { ord.reverse() })
        }
        _ if l.is_numeric() || r.is_numeric() => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        _ => Some(l.lexical().cmp(&r.lexical())),
    };
    let Some(ordering) = ordering else {
        // NaN or unparsable: only `!=` holds
        return op == CompareOp::Ne;
    };
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}
