use crate::compiler::ir::{Axis, NodeTest};
use crate::engine::axes::{AxisIter, navigate};
use crate::model::{NodeIdentity, NodeKind, XdmNode};
use core::fmt;

/// Atomic values produced by the expression set in this crate.
#[derive(Debug, Clone, PartialEq)]
pub enum XdmAtomicValue {
    Boolean(bool),
    String(String),
    Integer(i64),
    Double(f64),
    UntypedAtomic(String),
}

impl XdmAtomicValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, XdmAtomicValue::Integer(_) | XdmAtomicValue::Double(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            XdmAtomicValue::Integer(i) => Some(*i as f64),
            XdmAtomicValue::Double(d) => Some(*d),
            XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::String(s) => s.trim().parse().ok(),
            XdmAtomicValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        }
    }

    /// Lexical form, as returned by `fn:string`.
    pub fn lexical(&self) -> String {
        match self {
            XdmAtomicValue::Boolean(b) => b.to_string(),
            XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) => s.clone(),
            XdmAtomicValue::Integer(i) => i.to_string(),
            XdmAtomicValue::Double(d) => d.to_string(),
        }
    }
}

impl fmt::Display for XdmAtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmAtomicValue::Boolean(b) => write!(f, "{b}"),
            XdmAtomicValue::String(s) => write!(f, "\"{s}\""),
            XdmAtomicValue::UntypedAtomic(s) => f.write_str(s),
            XdmAtomicValue::Integer(i) => write!(f, "{i}"),
            XdmAtomicValue::Double(d) => write!(f, "{d:e}"),
        }
    }
}

/// Dynamic type of a runtime item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Node(NodeKind),
    Atomic,
}

impl ItemType {
    pub fn is_document(self) -> bool {
        self == ItemType::Node(NodeKind::Document)
    }
}

pub type XdmSequence<N> = Vec<XdmItem<N>>;

#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem<N> {
    Node(N),
    Atomic(XdmAtomicValue),
}

impl<N: XdmNode> XdmItem<N> {
    pub fn is_node(&self) -> bool {
        matches!(self, XdmItem::Node(_))
    }

    pub fn as_node(&self) -> Option<&N> {
        match self {
            XdmItem::Node(n) => Some(n),
            XdmItem::Atomic(_) => None,
        }
    }

    pub fn dynamic_type(&self) -> ItemType {
        match self {
            XdmItem::Node(n) => ItemType::Node(n.kind()),
            XdmItem::Atomic(_) => ItemType::Atomic,
        }
    }

    /// Reference identity; atomic values have none.
    pub fn identity(&self) -> Option<NodeIdentity> {
        self.as_node().map(XdmNode::identity)
    }

    /// Atomizes the item: nodes yield their string value as untyped atomic data.
    pub fn atomize(&self) -> XdmAtomicValue {
        match self {
            XdmItem::Node(n) => XdmAtomicValue::UntypedAtomic(n.string_value()),
            XdmItem::Atomic(a) => a.clone(),
        }
    }
}

impl<N> From<XdmAtomicValue> for XdmItem<N> {
    fn from(a: XdmAtomicValue) -> Self {
        XdmItem::Atomic(a)
    }
}

impl<N> fmt::Display for XdmItem<N>
where
    N: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmItem::Node(_) => write!(f, "<node>"),
            XdmItem::Atomic(a) => write!(f, "{a}"),
        }
    }
}

/// A sequence that can be iterated any number of times.
///
/// `Axis` streams are produced by single-step plans: every call to [`XdmSequenceStream::iter`]
/// restarts the navigation from the stored context node, so nothing is buffered.
#[derive(Debug, Clone)]
pub enum XdmSequenceStream<N> {
    Materialized(XdmSequence<N>),
    Axis { origin: N, axis: Axis, test: NodeTest },
}

impl<N> Default for XdmSequenceStream<N> {
    fn default() -> Self {
        XdmSequenceStream::Materialized(Vec::new())
    }
}

impl<N: XdmNode> XdmSequenceStream<N> {
    pub fn from_vec(seq: XdmSequence<N>) -> Self {
        XdmSequenceStream::Materialized(seq)
    }

    pub fn iter(&self) -> StreamIter<'_, N> {
        match self {
            XdmSequenceStream::Materialized(v) => StreamIter::Materialized(v.iter()),
            XdmSequenceStream::Axis { origin, axis, test } => {
                StreamIter::Axis(navigate(*axis, origin.clone(), test))
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            XdmSequenceStream::Materialized(v) => v.len(),
            XdmSequenceStream::Axis { .. } => self.iter().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn materialize(self) -> XdmSequence<N> {
        match self {
            XdmSequenceStream::Materialized(v) => v,
            stream @ XdmSequenceStream::Axis { .. } => stream.iter().collect(),
        }
    }
}

pub enum StreamIter<'a, N: XdmNode> {
    Materialized(std::slice::Iter<'a, XdmItem<N>>),
    Axis(AxisIter<'a, N>),
}

impl<'a, N: XdmNode> Iterator for StreamIter<'a, N> {
    type Item = XdmItem<N>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            StreamIter::Materialized(it) => it.next().cloned(),
            StreamIter::Axis(it) => it.next().map(XdmItem::Node),
        }
    }
}
