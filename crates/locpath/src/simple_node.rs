//! Simple in-memory tree implementation of `XdmNode`, used in tests, benches and demos.
//!
//! - Builder API for concise tree creation
//! - Node identity is the address of the shared node record, so clones of a node are the same
//!   node while two separately built trees never share identities
//!
//! Example:
//! ```
//! use locpath::simple_node::{attr, doc, elem, text};
//! use locpath::XdmNode;
//!
//! // <root id="r"><child>Hello</child><child world="yes"/></root>
//! let document = doc()
//!     .child(
//!         elem("root")
//!             .attr(attr("id", "r"))
//!             .child(elem("child").child(text("Hello")))
//!             .child(elem("child").attr(attr("world", "yes"))),
//!     )
//!     .build();
//!
//! let root = document.children().next().unwrap();
//! assert_eq!(root.name().unwrap().local.as_str(), "root");
//! assert_eq!(root.children().count(), 2);
//! assert_eq!(document.string_value(), "Hello");
//! ```
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::model::{NodeIdentity, NodeKind, QName, XdmNode};

struct Inner {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    parent: OnceLock<Weak<Inner>>,
    attributes: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
}

/// A simple Arc-backed node.
#[derive(Clone)]
pub struct SimpleNode(Arc<Inner>);

impl PartialEq for SimpleNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for SimpleNode {}

impl std::hash::Hash for SimpleNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleNode")
            .field("kind", &self.0.kind)
            .field("name", &self.0.name)
            .field("value", &self.0.value)
            .finish()
    }
}

impl SimpleNode {
    fn leaf(kind: NodeKind, name: Option<QName>, value: &str) -> Self {
        SimpleNode(Arc::new(Inner {
            kind,
            name,
            value: Some(value.to_string()),
            parent: OnceLock::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }))
    }

    pub fn document() -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Document, None)
    }
    pub fn element(name: &str) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(QName::local(name)))
    }
    pub fn attribute(name: &str, value: &str) -> SimpleNode {
        SimpleNode::leaf(NodeKind::Attribute, Some(QName::local(name)), value)
    }
    pub fn text(value: &str) -> SimpleNode {
        SimpleNode::leaf(NodeKind::Text, None, value)
    }
    pub fn comment(value: &str) -> SimpleNode {
        SimpleNode::leaf(NodeKind::Comment, None, value)
    }
    pub fn pi(target: &str, data: &str) -> SimpleNode {
        SimpleNode::leaf(NodeKind::ProcessingInstruction, Some(QName::local(target)), data)
    }
}

pub struct SimpleNodeBuilder {
    kind: NodeKind,
    name: Option<QName>,
    pending_children: Vec<SimpleNode>,
    pending_attrs: Vec<SimpleNode>,
}

impl SimpleNodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>) -> Self {
        Self { kind, name, pending_children: Vec::new(), pending_attrs: Vec::new() }
    }

    /// Element in a namespace; the prefix is kept for display only.
    pub fn ns(mut self, ns_uri: &str, prefix: Option<&str>) -> Self {
        if let Some(name) = self.name.take() {
            self.name = Some(QName::with_ns(ns_uri, prefix, &name.local));
        }
        self
    }

    pub fn child(mut self, child: impl Into<SimpleNodeOrBuilder>) -> Self {
        self.pending_children.push(child.into().finish());
        self
    }

    pub fn children<I: IntoIterator<Item = SimpleNodeOrBuilder>>(mut self, it: I) -> Self {
        self.pending_children.extend(it.into_iter().map(SimpleNodeOrBuilder::finish));
        self
    }

    pub fn attr(mut self, attr: SimpleNode) -> Self {
        debug_assert!(attr.kind() == NodeKind::Attribute);
        self.pending_attrs.push(attr);
        self
    }

    pub fn build(self) -> SimpleNode {
        let Self { kind, name, pending_children, pending_attrs } = self;
        let inner = Arc::new_cyclic(|me: &Weak<Inner>| {
            for n in pending_attrs.iter().chain(pending_children.iter()) {
                // A node adopted twice keeps its first parent.
                let _ = n.0.parent.set(me.clone());
            }
            Inner {
                kind,
                name,
                value: None,
                parent: OnceLock::new(),
                attributes: pending_attrs,
                children: pending_children,
            }
        });
        SimpleNode(inner)
    }
}

pub enum SimpleNodeOrBuilder {
    Built(SimpleNode),
    Builder(SimpleNodeBuilder),
}

impl SimpleNodeOrBuilder {
    fn finish(self) -> SimpleNode {
        match self {
            SimpleNodeOrBuilder::Built(n) => n,
            SimpleNodeOrBuilder::Builder(b) => b.build(),
        }
    }
}

impl From<SimpleNode> for SimpleNodeOrBuilder {
    fn from(n: SimpleNode) -> Self {
        SimpleNodeOrBuilder::Built(n)
    }
}
impl From<SimpleNodeBuilder> for SimpleNodeOrBuilder {
    fn from(b: SimpleNodeBuilder) -> Self {
        SimpleNodeOrBuilder::Builder(b)
    }
}

// Convenience helpers for concise test code
pub fn elem(name: &str) -> SimpleNodeBuilder {
    SimpleNode::element(name)
}
pub fn text(v: &str) -> SimpleNode {
    SimpleNode::text(v)
}
pub fn attr(name: &str, v: &str) -> SimpleNode {
    SimpleNode::attribute(name, v)
}
pub fn comment(v: &str) -> SimpleNode {
    SimpleNode::comment(v)
}
pub fn doc() -> SimpleNodeBuilder {
    SimpleNode::document()
}

impl XdmNode for SimpleNode {
    type Children<'a> = std::iter::Cloned<std::slice::Iter<'a, SimpleNode>>;
    type Attributes<'a> = std::iter::Cloned<std::slice::Iter<'a, SimpleNode>>;

    fn kind(&self) -> NodeKind {
        self.0.kind
    }

    fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }

    fn string_value(&self) -> String {
        match self.0.kind {
            NodeKind::Element | NodeKind::Document => {
                fn dfs(n: &SimpleNode, out: &mut String) {
                    for c in &n.0.children {
                        match c.0.kind {
                            NodeKind::Text => out.push_str(c.0.value.as_deref().unwrap_or_default()),
                            NodeKind::Element => dfs(c, out),
                            _ => {}
                        }
                    }
                }
                let mut out = String::new();
                dfs(self, &mut out);
                out
            }
            _ => self.0.value.clone().unwrap_or_default(),
        }
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.get().and_then(Weak::upgrade).map(SimpleNode)
    }

    fn children(&self) -> Self::Children<'_> {
        self.0.children.iter().cloned()
    }

    fn attributes(&self) -> Self::Attributes<'_> {
        self.0.attributes.iter().cloned()
    }

    fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(Arc::as_ptr(&self.0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn attributes_precede_children_in_document_order() {
        let r = elem("r").attr(attr("a", "1")).child(elem("c")).build();
        let a = r.attributes().next().unwrap();
        let c = r.children().next().unwrap();
        assert_eq!(a.compare_document_order(&c).unwrap(), core::cmp::Ordering::Less);
        assert_eq!(c.compare_document_order(&r).unwrap(), core::cmp::Ordering::Greater);
    }

    #[rstest]
    fn separate_trees_have_distinct_identities() {
        let a = doc().child(elem("x")).build();
        let b = doc().child(elem("x")).build();
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), a.clone().identity());
        assert!(a.compare_document_order(&b).is_err());
    }

    #[rstest]
    fn parent_links_point_to_builder_node() {
        let d = doc().child(elem("root").child(text("t"))).build();
        let root = d.children().next().unwrap();
        let t = root.children().next().unwrap();
        assert_eq!(t.parent().unwrap(), root);
        assert_eq!(t.root(), d);
    }
}
