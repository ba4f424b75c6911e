use crate::engine::runtime::{Error, ErrorCode};
use compact_str::CompactString;
use core::cmp::Ordering;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

#[derive(Debug, Clone, Eq)]
pub struct QName {
    pub prefix: Option<CompactString>,
    pub local: CompactString,
    pub ns_uri: Option<CompactString>,
}

impl QName {
    pub fn local(local: &str) -> Self {
        Self { prefix: None, local: CompactString::from(local), ns_uri: None }
    }

    pub fn with_ns(ns_uri: &str, prefix: Option<&str>, local: &str) -> Self {
        Self {
            prefix: prefix.map(CompactString::from),
            local: CompactString::from(local),
            ns_uri: Some(CompactString::from(ns_uri)),
        }
    }
}

// Prefixes are lexical sugar: two names are the same name when URI and local part agree.
impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.ns_uri == other.ns_uri
    }
}

impl core::hash::Hash for QName {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.local.hash(state);
        self.ns_uri.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.prefix, &self.ns_uri) {
            (Some(p), _) => write!(f, "{p}:{}", self.local),
            (None, Some(ns)) if !ns.is_empty() => write!(f, "Q{{{ns}}}{}", self.local),
            _ => f.write_str(&self.local),
        }
    }
}

/// Opaque handle identifying one node instance.
///
/// Two handles compare equal only when they were obtained from the very same node; structurally
/// identical nodes in different trees have different identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentity(usize);

impl NodeIdentity {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }
}

/// Compare two nodes by ancestry and stable sibling order (fallback algorithm).
///
/// - If one node is an ancestor of the other, the ancestor precedes the descendant.
/// - Among siblings, attributes come first, then child nodes; within each group the order
///   provided by the adapter is preserved.
/// - If the nodes belong to different roots, returns an error (`err:FOER0000`) because the
///   fallback cannot establish a global order. Adapters with multi-root trees must override
///   `XdmNode::compare_document_order`.
pub fn try_compare_by_ancestry<N: XdmNode>(a: &N, b: &N) -> Result<Ordering, Error> {
    if a.identity() == b.identity() {
        return Ok(Ordering::Equal);
    }
    fn path_to_root<N: XdmNode>(mut n: N) -> Vec<N> {
        let mut p = vec![n.clone()];
        while let Some(parent) = n.parent() {
            p.push(parent.clone());
            n = parent;
        }
        p.reverse();
        p
    }
    let pa = path_to_root(a.clone());
    let pb = path_to_root(b.clone());
    let len = pa.len().min(pb.len());
    let mut i = 0usize;
    while i < len && pa[i].identity() == pb[i].identity() {
        i += 1;
    }
    if i == len {
        // shorter path is the ancestor
        return Ok(pa.len().cmp(&pb.len()));
    }
    if i == 0 {
        return Err(Error::from_code(
            ErrorCode::FOER0000,
            "document order requires adapter: nodes from different roots",
        ));
    }
    let parent = &pa[i - 1];
    let (na, nb) = (pa[i].identity(), pb[i].identity());
    let position = |id: NodeIdentity| {
        parent.attributes().chain(parent.children()).position(|n| n.identity() == id)
    };
    Ok(match (position(na), position(nb)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    })
}

/// Read-only view of a tree node.
///
/// Navigation along the XPath axes is derived from `parent`, `children` and `attributes`
/// (see [`crate::engine::axes`]); adapters only provide the structural primitives.
pub trait XdmNode: Clone + Eq + fmt::Debug + 'static {
    type Children<'a>: Iterator<Item = Self> + 'a
    where
        Self: 'a;
    type Attributes<'a>: Iterator<Item = Self> + 'a
    where
        Self: 'a;

    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<QName>;
    fn string_value(&self) -> String;

    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Self::Children<'_>;
    fn attributes(&self) -> Self::Attributes<'_>;

    /// Reference identity of this node. Must be stable for the lifetime of the node and distinct
    /// from the identity of every other live node.
    fn identity(&self) -> NodeIdentity;

    /// Default document order comparison uses ancestry and sibling order.
    fn compare_document_order(&self, other: &Self) -> Result<Ordering, Error> {
        try_compare_by_ancestry(self, other)
    }

    fn root(&self) -> Self {
        let mut cur = self.clone();
        while let Some(p) = cur.parent() {
            cur = p;
        }
        cur
    }
}
