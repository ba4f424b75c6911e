use crate::engine::runtime::Error;
use crate::model::{NodeIdentity, XdmNode};
use crate::xdm::{XdmItem, XdmSequence};
use core::cmp::Ordering;
use std::collections::HashSet;

/// Collects nodes, dropping repeated identities, and returns them in document order.
pub struct NodeBuilder<N> {
    nodes: Vec<N>,
    seen: HashSet<NodeIdentity>,
}

impl<N: XdmNode> Default for NodeBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode> NodeBuilder<N> {
    pub fn new() -> Self {
        Self { nodes: Vec::new(), seen: HashSet::new() }
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { nodes: Vec::with_capacity(n), seen: HashSet::with_capacity(n) }
    }

    pub fn add(&mut self, node: N) {
        if self.seen.insert(node.identity()) {
            self.nodes.push(node);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn finish(mut self) -> Result<XdmSequence<N>, Error> {
        let mut failure = None;
        self.nodes.sort_by(|a, b| {
            a.compare_document_order(b).unwrap_or_else(|e| {
                failure.get_or_insert(e);
                Ordering::Equal
            })
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(self.nodes.into_iter().map(XdmItem::Node).collect()),
        }
    }
}

/// Concatenates sequences of arbitrary items; no ordering or deduplication.
pub struct SequenceBuilder<N> {
    items: XdmSequence<N>,
}

impl<N> Default for SequenceBuilder<N> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<N> SequenceBuilder<N> {
    pub fn add_all(&mut self, seq: XdmSequence<N>) {
        if self.items.is_empty() {
            self.items = seq;
        } else {
            self.items.extend(seq);
        }
    }

    pub fn finish(self) -> XdmSequence<N> {
        self.items
    }
}
