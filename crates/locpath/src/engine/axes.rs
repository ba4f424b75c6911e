//! Axis navigation over any [`XdmNode`].
//!
//! [`navigate`] yields the nodes on an axis that pass a node test, in axis order: forward axes in
//! document order, reverse axes (`parent`, `ancestor*`, `preceding*`) nearest node first. The
//! descendant and following axes are walked incrementally with an explicit pre-order stack, so
//! consumers that stop early never visit the rest of the tree.
use crate::compiler::ir::{Axis, NodeTest};
use crate::model::{NodeKind, XdmNode};
use smallvec::SmallVec;

pub struct AxisIter<'a, N: XdmNode> {
    axis: Axis,
    test: &'a NodeTest,
    state: AxisState<N>,
}

enum AxisState<N> {
    Buffered(std::vec::IntoIter<N>),
    /// Pre-order walk; the stack holds pending subtree roots, next node on top.
    PreOrder { stack: Vec<N> },
    /// Pre-order walk of everything after `climb` in document order, excluding its descendants.
    Following { stack: Vec<N>, climb: Option<N> },
}

pub fn navigate<N: XdmNode>(axis: Axis, node: N, test: &NodeTest) -> AxisIter<'_, N> {
    let state = match axis {
        Axis::SelfAxis => AxisState::Buffered(vec![node].into_iter()),
        Axis::Child => AxisState::Buffered(node.children().collect::<Vec<_>>().into_iter()),
        Axis::Attribute => AxisState::Buffered(node.attributes().collect::<Vec<_>>().into_iter()),
        Axis::Parent => AxisState::Buffered(node.parent().into_iter().collect::<Vec<_>>().into_iter()),
        Axis::Descendant => {
            let mut stack = Vec::new();
            push_children_reversed(&node, &mut stack);
            AxisState::PreOrder { stack }
        }
        Axis::DescendantOrSelf => AxisState::PreOrder { stack: vec![node] },
        Axis::Ancestor => AxisState::Buffered(ancestors(&node).into_iter()),
        Axis::AncestorOrSelf => {
            let mut v = vec![node.clone()];
            v.extend(ancestors(&node));
            AxisState::Buffered(v.into_iter())
        }
        Axis::FollowingSibling => AxisState::Buffered(siblings(&node, false).into_iter()),
        Axis::PrecedingSibling => AxisState::Buffered(siblings(&node, true).into_iter()),
        Axis::Following => {
            let mut stack = Vec::new();
            if node.kind() == NodeKind::Attribute {
                // an attribute precedes the children of its owner element
                if let Some(owner) = node.parent() {
                    push_children_reversed(&owner, &mut stack);
                    return AxisIter { axis, test, state: AxisState::Following { stack, climb: Some(owner) } };
                }
                AxisState::Following { stack, climb: None }
            } else {
                let mut sibs = siblings(&node, false);
                sibs.reverse();
                stack.extend(sibs);
                AxisState::Following { stack, climb: Some(node) }
            }
        }
        Axis::Preceding => AxisState::Buffered(preceding(&node).into_iter()),
    };
    AxisIter { axis, test, state }
}

fn push_children_reversed<N: XdmNode>(node: &N, stack: &mut Vec<N>) {
    let kids: SmallVec<[N; 16]> = node.children().collect();
    stack.extend(kids.into_iter().rev());
}

fn ancestors<N: XdmNode>(node: &N) -> Vec<N> {
    let mut out = Vec::new();
    let mut cur = node.parent();
    while let Some(p) = cur {
        cur = p.parent();
        out.push(p);
    }
    out
}

/// Siblings after (`preceding == false`, document order) or before (`true`, nearest first).
fn siblings<N: XdmNode>(node: &N, preceding: bool) -> Vec<N> {
    if matches!(node.kind(), NodeKind::Attribute | NodeKind::Namespace) {
        return Vec::new();
    }
    let Some(parent) = node.parent() else {
        return Vec::new();
    };
    let id = node.identity();
    let all: Vec<N> = parent.children().collect();
    let Some(pos) = all.iter().position(|n| n.identity() == id) else {
        return Vec::new();
    };
    if preceding {
        all[..pos].iter().rev().cloned().collect()
    } else {
        all[pos + 1..].to_vec()
    }
}

/// Nodes before `node` in document order that are not its ancestors, nearest first.
fn preceding<N: XdmNode>(node: &N) -> Vec<N> {
    // for attributes the owner element is the anchor (and is an ancestor, so excluded)
    let anchor = if node.kind() == NodeKind::Attribute { node.parent() } else { Some(node.clone()) };
    let Some(anchor) = anchor else {
        return Vec::new();
    };
    let mut excluded: Vec<_> = ancestors(&anchor).iter().map(XdmNode::identity).collect();
    if node.kind() == NodeKind::Attribute {
        excluded.push(anchor.identity());
    }
    let target = anchor.identity();
    let mut out = Vec::new();
    let mut stack = vec![anchor.root()];
    while let Some(n) = stack.pop() {
        if n.identity() == target {
            break;
        }
        if !excluded.contains(&n.identity()) {
            out.push(n.clone());
        }
        push_children_reversed(&n, &mut stack);
    }
    out.reverse();
    out
}

impl<N: XdmNode> AxisIter<'_, N> {
    fn next_candidate(&mut self) -> Option<N> {
        match &mut self.state {
            AxisState::Buffered(it) => it.next(),
            AxisState::PreOrder { stack } => {
                let n = stack.pop()?;
                push_children_reversed(&n, stack);
                Some(n)
            }
            AxisState::Following { stack, climb } => loop {
                if let Some(n) = stack.pop() {
                    push_children_reversed(&n, stack);
                    return Some(n);
                }
                let parent = climb.take()?.parent()?;
                let mut sibs = siblings(&parent, false);
                sibs.reverse();
                stack.extend(sibs);
                *climb = Some(parent);
            },
        }
    }
}

impl<N: XdmNode> Iterator for AxisIter<'_, N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        while let Some(n) = self.next_candidate() {
            if self.test.matches(&n, self.axis) {
                return Some(n);
            }
        }
        None
    }
}
