use crate::engine::runtime::{Error, ErrorCode};
use crate::model::{NodeKind, QName, XdmNode};
use crate::path::PathPlan;
use crate::xdm::XdmAtomicValue;
use compact_str::CompactString;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Attribute,
    SelfAxis,
    DescendantOrSelf,
    Descendant,
    Parent,
    Ancestor,
    AncestorOrSelf,
    PrecedingSibling,
    FollowingSibling,
    Preceding,
    Following,
}

impl Axis {
    /// Reverse axes yield nodes in reverse document order.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }

    /// Node kind matched by name tests and `*` on this axis.
    pub fn principal_kind(self) -> NodeKind {
        match self {
            Axis::Attribute => NodeKind::Attribute,
            _ => NodeKind::Element,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Descendant => "descendant",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::FollowingSibling => "following-sibling",
            Axis::Preceding => "preceding",
            Axis::Following => "following",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    AnyKind,     // node()
    Name(QName), // QName, principal node kind of the axis
    Wildcard,    // *
    Text,
    Comment,
    ProcessingInstruction(Option<CompactString>),
    Document,
    Element(Option<QName>),
    Attribute(Option<QName>),
}

impl NodeTest {
    pub fn name(local: &str) -> Self {
        NodeTest::Name(QName::local(local))
    }

    /// `node()` matches every node on every axis.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, NodeTest::AnyKind)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, NodeTest::Text)
    }

    pub fn qname(&self) -> Option<&QName> {
        match self {
            NodeTest::Name(q) => Some(q),
            _ => None,
        }
    }

    /// Node kind every match of this test has, if the test pins one.
    pub fn kind(&self, axis: Axis) -> Option<NodeKind> {
        match self {
            NodeTest::AnyKind => None,
            NodeTest::Name(_) | NodeTest::Wildcard => Some(axis.principal_kind()),
            NodeTest::Text => Some(NodeKind::Text),
            NodeTest::Comment => Some(NodeKind::Comment),
            NodeTest::ProcessingInstruction(_) => Some(NodeKind::ProcessingInstruction),
            NodeTest::Document => Some(NodeKind::Document),
            NodeTest::Element(_) => Some(NodeKind::Element),
            NodeTest::Attribute(_) => Some(NodeKind::Attribute),
        }
    }

    pub fn matches<N: XdmNode>(&self, node: &N, axis: Axis) -> bool {
        let name_is = |q: &QName| node.name().is_some_and(|n| n == *q);
        match self {
            NodeTest::AnyKind => true,
            NodeTest::Name(q) => node.kind() == axis.principal_kind() && name_is(q),
            NodeTest::Wildcard => node.kind() == axis.principal_kind(),
            NodeTest::Text => node.kind() == NodeKind::Text,
            NodeTest::Comment => node.kind() == NodeKind::Comment,
            NodeTest::ProcessingInstruction(target) => {
                node.kind() == NodeKind::ProcessingInstruction
                    && target.as_ref().is_none_or(|t| node.name().is_some_and(|n| n.local == *t))
            }
            NodeTest::Document => node.kind() == NodeKind::Document,
            NodeTest::Element(q) => node.kind() == NodeKind::Element && q.as_ref().is_none_or(name_is),
            NodeTest::Attribute(q) => node.kind() == NodeKind::Attribute && q.as_ref().is_none_or(name_is),
        }
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::AnyKind => f.write_str("node()"),
            NodeTest::Name(q) => write!(f, "{q}"),
            NodeTest::Wildcard => f.write_str("*"),
            NodeTest::Text => f.write_str("text()"),
            NodeTest::Comment => f.write_str("comment()"),
            NodeTest::ProcessingInstruction(None) => f.write_str("processing-instruction()"),
            NodeTest::ProcessingInstruction(Some(t)) => write!(f, "processing-instruction({t})"),
            NodeTest::Document => f.write_str("document-node()"),
            NodeTest::Element(None) => f.write_str("element()"),
            NodeTest::Element(Some(q)) => write!(f, "element({q})"),
            NodeTest::Attribute(None) => f.write_str("attribute()"),
            NodeTest::Attribute(Some(q)) => write!(f, "attribute({q})"),
        }
    }
}

/// Dynamic features an expression may read from its evaluation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    ContextItem,
    Position,
    Variable,
}

#[derive(Debug, Clone)]
pub struct Step<N> {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr<N>>,
}

impl<N: XdmNode> Step<N> {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self { axis, test, predicates: Vec::new() }
    }

    #[must_use]
    pub fn with_predicate(mut self, predicate: Expr<N>) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// True for `axis::node()` without predicates.
    pub fn is_trivial(&self, axis: Axis) -> bool {
        self.axis == axis && self.test.is_wildcard() && self.predicates.is_empty()
    }

    /// A predicate observes positions when it reads `position()`/`last()` or may evaluate to a
    /// number (numeric predicates select by position).
    pub fn is_positional(&self) -> bool {
        self.predicates.iter().any(|p| p.depends_on(Dependency::Position) || p.may_be_numeric())
    }

    pub fn depends_on(&self, dep: Dependency) -> bool {
        match dep {
            Dependency::ContextItem => true,
            Dependency::Position => self.is_positional(),
            Dependency::Variable => self.predicates.iter().any(|p| p.depends_on(dep)),
        }
    }

    pub fn static_kind(&self) -> Option<NodeKind> {
        match self.axis {
            Axis::Attribute => Some(NodeKind::Attribute),
            axis => self.test.kind(axis),
        }
    }
}

impl<N: XdmNode> fmt::Display for Step<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.axis, self.test)?;
        for p in &self.predicates {
            write!(f, "[{p}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

/// Built-in functions understood by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Count,
    Exists,
    Empty,
    Not,
    Boolean,
    String,
    Name,
    LocalName,
}

impl Function {
    pub fn resolve(name: &str, arity: usize) -> Result<Self, Error> {
        let f = match name {
            "count" => Function::Count,
            "exists" => Function::Exists,
            "empty" => Function::Empty,
            "not" => Function::Not,
            "boolean" => Function::Boolean,
            "string" => Function::String,
            "name" => Function::Name,
            "local-name" => Function::LocalName,
            _ => return Err(Error::from_code(ErrorCode::XPST0017, format!("unknown function {name}#{arity}"))),
        };
        let (min, max) = f.arity();
        if arity < min || arity > max {
            return Err(Error::from_code(
                ErrorCode::XPST0017,
                format!("function {name} expects {min}..={max} arguments, got {arity}"),
            ));
        }
        Ok(f)
    }

    pub fn arity(self) -> (usize, usize) {
        match self {
            Function::String | Function::Name | Function::LocalName => (0, 1),
            _ => (1, 1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Function::Count => "count",
            Function::Exists => "exists",
            Function::Empty => "empty",
            Function::Not => "not",
            Function::Boolean => "boolean",
            Function::String => "string",
            Function::Name => "name",
            Function::LocalName => "local-name",
        }
    }
}

/// Expression tree consumed and produced by the path compiler.
#[derive(Debug, Clone)]
pub enum Expr<N> {
    /// `.`
    ContextItem,
    /// `/`: root of the tree containing the context node, which must be a document node.
    Root,
    Literal(XdmAtomicValue),
    /// A node supplied by the host, e.g. an opened document.
    Node(N),
    Variable(QName),
    Position,
    Last,
    Sequence(Vec<Expr<N>>),
    Compare { op: CompareOp, left: Box<Expr<N>>, right: Box<Expr<N>> },
    Call { function: Function, args: Vec<Expr<N>> },
    Step(Step<N>),
    Path(Box<PathPlan<N>>),
}

impl<N: XdmNode> Expr<N> {
    pub fn step(axis: Axis, test: NodeTest) -> Self {
        Expr::Step(Step::new(axis, test))
    }

    pub fn string(s: &str) -> Self {
        Expr::Literal(XdmAtomicValue::String(s.to_string()))
    }

    pub fn integer(i: i64) -> Self {
        Expr::Literal(XdmAtomicValue::Integer(i))
    }

    pub fn variable(local: &str) -> Self {
        Expr::Variable(QName::local(local))
    }

    pub fn compare(op: CompareOp, left: Expr<N>, right: Expr<N>) -> Self {
        Expr::Compare { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn call(name: &str, args: Vec<Expr<N>>) -> Result<Self, Error> {
        let function = Function::resolve(name, args.len())?;
        Ok(Expr::Call { function, args })
    }

    pub fn as_step(&self) -> Option<&Step<N>> {
        match self {
            Expr::Step(s) => Some(s),
            _ => None,
        }
    }

    pub fn depends_on(&self, dep: Dependency) -> bool {
        match self {
            Expr::ContextItem | Expr::Root => dep == Dependency::ContextItem,
            Expr::Literal(_) | Expr::Node(_) => false,
            Expr::Variable(_) => dep == Dependency::Variable,
            Expr::Position | Expr::Last => dep == Dependency::Position,
            Expr::Sequence(items) => items.iter().any(|e| e.depends_on(dep)),
            Expr::Compare { left, right, .. } => left.depends_on(dep) || right.depends_on(dep),
            Expr::Call { function, args } => {
                let implicit_context = args.is_empty()
                    && matches!(function, Function::String | Function::Name | Function::LocalName);
                (implicit_context && dep == Dependency::ContextItem) || args.iter().any(|e| e.depends_on(dep))
            }
            Expr::Step(s) => s.depends_on(dep),
            Expr::Path(p) => p.depends_on(dep),
        }
    }

    /// Conservative: `true` whenever the value could be numeric at runtime.
    pub fn may_be_numeric(&self) -> bool {
        match self {
            Expr::Literal(a) => a.is_numeric(),
            Expr::Position | Expr::Last | Expr::Variable(_) => true,
            Expr::Call { function, .. } => *function == Function::Count,
            Expr::Sequence(items) => items.iter().any(Expr::may_be_numeric),
            // a path yields whatever its last pipeline element yields
            Expr::Path(plan) => match plan.as_ref() {
                PathPlan::Generic(p) => p.pipeline().last().is_some_and(Expr::may_be_numeric),
                PathPlan::SingleStep(_) => false,
            },
            _ => false,
        }
    }

    /// Node kind of every item this expression yields, when statically known.
    pub fn static_kind(&self) -> Option<NodeKind> {
        match self {
            Expr::Root => Some(NodeKind::Document),
            Expr::Node(n) => Some(n.kind()),
            Expr::Step(s) => s.static_kind(),
            Expr::Path(p) => p.static_kind(),
            _ => None,
        }
    }
}

impl<N: XdmNode> From<Step<N>> for Expr<N> {
    fn from(s: Step<N>) -> Self {
        Expr::Step(s)
    }
}

impl<N: XdmNode> fmt::Display for Expr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::ContextItem => f.write_str("."),
            Expr::Root => f.write_str("/"),
            Expr::Literal(a) => write!(f, "{a}"),
            Expr::Node(n) => write!(f, "{{{:?} node}}", n.kind()),
            Expr::Variable(q) => write!(f, "${q}"),
            Expr::Position => f.write_str("position()"),
            Expr::Last => f.write_str("last()"),
            Expr::Sequence(items) => {
                f.write_str("(")?;
                for (i, e) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str(")")
            }
            Expr::Compare { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::Call { function, args } => {
                write!(f, "{}(", function.as_str())?;
                for (i, e) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str(")")
            }
            Expr::Step(s) => write!(f, "{s}"),
            Expr::Path(p) => write!(f, "{p}"),
        }
    }
}
