pub mod compiler;
pub mod engine;
pub mod model;
pub mod path;
pub mod simple_node;
pub mod xdm;

pub use compiler::compile_path;
pub use compiler::ir::{Axis, CompareOp, Dependency, Expr, Function, NodeTest, Step};
pub use engine::evaluator::evaluate;
pub use engine::runtime::{
    DynamicContext, DynamicContextBuilder, Error, ErrorCode, EvalStats, StaticContext, StaticContextBuilder,
};
pub use model::{NodeKind, QName, XdmNode};
pub use path::{Path, PathPlan, SingleStepPath};
pub use simple_node::{SimpleNode, SimpleNodeBuilder, attr, comment, doc as simple_doc, elem, text};
pub use xdm::{XdmAtomicValue, XdmItem, XdmSequence, XdmSequenceStream};
