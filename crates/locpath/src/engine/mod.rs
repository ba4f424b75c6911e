pub mod axes;
pub mod builder;
pub mod evaluator;
pub mod runtime;
