use crate::model::{QName, XdmNode};
use crate::xdm::{XdmItem, XdmSequence};
use core::fmt;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

/// Error codes raised by path compilation and evaluation (W3C xqt-errors naming).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FOER0000, // generic error: cancellation, unordered roots
    FORG0006, // invalid argument type
    XPST0003, // malformed expression tree
    XPDY0002, // context item undefined
    XPDY0050, // root of the context node is not a document node
    XPST0005, // static conflict: step can never match
    XPST0008, // undeclared variable
    XPST0017, // unknown function or wrong arity
    XPTY0004, // type error
    XPTY0018, // final path result mixes nodes and atomic values
    XPTY0019, // path step evaluated against a non-node context item
    XPTY0020, // axis step with an atomic context item
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::FORG0006 => "FORG0006",
            ErrorCode::XPST0003 => "XPST0003",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::XPDY0050 => "XPDY0050",
            ErrorCode::XPST0005 => "XPST0005",
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XPST0017 => "XPST0017",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPTY0018 => "XPTY0018",
            ErrorCode::XPTY0019 => "XPTY0019",
            ErrorCode::XPTY0020 => "XPTY0020",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        let local = s.strip_prefix("err:").unwrap_or(s);
        Some(match local {
            "FOER0000" => ErrorCode::FOER0000,
            "FORG0006" => ErrorCode::FORG0006,
            "XPDY0002" => ErrorCode::XPDY0002,
            "XPDY0050" => ErrorCode::XPDY0050,
            "XPST0005" => ErrorCode::XPST0005,
            "XPST0008" => ErrorCode::XPST0008,
            "XPST0017" => ErrorCode::XPST0017,
            "XPTY0004" => ErrorCode::XPTY0004,
            "XPTY0018" => ErrorCode::XPTY0018,
            "XPTY0019" => ErrorCode::XPTY0019,
            "XPTY0020" => ErrorCode::XPTY0020,
            "XPST0003" => ErrorCode::XPST0003,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "err:{}", self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>, // optional chained cause
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), source: None }
    }

    pub fn static_conflict(step: impl fmt::Display) -> Self {
        Self::from_code(ErrorCode::XPST0005, format!("step can never yield results: {step}"))
    }

    pub fn non_node_context(path: impl fmt::Display, found: impl fmt::Debug) -> Self {
        Self::from_code(ErrorCode::XPTY0019, format!("{path}: context item is not a node ({found:?})"))
    }

    pub fn mixed_result_type() -> Self {
        Self::from_code(ErrorCode::XPTY0018, "path result must not mix nodes and atomic values")
    }

    pub fn cancelled() -> Self {
        Self::from_code(ErrorCode::FOER0000, "evaluation cancelled")
    }

    pub fn is_static_conflict(&self) -> bool {
        self.code == ErrorCode::XPST0005
    }

    pub fn is_non_node_context(&self) -> bool {
        self.code == ErrorCode::XPTY0019
    }

    pub fn is_mixed_result_type(&self) -> bool {
        self.code == ErrorCode::XPTY0018
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.code)
    }
}

/// Compile-time settings. Captured by the compiler; the evaluator reads the decisions it baked
/// into the plan, never the settings themselves.
#[derive(Debug, Clone)]
pub struct StaticContext {
    /// Rewrite `descendant-or-self::node()/child::x` into `descendant::x`.
    pub merge_descendant_steps: bool,
    /// Replace a single predicate-free child/descendant step by a streaming plan.
    pub specialize_single_steps: bool,
    /// Memoize results of variable-free paths per document identity.
    pub cache_results: bool,
    /// Evaluate step-only pipelines by depth-first expansion instead of the general pipeline.
    pub steps_fast_path: bool,
}

impl Default for StaticContext {
    fn default() -> Self {
        Self { merge_descendant_steps: true, specialize_single_steps: true, cache_results: true, steps_fast_path: true }
    }
}

/// Builder for `StaticContext`.
#[derive(Default)]
pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merge_descendant_steps(mut self, on: bool) -> Self {
        self.ctx.merge_descendant_steps = on;
        self
    }

    pub fn with_single_step_specialization(mut self, on: bool) -> Self {
        self.ctx.specialize_single_steps = on;
        self
    }

    pub fn with_result_cache(mut self, on: bool) -> Self {
        self.ctx.cache_results = on;
        self
    }

    pub fn with_steps_fast_path(mut self, on: bool) -> Self {
        self.ctx.steps_fast_path = on;
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

/// The focus: context item, context size (`last()`) and context position (`position()`).
#[derive(Debug, Clone, PartialEq)]
pub struct Focus<N> {
    pub item: Option<XdmItem<N>>,
    pub size: usize,
    pub position: usize,
}

impl<N> Default for Focus<N> {
    fn default() -> Self {
        Self { item: None, size: 0, position: 0 }
    }
}

/// Counters describing the work done by evaluations against one context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Calls into the axis navigation primitive.
    pub navigations: u64,
    /// Finalizations of the deduplicating node builder.
    pub node_builds: u64,
    /// Path evaluations answered from the identity cache.
    pub cache_hits: u64,
}

pub struct DynamicContext<N> {
    pub focus: Focus<N>,
    pub variables: HashMap<QName, XdmSequence<N>>,
    pub cancel_flag: Option<Arc<AtomicBool>>,
    pub stats: EvalStats,
}

impl<N> Default for DynamicContext<N> {
    fn default() -> Self {
        Self { focus: Focus::default(), variables: HashMap::new(), cancel_flag: None, stats: EvalStats::default() }
    }
}

impl<N: XdmNode> DynamicContext<N> {
    pub fn variable(&self, name: &QName) -> Option<&XdmSequence<N>> {
        self.variables.get(name)
    }

    pub fn check_cancel(&self) -> Result<(), Error> {
        if self.cancel_flag.as_ref().is_some_and(|flag| flag.load(AtomicOrdering::Relaxed)) {
            return Err(Error::cancelled());
        }
        Ok(())
    }

    /// Saves the current focus; it is restored when the returned scope is dropped, on every
    /// exit path including `?` propagation.
    pub fn scoped_focus(&mut self) -> FocusScope<'_, N> {
        let saved = self.focus.clone();
        FocusScope { ctx: self, saved: Some(saved) }
    }
}

pub struct FocusScope<'a, N> {
    ctx: &'a mut DynamicContext<N>,
    saved: Option<Focus<N>>,
}

impl<N> FocusScope<'_, N> {
    pub fn set_item(&mut self, item: XdmItem<N>) {
        self.ctx.focus.item = Some(item);
    }

    pub fn set_focus(&mut self, item: XdmItem<N>, position: usize, size: usize) {
        self.ctx.focus = Focus { item: Some(item), size, position };
    }
}

impl<N> Deref for FocusScope<'_, N> {
    type Target = DynamicContext<N>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<N> DerefMut for FocusScope<'_, N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl<N> Drop for FocusScope<'_, N> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.ctx.focus = saved;
        }
    }
}

pub struct DynamicContextBuilder<N> {
    ctx: DynamicContext<N>,
}

impl<N: XdmNode> Default for DynamicContextBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode> DynamicContextBuilder<N> {
    pub fn new() -> Self {
        Self { ctx: DynamicContext::default() }
    }

    pub fn with_context_item(mut self, item: impl Into<XdmItem<N>>) -> Self {
        self.ctx.focus = Focus { item: Some(item.into()), size: 1, position: 1 };
        self
    }

    pub fn with_variable(mut self, name: QName, value: impl Into<XdmSequence<N>>) -> Self {
        self.ctx.variables.insert(name, value.into());
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.ctx.cancel_flag = Some(flag);
        self
    }

    pub fn build(self) -> DynamicContext<N> {
        self.ctx
    }
}
