// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod analyzer;
mod ast;
mod compiler;
mod fault;
mod governor;
mod lower;
mod pattern;
mod settings;
mod source;
mod types;

/// Shared-ownership alias. With the default `arc` feature, compiled
/// expressions are `Send + Sync` and may be executed concurrently.
#[cfg(feature = "arc")]
pub type Rc<T> = std::sync::Arc<T>;
#[cfg(not(feature = "arc"))]
pub type Rc<T> = std::rc::Rc<T>;

pub use analyzer::Analyzer;
pub use ast::{BinaryOp, CompareOp, Const, Kind, LogicOp, MatchOp, Node};
pub use compiler::{compile, CompiledExpression, LANG};
pub use fault::{FaultCause, Position, ScriptFault};
pub use governor::{BudgetError, GovernedPattern};
pub use lower::{CompoundStore, Plan, Step, StepOp, StoreTarget};
pub use pattern::PatternError;
pub use settings::{LimitFactor, Settings, SETTING_REGEX_ENABLED, SETTING_REGEX_LIMIT_FACTOR};
pub use source::{Source, Span};
pub use types::{
    compatible, promote, promote_cached, runtime_narrow, ConversionKind, StaticType, TypeDecision,
    TypeMismatch,
};
