// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Compilation facade: tree in, immutable typed expression out.
//!
//! Compile-time faults are batched by the analyzer and reported to the host
//! as a single structured [`ScriptFault`]; a compiled expression is
//! immutable and may be shared and executed concurrently without locking.

use crate::analyzer::{Analyzer, Diagnostic};
use crate::ast::Node;
use crate::fault::{FaultCause, ScriptFault};
use crate::governor::GovernedPattern;
use crate::lower::{lower, Plan};
use crate::settings::Settings;
use crate::types::StaticType;
use crate::Rc;

use anyhow::Result;

/// Language tag carried by every fault this crate reports.
pub const LANG: &str = "quill";

/// An analyzed, lowered expression bound to the settings snapshot it was
/// compiled under. Settings changes never retroactively affect an already
/// compiled expression.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    root: Rc<Node>,
    plan: Plan,
    settings: Settings,
}

impl CompiledExpression {
    /// The annotated tree. Immutable after analysis.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// The lowering plan per the emission contract.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// The settings snapshot captured at compilation time.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Compile a pattern under this expression's captured settings, so that
    /// execution-time matching is governed by the configuration that was in
    /// force when the script was compiled.
    pub fn pattern(&self, pattern: &str) -> Result<GovernedPattern> {
        GovernedPattern::compile(pattern, &self.settings)
    }
}

/// Compile an expression tree against a host-declared scope.
///
/// The tree is numbered, analyzed and lowered; all compile-time faults are
/// batched into one fault whose script stack carries a rendered frame group
/// (message, offending line, caret) per diagnostic.
pub fn compile(
    mut root: Node,
    scope: &[(&str, StaticType)],
    settings: &Settings,
) -> Result<CompiledExpression, ScriptFault> {
    let mut analyzer = Analyzer::new(settings);
    for (name, t) in scope {
        if let Err(e) = analyzer.declare(*name, t.clone()) {
            return Err(internal_fault(&root, e));
        }
    }
    if let Err(e) = analyzer.analyze(&mut root) {
        return Err(internal_fault(&root, e));
    }
    let diagnostics = analyzer.into_diagnostics();
    if !diagnostics.is_empty() {
        return Err(compile_fault(&root, diagnostics));
    }
    let plan = match lower(&root) {
        Ok(plan) => plan,
        Err(e) => return Err(internal_fault(&root, e)),
    };
    Ok(CompiledExpression {
        root: Rc::new(root),
        plan,
        settings: settings.clone(),
    })
}

fn internal_fault(root: &Node, e: anyhow::Error) -> ScriptFault {
    ScriptFault::new(
        "internal compiler error",
        FaultCause::from(e),
        vec![],
        root.span.source.contents().clone(),
        LANG,
    )
}

fn compile_fault(root: &Node, diagnostics: Vec<Diagnostic>) -> ScriptFault {
    let source = &root.span.source;
    let mut stack = Vec::with_capacity(diagnostics.len() * 3);
    for d in &diagnostics {
        stack.push(d.message.clone());
        stack.push(source.line(d.span.line.saturating_sub(1)).to_string());
        stack.push(format!(
            "{}^---- HERE",
            " ".repeat(d.span.col.saturating_sub(1) as usize)
        ));
    }
    let first = &diagnostics[0];
    ScriptFault::new(
        "compile error",
        FaultCause::new(first.message.clone()),
        stack,
        source.contents().clone(),
        LANG,
    )
    .with_position(first.span.position())
}
