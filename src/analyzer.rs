// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The semantic analyzer: a single post-order pass that turns an untyped
//! tree into a typed, unambiguous one.
//!
//! Each node moves through unvisited -> analyzing -> resolved; a node found
//! analyzing when entered again indicates a structural cycle, which cannot
//! occur in a tree-shaped model and is treated as an internal-consistency
//! fault. Type and structural faults are batched as diagnostics: a fault
//! poisons its own subtree while sibling subtrees continue to be analyzed.

use crate::ast::{Kind, Node};
use crate::pattern::Program;
use crate::settings::{Settings, SETTING_REGEX_ENABLED};
use crate::source::Span;
use crate::types::{compatible, promote_cached, ConversionKind, StaticType};

use anyhow::{bail, Result};
use std::collections::HashMap;

/// A batched compile-time fault, reported against a source span.
#[derive(Debug, Clone)]
pub(crate) struct Diagnostic {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Analyzing,
    Resolved,
}

/// Walks a tree, annotating every node with its resolved type and inserting
/// conversion wrapper nodes wherever a promotion or assignment decision
/// requires one.
pub struct Analyzer {
    settings: Settings,
    scope: HashMap<String, StaticType>,
    states: HashMap<u32, NodeState>,
    diagnostics: Vec<Diagnostic>,
    next_id: u32,
}

impl Analyzer {
    /// Capture an immutable settings snapshot for this compilation unit.
    pub fn new(settings: &Settings) -> Analyzer {
        Analyzer {
            settings: settings.clone(),
            scope: HashMap::new(),
            states: HashMap::new(),
            diagnostics: Vec::new(),
            next_id: 0,
        }
    }

    /// Declare a variable visible to the expression under analysis.
    pub fn declare(&mut self, name: impl Into<String>, t: StaticType) -> Result<()> {
        let name = name.into();
        if self.scope.contains_key(&name) {
            bail!("variable [{name}] is already defined");
        }
        self.scope.insert(name, t);
        Ok(())
    }

    /// Analyze a tree in place. Returns `Err` only for internal-consistency
    /// faults; compile-time type and structural faults are batched and
    /// available through the diagnostics.
    pub fn analyze(&mut self, root: &mut Node) -> Result<()> {
        self.assign_ids(root);
        self.visit(root)?;
        Ok(())
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub(crate) fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Pre-order identifier assignment; parsers that already number nodes
    /// are renumbered for a dense, stable range.
    fn assign_ids(&mut self, node: &mut Node) {
        node.id = self.fresh_id();
        match &mut node.kind {
            Kind::Constant { .. }
            | Kind::Null
            | Kind::Var { .. }
            | Kind::New { .. }
            | Kind::Pattern { .. } => {}
            Kind::Cast { expr, .. } => self.assign_ids(expr),
            Kind::Binary { lhs, rhs, .. }
            | Kind::Compare { lhs, rhs, .. }
            | Kind::Logic { lhs, rhs, .. }
            | Kind::Assign { lhs, rhs, .. } => {
                self.assign_ids(lhs);
                self.assign_ids(rhs);
            }
            Kind::Conditional { cond, lhs, rhs } => {
                self.assign_ids(cond);
                self.assign_ids(lhs);
                self.assign_ids(rhs);
            }
            Kind::Field { object, .. } => self.assign_ids(object),
            Kind::Index { object, index } => {
                self.assign_ids(object);
                self.assign_ids(index);
            }
            Kind::Match {
                subject, pattern, ..
            } => {
                self.assign_ids(subject);
                self.assign_ids(pattern);
            }
        }
    }

    fn fresh_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn diag(&mut self, span: &Span, message: String) {
        self.diagnostics.push(Diagnostic {
            span: span.clone(),
            message,
        });
    }

    /// Wrap a child in a conversion node carrying the decided target type,
    /// so later stages never re-derive the decision. The wrapper arrives
    /// fully resolved.
    fn wrap(&mut self, slot: &mut Box<Node>, to: &StaticType, kind: ConversionKind) -> Result<()> {
        if kind == ConversionKind::None {
            return Ok(());
        }
        let span = slot.span.clone();
        let inner = std::mem::replace(slot, Box::new(Node::null(span.clone())));
        let mut cast = Node::conversion(span, to.clone(), kind, *inner);
        cast.id = self.fresh_id();
        cast.set_resolved(to.clone())?;
        self.states.insert(cast.id, NodeState::Resolved);
        *slot = Box::new(cast);
        Ok(())
    }

    /// Post-order visit. `Ok(true)` means the node resolved; `Ok(false)`
    /// means its subtree is poisoned and a diagnostic was recorded.
    fn visit(&mut self, node: &mut Node) -> Result<bool> {
        match self.states.get(&node.id) {
            Some(NodeState::Analyzing) => {
                bail!("internal error: structural cycle at node [{}]", node.id)
            }
            Some(NodeState::Resolved) => {
                bail!("internal error: node [{}] entered twice", node.id)
            }
            None => {}
        }
        self.states.insert(node.id, NodeState::Analyzing);
        let resolved = self.visit_kind(&mut node.kind, &node.span)?;
        self.states.insert(node.id, NodeState::Resolved);
        match resolved {
            Some(t) => {
                node.set_resolved(t)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn visit_kind(&mut self, kind: &mut Kind, span: &Span) -> Result<Option<StaticType>> {
        Ok(match kind {
            Kind::Constant { value } => Some(value.static_type()),
            Kind::Null => Some(StaticType::Null),
            Kind::Var { name } => match self.scope.get(name).cloned() {
                Some(t) => Some(t),
                None => {
                    self.diag(span, format!("unknown variable [{name}]"));
                    None
                }
            },
            Kind::New { class } => Some(StaticType::Object(class.clone())),
            Kind::Pattern { pattern } => {
                if !self.settings.regex_enabled() {
                    self.diag(
                        span,
                        format!(
                            "regexes are disabled; set [{SETTING_REGEX_ENABLED}] to [true] \
                             to allow them"
                        ),
                    );
                    return Ok(None);
                }
                match Program::compile(pattern) {
                    Ok(_) => Some(StaticType::Pattern),
                    Err(e) => {
                        self.diag(span, format!("invalid regular expression: {e}"));
                        None
                    }
                }
            }
            Kind::Cast {
                expr,
                to,
                explicit,
                conversion,
            } => {
                if !self.visit(expr)? {
                    return Ok(None);
                }
                let from = expr.resolved().cloned().unwrap_or(StaticType::Dynamic);
                match compatible(&from, to, *explicit) {
                    Ok(k) => {
                        *conversion = Some(k);
                        Some(to.clone())
                    }
                    Err(e) => {
                        self.diag(span, e.to_string());
                        None
                    }
                }
            }
            Kind::Binary { op, lhs, rhs } => {
                let lok = self.visit(lhs)?;
                let rok = self.visit(rhs)?;
                if !(lok && rok) {
                    return Ok(None);
                }
                let lt = lhs.resolved().cloned().unwrap_or(StaticType::Dynamic);
                let rt = rhs.resolved().cloned().unwrap_or(StaticType::Dynamic);
                let d = promote_cached(&lt, &rt);
                if !(d.result.is_numeric() || d.result == StaticType::Dynamic) {
                    self.diag(
                        span,
                        format!("binary operator [{op}] requires numeric operands, found [{lt}] and [{rt}]"),
                    );
                    return Ok(None);
                }
                self.wrap(lhs, &d.result, d.lhs)?;
                self.wrap(rhs, &d.result, d.rhs)?;
                Some(d.result)
            }
            Kind::Compare { op, lhs, rhs } => {
                let lok = self.visit(lhs)?;
                let rok = self.visit(rhs)?;
                if !(lok && rok) {
                    return Ok(None);
                }
                let lt = lhs.resolved().cloned().unwrap_or(StaticType::Dynamic);
                let rt = rhs.resolved().cloned().unwrap_or(StaticType::Dynamic);
                let d = promote_cached(&lt, &rt);
                let ordered = matches!(
                    op,
                    crate::ast::CompareOp::Lt
                        | crate::ast::CompareOp::Le
                        | crate::ast::CompareOp::Gt
                        | crate::ast::CompareOp::Ge
                );
                if ordered && !(d.result.is_numeric() || d.result == StaticType::Dynamic) {
                    self.diag(
                        span,
                        format!("comparison [{op}] requires numeric operands, found [{lt}] and [{rt}]"),
                    );
                    return Ok(None);
                }
                self.wrap(lhs, &d.result, d.lhs)?;
                self.wrap(rhs, &d.result, d.rhs)?;
                Some(StaticType::Bool)
            }
            Kind::Logic { op, lhs, rhs } => {
                let lok = self.visit(lhs)?;
                let rok = self.visit(rhs)?;
                if !(lok && rok) {
                    return Ok(None);
                }
                let mut ok = true;
                for side in [&*lhs, &*rhs] {
                    let t = side.resolved().cloned().unwrap_or(StaticType::Dynamic);
                    if t != StaticType::Bool {
                        self.diag(
                            &side.span,
                            format!("logical operator [{op}] requires boolean operands, found [{t}]"),
                        );
                        ok = false;
                    }
                }
                if !ok {
                    return Ok(None);
                }
                Some(StaticType::Bool)
            }
            Kind::Conditional { cond, lhs, rhs } => {
                // The boolean requirement on the condition is never deferred,
                // even for dynamically typed conditions.
                let mut ok = self.visit(cond)?;
                if ok {
                    let ct = cond.resolved().cloned().unwrap_or(StaticType::Dynamic);
                    if ct != StaticType::Bool {
                        self.diag(
                            &cond.span,
                            format!("condition must be boolean, found [{ct}]"),
                        );
                        ok = false;
                    }
                }
                let lok = self.visit(lhs)?;
                let rok = self.visit(rhs)?;
                if !(ok && lok && rok) {
                    return Ok(None);
                }
                let lt = lhs.resolved().cloned().unwrap_or(StaticType::Dynamic);
                let rt = rhs.resolved().cloned().unwrap_or(StaticType::Dynamic);
                let d = promote_cached(&lt, &rt);
                self.wrap(lhs, &d.result, d.lhs)?;
                self.wrap(rhs, &d.result, d.rhs)?;
                Some(d.result)
            }
            Kind::Assign {
                lhs,
                rhs,
                op,
                post_if_read: _,
                compound_type,
                load_conversion,
                store_conversion,
            } => {
                // Storable-location check is structural and happens before
                // any type analysis; the value side is still analyzed so its
                // faults batch alongside.
                if !lhs.is_storable_target() {
                    self.diag(
                        &lhs.span,
                        format!(
                            "invalid assignment: cannot assign a value to {}",
                            lhs.describe()
                        ),
                    );
                    self.visit(rhs)?;
                    return Ok(None);
                }
                let lok = self.visit(lhs)?;
                let rok = self.visit(rhs)?;
                if !(lok && rok) {
                    return Ok(None);
                }
                let lt = lhs.resolved().cloned().unwrap_or(StaticType::Dynamic);
                let rt = rhs.resolved().cloned().unwrap_or(StaticType::Dynamic);

                if let Some(bop) = op {
                    // The operator result type follows the same promotion
                    // rules as a standalone binary operator; the compound
                    // form itself licenses the narrowing store-back.
                    let d = promote_cached(&lt, &rt);
                    if !(d.result.is_numeric() || d.result == StaticType::Dynamic) {
                        self.diag(
                            span,
                            format!(
                                "compound operator [{bop}] requires numeric operands, found [{lt}] and [{rt}]"
                            ),
                        );
                        return Ok(None);
                    }
                    self.wrap(rhs, &d.result, d.rhs)?;
                    match compatible(&d.result, &lt, true) {
                        Ok(store) => {
                            *compound_type = Some(d.result);
                            *load_conversion = d.lhs;
                            *store_conversion = store;
                        }
                        Err(e) => {
                            self.diag(span, e.to_string());
                            return Ok(None);
                        }
                    }
                } else {
                    match compatible(&rt, &lt, false) {
                        Ok(k) => self.wrap(rhs, &lt, k)?,
                        Err(e) => {
                            self.diag(span, e.to_string());
                            return Ok(None);
                        }
                    }
                }
                // Pre/post read timing affects evaluation order only, never
                // the type: the stored value's type either way.
                Some(lt)
            }
            Kind::Field { object, name } => {
                if !self.visit(object)? {
                    return Ok(None);
                }
                let t = object.resolved().cloned().unwrap_or(StaticType::Dynamic);
                if t != StaticType::Dynamic {
                    self.diag(span, format!("field [{name}] is not defined for type [{t}]"));
                    return Ok(None);
                }
                Some(StaticType::Dynamic)
            }
            Kind::Index { object, index } => {
                let ook = self.visit(object)?;
                let iok = self.visit(index)?;
                if !(ook && iok) {
                    return Ok(None);
                }
                let t = object.resolved().cloned().unwrap_or(StaticType::Dynamic);
                if t != StaticType::Dynamic {
                    self.diag(span, format!("index access is not defined for type [{t}]"));
                    return Ok(None);
                }
                Some(StaticType::Dynamic)
            }
            Kind::Match {
                op,
                subject,
                pattern,
            } => {
                let sok = self.visit(subject)?;
                let pok = self.visit(pattern)?;
                if !(sok && pok) {
                    return Ok(None);
                }
                let st = subject.resolved().cloned().unwrap_or(StaticType::Dynamic);
                let pt = pattern.resolved().cloned().unwrap_or(StaticType::Dynamic);
                let mut ok = true;
                if !matches!(st, StaticType::String | StaticType::Dynamic) {
                    self.diag(
                        &subject.span,
                        format!("operator [{op}] requires a string subject, found [{st}]"),
                    );
                    ok = false;
                }
                if !matches!(pt, StaticType::Pattern | StaticType::Dynamic) {
                    self.diag(
                        &pattern.span,
                        format!("operator [{op}] requires a pattern operand, found [{pt}]"),
                    );
                    ok = false;
                }
                if !ok {
                    return Ok(None);
                }
                Some(StaticType::Bool)
            }
        })
    }
}
