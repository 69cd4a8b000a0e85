// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The lowering contract exposed to code generators.
//!
//! A [`Plan`] is an ordered, post-order sequence of typed steps. Every step
//! names the node it came from, its resolved type and the steps producing
//! its operands; conversions appear as explicit steps wherever analysis
//! decided one, and assignment steps carry the pre/post read flag and the
//! compound operator decision. Nothing here is re-derived: a node reaching
//! lowering without annotations is an internal-consistency fault.
//!
//! Consumers schedule evaluation themselves — a `Select` consumer evaluates
//! the condition and then only the chosen branch; a `Logic` consumer
//! short-circuits.

use crate::ast::{BinaryOp, CompareOp, Const, Kind, LogicOp, MatchOp, Node};
use crate::types::{ConversionKind, StaticType};

use anyhow::{bail, Result};

/// Where a store lands. `Var` stores by name; `Field` and `Index` stores
/// lead their argument list with the receiver (and index) steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Var(String),
    Field(String),
    Index,
}

/// The decided shape of a compound store: the operator, the promoted type it
/// runs at, and the conversions for loading the target into that type and
/// narrowing the result back into the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundStore {
    pub op: BinaryOp,
    pub ty: StaticType,
    pub load: ConversionKind,
    pub store: ConversionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOp {
    Const(Const),
    Null,
    Load(String),
    New(String),
    PatternConst(String),
    Convert { kind: ConversionKind, to: StaticType },
    Arith(BinaryOp),
    Compare(CompareOp),
    Logic(LogicOp),
    Select,
    MatchPattern(MatchOp),
    LoadField(String),
    LoadIndex,
    Store {
        target: StoreTarget,
        post_if_read: bool,
        compound: Option<CompoundStore>,
    },
}

/// One typed step of the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub node: u32,
    pub ty: StaticType,
    pub args: Vec<usize>,
    pub op: StepOp,
}

/// The ordered instruction sequence handed to a code generator. The final
/// step produces the expression's value.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Index of the step producing the expression's value.
    pub fn root_step(&self) -> usize {
        self.steps.len() - 1
    }
}

pub fn lower(root: &Node) -> Result<Plan> {
    let mut steps = Vec::new();
    emit(root, &mut steps)?;
    Ok(Plan { steps })
}

fn resolved(node: &Node) -> Result<StaticType> {
    match node.resolved() {
        Some(t) => Ok(t.clone()),
        None => bail!(
            "internal error: node [{}] reached lowering without a resolved type",
            node.id
        ),
    }
}

fn emit(node: &Node, steps: &mut Vec<Step>) -> Result<usize> {
    let ty = resolved(node)?;
    let (args, op) = match &node.kind {
        Kind::Constant { value } => (vec![], StepOp::Const(value.clone())),
        Kind::Null => (vec![], StepOp::Null),
        Kind::Var { name } => (vec![], StepOp::Load(name.clone())),
        Kind::New { class } => (vec![], StepOp::New(class.clone())),
        Kind::Pattern { pattern } => (vec![], StepOp::PatternConst(pattern.clone())),
        Kind::Cast {
            expr,
            to,
            conversion,
            ..
        } => {
            let a = emit(expr, steps)?;
            let kind = match conversion {
                Some(kind) => *kind,
                None => bail!(
                    "internal error: cast node [{}] reached lowering without a decided conversion",
                    node.id
                ),
            };
            (
                vec![a],
                StepOp::Convert {
                    kind,
                    to: to.clone(),
                },
            )
        }
        Kind::Binary { op, lhs, rhs } => {
            let a = emit(lhs, steps)?;
            let b = emit(rhs, steps)?;
            (vec![a, b], StepOp::Arith(*op))
        }
        Kind::Compare { op, lhs, rhs } => {
            let a = emit(lhs, steps)?;
            let b = emit(rhs, steps)?;
            (vec![a, b], StepOp::Compare(*op))
        }
        Kind::Logic { op, lhs, rhs } => {
            let a = emit(lhs, steps)?;
            let b = emit(rhs, steps)?;
            (vec![a, b], StepOp::Logic(*op))
        }
        Kind::Conditional { cond, lhs, rhs } => {
            let c = emit(cond, steps)?;
            let a = emit(lhs, steps)?;
            let b = emit(rhs, steps)?;
            (vec![c, a, b], StepOp::Select)
        }
        Kind::Match {
            op,
            subject,
            pattern,
        } => {
            let s = emit(subject, steps)?;
            let p = emit(pattern, steps)?;
            (vec![s, p], StepOp::MatchPattern(*op))
        }
        Kind::Field { object, name } => {
            let o = emit(object, steps)?;
            (vec![o], StepOp::LoadField(name.clone()))
        }
        Kind::Index { object, index } => {
            let o = emit(object, steps)?;
            let i = emit(index, steps)?;
            (vec![o, i], StepOp::LoadIndex)
        }
        Kind::Assign {
            lhs,
            rhs,
            op,
            post_if_read,
            compound_type,
            load_conversion,
            store_conversion,
        } => {
            let compound = match op {
                Some(bop) => {
                    let ty = match compound_type {
                        Some(t) => t.clone(),
                        None => bail!(
                            "internal error: compound assignment [{}] reached lowering undecided",
                            node.id
                        ),
                    };
                    Some(CompoundStore {
                        op: *bop,
                        ty,
                        load: *load_conversion,
                        store: *store_conversion,
                    })
                }
                None => None,
            };
            let (target, mut args) = match &lhs.kind {
                Kind::Var { name } => (StoreTarget::Var(name.clone()), vec![]),
                Kind::Field { object, name } => {
                    let o = emit(object, steps)?;
                    (StoreTarget::Field(name.clone()), vec![o])
                }
                Kind::Index { object, index } => {
                    let o = emit(object, steps)?;
                    let i = emit(index, steps)?;
                    (StoreTarget::Index, vec![o, i])
                }
                _ => bail!(
                    "internal error: assignment [{}] with non-storable target reached lowering",
                    node.id
                ),
            };
            args.push(emit(rhs, steps)?);
            (
                args,
                StepOp::Store {
                    target,
                    post_if_read: *post_if_read,
                    compound,
                },
            )
        }
    };
    steps.push(Step {
        node: node.id,
        ty,
        args,
        op,
    });
    Ok(steps.len() - 1)
}
