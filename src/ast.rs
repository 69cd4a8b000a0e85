// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The expression tree handed in by the parser.
//!
//! Nodes are a tagged variant over node kinds with a uniform resolved-type
//! slot, so analysis is a match over the tag with exhaustiveness checking
//! rather than double-dispatch visitors. The tree owns its children
//! exclusively; analysis fills annotation slots in place and only
//! restructures by inserting conversion wrapper nodes.

use crate::source::Span;
use crate::types::{ConversionKind, StaticType};

use anyhow::{bail, Result};

/// A literal constant carried by the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

impl Const {
    pub fn static_type(&self) -> StaticType {
        match self {
            Const::Bool(_) => StaticType::Bool,
            Const::Byte(_) => StaticType::Byte,
            Const::Short(_) => StaticType::Short,
            Const::Int(_) => StaticType::Int,
            Const::Long(_) => StaticType::Long,
            Const::Float(_) => StaticType::Float,
            Const::Double(_) => StaticType::Double,
            Const::Str(_) => StaticType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// The two pattern operators: `=~` finds anywhere in the subject, `==~`
/// requires the whole subject to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Find,
    Match,
}

#[derive(Debug)]
pub enum Kind {
    Constant {
        value: Const,
    },
    Null,
    Var {
        name: String,
    },
    New {
        class: String,
    },
    Pattern {
        pattern: String,
    },
    /// A cast. `explicit` marks casts written in the source text; analysis
    /// also inserts non-explicit ones to carry decided conversions, filling
    /// `conversion` so later stages never re-derive the decision.
    Cast {
        expr: Box<Node>,
        to: StaticType,
        explicit: bool,
        conversion: Option<ConversionKind>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Compare {
        op: CompareOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Logic {
        op: LogicOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Conditional {
        cond: Box<Node>,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    /// Assignment. `op` tags compound forms (add-then-store etc.);
    /// `post_if_read` selects whether the pre-update value is the
    /// expression's result. The trailing slots are annotations filled during
    /// analysis: the promoted type the compound operator runs at and the
    /// conversions for loading the target into it and storing back.
    Assign {
        lhs: Box<Node>,
        rhs: Box<Node>,
        op: Option<BinaryOp>,
        post_if_read: bool,
        compound_type: Option<StaticType>,
        load_conversion: ConversionKind,
        store_conversion: ConversionKind,
    },
    Field {
        object: Box<Node>,
        name: String,
    },
    Index {
        object: Box<Node>,
        index: Box<Node>,
    },
    Match {
        op: MatchOp,
        subject: Box<Node>,
        pattern: Box<Node>,
    },
}

/// A node in the expression tree: stable identifier, source location, kind
/// and the resolved-type annotation slot. Identifiers are assigned in
/// pre-order when a tree enters compilation; the resolved type is written
/// exactly once by analysis and never changes afterwards.
#[derive(Debug)]
pub struct Node {
    pub id: u32,
    pub span: Span,
    pub kind: Kind,
    resolved: Option<StaticType>,
}

impl Node {
    fn new(span: Span, kind: Kind) -> Node {
        Node {
            id: 0,
            span,
            kind,
            resolved: None,
        }
    }

    pub fn constant(span: Span, value: Const) -> Node {
        Self::new(span, Kind::Constant { value })
    }

    pub fn null(span: Span) -> Node {
        Self::new(span, Kind::Null)
    }

    pub fn var(span: Span, name: impl Into<String>) -> Node {
        Self::new(span, Kind::Var { name: name.into() })
    }

    pub fn new_object(span: Span, class: impl Into<String>) -> Node {
        Self::new(
            span,
            Kind::New {
                class: class.into(),
            },
        )
    }

    pub fn pattern(span: Span, pattern: impl Into<String>) -> Node {
        Self::new(
            span,
            Kind::Pattern {
                pattern: pattern.into(),
            },
        )
    }

    /// An explicit cast as written in the source text.
    pub fn cast(span: Span, to: StaticType, expr: Node) -> Node {
        Self::new(
            span,
            Kind::Cast {
                expr: Box::new(expr),
                to,
                explicit: true,
                conversion: None,
            },
        )
    }

    /// A conversion wrapper inserted by analysis; arrives fully decided.
    pub(crate) fn conversion(span: Span, to: StaticType, kind: ConversionKind, expr: Node) -> Node {
        Self::new(
            span,
            Kind::Cast {
                expr: Box::new(expr),
                to,
                explicit: false,
                conversion: Some(kind),
            },
        )
    }

    pub fn binary(span: Span, op: BinaryOp, lhs: Node, rhs: Node) -> Node {
        Self::new(
            span,
            Kind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    pub fn compare(span: Span, op: CompareOp, lhs: Node, rhs: Node) -> Node {
        Self::new(
            span,
            Kind::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    pub fn logic(span: Span, op: LogicOp, lhs: Node, rhs: Node) -> Node {
        Self::new(
            span,
            Kind::Logic {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    pub fn conditional(span: Span, cond: Node, lhs: Node, rhs: Node) -> Node {
        Self::new(
            span,
            Kind::Conditional {
                cond: Box::new(cond),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    /// A plain store; the expression's value is the stored value.
    pub fn assign(span: Span, lhs: Node, rhs: Node) -> Node {
        Self::new(
            span,
            Kind::Assign {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                op: None,
                post_if_read: false,
                compound_type: None,
                load_conversion: ConversionKind::None,
                store_conversion: ConversionKind::None,
            },
        )
    }

    /// A compound store such as add-then-store. `post_if_read` makes the
    /// pre-update value the expression's result (postfix increment style).
    pub fn compound(span: Span, lhs: Node, op: BinaryOp, rhs: Node, post_if_read: bool) -> Node {
        Self::new(
            span,
            Kind::Assign {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                op: Some(op),
                post_if_read,
                compound_type: None,
                load_conversion: ConversionKind::None,
                store_conversion: ConversionKind::None,
            },
        )
    }

    pub fn field(span: Span, object: Node, name: impl Into<String>) -> Node {
        Self::new(
            span,
            Kind::Field {
                object: Box::new(object),
                name: name.into(),
            },
        )
    }

    pub fn index(span: Span, object: Node, index: Node) -> Node {
        Self::new(
            span,
            Kind::Index {
                object: Box::new(object),
                index: Box::new(index),
            },
        )
    }

    pub fn match_op(span: Span, op: MatchOp, subject: Node, pattern: Node) -> Node {
        Self::new(
            span,
            Kind::Match {
                op,
                subject: Box::new(subject),
                pattern: Box::new(pattern),
            },
        )
    }

    pub const fn span(&self) -> &Span {
        &self.span
    }

    pub fn resolved(&self) -> Option<&StaticType> {
        self.resolved.as_ref()
    }

    /// Write the resolved-type annotation. Reassignment indicates a broken
    /// analysis pass and is an internal-consistency fault.
    pub(crate) fn set_resolved(&mut self, t: StaticType) -> Result<()> {
        if let Some(prev) = &self.resolved {
            bail!(
                "internal error: node [{}] already resolved to [{prev}], cannot re-resolve to [{t}]",
                self.id
            );
        }
        self.resolved = Some(t);
        Ok(())
    }

    /// Whether this node is a storable location: a variable, a field or an
    /// array/map element. Checked structurally before type analysis.
    pub fn is_storable_target(&self) -> bool {
        matches!(
            self.kind,
            Kind::Var { .. } | Kind::Field { .. } | Kind::Index { .. }
        )
    }

    /// Short description used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match &self.kind {
            Kind::Constant { .. } => "constant",
            Kind::Null => "null",
            Kind::Var { .. } => "variable",
            Kind::New { .. } => "constructor call",
            Kind::Pattern { .. } => "pattern",
            Kind::Cast { .. } => "cast",
            Kind::Binary { .. } => "binary operation",
            Kind::Compare { .. } => "comparison",
            Kind::Logic { .. } => "logical operation",
            Kind::Conditional { .. } => "conditional",
            Kind::Assign { .. } => "assignment",
            Kind::Field { .. } => "field access",
            Kind::Index { .. } => "index access",
            Kind::Match { .. } => "pattern match",
        }
    }
}

impl core::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        })
    }
}

impl core::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

impl core::fmt::Display for LogicOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            LogicOp::And => "&&",
            LogicOp::Or => "||",
        })
    }
}

impl core::fmt::Display for MatchOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            MatchOp::Find => "=~",
            MatchOp::Match => "==~",
        })
    }
}
