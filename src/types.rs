// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The type lattice and promotion engine.
//!
//! [`promote`] decides a single result type for two typed operands or
//! conditional branches, and [`compatible`] decides what conversion (if any)
//! carries a value of one type into a target of another. Both are pure and
//! total over the lattice: the dynamic type is an explicit element that
//! always unifies to itself, never an absent value.

use core::fmt;
use std::collections::HashMap;
use std::sync::Mutex;

use lazy_static::lazy_static;
use thiserror::Error;

/// The resolved static type of an expression node.
///
/// Primitives are listed in widening order. Reference types are `String`,
/// `Pattern`, named `Object` types and the top reference type `Any`; `Null`
/// is the type of the null literal and `Dynamic` defers all compatibility
/// checking to run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StaticType {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Pattern,
    Object(std::string::String),
    Any,
    Null,
    Dynamic,
}

impl StaticType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Short | Self::Int | Self::Long | Self::Float | Self::Double
        )
    }

    pub fn is_primitive(&self) -> bool {
        self.is_numeric() || *self == Self::Bool
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::String | Self::Pattern | Self::Object(_) | Self::Any
        )
    }

    /// Position in the fixed numeric widening order, if numeric.
    fn rank(&self) -> Option<u8> {
        Some(match self {
            Self::Byte => 0,
            Self::Short => 1,
            Self::Int => 2,
            Self::Long => 3,
            Self::Float => 4,
            Self::Double => 5,
            _ => return None,
        })
    }
}

impl fmt::Display for StaticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "boolean"),
            Self::Byte => write!(f, "byte"),
            Self::Short => write!(f, "short"),
            Self::Int => write!(f, "int"),
            Self::Long => write!(f, "long"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::String => write!(f, "String"),
            Self::Pattern => write!(f, "Pattern"),
            Self::Object(name) => write!(f, "{name}"),
            Self::Any => write!(f, "Object"),
            Self::Null => write!(f, "null"),
            Self::Dynamic => write!(f, "def"),
        }
    }
}

/// The conversion required to carry an operand into a decided type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionKind {
    #[default]
    None,
    ImplicitWiden,
    ExplicitNarrow,
    Box,
    Unbox,
    DeferDynamic,
}

/// Result of promoting a pair of operand types: the common type and the
/// conversion each side requires. Pure and cacheable by the operand pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecision {
    pub result: StaticType,
    pub lhs: ConversionKind,
    pub rhs: ConversionKind,
}

/// A failed static or deferred cast, carrying the attempted types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot cast from [{from}] to [{to}]")]
pub struct TypeMismatch {
    pub from: StaticType,
    pub to: StaticType,
}

/// Conversion a reference-typed side needs to reach the top type.
fn widen_to_any(t: &StaticType) -> ConversionKind {
    match t {
        StaticType::Any => ConversionKind::None,
        _ if t.is_primitive() => ConversionKind::Box,
        _ => ConversionKind::ImplicitWiden,
    }
}

/// Decide the common type of two operands or conditional branches.
///
/// Rules, in priority order: equal types unify to themselves; numeric pairs
/// widen to the larger per the fixed order; a dynamic side defers both sides
/// to run time; a null literal unifies to the other side's reference type;
/// unrelated reference types fall back to the top reference type rather than
/// attempting common-ancestor inference; remaining mixed pairs box into the
/// top type. The result type is commutative in the operands.
pub fn promote(a: &StaticType, b: &StaticType) -> TypeDecision {
    use ConversionKind::*;

    if a == b {
        return TypeDecision {
            result: a.clone(),
            lhs: None,
            rhs: None,
        };
    }

    if *a == StaticType::Dynamic || *b == StaticType::Dynamic {
        return TypeDecision {
            result: StaticType::Dynamic,
            lhs: DeferDynamic,
            rhs: DeferDynamic,
        };
    }

    if let (Some(ra), Some(rb)) = (a.rank(), b.rank()) {
        return if ra < rb {
            TypeDecision {
                result: b.clone(),
                lhs: ImplicitWiden,
                rhs: None,
            }
        } else {
            TypeDecision {
                result: a.clone(),
                lhs: None,
                rhs: ImplicitWiden,
            }
        };
    }

    // A syntactic null takes on the other side's type when that side is a
    // reference type; against a primitive it forces boxing into the top type.
    if *a == StaticType::Null || *b == StaticType::Null {
        let other = if *a == StaticType::Null { b } else { a };
        if other.is_reference() {
            return TypeDecision {
                result: other.clone(),
                lhs: None,
                rhs: None,
            };
        }
        return TypeDecision {
            result: StaticType::Any,
            lhs: widen_to_any(a),
            rhs: widen_to_any(b),
        };
    }

    // Unrelated reference pairs and primitive/reference mixes (including
    // boolean against numeric) all fall back to the top reference type.
    TypeDecision {
        result: StaticType::Any,
        lhs: widen_to_any(a),
        rhs: widen_to_any(b),
    }
}

lazy_static! {
    static ref DECISIONS: Mutex<HashMap<(StaticType, StaticType), TypeDecision>> =
        Mutex::new(HashMap::new());
}

/// [`promote`] through a process-wide decision cache. The lattice is
/// independent of any particular script, so concurrent compilations may race
/// to populate the same entries.
pub fn promote_cached(a: &StaticType, b: &StaticType) -> TypeDecision {
    if let Ok(mut cache) = DECISIONS.lock() {
        return cache
            .entry((a.clone(), b.clone()))
            .or_insert_with(|| promote(a, b))
            .clone();
    }
    promote(a, b)
}

/// Decide whether a value of `source` type may flow into a target declared
/// as `target`, and with which conversion.
///
/// `explicit` is true only when the target type was written with an explicit
/// cast in the source text; narrowing is never inserted silently. A dynamic
/// source or target defers the whole check to run time.
pub fn compatible(
    source: &StaticType,
    target: &StaticType,
    explicit: bool,
) -> Result<ConversionKind, TypeMismatch> {
    use ConversionKind::*;

    let mismatch = || {
        Err(TypeMismatch {
            from: source.clone(),
            to: target.clone(),
        })
    };

    if source == target {
        return Ok(None);
    }

    if *source == StaticType::Dynamic || *target == StaticType::Dynamic {
        return Ok(DeferDynamic);
    }

    if let (Some(rs), Some(rt)) = (source.rank(), target.rank()) {
        return if rs < rt {
            Ok(ImplicitWiden)
        } else if explicit {
            Ok(ExplicitNarrow)
        } else {
            mismatch()
        };
    }

    if *source == StaticType::Null {
        return if target.is_reference() {
            Ok(None)
        } else {
            mismatch()
        };
    }

    if source.is_reference() && *target == StaticType::Any {
        return Ok(ImplicitWiden);
    }

    if *source == StaticType::Any && target.is_primitive() {
        return if explicit { Ok(Unbox) } else { mismatch() };
    }

    if source.is_primitive() && *target == StaticType::Any {
        return Ok(Box);
    }

    // Downcasts between distinct reference types require an explicit marker
    // and remain checked when the value is consumed.
    if source.is_reference() && target.is_reference() {
        return if explicit { Ok(ExplicitNarrow) } else { mismatch() };
    }

    mismatch()
}

/// Run-time half of a deferred check: may a value whose concrete type is
/// `actual` be consumed where `target` is required? Widening is permitted,
/// narrowing is not; a failure reports the attempted types.
pub fn runtime_narrow(actual: &StaticType, target: &StaticType) -> Result<(), TypeMismatch> {
    if *target == StaticType::Dynamic {
        return Ok(());
    }
    match compatible(actual, target, false) {
        Ok(ConversionKind::None)
        | Ok(ConversionKind::ImplicitWiden)
        | Ok(ConversionKind::Box)
        | Ok(ConversionKind::DeferDynamic) => Ok(()),
        _ => Err(TypeMismatch {
            from: actual.clone(),
            to: target.clone(),
        }),
    }
}
