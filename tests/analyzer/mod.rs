// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::common::{source, Evaluator, RtValue};

use quill::{
    compile, BinaryOp, CompareOp, Const, ConversionKind, MatchOp, Node, Settings, StaticType,
    StepOp, StoreTarget,
};

use anyhow::Result;

fn settings() -> Settings {
    Settings::new()
}

#[test]
fn conditional_resolves_and_selects() -> Result<()> {
    let (_, s) = source("b ? 2 : 3");
    let tree = Node::conditional(
        s.clone(),
        Node::var(s.clone(), "b"),
        Node::constant(s.clone(), Const::Int(2)),
        Node::constant(s.clone(), Const::Int(3)),
    );
    let compiled = compile(tree, &[("b", StaticType::Bool)], &settings()).unwrap();
    assert_eq!(compiled.root().resolved(), Some(&StaticType::Int));

    let mut ev = Evaluator::new(&compiled);
    ev.set("b", RtValue::Bool(true));
    assert!(matches!(ev.run(), Ok(RtValue::Int(2))));

    let mut ev = Evaluator::new(&compiled);
    ev.set("b", RtValue::Bool(false));
    assert!(matches!(ev.run(), Ok(RtValue::Int(3))));
    Ok(())
}

#[test]
fn condition_must_be_boolean() {
    let (_, s) = source("1 ? 2 : 3");
    let tree = Node::conditional(
        s.clone(),
        Node::constant(s.clone(), Const::Int(1)),
        Node::constant(s.clone(), Const::Int(2)),
        Node::constant(s.clone(), Const::Int(3)),
    );
    let fault = compile(tree, &[], &settings()).unwrap_err();
    assert_eq!(fault.message(), "compile error");
    assert_eq!(fault.lang(), "quill");
    assert_eq!(fault.script(), "1 ? 2 : 3");
    assert!(fault
        .cause()
        .message()
        .contains("condition must be boolean, found [int]"));
    assert!(fault.position().is_some());
    assert!(fault.script_stack().iter().any(|f| f.contains("^---- HERE")));
}

#[test]
fn dynamic_condition_is_still_a_compile_fault() {
    // The boolean requirement on conditions is never deferred to run time.
    let (_, s) = source("d ? 2 : 3");
    let tree = Node::conditional(
        s.clone(),
        Node::var(s.clone(), "d"),
        Node::constant(s.clone(), Const::Int(2)),
        Node::constant(s.clone(), Const::Int(3)),
    );
    let fault = compile(tree, &[("d", StaticType::Dynamic)], &settings()).unwrap_err();
    assert!(fault
        .cause()
        .message()
        .contains("condition must be boolean, found [def]"));
}

#[test]
fn numeric_branches_widen_to_the_larger() -> Result<()> {
    let (_, s) = source("b ? 2 : 4.0f");
    let tree = Node::conditional(
        s.clone(),
        Node::var(s.clone(), "b"),
        Node::constant(s.clone(), Const::Int(2)),
        Node::constant(s.clone(), Const::Float(4.0)),
    );
    let compiled = compile(tree, &[("b", StaticType::Bool)], &settings()).unwrap();
    assert_eq!(compiled.root().resolved(), Some(&StaticType::Float));

    // The int branch carries an explicit conversion step in the plan.
    assert!(compiled.plan().steps().iter().any(|step| matches!(
        &step.op,
        StepOp::Convert {
            kind: ConversionKind::ImplicitWiden,
            to: StaticType::Float
        }
    )));

    let mut ev = Evaluator::new(&compiled);
    ev.set("b", RtValue::Bool(true));
    assert!(matches!(ev.run(), Ok(RtValue::Float(v)) if v == 2.0));
    Ok(())
}

#[test]
fn unrelated_reference_branches_resolve_to_top_type() {
    let (_, s) = source("b ? new HashMap() : new ArrayList()");
    let tree = Node::conditional(
        s.clone(),
        Node::var(s.clone(), "b"),
        Node::new_object(s.clone(), "HashMap"),
        Node::new_object(s.clone(), "ArrayList"),
    );
    let compiled = compile(tree, &[("b", StaticType::Bool)], &settings()).unwrap();
    assert_eq!(compiled.root().resolved(), Some(&StaticType::Any));
}

#[test]
fn null_branch_takes_the_other_side_type() {
    let (_, s) = source("b ? null : new HashMap()");
    let tree = Node::conditional(
        s.clone(),
        Node::var(s.clone(), "b"),
        Node::null(s.clone()),
        Node::new_object(s.clone(), "HashMap"),
    );
    let compiled = compile(tree, &[("b", StaticType::Bool)], &settings()).unwrap();
    assert_eq!(
        compiled.root().resolved(),
        Some(&StaticType::Object("HashMap".to_string()))
    );
}

#[test]
fn equality_of_structurally_different_results_is_false() -> Result<()> {
    // Numeric branches: the values genuinely differ after promotion.
    let (_, s) = source("(x ? 2 : 4.0f) == (y ? 2 : 4.0f)");
    let cond = |name: &str| {
        Node::conditional(
            s.clone(),
            Node::var(s.clone(), name),
            Node::constant(s.clone(), Const::Int(2)),
            Node::constant(s.clone(), Const::Float(4.0)),
        )
    };
    let tree = Node::compare(s.clone(), CompareOp::Eq, cond("x"), cond("y"));
    let scope = [("x", StaticType::Bool), ("y", StaticType::Bool)];
    let compiled = compile(tree, &scope, &settings()).unwrap();
    let mut ev = Evaluator::new(&compiled);
    ev.set("x", RtValue::Bool(false)).set("y", RtValue::Bool(true));
    assert!(matches!(ev.run(), Ok(RtValue::Bool(false))));

    // Reference branches: distinct evaluations are never identity-equal,
    // even when both pick the same branch.
    let refcond = |name: &str| {
        Node::conditional(
            s.clone(),
            Node::var(s.clone(), name),
            Node::new_object(s.clone(), "HashMap"),
            Node::new_object(s.clone(), "ArrayList"),
        )
    };
    let tree = Node::compare(s.clone(), CompareOp::Eq, refcond("x"), refcond("y"));
    let compiled = compile(tree, &scope, &settings()).unwrap();
    let mut ev = Evaluator::new(&compiled);
    ev.set("x", RtValue::Bool(false)).set("y", RtValue::Bool(false));
    assert!(matches!(ev.run(), Ok(RtValue::Bool(false))));
    Ok(())
}

#[test]
fn assignment_widens_without_any_marker() -> Result<()> {
    let (_, s) = source("z = b ? 2 : 4.0f");
    let rhs = Node::conditional(
        s.clone(),
        Node::var(s.clone(), "b"),
        Node::constant(s.clone(), Const::Int(2)),
        Node::constant(s.clone(), Const::Float(4.0)),
    );
    let tree = Node::assign(s.clone(), Node::var(s.clone(), "z"), rhs);
    let scope = [("b", StaticType::Bool), ("z", StaticType::Double)];
    let compiled = compile(tree, &scope, &settings()).unwrap();
    assert_eq!(compiled.root().resolved(), Some(&StaticType::Double));

    let mut ev = Evaluator::new(&compiled);
    ev.set("b", RtValue::Bool(false));
    assert!(matches!(ev.run(), Ok(RtValue::Double(v)) if v == 4.0));
    assert!(matches!(ev.var("z"), Some(RtValue::Double(v)) if *v == 4.0));
    Ok(())
}

#[test]
fn assignment_narrowing_without_cast_faults_at_compile_time() {
    let (_, s) = source("z = y");
    let tree = Node::assign(s.clone(), Node::var(s.clone(), "z"), Node::var(s.clone(), "y"));
    let scope = [("y", StaticType::Int), ("z", StaticType::Byte)];
    let fault = compile(tree, &scope, &settings()).unwrap_err();
    assert!(fault
        .cause()
        .message()
        .contains("cannot cast from [int] to [byte]"));
}

#[test]
fn explicit_cast_licenses_narrowing() -> Result<()> {
    let (_, s) = source("z = (byte)y");
    let rhs = Node::cast(s.clone(), StaticType::Byte, Node::var(s.clone(), "y"));
    let tree = Node::assign(s.clone(), Node::var(s.clone(), "z"), rhs);
    let scope = [("y", StaticType::Int), ("z", StaticType::Byte)];
    let compiled = compile(tree, &scope, &settings()).unwrap();
    assert_eq!(compiled.root().resolved(), Some(&StaticType::Byte));

    let mut ev = Evaluator::new(&compiled);
    ev.set("y", RtValue::Int(7));
    assert!(matches!(ev.run(), Ok(RtValue::Byte(7))));
    Ok(())
}

#[test]
fn dynamic_source_defers_narrowing_to_run_time() -> Result<()> {
    let (_, s) = source("z = d");
    let tree = Node::assign(s.clone(), Node::var(s.clone(), "z"), Node::var(s.clone(), "d"));
    let scope = [("d", StaticType::Dynamic), ("z", StaticType::Byte)];
    let compiled = compile(tree, &scope, &settings()).unwrap();

    // The concrete run-time value decides: a byte flows, an int faults with
    // the attempted types.
    let mut ev = Evaluator::new(&compiled);
    ev.set("d", RtValue::Byte(5));
    assert!(matches!(ev.run(), Ok(RtValue::Byte(5))));

    let mut ev = Evaluator::new(&compiled);
    ev.set("d", RtValue::Int(5));
    match ev.run() {
        Err(crate::common::EvalError::Mismatch(e)) => {
            assert_eq!(e.from, StaticType::Int);
            assert_eq!(e.to, StaticType::Byte);
        }
        other => panic!("expected a type mismatch, got {other:?}"),
    }
    Ok(())
}

#[test]
fn dynamic_target_accepts_any_value() -> Result<()> {
    let (_, s) = source("d = 4.5");
    let tree = Node::assign(
        s.clone(),
        Node::var(s.clone(), "d"),
        Node::constant(s.clone(), Const::Double(4.5)),
    );
    let compiled = compile(tree, &[("d", StaticType::Dynamic)], &settings()).unwrap();
    assert_eq!(compiled.root().resolved(), Some(&StaticType::Dynamic));

    let mut ev = Evaluator::new(&compiled);
    assert!(matches!(ev.run(), Ok(RtValue::Double(v)) if v == 4.5));
    Ok(())
}

#[test]
fn compound_assignment_promotes_and_stores_back() -> Result<()> {
    // x += 2.5 runs at double and narrows the result back into the int
    // target; the compound form itself licenses that narrowing.
    let (_, s) = source("x += 2.5");
    let tree = Node::compound(
        s.clone(),
        Node::var(s.clone(), "x"),
        BinaryOp::Add,
        Node::constant(s.clone(), Const::Double(2.5)),
        false,
    );
    let compiled = compile(tree, &[("x", StaticType::Int)], &settings()).unwrap();
    assert_eq!(compiled.root().resolved(), Some(&StaticType::Int));

    let mut ev = Evaluator::new(&compiled);
    ev.set("x", RtValue::Int(1));
    assert!(matches!(ev.run(), Ok(RtValue::Int(3))));
    assert!(matches!(ev.var("x"), Some(RtValue::Int(3))));
    Ok(())
}

#[test]
fn post_if_read_yields_the_pre_update_value() -> Result<()> {
    let (_, s) = source("x++");
    let tree = Node::compound(
        s.clone(),
        Node::var(s.clone(), "x"),
        BinaryOp::Add,
        Node::constant(s.clone(), Const::Int(1)),
        true,
    );
    let compiled = compile(tree, &[("x", StaticType::Int)], &settings()).unwrap();
    // Pre/post read timing never changes the type.
    assert_eq!(compiled.root().resolved(), Some(&StaticType::Int));

    let mut ev = Evaluator::new(&compiled);
    ev.set("x", RtValue::Int(5));
    assert!(matches!(ev.run(), Ok(RtValue::Int(5))));
    assert!(matches!(ev.var("x"), Some(RtValue::Int(6))));
    Ok(())
}

#[test]
fn assignment_target_must_be_storable() {
    let (_, s) = source("1 = 2");
    let tree = Node::assign(
        s.clone(),
        Node::constant(s.clone(), Const::Int(1)),
        Node::constant(s.clone(), Const::Int(2)),
    );
    let fault = compile(tree, &[], &settings()).unwrap_err();
    assert!(fault
        .cause()
        .message()
        .contains("invalid assignment: cannot assign a value to constant"));
}

#[test]
fn unknown_variable_is_a_compile_fault() {
    let (_, s) = source("missing");
    let fault = compile(Node::var(s, "missing"), &[], &settings()).unwrap_err();
    assert!(fault.cause().message().contains("unknown variable [missing]"));
}

#[test]
fn sibling_faults_are_batched_into_one_report() {
    let (_, s) = source("1 ? 2 : (3 = 4)");
    let bad_assign = Node::assign(
        s.clone(),
        Node::constant(s.clone(), Const::Int(3)),
        Node::constant(s.clone(), Const::Int(4)),
    );
    let tree = Node::conditional(
        s.clone(),
        Node::constant(s.clone(), Const::Int(1)),
        Node::constant(s.clone(), Const::Int(2)),
        bad_assign,
    );
    let fault = compile(tree, &[], &settings()).unwrap_err();

    // Both the bad condition and the bad sibling assignment are reported,
    // three stack frames each (message, line, caret).
    assert_eq!(fault.script_stack().len(), 6);
    assert!(fault.cause().message().contains("condition must be boolean"));
    assert!(fault.script_stack()[3].contains("invalid assignment"));
}

#[test]
fn field_access_requires_a_dynamic_receiver() {
    let (_, s) = source("m.x");
    let tree = Node::field(s.clone(), Node::var(s.clone(), "m"), "x");
    let fault = compile(
        tree,
        &[("m", StaticType::Object("HashMap".to_string()))],
        &settings(),
    )
    .unwrap_err();
    assert!(fault
        .cause()
        .message()
        .contains("field [x] is not defined for type [HashMap]"));
}

#[test]
fn dynamic_field_store_round_trips() -> Result<()> {
    let (_, s) = source("d.x = 1");
    let target = Node::field(s.clone(), Node::var(s.clone(), "d"), "x");
    let tree = Node::assign(s.clone(), target, Node::constant(s.clone(), Const::Int(1)));
    let compiled = compile(tree, &[("d", StaticType::Dynamic)], &settings()).unwrap();
    assert_eq!(compiled.root().resolved(), Some(&StaticType::Dynamic));

    let mut ev = Evaluator::new(&compiled);
    let receiver = ev.new_object("HashMap");
    ev.set("d", receiver);
    // Field stores land on the receiver; the expression's value is the
    // stored value.
    assert!(matches!(ev.run(), Ok(RtValue::Int(1))));
    Ok(())
}

#[test]
fn index_access_requires_a_dynamic_receiver() {
    let (_, s) = source("m[0]");
    let tree = Node::index(
        s.clone(),
        Node::var(s.clone(), "m"),
        Node::constant(s.clone(), Const::Int(0)),
    );
    let fault = compile(
        tree,
        &[("m", StaticType::Object("ArrayList".to_string()))],
        &settings(),
    )
    .unwrap_err();
    assert!(fault
        .cause()
        .message()
        .contains("index access is not defined for type [ArrayList]"));

    let (_, s) = source("d[0]");
    let tree = Node::index(
        s.clone(),
        Node::var(s.clone(), "d"),
        Node::constant(s.clone(), Const::Int(0)),
    );
    let compiled = compile(tree, &[("d", StaticType::Dynamic)], &settings()).unwrap();
    assert_eq!(compiled.root().resolved(), Some(&StaticType::Dynamic));
}

#[test]
fn match_operator_typing() {
    let (_, s) = source("1 =~ /abc/");
    let tree = Node::match_op(
        s.clone(),
        MatchOp::Find,
        Node::constant(s.clone(), Const::Int(1)),
        Node::pattern(s.clone(), "abc"),
    );
    let fault = compile(tree, &[], &settings()).unwrap_err();
    assert!(fault
        .cause()
        .message()
        .contains("operator [=~] requires a string subject, found [int]"));

    let (_, s) = source("'a' ==~ 'b'");
    let tree = Node::match_op(
        s.clone(),
        MatchOp::Match,
        Node::constant(s.clone(), Const::Str("a".to_string())),
        Node::constant(s.clone(), Const::Str("b".to_string())),
    );
    let fault = compile(tree, &[], &settings()).unwrap_err();
    assert!(fault
        .cause()
        .message()
        .contains("operator [==~] requires a pattern operand, found [String]"));
}

#[test]
fn disabled_regex_faults_at_compile_time() {
    let (_, s) = source("'a' =~ /a/");
    let tree = Node::match_op(
        s.clone(),
        MatchOp::Find,
        Node::constant(s.clone(), Const::Str("a".to_string())),
        Node::pattern(s.clone(), "a"),
    );
    let fault = compile(tree, &[], &Settings::new().with_regex_enabled(false)).unwrap_err();
    assert!(fault.cause().message().contains("regexes are disabled"));
    assert!(fault
        .cause()
        .message()
        .contains("quill.regex.enabled"));
}

#[test]
fn malformed_pattern_literal_faults_at_compile_time() {
    let (_, s) = source("'a' =~ /(a/");
    let tree = Node::match_op(
        s.clone(),
        MatchOp::Find,
        Node::constant(s.clone(), Const::Str("a".to_string())),
        Node::pattern(s.clone(), "(a"),
    );
    let fault = compile(tree, &[], &settings()).unwrap_err();
    assert!(fault
        .cause()
        .message()
        .contains("invalid regular expression"));
}

#[test]
fn nested_conditional_chains_match_an_if_else_oracle() -> Result<()> {
    // N levels of  field == 'j' ? 'j' : ...  ending in the field itself,
    // mirrored against a plain if/else chain evaluated in Rust.
    for n in 0..100usize {
        let (_, s) = source("nested conditional chain");
        let mut tree = Node::var(s.clone(), "field");
        for j in (0..n).rev() {
            let cond = Node::compare(
                s.clone(),
                CompareOp::Eq,
                Node::var(s.clone(), "field"),
                Node::constant(s.clone(), Const::Str(j.to_string())),
            );
            tree = Node::conditional(
                s.clone(),
                cond,
                Node::constant(s.clone(), Const::Str(j.to_string())),
                tree,
            );
        }
        let compiled = compile(tree, &[("field", StaticType::String)], &settings()).unwrap();

        for field in ["z", "0"] {
            let expected = (0..n)
                .map(|j| j.to_string())
                .find(|j| j.as_str() == field)
                .unwrap_or_else(|| field.to_string());

            let mut ev = Evaluator::new(&compiled);
            ev.set("field", RtValue::Str(field.to_string()));
            match ev.run() {
                Ok(RtValue::Str(got)) => assert_eq!(got, expected, "n={n} field={field}"),
                other => panic!("n={n} field={field}: unexpected result {other:?}"),
            }
        }
    }
    Ok(())
}

#[test]
fn lowering_plan_fully_determines_the_decision() -> Result<()> {
    let (_, s) = source("z = b ? 2 : 4.0f");
    let rhs = Node::conditional(
        s.clone(),
        Node::var(s.clone(), "b"),
        Node::constant(s.clone(), Const::Int(2)),
        Node::constant(s.clone(), Const::Float(4.0)),
    );
    let tree = Node::assign(s.clone(), Node::var(s.clone(), "z"), rhs);
    let scope = [("b", StaticType::Bool), ("z", StaticType::Double)];
    let compiled = compile(tree, &scope, &settings()).unwrap();
    let plan = compiled.plan();

    // Root step is the store, with the pre/post flag and no compound part.
    let root = &plan.steps()[plan.root_step()];
    match &root.op {
        StepOp::Store {
            target,
            post_if_read,
            compound,
        } => {
            assert_eq!(*target, StoreTarget::Var("z".to_string()));
            assert!(!*post_if_read);
            assert!(compound.is_none());
        }
        other => panic!("expected a store at the root, got {other:?}"),
    }
    assert_eq!(root.ty, StaticType::Double);

    // The branch widening and the assignment widening both appear as
    // explicit conversion steps; nothing is left to re-derive.
    assert!(plan.steps().iter().any(|step| matches!(
        &step.op,
        StepOp::Convert {
            kind: ConversionKind::ImplicitWiden,
            to: StaticType::Float
        }
    )));
    assert!(plan.steps().iter().any(|step| matches!(
        &step.op,
        StepOp::Convert {
            kind: ConversionKind::ImplicitWiden,
            to: StaticType::Double
        }
    )));

    let select = plan
        .steps()
        .iter()
        .find(|step| matches!(step.op, StepOp::Select))
        .expect("conditional lowers to a select step");
    assert_eq!(select.ty, StaticType::Float);
    Ok(())
}
