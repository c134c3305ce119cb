use super::compile;
use crate::ast::{Interval, Value};
use crate::error::FormulaError;
use crate::formula_parser::parse_formula;
use crate::plan::{ArgPattern, NodeKind, Plan};

fn plan_of(src: &str) -> Plan {
    compile(&parse_formula(src).unwrap()).unwrap()
}

fn reject(src: &str) -> String {
    match compile(&parse_formula(src).unwrap()) {
        Err(FormulaError::Unmonitorable { reason }) => reason,
        other => panic!("expected an unmonitorable error, got {other:?}"),
    }
}

// -----------------------------------------------------------------------
// Layout
// -----------------------------------------------------------------------

#[test]
fn predicate_binds_first_occurrences() {
    let plan = plan_of("P(x, 3, x, y)");
    assert_eq!(plan.nodes.len(), 1);
    assert_eq!(plan.output_columns(), ["x", "y"]);
    match &plan.root().kind {
        NodeKind::Predicate { name, pattern } => {
            assert_eq!(name, "P");
            assert_eq!(
                pattern,
                &vec![
                    ArgPattern::Bind(0),
                    ArgPattern::Const(Value::Int(3)),
                    ArgPattern::Same(0),
                    ArgPattern::Bind(1),
                ]
            );
        }
        other => panic!("unexpected root {other:?}"),
    }
    assert_eq!(plan.root().exchange_key, None);
}

#[test]
fn join_keys_on_shared_variables() {
    let plan = plan_of("A(a,b) AND B(b,c)");
    assert_eq!(plan.output_columns(), ["a", "b", "c"]);
    match &plan.root().kind {
        NodeKind::Join {
            left_key,
            right_key,
            right_extra,
        } => {
            assert_eq!(left_key, &vec![1]);
            assert_eq!(right_key, &vec![0]);
            assert_eq!(right_extra, &vec![1]);
        }
        other => panic!("unexpected root {other:?}"),
    }
    assert_eq!(plan.node(0).exchange_key, Some(vec![1]));
    assert_eq!(plan.node(1).exchange_key, Some(vec![0]));
}

#[test]
fn triangle_plan_is_topologically_ordered() {
    let plan = plan_of("((ONCE[0,7] A(a,b)) AND B(b,c)) AND EVENTUALLY[0,7] C(c,a)");
    for node in &plan.nodes {
        assert!(node.inputs.iter().all(|i| *i < node.id));
    }
    assert_eq!(plan.output_columns(), ["a", "b", "c"]);
    assert_eq!(plan.predicates(), vec!["A", "B", "C"]);
    assert_eq!(plan.future_horizon(), 7);

    // the outer join shares a and c with the EVENTUALLY side
    match &plan.root().kind {
        NodeKind::Join { left_key, right_key, right_extra } => {
            assert_eq!(left_key, &vec![0, 2]);
            assert_eq!(right_key, &vec![1, 0]);
            assert!(right_extra.is_empty());
        }
        other => panic!("unexpected root {other:?}"),
    }
}

#[test]
fn negated_conjunct_becomes_anti_join() {
    let plan = plan_of("A(a,b) AND NOT EVENTUALLY[0,7] C(b)");
    assert!(matches!(plan.root().kind, NodeKind::AntiJoin { .. }));
    assert_eq!(plan.output_columns(), ["a", "b"]);
}

#[test]
fn leading_negation_is_reordered() {
    let left = plan_of("NOT C(b) AND A(a,b)");
    let right = plan_of("A(a,b) AND NOT C(b)");
    assert_eq!(left.root().kind, right.root().kind);
    assert_eq!(left.output_columns(), right.output_columns());
}

#[test]
fn union_permutes_right_columns() {
    let plan = plan_of("A(x,y) OR B(y,x)");
    assert_eq!(
        plan.root().kind,
        NodeKind::Union {
            right_perm: vec![1, 0]
        }
    );
    assert_eq!(plan.node(1).exchange_key, Some(vec![1, 0]));
}

#[test]
fn exists_projects_away_bound_variables() {
    let plan = plan_of("EXISTS b. A(a,b)");
    assert_eq!(plan.output_columns(), ["a"]);
    assert_eq!(plan.root().kind, NodeKind::Project { keep: vec![0] });
}

#[test]
fn temporal_operators_keep_child_layout() {
    let plan = plan_of("ONCE[2,*) A(a,b)");
    assert_eq!(plan.root().kind, NodeKind::Once(Interval::unbounded(2)));
    assert_eq!(plan.node(0).exchange_key, Some(vec![0, 1]));
}

#[test]
fn since_and_until_key_on_left_variables() {
    let plan = plan_of("A(x) SINCE[0,5] B(y,x)");
    assert_eq!(plan.output_columns(), ["y", "x"]);
    assert_eq!(
        plan.root().kind,
        NodeKind::Since {
            interval: Interval::bounded(0, 5),
            negated: false,
            left_key: vec![0],
            right_key: vec![1],
        }
    );
    assert_eq!(plan.node(0).exchange_key, Some(vec![0]));
    assert_eq!(plan.node(1).exchange_key, Some(vec![1]));

    let plan = plan_of("(NOT A(x)) UNTIL[0,5] B(x)");
    assert!(matches!(
        plan.root().kind,
        NodeKind::Until { negated: true, .. }
    ));
    assert_eq!(plan.future_horizon(), 5);
}

#[test]
fn previous_and_next_keep_child_layout() {
    let plan = plan_of("PREVIOUS[0,3] A(x)");
    assert_eq!(plan.root().kind, NodeKind::Prev(Interval::bounded(0, 3)));
    let plan = plan_of("NEXT[0,3] A(x,y)");
    assert_eq!(plan.root().kind, NodeKind::Next(Interval::bounded(0, 3)));
    assert_eq!(plan.node(0).exchange_key, Some(vec![0, 1]));
}

#[test]
fn constant_equality_joins_a_fixed_row() {
    let plan = plan_of("A(x) AND x = 3");
    assert_eq!(plan.output_columns(), ["x"]);
    assert_eq!(
        plan.node(1).kind,
        NodeKind::Const {
            rows: vec![vec![Value::Int(3)]]
        }
    );
    assert!(matches!(plan.root().kind, NodeKind::Join { .. }));

    let plan = plan_of("A(x) AND NOT x = 'a'");
    assert!(matches!(plan.root().kind, NodeKind::AntiJoin { .. }));
}

#[test]
fn variable_equality_filters_or_extends() {
    let plan = plan_of("A(x,y) AND NOT x = y");
    assert_eq!(
        plan.root().kind,
        NodeKind::Filter {
            left: 0,
            right: 1,
            equal: false
        }
    );
    let plan = plan_of("z = x AND A(x)");
    assert_eq!(plan.output_columns(), ["x", "z"]);
    assert_eq!(plan.root().kind, NodeKind::Extend { source: 0 });
}

#[test]
fn truth_constants_have_no_columns() {
    assert_eq!(plan_of("TRUE").root().kind, NodeKind::Const { rows: vec![vec![]] });
    assert_eq!(plan_of("FALSE").root().kind, NodeKind::Const { rows: vec![] });
    assert!(plan_of("A(x) AND TRUE").output_columns() == ["x"]);
}

// -----------------------------------------------------------------------
// Rejections
// -----------------------------------------------------------------------

#[test]
fn since_left_variables_must_be_bound_on_the_right() {
    let reason = reject("A(x,z) SINCE B(x)");
    assert!(reason.contains("variable z"), "{reason}");
}

#[test]
fn unbounded_until_is_rejected() {
    reject("A(x) UNTIL B(x)");
}

#[test]
fn free_variable_equality_is_rejected() {
    reject("x = y");
    reject("A(x) AND NOT y = z");
    reject("A(x) AND NOT x = y");
}

#[test]
fn bare_negation_is_rejected() {
    reject("NOT A(x)");
}

#[test]
fn negation_with_unbound_variable_is_rejected() {
    let reason = reject("B(b,c) AND NOT EVENTUALLY[0,7] C(c,a)");
    assert!(reason.contains("variable a"), "{reason}");
}

#[test]
fn double_negation_conjunction_is_rejected() {
    reject("NOT A(x) AND NOT B(x)");
}

#[test]
fn unbounded_eventually_is_rejected() {
    reject("EVENTUALLY[0,*) A(x)");
}

#[test]
fn disjunction_needs_same_variables() {
    reject("A(x) OR B(y)");
}

#[test]
fn exists_over_non_free_variable_is_rejected() {
    reject("EXISTS z. A(x)");
}
