use std::fmt::Write;

use crate::ast::Value;
use crate::plan::{ArgPattern, NodeId, NodeKind, Plan};

/// Render a compiled plan as an indented operator tree, root first.
///
/// ```text
/// output (a, b, c), look-ahead 7
/// #6 JOIN on (a, c) -> (a, b, c)
///   #3 JOIN on (b) -> (a, b, c)
///   ...
/// ```
pub fn explain_plan(plan: &Plan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "output ({}), look-ahead {}",
        plan.output_columns().join(", "),
        plan.future_horizon()
    );
    render(plan, plan.root_id(), 0, &mut out);
    out
}

fn render(plan: &Plan, id: NodeId, depth: usize, out: &mut String) {
    let node = plan.node(id);
    let cols = node.columns.join(", ");
    let indent = "  ".repeat(depth);
    let label = match &node.kind {
        NodeKind::Predicate { name, pattern } => {
            let args: Vec<String> = pattern
                .iter()
                .map(|p| match p {
                    ArgPattern::Bind(c) | ArgPattern::Same(c) => node.columns[*c].clone(),
                    ArgPattern::Const(Value::Str(s)) => format!("'{s}'"),
                    ArgPattern::Const(v) => v.to_string(),
                })
                .collect();
            format!("SCAN {name}({})", args.join(","))
        }
        NodeKind::Const { rows } => format!("CONST {} row(s)", rows.len()),
        NodeKind::Join { left_key, .. } => {
            let left = plan.node(node.inputs[0]);
            format!("JOIN on ({})", key_names(&left.columns, left_key))
        }
        NodeKind::AntiJoin { left_key, .. } => {
            let left = plan.node(node.inputs[0]);
            format!("ANTI-JOIN on ({})", key_names(&left.columns, left_key))
        }
        NodeKind::Union { .. } => "UNION".to_string(),
        NodeKind::Project { .. } => "PROJECT".to_string(),
        NodeKind::Filter { left, right, equal } => {
            let child = plan.node(node.inputs[0]);
            let op = if *equal { "=" } else { "!=" };
            format!("FILTER {} {op} {}", child.columns[*left], child.columns[*right])
        }
        NodeKind::Extend { source } => {
            let child = plan.node(node.inputs[0]);
            format!("EXTEND copy of {}", child.columns[*source])
        }
        NodeKind::Once(iv) => format!("ONCE{iv}"),
        NodeKind::Eventually(iv) => format!("EVENTUALLY{iv}"),
        NodeKind::Prev(iv) => format!("PREVIOUS{iv}"),
        NodeKind::Next(iv) => format!("NEXT{iv}"),
        NodeKind::Since {
            interval,
            negated,
            left_key,
            ..
        } => {
            let left = plan.node(node.inputs[0]);
            let not = if *negated { "NOT-" } else { "" };
            format!("{not}SINCE{interval} on ({})", key_names(&left.columns, left_key))
        }
        NodeKind::Until {
            interval,
            negated,
            left_key,
            ..
        } => {
            let left = plan.node(node.inputs[0]);
            let not = if *negated { "NOT-" } else { "" };
            format!("{not}UNTIL{interval} on ({})", key_names(&left.columns, left_key))
        }
    };
    let _ = writeln!(out, "{indent}#{id} {label} -> ({cols})");
    for input in &node.inputs {
        render(plan, *input, depth + 1, out);
    }
}

fn key_names(columns: &[String], key: &[usize]) -> String {
    key.iter()
        .map(|i| columns[*i].as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile, parse_formula};

    #[test]
    fn explain_lists_every_node_once() {
        let plan = compile(&parse_formula("A(a,b) AND NOT ONCE[0,3] B(b,'x')").unwrap()).unwrap();
        let text = explain_plan(&plan);
        assert!(text.starts_with("output (a, b), look-ahead 0"));
        assert!(text.contains("#3 ANTI-JOIN on (b) -> (a, b)"));
        assert!(text.contains("    #1 SCAN B(b,'x') -> (b)"));
        assert_eq!(text.lines().count(), 1 + plan.nodes.len());
    }

    #[test]
    fn explain_labels_since_until_and_equality() {
        let plan = compile(
            &parse_formula("(NOT A(x)) SINCE[0,3] B(x,y) AND y = 2 AND C(x) UNTIL[1,4] D(x)")
                .unwrap(),
        )
        .unwrap();
        let text = explain_plan(&plan);
        assert!(text.starts_with("output (x, y), look-ahead 4"), "{text}");
        assert!(text.contains("NOT-SINCE[0,3] on (x) -> (x, y)"), "{text}");
        assert!(text.contains("UNTIL[1,4] on (x) -> (x)"), "{text}");
        assert!(text.contains("CONST 1 row(s) -> (y)"), "{text}");
    }
}
