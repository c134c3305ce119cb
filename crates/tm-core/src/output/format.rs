use orion_error::ErrorOweBase;
use serde::Serialize;

use crate::error::{CoreReason, CoreResult};
use crate::event::{TimePoint, Timestamp, Verdict};

/// `@<ts> (time point <tp>): (v1,v2) (v3,v4)`
pub fn format_text(verdict: &Verdict) -> String {
    let mut line = format!("@{} (time point {}):", verdict.ts, verdict.tp);
    for row in &verdict.rows {
        line.push_str(" (");
        for (i, v) in row.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&v.to_string());
        }
        line.push(')');
    }
    line
}

#[derive(Serialize)]
struct VerdictLine {
    tp: TimePoint,
    ts: Timestamp,
    bindings: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// `{"tp":3,"ts":17,"bindings":[{"a":1,"b":"x"}]}`
pub fn format_jsonl(verdict: &Verdict) -> CoreResult<String> {
    let bindings = verdict
        .rows
        .iter()
        .map(|row| {
            verdict
                .columns
                .iter()
                .zip(row)
                .map(|(name, v)| Ok((name.clone(), serde_json::to_value(v)?)))
                .collect::<Result<serde_json::Map<_, _>, serde_json::Error>>()
        })
        .collect::<Result<Vec<_>, _>>()
        .owe(CoreReason::DataFormat)?;
    let line = VerdictLine {
        tp: verdict.tp,
        ts: verdict.ts,
        bindings,
    };
    serde_json::to_string(&line).owe(CoreReason::DataFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Stamp, Value};

    fn verdict() -> Verdict {
        Verdict::new(
            Stamp::new(3, 17),
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::Int(4), Value::Str("y".into())],
                vec![Value::Int(1), Value::Str("x".into())],
                vec![Value::Int(1), Value::Str("x".into())],
            ],
        )
    }

    #[test]
    fn text_line_is_sorted_and_deduplicated() {
        assert_eq!(
            format_text(&verdict()),
            "@17 (time point 3): (1,\"x\") (4,\"y\")"
        );
    }

    #[test]
    fn text_line_renders_negative_and_nullary_rows() {
        let v = Verdict::new(
            Stamp::new(0, 2),
            vec!["n".into()],
            vec![vec![Value::Int(-5)], vec![Value::Int(12)]],
        );
        assert_eq!(format_text(&v), "@2 (time point 0): (-5) (12)");
        let empty_row = Verdict::new(Stamp::new(1, 3), vec![], vec![vec![]]);
        assert_eq!(format_text(&empty_row), "@3 (time point 1): ()");
    }

    #[test]
    fn jsonl_line_names_columns() {
        let line = format_jsonl(&verdict()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["tp"], 3);
        assert_eq!(parsed["ts"], 17);
        assert_eq!(parsed["bindings"][0]["a"], 1);
        assert_eq!(parsed["bindings"][1]["b"], "y");
        assert_eq!(parsed["bindings"].as_array().unwrap().len(), 2);
    }
}
