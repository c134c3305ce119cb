//! End-to-end runs: event log → ingest → sharded workers → emitter → sink.

use std::fmt::Write as _;

use tm_config::{MonitorConfig, OutputFormat};
use tm_core::event::Verdict;
use tm_core::output::{CollectSink, WriterSink};
use tm_runtime::{InputSource, RunReport, run_monitor};

const TRIANGLE: &str = "((ONCE[0,7] A(a,b)) AND B(b,c)) AND EVENTUALLY[0,7] C(c,a)";
const NEGATED: &str = "((ONCE[0,7] A(a,b)) AND B(b,c)) AND NOT EVENTUALLY[0,7] C(c,a)";

fn config(workers: usize) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.runtime.workers = workers;
    config.runtime.channel_capacity = 16;
    config
}

/// Events for 60 time-points, each block of four emitted in reverse order and
/// followed by a watermark for the block.
fn workload() -> String {
    let mut log = String::new();
    for block in 0..15u64 {
        for tp in (block * 4..block * 4 + 4).rev() {
            let ts = tp / 2;
            let x = tp % 5;
            let y = tp % 3;
            writeln!(log, "A({x},{y}), tp={tp}, ts={ts}").unwrap();
            writeln!(log, "B({y},{x}), tp={tp}, ts={ts}").unwrap();
            writeln!(log, "C({x},{}), tp={tp}, ts={ts}", tp % 4).unwrap();
            if tp % 7 == 0 {
                writeln!(log, "C({y},{x}), tp={tp}, ts={ts}").unwrap();
            }
        }
        writeln!(log, ">WATERMARK {}<", block * 4 + 3).unwrap();
    }
    log
}

async fn collect(
    config: &MonitorConfig,
    formula: &str,
    log: &str,
) -> (Vec<Verdict>, RunReport) {
    let sink = CollectSink::new();
    let report = run_monitor(
        config,
        formula,
        InputSource::from_bytes(log),
        Box::new(sink.clone()),
    )
    .await
    .expect("monitor run failed");
    (sink.snapshot(), report)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_and_four_workers_agree() {
    let log = workload();
    for formula in [
        TRIANGLE,
        NEGATED,
        "EXISTS c. (A(a,b) AND B(b,c))",
        "(NOT C(a,b)) SINCE[0,3] A(a,b)",
        "(NOT C(a,b)) UNTIL[0,2] A(a,b) AND NOT a = 0",
    ] {
        let (single, single_report) = collect(&config(1), formula, &log).await;
        let (sharded, sharded_report) = collect(&config(4), formula, &log).await;
        assert!(!single.is_empty(), "{formula} produced nothing");
        assert_eq!(single, sharded, "{formula}");
        assert_eq!(single_report.bindings, sharded_report.bindings);
        assert_eq!(single_report.sealed_points, 60);
        assert!(single.windows(2).all(|w| w[0].tp < w[1].tp));
    }
}

#[tokio::test]
async fn triangle_written_as_text() {
    let log = "\
A(1,2), tp=0, ts=0
B(2,3), tp=1, ts=3
C(3,1), tp=2, ts=6
B(2,4), tp=3, ts=9
X, tp=4, ts=20
";
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("verdicts.txt");
    let sink = WriterSink::create(&path, OutputFormat::Text).unwrap();
    let report = run_monitor(
        &config(2),
        TRIANGLE,
        InputSource::from_bytes(log),
        Box::new(sink),
    )
    .await
    .unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, "@3 (time point 1): (1,2,3)\n");
    assert_eq!(report.events, 5);
    assert_eq!(report.verdicts, 1);
    // ts 20 is still inside its own look-ahead window when the input ends
    assert_eq!(report.closed_at_end, 1);
    assert_eq!(report.unresolved, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn future_obligation_met_before_end_of_input_is_reported() {
    let log = "A(1), tp=0, ts=0
C(1), tp=0, ts=0
B(5), tp=1, ts=2
";
    for workers in [1, 4] {
        let (verdicts, report) =
            collect(&config(workers), "A(x) AND EVENTUALLY[0,7] C(x)", log).await;
        assert_eq!(verdicts.len(), 1, "{workers} workers");
        assert_eq!(verdicts[0].tp, 0);
        assert_eq!(verdicts[0].rows, vec![vec![tm_core::event::Value::Int(1)]]);
        assert_eq!(report.closed_at_end, 2);
        assert_eq!(report.unresolved, 0);
    }

    let log = format!("{log}A(2), tp=1, ts=2\n");
    let (verdicts, _) = collect(&config(2), "A(x) AND NOT EVENTUALLY[0,7] C(x)", &log).await;
    assert_eq!(
        verdicts.iter().map(|v| (v.tp, v.rows.len())).collect::<Vec<_>>(),
        vec![(1, 1)]
    );
}

#[tokio::test]
async fn since_and_previous_run_end_to_end() {
    let log = "login(u1), tp=0, ts=0
login(u2), tp=0, ts=0
active(u1), tp=1, ts=3
active(u1), tp=2, ts=5
tick, tp=3, ts=30
";
    let (verdicts, _) = collect(
        &config(2),
        "active(u) SINCE[1,10] login(u)",
        log,
    )
    .await;
    assert_eq!(
        verdicts.iter().map(|v| v.tp).collect::<Vec<_>>(),
        vec![1, 2]
    );

    let (verdicts, _) = collect(&config(2), "PREVIOUS[0,3] login(u) AND u = 'u2'", log).await;
    assert_eq!(verdicts.len(), 1);
    assert_eq!(verdicts[0].tp, 1);
}

#[tokio::test]
async fn jsonl_lines_name_variables() {
    let log = "A(1,'x'), tp=0\nA(2,'y'), tp=1\n";
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("verdicts.jsonl");
    let sink = WriterSink::create(&path, OutputFormat::Jsonl).unwrap();
    run_monitor(&config(1), "A(n,s)", InputSource::from_bytes(log), Box::new(sink))
        .await
        .unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = written
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["tp"], 1);
    assert_eq!(lines[1]["bindings"][0]["n"], 2);
    assert_eq!(lines[1]["bindings"][0]["s"], "y");
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let log = "\
A(1,2), tp=0, ts=0
garbage(((
A(3, tp=1
# comment

A(5,6), tp=2, ts=2
";
    let (verdicts, report) = collect(&config(1), "A(a,b)", log).await;
    assert_eq!(report.malformed, 2);
    assert_eq!(report.events, 2);
    assert_eq!(
        verdicts.iter().map(|v| v.tp).collect::<Vec<_>>(),
        vec![0, 2]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_events_are_dropped_and_counted() {
    let log = "\
A(1), tp=0, ts=0
A(2), tp=1, ts=1
>WATERMARK 1<
A(9), tp=0, ts=0
A(3), tp=2, ts=2
";
    let (verdicts, report) = collect(&config(2), "A(a)", log).await;
    assert_eq!(report.late_drops, 1);
    assert_eq!(verdicts.len(), 3);
    assert_eq!(verdicts[0].rows.len(), 1);
}

#[tokio::test]
async fn duplicate_watermarks_do_not_refinalize() {
    let log = "\
A(1), tp=0
>WATERMARK 0<
>WATERMARK 0<
A(2), tp=1
>watermark 1<
>WATERMARK 0<
";
    let (verdicts, report) = collect(&config(1), "A(a)", log).await;
    assert_eq!(verdicts.len(), 2);
    assert_eq!(report.duplicate_watermarks, 2);
    assert_eq!(report.sealed_points, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn implicit_watermarks_match_explicit_ones() {
    let log = workload();
    let (explicit, _) = collect(&config(4), TRIANGLE, &log).await;
    let stripped: String = log
        .lines()
        .filter(|l| !l.starts_with('>'))
        .map(|l| format!("{l}\n"))
        .collect();
    let mut cfg = config(4);
    cfg.ingest.max_delay = Some(4);
    let (implicit, report) = collect(&cfg, TRIANGLE, &stripped).await;
    assert_eq!(explicit, implicit);
    assert_eq!(report.late_drops, 0);
}

#[tokio::test]
async fn unmonitorable_formula_is_rejected() {
    let result = run_monitor(
        &config(1),
        "NOT A(x)",
        InputSource::from_bytes(""),
        Box::new(CollectSink::new()),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn unreadable_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_monitor(
        &config(1),
        "A(x)",
        InputSource::File(dir.path().join("missing.log")),
        Box::new(CollectSink::new()),
    )
    .await;
    assert!(result.is_err());
}
