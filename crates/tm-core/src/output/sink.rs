use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use orion_error::prelude::*;
use orion_error::ErrorOweBase;
use tm_config::{OutputConfig, OutputFormat, OutputMode};

use crate::error::{CoreReason, CoreResult};
use crate::event::Verdict;

use super::format::{format_jsonl, format_text};

/// Destination for verdicts. Owned by the emitter, which calls `emit` in
/// time-point order and `flush` once at end of stream.
pub trait ResultSink: Send {
    fn emit(&mut self, verdict: &Verdict) -> CoreResult<()>;

    fn flush(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// Open the sink selected by the output section of the config.
pub fn open_sink(config: &OutputConfig) -> CoreResult<Box<dyn ResultSink>> {
    match config.mode {
        OutputMode::Stdout => Ok(Box::new(WriterSink::stdout(config.format))),
        OutputMode::Discard => Ok(Box::new(DiscardSink::default())),
        OutputMode::File => {
            let path = config.path.as_ref().ok_or_else(|| {
                StructError::from(CoreReason::ResultSink)
                    .with_detail("file output mode requires an output path")
            })?;
            Ok(Box::new(WriterSink::create(path, config.format)?))
        }
    }
}

// ---------------------------------------------------------------------------
// WriterSink
// ---------------------------------------------------------------------------

/// One line per verdict, text or JSON Lines.
pub struct WriterSink {
    writer: BufWriter<Box<dyn Write + Send>>,
    format: OutputFormat,
}

impl WriterSink {
    pub fn new(writer: Box<dyn Write + Send>, format: OutputFormat) -> Self {
        Self {
            writer: BufWriter::new(writer),
            format,
        }
    }

    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(Box::new(io::stdout()), format)
    }

    /// Create (or truncate) `path`, creating parent directories as needed.
    pub fn create(path: &Path, format: OutputFormat) -> CoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                StructError::from(CoreReason::ResultSink)
                    .with_detail(format!("create {}: {e}", parent.display()))
            })?;
        }
        let file = File::create(path).map_err(|e| {
            StructError::from(CoreReason::ResultSink)
                .with_detail(format!("open {}: {e}", path.display()))
        })?;
        Ok(Self::new(Box::new(file), format))
    }
}

impl ResultSink for WriterSink {
    fn emit(&mut self, verdict: &Verdict) -> CoreResult<()> {
        let line = match self.format {
            OutputFormat::Text => format_text(verdict),
            OutputFormat::Jsonl => format_jsonl(verdict)?,
        };
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .owe(CoreReason::ResultSink)
    }

    fn flush(&mut self) -> CoreResult<()> {
        self.writer.flush().owe(CoreReason::ResultSink)
    }
}

// ---------------------------------------------------------------------------
// DiscardSink
// ---------------------------------------------------------------------------

/// Drops verdicts, counting them. Used for benchmarking.
#[derive(Debug, Default)]
pub struct DiscardSink {
    pub verdicts: u64,
    pub bindings: u64,
}

impl ResultSink for DiscardSink {
    fn emit(&mut self, verdict: &Verdict) -> CoreResult<()> {
        self.verdicts += 1;
        self.bindings += verdict.rows.len() as u64;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CollectSink
// ---------------------------------------------------------------------------

/// Keeps verdicts in memory behind a shared handle.
#[derive(Debug, Default, Clone)]
pub struct CollectSink {
    verdicts: Arc<Mutex<Vec<Verdict>>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verdicts emitted so far.
    pub fn snapshot(&self) -> Vec<Verdict> {
        self.verdicts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ResultSink for CollectSink {
    fn emit(&mut self, verdict: &Verdict) -> CoreResult<()> {
        self.verdicts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(verdict.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Stamp, Value};

    fn verdict(tp: u64, vals: &[i64]) -> Verdict {
        Verdict::new(
            Stamp::new(tp, tp * 10),
            vec!["a".into()],
            vals.iter().map(|v| vec![Value::Int(*v)]).collect(),
        )
    }

    #[test]
    fn file_sink_writes_one_line_per_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/verdicts.txt");
        {
            let mut sink = WriterSink::create(&path, OutputFormat::Text).unwrap();
            sink.emit(&verdict(1, &[2, 1])).unwrap();
            sink.emit(&verdict(4, &[3])).unwrap();
            sink.flush().unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "@10 (time point 1): (1) (2)\n@40 (time point 4): (3)\n"
        );
    }

    #[test]
    fn file_sink_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verdicts.jsonl");
        std::fs::write(&path, "stale\n").unwrap();
        let mut sink = WriterSink::create(&path, OutputFormat::Jsonl).unwrap();
        sink.emit(&verdict(0, &[5])).unwrap();
        sink.flush().unwrap();
        drop(sink);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.starts_with("{\"tp\":0"));
    }

    #[test]
    fn discard_sink_counts() {
        let mut sink = DiscardSink::default();
        sink.emit(&verdict(0, &[1, 2])).unwrap();
        sink.emit(&verdict(1, &[1])).unwrap();
        assert_eq!(sink.verdicts, 2);
        assert_eq!(sink.bindings, 3);
    }

    #[test]
    fn collect_sink_shares_handle() {
        let sink = CollectSink::new();
        let mut boxed: Box<dyn ResultSink> = Box::new(sink.clone());
        boxed.emit(&verdict(2, &[7])).unwrap();
        let seen = sink.snapshot();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].tp, 2);
    }

    #[test]
    fn file_mode_without_path_is_rejected() {
        let config = OutputConfig {
            mode: OutputMode::File,
            path: None,
            format: OutputFormat::Text,
        };
        assert!(open_sink(&config).is_err());
    }
}
