use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;

use tm_config::{MonitorConfig, OutputFormat, OutputMode};

#[derive(Parser, Debug)]
#[command(
    name = "tempomon",
    about = "Streaming MFOTL monitor with parallel workers",
    after_help = "Formula grammar: ONCE[lo,hi] f | EVENTUALLY[lo,hi] f | NOT f | f AND f | \
                  f OR f | EXISTS x,y. f | P(args) | (f)"
)]
pub struct Cli {
    /// Formula text, or the path of a file holding it
    pub formula: String,

    /// Event log; `-` or absent reads stdin
    pub input: Option<String>,

    /// Output mode: 0 file, 1 stdout, 2 discard
    #[arg(short = 'm', long = "mode")]
    pub mode: Option<String>,

    /// Number of parallel workers
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<usize>,

    /// Output file for mode 0
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Verdict format: text or jsonl
    #[arg(long)]
    pub format: Option<String>,

    /// Implicit watermark lag in time-points
    #[arg(long)]
    pub max_delay: Option<u64>,

    /// Path to tempomon.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the compiled operator plan and exit
    #[arg(long)]
    pub explain: bool,

    /// Log filter, e.g. `debug` or `info,tm_runtime=trace`
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Config file values (or defaults) with command-line overrides applied.
    pub fn resolve_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::load(path)?,
            None => MonitorConfig::default(),
        };
        if let Some(mode) = &self.mode {
            config.output.mode =
                OutputMode::from_str(mode).with_context(|| format!("invalid -m '{mode}'"))?;
        }
        if let Some(path) = &self.output {
            config.output.path = Some(path.clone());
            if self.mode.is_none() {
                config.output.mode = OutputMode::File;
            }
        }
        if let Some(format) = &self.format {
            config.output.format = OutputFormat::from_str(format)
                .with_context(|| format!("invalid --format '{format}'"))?;
        }
        if let Some(workers) = self.workers {
            config.runtime.workers = workers;
        }
        if let Some(delay) = self.max_delay {
            config.ingest.max_delay = Some(delay);
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        tm_config::validate::validate(&config)?;
        Ok(config)
    }

    /// The formula argument, read from disk when it names an existing file.
    pub fn formula_text(&self) -> Result<String> {
        let path = Path::new(&self.formula);
        if path.is_file() {
            std::fs::read_to_string(path)
                .with_context(|| format!("cannot read formula file {}", path.display()))
        } else {
            Ok(self.formula.clone())
        }
    }

    /// Directory relative log paths resolve against.
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tempomon").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&["A(x)", "log.txt", "-m", "2", "-w", "4", "--max-delay", "3"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.output.mode, OutputMode::Discard);
        assert_eq!(config.runtime.workers, 4);
        assert_eq!(config.ingest.max_delay, Some(3));
        assert_eq!(cli.input.as_deref(), Some("log.txt"));
    }

    #[test]
    fn output_path_implies_file_mode() {
        let cli = parse(&["A(x)", "-o", "out.txt", "--format", "jsonl"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.output.mode, OutputMode::File);
        assert_eq!(config.output.format, OutputFormat::Jsonl);
    }

    #[test]
    fn file_mode_without_path_fails_validation() {
        let cli = parse(&["A(x)", "-m", "0"]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let cli = parse(&["A(x)", "-w", "0"]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn bad_mode_rejected() {
        let cli = parse(&["A(x)", "-m", "7"]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn config_file_is_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tempomon.toml");
        std::fs::write(
            &path,
            "[runtime]\nworkers = 8\n\n[output]\nmode = \"discard\"\n",
        )
        .unwrap();
        let cli = parse(&["A(x)", "-c", path.to_str().unwrap(), "-w", "2"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.runtime.workers, 2);
        assert_eq!(config.output.mode, OutputMode::Discard);
        assert_eq!(cli.base_dir(), dir.path());
    }

    #[test]
    fn formula_may_come_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triangle.mfotl");
        std::fs::write(&path, "A(a,b) AND B(b,c)\n").unwrap();
        let cli = parse(&[path.to_str().unwrap()]);
        assert_eq!(cli.formula_text().unwrap().trim(), "A(a,b) AND B(b,c)");

        let inline = parse(&["ONCE[0,3] A(x)"]);
        assert_eq!(inline.formula_text().unwrap(), "ONCE[0,3] A(x)");
    }
}
