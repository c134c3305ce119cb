use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// External command that writes an event log to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneratorSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    pub formula: String,
    pub generator: GeneratorSpec,
}

/// `bench.toml`: everything one benchmark session needs.
#[derive(Debug, Clone, Deserialize)]
pub struct BenchPlan {
    /// Generated logs live here, keyed by content hash.
    pub cache_dir: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: Vec<usize>,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    #[serde(default, rename = "dataset")]
    pub datasets: Vec<DatasetSpec>,
}

fn default_workers() -> Vec<usize> {
    vec![1]
}

fn default_repetitions() -> u32 {
    1
}

impl BenchPlan {
    /// Load a plan; a relative `cache_dir` resolves against the plan's
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading bench plan {}", path.display()))?;
        let mut plan = Self::parse(&text)?;
        if plan.cache_dir.is_relative() {
            if let Some(base) = path.parent() {
                plan.cache_dir = base.join(&plan.cache_dir);
            }
        }
        Ok(plan)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let plan: BenchPlan = toml::from_str(text).context("parsing bench plan")?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            bail!("bench plan has no [[dataset]] entries");
        }
        if self.workers.is_empty() || self.workers.contains(&0) {
            bail!("workers must list positive worker counts");
        }
        if self.repetitions == 0 {
            bail!("repetitions must be > 0");
        }
        let mut names = HashSet::new();
        for ds in &self.datasets {
            if !names.insert(ds.name.as_str()) {
                bail!("duplicate dataset name '{}'", ds.name);
            }
            if ds.generator.program.trim().is_empty() {
                bail!("dataset '{}': generator program is empty", ds.name);
            }
        }
        Ok(())
    }
}
