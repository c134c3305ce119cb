use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::adapter::ProcessAdapter;
use crate::plan::DatasetSpec;

/// Generated event logs, stored under the SHA-256 of what produced them.
///
/// Materializing the same dataset twice reuses the first artifact. Writes go
/// to a temporary file that is renamed into place, so a crashed generation
/// never leaves a truncated artifact behind.
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Content key of a dataset: formula, program and arguments.
    pub fn key(dataset: &DatasetSpec) -> String {
        let mut hasher = Sha256::new();
        let spec = &dataset.generator;
        for part in [dataset.formula.as_str(), spec.program.as_str()]
            .into_iter()
            .chain(spec.args.iter().map(String::as_str))
        {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn path_for(&self, dataset: &DatasetSpec) -> PathBuf {
        self.dir.join(format!("{}.log", Self::key(dataset)))
    }

    /// Path of the dataset's log, running the generator only when it is not
    /// cached yet.
    pub fn materialize(
        &self,
        dataset: &DatasetSpec,
        adapter: &dyn ProcessAdapter,
    ) -> Result<PathBuf> {
        let path = self.path_for(dataset);
        if path.is_file() {
            tracing::debug!(domain = "data", dataset = %dataset.name, path = %path.display(), "cache hit");
            return Ok(path);
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating cache dir {}", self.dir.display()))?;

        let bytes = adapter
            .run(&dataset.generator)
            .with_context(|| format!("generating dataset '{}'", dataset.name))?;
        write_atomic(&path, &bytes)?;
        tracing::info!(
            domain = "data",
            dataset = %dataset.name,
            bytes = bytes.len(),
            path = %path.display(),
            "dataset generated"
        );
        Ok(path)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::plan::GeneratorSpec;

    struct FakeAdapter {
        calls: Cell<u32>,
    }

    impl ProcessAdapter for FakeAdapter {
        fn run(&self, spec: &GeneratorSpec) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            Ok(format!("# {}\nA(1), tp=0\n", spec.args.join(" ")).into_bytes())
        }
    }

    struct FailingAdapter;

    impl ProcessAdapter for FailingAdapter {
        fn run(&self, _spec: &GeneratorSpec) -> Result<Vec<u8>> {
            anyhow::bail!("generator crashed")
        }
    }

    fn dataset(formula: &str, args: &[&str]) -> DatasetSpec {
        DatasetSpec {
            name: "d".into(),
            formula: formula.into(),
            generator: GeneratorSpec {
                program: "gen".into(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
        }
    }

    #[test]
    fn second_materialize_is_a_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path().join("cache"));
        let adapter = FakeAdapter { calls: Cell::new(0) };
        let ds = dataset("A(x)", &["-e", "10"]);

        let first = cache.materialize(&ds, &adapter).unwrap();
        let second = cache.materialize(&ds, &adapter).unwrap();
        assert_eq!(first, second);
        assert_eq!(adapter.calls.get(), 1);
        assert!(fs::read_to_string(&first).unwrap().contains("-e 10"));
    }

    #[test]
    fn key_depends_on_formula_and_generator() {
        let base = ArtifactCache::key(&dataset("A(x)", &["1"]));
        assert_eq!(base.len(), 64);
        assert!(base.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        assert_eq!(hex::decode(&base).unwrap().len(), 32);
        assert_eq!(base, ArtifactCache::key(&dataset("A(x)", &["1"])));
        assert_ne!(base, ArtifactCache::key(&dataset("B(x)", &["1"])));
        assert_ne!(base, ArtifactCache::key(&dataset("A(x)", &["1", "2"])));
        // argument boundaries are part of the key
        assert_ne!(
            ArtifactCache::key(&dataset("A(x)", &["ab"])),
            ArtifactCache::key(&dataset("A(x)", &["a", "b"]))
        );
    }

    #[test]
    fn failed_generation_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let ds = dataset("A(x)", &[]);
        assert!(cache.materialize(&ds, &FailingAdapter).is_err());
        assert!(!cache.path_for(&ds).exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
