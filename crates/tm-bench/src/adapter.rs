use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::plan::GeneratorSpec;

/// Runs an external generator and returns what it wrote to stdout.
pub trait ProcessAdapter {
    fn run(&self, spec: &GeneratorSpec) -> Result<Vec<u8>>;
}

/// Spawns the generator as a child process.
#[derive(Debug, Default)]
pub struct CommandAdapter;

impl ProcessAdapter for CommandAdapter {
    fn run(&self, spec: &GeneratorSpec) -> Result<Vec<u8>> {
        let output = Command::new(&spec.program)
            .args(&spec.args)
            .output()
            .with_context(|| format!("spawning generator '{}'", spec.program))?;
        if !output.status.success() {
            bail!(
                "generator '{}' exited with {}: {}",
                spec.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let spec = GeneratorSpec {
            program: "sh".into(),
            args: vec!["-c".into(), "printf 'A(1), tp=0\\n'".into()],
        };
        assert_eq!(CommandAdapter.run(&spec).unwrap(), b"A(1), tp=0\n");
    }

    #[test]
    fn failing_generator_is_an_error() {
        let spec = GeneratorSpec {
            program: "sh".into(),
            args: vec!["-c".into(), "echo boom >&2; exit 3".into()],
        };
        let err = CommandAdapter.run(&spec).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
