use crate::monitor::MonitorConfig;
use crate::types::OutputMode;

/// Reject configurations the runtime cannot start with.
pub fn validate(config: &MonitorConfig) -> anyhow::Result<()> {
    if config.runtime.workers == 0 {
        anyhow::bail!("runtime.workers must be at least 1");
    }
    if config.runtime.channel_capacity == 0 {
        anyhow::bail!("runtime.channel_capacity must be at least 1");
    }
    if config.runtime.shuffle_timeout.as_duration().is_zero() {
        anyhow::bail!("runtime.shuffle_timeout must be greater than zero");
    }
    if config.output.mode == OutputMode::File && config.output.path.is_none() {
        anyhow::bail!("output.mode = \"file\" requires output.path");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_rejected() {
        let mut cfg = MonitorConfig::default();
        cfg.runtime.workers = 0;
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn file_mode_requires_path() {
        let mut cfg = MonitorConfig::default();
        cfg.output.mode = OutputMode::File;
        assert!(validate(&cfg).is_err());
        cfg.output.path = Some("out.txt".into());
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&MonitorConfig::default()).is_ok());
    }
}
