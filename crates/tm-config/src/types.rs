use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// HumanDuration
// ---------------------------------------------------------------------------

/// A duration written as `"250ms"`, `"30s"`, `"5m"` or `"1h"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(Duration);

impl HumanDuration {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for HumanDuration {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl FromStr for HumanDuration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow::anyhow!("duration {s:?} is missing a unit (ms/s/m/h)"))?;
        let (digits, unit) = s.split_at(split);
        let value: u64 = digits
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid number in duration: {s:?}"))?;

        let duration = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            _ => anyhow::bail!("unsupported duration unit {unit:?} in {s:?} (expected ms/s/m/h)"),
        };
        Ok(Self(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_millis();
        if ms % 1000 != 0 {
            return write!(f, "{ms}ms");
        }
        let secs = self.0.as_secs();
        if secs != 0 && secs % 3600 == 0 {
            write!(f, "{}h", secs / 3600)
        } else if secs != 0 && secs % 60 == 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{secs}s")
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// OutputMode / OutputFormat
// ---------------------------------------------------------------------------

/// Where verdicts go. The numeric forms match the `-m` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// `0`: write to the configured output file.
    File,
    /// `1`: write to stdout.
    #[default]
    Stdout,
    /// `2`: evaluate but write nothing (timing runs).
    Discard,
}

impl FromStr for OutputMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "file" => Ok(OutputMode::File),
            "1" | "stdout" => Ok(OutputMode::Stdout),
            "2" | "discard" => Ok(OutputMode::Discard),
            other => anyhow::bail!("unknown output mode {other:?} (expected 0|1|2)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `@<ts> (time point <tp>): (v1,v2) ...`
    #[default]
    Text,
    /// One JSON object per verdict.
    Jsonl,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "jsonl" | "json" => Ok(OutputFormat::Jsonl),
            other => anyhow::bail!("unknown output format {other:?} (expected text|jsonl)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_units() {
        let d: HumanDuration = "250ms".parse().unwrap();
        assert_eq!(d.as_duration(), Duration::from_millis(250));
        let d: HumanDuration = "5m".parse().unwrap();
        assert_eq!(d.as_duration(), Duration::from_secs(300));
        assert!("5".parse::<HumanDuration>().is_err());
        assert!("5d".parse::<HumanDuration>().is_err());
    }

    #[test]
    fn duration_display_picks_largest_unit() {
        assert_eq!(HumanDuration::from(Duration::from_secs(7200)).to_string(), "2h");
        assert_eq!(HumanDuration::from(Duration::from_secs(90)).to_string(), "90s");
        assert_eq!(HumanDuration::from(Duration::from_millis(1500)).to_string(), "1500ms");
        assert_eq!(HumanDuration::from(Duration::ZERO).to_string(), "0s");
    }

    #[test]
    fn output_mode_accepts_numeric_flag() {
        assert_eq!("0".parse::<OutputMode>().unwrap(), OutputMode::File);
        assert_eq!("stdout".parse::<OutputMode>().unwrap(), OutputMode::Stdout);
        assert_eq!("2".parse::<OutputMode>().unwrap(), OutputMode::Discard);
        assert!("3".parse::<OutputMode>().is_err());
    }
}
