pub mod logging;
pub mod monitor;
pub mod types;
pub mod validate;

pub use logging::{LogFormat, LoggingConfig};
pub use monitor::{IngestConfig, MonitorConfig, OutputConfig, RuntimeConfig};
pub use types::{HumanDuration, OutputFormat, OutputMode};
