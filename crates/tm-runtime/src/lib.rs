#[macro_use]
mod log_macros;

mod emitter_task;
pub mod error;
mod ingest_task;
pub mod lifecycle;
pub mod metrics;
pub mod source;
pub mod tracing_init;
mod worker;

pub use lifecycle::{Monitor, run_monitor, wait_for_signal};
pub use metrics::RunReport;
pub use source::InputSource;
