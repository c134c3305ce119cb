mod format;
mod sink;

pub use format::{format_jsonl, format_text};
pub use sink::{CollectSink, DiscardSink, ResultSink, WriterSink, open_sink};
