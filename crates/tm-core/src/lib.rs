pub mod error;
pub mod event;
pub mod graph;
pub mod ingest;
pub mod operator;
pub mod output;
pub mod window;
