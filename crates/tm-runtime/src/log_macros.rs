//! Logging macros that tag every event with a `domain` field.
//!
//! Domains: `sys` (lifecycle), `data` (input records), `pipe` (workers and
//! the shuffle exchange), `res` (verdict output), `conf` (configuration).
//!
//! ```ignore
//! tm_info!(sys, workers = 4, "monitor started");
//! tm_warn!(data, line = 12, error = %e, "skipping malformed record");
//! ```
//!
//! The domain is a bare identifier, turned into a string by the macro.

#[doc(hidden)]
macro_rules! tm_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

macro_rules! tm_error {
    ($domain:ident, $($rest:tt)*) => {
        tm_log!(error, $domain, $($rest)*)
    };
}

macro_rules! tm_warn {
    ($domain:ident, $($rest:tt)*) => {
        tm_log!(warn, $domain, $($rest)*)
    };
}

macro_rules! tm_info {
    ($domain:ident, $($rest:tt)*) => {
        tm_log!(info, $domain, $($rest)*)
    };
}

macro_rules! tm_debug {
    ($domain:ident, $($rest:tt)*) => {
        tm_log!(debug, $domain, $($rest)*)
    };
}

#[allow(unused_macros)]
macro_rules! tm_trace {
    ($domain:ident, $($rest:tt)*) => {
        tm_log!(trace, $domain, $($rest)*)
    };
}
