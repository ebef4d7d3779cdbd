//! Logging with automatic file:line injection.
//!
//! The macros wrap the `log` facade and prefix every line with its source
//! location, e.g.
//!
//! ```text
//! [src/connectivity.rs:88] connectivity: got address 192.168.1.20
//! ```
//!
//! Entropy values and network secrets must never be passed to these macros.

#[doc(hidden)]
#[macro_export]
macro_rules! __located {
    ($level:ident, $($arg:tt)*) => {{
        const LOC: &str = concat!("[", file!(), ":", line!(), "]");
        ::log::$level!("{} {}", LOC, format_args!($($arg)*))
    }};
}

/// Info-level log with a `[file:line]` prefix.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::__located!(info, $($arg)*) };
}

/// Warning-level log with a `[file:line]` prefix.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::__located!(warn, $($arg)*) };
}

/// Error-level log with a `[file:line]` prefix.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__located!(error, $($arg)*) };
}

/// Debug-level log with a `[file:line]` prefix.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::__located!(debug, $($arg)*) };
}

/// Install the host log backend. Honours `RUST_LOG`, defaults to `info`.
/// Safe to call more than once; later calls are ignored.
#[cfg(feature = "desk")]
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
