//! Log events under the `sds_subscriber` target.
//!
//! Each level macro expands to `emit!`. With the `tracing` feature that is a `tracing::event!`
//! at the given level. Without it the field values are borrowed once and nothing is recorded.
//!
//! Accepted shape: `name = value`, `name = %value` or `name = ?value` fields, then a message
//! literal.

#[cfg(feature = "tracing")]
macro_rules! emit {
    ($level:ident, $($arg:tt)+) => {
        tracing::event!(target: "sds_subscriber", tracing::Level::$level, $($arg)+)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! emit {
    ($level:ident, $message:literal) => {{
        let _ = $message;
    }};
    ($level:ident, $name:ident = % $value:expr, $($rest:tt)+) => {{
        let _ = &$value;
        emit!($level, $($rest)+)
    }};
    ($level:ident, $name:ident = ? $value:expr, $($rest:tt)+) => {{
        let _ = &$value;
        emit!($level, $($rest)+)
    }};
    ($level:ident, $name:ident = $value:expr, $($rest:tt)+) => {{
        let _ = &$value;
        emit!($level, $($rest)+)
    }};
}

#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)+) => { emit!(ERROR, $($arg)+) };
}

#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)+) => { emit!(WARN, $($arg)+) };
}

#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)+) => { emit!(INFO, $($arg)+) };
}

#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)+) => { emit!(DEBUG, $($arg)+) };
}

#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)+) => { emit!(TRACE, $($arg)+) };
}
