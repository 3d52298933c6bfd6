/// Domain-aware logging macros.
///
/// Each macro injects a `domain` field automatically so callers never need to
/// remember the string literal. The domain value is one of: `sys`, `eval`,
/// `exec`, `conf`.
///
/// # Usage
///
/// ```ignore
/// ae_info!(sys, timeout = ?cfg.timeout(), "evaluator ready");
/// ae_warn!(exec, org_id, timeout = ?dur, "backend call timed out");
/// ae_debug!(eval, condition = %c.condition, results = n, "condition evaluated");
/// ```
///
/// The domain identifier is a bare identifier, not a string; the macro
/// converts it to a `&str` literal.

// ---------------------------------------------------------------------------
// Core macro: dispatches to the matching tracing level macro.
// ---------------------------------------------------------------------------

/// Internal helper. Do not call directly; use `ae_error!` … `ae_trace!`.
#[doc(hidden)]
macro_rules! ae_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

// ---------------------------------------------------------------------------
// Public per-level macros
// ---------------------------------------------------------------------------

/// Log at ERROR level with an automatic `domain` field.
macro_rules! ae_error {
    ($domain:ident, $($rest:tt)*) => {
        ae_log!(error, $domain, $($rest)*)
    };
}

/// Log at WARN level with an automatic `domain` field.
macro_rules! ae_warn {
    ($domain:ident, $($rest:tt)*) => {
        ae_log!(warn, $domain, $($rest)*)
    };
}

/// Log at INFO level with an automatic `domain` field.
macro_rules! ae_info {
    ($domain:ident, $($rest:tt)*) => {
        ae_log!(info, $domain, $($rest)*)
    };
}

/// Log at DEBUG level with an automatic `domain` field.
macro_rules! ae_debug {
    ($domain:ident, $($rest:tt)*) => {
        ae_log!(debug, $domain, $($rest)*)
    };
}

/// Log at TRACE level with an automatic `domain` field.
#[allow(unused_macros)]
macro_rules! ae_trace {
    ($domain:ident, $($rest:tt)*) => {
        ae_log!(trace, $domain, $($rest)*)
    };
}
