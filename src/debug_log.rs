/// Emits a trace event for a single type checker step, only when the `tycheck_debug` feature is
/// enabled
#[macro_export]
macro_rules! tycheck_debug {
    ($($arg:tt)*) => {
        {
            #[cfg(feature = "tycheck_debug")]
            ::tracing::trace!(target: "tyelab::tycheck", $($arg)*);
        }
    };
}
