//! Process-wide tracing setup shared by the binaries.

/// Initialize tracing/logging from `RUST_LOG` and `LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    self::tracing::init(LogFormat::from_env());
}

pub use self::tracing::LogFormat;

/// Subscriber configuration (filter, formatter).
pub mod tracing;

#[cfg(test)]
mod tests {
    use super::LogFormat;

    #[test]
    fn log_format_is_reexported_from_the_local_module() {
        assert_eq!(LogFormat::default(), crate::tracing::LogFormat::Json);
    }
}
