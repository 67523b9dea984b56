//! Coordinator configuration, validation, and error types.

use std::error::Error;
use std::fmt;

use skein_core::SlotOwnership;

/// Smallest accepted worker stack size in bytes.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Upper bound on `max_threads`.
pub const MAX_THREADS_CAP: usize = 4096;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`CoordinatorConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_threads` is zero.
    ZeroMaxThreads,
    /// `max_threads` exceeds [`MAX_THREADS_CAP`].
    TooManyThreads {
        /// The configured value.
        configured: usize,
    },
    /// `thread_name_prefix` is empty.
    EmptyThreadName,
    /// `worker_stack_size` is below [`MIN_STACK_SIZE`].
    StackTooSmall {
        /// The configured value.
        configured: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroMaxThreads => write!(f, "max_threads must be at least 1"),
            Self::TooManyThreads { configured } => {
                write!(f, "max_threads {configured} exceeds cap of {MAX_THREADS_CAP}")
            }
            Self::EmptyThreadName => write!(f, "thread_name_prefix must not be empty"),
            Self::StackTooSmall { configured } => write!(
                f,
                "worker_stack_size {configured} is below minimum of {MIN_STACK_SIZE}"
            ),
        }
    }
}

impl Error for ConfigError {}

// ── CoordinatorConfig ──────────────────────────────────────────────

/// Configuration for a [`Coordinator`](crate::Coordinator).
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Largest `thread_count` accepted by `run()`. Default: 256.
    pub max_threads: usize,
    /// Worker thread names are `{prefix}-{ordinal}`. Default: `skein-worker`.
    pub thread_name_prefix: String,
    /// Worker stack size in bytes. `None` = platform default.
    pub worker_stack_size: Option<usize>,
    /// Ownership policy for untyped buffer writes from workers.
    /// Default: enforced in debug builds, unchecked in release builds.
    pub slot_ownership: SlotOwnership,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_threads: 256,
            thread_name_prefix: "skein-worker".into(),
            worker_stack_size: None,
            slot_ownership: SlotOwnership::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::ZeroMaxThreads);
        }
        if self.max_threads > MAX_THREADS_CAP {
            return Err(ConfigError::TooManyThreads {
                configured: self.max_threads,
            });
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        if let Some(size) = self.worker_stack_size {
            if size < MIN_STACK_SIZE {
                return Err(ConfigError::StackTooSmall { configured: size });
            }
        }
        Ok(())
    }

    /// A thread count matching the machine, clamped to `[1, max_threads]`.
    pub fn available_threads(&self) -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .clamp(1, self.max_threads.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        CoordinatorConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_max_threads_rejected() {
        let cfg = CoordinatorConfig {
            max_threads: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroMaxThreads));
    }

    #[test]
    fn oversized_pool_rejected() {
        let cfg = CoordinatorConfig {
            max_threads: MAX_THREADS_CAP + 1,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TooManyThreads { .. })
        ));
    }

    #[test]
    fn tiny_stack_rejected() {
        let cfg = CoordinatorConfig {
            worker_stack_size: Some(1024),
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::StackTooSmall { configured: 1024 })
        );
    }

    #[test]
    fn empty_prefix_rejected() {
        let cfg = CoordinatorConfig {
            thread_name_prefix: String::new(),
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyThreadName));
    }

    #[test]
    fn available_threads_respects_cap() {
        let cfg = CoordinatorConfig {
            max_threads: 1,
            ..Default::default()
        };
        assert_eq!(cfg.available_threads(), 1);
    }
}
