//! Runtime configuration
//!
//! Engine limits applied when a [`Runtime`](crate::Runtime) is created.
//! Unset fields keep the engine defaults.

/// Environment variable for the engine heap limit in bytes
pub const ENV_MEMORY_LIMIT: &str = "JSBRIDGE_MEMORY_LIMIT";
/// Environment variable for the engine stack limit in bytes
pub const ENV_MAX_STACK_SIZE: &str = "JSBRIDGE_MAX_STACK_SIZE";
/// Environment variable for the allocation threshold that triggers a collection
pub const ENV_GC_THRESHOLD: &str = "JSBRIDGE_GC_THRESHOLD";

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to something that is not a byte count
    #[error("Invalid value for {name}: '{value}' is not a byte count")]
    InvalidNumber {
        /// Variable name
        name: String,
        /// Offending value
        value: String,
    },
}

/// Options for creating a Runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Maximum engine heap size in bytes (None = unlimited)
    pub memory_limit: Option<usize>,

    /// Maximum engine stack size in bytes (None = engine default)
    pub max_stack_size: Option<usize>,

    /// Allocation threshold for automatic collection (None = engine default)
    pub gc_threshold: Option<usize>,
}

impl RuntimeOptions {
    /// Options with a heap limit
    pub fn with_memory_limit(memory_limit: usize) -> Self {
        Self {
            memory_limit: Some(memory_limit),
            ..Default::default()
        }
    }

    /// Options with a stack limit
    pub fn with_max_stack_size(max_stack_size: usize) -> Self {
        Self {
            max_stack_size: Some(max_stack_size),
            ..Default::default()
        }
    }

    /// Options with a collection threshold
    pub fn with_gc_threshold(gc_threshold: usize) -> Self {
        Self {
            gc_threshold: Some(gc_threshold),
            ..Default::default()
        }
    }

    /// Read options from `JSBRIDGE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read options through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            memory_limit: parse_bytes(ENV_MEMORY_LIMIT, lookup(ENV_MEMORY_LIMIT))?,
            max_stack_size: parse_bytes(ENV_MAX_STACK_SIZE, lookup(ENV_MAX_STACK_SIZE))?,
            gc_threshold: parse_bytes(ENV_GC_THRESHOLD, lookup(ENV_GC_THRESHOLD))?,
        })
    }

    /// Overlay the fields that are set in `other`
    pub fn merge(self, other: RuntimeOptions) -> Self {
        Self {
            memory_limit: other.memory_limit.or(self.memory_limit),
            max_stack_size: other.max_stack_size.or(self.max_stack_size),
            gc_threshold: other.gc_threshold.or(self.gc_threshold),
        }
    }
}

fn parse_bytes(name: &str, raw: Option<String>) -> Result<Option<usize>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<usize>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber {
            name: name.to_string(),
            value: raw.clone(),
        })
}
