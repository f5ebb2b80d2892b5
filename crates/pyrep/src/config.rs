//! Runtime configuration.
//!
//! [`RuntimeConfig`] collects the knobs that bound the work the dispatch core
//! will do on behalf of a caller: how long an MRO may get, how deep a single
//! inheritance chain may go, how many guards a call site may accumulate, how
//! large a single built-in result may grow, and whether unknown Rust types are
//! adopted on first sight.

use crate::exception::{ExcType, RunResult};

/// Maximum length of the Method Resolution Order (MRO) list for any type.
///
/// Limits the output of C3 linearization so that diamond-heavy hierarchies
/// cannot consume unbounded memory or CPU.
pub const MAX_MRO_LENGTH: usize = 2600;

/// Maximum depth of a single inheritance chain.
pub const MAX_INHERITANCE_DEPTH: usize = 1000;

/// Number of guarded targets a call site keeps before it stops specialising.
pub const DEFAULT_MAX_GUARD_CHAIN: usize = 8;

/// Largest result, in bytes, a built-in operation may allocate.
///
/// Operations like `1 << 2**62` or `"abc" * 2**60` estimate their result size
/// and are rejected with OverflowError before anything is allocated.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 1 << 28;

/// Configuration for a [`Runtime`](crate::Runtime).
///
/// Use `RuntimeConfig::default()` for the standard limits, or build custom
/// settings with the builder methods:
///
/// ```
/// use pyrep::RuntimeConfig;
///
/// let config = RuntimeConfig::new().max_guard_chain(2).found_classes(false);
/// assert_eq!(config.max_guard_chain, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Synthesize a guest type the first time an unregistered Rust type is seen.
    ///
    /// When disabled, dispatching on such a value fails with
    /// [`RunError::UnregisteredHostClass`](crate::RunError::UnregisteredHostClass).
    pub found_classes: bool,
    /// Maximum MRO length accepted when creating a type.
    pub max_mro_length: usize,
    /// Maximum depth of any base's MRO accepted when creating a type.
    pub max_inheritance_depth: usize,
    /// Maximum number of guards a call site installs.
    pub max_guard_chain: usize,
    /// Maximum estimated size of a string or integer produced by a built-in.
    pub max_result_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            found_classes: true,
            max_mro_length: MAX_MRO_LENGTH,
            max_inheritance_depth: MAX_INHERITANCE_DEPTH,
            max_guard_chain: DEFAULT_MAX_GUARD_CHAIN,
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }
}

impl RuntimeConfig {
    /// Creates a configuration with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables found-class synthesis.
    #[must_use]
    pub fn found_classes(mut self, enabled: bool) -> Self {
        self.found_classes = enabled;
        self
    }

    /// Sets the maximum MRO length.
    #[must_use]
    pub fn max_mro_length(mut self, limit: usize) -> Self {
        self.max_mro_length = limit;
        self
    }

    /// Sets the maximum inheritance depth.
    #[must_use]
    pub fn max_inheritance_depth(mut self, limit: usize) -> Self {
        self.max_inheritance_depth = limit;
        self
    }

    /// Sets the maximum number of guards per call site.
    ///
    /// Zero disables specialisation: every invocation takes the generic path.
    #[must_use]
    pub fn max_guard_chain(mut self, limit: usize) -> Self {
        self.max_guard_chain = limit;
        self
    }

    /// Sets the largest result a built-in operation may allocate.
    #[must_use]
    pub fn max_result_bytes(mut self, limit: usize) -> Self {
        self.max_result_bytes = limit;
        self
    }

    /// Rejects a result whose estimated size is unknown (`None`, the estimate
    /// itself overflowed) or above [`RuntimeConfig::max_result_bytes`].
    pub fn check_result_size(&self, estimated: Option<usize>, what: &str) -> RunResult<()> {
        match estimated {
            Some(bytes) if bytes <= self.max_result_bytes => Ok(()),
            _ => Err(ExcType::overflow_error(what)),
        }
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> RunResult<Self> {
        serde_json::from_str(json).map_err(|err| ExcType::value_error(format!("invalid runtime config: {err}")))
    }

    /// Serializes the configuration to JSON.
    pub fn to_json(&self) -> RunResult<String> {
        serde_json::to_string(self).map_err(|err| ExcType::value_error(format!("invalid runtime config: {err}")))
    }
}
