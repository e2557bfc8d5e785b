/*!
 * Allocator Configuration
 *
 * Page sizing and failure-handling knobs for the sub-allocator.
 */

use super::limits::{DEFAULT_HEAP_SIZE_DIVIDER, DEFAULT_MAX_PAGE_SIZE};
use super::types::DeviceSize;
use log::warn;
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`AllocatorConfig::max_page_size`]
pub const ENV_MAX_PAGE_SIZE: &str = "SUBALLOC_MAX_PAGE_SIZE";
/// Environment variable overriding [`AllocatorConfig::heap_size_divider`]
pub const ENV_HEAP_DIVIDER: &str = "SUBALLOC_HEAP_DIVIDER";
/// Environment variable overriding [`AllocatorConfig::retry_exact_size`]
pub const ENV_RETRY_EXACT: &str = "SUBALLOC_RETRY_EXACT";

/// Sub-allocator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Cap on the heuristic page size (default: 256MB)
    pub max_page_size: DeviceSize,

    /// New pages take `heap_size / heap_size_divider` bytes (default: 10)
    pub heap_size_divider: DeviceSize,

    /// Retry a failed page request once with the exact requested size
    pub retry_exact_size: bool,
}

impl AllocatorConfig {
    /// Create default configuration
    pub fn new() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            heap_size_divider: DEFAULT_HEAP_SIZE_DIVIDER,
            retry_exact_size: false,
        }
    }

    /// Load configuration from `SUBALLOC_*` environment variables
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(raw) = lookup(ENV_MAX_PAGE_SIZE) {
            match raw.trim().parse::<DeviceSize>() {
                Ok(value) if value > 0 => config.max_page_size = value,
                _ => warn!("Ignoring invalid {}={:?}", ENV_MAX_PAGE_SIZE, raw),
            }
        }

        if let Some(raw) = lookup(ENV_HEAP_DIVIDER) {
            match raw.trim().parse::<DeviceSize>() {
                Ok(value) if value > 0 => config.heap_size_divider = value,
                _ => warn!("Ignoring invalid {}={:?}", ENV_HEAP_DIVIDER, raw),
            }
        }

        if let Some(raw) = lookup(ENV_RETRY_EXACT) {
            match raw.trim() {
                "1" | "true" => config.retry_exact_size = true,
                "0" | "false" => config.retry_exact_size = false,
                _ => warn!("Ignoring invalid {}={:?}", ENV_RETRY_EXACT, raw),
            }
        }

        config
    }

    pub fn with_max_page_size(mut self, size: DeviceSize) -> Self {
        self.max_page_size = size;
        self
    }

    /// Zero is ignored with a warning, as it is for `SUBALLOC_HEAP_DIVIDER`
    pub fn with_heap_size_divider(mut self, divider: DeviceSize) -> Self {
        if divider == 0 {
            warn!("Ignoring heap size divider 0, keeping {}", self.heap_size_divider);
        } else {
            self.heap_size_divider = divider;
        }
        self
    }

    pub fn with_retry_exact_size(mut self, retry: bool) -> Self {
        self.retry_exact_size = retry;
        self
    }

    /// Size of a new page for a heap of `heap_size` bytes serving a request of `required` bytes
    pub fn page_size(&self, heap_size: DeviceSize, required: DeviceSize) -> DeviceSize {
        (heap_size / self.heap_size_divider.max(1))
            .min(self.max_page_size)
            .max(required)
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::new()
    }
}
