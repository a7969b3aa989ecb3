use serde::{Deserialize, Serialize};

/// How a sync conflict that the [`crate::domains::sync::conflict::ConflictResolver`]
/// could not auto-merge should be resolved when no interactive handler
/// answers in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Surface the conflict and wait for a handler (default).
    Ask,
    /// Always keep the local version.
    Local,
    /// Always keep the remote version.
    Remote,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        ConflictStrategy::Ask
    }
}

/// Configuration for the cloud sync core, matching the options table in the
/// specification's external interfaces section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote WebDAV endpoint root, e.g. `https://dav.example.com/remote.php/dav/files/me`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Remote folder prefix. Defaults to `/FlashNote/`.
    #[serde(default = "default_root_path")]
    pub root_path: String,
    /// Transport parallelism, capped at 3 regardless of what is configured here.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Minimum inter-request spacing, in milliseconds.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Per-request retry budget.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    /// Write a rolling debug log of sync activity to the data directory.
    #[serde(default)]
    pub enable_debug_log: bool,
}

fn default_root_path() -> String {
    "/FlashNote/".to_string()
}

const fn default_max_concurrency() -> usize {
    3
}

const fn default_request_delay_ms() -> u64 {
    200
}

const fn default_retry_attempts() -> u32 {
    3
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            root_path: default_root_path(),
            max_concurrency: default_max_concurrency(),
            request_delay_ms: default_request_delay_ms(),
            retry_attempts: default_retry_attempts(),
            conflict_strategy: ConflictStrategy::default(),
            enable_debug_log: false,
        }
    }

    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// The effective transport concurrency: never more than 3, per the
    /// remote request-rate budget.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.min(3).max(1)
    }

    /// Normalizes the root path so it always starts and ends with `/`.
    pub fn normalized_root(&self) -> String {
        let mut root = self.root_path.clone();
        if !root.starts_with('/') {
            root.insert(0, '/');
        }
        if !root.ends_with('/') {
            root.push('/');
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_concurrency_is_capped_at_three() {
        let mut cfg = SyncConfig::new("https://dav.example.com", "u", "p");
        cfg.max_concurrency = 10;
        assert_eq!(cfg.effective_concurrency(), 3);
        cfg.max_concurrency = 0;
        assert_eq!(cfg.effective_concurrency(), 1);
    }

    #[test]
    fn normalized_root_has_leading_and_trailing_slash() {
        let cfg = SyncConfig::new("https://dav.example.com", "u", "p").with_root_path("FlashNote");
        assert_eq!(cfg.normalized_root(), "/FlashNote/");
    }
}
