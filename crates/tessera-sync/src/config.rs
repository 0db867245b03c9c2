use serde::Deserialize;

/// Tunables for the sync layer. Defaults match the shipped product
/// behavior; deployments may override via any serde source.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet window before a title edit is persisted.
    pub title_debounce_ms: u64,
    /// Inactivity window after which a pending key sequence resets.
    pub key_sequence_timeout_ms: u64,
    /// Maximum bullet lines returned by activity summarization.
    pub summary_max_lines: usize,
    /// Number of trailing activity entries fed to the summarizer.
    pub summary_window: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            title_debounce_ms: 500,
            key_sequence_timeout_ms: 1000,
            summary_max_lines: 10,
            summary_window: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_behavior() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.title_debounce_ms, 500);
        assert_eq!(cfg.key_sequence_timeout_ms, 1000);
        assert_eq!(cfg.summary_max_lines, 10);
        assert_eq!(cfg.summary_window, 15);
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let cfg: SyncConfig =
            serde_json::from_value(serde_json::json!({ "title_debounce_ms": 250 }))
                .expect("partial config");
        assert_eq!(cfg.title_debounce_ms, 250);
        assert_eq!(cfg.key_sequence_timeout_ms, 1000);
    }
}
