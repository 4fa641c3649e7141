use std::time::Duration;

use preview_proto::{BufferId, VersionMarker};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Poll interval used when the embedded configuration does not name one.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Content type marking a page-embedded configuration block.
pub const CONFIG_BLOCK_TYPE: &str = "application/x-tideline-config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid embedded config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config block {index} rejected: {reason}")]
    Block { index: usize, reason: String },
}

/// Page-embedded configuration, read once at load time.
///
/// There is no CLI and no persistence: the page that bootstraps the client
/// carries everything the session needs, and the bundle dies with the page.
#[derive(Debug, Clone)]
pub struct PageConfig {
    /// Identity of the buffer this page previews.
    pub buffer_id: BufferId,
    /// Last version marker seen, `None` when the page has never synced.
    pub timestamp: Option<VersionMarker>,
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Whether math typesetting runs after each content replacement.
    pub mathjax: bool,
}

#[derive(Debug, Deserialize)]
struct RawPageConfig {
    buffer_id: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    mathjax: bool,
}

impl PageConfig {
    /// Parses the configuration JSON embedded at page load.
    pub fn from_embedded(json: &str) -> Result<Self, ConfigError> {
        let raw: RawPageConfig = serde_json::from_str(json)?;
        Ok(Self {
            buffer_id: BufferId::new(raw.buffer_id),
            timestamp: raw.timestamp.map(VersionMarker::new),
            poll_interval: Duration::from_millis(
                raw.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            mathjax: raw.mathjax,
        })
    }
}

/// Declarative settings overlay carried by a config block.
///
/// Restricted schema: unknown keys reject the block rather than executing
/// anything the page happens to embed.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    mathjax: Option<bool>,
}

/// One embedded configuration block, applied at most once.
#[derive(Debug, Clone)]
pub struct ConfigBlock {
    content_type: String,
    body: String,
    executed: bool,
}

impl ConfigBlock {
    pub fn new(content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
            executed: false,
        }
    }

    pub fn executed(&self) -> bool {
        self.executed
    }
}

/// Result of one scan over the page's config blocks.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Blocks whose overlay was applied during this scan.
    pub applied: usize,
    /// Blocks rejected during this scan; they are still flagged executed
    /// and will not be retried.
    pub rejected: Vec<ConfigError>,
}

/// Scans page-embedded configuration blocks and applies each exactly once.
///
/// Runs before the first poll is scheduled. Blocks are flagged executed on
/// first encounter, so repeating the scan applies nothing.
#[derive(Debug, Default)]
pub struct ConfigScan {
    blocks: Vec<ConfigBlock>,
}

impl ConfigScan {
    pub fn new(blocks: Vec<ConfigBlock>) -> Self {
        Self { blocks }
    }

    /// Applies every matching, not-yet-executed block in document order.
    pub fn run_pending(&mut self, config: &mut PageConfig) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        for (index, block) in self.blocks.iter_mut().enumerate() {
            if block.executed || block.content_type != CONFIG_BLOCK_TYPE {
                continue;
            }
            block.executed = true;
            match serde_json::from_str::<ConfigOverlay>(&block.body) {
                Ok(overlay) => {
                    if let Some(ms) = overlay.poll_interval_ms {
                        config.poll_interval = Duration::from_millis(ms);
                    }
                    if let Some(mathjax) = overlay.mathjax {
                        config.mathjax = mathjax;
                    }
                    outcome.applied += 1;
                }
                Err(err) => {
                    warn!(
                        target: "preview.config",
                        index,
                        error = %err,
                        "rejecting malformed config block"
                    );
                    outcome.rejected.push(ConfigError::Block {
                        index,
                        reason: err.to_string(),
                    });
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> PageConfig {
        PageConfig::from_embedded(r#"{"buffer_id": "b1"}"#).expect("config")
    }

    #[test]
    fn embedded_config_defaults() {
        let config = base_config();
        assert_eq!(config.buffer_id, BufferId::new("b1"));
        assert!(config.timestamp.is_none());
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert!(!config.mathjax);
    }

    #[test]
    fn embedded_config_full() {
        let config = PageConfig::from_embedded(
            r#"{"buffer_id": "b1", "timestamp": "t0", "poll_interval_ms": 250, "mathjax": true}"#,
        )
        .expect("config");
        assert_eq!(config.timestamp, Some(VersionMarker::new("t0")));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert!(config.mathjax);
    }

    #[test]
    fn embedded_config_rejects_garbage() {
        assert!(PageConfig::from_embedded("not json").is_err());
    }

    #[test]
    fn blocks_apply_exactly_once() {
        let mut config = base_config();
        let mut scan = ConfigScan::new(vec![
            ConfigBlock::new(CONFIG_BLOCK_TYPE, r#"{"poll_interval_ms": 100}"#),
            ConfigBlock::new(CONFIG_BLOCK_TYPE, r#"{"mathjax": true}"#),
        ]);

        let first = scan.run_pending(&mut config);
        assert_eq!(first.applied, 2);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert!(config.mathjax);

        // A later change must survive a re-scan untouched.
        config.poll_interval = Duration::from_millis(900);
        let second = scan.run_pending(&mut config);
        assert_eq!(second.applied, 0);
        assert!(second.rejected.is_empty());
        assert_eq!(config.poll_interval, Duration::from_millis(900));
    }

    #[test]
    fn foreign_content_types_are_ignored() {
        let mut config = base_config();
        let mut scan = ConfigScan::new(vec![ConfigBlock::new(
            "text/javascript",
            r#"{"poll_interval_ms": 1}"#,
        )]);
        let outcome = scan.run_pending(&mut config);
        assert_eq!(outcome.applied, 0);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn malformed_block_never_blocks_later_blocks_and_never_retries() {
        let mut config = base_config();
        let mut scan = ConfigScan::new(vec![
            ConfigBlock::new(CONFIG_BLOCK_TYPE, "{{nope"),
            ConfigBlock::new(CONFIG_BLOCK_TYPE, r#"{"mathjax": true}"#),
        ]);

        let first = scan.run_pending(&mut config);
        assert_eq!(first.applied, 1);
        assert_eq!(first.rejected.len(), 1);
        assert!(config.mathjax);

        let second = scan.run_pending(&mut config);
        assert_eq!(second.applied, 0);
        assert!(second.rejected.is_empty());
    }

    #[test]
    fn unknown_overlay_keys_reject_the_block() {
        let mut config = base_config();
        let mut scan = ConfigScan::new(vec![ConfigBlock::new(
            CONFIG_BLOCK_TYPE,
            r#"{"eval": "alert(1)"}"#,
        )]);
        let outcome = scan.run_pending(&mut config);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.rejected.len(), 1);
    }
}
