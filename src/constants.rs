//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!`, so there is
//! no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  pub default_server: String,
  pub default_language: String,

  // Run loop / subtitle overlay
  pub frame_poll_ms: u64,
  pub subtitle_poll_ms: u64,

  // Result list pagination
  pub scroll_debounce_ms: u64,
  pub load_more_threshold: usize,

  // Status line
  pub error_dismiss_secs: u64,

  // Search backend
  pub request_timeout_secs: u64,

  // mpv
  pub watch_url: String,
  pub ipc_connect_attempts: u32,
  pub ipc_connect_delay_ms: u64,
}

impl Constants {
  pub fn frame_poll(&self) -> Duration {
    Duration::from_millis(self.frame_poll_ms)
  }

  pub fn subtitle_period(&self) -> Duration {
    Duration::from_millis(self.subtitle_poll_ms)
  }

  pub fn scroll_debounce(&self) -> Duration {
    Duration::from_millis(self.scroll_debounce_ms)
  }

  pub fn error_dismiss(&self) -> Duration {
    Duration::from_secs(self.error_dismiss_secs)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.subtitle_poll_ms, 100);
    assert_eq!(c.scroll_debounce_ms, 200);
    assert!(c.load_more_threshold > 0);
    assert!(!c.default_server.is_empty());
  }
}
