//! Subtitle overlay kept in step with the player position.
//!
//! The player only reports its position when asked, so the overlay is driven
//! by a periodic check rather than by events: every period the active match's
//! window is compared against the current position and the overlay is either
//! filled with the (highlighted) match text or emptied.

use regex::Regex;
use std::ops::Range;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::search::Match;

/// Piece of subtitle text, flagged when it is one of the query terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
  pub text: &'a str,
  pub hit: bool,
}

/// Finds whole-word, case-insensitive occurrences of the query terms.
#[derive(Debug, Clone, Default)]
pub struct Highlighter {
  pattern: Option<Regex>,
}

impl Highlighter {
  pub fn new(query: &str) -> Self {
    let terms: Vec<String> = query.split_whitespace().map(regex::escape).collect();
    if terms.is_empty() {
      return Self { pattern: None };
    }
    let pattern = format!(r"(?i)\b(?:{})\b", terms.join("|"));
    match Regex::new(&pattern) {
      Ok(re) => Self { pattern: Some(re) },
      Err(e) => {
        warn!(err = %e, "subtitle: could not build highlight pattern");
        Self { pattern: None }
      }
    }
  }

  /// Byte ranges of every term occurrence in `text`.
  pub fn hits(&self, text: &str) -> Vec<Range<usize>> {
    match &self.pattern {
      Some(re) => re.find_iter(text).map(|m| m.range()).collect(),
      None => Vec::new(),
    }
  }
}

fn fragments<'a>(text: &'a str, hits: &[Range<usize>]) -> Vec<Fragment<'a>> {
  let mut out = Vec::with_capacity(hits.len() * 2 + 1);
  let mut pos = 0;
  for hit in hits {
    if hit.start > pos {
      out.push(Fragment { text: &text[pos..hit.start], hit: false });
    }
    out.push(Fragment { text: &text[hit.clone()], hit: true });
    pos = hit.end;
  }
  if pos < text.len() || out.is_empty() {
    out.push(Fragment { text: &text[pos..], hit: false });
  }
  out
}

/// The subtitle line currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
  pub text: String,
  hits: Vec<Range<usize>>,
}

impl Overlay {
  pub fn fragments(&self) -> Vec<Fragment<'_>> {
    fragments(&self.text, &self.hits)
  }
}

/// Periodic position check feeding the overlay. Runs from `start` until
/// `stop`; between those it re-checks at most once per period.
pub struct SubtitleSync {
  period: Duration,
  next_due: Option<Instant>,
  highlighter: Highlighter,
  overlay: Option<Overlay>,
}

impl SubtitleSync {
  pub fn new(period: Duration) -> Self {
    Self { period, next_due: None, highlighter: Highlighter::default(), overlay: None }
  }

  pub fn set_query(&mut self, query: &str) {
    self.highlighter = Highlighter::new(query);
  }

  /// Begin (or restart) polling; the first check happens on the next tick.
  pub fn start(&mut self, now: Instant) {
    if self.next_due.is_none() {
      debug!("subtitle: polling started");
    }
    self.next_due = Some(now);
  }

  pub fn stop(&mut self) {
    if self.next_due.take().is_some() {
      debug!("subtitle: polling stopped");
    }
    self.overlay = None;
  }

  pub fn clear(&mut self) {
    self.overlay = None;
  }

  pub fn overlay(&self) -> Option<&Overlay> {
    self.overlay.as_ref()
  }

  /// Re-check the overlay if a period has elapsed. `active` is whatever match
  /// the cursor points at right now. Returns whether a check ran.
  pub fn tick(&mut self, now: Instant, position: Option<f64>, active: Option<&Match>) -> bool {
    let Some(due) = self.next_due else { return false };
    if now < due {
      return false;
    }
    self.next_due = Some(now + self.period);

    self.overlay = match (position, active) {
      (Some(pos), Some(m)) if pos >= m.start && pos <= m.end => {
        if self.overlay.as_ref().is_some_and(|o| o.text == m.text) {
          self.overlay.take()
        } else {
          Some(Overlay { text: m.text.clone(), hits: self.highlighter.hits(&m.text) })
        }
      }
      _ => None,
    };
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn highlight<'a>(text: &'a str, query: &str) -> Vec<Fragment<'a>> {
    fragments(text, &Highlighter::new(query).hits(text))
  }

  fn m(start: f64, end: f64, text: &str) -> Match {
    Match { start, end, text: text.to_string() }
  }

  // --- highlight ---

  #[test]
  fn highlight_wraps_only_query_token() {
    assert_eq!(
      highlight("hello world", "hello"),
      vec![Fragment { text: "hello", hit: true }, Fragment { text: " world", hit: false }]
    );
  }

  #[test]
  fn highlight_empty_query_is_unchanged() {
    assert_eq!(highlight("hello world", ""), vec![Fragment { text: "hello world", hit: false }]);
    assert_eq!(highlight("hello world", "   "), vec![Fragment { text: "hello world", hit: false }]);
  }

  #[test]
  fn highlight_is_case_insensitive_and_multi_term() {
    let frags = highlight("Rust is fast, rust is safe", "RUST safe");
    let hits: Vec<&str> = frags.iter().filter(|f| f.hit).map(|f| f.text).collect();
    assert_eq!(hits, vec!["Rust", "rust", "safe"]);
  }

  #[test]
  fn highlight_whole_words_only() {
    let frags = highlight("helloworld hello hellos", "hello");
    let hits: Vec<&str> = frags.iter().filter(|f| f.hit).map(|f| f.text).collect();
    assert_eq!(hits, vec!["hello"]);
  }

  #[test]
  fn highlight_escapes_metacharacters() {
    let frags = highlight("axb a.b", "a.b");
    let hits: Vec<&str> = frags.iter().filter(|f| f.hit).map(|f| f.text).collect();
    assert_eq!(hits, vec!["a.b"]);
  }

  #[test]
  fn highlight_fragments_rebuild_text() {
    let text = "the quick brown fox";
    let joined: String = highlight(text, "quick fox").iter().map(|f| f.text).collect();
    assert_eq!(joined, text);
  }

  #[test]
  fn highlight_handles_multibyte_text() {
    let frags = highlight("größe über alles", "über");
    assert_eq!(frags[1], Fragment { text: "über", hit: true });
  }

  #[test]
  fn highlight_empty_text() {
    assert_eq!(highlight("", "x"), vec![Fragment { text: "", hit: false }]);
  }

  // --- SubtitleSync ---

  #[test]
  fn tick_does_nothing_until_started() {
    let mut sync = SubtitleSync::new(Duration::from_millis(100));
    let clip = m(0.0, 5.0, "hi");
    assert!(!sync.tick(Instant::now(), Some(1.0), Some(&clip)));
    assert!(sync.overlay().is_none());
  }

  #[test]
  fn tick_shows_text_inside_window_only() {
    let t0 = Instant::now();
    let mut sync = SubtitleSync::new(Duration::from_millis(100));
    sync.set_query("hello");
    sync.start(t0);
    let clip = m(2.0, 5.0, "hello world");

    assert!(sync.tick(t0, Some(2.0), Some(&clip)));
    let overlay = sync.overlay().unwrap();
    assert_eq!(overlay.fragments(), highlight("hello world", "hello"));

    assert!(sync.tick(t0 + Duration::from_millis(100), Some(5.5), Some(&clip)));
    assert!(sync.overlay().is_none());

    assert!(sync.tick(t0 + Duration::from_millis(200), Some(1.9), Some(&clip)));
    assert!(sync.overlay().is_none());
  }

  #[test]
  fn tick_respects_period() {
    let t0 = Instant::now();
    let mut sync = SubtitleSync::new(Duration::from_millis(100));
    sync.start(t0);
    let clip = m(0.0, 5.0, "a");
    assert!(sync.tick(t0, Some(1.0), Some(&clip)));
    assert!(!sync.tick(t0 + Duration::from_millis(50), None, Some(&clip)));
    assert!(sync.overlay().is_some(), "skipped tick keeps the overlay");
    assert!(sync.tick(t0 + Duration::from_millis(100), None, Some(&clip)));
    assert!(sync.overlay().is_none());
  }

  #[test]
  fn tick_follows_live_match() {
    let t0 = Instant::now();
    let mut sync = SubtitleSync::new(Duration::from_millis(100));
    sync.start(t0);
    let first = m(0.0, 5.0, "first");
    let second = m(10.0, 15.0, "second");
    sync.tick(t0, Some(1.0), Some(&first));
    assert_eq!(sync.overlay().unwrap().text, "first");
    sync.tick(t0 + Duration::from_millis(100), Some(11.0), Some(&second));
    assert_eq!(sync.overlay().unwrap().text, "second");
  }

  #[test]
  fn stop_cancels_and_clears() {
    let t0 = Instant::now();
    let mut sync = SubtitleSync::new(Duration::from_millis(100));
    sync.start(t0);
    sync.tick(t0, Some(1.0), Some(&m(0.0, 5.0, "x")));
    sync.stop();
    assert!(sync.overlay().is_none());
    assert!(!sync.tick(t0 + Duration::from_secs(1), Some(1.0), Some(&m(0.0, 5.0, "x"))));
  }
}
