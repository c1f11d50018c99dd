use std::time::{Duration, Instant};

/// Trailing-edge debounce: fires once, `wait` after the last trigger.
#[derive(Debug, Clone)]
pub struct Debouncer {
  wait: Duration,
  deadline: Option<Instant>,
}

impl Debouncer {
  pub fn new(wait: Duration) -> Self {
    Self { wait, deadline: None }
  }

  /// Record an event, pushing the deadline back.
  pub fn trigger(&mut self, now: Instant) {
    self.deadline = Some(now + self.wait);
  }

  /// True exactly once per burst, when the quiet period has passed.
  pub fn fire(&mut self, now: Instant) -> bool {
    match self.deadline {
      Some(deadline) if now >= deadline => {
        self.deadline = None;
        true
      }
      _ => false,
    }
  }

  pub fn cancel(&mut self) {
    self.deadline = None;
  }
}
