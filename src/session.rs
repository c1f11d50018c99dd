//! Per-search session state and the playback cursor over it.
//!
//! A `Session` is created for every submitted search and replaced wholesale by
//! the next one. Cursor moves are plain functions over the session that report
//! what the player should do next as a [`Step`]; the controller carries it out.

use tracing::debug;

use crate::player::Clip;
use crate::search::{Match, VideoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionId(pub u64);

/// Position within the buffered results: which video, and which match inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
  pub video: usize,
  pub matched: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
  pub id: SessionId,
  pub query: String,
  pub language: String,
  /// Append-only within a session.
  pub results: Vec<VideoResult>,
  pub cursor: Cursor,
  /// Never exceeds `results.len()`.
  pub viewed: usize,
  pub page_token: Option<String>,
  pub exhausted: bool,
  pub fetch_in_flight: bool,
}

impl Session {
  pub fn new(id: SessionId, query: impl Into<String>, language: impl Into<String>) -> Self {
    Self { id, query: query.into(), language: language.into(), ..Self::default() }
  }

  /// Whether a continuation fetch is allowed at all (in-flight aside).
  pub fn can_continue(&self) -> bool {
    !self.exhausted && self.page_token.is_some()
  }

  pub fn current_video(&self) -> Option<&VideoResult> {
    self.results.get(self.cursor.video)
  }

  pub fn current_match(&self) -> Option<&Match> {
    self.current_video()?.matches.get(self.cursor.matched)
  }

  pub fn is_last_buffered(&self) -> bool {
    !self.results.is_empty() && self.cursor.video == self.results.len() - 1
  }

  pub fn clamp_viewed(&mut self) {
    self.viewed = self.viewed.min(self.results.len());
  }
}

/// What the player should do after a cursor operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
  /// Load this clip. `read_ahead` asks for the next page because the cursor
  /// landed on the last buffered video.
  Play { clip: Clip, read_ahead: bool },
  /// Nothing playable here; stop and clear the player.
  Stop,
  /// The cursor is on the last buffered video and more pages exist; advance
  /// once the next page arrives.
  NeedMore,
  /// No-op.
  Stay,
}

/// Move to the first match of the next video.
pub fn advance(session: &mut Session) -> Step {
  if session.results.is_empty() {
    return Step::Stop;
  }
  let next = session.cursor.video + 1;
  if next < session.results.len() {
    return land(session, next, 0);
  }
  if session.can_continue() { Step::NeedMore } else { Step::Stop }
}

/// Move to the first match of the previous video.
pub fn retreat(session: &mut Session) -> Step {
  if session.cursor.video == 0 || session.results.is_empty() {
    return Step::Stay;
  }
  let previous = session.cursor.video - 1;
  land(session, previous, 0)
}

/// Jump to an explicit position. Out-of-range targets stop playback.
pub fn select(session: &mut Session, video: usize, matched: usize) -> Step {
  let in_range = session.results.get(video).is_some_and(|v| matched < v.matches.len());
  if !in_range {
    debug!(video, matched, len = session.results.len(), "cursor: select out of range");
    return Step::Stop;
  }
  land(session, video, matched)
}

/// Move `delta` matches within the current video. Does not count as viewing
/// another video.
pub fn step_match(session: &mut Session, delta: isize) -> Step {
  let Some(video) = session.current_video() else { return Step::Stay };
  let Some(target) = session.cursor.matched.checked_add_signed(delta) else { return Step::Stay };
  let Some(m) = video.matches.get(target) else { return Step::Stay };
  let clip = Clip { video_id: video.id.clone(), start: m.start, end: m.end };
  session.cursor.matched = target;
  Step::Play { clip, read_ahead: false }
}

fn land(session: &mut Session, video: usize, matched: usize) -> Step {
  let Some(m) = session.results.get(video).and_then(|v| v.matches.get(matched)) else {
    return Step::Stop;
  };
  let clip = Clip { video_id: session.results[video].id.clone(), start: m.start, end: m.end };
  session.cursor = Cursor { video, matched };
  session.viewed += 1;
  session.clamp_viewed();
  let read_ahead = session.is_last_buffered() && session.can_continue();
  Step::Play { clip, read_ahead }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) fn video(id: &str, matches: usize) -> VideoResult {
    VideoResult {
      id: id.to_string(),
      title: None,
      matches: (0..matches)
        .map(|i| Match { start: i as f64 * 10.0, end: i as f64 * 10.0 + 5.0, text: format!("{} match {}", id, i) })
        .collect(),
    }
  }

  pub(crate) fn session_with(videos: usize, matches: usize, token: Option<&str>) -> Session {
    let mut s = Session::new(SessionId(1), "match", "en");
    s.results = (0..videos).map(|i| video(&format!("v{}", i), matches)).collect();
    s.page_token = token.map(str::to_string);
    s
  }

  fn clip_of(step: &Step) -> &Clip {
    match step {
      Step::Play { clip, .. } => clip,
      other => panic!("expected Play, got {:?}", other),
    }
  }

  #[test]
  fn advance_moves_to_next_video_first_match() {
    let mut s = session_with(3, 2, None);
    s.cursor = Cursor { video: 0, matched: 1 };
    let step = advance(&mut s);
    assert_eq!(s.cursor, Cursor { video: 1, matched: 0 });
    assert_eq!(clip_of(&step), &Clip { video_id: "v1".into(), start: 0.0, end: 5.0 });
    assert_eq!(s.viewed, 1);
  }

  #[test]
  fn advance_at_end_needs_more_when_token_present() {
    let mut s = session_with(2, 1, Some("t"));
    s.cursor.video = 1;
    assert_eq!(advance(&mut s), Step::NeedMore);
    assert_eq!(s.cursor.video, 1);
  }

  #[test]
  fn advance_at_end_stops_when_exhausted() {
    let mut s = session_with(2, 1, Some("t"));
    s.cursor.video = 1;
    s.exhausted = true;
    assert_eq!(advance(&mut s), Step::Stop);
    assert_eq!(s.cursor.video, 1);

    let mut s = session_with(2, 1, None);
    s.cursor.video = 1;
    assert_eq!(advance(&mut s), Step::Stop);
  }

  #[test]
  fn advance_onto_last_buffered_reads_ahead() {
    let mut s = session_with(2, 1, Some("t"));
    assert!(matches!(advance(&mut s), Step::Play { read_ahead: true, .. }));

    let mut s = session_with(2, 1, None);
    assert!(matches!(advance(&mut s), Step::Play { read_ahead: false, .. }));
  }

  #[test]
  fn retreat_is_noop_at_first_video() {
    let mut s = session_with(2, 1, None);
    assert_eq!(retreat(&mut s), Step::Stay);
    assert_eq!(s.viewed, 0);
  }

  #[test]
  fn retreat_goes_to_previous_first_match() {
    let mut s = session_with(3, 3, None);
    s.cursor = Cursor { video: 2, matched: 2 };
    let step = retreat(&mut s);
    assert_eq!(s.cursor, Cursor { video: 1, matched: 0 });
    assert_eq!(clip_of(&step).video_id, "v1");
  }

  #[test]
  fn select_out_of_range_stops_without_moving() {
    let mut s = session_with(2, 2, None);
    s.cursor = Cursor { video: 1, matched: 1 };
    assert_eq!(select(&mut s, 2, 0), Step::Stop);
    assert_eq!(select(&mut s, 0, 2), Step::Stop);
    assert_eq!(s.cursor, Cursor { video: 1, matched: 1 });
    assert_eq!(s.viewed, 0);
  }

  #[test]
  fn select_replays_current_and_counts_view() {
    let mut s = session_with(2, 2, None);
    s.cursor = Cursor { video: 0, matched: 1 };
    let step = select(&mut s, 0, 1);
    assert_eq!(clip_of(&step), &Clip { video_id: "v0".into(), start: 10.0, end: 15.0 });
    assert_eq!(s.viewed, 1);
  }

  #[test]
  fn viewed_is_clamped_to_result_count() {
    let mut s = session_with(2, 1, None);
    for _ in 0..5 {
      select(&mut s, 0, 0);
    }
    assert_eq!(s.viewed, 2);
  }

  #[test]
  fn step_match_within_video() {
    let mut s = session_with(1, 3, None);
    let step = step_match(&mut s, 1);
    assert_eq!(s.cursor, Cursor { video: 0, matched: 1 });
    assert_eq!(clip_of(&step).start, 10.0);
    assert_eq!(s.viewed, 0);

    assert!(matches!(step_match(&mut s, -1), Step::Play { .. }));
    assert_eq!(s.cursor.matched, 0);
    assert_eq!(step_match(&mut s, -1), Step::Stay);

    s.cursor.matched = 2;
    assert_eq!(step_match(&mut s, 1), Step::Stay);
    assert_eq!(s.cursor.matched, 2);
  }

  #[test]
  fn cursor_stays_in_bounds_under_any_sequence() {
    let mut s = session_with(4, 2, None);
    let ops: [fn(&mut Session) -> Step; 4] = [advance, retreat, |s| step_match(s, 1), |s| {
      let next = s.cursor.video + 1;
      select(s, next, 1)
    }];
    for i in 0..64 {
      ops[(i * 7 + 3) % ops.len()](&mut s);
      assert!(s.cursor.video < s.results.len());
      assert!(s.cursor.matched < s.results[s.cursor.video].matches.len());
      assert!(s.viewed <= s.results.len());
    }
  }

  #[test]
  fn empty_session_is_inert() {
    let mut s = Session::new(SessionId(3), "q", "");
    assert_eq!(advance(&mut s), Step::Stop);
    assert_eq!(retreat(&mut s), Step::Stay);
    assert_eq!(step_match(&mut s, 1), Step::Stay);
    assert_eq!(select(&mut s, 0, 0), Step::Stop);
    assert!(!s.can_continue());
    assert!(s.current_match().is_none());
  }
}
