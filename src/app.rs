use ratatui::widgets::ListState;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::constants;
use crate::debounce::Debouncer;
use crate::fetch::{self, FetchOutcome, FetchPipeline, FetchTicket};
use crate::input::TextField;
use crate::player::{self, Clip, PlaybackState, Player, PlayerEvent};
use crate::search::{ResultPage, SearchBackend, SearchError, VideoResult};
use crate::session::{self, Session, SessionId, Step};
use crate::subtitle::SubtitleSync;
use crate::theme::{THEMES, Theme, theme_index};

pub const MSG_EMPTY_QUERY: &str = "Please enter a search query.";
pub const MSG_NO_RESULTS: &str = "No videos found.";

/// Where the current search session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// No usable results: nothing searched yet, or the last search failed or came back empty.
  Idle,
  /// First page of a new search is on its way.
  Searching,
  Playing,
  /// A continuation page is on its way; playback carries on meanwhile.
  LoadingMore,
  /// The backend has no further pages for this session.
  Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  Input,
  Language,
  Results,
}

pub struct App<P, B> {
  pub query: TextField,
  pub language: TextField,
  pub mode: AppMode,
  pub theme_index: usize,
  pub list_state: ListState,
  pub should_quit: bool,
  pub phase: Phase,
  pub session: Session,
  pub player: P,
  /// Last state reported by the player for the loaded clip.
  pub playback: Option<PlaybackState>,
  pub subtitles: SubtitleSync,
  pub last_error: Option<String>,
  /// App start instant, used to drive the loading spinner.
  pub started_at: Instant,
  fetcher: FetchPipeline<B>,
  next_session: u64,
  player_ready: bool,
  /// Clip requested before the player reported ready.
  queued_clip: Option<Clip>,
  /// An advance is waiting on the continuation fetch of the current session.
  advance_pending: bool,
  scroll_debounce: Debouncer,
  /// When the last error was set, for auto-dismiss.
  error_time: Option<Instant>,
}

impl<P: Player, B: SearchBackend> App<P, B> {
  pub fn new(player: P, backend: B, config: &Config) -> Self {
    let language = config.language.clone().unwrap_or_else(|| constants().default_language.clone());

    Self {
      query: TextField::default(),
      language: TextField::new(language),
      mode: AppMode::Input,
      theme_index: theme_index(config.theme_name.as_deref()),
      list_state: ListState::default(),
      should_quit: false,
      phase: Phase::Idle,
      session: Session::default(),
      player,
      playback: None,
      subtitles: SubtitleSync::new(constants().subtitle_period()),
      last_error: None,
      started_at: Instant::now(),
      fetcher: FetchPipeline::new(backend),
      next_session: 0,
      player_ready: false,
      queued_clip: None,
      advance_pending: false,
      scroll_debounce: Debouncer::new(constants().scroll_debounce()),
      error_time: None,
    }
  }
}

impl<P, B> App<P, B> {
  pub fn theme(&self) -> &'static Theme {
    // Bounded by theme_index() at startup and the modulo in next_theme().
    &THEMES[self.theme_index]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    let mut config = Config::load();
    config.theme_name = Some(self.theme().name.to_string());
    config.save();
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  /// Clear the current error message and its expiry timer.
  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages once they have been on screen long enough.
  pub fn expire_error(&mut self, now: Instant) {
    if let Some(t) = self.error_time
      && now.saturating_duration_since(t) >= constants().error_dismiss()
    {
      self.last_error = None;
      self.error_time = None;
    }
  }

  // --- Presentation ---

  pub fn viewed_label(&self) -> String {
    format!("Videos seen: {}/{}", self.session.viewed, self.session.results.len())
  }

  pub fn previous_enabled(&self) -> bool {
    self.session.cursor.video > 0
  }

  pub fn is_loading(&self) -> bool {
    self.session.fetch_in_flight
  }

  pub fn new_results_available(&self) -> bool {
    self.phase == Phase::Exhausted
  }

  /// The video and match index the cursor points at, while a session has results.
  pub fn now_playing(&self) -> Option<(&VideoResult, usize)> {
    self.session.current_video().map(|v| (v, self.session.cursor.matched))
  }
}

impl<P: Player, B: SearchBackend> App<P, B> {
  // --- User actions ---

  pub async fn submit(&mut self) {
    let query = self.query.text.trim().to_string();
    if query.is_empty() {
      self.set_error(MSG_EMPTY_QUERY.to_string());
      return;
    }
    let language = self.language.text.trim().to_string();
    self.start_search(query, language).await;
  }

  /// Start over once the session has run dry, keeping the last query when the
  /// input was cleared.
  pub async fn new_results(&mut self) {
    if !self.new_results_available() {
      return;
    }
    let typed = self.query.text.trim();
    let query = if typed.is_empty() { self.session.query.clone() } else { typed.to_string() };
    let language = self.language.text.trim().to_string();
    self.start_search(query, language).await;
  }

  async fn start_search(&mut self, query: String, language: String) {
    info!(query = %query, language = %language, "search triggered");
    self.stop_playback().await;
    self.subtitles.stop();
    self.subtitles.set_query(&query);

    self.next_session += 1;
    self.session = Session::new(SessionId(self.next_session), query, language);
    self.advance_pending = false;
    self.scroll_debounce.cancel();
    self.list_state.select(None);
    self.clear_error();

    self.phase = Phase::Searching;
    self.fetcher.fetch(&mut self.session, true);
  }

  pub async fn next_video(&mut self) {
    let step = session::advance(&mut self.session);
    self.apply(step).await;
  }

  pub async fn previous_video(&mut self) {
    let step = session::retreat(&mut self.session);
    self.apply(step).await;
  }

  pub async fn next_match(&mut self) {
    let step = session::step_match(&mut self.session, 1);
    self.apply(step).await;
  }

  pub async fn previous_match(&mut self) {
    let step = session::step_match(&mut self.session, -1);
    self.apply(step).await;
  }

  pub async fn replay(&mut self) {
    if self.session.results.is_empty() {
      return;
    }
    let cursor = self.session.cursor;
    let step = session::select(&mut self.session, cursor.video, cursor.matched);
    self.apply(step).await;
  }

  /// Play the first match of the video highlighted in the result list.
  pub async fn play_selected(&mut self) {
    let Some(selected) = self.list_state.selected() else { return };
    let step = session::select(&mut self.session, selected, 0);
    self.apply(step).await;
  }

  /// Ask for the next page. Returns whether a request went out.
  pub fn load_more(&mut self) -> bool {
    if !self.fetcher.fetch(&mut self.session, false) {
      return false;
    }
    self.phase = Phase::LoadingMore;
    true
  }

  /// Move the result-list selection; a quiet period after the last move near
  /// the bottom loads the next page.
  pub fn scroll(&mut self, delta: isize, now: Instant) {
    let count = self.session.results.len();
    if count == 0 {
      return;
    }
    let current = self.list_state.selected().unwrap_or(0);
    self.list_state.select(Some(current.saturating_add_signed(delta).min(count - 1)));
    self.scroll_debounce.trigger(now);
  }

  pub async fn toggle_pause(&mut self) {
    if self.playback.is_none() {
      return;
    }
    if let Err(e) = self.player.toggle_pause().await {
      self.set_error(format!("Pause error: {}", e));
    }
  }

  pub async fn stop(&mut self) {
    self.stop_playback().await;
  }

  pub async fn shutdown(&mut self) {
    self.subtitles.stop();
    if let Err(e) = self.player.stop().await {
      warn!(err = %e, "player: failed to stop on exit");
    }
  }

  // --- Event loop ---

  /// Process everything that happened since the last loop iteration: finished
  /// fetches, player events, the scroll debounce and the subtitle poll.
  pub async fn check_pending(&mut self, now: Instant) {
    for (ticket, result) in self.fetcher.poll_completed() {
      self.on_fetch_complete(&ticket, result).await;
    }

    self.drain_player_events(now).await;

    if self.scroll_debounce.fire(now) && self.near_bottom() && self.load_more() {
      debug!("scroll reached bottom, loading more");
    }

    let position = self.player.position();
    self.subtitles.tick(now, position, self.session.current_match());

    self.expire_error(now);
  }

  fn near_bottom(&self) -> bool {
    let len = self.session.results.len();
    len > 0 && self.list_state.selected().is_some_and(|i| i + constants().load_more_threshold >= len)
  }

  async fn on_fetch_complete(&mut self, ticket: &FetchTicket, result: Result<ResultPage, SearchError>) {
    match fetch::complete(&mut self.session, ticket, result) {
      FetchOutcome::Stale => {}
      FetchOutcome::Replaced { count } => {
        info!(count, "search: first page ready");
        self.settle_phase();
        self.mode = AppMode::Results;
        let step = session::select(&mut self.session, 0, 0);
        self.apply(step).await;
      }
      FetchOutcome::Appended { count } => {
        debug!(count, total = self.session.results.len(), "search: more results");
        self.settle_phase();
        if std::mem::take(&mut self.advance_pending) {
          let step = session::advance(&mut self.session);
          self.apply(step).await;
        }
      }
      FetchOutcome::Skipped { new_search } => {
        self.fetcher.fetch(&mut self.session, new_search);
      }
      FetchOutcome::Empty { new_search: true } => {
        self.set_error(MSG_NO_RESULTS.to_string());
        self.phase = Phase::Idle;
      }
      FetchOutcome::Empty { new_search: false } => {
        self.phase = Phase::Exhausted;
        if std::mem::take(&mut self.advance_pending) {
          self.stop_playback().await;
        }
      }
      FetchOutcome::Failed { error, new_search } => {
        self.set_error(error.user_message().to_string());
        if new_search {
          self.phase = Phase::Idle;
        } else {
          self.settle_phase();
        }
        if std::mem::take(&mut self.advance_pending) {
          self.stop_playback().await;
        }
      }
    }
  }

  async fn drain_player_events(&mut self, now: Instant) {
    while let Some(event) = self.player.poll_event() {
      match event {
        PlayerEvent::Ready => {
          info!("player: ready");
          self.player_ready = true;
          if let Some(clip) = self.queued_clip.take() {
            self.play_clip(clip).await;
          }
        }
        PlayerEvent::StateChange(PlaybackState::Playing) => {
          self.playback = Some(PlaybackState::Playing);
          self.subtitles.start(now);
        }
        PlayerEvent::StateChange(PlaybackState::Paused) => {
          self.playback = Some(PlaybackState::Paused);
        }
        PlayerEvent::StateChange(PlaybackState::Ended) => {
          debug!("player: clip ended");
          self.stop_playback().await;
          self.finish_clip().await;
        }
        PlayerEvent::Error(code) => {
          warn!(code, "player: playback error");
          self.set_error(player::error_message(code).to_string());
          self.stop_playback().await;
          self.finish_clip().await;
        }
      }
    }
  }

  /// Move on after a clip ends or fails: next match of this video, else the
  /// next video.
  async fn finish_clip(&mut self) {
    let step = match session::step_match(&mut self.session, 1) {
      Step::Stay => session::advance(&mut self.session),
      step => step,
    };
    self.apply(step).await;
  }

  fn settle_phase(&mut self) {
    self.phase = if self.session.results.is_empty() {
      Phase::Idle
    } else if self.session.exhausted {
      Phase::Exhausted
    } else {
      Phase::Playing
    };
  }

  async fn apply(&mut self, step: Step) {
    match step {
      Step::Play { clip, read_ahead } => {
        // Any explicit landing supersedes an advance still waiting on a page.
        self.advance_pending = false;
        self.list_state.select(Some(self.session.cursor.video));
        self.play_clip(clip).await;
        if read_ahead {
          self.load_more();
        }
      }
      Step::Stop => self.stop_playback().await,
      Step::NeedMore => {
        // Rides along with a read-ahead that is already in flight.
        self.advance_pending = true;
        if !self.load_more() && !self.session.fetch_in_flight {
          self.advance_pending = false;
          self.stop_playback().await;
        }
      }
      Step::Stay => {}
    }
  }

  async fn play_clip(&mut self, clip: Clip) {
    self.subtitles.clear();
    self.playback = None;
    if !self.player_ready {
      debug!(video_id = %clip.video_id, "player: not ready, queueing clip");
      self.queued_clip = Some(clip);
      return;
    }
    if let Err(e) = self.player.load_clip(&clip).await {
      warn!(err = %e, video_id = %clip.video_id, "player: failed to load clip");
      self.set_error(format!("Playback error: {:#}", e));
      if let Err(e) = self.player.stop().await {
        warn!(err = %e, "player: failed to stop after load failure");
      }
      self.player.clear();
    }
  }

  async fn stop_playback(&mut self) {
    self.queued_clip = None;
    self.advance_pending = false;
    if let Err(e) = self.player.stop().await {
      warn!(err = %e, "player: failed to stop");
    }
    self.player.clear();
    self.subtitles.clear();
    self.playback = None;
  }

  /// Wait for every outstanding fetch and process the results.
  #[cfg(test)]
  pub async fn settle(&mut self, now: Instant) {
    self.drain_player_events(now).await;
    for (ticket, result) in self.fetcher.wait_all().await {
      self.on_fetch_complete(&ticket, result).await;
    }
    self.drain_player_events(now).await;
  }

  #[cfg(test)]
  pub fn pending_fetches(&self) -> usize {
    self.fetcher.pending_count()
  }
}
