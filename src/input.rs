use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use std::time::Instant;

use crate::app::{App, AppMode};
use crate::player::Player;
use crate::search::SearchBackend;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Single-line editable text with a char-indexed cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextField {
  pub text: String,
  /// Cursor position in chars, not bytes.
  pub cursor: usize,
  /// First visible display column, kept in sync by the renderer.
  pub scroll: usize,
}

impl TextField {
  pub fn new(text: impl Into<String>) -> Self {
    let text = text.into();
    let cursor = text.chars().count();
    Self { text, cursor, scroll: 0 }
  }

  fn len(&self) -> usize {
    self.text.chars().count()
  }

  pub fn is_empty(&self) -> bool {
    self.text.is_empty()
  }

  pub fn insert(&mut self, c: char) {
    let byte_idx = char_to_byte_index(&self.text, self.cursor);
    self.text.insert(byte_idx, c);
    self.cursor += 1;
  }

  pub fn backspace(&mut self) {
    if self.cursor > 0 {
      self.cursor -= 1;
      let byte_idx = char_to_byte_index(&self.text, self.cursor);
      self.text.remove(byte_idx);
    }
  }

  pub fn delete(&mut self) {
    if self.cursor < self.len() {
      let byte_idx = char_to_byte_index(&self.text, self.cursor);
      self.text.remove(byte_idx);
    }
  }

  pub fn left(&mut self) {
    self.cursor = self.cursor.saturating_sub(1);
  }

  pub fn right(&mut self) {
    if self.cursor < self.len() {
      self.cursor += 1;
    }
  }

  pub fn home(&mut self) {
    self.cursor = 0;
  }

  pub fn end(&mut self) {
    self.cursor = self.len();
  }

  pub fn clear(&mut self) {
    self.text.clear();
    self.cursor = 0;
    self.scroll = 0;
  }

  /// Apply an editing key. Returns false for keys that are not edits.
  fn edit(&mut self, code: KeyCode) -> bool {
    match code {
      KeyCode::Char(c) => self.insert(c),
      KeyCode::Backspace => self.backspace(),
      KeyCode::Delete => self.delete(),
      KeyCode::Left => self.left(),
      KeyCode::Right => self.right(),
      KeyCode::Home => self.home(),
      KeyCode::End => self.end(),
      _ => return false,
    }
    true
  }
}

// --- Event Handling ---

pub async fn handle_key_event<P: Player, B: SearchBackend>(app: &mut App<P, B>, key: KeyEvent, now: Instant) {
  if key.modifiers.contains(KeyModifiers::CONTROL) {
    match key.code {
      KeyCode::Char('c') => app.should_quit = true,
      KeyCode::Char('t') => app.next_theme(),
      KeyCode::Char('s') => app.stop().await,
      _ => {}
    }
    return;
  }

  match app.mode {
    AppMode::Input | AppMode::Language => handle_field_key(app, key).await,
    AppMode::Results => handle_results_key(app, key, now).await,
  }
}

async fn handle_field_key<P: Player, B: SearchBackend>(app: &mut App<P, B>, key: KeyEvent) {
  let has_results = !app.session.results.is_empty();
  match key.code {
    KeyCode::Enter => {
      app.clear_error();
      app.submit().await;
    }
    KeyCode::Tab | KeyCode::BackTab => {
      app.mode = if app.mode == AppMode::Input { AppMode::Language } else { AppMode::Input };
    }
    KeyCode::Down if has_results => app.mode = AppMode::Results,
    KeyCode::Esc => {
      let field = if app.mode == AppMode::Input { &mut app.query } else { &mut app.language };
      if !field.is_empty() {
        field.clear();
      } else if has_results {
        app.mode = AppMode::Results;
      } else {
        app.should_quit = true;
      }
    }
    code => {
      let field = if app.mode == AppMode::Input { &mut app.query } else { &mut app.language };
      if field.edit(code) {
        app.clear_error();
      }
    }
  }
}

async fn handle_results_key<P: Player, B: SearchBackend>(app: &mut App<P, B>, key: KeyEvent, now: Instant) {
  match key.code {
    KeyCode::Enter => app.play_selected().await,
    KeyCode::Char(' ') => app.toggle_pause().await,
    KeyCode::Down | KeyCode::Char('j') => app.scroll(1, now),
    KeyCode::Up | KeyCode::Char('k') => app.scroll(-1, now),
    KeyCode::PageDown => app.scroll(10, now),
    KeyCode::PageUp => app.scroll(-10, now),
    KeyCode::Char('n') => app.next_video().await,
    KeyCode::Char('p') => app.previous_video().await,
    KeyCode::Char(']') => app.next_match().await,
    KeyCode::Char('[') => app.previous_match().await,
    KeyCode::Char('r') => app.replay().await,
    KeyCode::Char('m') => {
      app.load_more();
    }
    KeyCode::Char('N') => app.new_results().await,
    KeyCode::Esc | KeyCode::Char('/') => app.mode = AppMode::Input,
    _ => {}
  }
}

pub fn handle_mouse_event<P: Player, B: SearchBackend>(app: &mut App<P, B>, mouse: MouseEvent, now: Instant) {
  match mouse.kind {
    MouseEventKind::ScrollDown => app.scroll(1, now),
    MouseEventKind::ScrollUp => app.scroll(-1, now),
    _ => {}
  }
}
