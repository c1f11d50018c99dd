use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, Padding, Paragraph, Wrap},
};
use std::time::Instant;

use crate::app::{App, AppMode, Phase};
use crate::input::TextField;
use crate::player::PlaybackState;
use crate::search::VideoResult;
use crate::theme::Theme;

const SPINNER: [&str; 4] = ["◐", "◓", "◑", "◒"];

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// `m:ss` for a clip boundary.
fn format_time(secs: f64) -> String {
  let total = secs.max(0.0).floor() as u64;
  format!("{}:{:02}", total / 60, total % 60)
}

fn video_label(video: &VideoResult) -> &str {
  video.title.as_deref().unwrap_or(&video.id)
}

fn rounded(theme: &Theme) -> Block<'static> {
  Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border))
}

// --- UI Rendering ---

pub fn ui<P, B>(frame: &mut Frame, app: &mut App<P, B>) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(5),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, theme, header_area);
  render_main(frame, app, main_area);
  render_status(frame, app, status_area);
  render_inputs(frame, app, input_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, theme: &Theme, area: Rect) {
  let left = Line::from(Span::styled(" ▶ clipseek ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_main<P, B>(frame: &mut Frame, app: &mut App<P, B>, area: Rect) {
  if app.session.results.is_empty() {
    render_welcome(frame, app.theme(), area);
    return;
  }
  let [list_area, player_area] =
    Layout::horizontal([Constraint::Percentage(45), Constraint::Percentage(55)]).areas(area);
  render_results(frame, app, list_area);
  render_player(frame, app, player_area);
}

fn render_welcome(frame: &mut Frame, theme: &Theme, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("▶  Welcome to clipseek", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled("Find the moment a word is spoken. Watch just that clip.", Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(Span::styled(
      "Type a query below and press Enter. Tab switches to the language field.",
      Style::default().fg(theme.muted),
    )),
  ];
  let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(rounded(theme));
  frame.render_widget(paragraph, area);
}

fn render_results<P, B>(frame: &mut Frame, app: &mut App<P, B>, area: Rect) {
  let theme = app.theme();
  let playing = app.session.cursor.video;

  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = area.width.saturating_sub(4) as usize;

  let items: Vec<ListItem> = app
    .session
    .results
    .iter()
    .enumerate()
    .map(|(i, video)| {
      let bg = if i % 2 == 1 { theme.stripe_bg } else { theme.bg };
      let marker = if i == playing { "♪ " } else { "  " };
      let count = format!("{}×", video.matches.len());
      let title_max = inner_w.saturating_sub(count.chars().count() + marker.len() + 1);
      let title = truncate_str(video_label(video), title_max);
      let gap = inner_w.saturating_sub(marker.chars().count() + title.chars().count() + count.chars().count());

      let title_style = if i == playing { Style::default().fg(theme.accent) } else { Style::default().fg(theme.fg) };
      let line = Line::from(vec![
        Span::styled(marker, Style::default().fg(theme.accent)),
        Span::styled(title, title_style),
        Span::raw(" ".repeat(gap)),
        Span::styled(count, Style::default().fg(theme.muted)),
      ]);
      ListItem::new(line).bg(bg)
    })
    .collect();

  let suffix = match app.phase {
    Phase::LoadingMore => " (loading more…)",
    Phase::Exhausted => " (end)",
    _ => "",
  };
  let title = format!(" Results — {} videos{} ", app.session.results.len(), suffix);
  let border = if app.mode == AppMode::Results { theme.accent } else { theme.border };

  let list = List::new(items)
    .block(
      rounded(theme)
        .title(title)
        .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
        .border_style(Style::default().fg(border)),
    )
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_player<P, B>(frame: &mut Frame, app: &App<P, B>, area: Rect) {
  let theme = app.theme();
  let state = match app.playback {
    Some(PlaybackState::Playing) => "playing",
    Some(PlaybackState::Paused) => "paused",
    Some(PlaybackState::Ended) | None => "stopped",
  };
  let title = Line::from(vec![
    Span::styled(" Now Playing ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
    Span::styled(format!("[{}] ", state), Style::default().fg(theme.muted)),
  ]);
  let block = rounded(theme).title(title).padding(Padding::horizontal(1));

  let Some((video, matched)) = app.now_playing() else {
    frame.render_widget(block, area);
    return;
  };
  let inner_w = area.width.saturating_sub(4) as usize;

  let mut lines = vec![
    Line::from(""),
    Line::from(Span::styled(
      truncate_str(video_label(video), inner_w),
      Style::default().fg(theme.fg).add_modifier(Modifier::BOLD),
    )),
    Line::from(""),
  ];
  if let Some(m) = video.matches.get(matched) {
    lines.push(Line::from(vec![
      Span::styled("Clip      ", Style::default().fg(theme.muted)),
      Span::styled(format!("{} – {}", format_time(m.start), format_time(m.end)), Style::default().fg(theme.fg)),
    ]));
  }
  lines.push(Line::from(vec![
    Span::styled("Match     ", Style::default().fg(theme.muted)),
    Span::styled(format!("{} of {}", matched + 1, video.matches.len()), Style::default().fg(theme.fg)),
  ]));
  lines.push(Line::from(""));
  lines.push(Line::from(Span::styled(
    truncate_str(&format!("{}{}", crate::constants::constants().watch_url, video.id), inner_w),
    Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED),
  )));
  lines.push(Line::from(""));

  // Subtitle overlay; query terms stand out.
  if let Some(overlay) = app.subtitles.overlay() {
    let spans: Vec<Span> = overlay
      .fragments()
      .into_iter()
      .map(|f| {
        if f.hit {
          Span::styled(f.text.to_string(), Style::default().fg(theme.hit).add_modifier(Modifier::BOLD))
        } else {
          Span::styled(f.text.to_string(), Style::default().fg(theme.fg))
        }
      })
      .collect();
    lines.push(Line::from(spans));
  }

  let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true }).block(block);
  frame.render_widget(paragraph, area);
}

fn render_status<P, B>(frame: &mut Frame, app: &App<P, B>, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if app.is_loading() {
    let frame_idx = (Instant::now().duration_since(app.started_at).as_millis() / 150) as usize % SPINNER.len();
    let what = if app.phase == Phase::Searching { "Searching" } else { "Loading more" };
    (format!(" {} {}…", SPINNER[frame_idx], what), Style::default().fg(theme.status))
  } else if app.new_results_available() {
    (" No more results. Press N for a fresh search.".to_string(), Style::default().fg(theme.status))
  } else if app.session.results.is_empty() {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  } else {
    (format!(" ♪ {}", app.viewed_label()), Style::default().fg(theme.status))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);

  if !app.session.results.is_empty() {
    let label = format!("{} ", app.viewed_label());
    let right_area =
      Rect { x: area.x + area.width.saturating_sub(label.len() as u16), width: label.len() as u16, ..area };
    frame.render_widget(Line::from(Span::styled(label, Style::default().fg(theme.muted))), right_area);
  }
}

fn render_inputs<P, B>(frame: &mut Frame, app: &mut App<P, B>, area: Rect) {
  let theme = app.theme();
  let [query_area, language_area] = Layout::horizontal([Constraint::Min(10), Constraint::Length(14)]).areas(area);
  let mode = app.mode;
  render_field(frame, theme, &mut app.query, " Search phrase ", mode == AppMode::Input, query_area);
  render_field(frame, theme, &mut app.language, " Language ", mode == AppMode::Language, language_area);
}

/// Scroll `field` so its cursor stays inside a window `inner_w` columns wide.
/// Returns the cursor column relative to the window.
fn follow_cursor(field: &mut TextField, inner_w: usize) -> usize {
  // A field squeezed to nothing still shows the cursor column.
  let inner_w = inner_w.max(1);
  let cursor_col = display_width(&field.text, field.cursor);

  if cursor_col < field.scroll {
    field.scroll = cursor_col;
  } else if cursor_col >= field.scroll + inner_w {
    field.scroll = cursor_col + 1 - inner_w;
  }
  cursor_col - field.scroll
}

fn render_field(frame: &mut Frame, theme: &Theme, field: &mut TextField, title: &'static str, focused: bool, area: Rect) {
  let border_color = if focused { theme.accent } else { theme.border };
  let block = rounded(theme)
    .title(title)
    .title_style(Style::default().fg(border_color))
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_offset = follow_cursor(field, inner_w);

  let scroll = field.scroll;
  let visible: String = field
    .text
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= scroll)
    .take_while(|(start, _, _)| *start < scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  frame.render_widget(Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(block), area);

  if focused {
    let cursor_x = area.x + 2 + cursor_offset as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_footer<P, B>(frame: &mut Frame, app: &App<P, B>, area: Rect) {
  let theme = app.theme();
  let has_results = !app.session.results.is_empty();
  let is_playing = app.playback.is_some();
  // (key, action, enabled)
  let keys: Vec<(&str, &str, bool)> = match app.mode {
    AppMode::Input | AppMode::Language => {
      let mut k = vec![("Enter", "Search", true), ("Tab", "Field", true), ("^t", "Theme", true)];
      if is_playing {
        k.push(("^s", "Stop", true));
      }
      if has_results {
        k.push(("↓", "Results", true));
      } else {
        k.push(("Esc", "Quit", true));
      }
      k
    }
    AppMode::Results => {
      let mut k = vec![
        ("Enter", "Play", true),
        ("n", "Next", true),
        ("p", "Prev", app.previous_enabled()),
        ("[ ]", "Match", true),
        ("r", "Replay", true),
      ];
      if is_playing {
        let pause_label = if app.playback == Some(PlaybackState::Paused) { "Resume" } else { "Pause" };
        k.push(("Space", pause_label, true));
      }
      if app.new_results_available() {
        k.push(("N", "New results", true));
      } else {
        k.push(("m", "More", app.session.can_continue()));
      }
      k.push(("Esc", "Back", true));
      k
    }
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action, enabled))| {
      let (key_style, action_style) = if *enabled {
        (Style::default().fg(theme.key_fg).bg(theme.key_bg), Style::default().fg(theme.muted))
      } else {
        (Style::default().fg(theme.muted).bg(theme.stripe_bg), Style::default().fg(theme.border))
      };
      let mut s = vec![Span::styled(format!(" {} ", key), key_style), Span::styled(format!(" {} ", action), action_style)];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}
