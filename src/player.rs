use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::{
  io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader},
  net::UnixStream,
  process::{Child as TokioChild, Command},
  sync::mpsc,
  task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::constants::constants;

// Error codes carried by `PlayerEvent::Error`.
pub const ERR_INVALID_PARAMETER: u16 = 2;
pub const ERR_UNPLAYABLE: u16 = 5;
pub const ERR_NOT_FOUND: u16 = 100;
pub const ERR_NOT_EMBEDDABLE: u16 = 101;
pub const ERR_NOT_EMBEDDABLE_ALT: u16 = 150;
pub const ERR_UNKNOWN: u16 = 0;

/// The slice of a video to play.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
  pub video_id: String,
  pub start: f64,
  pub end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
  Playing,
  Paused,
  Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
  /// Emitted once; loads before this are not valid.
  Ready,
  StateChange(PlaybackState),
  Error(u16),
}

/// Human-readable text for a player error code.
pub fn error_message(code: u16) -> &'static str {
  match code {
    ERR_INVALID_PARAMETER => "The request contains an invalid parameter value.",
    ERR_UNPLAYABLE => "The requested content cannot be played in this player.",
    ERR_NOT_FOUND => "The video requested was not found.",
    ERR_NOT_EMBEDDABLE | ERR_NOT_EMBEDDABLE_ALT => "This video cannot be played here. Please try another video.",
    _ => "An error occurred while loading the video.",
  }
}

/// The media player as seen by the controller.
///
/// Position is only observable by query; everything else arrives through
/// `poll_event`.
#[allow(async_fn_in_trait)]
pub trait Player {
  async fn load_clip(&mut self, clip: &Clip) -> Result<()>;
  async fn stop(&mut self) -> Result<()>;
  async fn toggle_pause(&mut self) -> Result<()>;
  /// Forget the loaded media.
  fn clear(&mut self);
  fn position(&self) -> Option<f64>;
  fn poll_event(&mut self) -> Option<PlayerEvent>;
}

/// Messages from the mpv IPC monitor task.
#[derive(Debug, Clone, PartialEq)]
pub enum MpvMessage {
  Position(f64),
  Event(PlayerEvent),
}

/// Map one line of mpv's JSON IPC output to a message.
///
/// Replies to our own commands and uninteresting events yield `None`.
pub fn parse_ipc_line(line: &str) -> Option<MpvMessage> {
  let val: Value = serde_json::from_str(line).ok()?;
  match val.get("event")?.as_str()? {
    "property-change" => match val.get("name")?.as_str()? {
      "time-pos" => val.get("data")?.as_f64().map(MpvMessage::Position),
      "pause" => {
        let paused = val.get("data")?.as_bool()?;
        let state = if paused { PlaybackState::Paused } else { PlaybackState::Playing };
        Some(MpvMessage::Event(PlayerEvent::StateChange(state)))
      }
      _ => None,
    },
    "playback-restart" => Some(MpvMessage::Event(PlayerEvent::StateChange(PlaybackState::Playing))),
    "end-file" => match val.get("reason").and_then(Value::as_str) {
      Some("eof") => Some(MpvMessage::Event(PlayerEvent::StateChange(PlaybackState::Ended))),
      Some("error") => {
        let detail = val.get("file_error").and_then(Value::as_str).unwrap_or("");
        Some(MpvMessage::Event(PlayerEvent::Error(file_error_code(detail))))
      }
      // stop/quit/redirect are caused by us
      _ => None,
    },
    _ => None,
  }
}

fn file_error_code(detail: &str) -> u16 {
  let detail = detail.to_lowercase();
  if detail.contains("unrecognized file format") || detail.contains("no audio or video data") {
    ERR_UNPLAYABLE
  } else if detail.contains("access denied") || detail.contains("forbidden") {
    ERR_NOT_EMBEDDABLE
  } else if detail.contains("loading failed") || detail.contains("not found") {
    ERR_NOT_FOUND
  } else {
    ERR_UNKNOWN
  }
}

fn clip_is_valid(clip: &Clip) -> bool {
  !clip.video_id.is_empty() && clip.start.is_finite() && clip.end.is_finite() && clip.start >= 0.0 && clip.end > clip.start
}

/// Plays clips with one `mpv` process per clip, observed over its IPC socket.
pub struct MpvPlayer {
  audio_only: bool,
  current_process: Option<TokioChild>,
  monitor_handle: Option<JoinHandle<()>>,
  monitor_rx: Option<mpsc::UnboundedReceiver<MpvMessage>>,
  ipc_socket_path: Option<PathBuf>,
  events: VecDeque<PlayerEvent>,
  position: Option<f64>,
  pub current: Option<Clip>,
}

impl MpvPlayer {
  pub fn new(audio_only: bool) -> Self {
    Self {
      audio_only,
      current_process: None,
      monitor_handle: None,
      monitor_rx: None,
      ipc_socket_path: None,
      events: VecDeque::from([PlayerEvent::Ready]),
      position: None,
      current: None,
    }
  }

  fn drain_monitor(&mut self) {
    let Some(rx) = &mut self.monitor_rx else { return };
    while let Ok(msg) = rx.try_recv() {
      match msg {
        MpvMessage::Position(pos) => self.position = Some(pos),
        MpvMessage::Event(event) => {
          if let Some(clip) = &self.current {
            debug!(video_id = %clip.video_id, ?event, "player: event");
          }
          self.events.push_back(event);
        }
      }
    }
  }
}

impl Player for MpvPlayer {
  async fn load_clip(&mut self, clip: &Clip) -> Result<()> {
    self.stop().await.context("Failed to stop previous clip")?;

    if !clip_is_valid(clip) {
      warn!(video_id = %clip.video_id, start = clip.start, end = clip.end, "player: rejecting invalid clip bounds");
      self.events.push_back(PlayerEvent::Error(ERR_INVALID_PARAMETER));
      return Ok(());
    }

    let socket_path = std::env::temp_dir().join(format!("clipseek-mpv-{}.sock", std::process::id()));
    // Remove stale socket if it exists from a previous crash.
    let _ = std::fs::remove_file(&socket_path);

    let url = format!("{}{}", constants().watch_url, clip.video_id);
    let mut cmd = Command::new("mpv");
    cmd.args([
      format!("--start={:.3}", clip.start),
      format!("--end={:.3}", clip.end),
      format!("--input-ipc-server={}", socket_path.display()),
      "--idle=no".to_string(),
      "--keep-open=no".to_string(),
      "--really-quiet".to_string(),
    ]);
    if self.audio_only {
      cmd.arg("--no-video");
    } else {
      cmd.arg("--force-window=immediate");
    }
    cmd.arg(&url);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)")
      } else {
        anyhow!(e).context("Failed to spawn mpv process")
      }
    })?;

    info!(video_id = %clip.video_id, start = clip.start, end = clip.end, "player: clip loaded");

    let (tx, rx) = mpsc::unbounded_channel();
    self.monitor_handle = Some(spawn_ipc_monitor(socket_path.clone(), tx));
    self.monitor_rx = Some(rx);
    self.current_process = Some(child);
    self.ipc_socket_path = Some(socket_path);
    self.current = Some(clip.clone());
    Ok(())
  }

  async fn stop(&mut self) -> Result<()> {
    if let Some(handle) = self.monitor_handle.take() {
      handle.abort();
      let _ = handle.await;
    }
    self.monitor_rx = None;
    // Events of the stopped clip must not leak into the next one.
    self.events.retain(|e| *e == PlayerEvent::Ready);

    if let Some(mut child) = self.current_process.take() {
      child.kill().await.context("Failed to kill mpv process")?;
      let _ = child.wait().await;
    }

    if let Some(path) = self.ipc_socket_path.take() {
      let _ = std::fs::remove_file(&path);
    }
    self.position = None;
    Ok(())
  }

  async fn toggle_pause(&mut self) -> Result<()> {
    let Some(ref socket_path) = self.ipc_socket_path else {
      return Ok(());
    };
    let mut stream = UnixStream::connect(socket_path).await.context("Failed to connect to mpv IPC socket")?;
    stream.write_all(b"{\"command\":[\"cycle\",\"pause\"]}\n").await.context("Failed to send pause command to mpv")?;
    Ok(())
  }

  fn clear(&mut self) {
    self.current = None;
    self.position = None;
  }

  fn position(&self) -> Option<f64> {
    self.position
  }

  fn poll_event(&mut self) -> Option<PlayerEvent> {
    self.drain_monitor();
    self.events.pop_front()
  }
}

/// Connect to mpv's IPC socket, subscribe to the properties we track, and
/// forward everything interesting to `tx` until mpv goes away.
fn spawn_ipc_monitor(socket_path: PathBuf, tx: mpsc::UnboundedSender<MpvMessage>) -> JoinHandle<()> {
  tokio::spawn(async move {
    let attempts = constants().ipc_connect_attempts;
    let delay = Duration::from_millis(constants().ipc_connect_delay_ms);

    let mut stream = None;
    for attempt in 0..attempts {
      tokio::time::sleep(delay).await;
      match UnixStream::connect(&socket_path).await {
        Ok(s) => {
          stream = Some(s);
          break;
        }
        Err(e) => debug!(attempt, err = %e, "player: mpv IPC connect failed, retrying"),
      }
    }
    let Some(stream) = stream else {
      warn!("player: mpv IPC socket never came up");
      let _ = tx.send(MpvMessage::Event(PlayerEvent::Error(ERR_UNKNOWN)));
      return;
    };

    let (read_half, mut write_half) = stream.into_split();
    let subscribe = b"{\"command\":[\"observe_property\",1,\"time-pos\"]}\n{\"command\":[\"observe_property\",2,\"pause\"]}\n";
    if let Err(e) = write_half.write_all(subscribe).await {
      warn!(err = %e, "player: failed to subscribe to mpv properties");
    }

    let mut lines = TokioBufReader::new(read_half).lines();
    let mut finished = false;
    while let Ok(Some(line)) = lines.next_line().await {
      let Some(msg) = parse_ipc_line(&line) else { continue };
      if let MpvMessage::Event(PlayerEvent::StateChange(PlaybackState::Ended) | PlayerEvent::Error(_)) = msg {
        finished = true;
      }
      if tx.send(msg).is_err() {
        return;
      }
    }

    // mpv exited without telling us why; treat it as the clip running out.
    if !finished {
      debug!("player: mpv IPC closed without end-file");
      let _ = tx.send(MpvMessage::Event(PlayerEvent::StateChange(PlaybackState::Ended)));
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  // --- parse_ipc_line ---

  #[test]
  fn ipc_time_pos() {
    let msg = parse_ipc_line(r#"{"event":"property-change","id":1,"name":"time-pos","data":12.5}"#);
    assert_eq!(msg, Some(MpvMessage::Position(12.5)));
  }

  #[test]
  fn ipc_time_pos_null_is_ignored() {
    assert_eq!(parse_ipc_line(r#"{"event":"property-change","id":1,"name":"time-pos","data":null}"#), None);
  }

  #[test]
  fn ipc_pause_toggles() {
    assert_eq!(
      parse_ipc_line(r#"{"event":"property-change","id":2,"name":"pause","data":true}"#),
      Some(MpvMessage::Event(PlayerEvent::StateChange(PlaybackState::Paused)))
    );
    assert_eq!(
      parse_ipc_line(r#"{"event":"property-change","id":2,"name":"pause","data":false}"#),
      Some(MpvMessage::Event(PlayerEvent::StateChange(PlaybackState::Playing)))
    );
  }

  #[test]
  fn ipc_playback_restart_is_playing() {
    assert_eq!(
      parse_ipc_line(r#"{"event":"playback-restart"}"#),
      Some(MpvMessage::Event(PlayerEvent::StateChange(PlaybackState::Playing)))
    );
  }

  #[test]
  fn ipc_end_file_eof_is_ended() {
    assert_eq!(
      parse_ipc_line(r#"{"event":"end-file","reason":"eof","playlist_entry_id":1}"#),
      Some(MpvMessage::Event(PlayerEvent::StateChange(PlaybackState::Ended)))
    );
  }

  #[test]
  fn ipc_end_file_error_maps_code() {
    let line = r#"{"event":"end-file","reason":"error","file_error":"loading failed"}"#;
    assert_eq!(parse_ipc_line(line), Some(MpvMessage::Event(PlayerEvent::Error(ERR_NOT_FOUND))));
    let line = r#"{"event":"end-file","reason":"error","file_error":"unrecognized file format"}"#;
    assert_eq!(parse_ipc_line(line), Some(MpvMessage::Event(PlayerEvent::Error(ERR_UNPLAYABLE))));
    let line = r#"{"event":"end-file","reason":"error"}"#;
    assert_eq!(parse_ipc_line(line), Some(MpvMessage::Event(PlayerEvent::Error(ERR_UNKNOWN))));
  }

  #[test]
  fn ipc_end_file_stop_is_ignored() {
    assert_eq!(parse_ipc_line(r#"{"event":"end-file","reason":"stop"}"#), None);
    assert_eq!(parse_ipc_line(r#"{"event":"end-file","reason":"quit"}"#), None);
  }

  #[test]
  fn ipc_command_replies_are_ignored() {
    assert_eq!(parse_ipc_line(r#"{"request_id":0,"error":"success"}"#), None);
    assert_eq!(parse_ipc_line("not json"), None);
  }

  // --- error_message ---

  #[test]
  fn error_messages_by_code() {
    assert_eq!(error_message(2), "The request contains an invalid parameter value.");
    assert_eq!(error_message(5), "The requested content cannot be played in this player.");
    assert_eq!(error_message(100), "The video requested was not found.");
    assert_eq!(error_message(101), error_message(150));
    assert_eq!(error_message(101), "This video cannot be played here. Please try another video.");
    assert_eq!(error_message(42), "An error occurred while loading the video.");
  }

  // --- MpvPlayer without a process ---

  #[test]
  fn mpv_player_is_ready_once() {
    let mut player = MpvPlayer::new(true);
    assert_eq!(player.poll_event(), Some(PlayerEvent::Ready));
    assert_eq!(player.poll_event(), None);
    assert_eq!(player.position(), None);
  }

  #[tokio::test]
  async fn mpv_player_rejects_inverted_clip() {
    let mut player = MpvPlayer::new(true);
    assert_eq!(player.poll_event(), Some(PlayerEvent::Ready));
    let clip = Clip { video_id: "abc".into(), start: 10.0, end: 4.0 };
    player.load_clip(&clip).await.unwrap();
    assert_eq!(player.poll_event(), Some(PlayerEvent::Error(ERR_INVALID_PARAMETER)));
    assert!(player.current.is_none());
  }

  #[test]
  fn clip_validity() {
    assert!(clip_is_valid(&Clip { video_id: "a".into(), start: 0.0, end: 5.0 }));
    assert!(!clip_is_valid(&Clip { video_id: "a".into(), start: 5.0, end: 5.0 }));
    assert!(!clip_is_valid(&Clip { video_id: "a".into(), start: -1.0, end: 5.0 }));
    assert!(!clip_is_valid(&Clip { video_id: "".into(), start: 0.0, end: 5.0 }));
  }
}
