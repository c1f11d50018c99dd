//! Paginated result fetching with one request in flight per session.
//!
//! A fetch is split around its only suspension point: [`begin`] takes the
//! session's in-flight flag and builds the request, the network call runs on a
//! spawned task, and [`complete`] releases the flag and merges the page. Every
//! ticket is tagged with the session that issued it so a response arriving
//! after the user started a new search is dropped untouched.

use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::search::{ResultPage, SearchBackend, SearchError, SearchRequest};
use crate::session::{Cursor, Session, SessionId};

/// Identifies an issued fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
  pub session: SessionId,
  pub new_search: bool,
  pub request: SearchRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
  /// The response belonged to a session that has since been replaced.
  Stale,
  /// First page of a new search; results were replaced.
  Replaced { count: usize },
  /// A continuation page was appended.
  Appended { count: usize },
  /// No videos came back; the session is exhausted.
  Empty { new_search: bool },
  /// The page had nothing playable but the backend has more; the token was
  /// kept so the same kind of fetch can be issued again.
  Skipped { new_search: bool },
  /// The request failed and nothing was merged.
  Failed { error: SearchError, new_search: bool },
}

/// Claim the session for a fetch and build its request.
///
/// Returns `None` (and changes nothing) when a fetch is already in flight, or
/// when a continuation is asked for but the session has no further pages.
pub fn begin(session: &mut Session, new_search: bool) -> Option<FetchTicket> {
  if session.fetch_in_flight {
    debug!(session = session.id.0, new_search, "fetch: already in flight, dropping request");
    return None;
  }
  if !new_search && !session.can_continue() {
    debug!(session = session.id.0, exhausted = session.exhausted, "fetch: no further pages");
    return None;
  }
  session.fetch_in_flight = true;
  let request = SearchRequest {
    query: session.query.clone(),
    language: session.language.clone(),
    // A new search only carries a token when a matchless first page was skipped.
    page_token: if new_search && !session.results.is_empty() { None } else { session.page_token.clone() },
  };
  Some(FetchTicket { session: session.id, new_search, request })
}

/// Release the session and merge a finished fetch into it.
pub fn complete(session: &mut Session, ticket: &FetchTicket, result: Result<ResultPage, SearchError>) -> FetchOutcome {
  if ticket.session != session.id {
    debug!(stale = ticket.session.0, current = session.id.0, "fetch: discarding response for replaced session");
    return FetchOutcome::Stale;
  }
  session.fetch_in_flight = false;

  let page = match result {
    Ok(page) => page,
    Err(error) => {
      warn!(err = %error, new_search = ticket.new_search, "fetch: search failed");
      return FetchOutcome::Failed { error, new_search: ticket.new_search };
    }
  };

  if page.videos.is_empty() && page.next_page_token.is_some() {
    info!(new_search = ticket.new_search, "fetch: page had nothing playable, moving to the next one");
    session.page_token = page.next_page_token;
    return FetchOutcome::Skipped { new_search: ticket.new_search };
  }

  if page.videos.is_empty() {
    session.exhausted = true;
    info!(new_search = ticket.new_search, "fetch: no more videos");
    return FetchOutcome::Empty { new_search: ticket.new_search };
  }

  let count = page.videos.len();
  if ticket.new_search {
    session.results = page.videos;
    session.viewed = 0;
    session.cursor = Cursor::default();
    session.exhausted = false;
  } else {
    session.results.extend(page.videos);
  }
  session.page_token = page.next_page_token;
  if session.page_token.is_none() {
    session.exhausted = true;
  }
  session.clamp_viewed();
  info!(count, total = session.results.len(), exhausted = session.exhausted, "fetch: page merged");

  if ticket.new_search { FetchOutcome::Replaced { count } } else { FetchOutcome::Appended { count } }
}

struct PendingFetch {
  ticket: FetchTicket,
  rx: oneshot::Receiver<Result<ResultPage, SearchError>>,
}

/// Runs fetches against a backend and hands back whatever has finished.
pub struct FetchPipeline<B> {
  backend: Arc<B>,
  pending: Vec<PendingFetch>,
}

impl<B: SearchBackend> FetchPipeline<B> {
  pub fn new(backend: B) -> Self {
    Self { backend: Arc::new(backend), pending: Vec::new() }
  }

  /// Start a fetch for `session` if its guards allow one. Returns whether a
  /// request was issued.
  pub fn fetch(&mut self, session: &mut Session, new_search: bool) -> bool {
    let Some(ticket) = begin(session, new_search) else { return false };

    let backend = Arc::clone(&self.backend);
    let request = ticket.request.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(backend.search(request).await);
    });
    self.pending.push(PendingFetch { ticket, rx });
    true
  }

  /// Collect finished fetches without waiting. A task that died without
  /// answering is reported as `TaskFailed` so its session is still released.
  pub fn poll_completed(&mut self) -> Vec<(FetchTicket, Result<ResultPage, SearchError>)> {
    let mut done = Vec::new();
    let mut still_pending = Vec::with_capacity(self.pending.len());
    for mut pending in self.pending.drain(..) {
      match pending.rx.try_recv() {
        Ok(result) => done.push((pending.ticket, result)),
        Err(oneshot::error::TryRecvError::Empty) => still_pending.push(pending),
        Err(oneshot::error::TryRecvError::Closed) => done.push((pending.ticket, Err(SearchError::TaskFailed))),
      }
    }
    self.pending = still_pending;
    done
  }

  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  /// Wait for every outstanding fetch.
  #[cfg(test)]
  pub async fn wait_all(&mut self) -> Vec<(FetchTicket, Result<ResultPage, SearchError>)> {
    let mut done = Vec::new();
    for pending in self.pending.drain(..) {
      let result = pending.rx.await.unwrap_or(Err(SearchError::TaskFailed));
      done.push((pending.ticket, result));
    }
    done
  }
}
