//! Boundary to the activation data backend.
//!
//! The engine only needs two asynchronous calls: fetch a context window around
//! a position, and run a match query. How they travel is up to the
//! implementation.

use shared::{ContextWindow, Corpus, InvariantViolation, MatchRequest, MatchResult};
use std::future::Future;
use std::rc::Rc;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

/// A response that violates the activation/word alignment invariants.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("malformed response: {0}")]
pub struct MalformedResponse(#[from] pub InvariantViolation);

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Malformed(#[from] MalformedResponse),
}

/// What became of a response once it arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Applied,
    /// Superseded by a newer accepted response and dropped.
    Stale,
}

pub trait DataGateway: 'static {
    /// Context window anchored at `position + offset`.
    fn fetch_context(
        &self,
        position: i64,
        offset: i64,
    ) -> impl Future<Output = Result<ContextWindow, TransportError>>;

    fn fetch_match(
        &self,
        request: &MatchRequest,
    ) -> impl Future<Output = Result<MatchResult, TransportError>>;
}

/// Serves context windows out of an in-memory corpus.
#[derive(Clone, Debug)]
pub struct CorpusGateway {
    corpus: Rc<Corpus>,
    window_length: usize,
}

impl CorpusGateway {
    pub const DEFAULT_WINDOW_LENGTH: usize = 40;

    pub fn new(corpus: Corpus, window_length: usize) -> Self {
        Self {
            corpus: Rc::new(corpus),
            window_length: window_length.max(1),
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }
}

impl DataGateway for CorpusGateway {
    fn fetch_context(
        &self,
        position: i64,
        offset: i64,
    ) -> impl Future<Output = Result<ContextWindow, TransportError>> {
        let window = self
            .corpus
            .window(position.saturating_add(offset), self.window_length);
        async move { Ok(window) }
    }

    fn fetch_match(
        &self,
        request: &MatchRequest,
    ) -> impl Future<Output = Result<MatchResult, TransportError>> {
        let mode = request.mode;
        async move {
            Err(TransportError::Unsupported(format!(
                "{} matching needs a search backend",
                mode
            )))
        }
    }
}
