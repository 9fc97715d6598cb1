//! Owner of the analysis state.
//!
//! Every mutation of [`AnalysisState`] goes through [`StateController`]. It
//! validates UI intents, issues gateway requests, and publishes change events
//! once a mutation is complete, so subscribers never observe a half-applied
//! update.

use crate::dataflow::{RequestSequencer, Throttle};
use crate::error_display::{ErrorAlert, log_error_only};
use crate::events::{AppEvent, AppEventBus};
use crate::gateway::{DataGateway, RequestError, RequestOutcome, TransportError};
use crate::selection::compute_selection;
use futures::{Stream, StreamExt};
use futures_signals::signal::{Mutable, Signal};
use indexmap::IndexSet;
use shared::{
    AnalysisState, ContextWindow, InvariantViolation, MatchMode, MatchRequest, MatchResult,
    SelectionResult, TimingSection, WordRange,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A malformed UI intent, rejected with the state left unchanged.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("threshold must be >= 0, got {0}")]
    NegativeThreshold(f32),
    #[error("threshold must be a finite number")]
    NonFiniteThreshold,
    #[error("range end {end} lies before its start {start}")]
    InvertedRange { start: i64, end: i64 },
}

/// Input-widget intents, independent of the concrete widgets.
#[derive(Debug, Clone, PartialEq)]
pub enum UiIntent {
    SetThreshold(f32),
    SetWordBrush(Option<WordRange>),
    SetZeroBrush(Option<WordRange>),
    IncrementPosition,
    DecrementPosition,
    MoreContext,
    IncreaseCellWidth,
    DecreaseCellWidth,
    RequestMatch(MatchMode),
    WindowResized(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub selection_throttle: Duration,
    pub position_step: i64,
    pub cell_width_step: u32,
    pub min_cell_width: u32,
}

impl From<&TimingSection> for ControllerSettings {
    fn from(timing: &TimingSection) -> Self {
        Self {
            selection_throttle: Duration::from_millis(timing.selection_throttle_ms),
            position_step: timing.position_step,
            cell_width_step: timing.cell_width_step,
            min_cell_width: timing.min_cell_width.max(1),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&TimingSection::default())
    }
}

#[derive(Debug, Clone, Copy)]
struct ContextTicket {
    seq: u64,
    base: i64,
    offset: i64,
}

impl ContextTicket {
    fn target(&self) -> i64 {
        self.base.saturating_add(self.offset)
    }
}

pub struct StateController<G: DataGateway> {
    inner: Rc<ControllerInner<G>>,
}

struct ControllerInner<G: DataGateway> {
    state: Mutable<AnalysisState>,
    matching: Mutable<Option<Arc<MatchResult>>>,
    bus: AppEventBus,
    gateway: G,
    settings: ControllerSettings,
    meta_dims: IndexSet<String>,
    context_requests: RequestSequencer,
    match_requests: RequestSequencer,
    // Target position of every context request still awaiting its response.
    context_in_flight: RefCell<BTreeMap<u64, i64>>,
    selection_throttle: Throttle<()>,
}

impl<G: DataGateway> Clone for StateController<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<G: DataGateway> StateController<G> {
    /// Takes ownership of a bootstrapped state. Brushes are clamped into the
    /// loaded window; a state whose matrix and words disagree is refused.
    pub fn new(
        mut initial: AnalysisState,
        gateway: G,
        bus: AppEventBus,
        settings: ControllerSettings,
        meta_dims: IndexSet<String>,
    ) -> Result<Self, InvariantViolation> {
        initial.check_invariants()?;
        let len = initial.time_steps();
        initial.word_brush = initial.word_brush.and_then(|range| range.clamped(len));
        initial.word_brush_zero = initial.word_brush_zero.and_then(|range| range.clamped(len));
        initial.cell_width = initial.cell_width.max(settings.min_cell_width);

        let inner = Rc::new_cyclic(|weak: &Weak<ControllerInner<G>>| {
            let weak = weak.clone();
            let selection_throttle = Throttle::new(settings.selection_throttle, move |()| {
                if let Some(inner) = weak.upgrade() {
                    StateController { inner }.publish_selection();
                }
            });
            ControllerInner {
                context_in_flight: RefCell::new(BTreeMap::new()),
                state: Mutable::new(initial),
                matching: Mutable::new(None),
                bus,
                gateway,
                settings,
                meta_dims,
                context_requests: RequestSequencer::new(),
                match_requests: RequestSequencer::new(),
                selection_throttle,
            }
        });
        Ok(Self { inner })
    }

    pub fn bus(&self) -> &AppEventBus {
        &self.inner.bus
    }

    pub fn gateway(&self) -> &G {
        &self.inner.gateway
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.inner.settings
    }

    pub fn meta_dims(&self) -> &IndexSet<String> {
        &self.inner.meta_dims
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AnalysisState {
        self.inner.state.get_cloned()
    }

    /// Read-only signal of the state for observers that prefer pulling.
    pub fn state_signal(&self) -> impl Signal<Item = AnalysisState> + use<G> {
        self.inner.state.signal_cloned()
    }

    pub fn matching_results(&self) -> Option<Arc<MatchResult>> {
        self.inner.matching.get_cloned()
    }

    /// Selection derived from the current state, computed on every call.
    pub fn cell_selection(&self) -> SelectionResult {
        compute_selection(&self.inner.state.lock_ref())
    }

    pub fn selection_pending(&self) -> bool {
        self.inner.selection_throttle.is_pending()
    }

    // ===== SYNCHRONOUS INTENTS =====

    pub fn set_threshold(&self, value: f32) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteThreshold);
        }
        if value < 0.0 {
            return Err(ValidationError::NegativeThreshold(value));
        }
        {
            let mut state = self.inner.state.lock_mut();
            if state.threshold == value {
                return Ok(());
            }
            state.threshold = value;
        }
        log::debug!("threshold set to {}", value);
        self.schedule_selection();
        self.inner.bus.publish(AppEvent::ThresholdChanged(value));
        Ok(())
    }

    /// Stores the hypothesis brush and returns it as normalized into the
    /// loaded window (`None` when nothing of it remains inside).
    pub fn set_word_brush(
        &self,
        range: Option<WordRange>,
    ) -> Result<Option<WordRange>, ValidationError> {
        self.set_brush(range, BrushSlot::Hypothesis)
    }

    pub fn set_zero_brush(
        &self,
        range: Option<WordRange>,
    ) -> Result<Option<WordRange>, ValidationError> {
        self.set_brush(range, BrushSlot::Contrast)
    }

    fn set_brush(
        &self,
        range: Option<WordRange>,
        slot: BrushSlot,
    ) -> Result<Option<WordRange>, ValidationError> {
        if let Some(range) = range.filter(WordRange::is_inverted) {
            return Err(ValidationError::InvertedRange {
                start: range.start,
                end: range.end,
            });
        }

        let normalized = {
            let mut state = self.inner.state.lock_mut();
            let len = state.time_steps();
            let normalized = range.and_then(|range| range.clamped(len));
            let brush = match slot {
                BrushSlot::Hypothesis => &mut state.word_brush,
                BrushSlot::Contrast => &mut state.word_brush_zero,
            };
            if *brush == normalized {
                return Ok(normalized);
            }
            *brush = normalized;
            normalized
        };
        log::debug!("{:?} brush set to {:?}", slot, normalized);
        self.schedule_selection();
        Ok(normalized)
    }

    /// Sets the zoom factor, never below the minimum rendering width.
    pub fn set_cell_width(&self, px: u32) -> u32 {
        let width = px.max(self.inner.settings.min_cell_width);
        let changed = {
            let mut state = self.inner.state.lock_mut();
            let changed = state.cell_width != width;
            state.cell_width = width;
            changed
        };
        if changed {
            self.inner.bus.publish(AppEvent::CellWidthChanged(width));
        }
        width
    }

    pub fn increase_cell_width(&self) -> u32 {
        let current = self.inner.state.lock_ref().cell_width;
        self.set_cell_width(current.saturating_add(self.inner.settings.cell_width_step))
    }

    pub fn decrease_cell_width(&self) -> u32 {
        let current = self.inner.state.lock_ref().cell_width;
        self.set_cell_width(current.saturating_sub(self.inner.settings.cell_width_step))
    }

    pub fn window_resize(&self, width: u32) {
        self.inner.state.lock_mut().viewport_width = width;
        self.inner.bus.publish(AppEvent::WindowResize { width });
    }

    // ===== CONTEXT REQUESTS =====

    /// Fetches the window anchored `offset` steps from the current anchor on
    /// a local task.
    pub fn request_context(&self, offset: i64) -> JoinHandle<Result<RequestOutcome, RequestError>> {
        let ticket = self.issue_context(offset);
        let controller = self.clone();
        tokio::task::spawn_local(async move { controller.complete_context(ticket).await })
    }

    /// Same as [`request_context`](Self::request_context) but awaited inline.
    pub async fn load_context(&self, offset: i64) -> Result<RequestOutcome, RequestError> {
        let ticket = self.issue_context(offset);
        self.complete_context(ticket).await
    }

    pub fn increment_position(&self) -> JoinHandle<Result<RequestOutcome, RequestError>> {
        self.request_context(self.inner.settings.position_step)
    }

    pub fn decrement_position(&self) -> JoinHandle<Result<RequestOutcome, RequestError>> {
        self.request_context(self.inner.settings.position_step.saturating_neg())
    }

    pub fn request_more_context(&self) -> JoinHandle<Result<RequestOutcome, RequestError>> {
        self.request_context(0)
    }

    fn issue_context(&self, offset: i64) -> ContextTicket {
        let base = self.context_anchor();
        let seq = self.inner.context_requests.issue();
        let ticket = ContextTicket { seq, base, offset };
        self.inner
            .context_in_flight
            .borrow_mut()
            .insert(seq, ticket.target());
        log::debug!("context request #{} at {} {:+}", seq, base, offset);
        ticket
    }

    /// Position the next relative step starts from: the target of the newest
    /// request that can still be applied, else the committed position.
    fn context_anchor(&self) -> i64 {
        let accepted = self.inner.context_requests.highest_accepted();
        let pending = self
            .inner
            .context_in_flight
            .borrow()
            .range(accepted.saturating_add(1)..)
            .next_back()
            .map(|(_, target)| *target);
        pending.unwrap_or_else(|| self.inner.state.lock_ref().position)
    }

    async fn complete_context(&self, ticket: ContextTicket) -> Result<RequestOutcome, RequestError> {
        let response = self
            .inner
            .gateway
            .fetch_context(ticket.base, ticket.offset)
            .await;
        self.apply_context_response(ticket, response)
    }

    fn apply_context_response(
        &self,
        ticket: ContextTicket,
        response: Result<ContextWindow, TransportError>,
    ) -> Result<RequestOutcome, RequestError> {
        let requests = &self.inner.context_requests;
        self.inner.context_in_flight.borrow_mut().remove(&ticket.seq);
        if !requests.is_current(ticket.seq) {
            log::debug!("dropping stale context response #{}", ticket.seq);
            return Ok(RequestOutcome::Stale);
        }

        let window = match response
            .map_err(RequestError::from)
            .and_then(|window| match window.validate() {
                Ok(()) => Ok(window),
                Err(violation) => Err(RequestError::Malformed(violation.into())),
            }) {
            Ok(window) => window,
            Err(error) => {
                if requests.is_latest(ticket.seq) {
                    self.surface_error("Context", &error);
                } else {
                    log::debug!("context request #{} failed: {}", ticket.seq, error);
                }
                return Err(error);
            }
        };
        requests.accept(ticket.seq);

        let target = ticket.target();
        let snapshot = {
            let mut state = self.inner.state.lock_mut();
            let (activation, words) = window.into_parts();
            // Brushes follow the words, so they move by how far the window
            // itself moved. The backend may clamp it at the corpus edges.
            let shift = if state.time_steps() > 0 {
                activation.left.saturating_sub(state.window.left)
            } else {
                0
            };
            let len = words.len();
            state.position = target.clamp(activation.left, activation.right.max(activation.left));
            state.window = activation;
            state.words = words;
            state.word_brush = state
                .word_brush
                .and_then(|range| range.shifted(shift.saturating_neg()).clamped(len));
            state.word_brush_zero = state
                .word_brush_zero
                .and_then(|range| range.shifted(shift.saturating_neg()).clamped(len));
            Arc::new((*state).clone())
        };
        log::info!(
            "context #{} loaded: position {}, {} time steps",
            ticket.seq,
            snapshot.position,
            snapshot.time_steps()
        );

        self.inner.selection_throttle.cancel();
        self.inner.bus.publish(AppEvent::NewContextAvailable(snapshot));
        self.publish_selection();
        Ok(RequestOutcome::Applied)
    }

    // ===== MATCH REQUESTS =====

    /// Issues a match query for the current selection. The sequence number is
    /// assigned here, before the request leaves.
    pub fn request_match(
        &self,
        meta_dims: IndexSet<String>,
        mode: MatchMode,
    ) -> JoinHandle<Result<RequestOutcome, RequestError>> {
        let request = self.issue_match(meta_dims, mode);
        let controller = self.clone();
        tokio::task::spawn_local(async move {
            let response = controller.inner.gateway.fetch_match(&request).await;
            controller.apply_match_response(request.seq, response)
        })
    }

    fn issue_match(&self, meta_dims: IndexSet<String>, mode: MatchMode) -> MatchRequest {
        let seq = self.inner.match_requests.issue();
        let selection = self.cell_selection();
        let threshold = self.inner.state.lock_ref().threshold;
        log::debug!(
            "match request #{} ({}) for {} cells",
            seq,
            mode,
            selection.selected_cells.len()
        );
        MatchRequest {
            seq,
            meta_dims,
            mode,
            cells: selection.selected_cells.into_iter().collect(),
            threshold,
        }
    }

    /// Applies the response to match request `seq` unless a newer response
    /// has already been accepted.
    pub fn apply_match_response(
        &self,
        seq: u64,
        response: Result<MatchResult, TransportError>,
    ) -> Result<RequestOutcome, RequestError> {
        let requests = &self.inner.match_requests;
        if !requests.is_current(seq) {
            log::debug!("dropping stale match response #{}", seq);
            return Ok(RequestOutcome::Stale);
        }

        let result = match response {
            Ok(result) => result,
            Err(error) => {
                let error = RequestError::from(error);
                if requests.is_latest(seq) {
                    self.surface_error("Match", &error);
                } else {
                    log::debug!("match request #{} failed: {}", seq, error);
                }
                return Err(error);
            }
        };
        if let Err(violation) = result.validate() {
            let error = RequestError::Malformed(violation.into());
            self.surface_error("Match", &error);
            return Err(error);
        }
        requests.accept(seq);

        let result = Arc::new(result);
        log::info!("match #{} accepted: {} rows", seq, result.rows.len());
        self.inner.matching.set(Some(Arc::clone(&result)));
        self.inner.bus.publish(AppEvent::NewMatchingResults(result));
        Ok(RequestOutcome::Applied)
    }

    // ===== SELECTION =====

    /// Recomputes and publishes the selection now, dropping any throttled run.
    pub fn refresh_selection(&self) {
        self.inner.selection_throttle.cancel();
        self.publish_selection();
    }

    fn schedule_selection(&self) {
        self.inner.selection_throttle.schedule(());
    }

    fn publish_selection(&self) {
        let selection = Arc::new(self.cell_selection());
        log::debug!(
            "selection recomputed: {} cells",
            selection.selected_cells.len()
        );
        self.inner
            .bus
            .publish(AppEvent::CellSelectionChanged(selection));
    }

    fn surface_error(&self, request: &str, error: &RequestError) {
        let alert = ErrorAlert::from_request_error(request, error);
        if matches!(error, RequestError::Malformed(_)) {
            log::error!("{}", alert.technical_error);
        } else {
            log_error_only(&alert);
        }
        self.inner.bus.publish(AppEvent::ErrorRaised(alert));
    }

    // ===== INTENT PROCESSING =====

    pub fn handle_intent(&self, intent: UiIntent) {
        let rejected = match intent {
            UiIntent::SetThreshold(value) => self.set_threshold(value).err(),
            UiIntent::SetWordBrush(range) => self.set_word_brush(range).err(),
            UiIntent::SetZeroBrush(range) => self.set_zero_brush(range).err(),
            UiIntent::IncrementPosition => {
                self.increment_position();
                None
            }
            UiIntent::DecrementPosition => {
                self.decrement_position();
                None
            }
            UiIntent::MoreContext => {
                self.request_more_context();
                None
            }
            UiIntent::IncreaseCellWidth => {
                self.increase_cell_width();
                None
            }
            UiIntent::DecreaseCellWidth => {
                self.decrease_cell_width();
                None
            }
            UiIntent::RequestMatch(mode) => {
                self.request_match(self.inner.meta_dims.clone(), mode);
                None
            }
            UiIntent::WindowResized(width) => {
                self.window_resize(width);
                None
            }
        };
        if let Some(error) = rejected {
            log::warn!("intent rejected: {}", error);
        }
    }

    /// Drains `intents` one at a time until the stream ends.
    pub async fn process_intents(&self, intents: impl Stream<Item = UiIntent>) {
        let mut intents = std::pin::pin!(intents);
        while let Some(intent) = intents.next().await {
            self.handle_intent(intent);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BrushSlot {
    Hypothesis,
    Contrast,
}
