//! Wiring between the bus, the controller and the visual components.
//!
//! Views never talk to each other. They get bus events through a
//! [`ViewSink`] and publish their own brush and hover events on the bus; the
//! coordinator forwards brush moves to the controller.

use crate::controller::StateController;
use crate::dataflow::SubscriptionId;
use crate::error_display::ErrorAlert;
use crate::events::{AppEvent, AppEventBus, EventKind};
use crate::gateway::DataGateway;
use shared::{AnalysisState, MatchResult, SelectionResult};
use std::rc::Rc;

/// Receiving side of the visual components. Every method defaults to a
/// no-op so a view implements only what it renders.
pub trait ViewSink {
    fn context_loaded(&self, _state: &AnalysisState) {}
    fn selection_changed(&self, _selection: &SelectionResult) {}
    fn matching_results(&self, _result: &MatchResult) {}
    fn threshold_changed(&self, _threshold: f32) {}
    fn cell_width_changed(&self, _width: u32) {}
    fn viewport_resized(&self, _width: u32) {}
    fn cell_hovered(&self, _index: Option<usize>) {}
    fn matrix_cell_hovered(&self, _row: usize, _col: usize, _active: bool) {}
    fn heatmap_selected(&self, _heatmap: Option<&str>) {}
    fn error_raised(&self, _alert: &ErrorAlert) {}
}

const VIEW_EVENTS: [EventKind; 10] = [
    EventKind::NewContextAvailable,
    EventKind::CellSelectionChanged,
    EventKind::NewMatchingResults,
    EventKind::ThresholdChanged,
    EventKind::CellWidthChanged,
    EventKind::WindowResize,
    EventKind::CellHovered,
    EventKind::MatrixCellHovered,
    EventKind::RectSelected,
    EventKind::ErrorRaised,
];

/// Holds the bus subscriptions of one attached sink; dropping it detaches.
pub struct ViewCoordinator {
    bus: AppEventBus,
    subscriptions: Vec<SubscriptionId>,
}

impl ViewCoordinator {
    pub fn attach<G: DataGateway>(controller: &StateController<G>, sink: Rc<dyn ViewSink>) -> Self {
        let bus = controller.bus().clone();

        let views = bus.subscribe(&VIEW_EVENTS, move |event| deliver(sink.as_ref(), event));

        let brushes = {
            let controller = controller.clone();
            bus.subscribe(
                &[EventKind::BrushSelectionChanged, EventKind::ZeroBrushSelectionChanged],
                move |event| {
                    let applied = match event {
                        AppEvent::BrushSelectionChanged(range) => controller.set_word_brush(*range),
                        AppEvent::ZeroBrushSelectionChanged(range) => controller.set_zero_brush(*range),
                        _ => return,
                    };
                    if let Err(error) = applied {
                        log::warn!("brush ignored: {}", error);
                    }
                },
            )
        };

        Self {
            bus,
            subscriptions: vec![views, brushes],
        }
    }

    pub fn detach(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}

impl Drop for ViewCoordinator {
    fn drop(&mut self) {
        self.detach();
    }
}

fn deliver(sink: &dyn ViewSink, event: &AppEvent) {
    match event {
        AppEvent::NewContextAvailable(state) => sink.context_loaded(state),
        AppEvent::CellSelectionChanged(selection) => sink.selection_changed(selection),
        AppEvent::NewMatchingResults(result) => sink.matching_results(result),
        AppEvent::ThresholdChanged(threshold) => sink.threshold_changed(*threshold),
        AppEvent::CellWidthChanged(width) => sink.cell_width_changed(*width),
        AppEvent::WindowResize { width } => sink.viewport_resized(*width),
        AppEvent::CellHovered { index } => sink.cell_hovered(*index),
        AppEvent::MatrixCellHovered { row, col, active } => {
            sink.matrix_cell_hovered(*row, *col, *active)
        }
        AppEvent::RectSelected(heatmap) => sink.heatmap_selected(heatmap.as_deref()),
        AppEvent::ErrorRaised(alert) => sink.error_raised(alert),
        AppEvent::BrushSelectionChanged(_) | AppEvent::ZeroBrushSelectionChanged(_) => {}
    }
}
