//! Closed event taxonomy carried on the application bus
//!
//! Payloads are shared snapshots (`Arc`) so views can hold on to them without
//! being able to mutate the controller's state.

use crate::dataflow::EventBus;
use crate::dataflow::event_bus::BusEvent;
use crate::error_display::ErrorAlert;
use shared::{AnalysisState, MatchResult, SelectionResult, WordRange};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub type AppEventBus = EventBus<AppEvent>;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A context window was loaded; carries the full updated state.
    NewContextAvailable(Arc<AnalysisState>),
    NewMatchingResults(Arc<MatchResult>),
    ThresholdChanged(f32),
    WindowResize { width: u32 },
    CellWidthChanged(u32),
    CellSelectionChanged(Arc<SelectionResult>),
    /// Published by the word sequence view when the hypothesis brush moves.
    BrushSelectionChanged(Option<WordRange>),
    /// Published by the word sequence view when the contrast brush moves.
    ZeroBrushSelectionChanged(Option<WordRange>),
    /// Hover over a cell in the line plot or cell list; `None` on leave.
    CellHovered { index: Option<usize> },
    /// Hover over the word matrix or heatmap of the matching view.
    MatrixCellHovered { row: usize, col: usize, active: bool },
    /// Heatmap picked as overlay for the word matrix; `None` clears it.
    RectSelected(Option<String>),
    ErrorRaised(ErrorAlert),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    NewContextAvailable,
    NewMatchingResults,
    ThresholdChanged,
    WindowResize,
    CellWidthChanged,
    CellSelectionChanged,
    BrushSelectionChanged,
    ZeroBrushSelectionChanged,
    CellHovered,
    MatrixCellHovered,
    RectSelected,
    ErrorRaised,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::NewContextAvailable,
        EventKind::NewMatchingResults,
        EventKind::ThresholdChanged,
        EventKind::WindowResize,
        EventKind::CellWidthChanged,
        EventKind::CellSelectionChanged,
        EventKind::BrushSelectionChanged,
        EventKind::ZeroBrushSelectionChanged,
        EventKind::CellHovered,
        EventKind::MatrixCellHovered,
        EventKind::RectSelected,
        EventKind::ErrorRaised,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::NewContextAvailable => "newContextAvailable",
            EventKind::NewMatchingResults => "newMatchingResults",
            EventKind::ThresholdChanged => "thresholdChanged",
            EventKind::WindowResize => "windowResize",
            EventKind::CellWidthChanged => "cellWidthChanged",
            EventKind::CellSelectionChanged => "cellSelectionChanged",
            EventKind::BrushSelectionChanged => "brushSelectionChanged",
            EventKind::ZeroBrushSelectionChanged => "zeroBrushSelectionChanged",
            EventKind::CellHovered => "cellHovered",
            EventKind::MatrixCellHovered => "matrixCellHovered",
            EventKind::RectSelected => "rectSelected",
            EventKind::ErrorRaised => "errorRaised",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name() == value)
            .ok_or_else(|| format!("unknown event '{}'", value))
    }
}

impl BusEvent for AppEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            AppEvent::NewContextAvailable(_) => EventKind::NewContextAvailable,
            AppEvent::NewMatchingResults(_) => EventKind::NewMatchingResults,
            AppEvent::ThresholdChanged(_) => EventKind::ThresholdChanged,
            AppEvent::WindowResize { .. } => EventKind::WindowResize,
            AppEvent::CellWidthChanged(_) => EventKind::CellWidthChanged,
            AppEvent::CellSelectionChanged(_) => EventKind::CellSelectionChanged,
            AppEvent::BrushSelectionChanged(_) => EventKind::BrushSelectionChanged,
            AppEvent::ZeroBrushSelectionChanged(_) => EventKind::ZeroBrushSelectionChanged,
            AppEvent::CellHovered { .. } => EventKind::CellHovered,
            AppEvent::MatrixCellHovered { .. } => EventKind::MatrixCellHovered,
            AppEvent::RectSelected(_) => EventKind::RectSelected,
            AppEvent::ErrorRaised(_) => EventKind::ErrorRaised,
        }
    }
}
