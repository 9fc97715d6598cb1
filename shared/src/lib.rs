use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

// ===== INVARIANT VIOLATIONS =====

/// Reasons an activation window, match result or corpus is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("window [{left}, {right}) spans {expected} time steps but carries {actual} activation rows")]
    LengthMismatch {
        left: i64,
        right: i64,
        expected: usize,
        actual: usize,
    },
    #[error("{rows} activation rows but {words} words")]
    WordCountMismatch { rows: usize, words: usize },
    #[error("activation row {row} has {actual} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("match row '{row_id}' has a ragged cell matrix at line {line}")]
    RaggedMatchRow { row_id: String, line: usize },
    #[error("non-finite activation value at time step {row}, cell {cell}")]
    NonFinite { row: usize, cell: usize },
}

// ===== WORD RANGES =====

/// Half-open index range `[start, end)` over the loaded word sequence.
///
/// Raw ranges coming from brush gestures may reach outside the loaded window,
/// so both ends are signed until [`WordRange::clamped`] normalizes them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(from = "[i64; 2]", into = "[i64; 2]")]
pub struct WordRange {
    pub start: i64,
    pub end: i64,
}

impl WordRange {
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn shifted(self, delta: i64) -> Self {
        Self {
            start: self.start.saturating_add(delta),
            end: self.end.saturating_add(delta),
        }
    }

    /// Clamps both ends into `[0, len]`. A range with nothing left inside the
    /// window comes back as `None`.
    pub fn clamped(self, len: usize) -> Option<Self> {
        let upper = len as i64;
        let start = self.start.clamp(0, upper);
        let end = self.end.clamp(0, upper);
        if end <= start {
            None
        } else {
            Some(Self { start, end })
        }
    }

    /// Time-step indices covered by this range, cut to `len`.
    pub fn indices(&self, len: usize) -> Range<usize> {
        let upper = len as i64;
        let start = self.start.clamp(0, upper) as usize;
        let end = self.end.clamp(0, upper) as usize;
        start..end.max(start)
    }
}

impl From<[i64; 2]> for WordRange {
    fn from([start, end]: [i64; 2]) -> Self {
        Self { start, end }
    }
}

impl From<WordRange> for [i64; 2] {
    fn from(range: WordRange) -> Self {
        [range.start, range.end]
    }
}

impl fmt::Display for WordRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ===== ACTIVATION DATA =====

/// Loaded slice of the activation matrix, one per-cell vector per time step.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ActivationWindow {
    pub left: i64,
    pub right: i64,
    pub data: Vec<Vec<f32>>,
}

impl ActivationWindow {
    pub fn time_steps(&self) -> usize {
        self.data.len()
    }

    /// Width of the per-cell vectors (0 for an empty window).
    pub fn cell_count(&self) -> usize {
        self.data.first().map(Vec::len).unwrap_or(0)
    }

    pub fn validate(&self, words: usize) -> Result<(), InvariantViolation> {
        validate_window(self.left, self.right, &self.data, words)
    }
}

fn validate_window(
    left: i64,
    right: i64,
    data: &[Vec<f32>],
    words: usize,
) -> Result<(), InvariantViolation> {
    let span = right.saturating_sub(left).max(0) as usize;
    if right < left || span != data.len() {
        return Err(InvariantViolation::LengthMismatch {
            left,
            right,
            expected: span,
            actual: data.len(),
        });
    }
    if words != data.len() {
        return Err(InvariantViolation::WordCountMismatch {
            rows: data.len(),
            words,
        });
    }
    check_rectangular(data)
}

fn check_rectangular(rows: &[Vec<f32>]) -> Result<(), InvariantViolation> {
    let expected = rows.first().map(Vec::len).unwrap_or(0);
    for (row, values) in rows.iter().enumerate() {
        if values.len() != expected {
            return Err(InvariantViolation::RaggedRow {
                row,
                expected,
                actual: values.len(),
            });
        }
        if let Some(cell) = values.iter().position(|value| !value.is_finite()) {
            return Err(InvariantViolation::NonFinite { row, cell });
        }
    }
    Ok(())
}

/// Context response delivered by a data gateway.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ContextWindow {
    pub left: i64,
    pub right: i64,
    pub data: Vec<Vec<f32>>,
    pub words: Vec<String>,
}

impl ContextWindow {
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        validate_window(self.left, self.right, &self.data, self.words.len())
    }

    pub fn into_parts(self) -> (ActivationWindow, Vec<String>) {
        (
            ActivationWindow {
                left: self.left,
                right: self.right,
                data: self.data,
            },
            self.words,
        )
    }
}

// ===== ANALYSIS STATE =====

/// The single shared analysis state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalysisState {
    pub position: i64,
    pub cell_width: u32,
    pub threshold: f32,
    pub word_brush: Option<WordRange>,
    pub word_brush_zero: Option<WordRange>,
    pub window: ActivationWindow,
    pub words: Vec<String>,
    pub viewport_width: u32,
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self {
            position: 0,
            cell_width: Self::DEFAULT_CELL_WIDTH,
            threshold: 0.3,
            word_brush: None,
            word_brush_zero: None,
            window: ActivationWindow::default(),
            words: Vec::new(),
            viewport_width: TimingSection::DEFAULT_VIEWPORT_WIDTH,
        }
    }
}

impl AnalysisState {
    pub const DEFAULT_CELL_WIDTH: u32 = 25;

    pub fn time_steps(&self) -> usize {
        self.window.time_steps()
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.window.validate(self.words.len())
    }
}

/// Derived cell selection and its per-time-step aggregate.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SelectionResult {
    pub selected_cells: BTreeSet<usize>,
    pub per_time_step_aggregate: Vec<f32>,
}

impl SelectionResult {
    pub fn empty(time_steps: usize) -> Self {
        Self {
            selected_cells: BTreeSet::new(),
            per_time_step_aggregate: vec![0.0; time_steps],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selected_cells.is_empty()
    }

    /// Largest aggregate value, the upper end of the overlay colour scale.
    pub fn max_aggregate(&self) -> Option<f32> {
        self.per_time_step_aggregate
            .iter()
            .copied()
            .reduce(f32::max)
    }
}

// ===== MATCHING =====

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Fast,
    Precise,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Fast => "fast",
            MatchMode::Precise => "precise",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "fast" => Ok(MatchMode::Fast),
            "precise" => Ok(MatchMode::Precise),
            other => Err(format!("unknown match mode '{}'", other)),
        }
    }
}

/// One outstanding match query. Superseded requests are dropped, never mutated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchRequest {
    pub seq: u64,
    pub meta_dims: IndexSet<String>,
    pub mode: MatchMode,
    pub cells: Vec<usize>,
    pub threshold: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub position_offset: i64,
    pub row_id: String,
    pub cells: Vec<Vec<f32>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub rows: Vec<MatchRow>,
}

impl MatchResult {
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        for row in &self.rows {
            let width = row.cells.first().map(Vec::len).unwrap_or(0);
            if let Some(line) = row.cells.iter().position(|line| line.len() != width) {
                return Err(InvariantViolation::RaggedMatchRow {
                    row_id: row.row_id.clone(),
                    line,
                });
            }
        }
        Ok(())
    }
}

// ===== CORPUS =====

/// Token sequence with its per-time-step activation vectors, as stored on disk.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    pub words: Vec<String>,
    pub states: Vec<Vec<f32>>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn validate(&self) -> Result<(), InvariantViolation> {
        if self.words.len() != self.states.len() {
            return Err(InvariantViolation::WordCountMismatch {
                rows: self.states.len(),
                words: self.words.len(),
            });
        }
        check_rectangular(&self.states)
    }

    /// Slice `[start, start + length)` cut to the corpus bounds.
    pub fn window(&self, start: i64, length: usize) -> ContextWindow {
        let total = self.len() as i64;
        let left = start.clamp(0, total);
        let right = left.saturating_add(length as i64).min(total);
        let range = left as usize..right as usize;
        ContextWindow {
            left,
            right,
            data: self.states[range.clone()].to_vec(),
            words: self.words[range].to_vec(),
        }
    }
}

// ===== CONFIG TYPES =====

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub session: SessionSection,
    pub timing: TimingSection,
}

// Versioning metadata for config migration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppSection {
    pub version: String,
}

impl AppSection {
    /// Current configuration format version
    pub const CURRENT_VERSION: &'static str = "1.0.0";

    pub fn is_supported_version(&self) -> bool {
        matches!(self.version.as_str(), "1.0.0")
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
        }
    }
}

/// Bootstrapping parameters for the initial analysis state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionSection {
    pub project: String,
    pub source: String,
    pub position: i64,
    pub threshold: f32,
    pub cell_width: u32,
    pub word_brush: Option<WordRange>,
    pub zero_brush: Option<WordRange>,
    pub meta_dims: IndexSet<String>,
}

impl Default for SessionSection {
    fn default() -> Self {
        let state = AnalysisState::default();
        Self {
            project: String::new(),
            source: "states::states1".to_string(),
            position: state.position,
            threshold: state.threshold,
            cell_width: state.cell_width,
            word_brush: None,
            zero_brush: None,
            meta_dims: IndexSet::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TimingSection {
    pub selection_throttle_ms: u64,
    pub position_step: i64,
    pub cell_width_step: u32,
    pub min_cell_width: u32,
    pub initial_viewport_width: u32,
}

impl TimingSection {
    pub const DEFAULT_THROTTLE_MS: u64 = 200;
    pub const DEFAULT_MIN_CELL_WIDTH: u32 = 5;
    pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1000;
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            selection_throttle_ms: Self::DEFAULT_THROTTLE_MS,
            position_step: 5,
            cell_width_step: 5,
            min_cell_width: Self::DEFAULT_MIN_CELL_WIDTH,
            initial_viewport_width: Self::DEFAULT_VIEWPORT_WIDTH,
        }
    }
}
