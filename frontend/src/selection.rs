//! Cell selection derived from brushes and the activation threshold.
//!
//! A cell is selected when its absolute activation exceeds the threshold at
//! some time step inside the word brush, and (if a zero brush is set) at no
//! time step inside the zero brush. The aggregate sums the selected cells'
//! raw values over every loaded time step, not only the brushed ones.

use shared::{ActivationWindow, AnalysisState, SelectionResult, WordRange};
use std::collections::BTreeSet;

pub fn compute_selection(state: &AnalysisState) -> SelectionResult {
    let window = &state.window;
    let time_steps = window.time_steps();

    let Some(brush) = state.word_brush else {
        return SelectionResult::empty(time_steps);
    };

    let in_brush = active_cells(window, brush, state.threshold);
    let in_zero = state
        .word_brush_zero
        .map(|zero| active_cells(window, zero, state.threshold));

    let selected_cells: BTreeSet<usize> = in_brush
        .iter()
        .enumerate()
        .filter(|&(cell, &active)| {
            active && !in_zero.as_ref().is_some_and(|zero| zero[cell])
        })
        .map(|(cell, _)| cell)
        .collect();

    let per_time_step_aggregate = sum_cell_values(window, &selected_cells);

    SelectionResult {
        selected_cells,
        per_time_step_aggregate,
    }
}

/// `result[c]` is true when `|data[t][c]| > threshold` for some `t` in `range`.
fn active_cells(window: &ActivationWindow, range: WordRange, threshold: f32) -> Vec<bool> {
    let mut active = vec![false; window.cell_count()];
    for row in &window.data[range.indices(window.time_steps())] {
        for (flag, value) in active.iter_mut().zip(row) {
            if value.abs() > threshold {
                *flag = true;
            }
        }
    }
    active
}

pub fn sum_cell_values(window: &ActivationWindow, cells: &BTreeSet<usize>) -> Vec<f32> {
    window
        .data
        .iter()
        .map(|row| {
            cells
                .iter()
                .filter_map(|&cell| row.get(cell))
                .fold(0.0, |sum, value| sum + value)
        })
        .collect()
}
