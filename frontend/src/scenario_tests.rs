//! End-to-end behavior across the controller, bus, coordinator and gateway.

use crate::app::App;
use crate::controller::{ControllerSettings, StateController, UiIntent};
use crate::coordinator::ViewSink;
use crate::dataflow::event_bus::BusEvent;
use crate::error_display::ErrorAlert;
use crate::events::{AppEvent, AppEventBus, EventKind};
use crate::gateway::{CorpusGateway, RequestError, RequestOutcome, TransportError};
use crate::selection::compute_selection;
use crate::testing::{ScriptedGateway, context_window, count, record_events, settle};
use indexmap::IndexSet;
use shared::{
    ActivationWindow, AnalysisState, AppConfig, Corpus, MatchMode, MatchResult, MatchRow,
    SelectionResult, WordRange,
};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::LocalSet;

#[derive(Default)]
struct LastSeen {
    selections: RefCell<Vec<SelectionResult>>,
    alerts: RefCell<Vec<ErrorAlert>>,
}

impl ViewSink for LastSeen {
    fn selection_changed(&self, selection: &SelectionResult) {
        self.selections.borrow_mut().push(selection.clone());
    }

    fn error_raised(&self, alert: &ErrorAlert) {
        self.alerts.borrow_mut().push(alert.clone());
    }
}

fn four_step_corpus() -> Corpus {
    Corpus {
        words: ["the", "cat", "sat", "down"].map(String::from).to_vec(),
        states: vec![
            vec![0.5, 0.1],
            vec![1.5, 0.2],
            vec![0.2, 0.3],
            vec![2.0, 0.4],
        ],
    }
}

fn loaded_controller(gateway: ScriptedGateway, steps: usize) -> StateController<ScriptedGateway> {
    let initial = AnalysisState {
        window: ActivationWindow {
            left: 0,
            right: steps as i64,
            data: (0..steps).map(|t| vec![t as f32 / 10.0; 3]).collect(),
        },
        words: (0..steps).map(|t| format!("w{t}")).collect(),
        ..AnalysisState::default()
    };
    StateController::new(
        initial,
        gateway,
        AppEventBus::new(),
        ControllerSettings::default(),
        IndexSet::new(),
    )
    .unwrap()
}

fn match_result(row_id: &str) -> MatchResult {
    MatchResult {
        rows: vec![MatchRow {
            position_offset: 0,
            row_id: row_id.to_string(),
            cells: vec![vec![0.1, 0.2]],
        }],
    }
}

#[tokio::test]
async fn test_session_brush_selects_cells_after_first_load() {
    LocalSet::new()
        .run_until(async {
            let mut config = AppConfig::default();
            config.session.threshold = 1.0;
            config.session.word_brush = Some(WordRange::new(1, 3));
            let sink = Rc::new(LastSeen::default());
            let app = App::new(config, CorpusGateway::new(four_step_corpus(), 40), sink.clone())
                .unwrap();

            assert_eq!(app.start().await, Ok(RequestOutcome::Applied));

            let selections = sink.selections.borrow();
            let last = selections.last().unwrap();
            assert_eq!(last.selected_cells, BTreeSet::from([0]));
            assert_eq!(last.per_time_step_aggregate, vec![0.5, 1.5, 0.2, 2.0]);

            let state = app.controller().state();
            assert_eq!(state.words, vec!["the", "cat", "sat", "down"]);
            assert_eq!(state.word_brush, Some(WordRange::new(1, 3)));
            assert_eq!(compute_selection(&state), *last);
        })
        .await;
}

#[tokio::test]
async fn test_out_of_order_match_responses_apply_only_newest() {
    LocalSet::new()
        .run_until(async {
            let gateway = ScriptedGateway::default();
            let controller = loaded_controller(gateway.clone(), 4);
            let events = record_events(controller.bus());

            let m1 = controller.request_match(IndexSet::new(), MatchMode::Fast);
            let m2 = controller.request_match(IndexSet::new(), MatchMode::Precise);
            settle().await;
            assert_eq!(
                gateway.match_calls().iter().map(|r| r.seq).collect::<Vec<_>>(),
                vec![1, 2]
            );

            gateway.reply_match(1, Ok(match_result("r2")));
            assert_eq!(m2.await.unwrap(), Ok(RequestOutcome::Applied));
            gateway.reply_match(0, Ok(match_result("r1")));
            assert_eq!(m1.await.unwrap(), Ok(RequestOutcome::Stale));

            let events = events.borrow();
            let published: Vec<&MatchResult> = events
                .iter()
                .filter_map(|event| match event {
                    AppEvent::NewMatchingResults(result) => Some(result.as_ref()),
                    _ => None,
                })
                .collect();
            assert_eq!(published, vec![&match_result("r2")]);
            assert_eq!(controller.matching_results(), Some(Arc::new(match_result("r2"))));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_brush_burst_yields_single_trailing_selection() {
    LocalSet::new()
        .run_until(async {
            let controller = loaded_controller(ScriptedGateway::default(), 12);
            controller.set_threshold(0.25).unwrap();
            let events = record_events(controller.bus());

            for i in 0..10 {
                controller
                    .set_word_brush(Some(WordRange::new(i, i + 2)))
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert_eq!(count(&events, EventKind::CellSelectionChanged), 0);

            tokio::time::sleep(Duration::from_millis(300)).await;
            assert_eq!(count(&events, EventKind::CellSelectionChanged), 1);

            let expected = compute_selection(&controller.state());
            assert_eq!(controller.state().word_brush, Some(WordRange::new(9, 11)));
            assert!(matches!(
                events.borrow().last(),
                Some(AppEvent::CellSelectionChanged(selection)) if **selection == expected
            ));
            assert_eq!(expected.selected_cells, BTreeSet::from([0, 1, 2]));
        })
        .await;
}

#[tokio::test]
async fn test_context_shift_moves_brushes_with_words() {
    LocalSet::new()
        .run_until(async {
            let gateway = ScriptedGateway::default();
            let controller = loaded_controller(gateway.clone(), 6);
            let events = record_events(controller.bus());
            controller.set_word_brush(Some(WordRange::new(2, 5))).unwrap();
            controller.set_zero_brush(Some(WordRange::new(0, 2))).unwrap();

            let handle = controller.request_context(3);
            settle().await;
            let words = ["a", "b", "c", "d", "e", "f"];
            gateway.reply_context(0, Ok(context_window(3, &words, 3)));
            assert_eq!(handle.await.unwrap(), Ok(RequestOutcome::Applied));

            let state = controller.state();
            assert_eq!(state.position, 3);
            assert_eq!(state.word_brush, Some(WordRange::new(0, 2)));
            assert_eq!(state.word_brush_zero, None);

            for event in events.borrow().iter() {
                if let AppEvent::NewContextAvailable(state) = event {
                    assert!(state.check_invariants().is_ok());
                }
            }
            assert!(!controller.selection_pending());
        })
        .await;
}

fn ten_word_corpus() -> Corpus {
    Corpus {
        words: (0..10).map(|i| format!("w{i}")).collect(),
        states: (0..10).map(|i| vec![i as f32, 1.0]).collect(),
    }
}

fn brushed_words(state: &AnalysisState, brush: Option<WordRange>) -> Vec<String> {
    brush.map_or_else(Vec::new, |range| {
        state.words[range.indices(state.time_steps())].to_vec()
    })
}

#[tokio::test]
async fn test_brushes_stay_on_their_words_when_window_hits_corpus_edges() {
    LocalSet::new()
        .run_until(async {
            let mut config = AppConfig::default();
            config.session.word_brush = Some(WordRange::new(2, 4));
            config.session.zero_brush = Some(WordRange::new(6, 8));
            let sink = Rc::new(LastSeen::default());
            let app = App::new(config, CorpusGateway::new(ten_word_corpus(), 10), sink).unwrap();
            app.start().await.unwrap();
            let controller = app.controller();

            // window already starts at the corpus start, nothing moves
            let outcome = controller.decrement_position().await.unwrap();
            assert_eq!(outcome, Ok(RequestOutcome::Applied));
            let state = controller.state();
            assert_eq!(state.position, 0);
            assert_eq!((state.window.left, state.window.right), (0, 10));
            assert_eq!(state.word_brush, Some(WordRange::new(2, 4)));
            assert_eq!(brushed_words(&state, state.word_brush), vec!["w2", "w3"]);

            // the next step starts from the committed position, not below it
            controller.increment_position().await.unwrap().unwrap();
            let state = controller.state();
            assert_eq!(state.position, 5);
            assert_eq!((state.window.left, state.window.right), (5, 10));
            assert_eq!(state.word_brush, None);
            assert_eq!(state.word_brush_zero, Some(WordRange::new(1, 3)));
            assert_eq!(brushed_words(&state, state.word_brush_zero), vec!["w6", "w7"]);

            // past the end the window collapses and the position stays inside it
            controller.request_context(50).await.unwrap().unwrap();
            let state = controller.state();
            assert_eq!((state.window.left, state.window.right), (10, 10));
            assert_eq!(state.position, 10);
            assert_eq!(state.word_brush_zero, None);
            assert!(state.check_invariants().is_ok());
        })
        .await;
}

#[tokio::test]
async fn test_failed_bootstrap_surfaces_alert_and_keeps_state() {
    LocalSet::new()
        .run_until(async {
            let gateway = ScriptedGateway::default();
            let sink = Rc::new(LastSeen::default());
            let app = App::new(AppConfig::default(), gateway.clone(), sink.clone()).unwrap();
            let before = app.controller().state();

            let start = app.start();
            let reply = async {
                settle().await;
                gateway.reply_context(0, Err(TransportError::Unreachable("refused".into())));
            };
            let (outcome, ()) = futures::join!(start, reply);

            assert_eq!(
                outcome,
                Err(RequestError::Transport(TransportError::Unreachable("refused".into())))
            );
            assert_eq!(app.controller().state(), before);
            assert_eq!(sink.alerts.borrow().len(), 1);
            assert!(sink.selections.borrow().is_empty());
        })
        .await;
}

#[tokio::test]
async fn test_match_intent_against_local_corpus_reports_unsupported() {
    LocalSet::new()
        .run_until(async {
            let sink = Rc::new(LastSeen::default());
            let app = App::new(
                AppConfig::default(),
                CorpusGateway::new(four_step_corpus(), 40),
                sink.clone(),
            )
            .unwrap();
            app.start().await.unwrap();

            app.intent_relay().send(UiIntent::RequestMatch(MatchMode::Fast));
            settle().await;

            let alerts = sink.alerts.borrow();
            assert_eq!(alerts.len(), 1);
            assert!(alerts[0].message.contains("not available"));
            assert_eq!(app.controller().matching_results(), None);
        })
        .await;
}

#[test]
fn test_every_published_kind_has_a_wire_name() {
    let event = AppEvent::ThresholdChanged(0.2);
    assert_eq!(event.kind().name(), "thresholdChanged");
    assert_eq!(EventKind::ALL.len(), 12);
}
