use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use lstmvis::app::App;
use lstmvis::config::{load_config, validate_and_fix};
use lstmvis::coordinator::ViewSink;
use lstmvis::error_display::ErrorAlert;
use lstmvis::gateway::CorpusGateway;
use serde::Serialize;
use shared::{AnalysisState, AppConfig, Corpus, SelectionResult, WordRange};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "lstmvis")]
#[command(about = "Inspect hidden-state selections over a recorded activation corpus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a context window from a corpus file and print the cell selection
    Inspect {
        /// JSON file with `words` and per-word `states`
        #[arg(long)]
        corpus: PathBuf,

        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Hypothesis brush as `start:end` (local, end exclusive)
        #[arg(long, value_parser = parse_range)]
        brush: Option<WordRange>,

        /// Contrast brush as `start:end`
        #[arg(long, value_parser = parse_range)]
        zero_brush: Option<WordRange>,

        #[arg(long)]
        threshold: Option<f32>,

        #[arg(long)]
        position: Option<i64>,

        /// Move the window by this many words after the first load
        #[arg(long, allow_hyphen_values = true)]
        shift: Option<i64>,

        #[arg(long, default_value_t = CorpusGateway::DEFAULT_WINDOW_LENGTH)]
        window: usize,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a session config file
    CheckConfig { path: PathBuf },
}

fn parse_range(value: &str) -> Result<WordRange, String> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected start:end, got '{}'", value))?;
    let start = start.trim().parse::<i64>().map_err(|e| e.to_string())?;
    let end = end.trim().parse::<i64>().map_err(|e| e.to_string())?;
    Ok(WordRange::new(start, end))
}

/// Keeps the latest state the views would render.
#[derive(Default)]
struct ReportSink {
    state: RefCell<Option<AnalysisState>>,
    selection: RefCell<Option<SelectionResult>>,
    alerts: RefCell<Vec<ErrorAlert>>,
}

impl ViewSink for ReportSink {
    fn context_loaded(&self, state: &AnalysisState) {
        *self.state.borrow_mut() = Some(state.clone());
    }

    fn selection_changed(&self, selection: &SelectionResult) {
        *self.selection.borrow_mut() = Some(selection.clone());
    }

    fn error_raised(&self, alert: &ErrorAlert) {
        self.alerts.borrow_mut().push(alert.clone());
    }
}

#[derive(Serialize)]
struct Report<'a> {
    position: i64,
    words: &'a [String],
    threshold: f32,
    word_brush: Option<WordRange>,
    zero_brush: Option<WordRange>,
    selected_cells: Vec<usize>,
    aggregate: &'a [f32],
    max_aggregate: Option<f32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Inspect {
            corpus,
            config,
            brush,
            zero_brush,
            threshold,
            position,
            shift,
            window,
            json,
        } => {
            let overrides = Overrides {
                brush,
                zero_brush,
                threshold,
                position,
            };
            let local = tokio::task::LocalSet::new();
            local
                .run_until(inspect(&corpus, config.as_deref(), overrides, shift, window, json))
                .await
        }
        Commands::CheckConfig { path } => load_config(&path)
            .map(|config| {
                println!(
                    "{}: ok (version {}, project '{}')",
                    path.display(),
                    config.app.version,
                    config.session.project
                )
            })
            .map_err(anyhow::Error::from),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

struct Overrides {
    brush: Option<WordRange>,
    zero_brush: Option<WordRange>,
    threshold: Option<f32>,
    position: Option<i64>,
}

fn session_config(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<AppConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    let session = &mut config.session;
    if overrides.brush.is_some() {
        session.word_brush = overrides.brush;
    }
    if overrides.zero_brush.is_some() {
        session.zero_brush = overrides.zero_brush;
    }
    if let Some(threshold) = overrides.threshold {
        session.threshold = threshold;
    }
    if let Some(position) = overrides.position {
        session.position = position;
    }
    for warning in validate_and_fix(&mut config)? {
        log::warn!("config: {}", warning);
    }
    Ok(config)
}

fn read_corpus(path: &Path) -> anyhow::Result<Corpus> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus {}", path.display()))?;
    let corpus: Corpus = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse corpus {}", path.display()))?;
    corpus
        .validate()
        .with_context(|| format!("Corpus {} is inconsistent", path.display()))?;
    log::info!("corpus {}: {} words", path.display(), corpus.len());
    Ok(corpus)
}

async fn inspect(
    corpus_path: &Path,
    config_path: Option<&Path>,
    overrides: Overrides,
    shift: Option<i64>,
    window: usize,
    json: bool,
) -> anyhow::Result<()> {
    let config = session_config(config_path, overrides)?;
    let gateway = CorpusGateway::new(read_corpus(corpus_path)?, window);
    let sink = Rc::new(ReportSink::default());
    let app = App::new(config, gateway, sink.clone())?;

    app.start().await.context("Initial context load failed")?;
    if let Some(shift) = shift {
        app.controller()
            .request_context(shift)
            .await
            .context("Context task was cancelled")?
            .context("Shifted context load failed")?;
    }

    for alert in sink.alerts.borrow().iter() {
        log::warn!("{}: {}", alert.title, alert.message);
    }
    let Some(state) = sink.state.borrow().clone() else {
        bail!("No context window was loaded");
    };
    let selection = sink
        .selection
        .borrow()
        .clone()
        .unwrap_or_else(|| SelectionResult::empty(state.time_steps()));

    let report = Report {
        position: state.position,
        words: &state.words,
        threshold: state.threshold,
        word_brush: state.word_brush,
        zero_brush: state.word_brush_zero,
        selected_cells: selection.selected_cells.iter().copied().collect(),
        aggregate: &selection.per_time_step_aggregate,
        max_aggregate: selection.max_aggregate(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &Report<'_>) {
    println!(
        "position {} | threshold {} | brush {} | zero brush {}",
        report.position,
        report.threshold,
        report.word_brush.map_or("-".to_string(), |r| r.to_string()),
        report.zero_brush.map_or("-".to_string(), |r| r.to_string()),
    );
    println!("selected cells ({}): {:?}", report.selected_cells.len(), report.selected_cells);
    for (t, (word, sum)) in report.words.iter().zip(report.aggregate).enumerate() {
        let marker = match (report.word_brush, report.zero_brush) {
            (Some(brush), _) if brush.indices(report.words.len()).contains(&t) => '*',
            (_, Some(zero)) if zero.indices(report.words.len()).contains(&t) => '0',
            _ => ' ',
        };
        println!(
            "{} {:>4} {:<16} {:>10.4} {}",
            marker,
            t,
            word,
            sum,
            intensity_bar(*sum, report.max_aggregate)
        );
    }
}

const BAR_WIDTH: usize = 20;

/// Bar length relative to the largest aggregate in the window.
fn intensity_bar(value: f32, max: Option<f32>) -> String {
    match max {
        Some(max) if max > 0.0 => {
            let filled = ((value / max).clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as usize;
            "#".repeat(filled)
        }
        _ => String::new(),
    }
}
