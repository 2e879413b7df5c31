use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use neqflux::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;
const PHASE_TEMPLATE: &str = "{spinner:.green} {prefix:.dim} {msg}";
const SWEEP_TEMPLATE: &str = "{prefix:.dim} {msg:<16} [{bar:40.cyan/blue}] {pos}/{len} sources ({elapsed})";

/// Frequencies finished so far, split by where their flux came from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FrequencyTally {
    computed: usize,
    cached: usize,
}

impl FrequencyTally {
    fn label(&self) -> String {
        format!("[{} computed, {} cached]", self.computed, self.cached)
    }
}

/// Terminal view of a flux run: a spinner per phase, a bar over the transform and source
/// sweep of each frequency, and one line per finished frequency.
#[derive(Clone)]
pub struct CliProgressHandler {
    bar: ProgressBar,
    tally: Arc<Mutex<FrequencyTally>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr()))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(style(PHASE_TEMPLATE));
        bar.set_prefix(FrequencyTally::default().label());
        bar.finish_and_clear();
        Self {
            bar,
            tally: Arc::new(Mutex::new(FrequencyTally::default())),
        }
    }

    /// Frequencies evaluated so far as `(computed, read from records)`.
    pub fn frequency_counts(&self) -> (usize, usize) {
        self.tally
            .lock()
            .map(|t| (t.computed, t.cached))
            .unwrap_or_default()
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let handler = self.clone();
        Box::new(move |progress| handler.handle(progress))
    }

    fn handle(&self, progress: Progress) {
        let bar = &self.bar;
        match progress {
            Progress::PhaseStart { name } => {
                bar.reset();
                bar.set_length(0);
                bar.set_style(style(PHASE_TEMPLATE));
                bar.set_message(name);
                bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
            }
            Progress::TaskStart { total_steps } => {
                bar.disable_steady_tick();
                bar.set_style(style(SWEEP_TEMPLATE));
                bar.set_length(total_steps);
                bar.set_position(0);
            }
            Progress::TaskIncrement => bar.inc(1),
            Progress::TaskFinish => bar.set_position(bar.length().unwrap_or(0)),
            Progress::PhaseFinish => {
                bar.disable_steady_tick();
                bar.finish_with_message("✓ Done");
            }
            Progress::FrequencyDone { omega, cached } => self.record_frequency(omega, cached),
            Progress::Message(msg) => bar.println(format!("  {}", msg)),
        }
    }

    fn record_frequency(&self, omega: f64, cached: bool) {
        let Ok(mut tally) = self.tally.lock() else {
            warn!("Frequency tally mutex was poisoned. Cannot record omega = {:e}.", omega);
            return;
        };
        if cached {
            tally.cached += 1;
        } else {
            tally.computed += 1;
        }
        self.bar.set_prefix(tally.label());
        let origin = if cached { "read from records" } else { "computed" };
        self.bar.println(format!("  omega = {:e} ({})", omega, origin));
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .expect("Progress templates are static and valid")
        .progress_chars("##-")
}
