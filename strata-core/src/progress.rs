//! Progress reporting for per-level report generation and other long stages.
//!
//! The CLI uses [`IndicatifReporter`]; library callers pass [`NoopReporter`]
//! or their own implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} {pos} items";

/// Receives progress of a running stage.
pub trait ProgressReporter: Send + Sync {
    /// Begin a stage, with a total when it is known up front.
    fn begin(&self, stage: &str, total: Option<u64>);

    fn advance(&self, amount: u64);

    fn finish(&self);

    /// Print a line without disturbing the bar.
    fn note(&self, msg: &str);
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn begin(&self, _stage: &str, _total: Option<u64>) {}
    fn advance(&self, _amount: u64) {}
    fn finish(&self) {}
    fn note(&self, _msg: &str) {}
}

/// `indicatif` progress bar on stderr.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
    completed: AtomicU64,
}

impl IndicatifReporter {
    /// A bar drawn to stderr, or a hidden one when `visible` is false.
    pub fn new(visible: bool) -> Self {
        let bar = ProgressBar::with_draw_target(
            None,
            if visible {
                ProgressDrawTarget::stderr()
            } else {
                ProgressDrawTarget::hidden()
            },
        );
        Self {
            bar,
            completed: AtomicU64::new(0),
        }
    }

    /// Units advanced since the current stage began.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn begin(&self, stage: &str, total: Option<u64>) {
        self.completed.store(0, Ordering::Relaxed);
        let template = if total.is_some() {
            BAR_TEMPLATE
        } else {
            SPINNER_TEMPLATE
        };
        let style = ProgressStyle::with_template(template)
            .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("=> "));
        self.bar.set_style(style);
        self.bar.set_length(total.unwrap_or(0));
        self.bar.set_message(stage.to_string());
        self.bar.reset();
    }

    fn advance(&self, amount: u64) {
        self.completed.fetch_add(amount, Ordering::Relaxed);
        self.bar.inc(amount);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn note(&self, msg: &str) {
        self.bar.println(msg);
    }
}
