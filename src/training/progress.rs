//! Live terminal view of an optimizer run.
//!
//! One line, redrawn per iteration: objective sparkline, gradient norm, and a
//! convergence hint. A colored summary is printed when the run ends.

use std::io::Write;

use owo_colors::OwoColorize;

use super::IterationStats;
use super::lbfgs::Termination;

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One glyph per bucket of `values`, left-aligned and padded to `width`.
///
/// Histories longer than `width` are averaged per bucket. Non-finite entries
/// are left out of the scale and drawn blank.
fn sparkline(values: &[f64], width: usize) -> String {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = (hi - lo).max(1e-3);
    let buckets = values.len().min(width);

    let glyph = |bucket: &[f64]| -> char {
        let finite: Vec<f64> = bucket.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return ' ';
        }
        let avg = finite.iter().sum::<f64>() / finite.len() as f64;
        let level = ((avg - lo) / span * (LEVELS.len() - 1) as f64).round() as usize;
        LEVELS[level.min(LEVELS.len() - 1)]
    };

    let mut line: String = (0..buckets)
        .map(|b| {
            let from = b * values.len() / buckets;
            let to = ((b + 1) * values.len() / buckets).max(from + 1);
            glyph(&values[from..to])
        })
        .collect();
    line.extend(std::iter::repeat_n(' ', width - buckets));
    line
}

/// Live training progress display for terminal.
pub struct LiveProgress {
    objective_history: Vec<f64>,
    gradient_history: Vec<f64>,
    weight_norm_history: Vec<f64>,
    max_iterations: usize,
}

impl LiveProgress {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            objective_history: Vec::new(),
            gradient_history: Vec::new(),
            weight_norm_history: Vec::new(),
            max_iterations,
        }
    }

    /// Record metrics for the current iteration.
    pub fn record(&mut self, stats: &IterationStats) {
        self.objective_history.push(stats.objective);
        self.gradient_history.push(stats.gradient_norm);
        self.weight_norm_history.push(stats.weight_norm);
    }

    pub fn len(&self) -> usize {
        self.objective_history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objective_history.is_empty()
    }

    /// Relative change of the objective over the last three iterations.
    fn recent_change(&self) -> Option<f64> {
        let n = self.objective_history.len();
        if n < 3 {
            return None;
        }
        let old = self.objective_history[n - 3];
        let new = self.objective_history[n - 1];
        Some((new - old).abs() / old.abs().max(1.0))
    }

    /// Redraw the progress line in place.
    pub fn display(&self) {
        let width = 20;

        print!("\x1b[2K\r");
        print!("it{:4}/{} ", self.len(), self.max_iterations);

        if let Some(last) = self.objective_history.last() {
            print!(
                "LL[{}]{:.4} ",
                sparkline(&self.objective_history, width),
                last
            );
        }
        if let Some(last) = self.gradient_history.last() {
            print!("|∇|{:.2e} ", last);
        }

        match self.recent_change() {
            Some(change) if change < 1e-6 => print!("⚡CONVERGED"),
            Some(change) if change < 1e-3 => print!("~stabilizing"),
            _ => {}
        }

        std::io::stdout().flush().ok();
    }

    /// Print final summary with full sparklines.
    pub fn final_summary(&self, termination: Termination) {
        println!("\n");
        let banner = match termination {
            Termination::Converged => " TRAINING CONVERGED ".bold().on_green().to_string(),
            Termination::MaxIterations => " ITERATION CAP REACHED ".bold().on_yellow().to_string(),
            Termination::LineSearchFailed => " LINE SEARCH STALLED ".bold().on_yellow().to_string(),
        };
        println!("{}", banner);
        println!();

        if let (Some(first), Some(last)) = (self.objective_history.first(), self.objective_history.last()) {
            let delta = last - first;
            let (arrow, delta_str) = if delta > 0.0 {
                ("↑", format!("{:+.4}", delta).green().to_string())
            } else if delta < 0.0 {
                ("↓", format!("{:+.4}", delta).red().to_string())
            } else {
                ("→", format!("{:+.4}", delta).dimmed().to_string())
            };
            println!(
                "  {}: {:.4} {} {:.4}  ({})",
                "Log-likelihood".bold(),
                first,
                arrow,
                last,
                delta_str
            );
            println!(
                "                  [{}]",
                sparkline(&self.objective_history, 40).cyan()
            );
        }

        if let (Some(first), Some(last)) = (self.gradient_history.first(), self.gradient_history.last()) {
            println!("  {}: {:.3e} → {:.3e}", "|∇|".bold(), first, last);
        }
        if let Some(last) = self.weight_norm_history.last() {
            println!("  {}: {:.4}", "|w|".bold(), last);
            println!(
                "                  [{}]",
                sparkline(&self.weight_norm_history, 40).cyan()
            );
        }
        println!();
    }
}
