use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use slotrun_core::Outcome;
use slotrun_runner::RunMetrics;
use std::io::{self, Write};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const OK: Color = Color::Green;
    const FAILED: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// Writes the end-of-batch report.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print one row per outcome followed by a totals line.
    pub fn print_summary(&self, outcomes: &[Outcome], metrics: &RunMetrics) -> Result<()> {
        let mut stdout = io::stdout();
        let width = outcomes
            .iter()
            .map(|o| o.name.len())
            .max()
            .unwrap_or(0)
            .max("job".len());

        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print(format!("{:<width$}  {:>6}  {:>9}\n", "job", "exit", "seconds")),
            ResetColor
        )?;

        // Outcomes are in input order, so their position is the metrics index.
        for (index, outcome) in outcomes.iter().enumerate() {
            let (color, label) = if outcome.is_success() {
                (Colors::OK, "ok")
            } else {
                (Colors::FAILED, "FAILED")
            };
            let seconds = metrics
                .duration_of(index)
                .map(|d| format!("{:.1}", d.as_secs_f64()))
                .unwrap_or_else(|| "-".to_string());
            execute!(
                stdout,
                Print(format!("{:<width$}  {:>6}  {:>9}  ", outcome.name, outcome.exit_code, seconds)),
                SetForegroundColor(color),
                Print(format!("{label}\n")),
                ResetColor
            )?;
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        let elapsed = metrics
            .elapsed()
            .map(|d| format!(" in {:.1}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_default();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!(
                "{} job(s), {} failed, peak {} running{}\n",
                outcomes.len(),
                failed,
                metrics.peak_active,
                elapsed
            )),
            ResetColor
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print outcomes as a JSON array.
    pub fn print_json(&self, outcomes: &[Outcome]) -> Result<()> {
        let mut stdout = io::stdout();
        serde_json::to_writer_pretty(&mut stdout, outcomes)?;
        writeln!(stdout)?;
        Ok(())
    }
}
