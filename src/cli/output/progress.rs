//! Progress bar utilities using indicatif for terminal output.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const PROGRESS_TEMPLATE: &str =
    "{msg:<24} [{bar:40.cyan/blue}] {percentage:>3}% | ETA: {eta} | {pos}/{len}";
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Create the standard phase progress bar with ETA calculation.
///
/// Draws to stderr; when stderr is not a terminal indicatif hides the bar,
/// so phases stay quiet under test harnesses and cron.
pub fn create_progress_bar(total: u64, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .expect("Invalid progress bar template")
            .progress_chars(PROGRESS_CHARS),
    );
    bar.set_message(label.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
