//! Progress indicators built on indicatif.
//!
//! Bars are hidden in quiet mode so pipeline logs only carry the
//! per-file result lines.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar for `len` items of work.
pub fn bar(len: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// Spinner with a message, ticking until finished.
pub fn spinner(msg: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Clear the indicator and print a success line.
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    if !pb.is_hidden() {
        crate::ui::success(msg);
    }
}

/// Clear the indicator and print an error line.
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    crate::ui::error(msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_bar_is_hidden() {
        let pb = bar(10, true);
        assert!(pb.is_hidden());
        pb.inc(3);
        assert_eq!(pb.position(), 3);
    }

    #[test]
    fn test_quiet_spinner_is_hidden() {
        let pb = spinner("Checking storage account", true);
        assert!(pb.is_hidden());
        finish_success(&pb, "done");
        assert!(pb.is_finished());
    }

    #[test]
    fn test_bar_length() {
        let pb = bar(42, false);
        assert_eq!(pb.length(), Some(42));
        pb.finish_and_clear();
    }
}
