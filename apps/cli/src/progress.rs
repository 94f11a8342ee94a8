//! Upload progress display.
//!
//! A terminal gets an `indicatif` bar; anything else (pipes, CI logs) gets
//! a plain stdout line at most once per [`LOG_INTERVAL`].

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use prismdrive_transfer::SpeedCalculator;

use crate::format::format_size;

const LOG_INTERVAL: Duration = Duration::from_secs(2);

const BAR_TEMPLATE: &str =
    "{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

pub enum Reporter {
    Bar(ProgressBar),
    Log(LogReporter),
}

pub struct LogReporter {
    label: String,
    speed: SpeedCalculator,
    last_transferred: u64,
    last_line: Option<Instant>,
}

impl Reporter {
    /// Picks the display for stdout.
    pub fn new(label: &str, total: u64) -> Self {
        if std::io::stdout().is_terminal() {
            Self::bar(label, total)
        } else {
            Self::log(label)
        }
    }

    pub fn bar(label: &str, total: u64) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stdout());
        bar.set_style(
            ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(label.to_string());
        Self::Bar(bar)
    }

    pub fn log(label: &str) -> Self {
        Self::Log(LogReporter {
            label: label.to_string(),
            speed: SpeedCalculator::new(None, None),
            last_transferred: 0,
            last_line: None,
        })
    }

    /// Progress callback target.
    pub fn update(&mut self, transferred: u64, total: u64) {
        match self {
            Self::Bar(bar) => {
                bar.set_length(total);
                bar.set_position(transferred);
            }
            Self::Log(log) => {
                if let Some(line) = log.update(transferred, total) {
                    println!("{line}");
                }
            }
        }
    }

    /// Starts over for another attempt.
    pub fn restart(&mut self) {
        match self {
            Self::Bar(bar) => bar.reset(),
            Self::Log(log) => {
                log.speed.reset();
                log.last_transferred = 0;
                log.last_line = None;
            }
        }
    }

    /// Prints a line without breaking the bar.
    pub fn note(&self, message: &str) {
        match self {
            Self::Bar(bar) => bar.println(message),
            Self::Log(_) => println!("{message}"),
        }
    }

    pub fn finish(&self) {
        if let Self::Bar(bar) = self {
            bar.finish();
        }
    }

    /// Leaves the bar where it stopped.
    pub fn abandon(&self) {
        if let Self::Bar(bar) = self {
            bar.abandon();
        }
    }
}

impl LogReporter {
    /// Returns the line to print, if one is due.
    fn update(&mut self, transferred: u64, total: u64) -> Option<String> {
        self.speed
            .add_sample(transferred.saturating_sub(self.last_transferred));
        self.last_transferred = transferred;

        let now = Instant::now();
        let due = self
            .last_line
            .is_none_or(|last| now.duration_since(last) >= LOG_INTERVAL);
        if !due && transferred < total {
            return None;
        }
        self.last_line = Some(now);

        let rate = self.speed.bytes_per_second() as u64;
        let eta = self
            .speed
            .eta(total.saturating_sub(transferred))
            .map(|eta| format!("{}s", eta.as_secs()))
            .unwrap_or_else(|| "-".to_string());
        Some(format!(
            "{}: {} / {} ({}/s, ETA {eta})",
            self.label,
            format_size(transferred),
            format_size(total),
            format_size(rate),
        ))
    }
}
