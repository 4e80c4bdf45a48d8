//! Terminal rendering of queue progress.
//!
//! Presentation-only: consumes `UploadEvent`s and item snapshots, never
//! touches the queue. One bar per item on a terminal; one line per status
//! change otherwise.

use std::collections::HashMap;
use std::io::{self, IsTerminal};
use std::time::{Duration, Instant};

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use uplink_core::{QueueSnapshot, UploadEvent, UploadId, UploadItem, UploadStatus};

enum Mode {
    /// indicatif bars.
    Fancy,
    /// Plain lines on status changes (pipes, CI logs).
    Plain,
    /// No output at all.
    Silent,
}

struct Tracked {
    name: String,
    status: UploadStatus,
    bar: ProgressBar,
    /// Deadline and label of a scheduled retry.
    retry: Option<(Instant, String)>,
}

/// Live view over a set of queue items.
pub struct ProgressView {
    mode: Mode,
    multi: MultiProgress,
    items: HashMap<UploadId, Tracked>,
}

impl ProgressView {
    /// Create a view, auto-detecting terminal capability.
    pub fn new() -> Self {
        if io::stdout().is_terminal() {
            Self::with_mode(Mode::Fancy, ProgressDrawTarget::stdout())
        } else {
            Self::with_mode(Mode::Plain, ProgressDrawTarget::hidden())
        }
    }

    /// A view that renders nothing; statuses are still tracked.
    pub fn silent() -> Self {
        Self::with_mode(Mode::Silent, ProgressDrawTarget::hidden())
    }

    fn with_mode(mode: Mode, target: ProgressDrawTarget) -> Self {
        Self {
            mode,
            multi: MultiProgress::with_draw_target(target),
            items: HashMap::new(),
        }
    }

    /// Start following an item.
    pub fn track(&mut self, item: &UploadItem) {
        if !self.items.contains_key(&item.id) {
            let bar = self.multi.add(ProgressBar::new(100));
            bar.set_style(bar_style());
            bar.set_prefix(truncate(&item.name, 24));
            self.items.insert(
                item.id,
                Tracked {
                    name: item.name.clone(),
                    status: item.status,
                    bar,
                    retry: None,
                },
            );
        }
        self.update(item);
    }

    /// Last known status of an item.
    pub fn status(&self, id: &UploadId) -> Option<UploadStatus> {
        self.items.get(id).map(|tracked| tracked.status)
    }

    /// Whether every followed item has reached a terminal status.
    pub fn all_terminal(&self, ids: &[UploadId]) -> bool {
        ids.iter()
            .all(|id| self.status(id).is_some_and(|status| status.is_terminal()))
    }

    /// Apply one queue event.
    pub fn apply(&mut self, event: &UploadEvent) {
        match event {
            UploadEvent::ItemChanged { item } => {
                if self.items.contains_key(&item.id) {
                    self.update(item);
                }
            }
            UploadEvent::ItemRemoved { id } => {
                if let Some(tracked) = self.items.remove(id) {
                    tracked.bar.finish_and_clear();
                }
            }
            UploadEvent::TransformApplied {
                id,
                original_bytes,
                transformed_bytes,
                reduction_percent,
            } => {
                if let Some(tracked) = self.items.get(id) {
                    let line = format!(
                        "{}: optimized {} -> {} (-{reduction_percent:.0}%)",
                        tracked.name,
                        HumanBytes(*original_bytes),
                        HumanBytes(*transformed_bytes)
                    );
                    self.println(&line);
                }
            }
            UploadEvent::RetryScheduled {
                id,
                attempt,
                max_attempts,
                delay_ms,
            } => {
                if let Some(tracked) = self.items.get_mut(id) {
                    let deadline = Instant::now() + Duration::from_millis(*delay_ms);
                    let label = format!("attempt {attempt}/{max_attempts} failed");
                    tracked.retry = Some((deadline, label));
                }
                self.tick();
            }
            UploadEvent::QueueSnapshot { snapshot } => self.sync(snapshot),
            UploadEvent::QueueDrained => {}
        }
    }

    /// Re-read followed items from a full snapshot (after a lagged receiver).
    pub fn sync(&mut self, snapshot: &QueueSnapshot) {
        for item in &snapshot.items {
            if self.items.contains_key(&item.id) {
                self.update(item);
            }
        }
    }

    /// Refresh retry countdowns.
    pub fn tick(&mut self) {
        let now = Instant::now();
        for tracked in self.items.values() {
            if let Some((deadline, label)) = &tracked.retry {
                let remaining = deadline.saturating_duration_since(now).as_secs_f64().ceil();
                tracked
                    .bar
                    .set_message(format!("{label}, retrying in {remaining:.0}s"));
            }
        }
    }

    /// Finish all bars, leaving their last state on screen.
    pub fn finish(&self) {
        for tracked in self.items.values() {
            tracked.bar.abandon();
        }
    }

    fn update(&mut self, item: &UploadItem) {
        let plain = matches!(self.mode, Mode::Plain);
        let Some(tracked) = self.items.get_mut(&item.id) else {
            return;
        };

        let changed = tracked.status != item.status;
        tracked.status = item.status;
        if !matches!(item.status, UploadStatus::Retrying { .. }) {
            tracked.retry = None;
        }

        tracked.bar.set_position(u64::from(item.progress_percent));
        if tracked.retry.is_none() {
            tracked.bar.set_message(status_line(item));
        }

        if changed && plain {
            println!("{}: {}", item.name, status_line(item));
        }
    }

    fn println(&self, line: &str) {
        match self.mode {
            Mode::Fancy => {
                let _ = self.multi.println(line);
            }
            Mode::Plain => println!("{line}"),
            Mode::Silent => {}
        }
    }
}

impl Default for ProgressView {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:24} {bar:28.cyan/blue} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
}

/// Human-readable state of an item, used as the bar message.
pub fn status_line(item: &UploadItem) -> String {
    match item.status {
        UploadStatus::Pending => "queued".to_string(),
        UploadStatus::Transforming => "optimizing image".to_string(),
        UploadStatus::Transferring => {
            let mut line = format!(
                "{}/s, ETA {}",
                HumanBytes(speed_as_bytes(item.speed_bytes_per_sec)),
                format_eta(item.eta_seconds)
            );
            if item.progress_simulated {
                line.push_str(" (estimated)");
            }
            line
        }
        UploadStatus::Committing => "saving".to_string(),
        UploadStatus::Retrying { attempt, delay_ms } => format!(
            "attempt {attempt}/{} failed, retrying in {}s",
            item.max_attempts,
            delay_ms.div_ceil(1000)
        ),
        UploadStatus::Paused => "paused".to_string(),
        UploadStatus::Completed => "done".to_string(),
        UploadStatus::Failed => format!(
            "failed: {}",
            item.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Format an ETA as `1m 05s`, `12s` or `--`.
pub fn format_eta(eta_seconds: Option<f64>) -> String {
    match eta_seconds {
        Some(secs) if secs.is_finite() && secs >= 0.0 => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let total = secs.ceil() as u64;
            if total >= 60 {
                format!("{}m {:02}s", total / 60, total % 60)
            } else {
                format!("{total}s")
            }
        }
        _ => "--".to_string(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn speed_as_bytes(speed: f64) -> u64 {
    if speed.is_finite() && speed > 0.0 {
        speed as u64
    } else {
        0
    }
}

fn truncate(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        name.to_string()
    } else {
        let head: String = name.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
