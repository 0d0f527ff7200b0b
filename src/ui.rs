//! Terminal output: progress bars and spinners for long steps, status lines,
//! and a stderr writer for `tracing` that doesn't tear through the bars.

use std::{
    borrow::Cow,
    io::{self, Write as _},
    time::Duration,
};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressFinish, ProgressStyle};

/// How often running bars redraw.
const TICK: Duration = Duration::from_millis(250);

/// Handle to the terminal. Cheap to clone; clones share the same bars.
#[derive(Clone)]
pub struct Ui {
    bars: MultiProgress,
}

impl Ui {
    /// Set up the UI, drawing to stderr.
    pub fn init() -> Ui {
        Ui {
            bars: MultiProgress::new(),
        }
    }

    /// A UI which never draws anything.
    #[cfg(test)]
    pub fn init_for_tests() -> Ui {
        Ui {
            bars: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    /// Stop drawing bars, for when stdout carries real output.
    pub fn hide_progress_bars(&self) {
        self.bars.set_draw_target(ProgressDrawTarget::hidden());
    }

    /// A writer for `tracing` which pauses our bars around each write.
    pub fn get_stderr_writer(&self) -> SafeStderrWriter {
        SafeStderrWriter {
            bars: self.bars.clone(),
        }
    }

    /// A bar counting up to `len`.
    pub fn new_progress_bar(&self, config: &ProgressConfig<'_>, len: u64) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template(
                "  {prefix:3}{msg:25} {pos:>4}/{len:4} {elapsed_precise} \
                 {wide_bar:.cyan/blue} {eta_precise}",
            )
            .expect("built-in progress template should be valid");
        self.add(ProgressBar::new(len).with_style(style), config)
    }

    /// A spinner for a step with no measurable progress, like waiting on the
    /// model.
    pub fn new_spinner(&self, config: &ProgressConfig<'_>) -> ProgressBar {
        let style = ProgressStyle::default_spinner()
            .template("{spinner} {prefix:3}{msg}")
            .expect("built-in spinner template should be valid");
        self.add(ProgressBar::new_spinner().with_style(style), config)
    }

    fn add(&self, pb: ProgressBar, config: &ProgressConfig<'_>) -> ProgressBar {
        let pb = self.bars.add(pb);
        #[cfg(test)]
        pb.set_draw_target(ProgressDrawTarget::hidden());
        pb.set_prefix(config.emoji.to_owned());
        pb.set_message(config.msg.to_owned());
        pb.enable_steady_tick(TICK);
        pb.with_finish(ProgressFinish::WithMessage(Cow::Owned(
            config.done_msg.to_owned(),
        )))
    }

    /// Print `emoji msg` on its own line above any bars.
    pub fn display_message(&self, emoji: &str, msg: &str) {
        self.bars.suspend(|| eprintln!("{emoji} {msg}"));
    }
}

/// Labels for a bar or spinner.
pub struct ProgressConfig<'a> {
    pub emoji: &'a str,
    /// Shown while running.
    pub msg: &'a str,
    /// Shown once finished.
    pub done_msg: &'a str,
}

/// Writes to stderr with our bars cleared out of the way.
#[derive(Clone)]
pub struct SafeStderrWriter {
    bars: MultiProgress,
}

impl io::Write for SafeStderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bars.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.bars.suspend(|| io::stderr().flush())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SafeStderrWriter {
    type Writer = SafeStderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
