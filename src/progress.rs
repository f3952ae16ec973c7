//! Status lines and per-task progress.
//!
//! Core logic only ever sees [`Reporter`]; the CLI picks a console
//! renderer or a plain stream writer.

use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// One unit of work with its own progress slot.
pub trait TaskProgress: Send + Sync {
    fn set_message(&self, message: &str);

    /// Total amount of work, e.g. bytes or 100 for percentages.
    fn set_length(&self, length: u64);

    fn set_position(&self, position: u64);

    fn inc(&self, delta: u64);

    fn finish(&self);
}

/// Receives user-facing output from the core.
pub trait Reporter: Send + Sync {
    /// Emits a single status line.
    fn status(&self, message: &str);

    /// Starts a new progress slot. Concurrent tasks each get their own.
    fn task(&self, name: &str) -> Box<dyn TaskProgress>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn status(&self, _message: &str) {}

    fn task(&self, _name: &str) -> Box<dyn TaskProgress> {
        Box::new(SilentTask)
    }
}

struct SilentTask;

impl TaskProgress for SilentTask {
    fn set_message(&self, _message: &str) {}
    fn set_length(&self, _length: u64) {}
    fn set_position(&self, _position: u64) {}
    fn inc(&self, _delta: u64) {}
    fn finish(&self) {}
}

/// Renders one progress bar per task on stderr.
pub struct ConsoleReporter {
    bars: MultiProgress,
    style: ProgressStyle,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        static TICK_STRINGS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        let style = ProgressStyle::default_bar()
            .template("{spinner} {msg:<32.green} [{bar:40.cyan/dim}] {pos:>3}/{len:3}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_strings(TICK_STRINGS)
            .progress_chars("=>-");
        Self {
            bars: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            style,
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn status(&self, message: &str) {
        // println through the MultiProgress so bars are not torn
        if self.bars.println(message).is_err() {
            eprintln!("{}", message);
        }
    }

    fn task(&self, name: &str) -> Box<dyn TaskProgress> {
        let bar = self.bars.add(
            ProgressBar::new(100)
                .with_style(self.style.clone())
                .with_message(name.to_string()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Box::new(ConsoleTask { bar })
    }
}

struct ConsoleTask {
    bar: ProgressBar,
}

impl TaskProgress for ConsoleTask {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn set_length(&self, length: u64) {
        self.bar.set_length(length);
    }

    fn set_position(&self, position: u64) {
        self.bar.set_position(position);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

/// Writes status lines, and a line per finished task, to a stream.
/// Meant for logs and non-interactive terminals.
#[derive(Clone)]
pub struct PlainReporter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PlainReporter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    fn line(&self, message: &str) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(sink, "{}", message);
            let _ = sink.flush();
        }
    }
}

impl Reporter for PlainReporter {
    fn status(&self, message: &str) {
        self.line(message);
    }

    fn task(&self, name: &str) -> Box<dyn TaskProgress> {
        Box::new(PlainTask {
            reporter: self.clone(),
            name: Mutex::new(name.to_string()),
            finished: Mutex::new(false),
        })
    }
}

struct PlainTask {
    reporter: PlainReporter,
    name: Mutex<String>,
    finished: Mutex<bool>,
}

impl TaskProgress for PlainTask {
    fn set_message(&self, message: &str) {
        if let Ok(mut name) = self.name.lock() {
            *name = message.to_string();
        }
    }

    fn set_length(&self, _length: u64) {}
    fn set_position(&self, _position: u64) {}
    fn inc(&self, _delta: u64) {}

    fn finish(&self) {
        let Ok(mut finished) = self.finished.lock() else {
            return;
        };
        if *finished {
            return;
        }
        *finished = true;
        let name = self
            .name
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default();
        self.reporter.line(&format!("{}: 100%", name));
    }
}

/// Console bars when stderr is a terminal, plain lines otherwise.
pub fn default_reporter() -> Arc<dyn Reporter> {
    if std::io::stderr().is_terminal() {
        Arc::new(ConsoleReporter::new())
    } else {
        Arc::new(PlainReporter::stderr())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Collects everything written to it, for assertions.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_plain_reporter_status_and_finish() {
        let buffer = SharedBuffer::default();
        let reporter = PlainReporter::new(Box::new(buffer.clone()));

        reporter.status("Version abc123 enabled for the sky130 PDK.");
        let task = reporter.task("Downloading common.tar.zst");
        task.set_length(1000);
        task.inc(500);
        task.set_message("Downloaded common.tar.zst");
        task.finish();
        task.finish();

        assert_eq!(
            buffer.contents(),
            "Version abc123 enabled for the sky130 PDK.\nDownloaded common.tar.zst: 100%\n"
        );
    }

    #[test]
    fn test_silent_reporter_accepts_everything() {
        let reporter = SilentReporter;
        reporter.status("ignored");
        let task = reporter.task("ignored");
        task.set_position(42);
        task.finish();
    }

    #[test]
    fn test_console_reporter_tasks_are_independent() {
        let reporter = ConsoleReporter {
            bars: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            style: ProgressStyle::default_bar(),
        };
        let a = reporter.task("open_pdks");
        let b = reporter.task("sky130_fd_sc_hd");
        a.set_position(40);
        b.set_position(10);
        a.finish();
        b.finish();
        reporter.status("done");
    }
}
