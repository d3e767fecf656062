//! Terminal progress and summary printing.

use std::io::{self, Write};

use mram_core::{FaultSummary, Progress, TestResult};

/// Reports list at most this many individual faults; the total is always
/// printed.
pub const SUMMARY_LIMIT: usize = 20;

/// Width of the progress bar in characters.
const BAR_WIDTH: u32 = 40;

/// Redraw the bar every this many addresses; per-address redraws slow the
/// sweep down noticeably at 115200 baud.
const REDRAW_EVERY: u32 = 64;

/// Single-line terminal progress bar fed by engine progress events.
pub struct ProgressBar {
    drawn: bool,
}

impl ProgressBar {
    pub const fn new() -> Self {
        Self { drawn: false }
    }

    pub fn update(&mut self, event: Progress) {
        match event {
            Progress::PhaseStarted { label, total } => {
                self.finish();
                println!("[{label}] {total} addresses");
            }
            Progress::Step { done, total } => {
                if done % REDRAW_EVERY == 0 || done == total {
                    self.draw(done, total);
                }
            }
        }
    }

    fn draw(&mut self, done: u32, total: u32) {
        let total = total.max(1);
        let filled = done.min(total) * BAR_WIDTH / total;
        let bar: String = (0..BAR_WIDTH)
            .map(|i| if i < filled { '#' } else { '-' })
            .collect();
        print!("\r[{bar}] {done}/{total}");
        let _ = io::stdout().flush();
        self.drawn = true;
    }

    /// Terminates the in-progress line, if any.
    pub fn finish(&mut self) {
        if self.drawn {
            println!();
            self.drawn = false;
        }
    }
}

/// One line per finished run: algorithm, range, fault count, duration.
pub fn print_run(result: &TestResult) {
    let status = if result.passed() {
        "ok"
    } else if result.completed {
        "FAULTS"
    } else {
        "interrupted"
    };
    println!(
        "{} over {}: {} faults in {:.1?} [{}]",
        result.algorithm,
        result.range,
        result.fault_count(),
        result.elapsed,
        status
    );
}

/// Session summary: verdict, total count, and the leading fault records.
pub fn print_summary(summary: FaultSummary<'_>) {
    let rule = "=".repeat(60);
    println!("{rule}");
    if summary.fault_count == 0 {
        println!("ALL TESTS PASSED - no faults detected");
    } else {
        println!("TOTAL FAULTS: {}", summary.fault_count);
        for record in summary.first {
            println!("  {record}");
        }
        let hidden = summary.fault_count - summary.first.len();
        if hidden > 0 {
            println!("  ... and {hidden} more");
        }
    }
    println!("{rule}");
}
