//! Panic hook printing a crash report.
//!
//! A panic in mock4rs itself (not in the tests it runs, which live in their
//! own process) is reported with the stage and file that were active, how far
//! staging got, and the panic location.

use super::context::{get_current_context, get_progress, RunContext};
use std::panic::PanicHookInfo;
use tracing::Span;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const WIDTH: usize = 78;

/// Install the crash report hook.
///
/// Call it first thing in `main`:
///
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     mock4rs::observability::install_panic_hook();
///     // ...
/// }
/// ```
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        print_crash_report(info);
    }));
}

fn print_crash_report(info: &PanicHookInfo<'_>) {
    let context = get_current_context();
    let (processed, total) = get_progress();

    eprintln!();
    print_header();
    print_panic_details(info);
    print_context_section(&context, processed, total);
    print_backtrace_section();
    print_footer(&context);
}

fn rule(left: char, right: char) -> String {
    format!("{left}{}{right}", "═".repeat(WIDTH))
}

fn row(text: &str) -> String {
    let inner = WIDTH - 2;
    format!("║  {:<inner$}║", truncate(text, inner))
}

fn print_header() {
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

    eprintln!("{}", rule('╔', '╗'));
    eprintln!("{}", row("MOCK4RS CRASH REPORT"));
    eprintln!("{}", rule('╠', '╣'));
    eprintln!("{}", row(&format!("Version: {VERSION}")));
    eprintln!("{}", row(&format!("Platform: {}", std::env::consts::OS)));
    eprintln!("{}", row(&format!("Time: {timestamp}")));
    eprintln!("{}", rule('╠', '╣'));
}

fn print_panic_details(info: &PanicHookInfo<'_>) {
    let message = extract_panic_message(info);
    eprintln!("{}", row(&format!("PANIC: {message}")));

    if let Some(location) = info.location() {
        eprintln!(
            "{}",
            row(&format!(
                "Location: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ))
        );
    }
}

fn print_context_section(context: &RunContext, processed: usize, total: usize) {
    eprintln!("{}", rule('╠', '╣'));
    eprintln!("{}", row("OPERATION CONTEXT:"));

    match &context.phase {
        Some(phase) => eprintln!("{}", row(&format!("  Phase: {phase}"))),
        None => eprintln!("{}", row("  Phase: (not set, crashed before the run started)")),
    }

    if let Some(metadata) = Span::current().metadata() {
        eprintln!("{}", row(&format!("  Span: {}", metadata.name())));
    }

    if let Some(file) = &context.current_file {
        eprintln!("{}", row(&format!("  File: {}", file.display())));
    }

    if total > 0 {
        eprintln!("{}", row(&format!("  Progress: {}", progress_line(processed, total))));
    }
}

fn print_backtrace_section() {
    eprintln!("{}", rule('╠', '╣'));

    if std::env::var("RUST_BACKTRACE").is_ok() {
        eprintln!("{}", row("STACK TRACE:"));
        eprintln!("{}", rule('╚', '╝'));
        eprintln!();
        eprintln!("{}", std::backtrace::Backtrace::capture());
    } else {
        eprintln!("{}", row("Run with RUST_BACKTRACE=1 for stack trace"));
        eprintln!("{}", rule('╚', '╝'));
    }
}

fn print_footer(context: &RunContext) {
    if let Some(file) = &context.current_file {
        eprintln!();
        eprintln!("Include this crash report and the file: {}", file.display());
    }
}

fn progress_line(processed: usize, total: usize) -> String {
    let pct = processed * 100 / total.max(1);
    format!("{processed} / {total} files ({pct}%)")
}

fn extract_panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Shorten to at most `max_len` characters, ending in `...` when cut.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
