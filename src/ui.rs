use colored::*;
use terminal_size::{Width, Height, terminal_size};

use crate::agent::{StatsCollector, ToolCallRecord};

pub fn print_header(model: &str, session_id: &str) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let width = width.0 as usize;

    let line = "─".repeat(width);
    println!("{}", line.black().bold());

    let name = "Pilot".yellow().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}", name, version);

    // Model + session
    let info = format!("  {}  •  {}", model, session_id).cyan();
    println!("{}", info);

    if let Ok(path) = std::env::current_dir() {
        let path_str = path.to_string_lossy().black().bold();
        println!("  {}", path_str);
    }

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}

/// One line per tool call, with a short preview of its result.
pub fn print_tool_call(call: &ToolCallRecord) {
    let marker = if call.success { "⚙".cyan() } else { "⚙".red() };
    let mut line = format!("  {} {}", marker, call.name.bold());
    if call.cached {
        line.push_str(&" (cached)".black().bold().to_string());
    }
    println!("{} {}", line, format!("{:.2}s", call.duration.as_secs_f64()).black().bold());

    let preview = match (&call.result.error, &call.result.output) {
        (Some(error), _) => error.red().to_string(),
        (None, Some(output)) => output.normal().to_string(),
        (None, None) => String::new(),
    };
    for text in preview.lines().take(5) {
        println!("    {}", text);
    }
    if let Some(path) = &call.artifact {
        println!("    {} {}", "saved".black().bold(), path);
    }
}

pub fn print_stats(stats: &StatsCollector) {
    print_step(&stats.summary());
    for (name, usage) in &stats.tool_usage {
        println!(
            "    {} {} calls, {} ok, {} failed, {:.1}s",
            name.cyan(),
            usage.count,
            usage.success,
            usage.failures,
            usage.total_duration
        );
    }
}
