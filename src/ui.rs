use colored::*;
use jiff::{SignedDuration, Timestamp};

use crate::{
    models::{filter::Filter, task::Task, theme::Theme},
    store::{DerivedView, TaskCounts},
};

/// Colors used for one theme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub accent: Color,
    pub done: Color,
    pub pending: Color,
    pub danger: Color,
    pub text: Option<Color>,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Palette {
                accent: Color::Blue,
                done: Color::Green,
                pending: Color::Yellow,
                danger: Color::Red,
                text: None,
            },
            Theme::Dark => Palette {
                accent: Color::BrightBlue,
                done: Color::BrightGreen,
                pending: Color::BrightYellow,
                danger: Color::BrightRed,
                text: Some(Color::BrightWhite),
            },
        }
    }

    fn text(&self, value: &str) -> ColoredString {
        match self.text {
            Some(color) => value.color(color),
            None => value.normal(),
        }
    }
}

/// Get the terminal width, defaulting to 80 if unavailable
fn get_terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

/// Get the appropriate status glyph for a task
pub fn get_status_glyph(task: &Task, palette: &Palette) -> ColoredString {
    if task.completed {
        "✓".color(palette.done)
    } else {
        "○".normal()
    }
}

/// Describe how long ago a task was created ("just now", "3 hours ago",
/// "yesterday", or the local date)
pub fn format_created_ago(created_at: Timestamp, now: Timestamp) -> String {
    let elapsed = now.duration_since(created_at);

    if elapsed < SignedDuration::from_hours(1) {
        "just now".to_string()
    } else if elapsed < SignedDuration::from_hours(24) {
        match elapsed.as_hours() {
            1 => "1 hour ago".to_string(),
            hours => format!("{hours} hours ago"),
        }
    } else if elapsed < SignedDuration::from_hours(48) {
        "yesterday".to_string()
    } else {
        let zoned = created_at.to_zoned(jiff::tz::TimeZone::system());
        zoned.date().strftime("%Y-%m-%d").to_string()
    }
}

/// Render the application header
pub fn render_header(palette: &Palette) {
    println!("\n  {}", "My Todo List".color(palette.accent).bold());
    println!("  {}\n", "Stay organized and productive".dimmed());
}

/// Plain-text stats line, e.g. "Total 3 · Completed 1 · Pending 2"
pub fn format_stats(counts: &TaskCounts) -> String {
    format!(
        "Total {}  ·  Completed {}  ·  Pending {}",
        counts.total, counts.completed, counts.pending
    )
}

/// Render the aggregate counts
pub fn render_stats(counts: &TaskCounts, palette: &Palette) {
    println!(
        "  {} {}  ·  {} {}  ·  {} {}",
        "Total".dimmed(),
        counts.total.to_string().color(palette.accent).bold(),
        "Completed".dimmed(),
        counts.completed.to_string().color(palette.done).bold(),
        "Pending".dimmed(),
        counts.pending.to_string().color(palette.pending).bold(),
    );
}

fn filter_count(filter: Filter, counts: &TaskCounts) -> usize {
    match filter {
        Filter::All => counts.total,
        Filter::Completed => counts.completed,
        Filter::Pending => counts.pending,
    }
}

fn filter_label(filter: Filter) -> &'static str {
    match filter {
        Filter::All => "All",
        Filter::Completed => "Completed",
        Filter::Pending => "Pending",
    }
}

/// Render the filter choices with their counts, highlighting the active one
pub fn render_filter_bar(active: Filter, counts: &TaskCounts, palette: &Palette) {
    let items: Vec<String> = Filter::VARIANTS
        .iter()
        .map(|&filter| {
            let label = format!("{} ({})", filter_label(filter), filter_count(filter, counts));
            if filter == active {
                format!("[{}]", label).color(palette.accent).bold().to_string()
            } else {
                label.dimmed().to_string()
            }
        })
        .collect();
    println!("  {}\n", items.join("  "));
}

/// Message shown when a view has no tasks, as (title, hint)
pub fn empty_state_message(filter: Filter, total: usize) -> (String, &'static str) {
    if total == 0 {
        (
            String::from("No tasks yet"),
            "Add a task to get started: todos add <text>",
        )
    } else {
        (format!("No {} tasks", filter), "Try a different filter.")
    }
}

/// Render the empty state for the current view
pub fn render_empty_state(filter: Filter, total: usize) {
    let (title, hint) = empty_state_message(filter, total);
    println!("  {}", title.bold());
    println!("  {}\n", hint.dimmed());
}

/// Render a single task line with position, glyph, text and right-aligned age
pub fn render_task_line(position: usize, task: &Task, palette: &Palette, now: Timestamp) {
    let terminal_width = get_terminal_width();

    let id_str = format!("{:>3}", position);
    let glyph = get_status_glyph(task, palette);
    let styled_text = if task.completed {
        task.text.dimmed().strikethrough()
    } else {
        palette.text(&task.text).bold()
    };

    let left_visible_len = format!("  {}  {}  {}", id_str, " ", task.text)
        .chars()
        .count();
    let styled_left = format!("  {}  {}  {}", id_str.dimmed(), glyph, styled_text);

    let right_section = format!("created {}", format_created_ago(task.created_at, now));
    let right_visible_len = right_section.chars().count();
    let total_content = left_visible_len + right_visible_len;

    if total_content + 4 < terminal_width {
        let padding = terminal_width - total_content - 2;
        println!(
            "{}{}{}",
            styled_left,
            " ".repeat(padding),
            right_section.dimmed()
        );
    } else {
        // Not enough space for right alignment, just print normally
        println!("{}", styled_left);
    }
}

/// Render the task list for a derived view. Positions refer to the full list
/// so they stay valid whatever the filter.
pub fn render_view(view: &DerivedView<'_>, all_tasks: &[Task], palette: &Palette) {
    render_stats(&view.counts, palette);
    println!();
    render_filter_bar(view.filter, &view.counts, palette);

    if view.tasks.is_empty() {
        render_empty_state(view.filter, view.counts.total);
        return;
    }

    let now = Timestamp::now();
    for task in &view.tasks {
        let position = all_tasks
            .iter()
            .position(|t| t.id == task.id)
            .map_or(0, |index| index + 1);
        render_task_line(position, task, palette, now);
    }
    println!();
}

/// Render a one-line confirmation of something that happened
pub fn render_notice(message: &str, palette: &Palette) {
    println!("  {} {}", "•".color(palette.accent), message);
}

/// Render a hint that an action did nothing
pub fn render_noop(message: &str) {
    println!("  {}", message.dimmed());
}

/// Render an error line on stderr
pub fn render_error(message: &str, palette: &Palette) {
    eprintln!("{} {}", "Error:".color(palette.danger).bold(), message);
}
