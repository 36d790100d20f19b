use std::io::{self, IsTerminal, Write};

use anyhow::Context;
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarMonth, WEEKDAY_LABELS};
use crate::config::Config;
use crate::controller::DayCell;
use crate::datetime::format_project_date;
use crate::store::StatusCounts;
use crate::task::{Status, Task};

const CELL_WIDTH: usize = 6;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.color_enabled().context("invalid color setting")?;
        Ok(Self { color })
    }

    /// One tab per status with its task count; the current view is bracketed.
    pub fn print_view_tabs(&mut self, current: Status, counts: StatusCounts) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let tabs: Vec<String> = Status::ALL
            .iter()
            .map(|status| {
                let label = format!("{status} ({})", counts.get(*status));
                if *status == current {
                    self.paint(&format!("[{label}]"), status_color(*status))
                } else {
                    format!(" {label} ")
                }
            })
            .collect();
        writeln!(out, "{}", tabs.join("  "))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&mut self, tasks: &[&Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if tasks.is_empty() {
            writeln!(out, "No tasks yet.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Status".to_string(),
            "Due".to_string(),
            "Text".to_string(),
            "Completed".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = self.paint(&task.id.to_string(), "33");
            let status = self.paint(task.status.as_str(), status_color(task.status));
            let due = task.due_date.map(format_project_date).unwrap_or_default();
            let completed = task.completed_at.map(format_project_date).unwrap_or_default();

            rows.push(vec![id, status, due, task.text.clone(), completed]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_line(&mut self, verb: &str, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let status = self.paint(task.status.as_str(), status_color(task.status));
        match task.due_date {
            Some(due) => writeln!(
                out,
                "{verb} task {} ({status}, due {}): {}",
                task.id,
                format_project_date(due),
                task.text
            )?,
            None => writeln!(out, "{verb} task {} ({status}): {}", task.id, task.text)?,
        }
        Ok(())
    }

    /// Month grid, Monday first. Each day shows its number, a marker per
    /// status of the tasks due that day, `*` for today and `>` for the
    /// selected date.
    #[tracing::instrument(skip(self, grid), fields(cells = grid.len()))]
    pub fn print_calendar(&mut self, month: CalendarMonth, grid: &[Option<DayCell>]) -> anyhow::Result<()> {
        self.write_calendar(io::stdout().lock(), month, grid)
    }

    fn write_calendar<W: Write>(
        &self,
        mut out: W,
        month: CalendarMonth,
        grid: &[Option<DayCell>],
    ) -> anyhow::Result<()> {
        let width = CELL_WIDTH * WEEKDAY_LABELS.len();
        writeln!(out, "{:^width$}", month.label())?;

        for label in WEEKDAY_LABELS {
            write!(out, "{label:<CELL_WIDTH$}")?;
        }
        writeln!(out)?;

        for week in grid.chunks(WEEKDAY_LABELS.len()) {
            for slot in week {
                let cell = match slot {
                    Some(day) => self.format_day(day),
                    None => String::new(),
                };
                let visible = UnicodeWidthStr::width(strip_ansi(&cell).as_str());
                write!(out, "{}{}", cell, " ".repeat(CELL_WIDTH.saturating_sub(visible)))?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    fn format_day(&self, day: &DayCell) -> String {
        let prefix = if day.is_selected {
            ">"
        } else if day.is_today {
            "*"
        } else {
            " "
        };
        let number = format!("{prefix}{:>2}", chrono::Datelike::day(&day.date));
        let number = if day.is_today { self.paint(&number, "1") } else { number };
        let markers: String = day
            .markers
            .iter()
            .map(|status| self.paint(status_marker(*status), status_color(*status)))
            .collect();
        format!("{number}{markers}")
    }

    pub fn print_message(&mut self, message: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{message}")?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn status_color(status: Status) -> &'static str {
    match status {
        Status::Todo => "35",
        Status::Doing => "34",
        Status::Done => "32",
    }
}

fn status_marker(status: Status) -> &'static str {
    match status {
        Status::Todo => "o",
        Status::Doing => "~",
        Status::Done => "x",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
