use std::io::{self, IsTerminal, Write};

use chrono::{NaiveDate, Weekday};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{DayKey, format_day_label};
use crate::grid::{GridCell, YearMonth, month_grid, weekday_labels};
use crate::task::Task;

const EMPTY_DAY_MESSAGE: &str = "No tasks for this day";
const GRID_CELL_WIDTH: usize = 4;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        let color = cfg.get_bool("color").unwrap_or(true);
        Self {
            color: color && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn print_message(&mut self, message: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{message}")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_day(
        &mut self,
        date: NaiveDate,
        is_today: bool,
        tasks: &[Task],
    ) -> anyhow::Result<()> {
        self.write_day(io::stdout().lock(), date, is_today, tasks)
    }

    #[tracing::instrument(skip(self, busy_days))]
    pub fn print_month(
        &mut self,
        month: YearMonth,
        week_start: Weekday,
        selected_day: Option<u32>,
        busy_days: &[u32],
    ) -> anyhow::Result<()> {
        self.write_month(
            io::stdout().lock(),
            month,
            week_start,
            selected_day,
            busy_days,
        )
    }

    pub fn print_days(
        &mut self,
        rows: &[(Option<NaiveDate>, &DayKey, &[Task])],
    ) -> anyhow::Result<()> {
        self.write_days(io::stdout().lock(), rows)
    }

    fn write_day<W: Write>(
        &self,
        mut out: W,
        date: NaiveDate,
        is_today: bool,
        tasks: &[Task],
    ) -> anyhow::Result<()> {
        let mut header = format_day_label(date);
        if is_today {
            header.push_str(" (today)");
        }
        writeln!(out, "{}", self.paint(&header, "1"))?;
        writeln!(out)?;

        if tasks.is_empty() {
            writeln!(out, "{EMPTY_DAY_MESSAGE}")?;
            return Ok(());
        }

        let headers = vec![
            "#".to_string(),
            "Done".to_string(),
            "Task".to_string(),
            "ID".to_string(),
        ];
        let rows = tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| {
                let text = if task.completed {
                    self.paint(&task.text, "9;90")
                } else {
                    task.text.clone()
                };
                vec![
                    self.paint(&(idx + 1).to_string(), "33"),
                    task.status_mark().to_string(),
                    text,
                    task.id.to_string(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    fn write_month<W: Write>(
        &self,
        mut out: W,
        month: YearMonth,
        week_start: Weekday,
        selected_day: Option<u32>,
        busy_days: &[u32],
    ) -> anyhow::Result<()> {
        let total_width = GRID_CELL_WIDTH * 7;
        let title = format!("{:^total_width$}", month.to_string());
        writeln!(out, "{}", self.paint(title.trim_end(), "1"))?;

        let labels: String = weekday_labels(week_start)
            .iter()
            .map(|label| format!(" {label:<w$}", w = GRID_CELL_WIDTH - 1))
            .collect();
        writeln!(out, "{}", labels.trim_end())?;

        for row in month_grid(month, week_start).chunks(7) {
            let mut line = String::new();
            for cell in row {
                line.push_str(&self.grid_cell(*cell, selected_day, busy_days));
            }
            writeln!(out, "{}", line.trim_end())?;
        }

        Ok(())
    }

    fn grid_cell(&self, cell: GridCell, selected_day: Option<u32>, busy_days: &[u32]) -> String {
        let Some(day) = cell.day() else {
            return " ".repeat(GRID_CELL_WIDTH);
        };

        if selected_day == Some(day) {
            return self.paint(&format!("[{day:>2}]"), "7");
        }
        let mark = if busy_days.contains(&day) { '*' } else { ' ' };
        format!(" {day:>2}{mark}")
    }

    fn write_days<W: Write>(
        &self,
        mut out: W,
        rows: &[(Option<NaiveDate>, &DayKey, &[Task])],
    ) -> anyhow::Result<()> {
        if rows.is_empty() {
            writeln!(out, "No tasks recorded")?;
            return Ok(());
        }

        let headers = vec!["Date".to_string(), "Day".to_string(), "Done".to_string()];
        let rows = rows
            .iter()
            .map(|(date, key, tasks)| {
                let date_cell = date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| key.to_string());
                let label = date.map(format_day_label).unwrap_or_default();
                let done = tasks.iter().filter(|task| task.completed).count();
                vec![date_cell, label, format!("{done}/{}", tasks.len())]
            })
            .collect();

        write_table(out, headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
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

    let mut line = String::new();
    for idx in 0..column_count {
        line.push_str(&format!("{:width$} ", headers[idx], width = widths[idx]));
    }
    writeln!(writer, "{}", line.trim_end())?;

    line.clear();
    for &width in &widths {
        line.push_str(&format!("{:-<width$} ", "", width = width));
    }
    writeln!(writer, "{}", line.trim_end())?;

    for row in rows {
        line.clear();
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            line.push_str(&format!("{}{} ", cell, " ".repeat(padding)));
        }
        writeln!(writer, "{}", line.trim_end())?;
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

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Weekday};

    use super::{Renderer, strip_ansi};
    use crate::datetime::day_key;
    use crate::grid::YearMonth;
    use crate::task::Task;

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&Renderer, &mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        f(&Renderer::plain(), &mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn month_grid_marks_selection_and_busy_days() {
        let month = YearMonth::new(2024, 3).expect("valid month");
        let text = render(|r, buf| r.write_month(buf, month, Weekday::Sun, Some(7), &[8, 31]));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0].trim(), "March 2024");
        assert_eq!(lines[1], " Su  Mo  Tu  We  Th  Fr  Sa");
        assert_eq!(lines[2], "                      1   2");
        assert_eq!(lines[3], "  3   4   5   6 [ 7]  8*  9");
        assert_eq!(lines[7], " 31*");
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn empty_day_says_so() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).expect("valid date");
        let text = render(|r, buf| r.write_day(buf, date, false, &[]));
        assert_eq!(text, "Thursday 7/3\n\nNo tasks for this day\n");
    }

    #[test]
    fn day_lists_tasks_in_order() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).expect("valid date");
        let mut done = Task::new_pending("Call mom".to_string(), 2);
        done.toggle();
        let tasks = vec![Task::new_pending("Buy milk".to_string(), 1), done];

        let text = render(|r, buf| r.write_day(buf, date, true, &tasks));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Thursday 7/3 (today)");
        assert_eq!(lines[2], "# Done Task     ID");
        assert_eq!(lines[4], "1 [ ]  Buy milk 1");
        assert_eq!(lines[5], "2 [x]  Call mom 2");
    }

    #[test]
    fn days_fall_back_to_raw_key() {
        let key = day_key(NaiveDate::from_ymd_opt(2024, 3, 7).expect("valid date"));
        let tasks = vec![Task::new_pending("a".to_string(), 1)];
        let rows = vec![(key.date(), &key, tasks.as_slice())];
        let text = render(|r, buf| r.write_days(buf, &rows));
        assert!(text.contains("2024-03-07 Thursday 7/3 0/1"));
    }

    #[test]
    fn strips_escape_sequences() {
        assert_eq!(strip_ansi("\x1b[33m12\x1b[0m"), "12");
    }
}
