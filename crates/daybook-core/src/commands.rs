use anyhow::{Context, anyhow};
use chrono::{Datelike, NaiveDate, Weekday};
use tracing::{debug, info, instrument};

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::{BlobStorage, DataStore};
use crate::datetime::{DayKey, format_day_label};
use crate::grid::{YearMonth, is_same_day, month_dates};
use crate::render::Renderer;
use crate::task::Task;

/// Per-invocation state the commands act on. Only `run` reads the clock;
/// everything below takes these values as given.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub today: NaiveDate,
    pub selected: NaiveDate,
    pub now_ms: u64,
    pub week_start: Weekday,
}

impl Session {
    pub fn day_key(&self) -> DayKey {
        DayKey::from_date(self.selected)
    }
}

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "show", "add", "toggle", "done", "delete", "month", "days", "_show", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch<S: BlobStorage>(
    store: &DataStore<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    session: Session,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    debug!(command, args = ?inv.command_args, "dispatching command");

    match command {
        "show" => cmd_show(store, renderer, session),
        "add" => cmd_add(store, renderer, session, &inv.command_args),
        "toggle" | "done" => cmd_toggle(store, renderer, session, &inv.command_args),
        "delete" => cmd_delete(store, renderer, session, &inv.command_args),
        "month" => cmd_month(store, renderer, session, &inv.command_args),
        "days" => cmd_days(store, renderer),
        "_show" => cmd_show_config(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, renderer))]
fn cmd_show<S: BlobStorage>(
    store: &DataStore<S>,
    renderer: &mut Renderer,
    session: Session,
) -> anyhow::Result<()> {
    let tasks = store.load();
    renderer.print_day(
        session.selected,
        is_same_day(&session.selected, &session.today),
        tasks.tasks_for(&session.day_key()),
    )
}

#[instrument(skip(store, renderer, args))]
fn cmd_add<S: BlobStorage>(
    store: &DataStore<S>,
    renderer: &mut Renderer,
    session: Session,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command add");

    let text = args.join(" ");
    let key = session.day_key();
    let (added, tasks) = store.add_task(store.load(), &key, &text, session.now_ms)?;

    match added {
        Some(task) => {
            let position = tasks.tasks_for(&key).len();
            renderer.print_message(&format!(
                "Added task {position} to {}: {}",
                format_day_label(session.selected),
                task.text
            ))
        }
        None => {
            debug!("blank task text; nothing added");
            Ok(())
        }
    }
}

#[instrument(skip(store, renderer, args))]
fn cmd_toggle<S: BlobStorage>(
    store: &DataStore<S>,
    renderer: &mut Renderer,
    session: Session,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command toggle");

    let key = session.day_key();
    let tasks = store.load();
    let Some(id) = resolve_task_ref(first_arg(args, "toggle")?, tasks.tasks_for(&key))? else {
        return Ok(());
    };

    let tasks = store.toggle_task(tasks, &key, id)?;
    if let Some(task) = tasks.tasks_for(&key).iter().find(|task| task.id == id) {
        let state = if task.completed { "done" } else { "open" };
        renderer.print_message(&format!("Marked '{}' {state}.", task.text))?;
    }
    Ok(())
}

#[instrument(skip(store, renderer, args))]
fn cmd_delete<S: BlobStorage>(
    store: &DataStore<S>,
    renderer: &mut Renderer,
    session: Session,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command delete");

    let key = session.day_key();
    let tasks = store.load();
    let Some(id) = resolve_task_ref(first_arg(args, "delete")?, tasks.tasks_for(&key))? else {
        return Ok(());
    };
    let text = tasks
        .tasks_for(&key)
        .iter()
        .find(|task| task.id == id)
        .map(|task| task.text.clone());

    store.delete_task(tasks, &key, id)?;
    if let Some(text) = text {
        renderer.print_message(&format!("Deleted '{text}'."))?;
    }
    Ok(())
}

#[instrument(skip(store, renderer, args))]
fn cmd_month<S: BlobStorage>(
    store: &DataStore<S>,
    renderer: &mut Renderer,
    session: Session,
    args: &[String],
) -> anyhow::Result<()> {
    let anchor = YearMonth::of(session.selected);
    let month = match args.first() {
        Some(raw) => YearMonth::parse(raw, anchor)?,
        None => anchor,
    };
    let picked = args
        .get(1)
        .map(|raw| pick_day(month, raw))
        .transpose()?;

    let tasks = store.load();
    let busy_days: Vec<u32> = month_dates(month)
        .filter(|date| tasks.has_tasks(&DayKey::from_date(*date)))
        .map(|date| date.day())
        .collect();
    debug!(%month, busy = busy_days.len(), "rendering month grid");

    let selected = picked.unwrap_or(session.selected);
    let selected_day = (YearMonth::of(selected) == month).then(|| selected.day());
    renderer.print_month(month, session.week_start, selected_day, &busy_days)?;

    if let Some(date) = picked {
        renderer.print_message("")?;
        renderer.print_day(
            date,
            is_same_day(&date, &session.today),
            tasks.tasks_for(&DayKey::from_date(date)),
        )?;
    }
    Ok(())
}

/// Picking a day number in the grid of `month`.
fn pick_day(month: YearMonth, raw: &str) -> anyhow::Result<NaiveDate> {
    let day = raw
        .trim()
        .parse::<u32>()
        .with_context(|| format!("expected a day number, got: {raw}"))?;
    month
        .date(day)
        .ok_or_else(|| anyhow!("{month} has no day {day}"))
}

#[instrument(skip(store, renderer))]
fn cmd_days<S: BlobStorage>(store: &DataStore<S>, renderer: &mut Renderer) -> anyhow::Result<()> {
    let tasks = store.load();
    let mut rows: Vec<(Option<NaiveDate>, &DayKey, &[Task])> = tasks
        .days()
        .map(|(key, list)| (key.date(), key, list))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    renderer.print_days(&rows)
}

fn cmd_show_config(cfg: &Config) -> anyhow::Result<()> {
    for (key, value) in cfg.sorted_entries() {
        println!("{key}={value}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "usage: daybook [--date EXPR] [--data DIR] [--rc KEY=VALUE] [command] [args]\n\n\
         commands:\n  \
         show                 list the tasks of the selected day (default)\n  \
         add TEXT...          add a task to the selected day\n  \
         toggle N | id:ID     flip a task between open and done (alias: done)\n  \
         delete N | id:ID     remove a task\n  \
         month [YYYY-MM|+N|-N|NAME] [DAY]\n                       \
         show a month grid, * marks days with tasks;\n                       \
         with DAY, pick that date and show its tasks\n  \
         days                 list every day that has tasks\n  \
         _show                print the effective configuration\n  \
         version              print the version"
    );
    Ok(())
}

fn first_arg<'a>(args: &'a [String], command: &str) -> anyhow::Result<&'a str> {
    args.first()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{command} requires a task number or id:ID"))
}

/// `N` is a 1-based position in the day's list, `id:ID` a raw task id.
/// Positions past the end resolve to `None` so the command is a no-op.
fn resolve_task_ref(token: &str, tasks: &[Task]) -> anyhow::Result<Option<u64>> {
    if let Some(raw) = token.strip_prefix("id:") {
        let id = raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid task id: {raw}"))?;
        return Ok(Some(id));
    }

    let position = token
        .trim()
        .parse::<usize>()
        .with_context(|| format!("expected a task number or id:ID, got: {token}"))?;
    let id = position
        .checked_sub(1)
        .and_then(|idx| tasks.get(idx))
        .map(|task| task.id);
    if id.is_none() {
        debug!(position, count = tasks.len(), "task number out of range");
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{expand_command_abbrev, known_command_names, pick_day, resolve_task_ref};
    use crate::grid::YearMonth;
    use crate::task::Task;

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("mo", &known), Some("month"));
        assert_eq!(expand_command_abbrev("del", &known), Some("delete"));
        assert_eq!(expand_command_abbrev("do", &known), Some("done"));
        assert_eq!(expand_command_abbrev("d", &known), None);
    }

    #[test]
    fn task_refs_resolve_by_position_or_id() {
        let tasks = vec![
            Task::new_pending("a".to_string(), 1_000),
            Task::new_pending("b".to_string(), 2_000),
        ];
        assert_eq!(resolve_task_ref("2", &tasks).expect("position"), Some(2_000));
        assert_eq!(resolve_task_ref("id:1000", &tasks).expect("id"), Some(1_000));
        assert_eq!(resolve_task_ref("id:77", &tasks).expect("id"), Some(77));
        assert_eq!(resolve_task_ref("0", &tasks).expect("zero"), None);
        assert_eq!(resolve_task_ref("3", &tasks).expect("past end"), None);
        assert!(resolve_task_ref("two", &tasks).is_err());
    }

    #[test]
    fn picking_a_day_stays_inside_the_month() {
        let feb = YearMonth::new(2024, 2).expect("valid month");
        assert_eq!(
            pick_day(feb, "29").expect("leap day"),
            NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date")
        );
        assert!(pick_day(feb, "30").is_err());
        assert!(pick_day(feb, "0").is_err());
        assert!(pick_day(feb, "first").is_err());
    }
}
