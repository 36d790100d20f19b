use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, CalendarArgs, Command, SelectArgs};
use crate::controller::ViewController;
use crate::datetime::parse_date_expr;
use crate::persistence::KeyValueStore;
use crate::render::Renderer;
use crate::task::{Status, TaskId};

#[instrument(skip(controller, renderer, command))]
pub async fn dispatch<S: KeyValueStore>(
    controller: &mut ViewController<S>,
    renderer: &mut Renderer,
    command: Option<Command>,
) -> anyhow::Result<()> {
    let now = Utc::now();
    debug!(?command, "dispatching command");

    match command.unwrap_or(Command::List { status: None }) {
        Command::Add(args) => cmd_add(controller, renderer, args, now).await,
        Command::List { status } => cmd_list(controller, renderer, status),
        Command::View { status } => cmd_view(controller, renderer, status).await,
        Command::Advance { id } => cmd_advance(controller, renderer, id, now).await,
        Command::Delete { id } => cmd_delete(controller, renderer, id).await,
        Command::Select(args) => cmd_select(controller, renderer, args, now).await,
        Command::Calendar(args) => cmd_calendar(controller, renderer, args, now),
        Command::Due { date } => cmd_due(controller, renderer, &date, now),
    }
}

#[instrument(skip(controller, renderer, args, now))]
async fn cmd_add<S: KeyValueStore>(
    controller: &mut ViewController<S>,
    renderer: &mut Renderer,
    args: AddArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    if let Some(raw) = args.due.as_deref() {
        controller.select_date(parse_date_expr(raw, now)?);
    }

    let text = args.text.join(" ");
    match controller.add_task(&text, now).await? {
        Some(task) => renderer.print_task_line("Created", &task),
        None => renderer.print_message("Nothing added: task text is empty."),
    }
}

#[instrument(skip(controller, renderer))]
fn cmd_list<S: KeyValueStore>(
    controller: &ViewController<S>,
    renderer: &mut Renderer,
    status: Option<Status>,
) -> anyhow::Result<()> {
    info!("command list");

    let status = status.unwrap_or_else(|| controller.current_view());
    renderer.print_view_tabs(status, controller.counts())?;
    if let Some(date) = controller.selected_date() {
        renderer.print_message(&format!("Selected date: {date}"))?;
    }
    renderer.print_task_table(&controller.store().by_status(status))
}

#[instrument(skip(controller, renderer))]
async fn cmd_view<S: KeyValueStore>(
    controller: &mut ViewController<S>,
    renderer: &mut Renderer,
    status: Status,
) -> anyhow::Result<()> {
    info!("command view");

    controller.set_view(status);
    controller.persist_view().await;
    renderer.print_view_tabs(status, controller.counts())?;
    renderer.print_task_table(&controller.visible_tasks())
}

#[instrument(skip(controller, renderer, now))]
async fn cmd_advance<S: KeyValueStore>(
    controller: &mut ViewController<S>,
    renderer: &mut Renderer,
    id: TaskId,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command advance");

    match controller.advance(id, now).await {
        Some(task) => renderer.print_task_line("Advanced", &task),
        None => renderer.print_message(&format!("No task with id {id}.")),
    }
}

#[instrument(skip(controller, renderer))]
async fn cmd_delete<S: KeyValueStore>(
    controller: &mut ViewController<S>,
    renderer: &mut Renderer,
    id: TaskId,
) -> anyhow::Result<()> {
    info!("command delete");

    match controller.delete(id).await {
        Some(task) => renderer.print_task_line("Deleted", &task),
        None => renderer.print_message(&format!("No task with id {id}.")),
    }
}

#[instrument(skip(controller, renderer, args, now))]
async fn cmd_select<S: KeyValueStore>(
    controller: &mut ViewController<S>,
    renderer: &mut Renderer,
    args: SelectArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command select");

    match args.date.as_deref() {
        Some(raw) if !args.clear => {
            let date = parse_date_expr(raw, now)?;
            controller.select_date(date);
            controller.persist_view().await;
            renderer.print_message(&format!("Selected date: {date}"))
        }
        _ => {
            controller.clear_selection();
            controller.persist_view().await;
            renderer.print_message("Selection cleared.")
        }
    }
}

#[instrument(skip(controller, renderer, args, now))]
fn cmd_calendar<S: KeyValueStore>(
    controller: &mut ViewController<S>,
    renderer: &mut Renderer,
    args: CalendarArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command calendar");

    if let Some(month) = args.month {
        controller.show_month(month);
    }
    if args.shift != 0 {
        controller.shift_month(args.shift)?;
    }

    let grid = controller.month_grid(now);
    renderer.print_calendar(controller.displayed_month(), &grid)
}

#[instrument(skip(controller, renderer, now))]
fn cmd_due<S: KeyValueStore>(
    controller: &ViewController<S>,
    renderer: &mut Renderer,
    date: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command due");

    let day = parse_date_expr(date, now)?;
    debug!(%day, "resolved due date query");
    renderer.print_message(&format!("Due {day}:"))?;
    renderer.print_task_table(&controller.tasks_on(day))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::dispatch;
    use crate::calendar::CalendarMonth;
    use crate::cli::{AddArgs, CalendarArgs, Command, SelectArgs};
    use crate::config::Config;
    use crate::controller::ViewController;
    use crate::persistence::{MemoryKeyValueStore, PersistenceGateway, TASKS_KEY};
    use crate::render::Renderer;
    use crate::task::Status;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn plain_renderer() -> Renderer {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("color".to_string(), "off".to_string())]);
        Renderer::new(&cfg).expect("renderer")
    }

    async fn open() -> (ViewController<MemoryKeyValueStore>, Renderer) {
        let controller = ViewController::open(PersistenceGateway::new(MemoryKeyValueStore::new()), ymd(2024, 3, 10))
            .await
            .expect("open controller");
        (controller, plain_renderer())
    }

    fn add(text: &[&str], due: Option<&str>) -> Command {
        Command::Add(AddArgs {
            text: text.iter().map(|s| s.to_string()).collect(),
            due: due.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn add_with_due_creates_task_on_that_day_and_clears_selection() {
        let (mut controller, mut renderer) = open().await;

        dispatch(&mut controller, &mut renderer, Some(add(&["Buy", "food"], Some("2024-03-15"))))
            .await
            .expect("add");

        let due = controller.tasks_on(ymd(2024, 3, 15));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].text, "Buy food");
        assert_eq!(controller.selected_date(), None);
        assert!(controller.gateway().backend().peek(TASKS_KEY).is_some());
        assert_eq!(controller.gateway().load_view_state().await.selected_date, None);
    }

    #[tokio::test]
    async fn blank_add_is_not_an_error_and_creates_nothing() {
        let (mut controller, mut renderer) = open().await;

        dispatch(&mut controller, &mut renderer, Some(add(&["   "], None)))
            .await
            .expect("blank add");

        assert!(controller.store().is_empty());
        assert!(controller.gateway().backend().peek(TASKS_KEY).is_none());
    }

    #[tokio::test]
    async fn select_and_clear_are_saved_as_view_state() {
        let (mut controller, mut renderer) = open().await;

        let select = Command::Select(SelectArgs {
            date: Some("2024-03-20".to_string()),
            clear: false,
        });
        dispatch(&mut controller, &mut renderer, Some(select)).await.expect("select");
        assert_eq!(controller.selected_date(), Some(ymd(2024, 3, 20)));
        assert_eq!(controller.gateway().load_view_state().await.selected_date, Some(ymd(2024, 3, 20)));

        let clear = Command::Select(SelectArgs { date: None, clear: true });
        dispatch(&mut controller, &mut renderer, Some(clear)).await.expect("clear");
        assert_eq!(controller.selected_date(), None);
        assert_eq!(controller.gateway().load_view_state().await.selected_date, None);
    }

    #[tokio::test]
    async fn view_switch_is_saved_and_list_is_the_default() {
        let (mut controller, mut renderer) = open().await;

        dispatch(&mut controller, &mut renderer, Some(Command::View { status: Status::Done }))
            .await
            .expect("view");
        assert_eq!(controller.current_view(), Status::Done);
        assert_eq!(controller.gateway().load_view_state().await.current_view, Status::Done);

        dispatch(&mut controller, &mut renderer, None).await.expect("default list");
        assert_eq!(controller.current_view(), Status::Done);
        assert!(controller.gateway().backend().peek(TASKS_KEY).is_none());
    }

    #[tokio::test]
    async fn calendar_applies_month_then_shift_and_rejects_out_of_range() {
        let (mut controller, mut renderer) = open().await;

        let calendar = Command::Calendar(CalendarArgs {
            month: Some(CalendarMonth::new(2024, 12).expect("month")),
            shift: 1,
        });
        dispatch(&mut controller, &mut renderer, Some(calendar)).await.expect("calendar");
        assert_eq!(controller.displayed_month(), CalendarMonth::new(2025, 1).expect("month"));

        let too_far = Command::Calendar(CalendarArgs {
            month: None,
            shift: 4_000_000,
        });
        assert!(dispatch(&mut controller, &mut renderer, Some(too_far)).await.is_err());
        assert_eq!(controller.displayed_month(), CalendarMonth::new(2025, 1).expect("month"));
    }

    #[tokio::test]
    async fn due_accepts_dates_and_reports_bad_input() {
        let (mut controller, mut renderer) = open().await;
        dispatch(&mut controller, &mut renderer, Some(add(&["pay rent"], Some("2024-04-01"))))
            .await
            .expect("add");

        let due = Command::Due {
            date: "2024-04-01".to_string(),
        };
        dispatch(&mut controller, &mut renderer, Some(due)).await.expect("due");

        let bad = Command::Due {
            date: "someday".to_string(),
        };
        assert!(dispatch(&mut controller, &mut renderer, Some(bad)).await.is_err());
    }

    #[tokio::test]
    async fn advance_and_delete_follow_the_task_and_ignore_unknown_ids() {
        let (mut controller, mut renderer) = open().await;
        dispatch(&mut controller, &mut renderer, Some(add(&["walk"], None)))
            .await
            .expect("add");
        let id = controller.store().tasks()[0].id;

        dispatch(&mut controller, &mut renderer, Some(Command::Advance { id }))
            .await
            .expect("advance");
        assert_eq!(controller.store().get(id).map(|t| t.status), Some(Status::Doing));

        dispatch(&mut controller, &mut renderer, Some(Command::Advance { id: id + 100 }))
            .await
            .expect("unknown advance");
        dispatch(&mut controller, &mut renderer, Some(Command::Delete { id }))
            .await
            .expect("delete");
        assert!(controller.store().is_empty());
        dispatch(&mut controller, &mut renderer, Some(Command::Delete { id }))
            .await
            .expect("unknown delete");
    }
}
