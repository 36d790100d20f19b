use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::calendar::{CalendarMonth, is_same_day, is_today_at};
use crate::datetime::project_midnight;
use crate::error::PersistenceError;
use crate::persistence::{KeyValueStore, LoadOutcome, PersistenceGateway, ViewState};
use crate::store::{StatusCounts, TaskStore};
use crate::task::{Status, Task, TaskId};

/// Status markers drawn inside a single calendar cell.
pub const MAX_DAY_MARKERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCell {
    pub date: NaiveDate,
    pub is_today: bool,
    pub is_selected: bool,
    pub markers: Vec<Status>,
}

/// UI-facing state plus the task store it drives.
///
/// Every mutation lands in memory first and then saves the full current
/// snapshot. A failed save is logged and never undoes the mutation.
#[derive(Debug)]
pub struct ViewController<S> {
    store: TaskStore,
    gateway: PersistenceGateway<S>,
    current_view: Status,
    selected_date: Option<NaiveDate>,
    displayed_month: CalendarMonth,
}

impl<S: KeyValueStore> ViewController<S> {
    /// Restores tasks and view preferences. Unreadable task data is returned
    /// as [`PersistenceError::CorruptState`] rather than replaced.
    #[tracing::instrument(skip(gateway))]
    pub async fn open(gateway: PersistenceGateway<S>, today: NaiveDate) -> Result<Self, PersistenceError> {
        let outcome = gateway.load().await?;
        if outcome == LoadOutcome::NoPriorState {
            debug!("starting with an empty task list");
        }
        let store = TaskStore::from_tasks(outcome.into_tasks());
        let view = gateway.load_view_state().await;

        info!(
            tasks = store.len(),
            view = %view.current_view,
            selected = ?view.selected_date,
            "view controller ready"
        );

        Ok(Self {
            store,
            gateway,
            current_view: view.current_view,
            selected_date: view.selected_date,
            displayed_month: CalendarMonth::containing(today),
        })
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn gateway(&self) -> &PersistenceGateway<S> {
        &self.gateway
    }

    pub fn current_view(&self) -> Status {
        self.current_view
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.selected_date
    }

    pub fn displayed_month(&self) -> CalendarMonth {
        self.displayed_month
    }

    pub fn set_view(&mut self, status: Status) {
        debug!(%status, "switching view");
        self.current_view = status;
    }

    pub fn select_date(&mut self, date: NaiveDate) {
        debug!(%date, "selecting date");
        self.selected_date = Some(date);
    }

    pub fn clear_selection(&mut self) {
        self.selected_date = None;
    }

    pub fn show_month(&mut self, month: CalendarMonth) {
        self.displayed_month = month;
    }

    /// Leaves the displayed month unchanged when the move is out of range.
    pub fn shift_month(&mut self, delta: i32) -> anyhow::Result<()> {
        self.displayed_month = self.displayed_month.shift(delta)?;
        debug!(delta, month = %self.displayed_month, "shifted displayed month");
        Ok(())
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        self.store.by_status(self.current_view)
    }

    pub fn counts(&self) -> StatusCounts {
        self.store.counts()
    }

    pub fn tasks_on(&self, date: NaiveDate) -> Vec<&Task> {
        self.store.by_due_date(&date)
    }

    /// Cells of the displayed month, `None` for leading blanks.
    pub fn month_grid(&self, now: DateTime<Utc>) -> Vec<Option<DayCell>> {
        self.displayed_month
            .days()
            .into_iter()
            .map(|slot| {
                slot.map(|date| DayCell {
                    date,
                    is_today: is_today_at(Some(&date), now),
                    is_selected: is_same_day(Some(&date), self.selected_date.as_ref()),
                    markers: self
                        .store
                        .by_due_date(&date)
                        .into_iter()
                        .take(MAX_DAY_MARKERS)
                        .map(|t| t.status)
                        .collect(),
                })
            })
            .collect()
    }

    /// Creates a task due on the selected date, if any, then clears the
    /// selection. Blank text creates nothing and saves nothing.
    #[tracing::instrument(skip(self, text, now))]
    pub async fn add_task(&mut self, text: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Task>> {
        let due_date = self.selected_date.map(project_midnight).transpose()?;

        let Some(task) = self.store.create(text, due_date, now) else {
            return Ok(None);
        };

        let had_selection = self.selected_date.take().is_some();
        self.persist_tasks().await;
        if had_selection {
            self.persist_view().await;
        }
        Ok(Some(task))
    }

    #[tracing::instrument(skip(self, now))]
    pub async fn advance(&mut self, id: TaskId, now: DateTime<Utc>) -> Option<Task> {
        let advanced = self.store.advance(id, now).cloned();
        self.persist_tasks().await;
        advanced
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&mut self, id: TaskId) -> Option<Task> {
        let removed = self.store.delete(id);
        self.persist_tasks().await;
        removed
    }

    /// Saves the current view and selection; failures are only logged.
    pub async fn persist_view(&self) -> bool {
        let state = ViewState {
            current_view: self.current_view,
            selected_date: self.selected_date,
        };
        match self.gateway.save_view_state(&state).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %format_error_chain(&err), "view state not saved");
                false
            }
        }
    }

    async fn persist_tasks(&self) -> bool {
        match self.gateway.save(self.store.tasks()).await {
            Ok(()) => true,
            Err(err) => {
                error!(
                    error = %format_error_chain(&err),
                    tasks = self.store.len(),
                    "tasks not saved; changes are kept in memory only"
                );
                false
            }
        }
    }
}

fn format_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    use super::{MAX_DAY_MARKERS, ViewController};
    use crate::calendar::CalendarMonth;
    use crate::error::PersistenceError;
    use crate::persistence::{
        KeyValueStore, MemoryKeyValueStore, PersistenceGateway, TASKS_KEY, decode_tasks,
    };
    use crate::task::Status;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).single().expect("valid time")
    }

    /// Backend whose writes can be switched off mid-test.
    #[derive(Default)]
    struct Flaky {
        inner: MemoryKeyValueStore,
        offline: AtomicBool,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl KeyValueStore for Flaky {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.set(key, value).await
        }
    }

    async fn open_empty() -> ViewController<MemoryKeyValueStore> {
        ViewController::open(PersistenceGateway::new(MemoryKeyValueStore::new()), ymd(2024, 3, 10))
            .await
            .expect("open controller")
    }

    fn stored(controller: &ViewController<MemoryKeyValueStore>) -> Vec<crate::task::Task> {
        let raw = controller.gateway.backend().peek(TASKS_KEY).expect("blob saved");
        decode_tasks(&raw).expect("decode saved blob")
    }

    #[tokio::test]
    async fn defaults_to_todo_view_and_current_month() {
        let controller = open_empty().await;
        assert_eq!(controller.current_view(), Status::Todo);
        assert_eq!(controller.selected_date(), None);
        assert_eq!(controller.displayed_month(), CalendarMonth::new(2024, 3).expect("month"));
        assert!(controller.visible_tasks().is_empty());
    }

    #[tokio::test]
    async fn buy_food_scenario_cycles_and_persists_each_step() {
        let mut controller = open_empty().await;
        controller.select_date(ymd(2024, 3, 15));

        let task = controller.add_task("Buy food", at(10, 9)).await.expect("add").expect("created");
        assert_eq!(task.status, Status::Todo);
        assert!(task.due_date.is_some());
        assert_eq!(controller.selected_date(), None);
        assert_eq!(stored(&controller), controller.store().tasks().to_vec());

        let doing = controller.advance(task.id, at(10, 10)).await.expect("doing");
        assert_eq!(doing.status, Status::Doing);
        assert_eq!(doing.completed_at, None);

        let done = controller.advance(task.id, at(10, 11)).await.expect("done");
        assert_eq!(done.status, Status::Done);
        assert_eq!(done.completed_at, Some(at(10, 11)));
        assert_eq!(stored(&controller)[0].completed_at, Some(at(10, 11)));

        let todo = controller.advance(task.id, at(10, 12)).await.expect("todo");
        assert_eq!(todo.status, Status::Todo);
        assert_eq!(todo.completed_at, None);
        assert_eq!(stored(&controller)[0].status, Status::Todo);
    }

    #[tokio::test]
    async fn blank_text_keeps_selection_and_writes_nothing() {
        let mut controller = open_empty().await;
        controller.select_date(ymd(2024, 3, 15));

        let created = controller.add_task("   ", at(10, 9)).await.expect("add");
        assert!(created.is_none());
        assert_eq!(controller.selected_date(), Some(ymd(2024, 3, 15)));
        assert!(controller.gateway.backend().peek(TASKS_KEY).is_none());
    }

    #[tokio::test]
    async fn visible_tasks_follow_current_view() {
        let mut controller = open_empty().await;
        let a = controller.add_task("a", at(10, 9)).await.expect("add").expect("a");
        controller.add_task("b", at(10, 9)).await.expect("add");
        controller.advance(a.id, at(10, 10)).await;

        assert_eq!(controller.visible_tasks().len(), 1);
        controller.set_view(Status::Doing);
        let visible: Vec<_> = controller.visible_tasks().iter().map(|t| t.id).collect();
        assert_eq!(visible, vec![a.id]);
        assert_eq!(controller.counts().get(Status::Doing), 1);
    }

    #[tokio::test]
    async fn shift_month_crosses_year_end() {
        let mut controller =
            ViewController::open(PersistenceGateway::new(MemoryKeyValueStore::new()), ymd(2024, 12, 20))
                .await
                .expect("open");
        controller.shift_month(1).expect("shift");
        assert_eq!(controller.displayed_month(), CalendarMonth::new(2025, 1).expect("month"));
        controller.shift_month(-1).expect("shift");
        controller.shift_month(-1).expect("shift");
        assert_eq!(controller.displayed_month(), CalendarMonth::new(2024, 11).expect("month"));

        assert!(controller.shift_month(i32::MAX).is_err());
        assert_eq!(controller.displayed_month(), CalendarMonth::new(2024, 11).expect("month"));
    }

    #[tokio::test]
    async fn month_grid_marks_today_selection_and_caps_markers() {
        let mut controller = open_empty().await;
        for text in ["one", "two", "three", "four"] {
            controller.select_date(ymd(2024, 3, 15));
            controller.add_task(text, at(10, 9)).await.expect("add");
        }
        controller.select_date(ymd(2024, 3, 20));

        let grid = controller.month_grid(at(10, 12));
        // March 2024 starts on a Friday.
        assert_eq!(grid.iter().take_while(|c| c.is_none()).count(), 4);

        let cells: Vec<_> = grid.into_iter().flatten().collect();
        assert_eq!(cells.len(), 31);
        assert!(cells[9].is_today);
        assert_eq!(cells[14].markers.len(), MAX_DAY_MARKERS);
        assert!(cells[19].is_selected);
        assert!(cells[0].markers.is_empty());
        assert_eq!(controller.tasks_on(ymd(2024, 3, 15)).len(), 4);
    }

    #[tokio::test]
    async fn save_failure_keeps_in_memory_state_and_retries_on_next_write() {
        let flaky = Flaky::default();
        let mut controller = ViewController::open(PersistenceGateway::new(flaky), ymd(2024, 3, 10))
            .await
            .expect("open");

        controller.gateway.backend().offline.store(true, Ordering::SeqCst);
        let task = controller.add_task("offline", at(10, 9)).await.expect("add").expect("created");
        assert_eq!(controller.store().len(), 1);
        assert!(controller.gateway.backend().inner.peek(TASKS_KEY).is_none());

        controller.gateway.backend().offline.store(false, Ordering::SeqCst);
        controller.advance(task.id, at(10, 10)).await;
        let raw = controller.gateway.backend().inner.peek(TASKS_KEY).expect("saved after recovery");
        let saved = decode_tasks(&raw).expect("decode");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].status, Status::Doing);
        assert_eq!(controller.gateway.backend().writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn corrupt_blob_refuses_to_open() {
        let backend = MemoryKeyValueStore::new();
        backend.insert(TASKS_KEY, "[{\"id\":");
        let result = ViewController::open(PersistenceGateway::new(backend), ymd(2024, 3, 10)).await;
        assert!(matches!(result, Err(PersistenceError::CorruptState { .. })));
    }

    #[tokio::test]
    async fn view_preferences_survive_reopen() {
        let backend = MemoryKeyValueStore::new();
        let mut controller = ViewController::open(PersistenceGateway::new(backend), ymd(2024, 3, 10))
            .await
            .expect("open");
        controller.set_view(Status::Done);
        controller.select_date(ymd(2024, 3, 22));
        assert!(controller.persist_view().await);

        let gateway = controller.gateway;
        let reopened = ViewController::open(gateway, ymd(2024, 3, 10)).await.expect("reopen");
        assert_eq!(reopened.current_view(), Status::Done);
        assert_eq!(reopened.selected_date(), Some(ymd(2024, 3, 22)));
    }
}
