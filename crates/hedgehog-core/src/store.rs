use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::calendar::{CalendarDate, is_same_day};
use crate::task::{Status, Task, TaskId};

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub todo: usize,
    pub doing: usize,
    pub done: usize,
}

impl StatusCounts {
    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Todo => self.todo,
            Status::Doing => self.doing,
            Status::Done => self.done,
        }
    }

    pub fn total(&self) -> usize {
        self.todo + self.doing + self.done
    }
}

/// Ordered, in-memory task collection. The only owner of its tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    next_id: TaskId,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::from_tasks(Vec::new())
    }

    /// Builds a store around a restored snapshot, keeping its order.
    ///
    /// Fresh ids continue above the largest restored id. A completion time on
    /// an unfinished task is dropped, and a repeated id is given a fresh one.
    pub fn from_tasks(mut tasks: Vec<Task>) -> Self {
        let mut next_id = tasks.iter().map(|t| t.id).max().unwrap_or(0).saturating_add(1);
        let mut seen = HashSet::with_capacity(tasks.len());

        for task in &mut tasks {
            if !task.is_done() && task.completed_at.take().is_some() {
                warn!(id = task.id, status = %task.status, "dropped completion time from unfinished task");
            }
            if !seen.insert(task.id) {
                warn!(old = task.id, new = next_id, "reassigned duplicate task id");
                task.id = next_id;
                next_id = next_id.saturating_add(1);
                seen.insert(task.id);
            }
        }

        debug!(count = tasks.len(), next_id, "built task store");
        Self { tasks, next_id }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Appends a new `todo` task. Text that is empty after trimming is
    /// rejected without creating anything.
    #[tracing::instrument(skip(self, text, now), fields(text_len = text.len(), has_due = due_date.is_some()))]
    pub fn create(&mut self, text: &str, due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Task> {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring task with empty text");
            return None;
        }

        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);

        let task = Task::new_todo(id, text.to_string(), due_date, now);
        self.tasks.push(task.clone());
        info!(id, count = self.tasks.len(), "task created");
        Some(task)
    }

    /// Moves the matching task one step along the status cycle.
    #[tracing::instrument(skip(self, now))]
    pub fn advance(&mut self, id: TaskId, now: DateTime<Utc>) -> Option<&Task> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "advance on unknown task; nothing to do");
            return None;
        };

        let from = task.status;
        let to = task.advance(now);
        info!(id, %from, %to, "task advanced");
        Some(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, id: TaskId) -> Option<Task> {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            debug!(id, "delete on unknown task; nothing to do");
            return None;
        };

        let removed = self.tasks.remove(idx);
        info!(id, count = self.tasks.len(), "task deleted");
        Some(removed)
    }

    pub fn by_status(&self, status: Status) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    /// Tasks due on the same calendar day as `date`, in store order.
    pub fn by_due_date<D: CalendarDate + ?Sized>(&self, date: &D) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| is_same_day(t.due_date.as_ref(), Some(date)))
            .collect()
    }

    pub fn count_by_status(&self, status: Status) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn counts(&self) -> StatusCounts {
        self.tasks.iter().fold(StatusCounts::default(), |mut acc, task| {
            match task.status {
                Status::Todo => acc.todo += 1,
                Status::Doing => acc.doing += 1,
                Status::Done => acc.done += 1,
            }
            acc
        })
    }
}
