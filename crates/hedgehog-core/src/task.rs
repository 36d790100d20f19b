use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TaskId = u64;

/// Workflow state of a task. Advancing cycles `todo -> doing -> done -> todo`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Todo,
    Doing,
    Done,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Todo, Status::Doing, Status::Done];

    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Status::Todo => Status::Doing,
            Status::Doing => Status::Done,
            Status::Done => Status::Todo,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::Doing => "doing",
            Status::Done => "done",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(Status::Todo),
            "doing" => Ok(Status::Doing),
            "done" => Ok(Status::Done),
            other => Err(anyhow!("unknown status: {other} (expected todo, doing or done)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub text: String,

    pub status: Status,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new_todo(id: TaskId, text: String, due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            text,
            status: Status::Todo,
            created_at: now,
            due_date,
            completed_at: None,
        }
    }

    /// Moves the task one step along the status cycle.
    ///
    /// `completed_at` is stamped on entering `done` and cleared on leaving it.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Status {
        self.status = self.status.next();
        self.completed_at = match self.status {
            Status::Done => Some(now),
            Status::Todo | Status::Doing => None,
        };
        self.status
    }

    pub fn is_done(&self) -> bool {
        self.status == Status::Done
    }
}
