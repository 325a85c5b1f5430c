//! Social/marketing tasks that pay a one-off reward.
//!
//! One [`TaskRepository`] port with three adapters: [`MemoryTaskRepository`]
//! for tests and throwaway sessions, [`LocalTaskRepository`] on the local key
//! value store, and [`RemoteTaskRepository`] against the hosted task table.

mod local;
mod memory;
mod remote;

use std::rc::Rc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

use crate::config::{TaskBackend, TaskConfig};
use crate::error::TaskError;
use crate::store::KeyValueStore;

pub use local::LocalTaskRepository;
pub use memory::MemoryTaskRepository;
pub use remote::RemoteTaskRepository;

const ID_ALPHABET: &[char] = &[
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub reward: f64,
    pub link: Option<String>,
    /// Minutes the task is expected to take.
    pub time_required: u32,
    pub completed: bool,
    pub sort_order: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub reward: f64,
    pub link: Option<String>,
    pub time_required: u32,
    pub sort_order: Option<i64>,
}

/// Partial update; `None` leaves a field alone. `link: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_required: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
}

impl Task {
    fn from_draft(draft: TaskDraft, fallback_order: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: new_task_id(),
            title: draft.title,
            description: draft.description,
            reward: draft.reward,
            link: draft.link,
            time_required: draft.time_required,
            completed: false,
            sort_order: Some(draft.sort_order.unwrap_or(fallback_order)),
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, patch: TaskPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(reward) = patch.reward {
            self.reward = reward;
        }
        if let Some(link) = patch.link {
            self.link = link;
        }
        if let Some(minutes) = patch.time_required {
            self.time_required = minutes;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(order) = patch.sort_order {
            self.sort_order = Some(order);
        }
        self.updated_at = now;
    }
}

pub trait TaskRepository {
    /// All tasks ordered by `sort_order`, unordered ones last.
    fn list(&self) -> Result<Vec<Task>, TaskError>;
    fn create(&mut self, draft: TaskDraft) -> Result<Task, TaskError>;
    fn update(&mut self, id: &str, patch: TaskPatch) -> Result<Task, TaskError>;
    /// Removes the task and any completion records pointing at it.
    fn delete(&mut self, id: &str) -> Result<(), TaskError>;
    /// Returns `true` the first time `user_id` completes the task.
    fn complete(&mut self, user_id: &str, task_id: &str) -> Result<bool, TaskError>;
    fn uncomplete(&mut self, user_id: &str, task_id: &str) -> Result<(), TaskError>;
    fn completed(&self, user_id: &str) -> Result<Vec<String>, TaskError>;
}

pub fn open_repository(
    config: &TaskConfig,
    store: Rc<dyn KeyValueStore>,
) -> Result<Box<dyn TaskRepository>> {
    let repo: Box<dyn TaskRepository> = match config.backend {
        TaskBackend::Memory => Box::new(MemoryTaskRepository::with_defaults(Utc::now())),
        TaskBackend::Local => Box::new(LocalTaskRepository::new(store)),
        TaskBackend::Remote => {
            let url = config
                .remote_url
                .as_deref()
                .context("tasks.remote_url is not set")?;
            Box::new(RemoteTaskRepository::new(url, config.api_key.clone())?)
        }
    };
    Ok(repo)
}

pub fn new_task_id() -> String {
    format!("task_{}", nanoid!(12, ID_ALPHABET))
}

fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by_key(|t| (t.sort_order.is_none(), t.sort_order.unwrap_or(0)));
}

fn next_sort_order(tasks: &[Task]) -> i64 {
    tasks.len() as i64 + 1
}

/// Starter catalogue for a fresh local install.
pub fn default_catalogue(now: DateTime<Utc>) -> Vec<Task> {
    let drafts = [
        TaskDraft {
            title: "Join Telegram Channel".into(),
            description: "Join our official Telegram channel for updates".into(),
            reward: 0.01,
            link: Some("https://t.me/toncoin".into()),
            time_required: 2,
            sort_order: Some(1),
        },
        TaskDraft {
            title: "Follow on Twitter".into(),
            description: "Follow our Twitter account for latest news".into(),
            reward: 0.005,
            link: Some("https://twitter.com/ton_blockchain".into()),
            time_required: 1,
            sort_order: Some(2),
        },
        TaskDraft {
            title: "Daily Check-in".into(),
            description: "Complete your daily check-in".into(),
            reward: 0.002,
            link: None,
            time_required: 1,
            sort_order: Some(3),
        },
    ];
    drafts
        .into_iter()
        .enumerate()
        .map(|(idx, draft)| Task::from_draft(draft, idx as i64 + 1, now))
        .collect()
}
