use std::collections::HashMap;

use chrono::Utc;
use serde::de::DeserializeOwned;

use super::{Task, TaskDraft, TaskPatch, TaskRepository, default_catalogue, next_sort_order, sort_tasks};
use crate::error::{StoreError, TaskError};
use crate::store::KeyValueStore;

pub const TASKS_KEY: &str = "app_tasks";
pub const COMPLETED_KEY: &str = "completed_tasks";

type CompletedMap = HashMap<String, Vec<String>>;

/// Tasks kept in the local key/value store. The first read of an empty
/// store seeds the default catalogue.
pub struct LocalTaskRepository<S> {
    store: S,
}

impl<S: KeyValueStore> LocalTaskRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<Option<T>, TaskError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, "ignoring malformed task record: {e}");
                Ok(Some(T::default()))
            }
        }
    }

    fn load_tasks(&self) -> Result<Vec<Task>, TaskError> {
        match self.read::<Vec<Task>>(TASKS_KEY)? {
            Some(tasks) => Ok(tasks),
            None => {
                let tasks = default_catalogue(Utc::now());
                self.save_tasks(&tasks)?;
                tracing::info!(count = tasks.len(), "seeded default task catalogue");
                Ok(tasks)
            }
        }
    }

    fn save_tasks(&self, tasks: &[Task]) -> Result<(), TaskError> {
        let json = serde_json::to_string(tasks).map_err(StoreError::from)?;
        self.store.set(TASKS_KEY, &json)?;
        Ok(())
    }

    fn load_completed(&self) -> Result<CompletedMap, TaskError> {
        Ok(self.read::<CompletedMap>(COMPLETED_KEY)?.unwrap_or_default())
    }

    fn save_completed(&self, completed: &CompletedMap) -> Result<(), TaskError> {
        let json = serde_json::to_string(completed).map_err(StoreError::from)?;
        self.store.set(COMPLETED_KEY, &json)?;
        Ok(())
    }
}

impl<S: KeyValueStore> TaskRepository for LocalTaskRepository<S> {
    fn list(&self) -> Result<Vec<Task>, TaskError> {
        let mut tasks = self.load_tasks()?;
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    fn create(&mut self, draft: TaskDraft) -> Result<Task, TaskError> {
        let mut tasks = self.load_tasks()?;
        let task = Task::from_draft(draft, next_sort_order(&tasks), Utc::now());
        tasks.push(task.clone());
        self.save_tasks(&tasks)?;
        Ok(task)
    }

    fn update(&mut self, id: &str, patch: TaskPatch) -> Result<Task, TaskError> {
        let mut tasks = self.load_tasks()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        task.apply(patch, Utc::now());
        let updated = task.clone();
        self.save_tasks(&tasks)?;
        Ok(updated)
    }

    fn delete(&mut self, id: &str) -> Result<(), TaskError> {
        let mut tasks = self.load_tasks()?;
        tasks.retain(|t| t.id != id);
        self.save_tasks(&tasks)?;

        let mut completed = self.load_completed()?;
        for done in completed.values_mut() {
            done.retain(|t| t != id);
        }
        self.save_completed(&completed)
    }

    fn complete(&mut self, user_id: &str, task_id: &str) -> Result<bool, TaskError> {
        if !self.load_tasks()?.iter().any(|t| t.id == task_id) {
            return Err(TaskError::NotFound(task_id.to_string()));
        }
        let mut completed = self.load_completed()?;
        let done = completed.entry(user_id.to_string()).or_default();
        if done.iter().any(|t| t == task_id) {
            return Ok(false);
        }
        done.push(task_id.to_string());
        self.save_completed(&completed)?;
        Ok(true)
    }

    fn uncomplete(&mut self, user_id: &str, task_id: &str) -> Result<(), TaskError> {
        let mut completed = self.load_completed()?;
        if let Some(done) = completed.get_mut(user_id) {
            done.retain(|t| t != task_id);
        }
        self.save_completed(&completed)
    }

    fn completed(&self, user_id: &str) -> Result<Vec<String>, TaskError> {
        Ok(self.load_completed()?.remove(user_id).unwrap_or_default())
    }
}
