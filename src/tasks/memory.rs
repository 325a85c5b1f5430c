use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use super::{Task, TaskDraft, TaskPatch, TaskRepository, default_catalogue, next_sort_order, sort_tasks};
use crate::error::TaskError;

#[derive(Debug, Default)]
pub struct MemoryTaskRepository {
    tasks: Vec<Task>,
    completed: HashMap<String, BTreeSet<String>>,
}

impl MemoryTaskRepository {
    pub fn with_defaults(now: DateTime<Utc>) -> Self {
        Self {
            tasks: default_catalogue(now),
            completed: HashMap::new(),
        }
    }

    fn position(&self, id: &str) -> Result<usize, TaskError> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }
}

impl TaskRepository for MemoryTaskRepository {
    fn list(&self) -> Result<Vec<Task>, TaskError> {
        let mut tasks = self.tasks.clone();
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    fn create(&mut self, draft: TaskDraft) -> Result<Task, TaskError> {
        let task = Task::from_draft(draft, next_sort_order(&self.tasks), Utc::now());
        self.tasks.push(task.clone());
        Ok(task)
    }

    fn update(&mut self, id: &str, patch: TaskPatch) -> Result<Task, TaskError> {
        let idx = self.position(id)?;
        let task = &mut self.tasks[idx];
        task.apply(patch, Utc::now());
        Ok(task.clone())
    }

    fn delete(&mut self, id: &str) -> Result<(), TaskError> {
        self.tasks.retain(|t| t.id != id);
        for done in self.completed.values_mut() {
            done.remove(id);
        }
        Ok(())
    }

    fn complete(&mut self, user_id: &str, task_id: &str) -> Result<bool, TaskError> {
        self.position(task_id)?;
        Ok(self
            .completed
            .entry(user_id.to_string())
            .or_default()
            .insert(task_id.to_string()))
    }

    fn uncomplete(&mut self, user_id: &str, task_id: &str) -> Result<(), TaskError> {
        if let Some(done) = self.completed.get_mut(user_id) {
            done.remove(task_id);
        }
        Ok(())
    }

    fn completed(&self, user_id: &str) -> Result<Vec<String>, TaskError> {
        Ok(self
            .completed
            .get(user_id)
            .map(|done| done.iter().cloned().collect())
            .unwrap_or_default())
    }
}
