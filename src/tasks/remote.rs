use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::{Task, TaskDraft, TaskPatch, TaskRepository, next_sort_order, sort_tasks};
use crate::error::TaskError;

const TASKS_TABLE: &str = "tasks";
const COMPLETIONS_TABLE: &str = "user_tasks";

#[derive(Debug, Serialize)]
struct NewTaskRow<'a> {
    title: &'a str,
    description: &'a str,
    reward: f64,
    link: Option<&'a str>,
    time_required: u32,
    completed: bool,
    sort_order: i64,
}

impl<'a> NewTaskRow<'a> {
    fn new(draft: &'a TaskDraft, sort_order: i64) -> Self {
        Self {
            title: &draft.title,
            description: &draft.description,
            reward: draft.reward,
            link: draft.link.as_deref(),
            time_required: draft.time_required,
            completed: false,
            sort_order,
        }
    }
}

#[derive(Debug, Serialize)]
struct PatchRow<'a> {
    #[serde(flatten)]
    patch: &'a TaskPatch,
    updated_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompletionRow {
    user_id: String,
    task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<chrono::DateTime<Utc>>,
}

/// Task table behind a PostgREST-style HTTP API (e.g. a Supabase project).
pub struct RemoteTaskRepository {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteTaskRepository {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, TaskError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }

    fn completion_filter(user_id: &str, task_id: &str) -> [(&'static str, String); 2] {
        [
            ("user_id", format!("eq.{user_id}")),
            ("task_id", format!("eq.{task_id}")),
        ]
    }
}

impl TaskRepository for RemoteTaskRepository {
    fn list(&self) -> Result<Vec<Task>, TaskError> {
        let request = self
            .client
            .get(self.table_url(TASKS_TABLE))
            .query(&[("select", "*"), ("order", "sort_order.asc.nullslast")]);
        let mut tasks: Vec<Task> = self
            .authorize(request)
            .send()?
            .error_for_status()?
            .json()?;
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    fn create(&mut self, draft: TaskDraft) -> Result<Task, TaskError> {
        let sort_order = match draft.sort_order {
            Some(order) => order,
            None => next_sort_order(&self.list()?),
        };
        let row = NewTaskRow::new(&draft, sort_order);
        let request = self
            .client
            .post(self.table_url(TASKS_TABLE))
            .header("Prefer", "return=representation")
            .json(&row);
        let mut created: Vec<Task> = self
            .authorize(request)
            .send()?
            .error_for_status()?
            .json()?;
        created
            .pop()
            .ok_or_else(|| TaskError::NotFound(draft.title.clone()))
    }

    fn update(&mut self, id: &str, patch: TaskPatch) -> Result<Task, TaskError> {
        let row = PatchRow {
            patch: &patch,
            updated_at: Utc::now(),
        };
        let request = self
            .client
            .patch(self.table_url(TASKS_TABLE))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&row);
        let mut updated: Vec<Task> = self
            .authorize(request)
            .send()?
            .error_for_status()?
            .json()?;
        updated.pop().ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    fn delete(&mut self, id: &str) -> Result<(), TaskError> {
        let completions = self
            .client
            .delete(self.table_url(COMPLETIONS_TABLE))
            .query(&[("task_id", format!("eq.{id}"))]);
        self.authorize(completions).send()?.error_for_status()?;

        let request = self
            .client
            .delete(self.table_url(TASKS_TABLE))
            .query(&[("id", format!("eq.{id}"))]);
        self.authorize(request).send()?.error_for_status()?;
        Ok(())
    }

    fn complete(&mut self, user_id: &str, task_id: &str) -> Result<bool, TaskError> {
        let existing = self
            .client
            .get(self.table_url(COMPLETIONS_TABLE))
            .query(&Self::completion_filter(user_id, task_id))
            .query(&[("select", "user_id,task_id")]);
        let rows: Vec<CompletionRow> = self
            .authorize(existing)
            .send()?
            .error_for_status()?
            .json()?;
        if !rows.is_empty() {
            return Ok(false);
        }

        let row = CompletionRow {
            user_id: user_id.to_string(),
            task_id: task_id.to_string(),
            completed_at: Some(Utc::now()),
        };
        let request = self
            .client
            .post(self.table_url(COMPLETIONS_TABLE))
            .json(&row);
        let response = self.authorize(request).send()?;
        // A foreign-key violation means the task does not exist.
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(TaskError::NotFound(task_id.to_string()));
        }
        response.error_for_status()?;
        Ok(true)
    }

    fn uncomplete(&mut self, user_id: &str, task_id: &str) -> Result<(), TaskError> {
        let request = self
            .client
            .delete(self.table_url(COMPLETIONS_TABLE))
            .query(&Self::completion_filter(user_id, task_id));
        self.authorize(request).send()?.error_for_status()?;
        Ok(())
    }

    fn completed(&self, user_id: &str) -> Result<Vec<String>, TaskError> {
        let request = self
            .client
            .get(self.table_url(COMPLETIONS_TABLE))
            .query(&[("user_id", format!("eq.{user_id}"))])
            .query(&[("select", "user_id,task_id")]);
        let rows: Vec<CompletionRow> = self
            .authorize(request)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(rows.into_iter().map(|r| r.task_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_urls_drop_trailing_slash() {
        let repo = RemoteTaskRepository::new("https://demo.supabase.co/rest/v1/", None).unwrap();
        assert_eq!(
            repo.table_url(TASKS_TABLE),
            "https://demo.supabase.co/rest/v1/tasks"
        );
    }

    #[test]
    fn patch_row_flattens_patch() {
        let patch = TaskPatch {
            title: Some("New".into()),
            ..TaskPatch::default()
        };
        let row = PatchRow {
            patch: &patch,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["title"], "New");
        assert!(json.get("reward").is_none());
        assert!(json.get("updated_at").is_some());
    }

    #[test]
    fn new_rows_carry_an_explicit_order() {
        let draft = TaskDraft {
            title: "Share".into(),
            description: String::new(),
            reward: 0.01,
            link: None,
            time_required: 1,
            sort_order: None,
        };
        let json = serde_json::to_value(NewTaskRow::new(&draft, 4)).unwrap();
        assert_eq!(json["sort_order"], 4);
        assert_eq!(json["completed"], false);
        assert!(json["link"].is_null());
    }

    #[test]
    fn requests_carry_api_key() {
        let repo =
            RemoteTaskRepository::new("https://demo.supabase.co/rest/v1", Some("k3y".into()))
                .unwrap();
        let request = repo
            .authorize(repo.client.get(repo.table_url(TASKS_TABLE)))
            .build()
            .unwrap();
        assert_eq!(request.headers()["apikey"], "k3y");
        assert_eq!(request.headers()["Authorization"], "Bearer k3y");
    }
}
