use serde::{Deserialize, Deserializer};
use time::OffsetDateTime;

use super::repo_types::{NewTask, Priority, Recurrence, Task, TaskFilter};
use crate::error::{AppError, AppResult};

/// Tags arrive either as a JSON array or as one comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Csv(String),
}

impl TagsInput {
    pub fn into_tags(self) -> Vec<String> {
        let raw: Vec<String> = match self {
            TagsInput::List(list) => list,
            TagsInput::Csv(csv) => csv.split(',').map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub tags: Option<TagsInput>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deadline: Option<OffsetDateTime>,
    pub recurring: Option<Recurrence>,
}

/// Partial update. An absent field keeps its value; `null` clears the nullable ones.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub tags: Option<TagsInput>,
    #[serde(default, deserialize_with = "nullable_rfc3339")]
    pub deadline: Option<Option<OffsetDateTime>>,
    pub recurring: Option<Recurrence>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

fn nullable<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

fn nullable_rfc3339<'de, D>(de: D) -> Result<Option<Option<OffsetDateTime>>, D::Error>
where
    D: Deserializer<'de>,
{
    time::serde::rfc3339::option::deserialize(de).map(Some)
}

fn clean_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl CreateTaskRequest {
    pub fn into_new_task(self) -> AppResult<NewTask> {
        let title = clean_text(self.title)
            .ok_or_else(|| AppError::Validation("Please add a title".into()))?;
        Ok(NewTask {
            title,
            description: clean_text(self.description),
            priority: self.priority.unwrap_or_default(),
            tags: self.tags.map(TagsInput::into_tags).unwrap_or_default(),
            deadline: self.deadline,
            recurring: self.recurring.unwrap_or_default(),
        })
    }
}

impl UpdateTaskRequest {
    /// Merges the present fields into `task`. A blank title keeps the old one.
    pub fn apply(self, task: &mut Task) {
        if let Some(title) = clean_text(self.title) {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = clean_text(description);
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(tags) = self.tags {
            task.tags = tags.into_tags();
        }
        if let Some(deadline) = self.deadline {
            task.deadline = deadline;
        }
        if let Some(recurring) = self.recurring {
            task.recurring = recurring;
        }
    }
}

impl FilterQuery {
    pub fn into_filter(self) -> AppResult<TaskFilter> {
        let priority = clean_text(self.priority)
            .map(|p| {
                p.to_lowercase()
                    .parse::<Priority>()
                    .map_err(|_| AppError::Validation(format!("Unknown priority {p:?}")))
            })
            .transpose()?;
        Ok(TaskFilter {
            completed: clean_text(self.status).map(|s| s.eq_ignore_ascii_case("completed")),
            priority,
            tag: clean_text(self.tag),
            search: clean_text(self.search),
        })
    }
}
