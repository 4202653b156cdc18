use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::ownership::Owned;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl Recurrence {
    pub fn as_str(self) -> &'static str {
        match self {
            Recurrence::None => "none",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => anyhow::bail!("unknown priority {other:?}"),
        }
    }
}

impl FromStr for Recurrence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Recurrence::None),
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            other => anyhow::bail!("unknown recurrence {other:?}"),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row as stored; enums are kept as text columns.
#[derive(Debug, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: String,
    pub tags: Vec<String>,
    pub deadline: Option<OffsetDateTime>,
    pub recurring: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: Priority,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deadline: Option<OffsetDateTime>,
    pub recurring: Recurrence,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Owned for Task {
    fn owner_id(&self) -> Uuid {
        self.owner
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = anyhow::Error;

    fn try_from(r: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            owner: r.user_id,
            title: r.title,
            description: r.description,
            completed: r.completed,
            priority: r.priority.parse()?,
            tags: r.tags,
            deadline: r.deadline,
            recurring: r.recurring.parse()?,
            created_at: r.created_at,
        })
    }
}

/// Insert payload, already validated.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub deadline: Option<OffsetDateTime>,
    pub recurring: Recurrence,
}

impl NewTask {
    pub fn into_task(self, owner: Uuid, now: OffsetDateTime) -> Task {
        Task {
            id: Uuid::new_v4(),
            owner,
            title: self.title,
            description: self.description,
            completed: false,
            priority: self.priority,
            tags: self.tags,
            deadline: self.deadline,
            recurring: self.recurring,
            created_at: now,
        }
    }
}

/// Query-string filter for `GET /tasks/filter`. Every field narrows the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(completed) = self.completed {
            if task.completed != completed {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority != priority {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !task.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let in_title = task.title.to_lowercase().contains(&needle);
            let in_description = task
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !in_title && !in_description {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, description: Option<&str>) -> Task {
        NewTask {
            title: title.into(),
            description: description.map(Into::into),
            priority: Priority::High,
            tags: vec!["work".into(), "urgent".into()],
            deadline: None,
            recurring: Recurrence::None,
        }
        .into_task(Uuid::new_v4(), OffsetDateTime::now_utc())
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(TaskFilter::default().matches(&task("Buy milk", None)));
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let t = task("Buy milk", Some("From the Corner shop"));
        let by_title = TaskFilter { search: Some("MILK".into()), ..Default::default() };
        let by_desc = TaskFilter { search: Some("corner".into()), ..Default::default() };
        let miss = TaskFilter { search: Some("bread".into()), ..Default::default() };
        assert!(by_title.matches(&t));
        assert!(by_desc.matches(&t));
        assert!(!miss.matches(&t));
    }

    #[test]
    fn criteria_combine() {
        let t = task("Report", None);
        let hit = TaskFilter {
            completed: Some(false),
            priority: Some(Priority::High),
            tag: Some("urgent".into()),
            search: None,
        };
        assert!(hit.matches(&t));
        let wrong_tag = TaskFilter { tag: Some("home".into()), ..hit.clone() };
        assert!(!wrong_tag.matches(&t));
        let done_only = TaskFilter { completed: Some(true), ..hit };
        assert!(!done_only.matches(&t));
    }

    #[test]
    fn row_with_unknown_priority_is_rejected() {
        let row = TaskRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "x".into(),
            description: None,
            completed: false,
            priority: "urgent".into(),
            tags: vec![],
            deadline: None,
            recurring: "none".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        assert!(Task::try_from(row).is_err());
    }
}
