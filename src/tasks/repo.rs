use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::PgStore;
use crate::tasks::repo_types::{Task, TaskFilter, TaskRow};

#[async_trait]
pub trait TaskRepo: Send + Sync {
    /// Owner's tasks narrowed by `filter`, newest first.
    async fn list(&self, owner: Uuid, filter: &TaskFilter) -> anyhow::Result<Vec<Task>>;

    /// Looks up by id only. Ownership is checked by the caller.
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Task>>;

    async fn create(&self, task: Task) -> anyhow::Result<Task>;

    /// Overwrites the mutable fields of `task`. `None` if it vanished meanwhile.
    async fn update(&self, task: &Task) -> anyhow::Result<Option<Task>>;

    async fn delete(&self, id: Uuid, owner: Uuid) -> anyhow::Result<bool>;
}

const TASK_COLUMNS: &str = "id, user_id, title, description, completed, priority, tags, \
                            deadline, recurring, created_at";

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl TaskRepo for PgStore {
    async fn list(&self, owner: Uuid, filter: &TaskFilter) -> anyhow::Result<Vec<Task>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = "));
        qb.push_bind(owner);
        if let Some(completed) = filter.completed {
            qb.push(" AND completed = ").push_bind(completed);
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(tag) = &filter.tag {
            qb.push(" AND ").push_bind(tag.clone()).push(" = ANY(tags)");
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC");

        let rows = qb.build_query_as::<TaskRow>().fetch_all(&self.db).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn create(&self, task: Task) -> anyhow::Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            INSERT INTO tasks (id, user_id, title, description, completed, priority, tags,
                               deadline, recurring, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .bind(task.owner)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.completed)
        .bind(task.priority.as_str())
        .bind(&task.tags)
        .bind(task.deadline)
        .bind(task.recurring.as_str())
        .bind(task.created_at)
        .fetch_one(&self.db)
        .await?;
        Task::try_from(row)
    }

    async fn update(&self, task: &Task) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            UPDATE tasks
               SET title = $3, description = $4, completed = $5, priority = $6,
                   tags = $7, deadline = $8, recurring = $9
             WHERE id = $1 AND user_id = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .bind(task.owner)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.completed)
        .bind(task.priority.as_str())
        .bind(&task.tags)
        .bind(task.deadline)
        .bind(task.recurring.as_str())
        .fetch_optional(&self.db)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
