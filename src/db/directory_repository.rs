use async_trait::async_trait;
use sqlx::PgPool;
use tracing::error;

use super::DirectoryStore;
use crate::errors::AppError;
use crate::models::{ClientRecord, ProjectRecord, TaskRecord};

/// Reads the agency's projects, tasks and clients. Ordering is fixed so the
/// same records always render the same prompt text.
#[derive(Clone)]
pub struct DirectoryRepository {
    pool: PgPool,
}

impl DirectoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryStore for DirectoryRepository {
    async fn list_projects(&self, limit: i64) -> Result<Vec<ProjectRecord>, AppError> {
        sqlx::query_as::<_, ProjectRecord>(
            "SELECT p.name, p.status, c.name AS client_name, p.due_date
             FROM projects p
             LEFT JOIN clients c ON c.id = p.client_id
             ORDER BY p.name ASC, p.id ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch projects: {e}");
            AppError::db_query("Failed to fetch projects", e)
        })
    }

    async fn list_tasks(&self, limit: i64) -> Result<Vec<TaskRecord>, AppError> {
        sqlx::query_as::<_, TaskRecord>(
            "SELECT t.title, t.status, t.priority, p.name AS project_name, t.due_date
             FROM tasks t
             LEFT JOIN projects p ON p.id = t.project_id
             ORDER BY t.due_date ASC NULLS LAST, t.title ASC, t.id ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch tasks: {e}");
            AppError::db_query("Failed to fetch tasks", e)
        })
    }

    async fn list_clients(&self, limit: i64) -> Result<Vec<ClientRecord>, AppError> {
        sqlx::query_as::<_, ClientRecord>(
            "SELECT name, company, email, status
             FROM clients
             ORDER BY name ASC, id ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch clients: {e}");
            AppError::db_query("Failed to fetch clients", e)
        })
    }
}
