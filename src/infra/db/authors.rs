use async_trait::async_trait;

use crate::application::repos::{AuthorsRepo, RepoError};

use super::{PostgresRepositories, util::map_sqlx_error};

#[async_trait]
impl AuthorsRepo for PostgresRepositories {
    async fn display_name(&self, author_id: i64) -> Result<Option<String>, RepoError> {
        sqlx::query_scalar::<_, String>("SELECT nickname FROM users WHERE id = $1")
            .bind(author_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
