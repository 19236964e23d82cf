//! [`PostStore`] over the web application's Postgres database.
//!
//! The schema is owned and migrated by the application. This module assumes
//! its table layout:
//!
//! ```text
//! "User"            (id, name, email)
//! "ForumPost"       (id, title, body, "createdById", "createdAt", image)
//! "Tag"             (id, name UNIQUE)
//! "_ForumPostToTag" ("A" -> ForumPost.id, "B" -> Tag.id)
//! ```
//!
//! Ids are text. New rows get a random UUID.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{BotIdentity, NewPost, PostRecord};
use crate::store::PostStore;

const MAX_CONNECTIONS: u32 = 5;

#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    /// Connect a small pool to `database_url`.
    #[instrument(level = "info", skip_all)]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await?;
        info!(max_connections = MAX_CONNECTIONS, "Connected to database");
        Ok(Self { pool })
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn get_or_create_bot_identity(&self) -> Result<String> {
        let bot = BotIdentity::facebook();
        let inserted = sqlx::query(
            r#"INSERT INTO "User" (id, name, email)
               VALUES ($1, $2, $3)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(&bot.id)
        .bind(&bot.name)
        .bind(&bot.email)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            info!(id = %bot.id, "Created bot user");
        }
        Ok(bot.id)
    }

    async fn post_exists(&self, title: &str, created_at: DateTime<Utc>) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"SELECT EXISTS(
                 SELECT 1 FROM "ForumPost" WHERE title = $1 AND "createdAt" = $2
               )"#,
        )
        .bind(title)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_post(&self, post: &NewPost) -> Result<PostRecord> {
        let id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO "ForumPost" (id, title, body, "createdById", "createdAt", image)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(&id)
        .bind(&post.title)
        .bind(&post.body)
        .bind(&post.author_id)
        .bind(post.created_at)
        .bind(&post.image)
        .execute(&mut *tx)
        .await?;

        for name in &post.tag_names {
            let (tag_id,): (String,) = sqlx::query_as(
                r#"INSERT INTO "Tag" (id, name)
                   VALUES ($1, $2)
                   ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                   RETURNING id"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(r#"INSERT INTO "_ForumPostToTag" ("A", "B") VALUES ($1, $2) ON CONFLICT DO NOTHING"#)
                .bind(&id)
                .bind(&tag_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(PostRecord {
            id,
            title: post.title.clone(),
            body: post.body.clone(),
            author_id: post.author_id.clone(),
            created_at: post.created_at,
            image: post.image.clone(),
            tags: post.tag_names.clone(),
        })
    }
}
