use crate::record::{LikeRow, PaletteRecord, UserRecord};
use huephoria_common::{
    backend::{PaletteStore, StoreError, StoreResult, UserStore},
    model::{
        Id, ModelValidationError, Timestamp,
        cursor::PageCursor,
        like::LikeRecord,
        palette::{PalettePost, PalettePostContent, PostMarker},
        user::{User, UserMarker, Username},
    },
};
use sqlx::{PgPool, query, query_as, query_scalar};
use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::debug;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Write rejected: {0}")]
    PermissionDenied(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Data(err) => StoreError::Data(err),
            DbError::PermissionDenied(reason) => StoreError::PermissionDenied(reason),
            DbError::Sqlx(
                err @ (sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed),
            ) => StoreError::Unavailable(err.to_string()),
            DbError::Sqlx(err) => StoreError::Backend(Box::new(err)),
        }
    }
}

const PALETTE_COLUMNS: &str = "
    palette_id, owner_uid, title, description, is_creator, colors, tags, created_at";

fn primitive(timestamp: Timestamp) -> PrimitiveDateTime {
    let utc = timestamp.get();
    PrimitiveDateTime::new(utc.date(), utc.time())
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        debug!("Connected to database");

        Ok(Self::new(pool))
    }

    pub async fn fetch_palette_page(
        &self,
        cursor: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<PalettePost>> {
        let records = if let Some(cursor) = cursor {
            query_as::<_, PaletteRecord>(&format!(
                "
                SELECT {PALETTE_COLUMNS}
                FROM palettes.palettes
                WHERE created_at < $1
                ORDER BY created_at DESC, palette_id ASC
                LIMIT $2
                "
            ))
            .bind(primitive(cursor.created_at()))
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?
        } else {
            query_as::<_, PaletteRecord>(&format!(
                "
                SELECT {PALETTE_COLUMNS}
                FROM palettes.palettes
                ORDER BY created_at DESC, palette_id ASC
                LIMIT $1
                "
            ))
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?
        };

        let posts = records
            .into_iter()
            .map(PalettePost::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    pub async fn count_palettes(&self) -> Result<u64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM palettes.palettes")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    pub async fn fetch_palette(&self, id: &Id<PostMarker>) -> Result<Option<PalettePost>> {
        let record = query_as::<_, PaletteRecord>(&format!(
            "
            SELECT {PALETTE_COLUMNS}
            FROM palettes.palettes
            WHERE palette_id = $1
            "
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(PalettePost::try_from).transpose()?;
        Ok(post)
    }

    pub async fn create_palette(
        &self,
        caller: &Id<UserMarker>,
        content: &PalettePostContent,
    ) -> Result<PalettePost> {
        let palette_id = Id::<PostMarker>::generate();

        let record = query_as::<_, PaletteRecord>(&format!(
            "
            INSERT INTO palettes.palettes
                (palette_id, owner_uid, title, description, is_creator, colors, tags)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PALETTE_COLUMNS}
            "
        ))
        .bind(palette_id.get())
        .bind(caller.get())
        .bind(content.title().get())
        .bind(content.description())
        .bind(content.is_creator())
        .bind(color_strings(content))
        .bind(content.tags().iter().cloned().collect::<Vec<_>>())
        .fetch_one(&self.pool)
        .await?;

        Ok(record.try_into()?)
    }

    pub async fn update_palette(
        &self,
        caller: &Id<UserMarker>,
        id: &Id<PostMarker>,
        content: &PalettePostContent,
    ) -> Result<()> {
        let result = query(
            "
            UPDATE palettes.palettes
            SET title = $3, description = $4, is_creator = $5, colors = $6, tags = $7
            WHERE palette_id = $1 AND owner_uid = $2
            ",
        )
        .bind(id.get())
        .bind(caller.get())
        .bind(content.title().get())
        .bind(content.description())
        .bind(content.is_creator())
        .bind(color_strings(content))
        .bind(content.tags().iter().cloned().collect::<Vec<_>>())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::PermissionDenied(format!(
                "palette {id} does not exist or is not owned by {caller}"
            )));
        }
        Ok(())
    }

    pub async fn delete_palette(&self, caller: &Id<UserMarker>, id: &Id<PostMarker>) -> Result<()> {
        let result = query(
            "
            DELETE FROM palettes.palettes
            WHERE palette_id = $1 AND owner_uid = $2
            ",
        )
        .bind(id.get())
        .bind(caller.get())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::PermissionDenied(format!(
                "palette {id} does not exist or is not owned by {caller}"
            )));
        }
        Ok(())
    }

    pub async fn count_likes(&self, post: &Id<PostMarker>) -> Result<u64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM palettes.likes WHERE palette_id = $1")
            .bind(post.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    pub async fn fetch_like(
        &self,
        post: &Id<PostMarker>,
        user: &Id<UserMarker>,
    ) -> Result<Option<LikeRecord>> {
        let row = query_as::<_, LikeRow>(
            "
            SELECT palette_id, uid, created_at
            FROM palettes.likes
            WHERE palette_id = $1 AND uid = $2
            ",
        )
        .bind(post.get())
        .bind(user.get())
        .fetch_optional(&self.pool)
        .await?;

        let like = row.map(LikeRecord::try_from).transpose()?;
        Ok(like)
    }

    pub async fn create_like(
        &self,
        caller: &Id<UserMarker>,
        post: &Id<PostMarker>,
    ) -> Result<LikeRecord> {
        // the no-op update makes RETURNING yield the existing row on conflict
        let row = query_as::<_, LikeRow>(
            "
            INSERT INTO palettes.likes (palette_id, uid)
            VALUES ($1, $2)
            ON CONFLICT (palette_id, uid) DO UPDATE SET uid = EXCLUDED.uid
            RETURNING palette_id, uid, created_at
            ",
        )
        .bind(post.get())
        .bind(caller.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_into()?)
    }

    pub async fn delete_like(&self, caller: &Id<UserMarker>, post: &Id<PostMarker>) -> Result<()> {
        query("DELETE FROM palettes.likes WHERE palette_id = $1 AND uid = $2")
            .bind(post.get())
            .bind(caller.get())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn fetch_user(&self, uid: &Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT uid, username
            FROM users.users
            WHERE uid = $1
            ",
        )
        .bind(uid.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT uid, username
            FROM users.users
            WHERE username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn set_username(&self, caller: &Id<UserMarker>, username: &Username) -> Result<()> {
        query(
            "
            INSERT INTO users.users (uid, username)
            VALUES ($1, $2)
            ON CONFLICT (uid) DO UPDATE SET username = EXCLUDED.username
            ",
        )
        .bind(caller.get())
        .bind(username.get())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn color_strings(content: &PalettePostContent) -> Vec<String> {
    content
        .colors()
        .iter()
        .map(|color| color.get().to_owned())
        .collect()
}

impl PaletteStore for DbClient {
    async fn fetch_palette_page(
        &self,
        cursor: Option<PageCursor>,
        limit: usize,
    ) -> StoreResult<Vec<PalettePost>> {
        Ok(DbClient::fetch_palette_page(self, cursor, limit).await?)
    }

    async fn count_palettes(&self) -> StoreResult<u64> {
        Ok(DbClient::count_palettes(self).await?)
    }

    async fn fetch_palette(&self, id: &Id<PostMarker>) -> StoreResult<Option<PalettePost>> {
        Ok(DbClient::fetch_palette(self, id).await?)
    }

    async fn create_palette(
        &self,
        caller: &Id<UserMarker>,
        content: &PalettePostContent,
    ) -> StoreResult<PalettePost> {
        Ok(DbClient::create_palette(self, caller, content).await?)
    }

    async fn update_palette(
        &self,
        caller: &Id<UserMarker>,
        id: &Id<PostMarker>,
        content: &PalettePostContent,
    ) -> StoreResult<()> {
        Ok(DbClient::update_palette(self, caller, id, content).await?)
    }

    async fn delete_palette(&self, caller: &Id<UserMarker>, id: &Id<PostMarker>) -> StoreResult<()> {
        Ok(DbClient::delete_palette(self, caller, id).await?)
    }

    async fn count_likes(&self, post: &Id<PostMarker>) -> StoreResult<u64> {
        Ok(DbClient::count_likes(self, post).await?)
    }

    async fn fetch_like(
        &self,
        post: &Id<PostMarker>,
        user: &Id<UserMarker>,
    ) -> StoreResult<Option<LikeRecord>> {
        Ok(DbClient::fetch_like(self, post, user).await?)
    }

    async fn create_like(
        &self,
        caller: &Id<UserMarker>,
        post: &Id<PostMarker>,
    ) -> StoreResult<LikeRecord> {
        Ok(DbClient::create_like(self, caller, post).await?)
    }

    async fn delete_like(&self, caller: &Id<UserMarker>, post: &Id<PostMarker>) -> StoreResult<()> {
        Ok(DbClient::delete_like(self, caller, post).await?)
    }
}

impl UserStore for DbClient {
    async fn fetch_user(&self, uid: &Id<UserMarker>) -> StoreResult<Option<User>> {
        Ok(DbClient::fetch_user(self, uid).await?)
    }

    async fn fetch_user_by_username(&self, username: &Username) -> StoreResult<Option<User>> {
        Ok(DbClient::fetch_user_by_username(self, username).await?)
    }

    async fn set_username(&self, caller: &Id<UserMarker>, username: &Username) -> StoreResult<()> {
        Ok(DbClient::set_username(self, caller, username).await?)
    }
}
