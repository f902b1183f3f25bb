use huephoria_common::model::{
    Id, ModelValidationError,
    like::LikeRecord,
    palette::{HexColor, PalettePost, PalettePostContent, Title},
    user::{User, Username},
};
use sqlx::FromRow;
use time::PrimitiveDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PaletteRecord {
    pub palette_id: String,
    pub owner_uid: String,
    pub title: String,
    pub description: String,
    pub is_creator: bool,
    pub colors: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: PrimitiveDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct LikeRow {
    pub palette_id: String,
    pub uid: String,
    pub created_at: PrimitiveDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub uid: String,
    pub username: Option<String>,
}

impl TryFrom<PaletteRecord> for PalettePost {
    type Error = ModelValidationError;

    fn try_from(value: PaletteRecord) -> Result<Self, Self::Error> {
        let colors: Vec<HexColor> = value
            .colors
            .into_iter()
            .map(HexColor::new)
            .collect::<Result<_, _>>()?;

        Ok(Self {
            id: Id::new(value.palette_id)?,
            owner: Id::new(value.owner_uid)?,
            content: PalettePostContent::new(
                Title::new(value.title)?,
                value.description,
                value.is_creator,
                colors,
                value.tags,
            )?,
            created_at: value.created_at.as_utc().into(),
        })
    }
}

impl TryFrom<LikeRow> for LikeRecord {
    type Error = ModelValidationError;

    fn try_from(value: LikeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            post: Id::new(value.palette_id)?,
            user: Id::new(value.uid)?,
            created_at: value.created_at.as_utc().into(),
        })
    }
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            uid: Id::new(value.uid)?,
            username: value.username.map(Username::new).transpose()?,
        })
    }
}
