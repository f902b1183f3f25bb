use crate::model::{
    Id, ModelValidationError, Timestamp,
    user::UserMarker,
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};
use thiserror::Error;

pub const MIN_COLORS: usize = 3;
pub const MAX_COLORS: usize = 6;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

/// A palette post as stored in the `palettes` collection.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PalettePost {
    pub id: Id<PostMarker>,
    pub owner: Id<UserMarker>,
    #[serde(flatten)]
    pub content: PalettePostContent,
    pub created_at: Timestamp,
}

/// A palette post resolved for display to one particular viewer.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPost {
    #[serde(flatten)]
    pub post: PalettePost,
    pub author: String,
    pub likes: u64,
    pub user_like: bool,
}

impl EnrichedPost {
    #[must_use]
    pub fn id(&self) -> &Id<PostMarker> {
        &self.post.id
    }

    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.post.created_at
    }
}

/// The user-editable part of a palette post.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawPalettePostContent")]
pub struct PalettePostContent {
    title: Title,
    description: String,
    is_creator: bool,
    colors: Vec<HexColor>,
    tags: BTreeSet<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPalettePostContent {
    title: Title,
    #[serde(default)]
    description: String,
    #[serde(default)]
    is_creator: bool,
    colors: Vec<HexColor>,
    tags: BTreeSet<String>,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("A palette needs between 3 and 6 colors, got {0}")]
pub struct InvalidColorCountError(usize);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidTagsError {
    #[error("At least one tag is required")]
    Missing,
    #[error("Tags must not be blank")]
    Blank,
}

impl PalettePostContent {
    pub fn new(
        title: Title,
        description: String,
        is_creator: bool,
        colors: Vec<HexColor>,
        tags: impl IntoIterator<Item = String>,
    ) -> Result<Self, ModelValidationError> {
        if !(MIN_COLORS..=MAX_COLORS).contains(&colors.len()) {
            return Err(InvalidColorCountError(colors.len()).into());
        }

        let tags: BTreeSet<String> = tags.into_iter().collect();
        if tags.is_empty() {
            return Err(InvalidTagsError::Missing.into());
        }
        if tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(InvalidTagsError::Blank.into());
        }

        Ok(Self {
            title,
            description,
            is_creator,
            colors,
            tags,
        })
    }

    #[must_use]
    pub fn title(&self) -> &Title {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the submitter claims to have created the palette themselves.
    #[must_use]
    pub fn is_creator(&self) -> bool {
        self.is_creator
    }

    #[must_use]
    pub fn colors(&self) -> &[HexColor] {
        &self.colors
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }
}

impl TryFrom<RawPalettePostContent> for PalettePostContent {
    type Error = ModelValidationError;

    fn try_from(value: RawPalettePostContent) -> Result<Self, Self::Error> {
        Self::new(
            value.title,
            value.description,
            value.is_creator,
            value.colors,
            value.tags,
        )
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct Title(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Title is required")]
pub struct InvalidTitleError(String);

impl Title {
    pub fn new(title: String) -> Result<Self, InvalidTitleError> {
        if title.trim().is_empty() {
            Err(InvalidTitleError(title))
        } else {
            Ok(Self(title))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Title {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Title::new(inner).map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Title"))
    }
}

/// A `#RGB` or `#RRGGBB` color, digits in either case.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct HexColor(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Not a hex color: {0:?}")]
pub struct InvalidHexColorError(String);

impl HexColor {
    pub fn new(color: String) -> Result<Self, InvalidHexColorError> {
        let valid = color.strip_prefix('#').is_some_and(|digits| {
            matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
        });

        if valid {
            Ok(Self(color))
        } else {
            Err(InvalidHexColorError(color))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn to_rgb(&self) -> (u8, u8, u8) {
        let digits = &self.0[1..];
        // validated in `new`, both branches only see hex digits
        let channel = |hex: &str| u8::from_str_radix(hex, 16).unwrap_or_default();

        if digits.len() == 3 {
            let expand = |i: usize| channel(digits[i..=i].repeat(2).as_str());
            (expand(0), expand(1), expand(2))
        } else {
            (
                channel(&digits[0..2]),
                channel(&digits[2..4]),
                channel(&digits[4..6]),
            )
        }
    }

    /// CSS functional notation, e.g. `rgb(171, 205, 239)`.
    #[must_use]
    pub fn to_rgb_string(&self) -> String {
        let (r, g, b) = self.to_rgb();
        format!("rgb({r}, {g}, {b})")
    }
}

impl Display for HexColor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<'de> Deserialize<'de> for HexColor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        HexColor::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"HexColor"))
    }
}
