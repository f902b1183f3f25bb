use crate::model::{InvalidTimestampError, Timestamp, palette::EnrichedPost, palette::PalettePost};
use base64::{DecodeError, Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};
use std::{
    fmt::{Display, Formatter},
    num::ParseIntError,
    str::{FromStr, Utf8Error},
};
use thiserror::Error;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum PageCursorDecodeError {
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Cursor is not valid UTF-8: {0}")]
    Utf8(#[from] Utf8Error),
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid number in cursor: {0}")]
    InvalidNumber(#[from] ParseIntError),
    #[error(transparent)]
    Timestamp(#[from] InvalidTimestampError),
}

/// Position in the feed: everything strictly older than `created_at` comes next.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct PageCursor {
    created_at: Timestamp,
}

impl PageCursor {
    #[must_use]
    pub fn new(created_at: Timestamp) -> Self {
        Self { created_at }
    }

    #[must_use]
    pub fn after(post: &PalettePost) -> Self {
        Self::new(post.created_at)
    }

    #[must_use]
    pub fn after_enriched(post: &EnrichedPost) -> Self {
        Self::new(post.created_at())
    }

    #[must_use]
    pub fn created_at(self) -> Timestamp {
        self.created_at
    }

    /// Whether a post with this creation time belongs after the cursor.
    #[must_use]
    pub fn admits(self, created_at: Timestamp) -> bool {
        created_at < self.created_at
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        let raw = format!("{}:{}", self.created_at.seconds(), self.created_at.nanos());
        BASE64_URL_SAFE_NO_PAD.encode(raw)
    }
}

impl Display for PageCursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_token_str())
    }
}

impl FromStr for PageCursor {
    type Err = PageCursorDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(s)?;
        let raw = std::str::from_utf8(&bytes)?;

        let mut parts = raw.splitn(2, ':');
        let seconds_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let nanos_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;

        let created_at = Timestamp::from_parts(seconds_part.parse()?, nanos_part.parse()?)?;
        Ok(Self { created_at })
    }
}

impl Serialize for PageCursor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_token_str())
    }
}

impl<'de> Deserialize<'de> for PageCursor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Timestamp,
        cursor::{PageCursor, PageCursorDecodeError},
    };
    use time::{Duration, macros::utc_datetime};

    #[test]
    fn token_is_opaque_and_parses_back() {
        let created_at =
            Timestamp::from(utc_datetime!(2024-05-06 07:08:09) + Duration::nanoseconds(123_456));
        let cursor = PageCursor::new(created_at);

        let token = cursor.to_string();
        assert!(!token.contains(':'));
        assert_eq!(token.parse::<PageCursor>(), Ok(cursor));
    }

    #[test]
    fn malformed_tokens() {
        assert!(matches!(
            "not base64!".parse::<PageCursor>(),
            Err(PageCursorDecodeError::Decode(_))
        ));
        // "12345" without a nanosecond part
        assert_eq!(
            "MTIzNDU".parse::<PageCursor>(),
            Err(PageCursorDecodeError::NotEnoughParts)
        );
    }

    #[test]
    fn admits_only_strictly_older() {
        let at = Timestamp::from(utc_datetime!(2024-01-01 00:00));
        let cursor = PageCursor::new(at);

        assert!(cursor.admits(Timestamp::from(utc_datetime!(2023-12-31 23:59))));
        assert!(!cursor.admits(at));
        assert!(!cursor.admits(Timestamp::from(utc_datetime!(2024-01-01 00:01))));
    }
}
