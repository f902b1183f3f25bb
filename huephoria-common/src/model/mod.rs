pub mod cursor;
pub mod like;
pub mod palette;
pub mod user;

use crate::model::{
    palette::{InvalidColorCountError, InvalidHexColorError, InvalidTagsError, InvalidTitleError},
    user::InvalidUsernameError,
};
use derive_where::derive_where;
use rand::{Rng, distr::Alphanumeric};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error, Unexpected},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
    str::FromStr,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

/// Length of identifiers produced by [`Id::generate`].
pub const GENERATED_ID_LEN: usize = 20;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Id(#[from] InvalidIdError),
    #[error(transparent)]
    Timestamp(#[from] InvalidTimestampError),
    #[error(transparent)]
    Title(#[from] InvalidTitleError),
    #[error(transparent)]
    HexColor(#[from] InvalidHexColorError),
    #[error(transparent)]
    ColorCount(#[from] InvalidColorCountError),
    #[error(transparent)]
    Tags(#[from] InvalidTagsError),
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Document ids must be non-empty and must not contain '/': {0:?}")]
pub struct InvalidIdError(String);

/// Opaque document identifier, typed by the kind of document it names.
#[derive_where(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[derive(Serialize)]
#[serde(transparent)]
pub struct Id<Marker>(String, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidIdError> {
        let id = id.into();
        if id.is_empty() || id.contains('/') {
            Err(InvalidIdError(id))
        } else {
            Ok(Self(id, PhantomData))
        }
    }

    /// Random alphanumeric id in the style of document-store auto ids.
    #[must_use]
    pub fn generate() -> Self {
        let id = rand::rng()
            .sample_iter(Alphanumeric)
            .take(GENERATED_ID_LEN)
            .map(char::from)
            .collect();

        Self(id, PhantomData)
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = InvalidIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<Marker> TryFrom<String> for Id<Marker> {
    type Error = InvalidIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de, Marker> Deserialize<'de> for Id<Marker> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Id::new(inner).map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Id"))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidTimestampError {
    #[error("Seconds out of range: {0}")]
    SecondsOutOfRange(i64),
    #[error("Nanoseconds must be below one second: {0}")]
    NanosOutOfRange(u32),
}

/// Server-assigned instant, ordered and serialized like a document-store timestamp.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Timestamp(UtcDateTime);

#[derive(Serialize, Deserialize)]
struct TimestampParts {
    seconds: i64,
    nanos: u32,
}

impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        Self(UtcDateTime::now())
    }

    pub fn from_parts(seconds: i64, nanos: u32) -> Result<Self, InvalidTimestampError> {
        if nanos >= 1_000_000_000 {
            return Err(InvalidTimestampError::NanosOutOfRange(nanos));
        }
        let whole = UtcDateTime::from_unix_timestamp(seconds)
            .map_err(|_| InvalidTimestampError::SecondsOutOfRange(seconds))?;

        Ok(Self(whole + Duration::nanoseconds(i64::from(nanos))))
    }

    #[must_use]
    pub fn get(self) -> UtcDateTime {
        self.0
    }

    #[must_use]
    pub fn seconds(self) -> i64 {
        self.0.unix_timestamp()
    }

    #[must_use]
    pub fn nanos(self) -> u32 {
        self.0.nanosecond()
    }
}

impl From<UtcDateTime> for Timestamp {
    fn from(value: UtcDateTime) -> Self {
        Self(value)
    }
}

impl From<Timestamp> for UtcDateTime {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        TimestampParts {
            seconds: self.seconds(),
            nanos: self.nanos(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let TimestampParts { seconds, nanos } = TimestampParts::deserialize(deserializer)?;
        Timestamp::from_parts(seconds, nanos).map_err(Error::custom)
    }
}
