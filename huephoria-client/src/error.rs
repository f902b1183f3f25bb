use huephoria_common::{
    backend::StoreError,
    model::{Id, ModelValidationError, palette::PostMarker, user::Username},
};
use thiserror::Error;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Invalid input: {0}")]
    Validation(#[from] ModelValidationError),
    #[error("Palette post with id {0} was not found.")]
    PostNotFound(Id<PostMarker>),
    #[error("This action requires a signed-in user")]
    NotSignedIn,
    #[error("Username {0} already exists")]
    UsernameTaken(Username),
    #[error("Post {0} is not tracked for likes")]
    PostNotTracked(Id<PostMarker>),
}

impl ClientError {
    /// Whether the viewer should be routed to a not-found page rather than a generic error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::PostNotFound(_))
    }
}
