use crate::model::{Id, Timestamp, palette::PostMarker, user::UserMarker};
use serde::{Deserialize, Serialize};

/// One user's like of one post. Its existence is the like; there is no unliked state.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRecord {
    pub post: Id<PostMarker>,
    pub user: Id<UserMarker>,
    pub created_at: Timestamp,
}
