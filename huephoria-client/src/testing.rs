//! Fixtures shared by the unit tests of this crate.

use huephoria_common::model::{
    Id, Timestamp,
    palette::{HexColor, PalettePost, PalettePostContent, Title},
    user::{User, UserMarker, Username},
};
use huephoria_db::memory::MemoryStore;
use time::{Duration, macros::utc_datetime};

pub fn uid(uid: &str) -> Id<UserMarker> {
    Id::new(uid).unwrap()
}

pub fn content(title: &str) -> PalettePostContent {
    PalettePostContent::new(
        Title::new(title.to_owned()).unwrap(),
        format!("{title} description"),
        true,
        ["#1a2b3c", "#abc", "#ffffff"]
            .into_iter()
            .map(|c| HexColor::new(c.to_owned()).unwrap())
            .collect(),
        ["warm".to_owned(), "pastel".to_owned()],
    )
    .unwrap()
}

pub fn minutes_after_base(minutes: i64) -> Timestamp {
    Timestamp::from(utc_datetime!(2024-06-01 00:00) + Duration::minutes(minutes))
}

/// Seeds `count` posts one minute apart; the returned posts are newest first.
pub fn seed_posts(store: &MemoryStore, owner: &Id<UserMarker>, count: i64) -> Vec<PalettePost> {
    let mut posts: Vec<PalettePost> = (0..count)
        .map(|minute| {
            store.insert_palette(
                owner.clone(),
                content(&format!("palette {minute}")),
                minutes_after_base(minute),
            )
        })
        .collect();
    posts.reverse();
    posts
}

pub fn seed_user(store: &MemoryStore, uid: &Id<UserMarker>, username: &str) {
    store.insert_user(User {
        uid: uid.clone(),
        username: Some(Username::new(username.to_owned()).unwrap()),
    });
}
