pub mod app;
pub mod auth;
pub mod config;
pub mod debounce;
pub mod enrich;
pub mod error;
pub mod feed;
pub mod like;
pub mod palettes;
pub mod users;

#[cfg(test)]
mod testing;

pub use app::Huephoria;
