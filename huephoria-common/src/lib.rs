pub mod backend;
pub mod listener;
pub mod model;
