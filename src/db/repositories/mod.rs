pub mod image;
pub mod stats;
pub mod user;
