pub mod prelude;

pub mod images;
pub mod user_stats;
pub mod users;
