pub use super::images::Entity as Images;
pub use super::user_stats::Entity as UserStats;
pub use super::users::Entity as Users;
