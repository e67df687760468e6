mod create_admin;
mod init_db;

pub use create_admin::cmd_create_admin;
pub use init_db::cmd_init_db;
