//! Admin account command handler

use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthError, AuthService, SeaOrmAuthService};

pub async fn cmd_create_admin(
    config: &Config,
    username: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let auth = SeaOrmAuthService::new(store, config.security.clone());

    match auth.register(username, email, password, true).await {
        Ok(user) => {
            println!("✓ Admin user '{}' created (ID: {})", user.username, user.id);
            Ok(())
        }
        Err(e @ (AuthError::UsernameTaken | AuthError::EmailTaken)) => {
            println!("Admin not created: {e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
