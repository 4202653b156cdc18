use async_trait::async_trait;
use tracing::info;

use crate::auth::repo_types::User;

/// Out-of-band delivery of password reset tokens (email, SMS, ...).
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset(&self, user: &User, token: &str) -> anyhow::Result<()>;
}

/// Records that a reset was issued without transmitting the token anywhere.
/// Stands in until a mail transport is wired up.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset(&self, user: &User, _token: &str) -> anyhow::Result<()> {
        info!(user_id = %user.id, email = %user.email, "password reset issued");
        Ok(())
    }
}
