use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use super::{BackgroundJob, JobContext, JobKind};
use crate::{errors::ServiceError, events::Event};

/// Revokes every token of deactivated or deleted staff accounts.
pub struct LogoutDeactivatedUsers;

#[async_trait]
impl BackgroundJob for LogoutDeactivatedUsers {
    fn kind(&self) -> JobKind {
        JobKind::LogoutDeactivatedUsers
    }

    async fn run(&self, ctx: &JobContext, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let users = ctx.repos.users.find_deactivated_unrevoked().await?;
        let mut revoked = 0u64;

        for user in users {
            ctx.repos.users.mark_tokens_revoked(user.id, now).await?;
            ctx.auth.revoke_user_tokens(user.id, now).await;
            ctx.events.send_or_log(Event::UserTokensRevoked(user.id)).await;
            info!(user_id = %user.id, "logged out deactivated user");
            revoked += 1;
        }

        Ok(revoked)
    }
}
