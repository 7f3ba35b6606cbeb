use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{BackgroundJob, JobContext, JobKind};
use crate::errors::ServiceError;

/// Hard-deletes mail that has sat in the trash past the retention window.
pub struct AutoDeleteTrashedEmails;

#[async_trait]
impl BackgroundJob for AutoDeleteTrashedEmails {
    fn kind(&self) -> JobKind {
        JobKind::AutoDeleteTrashedEmails
    }

    async fn run(&self, ctx: &JobContext, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let cutoff = now - Duration::days(ctx.config.trash_retention_days);
        ctx.repos.emails.purge_trashed_before(cutoff).await
    }
}
