use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::{BackgroundJob, JobContext, JobKind};
use crate::{errors::ServiceError, notifications::OutboundEmail};

/// Reminds customers about carts they left behind.
pub struct CartAbandonmentReminder;

#[async_trait]
impl BackgroundJob for CartAbandonmentReminder {
    fn kind(&self) -> JobKind {
        JobKind::CartAbandonmentReminder
    }

    async fn run(&self, ctx: &JobContext, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let cutoff = now - Duration::hours(ctx.config.abandon_after_hours);
        let candidates = ctx.repos.carts.find_abandonment_candidates(cutoff).await?;
        let mut reminded = 0u64;

        for candidate in candidates {
            let reminder = OutboundEmail {
                from: ctx.config.mail_from.clone(),
                to: candidate.customer.email.clone(),
                subject: "You left something in your cart".to_string(),
                body: format!(
                    "Hi {},\n\nYour cart still holds {} item(s) worth {}. \
                     Come back any time to complete your order.",
                    candidate.customer.first_name, candidate.item_count, candidate.cart.total
                ),
            };
            if let Err(e) = ctx.mailer.send(reminder).await {
                warn!(cart_id = %candidate.cart.id, error = %e, "cart reminder not delivered");
                continue;
            }

            // A cart touched since the scan is left alone.
            if ctx.repos.carts.mark_reminded(candidate.cart.id, now).await? {
                reminded += 1;
            } else {
                debug!(cart_id = %candidate.cart.id, "cart changed before it could be marked");
            }
        }

        Ok(reminded)
    }
}
