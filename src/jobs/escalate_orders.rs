use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::{BackgroundJob, JobContext, JobKind};
use crate::{errors::ServiceError, events::Event, notifications::OutboundEmail};

/// Flags open orders that have waited too long and tells operations.
pub struct EscalateDelayedOrders;

#[async_trait]
impl BackgroundJob for EscalateDelayedOrders {
    fn kind(&self) -> JobKind {
        JobKind::EscalateDelayedOrders
    }

    async fn run(&self, ctx: &JobContext, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let cutoff = now - Duration::hours(ctx.config.escalate_after_hours);
        let delayed = ctx.repos.orders.find_delayed(cutoff).await?;
        let mut escalated = 0u64;

        for order in delayed {
            let notice = OutboundEmail {
                from: ctx.config.mail_from.clone(),
                to: ctx.config.ops_email.clone(),
                subject: format!("Order {} is delayed", order.order_number),
                body: format!(
                    "Order {} placed at {} is still {} after {} hours.",
                    order.order_number,
                    order.placed_at.to_rfc3339(),
                    order.status,
                    ctx.config.escalate_after_hours
                ),
            };
            // Unmarked orders are picked up again on the next pass.
            if let Err(e) = ctx.mailer.send(notice).await {
                warn!(order_id = %order.id, error = %e, "escalation notice not delivered");
                continue;
            }

            let order = ctx.repos.orders.mark_escalated(order, now).await?;
            ctx.events
                .send_or_log(Event::OrderEscalated {
                    order_id: order.id,
                    order_number: order.order_number.clone(),
                    placed_at: order.placed_at,
                })
                .await;
            info!(order_id = %order.id, order_number = %order.order_number, "order escalated");
            escalated += 1;
        }

        Ok(escalated)
    }
}
