/*!
 * # Background jobs
 *
 * Periodic maintenance work: escalating stale orders, logging out
 * deactivated staff, purging old trash and reminding customers about
 * abandoned carts.
 *
 * Each job implements [`BackgroundJob`]. A [`JobQueue`] owns one worker
 * task that runs jobs one at a time; the [`Scheduler`] feeds the queue from
 * per-job interval timers. The CLI bypasses both and calls [`run_job`]
 * directly.
 */

mod abandoned_carts;
mod escalate_orders;
mod logout_users;
mod purge_trash;

pub use abandoned_carts::CartAbandonmentReminder;
pub use escalate_orders::EscalateDelayedOrders;
pub use logout_users::LogoutDeactivatedUsers;
pub use purge_trash::AutoDeleteTrashedEmails;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{str::FromStr, sync::Arc, time::Duration};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::{
    auth::AuthService, config::AppConfig, errors::ServiceError, events::EventSender,
    notifications::Mailer, repositories::Repositories, AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    EscalateDelayedOrders,
    LogoutDeactivatedUsers,
    AutoDeleteTrashedEmails,
    CartAbandonmentReminder,
}

impl JobKind {
    /// Seconds between scheduled runs.
    pub fn period(&self, config: &AppConfig) -> Duration {
        let secs = match self {
            JobKind::EscalateDelayedOrders => config.escalation_interval_secs,
            JobKind::LogoutDeactivatedUsers => config.user_logout_interval_secs,
            JobKind::AutoDeleteTrashedEmails => config.trash_purge_interval_secs,
            JobKind::CartAbandonmentReminder => config.cart_reminder_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }

    pub fn parse(name: &str) -> Result<Self, ServiceError> {
        JobKind::from_str(name.trim()).map_err(|_| {
            let known: Vec<String> = JobKind::iter().map(|kind| kind.to_string()).collect();
            ServiceError::BadRequest(format!(
                "Unknown job '{}'; expected one of: {}",
                name,
                known.join(", ")
            ))
        })
    }
}

/// Everything a job needs, detached from the HTTP layer.
#[derive(Clone)]
pub struct JobContext {
    pub repos: Repositories,
    pub auth: Arc<AuthService>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<AppConfig>,
    pub events: EventSender,
}

impl JobContext {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            repos: state.repos.clone(),
            auth: state.auth.clone(),
            mailer: state.mailer.clone(),
            config: state.config.clone(),
            events: state.event_sender.clone(),
        }
    }
}

#[async_trait]
pub trait BackgroundJob: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Runs one pass and returns how many records were touched.
    async fn run(&self, ctx: &JobContext, now: DateTime<Utc>) -> Result<u64, ServiceError>;
}

pub fn job_for(kind: JobKind) -> Box<dyn BackgroundJob> {
    match kind {
        JobKind::EscalateDelayedOrders => Box::new(EscalateDelayedOrders),
        JobKind::LogoutDeactivatedUsers => Box::new(LogoutDeactivatedUsers),
        JobKind::AutoDeleteTrashedEmails => Box::new(AutoDeleteTrashedEmails),
        JobKind::CartAbandonmentReminder => Box::new(CartAbandonmentReminder),
    }
}

/// Runs a single job pass at `now`.
pub async fn run_job(
    ctx: &JobContext,
    kind: JobKind,
    now: DateTime<Utc>,
) -> Result<u64, ServiceError> {
    let job = job_for(kind);
    let started = std::time::Instant::now();
    let result = job.run(ctx, now).await;
    match &result {
        Ok(affected) => info!(
            job = %kind,
            affected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "job finished"
        ),
        Err(e) => error!(job = %kind, error = %e, "job failed"),
    }
    result
}

/// Single-worker queue of job runs.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<JobKind>,
}

impl JobQueue {
    /// Spawns the worker. It stops once every queue handle is dropped.
    pub fn start(ctx: JobContext, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut rx) = mpsc::channel::<JobKind>(capacity.max(1));
        let worker = tokio::spawn(async move {
            info!("Job worker started");
            while let Some(kind) = rx.recv().await {
                // Failures are logged by run_job; the worker keeps going.
                let _ = run_job(&ctx, kind, Utc::now()).await;
            }
            info!("Job worker stopped");
        });
        (Self { sender }, worker)
    }

    pub async fn enqueue(&self, kind: JobKind) -> Result<(), ServiceError> {
        self.sender
            .send(kind)
            .await
            .map_err(|e| ServiceError::QueueError(format!("Failed to enqueue {}: {}", kind, e)))
    }
}

/// Interval timers feeding a [`JobQueue`].
pub struct Scheduler {
    queue: JobQueue,
}

impl Scheduler {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    /// One timer task per job. The first run happens one period after start.
    pub fn spawn_all(&self, config: &AppConfig) -> Vec<JoinHandle<()>> {
        if !config.jobs_enabled {
            info!("Background jobs disabled by configuration");
            return Vec::new();
        }

        JobKind::iter()
            .map(|kind| {
                let queue = self.queue.clone();
                let period = kind.period(config);
                info!(job = %kind, period_secs = period.as_secs(), "scheduling job");
                tokio::spawn(async move {
                    let mut ticker = interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    ticker.tick().await;
                    loop {
                        ticker.tick().await;
                        if let Err(e) = queue.enqueue(kind).await {
                            warn!(job = %kind, error = %e, "scheduler stopping");
                            break;
                        }
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_names_parse_in_kebab_case() {
        assert_eq!(
            JobKind::parse("escalate-delayed-orders").unwrap(),
            JobKind::EscalateDelayedOrders
        );
        assert_eq!(
            JobKind::parse(" cart-abandonment-reminder ").unwrap(),
            JobKind::CartAbandonmentReminder
        );
        assert_eq!(
            JobKind::AutoDeleteTrashedEmails.to_string(),
            "auto-delete-trashed-emails"
        );
        assert!(matches!(
            JobKind::parse("reindex"),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn periods_follow_configuration() {
        let mut config = AppConfig::new(
            "sqlite::memory:".into(),
            "x".repeat(64),
            "127.0.0.1".into(),
            0,
            "test".into(),
        );
        config.trash_purge_interval_secs = 86_400;
        config.escalation_interval_secs = 0;
        assert_eq!(
            JobKind::AutoDeleteTrashedEmails.period(&config),
            Duration::from_secs(86_400)
        );
        assert_eq!(
            JobKind::EscalateDelayedOrders.period(&config),
            Duration::from_secs(1)
        );
    }
}
