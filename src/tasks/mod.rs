//! Background scheduled tasks for the application.
//!
//! This module centralizes the recurring jobs (delayed job dispatch such as booking
//! reminders, and loyalty points expiry). Call `spawn_all` once during startup.

use crate::config::TasksConfig;
use crate::services::{JobQueue, NotificationService, PointsLedgerService};
use chrono::Utc;

/// Spawn all background tasks.
///
/// Notes
/// - Each pass is idempotent as implemented in its service; a failed pass is logged and retried
///   on the next tick.
/// - This function detaches tasks via `tokio::spawn`; it does not block.
pub fn spawn_all(
    config: TasksConfig,
    job_queue: JobQueue,
    notification_service: NotificationService,
    points_service: PointsLedgerService,
) {
    // 延迟任务（预订提醒等）
    {
        let batch = config.job_batch_size;
        let interval = std::time::Duration::from_secs(config.job_poll_secs.max(1));
        tokio::spawn(async move {
            loop {
                match job_queue.run_due(Utc::now(), batch, &notification_service).await {
                    Ok(summary) if summary.done + summary.failed > 0 => log::info!(
                        "Scheduled jobs processed: done={} failed={}",
                        summary.done,
                        summary.failed
                    ),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to run scheduled jobs: {e:?}"),
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    // 积分过期
    {
        let interval = std::time::Duration::from_secs(config.points_expiry_secs.max(1));
        tokio::spawn(async move {
            loop {
                match points_service.expire_due(Utc::now()).await {
                    Ok(summary) if summary.entries > 0 => log::info!(
                        "Expired points: entries={} points={}",
                        summary.entries,
                        summary.points
                    ),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to expire points: {e:?}"),
                }
                tokio::time::sleep(interval).await;
            }
        });
    }
}
