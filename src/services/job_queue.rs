use crate::entities::{
    BookingStatus, JobStatus, booking_entity as bookings, scheduled_job_entity as jobs,
};
use crate::error::{AppError, AppResult};
use crate::services::notification_service::NotificationService;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};

pub const JOB_BOOKING_REMINDER: &str = "booking_reminder";
const MAX_ATTEMPTS: i32 = 3;
const RETRY_DELAY_SECS: i64 = 60;

/// 开始前 24 小时与 1 小时各提醒一次
pub const REMINDER_OFFSETS_HOURS: [i64; 2] = [24, 1];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub booking_id: i64,
    pub user_id: i64,
    pub hours_before: i64,
}

/// 只保留仍在未来的提醒时间
pub fn reminder_times(starts_at: DateTime<Utc>, now: DateTime<Utc>) -> Vec<(i64, DateTime<Utc>)> {
    REMINDER_OFFSETS_HOURS
        .iter()
        .map(|h| (*h, starts_at - Duration::hours(*h)))
        .filter(|(_, at)| *at > now)
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub done: u64,
    pub failed: u64,
}

/// 持久化的延迟任务，由后台调度器执行
#[derive(Clone)]
pub struct JobQueue {
    pool: DatabaseConnection,
}

impl JobQueue {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn enqueue_tx(
        &self,
        txn: &DatabaseTransaction,
        job_type: &str,
        payload: serde_json::Value,
        run_at: DateTime<Utc>,
    ) -> AppResult<jobs::Model> {
        let now = Utc::now();
        let job = jobs::ActiveModel {
            job_type: Set(job_type.to_string()),
            payload: Set(payload),
            run_at: Set(run_at),
            status: Set(JobStatus::Pending),
            attempts: Set(0),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        Ok(job)
    }

    pub async fn schedule_reminders_tx(
        &self,
        txn: &DatabaseTransaction,
        booking: &bookings::Model,
    ) -> AppResult<usize> {
        let times = reminder_times(booking.starts_at, Utc::now());
        for (hours_before, run_at) in &times {
            let payload = ReminderPayload {
                booking_id: booking.id,
                user_id: booking.user_id,
                hours_before: *hours_before,
            };
            self.enqueue_tx(
                txn,
                JOB_BOOKING_REMINDER,
                serde_json::to_value(payload)?,
                *run_at,
            )
            .await?;
        }
        Ok(times.len())
    }

    /// 执行到期任务；失败的任务延迟重试，超过次数后标记 failed
    pub async fn run_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
        notifications: &NotificationService,
    ) -> AppResult<DispatchSummary> {
        let due = jobs::Entity::find()
            .filter(jobs::Column::Status.eq(JobStatus::Pending))
            .filter(jobs::Column::RunAt.lte(now))
            .order_by_asc(jobs::Column::RunAt)
            .limit(limit)
            .all(&self.pool)
            .await?;

        let mut summary = DispatchSummary::default();
        for job in due {
            let job_id = job.id;
            match self.execute(&job, notifications).await {
                Ok(()) => {
                    let mut am = job.into_active_model();
                    am.status = Set(JobStatus::Done);
                    am.updated_at = Set(Utc::now());
                    am.update(&self.pool).await?;
                    summary.done += 1;
                }
                Err(err) => {
                    log::warn!("job {job_id} failed: {err}");
                    let attempts = job.attempts + 1;
                    let mut am = job.into_active_model();
                    am.attempts = Set(attempts);
                    am.last_error = Set(Some(err.to_string()));
                    if attempts >= MAX_ATTEMPTS {
                        am.status = Set(JobStatus::Failed);
                    } else {
                        am.run_at = Set(now + Duration::seconds(RETRY_DELAY_SECS));
                    }
                    am.updated_at = Set(Utc::now());
                    am.update(&self.pool).await?;
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn execute(&self, job: &jobs::Model, notifications: &NotificationService) -> AppResult<()> {
        match job.job_type.as_str() {
            JOB_BOOKING_REMINDER => {
                let payload: ReminderPayload = serde_json::from_value(job.payload.clone())?;
                let booking = bookings::Entity::find_by_id(payload.booking_id)
                    .one(&self.pool)
                    .await?;
                // 已取消或已删除的预订不再提醒
                let Some(booking) = booking.filter(|b| b.status == BookingStatus::Confirmed)
                else {
                    return Ok(());
                };
                notifications
                    .notify(
                        payload.user_id,
                        "Upcoming booking",
                        &format!(
                            "Booking {} starts in {} hour(s).",
                            booking.reference, payload.hours_before
                        ),
                        serde_json::json!({ "booking_id": booking.id }),
                    )
                    .await?;
                Ok(())
            }
            other => Err(AppError::InternalError(format!("Unknown job type {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reminder_times_skip_past_offsets() {
        let now = Utc::now();
        assert_eq!(reminder_times(now + Duration::hours(48), now).len(), 2);

        let soon = reminder_times(now + Duration::hours(5), now);
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].0, 1);

        assert!(reminder_times(now + Duration::minutes(30), now).is_empty());
    }
}
