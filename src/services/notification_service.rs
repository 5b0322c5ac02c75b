use crate::entities::{booking_entity as bookings, notification_entity as notifications};
use crate::error::AppResult;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, Set};
use serde_json::json;

/// 站内通知（推送渠道不在本服务范围内）
#[derive(Clone)]
pub struct NotificationService {
    pool: DatabaseConnection,
}

impl NotificationService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn notify(
        &self,
        user_id: i64,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> AppResult<notifications::Model> {
        Self::notify_in(&self.pool, user_id, title, body, data).await
    }

    pub async fn notify_in<C: ConnectionTrait>(
        conn: &C,
        user_id: i64,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> AppResult<notifications::Model> {
        let row = notifications::ActiveModel {
            user_id: Set(user_id),
            title: Set(title.to_string()),
            body: Set(body.to_string()),
            data: Set(Some(data)),
            is_read: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        Ok(row)
    }

    /// 预订成功后通知顾客与服务方
    pub async fn booking_confirmed(&self, booking: &bookings::Model) -> AppResult<()> {
        let data = json!({ "booking_id": booking.id, "reference": booking.reference });
        self.notify(
            booking.user_id,
            "Booking confirmed",
            &format!(
                "Your booking {} starting {} is confirmed.",
                booking.reference,
                booking.starts_at.format("%Y-%m-%d %H:%M UTC")
            ),
            data.clone(),
        )
        .await?;
        self.notify(
            booking.provider_id,
            "New booking",
            &format!(
                "Booking {} was placed for {} unit(s).",
                booking.reference, booking.units
            ),
            data,
        )
        .await?;
        Ok(())
    }

    pub async fn booking_cancelled(&self, booking: &bookings::Model, refund: i64) -> AppResult<()> {
        let data = json!({ "booking_id": booking.id, "refund_amount": refund });
        self.notify(
            booking.user_id,
            "Booking cancelled",
            &format!("Booking {} was cancelled.", booking.reference),
            data.clone(),
        )
        .await?;
        self.notify(
            booking.provider_id,
            "Booking cancelled",
            &format!("Booking {} was cancelled by the customer.", booking.reference),
            data,
        )
        .await?;
        Ok(())
    }
}
