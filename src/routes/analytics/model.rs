use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection};

use crate::utils::percentage;

/// Number of sends returned in `recentSends`.
pub const RECENT_SENDS_LIMIT: i64 = 50;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CampaignStats {
    pub id: i64,
    pub campaign_name: String,
    pub campaign_type: Option<String>,
    pub is_active: bool,
    pub total_sends: i64,
    pub delivered: i64,
    pub failed: i64,
    pub pending: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct RecentSend {
    pub id: i64,
    pub phone_number: String,
    pub message_content: String,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub campaign_name: String,
}

#[derive(Debug, Default, Serialize, FromRow)]
pub struct PreferenceStats {
    pub total_users: i64,
    pub sms_enabled: i64,
    pub weekly_tips_enabled: i64,
    pub monthly_reminder_enabled: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub total_sent: i64,
    pub total_delivered: i64,
    pub total_failed: i64,
    pub delivery_rate: f64,
    pub failure_rate: f64,
}

impl DeliverySummary {
    pub fn from_campaigns(campaigns: &[CampaignStats]) -> Self {
        let total_sent = campaigns.iter().map(|c| c.total_sends).sum();
        let total_delivered = campaigns.iter().map(|c| c.delivered).sum();
        let total_failed = campaigns.iter().map(|c| c.failed).sum();
        Self {
            total_sent,
            total_delivered,
            total_failed,
            delivery_rate: percentage(total_delivered, total_sent),
            failure_rate: percentage(total_failed, total_sent),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsAnalytics {
    pub campaigns: Vec<CampaignStats>,
    pub recent_sends: Vec<RecentSend>,
    pub preferences_stats: PreferenceStats,
    pub summary: DeliverySummary,
}

impl SmsAnalytics {
    pub async fn load(conn: &mut PgConnection) -> Result<Self, sqlx::Error> {
        let campaigns = campaign_stats(&mut *conn).await?;
        let recent_sends = recent_sends(&mut *conn).await?;
        let preferences_stats = preference_stats(&mut *conn).await?.unwrap_or_default();
        let summary = DeliverySummary::from_campaigns(&campaigns);

        Ok(Self {
            campaigns,
            recent_sends,
            preferences_stats,
            summary,
        })
    }
}

async fn campaign_stats(conn: &mut PgConnection) -> Result<Vec<CampaignStats>, sqlx::Error> {
    sqlx::query_as::<_, CampaignStats>(
        r#"
        SELECT
            c.id,
            c.campaign_name,
            c.campaign_type,
            c.is_active,
            COUNT(s.id) AS total_sends,
            COALESCE(SUM(CASE WHEN s.status = 'delivered' THEN 1 ELSE 0 END), 0)::BIGINT AS delivered,
            COALESCE(SUM(CASE WHEN s.status = 'failed' THEN 1 ELSE 0 END), 0)::BIGINT AS failed,
            COALESCE(SUM(CASE WHEN s.status = 'pending' THEN 1 ELSE 0 END), 0)::BIGINT AS pending
        FROM sms_campaigns c
        LEFT JOIN sms_campaign_sends s ON c.id = s.campaign_id
        GROUP BY c.id, c.campaign_name, c.campaign_type, c.is_active
        ORDER BY c.id
        "#,
    )
    .fetch_all(conn)
    .await
}

async fn recent_sends(conn: &mut PgConnection) -> Result<Vec<RecentSend>, sqlx::Error> {
    sqlx::query_as::<_, RecentSend>(
        r#"
        SELECT
            s.id,
            s.phone_number,
            s.message_content,
            s.status,
            s.sent_at,
            s.delivered_at,
            s.error_message,
            c.campaign_name
        FROM sms_campaign_sends s
        JOIN sms_campaigns c ON s.campaign_id = c.id
        ORDER BY s.sent_at DESC NULLS LAST
        LIMIT $1
        "#,
    )
    .bind(RECENT_SENDS_LIMIT)
    .fetch_all(conn)
    .await
}

async fn preference_stats(conn: &mut PgConnection) -> Result<Option<PreferenceStats>, sqlx::Error> {
    sqlx::query_as::<_, PreferenceStats>(
        r#"
        SELECT
            COUNT(*) AS total_users,
            COALESCE(SUM(CASE WHEN notification_preferences->>'sms_enabled' = 'true' THEN 1 ELSE 0 END), 0)::BIGINT AS sms_enabled,
            COALESCE(SUM(CASE WHEN notification_preferences->>'weekly_tips' = 'true' THEN 1 ELSE 0 END), 0)::BIGINT AS weekly_tips_enabled,
            COALESCE(SUM(CASE WHEN notification_preferences->>'monthly_reminder' = 'true' THEN 1 ELSE 0 END), 0)::BIGINT AS monthly_reminder_enabled
        FROM users
        WHERE notification_preferences IS NOT NULL
        "#,
    )
    .fetch_optional(conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(total_sends: i64, delivered: i64, failed: i64) -> CampaignStats {
        CampaignStats {
            id: 1,
            campaign_name: "weekly".into(),
            campaign_type: None,
            is_active: true,
            total_sends,
            delivered,
            failed,
            pending: total_sends - delivered - failed,
        }
    }

    #[test]
    fn zero_sends_give_zero_rates() {
        let summary = DeliverySummary::from_campaigns(&[campaign(0, 0, 0)]);
        assert_eq!(summary.delivery_rate, 0.0);
        assert_eq!(summary.failure_rate, 0.0);

        let summary = DeliverySummary::from_campaigns(&[]);
        assert_eq!(summary.total_sent, 0);
        assert_eq!(summary.delivery_rate, 0.0);
    }

    #[test]
    fn rates_aggregate_across_campaigns() {
        let summary = DeliverySummary::from_campaigns(&[campaign(2, 1, 1), campaign(1, 1, 0)]);
        assert_eq!(summary.total_sent, 3);
        assert_eq!(summary.total_delivered, 2);
        assert_eq!(summary.total_failed, 1);
        assert_eq!(summary.delivery_rate, 66.67);
        assert_eq!(summary.failure_rate, 33.33);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["deliveryRate"], 66.67);
        assert_eq!(json["totalSent"], 3);
    }
}
