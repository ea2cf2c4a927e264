use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgConnection};

use crate::error::AppError;
use crate::utils::{non_blank, parse_id};

#[derive(Debug, Serialize, FromRow)]
pub struct HealthTip {
    pub id: i64,
    pub tip_content: String,
    pub category: String,
    pub citation: Option<String>,
    pub source_journal: Option<String>,
    pub publication_year: Option<i32>,
    pub is_active: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct CategoryStat {
    pub category: String,
    pub count: i64,
    pub active_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TipListResponse {
    pub success: bool,
    pub total: usize,
    pub tips: Vec<HealthTip>,
    pub category_stats: Vec<CategoryStat>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTipRequest {
    pub tip_content: Option<String>,
    pub category: Option<String>,
    pub citation: Option<String>,
    pub source_journal: Option<String>,
    pub publication_year: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTip {
    pub tip_content: String,
    pub category: String,
    pub citation: Option<String>,
    pub source_journal: Option<String>,
    pub publication_year: Option<i32>,
    pub is_active: bool,
}

impl TryFrom<CreateTipRequest> for NewTip {
    type Error = AppError;

    fn try_from(req: CreateTipRequest) -> Result<Self, Self::Error> {
        let (Some(tip_content), Some(category)) = (non_blank(req.tip_content), non_blank(req.category))
        else {
            return Err(AppError::Validation(
                "tip_content and category are required".to_string(),
            ));
        };
        Ok(NewTip {
            tip_content,
            category,
            citation: non_blank(req.citation),
            source_journal: non_blank(req.source_journal),
            publication_year: req.publication_year.filter(|year| *year != 0),
            // 未显式关闭即为启用
            is_active: req.is_active.unwrap_or(true),
        })
    }
}

/// Absent fields keep their stored value. For the nullable columns an
/// explicit `null` clears the value.
#[derive(Debug, Deserialize)]
pub struct UpdateTipRequest {
    pub id: Option<Value>,
    pub tip_content: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub citation: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub source_journal: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub publication_year: Option<Option<i32>>,
    pub is_active: Option<bool>,
}

// 字段出现即为 Some，值为 null 时是 Some(None)
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// `(should_set, value)` for a nullable column patch.
fn patch<T>(field: Option<Option<T>>) -> (bool, Option<T>) {
    match field {
        Some(value) => (true, value),
        None => (false, None),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteTipQuery {
    pub id: Option<String>,
}

pub fn require_id(value: Option<&Value>) -> Result<i64, AppError> {
    match value.filter(|v| !v.is_null() && v.as_str().is_none_or(|s| !s.trim().is_empty())) {
        None => Err(AppError::Validation("id is required".to_string())),
        Some(v) => parse_id(v).ok_or_else(|| AppError::Validation("id must be an integer".to_string())),
    }
}

impl HealthTip {
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, HealthTip>(
            r#"
            SELECT
                id, tip_content, category, citation, source_journal,
                publication_year, is_active, last_sent_at, created_at
            FROM sms_health_tips
            ORDER BY id ASC
            "#,
        )
        .fetch_all(conn)
        .await
    }

    pub async fn category_stats(conn: &mut PgConnection) -> Result<Vec<CategoryStat>, sqlx::Error> {
        sqlx::query_as::<_, CategoryStat>(
            r#"
            SELECT
                category,
                COUNT(*) AS count,
                COALESCE(SUM(CASE WHEN is_active THEN 1 ELSE 0 END), 0)::BIGINT AS active_count
            FROM sms_health_tips
            GROUP BY category
            ORDER BY count DESC
            "#,
        )
        .fetch_all(conn)
        .await
    }

    pub async fn insert(conn: &mut PgConnection, tip: NewTip) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sms_health_tips
                (tip_content, category, citation, source_journal, publication_year, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(tip.tip_content)
        .bind(tip.category)
        .bind(tip.citation)
        .bind(tip.source_journal)
        .bind(tip.publication_year)
        .bind(tip.is_active)
        .fetch_one(conn)
        .await
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: i64,
        req: UpdateTipRequest,
    ) -> Result<u64, sqlx::Error> {
        let (set_citation, citation) = patch(req.citation);
        let (set_journal, source_journal) = patch(req.source_journal);
        let (set_year, publication_year) = patch(req.publication_year);

        let result = sqlx::query(
            r#"
            UPDATE sms_health_tips
            SET
                tip_content = COALESCE($1, tip_content),
                category = COALESCE($2, category),
                citation = CASE WHEN $3 THEN $4 ELSE citation END,
                source_journal = CASE WHEN $5 THEN $6 ELSE source_journal END,
                publication_year = CASE WHEN $7 THEN $8 ELSE publication_year END,
                is_active = COALESCE($9, is_active)
            WHERE id = $10
            "#,
        )
        .bind(non_blank(req.tip_content))
        .bind(non_blank(req.category))
        .bind(set_citation)
        .bind(citation)
        .bind(set_journal)
        .bind(source_journal)
        .bind(set_year)
        .bind(publication_year)
        .bind(req.is_active)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sms_health_tips WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn create_requires_content_and_category() {
        let req: CreateTipRequest =
            serde_json::from_value(json!({"tip_content": "Drink water", "category": ""})).unwrap();
        assert!(matches!(NewTip::try_from(req), Err(AppError::Validation(_))));
    }

    #[test]
    fn create_fills_optional_fields() {
        let req: CreateTipRequest = serde_json::from_value(json!({
            "tip_content": "Walk 20 minutes a day",
            "category": "exercise",
            "citation": "",
            "publication_year": 2021,
        }))
        .unwrap();
        let tip = NewTip::try_from(req).unwrap();
        assert_eq!(tip.citation, None);
        assert_eq!(tip.publication_year, Some(2021));
        assert!(tip.is_active);

        let req: CreateTipRequest = serde_json::from_value(json!({
            "tip_content": "x",
            "category": "y",
            "is_active": false,
        }))
        .unwrap();
        assert!(!NewTip::try_from(req).unwrap().is_active);
    }

    #[test]
    fn update_tells_null_from_absent() {
        let req: UpdateTipRequest = serde_json::from_value(json!({
            "id": 3,
            "citation": null,
            "publication_year": 2019,
        }))
        .unwrap();
        assert_eq!(patch(req.citation), (true, None));
        assert_eq!(patch(req.source_journal), (false, None));
        assert_eq!(patch(req.publication_year), (true, Some(2019)));
    }

    #[test]
    fn ids_are_required_and_numeric() {
        assert_eq!(require_id(Some(&json!(4))).unwrap(), 4);
        assert_eq!(require_id(Some(&json!("12"))).unwrap(), 12);
        assert!(matches!(require_id(None), Err(AppError::Validation(m)) if m == "id is required"));
        assert!(matches!(require_id(Some(&json!(""))), Err(AppError::Validation(m)) if m == "id is required"));
        assert!(matches!(require_id(Some(&json!("x1"))), Err(AppError::Validation(m)) if m == "id must be an integer"));
    }
}
