use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgConnection};

use crate::error::AppError;
use crate::utils::non_blank;

pub const DEFAULT_TRAFFIC_SPLIT: i32 = 50;
const MIN_TRAFFIC_SPLIT: i64 = 10;
const MAX_TRAFFIC_SPLIT: i64 = 90;

pub const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Serialize, FromRow)]
pub struct AbTest {
    pub id: i64,
    pub test_name: String,
    pub description: Option<String>,
    pub variant_a_name: String,
    pub variant_b_name: String,
    pub traffic_split: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 带参与人数和转化统计的测试
#[derive(Debug, Serialize, FromRow)]
pub struct AbTestSummary {
    pub id: i64,
    pub test_name: String,
    pub description: Option<String>,
    pub variant_a_name: String,
    pub variant_b_name: String,
    pub traffic_split: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_participants: i64,
    pub variant_a_count: i64,
    pub variant_b_count: i64,
    pub variant_a_conversions: i64,
    pub variant_b_conversions: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAbTestRequest {
    pub test_name: Option<String>,
    pub description: Option<String>,
    pub variant_a_name: Option<String>,
    pub variant_b_name: Option<String>,
    pub traffic_split: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteAbTestRequest {
    pub test_id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAbTest {
    pub test_name: String,
    pub description: String,
    pub variant_a_name: String,
    pub variant_b_name: String,
    pub traffic_split: i32,
}

impl TryFrom<CreateAbTestRequest> for NewAbTest {
    type Error = AppError;

    fn try_from(req: CreateAbTestRequest) -> Result<Self, Self::Error> {
        let (Some(test_name), Some(description), Some(variant_a_name), Some(variant_b_name)) = (
            non_blank(req.test_name),
            non_blank(req.description),
            non_blank(req.variant_a_name),
            non_blank(req.variant_b_name),
        ) else {
            return Err(AppError::Validation("Missing required fields".to_string()));
        };

        Ok(NewAbTest {
            test_name,
            description,
            variant_a_name,
            variant_b_name,
            traffic_split: traffic_split(req.traffic_split.as_ref())?,
        })
    }
}

/// Leading integer of a number or numeric string; absent, zero or unparseable
/// values fall back to the default split.
pub fn traffic_split(value: Option<&Value>) -> Result<i32, AppError> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => leading_integer(s),
        _ => None,
    };

    match parsed {
        None | Some(0) => Ok(DEFAULT_TRAFFIC_SPLIT),
        Some(split) if (MIN_TRAFFIC_SPLIT..=MAX_TRAFFIC_SPLIT).contains(&split) => {
            Ok(split as i32)
        }
        Some(_) => Err(AppError::Validation(
            "Traffic split must be between 10 and 90".to_string(),
        )),
    }
}

fn leading_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim_start();
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        return None;
    }
    // 超出 i64 的数字串按越界处理，而不是回落到默认值
    Some(digits.parse::<i64>().map_or(sign * i64::MAX, |n| sign * n))
}

/// A test can only be completed while it is active.
pub fn ensure_active(status: &str) -> Result<(), AppError> {
    if status == STATUS_ACTIVE {
        Ok(())
    } else {
        Err(AppError::Conflict("Test is not active".to_string()))
    }
}

impl AbTest {
    pub async fn list_with_stats(conn: &mut PgConnection) -> Result<Vec<AbTestSummary>, sqlx::Error> {
        sqlx::query_as::<_, AbTestSummary>(
            r#"
            SELECT
                t.id,
                t.test_name,
                t.description,
                t.variant_a_name,
                t.variant_b_name,
                t.traffic_split,
                t.status,
                t.created_at,
                t.completed_at,
                COUNT(DISTINCT p.user_id) AS total_participants,
                COALESCE(SUM(CASE WHEN p.variant_assigned = 'A' THEN 1 ELSE 0 END), 0)::BIGINT AS variant_a_count,
                COALESCE(SUM(CASE WHEN p.variant_assigned = 'B' THEN 1 ELSE 0 END), 0)::BIGINT AS variant_b_count,
                COALESCE(SUM(CASE WHEN p.variant_assigned = 'A' AND p.converted THEN 1 ELSE 0 END), 0)::BIGINT AS variant_a_conversions,
                COALESCE(SUM(CASE WHEN p.variant_assigned = 'B' AND p.converted THEN 1 ELSE 0 END), 0)::BIGINT AS variant_b_conversions
            FROM ab_tests t
            LEFT JOIN ab_test_participants p ON t.id = p.test_id
            GROUP BY t.id, t.test_name, t.description, t.variant_a_name, t.variant_b_name,
                     t.traffic_split, t.status, t.created_at, t.completed_at
            ORDER BY
                CASE WHEN t.status = 'active' THEN 0 ELSE 1 END,
                t.created_at DESC
            "#,
        )
        .fetch_all(conn)
        .await
    }

    pub async fn create(conn: &mut PgConnection, new: NewAbTest) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AbTest>(
            r#"
            INSERT INTO ab_tests
                (test_name, description, variant_a_name, variant_b_name, traffic_split, status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'active', NOW())
            RETURNING id, test_name, description, variant_a_name, variant_b_name,
                      traffic_split, status, created_at, completed_at
            "#,
        )
        .bind(new.test_name)
        .bind(new.description)
        .bind(new.variant_a_name)
        .bind(new.variant_b_name)
        .bind(new.traffic_split)
        .fetch_one(conn)
        .await
    }

    pub async fn find_status(conn: &mut PgConnection, id: i64) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>("SELECT status FROM ab_tests WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// 只更新仍处于 active 的测试，返回受影响行数
    pub async fn complete(conn: &mut PgConnection, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE ab_tests
            SET status = 'completed', completed_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
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

    fn request(split: Value) -> CreateAbTestRequest {
        serde_json::from_value(json!({
            "test_name": "Onboarding copy",
            "description": "Short vs long welcome text",
            "variant_a_name": "short",
            "variant_b_name": "long",
            "traffic_split": split,
        }))
        .unwrap()
    }

    #[test]
    fn split_out_of_range_is_rejected() {
        for split in [
            json!(5),
            json!(9),
            json!(91),
            json!("95"),
            json!(-20),
            json!("99999999999999999999999"),
            json!("-99999999999999999999999"),
            json!(1e300),
        ] {
            let err = NewAbTest::try_from(request(split)).unwrap_err();
            assert!(matches!(err, AppError::Validation(ref m) if m == "Traffic split must be between 10 and 90"));
        }
    }

    #[test]
    fn split_defaults_and_coerces() {
        let cases = [
            (json!(null), 50),
            (json!(0), 50),
            (json!("abc"), 50),
            (json!(50), 50),
            (json!("30"), 30),
            (json!("70%"), 70),
            (json!(10), 10),
            (json!(90.9), 90),
        ];
        for (split, expected) in cases {
            let new = NewAbTest::try_from(request(split.clone())).unwrap();
            assert_eq!(new.traffic_split, expected, "split {split}");
        }
    }

    #[test]
    fn missing_fields_win_over_split() {
        let req: CreateAbTestRequest = serde_json::from_value(json!({
            "test_name": "x",
            "description": "  ",
            "variant_a_name": "a",
            "variant_b_name": "b",
            "traffic_split": 5,
        }))
        .unwrap();
        let err = NewAbTest::try_from(req).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Missing required fields"));
    }

    #[test]
    fn only_active_tests_complete() {
        assert!(ensure_active("active").is_ok());
        assert!(matches!(ensure_active("completed"), Err(AppError::Conflict(_))));
        assert!(matches!(ensure_active("paused"), Err(AppError::Conflict(_))));
    }
}
