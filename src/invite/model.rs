use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::utils::is_valid_email;

/// Access durations the webhook receiver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum DurationDays {
    Week,
    Month,
    TwoMonths,
    Quarter,
}

impl DurationDays {
    pub fn days(self) -> u32 {
        match self {
            DurationDays::Week => 7,
            DurationDays::Month => 30,
            DurationDays::TwoMonths => 60,
            DurationDays::Quarter => 90,
        }
    }

    /// Strings and JSON numbers are compared by their string form; an
    /// integral float such as `7.0` reads as `7`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => i.to_string(),
                (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => (f as i64).to_string(),
                _ => n.to_string(),
            },
            _ => return None,
        };
        match raw.as_str() {
            "7" => Some(DurationDays::Week),
            "30" => Some(DurationDays::Month),
            "60" => Some(DurationDays::TwoMonths),
            "90" => Some(DurationDays::Quarter),
            _ => None,
        }
    }
}

impl fmt::Display for DurationDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.days())
    }
}

impl From<DurationDays> for String {
    fn from(value: DurationDays) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Deserialize)]
pub struct SendInviteBody {
    pub email: Option<String>,
    pub duration: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRequest {
    pub recipient_email: String,
    pub duration_days: DurationDays,
}

impl TryFrom<SendInviteBody> for InviteRequest {
    type Error = AppError;

    fn try_from(body: SendInviteBody) -> Result<Self, Self::Error> {
        // 不做 trim，首尾空白按格式错误处理
        let email = body.email.filter(|e| !e.is_empty());
        let duration = body.duration.filter(|d| match d {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => n.as_f64() != Some(0.0),
            _ => true,
        });

        let (Some(email), Some(duration)) = (email, duration) else {
            return Err(AppError::Validation(
                "Email and duration are required".to_string(),
            ));
        };

        if !is_valid_email(&email) {
            return Err(AppError::Validation("Invalid email format".to_string()));
        }

        let duration_days = DurationDays::from_value(&duration).ok_or_else(|| {
            AppError::Validation("Invalid duration. Must be 7, 30, 60, or 90 days".to_string())
        })?;

        Ok(InviteRequest {
            recipient_email: email,
            duration_days,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Sent,
    Failed,
    Error,
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InviteStatus::Sent => "sent",
            InviteStatus::Failed => "failed",
            InviteStatus::Error => "error",
        })
    }
}
