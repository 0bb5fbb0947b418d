use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

pub mod client;
pub mod session;

/// The plans a user can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Standard,
    Premium,
}

impl PlanType {
    pub const ALL: [PlanType; 2] = [PlanType::Standard, PlanType::Premium];

    /// The other plan. Plan changes always target the complementary plan.
    pub fn complementary(self) -> Self {
        match self {
            PlanType::Standard => PlanType::Premium,
            PlanType::Premium => PlanType::Standard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanType::Standard => "standard",
            PlanType::Premium => "premium",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PlanType::Standard => "Standard Plan",
            PlanType::Premium => "Premium Plan",
        }
    }

    /// The name the server's catalog uses for this plan.
    pub fn catalog_name(self) -> &'static str {
        match self {
            PlanType::Standard => "スタンダードプラン",
            PlanType::Premium => "プレミアムプラン",
        }
    }

    /// Best-effort match of a server-provided plan name, in English or Japanese.
    pub fn from_plan_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();

        if name.contains("standard") || name.contains("スタンダード") {
            Some(PlanType::Standard)
        } else if name.contains("premium") || name.contains("プレミアム") {
            Some(PlanType::Premium)
        } else {
            None
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical subscription status. Both "canceled" and "cancelled" arrive from the
/// server and normalize to `Canceled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Trialing,
    Unpaid,
    Other(String),
}

impl SubscriptionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Other(raw) => raw,
        }
    }
}

impl From<&str> for SubscriptionStatus {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "active" => SubscriptionStatus::Active,
            "canceled" | "cancelled" => SubscriptionStatus::Canceled,
            "incomplete" => SubscriptionStatus::Incomplete,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "past_due" => SubscriptionStatus::PastDue,
            "trialing" => SubscriptionStatus::Trialing,
            "unpaid" => SubscriptionStatus::Unpaid,
            other => SubscriptionStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for SubscriptionStatus {
    fn from(raw: String) -> Self {
        SubscriptionStatus::from(raw.as_str())
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plan swap queued to take effect at the next renewal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledChange {
    pub schedule_id: String,
    pub next_plan_type: PlanType,
    pub next_plan_name: String,
    /// Seconds since epoch.
    pub change_date: Option<i64>,
}

/// A subscription as returned by the portal API, after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    pub plan_type: PlanType,
    /// Name shown by the server, if it sent one.
    pub plan_name: Option<String>,
    pub status: SubscriptionStatus,
    /// Next renewal or expiry boundary, in seconds since epoch.
    pub current_period_end: Option<i64>,
    /// The subscription terminates at `current_period_end` instead of renewing.
    pub cancel_at_period_end: bool,
    pub scheduled_change: Option<ScheduledChange>,
    pub created_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    pub fn display_name(&self) -> &str {
        self.plan_name
            .as_deref()
            .unwrap_or_else(|| self.plan_type.display_name())
    }
}

/// Subscription records split into the active ones and everything else.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionHistory {
    pub active: Vec<SubscriptionRecord>,
    pub past: Vec<SubscriptionRecord>,
}

/// Result of `verify_session()`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionCheck {
    pub valid: bool,
    pub user_id: Option<u64>,
    pub user_name: Option<String>,
}

/// Data returned by the server after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResult {
    pub session_token: String,
    pub user_id: u64,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

/// Registration form. `confirm_password` is checked locally and never sent.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(skip)]
    pub confirm_password: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    pub terms: bool,
    pub privacy: bool,
}

/// User object returned by `user_info()`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birthdate: Option<String>,
    pub created_at: Option<String>,
}

/// A completed one-off purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub session_id: Option<String>,
    pub product_name: Option<String>,
    #[serde(default)]
    pub amount: f64,
    pub currency: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A hosted checkout session created by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    /// Set when the server already knows the hosted page's URL.
    pub url: Option<String>,
}

/// Details of a finished checkout session, shown on the success page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionInfo {
    pub id: String,
    pub mode: Option<String>,
    pub product_name: Option<String>,
    pub plan_type: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_status: Option<String>,
}

/// Reads a point in time from whatever the server sent: epoch seconds, RFC 3339,
/// RFC 2822 (`Mon, 01 Jan 2024 00:00:00 GMT`) or `YYYY-MM-DD HH:MM:SS` in UTC.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .or_else(|_| DateTime::parse_from_rfc2822(s))
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                        .map(|naive| naive.and_utc())
                        .ok()
                })
        }
        _ => None,
    }
}

pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp))
}
