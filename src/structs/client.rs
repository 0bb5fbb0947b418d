use reqwest::blocking::Client as HttpClient;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::PortalOptions;
use crate::errors::PortalError;
use crate::structs::{
    parse_timestamp, CheckoutSession, CheckoutSessionInfo, LoginResult, PlanType, Purchase,
    Registration, ScheduledChange, SessionCheck, SubscriptionRecord, SubscriptionStatus,
    UserProfile,
};

/// Everything the portal needs from the server. Each call is a single
/// request/response; nothing is retried.
#[cfg_attr(test, mockall::automock)]
pub trait Backend {
    fn verify_session(&self, token: &str) -> Result<SessionCheck, PortalError>;

    fn list_user_subscriptions(&self, user_id: u64) -> Result<Vec<SubscriptionRecord>, PortalError>;

    fn cancel_subscription(&self, token: &str, subscription_id: &str) -> Result<String, PortalError>;

    fn reactivate_subscription(
        &self,
        token: &str,
        subscription_id: &str,
    ) -> Result<String, PortalError>;

    fn schedule_change(&self, token: &str, new_plan: PlanType) -> Result<String, PortalError>;

    fn cancel_scheduled_change(&self, token: &str, schedule_id: &str)
        -> Result<String, PortalError>;

    fn create_subscription_checkout_session(
        &self,
        token: &str,
        plan: PlanType,
    ) -> Result<CheckoutSession, PortalError>;

    fn create_checkout_session(&self, token: &str) -> Result<CheckoutSession, PortalError>;

    fn open_billing_portal(&self, token: &str, user_id: u64) -> Result<String, PortalError>;

    fn login(&self, email: &str, password: &str) -> Result<LoginResult, PortalError>;

    fn register(&self, registration: &Registration) -> Result<String, PortalError>;

    fn logout(&self, token: &str) -> Result<String, PortalError>;

    fn user_info(&self, user_id: u64) -> Result<UserProfile, PortalError>;

    fn purchase_history(&self, user_id: u64) -> Result<Vec<Purchase>, PortalError>;

    fn checkout_session_info(&self, session_id: &str) -> Result<CheckoutSessionInfo, PortalError>;

    /// URL of the hosted checkout page for a session created by the server.
    fn hosted_checkout_url(&self, session: &CheckoutSession) -> String;
}

/// Portal API client. Used to interact with the subscription backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: HttpClient,
    api_base_url: String,
    checkout_base_url: String,
    plans: PlanResolver,
}

impl BackendClient {
    /// Creates a new client. Options are validated; no request is made.
    pub fn new(options: &PortalOptions) -> Result<Self, PortalError> {
        options.validate()?;

        let http = HttpClient::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| PortalError::InvalidConfig(err.to_string()))?;

        Ok(Self {
            http,
            api_base_url: options.api_base_url.trim_end_matches('/').to_string(),
            checkout_base_url: options.checkout_base_url.trim_end_matches('/').to_string(),
            plans: PlanResolver {
                standard_price_id: options.standard_price_id.clone(),
                premium_price_id: options.premium_price_id.clone(),
            },
        })
    }

    /// POST a JSON body to an endpoint of the portal API and decode the reply.
    pub fn api_call<B, T>(&self, path: &str, token: Option<&str>, body: &B) -> Result<T, PortalError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        // Append a / to path if it does not start with one
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        let url = format!("{}{}", self.api_base_url, path);

        let mut request = self.http.post(&url).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        debug!(%path, authenticated = token.is_some(), "portal api request");

        let response = request.send().map_err(|err| {
            warn!(%path, error = %err, "portal api request failed");
            PortalError::RequestFailed
        })?;

        let status = response.status();
        let text = response.text().map_err(|_| PortalError::RequestFailed)?;

        // Error replies are JSON too; a body that is not JSON only matters on success
        let data: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(data) => data,
                Err(_) if !status.is_success() => Value::Null,
                Err(_) => return Err(PortalError::FailedToDecode),
            }
        };

        debug!(%path, status = status.as_u16(), "portal api response");

        check_response(status, &data)?;

        serde_json::from_value(data).map_err(|err| {
            warn!(%path, error = %err, "portal api response did not match");
            PortalError::FailedToDecode
        })
    }

    fn message_call<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<String, PortalError> {
        let reply: MessageReply = self.api_call(path, token, body)?;
        Ok(reply.message.unwrap_or_default())
    }

    fn checkout_call<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<CheckoutSession, PortalError> {
        let reply: CheckoutReply = self.api_call(path, Some(token), body)?;

        match reply.id {
            Some(id) if !id.is_empty() => Ok(CheckoutSession { id, url: reply.url }),
            _ => Err(PortalError::BackendRejected(
                reply
                    .error
                    .unwrap_or_else(|| "Failed to create a checkout session.".to_string()),
            )),
        }
    }

    /// Turns one raw subscription object into a record. `None` when the object has no usable id.
    /// Every other field is read on its own; a malformed one counts as absent.
    fn normalize_subscription(&self, raw: Value) -> Option<SubscriptionRecord> {
        let Some(id) = text_field(&raw, "id") else {
            warn!(record = %raw, "skipping subscription record without id");
            return None;
        };

        let plan_name = text_field(&raw, "plan_name");
        let price_id = text_field(&raw, "price_id");

        let plan_type = self
            .plans
            .resolve(
                text_field(&raw, "plan_type").as_deref(),
                price_id.as_deref(),
                plan_name.as_deref(),
            )
            .unwrap_or_else(|| {
                warn!(
                    subscription_id = %id,
                    price_id = ?price_id,
                    "could not resolve plan type, assuming premium"
                );
                PlanType::Premium
            });

        let scheduled_change = raw
            .get("scheduled_change")
            .filter(|v| v.is_object())
            .and_then(|v| self.normalize_scheduled_change(&id, v));

        Some(SubscriptionRecord {
            plan_type,
            plan_name,
            status: SubscriptionStatus::from(text_field(&raw, "status").unwrap_or_default()),
            current_period_end: raw
                .get("current_period_end")
                .and_then(parse_timestamp)
                .map(|dt| dt.timestamp()),
            cancel_at_period_end: raw
                .get("cancel_at_period_end")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            scheduled_change,
            created_at: raw.get("created_at").and_then(parse_timestamp),
            id,
        })
    }

    fn normalize_scheduled_change(&self, subscription_id: &str, raw: &Value) -> Option<ScheduledChange> {
        let schedule_id = text_field(raw, "schedule_id")?;
        let next_plan_name = text_field(raw, "next_plan_name");

        let Some(next_plan_type) = self.plans.resolve(
            text_field(raw, "next_plan_type").as_deref(),
            text_field(raw, "next_price_id").as_deref(),
            next_plan_name.as_deref(),
        ) else {
            warn!(%subscription_id, %schedule_id, "ignoring scheduled change to unknown plan");
            return None;
        };

        Some(ScheduledChange {
            schedule_id,
            next_plan_type,
            next_plan_name: next_plan_name
                .unwrap_or_else(|| next_plan_type.display_name().to_string()),
            change_date: raw
                .get("change_date")
                .and_then(parse_timestamp)
                .map(|dt| dt.timestamp()),
        })
    }
}

/// Non-empty string field. Numbers are accepted and printed, anything else is absent.
fn text_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Backend for BackendClient {
    fn verify_session(&self, token: &str) -> Result<SessionCheck, PortalError> {
        let result: Result<VerifyReply, _> =
            self.api_call("/api/verify-session", None, &json!({ "session_token": token }));

        match result {
            Ok(reply) => Ok(SessionCheck {
                valid: true,
                user_id: reply.user_id,
                user_name: reply.user_name,
            }),
            Err(PortalError::InvalidSession) => Ok(SessionCheck::default()),
            Err(err) => Err(err),
        }
    }

    fn list_user_subscriptions(&self, user_id: u64) -> Result<Vec<SubscriptionRecord>, PortalError> {
        let reply: SubscriptionsReply = self.api_call(
            "/api/user-subscription-history",
            None,
            &json!({ "user_id": user_id }),
        )?;

        Ok(reply
            .subscriptions
            .into_iter()
            .filter_map(|raw| self.normalize_subscription(raw))
            .collect())
    }

    fn cancel_subscription(&self, token: &str, subscription_id: &str) -> Result<String, PortalError> {
        self.message_call(
            "/api/cancel-subscription",
            Some(token),
            &json!({ "subscription_id": subscription_id }),
        )
    }

    fn reactivate_subscription(
        &self,
        token: &str,
        subscription_id: &str,
    ) -> Result<String, PortalError> {
        self.message_call(
            "/api/reactivate-subscription",
            Some(token),
            &json!({ "subscription_id": subscription_id }),
        )
    }

    fn schedule_change(&self, token: &str, new_plan: PlanType) -> Result<String, PortalError> {
        self.message_call(
            "/api/schedule-plan-change",
            Some(token),
            &json!({ "new_plan_type": new_plan }),
        )
    }

    fn cancel_scheduled_change(
        &self,
        token: &str,
        schedule_id: &str,
    ) -> Result<String, PortalError> {
        self.message_call(
            "/api/cancel-scheduled-change",
            Some(token),
            &json!({ "schedule_id": schedule_id }),
        )
    }

    fn create_subscription_checkout_session(
        &self,
        token: &str,
        plan: PlanType,
    ) -> Result<CheckoutSession, PortalError> {
        self.checkout_call(
            "/api/subscription",
            token,
            &json!({ "plan_name": plan.catalog_name(), "plan_type": plan }),
        )
    }

    fn create_checkout_session(&self, token: &str) -> Result<CheckoutSession, PortalError> {
        self.checkout_call("/api/checkout", token, &json!({}))
    }

    fn open_billing_portal(&self, token: &str, user_id: u64) -> Result<String, PortalError> {
        let reply: UrlReply = self.api_call(
            "/api/billing-portal/start",
            Some(token),
            &json!({ "user_id": user_id }),
        )?;

        reply.url.filter(|url| !url.is_empty()).ok_or_else(|| {
            PortalError::BackendRejected(
                reply
                    .error
                    .unwrap_or_else(|| "Failed to open the billing portal.".to_string()),
            )
        })
    }

    fn login(&self, email: &str, password: &str) -> Result<LoginResult, PortalError> {
        self.api_call(
            "/api/login",
            None,
            &json!({ "email": email, "password": password }),
        )
    }

    fn register(&self, registration: &Registration) -> Result<String, PortalError> {
        self.message_call("/api/register", None, registration)
    }

    fn logout(&self, token: &str) -> Result<String, PortalError> {
        self.message_call("/api/logout", None, &json!({ "session_token": token }))
    }

    fn user_info(&self, user_id: u64) -> Result<UserProfile, PortalError> {
        let reply: UserInfoReply =
            self.api_call("/api/user-info", None, &json!({ "user_id": user_id }))?;
        Ok(reply.user)
    }

    fn purchase_history(&self, user_id: u64) -> Result<Vec<Purchase>, PortalError> {
        let reply: PurchasesReply = self.api_call(
            "/api/user-purchase-history",
            None,
            &json!({ "user_id": user_id }),
        )?;
        Ok(reply.purchases)
    }

    fn checkout_session_info(&self, session_id: &str) -> Result<CheckoutSessionInfo, PortalError> {
        let reply: CheckoutInfoReply = self.api_call(
            "/api/get-checkout-session",
            None,
            &json!({ "session_id": session_id }),
        )?;
        Ok(reply.session)
    }

    fn hosted_checkout_url(&self, session: &CheckoutSession) -> String {
        match &session.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("{}/{}", self.checkout_base_url, session.id),
        }
    }
}

/// Maps a reply to the error taxonomy. Status codes first, then the body's own flags.
fn check_response(status: StatusCode, data: &Value) -> Result<(), PortalError> {
    let error_text = data
        .get("error")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    if status == StatusCode::UNAUTHORIZED {
        return Err(PortalError::InvalidSession);
    }

    if data.get("already_subscribed").and_then(|v| v.as_bool()) == Some(true) {
        return Err(PortalError::AlreadySubscribed(
            error_text.unwrap_or_else(|| "You are already subscribed to this plan.".to_string()),
        ));
    }

    if !status.is_success() {
        let fallback = match status {
            StatusCode::BAD_REQUEST => "Bad request.",
            StatusCode::NOT_FOUND => "Not found.",
            StatusCode::TOO_MANY_REQUESTS => "You are being rate limited.",
            StatusCode::SERVICE_UNAVAILABLE => "The service is unavailable.",
            _ => "Server error.",
        };
        return Err(PortalError::BackendRejected(
            error_text.unwrap_or_else(|| fallback.to_string()),
        ));
    }

    if data.get("success").and_then(|v| v.as_bool()) == Some(false) {
        return Err(PortalError::BackendRejected(
            error_text.unwrap_or_else(|| "The request was rejected.".to_string()),
        ));
    }

    Ok(())
}

/// Resolves plan types from whatever a record carries.
#[derive(Debug, Clone, Default)]
struct PlanResolver {
    standard_price_id: Option<String>,
    premium_price_id: Option<String>,
}

impl PlanResolver {
    fn resolve(
        &self,
        plan_type: Option<&str>,
        price_id: Option<&str>,
        plan_name: Option<&str>,
    ) -> Option<PlanType> {
        match plan_type.map(|p| p.trim().to_lowercase()).as_deref() {
            Some("standard") => return Some(PlanType::Standard),
            Some("premium") => return Some(PlanType::Premium),
            _ => {}
        }

        if let Some(price_id) = price_id {
            if self.standard_price_id.as_deref() == Some(price_id) {
                return Some(PlanType::Standard);
            }
            if self.premium_price_id.as_deref() == Some(price_id) {
                return Some(PlanType::Premium);
            }
        }

        plan_name.and_then(PlanType::from_plan_name)
    }
}

#[derive(Deserialize)]
struct MessageReply {
    message: Option<String>,
}

#[derive(Deserialize)]
struct VerifyReply {
    user_id: Option<u64>,
    user_name: Option<String>,
}

#[derive(Deserialize)]
struct SubscriptionsReply {
    #[serde(default)]
    subscriptions: Vec<Value>,
}

#[derive(Deserialize)]
struct CheckoutReply {
    id: Option<String>,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct UrlReply {
    url: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct UserInfoReply {
    user: UserProfile,
}

#[derive(Deserialize)]
struct PurchasesReply {
    #[serde(default)]
    purchases: Vec<Purchase>,
}

#[derive(Deserialize)]
struct CheckoutInfoReply {
    session: CheckoutSessionInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PlanResolver {
        PlanResolver {
            standard_price_id: Some("price_std".to_string()),
            premium_price_id: Some("price_pre".to_string()),
        }
    }

    #[test]
    fn explicit_plan_type_wins() {
        assert_eq!(
            resolver().resolve(Some("standard"), Some("price_pre"), None),
            Some(PlanType::Standard)
        );
    }

    #[test]
    fn price_id_resolves_before_name() {
        assert_eq!(
            resolver().resolve(None, Some("price_std"), Some("Premium Plan")),
            Some(PlanType::Standard)
        );
    }

    #[test]
    fn falls_back_to_plan_name() {
        assert_eq!(
            resolver().resolve(None, Some("price_unknown"), Some("プレミアムプラン")),
            Some(PlanType::Premium)
        );
        assert_eq!(resolver().resolve(None, None, Some("Gold")), None);
    }

    #[test]
    fn unauthorized_is_invalid_session() {
        let result = check_response(StatusCode::UNAUTHORIZED, &json!({ "error": "bad token" }));
        assert!(matches!(result, Err(PortalError::InvalidSession)));
    }

    #[test]
    fn already_subscribed_flag_is_detected() {
        let result = check_response(
            StatusCode::BAD_REQUEST,
            &json!({ "error": "already on premium", "already_subscribed": true }),
        );
        match result {
            Err(PortalError::AlreadySubscribed(reason)) => assert_eq!(reason, "already on premium"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn success_false_is_rejected_even_on_200() {
        let result = check_response(
            StatusCode::OK,
            &json!({ "success": false, "error": "no active subscription" }),
        );
        match result {
            Err(PortalError::BackendRejected(reason)) => assert_eq!(reason, "no active subscription"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn non_json_error_body_uses_status_text() {
        let result = check_response(StatusCode::TOO_MANY_REQUESTS, &Value::Null);
        match result {
            Err(PortalError::BackendRejected(reason)) => {
                assert_eq!(reason, "You are being rate limited.")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
