use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::PortalError;

pub const DEFAULT_CHECKOUT_BASE_URL: &str = "https://checkout.stripe.com/c/pay";
pub const DEFAULT_SESSION_FILE: &str = ".portal-session.json";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Portal options. Pass this into `Portal::new()` or `BackendClient::new()`.
#[derive(Debug, Clone)]
pub struct PortalOptions {
    /// Root of the portal API, e.g. `http://localhost:5001`. Endpoint paths (`/api/...`) are appended to it.
    pub api_base_url: String,
    /// Hosted checkout page. The checkout session id is appended as the last path segment.
    pub checkout_base_url: String,
    /// Price id the server uses for the standard plan. Used to resolve plan types from records.
    pub standard_price_id: Option<String>,
    /// Price id the server uses for the premium plan.
    pub premium_price_id: Option<String>,
    /// Where the session is kept between runs.
    pub session_file: PathBuf,
    /// Upper bound for a single request. The request fails once with `RequestFailed` after this.
    pub timeout: Duration,
    /// Whether the portal should print colored debug statements.
    pub debug: bool,
    /// Whether redirects open the user's default browser.
    pub open_browser: bool,
}

impl PortalOptions {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            checkout_base_url: DEFAULT_CHECKOUT_BASE_URL.to_string(),
            standard_price_id: None,
            premium_price_id: None,
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            timeout: DEFAULT_TIMEOUT,
            debug: false,
            open_browser: true,
        }
    }

    /// Builds options from the process environment, reading a `.env` file first if present.
    pub fn from_env() -> Result<Self, PortalError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, PortalError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("PORTAL_API_BASE_URL")
            .ok_or_else(|| PortalError::InvalidConfig("PORTAL_API_BASE_URL is not set".into()))?;

        let mut options = Self::new(api_base_url);

        if let Some(url) = lookup("PORTAL_CHECKOUT_BASE_URL") {
            options.checkout_base_url = url;
        }
        options.standard_price_id = lookup("PORTAL_STANDARD_PRICE_ID").filter(|v| !v.is_empty());
        options.premium_price_id = lookup("PORTAL_PREMIUM_PRICE_ID").filter(|v| !v.is_empty());

        if let Some(path) = lookup("PORTAL_SESSION_FILE") {
            options.session_file = PathBuf::from(path);
        }

        if let Some(secs) = lookup("PORTAL_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                PortalError::InvalidConfig(format!("PORTAL_TIMEOUT_SECS is invalid: {}", secs))
            })?;
            options.timeout = Duration::from_secs(secs);
        }

        if let Some(flag) = lookup("PORTAL_DEBUG") {
            options.debug = parse_flag("PORTAL_DEBUG", &flag)?;
        }

        if let Some(flag) = lookup("PORTAL_OPEN_BROWSER") {
            options.open_browser = parse_flag("PORTAL_OPEN_BROWSER", &flag)?;
        }

        options.validate()?;
        Ok(options)
    }

    /// Verify that the URLs are usable before any request is made.
    pub fn validate(&self) -> Result<(), PortalError> {
        for (name, raw) in [
            ("api_base_url", &self.api_base_url),
            ("checkout_base_url", &self.checkout_base_url),
        ] {
            let url = Url::parse(raw)
                .map_err(|_| PortalError::InvalidConfig(format!("{} is not a URL: {}", name, raw)))?;

            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(PortalError::InvalidConfig(format!(
                    "{} must be http or https: {}",
                    name, raw
                )));
            }
        }

        if self.timeout.is_zero() {
            return Err(PortalError::InvalidConfig("timeout must be non-zero".into()));
        }

        Ok(())
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, PortalError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(PortalError::InvalidConfig(format!("{} is invalid: {}", name, raw))),
    }
}
