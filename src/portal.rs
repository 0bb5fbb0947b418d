use colorful::Color;
use colorful::Colorful;
use tracing::{error, info, warn};

use crate::config::PortalOptions;
use crate::engine::{classify_history, derive_view_model, Action, SubscriptionViewModel};
use crate::errors::PortalError;
use crate::render::Page;
use crate::structs::client::{Backend, BackendClient};
use crate::structs::session::{Session, SessionStore};
use crate::structs::{
    CheckoutSessionInfo, Purchase, Registration, SubscriptionHistory, UserProfile,
};

const MIN_PASSWORD_LEN: usize = 8;

/// Everything one page needs, loaded fresh from the server.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub page: Page,
    /// `None` for a guest on the home page.
    pub session: Option<Session>,
    pub view: SubscriptionViewModel,
    /// My page only.
    pub history: Option<SubscriptionHistory>,
    /// My page only. Falls back to the stored session's name and email when the server has no profile.
    pub profile: Option<UserProfile>,
    /// My page only. `None` there means the purchase history could not be loaded.
    pub purchases: Option<Vec<Purchase>>,
}

/// What happened after an action succeeded.
#[derive(Debug)]
pub enum ActionOutcome {
    /// Server state changed; the page was reloaded from scratch.
    Reloaded { message: String, dashboard: Dashboard },
    /// Server state changed but the follow-up reload failed. The change still took effect.
    Applied {
        message: String,
        reload_error: PortalError,
    },
    /// The user was sent to a hosted page (checkout or billing portal).
    Redirect { url: String },
}

/// The action boundary. Every user-initiated action goes through here, one at a
/// time, and every failure surfaces as a `PortalError` carrying a message.
pub struct Portal<B: Backend = BackendClient> {
    backend: B,
    store: SessionStore,
    session: Option<Session>,
    options: PortalOptions,
}

impl Portal<BackendClient> {
    /// Creates a portal talking to the configured server and restores any stored session.
    pub fn new(options: PortalOptions) -> Result<Self, PortalError> {
        let backend = BackendClient::new(&options)?;
        Self::with_backend(backend, options)
    }
}

impl<B: Backend> Portal<B> {
    pub fn with_backend(backend: B, options: PortalOptions) -> Result<Self, PortalError> {
        let store = SessionStore::new(options.session_file.clone());
        let session = store.load()?;

        Ok(Self {
            backend,
            store,
            session,
            options,
        })
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<Session, PortalError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(PortalError::ValidationFailure(
                "Email and password are required.".to_string(),
            ));
        }

        let login = self.backend.login(email.trim(), password).map_err(|err| match err {
            // a 401 here means wrong credentials, not an expired session
            PortalError::InvalidSession => {
                PortalError::BackendRejected("Incorrect email or password.".to_string())
            }
            other => other,
        })?;

        let session = Session::from(login);
        self.store.save(&session)?;
        self.session = Some(session.clone());

        info!(user_id = session.user_id, "logged in");
        self.announce(&format!("Welcome, {}.", session.display_name()));

        Ok(session)
    }

    /// Validates the form locally, then registers. The user logs in afterwards.
    pub fn register(&mut self, registration: &Registration) -> Result<String, PortalError> {
        validate_registration(registration)?;

        let message = self.backend.register(registration).map_err(|err| {
            warn!(error = %err, "registration failed");
            err
        })?;

        info!(email = %registration.email, "registered");
        Ok(message)
    }

    /// Ends the session. Local state is cleared even if the server call fails.
    pub fn logout(&mut self) -> Result<(), PortalError> {
        if let Some(session) = self.session.take() {
            if let Err(err) = self.backend.logout(&session.token) {
                warn!(user_id = session.user_id, error = %err, "server-side logout failed");
            }
            info!(user_id = session.user_id, "logged out");
        }

        self.store.clear()
    }

    /// Loads a page from scratch: verify session, fetch records, derive.
    pub fn load_page(&mut self, page: Page) -> Result<Dashboard, PortalError> {
        let result = self.load_page_inner(page);
        self.guard(result)
    }

    /// Runs one action. Mutations are followed by a full reload of `page`;
    /// the view model is never patched locally.
    pub fn perform(&mut self, action: &Action, page: Page) -> Result<ActionOutcome, PortalError> {
        let result = self.perform_inner(action, page);

        if let Err(err) = &result {
            error!(?action, error = %err, "action failed");
        }

        self.guard(result)
    }

    /// Opens the hosted billing portal for the logged-in user.
    pub fn open_billing_portal(&mut self) -> Result<ActionOutcome, PortalError> {
        let result = self.require_session().and_then(|session| {
            let url = self
                .backend
                .open_billing_portal(&session.token, session.user_id)?;
            self.redirect("billing portal", &url)?;
            Ok(ActionOutcome::Redirect { url })
        });

        self.guard(result)
    }

    /// Starts a hosted checkout for the one-off product.
    pub fn buy_product(&mut self) -> Result<ActionOutcome, PortalError> {
        let result = self.require_session().and_then(|session| {
            let checkout = self.backend.create_checkout_session(&session.token)?;
            let url = self.backend.hosted_checkout_url(&checkout);
            self.redirect("checkout", &url)?;
            Ok(ActionOutcome::Redirect { url })
        });

        self.guard(result)
    }

    /// Details of a finished checkout, for the success page.
    pub fn checkout_result(&self, session_id: &str) -> Result<CheckoutSessionInfo, PortalError> {
        if session_id.trim().is_empty() {
            return Err(PortalError::ValidationFailure(
                "A checkout session id is required.".to_string(),
            ));
        }

        self.backend.checkout_session_info(session_id)
    }

    fn load_page_inner(&self, page: Page) -> Result<Dashboard, PortalError> {
        let Some(session) = self.session.clone() else {
            return match page {
                Page::Home => Ok(Dashboard {
                    page,
                    session: None,
                    view: derive_view_model(&[]),
                    history: None,
                    profile: None,
                    purchases: None,
                }),
                Page::MyPage => Err(PortalError::NotLoggedIn),
            };
        };

        let check = self.backend.verify_session(&session.token)?;
        if !check.valid {
            return Err(PortalError::InvalidSession);
        }
        let user_id = check.user_id.unwrap_or(session.user_id);

        let records = self.backend.list_user_subscriptions(user_id)?;
        let view = derive_view_model(&records);

        let mut dashboard = Dashboard {
            page,
            session: Some(session.clone()),
            view,
            history: None,
            profile: None,
            purchases: None,
        };

        if page == Page::MyPage {
            dashboard.history = Some(classify_history(&records));

            dashboard.profile = Some(self.backend.user_info(user_id).unwrap_or_else(|err| {
                warn!(user_id, error = %err, "profile unavailable, using stored session");
                UserProfile {
                    id: user_id,
                    name: session.user_name.clone(),
                    email: session.user_email.clone(),
                    ..Default::default()
                }
            }));

            dashboard.purchases = match self.backend.purchase_history(user_id) {
                Ok(purchases) => Some(purchases),
                Err(err) => {
                    warn!(user_id, error = %err, "purchase history unavailable");
                    None
                }
            };
        }

        Ok(dashboard)
    }

    fn perform_inner(&mut self, action: &Action, page: Page) -> Result<ActionOutcome, PortalError> {
        let session = self.require_session()?;
        let token = session.token.as_str();

        let message = match action {
            Action::Subscribe(plan) => {
                let checkout = self
                    .backend
                    .create_subscription_checkout_session(token, *plan)?;
                let url = self.backend.hosted_checkout_url(&checkout);

                info!(plan = %plan, checkout_session = %checkout.id, "redirecting to checkout");
                self.redirect("checkout", &url)?;

                return Ok(ActionOutcome::Redirect { url });
            }
            Action::Cancel { subscription_id } => {
                self.backend.cancel_subscription(token, subscription_id)?
            }
            Action::Reactivate { subscription_id } => {
                self.backend.reactivate_subscription(token, subscription_id)?
            }
            Action::ScheduleChange(plan) => self.backend.schedule_change(token, *plan)?,
            Action::CancelScheduledChange { schedule_id } => {
                self.backend.cancel_scheduled_change(token, schedule_id)?
            }
        };

        info!(?action, "action succeeded, reloading");
        self.announce(&action.label());

        match self.load_page_inner(page) {
            Ok(dashboard) => Ok(ActionOutcome::Reloaded { message, dashboard }),
            Err(reload_error) => {
                warn!(?action, error = %reload_error, "action applied but reload failed");
                self.forget_rejected_session(&reload_error);
                Ok(ActionOutcome::Applied {
                    message,
                    reload_error,
                })
            }
        }
    }

    fn require_session(&self) -> Result<Session, PortalError> {
        self.session.clone().ok_or(PortalError::NotLoggedIn)
    }

    /// Drops the stored session when the server no longer accepts it.
    fn guard<T>(&mut self, result: Result<T, PortalError>) -> Result<T, PortalError> {
        if let Err(err) = &result {
            self.forget_rejected_session(err);
        }
        result
    }

    fn forget_rejected_session(&mut self, err: &PortalError) {
        if let PortalError::InvalidSession = err {
            warn!("session rejected by server, clearing it");
            self.session = None;
            if let Err(err) = self.store.clear() {
                warn!(error = %err, "failed to clear stored session");
            }
        }
    }

    fn redirect(&self, target: &str, url: &str) -> Result<(), PortalError> {
        self.announce(&format!("Opening {}: {}", target, url));

        if self.options.open_browser {
            open::that(url).map_err(|_| PortalError::RedirectFailed(target.to_string()))?;
        }

        Ok(())
    }

    fn announce(&self, message: &str) {
        if !self.options.debug {
            return;
        }

        #[cfg(windows)]
        println!("[PORTAL] {}", message);

        #[cfg(not(windows))]
        println!(
            "{} {}",
            "[PORTAL]".gradient_with_color(Color::Cyan, Color::SpringGreen4),
            message
        );
    }
}

fn validate_registration(registration: &Registration) -> Result<(), PortalError> {
    if registration.email.trim().is_empty()
        || registration.password.is_empty()
        || registration.name.trim().is_empty()
    {
        return Err(PortalError::ValidationFailure(
            "Email, password and name are required.".to_string(),
        ));
    }

    if registration.password != registration.confirm_password {
        return Err(PortalError::ValidationFailure(
            "Passwords do not match.".to_string(),
        ));
    }

    if registration.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PortalError::ValidationFailure(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        )));
    }

    if !registration.terms || !registration.privacy {
        return Err(PortalError::ValidationFailure(
            "Please accept the terms of service and the privacy policy.".to_string(),
        ));
    }

    Ok(())
}
