pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod portal;
pub mod render;
pub mod structs;

pub use config::PortalOptions;
pub use engine::{
    classify_history, derive_view_model, Action, ActivePlan, LifecycleState, PlanOffer, PlanSlot,
    SubscriptionViewModel,
};
pub use errors::PortalError;
pub use portal::{ActionOutcome, Dashboard, Portal};
pub use render::Page;
pub use structs::client::{Backend, BackendClient};
pub use structs::session::{Session, SessionStore};
pub use structs::{PlanType, ScheduledChange, SubscriptionRecord, SubscriptionStatus};

// Tester
#[cfg(test)]
mod tests;
