//! Subscription lifecycle state derivation.
//!
//! Everything here is a pure function of the records passed in. No network, no
//! session, no clock. Callers re-fetch and re-derive after every mutation
//! instead of patching a view model in place.

use chrono::{DateTime, Utc};

use crate::structs::{PlanType, ScheduledChange, SubscriptionHistory, SubscriptionRecord};

/// The mutually exclusive states an active subscription can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Terminates at the end of the current period. Takes priority over a scheduled change.
    CancelPending,
    /// Renews into a different plan at the end of the current period.
    ChangePending,
    PlainActive,
}

impl LifecycleState {
    /// Status badge shown next to the subscription.
    pub fn badge(self) -> &'static str {
        match self {
            LifecycleState::CancelPending => "cancellation scheduled",
            LifecycleState::ChangePending | LifecycleState::PlainActive => "active",
        }
    }
}

/// A callable action, tagged with the identifier needed to perform it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Subscribe(PlanType),
    Cancel { subscription_id: String },
    Reactivate { subscription_id: String },
    ScheduleChange(PlanType),
    CancelScheduledChange { schedule_id: String },
}

impl Action {
    pub fn label(&self) -> String {
        match self {
            Action::Subscribe(plan) => format!("Subscribe to {}", plan.display_name()),
            Action::Cancel { .. } => "Cancel subscription".to_string(),
            Action::Reactivate { .. } => "Undo cancellation".to_string(),
            Action::ScheduleChange(plan) => {
                format!("Switch to {} at next renewal", plan.display_name())
            }
            Action::CancelScheduledChange { .. } => "Cancel scheduled plan change".to_string(),
        }
    }
}

/// What the UI offers for one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOffer {
    /// No active subscription: the plan can be bought.
    Subscribe,
    /// The plan is the active one. Disabled.
    InUse,
    /// The plan can be scheduled to replace the active one.
    ScheduleChange,
    /// A change to this plan is already queued. Disabled, informational only.
    AlreadyScheduled,
}

impl PlanOffer {
    pub fn is_enabled(self) -> bool {
        matches!(self, PlanOffer::Subscribe | PlanOffer::ScheduleChange)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSlot {
    pub plan: PlanType,
    pub offer: PlanOffer,
}

/// The active subscription as the UI sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePlan {
    pub subscription_id: String,
    pub plan_type: PlanType,
    pub plan_name: String,
    /// Renewal date, or the termination date when cancellation is pending.
    pub period_end: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub state: LifecycleState,
    /// Present only in `ChangePending`.
    pub scheduled_change: Option<ScheduledChange>,
}

impl ActivePlan {
    pub fn cancel_pending(&self) -> bool {
        self.state == LifecycleState::CancelPending
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionViewModel {
    pub active_plan: Option<ActivePlan>,
    /// Ordered: actions on the active subscription first, then plan actions.
    pub available_actions: Vec<Action>,
    /// One slot per plan, in `PlanType::ALL` order.
    pub plans: Vec<PlanSlot>,
}

impl SubscriptionViewModel {
    pub fn offer_for(&self, plan: PlanType) -> Option<PlanOffer> {
        self.plans
            .iter()
            .find(|slot| slot.plan == plan)
            .map(|slot| slot.offer)
    }

    pub fn allows(&self, action: &Action) -> bool {
        self.available_actions.contains(action)
    }

    /// Payment management is only offered while a subscription is active.
    pub fn billing_portal_available(&self) -> bool {
        self.active_plan.is_some()
    }
}

/// Derives which plan is active and which actions are valid.
///
/// Only the first active record is considered; further active records are ignored.
pub fn derive_view_model(records: &[SubscriptionRecord]) -> SubscriptionViewModel {
    let Some(active) = records.iter().find(|r| r.status.is_active()) else {
        return SubscriptionViewModel {
            active_plan: None,
            available_actions: PlanType::ALL.iter().map(|p| Action::Subscribe(*p)).collect(),
            plans: PlanType::ALL
                .iter()
                .map(|p| PlanSlot {
                    plan: *p,
                    offer: PlanOffer::Subscribe,
                })
                .collect(),
        };
    };

    let state = if active.cancel_at_period_end {
        LifecycleState::CancelPending
    } else if active.scheduled_change.is_some() {
        LifecycleState::ChangePending
    } else {
        LifecycleState::PlainActive
    };

    let scheduled_change = match state {
        LifecycleState::ChangePending => active.scheduled_change.clone(),
        _ => None,
    };

    let mut available_actions = match (&state, &scheduled_change) {
        (LifecycleState::CancelPending, _) => vec![Action::Reactivate {
            subscription_id: active.id.clone(),
        }],
        (LifecycleState::ChangePending, Some(change)) => vec![
            Action::Cancel {
                subscription_id: active.id.clone(),
            },
            Action::CancelScheduledChange {
                schedule_id: change.schedule_id.clone(),
            },
        ],
        _ => vec![Action::Cancel {
            subscription_id: active.id.clone(),
        }],
    };

    let complementary = active.plan_type.complementary();
    let already_scheduled = scheduled_change
        .as_ref()
        .is_some_and(|change| change.next_plan_type == complementary);

    let complementary_offer = if already_scheduled {
        PlanOffer::AlreadyScheduled
    } else {
        available_actions.push(Action::ScheduleChange(complementary));
        PlanOffer::ScheduleChange
    };

    let plans = PlanType::ALL
        .iter()
        .map(|p| PlanSlot {
            plan: *p,
            offer: if *p == active.plan_type {
                PlanOffer::InUse
            } else {
                complementary_offer
            },
        })
        .collect();

    SubscriptionViewModel {
        active_plan: Some(ActivePlan {
            subscription_id: active.id.clone(),
            plan_type: active.plan_type,
            plan_name: active.display_name().to_string(),
            period_end: active.current_period_end,
            created_at: active.created_at,
            state,
            scheduled_change,
        }),
        available_actions,
        plans,
    }
}

/// Splits records into active and past, keeping their relative order.
pub fn classify_history(records: &[SubscriptionRecord]) -> SubscriptionHistory {
    let (active, past): (Vec<_>, Vec<_>) = records
        .iter()
        .cloned()
        .partition(|record| record.status.is_active());

    SubscriptionHistory { active, past }
}
