use chrono::DateTime;
use colorful::Color;
use colorful::Colorful;

use crate::engine::{ActivePlan, LifecycleState, PlanOffer, SubscriptionViewModel};
use crate::portal::Dashboard;
use crate::structs::{Purchase, SubscriptionRecord, SubscriptionStatus};

/// Which page is being shown. Selects the parts of a `Dashboard` that get loaded and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// Plan picker: one affordance per plan.
    Home,
    /// Account page: profile, active subscription, history, purchases.
    MyPage,
}

pub fn format_date(epoch_secs: Option<i64>) -> String {
    epoch_secs
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Renders a dashboard as plain text lines.
pub fn render(dashboard: &Dashboard) -> Vec<String> {
    match dashboard.page {
        Page::Home => render_plans(&dashboard.view),
        Page::MyPage => render_my_page(dashboard),
    }
}

/// Prints a dashboard, with colored headings unless `plain` is set.
pub fn print(dashboard: &Dashboard, plain: bool) {
    for line in render(dashboard) {
        let is_heading = !line.starts_with(' ') && !line.is_empty();

        if plain || !is_heading || cfg!(windows) {
            println!("{}", line);
        } else {
            println!(
                "{}",
                line.gradient_with_color(Color::Cyan, Color::SpringGreen4)
            );
        }
    }
}

pub fn render_plans(view: &SubscriptionViewModel) -> Vec<String> {
    let mut lines = vec!["Plans".to_string()];

    for slot in &view.plans {
        let offer = match slot.offer {
            PlanOffer::Subscribe => "Start now".to_string(),
            PlanOffer::InUse => "In use (active)".to_string(),
            PlanOffer::ScheduleChange => "Switch at next renewal".to_string(),
            PlanOffer::AlreadyScheduled => format!("Change to {} scheduled", slot.plan.display_name()),
        };
        let marker = if slot.offer.is_enabled() { ">" } else { "-" };

        lines.push(format!("  {} {}: {}", marker, slot.plan.display_name(), offer));
    }

    lines
}

fn render_my_page(dashboard: &Dashboard) -> Vec<String> {
    let mut lines = vec!["Account".to_string()];

    match &dashboard.profile {
        Some(profile) => {
            let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
            lines.push(format!("  Name: {}", or_dash(&profile.name)));
            lines.push(format!("  Email: {}", or_dash(&profile.email)));
            lines.push(format!("  Phone: {}", or_dash(&profile.phone)));
            lines.push(format!("  Birthdate: {}", or_dash(&profile.birthdate)));
            lines.push(format!("  Member since: {}", or_dash(&profile.created_at)));
        }
        None => lines.push("  -".to_string()),
    }

    lines.push(String::new());
    lines.push("Active subscription".to_string());
    match &dashboard.view.active_plan {
        Some(plan) => lines.extend(render_active_plan(plan, &dashboard.view)),
        None => lines.push("  No active subscription.".to_string()),
    }

    lines.push(String::new());
    lines.push("Past subscriptions".to_string());
    let past = dashboard
        .history
        .as_ref()
        .map(|h| h.past.as_slice())
        .unwrap_or_default();
    if past.is_empty() {
        lines.push("  No past subscriptions.".to_string());
    } else {
        lines.extend(past.iter().map(render_past_record));
    }

    lines.push(String::new());
    lines.push("Purchases".to_string());
    match &dashboard.purchases {
        None => lines.push("  Could not load purchase history.".to_string()),
        Some(purchases) if purchases.is_empty() => lines.push("  No purchases.".to_string()),
        Some(purchases) => lines.extend(purchases.iter().map(render_purchase)),
    }

    lines
}

fn render_active_plan(plan: &ActivePlan, view: &SubscriptionViewModel) -> Vec<String> {
    let mut lines = vec![format!("  {} [{}]", plan.plan_name, plan.state.badge())];

    if let Some(created) = plan.created_at {
        lines.push(format!("  Started: {}", created.format("%Y-%m-%d")));
    }

    match (plan.state, &plan.scheduled_change) {
        (LifecycleState::CancelPending, _) => {
            lines.push(format!("  Cancels on {}", format_date(plan.period_end)));
        }
        (LifecycleState::ChangePending, Some(change)) => {
            lines.push(format!("  Renews on {}", format_date(plan.period_end)));
            lines.push(format!(
                "  Switches to {} on {}",
                change.next_plan_name,
                format_date(change.change_date)
            ));
        }
        _ => {
            lines.push(format!("  Renews on {}", format_date(plan.period_end)));
        }
    }

    for action in &view.available_actions {
        lines.push(format!("  > {}", action.label()));
    }

    if view.billing_portal_available() {
        lines.push("  > Manage payment".to_string());
    }

    lines
}

fn render_past_record(record: &SubscriptionRecord) -> String {
    let status = match &record.status {
        SubscriptionStatus::Canceled => "Canceled".to_string(),
        other => other.to_string(),
    };
    let started = record
        .created_at
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!("  {} (since {}): {}", record.display_name(), started, status)
}

fn render_purchase(purchase: &Purchase) -> String {
    let date = purchase
        .created_at
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "  {} ({}): completed",
        purchase.product_name.as_deref().unwrap_or("Product"),
        date
    )
}
