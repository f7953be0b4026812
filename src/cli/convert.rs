use super::ui;
use crate::core::{Quote, RateSnapshot, RefreshCoordinator, RefreshOutcome};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

pub async fn run(
    coordinator: &RefreshCoordinator,
    amount: f64,
    from: &str,
    to: &str,
    refresh: bool,
) -> Result<()> {
    let from = from.to_uppercase();
    let to = to.to_uppercase();

    if refresh {
        let pb = ui::new_spinner("Refreshing exchange rates...");
        let outcome = coordinator.refresh().await;
        pb.finish_and_clear();
        match outcome.context("Unable to fetch exchange rates. Please try again.")? {
            RefreshOutcome::Updated(_) => debug!("Converting with fresh rates"),
            RefreshOutcome::Fallback { error, .. } => println!(
                "{}",
                ui::style_text(
                    &format!("Using cached rates: {error}"),
                    ui::StyleType::Error
                )
            ),
        }
    }

    let quote = coordinator.convert(amount, &from, &to)?;
    let snapshot = coordinator
        .current()
        .context("No exchange rates available")?;
    println!("{}", render_quote(&quote, &snapshot, Utc::now()));
    Ok(())
}

/// Formats a conversion result along with the age of the rates behind it.
pub fn render_quote(quote: &Quote, snapshot: &RateSnapshot, now: DateTime<Utc>) -> String {
    let headline = format!(
        "{} {} = {} {}",
        ui::format_amount(quote.amount),
        quote.from,
        ui::format_amount(quote.converted),
        quote.to
    );
    let mut rendered = format!(
        "{}\n{}\n{}",
        ui::style_text(&headline, ui::StyleType::TotalValue),
        ui::style_text(
            &format!("1 {} = {} {}", quote.from, ui::format_rate(quote.rate), quote.to),
            ui::StyleType::TotalLabel
        ),
        ui::style_text(
            &format!("Last updated: {}", ui::format_age(snapshot.timestamp(), now)),
            ui::StyleType::Subtle
        ),
    );
    if let Some(published_at) = snapshot.published_at() {
        rendered.push('\n');
        rendered.push_str(&ui::style_text(
            &format!("Provider updated: {}", ui::format_age(published_at, now)),
            ui::StyleType::Subtle,
        ));
    }
    rendered
}
