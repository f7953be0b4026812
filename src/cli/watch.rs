use super::{popular, ui};
use crate::core::conversion::CurrencyPair;
use crate::core::{RateSnapshot, RefreshCoordinator};
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};

/// Shows the popular pairs and redraws them whenever the rates change.
///
/// Runs the auto-refresh loop until Ctrl-C.
pub async fn run(coordinator: &RefreshCoordinator, pairs: &[CurrencyPair]) -> Result<()> {
    let mut updates = coordinator.subscribe();
    let initial = updates
        .borrow_and_update()
        .clone()
        .context("No exchange rates available")?;
    render(&initial, pairs);

    let auto_refresh = coordinator.spawn_auto_refresh();
    info!("Watching rates, press Ctrl-C to stop");

    let result = loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    debug!(base = snapshot.base_currency(), "Rates updated");
                    ui::print_separator();
                    render(&snapshot, pairs);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                break signal.context("Failed to listen for Ctrl-C");
            }
        }
    };

    auto_refresh.abort();
    result
}

fn render(snapshot: &RateSnapshot, pairs: &[CurrencyPair]) {
    println!(
        "\n{}",
        ui::style_text("Popular Exchange Rates", ui::StyleType::Title)
    );
    println!("{}", popular::render_popular(snapshot, pairs));
    println!(
        "{}",
        ui::style_text(
            &format!(
                "Last updated: {}",
                ui::format_age(snapshot.timestamp(), Utc::now())
            ),
            ui::StyleType::Subtle
        )
    );
}
