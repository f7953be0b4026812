use super::ui;
use crate::core::conversion::{self, CurrencyPair};
use crate::core::{RateSnapshot, RefreshCoordinator};
use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use tracing::debug;

pub fn run(coordinator: &RefreshCoordinator, pairs: &[CurrencyPair]) -> Result<()> {
    let snapshot = coordinator
        .current()
        .context("No exchange rates available")?;
    println!(
        "\n{}",
        ui::style_text("Popular Exchange Rates", ui::StyleType::Title)
    );
    println!("{}", render_popular(&snapshot, pairs));
    Ok(())
}

/// One row per pair. Pairs the snapshot cannot price show "N/A".
pub fn render_popular(snapshot: &RateSnapshot, pairs: &[CurrencyPair]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Pair"), ui::header_cell("Rate")]);

    for pair in pairs {
        let rate = match conversion::rate_between(snapshot, &pair.from, &pair.to) {
            Ok(rate) => Some(rate),
            Err(e) => {
                debug!(%pair, error = %e, "Skipping rate for pair");
                None
            }
        };
        table.add_row(vec![Cell::new(pair.to_string()), ui::rate_cell(rate)]);
    }
    table
}
