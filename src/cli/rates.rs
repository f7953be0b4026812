use super::ui;
use crate::core::{RateSnapshot, RefreshCoordinator};
use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use std::collections::BTreeMap;

pub fn run(coordinator: &RefreshCoordinator, names: &BTreeMap<String, String>) -> Result<()> {
    let snapshot = coordinator
        .current()
        .context("No exchange rates available")?;
    println!(
        "\n{} {}",
        ui::style_text("Exchange Rates", ui::StyleType::Title),
        ui::style_text(
            &format!("(1 {})", snapshot.base_currency()),
            ui::StyleType::Subtle
        )
    );
    println!("{}", render_rates(&snapshot, names));
    Ok(())
}

/// Lists every named currency against the snapshot base, skipping the base itself.
pub fn render_rates(snapshot: &RateSnapshot, names: &BTreeMap<String, String>) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell("Code"),
        ui::header_cell("Rate"),
    ]);

    for (code, name) in names {
        if code == snapshot.base_currency() {
            continue;
        }
        table.add_row(vec![
            Cell::new(name),
            Cell::new(code),
            ui::rate_cell(snapshot.rate(code)),
        ]);
    }
    table
}
