//! Human-readable run summary.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use outage_model::domain::{to_iso_local, OutageEvent};

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Format normalized outages as a table
pub fn format_outage_table<'a, I>(events: I) -> String
where
    I: IntoIterator<Item = &'a OutageEvent>,
{
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Disabled);
    table.set_header(vec![
        "Start time",
        "Restored time",
        "Duration (minutes)",
        "Outage Type",
        "Region",
        "Area Affected",
        "Utility Name",
        "Demand Loss (MW)",
        "Customers Affected",
    ]);

    for ev in events {
        table.add_row(vec![
            Cell::new(or_dash(ev.start_datetime.map(to_iso_local))),
            Cell::new(or_dash(ev.restored_datetime.map(to_iso_local))),
            Cell::new(or_dash(ev.duration_minutes)),
            Cell::new(&ev.outage_type),
            Cell::new(or_dash(ev.region.as_deref())),
            Cell::new(or_dash(ev.area_affected.as_deref())),
            Cell::new(or_dash(ev.utility_name.as_deref())),
            Cell::new(or_dash(ev.demand_loss_mw)),
            Cell::new(or_dash(ev.customers_affected)),
        ]);
    }

    table.to_string()
}
