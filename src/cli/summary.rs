use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::load_session;
use crate::error::Result;
use crate::fmt::{date, euro, km};
use crate::reports::DayKey;
use crate::settings::load_settings;
use crate::snapshot::{self, ReportSnapshot};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let session = load_session(&settings)?;
    let today = chrono::Local::now().date_naive();
    let snap = snapshot::build(&session, &settings.rates, settings.locale, today);
    println!("{}", format_summary(&snap));
    Ok(())
}

fn right(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

pub fn format_summary(snap: &ReportSnapshot) -> String {
    let labels = snap.locale.labels();
    let id = &snap.identity;
    let mut out = format!(
        "{} {} {}\n",
        labels.period.bold(),
        snap.period,
        format!("({})", snap.filename).dimmed()
    );
    let person = format!("{} {}", id.first_name, id.surname);
    if !person.trim().is_empty() || !id.client.is_empty() {
        out.push_str(&format!("{} | {} | {}\n", person.trim(), id.client, id.office));
    }

    let inv = &snap.invoice_totals;
    let mut table = Table::new();
    table.set_header(vec!["Expenses", "Amount"]);
    for (label, value) in [
        (labels.food, inv.food),
        (labels.transportation, inv.transportation),
        (labels.housing, inv.housing),
        (labels.other, inv.other),
    ] {
        table.add_row(vec![Cell::new(label), right(euro(value))]);
    }
    table.add_row(vec![Cell::new(labels.reimbursable.bold()), right(euro(inv.reimbursable))]);
    table.add_row(vec![Cell::new(labels.prepaid.dimmed()), right(euro(inv.prepaid))]);
    out.push_str(&format!("\n{} ({} entries)\n{table}\n", labels.invoice_section, inv.count));

    let kt = &snap.km_totals;
    let mut table = Table::new();
    table.set_header(vec!["Car", "Km", "Amount"]);
    table.add_row(vec![
        Cell::new(labels.personal_car),
        right(km(kt.personal_km)),
        right(euro(kt.personal_amount)),
    ]);
    table.add_row(vec![
        Cell::new(labels.company_car),
        right(km(kt.company_km)),
        right(euro(kt.company_amount)),
    ]);
    table.add_row(vec![
        Cell::new(labels.total.bold()),
        right(km(kt.total_km)),
        right(euro(kt.total_amount)),
    ]);
    out.push_str(&format!("\n{} ({} trips)\n{table}\n", labels.km_section, kt.count));

    if !snap.km_by_date.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Date", labels.personal_short, labels.company_short, "Km", "Amount"]);
        for group in &snap.km_by_date {
            let day = match group.day {
                DayKey::Dated(d) => date(d),
                DayKey::Unspecified => labels.unspecified_date.to_string(),
            };
            table.add_row(vec![
                Cell::new(day),
                right(km(group.totals.personal_km)),
                right(km(group.totals.company_km)),
                right(km(group.totals.total_km)),
                right(euro(group.totals.total_amount)),
            ]);
        }
        out.push_str(&format!("\nBy day\n{table}\n"));
    }

    out.push_str(&format!(
        "\n{}  {}",
        labels.grand_total.green().bold(),
        euro(snap.grand_total).bold()
    ));
    out
}
