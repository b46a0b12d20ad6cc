use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::{load_session, parse_number, save_session};
use crate::error::Result;
use crate::fmt::{euro, normalize_date};
use crate::models::{InvoiceEntry, Motive, PaymentMethod};
use crate::reports::aggregate_invoices;
use crate::settings::load_settings;

/// Values for `invoice edit`; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct InvoicePatch {
    pub amount: Option<String>,
    pub date: Option<String>,
    pub title: Option<String>,
    pub payment: Option<PaymentMethod>,
    pub city: Option<String>,
    pub motive: Option<Motive>,
    pub prepaid: Option<bool>,
    pub invoice: Option<bool>,
}

impl InvoicePatch {
    fn apply(self, entry: &mut InvoiceEntry) -> Result<()> {
        if let Some(amount) = self.amount {
            parse_number(&amount, "amount")?;
            entry.amount = amount.trim().to_string();
        }
        if let Some(v) = self.date {
            entry.date = normalize_date(&v);
        }
        if let Some(v) = self.title {
            entry.title = v;
        }
        if let Some(v) = self.payment {
            entry.payment_method = v;
        }
        if let Some(v) = self.city {
            entry.city = v;
        }
        if let Some(v) = self.motive {
            entry.motive = v;
        }
        if let Some(v) = self.prepaid {
            entry.prepaid = v;
        }
        if let Some(v) = self.invoice {
            entry.is_invoice = v;
        }
        Ok(())
    }
}

pub fn add(entry: InvoiceEntry) -> Result<()> {
    parse_number(&entry.amount, "amount")?;
    let settings = load_settings();
    let mut session = load_session(&settings)?;
    let entry = InvoiceEntry {
        date: normalize_date(&entry.date),
        amount: entry.amount.trim().to_string(),
        ..entry
    };
    let value = entry.amount_value();
    let index = session.add_invoice(entry);
    save_session(&settings, &session)?;
    println!("Added entry {index}: {}", euro(value));
    Ok(())
}

pub fn edit(index: usize, patch: InvoicePatch) -> Result<()> {
    let settings = load_settings();
    let mut session = load_session(&settings)?;
    let entry = session.invoice_mut(index)?;
    patch.apply(entry)?;
    let value = entry.amount_value();
    save_session(&settings, &session)?;
    println!("Updated entry {index}: {}", euro(value));
    Ok(())
}

pub fn delete(index: usize) -> Result<()> {
    let settings = load_settings();
    let mut session = load_session(&settings)?;
    let removed = session.delete_invoice(index)?;
    save_session(&settings, &session)?;
    let title = if removed.title.is_empty() { "(untitled)" } else { &removed.title };
    println!("Deleted entry {index}: {title} {}", euro(removed.amount_value()));
    Ok(())
}

pub fn list() -> Result<()> {
    let settings = load_settings();
    let session = load_session(&settings)?;
    if session.invoices.is_empty() {
        println!("No expense entries.");
        return Ok(());
    }
    let labels = settings.locale.labels();
    let yes_no = |flag: bool| if flag { labels.yes } else { labels.no };

    let mut table = Table::new();
    table.set_header(vec![
        "#", "Date", "Description", "City", "Motive", "Payment", "Prepaid", "Invoice", "Amount",
    ]);
    for (i, e) in session.invoices.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(&e.date),
            Cell::new(&e.title),
            Cell::new(&e.city),
            Cell::new(e.motive.label(labels)),
            Cell::new(e.payment_method.label(labels)),
            Cell::new(yes_no(e.prepaid)),
            Cell::new(yes_no(e.is_invoice)),
            Cell::new(euro(e.amount_value())).set_alignment(CellAlignment::Right),
        ]);
    }
    let totals = aggregate_invoices(&session.invoices);
    println!("Expense entries\n{table}");
    println!(
        "Reimbursable {}   Prepaid {}",
        euro(totals.reimbursable),
        euro(totals.prepaid)
    );
    Ok(())
}
