//! Excel renderer: patches the workbook template in place so its styles,
//! merged cells and cross-sheet formulas survive, then inserts one row per
//! entry on each category sheet.

pub mod contract;
pub mod sheet;
pub mod template;

use std::collections::BTreeSet;
use std::io::Cursor;

use calamine::{open_workbook_from_rs, Reader, Xlsx};
use rust_decimal::Decimal;

use crate::amount::round_display;
use crate::error::{Result, RimborsoError};
use crate::models::{InvoiceEntry, KmTripEntry};
use crate::package::{self, Package};
use crate::snapshot::ReportSnapshot;

pub use contract::{invoice_sheet, SheetRole, TemplateContract};
pub use template::builtin_template;

use contract::CategoryLayout;
use sheet::{col_number, rewrite_refs, Cell, Row, Worksheet};

enum Value {
    Text(String),
    Number(Decimal),
}

/// Where a category's totals row ended up.
#[derive(Debug, Clone, Copy)]
struct Relocation {
    old_totals: u32,
    new_totals: u32,
}

impl Relocation {
    fn shift(&self, row: u32) -> u32 {
        if row >= self.old_totals {
            (i64::from(row) + i64::from(self.new_totals) - i64::from(self.old_totals)).max(1) as u32
        } else {
            row
        }
    }
}

pub fn render_xlsx(
    snapshot: &ReportSnapshot,
    template: &[u8],
    contract: &TemplateContract,
) -> Result<Vec<u8>> {
    let mut pkg = Package::open(template)?;
    let sheets = pkg.sheets()?;
    let shared = pkg.shared_strings()?;

    let mut loaded: Vec<(String, String, Worksheet)> = Vec::new();
    for name in contract.sheet_names() {
        let sheet_ref = sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| RimborsoError::TemplateShape(format!("missing sheet '{name}'")))?;
        let ws = Worksheet::parse(&pkg.text(&sheet_ref.part)?)?;
        loaded.push((name.to_string(), sheet_ref.part.clone(), ws));
    }

    // Validate everything before the first mutation.
    let totals_idx = 0;
    for layout in &contract.categories {
        let ws = find_sheet(&loaded, &layout.sheet)?;
        contract.validate_category(layout, ws)?;
        contract.validate_totals_ref(layout, &loaded[totals_idx].2)?;
    }
    tracing::debug!(sheets = loaded.len(), "workbook template matches its contract");

    let markers = marker_values(snapshot, &contract.markers);
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for (name, _, ws) in &mut loaded {
        let found = substitute_markers(ws, &shared, &markers);
        tracing::debug!(sheet = %name, markers = found.len(), "substituted markers");
        seen.extend(found);
    }
    for (marker, _) in &markers {
        if !seen.contains(marker) {
            tracing::warn!(marker = *marker, "marker not found in workbook template");
        }
    }

    let mut relocations: Vec<(String, Relocation)> = Vec::new();
    for layout in &contract.categories {
        let rows = category_rows(snapshot, layout.role);
        let ws = find_sheet_mut(&mut loaded, &layout.sheet)?;
        let relocation = fill_category(ws, layout, rows);
        tracing::debug!(
            sheet = %layout.sheet,
            totals_row = relocation.new_totals,
            "filled category sheet"
        );
        relocations.push((layout.sheet.clone(), relocation));
    }

    relocate_totals_refs(&mut loaded[totals_idx].2, &relocations);

    for (_, part, ws) in &loaded {
        pkg.set(part, ws.to_xml().into_bytes());
    }
    pkg.force_full_calc()?;
    let bytes = pkg.to_bytes()?;
    verify(&bytes, contract)?;
    Ok(bytes)
}

fn find_sheet<'a>(loaded: &'a [(String, String, Worksheet)], name: &str) -> Result<&'a Worksheet> {
    loaded
        .iter()
        .find(|(n, _, _)| n == name)
        .map(|(_, _, ws)| ws)
        .ok_or_else(|| RimborsoError::TemplateShape(format!("missing sheet '{name}'")))
}

fn find_sheet_mut<'a>(
    loaded: &'a mut [(String, String, Worksheet)],
    name: &str,
) -> Result<&'a mut Worksheet> {
    loaded
        .iter_mut()
        .find(|(n, _, _)| n == name)
        .map(|(_, _, ws)| ws)
        .ok_or_else(|| RimborsoError::TemplateShape(format!("missing sheet '{name}'")))
}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

fn marker_values(snapshot: &ReportSnapshot, markers: &[&'static str]) -> Vec<(&'static str, String)> {
    let id = &snapshot.identity;
    markers
        .iter()
        .filter_map(|&marker| {
            let value = match marker {
                "${nome}" => id.first_name.clone(),
                "${cognome}" => id.surname.clone(),
                "${sede}" => id.office.clone(),
                "${cliente}" => id.client.clone(),
                "${oggettoAttivita}" => id.activity.clone(),
                "${periodInit}" => snapshot.period_start.clone(),
                "${periodFinal}" => snapshot.period_end.clone(),
                _ => {
                    tracing::warn!(marker, "no value bound to marker");
                    return None;
                }
            };
            Some((marker, value))
        })
        .collect()
}

/// Replace marker substrings in every text cell; returns the markers seen.
fn substitute_markers(
    ws: &mut Worksheet,
    shared: &[String],
    markers: &[(&'static str, String)],
) -> Vec<&'static str> {
    let mut found = Vec::new();
    for cell in ws.cells_mut() {
        let Some(text) = cell.text(shared) else { continue };
        if !text.contains("${") {
            continue;
        }
        let mut replaced = text.clone();
        for (marker, value) in markers {
            if replaced.contains(marker) {
                replaced = replaced.replace(marker, value);
                found.push(*marker);
            }
        }
        if replaced != text {
            cell.set_text(&replaced);
        }
    }
    found
}

// ---------------------------------------------------------------------------
// Category rows
// ---------------------------------------------------------------------------

fn category_rows(snapshot: &ReportSnapshot, role: SheetRole) -> Vec<Vec<Value>> {
    match role {
        SheetRole::KmReimbursements => snapshot
            .km_entries
            .iter()
            .map(|e| km_row(snapshot, e))
            .collect(),
        SheetRole::Totals => Vec::new(),
        role => snapshot
            .invoices
            .iter()
            .filter(|e| invoice_sheet(e) == role)
            .map(|e| invoice_row(snapshot, e))
            .collect(),
    }
}

fn invoice_row(snapshot: &ReportSnapshot, e: &InvoiceEntry) -> Vec<Value> {
    let labels = snapshot.locale.labels();
    vec![
        Value::Text(e.date.clone()),
        Value::Text(snapshot.identity.client.clone()),
        Value::Text(snapshot.identity.activity.clone()),
        Value::Text(e.title.clone()),
        Value::Text(e.payment_method.label(labels).to_string()),
        Value::Number(e.amount_value()),
    ]
}

fn km_row(snapshot: &ReportSnapshot, e: &KmTripEntry) -> Vec<Value> {
    let labels = snapshot.locale.labels();
    let car_type = if e.is_company_car() {
        labels.company_car
    } else {
        labels.personal_car
    };
    vec![
        Value::Text(e.date.clone()),
        Value::Text(snapshot.identity.client.clone()),
        Value::Text(snapshot.identity.activity.clone()),
        Value::Text(car_type.to_string()),
        Value::Text(e.payment_method.label(labels).to_string()),
        Value::Text(e.car_brand.to_uppercase()),
        Value::Text(e.car_model.to_uppercase()),
        Value::Text(e.car_engine.clone()),
        Value::Text(e.start_city.to_uppercase()),
        Value::Text(e.waypoints_upper(" > ")),
        Value::Text(e.end_city.to_uppercase()),
        Value::Number(e.total_km()),
        Value::Number(e.amount()),
    ]
}

fn number_text(value: Decimal) -> String {
    round_display(value).normalize().to_string()
}

/// Write `rows` from the data-start row down and re-append the totals row
/// right after them.
fn fill_category(ws: &mut Worksheet, layout: &CategoryLayout, rows: Vec<Vec<Value>>) -> Relocation {
    let start = layout.data_start_row;
    let template = ws.row(start).cloned().unwrap_or_default();
    let totals_row = ws.row(layout.totals_row).cloned().unwrap_or_default();

    let k = rows.len() as u32;
    let mut sums = vec![Decimal::ZERO; layout.sum_columns.len()];
    let sum_cols: Vec<u32> = layout.sum_columns.iter().map(|c| col_number(c)).collect();

    let mut body = Vec::with_capacity(rows.len());
    for (i, values) in rows.into_iter().enumerate() {
        let number = start + i as u32;
        let mut cells = Vec::with_capacity(values.len());
        for (j, value) in values.into_iter().enumerate() {
            let col = j as u32 + 1;
            let style = template.cell(col).and_then(|c| c.style.clone());
            let mut cell = Cell::styled(col, style);
            match value {
                Value::Text(text) if text.is_empty() => {}
                Value::Text(text) => cell.set_text(&text),
                Value::Number(n) => {
                    let n = round_display(n);
                    if let Some(pos) = sum_cols.iter().position(|&c| c == col) {
                        sums[pos] += n;
                    }
                    cell.set_number(number_text(n));
                }
            }
            cells.push(cell);
        }
        body.push(Row {
            number,
            attrs: template.attrs.clone(),
            cells,
        });
    }

    ws.splice_block(start, layout.totals_row, body, totals_row);

    // Sums are written after the splice so their ranges are not shifted again.
    let new_totals = start + k;
    if let Some(totals_row) = ws.row_mut(new_totals) {
        for (pos, col) in layout.sum_columns.iter().enumerate() {
            let cell = totals_row.cell_mut(sum_cols[pos]);
            if k == 0 {
                cell.set_number(0);
            } else {
                let formula = format!("SUM({col}{start}:{col}{})", start + k - 1);
                cell.set_formula(formula, Some(number_text(sums[pos])));
            }
        }
    }
    Relocation {
        old_totals: layout.totals_row,
        new_totals,
    }
}

/// Point Totals-sheet formulas at the relocated rows and drop their cached values.
fn relocate_totals_refs(totals: &mut Worksheet, relocations: &[(String, Relocation)]) {
    for cell in totals.cells_mut() {
        let Some(formula) = cell.formula.as_mut() else { continue };
        let rewritten = rewrite_refs(&formula.text, |r| {
            let sheet = r.sheet.as_deref()?;
            relocations
                .iter()
                .find(|(name, _)| name == sheet)
                .map(|(_, reloc)| reloc.shift(r.row))
        });
        if rewritten != formula.text {
            formula.text = rewritten;
            cell.value = None;
        }
    }
}

/// Re-open the output and make sure every contract sheet is readable.
fn verify(bytes: &[u8], contract: &TemplateContract) -> Result<()> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let names = workbook.sheet_names();
    for name in contract.sheet_names() {
        if !names.iter().any(|n| n == name) {
            return Err(RimborsoError::TemplateShape(format!(
                "rendered workbook lost sheet '{name}'"
            )));
        }
        workbook.worksheet_range(name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Locale;
    use crate::models::{KmDraft, Motive};
    use crate::reports::KmRates;
    use crate::session::Session;
    use crate::snapshot;
    use crate::xlsx::template::builtin_template;
    use calamine::Data;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    const KM: &str = "RIMBORSI CHILOMETRICI";
    const MISC: &str = "SPESE VARIE RISORSA";

    fn snap(session: &Session) -> ReportSnapshot {
        snapshot::build(
            session,
            &KmRates::default(),
            Locale::It,
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
    }

    fn session_with_km(n: usize) -> Session {
        let mut s = Session::default();
        s.identity.first_name = "Mario".into();
        s.identity.surname = "Rossi".into();
        s.identity.office = "Torino".into();
        for i in 0..n {
            s.km_entries.push(KmTripEntry::new(
                KmDraft {
                    date: format!("{:02}/03/2025", i + 1),
                    car_brand: "fiat".into(),
                    car_model: "panda".into(),
                    start_city: "torino".into(),
                    end_city: "milano".into(),
                    waypoints: vec!["novara".into()],
                    total_km: dec!(50),
                    ..KmDraft::default()
                },
                &KmRates::default(),
            ));
        }
        s
    }

    fn open(bytes: &[u8]) -> Xlsx<Cursor<Vec<u8>>> {
        open_workbook_from_rs(Cursor::new(bytes.to_vec())).unwrap()
    }

    fn formula_at(wb: &mut Xlsx<Cursor<Vec<u8>>>, sheet: &str, cell: &str) -> Option<String> {
        let (col, row) = sheet::split_ref(cell).unwrap();
        let range = wb.worksheet_formula(sheet).unwrap();
        range
            .get_value((row - 1, col - 1))
            .cloned()
            .filter(|f| !f.is_empty())
    }

    fn value_at(wb: &mut Xlsx<Cursor<Vec<u8>>>, sheet: &str, cell: &str) -> Option<Data> {
        let (col, row) = sheet::split_ref(cell).unwrap();
        let range = wb.worksheet_range(sheet).unwrap();
        range.get_value((row - 1, col - 1)).cloned()
    }

    fn render(session: &Session) -> Vec<u8> {
        let contract = TemplateContract::default();
        let template = builtin_template(&contract).unwrap();
        render_xlsx(&snap(session), &template, &contract).unwrap()
    }

    #[test]
    fn test_km_rows_relocate_totals() {
        let bytes = render(&session_with_km(3));
        let mut wb = open(&bytes);
        assert_eq!(formula_at(&mut wb, KM, "L15").as_deref(), Some("SUM(L12:L14)"));
        assert_eq!(formula_at(&mut wb, KM, "M15").as_deref(), Some("SUM(M12:M14)"));
        assert_eq!(
            formula_at(&mut wb, "TOTALI", "D13").as_deref(),
            Some("'RIMBORSI CHILOMETRICI'!M15")
        );
        assert_eq!(value_at(&mut wb, KM, "M15"), Some(Data::Float(60.0)));
        assert_eq!(value_at(&mut wb, KM, "A12"), Some(Data::String("01/03/2025".into())));
        assert_eq!(value_at(&mut wb, KM, "D12"), Some(Data::String("Auto Personale".into())));
        assert_eq!(value_at(&mut wb, KM, "J12"), Some(Data::String("NOVARA".into())));
        assert_eq!(value_at(&mut wb, KM, "L13"), Some(Data::Float(50.0)));
        // "Firma" moved from row 16 to 18.
        assert_eq!(value_at(&mut wb, KM, "A18"), Some(Data::String("Firma".into())));
    }

    #[test]
    fn test_empty_category_writes_zero() {
        let bytes = render(&Session::default());
        let mut wb = open(&bytes);
        assert_eq!(formula_at(&mut wb, KM, "M12"), None);
        assert_eq!(value_at(&mut wb, KM, "M12"), Some(Data::Float(0.0)));
        assert_eq!(value_at(&mut wb, KM, "A12"), Some(Data::String("TOTALE".into())));
        assert_eq!(
            formula_at(&mut wb, "TOTALI", "D12").as_deref(),
            Some("'SPESE VARIE RISORSA'!F12")
        );
    }

    #[test]
    fn test_invoices_routed_to_their_sheets() {
        let mut s = Session::default();
        s.invoices.push(InvoiceEntry {
            date: "02/03/2025".into(),
            title: "Pranzo".into(),
            amount: "15,50".into(),
            motive: Motive::Food,
            ..InvoiceEntry::default()
        });
        s.invoices.push(InvoiceEntry {
            amount: "100".into(),
            prepaid: true,
            is_invoice: true,
            ..InvoiceEntry::default()
        });
        s.invoices.push(InvoiceEntry {
            amount: "7".into(),
            is_invoice: true,
            ..InvoiceEntry::default()
        });
        let bytes = render(&s);
        let mut wb = open(&bytes);
        assert_eq!(value_at(&mut wb, MISC, "D12"), Some(Data::String("Pranzo".into())));
        assert_eq!(value_at(&mut wb, MISC, "F12"), Some(Data::Float(15.5)));
        assert_eq!(formula_at(&mut wb, MISC, "F13").as_deref(), Some("SUM(F12:F12)"));
        assert_eq!(
            value_at(&mut wb, "SPESE PREPAGATE DA KEYTECH", "F12"),
            Some(Data::Float(100.0))
        );
        assert_eq!(
            value_at(&mut wb, "FATTURE VS KEYTECH RISORSA", "F12"),
            Some(Data::Float(7.0))
        );
        assert_eq!(
            formula_at(&mut wb, "TOTALI", "D18").as_deref(),
            Some("'SPESE PREPAGATE DA KEYTECH'!F13")
        );
    }

    #[test]
    fn test_markers_replaced_as_substrings() {
        let bytes = render(&session_with_km(1));
        let mut wb = open(&bytes);
        assert_eq!(
            value_at(&mut wb, "TOTALI", "B4"),
            Some(Data::String("Rossi Mario".into()))
        );
        assert_eq!(
            value_at(&mut wb, KM, "B6"),
            Some(Data::String("01/03/2025".into()))
        );
        assert_eq!(value_at(&mut wb, KM, "D6"), Some(Data::String("31/03/2025".into())));
    }

    #[test]
    fn test_full_calc_on_load() {
        let bytes = render(&Session::default());
        let pkg = Package::open(&bytes).unwrap();
        let workbook = pkg.text(package::WORKBOOK).unwrap();
        assert!(workbook.contains(r#"fullCalcOnLoad="1""#));
        assert_eq!(workbook.matches("<calcPr").count(), 1);
    }

    #[test]
    fn test_missing_sheet_is_template_error() {
        let mut contract = TemplateContract::default();
        let template = builtin_template(&contract).unwrap();
        contract.totals_sheet = "RIEPILOGO".into();
        let err = render_xlsx(&snap(&Session::default()), &template, &contract).unwrap_err();
        assert!(matches!(err, RimborsoError::TemplateShape(ref m) if m.contains("RIEPILOGO")));
    }

    #[test]
    fn test_unexpected_sum_formula_rejected_before_changes() {
        let contract = TemplateContract::default();
        let template = builtin_template(&contract).unwrap();
        let mut pkg = Package::open(&template).unwrap();
        let part = pkg
            .sheets()
            .unwrap()
            .into_iter()
            .find(|s| s.name == KM)
            .unwrap()
            .part;
        let xml = pkg.text(&part).unwrap().replace("SUM(M12:M12)", "M12*2");
        pkg.set(&part, xml.into_bytes());
        let broken = pkg.to_bytes().unwrap();
        let err = render_xlsx(&snap(&session_with_km(2)), &broken, &contract).unwrap_err();
        assert!(matches!(err, RimborsoError::TemplateShape(_)));
    }

    #[test]
    fn test_absent_marker_does_not_block_render() {
        let contract = TemplateContract::default();
        assert!(contract.markers.contains(&"${sede}"));
        let mut pkg = Package::open(&builtin_template(&contract).unwrap()).unwrap();
        let strings = "xl/sharedStrings.xml";
        let xml = pkg.text(strings).unwrap().replace("${sede}", "Sede legale");
        pkg.set(strings, xml.into_bytes());
        let template = pkg.to_bytes().unwrap();

        let bytes = render_xlsx(&snap(&session_with_km(1)), &template, &contract).unwrap();
        let mut wb = open(&bytes);
        assert_eq!(
            value_at(&mut wb, "TOTALI", "B4"),
            Some(Data::String("Rossi Mario".into()))
        );
        assert_eq!(
            value_at(&mut wb, "TOTALI", "B5"),
            Some(Data::String("Sede legale".into()))
        );
        assert_eq!(formula_at(&mut wb, KM, "M13").as_deref(), Some("SUM(M12:M12)"));
    }

    #[test]
    fn test_not_a_zip() {
        let contract = TemplateContract::default();
        let err = render_xlsx(&snap(&Session::default()), b"plain text", &contract).unwrap_err();
        assert!(matches!(err, RimborsoError::Zip(_)));
    }
}
