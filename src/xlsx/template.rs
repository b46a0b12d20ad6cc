//! Built-in workbook template, written by `rimborso init` when no template
//! is installed. It follows [`TemplateContract::default`].

use rust_xlsxwriter::{Format, FormatBorder, Workbook, Worksheet};

use crate::error::Result;
use crate::xlsx::contract::{CategoryLayout, SheetRole, TemplateContract};
use crate::xlsx::sheet::{col_number, split_ref};

const INVOICE_HEADERS: [&str; 6] = ["Data", "Cliente", "Oggetto attività", "Descrizione", "Pagamento", "Importo"];
const KM_HEADERS: [&str; 13] = [
    "Data", "Cliente", "Oggetto attività", "Tipo auto", "Pagamento", "Marca", "Modello",
    "Cilindrata", "Partenza", "Tappe", "Arrivo", "KM", "Importo",
];

struct Formats {
    title: Format,
    header: Format,
    number: Format,
    total: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            title: Format::new().set_bold(),
            header: Format::new().set_border(FormatBorder::Thin),
            number: Format::new().set_border(FormatBorder::Thin).set_num_format("#,##0.00"),
            total: Format::new()
                .set_bold()
                .set_border(FormatBorder::Thin)
                .set_num_format("#,##0.00"),
        }
    }
}

/// Zero-based column index for a column name like "F".
fn col(letters: &str) -> u16 {
    col_number(letters).saturating_sub(1) as u16
}

fn identity_header(ws: &mut Worksheet, title: &str, fmt: &Formats) -> Result<()> {
    ws.merge_range(1, 0, 1, 3, title, &fmt.title)?;
    ws.write_string(3, 0, "Risorsa")?;
    ws.write_string(3, 1, "${cognome} ${nome}")?;
    ws.write_string(4, 0, "Sede")?;
    ws.write_string(4, 1, "${sede}")?;
    ws.write_string(5, 0, "Periodo dal")?;
    ws.write_string(5, 1, "${periodInit}")?;
    ws.write_string(5, 2, "al")?;
    ws.write_string(5, 3, "${periodFinal}")?;
    ws.write_string(6, 0, "Cliente")?;
    ws.write_string(6, 1, "${cliente}")?;
    ws.write_string(7, 0, "Attività")?;
    ws.write_string(7, 1, "${oggettoAttivita}")?;
    Ok(())
}

fn category_sheet(ws: &mut Worksheet, layout: &CategoryLayout, headers: &[&str], fmt: &Formats) -> Result<()> {
    ws.set_name(&layout.sheet)?;
    identity_header(ws, &layout.sheet, fmt)?;

    let start = layout.data_start_row - 1;
    let totals = layout.totals_row - 1;
    for (i, header) in headers.iter().enumerate() {
        let c = i as u16;
        ws.set_column_width(c, 18.0)?;
        ws.write_string_with_format(start - 1, c, *header, &fmt.header)?;
    }

    // The empty data row carries the styles every inserted entry copies.
    ws.set_row_height(start, 18.0)?;
    for i in 0..headers.len() as u16 {
        let is_sum = layout.sum_columns.iter().any(|c| col(c) == i);
        let style = if is_sum { &fmt.number } else { &fmt.header };
        ws.write_blank(start, i, style)?;
    }

    ws.write_string_with_format(totals, 0, "TOTALE", &fmt.header)?;
    for name in &layout.sum_columns {
        let row = layout.data_start_row;
        ws.write_formula_with_format(totals, col(name), format!("SUM({name}{row}:{name}{row})").as_str(), &fmt.total)?;
    }
    ws.write_string(totals + 3, 0, "Firma")?;
    Ok(())
}

/// A five-sheet workbook satisfying `contract`.
pub fn builtin_template(contract: &TemplateContract) -> Result<Vec<u8>> {
    let fmt = Formats::new();
    let mut workbook = Workbook::new();

    let totals = workbook.add_worksheet();
    totals.set_name(&contract.totals_sheet)?;
    identity_header(totals, "RIMBORSO SPESE", &fmt)?;
    for i in 0..4u16 {
        totals.set_column_width(i, 18.0)?;
    }
    for layout in &contract.categories {
        let Some((c, row)) = split_ref(&layout.totals_cell) else {
            continue;
        };
        let label = match layout.role {
            SheetRole::MiscExpenses => "Spese varie",
            SheetRole::KmReimbursements => "Rimborsi chilometrici",
            SheetRole::InvoicesVsCompany => "Fatture vs azienda",
            SheetRole::PrepaidExpenses => "Spese prepagate",
            SheetRole::Totals => continue,
        };
        let quoted = layout.sheet.replace('\'', "''");
        let formula = format!("'{quoted}'!{}{}", layout.totals_ref_column, layout.totals_row);
        totals.write_string(row - 1, 0, label)?;
        totals.write_formula_with_format(row - 1, c.saturating_sub(1) as u16, formula.as_str(), &fmt.total)?;
    }

    for layout in &contract.categories {
        let headers: &[&str] = match layout.role {
            SheetRole::KmReimbursements => &KM_HEADERS,
            _ => &INVOICE_HEADERS,
        };
        let ws = workbook.add_worksheet();
        category_sheet(ws, layout, headers, &fmt)?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use crate::xlsx::sheet::Worksheet;

    #[test]
    fn test_builtin_template_satisfies_contract() {
        let contract = TemplateContract::default();
        let bytes = builtin_template(&contract).unwrap();
        let pkg = Package::open(&bytes).unwrap();
        let sheets = pkg.sheets().unwrap();
        assert_eq!(sheets.len(), 5);
        let totals_part = &sheets[0].part;
        let totals = Worksheet::parse(&pkg.text(totals_part).unwrap()).unwrap();
        for layout in &contract.categories {
            let sheet = sheets.iter().find(|s| s.name == layout.sheet).unwrap();
            let ws = Worksheet::parse(&pkg.text(&sheet.part).unwrap()).unwrap();
            contract.validate_category(layout, &ws).unwrap();
            contract.validate_totals_ref(layout, &totals).unwrap();
        }
        let strings = pkg.shared_strings().unwrap();
        assert!(strings.iter().any(|s| s == "${periodInit}"));
    }

    #[test]
    fn test_builtin_template_totals_formulas() {
        let contract = TemplateContract::default();
        let pkg = Package::open(&builtin_template(&contract).unwrap()).unwrap();
        let sheets = pkg.sheets().unwrap();
        assert_eq!(sheets[0].name, contract.totals_sheet);
        let totals = Worksheet::parse(&pkg.text(&sheets[0].part).unwrap()).unwrap();
        for layout in &contract.categories {
            let (col, row) = split_ref(&layout.totals_cell).unwrap();
            let cell = totals.cell(col, row).unwrap();
            let formula = cell.formula.as_ref().unwrap();
            assert!(formula.text.contains(&format!("!{}{}", layout.totals_ref_column, layout.totals_row)));
        }
    }
}
