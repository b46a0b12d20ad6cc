use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, RimborsoError};
use crate::models::InvoiceEntry;
use crate::xlsx::sheet::{col_number, formula_refs, Worksheet};

static SUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^=?\s*SUM\(\s*\$?([A-Z]{1,3})\$?[0-9]+\s*:\s*\$?([A-Z]{1,3})\$?[0-9]+\s*\)\s*$"#)
        .expect("sum formula regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetRole {
    Totals,
    KmReimbursements,
    PrepaidExpenses,
    InvoicesVsCompany,
    MiscExpenses,
}

/// Which category sheet an invoice lands on.
pub fn invoice_sheet(entry: &InvoiceEntry) -> SheetRole {
    if entry.prepaid {
        SheetRole::PrepaidExpenses
    } else if entry.is_invoice {
        SheetRole::InvoicesVsCompany
    } else {
        SheetRole::MiscExpenses
    }
}

/// Layout of one category sheet.
#[derive(Debug, Clone)]
pub struct CategoryLayout {
    pub role: SheetRole,
    pub sheet: String,
    pub data_start_row: u32,
    pub totals_row: u32,
    /// Columns whose totals-row cell sums the data block.
    pub sum_columns: Vec<String>,
    /// Cell on the Totals sheet that pulls this category's total.
    pub totals_cell: String,
    /// Column of the category sheet that the Totals cell references.
    pub totals_ref_column: String,
}

/// Everything the renderer assumes about the workbook template.
#[derive(Debug, Clone)]
pub struct TemplateContract {
    pub totals_sheet: String,
    pub categories: Vec<CategoryLayout>,
    pub markers: Vec<&'static str>,
}

impl Default for TemplateContract {
    fn default() -> Self {
        let invoice_sheet = |role, sheet: &str, totals_cell: &str| CategoryLayout {
            role,
            sheet: sheet.to_string(),
            data_start_row: 12,
            totals_row: 13,
            sum_columns: vec!["F".to_string()],
            totals_cell: totals_cell.to_string(),
            totals_ref_column: "F".to_string(),
        };
        Self {
            totals_sheet: "TOTALI".to_string(),
            categories: vec![
                invoice_sheet(SheetRole::MiscExpenses, "SPESE VARIE RISORSA", "D12"),
                CategoryLayout {
                    role: SheetRole::KmReimbursements,
                    sheet: "RIMBORSI CHILOMETRICI".to_string(),
                    data_start_row: 12,
                    totals_row: 13,
                    sum_columns: vec!["L".to_string(), "M".to_string()],
                    totals_cell: "D13".to_string(),
                    totals_ref_column: "M".to_string(),
                },
                invoice_sheet(SheetRole::InvoicesVsCompany, "FATTURE VS KEYTECH RISORSA", "D14"),
                invoice_sheet(SheetRole::PrepaidExpenses, "SPESE PREPAGATE DA KEYTECH", "D18"),
            ],
            markers: vec![
                "${nome}",
                "${cognome}",
                "${sede}",
                "${periodInit}",
                "${periodFinal}",
                "${cliente}",
                "${oggettoAttivita}",
            ],
        }
    }
}

impl TemplateContract {
    pub fn category(&self, role: SheetRole) -> Option<&CategoryLayout> {
        self.categories.iter().find(|c| c.role == role)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.totals_sheet.as_str())
            .chain(self.categories.iter().map(|c| c.sheet.as_str()))
    }

    /// Check a category sheet before anything is changed: every sum column
    /// must hold `SUM(<col>a:<col>b)` on the totals row.
    pub fn validate_category(&self, layout: &CategoryLayout, ws: &Worksheet) -> Result<()> {
        if layout.totals_row <= layout.data_start_row {
            return Err(RimborsoError::TemplateShape(format!(
                "'{}': totals row {} must follow data row {}",
                layout.sheet, layout.totals_row, layout.data_start_row
            )));
        }
        for col in &layout.sum_columns {
            let cell_ref = format!("{col}{}", layout.totals_row);
            let formula = ws
                .cell(col_number(col), layout.totals_row)
                .and_then(|c| c.formula.as_ref())
                .map(|f| f.text.as_str())
                .ok_or_else(|| {
                    RimborsoError::TemplateShape(format!(
                        "'{}'!{cell_ref} has no formula",
                        layout.sheet
                    ))
                })?;
            let matches = SUM_RE
                .captures(formula)
                .is_some_and(|c| &c[1] == col.as_str() && &c[2] == col.as_str());
            if !matches {
                return Err(RimborsoError::TemplateShape(format!(
                    "'{}'!{cell_ref} is '{formula}', expected SUM({col}..:{col}..)",
                    layout.sheet
                )));
            }
        }
        Ok(())
    }

    /// The Totals-sheet cell for a category must reference its totals row.
    pub fn validate_totals_ref(&self, layout: &CategoryLayout, totals: &Worksheet) -> Result<()> {
        let (col, row) = crate::xlsx::sheet::split_ref(&layout.totals_cell).ok_or_else(|| {
            RimborsoError::TemplateShape(format!("bad totals cell '{}'", layout.totals_cell))
        })?;
        let formula = totals
            .cell(col, row)
            .and_then(|c| c.formula.as_ref())
            .map(|f| f.text.as_str())
            .unwrap_or_default();
        let found = formula_refs(formula).iter().any(|r| {
            r.sheet.as_deref() == Some(layout.sheet.as_str())
                && r.col == layout.totals_ref_column
                && r.row == layout.totals_row
        });
        if !found {
            return Err(RimborsoError::TemplateShape(format!(
                "'{}'!{} should reference '{}'!{}{}",
                self.totals_sheet,
                layout.totals_cell,
                layout.sheet,
                layout.totals_ref_column,
                layout.totals_row
            )));
        }
        Ok(())
    }
}
