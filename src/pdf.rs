use std::io::BufWriter;

use printpdf::*;
use rust_decimal::Decimal;

use crate::error::{Result, RimborsoError};
use crate::fmt::{euro, number};
use crate::snapshot::ReportSnapshot;

// A4 portrait (mm)
const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN_TOP: f32 = 20.0;
const MARGIN_BOTTOM: f32 = 20.0;
const MARGIN_SIDE: f32 = 17.5;
const TABLE_W: f32 = PAGE_W - 2.0 * MARGIN_SIDE;
const CELL_PAD: f32 = 2.0;
const PT_TO_MM: f32 = 0.3528;
const LINE_SPACING: f32 = 1.2;
const TABLE_SIZE: f32 = 8.0;
const TOTALS_SIZE: f32 = 10.0;
const GRAND_SIZE: f32 = 12.0;
const SECTION_SIZE: f32 = 14.0;
const PERIOD_SIZE: f32 = 12.0;

/// Date, vehicle, start, stops, end, km, car type, amount.
const KM_WIDTHS: [f32; 8] = [20.0, 22.0, 23.0, 36.0, 23.0, 15.0, 18.0, 18.0];
/// Date, description, payment, city, motive, amount.
const INVOICE_WIDTHS: [f32; 6] = [20.0, 55.0, 22.0, 28.0, 22.0, 28.0];
const TOTALS_WIDTHS: [f32; 3] = [40.0, 30.0, 30.0];
const INVOICE_TOTALS_WIDTHS: [f32; 2] = [60.0, 40.0];
const GRAND_WIDTHS: [f32; 2] = [80.0, 40.0];

fn approx_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.18
}

fn line_height(size: f32) -> f32 {
    size * PT_TO_MM * LINE_SPACING
}

/// Lines of `text` that fit a column `width` mm wide at `size` points.
fn wrap_cell(text: &str, width: f32, size: f32) -> Vec<String> {
    let chars = ((width - 2.0 * CELL_PAD) / (size * 0.18)).floor().max(1.0) as usize;
    let lines: Vec<String> = textwrap::wrap(text, chars)
        .into_iter()
        .map(|l| l.into_owned())
        .collect();
    if lines.is_empty() {
        vec![String::new()]
    } else {
        lines
    }
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Center,
    Right,
}

struct Col {
    width: f32,
    align: Align,
}

fn cols(widths: &[f32], aligns: &[Align]) -> Vec<Col> {
    widths
        .iter()
        .zip(aligns)
        .map(|(&width, &align)| Col { width, align })
        .collect()
}

struct Table<'a> {
    cols: &'a [Col],
    size: f32,
    /// Repeated at the top of every page the table spans.
    header: Option<Vec<String>>,
}

impl Table<'_> {
    fn width(&self) -> f32 {
        self.cols.iter().map(|c| c.width).sum()
    }

    fn left(&self) -> f32 {
        (PAGE_W - self.width()) / 2.0
    }
}

struct PdfWriter {
    doc: PdfDocumentReference,
    font: IndirectFontRef,
    font_bold: IndirectFontRef,
    current_page: PdfPageIndex,
    current_layer: PdfLayerIndex,
    pages: usize,
    y: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| RimborsoError::Pdf(format!("{e:?}")))?;
        let font_bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| RimborsoError::Pdf(format!("{e:?}")))?;
        Ok(Self {
            doc,
            font,
            font_bold,
            current_page: page,
            current_layer: layer,
            pages: 1,
            y: MARGIN_TOP,
        })
    }

    fn layer(&self) -> PdfLayerReference {
        self.doc
            .get_page(self.current_page)
            .get_layer(self.current_layer)
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer");
        self.current_page = page;
        self.current_layer = layer;
        self.pages += 1;
        self.y = MARGIN_TOP;
    }

    fn fits(&self, needed: f32) -> bool {
        self.y + needed <= PAGE_H - MARGIN_BOTTOM
    }

    fn ensure_space(&mut self, needed: f32) {
        if !self.fits(needed) {
            self.new_page();
        }
    }

    /// Text with its baseline `top` mm below the top edge.
    fn text(&self, s: &str, x: f32, top: f32, size: f32, bold: bool) {
        let font = if bold { &self.font_bold } else { &self.font };
        self.layer().use_text(s, size, Mm(x), Mm(PAGE_H - top), font);
    }

    fn centered(&mut self, s: &str, size: f32, bold: bool) {
        let height = line_height(size);
        self.ensure_space(height);
        self.y += height;
        let x = (PAGE_W - approx_text_width(s, size)) / 2.0;
        self.text(s, x.max(MARGIN_SIDE), self.y, size, bold);
        self.y += height / 2.0;
    }

    fn line(&self, x1: f32, top1: f32, x2: f32, top2: f32) {
        let layer = self.layer();
        layer.set_outline_thickness(0.5);
        layer.set_outline_color(Color::Rgb(Rgb::new(0.5, 0.5, 0.5, None)));
        layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x1), Mm(PAGE_H - top1)), false),
                (Point::new(Mm(x2), Mm(PAGE_H - top2)), false),
            ],
            is_closed: false,
        });
    }

    fn row_height(table: &Table, cells: &[Vec<String>]) -> f32 {
        let lines = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
        lines as f32 * line_height(table.size) + 2.0 * CELL_PAD
    }

    /// One bordered row. Returns nothing; advances `y` by the row height.
    fn grid_row(&mut self, table: &Table, cells: &[Vec<String>], bold: bool) {
        let height = Self::row_height(table, cells);
        let left = table.left();
        let right = left + table.width();
        let top = self.y;

        self.line(left, top, right, top);
        self.line(left, top + height, right, top + height);
        let mut x = left;
        self.line(x, top, x, top + height);
        for (col, lines) in table.cols.iter().zip(cells) {
            for (i, text) in lines.iter().enumerate() {
                let baseline = top + CELL_PAD + table.size * PT_TO_MM + i as f32 * line_height(table.size);
                let inner = col.width - 2.0 * CELL_PAD;
                let offset = match col.align {
                    Align::Left => 0.0,
                    Align::Center => ((inner - approx_text_width(text, table.size)) / 2.0).max(0.0),
                    Align::Right => (inner - approx_text_width(text, table.size)).max(0.0),
                };
                self.text(text, x + CELL_PAD + offset, baseline, table.size, bold);
            }
            x += col.width;
            self.line(x, top, x, top + height);
        }
        self.y += height;
    }

    fn wrap_row(table: &Table, values: &[String]) -> Vec<Vec<String>> {
        table
            .cols
            .iter()
            .zip(values)
            .map(|(col, v)| wrap_cell(v, col.width, table.size))
            .collect()
    }

    /// A grid table that breaks across pages between rows, repeating its
    /// header on each new page.
    fn grid_table(&mut self, table: &Table, rows: &[(Vec<String>, bool)]) {
        let header = table.header.as_ref().map(|h| Self::wrap_row(table, h));
        let header_h = header.as_ref().map_or(0.0, |h| Self::row_height(table, h));
        let mut need_header = header.is_some();
        for (values, bold) in rows {
            let cells = Self::wrap_row(table, values);
            let height = Self::row_height(table, &cells);
            if !self.fits(height + if need_header { header_h } else { 0.0 }) {
                self.new_page();
                need_header = header.is_some();
            }
            if need_header {
                if let Some(h) = &header {
                    self.grid_row(table, h, true);
                }
                need_header = false;
            }
            self.grid_row(table, &cells, *bold);
        }
        if rows.is_empty() {
            if let Some(h) = &header {
                self.ensure_space(header_h);
                self.grid_row(table, h, true);
            }
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y += mm;
    }

    fn to_bytes(self) -> Result<Vec<u8>> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| RimborsoError::Pdf(format!("{e:?}")))?;
        buf.into_inner().map_err(|e| RimborsoError::Pdf(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

pub fn render_pdf(snapshot: &ReportSnapshot) -> Result<Vec<u8>> {
    compose(snapshot)?.to_bytes()
}

fn compose(snapshot: &ReportSnapshot) -> Result<PdfWriter> {
    let labels = snapshot.locale.labels();
    let mut pdf = PdfWriter::new(&snapshot.filename)?;

    pdf.centered(&format!("{} {}", labels.period, snapshot.period), PERIOD_SIZE, false);
    let who = identity_line(snapshot);
    if !who.is_empty() {
        pdf.centered(&who, TOTALS_SIZE, false);
    }
    pdf.gap(6.0);

    if !snapshot.km_entries.is_empty() {
        pdf.centered(labels.km_section, SECTION_SIZE, true);
        pdf.gap(2.0);
        let km_cols = cols(
            &KM_WIDTHS,
            &[
                Align::Left,
                Align::Left,
                Align::Left,
                Align::Left,
                Align::Left,
                Align::Right,
                Align::Left,
                Align::Center,
            ],
        );
        let table = Table {
            cols: &km_cols,
            size: TABLE_SIZE,
            header: Some(labels.km_headers.iter().map(|h| h.to_string()).collect()),
        };
        let rows: Vec<(Vec<String>, bool)> = km_rows(snapshot).into_iter().map(|r| (r, false)).collect();
        pdf.grid_table(&table, &rows);
        pdf.gap(10.0);

        let totals_cols = cols(&TOTALS_WIDTHS, &[Align::Left, Align::Right, Align::Right]);
        let totals = Table {
            cols: &totals_cols,
            size: TOTALS_SIZE,
            header: None,
        };
        pdf.grid_table(&totals, &km_totals_rows(snapshot));
        pdf.gap(10.0);
    }

    if !snapshot.invoices.is_empty() {
        pdf.centered(labels.invoice_section, SECTION_SIZE, true);
        pdf.gap(2.0);
        let invoice_cols = cols(
            &INVOICE_WIDTHS,
            &[
                Align::Left,
                Align::Left,
                Align::Left,
                Align::Left,
                Align::Left,
                Align::Right,
            ],
        );
        let table = Table {
            cols: &invoice_cols,
            size: TABLE_SIZE,
            header: Some(labels.invoice_headers.iter().map(|h| h.to_string()).collect()),
        };
        let rows: Vec<(Vec<String>, bool)> =
            invoice_rows(snapshot).into_iter().map(|r| (r, false)).collect();
        pdf.grid_table(&table, &rows);
        pdf.gap(10.0);

        let totals_cols = cols(&INVOICE_TOTALS_WIDTHS, &[Align::Left, Align::Right]);
        let totals = Table {
            cols: &totals_cols,
            size: TOTALS_SIZE,
            header: None,
        };
        pdf.grid_table(&totals, &invoice_totals_rows(snapshot));
        pdf.gap(10.0);
    }

    pdf.gap(10.0);
    let grand_cols = cols(&GRAND_WIDTHS, &[Align::Left, Align::Right]);
    let grand = Table {
        cols: &grand_cols,
        size: GRAND_SIZE,
        header: None,
    };
    let row = vec![format!("{}:", labels.grand_total), euro(snapshot.grand_total)];
    pdf.grid_table(&grand, &[(row, true)]);

    tracing::debug!(pages = pdf.pages, "laid out PDF report");
    Ok(pdf)
}

fn identity_line(snapshot: &ReportSnapshot) -> String {
    let id = &snapshot.identity;
    let name = format!("{} {}", id.surname.trim(), id.first_name.trim());
    [name.trim(), id.office.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" - ")
}

fn km_rows(snapshot: &ReportSnapshot) -> Vec<Vec<String>> {
    let labels = snapshot.locale.labels();
    snapshot
        .km_entries
        .iter()
        .map(|e| {
            let waypoints = e.waypoints_upper(" | ");
            vec![
                if e.date.trim().is_empty() { "-".to_string() } else { e.date.clone() },
                e.car_name(),
                e.start_city.to_uppercase(),
                if waypoints.is_empty() { "-".to_string() } else { waypoints },
                e.end_city.to_uppercase(),
                number(e.total_km()),
                if e.is_company_car() { labels.company_short } else { labels.personal_short }.to_string(),
                euro(e.amount()),
            ]
        })
        .collect()
}

/// Personal and company rows appear only when they have kilometres; the
/// total row is always there.
fn km_totals_rows(snapshot: &ReportSnapshot) -> Vec<(Vec<String>, bool)> {
    let labels = snapshot.locale.labels();
    let km = &snapshot.km_totals;
    let mut rows = Vec::new();
    if km.personal_km > Decimal::ZERO {
        rows.push((
            vec![
                format!("{}:", labels.personal_car),
                format!("{} km", number(km.personal_km)),
                euro(km.personal_amount),
            ],
            false,
        ));
    }
    if km.company_km > Decimal::ZERO {
        rows.push((
            vec![
                format!("{}:", labels.company_car),
                format!("{} km", number(km.company_km)),
                euro(km.company_amount),
            ],
            false,
        ));
    }
    rows.push((
        vec![
            format!("{}:", labels.total),
            format!("{} km", number(km.total_km)),
            euro(km.total_amount),
        ],
        true,
    ));
    rows
}

fn invoice_rows(snapshot: &ReportSnapshot) -> Vec<Vec<String>> {
    let labels = snapshot.locale.labels();
    snapshot
        .invoices
        .iter()
        .map(|e| {
            let mut title = e.title.clone();
            if e.prepaid {
                title = format!("{title} ({})", labels.prepaid);
            }
            vec![
                e.date.clone(),
                title,
                e.payment_method.label(labels).to_string(),
                e.city.clone(),
                e.motive.label(labels).to_string(),
                euro(e.amount_value()),
            ]
        })
        .collect()
}

fn invoice_totals_rows(snapshot: &ReportSnapshot) -> Vec<(Vec<String>, bool)> {
    let labels = snapshot.locale.labels();
    let t = &snapshot.invoice_totals;
    let row = |label: &str, value: Decimal, bold: bool| (vec![format!("{label}:"), euro(value)], bold);
    vec![
        row(labels.food, t.food, false),
        row(labels.transportation, t.transportation, false),
        row(labels.housing, t.housing, false),
        row(labels.prepaid, t.prepaid, false),
        row(labels.reimbursable, t.reimbursable, true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Locale;
    use crate::models::{InvoiceEntry, KmDraft, KmTripEntry, Motive};
    use crate::reports::KmRates;
    use crate::session::Session;
    use crate::snapshot;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn snap(session: &Session) -> ReportSnapshot {
        snapshot::build(
            session,
            &KmRates::default(),
            Locale::It,
            NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
        )
    }

    fn trip(day: u32, km: Decimal, company: bool) -> KmTripEntry {
        KmTripEntry::new(
            KmDraft {
                date: format!("{:02}/06/2025", day),
                car_brand: "fiat".into(),
                car_model: "panda".into(),
                car_engine: "1200".into(),
                start_city: "torino".into(),
                end_city: "milano".into(),
                waypoints: vec!["novara".into(), "vercelli".into(), "magenta".into()],
                total_km: km,
                is_company_car: company,
                ..KmDraft::default()
            },
            &KmRates::default(),
        )
    }

    #[test]
    fn test_column_widths_fill_printable_width() {
        assert_eq!(KM_WIDTHS.iter().sum::<f32>(), TABLE_W);
        assert_eq!(INVOICE_WIDTHS.iter().sum::<f32>(), TABLE_W);
        assert_eq!(TABLE_W, 175.0);
    }

    #[test]
    fn test_empty_session_produces_pdf() {
        let pdf = compose(&snap(&Session::default())).unwrap();
        assert_eq!(pdf.pages, 1);
        let bytes = pdf.to_bytes().unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_full_report_produces_pdf() {
        let mut s = Session::default();
        s.identity.surname = "Rossi".into();
        s.km_entries.push(trip(2, dec!(100), false));
        s.invoices.push(InvoiceEntry {
            date: "03/06/2025".into(),
            title: "Pranzo".into(),
            amount: "15,50".into(),
            motive: Motive::Food,
            ..InvoiceEntry::default()
        });
        let bytes = render_pdf(&snap(&s)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_long_tables_span_pages() {
        let mut s = Session::default();
        for day in 0..90 {
            s.km_entries.push(trip(day % 28 + 1, dec!(12), false));
        }
        let pdf = compose(&snap(&s)).unwrap();
        assert!(pdf.pages > 1);
    }

    #[test]
    fn test_km_totals_rows_skip_empty_kinds() {
        let mut s = Session::default();
        s.km_entries.push(trip(1, dec!(100), false));
        let rows = km_totals_rows(&snap(&s));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, vec!["Auto Personale:", "100.00 km", "€ 40.00"]);
        assert!(rows[1].1);

        s.km_entries.push(trip(2, dec!(50), true));
        let rows = km_totals_rows(&snap(&s));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].0[2], "€ 10.00");
        assert_eq!(rows[2].0, vec!["TOTALE:", "150.00 km", "€ 50.00"]);

        let rows = km_totals_rows(&snap(&Session::default()));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_cells_wrap_to_column_width() {
        let lines = wrap_cell("NOVARA | VERCELLI | MAGENTA | ABBIATEGRASSO", 36.0, TABLE_SIZE);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(approx_text_width(line, TABLE_SIZE) <= 36.0 - 2.0 * CELL_PAD);
        }
        assert_eq!(wrap_cell("", 20.0, TABLE_SIZE), vec![String::new()]);
    }
}
