use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{Result, RimborsoError};
use crate::package::{attr, escape, runs_text, unescape};

static ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<row\b([^>]*?)(?:/>|>(.*?)</row>)"#).expect("row regex")
});
static CELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)"#).expect("cell regex")
});
static F_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<f\b([^>]*?)(?:/>|>(.*?)</f>)"#).expect("formula regex")
});
static V_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<v>(.*?)</v>"#).expect("value regex"));
static IS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<is>(.*?)</is>"#).expect("inline string regex"));
static SHEET_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<sheetData\s*/>|<sheetData\b[^>]*>(.*?)</sheetData>"#)
        .expect("sheetData regex")
});
static MERGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<mergeCell ref="([^"]+)"\s*/>"#).expect("mergeCell regex"));
static MERGE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<mergeCells\b[^>]*>.*?</mergeCells>"#).expect("mergeCells regex")
});
static DIMENSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<dimension ref="([^"]+)"\s*/>"#).expect("dimension regex"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s+([A-Za-z_:][\w:.-]*)="([^"]*)""#).expect("attribute regex")
});
static REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<sheet>(?:'(?:[^']|'')+'|[A-Za-z_][A-Za-z0-9_.]*)!)?(?P<c1>\$?)(?P<col>[A-Z]{1,3})(?P<c2>\$?)(?P<row>[0-9]+)"#)
        .expect("cell reference regex")
});

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// 1-based column number for letters like "A" or "AB".
pub fn col_number(letters: &str) -> u32 {
    letters
        .bytes()
        .filter(u8::is_ascii_uppercase)
        .fold(0, |acc, b| acc * 26 + u32::from(b - b'A' + 1))
}

/// Letters for a 1-based column number.
pub fn col_letters(mut n: u32) -> String {
    let mut s = String::new();
    while n > 0 {
        let r = ((n - 1) % 26) as u8;
        s.insert(0, (b'A' + r) as char);
        n = (n - 1) / 26;
    }
    s
}

/// Split "AB12" into (28, 12).
pub fn split_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let cell_ref = cell_ref.replace('$', "");
    let digits = cell_ref.find(|c: char| c.is_ascii_digit())?;
    let (letters, row) = cell_ref.split_at(digits);
    if letters.is_empty() {
        return None;
    }
    Some((col_number(letters), row.parse().ok()?))
}

/// A cell reference found inside a formula.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaRef {
    /// Sheet name with quoting removed, if the reference is qualified.
    pub sheet: Option<String>,
    pub col: String,
    pub row: u32,
}

/// Rewrite every cell reference in `formula` through `map`. Returning `None`
/// from `map` keeps the reference as written.
pub fn rewrite_refs(formula: &str, mut map: impl FnMut(&FormulaRef) -> Option<u32>) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;
    for caps in REF_RE.captures_iter(formula) {
        let Some(whole) = caps.get(0) else { continue };
        if !is_reference(formula, whole.start(), whole.end()) {
            continue;
        }
        let Some(r) = parse_ref(&caps) else { continue };
        out.push_str(&formula[last..whole.start()]);
        match map(&r) {
            Some(row) => {
                if let Some(sheet) = caps.name("sheet") {
                    out.push_str(sheet.as_str());
                }
                let _ = write!(out, "{}{}{}{}", &caps["c1"], r.col, &caps["c2"], row);
            }
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&formula[last..]);
    out
}

/// Every cell reference in a formula.
pub fn formula_refs(formula: &str) -> Vec<FormulaRef> {
    REF_RE
        .captures_iter(formula)
        .filter(|caps| {
            caps.get(0)
                .is_some_and(|m| is_reference(formula, m.start(), m.end()))
        })
        .filter_map(|caps| parse_ref(&caps))
        .collect()
}

fn parse_ref(caps: &Captures) -> Option<FormulaRef> {
    let sheet = caps.name("sheet").map(|m| {
        let raw = m.as_str().trim_end_matches('!');
        match raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
            Some(quoted) => quoted.replace("''", "'"),
            None => raw.to_string(),
        }
    });
    Some(FormulaRef {
        sheet,
        col: caps.name("col")?.as_str().to_string(),
        row: caps.name("row")?.as_str().parse().ok()?,
    })
}

/// Rejects function names such as `LOG10(` and fragments of longer identifiers.
fn is_reference(formula: &str, start: usize, end: usize) -> bool {
    let before = formula[..start].chars().next_back();
    let after = formula[end..].chars().next();
    let glued_before = before.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    let glued_after = after.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '(');
    !glued_before && !glued_after
}

// ---------------------------------------------------------------------------
// Cells and rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Formula {
    pub attrs: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub col: u32,
    pub style: Option<String>,
    pub kind: Option<String>,
    pub formula: Option<Formula>,
    pub value: Option<String>,
    /// Raw inner XML of `<is>`.
    pub inline: Option<String>,
}

impl Cell {
    pub fn styled(col: u32, style: Option<String>) -> Self {
        Self {
            col,
            style,
            ..Self::default()
        }
    }

    pub fn set_text(&mut self, text: &str) {
        self.kind = Some("inlineStr".to_string());
        self.formula = None;
        self.value = None;
        self.inline = Some(format!(r#"<t xml:space="preserve">{}</t>"#, escape(text)));
    }

    pub fn set_number(&mut self, number: impl std::fmt::Display) {
        self.kind = None;
        self.formula = None;
        self.inline = None;
        self.value = Some(number.to_string());
    }

    pub fn set_formula(&mut self, text: String, cached: Option<String>) {
        self.kind = None;
        self.inline = None;
        self.formula = Some(Formula {
            attrs: String::new(),
            text,
        });
        self.value = cached;
    }

    /// Displayed text of a string cell; `None` for numbers and formulas.
    pub fn text(&self, shared: &[String]) -> Option<String> {
        match self.kind.as_deref() {
            Some("s") => {
                let idx: usize = self.value.as_deref()?.trim().parse().ok()?;
                shared.get(idx).cloned()
            }
            Some("inlineStr") => self.inline.as_deref().map(runs_text),
            Some("str") if self.formula.is_none() => self.value.as_deref().map(unescape),
            _ => None,
        }
    }

    fn parse(caps: &Captures) -> Option<Self> {
        let attrs = caps.get(1)?.as_str();
        let (col, _) = split_ref(&attr(attrs, "r")?)?;
        let inner = caps.get(2).map_or("", |m| m.as_str());
        let formula = F_RE.captures(inner).map(|f| Formula {
            attrs: f.get(1).map_or("", |m| m.as_str()).to_string(),
            text: unescape(f.get(2).map_or("", |m| m.as_str())),
        });
        Some(Self {
            col,
            style: attr(attrs, "s"),
            kind: attr(attrs, "t"),
            formula,
            value: V_RE.captures(inner).and_then(|v| v.get(1)).map(|m| m.as_str().to_string()),
            inline: IS_RE.captures(inner).and_then(|v| v.get(1)).map(|m| m.as_str().to_string()),
        })
    }

    fn write(&self, row: u32, out: &mut String) {
        let _ = write!(out, r#"<c r="{}{}""#, col_letters(self.col), row);
        if let Some(s) = &self.style {
            let _ = write!(out, r#" s="{s}""#);
        }
        if let Some(t) = &self.kind {
            let _ = write!(out, r#" t="{t}""#);
        }
        if self.formula.is_none() && self.value.is_none() && self.inline.is_none() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        if let Some(f) = &self.formula {
            let _ = write!(out, "<f{}>{}</f>", f.attrs, escape(&f.text));
        }
        if let Some(v) = &self.value {
            let _ = write!(out, "<v>{v}</v>");
        }
        if let Some(is) = &self.inline {
            let _ = write!(out, "<is>{is}</is>");
        }
        out.push_str("</c>");
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub number: u32,
    /// Raw attributes other than `r` and `spans` (height, style, ...).
    pub attrs: String,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn cell(&self, col: u32) -> Option<&Cell> {
        self.cells.iter().find(|c| c.col == col)
    }

    /// Cell at `col`, created in column order if missing.
    pub fn cell_mut(&mut self, col: u32) -> &mut Cell {
        let pos = match self.cells.iter().position(|c| c.col >= col) {
            Some(p) if self.cells[p].col == col => p,
            Some(p) => {
                self.cells.insert(p, Cell::styled(col, None));
                p
            }
            None => {
                self.cells.push(Cell::styled(col, None));
                self.cells.len() - 1
            }
        };
        &mut self.cells[pos]
    }

    fn parse(caps: &Captures) -> Option<Self> {
        let raw_attrs = caps.get(1)?.as_str();
        let number = attr(raw_attrs, "r")?.parse().ok()?;
        let attrs = strip_attrs(raw_attrs, &["r", "spans"]);
        let inner = caps.get(2).map_or("", |m| m.as_str());
        let cells = CELL_RE.captures_iter(inner).filter_map(|c| Cell::parse(&c)).collect();
        Some(Self { number, attrs, cells })
    }

    fn write(&self, out: &mut String) {
        let _ = write!(out, r#"<row r="{}"{}"#, self.number, self.attrs);
        if self.cells.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for cell in &self.cells {
            cell.write(self.number, out);
        }
        out.push_str("</row>");
    }
}

fn strip_attrs(raw: &str, names: &[&str]) -> String {
    let mut out = String::new();
    for caps in ATTR_RE.captures_iter(raw) {
        if names.contains(&&caps[1]) {
            continue;
        }
        out.push_str(&caps[0]);
    }
    out
}

// ---------------------------------------------------------------------------
// Worksheet
// ---------------------------------------------------------------------------

/// A worksheet part split around its `<sheetData>` so rows can be edited
/// while everything else is preserved byte for byte.
#[derive(Debug, Clone)]
pub struct Worksheet {
    head: String,
    pub rows: Vec<Row>,
    tail: String,
}

impl Worksheet {
    pub fn parse(xml: &str) -> Result<Self> {
        let caps = SHEET_DATA_RE
            .captures(xml)
            .ok_or_else(|| RimborsoError::TemplateShape("worksheet without sheetData".into()))?;
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let inner = caps.get(1).map_or("", |m| m.as_str());
        let rows = ROW_RE.captures_iter(inner).filter_map(|c| Row::parse(&c)).collect();
        Ok(Self {
            head: xml[..whole.start].to_string(),
            rows,
            tail: xml[whole.end..].to_string(),
        })
    }

    pub fn row(&self, number: u32) -> Option<&Row> {
        self.rows.iter().find(|r| r.number == number)
    }

    pub fn row_mut(&mut self, number: u32) -> Option<&mut Row> {
        self.rows.iter_mut().find(|r| r.number == number)
    }

    pub fn cell(&self, col: u32, row: u32) -> Option<&Cell> {
        self.row(row).and_then(|r| r.cell(col))
    }

    pub fn cell_mut(&mut self, col: u32, row: u32) -> Option<&mut Cell> {
        self.rows
            .iter_mut()
            .find(|r| r.number == row)
            .and_then(|r| r.cells.iter_mut().find(|c| c.col == col))
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.rows.iter_mut().flat_map(|r| r.cells.iter_mut())
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(self.head.len() + self.tail.len() + 4096);
        out.push_str(&self.head);
        out.push_str("<sheetData>");
        for row in &self.rows {
            row.write(&mut out);
        }
        out.push_str("</sheetData>");
        out.push_str(&self.tail);
        out
    }

    /// Replace the template block `[start, totals]` with `body` followed by
    /// `totals_row`, moving every row after the old totals row so it keeps its
    /// distance from the new one. Merged ranges and the dimension move too.
    pub fn splice_block(&mut self, start: u32, totals: u32, body: Vec<Row>, mut totals_row: Row) {
        let new_totals = start + body.len() as u32;
        let delta = i64::from(new_totals) - i64::from(totals);
        let shift = |row: u32| -> u32 {
            if row >= totals {
                (i64::from(row) + delta).max(1) as u32
            } else {
                row
            }
        };

        let mut rows: Vec<Row> = Vec::with_capacity(self.rows.len() + body.len());
        let mut after: Vec<Row> = Vec::new();
        for row in std::mem::take(&mut self.rows) {
            if row.number < start {
                rows.push(row);
            } else if row.number > totals {
                after.push(row);
            }
        }
        rows.extend(body);
        totals_row.number = new_totals;
        rows.push(totals_row);
        for mut row in after {
            row.number = shift(row.number);
            rows.push(row);
        }

        for cell in rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
            if let Some(f) = cell.formula.as_mut() {
                f.text = rewrite_refs(&f.text, |r| r.sheet.is_none().then(|| shift(r.row)));
            }
        }
        self.rows = rows;

        self.head = shift_dimension(&self.head, &shift);
        self.tail = shift_merges(&self.tail, start, totals, &shift);
    }
}

fn shift_range(range: &str, shift: &impl Fn(u32) -> u32) -> Option<String> {
    let mut parts = Vec::new();
    for end in range.split(':') {
        let (col, row) = split_ref(end)?;
        parts.push(format!("{}{}", col_letters(col), shift(row)));
    }
    Some(parts.join(":"))
}

fn shift_dimension(head: &str, shift: &impl Fn(u32) -> u32) -> String {
    DIMENSION_RE
        .replace(head, |caps: &Captures| {
            let range = shift_range(&caps[1], shift).unwrap_or_else(|| caps[1].to_string());
            format!(r#"<dimension ref="{range}"/>"#)
        })
        .into_owned()
}

/// Merges inside the replaced data rows are dropped; the rest move with their rows.
fn shift_merges(tail: &str, start: u32, totals: u32, shift: &impl Fn(u32) -> u32) -> String {
    let Some(block) = MERGE_BLOCK_RE.find(tail) else {
        return tail.to_string();
    };
    let mut kept = Vec::new();
    for caps in MERGE_RE.captures_iter(block.as_str()) {
        let range = &caps[1];
        let rows: Vec<u32> = range
            .split(':')
            .filter_map(split_ref)
            .map(|(_, row)| row)
            .collect();
        if rows.iter().all(|r| (start..totals).contains(r)) {
            tracing::debug!(range, "dropping merge inside the data block");
            continue;
        }
        kept.push(shift_range(range, shift).unwrap_or_else(|| range.to_string()));
    }
    let replacement = if kept.is_empty() {
        String::new()
    } else {
        let cells: String = kept.iter().map(|r| format!(r#"<mergeCell ref="{r}"/>"#)).collect();
        format!(r#"<mergeCells count="{}">{cells}</mergeCells>"#, kept.len())
    };
    format!("{}{}{}", &tail[..block.start()], replacement, &tail[block.end()..])
}
