//! Word renderer. Templates use docxtemplater's `{`/`}` tag syntax so the
//! documents authored for the web form render unchanged:
//!
//! * `{name}` inserts a value (missing values render as nothing),
//! * `{#name}...{/name}` repeats over a list, or renders once for a truthy value,
//! * `{^name}...{/name}` renders only when the value is falsy or an empty list.
//!
//! A section whose tags sit in different cells of one table row repeats the
//! row. When each tag is alone in its own paragraph the paragraphs in between
//! repeat. Anything else repeats inline.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::error::{Result, RimborsoError};
use crate::fmt::{date, euro, number};
use crate::package::{escape, unescape, Package};
use crate::snapshot::ReportSnapshot;

static PARAGRAPH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<w:p(?:\s[^>]*[^/>])?>.*?</w:p>"#).expect("paragraph regex")
});
static TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<w:t(?:\s[^>]*[^/>])?>(.*?)</w:t>"#).expect("text regex")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{([#/^]?)\s*([^{}]*?)\s*\}"#).expect("tag regex"));
static CONTENT_PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^word/(?:document|header[0-9]*|footer[0-9]*)\.xml$"#).expect("part regex")
});

const DOCUMENT: &str = "word/document.xml";
const LINE_BREAK: &str = r#"</w:t><w:br/><w:t xml:space="preserve">"#;

/// Render the report into a copy of `template`.
pub fn render_docx(snapshot: &ReportSnapshot, template: &[u8]) -> Result<Vec<u8>> {
    render_template(template, &report_data(snapshot))
}

/// Fill every tag in the document body, headers and footers from `data`.
pub fn render_template(template: &[u8], data: &Value) -> Result<Vec<u8>> {
    let mut pkg = Package::open(template)?;
    let parts: Vec<String> = pkg
        .names()
        .filter(|n| CONTENT_PART_RE.is_match(n))
        .map(str::to_string)
        .collect();
    if !parts.iter().any(|p| p == DOCUMENT) {
        return Err(RimborsoError::TemplateShape(format!(
            "missing part {DOCUMENT}"
        )));
    }
    for part in &parts {
        let xml = pkg.text(part)?;
        let rendered = render_part(&xml, data).map_err(|e| match e {
            RimborsoError::TemplateShape(msg) => RimborsoError::TemplateShape(format!("{part}: {msg}")),
            other => other,
        })?;
        tracing::debug!(part = %part, "rendered document part");
        pkg.set(part, rendered.into_bytes());
    }
    pkg.to_bytes()
}

/// The data keys the Word template can reference.
pub fn report_data(snapshot: &ReportSnapshot) -> Value {
    let labels = snapshot.locale.labels();
    let id = &snapshot.identity;
    let yes_no = |flag: bool| if flag { labels.yes } else { labels.no };

    let invoices: Vec<Value> = snapshot
        .invoices
        .iter()
        .map(|e| {
            json!({
                "date": e.date,
                "client": id.client,
                "activity": id.activity,
                "description": e.title,
                "payment": e.payment_method.label(labels),
                "amount": euro(e.amount_value()),
                "city": e.city,
                "prepagata": yes_no(e.prepaid),
                "invoice": yes_no(e.is_invoice),
            })
        })
        .collect();

    let km_entries: Vec<Value> = snapshot
        .km_entries
        .iter()
        .map(|e| {
            let day = if e.date.trim().is_empty() { "-" } else { e.date.as_str() };
            let mut waypoints = e.waypoints_upper(" | ");
            if waypoints.is_empty() {
                waypoints = "-".to_string();
            }
            let car_type = if e.is_company_car() {
                labels.company_short
            } else {
                labels.personal_short
            };
            json!({
                "date": day,
                "carName": e.car_name(),
                "startCity": e.start_city.to_uppercase(),
                "waypoints": waypoints,
                "endCity": e.end_city.to_uppercase(),
                "km": number(e.total_km()),
                "carType": car_type,
                "amount": euro(e.amount()),
            })
        })
        .collect();

    let km = &snapshot.km_totals;
    let mut km_summary = Vec::new();
    if km.personal_km > Decimal::ZERO {
        km_summary.push(json!({
            "type": labels.personal_car,
            "km": number(km.personal_km),
            "amount": euro(km.personal_amount),
        }));
    }
    if km.company_km > Decimal::ZERO {
        km_summary.push(json!({
            "type": labels.company_car,
            "km": number(km.company_km),
            "amount": euro(km.company_amount),
        }));
    }

    let totals = &snapshot.invoice_totals;
    json!({
        "nome": id.first_name,
        "cognome": id.surname,
        "sede": id.office,
        "cliente": id.client,
        "oggettoAttivita": id.activity,
        "period": snapshot.period,
        "invoices": invoices,
        "kmEntries": km_entries,
        "kmSummary": km_summary,
        "kmTotal": number(km.total_km),
        "kmTotalAmount": euro(km.total_amount),
        "total": euro(totals.reimbursable),
        "totfood": euro(totals.food),
        "tottransp": euro(totals.transportation),
        "tothousing": euro(totals.housing),
        "prepaid": euro(totals.prepaid),
        "grandTotal": euro(snapshot.grand_total),
        "generationDate": date(snapshot.generated_on),
    })
}

// ---------------------------------------------------------------------------
// Run merging
// ---------------------------------------------------------------------------

/// Word splits text into runs wherever formatting or spell-check state
/// changes, so `{cognome}` can arrive as `{co` + `gnome}`. Pull the rest of
/// every open tag back into the run where it starts.
fn merge_runs(xml: &str) -> String {
    PARAGRAPH_RE
        .replace_all(xml, |caps: &Captures| {
            let para = &caps[0];
            if para.contains('{') {
                merge_paragraph(para)
            } else {
                para.to_string()
            }
        })
        .into_owned()
}

fn merge_paragraph(para: &str) -> String {
    let original: Vec<String> = TEXT_RE.captures_iter(para).map(|c| c[1].to_string()).collect();
    let mut texts = original.clone();
    for i in 0..texts.len() {
        while has_open_tag(&texts[i]) {
            let Some(j) = (i + 1..texts.len()).find(|&j| !texts[j].is_empty()) else {
                break;
            };
            let moved: String = match texts[j].find('}') {
                Some(end) => texts[j].drain(..=end).collect(),
                None => std::mem::take(&mut texts[j]),
            };
            texts[i].push_str(&moved);
        }
    }

    let mut idx = 0;
    TEXT_RE
        .replace_all(para, |caps: &Captures| {
            let i = idx;
            idx += 1;
            if texts[i] == original[i] && !texts[i].contains('{') {
                caps[0].to_string()
            } else {
                format!(r#"<w:t xml:space="preserve">{}</w:t>"#, texts[i])
            }
        })
        .into_owned()
}

fn has_open_tag(text: &str) -> bool {
    text.rfind('{').is_some_and(|open| !text[open..].contains('}'))
}

/// Plain text of a fragment: every `<w:t>` run, unescaped and concatenated.
fn fragment_text(xml: &str) -> String {
    TEXT_RE
        .captures_iter(xml)
        .map(|c| unescape(&c[1]))
        .collect()
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum TagKind {
    Value,
    Section,
    Inverted,
    Close,
}

#[derive(Debug)]
struct Tag {
    range: Range<usize>,
    kind: TagKind,
    name: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Xml(String),
    Value(String),
    Open { name: String, inverted: bool },
    Close,
}

impl Tag {
    fn token(&self) -> Token {
        match self.kind {
            TagKind::Value => Token::Value(self.name.clone()),
            TagKind::Section => Token::Open {
                name: self.name.clone(),
                inverted: false,
            },
            TagKind::Inverted => Token::Open {
                name: self.name.clone(),
                inverted: true,
            },
            TagKind::Close => Token::Close,
        }
    }
}

/// Tags found in text runs only; braces in attributes are left alone.
fn find_tags(xml: &str) -> Vec<Tag> {
    let mut tags = Vec::new();
    for run in TEXT_RE.captures_iter(xml) {
        let Some(content) = run.get(1) else { continue };
        for caps in TAG_RE.captures_iter(content.as_str()) {
            let Some(whole) = caps.get(0) else { continue };
            let kind = match &caps[1] {
                "#" => TagKind::Section,
                "^" => TagKind::Inverted,
                "/" => TagKind::Close,
                _ => TagKind::Value,
            };
            tags.push(Tag {
                range: content.start() + whole.start()..content.start() + whole.end(),
                kind,
                name: unescape(&caps[2]),
            });
        }
    }
    tags
}

/// Match every section opener with its closer, in document order.
fn pair_sections(tags: &[Tag]) -> Result<Vec<(usize, usize)>> {
    let mut open: Vec<usize> = Vec::new();
    let mut pairs = Vec::new();
    for (i, tag) in tags.iter().enumerate() {
        match tag.kind {
            TagKind::Section | TagKind::Inverted => open.push(i),
            TagKind::Close => {
                let o = open.pop().ok_or_else(|| {
                    RimborsoError::TemplateShape(format!("'{{/{}}}' closes nothing", tag.name))
                })?;
                if !tag.name.is_empty() && tag.name != tags[o].name {
                    return Err(RimborsoError::TemplateShape(format!(
                        "section '{}' closed by '{{/{}}}'",
                        tags[o].name, tag.name
                    )));
                }
                pairs.push((o, i));
            }
            TagKind::Value => {}
        }
    }
    if let Some(&o) = open.last() {
        return Err(RimborsoError::TemplateShape(format!(
            "section '{}' is never closed",
            tags[o].name
        )));
    }
    Ok(pairs)
}

/// Byte range of the innermost `<name ...>...</name>` element around `pos`.
fn enclosing(xml: &str, pos: usize, name: &str) -> Option<(usize, usize)> {
    let open = format!("<{name}");
    let close = format!("</{name}>");
    let mut limit = pos;
    let start = loop {
        let found = xml[..limit].rfind(&open)?;
        let next = xml[found + open.len()..].chars().next();
        if next.is_some_and(|c| c == '>' || c.is_whitespace()) {
            break found;
        }
        limit = found;
    };
    if xml[start..pos].contains(&close) {
        return None;
    }
    let end = xml[pos..].find(&close)? + pos + close.len();
    Some((start, end))
}

enum LoopUnit {
    Inline,
    Row((usize, usize)),
    Paragraphs((usize, usize), (usize, usize)),
}

fn loop_unit(xml: &str, open: &Tag, close: &Tag) -> LoopUnit {
    let para_open = enclosing(xml, open.range.start, "w:p");
    let para_close = enclosing(xml, close.range.start, "w:p");
    if para_open.is_some() && para_open == para_close {
        return LoopUnit::Inline;
    }

    let row_open = enclosing(xml, open.range.start, "w:tr");
    let same_row = row_open.is_some() && row_open == enclosing(xml, close.range.start, "w:tr");
    let same_cell = enclosing(xml, open.range.start, "w:tc")
        == enclosing(xml, close.range.start, "w:tc");
    if let (true, false, Some(row)) = (same_row, same_cell, row_open) {
        return LoopUnit::Row(row);
    }

    if let (Some(po), Some(pc)) = (para_open, para_close) {
        let alone = |(s, e): (usize, usize), tag: &Tag| {
            fragment_text(&xml[s..e]).trim() == unescape(&xml[tag.range.clone()])
        };
        if alone(po, open) && alone(pc, close) {
            return LoopUnit::Paragraphs(po, pc);
        }
    }
    match (same_row, row_open) {
        (true, Some(row)) => LoopUnit::Row(row),
        _ => LoopUnit::Inline,
    }
}

/// Turn a part into a token stream with every section tag moved to the
/// boundary of the unit it repeats.
fn compile(xml: &str) -> Result<Vec<Token>> {
    let tags = find_tags(xml);
    let pairs = pair_sections(&tags)?;

    // (position, order, cut end or tag index)
    let mut events: Vec<(usize, usize, Event)> = Vec::new();
    let mut placed = vec![false; tags.len()];
    for &(o, c) in &pairs {
        match loop_unit(xml, &tags[o], &tags[c]) {
            LoopUnit::Inline => continue,
            LoopUnit::Row((start, end)) => {
                events.push((tags[o].range.start, usize::MAX, Event::Cut(tags[o].range.end)));
                events.push((tags[c].range.start, usize::MAX, Event::Cut(tags[c].range.end)));
                events.push((start, o, Event::Tag(o)));
                events.push((end, c, Event::Tag(c)));
            }
            LoopUnit::Paragraphs(po, pc) => {
                events.push((po.0, o, Event::Tag(o)));
                events.push((po.0, usize::MAX, Event::Cut(po.1)));
                events.push((pc.0, c, Event::Tag(c)));
                events.push((pc.0, usize::MAX, Event::Cut(pc.1)));
            }
        }
        placed[o] = true;
        placed[c] = true;
    }
    for (i, tag) in tags.iter().enumerate() {
        if !placed[i] {
            events.push((tag.range.start, i, Event::Tag(i)));
            events.push((tag.range.start, usize::MAX, Event::Cut(tag.range.end)));
        }
    }
    events.sort_by_key(|(pos, order, _)| (*pos, *order));

    let mut tokens = Vec::new();
    let mut cursor = 0;
    for (pos, _, event) in events {
        if pos > cursor {
            tokens.push(Token::Xml(xml[cursor..pos].to_string()));
            cursor = pos;
        }
        match event {
            Event::Tag(i) => tokens.push(tags[i].token()),
            Event::Cut(end) => cursor = cursor.max(end),
        }
    }
    if cursor < xml.len() {
        tokens.push(Token::Xml(xml[cursor..].to_string()));
    }
    Ok(tokens)
}

enum Event {
    Tag(usize),
    Cut(usize),
}

#[derive(Debug)]
enum Node {
    Xml(String),
    Value(String),
    Section {
        name: String,
        inverted: bool,
        body: Vec<Node>,
    },
}

fn build_tree(tokens: Vec<Token>) -> Result<Vec<Node>> {
    let mut stack: Vec<(String, bool, Vec<Node>)> = Vec::new();
    let mut root = Vec::new();
    for token in tokens {
        let node = match token {
            Token::Xml(xml) => Node::Xml(xml),
            Token::Value(name) => Node::Value(name),
            Token::Open { name, inverted } => {
                stack.push((name, inverted, Vec::new()));
                continue;
            }
            Token::Close => {
                let (name, inverted, body) = stack.pop().ok_or_else(|| {
                    RimborsoError::TemplateShape("section tags are not balanced".into())
                })?;
                Node::Section {
                    name,
                    inverted,
                    body,
                }
            }
        };
        match stack.last_mut() {
            Some((_, _, body)) => body.push(node),
            None => root.push(node),
        }
    }
    if let Some((name, _, _)) = stack.last() {
        return Err(RimborsoError::TemplateShape(format!(
            "section '{name}' is never closed"
        )));
    }
    Ok(root)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_part(xml: &str, data: &Value) -> Result<String> {
    let merged = merge_runs(xml);
    let tree = build_tree(compile(&merged)?)?;
    let mut out = String::with_capacity(merged.len());
    let mut scopes = vec![data];
    render_nodes(&tree, &mut scopes, &mut out);
    Ok(out)
}

fn render_nodes<'a>(nodes: &[Node], scopes: &mut Vec<&'a Value>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Xml(xml) => out.push_str(xml),
            Node::Value(name) => match lookup(scopes, name) {
                Some(value) => out.push_str(&escape(&scalar_text(value)).replace('\n', LINE_BREAK)),
                None => tracing::debug!(tag = %name, "tag has no value"),
            },
            Node::Section {
                name,
                inverted,
                body,
            } => {
                let value = lookup(scopes, name);
                let truthy = value.is_some_and(is_truthy);
                if *inverted {
                    if !truthy {
                        render_nodes(body, scopes, out);
                    }
                    continue;
                }
                match value {
                    Some(Value::Array(items)) => {
                        for item in items {
                            scopes.push(item);
                            render_nodes(body, scopes, out);
                            scopes.pop();
                        }
                    }
                    Some(obj) if obj.is_object() => {
                        scopes.push(obj);
                        render_nodes(body, scopes, out);
                        scopes.pop();
                    }
                    _ if truthy => render_nodes(body, scopes, out),
                    _ => {}
                }
            }
        }
    }
}

/// Resolve `name` from the innermost scope outwards. `.` is the current item
/// and dotted names walk into objects.
fn lookup<'a>(scopes: &[&'a Value], name: &str) -> Option<&'a Value> {
    if name == "." {
        return scopes.last().copied();
    }
    let mut path = name.split('.');
    let head = path.next()?;
    let mut value = scopes.iter().rev().find_map(|scope| scope.get(head))?;
    for key in path {
        value = value.get(key)?;
    }
    Some(value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Built-in template
// ---------------------------------------------------------------------------

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

fn para(text: &str, bold: bool) -> String {
    let props = if bold { "<w:rPr><w:b/></w:rPr>" } else { "" };
    format!(r#"<w:p><w:r>{props}<w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, escape(text))
}

fn table(headers: &[&str], cells: &[&str]) -> String {
    let row = |texts: &[&str], bold: bool| -> String {
        let cells: String = texts
            .iter()
            .map(|t| format!(r#"<w:tc><w:tcPr><w:tcW w:w="0" w:type="auto"/></w:tcPr>{}</w:tc>"#, para(t, bold)))
            .collect();
        format!("<w:tr>{cells}</w:tr>")
    };
    format!(
        concat!(
            r#"<w:tbl><w:tblPr><w:tblW w:w="5000" w:type="pct"/><w:tblBorders>"#,
            r#"<w:top w:val="single" w:sz="4"/><w:left w:val="single" w:sz="4"/>"#,
            r#"<w:bottom w:val="single" w:sz="4"/><w:right w:val="single" w:sz="4"/>"#,
            r#"<w:insideH w:val="single" w:sz="4"/><w:insideV w:val="single" w:sz="4"/>"#,
            r#"</w:tblBorders></w:tblPr>{}{}</w:tbl>"#
        ),
        row(headers, true),
        row(cells, false)
    )
}

/// A report document using every data key, written by `rimborso init`.
pub fn builtin_docx_template() -> Result<Vec<u8>> {
    let body = [
        para("RIMBORSO SPESE", true),
        para("{cognome} {nome} - {sede}", false),
        para("Cliente: {cliente}", false),
        para("Attività: {oggettoAttivita}", false),
        para("Periodo: {period}", false),
        para("Fatture e scontrini", true),
        table(
            &["Data", "Descrizione", "Pagamento", "Città", "Prepagata", "Fattura", "Importo"],
            &[
                "{#invoices}{date}",
                "{description}",
                "{payment}",
                "{city}",
                "{prepagata}",
                "{invoice}",
                "{amount}{/invoices}",
            ],
        ),
        para("Vitto: {totfood}", false),
        para("Trasporto: {tottransp}", false),
        para("Alloggio: {tothousing}", false),
        para("Prepagate: {prepaid}", false),
        para("Totale fatture: {total}", false),
        para("Rimborsi chilometrici", true),
        para("{^kmEntries}Nessun rimborso chilometrico{/kmEntries}", false),
        table(
            &["Data", "Veicolo", "Partenza", "Tappe", "Arrivo", "KM", "Tipo", "Importo"],
            &[
                "{#kmEntries}{date}",
                "{carName}",
                "{startCity}",
                "{waypoints}",
                "{endCity}",
                "{km}",
                "{carType}",
                "{amount}{/kmEntries}",
            ],
        ),
        para("{#kmSummary}", false),
        para("{type}: {km} km, {amount}", false),
        para("{/kmSummary}", false),
        para("Totale km: {kmTotal} ({kmTotalAmount})", false),
        para("TOTALE COMPLESSIVO: {grandTotal}", true),
    ]
    .concat();

    let document = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="{}" xmlns:r="{}"><w:body>{}"#,
            r#"<w:sectPr><w:footerReference w:type="default" r:id="rId1"/>"#,
            r#"<w:pgSz w:w="11906" w:h="16838"/>"#,
            r#"<w:pgMar w:top="1134" w:right="992" w:bottom="1134" w:left="992" w:header="709" w:footer="709" w:gutter="0"/>"#,
            r#"</w:sectPr></w:body></w:document>"#
        ),
        W_NS, R_NS, body
    );
    let footer = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:ftr xmlns:w="{W_NS}" xmlns:r="{R_NS}">{}</w:ftr>"#,
        para("Generato il {generationDate}", false)
    );

    let parts = vec![
        (
            "[Content_Types].xml".to_string(),
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
                r#"<Override PartName="/word/footer1.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml"/>"#,
                r#"</Types>"#
            )
            .as_bytes()
            .to_vec(),
        ),
        (
            "_rels/.rels".to_string(),
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
                r#"</Relationships>"#
            )
            .as_bytes()
            .to_vec(),
        ),
        (
            "word/_rels/document.xml.rels".to_string(),
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer" Target="footer1.xml"/>"#,
                r#"</Relationships>"#
            )
            .as_bytes()
            .to_vec(),
        ),
        (DOCUMENT.to_string(), document.into_bytes()),
        ("word/footer1.xml".to_string(), footer.into_bytes()),
    ];
    Package::from_parts(parts).to_bytes()
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

    fn doc(body: &str) -> String {
        format!("<w:document><w:body>{body}</w:body></w:document>")
    }

    fn render(body: &str, data: Value) -> String {
        render_part(&doc(body), &data).unwrap()
    }

    fn snap(session: &Session) -> ReportSnapshot {
        snapshot::build(
            session,
            &KmRates::default(),
            Locale::It,
            NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
        )
    }

    fn document_xml(bytes: &[u8]) -> String {
        Package::open(bytes).unwrap().text(DOCUMENT).unwrap()
    }

    #[test]
    fn test_split_runs_are_merged() {
        let body = concat!(
            r#"<w:p><w:r><w:t>Sig. {co</w:t></w:r><w:proofErr w:type="spellStart"/>"#,
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t>gno</w:t></w:r><w:r><w:t>me} fine</w:t></w:r></w:p>"#
        );
        let out = render(body, json!({"cognome": "Rossi"}));
        assert_eq!(fragment_text(&out), "Sig. Rossi fine");
        assert!(out.contains(r#"<w:t xml:space="preserve">Sig. Rossi</w:t>"#));
    }

    #[test]
    fn test_values_are_escaped_and_missing_are_empty() {
        let body = r#"<w:p><w:r><w:t>{a}|{missing}|{n}</w:t></w:r></w:p>"#;
        let out = render(body, json!({"a": "A & <B>\nC", "n": 3}));
        assert!(out.contains("A &amp; &lt;B&gt;</w:t><w:br/><w:t xml:space=\"preserve\">C||3"));
    }

    #[test]
    fn test_table_row_loop() {
        let body = concat!(
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Data</w:t></w:r></w:p></w:tc></w:tr>"#,
            r#"<w:tr><w:tc><w:p><w:r><w:t>{#rows}{date}</w:t></w:r></w:p></w:tc>"#,
            r#"<w:tc><w:p><w:r><w:t>{amount}{/rows}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#
        );
        let out = render(
            body,
            json!({"rows": [{"date": "01/03", "amount": "€ 1.00"}, {"date": "02/03", "amount": "€ 2.00"}]}),
        );
        assert_eq!(out.matches("<w:tr>").count(), 3);
        assert_eq!(fragment_text(&out), "Data01/03€ 1.0002/03€ 2.00");
    }

    #[test]
    fn test_empty_list_drops_row() {
        let body = concat!(
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>{#rows}{date}</w:t></w:r></w:p></w:tc>"#,
            r#"<w:tc><w:p><w:r><w:t>{/rows}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#
        );
        let out = render(body, json!({"rows": []}));
        assert_eq!(out, doc("<w:tbl></w:tbl>"));
    }

    #[test]
    fn test_paragraph_loop() {
        let body = concat!(
            r#"<w:p><w:r><w:t>Prima</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>{#items}</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>- {name}</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>{/items}</w:t></w:r></w:p>"#
        );
        let out = render(body, json!({"items": [{"name": "a"}, {"name": "b"}, {"name": "c"}]}));
        assert_eq!(out.matches("<w:p>").count(), 4);
        assert_eq!(fragment_text(&out), "Prima- a- b- c");
    }

    #[test]
    fn test_inline_and_inverted_sections() {
        let body = r#"<w:p><w:r><w:t>{#tags}{.}, {/tags}{^tags}nessuno{/tags}{#flag}sì{/flag}</w:t></w:r></w:p>"#;
        let out = render(body, json!({"tags": ["x", "y"], "flag": true}));
        assert_eq!(fragment_text(&out), "x, y, sì");
        let out = render(body, json!({"tags": [], "flag": false}));
        assert_eq!(fragment_text(&out), "nessuno");
    }

    #[test]
    fn test_outer_scope_visible_in_loop() {
        let body = r#"<w:p><w:r><w:t>{#rows}{client}:{n} {/rows}</w:t></w:r></w:p>"#;
        let out = render(body, json!({"client": "ACME", "rows": [{"n": 1}, {"n": 2}]}));
        assert_eq!(fragment_text(&out), "ACME:1 ACME:2 ");
    }

    #[test]
    fn test_unbalanced_sections_rejected() {
        let err = render_part(&doc(r#"<w:p><w:r><w:t>{#a}x</w:t></w:r></w:p>"#), &json!({}))
            .unwrap_err();
        assert!(matches!(err, RimborsoError::TemplateShape(ref m) if m.contains("never closed")));
        let err = render_part(&doc(r#"<w:p><w:r><w:t>{#a}x{/b}</w:t></w:r></w:p>"#), &json!({}))
            .unwrap_err();
        assert!(matches!(err, RimborsoError::TemplateShape(_)));
    }

    #[test]
    fn test_braces_in_attributes_ignored() {
        let body = r#"<w:sdt><w:dataBinding w:storeItemID="{ABC-123}"/></w:sdt><w:p><w:r><w:t>{x}</w:t></w:r></w:p>"#;
        let out = render(body, json!({"x": "ok"}));
        assert!(out.contains(r#"w:storeItemID="{ABC-123}""#));
        assert_eq!(fragment_text(&out), "ok");
    }

    #[test]
    fn test_empty_session_renders() {
        let template = builtin_docx_template().unwrap();
        let out = render_docx(&snap(&Session::default()), &template).unwrap();
        let xml = document_xml(&out);
        assert!(!fragment_text(&xml).contains('{'));
        assert!(xml.contains("Nessun rimborso chilometrico"));
        assert!(xml.contains("TOTALE COMPLESSIVO: € 0.00"));
        let footer = Package::open(&out).unwrap().text("word/footer1.xml").unwrap();
        assert!(footer.contains("Generato il 15/06/2025"));
    }

    #[test]
    fn test_report_document_totals() {
        let mut s = Session::default();
        s.identity.surname = "Rossi".into();
        s.invoices.push(InvoiceEntry {
            date: "03/06/2025".into(),
            title: "Pranzo".into(),
            amount: "15,50".into(),
            motive: Motive::Food,
            ..InvoiceEntry::default()
        });
        s.km_entries.push(KmTripEntry::new(
            KmDraft {
                date: "04/06/2025".into(),
                car_brand: "fiat".into(),
                car_model: "panda".into(),
                car_engine: "1200".into(),
                start_city: "torino".into(),
                end_city: "milano".into(),
                total_km: dec!(100),
                ..KmDraft::default()
            },
            &KmRates::default(),
        ));
        let template = builtin_docx_template().unwrap();
        let xml = document_xml(&render_docx(&snap(&s), &template).unwrap());
        let text = fragment_text(&xml);
        assert!(text.contains("FIAT PANDA (1200 cc)"));
        assert!(text.contains("Auto Personale: 100.00 km, € 40.00"));
        assert!(text.contains("Vitto: € 15.50"));
        assert!(text.contains("TOTALE COMPLESSIVO: € 55.50"));
        assert!(!text.contains("Nessun rimborso"));
    }

    #[test]
    fn test_report_data_keys() {
        let data = report_data(&snap(&Session::default()));
        for key in [
            "nome", "cognome", "sede", "cliente", "oggettoAttivita", "period", "invoices",
            "kmEntries", "kmSummary", "kmTotal", "kmTotalAmount", "total", "totfood",
            "tottransp", "tothousing", "prepaid", "grandTotal", "generationDate",
        ] {
            assert!(data.get(key).is_some(), "missing {key}");
        }
        assert_eq!(data["kmSummary"], json!([]));
    }
}
