use std::io::{Cursor, Read, Write};
use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use zip::read::ZipArchive;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{Result, RimborsoError};

static SHEET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<sheet\b[^>]*?/?>"#).expect("sheet regex"));
static REL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<Relationship\b[^>]*?/?>"#).expect("relationship regex"));
static SI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<si>(.*?)</si>|<si/>"#).expect("shared string regex"));
static T_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<t(?:\s[^>]*)?>(.*?)</t>"#).expect("text run regex"));
static CALC_PR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<calcPr\b([^>]*?)(/?)>"#).expect("calcPr regex"));
static FULL_CALC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s*fullCalcOnLoad="[^"]*""#).expect("fullCalcOnLoad regex"));
static CALC_CHAIN_REL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<Relationship\b[^>]*calcChain[^>]*/>"#).expect("calcChain rel regex")
});
static CALC_CHAIN_CT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<Override\b[^>]*calcChain[^>]*/>"#).expect("calcChain content type regex")
});

pub const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const CALC_CHAIN: &str = "xl/calcChain.xml";
const CONTENT_TYPES: &str = "[Content_Types].xml";

/// An Office Open XML archive (xlsx or docx) held in memory as an ordered
/// list of parts. Spreadsheet-specific helpers live alongside the generic ones.
pub struct Package {
    parts: Vec<(String, Vec<u8>)>,
}

/// A worksheet as listed in the workbook: its display name and zip part.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRef {
    pub name: String,
    pub part: String,
}

impl Package {
    pub fn from_parts(parts: Vec<(String, Vec<u8>)>) -> Self {
        Self { parts }
    }

    pub fn open(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().replace('\\', "/");
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            parts.push((name, data));
        }
        Ok(Self { parts })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    pub fn text(&self, name: &str) -> Result<String> {
        let data = self
            .get(name)
            .ok_or_else(|| RimborsoError::TemplateShape(format!("missing part {name}")))?;
        String::from_utf8(data.to_vec())
            .map_err(|_| RimborsoError::TemplateShape(format!("part {name} is not UTF-8")))
    }

    pub fn set(&mut self, name: &str, data: Vec<u8>) {
        match self.parts.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = data,
            None => self.parts.push((name.to_string(), data)),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|(n, _)| n != name);
        self.parts.len() != before
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let opts =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in &self.parts {
            writer.start_file(name.as_str(), opts)?;
            writer.write_all(data)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Worksheets in workbook order, resolved to their part paths.
    pub fn sheets(&self) -> Result<Vec<SheetRef>> {
        let workbook = self.text(WORKBOOK)?;
        let rels = self.text(WORKBOOK_RELS)?;

        let mut sheets = Vec::new();
        for tag in SHEET_RE.find_iter(&workbook) {
            let tag = tag.as_str();
            let (Some(name), Some(rid)) = (attr(tag, "name"), attr(tag, "r:id")) else {
                continue;
            };
            let target = REL_RE
                .find_iter(&rels)
                .map(|m| m.as_str())
                .find(|rel| attr(rel, "Id").as_deref() == Some(rid.as_str()))
                .and_then(|rel| attr(rel, "Target"))
                .ok_or_else(|| {
                    RimborsoError::TemplateShape(format!("sheet '{name}' has no relationship"))
                })?;
            let part = match target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("xl/{target}"),
            };
            sheets.push(SheetRef {
                name: unescape(&name),
                part,
            });
        }
        Ok(sheets)
    }

    /// Shared string table, each entry flattened to its plain text.
    pub fn shared_strings(&self) -> Result<Vec<String>> {
        if self.get(SHARED_STRINGS).is_none() {
            return Ok(Vec::new());
        }
        let xml = self.text(SHARED_STRINGS)?;
        Ok(SI_RE
            .captures_iter(&xml)
            .map(|si| si.get(1).map_or(String::new(), |m| runs_text(m.as_str())))
            .collect())
    }

    /// Ask the spreadsheet application to recalculate on open, and drop the
    /// calculation chain since relocated formulas invalidate it.
    pub fn force_full_calc(&mut self) -> Result<()> {
        let workbook = self.text(WORKBOOK)?;
        let patched = if let Some(caps) = CALC_PR_RE.captures(&workbook) {
            let attrs = FULL_CALC_RE.replace_all(caps.get(1).map_or("", |m| m.as_str()), "");
            let close = caps.get(2).map_or("", |m| m.as_str());
            let tag = format!(r#"<calcPr{attrs} fullCalcOnLoad="1"{close}>"#);
            CALC_PR_RE.replace(&workbook, NoExpand(&tag)).into_owned()
        } else {
            let anchor = if workbook.contains("</definedNames>") {
                "</definedNames>"
            } else {
                "</sheets>"
            };
            workbook.replacen(anchor, &format!(r#"{anchor}<calcPr fullCalcOnLoad="1"/>"#), 1)
        };
        self.set(WORKBOOK, patched.into_bytes());

        if self.remove(CALC_CHAIN) {
            let rels = self.text(WORKBOOK_RELS)?;
            self.set(
                WORKBOOK_RELS,
                CALC_CHAIN_REL_RE.replace_all(&rels, "").into_owned().into_bytes(),
            );
            if self.get(CONTENT_TYPES).is_some() {
                let types = self.text(CONTENT_TYPES)?;
                self.set(
                    CONTENT_TYPES,
                    CALC_CHAIN_CT_RE.replace_all(&types, "").into_owned().into_bytes(),
                );
            }
            tracing::debug!("dropped stale calculation chain");
        }
        Ok(())
    }
}

/// Value of `name="..."` inside a single start tag.
pub fn attr(tag: &str, name: &str) -> Option<String> {
    let needle = format!(" {name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let end = tag[start..].find('"')? + start;
    Some(tag[start..end].to_string())
}

/// Concatenated, unescaped text of every `<t>` run in a fragment.
pub fn runs_text(fragment: &str) -> String {
    T_RE.captures_iter(fragment)
        .filter_map(|c| c.get(1))
        .map(|m| unescape(m.as_str()))
        .collect()
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
