//! Structure Extractor
//!
//! Classifies the top-level layout regions of a rendered page so editing
//! UIs can offer per-section affordances.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

/// Elements treated as layout regions, in document order
pub const REGION_TAGS: [&str; 4] = ["section", "header", "footer", "main"];

static REGIONS: Lazy<Selector> = Lazy::new(|| Selector::parse("section, header, footer, main").expect("valid selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid selector"));
static HEADING: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2").expect("valid selector"));
static GRID_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)feature|benefit").expect("valid pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Hero,
    Content,
    Grid,
    Footer,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Hero => "hero",
            SectionKind::Content => "content",
            SectionKind::Grid => "grid",
            SectionKind::Footer => "footer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SectionKind,
    pub heading: String,
}

pub fn section_id(index: usize) -> String {
    format!("section_{}", index)
}

/// Walk the layout regions of `html` and classify each one.
pub fn extract(html: &str) -> Vec<StructureNode> {
    let document = Html::parse_document(html);

    let structure: Vec<StructureNode> = document
        .select(&REGIONS)
        .enumerate()
        .map(|(index, element)| {
            let kind = classify(&element);
            let heading = element
                .select(&HEADING)
                .next()
                .map(|h| h.text().collect::<String>().trim().to_string())
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| kind.as_str().to_string());

            StructureNode {
                id: section_id(index),
                kind,
                heading,
            }
        })
        .collect();

    if structure.is_empty() {
        return vec![StructureNode {
            id: section_id(0),
            kind: SectionKind::Hero,
            heading: "Hero".to_string(),
        }];
    }
    structure
}

// Later rules override earlier ones; a footer is always a footer.
fn classify(element: &ElementRef) -> SectionKind {
    let mut kind = SectionKind::Content;
    if element.select(&H1).next().is_some() {
        kind = SectionKind::Hero;
    }
    if GRID_TEXT.is_match(&element.text().collect::<String>()) {
        kind = SectionKind::Grid;
    }
    if element.value().name() == "footer" {
        kind = SectionKind::Footer;
    }
    kind
}

fn score(node: &StructureNode) -> f32 {
    let heading = node.heading.trim();
    let mut score = 0.0;
    if !heading.is_empty() {
        score += 10.0;
    }
    score += heading.chars().count().min(30) as f32 / 3.0;
    if !node.id.trim().is_empty() {
        score += 2.0;
    }
    score
}

/// Best-scoring node per kind (hero, content, grid, footer). Falls back to
/// the first four nodes when none of the kinds is present.
pub fn primary_sections(structure: &[StructureNode]) -> Vec<StructureNode> {
    let kinds = [SectionKind::Hero, SectionKind::Content, SectionKind::Grid, SectionKind::Footer];

    let picked: Vec<StructureNode> = kinds
        .iter()
        .filter_map(|kind| {
            let mut best: Option<&StructureNode> = None;
            for node in structure.iter().filter(|n| n.kind == *kind) {
                if best.map_or(true, |b| score(node) > score(b)) {
                    best = Some(node);
                }
            }
            best.cloned()
        })
        .collect();

    if picked.is_empty() {
        structure.iter().take(4).cloned().collect()
    } else {
        picked
    }
}
