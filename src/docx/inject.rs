//! Clause injection over a parsed `word/document.xml`.
//!
//! The placeholder paragraph is found in document order (top-level paragraphs
//! first, then table cells including nested tables). New clauses are numbered
//! after the highest "Cláusula adicional N" already present anywhere in those
//! paragraphs, and inherit the font family and size of the paragraph's first
//! run. Runs are read through hyperlinks, tracked insertions, smart tags and
//! content controls as well as directly under the paragraph.
use super::xml::{Element, Node, XmlDocument};
use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::OnceLock;

pub const PLACEHOLDER: &str = "{{CLAUSULAS_EXTRAS}}";
pub const CLAUSE_LABEL: &str = "Cláusula adicional";

/// Line breaks after every clause but the last.
const BREAKS_BETWEEN_CLAUSES: usize = 2;

/// Paragraph-level elements whose runs are part of the visible text.
const RUN_CONTAINERS: &[&str] = &[
    "w:hyperlink",
    "w:ins",
    "w:moveTo",
    "w:smartTag",
    "w:customXml",
    "w:fldSimple",
    "w:sdt",
    "w:sdtContent",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionOutcome {
    Injected {
        first_number: u32,
        clauses: u32,
        /// The placeholder spanned several runs and the paragraph's runs were
        /// replaced by a single anchor run.
        rebuilt_paragraph: bool,
    },
    PlaceholderMissing,
}

impl InjectionOutcome {
    pub fn placeholder_found(&self) -> bool {
        matches!(self, InjectionOutcome::Injected { .. })
    }

    pub fn clauses_applied(&self) -> u32 {
        match self {
            InjectionOutcome::Injected { clauses, .. } => *clauses,
            InjectionOutcome::PlaceholderMissing => 0,
        }
    }
}

fn clause_number_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"(?i){CLAUSE_LABEL}\s+(\d+)")).expect("clause number regex")
    })
}

fn clause_prefix_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"(?i)^\s*{CLAUSE_LABEL}\s+\d+\s*:\s*")).expect("clause prefix regex")
    })
}

/// Font properties copied onto injected runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RunFont {
    family: Option<String>,
    half_points: Option<u32>,
}

fn run_font(run: &Element) -> RunFont {
    let Some(props) = run.find_child("w:rPr") else {
        return RunFont::default();
    };
    let family = props
        .find_child("w:rFonts")
        .and_then(|fonts| fonts.attribute("w:ascii").or_else(|| fonts.attribute("w:hAnsi")));
    let half_points = props
        .find_child("w:sz")
        .and_then(|size| size.attribute("w:val"))
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0);
    RunFont {
        family,
        half_points,
    }
}

fn build_run(font: &RunFont, bold: Option<bool>, text: &str, breaks: usize) -> Element {
    let mut props = Element::new("w:rPr");
    if let Some(family) = &font.family {
        props = props.with_child(
            Element::new("w:rFonts")
                .with_attribute("w:ascii", family)
                .with_attribute("w:hAnsi", family)
                .with_attribute("w:cs", family),
        );
    }
    match bold {
        Some(true) => props = props.with_child(Element::new("w:b")),
        Some(false) => props = props.with_child(Element::new("w:b").with_attribute("w:val", "0")),
        None => {}
    }
    if let Some(size) = font.half_points {
        let size = size.to_string();
        props = props
            .with_child(Element::new("w:sz").with_attribute("w:val", &size))
            .with_child(Element::new("w:szCs").with_attribute("w:val", &size));
    }

    let mut run = Element::new("w:r");
    if !props.children.is_empty() {
        run = run.with_child(props);
    }
    run = run.with_child(
        Element::new("w:t")
            .with_attribute("xml:space", "preserve")
            .with_text(text),
    );
    for _ in 0..breaks {
        run = run.with_child(Element::new("w:br"));
    }
    run
}

fn run_text(run: &Element) -> String {
    let mut text = String::new();
    for child in run.child_elements() {
        match child.name.as_str() {
            "w:t" => text.push_str(&child.text()),
            "w:tab" => text.push('\t'),
            "w:br" | "w:cr" => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn is_run_container(element: &Element) -> bool {
    RUN_CONTAINERS.iter().any(|name| element.is(name))
}

fn collect_runs(parent: &Element, prefix: &[usize], out: &mut Vec<Vec<usize>>) {
    for (idx, node) in parent.children.iter().enumerate() {
        let Node::Element(element) = node else {
            continue;
        };
        if element.is("w:r") || is_run_container(element) {
            let mut path = prefix.to_vec();
            path.push(idx);
            if element.is("w:r") {
                out.push(path);
            } else {
                collect_runs(element, &path, out);
            }
        }
    }
}

/// Child-index paths (relative to the paragraph) of its runs in document
/// order.
fn run_paths(paragraph: &Element) -> Vec<Vec<usize>> {
    let mut paths = Vec::new();
    collect_runs(paragraph, &[], &mut paths);
    paths
}

fn paragraph_runs(paragraph: &Element) -> impl Iterator<Item = &Element> + '_ {
    run_paths(paragraph)
        .into_iter()
        .filter_map(move |path| element_at_path(paragraph, &path))
}

fn paragraph_text(paragraph: &Element) -> String {
    paragraph_runs(paragraph).map(run_text).collect()
}

fn indexed_children<'a>(
    parent: &'a Element,
    name: &'a str,
) -> impl Iterator<Item = (usize, &'a Element)> + 'a {
    parent
        .children
        .iter()
        .enumerate()
        .filter_map(move |(idx, node)| match node {
            Node::Element(element) if element.is(name) => Some((idx, element)),
            _ => None,
        })
}

/// Child-index paths (relative to `w:body`) of every searchable paragraph.
fn paragraph_paths(body: &Element) -> Vec<Vec<usize>> {
    let mut paths: Vec<Vec<usize>> = indexed_children(body, "w:p")
        .map(|(idx, _)| vec![idx])
        .collect();
    for (idx, table) in indexed_children(body, "w:tbl") {
        collect_table(table, vec![idx], &mut paths);
    }
    paths
}

fn collect_table(table: &Element, path: Vec<usize>, out: &mut Vec<Vec<usize>>) {
    for (row_idx, row) in indexed_children(table, "w:tr") {
        for (cell_idx, cell) in indexed_children(row, "w:tc") {
            for (idx, node) in cell.children.iter().enumerate() {
                let Node::Element(element) = node else {
                    continue;
                };
                let mut child_path = path.clone();
                child_path.extend([row_idx, cell_idx, idx]);
                if element.is("w:p") {
                    out.push(child_path);
                } else if element.is("w:tbl") {
                    collect_table(element, child_path, out);
                }
            }
        }
    }
}

fn element_at_path<'a>(mut current: &'a Element, path: &[usize]) -> Option<&'a Element> {
    for &idx in path {
        current = current.element_at(idx)?;
    }
    Some(current)
}

fn element_at_path_mut<'a>(
    mut current: &'a mut Element,
    path: &[usize],
) -> Option<&'a mut Element> {
    for &idx in path {
        current = current.element_at_mut(idx)?;
    }
    Some(current)
}

fn max_clause_number(body: &Element, paths: &[Vec<usize>]) -> u32 {
    paths
        .iter()
        .filter_map(|path| element_at_path(body, path))
        .flat_map(|paragraph| {
            let text = paragraph_text(paragraph);
            clause_number_regex()
                .captures_iter(&text)
                .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .max()
        .unwrap_or(0)
}

/// Remove the placeholder and return the index (in `paragraph.children`) of
/// the run, or run container, after which clauses are inserted.
fn prepare_anchor(paragraph: &mut Element, font: &RunFont) -> (usize, bool) {
    let view: &Element = paragraph;
    let hit = run_paths(view).into_iter().find_map(|mut path| {
        let run = element_at_path(view, &path)?;
        let text_idx = run.children.iter().position(|child| match child {
            Node::Element(t) => t.is("w:t") && t.text().contains(PLACEHOLDER),
            _ => false,
        })?;
        path.push(text_idx);
        Some(path)
    });

    if let Some(path) = hit {
        if let Some(text) = element_at_path_mut(paragraph, &path) {
            let remaining = text.text().replace(PLACEHOLDER, "");
            text.set_text(&remaining);
            text.set_attribute("xml:space", "preserve");
        }
        return (path[0], false);
    }

    // Split across runs: drop every run and start over from one empty run.
    paragraph.children.retain(|node| {
        !matches!(node, Node::Element(element) if element.is("w:r") || is_run_container(element))
    });
    paragraph
        .children
        .push(Node::Element(build_run(font, None, "", 0)));
    (paragraph.children.len() - 1, true)
}

/// Inject `clauses` at the placeholder of `document`. Blank clauses are
/// skipped; a leading "Cláusula adicional N:" in a clause is replaced by the
/// computed label.
pub fn inject_clauses<S: AsRef<str>>(
    document: &mut XmlDocument,
    clauses: &[S],
) -> Result<InjectionOutcome> {
    let root = document
        .root_mut()
        .filter(|root| root.is("w:document"))
        .ok_or_else(|| anyhow!("main document part has no w:document root"))?;
    let body = root
        .child_elements_mut()
        .find(|child| child.is("w:body"))
        .ok_or_else(|| anyhow!("w:document has no w:body"))?;

    let paths = paragraph_paths(body);
    let first_number = max_clause_number(body, &paths).saturating_add(1);
    let Some(path) = paths.iter().find(|path| {
        element_at_path(body, path)
            .is_some_and(|paragraph| paragraph_text(paragraph).contains(PLACEHOLDER))
    }) else {
        return Ok(InjectionOutcome::PlaceholderMissing);
    };
    let paragraph = element_at_path_mut(body, path)
        .ok_or_else(|| anyhow!("placeholder paragraph vanished during edit"))?;

    let font = paragraph_runs(paragraph)
        .next()
        .map(run_font)
        .unwrap_or_default();
    let (anchor, rebuilt_paragraph) = prepare_anchor(paragraph, &font);

    let live: Vec<&str> = clauses
        .iter()
        .map(|clause| clause.as_ref().trim())
        .filter(|clause| !clause.is_empty())
        .collect();
    let mut number = first_number;
    let mut at = anchor + 1;
    for (idx, clause) in live.iter().enumerate() {
        let breaks = if idx + 1 == live.len() {
            0
        } else {
            BREAKS_BETWEEN_CLAUSES
        };
        let stripped = clause_prefix_regex().replace(clause, "");
        let title = format!("{CLAUSE_LABEL} {number}: ");
        paragraph
            .children
            .insert(at, Node::Element(build_run(&font, Some(true), &title, 0)));
        paragraph.children.insert(
            at + 1,
            Node::Element(build_run(&font, Some(false), stripped.trim(), breaks)),
        );
        at += 2;
        number = number.saturating_add(1);
    }

    Ok(InjectionOutcome::Injected {
        first_number,
        clauses: u32::try_from(live.len()).unwrap_or(u32::MAX),
        rebuilt_paragraph,
    })
}

#[cfg(test)]
#[path = "inject_tests.rs"]
mod tests;
