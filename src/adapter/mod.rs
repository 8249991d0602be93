//! Report format adapters
//!
//! Each dialect maps its own tag/key vocabulary onto the canonical tree
//! through one shared discipline: a stack-based depth-first walk where every
//! recognized element becomes the parent context of its children. Adapters
//! are selected by a cheap signature check (root element local name or
//! top-level key) iterated in a fixed priority order.

mod java;
mod json;
mod llvm;

pub use java::JavaXmlAdapter;
pub use json::JsonReportAdapter;
pub use llvm::LlvmXmlAdapter;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::error::{CoverageError, Result};
use crate::model::{CoverageElement, CoverageMetric};
use crate::ratio::Ratio;
use crate::tree::{CoverageTree, NodeId};

/// A parser for one report dialect.
pub trait ReportAdapter: Send + Sync {
    fn id(&self) -> &'static str;

    /// Signature check: inspects only the document's root element local name
    /// (or top-level key). Never fails; undecodable input is "no match".
    fn detect(&self, bytes: &[u8]) -> bool;

    /// Full parse into a canonical tree. `label` is the caller-supplied
    /// report name used when the document itself carries none (or, for
    /// LLVM-style reports, combined with the document name).
    fn parse(&self, bytes: &[u8], label: &str) -> Result<CoverageTree>;
}

/// Statically constructed, ordered adapter registry.
///
/// The default order tries the Java-style XML dialect first, then the
/// LLVM-style one, then JSON.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn ReportAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        AdapterRegistry {
            adapters: vec![
                Box::new(JavaXmlAdapter::new()),
                Box::new(LlvmXmlAdapter::new()),
                Box::new(JsonReportAdapter::new()),
            ],
        }
    }
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        AdapterRegistry { adapters: Vec::new() }
    }

    pub fn register(&mut self, adapter: Box<dyn ReportAdapter>) {
        self.adapters.push(adapter);
    }

    /// First adapter whose signature check accepts the input.
    pub fn detect(&self, bytes: &[u8]) -> Option<&dyn ReportAdapter> {
        for adapter in &self.adapters {
            if adapter.detect(bytes) {
                tracing::debug!(adapter = adapter.id(), "report format detected");
                return Some(adapter.as_ref());
            }
        }
        None
    }

    /// Auto-detect and parse one report.
    pub fn parse_auto(&self, bytes: &[u8], label: &str) -> Result<CoverageTree> {
        let adapter = self.detect(bytes).ok_or(CoverageError::UnknownFormat)?;
        adapter.parse(bytes, label)
    }

    pub fn adapter_ids(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.id()).collect()
    }
}

/// One entry of a dialect's tag-to-element mapping table.
pub(crate) struct TagRule {
    pub tag: &'static [u8],
    pub element: CoverageElement,
}

/// Declarative description of an XML dialect.
pub(crate) struct XmlDialect {
    /// Format name used in parse errors.
    pub format: &'static str,
    pub root_tag: &'static [u8],
    pub rules: &'static [TagRule],
    pub line_tag: &'static [u8],
    /// Combine the caller-supplied label with the root's `name` attribute.
    pub label_prefixes_name: bool,
}

impl XmlDialect {
    fn rule_for(&self, tag: &[u8]) -> Option<&TagRule> {
        self.rules.iter().find(|r| r.tag == tag)
    }

    fn root_display_name(&self, label: &str, name_attr: &str) -> String {
        if self.label_prefixes_name && !name_attr.is_empty() {
            format!("{}: {}", label, name_attr)
        } else if !name_attr.is_empty() {
            name_attr.to_string()
        } else {
            label.to_string()
        }
    }
}

/// Root element local name of an XML document, or `None` when the input is
/// not parsable far enough to tell. Used by signature checks only.
pub(crate) fn xml_root_name(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                return Some(e.name().as_ref().to_vec());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

pub(crate) fn attr_string(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

pub(crate) fn attr_u32(e: &BytesStart, key: &[u8]) -> Option<u32> {
    attr_string(e, key)?.trim().parse().ok()
}

struct Frame {
    id: NodeId,
    element: CoverageElement,
    tag: Vec<u8>,
    lines_seen: bool,
    hit_seen: bool,
}

/// Shared depth-first XML walk.
///
/// Recognized elements push a frame and become the parent context; line
/// elements paint the nearest enclosing FILE node. Closing a method,
/// function, class, or file element contributes the matching unit metric so
/// ancestors accumulate method/class/file counts. Malformed `number`/`hits`
/// attributes skip that single line; structurally broken markup fails the
/// whole report.
pub(crate) fn parse_xml(
    dialect: &XmlDialect,
    bytes: &[u8],
    label: &str,
    condition_re: Option<&Regex>,
) -> Result<CoverageTree> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);

    let mut tree: Option<CoverageTree> = None;
    let mut frames: Vec<Frame> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == dialect.line_tag {
                    paint_line(dialect, e, tree.as_mut(), &mut frames, condition_re);
                } else if let Some(rule) = dialect.rule_for(e.name().as_ref()) {
                    let frame = open_element(dialect, e, rule, &mut tree, &frames, label)?;
                    frames.push(frame);
                }
            }
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == dialect.line_tag {
                    paint_line(dialect, e, tree.as_mut(), &mut frames, condition_re);
                } else if let Some(rule) = dialect.rule_for(e.name().as_ref()) {
                    // Self-closing structural element: created, no children.
                    open_element(dialect, e, rule, &mut tree, &frames, label)?;
                }
            }
            Ok(Event::End(ref e)) => {
                if frames.last().map(|f| f.tag.as_slice()) == Some(e.name().as_ref()) {
                    let frame = frames.pop().unwrap();
                    if let Some(tree) = tree.as_mut() {
                        close_element(tree, &frame);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(CoverageError::parse(dialect.format, err)),
            _ => {}
        }
        buf.clear();
    }

    if !frames.is_empty() {
        return Err(CoverageError::parse(dialect.format, "unexpected end of document"));
    }
    tree.ok_or_else(|| CoverageError::parse(dialect.format, "no recognized root element"))
}

fn open_element(
    dialect: &XmlDialect,
    e: &BytesStart,
    rule: &TagRule,
    tree: &mut Option<CoverageTree>,
    frames: &[Frame],
    label: &str,
) -> Result<Frame> {
    let name = attr_string(e, b"name").unwrap_or_default();
    let (id, element) = match frames.last() {
        None => {
            if e.name().as_ref() != dialect.root_tag {
                return Err(CoverageError::parse(
                    dialect.format,
                    format!(
                        "unexpected root element <{}>",
                        String::from_utf8_lossy(e.name().as_ref())
                    ),
                ));
            }
            let display = dialect.root_display_name(label, &name);
            let created = tree.insert(CoverageTree::new(rule.element, &display));
            (created.root(), rule.element)
        }
        Some(parent) => {
            let tree = tree.as_mut().expect("parent frame implies tree");
            let id = tree.add_child(parent.id, rule.element, &name);
            if rule.element.is_file() {
                let path = attr_string(e, b"path").unwrap_or_else(|| name.clone());
                tree.set_relative_path(id, &path)?;
            }
            (id, rule.element)
        }
    };
    Ok(Frame {
        id,
        element,
        tag: e.name().as_ref().to_vec(),
        lines_seen: false,
        hit_seen: false,
    })
}

fn paint_line(
    dialect: &XmlDialect,
    e: &BytesStart,
    tree: Option<&mut CoverageTree>,
    frames: &mut [Frame],
    condition_re: Option<&Regex>,
) {
    let Some(tree) = tree else { return };
    let Some(file) = frames.iter().rev().find(|f| f.element.is_file()).map(|f| f.id) else {
        tracing::warn!(format = dialect.format, "line element outside any file, skipped");
        return;
    };

    // A malformed number or hits value skips this line only.
    let Some(number) = attr_u32(e, b"number") else {
        tracing::warn!(format = dialect.format, "line with invalid 'number', skipped");
        return;
    };
    let Some(hits) = attr_u32(e, b"hits") else {
        tracing::warn!(format = dialect.format, line = number, "line with invalid 'hits', skipped");
        return;
    };

    let (branch_covered, branch_total) = match (condition_re, attr_string(e, b"condition-coverage")) {
        (Some(re), Some(text)) => parse_condition_coverage(re, &text).unwrap_or((0, 0)),
        _ => (0, 0),
    };

    tree.paint(file, number, hits, branch_covered, branch_total);

    // Flag every frame from the innermost element up to the file node so
    // method/class/file unit metrics can be derived on close.
    for frame in frames.iter_mut().rev() {
        frame.lines_seen = true;
        frame.hit_seen |= hits > 0;
        if frame.element.is_file() {
            break;
        }
    }
}

/// `"NN% (num/denom)"`. Anything that does not match is ignored.
fn parse_condition_coverage(re: &Regex, text: &str) -> Option<(u32, u32)> {
    let caps = re.captures(text)?;
    let covered = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2)?.as_str().parse().ok()?;
    Some((covered, total))
}

fn close_element(tree: &mut CoverageTree, frame: &Frame) {
    if !frame.lines_seen {
        return;
    }
    let metric = match frame.element {
        CoverageElement::Method | CoverageElement::Function => CoverageMetric::Method,
        CoverageElement::Class => CoverageMetric::Class,
        CoverageElement::File => CoverageMetric::File,
        _ => return,
    };
    tree.update_metric(frame.id, metric, Ratio::unit(frame.hit_seen));
}
