//! Java-style XML dialect
//!
//! Vocabulary `report/group/package/file/class/method/line`, as emitted by
//! JVM coverage exporters. Line elements carry `number`, `hits`, and the
//! optional `branch` / `condition-coverage="NN% (num/denom)"` pair.

use regex::Regex;

use super::{parse_xml, ReportAdapter, TagRule, XmlDialect};
use crate::error::Result;
use crate::model::CoverageElement;
use crate::tree::CoverageTree;

const DIALECT: XmlDialect = XmlDialect {
    format: "java-xml",
    root_tag: b"report",
    rules: &[
        TagRule { tag: b"report", element: CoverageElement::Report },
        TagRule { tag: b"group", element: CoverageElement::Group },
        TagRule { tag: b"package", element: CoverageElement::Package },
        TagRule { tag: b"file", element: CoverageElement::File },
        TagRule { tag: b"class", element: CoverageElement::Class },
        TagRule { tag: b"method", element: CoverageElement::Method },
    ],
    line_tag: b"line",
    label_prefixes_name: false,
};

pub struct JavaXmlAdapter {
    condition_re: Regex,
}

impl JavaXmlAdapter {
    pub fn new() -> Self {
        JavaXmlAdapter {
            condition_re: Regex::new(r"\d+\s*%\s*\((\d+)/(\d+)\)")
                .expect("condition-coverage pattern"),
        }
    }
}

impl Default for JavaXmlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportAdapter for JavaXmlAdapter {
    fn id(&self) -> &'static str {
        "java-xml"
    }

    fn detect(&self, bytes: &[u8]) -> bool {
        super::xml_root_name(bytes).as_deref() == Some(DIALECT.root_tag)
    }

    fn parse(&self, bytes: &[u8], label: &str) -> Result<CoverageTree> {
        parse_xml(&DIALECT, bytes, label, Some(&self.condition_re))
    }
}
