//! LLVM-style XML dialect
//!
//! Vocabulary `data/directory/file/function/line`. The report display name
//! combines the document's `name` attribute with the caller-supplied label,
//! since one build commonly carries several of these exports.

use super::{parse_xml, ReportAdapter, TagRule, XmlDialect};
use crate::error::Result;
use crate::model::CoverageElement;
use crate::tree::CoverageTree;

const DIALECT: XmlDialect = XmlDialect {
    format: "llvm-xml",
    root_tag: b"data",
    rules: &[
        TagRule { tag: b"data", element: CoverageElement::Data },
        TagRule { tag: b"directory", element: CoverageElement::Directory },
        TagRule { tag: b"file", element: CoverageElement::File },
        TagRule { tag: b"function", element: CoverageElement::Function },
    ],
    line_tag: b"line",
    label_prefixes_name: true,
};

pub struct LlvmXmlAdapter;

impl LlvmXmlAdapter {
    pub fn new() -> Self {
        LlvmXmlAdapter
    }
}

impl Default for LlvmXmlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportAdapter for LlvmXmlAdapter {
    fn id(&self) -> &'static str {
        "llvm-xml"
    }

    fn detect(&self, bytes: &[u8]) -> bool {
        super::xml_root_name(bytes).as_deref() == Some(DIALECT.root_tag)
    }

    fn parse(&self, bytes: &[u8], label: &str) -> Result<CoverageTree> {
        parse_xml(&DIALECT, bytes, label, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CoverageMetric;
    use crate::ratio::Ratio;

    const SAMPLE: &str = r#"<data name="llvm-cov export">
    <directory name="src">
        <file name="lib.rs" path="src/lib.rs">
            <function name="parse">
                <line number="10" hits="4"/>
                <line number="11" hits="0"/>
            </function>
            <line number="10" hits="4"/>
            <line number="11" hits="0"/>
            <line number="12" hits="1"/>
        </file>
    </directory>
</data>"#;

    #[test]
    fn test_detect() {
        let adapter = LlvmXmlAdapter::new();
        assert!(adapter.detect(SAMPLE.as_bytes()));
        assert!(!adapter.detect(b"<report/>"));
    }

    #[test]
    fn test_parse_with_labeled_name() {
        let tree = LlvmXmlAdapter::new().parse(SAMPLE.as_bytes(), "unit-tests").unwrap();
        assert_eq!(tree.node(tree.root()).name(), "unit-tests: llvm-cov export");
        assert_eq!(tree.node(tree.root()).element(), CoverageElement::Data);

        assert_eq!(
            tree.get_coverage(tree.root(), CoverageMetric::Line),
            Some(Ratio::new(2, 3))
        );
        // The function covered one of one.
        assert_eq!(
            tree.get_coverage(tree.root(), CoverageMetric::Method),
            Some(Ratio::new(1, 1))
        );

        let file = tree.find_file("src/lib.rs").unwrap();
        let dir = tree.node(file).parent().unwrap();
        assert_eq!(tree.node(dir).element(), CoverageElement::Directory);
    }

    #[test]
    fn test_function_without_lines_contributes_nothing() {
        let xml = r#"<data name="n">
    <directory name="d">
        <file name="f" path="f"><function name="dead"/></file>
    </directory>
</data>"#;
        let tree = LlvmXmlAdapter::new().parse(xml.as_bytes(), "l").unwrap();
        assert_eq!(tree.get_coverage(tree.root(), CoverageMetric::Method), None);
        assert_eq!(tree.get_coverage(tree.root(), CoverageMetric::Line), None);
    }
}
