//! XML dialect parser – converts a report document into a simple DOM tree.
//!
//! The dialect is a controlled XML vocabulary:
//! - Document level: style, table, p, page_break, spacer
//! - Table level: tr, keep, header, footer, no_headers, no_footers
//! - Row level: td plus the directive tags variables, currency_variables,
//!   variable_addition
//! - Cell level: table (nested), svg, png, obj, currency, currency_qty, or
//!   arbitrary rich-text markup
//!
//! Malformed markup (mismatched or unclosed tags) is a fatal
//! [`Error::Parse`]; unknown elements are kept and degrade to literal text
//! extraction downstream.

use std::collections::HashMap;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of a recognised element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Style,
    Table,
    P,
    PageBreak,
    Spacer,
    Tr,
    Td,
    Keep,
    Header,
    Footer,
    NoHeaders,
    NoFooters,
    Variables,
    CurrencyVariables,
    VariableAddition,
    Currency,
    CurrencyQty,
    Svg,
    Png,
    Obj,
    Br,
    /// Catch-all for rich-text inline markup and unrecognised tags.
    Other(String),
}

impl Tag {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "style" => Tag::Style,
            "table" => Tag::Table,
            "p" => Tag::P,
            "page_break" => Tag::PageBreak,
            "spacer" => Tag::Spacer,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "keep" => Tag::Keep,
            "header" => Tag::Header,
            "footer" => Tag::Footer,
            "no_headers" => Tag::NoHeaders,
            "no_footers" => Tag::NoFooters,
            "variables" => Tag::Variables,
            "currency_variables" => Tag::CurrencyVariables,
            "variable_addition" => Tag::VariableAddition,
            "br" => Tag::Br,
            _ => {
                // Cell content tags are classified by suffix so namespaced
                // spellings (ns:svg) still resolve.
                let lower = s.to_ascii_lowercase();
                if lower.ends_with("currency_qty") {
                    Tag::CurrencyQty
                } else if lower.ends_with("currency") {
                    Tag::Currency
                } else if lower.ends_with("svg") {
                    Tag::Svg
                } else if lower.ends_with("png") {
                    Tag::Png
                } else if lower.ends_with("obj") {
                    Tag::Obj
                } else {
                    Tag::Other(s.to_string())
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::Style => "style",
            Tag::Table => "table",
            Tag::P => "p",
            Tag::PageBreak => "page_break",
            Tag::Spacer => "spacer",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Keep => "keep",
            Tag::Header => "header",
            Tag::Footer => "footer",
            Tag::NoHeaders => "no_headers",
            Tag::NoFooters => "no_footers",
            Tag::Variables => "variables",
            Tag::CurrencyVariables => "currency_variables",
            Tag::VariableAddition => "variable_addition",
            Tag::Currency => "currency",
            Tag::CurrencyQty => "currency_qty",
            Tag::Svg => "svg",
            Tag::Png => "png",
            Tag::Obj => "obj",
            Tag::Br => "br",
            Tag::Other(s) => s,
        }
    }

    /// Row-level directive tags that mutate the variable maps.
    pub fn is_directive(&self) -> bool {
        matches!(
            self,
            Tag::Variables | Tag::CurrencyVariables | Tag::VariableAddition
        )
    }
}

/// A node in the DOM tree.
#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    /// Attribute parsed as f32; absent attribute yields `default`, a
    /// malformed value is a fatal [`Error::Attribute`].
    pub fn attr_f32(&self, name: &str, default: f32) -> Result<f32> {
        match self.attributes.get(name) {
            None => Ok(default),
            Some(v) => v.trim().parse::<f32>().map_err(|_| Error::Attribute {
                name: name.to_string(),
                value: v.clone(),
            }),
        }
    }

    /// Attribute parsed as usize; same error contract as [`Self::attr_f32`].
    pub fn attr_usize(&self, name: &str, default: usize) -> Result<usize> {
        match self.attributes.get(name) {
            None => Ok(default),
            Some(v) => v.trim().parse::<usize>().map_err(|_| Error::Attribute {
                name: name.to_string(),
                value: v.clone(),
            }),
        }
    }

    /// Child elements (skipping text nodes).
    pub fn child_elements(&self) -> impl Iterator<Item = &ElementNode> {
        self.children.iter().filter_map(|n| match n {
            DomNode::Element(e) => Some(e),
            DomNode::Text(_) => None,
        })
    }

    /// First non-directive child element, used for cell classification.
    pub fn first_content_child(&self) -> Option<&ElementNode> {
        self.child_elements().find(|e| !e.tag.is_directive())
    }

    /// Concatenated text content of the element and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Re-serialise this element (tag, attributes, children) as markup.
    /// Attribute order is sorted for determinism.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        write_markup(self, &mut out);
        out
    }
}

fn collect_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(t) => out.push_str(t),
            DomNode::Element(e) => collect_text(&e.children, out),
        }
    }
}

fn write_markup(elem: &ElementNode, out: &mut String) {
    out.push('<');
    out.push_str(elem.tag.name());
    let mut attrs: Vec<(&String, &String)> = elem.attributes.iter().collect();
    attrs.sort();
    for (k, v) in attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(&encode_entities(v));
        out.push('"');
    }
    if elem.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &elem.children {
        match child {
            DomNode::Text(t) => out.push_str(&encode_entities(t)),
            DomNode::Element(e) => write_markup(e, out),
        }
    }
    out.push_str("</");
    out.push_str(elem.tag.name());
    out.push('>');
}

// ---------------------------------------------------------------------------
// Parser – recursive descent over the XML dialect
// ---------------------------------------------------------------------------

/// Parse a document and return its root element.
pub fn parse_document(xml: &str) -> Result<ElementNode> {
    let mut parser = Parser::new(xml);
    let nodes = parser.parse_nodes()?;
    if !parser.eof() {
        return Err(parser.error("trailing content after root element"));
    }
    let mut root = None;
    for node in nodes {
        if let DomNode::Element(e) = node {
            if root.is_some() {
                return Err(Error::Parse {
                    offset: 0,
                    message: "multiple root elements".to_string(),
                });
            }
            root = Some(e);
        }
    }
    root.ok_or(Error::Parse {
        offset: 0,
        message: "document has no root element".to_string(),
    })
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, message: &str) -> Error {
        Error::Parse {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn parse_nodes(&mut self) -> Result<Vec<DomNode>> {
        let mut nodes = Vec::new();
        loop {
            self.skip_inter_element_whitespace();
            if self.eof() || self.starts_with("</") {
                break;
            }
            if let Some(node) = self.parse_node()? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn parse_node(&mut self) -> Result<Option<DomNode>> {
        if self.starts_with("<!--") {
            self.skip_comment()?;
            return Ok(None);
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            // Skip doctype / processing instructions, tolerating an internal
            // subset bracketed by [ ... ].
            let mut depth = 0i32;
            while !self.eof() {
                let c = self.current_char();
                if c == '[' {
                    depth += 1;
                } else if c == ']' {
                    depth -= 1;
                } else if c == '>' && depth <= 0 {
                    self.advance(1);
                    return Ok(None);
                }
                self.advance(1);
            }
            return Err(self.error("unterminated doctype or processing instruction"));
        }
        if self.starts_with("<") {
            Ok(Some(self.parse_element()?))
        } else {
            Ok(Some(self.parse_text()))
        }
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        while !self.eof() && !self.starts_with("<") {
            self.advance(1);
        }
        let text = &self.input[start..self.pos];
        DomNode::Text(decode_entities(text))
    }

    fn parse_element(&mut self) -> Result<DomNode> {
        self.advance(1); // consume '<'
        let tag_name = self.parse_name();
        if tag_name.is_empty() {
            return Err(self.error("expected element name after '<'"));
        }
        let tag = Tag::from_str(&tag_name);
        let mut elem = ElementNode::new(tag);

        // Attributes
        loop {
            self.skip_whitespace();
            if self.eof() {
                return Err(self.error("unterminated start tag"));
            }
            if self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let (key, value) = self.parse_attribute()?;
            elem.attributes.insert(key, value);
        }

        if self.starts_with("/>") {
            self.advance(2);
            return Ok(DomNode::Element(elem));
        }
        self.advance(1); // '>'

        elem.children = self.parse_nodes()?;

        if !self.starts_with("</") {
            return Err(self.error(&format!("missing closing tag for <{tag_name}>")));
        }
        self.advance(2);
        let close_name = self.parse_name();
        if !close_name.eq_ignore_ascii_case(&tag_name) {
            return Err(self.error(&format!(
                "mismatched closing tag: expected </{tag_name}>, found </{close_name}>"
            )));
        }
        self.skip_whitespace();
        if !self.starts_with(">") {
            return Err(self.error("malformed closing tag"));
        }
        self.advance(1);

        Ok(DomNode::Element(elem))
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' {
                self.advance(1);
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> Result<(String, String)> {
        let key = self.parse_name();
        if key.is_empty() {
            return Err(self.error("expected attribute name"));
        }
        self.skip_whitespace();
        if !self.starts_with("=") {
            return Ok((key, String::new()));
        }
        self.advance(1);
        self.skip_whitespace();
        let value = self.parse_attr_value()?;
        Ok((key, value))
    }

    fn parse_attr_value(&mut self) -> Result<String> {
        for quote in ['"', '\''] {
            if self.starts_with(&quote.to_string()) {
                self.advance(1);
                let start = self.pos;
                while !self.eof() && self.current_char() != quote {
                    self.advance(1);
                }
                if self.eof() {
                    return Err(self.error("unterminated attribute value"));
                }
                let val = self.input[start..self.pos].to_string();
                self.advance(1);
                return Ok(decode_entities(&val));
            }
        }
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '>' || c == '/' {
                break;
            }
            self.advance(1);
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
    }

    /// Skip runs of pure whitespace between elements, keeping whitespace
    /// that is part of mixed text content.
    fn skip_inter_element_whitespace(&mut self) {
        let saved = self.pos;
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
        if !self.eof() && !self.starts_with("<") {
            self.pos = saved;
        }
    }

    fn skip_comment(&mut self) -> Result<()> {
        self.advance(4); // <!--
        while !self.eof() && !self.starts_with("-->") {
            self.advance(1);
        }
        if self.eof() {
            return Err(self.error("unterminated comment"));
        }
        self.advance(3);
        Ok(())
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap()
    }

    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            if let Some(c) = self.input[self.pos..].chars().next() {
                self.pos += c.len_utf8();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Named entities recognised by the dialect (the print-engine doctype set).
const ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("apos", "'"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("ldquo", "\u{201C}"),
    ("rdquo", "\u{201D}"),
    ("quot", "\""),
    ("frasl", "/"),
    ("hellip", "\u{2026}"),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("nbsp", "\u{00A0}"),
    ("not", "\u{00AC}"),
    ("iexcl", "\u{00A1}"),
    ("cent", "\u{00A2}"),
    ("pound", "\u{00A3}"),
    ("euro", "\u{20AC}"),
    ("curren", "\u{00A4}"),
    ("yen", "\u{00A5}"),
    ("brvbar", "\u{00A6}"),
    ("sect", "\u{00A7}"),
    ("uml", "\u{00A8}"),
    ("die", "\u{00A8}"),
    ("copy", "\u{00A9}"),
    ("ordf", "\u{00AA}"),
    ("laquo", "\u{00AB}"),
    ("reg", "\u{00AE}"),
    ("plusmn", "\u{00B1}"),
    ("sup2", "\u{00B2}"),
    ("sup3", "\u{00B3}"),
    ("frac14", "\u{00BC}"),
    ("frac12", "\u{00BD}"),
    ("frac34", "\u{00BE}"),
];

/// Decode named and numeric character references. Unknown references are
/// left untouched rather than failing the parse.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let semi = match rest.find(';') {
            Some(i) if i <= 12 => i,
            _ => {
                out.push('&');
                rest = &rest[1..];
                continue;
            }
        };
        let name = &rest[1..semi];
        let decoded = if let Some(num) = name.strip_prefix('#') {
            let code = if let Some(hex) = num.strip_prefix('x').or(num.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                num.parse::<u32>().ok()
            };
            code.and_then(char::from_u32).map(String::from)
        } else {
            ENTITIES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.to_string())
        };
        match decoded {
            Some(d) => out.push_str(&d),
            None => out.push_str(&rest[..semi + 1]),
        }
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    out
}

fn encode_entities(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_document() {
        let xml = r#"<document title="Test"><p>Hello</p></document>"#;
        let root = parse_document(xml).unwrap();
        assert_eq!(root.attr("title"), Some("Test"));
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn parse_table_rows() {
        let xml = "<document><table><tr><td>A</td><td>B</td></tr><tr><td>C</td><td>D</td></tr></table></document>";
        let root = parse_document(xml).unwrap();
        let table = root.child_elements().next().unwrap();
        assert_eq!(table.tag, Tag::Table);
        assert_eq!(table.child_elements().count(), 2);
    }

    #[test]
    fn mismatched_tag_is_fatal() {
        let xml = "<document><table><tr></td></tr></table></document>";
        assert!(matches!(parse_document(xml), Err(Error::Parse { .. })));
    }

    #[test]
    fn unclosed_tag_is_fatal() {
        let xml = "<document><p>text";
        assert!(parse_document(xml).is_err());
    }

    #[test]
    fn doctype_with_entities_is_skipped() {
        let xml = "<!DOCTYPE root SYSTEM \"print_engine\" [<!ENTITY x 'y'>]><document><p>ok</p></document>";
        assert!(parse_document(xml).is_ok());
    }

    #[test]
    fn entity_decoding() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(
            decode_entities("&pound;5 &ndash; &euro;7"),
            "\u{00A3}5 \u{2013} \u{20AC}7"
        );
        assert_eq!(decode_entities("&#163;"), "\u{00A3}");
        assert_eq!(decode_entities("&unknown;"), "&unknown;");
    }

    #[test]
    fn classification_by_suffix() {
        assert_eq!(Tag::from_str("ns:svg"), Tag::Svg);
        assert_eq!(Tag::from_str("currency"), Tag::Currency);
        assert_eq!(Tag::from_str("currency_qty"), Tag::CurrencyQty);
        assert_eq!(Tag::from_str("bold"), Tag::Other("bold".to_string()));
    }

    #[test]
    fn markup_round_trip_text_content() {
        let xml = "<document><td><b>one<br/>two</b></td></document>";
        let root = parse_document(xml).unwrap();
        let td = root.child_elements().next().unwrap();
        let markup = td.to_markup();
        assert!(markup.contains("<br/>"));
        assert_eq!(td.text_content(), "onetwo");
    }

    #[test]
    fn numeric_attribute_error() {
        let xml = r#"<document><td colspan="two">x</td></document>"#;
        let root = parse_document(xml).unwrap();
        let td = root.child_elements().next().unwrap();
        assert!(matches!(
            td.attr_usize("colspan", 1),
            Err(Error::Attribute { .. })
        ));
    }
}
