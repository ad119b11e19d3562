//! Owned element tree for RSS feeds and sitemaps.
//!
//! Source schemas name tags verbatim (`title`, `news:keywords`, `loc`), so
//! the tree keeps qualified names as written and offers lookups by name:
//! [`XmlElement::find`] for the first matching descendant and
//! [`XmlElement::find_all`] for every one of them.

use crate::error::CrawlError;
use quick_xml::Reader;
use quick_xml::events::Event;

/// One element of a parsed XML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    /// Text directly inside this element (CDATA included).
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Does this element answer to `name`? A prefixed query (`news:title`)
    /// must match exactly; a bare one (`title`) also matches any prefixed
    /// element with that local name.
    fn is_named(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        !name.contains(':')
            && self
                .name
                .rsplit_once(':')
                .is_some_and(|(_, local)| local == name)
    }

    /// First descendant answering to `name`, in document order.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if child.is_named(name) {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Every descendant answering to `name`, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        self.collect(name, &mut found);
        found
    }

    fn collect<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.is_named(name) {
                out.push(child);
            }
            child.collect(name, out);
        }
    }

    /// All text under this element, trimmed.
    pub fn text(&self) -> String {
        let mut buf = String::new();
        self.push_text(&mut buf);
        buf.trim().to_string()
    }

    fn push_text(&self, buf: &mut String) {
        buf.push_str(&self.text);
        for child in &self.children {
            child.push_text(buf);
        }
    }

    /// Trimmed text of the first descendant answering to `name`, if any.
    pub fn find_text(&self, name: &str) -> Option<String> {
        self.find(name).map(XmlElement::text)
    }
}

/// Parse a whole document. The returned element is a nameless root whose
/// children are the document's top-level elements.
pub fn parse_document(url: &str, xml: &str) -> Result<XmlElement, CrawlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![XmlElement::default()];

    loop {
        let event = reader.read_event().map_err(|e| {
            CrawlError::parse(
                url,
                format!("malformed XML at byte {}: {e}", reader.buffer_position()),
            )
        })?;

        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                stack.push(XmlElement::named(name));
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                current(&mut stack).children.push(XmlElement::named(name));
            }
            Event::End(_) => close(&mut stack),
            Event::Text(text) => {
                current(&mut stack)
                    .text
                    .push_str(&String::from_utf8_lossy(&text));
            }
            Event::CData(data) => {
                current(&mut stack)
                    .text
                    .push_str(&String::from_utf8_lossy(&data));
            }
            Event::GeneralRef(reference) => {
                let name = String::from_utf8_lossy(&reference).into_owned();
                current(&mut stack).text.push_str(&resolve_entity(&name));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    while stack.len() > 1 {
        close(&mut stack);
    }
    stack
        .pop()
        .ok_or_else(|| CrawlError::parse(url, "empty document"))
}

fn current(stack: &mut [XmlElement]) -> &mut XmlElement {
    stack
        .last_mut()
        .expect("element stack always holds the root")
}

fn close(stack: &mut Vec<XmlElement>) {
    if stack.len() > 1 {
        if let Some(done) = stack.pop() {
            current(stack).children.push(done);
        }
    }
}

/// Decode `&name;` references. Unknown names are kept as written.
fn resolve_entity(name: &str) -> String {
    if let Some(code) = name.strip_prefix('#') {
        let parsed = match code.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        if let Some(ch) = parsed.and_then(char::from_u32) {
            return ch.to_string();
        }
    }

    let known = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "ndash" | "mdash" => "-",
        "ldquo" | "rdquo" => "\"",
        "lsquo" | "rsquo" => "'",
        "hellip" => "…",
        _ => return format!("&{name};"),
    };
    known.to_string()
}
