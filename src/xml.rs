//! Lightweight XML element tree
//!
//! SBML and SED-ML documents interleave ordinary elements with embedded MathML, which
//! makes them awkward to map onto fixed serde structures. This module reads a document
//! with `quick-xml`'s event reader into a small owned tree that the SBML, SED-ML and
//! MathML readers then walk.
//!
//! Element and attribute names are stored by their *local* name. Namespace prefixes are
//! dropped, since none of the supported formats reuse a local name across namespaces in
//! a way that matters to the readers.

use std::str::Utf8Error;

use quick_xml::events::{attributes::AttrError, BytesStart, Event};
use quick_xml::escape::EscapeError;
use quick_xml::Reader;
use thiserror::Error;

/// Errors that can occur while building an [`XmlElement`] tree
#[derive(Debug, Error)]
pub enum XmlError {
    /// The underlying reader rejected the document
    #[error("Malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),

    /// An attribute could not be read
    #[error("Malformed XML attribute: {0}")]
    Attribute(#[from] AttrError),

    /// An escape sequence could not be resolved
    #[error("Malformed XML escape sequence: {0}")]
    Escape(#[from] EscapeError),

    /// An entity reference in text is neither predefined nor a character reference
    #[error("Unknown XML entity reference &{0};")]
    UnknownEntity(String),

    /// A name, attribute or text node is not valid UTF-8
    #[error("XML is not valid UTF-8: {0}")]
    Utf8(#[from] Utf8Error),

    /// The document has no root element
    #[error("XML document has no root element")]
    EmptyDocument,

    /// An end tag does not match the currently open element
    #[error("Unexpected closing tag </{0}>")]
    UnbalancedTag(String),

    /// The document ended before all elements were closed
    #[error("Unexpected end of document inside <{0}>")]
    UnexpectedEof(String),
}

/// A single XML element with its attributes, text and child elements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Local name of the element
    pub name: String,
    /// Attributes by local name, in document order
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order
    pub children: Vec<XmlElement>,
    /// Concatenated, trimmed text content directly inside this element
    pub text: String,
}

impl XmlElement {
    /// Returns the value of the attribute with the given local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the first child element with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Iterates over all child elements with the given local name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Iterates over the grandchildren found inside a `listOf…` container
    ///
    /// SBML and SED-ML both group repeated elements in a container element
    /// (`<listOfSpecies><species/>…</listOfSpecies>`). A missing container yields
    /// an empty iterator.
    pub fn list_of<'a>(
        &'a self,
        container: &'a str,
        item: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> {
        self.child(container)
            .into_iter()
            .flat_map(move |list| list.children_named(item))
    }
}

/// Parses an XML document into its root [`XmlElement`]
///
/// Comments, processing instructions and the XML declaration are skipped.
///
/// # Errors
///
/// Returns an [`XmlError`] if the document is malformed, unbalanced or empty.
pub fn parse_document(xml: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    // Text and entity references arrive as separate events
    let mut text = String::new();

    loop {
        let event = reader.read_event()?;
        if matches!(
            event,
            Event::Start(_) | Event::Empty(_) | Event::End(_) | Event::Eof
        ) {
            if let Some(current) = stack.last_mut() {
                push_text(current, &text);
            }
            text.clear();
        }

        match event {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(end) => {
                let name = std::str::from_utf8(end.local_name().as_ref())?.to_string();
                let element = stack
                    .pop()
                    .filter(|open| open.name == name)
                    .ok_or_else(|| XmlError::UnbalancedTag(name.clone()))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(raw) => {
                let raw = std::str::from_utf8(&raw)?;
                text.push_str(&quick_xml::escape::unescape(raw)?);
            }
            Event::GeneralRef(reference) => {
                text.push(resolve_reference(std::str::from_utf8(&reference)?)?);
            }
            Event::CData(data) => text.push_str(std::str::from_utf8(&data)?),
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::UnexpectedEof(open.name));
    }

    root.ok_or(XmlError::EmptyDocument)
}

fn open_element(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let name = std::str::from_utf8(start.local_name().as_ref())?.to_string();
    let mut attributes = Vec::new();

    for attribute in start.attributes() {
        let attribute = attribute?;
        if attribute.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = std::str::from_utf8(attribute.key.local_name().as_ref())?.to_string();
        let raw = std::str::from_utf8(&attribute.value)?;
        let value = quick_xml::escape::unescape(raw)?.into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name,
        attributes,
        ..Default::default()
    })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Resolves the predefined entities and numeric character references
fn resolve_reference(name: &str) -> Result<char, XmlError> {
    let resolved = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => name.strip_prefix('#').and_then(|dec| dec.parse().ok()),
            };
            code.and_then(char::from_u32)
        }
    };

    resolved.ok_or_else(|| XmlError::UnknownEntity(name.to_string()))
}

fn push_text(element: &mut XmlElement, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !element.text.is_empty() {
        element.text.push(' ');
    }
    element.text.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <sbml:root xmlns:sbml="urn:test" level="3">
                <!-- ignored -->
                <listOfItems>
                    <item id="a" value="1.5"/>
                    <item id="b &amp; c">text</item>
                </listOfItems>
            </sbml:root>"#;

        let root = parse_document(xml).unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.attr("level"), Some("3"));

        let items: Vec<_> = root.list_of("listOfItems", "item").collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].attr("value"), Some("1.5"));
        assert_eq!(items[1].attr("id"), Some("b & c"));
        assert_eq!(items[1].text, "text");
    }

    #[test]
    fn test_entity_references_in_text() {
        let xml = "<math><ci>a&amp;b</ci><ci> x&#x3C;y&#62;z </ci><ci>&quot;q&apos;</ci></math>";

        let root = parse_document(xml).unwrap();
        let texts: Vec<_> = root.children.iter().map(|ci| ci.text.as_str()).collect();
        assert_eq!(texts, vec!["a&b", "x<y>z", "\"q'"]);

        assert!(matches!(
            parse_document("<ci>&nbsp;</ci>"),
            Err(XmlError::UnknownEntity(name)) if name == "nbsp"
        ));
    }

    #[test]
    fn test_missing_list_is_empty() {
        let root = parse_document("<root/>").unwrap();
        assert_eq!(root.list_of("listOfItems", "item").count(), 0);
    }

    #[test]
    fn test_unbalanced_document() {
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("<a><b/>").is_err());
    }
}
