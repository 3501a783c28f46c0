// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! In-memory XML trees and the transforms applied to XML bodies.
//!
//! Serde-based XML deserializers map elements to struct members far more reliably than they map
//! attributes, and they are picky about member order and about empty nodes. Incoming documents are
//! therefore normalized before they are deserialized: attributes become child elements, empty
//! elements are removed, dates are rewritten into the canonical XML representation and children
//! are sorted by name. Outgoing documents take the opposite direction: attribute members stay
//! attributes, children are sorted, and canonical dates are rendered in the configured format.

use crate::error::{xml_parse_error, DateFormatSnafu, MissingRootChildSnafu, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use snafu::{OptionExt, ResultExt};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

const CANONICAL_DATE_TIME: &str = "%Y-%m-%dT%H:%M:%S%.f";
const CANONICAL_DATE_TIME_TZ: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    /// The key children are sorted by: the local name of an element, or the content of a text.
    fn sort_key(&self) -> &str {
        match self {
            Node::Element(element) => element.local_name(),
            Node::Text(text) => text,
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Node::Element(element) => write!(f, "{}", element),
            Node::Text(text) => write!(f, "{}", escape(text.as_str())),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    /// The name as written in the document, including any namespace prefix.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// An element containing nothing but `text`.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            children: vec![Node::Text(text.into())],
            ..Self::new(name)
        }
    }

    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// The concatenated text content, if the element holds only text.
    fn leaf_text(&self) -> Option<String> {
        let mut text = String::new();
        for child in &self.children {
            match child {
                Node::Text(t) => text.push_str(t),
                Node::Element(_) => return None,
            }
        }
        Some(text)
    }

    fn push_text(&mut self, text: &str) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (key, value) in &self.attributes {
            write!(f, " {}=\"{}\"", key, escape(value.as_str()))?;
        }
        if self.children.is_empty() {
            return write!(f, "/>");
        }
        write!(f, ">")?;
        for child in &self.children {
            write!(f, "{}", child)?;
        }
        write!(f, "</{}>", self.name)
    }
}

fn local(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn is_namespace_declaration(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

fn is_temporal(name: &str) -> bool {
    let name = name.to_lowercase();
    name.contains("date") || name.contains("time")
}

fn node_order(a: &Node, b: &Node) -> Ordering {
    a.sort_key()
        .cmp(b.sort_key())
        .then_with(|| a.to_string().cmp(&b.to_string()))
}

fn open(start: &BytesStart<'_>) -> Result<Element> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(xml_parse_error)?
        .to_string();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(xml_parse_error)?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(xml_parse_error)?;
        let raw = std::str::from_utf8(&attr.value).map_err(xml_parse_error)?;
        let value = unescape(raw).map_err(xml_parse_error)?;
        element
            .attributes
            .push((key.to_string(), value.into_owned()));
    }
    Ok(element)
}

fn close(stack: &mut Vec<Element>, root: &mut Option<Element>, mut element: Element) -> Result<()> {
    element
        .children
        .retain(|node| !matches!(node, Node::Text(text) if text.trim().is_empty()));
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(xml_parse_error("document has more than one root element")),
    }
    Ok(())
}

fn text(stack: &mut [Element], text: &str) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.push_text(text),
        None if text.trim().is_empty() => {}
        None => return Err(xml_parse_error("text outside of the root element")),
    }
    Ok(())
}

/// Parse a document into an element tree.
///
/// Declarations, comments, processing instructions and whitespace-only text between elements
/// are discarded. Entity and character references are resolved.
pub fn parse(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;
    loop {
        match reader.read_event().map_err(xml_parse_error)? {
            Event::Start(start) => stack.push(open(&start)?),
            Event::Empty(start) => {
                let element = open(&start)?;
                close(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| xml_parse_error("unexpected end tag"))?;
                close(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                let raw = std::str::from_utf8(&t).map_err(xml_parse_error)?;
                text(&mut stack, &unescape(raw).map_err(xml_parse_error)?)?;
            }
            Event::GeneralRef(reference) => {
                let name = std::str::from_utf8(&reference).map_err(xml_parse_error)?;
                let entity = format!("&{};", name);
                let resolved = unescape(&entity).map_err(xml_parse_error)?;
                text(&mut stack, &resolved)?;
            }
            Event::CData(data) => {
                text(&mut stack, std::str::from_utf8(&data).map_err(xml_parse_error)?)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        return Err(xml_parse_error(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| xml_parse_error("document has no root element"))
}

/// Settings which control the XML transforms.
#[derive(Clone, Copy, Debug, Default)]
pub struct XmlOptions<'a> {
    /// Discard the outermost element of an incoming document and use its first child instead.
    pub ignore_root_element: bool,
    /// Drop attributes rather than converting them.
    pub ignore_attributes: bool,
    /// A `chrono` format string used for members whose name mentions a date or a time.
    pub date_format: Option<&'a str>,
}

impl<'a> XmlOptions<'a> {
    fn date_format(&self) -> Option<&'a str> {
        self.date_format.filter(|format| !format.trim().is_empty())
    }
}

fn parse_date(value: &str, format: &str) -> std::result::Result<String, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_str(value, format) {
        return Ok(dt.format(CANONICAL_DATE_TIME_TZ).to_string());
    }
    let naive = NaiveDateTime::parse_from_str(value, format).or_else(|err| {
        NaiveDate::parse_from_str(value, format)
            .map(|date| date.and_time(NaiveTime::MIN))
            .map_err(|_| err)
    })?;
    Ok(naive.format(CANONICAL_DATE_TIME).to_string())
}

fn format_date(value: &str, format: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.format(format).to_string());
    }
    NaiveDateTime::parse_from_str(value, CANONICAL_DATE_TIME)
        .ok()
        .map(|dt| dt.format(format).to_string())
}

/// Normalize an incoming document so it can be handed to a serde deserializer.
///
/// Returns `None` if nothing is left of the document once empty elements are removed.
pub fn normalize(root: Element, options: &XmlOptions<'_>) -> Result<Option<Element>> {
    let root = if options.ignore_root_element {
        let name = root.name.clone();
        root.children
            .into_iter()
            .find_map(|node| match node {
                Node::Element(element) => Some(element),
                Node::Text(_) => None,
            })
            .context(MissingRootChildSnafu { element: name })?
    } else {
        root
    };
    transform(root, options)
}

fn transform(mut element: Element, options: &XmlOptions<'_>) -> Result<Option<Element>> {
    if let Some(format) = options.date_format() {
        if is_temporal(element.local_name()) {
            if let Some(value) = element.leaf_text().filter(|v| !v.is_empty()) {
                let canonical = parse_date(&value, format).context(DateFormatSnafu {
                    element: element.local_name(),
                    value: value.as_str(),
                    format,
                })?;
                element.children = vec![Node::Text(canonical)];
            }
        }
    }

    let attributes = std::mem::take(&mut element.attributes);
    if !options.ignore_attributes {
        for (key, value) in attributes {
            if !is_namespace_declaration(&key) {
                element
                    .children
                    .push(Node::Element(Element::with_text(key, value)));
            }
        }
    }

    if element.children.is_empty() {
        return Ok(None);
    }

    let mut children = element.children;
    children.sort_by(node_order);
    let children = children
        .into_iter()
        .map(|node| match node {
            Node::Element(child) => Ok(transform(child, options)?.map(Node::Element)),
            text => Ok(Some(text)),
        })
        .filter_map(Result::transpose)
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(Element {
        name: local(&element.name).to_string(),
        attributes: Vec::new(),
        children,
    }))
}

/// Prepare a serialized object for sending: sort members, apply the date format, and drop
/// attributes if they are ignored. Empty elements are kept, since they stand for empty members.
pub fn prepare_outgoing(mut element: Element, options: &XmlOptions<'_>) -> Element {
    if options.ignore_attributes {
        element.attributes.clear();
    }
    if let Some(format) = options.date_format() {
        if is_temporal(element.local_name()) {
            if let Some(formatted) = element
                .leaf_text()
                .and_then(|value| format_date(&value, format))
            {
                element.children = vec![Node::Text(formatted)];
            }
        }
    }
    element.children.sort_by(node_order);
    element.children = element
        .children
        .into_iter()
        .map(|node| match node {
            Node::Element(child) => Node::Element(prepare_outgoing(child, options)),
            text => text,
        })
        .collect();
    element
}
