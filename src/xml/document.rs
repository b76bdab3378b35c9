//! Arena-backed XML tree.
//!
//! Nodes live in a flat `Vec` and are addressed by [`NodeId`]. Ids are
//! allocated in document order while parsing, so sorting ids sorts nodes
//! the way they appear in the source. Nodes are never removed, which keeps
//! handles valid for the lifetime of the document.

use std::fmt::Write as _;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The synthetic document node that owns the root element.
    pub const DOCUMENT: NodeId = NodeId(0);
}

/// Error raised while parsing XML text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed XML at byte {position}: {message}")]
pub struct XmlError {
    /// Byte offset in the source where the problem was detected.
    pub position: u64,
    /// Description of the problem.
    pub message: String,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element { name: String, attributes: Vec<(String, String)> },
    Text(String),
    CData(String),
    /// Comments, declarations, doctypes and processing instructions,
    /// stored already serialized.
    Markup(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed, mutable XML document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Parses XML text into a document.
    ///
    /// # Errors
    ///
    /// Returns an [`XmlError`] for ill-formed markup, mismatched or unclosed
    /// tags, bad escapes, or a document without a root element.
    pub fn parse(source: &str) -> Result<Self, XmlError> {
        let mut doc = Self {
            nodes: vec![Node { kind: NodeKind::Document, parent: None, children: Vec::new() }],
        };
        let mut reader = Reader::from_str(source);
        let mut stack = vec![NodeId::DOCUMENT];

        loop {
            let position = reader.buffer_position();
            let fail = |message: String| XmlError { position, message };
            let parent = *stack.last().unwrap_or(&NodeId::DOCUMENT);

            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    let id = doc.push_element(parent, &start).map_err(fail)?;
                    stack.push(id);
                }
                Ok(Event::Empty(start)) => {
                    doc.push_element(parent, &start).map_err(fail)?;
                }
                Ok(Event::End(_)) => {
                    if stack.len() <= 1 {
                        return Err(fail("closing tag without matching start".into()));
                    }
                    stack.pop();
                }
                Ok(Event::Text(text)) => {
                    let text = text.unescape().map_err(|e| fail(e.to_string()))?;
                    if parent == NodeId::DOCUMENT {
                        if !text.trim().is_empty() {
                            return Err(fail("text outside the root element".into()));
                        }
                        continue;
                    }
                    doc.push(parent, NodeKind::Text(text.into_owned()));
                }
                Ok(Event::CData(data)) => {
                    let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    doc.push(parent, NodeKind::CData(data));
                }
                Ok(Event::Comment(comment)) => {
                    let markup = format!("<!--{}-->", String::from_utf8_lossy(&comment));
                    doc.push(parent, NodeKind::Markup(markup));
                }
                Ok(Event::Decl(decl)) => {
                    let markup = format!("<?{}?>", String::from_utf8_lossy(&decl));
                    doc.push(parent, NodeKind::Markup(markup));
                }
                Ok(Event::PI(pi)) => {
                    let markup = format!("<?{}?>", String::from_utf8_lossy(&pi));
                    doc.push(parent, NodeKind::Markup(markup));
                }
                Ok(Event::DocType(doctype)) => {
                    let markup =
                        format!("<!DOCTYPE {}>", String::from_utf8_lossy(&doctype).trim());
                    doc.push(parent, NodeKind::Markup(markup));
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(fail(e.to_string())),
            }
        }

        if stack.len() > 1 {
            let open = stack.last().and_then(|&id| doc.name(id)).unwrap_or_default().to_string();
            return Err(XmlError {
                position: reader.buffer_position(),
                message: format!("unclosed element <{open}>"),
            });
        }
        if doc.root_element().is_none() {
            return Err(XmlError {
                position: reader.buffer_position(),
                message: "document has no root element".into(),
            });
        }
        Ok(doc)
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, parent: Some(parent), children: Vec::new() });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_element(&mut self, parent: NodeId, start: &BytesStart<'_>) -> Result<NodeId, String> {
        if parent == NodeId::DOCUMENT && self.root_element().is_some() {
            return Err("more than one root element".into());
        }
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(|e| e.to_string())?.into_owned();
            attributes.push((key, value));
        }
        Ok(self.push(parent, NodeKind::Element { name, attributes }))
    }

    /// Returns the root element.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.child_elements(NodeId::DOCUMENT).next()
    }

    /// Returns `true` if `node` is an element.
    #[must_use]
    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes.get(node.0).map(|n| &n.kind), Some(NodeKind::Element { .. }))
    }

    /// Returns the qualified name of an element (`tei:p`, `rdg`, ...).
    #[must_use]
    pub fn name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the element name with any namespace prefix removed.
    #[must_use]
    pub fn local_name(&self, node: NodeId) -> Option<&str> {
        self.name(node).map(|name| name.rsplit_once(':').map_or(name, |(_, local)| local))
    }

    /// Returns the value of an attribute on an element.
    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element { attributes, .. } => {
                attributes.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
            }
            _ => None,
        }
    }

    /// Sets an attribute, overwriting an existing value in place.
    ///
    /// Returns `false` when `node` is not an element.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> bool {
        let Some(NodeKind::Element { attributes, .. }) =
            self.nodes.get_mut(node.0).map(|n| &mut n.kind)
        else {
            return false;
        };
        match attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => value.clone_into(existing),
            None => attributes.push((name.to_string(), value.to_string())),
        }
        true
    }

    /// Returns the parent of `node`, which may be [`NodeId::DOCUMENT`].
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0)?.parent
    }

    /// Returns the parent of `node` if it is an element.
    #[must_use]
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|&p| self.is_element(p))
    }

    /// Iterates over the element children of `node`.
    pub fn child_elements(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(node.0)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|&child| self.is_element(child))
    }

    /// Returns every element below `node` in document order, excluding `node`.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self.child_elements(node).collect();
        pending.reverse();
        while let Some(next) = pending.pop() {
            out.push(next);
            let before = pending.len();
            pending.extend(self.child_elements(next));
            pending[before..].reverse();
        }
        out
    }

    /// Returns all elements in the document whose local name is `local`.
    #[must_use]
    pub fn elements_named(&self, local: &str) -> Vec<NodeId> {
        self.descendants(NodeId::DOCUMENT)
            .into_iter()
            .filter(|&node| self.local_name(node) == Some(local))
            .collect()
    }

    /// Returns all elements carrying `name="value"`.
    #[must_use]
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Vec<NodeId> {
        self.descendants(NodeId::DOCUMENT)
            .into_iter()
            .filter(|&node| self.attribute(node, name) == Some(value))
            .collect()
    }

    /// Concatenated text content of `node` and its descendants.
    #[must_use]
    pub fn text(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let Some(n) = self.nodes.get(node.0) else { return };
        match &n.kind {
            NodeKind::Text(text) | NodeKind::CData(text) => out.push_str(text),
            NodeKind::Document | NodeKind::Element { .. } => {
                for &child in &n.children {
                    self.collect_text(child, out);
                }
            }
            NodeKind::Markup(_) => {}
        }
    }

    /// Serializes the document back to XML text.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for (i, &child) in self.nodes[0].children.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            self.write_node(child, &mut out);
        }
        out.push('\n');
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        let n = &self.nodes[node.0];
        match &n.kind {
            NodeKind::Document => {}
            NodeKind::Text(text) => out.push_str(&escape(text.as_str())),
            NodeKind::CData(data) => {
                let _ = write!(out, "<![CDATA[{data}]]>");
            }
            NodeKind::Markup(markup) => out.push_str(markup),
            NodeKind::Element { name, attributes } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attributes {
                    let _ = write!(out, " {key}=\"{}\"", escape(value.as_str()));
                }
                if n.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for &child in &n.children {
                    self.write_node(child, out);
                }
                let _ = write!(out, "</{name}>");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <body>
    <p xml:id="a">First <hi>bold</hi> text</p>
    <p>Second &amp; last</p>
  </body>
</TEI>"#;

    #[test]
    fn parses_elements_attributes_and_text() {
        let doc = Document::parse(SAMPLE).unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(doc.name(root), Some("TEI"));

        let paragraphs = doc.elements_named("p");
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(doc.attribute(paragraphs[0], "xml:id"), Some("a"));
        assert_eq!(doc.text(paragraphs[0]), "First bold text");
        assert_eq!(doc.text(paragraphs[1]), "Second & last");
        assert_eq!(doc.local_name(doc.parent_element(paragraphs[0]).unwrap()), Some("body"));
    }

    #[test]
    fn descendants_are_in_document_order() {
        let doc = Document::parse(SAMPLE).unwrap();
        let names: Vec<&str> = doc
            .descendants(NodeId::DOCUMENT)
            .into_iter()
            .filter_map(|n| doc.name(n))
            .collect();
        assert_eq!(names, vec!["TEI", "body", "p", "hi", "p"]);
    }

    #[test]
    fn set_attribute_inserts_and_overwrites() {
        let mut doc = Document::parse("<a><b x=\"1\"/></a>").unwrap();
        let b = doc.elements_named("b")[0];
        assert!(doc.set_attribute(b, "x", "2"));
        assert!(doc.set_attribute(b, "y", "3"));
        assert_eq!(doc.attribute(b, "x"), Some("2"));
        assert_eq!(doc.attribute(b, "y"), Some("3"));
        assert!(!doc.set_attribute(NodeId::DOCUMENT, "z", "4"));
    }

    #[test]
    fn find_by_attribute_reports_every_match() {
        let doc = Document::parse(r#"<a><b xml:id="x"/><c xml:id="x"/><d xml:id="y"/></a>"#)
            .unwrap();
        assert_eq!(doc.find_by_attribute("xml:id", "x").len(), 2);
        assert_eq!(doc.find_by_attribute("xml:id", "y").len(), 1);
        assert!(doc.find_by_attribute("xml:id", "z").is_empty());
    }

    #[test]
    fn serializes_with_escaping() {
        let mut doc = Document::parse("<a><b>x &lt; y</b><c/></a>").unwrap();
        let c = doc.elements_named("c")[0];
        doc.set_attribute(c, "target", "doc.xml#\"q\"");
        assert_eq!(
            doc.to_xml(),
            "<a><b>x &lt; y</b><c target=\"doc.xml#&quot;q&quot;\"/></a>\n"
        );
    }

    #[test]
    fn serialized_output_parses_back() {
        let doc = Document::parse(SAMPLE).unwrap();
        let again = Document::parse(&doc.to_xml()).unwrap();
        assert_eq!(again.elements_named("p").len(), 2);
        assert_eq!(again.text(again.elements_named("p")[1]), "Second & last");
    }

    #[test]
    fn rejects_mismatched_tags() {
        assert!(Document::parse("<a><b></a></b>").is_err());
    }

    #[test]
    fn rejects_unclosed_root() {
        assert!(Document::parse("<a><b/>").is_err());
    }

    #[test]
    fn rejects_empty_input() {
        assert!(Document::parse("   ").is_err());
    }

    #[test]
    fn rejects_two_roots() {
        assert!(Document::parse("<a/><b/>").is_err());
    }
}
