//! Mutable XML document model and the XPath subset used by range pointers.

pub mod document;
pub mod xpath;

pub use document::{Document, NodeId, XmlError};
pub use xpath::{strip_name_prefix, XPath, XPathError};

/// Attribute carrying an element's stable identifier.
pub const STABLE_ID_ATTRIBUTE: &str = "xml:id";
