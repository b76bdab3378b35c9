//! Apparatus entries and the pointers they own.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::SharedDocument;
use crate::error::RangeError;
use crate::registry::Edition;
use crate::xml::NodeId;

/// One critical-apparatus entry.
#[derive(Debug, Clone)]
pub struct Apparatus {
    /// Value of the `<app>` element's `xml:id`.
    pub id: String,
    /// Optional ordinal from the `n` attribute.
    pub n: Option<u32>,
    /// Pointers in document order.
    pub pointers: Vec<Pointer>,
}

/// The fragment half of a pointer target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A stable element id.
    Id(String),
    /// An unresolved `string-range(...)` expression, kept verbatim.
    Range(String),
}

impl Target {
    /// Classifies a fragment string.
    #[must_use]
    pub fn from_fragment(fragment: &str) -> Self {
        if fragment.starts_with(RangeExpr::OPEN) {
            Self::Range(fragment.to_string())
        } else {
            Self::Id(fragment.to_string())
        }
    }

    /// The fragment as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Id(s) | Self::Range(s) => s,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `<ptr>` from a reading.
#[derive(Debug, Clone)]
pub struct Pointer {
    /// `xml:id` of the enclosing `<rdgGrp>`.
    pub group_id: String,
    /// Edition named by the enclosing `<rdg>`'s witness code.
    pub edition: Arc<Edition>,
    /// Document part of the target.
    pub url: String,
    /// Fragment part of the target.
    pub target: Target,
    /// The `<ptr>` element in the spine document.
    pub element: NodeId,
    /// Set once the dereference phase has located the target element.
    pub dereferenced: Option<ElementRef>,
}

impl Pointer {
    /// Returns this pointer re-targeted at a stable id.
    #[must_use]
    pub fn anchored(self, id: String) -> Self {
        Self { target: Target::Id(id), ..self }
    }

    /// Returns this pointer with its resolved element attached.
    #[must_use]
    pub fn resolved(self, element: ElementRef) -> Self {
        Self { dereferenced: Some(element), ..self }
    }

    /// The full `url#fragment` target string.
    #[must_use]
    pub fn target_string(&self) -> String {
        format!("{}#{}", self.url, self.target)
    }
}

/// Handle to a resolved element inside a cached witness document.
#[derive(Clone)]
pub struct ElementRef {
    /// URL of the owning document.
    pub url: String,
    /// The element.
    pub node: NodeId,
    document: SharedDocument,
}

impl ElementRef {
    pub(crate) fn new(url: String, node: NodeId, document: SharedDocument) -> Self {
        Self { url, node, document }
    }

    /// Reads an attribute from the element.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        let doc = self.document.read().expect("document lock poisoned");
        doc.attribute(self.node, name).map(str::to_string)
    }

    /// Element name without namespace prefix.
    #[must_use]
    pub fn local_name(&self) -> Option<String> {
        let doc = self.document.read().expect("document lock poisoned");
        doc.local_name(self.node).map(str::to_string)
    }

    /// Writes an attribute onto the element.
    pub fn set_attribute(&self, name: &str, value: &str) {
        let mut doc = self.document.write().expect("document lock poisoned");
        doc.set_attribute(self.node, name, value);
    }

    /// Text content of the element.
    #[must_use]
    pub fn text(&self) -> String {
        let doc = self.document.read().expect("document lock poisoned");
        doc.text(self.node)
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRef").field("url", &self.url).field("node", &self.node).finish()
    }
}

impl PartialEq for ElementRef {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.node == other.node
    }
}

/// A parsed `string-range(<xpath>,<start>,<length>)` fragment.
///
/// Offsets are validated but not retained past anchoring: a rewritten
/// pointer names the containing element only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeExpr {
    /// The embedded location path, unpatched.
    pub xpath: String,
    /// Character offset into the element's text.
    pub start: usize,
    /// Character count.
    pub length: usize,
}

impl RangeExpr {
    const OPEN: &'static str = "string-range(";
}

impl FromStr for RangeExpr {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || RangeError::Syntax(s.to_string());
        let inner = s.strip_prefix(Self::OPEN).and_then(|r| r.strip_suffix(')')).ok_or_else(syntax)?;
        let mut parts = inner.rsplitn(3, ',');
        let length = parts.next().and_then(|v| v.trim().parse().ok()).ok_or_else(syntax)?;
        let start = parts.next().and_then(|v| v.trim().parse().ok()).ok_or_else(syntax)?;
        let xpath = parts.next().map(str::trim).filter(|x| !x.is_empty()).ok_or_else(syntax)?;
        Ok(Self { xpath: xpath.to_string(), start, length })
    }
}
