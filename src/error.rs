//! Error types for each resolution layer.

use std::path::PathBuf;

use thiserror::Error;

use crate::xml::{XPathError, XmlError};

/// Failure to obtain a parsed document.
///
/// Cloneable so the document cache can hand the same settled failure to
/// every caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// The transport failed or returned an error status.
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        /// Document URL.
        url: String,
        /// Transport error message.
        message: String,
    },
    /// The fetched body is not well-formed XML.
    #[error("failed to parse {url}: {source}")]
    Parse {
        /// Document URL.
        url: String,
        /// Underlying parse error.
        #[source]
        source: XmlError,
    },
}

/// Structural problem in an `<app>` entry. Aborts the whole chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// `<app>` without `xml:id`.
    #[error("<app> element has no xml:id")]
    MissingIdentifier,
    /// A `<ptr>` or `<rdg>` is not nested where the schema requires.
    #[error("apparatus {apparatus}: <{element}> must be inside <{expected}>, found {found}")]
    InvalidParent {
        /// Owning apparatus id.
        apparatus: String,
        /// The misplaced element.
        element: String,
        /// The required parent element.
        expected: String,
        /// What actually encloses it.
        found: String,
    },
    /// `<rdg>` without a `wit` attribute.
    #[error("apparatus {apparatus}: <rdg> has no wit attribute")]
    MissingWitness {
        /// Owning apparatus id.
        apparatus: String,
    },
    /// The witness code names no registered edition.
    #[error("apparatus {apparatus}: witness {witness:?} names unknown edition {code:?}")]
    UnknownEdition {
        /// Owning apparatus id.
        apparatus: String,
        /// The raw `wit` value.
        witness: String,
        /// The edition code derived from it.
        code: String,
    },
    /// `<rdgGrp>` without `xml:id`.
    #[error("apparatus {apparatus}: <rdgGrp> has no xml:id")]
    MissingGroupIdentifier {
        /// Owning apparatus id.
        apparatus: String,
    },
    /// `<ptr>` without a `target` attribute.
    #[error("apparatus {apparatus}: <ptr> has no target attribute")]
    MissingTarget {
        /// Owning apparatus id.
        apparatus: String,
    },
    /// `target` is not `url#fragment`.
    #[error("apparatus {apparatus}: malformed pointer target {target:?}")]
    MalformedTarget {
        /// Owning apparatus id.
        apparatus: String,
        /// The rejected target.
        target: String,
    },
}

/// Why a range pointer could not be anchored. Contained per pointer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The fragment is not `string-range(<xpath>,<start>,<length>)`.
    #[error("malformed range expression {0:?}")]
    Syntax(String),
    /// The embedded xpath is outside the supported subset.
    #[error(transparent)]
    XPath(#[from] XPathError),
    /// The xpath matched zero or several elements.
    #[error("xpath {xpath:?} matched {count} elements, expected exactly one")]
    MatchCount {
        /// The evaluated (patched) xpath.
        xpath: String,
        /// Number of matches.
        count: usize,
    },
    /// The target document is unavailable.
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// A direct-id pointer does not resolve to exactly one element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// No element carries the id.
    #[error("apparatus {apparatus}: no element with xml:id {id:?} in {url}")]
    MissingAnchor {
        /// Owning apparatus id.
        apparatus: String,
        /// Witness document URL.
        url: String,
        /// The anchor id.
        id: String,
    },
    /// Several elements carry the id.
    #[error("apparatus {apparatus}: {count} elements share xml:id {id:?} in {url}")]
    DuplicateAnchor {
        /// Owning apparatus id.
        apparatus: String,
        /// Witness document URL.
        url: String,
        /// The anchor id.
        id: String,
        /// Number of elements sharing it.
        count: usize,
    },
}

/// Fatal failure of chunk initialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The spine or a witness document could not be loaded.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// An `<app>` entry is malformed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A dereference lookup missed.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    /// A range pointer failed while the policy treats that as fatal.
    #[error("apparatus {apparatus}: {source}")]
    Range {
        /// Owning apparatus id.
        apparatus: String,
        /// The per-pointer failure.
        #[source]
        source: RangeError,
    },
    /// A pipeline invariant was violated.
    #[error("resolution invariant violated: {0}")]
    Invariant(String),
}

/// Failure loading settings or an edition registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid YAML for the expected shape.
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Two registry entries share a code.
    #[error("duplicate edition code {0:?}")]
    DuplicateEdition(String),
}
