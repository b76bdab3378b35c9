//! Turns `<app>` elements into [`Apparatus`] values.
//!
//! Expected shape, attribute names as in TEI:
//!
//! ```text
//! <app xml:id="..." n="3">
//!   <rdgGrp xml:id="...">
//!     <rdg wit="#f1818"><ptr target="f1818_C01.xml#anchor"/></rdg>
//!   </rdgGrp>
//! </app>
//! ```

use crate::error::SchemaError;
use crate::model::{Apparatus, Pointer, Target};
use crate::registry::EditionRegistry;
use crate::xml::{Document, NodeId, STABLE_ID_ATTRIBUTE};

/// Number of leading characters of a `wit` value before the edition code
/// (`#f1818` names edition `1818`).
pub const WITNESS_PREFIX_LEN: usize = 2;

/// Validates `<app>` structure against an edition registry.
pub struct ApparatusParser<'a> {
    registry: &'a EditionRegistry,
}

impl<'a> ApparatusParser<'a> {
    /// Creates a parser resolving witness codes through `registry`.
    #[must_use]
    pub fn new(registry: &'a EditionRegistry) -> Self {
        Self { registry }
    }

    /// Parses one `<app>` element of `doc`.
    ///
    /// # Errors
    ///
    /// Fails on the first structural problem found; see [`SchemaError`].
    pub fn parse(&self, doc: &Document, app: NodeId) -> Result<Apparatus, SchemaError> {
        let id = doc
            .attribute(app, STABLE_ID_ATTRIBUTE)
            .filter(|id| !id.is_empty())
            .ok_or(SchemaError::MissingIdentifier)?
            .to_string();

        let n = doc.attribute(app, "n").and_then(|raw| match raw.trim().parse() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::warn!(apparatus = %id, n = raw, "ignoring non-numeric apparatus ordinal");
                None
            }
        });

        let pointers = doc
            .descendants(app)
            .into_iter()
            .filter(|&node| doc.local_name(node) == Some("ptr"))
            .filter(|&ptr| owning_app(doc, ptr) == Some(app))
            .map(|ptr| self.parse_pointer(doc, &id, ptr))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Apparatus { id, n, pointers })
    }

    fn parse_pointer(
        &self,
        doc: &Document,
        apparatus: &str,
        ptr: NodeId,
    ) -> Result<Pointer, SchemaError> {
        let rdg = expect_parent(doc, apparatus, ptr, "rdg")?;
        let group = expect_parent(doc, apparatus, rdg, "rdgGrp")?;

        let witness = doc
            .attribute(rdg, "wit")
            .ok_or_else(|| SchemaError::MissingWitness { apparatus: apparatus.to_string() })?;
        let code: String = witness.chars().skip(WITNESS_PREFIX_LEN).collect();
        let edition = self.registry.lookup(&code).map_err(|_| SchemaError::UnknownEdition {
            apparatus: apparatus.to_string(),
            witness: witness.to_string(),
            code,
        })?;

        let group_id = doc
            .attribute(group, STABLE_ID_ATTRIBUTE)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SchemaError::MissingGroupIdentifier {
                apparatus: apparatus.to_string(),
            })?;

        let target = doc
            .attribute(ptr, "target")
            .ok_or_else(|| SchemaError::MissingTarget { apparatus: apparatus.to_string() })?;
        let (url, fragment) = split_target(target).ok_or_else(|| SchemaError::MalformedTarget {
            apparatus: apparatus.to_string(),
            target: target.to_string(),
        })?;

        Ok(Pointer {
            group_id: group_id.to_string(),
            edition,
            url: url.to_string(),
            target: Target::from_fragment(fragment),
            element: ptr,
            dereferenced: None,
        })
    }
}

/// Nearest `<app>` ancestor; a `<ptr>` belongs to that apparatus only.
fn owning_app(doc: &Document, node: NodeId) -> Option<NodeId> {
    std::iter::successors(doc.parent_element(node), |&n| doc.parent_element(n))
        .find(|&n| doc.local_name(n) == Some("app"))
}

fn expect_parent(
    doc: &Document,
    apparatus: &str,
    child: NodeId,
    expected: &str,
) -> Result<NodeId, SchemaError> {
    let parent = doc.parent_element(child);
    match parent {
        Some(p) if doc.local_name(p) == Some(expected) => Ok(p),
        _ => Err(SchemaError::InvalidParent {
            apparatus: apparatus.to_string(),
            element: doc.local_name(child).unwrap_or_default().to_string(),
            expected: expected.to_string(),
            found: parent
                .and_then(|p| doc.local_name(p))
                .map_or_else(|| "no element".to_string(), |name| format!("<{name}>")),
        }),
    }
}

/// Splits `url#fragment`; both halves must be non-empty and `#` must occur once.
#[must_use]
pub fn split_target(target: &str) -> Option<(&str, &str)> {
    let (url, fragment) = target.split_once('#')?;
    (!url.is_empty() && !fragment.is_empty() && !fragment.contains('#')).then_some((url, fragment))
}
