//! Abbreviated XPath location paths.
//!
//! Supports the subset found in range pointers: `/` and `//` steps, name
//! tests, `*`, `.`, `..`, and predicates `[n]`, `[last()]`, `[@a]` and
//! `[@a='v']`. Unprefixed name tests match on local name.

use thiserror::Error;

use super::document::{Document, NodeId};

/// Error raised for expressions outside the supported subset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XPathError {
    /// The expression is empty.
    #[error("empty xpath expression")]
    Empty,
    /// Unexpected input at the given byte offset.
    #[error("unexpected {found:?} at offset {offset} in xpath {expression:?}")]
    Unexpected {
        /// The full expression.
        expression: String,
        /// Byte offset of the problem.
        offset: usize,
        /// The text found there.
        found: String,
    },
    /// A predicate that this evaluator does not understand.
    #[error("unsupported predicate [{0}]")]
    UnsupportedPredicate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Any,
    Name(String),
    SelfNode,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Last,
    HasAttribute(String),
    AttributeEquals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

/// A compiled location path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    source: String,
    steps: Vec<Step>,
}

impl XPath {
    /// Compiles an expression.
    ///
    /// Relative paths are evaluated from the document node, so `body/p`
    /// only matches when `body` is the root element.
    ///
    /// # Errors
    ///
    /// Returns an [`XPathError`] if the expression is empty or uses syntax
    /// outside the supported subset.
    pub fn parse(expression: &str) -> Result<Self, XPathError> {
        let source = expression.trim();
        if source.is_empty() {
            return Err(XPathError::Empty);
        }
        let unexpected = |rest: &str| XPathError::Unexpected {
            expression: source.to_string(),
            offset: source.len() - rest.len(),
            found: rest.chars().take(12).collect(),
        };

        let mut steps = Vec::new();
        let mut rest = source;
        while !rest.is_empty() {
            let axis = if let Some(after) = rest.strip_prefix("//") {
                rest = after;
                Axis::Descendant
            } else if let Some(after) = rest.strip_prefix('/') {
                rest = after;
                Axis::Child
            } else if steps.is_empty() {
                Axis::Child
            } else {
                return Err(unexpected(rest));
            };

            let (test, after) = parse_node_test(rest).ok_or_else(|| unexpected(rest))?;
            rest = after;

            let mut predicates = Vec::new();
            while let Some(after) = rest.strip_prefix('[') {
                let end = closing_bracket(after).ok_or_else(|| unexpected(rest))?;
                predicates.push(parse_predicate(after[..end].trim())?);
                rest = &after[end + 1..];
            }
            steps.push(Step { axis, test, predicates });
        }

        Ok(Self { source: source.to_string(), steps })
    }

    /// The expression as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluates the path, returning matching elements in document order.
    #[must_use]
    pub fn evaluate(&self, doc: &Document) -> Vec<NodeId> {
        let mut context = vec![NodeId::DOCUMENT];
        for step in &self.steps {
            let mut next = Vec::new();
            for &node in &context {
                let bases = match step.axis {
                    Axis::Child => vec![node],
                    Axis::Descendant => {
                        let mut all = vec![node];
                        all.extend(doc.descendants(node));
                        all
                    }
                };
                for base in bases {
                    let candidates: Vec<NodeId> = match &step.test {
                        NodeTest::SelfNode => vec![base],
                        NodeTest::Parent => doc.parent(base).into_iter().collect(),
                        NodeTest::Any => doc.child_elements(base).collect(),
                        NodeTest::Name(name) => {
                            doc.child_elements(base).filter(|&c| name_matches(doc, c, name)).collect()
                        }
                    };
                    next.extend(apply_predicates(doc, candidates, &step.predicates));
                }
            }
            next.sort_unstable();
            next.dedup();
            context = next;
        }
        context.retain(|&node| doc.is_element(node));
        context
    }
}

fn name_matches(doc: &Document, node: NodeId, name: &str) -> bool {
    if name.contains(':') {
        doc.name(node) == Some(name)
    } else {
        doc.local_name(node) == Some(name)
    }
}

fn apply_predicates(doc: &Document, mut nodes: Vec<NodeId>, predicates: &[Predicate]) -> Vec<NodeId> {
    for predicate in predicates {
        nodes = match predicate {
            Predicate::Position(n) => nodes.get(n - 1).copied().into_iter().collect(),
            Predicate::Last => nodes.last().copied().into_iter().collect(),
            Predicate::HasAttribute(name) => {
                nodes.into_iter().filter(|&n| doc.attribute(n, name).is_some()).collect()
            }
            Predicate::AttributeEquals(name, value) => nodes
                .into_iter()
                .filter(|&n| doc.attribute(n, name) == Some(value.as_str()))
                .collect(),
        };
    }
    nodes
}

fn parse_node_test(input: &str) -> Option<(NodeTest, &str)> {
    if let Some(rest) = input.strip_prefix("..") {
        return Some((NodeTest::Parent, rest));
    }
    if let Some(rest) = input.strip_prefix('.') {
        return Some((NodeTest::SelfNode, rest));
    }
    if let Some(rest) = input.strip_prefix('*') {
        return Some((NodeTest::Any, rest));
    }
    let (name, rest) = take_name(input);
    (!name.is_empty()).then(|| (NodeTest::Name(name.to_string()), rest))
}

fn take_name(input: &str) -> (&str, &str) {
    let end = input
        .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
        .unwrap_or(input.len());
    input.split_at(end)
}

/// Offset of the `]` closing a predicate, skipping quoted literals.
fn closing_bracket(input: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Removes `prefix` from the start of every name test in `expression`.
///
/// A name starts the expression or follows `/`, `[` or `@`. Text inside quoted
/// literals and prefixes in the middle of a longer name are kept.
#[must_use]
pub fn strip_name_prefix(expression: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut quote = None;
    let mut at_name_start = true;
    let mut rest = expression;
    while let Some(c) = rest.chars().next() {
        if at_name_start {
            if let Some(tail) = rest.strip_prefix(prefix) {
                rest = tail;
                at_name_start = false;
                continue;
            }
        }
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
        at_name_start = quote.is_none()
            && (matches!(c, '/' | '[' | '@') || (at_name_start && c.is_whitespace()));
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn parse_predicate(body: &str) -> Result<Predicate, XPathError> {
    let unsupported = || XPathError::UnsupportedPredicate(body.to_string());

    if body == "last()" {
        return Ok(Predicate::Last);
    }
    if let Ok(position) = body.parse::<usize>() {
        return if position == 0 { Err(unsupported()) } else { Ok(Predicate::Position(position)) };
    }
    let Some(attribute) = body.strip_prefix('@') else {
        return Err(unsupported());
    };
    let (name, rest) = take_name(attribute);
    if name.is_empty() {
        return Err(unsupported());
    }
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(Predicate::HasAttribute(name.to_string()));
    }
    let literal = rest.strip_prefix('=').map(str::trim).ok_or_else(unsupported)?;
    let value = literal
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| literal.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .ok_or_else(unsupported)?;
    Ok(Predicate::AttributeEquals(name.to_string(), value.to_string()))
}
