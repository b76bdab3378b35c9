//! ID generator port for synthesizing anchor ids.

/// Generates unique identifiers for elements that lack an `xml:id`.
///
/// Each resolver context owns its generator, so two contexts never share a
/// counter and tests can substitute a predictable sequence.
pub trait IdGenerator: Send + Sync {
    /// Generates a new unique identifier string.
    fn generate_id(&self) -> String;
}
