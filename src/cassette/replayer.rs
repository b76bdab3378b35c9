//! Replays recorded interactions from a cassette.

use std::collections::HashMap;

use super::format::{Cassette, Interaction};

/// Key for indexing interactions by port and method.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct PortMethodKey {
    port: String,
    method: String,
}

/// Indexes a loaded cassette by port and method.
///
/// Anchor ids are read back in recorded order (`interactions`). Fetches are
/// matched on their URL (`find_interaction`), since fan-out fetches finish in
/// no fixed order.
pub struct CassetteReplayer {
    queues: HashMap<PortMethodKey, Vec<Interaction>>,
}

impl CassetteReplayer {
    /// Create a new replayer from a loaded cassette.
    #[must_use]
    pub fn new(cassette: &Cassette) -> Self {
        let mut queues: HashMap<PortMethodKey, Vec<Interaction>> = HashMap::new();
        for interaction in &cassette.interactions {
            let key = PortMethodKey {
                port: interaction.port.clone(),
                method: interaction.method.clone(),
            };
            queues.entry(key).or_default().push(interaction.clone());
        }
        Self { queues }
    }

    /// All interactions recorded for port and method, in recorded order.
    #[must_use]
    pub fn interactions(&self, port: &str, method: &str) -> &[Interaction] {
        let key = PortMethodKey { port: port.to_string(), method: method.to_string() };
        self.queues.get(&key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Return the first interaction for port and method recorded with `input`.
    #[must_use]
    pub fn find_interaction(
        &self,
        port: &str,
        method: &str,
        input: &serde_json::Value,
    ) -> Option<&Interaction> {
        let key = PortMethodKey { port: port.to_string(), method: method.to_string() };
        self.queues.get(&key)?.iter().find(|i| &i.input == input)
    }
}
