//! Replaying adapter for the `IdGenerator` port.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cassette::replayer::CassetteReplayer;
use crate::ports::id_gen::IdGenerator;

/// Hands out the anchor ids of a recorded run, in the order they were made.
pub struct ReplayingIdGenerator {
    ids: Vec<String>,
    next: AtomicUsize,
}

impl ReplayingIdGenerator {
    /// Loads the recorded ids.
    ///
    /// # Errors
    ///
    /// Returns an error if a recorded id is not a string.
    pub fn new(replayer: &CassetteReplayer) -> Result<Self, String> {
        let ids = replayer
            .interactions("id_gen", "generate_id")
            .iter()
            .map(|interaction| {
                interaction.output.as_str().map(str::to_string).ok_or_else(|| {
                    format!("id_gen cassette: seq {} is not a string id", interaction.seq)
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { ids, next: AtomicUsize::new(0) })
    }
}

impl IdGenerator for ReplayingIdGenerator {
    fn generate_id(&self) -> String {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        match self.ids.get(index) {
            Some(id) => id.clone(),
            None => panic!(
                "id_gen cassette exhausted: the recorded run synthesized {} anchor id(s)",
                self.ids.len()
            ),
        }
    }
}
