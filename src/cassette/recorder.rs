//! Accumulates port interactions and writes them out as a cassette.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;

use super::format::{Cassette, Interaction};

/// Collects interactions for one port and writes them as a YAML cassette.
///
/// A sequential recorder keeps every call in order, for ports replayed
/// cursor by cursor (`id_gen`). A keyed recorder keeps one interaction per
/// `(port, method, input)`, the latest winning, for ports replayed by input
/// (`fetch`): a URL fetched again after cache invalidation replays its most
/// recent body.
#[derive(Debug)]
pub struct CassetteRecorder {
    path: PathBuf,
    name: String,
    source: String,
    interactions: Vec<Interaction>,
    calls: u64,
    keyed: Option<HashMap<String, usize>>,
}

impl CassetteRecorder {
    /// Creates a recorder that keeps every interaction in call order.
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            source: source.into(),
            interactions: Vec::new(),
            calls: 0,
            keyed: None,
        }
    }

    /// Creates a recorder that keeps only the latest interaction per input.
    pub fn keyed(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self { keyed: Some(HashMap::new()), ..Self::new(path, name, source) }
    }

    /// Records one call. `seq` numbers calls in the order they were made.
    pub fn record(
        &mut self,
        port: impl Into<String>,
        method: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
    ) {
        let interaction =
            Interaction { seq: self.calls, port: port.into(), method: method.into(), input, output };
        self.calls += 1;

        let Some(index) = self.keyed.as_mut() else {
            self.interactions.push(interaction);
            return;
        };
        let key = format!("{}\0{}\0{}", interaction.port, interaction.method, interaction.input);
        match index.get(&key) {
            Some(&slot) => self.interactions[slot] = interaction,
            None => {
                index.insert(key, self.interactions.len());
                self.interactions.push(interaction);
            }
        }
    }

    /// Number of interactions that will be written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Writes the cassette file and returns its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn finish(self) -> Result<PathBuf, std::io::Error> {
        let cassette = Cassette {
            name: self.name,
            recorded_at: Utc::now(),
            source: self.source,
            interactions: self.interactions,
        };
        let yaml = serde_yaml::to_string(&cassette).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, yaml)?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::replayer::CassetteReplayer;
    use serde_json::json;

    fn load(path: &std::path::Path) -> Cassette {
        serde_yaml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn sequential_recorder_keeps_every_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_gen.cassette.yaml");

        let mut recorder = CassetteRecorder::new(&path, "chunk-01-id_gen", "spine");
        recorder.record("id_gen", "generate_id", json!(null), json!("anchor-0"));
        recorder.record("id_gen", "generate_id", json!(null), json!("anchor-1"));
        assert_eq!(recorder.len(), 2);

        assert_eq!(recorder.finish().unwrap(), path);
        let cassette = load(&path);
        assert_eq!(cassette.name, "chunk-01-id_gen");
        assert_eq!(cassette.source, "spine");
        let ids: Vec<_> = cassette.interactions.iter().map(|i| i.output.clone()).collect();
        assert_eq!(ids, [json!("anchor-0"), json!("anchor-1")]);
    }

    #[test]
    fn keyed_recorder_keeps_latest_fetch_per_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fetch.cassette.yaml");

        let mut recorder = CassetteRecorder::keyed(&path, "chunk-01-fetch", "spine");
        recorder.record("fetch", "fetch", json!({"url": "late.xml"}), json!({"Err": "404"}));
        recorder.record("fetch", "fetch", json!({"url": "a.xml"}), json!({"Ok": "<a/>"}));
        recorder.record("fetch", "fetch", json!({"url": "late.xml"}), json!({"Ok": "<late/>"}));
        assert_eq!(recorder.len(), 2);
        recorder.finish().unwrap();

        let cassette = load(&path);
        let replayer = CassetteReplayer::new(&cassette);
        let late = replayer.find_interaction("fetch", "fetch", &json!({"url": "late.xml"})).unwrap();
        assert_eq!(late.output, json!({"Ok": "<late/>"}));
        assert_eq!(late.seq, 2);
    }
}
