//! The pattern record type.

use serde::{Deserialize, Deserializer, Serialize};

/// One Strudel pattern from the corpus.
///
/// Records are immutable once loaded. `code` is carried through untouched;
/// nothing in retrieval looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRecord {
    /// Unique identifier within the corpus.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Free-text description of the sound.
    pub description: String,

    /// Mood label (e.g. "dark", "euphoric").
    pub mood: String,

    /// Tempo as written in the source; numbers are kept as their text.
    #[serde(deserialize_with = "tempo_as_text")]
    pub tempo: String,

    /// Tags, in source order.
    pub tags: Vec<String>,

    /// Strudel source code.
    pub code: String,
}

impl PatternRecord {
    /// Text the embedding model sees for this record.
    ///
    /// Everything except `code`, joined as
    /// `name | description | mood: m | tempo: t | tags: a, b`.
    pub fn embedding_text(&self) -> String {
        format!(
            "{} | {} | mood: {} | tempo: {} | tags: {}",
            self.name,
            self.description,
            self.mood,
            self.tempo,
            self.tags.join(", ")
        )
    }
}

fn tempo_as_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tempo {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Tempo::deserialize(deserializer)? {
        Tempo::Text(text) => text,
        Tempo::Number(number) => number.to_string(),
    })
}
