//! The note-store boundary. The graph side only ever sees this interface;
//! the store behind it (a real collection, a JSON fixture, a test table) is
//! somebody else's problem.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("note {0} not found")]
    NoteNotFound(i64),
    #[error("note {nid} has no field `{field}`")]
    FieldNotFound { nid: i64, field: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardRec {
    pub id: i64,
    pub nid: i64,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub buried: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: i64,
    pub mid: i64,
    #[serde(default)]
    pub deck: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ordered (name, value) pairs; the order is the note type's field order.
    #[serde(default)]
    pub fields: Vec<(String, String)>,
    #[serde(default)]
    pub cards: Vec<CardRec>,
}

impl Note {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteTypeInfo {
    pub mid: i64,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub templates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteQuery {
    pub mid: Option<i64>,
    pub deck: Option<String>,
    pub tag: Option<String>,
}

impl NoteQuery {
    pub fn of_type(mid: i64) -> Self {
        Self {
            mid: Some(mid),
            ..Self::default()
        }
    }

    pub fn in_deck(deck: &str) -> Self {
        Self {
            deck: Some(deck.to_string()),
            ..Self::default()
        }
    }

    pub fn with_tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            ..Self::default()
        }
    }
}

/// Change notification from the store. Booleans describe what changed so the
/// bridge can pick an invalidation strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeEvent {
    pub notes: Vec<i64>,
    pub note_text: bool,
    pub tag: bool,
    pub deck: bool,
    pub notetype: bool,
}

pub trait NoteProvider: Send + Sync {
    fn find_notes(&self, query: &NoteQuery) -> Vec<i64>;
    fn get_note(&self, nid: i64) -> Option<Note>;
    fn get_card(&self, cid: i64) -> Option<CardRec>;
    fn note_type(&self, mid: i64) -> Option<NoteTypeInfo>;
    fn note_types(&self) -> Vec<NoteTypeInfo>;
    fn set_field(&mut self, nid: i64, field: &str, value: &str) -> Result<(), ProviderError>;
    fn flush(&mut self, nid: i64) -> Result<(), ProviderError>;
}

/// Host surface for opening external preview/editor windows. All optional;
/// the default implementation just logs, and the viewer's embedded editor
/// mount covers the rest.
pub trait EditorHost: Send + Sync {
    fn open_previewer(&self, card_id: i64) {
        tracing::info!(card_id, "open_previewer (no editor host attached)");
    }
    fn open_editor(&self, note_id: i64) {
        tracing::info!(note_id, "open_editor (no editor host attached)");
    }
    fn open_browser(&self, query: &str) {
        tracing::info!(query, "open_browser (no editor host attached)");
    }
}

pub struct LogEditorHost;

impl EditorHost for LogEditorHost {}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct CollectionFile {
    note_types: Vec<NoteTypeInfo>,
    notes: Vec<Note>,
}

/// In-memory provider. Backs the host binary (loaded from a JSON collection
/// snapshot) and every assembler test.
#[derive(Default)]
pub struct MemProvider {
    notes: BTreeMap<i64, Note>,
    note_types: BTreeMap<i64, NoteTypeInfo>,
    cards: BTreeMap<i64, i64>,
    dirty: Vec<i64>,
    subscribers: Vec<mpsc::UnboundedSender<ChangeEvent>>,
}

impl MemProvider {
    pub fn new(note_types: Vec<NoteTypeInfo>, notes: Vec<Note>) -> Self {
        let mut p = Self::default();
        for nt in note_types {
            p.note_types.insert(nt.mid, nt);
        }
        for note in notes {
            p.insert_note(note);
        }
        p
    }

    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read collection {}", path.display()))?;
        let file: CollectionFile = serde_json::from_str(&raw)
            .with_context(|| format!("parse collection {}", path.display()))?;
        Ok(Self::new(file.note_types, file.notes))
    }

    pub fn insert_note(&mut self, note: Note) {
        for card in &note.cards {
            self.cards.insert(card.id, note.id);
        }
        self.notes.insert(note.id, note);
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    fn emit(&mut self, evt: ChangeEvent) {
        self.subscribers.retain(|tx| tx.send(evt.clone()).is_ok());
    }
}

impl NoteProvider for MemProvider {
    fn find_notes(&self, query: &NoteQuery) -> Vec<i64> {
        self.notes
            .values()
            .filter(|n| query.mid.is_none_or(|mid| n.mid == mid))
            .filter(|n| {
                query
                    .deck
                    .as_deref()
                    .is_none_or(|d| n.deck == d || n.deck.starts_with(&format!("{d}::")))
            })
            .filter(|n| query.tag.as_deref().is_none_or(|t| n.has_tag(t)))
            .map(|n| n.id)
            .collect()
    }

    fn get_note(&self, nid: i64) -> Option<Note> {
        self.notes.get(&nid).cloned()
    }

    fn get_card(&self, cid: i64) -> Option<CardRec> {
        let nid = self.cards.get(&cid)?;
        self.notes
            .get(nid)?
            .cards
            .iter()
            .find(|c| c.id == cid)
            .cloned()
    }

    fn note_type(&self, mid: i64) -> Option<NoteTypeInfo> {
        self.note_types.get(&mid).cloned()
    }

    fn note_types(&self) -> Vec<NoteTypeInfo> {
        self.note_types.values().cloned().collect()
    }

    fn set_field(&mut self, nid: i64, field: &str, value: &str) -> Result<(), ProviderError> {
        let note = self
            .notes
            .get_mut(&nid)
            .ok_or(ProviderError::NoteNotFound(nid))?;
        let slot = note
            .fields
            .iter_mut()
            .find(|(n, _)| n == field)
            .ok_or_else(|| ProviderError::FieldNotFound {
                nid,
                field: field.to_string(),
            })?;
        slot.1 = value.to_string();
        if !self.dirty.contains(&nid) {
            self.dirty.push(nid);
        }
        Ok(())
    }

    fn flush(&mut self, nid: i64) -> Result<(), ProviderError> {
        if !self.notes.contains_key(&nid) {
            return Err(ProviderError::NoteNotFound(nid));
        }
        self.dirty.retain(|d| *d != nid);
        self.emit(ChangeEvent {
            notes: vec![nid],
            note_text: true,
            ..ChangeEvent::default()
        });
        Ok(())
    }
}

#[cfg(test)]
pub mod fixtures {
    use super::*;

    pub fn note(id: i64, mid: i64, deck: &str, fields: &[(&str, &str)]) -> Note {
        Note {
            id,
            mid,
            deck: deck.to_string(),
            tags: Vec::new(),
            fields: fields
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            cards: vec![CardRec {
                id: id * 10,
                nid: id,
                template: "Card 1".to_string(),
                suspended: false,
                buried: false,
            }],
        }
    }

    pub fn note_type(mid: i64, name: &str, fields: &[&str]) -> NoteTypeInfo {
        NoteTypeInfo {
            mid,
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            templates: vec!["Card 1".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn queries_filter_by_type_deck_and_tag() {
        let mut a = note(1, 100, "JP::Vocab", &[("Front", "x")]);
        a.tags.push("keep".to_string());
        let b = note(2, 100, "JP::Examples", &[("Front", "y")]);
        let c = note(3, 200, "JP::Vocab", &[("Front", "z")]);
        let p = MemProvider::new(vec![note_type(100, "Vocab", &["Front"])], vec![a, b, c]);

        assert_eq!(p.find_notes(&NoteQuery::of_type(100)), vec![1, 2]);
        assert_eq!(p.find_notes(&NoteQuery::in_deck("JP::Vocab")), vec![1, 3]);
        assert_eq!(p.find_notes(&NoteQuery::in_deck("JP")), vec![1, 2, 3]);
        assert_eq!(p.find_notes(&NoteQuery::with_tag("keep")), vec![1]);
    }

    #[test]
    fn card_lookup_resolves_to_owner_note() {
        let p = MemProvider::new(vec![], vec![note(7, 100, "d", &[("F", "v")])]);
        let card = p.get_card(70).unwrap();
        assert_eq!(card.nid, 7);
        assert!(p.get_card(71).is_none());
    }

    #[test]
    fn flush_emits_change_event() {
        let mut p = MemProvider::new(vec![], vec![note(5, 100, "d", &[("F", "v")])]);
        let mut rx = p.subscribe();
        p.set_field(5, "F", "w").unwrap();
        p.flush(5).unwrap();
        let evt = rx.try_recv().unwrap();
        assert_eq!(evt.notes, vec![5]);
        assert!(evt.note_text);
        assert_eq!(p.get_note(5).unwrap().field("F"), Some("w"));
    }

    #[test]
    fn set_field_on_missing_note_is_an_error() {
        let mut p = MemProvider::default();
        assert!(matches!(
            p.set_field(1, "F", "v"),
            Err(ProviderError::NoteNotFound(1))
        ));
    }
}
