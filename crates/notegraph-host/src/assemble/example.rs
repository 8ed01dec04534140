//! Example gate: index vocab notes by normalized key, link example notes to
//! the vocab entry their key resolves to.

use notegraph_core::{EdgeMeta, GraphEdge, Layer, NodeId};
use std::collections::HashMap;

use super::BuildCtx;
use crate::provider::{NoteProvider, NoteQuery};
use crate::text;

pub(crate) fn run(ctx: &mut BuildCtx<'_>, provider: &dyn NoteProvider) {
    let gate = ctx.cfg.example_gate.clone();
    if !gate.enabled || !ctx.layer_enabled(Layer::Examples) {
        return;
    }
    if gate.vocab_deck.is_empty()
        || gate.vocab_field.is_empty()
        || gate.example_deck.is_empty()
        || gate.example_field.is_empty()
    {
        return;
    }

    // Vocab index; first note wins on key collisions.
    let mut index: HashMap<String, i64> = HashMap::new();
    for nid in provider.find_notes(&NoteQuery::in_deck(&gate.vocab_deck)) {
        let Some(note) = provider.get_note(nid) else {
            ctx.diag.skipped_notes += 1;
            continue;
        };
        if !ctx.note_eligible(&note) {
            continue;
        }
        let Some(raw) = note.field(&gate.vocab_field) else {
            continue;
        };
        let key = text::vocab_key(raw, gate.first_token);
        if !key.is_empty() {
            index.entry(key).or_insert(nid);
        }
    }

    for example_nid in provider.find_notes(&NoteQuery::in_deck(&gate.example_deck)) {
        let Some(note) = provider.get_note(example_nid) else {
            ctx.diag.skipped_notes += 1;
            continue;
        };
        if !ctx.note_eligible(&note) {
            continue;
        }
        let Some(raw) = note.field(&gate.example_field) else {
            continue;
        };
        // `key` or `key@stage`.
        let (key_raw, stage) = match raw.split_once('@') {
            Some((k, s)) => (k, Some(s.trim().to_string())),
            None => (raw, None),
        };
        let key = text::vocab_key(key_raw, gate.first_token);
        let Some(&vocab_nid) = index.get(&key) else {
            continue;
        };
        if vocab_nid == example_nid {
            continue;
        }
        if !ctx.any_in_scope([&vocab_nid, &example_nid]) {
            continue;
        }
        if ctx.ensure_note_node(provider, vocab_nid).is_none() {
            continue;
        }
        if ctx.ensure_note_node(provider, example_nid).is_none() {
            continue;
        }
        let mut edge = GraphEdge::new(
            NodeId::note(vocab_nid),
            NodeId::note(example_nid),
            Layer::Examples,
        );
        edge.meta = EdgeMeta {
            stage,
            ..EdgeMeta::default()
        };
        ctx.push_edge(edge);
    }
}
