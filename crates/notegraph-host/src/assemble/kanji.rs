//! Kanji gate. Hub mode keeps one synthetic node per character; note mode
//! maps characters onto concrete kanji notes. Vocab→kanji edges optionally
//! carry TF-IDF weights with per-note top-k pruning and quantile
//! normalization.

use notegraph_core::{GraphEdge, Layer, NodeId, NodeKind};
use std::collections::BTreeMap;

use super::BuildCtx;
use crate::provider::{NoteProvider, NoteQuery};
use crate::text;

/// Component chains are walked depth-first at most this deep, so a cyclic
/// component table cannot loop the gate.
pub const MAX_COMPONENT_DEPTH: usize = 5;

struct KanjiEntry {
    nid: i64,
    components: Vec<char>,
}

struct VocabLink {
    nid: i64,
    ch: char,
    weight: f32,
}

pub(crate) fn run(ctx: &mut BuildCtx<'_>, provider: &dyn NoteProvider) {
    let gate = ctx.cfg.kanji_gate.clone();
    if !gate.enabled || !ctx.layer_enabled(Layer::Kanji) {
        return;
    }

    // Character table from the configured kanji note types.
    let mut table: BTreeMap<char, KanjiEntry> = BTreeMap::new();
    for mid in &gate.kanji_note_types {
        for nid in provider.find_notes(&NoteQuery::of_type(*mid)) {
            let Some(note) = provider.get_note(nid) else {
                ctx.diag.skipped_notes += 1;
                continue;
            };
            if !ctx.note_eligible(&note) {
                continue;
            }
            let Some(ch) = note
                .field(&gate.kanji_field)
                .and_then(|f| text::extract_kanji(&text::strip_html(f)).first().copied())
            else {
                continue;
            };
            let components = note
                .field(&gate.component_field)
                .map(|f| text::extract_kanji(&text::strip_html(f)))
                .unwrap_or_default()
                .into_iter()
                .filter(|c| *c != ch)
                .collect();
            table.entry(ch).or_insert(KanjiEntry { nid, components });
        }
    }

    emit_component_edges(ctx, provider, &table);

    // Vocab occurrences, with per-word character counts for TF-IDF.
    let mut links: Vec<VocabLink> = Vec::new();
    let mut df: BTreeMap<char, u32> = BTreeMap::new();
    let mut docs = 0u32;
    let mut per_note: Vec<(i64, Vec<(char, u32)>, u32)> = Vec::new();

    for mid in &gate.vocab_note_types {
        for nid in provider.find_notes(&NoteQuery::of_type(*mid)) {
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
            let cleaned = text::strip_furigana(&text::strip_html(raw));
            let mut counts: Vec<(char, u32)> = Vec::new();
            let mut total = 0u32;
            for ch in cleaned.chars().filter(|c| text::is_kanji(*c)) {
                total += 1;
                match counts.iter_mut().find(|(c, _)| *c == ch) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((ch, 1)),
                }
            }
            if counts.is_empty() {
                continue;
            }
            docs += 1;
            for (ch, _) in &counts {
                *df.entry(*ch).or_insert(0) += 1;
            }
            per_note.push((nid, counts, total));
        }
    }

    for (nid, counts, total) in per_note {
        let mut note_links: Vec<VocabLink> = counts
            .into_iter()
            .map(|(ch, n)| {
                let weight = if ctx.cfg.kanji_tfidf {
                    let tf = n as f32 / total.max(1) as f32;
                    let idf = (1.0 + docs as f32 / df.get(&ch).copied().unwrap_or(1) as f32).ln();
                    tf * idf
                } else {
                    1.0
                };
                VocabLink { nid, ch, weight }
            })
            .collect();

        if ctx.cfg.kanji_topk_enabled {
            note_links.sort_by(|a, b| {
                b.weight
                    .partial_cmp(&a.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.ch.cmp(&b.ch))
            });
            note_links.truncate(ctx.cfg.kanji_topk as usize);
        }
        links.extend(note_links);
    }

    if ctx.cfg.kanji_norm && !links.is_empty() {
        quantile_normalize(&mut links);
    }

    for link in links {
        if !ctx.in_scope(link.nid) {
            continue;
        }
        let target = if ctx.cfg.kanji_hubs {
            let id = NodeId::kanji(link.ch);
            ctx.ensure_hub(id.clone(), NodeKind::KanjiHub, &link.ch.to_string());
            id
        } else {
            let Some(entry) = table.get(&link.ch) else {
                continue;
            };
            if ctx.ensure_note_node(provider, entry.nid).is_none() {
                continue;
            }
            NodeId::note(entry.nid)
        };
        if ctx.ensure_note_node(provider, link.nid).is_none() {
            continue;
        }
        let mut edge = GraphEdge::new(NodeId::note(link.nid), target, Layer::Kanji);
        edge.weight = link.weight;
        ctx.push_edge(edge);
    }
}

/// Depth-first walk over the component table, emitting an edge per
/// parent→child pair. The walk, not the emission, is depth-bounded.
fn emit_component_edges(
    ctx: &mut BuildCtx<'_>,
    provider: &dyn NoteProvider,
    table: &BTreeMap<char, KanjiEntry>,
) {
    if !ctx.cfg.kanji_components || !ctx.layer_enabled(Layer::KanjiComponent) {
        return;
    }
    // Never scope-filtered: a scoped rebuild must re-emit every component
    // edge so the delta diff cannot mistake surviving edges for removals.
    for (ch, entry) in table {
        walk_components(ctx, provider, table, *ch, entry, 0);
    }
}

fn walk_components(
    ctx: &mut BuildCtx<'_>,
    provider: &dyn NoteProvider,
    table: &BTreeMap<char, KanjiEntry>,
    ch: char,
    entry: &KanjiEntry,
    depth: usize,
) {
    if depth >= MAX_COMPONENT_DEPTH {
        return;
    }
    for comp in &entry.components {
        let (source, target) = if ctx.cfg.kanji_hubs {
            let sid = NodeId::kanji(ch);
            let tid = NodeId::kanji(*comp);
            ctx.ensure_hub(sid.clone(), NodeKind::KanjiHub, &ch.to_string());
            ctx.ensure_hub(tid.clone(), NodeKind::KanjiHub, &comp.to_string());
            (sid, tid)
        } else {
            let Some(comp_entry) = table.get(comp) else {
                continue;
            };
            if ctx.ensure_note_node(provider, entry.nid).is_none()
                || ctx.ensure_note_node(provider, comp_entry.nid).is_none()
            {
                continue;
            }
            (NodeId::note(entry.nid), NodeId::note(comp_entry.nid))
        };
        let key = GraphEdge::new(source.clone(), target.clone(), Layer::KanjiComponent).key();
        if ctx.has_visible(&key) {
            continue; // cycle already covered
        }
        ctx.push_edge(GraphEdge::new(source, target, Layer::KanjiComponent));
        if let Some(comp_entry) = table.get(comp) {
            walk_components(ctx, provider, table, *comp, comp_entry, depth + 1);
        }
    }
}

fn quantile_normalize(links: &mut [VocabLink]) {
    let mut sorted: Vec<f32> = links.iter().map(|l| l.weight).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let max_rank = (sorted.len() - 1).max(1) as f32;
    for link in links.iter_mut() {
        let rank = sorted.partition_point(|w| *w < link.weight);
        link.weight = if sorted.len() == 1 {
            1.0
        } else {
            rank as f32 / max_rank
        };
    }
}

#[cfg(test)]
mod tests {
    use super::super::build_graph;
    use super::*;
    use crate::config::GraphConfig;
    use crate::provider::fixtures::{note, note_type};
    use crate::provider::MemProvider;

    const KANJI_MID: i64 = 300;
    const VOCAB_MID: i64 = 100;

    fn cfg(hubs: bool) -> GraphConfig {
        let mut cfg = GraphConfig::default();
        cfg.kanji_gate.enabled = true;
        cfg.kanji_gate.kanji_note_types = vec![KANJI_MID];
        cfg.kanji_gate.vocab_note_types = vec![VOCAB_MID];
        cfg.kanji_gate.vocab_field = "Expression".to_string();
        cfg.kanji_hubs = hubs;
        cfg.show_unlinked = false;
        cfg.normalize();
        cfg
    }

    fn provider() -> MemProvider {
        MemProvider::new(
            vec![
                note_type(KANJI_MID, "Kanji", &["Kanji", "Components"]),
                note_type(VOCAB_MID, "Vocab", &["Expression"]),
            ],
            vec![
                note(31, KANJI_MID, "JP::Kanji", &[("Kanji", "語"), ("Components", "言 口")]),
                note(32, KANJI_MID, "JP::Kanji", &[("Kanji", "言"), ("Components", "口")]),
                note(33, KANJI_MID, "JP::Kanji", &[("Kanji", "口"), ("Components", "")]),
                note(1, VOCAB_MID, "JP::Vocab", &[("Expression", "日本語")]),
                note(2, VOCAB_MID, "JP::Vocab", &[("Expression", "日日")]),
                note(3, VOCAB_MID, "JP::Vocab", &[("Expression", "本")]),
            ],
        )
    }

    #[test]
    fn hub_mode_links_vocab_to_character_hubs() {
        let provider = provider();
        let payload = build_graph(Some(&provider), &cfg(true), 1);

        let kanji_edges: Vec<_> = payload
            .edges
            .iter()
            .filter(|e| e.layer == Layer::Kanji)
            .map(|e| (e.source.0.clone(), e.target.0.clone()))
            .collect();
        assert!(kanji_edges.contains(&("1".to_string(), "kanji:語".to_string())));
        assert!(kanji_edges.contains(&("1".to_string(), "kanji:日".to_string())));
        assert!(kanji_edges.contains(&("2".to_string(), "kanji:日".to_string())));

        let comp_edges: Vec<_> = payload
            .edges
            .iter()
            .filter(|e| e.layer == Layer::KanjiComponent)
            .map(|e| (e.source.0.clone(), e.target.0.clone()))
            .collect();
        assert!(comp_edges.contains(&("kanji:語".to_string(), "kanji:言".to_string())));
        assert!(comp_edges.contains(&("kanji:言".to_string(), "kanji:口".to_string())));
    }

    #[test]
    fn note_mode_links_to_concrete_kanji_notes() {
        let provider = provider();
        let payload = build_graph(Some(&provider), &cfg(false), 1);

        let kanji_edges: Vec<_> = payload
            .edges
            .iter()
            .filter(|e| e.layer == Layer::Kanji)
            .map(|e| (e.source.0.clone(), e.target.0.clone()))
            .collect();
        // 日 has no kanji note, so only 語 resolves.
        assert_eq!(kanji_edges, vec![("1".to_string(), "31".to_string())]);

        let comp_edges: Vec<_> = payload
            .edges
            .iter()
            .filter(|e| e.layer == Layer::KanjiComponent)
            .map(|e| (e.source.0.clone(), e.target.0.clone()))
            .collect();
        assert!(comp_edges.contains(&("31".to_string(), "32".to_string())));
        assert!(comp_edges.contains(&("31".to_string(), "33".to_string())));
        assert!(comp_edges.contains(&("32".to_string(), "33".to_string())));
    }

    #[test]
    fn cyclic_component_tables_terminate() {
        let provider = MemProvider::new(
            vec![note_type(KANJI_MID, "Kanji", &["Kanji", "Components"])],
            vec![
                note(41, KANJI_MID, "JP::Kanji", &[("Kanji", "回"), ("Components", "口")]),
                note(42, KANJI_MID, "JP::Kanji", &[("Kanji", "口"), ("Components", "回")]),
            ],
        );
        let payload = build_graph(Some(&provider), &cfg(true), 1);
        let comp_edges: Vec<_> = payload
            .edges
            .iter()
            .filter(|e| e.layer == Layer::KanjiComponent)
            .collect();
        assert_eq!(comp_edges.len(), 2);
    }

    #[test]
    fn tfidf_weights_favor_rare_characters() {
        let provider = provider();
        let mut c = cfg(true);
        c.kanji_tfidf = true;
        let payload = build_graph(Some(&provider), &c, 1);
        let weight = |src: &str, dst: &str| {
            payload
                .edges
                .iter()
                .find(|e| e.layer == Layer::Kanji && e.source.0 == src && e.target.0 == dst)
                .map(|e| e.weight)
                .unwrap()
        };
        // 語 appears in one of two vocab docs, 日 in both.
        assert!(weight("1", "kanji:語") > weight("1", "kanji:日"));
    }

    #[test]
    fn topk_prunes_low_weight_edges_per_note() {
        let provider = provider();
        let mut c = cfg(true);
        c.kanji_tfidf = true;
        c.kanji_topk_enabled = true;
        c.kanji_topk = 1;
        let payload = build_graph(Some(&provider), &c, 1);
        let from_1: Vec<_> = payload
            .edges
            .iter()
            .filter(|e| e.layer == Layer::Kanji && e.source.0 == "1")
            .collect();
        assert_eq!(from_1.len(), 1);
        assert_eq!(from_1[0].target.0, "kanji:語");
    }

    #[test]
    fn quantile_normalization_maps_weights_into_unit_range() {
        let provider = provider();
        let mut c = cfg(true);
        c.kanji_tfidf = true;
        c.kanji_norm = true;
        let payload = build_graph(Some(&provider), &c, 1);
        for e in payload.edges.iter().filter(|e| e.layer == Layer::Kanji) {
            assert!((0.0..=1.0).contains(&e.weight), "weight {}", e.weight);
        }
    }
}
