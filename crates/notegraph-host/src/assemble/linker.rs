//! Note linker: rule-driven edges (note type → tag targets) on the `notes`
//! layer, and manual `[label|token]` references on the `note_links` layer.

use notegraph_core::{EdgeMeta, GraphEdge, Layer, NodeId};

use super::BuildCtx;
use crate::provider::{NoteProvider, NoteQuery};
use crate::text;

pub(crate) fn run(ctx: &mut BuildCtx<'_>, provider: &dyn NoteProvider) {
    run_rules(ctx, provider);
    run_linked_fields(ctx, provider);
}

fn run_rules(ctx: &mut BuildCtx<'_>, provider: &dyn NoteProvider) {
    if !ctx.layer_enabled(Layer::Notes) {
        return;
    }
    for rule in ctx.cfg.linker_rules.clone() {
        if rule.target_tag.is_empty() {
            continue;
        }
        let targets = provider.find_notes(&NoteQuery::with_tag(&rule.target_tag));
        if targets.is_empty() {
            continue;
        }
        for source_nid in provider.find_notes(&NoteQuery::of_type(rule.note_type)) {
            let Some(note) = provider.get_note(source_nid) else {
                ctx.diag.skipped_notes += 1;
                continue;
            };
            if !ctx.note_eligible(&note) {
                continue;
            }
            if let Some(template) = &rule.template {
                if !note.cards.iter().any(|c| c.template == *template) {
                    continue;
                }
            }
            let label = rule
                .label_field
                .as_ref()
                .and_then(|f| note.field(f))
                .map(|v| text::collapse_ws(&text::strip_html(v)));

            for &target_nid in &targets {
                if target_nid == source_nid {
                    continue;
                }
                if !ctx.any_in_scope([&source_nid, &target_nid]) {
                    continue;
                }
                if ctx.ensure_note_node(provider, source_nid).is_none()
                    || ctx.ensure_note_node(provider, target_nid).is_none()
                {
                    continue;
                }
                let mut edge = GraphEdge::new(
                    NodeId::note(source_nid),
                    NodeId::note(target_nid),
                    Layer::Notes,
                );
                edge.meta = EdgeMeta {
                    label: label.clone(),
                    rule: Some(rule.target_tag.clone()),
                    ..EdgeMeta::default()
                };
                ctx.push_edge(edge);
            }
        }
    }
}

fn run_linked_fields(ctx: &mut BuildCtx<'_>, provider: &dyn NoteProvider) {
    if !ctx.layer_enabled(Layer::NoteLinks) {
        return;
    }
    let linked_types: Vec<(i64, String)> = ctx
        .cfg
        .note_types
        .iter()
        .filter_map(|(mid, nt)| {
            let mid = mid.parse::<i64>().ok()?;
            nt.linked_field.clone().map(|f| (mid, f))
        })
        .collect();

    for (mid, field) in linked_types {
        for source_nid in provider.find_notes(&NoteQuery::of_type(mid)) {
            let Some(note) = provider.get_note(source_nid) else {
                ctx.diag.skipped_notes += 1;
                continue;
            };
            if !ctx.note_eligible(&note) {
                continue;
            }
            let Some(raw) = note.field(&field) else {
                continue;
            };
            let (tokens, malformed) = text::parse_link_tokens(raw);
            ctx.diag.malformed_links += malformed;

            for token in tokens {
                let Some(target_nid) = resolve_token(provider, &token.target) else {
                    ctx.diag.malformed_links += 1;
                    continue;
                };
                if target_nid == source_nid {
                    continue; // self-reference rejected
                }
                if !ctx.any_in_scope([&source_nid, &target_nid]) {
                    continue;
                }
                if ctx.ensure_note_node(provider, source_nid).is_none()
                    || ctx.ensure_note_node(provider, target_nid).is_none()
                {
                    continue;
                }
                let mut edge = GraphEdge::new(
                    NodeId::note(source_nid),
                    NodeId::note(target_nid),
                    Layer::NoteLinks,
                );
                edge.manual = true;
                edge.meta = EdgeMeta {
                    label: Some(token.label.clone()).filter(|l| !l.is_empty()),
                    ..EdgeMeta::default()
                };
                // Duplicate targets within one note are silently absorbed by
                // the visible-edge dedup.
                ctx.push_edge(edge);
            }
        }
    }
}

/// A token is `nid<digits>`, `cid<digits>` (resolved through the card), or
/// bare digits treated as a note id.
fn resolve_token(provider: &dyn NoteProvider, token: &str) -> Option<i64> {
    if let Some(digits) = token.strip_prefix("nid") {
        let nid = digits.parse::<i64>().ok()?;
        provider.get_note(nid).map(|n| n.id)
    } else if let Some(digits) = token.strip_prefix("cid") {
        let cid = digits.parse::<i64>().ok()?;
        provider.get_card(cid).map(|c| c.nid)
    } else {
        let nid = token.parse::<i64>().ok()?;
        provider.get_note(nid).map(|n| n.id)
    }
}
