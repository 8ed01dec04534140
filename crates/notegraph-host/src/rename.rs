//! Bulk family-id rename with preview → apply semantics. Preview is a
//! scan-only summary; apply rewrites the family field note by note,
//! preserving per-member priorities. The provider's write model is per-note,
//! so a mid-run failure commits nothing beyond the notes already flushed.

use notegraph_core::{RenameApply, RenamePreview};

use crate::config::GraphConfig;
use crate::provider::{NoteProvider, NoteQuery};
use crate::text;

struct Scan {
    scanned: u32,
    collisions: u32,
    /// (nid, rewritten field value) for every note carrying the old id.
    rewrites: Vec<(i64, String)>,
}

fn scan(provider: &dyn NoteProvider, cfg: &GraphConfig, old_fid: &str, new_fid: &str) -> Scan {
    let gate = &cfg.family_gate;
    let mut scan = Scan {
        scanned: 0,
        collisions: 0,
        rewrites: Vec::new(),
    };

    for mid in &gate.note_types {
        for nid in provider.find_notes(&NoteQuery::of_type(*mid)) {
            let Some(note) = provider.get_note(nid) else {
                continue;
            };
            let Some(raw) = note.field(&gate.field) else {
                continue;
            };
            scan.scanned += 1;
            let (pairs, _) =
                text::parse_family_field(raw, &gate.separator, gate.default_priority);
            if pairs.iter().any(|(fid, _)| fid == new_fid) {
                scan.collisions += 1;
            }
            if !pairs.iter().any(|(fid, _)| fid == old_fid) {
                continue;
            }

            let mut rewritten: Vec<(String, i64)> = Vec::new();
            for (fid, prio) in pairs {
                let fid = if fid == old_fid {
                    new_fid.to_string()
                } else {
                    fid
                };
                // A note carrying both ids keeps the first occurrence.
                if !rewritten.iter().any(|(existing, _)| *existing == fid) {
                    rewritten.push((fid, prio));
                }
            }
            scan.rewrites
                .push((nid, text::serialize_family_field(&rewritten, &gate.separator)));
        }
    }
    scan
}

pub fn preview(
    provider: &dyn NoteProvider,
    cfg: &GraphConfig,
    old_fid: &str,
    new_fid: &str,
) -> RenamePreview {
    let old_fid = text::normalize_family_id(old_fid);
    let new_fid = text::normalize_family_id(new_fid);
    if old_fid.is_empty() || new_fid.is_empty() || old_fid == new_fid {
        return RenamePreview {
            ok: false,
            error: Some("family ids must be distinct and non-empty".to_string()),
            ..RenamePreview::default()
        };
    }
    let scan = scan(provider, cfg, &old_fid, &new_fid);
    RenamePreview {
        ok: true,
        scanned_notes: scan.scanned,
        affected_notes: scan.rewrites.len() as u32,
        collisions: scan.collisions,
        changed_notes: 0,
        error: None,
    }
}

pub fn apply(
    provider: &mut dyn NoteProvider,
    cfg: &GraphConfig,
    old_fid: &str,
    new_fid: &str,
) -> RenameApply {
    let old_fid = text::normalize_family_id(old_fid);
    let new_fid = text::normalize_family_id(new_fid);
    if old_fid.is_empty() || new_fid.is_empty() || old_fid == new_fid {
        return RenameApply {
            ok: false,
            error: Some("family ids must be distinct and non-empty".to_string()),
            ..RenameApply::default()
        };
    }

    let field = cfg.family_gate.field.clone();
    let rewrites = scan(provider, cfg, &old_fid, &new_fid).rewrites;

    let mut changed_nids = Vec::with_capacity(rewrites.len());
    for (nid, value) in rewrites {
        let result = match provider.set_field(nid, &field, &value) {
            Ok(()) => provider.flush(nid),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => changed_nids.push(nid),
            Err(e) => {
                tracing::warn!(nid, error = %e, "family rename aborted mid-run");
                return RenameApply {
                    ok: false,
                    changed_notes: changed_nids.len() as u32,
                    changed_nids,
                    error: Some(e.to_string()),
                };
            }
        }
    }

    RenameApply {
        ok: true,
        changed_notes: changed_nids.len() as u32,
        changed_nids,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::testutil::VOCAB_MID;
    use crate::config::GraphConfig;
    use crate::provider::fixtures::{note, note_type};
    use crate::provider::MemProvider;

    fn cfg() -> GraphConfig {
        let mut cfg = GraphConfig::default();
        cfg.family_gate.note_types = vec![VOCAB_MID];
        cfg.normalize();
        cfg
    }

    fn provider() -> MemProvider {
        MemProvider::new(
            vec![note_type(VOCAB_MID, "Vocab", &["Expression", "Families"])],
            vec![
                note(1, VOCAB_MID, "d", &[("Expression", "w1"), ("Families", "old@0")]),
                note(2, VOCAB_MID, "d", &[("Expression", "w2"), ("Families", "old@1")]),
                note(3, VOCAB_MID, "d", &[("Expression", "w3"), ("Families", "new@2")]),
            ],
        )
    }

    #[test]
    fn preview_reports_counts_without_committing() {
        let p = provider();
        let result = preview(&p, &cfg(), "old", "new");
        assert!(result.ok);
        assert_eq!(result.scanned_notes, 3);
        assert_eq!(result.affected_notes, 2);
        assert_eq!(result.collisions, 1);
        assert_eq!(result.changed_notes, 0);
        // Untouched.
        assert_eq!(p.get_note(1).unwrap().field("Families"), Some("old@0"));
    }

    #[test]
    fn apply_rewrites_preserving_priorities() {
        let mut p = provider();
        let result = apply(&mut p, &cfg(), "old", "new");
        assert!(result.ok);
        assert_eq!(result.changed_notes, 2);
        assert_eq!(result.changed_nids, vec![1, 2]);
        assert_eq!(p.get_note(1).unwrap().field("Families"), Some("new@0"));
        assert_eq!(p.get_note(2).unwrap().field("Families"), Some("new@1"));
        assert_eq!(p.get_note(3).unwrap().field("Families"), Some("new@2"));
    }

    #[test]
    fn note_carrying_both_ids_keeps_one_membership() {
        let mut p = MemProvider::new(
            vec![note_type(VOCAB_MID, "Vocab", &["Expression", "Families"])],
            vec![note(
                1,
                VOCAB_MID,
                "d",
                &[("Expression", "w"), ("Families", "old@3;new@5")],
            )],
        );
        let result = apply(&mut p, &cfg(), "old", "new");
        assert!(result.ok);
        assert_eq!(p.get_note(1).unwrap().field("Families"), Some("new@3"));
    }

    #[test]
    fn identical_ids_are_refused() {
        let p = provider();
        let result = preview(&p, &cfg(), "same", "same");
        assert!(!result.ok);
        assert!(result.error.is_some());
    }
}
