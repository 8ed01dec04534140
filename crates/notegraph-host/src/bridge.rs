//! The bridge: decodes inbound command strings, applies config mutations
//! with targeted invalidations, runs semantic note mutations against the
//! provider, and streams hook calls back to the UI. All invalidations are
//! debounced and coalesced; builds and slices run on the work queue and are
//! serialized by revision.

use notegraph_core::{
    hook_payload, Command, CtxAction, CtxPayload, DeltaSlice, GraphPayload, Hook, LogLevel, Msg,
    RenameApply, RenamePreview,
};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};

use crate::assemble::{self, build_graph};
use crate::config::{ConfigStore, Invalidate};
use crate::deptree;
use crate::provider::{ChangeEvent, EditorHost, NoteProvider};
use crate::rename;
use crate::slicer::slice_delta;
use crate::text;
use crate::workqueue::WorkQueue;

/// Frames arriving from a connected viewer.
#[derive(Debug)]
pub enum Inbound {
    Command(String),
    RequestGraph,
}

enum JobResult {
    Built { rev: u64, payload: GraphPayload },
    Sliced { rev: u64, slice: DeltaSlice },
    RenamePreviewed { result: RenamePreview },
    RenameApplied { result: RenameApply },
}

pub struct Bridge<P: NoteProvider + 'static> {
    store: ConfigStore,
    provider: Option<Arc<RwLock<P>>>,
    editor: Arc<dyn EditorHost>,
    queue: WorkQueue,
    outbound: mpsc::UnboundedSender<Msg>,
    results_tx: mpsc::UnboundedSender<JobResult>,
    results_rx: Option<mpsc::UnboundedReceiver<JobResult>>,

    last_build: GraphPayload,
    rev: u64,
    committed_full_rev: u64,
    sent_init: bool,

    pending_delta: Vec<i64>,
    delta_reason: String,
    delta_in_flight: bool,
    delta_deadline: Option<Instant>,
    refresh_deadline: Option<Instant>,
    refresh_reason: String,
}

impl<P: NoteProvider + 'static> Bridge<P> {
    pub fn new(
        store: ConfigStore,
        provider: Option<Arc<RwLock<P>>>,
        editor: Arc<dyn EditorHost>,
        outbound: mpsc::UnboundedSender<Msg>,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            store,
            provider,
            editor,
            queue: WorkQueue::spawn(),
            outbound,
            results_tx,
            results_rx: Some(results_rx),
            last_build: GraphPayload::default(),
            rev: 0,
            committed_full_rev: 0,
            sent_init: false,
            pending_delta: Vec::new(),
            delta_reason: String::new(),
            delta_in_flight: false,
            delta_deadline: None,
            refresh_deadline: None,
            refresh_reason: String::new(),
        }
    }

    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
        mut changes: mpsc::UnboundedReceiver<ChangeEvent>,
    ) {
        let mut results_rx = self.results_rx.take().expect("run called once");
        self.schedule_full_at("startup", Instant::now());

        loop {
            let deadline = match (self.delta_deadline, self.refresh_deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            let sleep_target = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                maybe = inbound.recv() => match maybe {
                    Some(ib) => self.handle_inbound(ib),
                    None => break, // window closed; timers die with us
                },
                Some(evt) = changes.recv() => self.handle_change(evt),
                Some(result) = results_rx.recv() => self.handle_result(result),
                _ = sleep_until(sleep_target), if deadline.is_some() => self.tick(),
            }
        }
    }

    // ---- inbound ----

    fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::RequestGraph => {
                self.sent_init = false;
                if self.committed_full_rev == 0 {
                    self.schedule_full_at("initial_request", Instant::now());
                } else {
                    self.emit(Hook::GraphInit, &self.last_build);
                    self.sent_init = true;
                }
            }
            Inbound::Command(line) => match Command::parse(&line) {
                Ok(cmd) => self.handle_command(cmd),
                Err(e) => tracing::warn!(line, error = %e, "unparsable bridge command"),
            },
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Refresh => self.schedule_full("refresh"),
            Command::Devtools => tracing::debug!("devtools requested"),
            Command::Log { level, text } => match level {
                LogLevel::Debug => tracing::debug!(target: "ui", "{text}"),
                LogLevel::Info => tracing::info!(target: "ui", "{text}"),
                LogLevel::Warn => tracing::warn!(target: "ui", "{text}"),
                LogLevel::Error => tracing::error!(target: "ui", "{text}"),
            },
            Command::Ctx(action) => self.handle_ctx(action),
            Command::DepTree { note_id } => {
                let tree = deptree::dep_tree(&self.last_build, note_id);
                self.emit(Hook::DepTree, &tree);
            }
            Command::EmbedEditor(cmd) => {
                // The mount lives in the viewer; the host only logs these.
                tracing::debug!(?cmd, "embed editor command");
            }
            other => match self.store.apply_command(&other) {
                Invalidate::None => {}
                Invalidate::Renderer | Invalidate::Solver => self.push_settings_update(),
                Invalidate::Assembler => self.schedule_full("config"),
            },
        }
    }

    /// Renderer/solver-only config change: re-send the live build with fresh
    /// meta so the viewer retunes without an assembler pass.
    fn push_settings_update(&mut self) {
        self.rev += 1;
        let diagnostics = self.last_build.meta.diagnostics.clone();
        self.last_build.meta = assemble::meta_for(self.store.get(), self.rev, diagnostics);
        self.committed_full_rev = self.rev;
        self.emit(Hook::GraphUpdate, &self.last_build);
    }

    // ---- context actions ----

    fn handle_ctx(&mut self, action: CtxAction) {
        match action {
            CtxAction::Preview { note_id } => {
                if let Some(card) = self.with_provider_read(|p| {
                    p.get_note(note_id).and_then(|n| n.cards.first().map(|c| c.id))
                }) {
                    self.editor.open_previewer(card);
                }
            }
            CtxAction::PreviewCard { card_id } => self.editor.open_previewer(card_id),
            CtxAction::Edit { note_id } | CtxAction::EditApi { note_id } => {
                self.editor.open_editor(note_id)
            }
            CtxAction::Browser { note_id } => self.editor.open_browser(&format!("nid:{note_id}")),
            CtxAction::BrowserNoteType { mid } => self.editor.open_browser(&format!("mid:{mid}")),
            CtxAction::BrowserTag { tag } => self.editor.open_browser(&format!("tag:{tag}")),
            CtxAction::Filter { query } => self.editor.open_browser(&query),
            CtxAction::FamilyEditPreview(p) => self.spawn_rename_preview(p),
            CtxAction::FamilyEditApply(p) => self.spawn_rename_apply(p),
            CtxAction::Connect(p) => self.note_connect(&p),
            CtxAction::Disconnect(p) => self.note_disconnect(&p),
            CtxAction::Link(p) | CtxAction::LinkActive(p) => self.note_link(&p, false),
            CtxAction::LinkBoth(p) => self.note_link(&p, true),
            CtxAction::Unlink(p) | CtxAction::UnlinkActive(p) => self.note_unlink(&p, false),
            CtxAction::UnlinkBoth(p) => self.note_unlink(&p, true),
        }
    }

    fn spawn_rename_preview(&mut self, p: CtxPayload) {
        let (Some(old_fid), Some(new_fid)) = (p.old_fid.clone(), p.new_fid.clone()) else {
            self.emit(
                Hook::FamilyEditPreview,
                &RenamePreview {
                    ok: false,
                    error: Some("missing family ids".to_string()),
                    ..RenamePreview::default()
                },
            );
            return;
        };
        let Some(provider) = self.provider.clone() else {
            return;
        };
        let cfg = self.store.get().clone();
        let tx = self.results_tx.clone();
        self.queue.submit(move || {
            let Ok(guard) = provider.read() else {
                return;
            };
            let result = rename::preview(&*guard, &cfg, &old_fid, &new_fid);
            let _ = tx.send(JobResult::RenamePreviewed { result });
        });
    }

    fn spawn_rename_apply(&mut self, p: CtxPayload) {
        let (Some(old_fid), Some(new_fid)) = (p.old_fid.clone(), p.new_fid.clone()) else {
            self.emit(
                Hook::FamilyEditApply,
                &RenameApply {
                    ok: false,
                    error: Some("missing family ids".to_string()),
                    ..RenameApply::default()
                },
            );
            return;
        };
        let Some(provider) = self.provider.clone() else {
            return;
        };
        let cfg = self.store.get().clone();
        let tx = self.results_tx.clone();
        self.queue.submit(move || {
            let Ok(mut guard) = provider.write() else {
                return;
            };
            let result = rename::apply(&mut *guard, &cfg, &old_fid, &new_fid);
            let _ = tx.send(JobResult::RenameApplied { result });
        });
    }

    /// Add the source note to the target's families (or an explicit list).
    fn note_connect(&mut self, p: &CtxPayload) {
        let (Some(source), Some(target)) = (p.source, p.target) else {
            return;
        };
        let gate = self.store.get().family_gate.clone();
        self.with_provider_write(|prov| {
            let Some(target_note) = prov.get_note(target) else {
                return;
            };
            let (target_pairs, _) = target_note
                .field(&gate.field)
                .map(|raw| text::parse_family_field(raw, &gate.separator, gate.default_priority))
                .unwrap_or_default();

            let families: Vec<String> = match &p.families {
                Some(explicit) if !explicit.is_empty() => explicit
                    .iter()
                    .map(|f| text::normalize_family_id(f))
                    .collect(),
                _ => target_pairs.iter().map(|(fid, _)| fid.clone()).collect(),
            };
            if families.is_empty() {
                tracing::warn!(source, target, "connect: target has no families");
                return;
            }

            let Some(source_note) = prov.get_note(source) else {
                return;
            };
            let (mut pairs, _) = source_note
                .field(&gate.field)
                .map(|raw| text::parse_family_field(raw, &gate.separator, gate.default_priority))
                .unwrap_or_default();

            for fid in families {
                if pairs.iter().any(|(existing, _)| *existing == fid) {
                    continue;
                }
                let target_prio = target_pairs
                    .iter()
                    .find(|(f, _)| *f == fid)
                    .map(|(_, prio)| *prio);
                let prio = match (p.prio_mode.as_deref(), target_prio) {
                    (Some("same"), Some(tp)) => tp,
                    (Some("below"), Some(tp)) => tp + 1,
                    _ => gate.default_priority,
                };
                pairs.push((fid, prio));
            }

            let value = text::serialize_family_field(&pairs, &gate.separator);
            if prov.set_field(source, &gate.field, &value).is_ok() {
                let _ = prov.flush(source);
            }
        });
    }

    /// Remove families (explicit list, or everything shared with the target)
    /// from the source note.
    fn note_disconnect(&mut self, p: &CtxPayload) {
        let Some(source) = p.source else {
            return;
        };
        let target = p.target;
        let gate = self.store.get().family_gate.clone();
        self.with_provider_write(|prov| {
            let Some(source_note) = prov.get_note(source) else {
                return;
            };
            let (pairs, _) = source_note
                .field(&gate.field)
                .map(|raw| text::parse_family_field(raw, &gate.separator, gate.default_priority))
                .unwrap_or_default();

            let drop: Vec<String> = match &p.families {
                Some(explicit) if !explicit.is_empty() => explicit
                    .iter()
                    .map(|f| text::normalize_family_id(f))
                    .collect(),
                _ => match target.and_then(|t| prov.get_note(t)) {
                    Some(target_note) => {
                        let (target_pairs, _) = target_note
                            .field(&gate.field)
                            .map(|raw| {
                                text::parse_family_field(
                                    raw,
                                    &gate.separator,
                                    gate.default_priority,
                                )
                            })
                            .unwrap_or_default();
                        target_pairs.into_iter().map(|(fid, _)| fid).collect()
                    }
                    None => Vec::new(),
                },
            };
            if drop.is_empty() {
                return;
            }

            let kept: Vec<(String, i64)> = pairs
                .into_iter()
                .filter(|(fid, _)| !drop.contains(fid))
                .collect();
            let value = text::serialize_family_field(&kept, &gate.separator);
            if prov.set_field(source, &gate.field, &value).is_ok() {
                let _ = prov.flush(source);
            }
        });
    }

    fn note_link(&mut self, p: &CtxPayload, both: bool) {
        let (Some(source), Some(target)) = (p.source, p.target) else {
            return;
        };
        self.write_link(source, target, p.label.clone().or_else(|| p.target_label.clone()));
        if both {
            self.write_link(target, source, p.source_label.clone());
        }
    }

    fn write_link(&mut self, source: i64, target: i64, label: Option<String>) {
        if source == target {
            return;
        }
        let cfg = self.store.get().clone();
        self.with_provider_write(|prov| {
            let Some(note) = prov.get_note(source) else {
                return;
            };
            let Some(field) = cfg.note_type(note.mid).linked_field else {
                tracing::warn!(source, "link: note type has no linked field");
                return;
            };
            let current = note.field(&field).unwrap_or("").to_string();
            let (tokens, _) = text::parse_link_tokens(&current);
            if tokens
                .iter()
                .any(|t| t.target == format!("nid{target}") || t.target == target.to_string())
            {
                return; // already linked
            }
            let label = label
                .filter(|l| !l.is_empty())
                .or_else(|| prov.get_note(target).map(|n| {
                    n.fields
                        .first()
                        .map(|(_, v)| text::collapse_ws(&text::strip_html(v)))
                        .unwrap_or_default()
                }))
                .unwrap_or_else(|| target.to_string());
            let token = format!("[{label}|nid{target}]");
            let value = if current.trim().is_empty() {
                token
            } else {
                format!("{current} {token}")
            };
            if prov.set_field(source, &field, &value).is_ok() {
                let _ = prov.flush(source);
            }
        });
    }

    fn note_unlink(&mut self, p: &CtxPayload, both: bool) {
        let (Some(source), Some(target)) = (p.source, p.target) else {
            return;
        };
        self.erase_link(source, target);
        if both {
            self.erase_link(target, source);
        }
    }

    fn erase_link(&mut self, source: i64, target: i64) {
        let cfg = self.store.get().clone();
        self.with_provider_write(|prov| {
            let Some(note) = prov.get_note(source) else {
                return;
            };
            let Some(field) = cfg.note_type(note.mid).linked_field else {
                return;
            };
            let current = note.field(&field).unwrap_or("").to_string();
            let (tokens, _) = text::parse_link_tokens(&current);
            let mut value = current.clone();
            for token in tokens {
                if token.target == format!("nid{target}") || token.target == target.to_string() {
                    // Raw token text as it appeared; label may carry HTML, so
                    // rebuild from the bracket scan instead of the label.
                    value = remove_token(&value, &token.target);
                }
            }
            if value != current {
                let value = text::collapse_ws(&value);
                if prov.set_field(source, &field, &value).is_ok() {
                    let _ = prov.flush(source);
                }
            }
        });
    }

    // ---- change events & timers ----

    fn handle_change(&mut self, evt: ChangeEvent) {
        if evt.notetype || evt.deck {
            self.schedule_full("store_change");
            return;
        }
        for nid in evt.notes {
            if !self.pending_delta.contains(&nid) {
                self.pending_delta.push(nid);
            }
        }
        self.delta_reason = if evt.tag { "tag" } else { "note_text" }.to_string();
        let debounce = self.store.get().engine_val("delta_debounce_ms") as u64;
        self.delta_deadline = Some(Instant::now() + Duration::from_millis(debounce));
    }

    fn schedule_full(&mut self, reason: &str) {
        let debounce = self.store.get().engine_val("refresh_debounce_ms") as u64;
        self.schedule_full_at(reason, Instant::now() + Duration::from_millis(debounce));
    }

    fn schedule_full_at(&mut self, reason: &str, at: Instant) {
        self.refresh_reason = reason.to_string();
        self.refresh_deadline = Some(at);
        // A full build supersedes any pending delta.
        self.delta_deadline = None;
        self.pending_delta.clear();
    }

    fn tick(&mut self) {
        let now = Instant::now();
        if self.refresh_deadline.is_some_and(|d| d <= now) {
            self.refresh_deadline = None;
            self.fire_full();
        }
        if self.delta_deadline.is_some_and(|d| d <= now) {
            self.delta_deadline = None;
            self.fire_delta();
        }
    }

    fn fire_full(&mut self) {
        self.rev += 1;
        let rev = self.rev;
        let cfg = self.store.get().clone();
        let tx = self.results_tx.clone();
        let reason = self.refresh_reason.clone();
        match self.provider.clone() {
            Some(provider) => self.queue.submit(move || {
                let Ok(guard) = provider.read() else {
                    return;
                };
                tracing::info!(rev, reason = %reason, "full graph build");
                let payload = build_graph(Some(&*guard), &cfg, rev);
                let _ = tx.send(JobResult::Built { rev, payload });
            }),
            None => self.queue.submit(move || {
                let payload = build_graph(None, &cfg, rev);
                let _ = tx.send(JobResult::Built { rev, payload });
            }),
        }
    }

    fn fire_delta(&mut self) {
        if self.delta_in_flight || self.pending_delta.is_empty() {
            return;
        }
        let Some(provider) = self.provider.clone() else {
            return;
        };
        self.rev += 1;
        let rev = self.rev;
        let changed = std::mem::take(&mut self.pending_delta);
        let reason = self.delta_reason.clone();
        let cfg = self.store.get().clone();
        let prev = self.last_build.clone();
        let tx = self.results_tx.clone();
        self.delta_in_flight = true;
        self.queue.submit(move || {
            let Ok(guard) = provider.read() else {
                return;
            };
            let slice = slice_delta(&*guard, &cfg, &prev, &changed, &reason, rev);
            let _ = tx.send(JobResult::Sliced { rev, slice });
        });
    }

    fn handle_result(&mut self, result: JobResult) {
        match result {
            JobResult::Built { rev, payload } => {
                if rev < self.committed_full_rev {
                    tracing::debug!(rev, "discarding stale full build");
                    return;
                }
                let missing = payload.meta.error.is_some();
                self.committed_full_rev = rev;
                self.last_build = payload;
                if self.sent_init {
                    self.emit(Hook::GraphUpdate, &self.last_build);
                } else {
                    self.emit(Hook::GraphInit, &self.last_build);
                    self.sent_init = true;
                }
                if missing {
                    // Provider unavailable: retry later.
                    self.schedule_full_at("deferred_retry", Instant::now() + Duration::from_secs(2));
                }
            }
            JobResult::Sliced { rev, slice } => {
                self.delta_in_flight = false;
                if rev < self.committed_full_rev {
                    tracing::debug!(rev, "discarding stale delta");
                } else {
                    self.last_build.apply_slice(&slice);
                    self.emit(Hook::GraphDelta, &slice);
                }
                if !self.pending_delta.is_empty() {
                    // Notes accumulated while the slice was in flight.
                    let debounce = self.store.get().engine_val("delta_debounce_ms") as u64;
                    self.delta_deadline =
                        Some(Instant::now() + Duration::from_millis(debounce));
                }
            }
            JobResult::RenamePreviewed { result } => {
                self.emit(Hook::FamilyEditPreview, &result);
            }
            JobResult::RenameApplied { result } => {
                let cap = self.store.get().engine_val("bulk_delta_cap") as usize;
                let ok = result.ok;
                let nids = result.changed_nids.clone();
                self.emit(Hook::FamilyEditApply, &result);
                if ok && !nids.is_empty() {
                    if nids.len() <= cap {
                        self.pending_delta.extend(nids);
                        self.delta_reason = "bulk_rename".to_string();
                        let debounce = self.store.get().engine_val("delta_debounce_ms") as u64;
                        self.delta_deadline =
                            Some(Instant::now() + Duration::from_millis(debounce));
                    } else {
                        self.schedule_full("bulk_rename");
                    }
                }
            }
        }
    }

    // ---- plumbing ----

    fn with_provider_read<T>(&self, f: impl FnOnce(&P) -> Option<T>) -> Option<T> {
        let provider = self.provider.as_ref()?;
        let guard = provider.read().ok()?;
        f(&guard)
    }

    fn with_provider_write(&mut self, f: impl FnOnce(&mut P)) {
        let Some(provider) = self.provider.as_ref() else {
            return;
        };
        let Ok(mut guard) = provider.write() else {
            return;
        };
        f(&mut guard);
    }

    fn emit<T: Serialize>(&self, hook: Hook, payload: &T) {
        match hook_payload(payload) {
            Ok(encoded) => {
                let _ = self.outbound.send(Msg::Hook {
                    hook,
                    payload: encoded,
                });
            }
            Err(e) => tracing::error!(hook = hook.as_str(), error = %e, "hook payload encode"),
        }
    }
}

/// Remove the bracket token whose target matches, wherever it sits in the
/// field text.
fn remove_token(value: &str, target: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('[') {
        let Some(end_rel) = rest[start..].find(']') else {
            break;
        };
        let end = start + end_rel;
        let inner = &rest[start + 1..end];
        let is_match = inner
            .split_once('|')
            .map(|(_, t)| t.trim() == target)
            .unwrap_or(false);
        if is_match {
            out.push_str(&rest[..start]);
        } else {
            out.push_str(&rest[..=end]);
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::testutil::VOCAB_MID;
    use crate::config::NoteTypeSettings;
    use crate::provider::fixtures::{note, note_type};
    use crate::provider::MemProvider;
    use tempfile::tempdir;
    use tokio::time::timeout;

    fn fast_cfg_store(dir: &std::path::Path) -> ConfigStore {
        let mut store = ConfigStore::load(dir.join("graph_config.json"));
        store.update(|cfg| {
            cfg.family_gate.note_types = vec![VOCAB_MID];
            cfg.engine.insert("refresh_debounce_ms".to_string(), 1.0);
            cfg.engine.insert("delta_debounce_ms".to_string(), 1.0);
            cfg.note_types.insert(
                VOCAB_MID.to_string(),
                NoteTypeSettings {
                    label_field: "Expression".to_string(),
                    linked_field: Some("Links".to_string()),
                    ..Default::default()
                },
            );
        });
        store
    }

    fn seeded_provider() -> MemProvider {
        MemProvider::new(
            vec![note_type(VOCAB_MID, "Vocab", &["Expression", "Families", "Links"])],
            vec![
                note(
                    1,
                    VOCAB_MID,
                    "d",
                    &[("Expression", "w1"), ("Families", "家@0"), ("Links", "")],
                ),
                note(
                    2,
                    VOCAB_MID,
                    "d",
                    &[("Expression", "w2"), ("Families", "家@1"), ("Links", "")],
                ),
            ],
        )
    }

    async fn recv_hook(
        rx: &mut mpsc::UnboundedReceiver<Msg>,
        want: Hook,
    ) -> serde_json::Value {
        loop {
            let msg = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("hook timeout")
                .expect("channel open");
            if let Msg::Hook { hook, payload } = msg {
                if hook == want {
                    return serde_json::from_str(&payload).expect("hook payload json");
                }
            }
        }
    }

    struct Harness {
        inbound: mpsc::UnboundedSender<Inbound>,
        outbound: mpsc::UnboundedReceiver<Msg>,
        provider: Arc<RwLock<MemProvider>>,
        _dir: tempfile::TempDir,
    }

    fn start_bridge() -> Harness {
        let dir = tempdir().expect("tempdir");
        let store = fast_cfg_store(dir.path());
        let mut provider = seeded_provider();
        let changes = provider.subscribe();
        let provider = Arc::new(RwLock::new(provider));

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let bridge = Bridge::new(
            store,
            Some(provider.clone()),
            Arc::new(crate::provider::LogEditorHost),
            out_tx,
        );
        tokio::spawn(bridge.run(in_rx, changes));
        Harness {
            inbound: in_tx,
            outbound: out_rx,
            provider,
            _dir: dir,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn startup_emits_graph_init() {
        let mut h = start_bridge();
        let init = recv_hook(&mut h.outbound, Hook::GraphInit).await;
        let nodes = init["nodes"].as_array().unwrap();
        assert!(nodes.iter().any(|n| n["id"] == "family:家"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn renderer_config_command_reemits_update_without_rebuild() {
        let mut h = start_bridge();
        recv_hook(&mut h.outbound, Hook::GraphInit).await;
        h.inbound
            .send(Inbound::Command("lcol:priority:#123456".to_string()))
            .unwrap();
        let update = recv_hook(&mut h.outbound, Hook::GraphUpdate).await;
        assert_eq!(
            update["meta"]["layer_settings"]["priority"]["color"],
            "#123456"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn link_command_writes_provider_and_streams_delta() {
        let mut h = start_bridge();
        recv_hook(&mut h.outbound, Hook::GraphInit).await;

        let payload = urlencoding::encode(r#"{"source":1,"target":2,"label":"pair"}"#).into_owned();
        h.inbound
            .send(Inbound::Command(format!("ctx:link:{payload}")))
            .unwrap();

        let delta = recv_hook(&mut h.outbound, Hook::GraphDelta).await;
        let edges = delta["edges_raw"].as_array().unwrap();
        assert!(edges
            .iter()
            .any(|e| e["layer"] == "note_links" && e["source"] == "1" && e["target"] == "2"));

        let guard = h.provider.read().unwrap();
        assert_eq!(
            guard.get_note(1).unwrap().field("Links"),
            Some("[pair|nid2]")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rename_preview_and_apply_round_trip() {
        let mut h = start_bridge();
        recv_hook(&mut h.outbound, Hook::GraphInit).await;

        let preview =
            urlencoding::encode(r#"{"old_fid":"家","new_fid":"新"}"#).into_owned();
        h.inbound
            .send(Inbound::Command(format!("ctx:famedit_preview:{preview}")))
            .unwrap();
        let result = recv_hook(&mut h.outbound, Hook::FamilyEditPreview).await;
        assert_eq!(result["ok"], true);
        assert_eq!(result["affected_notes"], 2);
        assert_eq!(result["changed_notes"], 0);

        let apply = urlencoding::encode(r#"{"old_fid":"家","new_fid":"新"}"#).into_owned();
        h.inbound
            .send(Inbound::Command(format!("ctx:famedit_apply:{apply}")))
            .unwrap();
        let result = recv_hook(&mut h.outbound, Hook::FamilyEditApply).await;
        assert_eq!(result["ok"], true);
        assert_eq!(result["changed_notes"], 2);

        let delta = recv_hook(&mut h.outbound, Hook::GraphDelta).await;
        let nodes = delta["nodes_raw"].as_array().unwrap();
        assert!(nodes.iter().any(|n| n["id"] == "family:新"));
        assert!(delta["removed_nodes"]
            .as_array()
            .unwrap()
            .iter()
            .any(|id| id == "family:家"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unlink_removes_previous_token() {
        let mut h = start_bridge();
        recv_hook(&mut h.outbound, Hook::GraphInit).await;

        let link = urlencoding::encode(r#"{"source":1,"target":2}"#).into_owned();
        h.inbound
            .send(Inbound::Command(format!("ctx:link:{link}")))
            .unwrap();
        recv_hook(&mut h.outbound, Hook::GraphDelta).await;

        let unlink = urlencoding::encode(r#"{"source":1,"target":2}"#).into_owned();
        h.inbound
            .send(Inbound::Command(format!("ctx:unlink:{unlink}")))
            .unwrap();
        let delta = recv_hook(&mut h.outbound, Hook::GraphDelta).await;
        assert!(delta["removed_edges"]
            .as_array()
            .unwrap()
            .iter()
            .any(|k| k["layer"] == "note_links"));

        let guard = h.provider.read().unwrap();
        assert_eq!(guard.get_note(1).unwrap().field("Links"), Some(""));
    }

    #[test]
    fn remove_token_strips_only_matching_targets() {
        let value = "see [a|nid2] and [b|nid3]";
        assert_eq!(remove_token(value, "nid2"), "see  and [b|nid3]");
        assert_eq!(remove_token(value, "nid9"), value);
    }
}
