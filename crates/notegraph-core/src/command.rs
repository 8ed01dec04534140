//! Inbound UI→host command codec. Commands travel as short strings of the
//! form `kind[:subkind]:payload`; payloads are either tiny ad-hoc encodings
//! (`mid:field`, decimal ids) or URL-encoded JSON blobs for complex actions.

use crate::{EdgeStyle, Layer, NeighborScale};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command kind `{0}`")]
    UnknownKind(String),
    #[error("unknown layer `{0}`")]
    UnknownLayer(String),
    #[error("malformed `{kind}` payload: {detail}")]
    BadPayload { kind: &'static str, detail: String },
}

fn bad(kind: &'static str, detail: impl Into<String>) -> CommandError {
    CommandError::BadPayload {
        kind,
        detail: detail.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    // Unknown levels degrade to info; log lines must never fail the bridge.
    fn from_wire(s: &str) -> LogLevel {
        match s {
            "debug" => LogLevel::Debug,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardDotState {
    Suspended,
    Buried,
}

impl CardDotState {
    pub fn as_str(self) -> &'static str {
        match self {
            CardDotState::Suspended => "suspended",
            CardDotState::Buried => "buried",
        }
    }
}

/// Operand record for context actions; every field is optional and only the
/// fields a given action needs are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CtxPayload {
    pub source: Option<i64>,
    pub target: Option<i64>,
    pub source_kind: Option<String>,
    pub source_label: Option<String>,
    pub target_label: Option<String>,
    pub families: Option<Vec<String>>,
    pub prio_mode: Option<String>,
    pub label: Option<String>,
    pub old_fid: Option<String>,
    pub new_fid: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CtxAction {
    Preview { note_id: i64 },
    PreviewCard { card_id: i64 },
    Edit { note_id: i64 },
    EditApi { note_id: i64 },
    Browser { note_id: i64 },
    BrowserNoteType { mid: i64 },
    BrowserTag { tag: String },
    Filter { query: String },
    FamilyEditPreview(CtxPayload),
    FamilyEditApply(CtxPayload),
    Connect(CtxPayload),
    Disconnect(CtxPayload),
    Link(CtxPayload),
    LinkActive(CtxPayload),
    LinkBoth(CtxPayload),
    Unlink(CtxPayload),
    UnlinkActive(CtxPayload),
    UnlinkBoth(CtxPayload),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmbedEditorCmd {
    Rect { x: f32, y: f32, w: f32, h: f32 },
    Open,
    Toggle,
    Select { note_id: i64 },
    Close,
    Devtools,
    CssReload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    Devtools,
    Log { level: LogLevel, text: String },

    LayerColor { layer: Layer, color: String },
    LayerEnabled { layer: Layer, on: bool },
    LayerStyle { layer: Layer, style: EdgeStyle },
    LayerFlow { layer: Layer, on: bool },
    LayerStrength { layer: Layer, value: f32 },
    LayerWeight { layer: Layer, value: f32 },
    LayerDistance { layer: Layer, value: f32 },

    SolverParam { key: String, value: f64 },
    RendererParam { key: String, value: f64 },
    EngineParam { key: String, value: f64 },
    NodeParam { key: String, value: f64 },

    NoteTypeVisible { mid: i64, on: bool },
    NoteTypeLabelField { mid: i64, field: String },
    NoteTypeLinkedField { mid: i64, field: String },
    NoteTypeTooltipFields { mid: i64, fields: Vec<String> },
    NoteTypeColor { mid: i64, color: String },

    RefAuto { value: f32 },
    RefDamp { on: bool },
    LinkMst { on: bool },
    HubDamp { on: bool },
    KanjiComponents { on: bool },
    KanjiTfidf { on: bool },
    KanjiTopKEnabled { on: bool },
    KanjiTopK { k: u32 },
    KanjiNorm { on: bool },
    ShowUnlinked { on: bool },
    SamePrioEdges { on: bool },
    SamePrioOpacity { value: f32 },
    FamilyChain { on: bool },
    CardDotEnabled { on: bool },
    CardDotColor { state: CardDotState, color: String },
    Decks { decks: Vec<String> },
    GroupHubs { hubs: Vec<String> },
    NeighborScaleCfg { scale: NeighborScale },

    Ctx(CtxAction),
    DepTree { note_id: i64 },
    EmbedEditor(EmbedEditorCmd),
}

fn parse_on(kind: &'static str, s: &str) -> Result<bool, CommandError> {
    match s {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(bad(kind, format!("expected 0|1, got `{other}`"))),
    }
}

fn parse_layer(s: &str) -> Result<Layer, CommandError> {
    Layer::from_wire(s).ok_or_else(|| CommandError::UnknownLayer(s.to_string()))
}

fn parse_f32(kind: &'static str, s: &str) -> Result<f32, CommandError> {
    s.parse::<f32>().map_err(|e| bad(kind, e.to_string()))
}

fn parse_f64(kind: &'static str, s: &str) -> Result<f64, CommandError> {
    s.parse::<f64>().map_err(|e| bad(kind, e.to_string()))
}

fn parse_i64(kind: &'static str, s: &str) -> Result<i64, CommandError> {
    s.parse::<i64>().map_err(|e| bad(kind, e.to_string()))
}

fn url_decode(kind: &'static str, s: &str) -> Result<String, CommandError> {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .map_err(|e| bad(kind, e.to_string()))
}

fn decode_json<T: for<'de> Deserialize<'de>>(
    kind: &'static str,
    s: &str,
) -> Result<T, CommandError> {
    let raw = url_decode(kind, s)?;
    serde_json::from_str(&raw).map_err(|e| bad(kind, e.to_string()))
}

fn split2(kind: &'static str, rest: &str) -> Result<(String, String), CommandError> {
    rest.split_once(':')
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .ok_or_else(|| bad(kind, "missing `:` separator"))
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        let (kind, rest) = match line.split_once(':') {
            Some((k, r)) => (k, Some(r)),
            None => (line, None),
        };
        let need = |k: &'static str| rest.ok_or_else(|| bad(k, "missing payload"));

        match kind {
            "refresh" => Ok(Command::Refresh),
            "devtools" => Ok(Command::Devtools),
            "log" => {
                let (level, text) = split2("log", need("log")?)?;
                Ok(Command::Log {
                    level: LogLevel::from_wire(&level),
                    text,
                })
            }

            "lcol" => {
                let (layer, color) = split2("lcol", need("lcol")?)?;
                Ok(Command::LayerColor {
                    layer: parse_layer(&layer)?,
                    color,
                })
            }
            "lenabled" => {
                let (layer, v) = split2("lenabled", need("lenabled")?)?;
                Ok(Command::LayerEnabled {
                    layer: parse_layer(&layer)?,
                    on: parse_on("lenabled", &v)?,
                })
            }
            "lstyle" => {
                let (layer, v) = split2("lstyle", need("lstyle")?)?;
                let style = EdgeStyle::from_wire(&v)
                    .ok_or_else(|| bad("lstyle", format!("unknown style `{v}`")))?;
                Ok(Command::LayerStyle {
                    layer: parse_layer(&layer)?,
                    style,
                })
            }
            "lflow" => {
                let (layer, v) = split2("lflow", need("lflow")?)?;
                Ok(Command::LayerFlow {
                    layer: parse_layer(&layer)?,
                    on: parse_on("lflow", &v)?,
                })
            }
            "lstrength" => {
                let (layer, v) = split2("lstrength", need("lstrength")?)?;
                Ok(Command::LayerStrength {
                    layer: parse_layer(&layer)?,
                    value: parse_f32("lstrength", &v)?,
                })
            }
            "lweight" => {
                let (layer, v) = split2("lweight", need("lweight")?)?;
                Ok(Command::LayerWeight {
                    layer: parse_layer(&layer)?,
                    value: parse_f32("lweight", &v)?,
                })
            }
            "ldistance" => {
                let (layer, v) = split2("ldistance", need("ldistance")?)?;
                Ok(Command::LayerDistance {
                    layer: parse_layer(&layer)?,
                    value: parse_f32("ldistance", &v)?,
                })
            }

            "solver" | "renderer" | "engine" | "node" => {
                let k: &'static str = match kind {
                    "solver" => "solver",
                    "renderer" => "renderer",
                    "engine" => "engine",
                    _ => "node",
                };
                let (key, v) = split2(k, need(k)?)?;
                let value = parse_f64(k, &v)?;
                Ok(match kind {
                    "solver" => Command::SolverParam { key, value },
                    "renderer" => Command::RendererParam { key, value },
                    "engine" => Command::EngineParam { key, value },
                    _ => Command::NodeParam { key, value },
                })
            }

            "ntvis" => {
                let (mid, v) = split2("ntvis", need("ntvis")?)?;
                Ok(Command::NoteTypeVisible {
                    mid: parse_i64("ntvis", &mid)?,
                    on: parse_on("ntvis", &v)?,
                })
            }
            "label" => {
                let (mid, v) = split2("label", need("label")?)?;
                Ok(Command::NoteTypeLabelField {
                    mid: parse_i64("label", &mid)?,
                    field: url_decode("label", &v)?,
                })
            }
            "lnfield" => {
                let (mid, v) = split2("lnfield", need("lnfield")?)?;
                Ok(Command::NoteTypeLinkedField {
                    mid: parse_i64("lnfield", &mid)?,
                    field: url_decode("lnfield", &v)?,
                })
            }
            "nttip" => {
                let (mid, v) = split2("nttip", need("nttip")?)?;
                Ok(Command::NoteTypeTooltipFields {
                    mid: parse_i64("nttip", &mid)?,
                    fields: decode_json("nttip", &v)?,
                })
            }
            "color" => {
                let (mid, v) = split2("color", need("color")?)?;
                Ok(Command::NoteTypeColor {
                    mid: parse_i64("color", &mid)?,
                    color: url_decode("color", &v)?,
                })
            }

            "refauto" => Ok(Command::RefAuto {
                value: parse_f32("refauto", need("refauto")?)?,
            }),
            "refdamp" => Ok(Command::RefDamp {
                on: parse_on("refdamp", need("refdamp")?)?,
            }),
            "linkmst" => Ok(Command::LinkMst {
                on: parse_on("linkmst", need("linkmst")?)?,
            }),
            "hubdamp" => Ok(Command::HubDamp {
                on: parse_on("hubdamp", need("hubdamp")?)?,
            }),
            "kcomp" => Ok(Command::KanjiComponents {
                on: parse_on("kcomp", need("kcomp")?)?,
            }),
            "kanjitfidf" => Ok(Command::KanjiTfidf {
                on: parse_on("kanjitfidf", need("kanjitfidf")?)?,
            }),
            "kanjitopkenabled" => Ok(Command::KanjiTopKEnabled {
                on: parse_on("kanjitopkenabled", need("kanjitopkenabled")?)?,
            }),
            "kanjitopk" => {
                let v = need("kanjitopk")?;
                Ok(Command::KanjiTopK {
                    k: v.parse::<u32>().map_err(|e| bad("kanjitopk", e.to_string()))?,
                })
            }
            "kanjinorm" => Ok(Command::KanjiNorm {
                on: parse_on("kanjinorm", need("kanjinorm")?)?,
            }),
            "showunlinked" => Ok(Command::ShowUnlinked {
                on: parse_on("showunlinked", need("showunlinked")?)?,
            }),
            "fprio" => Ok(Command::SamePrioEdges {
                on: parse_on("fprio", need("fprio")?)?,
            }),
            "fprioop" => Ok(Command::SamePrioOpacity {
                value: parse_f32("fprioop", need("fprioop")?)?,
            }),
            "fchain" => Ok(Command::FamilyChain {
                on: parse_on("fchain", need("fchain")?)?,
            }),
            "cdotenabled" => Ok(Command::CardDotEnabled {
                on: parse_on("cdotenabled", need("cdotenabled")?)?,
            }),
            "cdot" => {
                let (state, color) = split2("cdot", need("cdot")?)?;
                let state = match state.as_str() {
                    "suspended" => CardDotState::Suspended,
                    "buried" => CardDotState::Buried,
                    other => return Err(bad("cdot", format!("unknown state `{other}`"))),
                };
                Ok(Command::CardDotColor {
                    state,
                    color: url_decode("cdot", &color)?,
                })
            }
            "decks" => Ok(Command::Decks {
                decks: decode_json("decks", need("decks")?)?,
            }),
            "mlghubs" => Ok(Command::GroupHubs {
                hubs: decode_json("mlghubs", need("mlghubs")?)?,
            }),
            "neighborscale" => Ok(Command::NeighborScaleCfg {
                scale: decode_json("neighborscale", need("neighborscale")?)?,
            }),

            "ctx" => {
                let (action, payload) = split2("ctx", need("ctx")?)?;
                Ok(Command::Ctx(parse_ctx(&action, &payload)?))
            }
            "deptree" => Ok(Command::DepTree {
                note_id: parse_i64("deptree", need("deptree")?)?,
            }),
            "embed_editor" => {
                let rest = need("embed_editor")?;
                let (sub, payload) = match rest.split_once(':') {
                    Some((s, p)) => (s, Some(p)),
                    None => (rest, None),
                };
                Ok(Command::EmbedEditor(parse_embed(sub, payload)?))
            }

            other => Err(CommandError::UnknownKind(other.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        use Command::*;
        match self {
            Refresh => "refresh".to_string(),
            Devtools => "devtools".to_string(),
            Log { level, text } => format!("log:{}:{}", level.as_str(), text),

            LayerColor { layer, color } => format!("lcol:{}:{}", layer.as_str(), color),
            LayerEnabled { layer, on } => format!("lenabled:{}:{}", layer.as_str(), on01(*on)),
            LayerStyle { layer, style } => format!("lstyle:{}:{}", layer.as_str(), style.as_str()),
            LayerFlow { layer, on } => format!("lflow:{}:{}", layer.as_str(), on01(*on)),
            LayerStrength { layer, value } => format!("lstrength:{}:{}", layer.as_str(), value),
            LayerWeight { layer, value } => format!("lweight:{}:{}", layer.as_str(), value),
            LayerDistance { layer, value } => format!("ldistance:{}:{}", layer.as_str(), value),

            SolverParam { key, value } => format!("solver:{key}:{value}"),
            RendererParam { key, value } => format!("renderer:{key}:{value}"),
            EngineParam { key, value } => format!("engine:{key}:{value}"),
            NodeParam { key, value } => format!("node:{key}:{value}"),

            NoteTypeVisible { mid, on } => format!("ntvis:{mid}:{}", on01(*on)),
            NoteTypeLabelField { mid, field } => {
                format!("label:{mid}:{}", urlencoding::encode(field))
            }
            NoteTypeLinkedField { mid, field } => {
                format!("lnfield:{mid}:{}", urlencoding::encode(field))
            }
            NoteTypeTooltipFields { mid, fields } => {
                format!("nttip:{mid}:{}", encode_json(fields))
            }
            NoteTypeColor { mid, color } => format!("color:{mid}:{}", urlencoding::encode(color)),

            RefAuto { value } => format!("refauto:{value}"),
            RefDamp { on } => format!("refdamp:{}", on01(*on)),
            LinkMst { on } => format!("linkmst:{}", on01(*on)),
            HubDamp { on } => format!("hubdamp:{}", on01(*on)),
            KanjiComponents { on } => format!("kcomp:{}", on01(*on)),
            KanjiTfidf { on } => format!("kanjitfidf:{}", on01(*on)),
            KanjiTopKEnabled { on } => format!("kanjitopkenabled:{}", on01(*on)),
            KanjiTopK { k } => format!("kanjitopk:{k}"),
            KanjiNorm { on } => format!("kanjinorm:{}", on01(*on)),
            ShowUnlinked { on } => format!("showunlinked:{}", on01(*on)),
            SamePrioEdges { on } => format!("fprio:{}", on01(*on)),
            SamePrioOpacity { value } => format!("fprioop:{value}"),
            FamilyChain { on } => format!("fchain:{}", on01(*on)),
            CardDotEnabled { on } => format!("cdotenabled:{}", on01(*on)),
            CardDotColor { state, color } => {
                format!("cdot:{}:{}", state.as_str(), urlencoding::encode(color))
            }
            Decks { decks } => format!("decks:{}", encode_json(decks)),
            GroupHubs { hubs } => format!("mlghubs:{}", encode_json(hubs)),
            NeighborScaleCfg { scale } => format!("neighborscale:{}", encode_json(scale)),

            Ctx(action) => encode_ctx(action),
            DepTree { note_id } => format!("deptree:{note_id}"),
            EmbedEditor(cmd) => encode_embed(cmd),
        }
    }
}

fn on01(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}

fn encode_json<T: Serialize>(value: &T) -> String {
    // Serialization of plain data records cannot fail.
    let raw = serde_json::to_string(value).unwrap_or_default();
    urlencoding::encode(&raw).into_owned()
}

fn parse_ctx(action: &str, payload: &str) -> Result<CtxAction, CommandError> {
    let nid = |k| parse_i64(k, payload);
    Ok(match action {
        "preview" => CtxAction::Preview { note_id: nid("ctx")? },
        "previewcard" => CtxAction::PreviewCard { card_id: nid("ctx")? },
        "edit" => CtxAction::Edit { note_id: nid("ctx")? },
        "editapi" => CtxAction::EditApi { note_id: nid("ctx")? },
        "browser" => CtxAction::Browser { note_id: nid("ctx")? },
        "browsernt" => CtxAction::BrowserNoteType { mid: nid("ctx")? },
        "browsertag" => CtxAction::BrowserTag {
            tag: url_decode("ctx", payload)?,
        },
        "filter" => CtxAction::Filter {
            query: url_decode("ctx", payload)?,
        },
        "famedit_preview" => CtxAction::FamilyEditPreview(decode_json("ctx", payload)?),
        "famedit_apply" => CtxAction::FamilyEditApply(decode_json("ctx", payload)?),
        "connect" => CtxAction::Connect(decode_json("ctx", payload)?),
        "disconnect" => CtxAction::Disconnect(decode_json("ctx", payload)?),
        "link" => CtxAction::Link(decode_json("ctx", payload)?),
        "link_active" => CtxAction::LinkActive(decode_json("ctx", payload)?),
        "link_both" => CtxAction::LinkBoth(decode_json("ctx", payload)?),
        "unlink" => CtxAction::Unlink(decode_json("ctx", payload)?),
        "unlink_active" => CtxAction::UnlinkActive(decode_json("ctx", payload)?),
        "unlink_both" => CtxAction::UnlinkBoth(decode_json("ctx", payload)?),
        other => return Err(bad("ctx", format!("unknown action `{other}`"))),
    })
}

fn encode_ctx(action: &CtxAction) -> String {
    use CtxAction::*;
    match action {
        Preview { note_id } => format!("ctx:preview:{note_id}"),
        PreviewCard { card_id } => format!("ctx:previewcard:{card_id}"),
        Edit { note_id } => format!("ctx:edit:{note_id}"),
        EditApi { note_id } => format!("ctx:editapi:{note_id}"),
        Browser { note_id } => format!("ctx:browser:{note_id}"),
        BrowserNoteType { mid } => format!("ctx:browsernt:{mid}"),
        BrowserTag { tag } => format!("ctx:browsertag:{}", urlencoding::encode(tag)),
        Filter { query } => format!("ctx:filter:{}", urlencoding::encode(query)),
        FamilyEditPreview(p) => format!("ctx:famedit_preview:{}", encode_json(p)),
        FamilyEditApply(p) => format!("ctx:famedit_apply:{}", encode_json(p)),
        Connect(p) => format!("ctx:connect:{}", encode_json(p)),
        Disconnect(p) => format!("ctx:disconnect:{}", encode_json(p)),
        Link(p) => format!("ctx:link:{}", encode_json(p)),
        LinkActive(p) => format!("ctx:link_active:{}", encode_json(p)),
        LinkBoth(p) => format!("ctx:link_both:{}", encode_json(p)),
        Unlink(p) => format!("ctx:unlink:{}", encode_json(p)),
        UnlinkActive(p) => format!("ctx:unlink_active:{}", encode_json(p)),
        UnlinkBoth(p) => format!("ctx:unlink_both:{}", encode_json(p)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RectPayload {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

fn parse_embed(sub: &str, payload: Option<&str>) -> Result<EmbedEditorCmd, CommandError> {
    Ok(match sub {
        "rect" => {
            let p = payload.ok_or_else(|| bad("embed_editor", "rect needs a payload"))?;
            let r: RectPayload = decode_json("embed_editor", p)?;
            EmbedEditorCmd::Rect {
                x: r.x,
                y: r.y,
                w: r.w,
                h: r.h,
            }
        }
        "open" => EmbedEditorCmd::Open,
        "toggle" => EmbedEditorCmd::Toggle,
        "select" => {
            let p = payload.ok_or_else(|| bad("embed_editor", "select needs a note id"))?;
            EmbedEditorCmd::Select {
                note_id: parse_i64("embed_editor", p)?,
            }
        }
        "close" => EmbedEditorCmd::Close,
        "devtools" => EmbedEditorCmd::Devtools,
        "cssreload" => EmbedEditorCmd::CssReload,
        other => return Err(bad("embed_editor", format!("unknown subcommand `{other}`"))),
    })
}

fn encode_embed(cmd: &EmbedEditorCmd) -> String {
    match cmd {
        EmbedEditorCmd::Rect { x, y, w, h } => {
            let r = RectPayload {
                x: *x,
                y: *y,
                w: *w,
                h: *h,
            };
            format!("embed_editor:rect:{}", encode_json(&r))
        }
        EmbedEditorCmd::Open => "embed_editor:open".to_string(),
        EmbedEditorCmd::Toggle => "embed_editor:toggle".to_string(),
        EmbedEditorCmd::Select { note_id } => format!("embed_editor:select:{note_id}"),
        EmbedEditorCmd::Close => "embed_editor:close".to_string(),
        EmbedEditorCmd::Devtools => "embed_editor:devtools".to_string(),
        EmbedEditorCmd::CssReload => "embed_editor:cssreload".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScaleMode;

    #[test]
    fn parses_short_commands() {
        assert_eq!(Command::parse("refresh").unwrap(), Command::Refresh);
        assert_eq!(Command::parse("devtools").unwrap(), Command::Devtools);
        assert_eq!(
            Command::parse("log:warn:solver stalled: retrying").unwrap(),
            Command::Log {
                level: LogLevel::Warn,
                text: "solver stalled: retrying".to_string(),
            }
        );
    }

    #[test]
    fn parses_layer_commands_with_legacy_names() {
        assert_eq!(
            Command::parse("lcol:family:#ff0000").unwrap(),
            Command::LayerColor {
                layer: Layer::Priority,
                color: "#ff0000".to_string(),
            }
        );
        assert_eq!(
            Command::parse("lenabled:reference:0").unwrap(),
            Command::LayerEnabled {
                layer: Layer::NoteLinks,
                on: false,
            }
        );
        assert_eq!(
            Command::parse("lstyle:kanji:dotted").unwrap(),
            Command::LayerStyle {
                layer: Layer::Kanji,
                style: EdgeStyle::Dotted,
            }
        );
    }

    #[test]
    fn rejects_unknown_kind_and_layer() {
        assert_eq!(
            Command::parse("frobnicate:1"),
            Err(CommandError::UnknownKind("frobnicate".to_string()))
        );
        assert_eq!(
            Command::parse("lflow:nope:1"),
            Err(CommandError::UnknownLayer("nope".to_string()))
        );
        assert!(matches!(
            Command::parse("lenabled:kanji:2"),
            Err(CommandError::BadPayload { .. })
        ));
    }

    #[test]
    fn parses_ctx_json_payload() {
        let payload = urlencoding::encode(r#"{"source":11,"target":22,"label":"see also"}"#)
            .into_owned();
        let cmd = Command::parse(&format!("ctx:link:{payload}")).unwrap();
        match cmd {
            Command::Ctx(CtxAction::Link(p)) => {
                assert_eq!(p.source, Some(11));
                assert_eq!(p.target, Some(22));
                assert_eq!(p.label.as_deref(), Some("see also"));
                assert_eq!(p.old_fid, None);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_neighborscale_object() {
        let payload =
            urlencoding::encode(r#"{"mode":"jaccard","direction":"out","layer_weights":{"notes":0.5}}"#)
                .into_owned();
        let cmd = Command::parse(&format!("neighborscale:{payload}")).unwrap();
        match cmd {
            Command::NeighborScaleCfg { scale } => {
                assert_eq!(scale.mode, ScaleMode::Jaccard);
                assert_eq!(scale.layer_weights.get(&Layer::Notes), Some(&0.5));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn encode_parse_roundtrip() {
        let samples = vec![
            Command::Refresh,
            Command::LayerDistance {
                layer: Layer::Examples,
                value: 42.5,
            },
            Command::SolverParam {
                key: "alpha_decay".to_string(),
                value: 0.028,
            },
            Command::NoteTypeLabelField {
                mid: 1_600_000_000_000,
                field: "Front Side".to_string(),
            },
            Command::NoteTypeTooltipFields {
                mid: 7,
                fields: vec!["Reading".to_string(), "Meaning".to_string()],
            },
            Command::KanjiTopK { k: 12 },
            Command::CardDotColor {
                state: CardDotState::Buried,
                color: "#ffaa00".to_string(),
            },
            Command::Decks {
                decks: vec!["JP::Vocab".to_string(), "JP::Kanji".to_string()],
            },
            Command::Ctx(CtxAction::FamilyEditApply(CtxPayload {
                old_fid: Some("old".to_string()),
                new_fid: Some("new".to_string()),
                ..CtxPayload::default()
            })),
            Command::EmbedEditor(EmbedEditorCmd::Select { note_id: 99 }),
            Command::EmbedEditor(EmbedEditorCmd::Rect {
                x: 4.0,
                y: 8.0,
                w: 320.0,
                h: 480.0,
            }),
            Command::DepTree { note_id: 1234 },
        ];
        for cmd in samples {
            let line = cmd.encode();
            let back = Command::parse(&line).unwrap_or_else(|e| panic!("{line}: {e}"));
            assert_eq!(back, cmd, "roundtrip failed for {line}");
        }
    }
}
