//! Field-text parsing shared by the assembler gates: HTML stripping,
//! furigana stripping, family-field grammar and `[label|token]` link tokens.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

fn furigana_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A ruby group is `base[reading]`, optionally preceded by the space that
    // separates it from the previous group.
    RE.get_or_init(|| Regex::new(r" ?([^\s\[\]]+)\[[^\[\]]*\]").unwrap())
}

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\[\]]*\]").unwrap())
}

pub fn strip_html(s: &str) -> String {
    let no_tags = tag_re().replace_all(s, "");
    no_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove `漢字[よみ]` ruby annotations together with the space that
/// delimits each ruby group; unrelated spaces survive.
pub fn strip_furigana(s: &str) -> String {
    furigana_re().replace_all(s, "$1").into_owned()
}

/// NFC + trim. Idempotent: applying twice equals applying once.
pub fn normalize_family_id(s: &str) -> String {
    s.trim().nfc().collect::<String>()
}

/// Normalized lookup key for the example gate's vocab index.
pub fn vocab_key(s: &str, first_token: bool) -> String {
    let cleaned = strip_furigana(&strip_html(s));
    let normalized = cleaned.trim().nfc().collect::<String>();
    if first_token {
        normalized
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string()
    } else {
        normalized
    }
}

/// Parse a family field into `(family_id, priority)` pairs.
///
/// Grammar: entries separated by `sep`, each `id` or `id@priority`. Ids are
/// NFC-normalized and trimmed; empty entries are skipped; an unparsable
/// priority counts as malformed and falls back to the default.
pub fn parse_family_field(
    value: &str,
    sep: &str,
    default_priority: i64,
) -> (Vec<(String, i64)>, u32) {
    let mut out: Vec<(String, i64)> = Vec::new();
    let mut malformed = 0u32;
    let sep = if sep.is_empty() { ";" } else { sep };

    for entry in strip_html(value).split(sep) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (raw_id, prio) = match entry.split_once('@') {
            Some((id, prio_str)) => match prio_str.trim().parse::<i64>() {
                Ok(p) => (id, p),
                Err(_) => {
                    malformed += 1;
                    (id, default_priority)
                }
            },
            None => (entry, default_priority),
        };
        let fid = normalize_family_id(raw_id);
        if fid.is_empty() {
            malformed += 1;
            continue;
        }
        if !out.iter().any(|(existing, _)| *existing == fid) {
            out.push((fid, prio));
        }
    }
    (out, malformed)
}

/// Inverse of `parse_family_field` up to entry order and whitespace.
pub fn serialize_family_field(pairs: &[(String, i64)], sep: &str) -> String {
    let sep = if sep.is_empty() { ";" } else { sep };
    pairs
        .iter()
        .map(|(fid, prio)| format!("{fid}@{prio}"))
        .collect::<Vec<_>>()
        .join(sep)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkToken {
    pub label: String,
    pub target: String,
}

/// Extract `[label|token]` link tokens. Bracket groups that do not contain
/// exactly one `|` with a non-empty token are counted as malformed. Labels
/// are HTML-stripped and whitespace-collapsed.
pub fn parse_link_tokens(value: &str) -> (Vec<LinkToken>, u32) {
    let mut tokens = Vec::new();
    let mut malformed = 0u32;
    for group in bracket_re().find_iter(value) {
        let inner = &group.as_str()[1..group.as_str().len() - 1];
        let mut parts = inner.split('|');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(label), Some(target), None) if !target.trim().is_empty() => {
                tokens.push(LinkToken {
                    label: collapse_ws(&strip_html(label)),
                    target: target.trim().to_string(),
                });
            }
            _ => malformed += 1,
        }
    }
    (tokens, malformed)
}

/// Unique kanji characters of a string, in first-appearance order.
pub fn extract_kanji(s: &str) -> Vec<char> {
    let mut seen = Vec::new();
    for ch in s.chars() {
        if is_kanji(ch) && !seen.contains(&ch) {
            seen.push(ch);
        }
    }
    seen
}

pub fn is_kanji(ch: char) -> bool {
    matches!(ch,
        '\u{4e00}'..='\u{9fff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{f900}'..='\u{faff}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_tags_and_entities() {
        assert_eq!(strip_html("<b>家族</b>&nbsp;x &amp; y"), "家族 x & y");
    }

    #[test]
    fn strip_furigana_removes_ruby_groups() {
        assert_eq!(strip_furigana("漢字[かんじ] 家[いえ]"), "漢字家");
        assert_eq!(strip_furigana("plain"), "plain");
    }

    #[test]
    fn family_id_normalization_is_idempotent() {
        // U+30AB U+3099 (katakana KA + combining voiced mark) composes to U+30AC.
        let raw = "  \u{30ab}\u{3099}行  ";
        let once = normalize_family_id(raw);
        let twice = normalize_family_id(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "\u{30ac}行");
    }

    #[test]
    fn family_field_parse_serialize_roundtrip() {
        let (pairs, malformed) = parse_family_field("家@0; 族@2;", ";", 9);
        assert_eq!(malformed, 0);
        assert_eq!(
            pairs,
            vec![("家".to_string(), 0), ("族".to_string(), 2)]
        );
        let serialized = serialize_family_field(&pairs, ";");
        let (back, _) = parse_family_field(&serialized, ";", 9);
        assert_eq!(back, pairs);
    }

    #[test]
    fn family_field_defaults_and_malformed() {
        let (pairs, malformed) = parse_family_field("家; 族@x; @3", ";", 7);
        // `族@x` falls back to the default priority, `@3` has an empty id.
        assert_eq!(malformed, 2);
        assert_eq!(
            pairs,
            vec![("家".to_string(), 7), ("族".to_string(), 7)]
        );
    }

    #[test]
    fn family_field_absorbs_duplicate_ids() {
        let (pairs, _) = parse_family_field("家@1;家@4", ";", 0);
        assert_eq!(pairs, vec![("家".to_string(), 1)]);
    }

    #[test]
    fn link_tokens_parse_and_count_malformed() {
        let (tokens, malformed) =
            parse_link_tokens("see [<i>the  base</i>|nid123] and [broken] and [a|b|c]");
        assert_eq!(malformed, 2);
        assert_eq!(
            tokens,
            vec![LinkToken {
                label: "the base".to_string(),
                target: "nid123".to_string(),
            }]
        );
    }

    #[test]
    fn kanji_extraction_dedupes_in_order() {
        assert_eq!(extract_kanji("日本語の日"), vec!['日', '本', '語']);
        assert!(extract_kanji("ひらがな abc").is_empty());
    }

    #[test]
    fn vocab_key_strips_and_normalizes() {
        assert_eq!(vocab_key("<b>食べ 物[もの]</b>", false), "食べ物");
        assert_eq!(vocab_key("食べる[たべる] (to eat)", false), "食べる (to eat)");
        assert_eq!(vocab_key("食べる[たべる] (to eat)", true), "食べる");
    }
}
