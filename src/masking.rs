//! Text Masking Codec
//!
//! Reversible transform that protects code spans, URLs and @/# tokens from
//! translation corruption. Spans are replaced with placeholder tokens built
//! from underscores and digits only, which translation engines leave alone.
//!
//! Masking order matters: fenced code blocks first, then inline code, then
//! URLs, then mentions/tags, so nested matches are never double-masked.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]*`").unwrap());
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[@#][\w]+").unwrap());

/// One masked span: the placeholder that replaced it and the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskEntry {
    pub key: String,
    pub original: String,
}

/// Replace protected spans with placeholders. The index is shared across
/// kinds so every placeholder in one round-trip is unique.
pub fn mask(text: &str) -> (String, Vec<MaskEntry>) {
    let mut entries: Vec<MaskEntry> = Vec::new();
    let mut out = text.to_string();

    for (re, kind) in [
        (&*FENCED_CODE, "CODE"),
        (&*INLINE_CODE, "CODE"),
        (&*URL, "URL"),
        (&*TAG, "TAG"),
    ] {
        out = replace_all(&out, re, kind, &mut entries);
    }

    (out, entries)
}

fn replace_all(text: &str, re: &Regex, kind: &str, entries: &mut Vec<MaskEntry>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        let key = format!("__MASK_{}_{}__", kind, entries.len());
        out.push_str(&key);
        entries.push(MaskEntry {
            key,
            original: m.as_str().to_string(),
        });
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Put the original spans back. Placeholders are matched as literal text,
/// so a translator that shuffled the surrounding words cannot break this.
pub fn restore(text: &str, entries: &[MaskEntry]) -> String {
    let mut out = text.to_string();
    for e in entries {
        out = out.replace(&e.key, &e.original);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) -> String {
        let (masked, entries) = mask(text);
        restore(&masked, &entries)
    }

    #[test]
    fn plain_text_untouched() {
        let (masked, entries) = mask("halo dunia");
        assert_eq!(masked, "halo dunia");
        assert!(entries.is_empty());
    }

    #[test]
    fn round_trip_is_identity() {
        let samples = [
            "check ```let x = 1;\nlet y = 2;``` and `inline` too",
            "visit https://example.com/path?q=1 now",
            "ping @someone about #release",
            "```a``` `b` https://c.d @e #f mixed together",
        ];
        for s in samples {
            assert_eq!(round_trip(s), s);
        }
    }

    #[test]
    fn fenced_block_masked_before_inline() {
        let (masked, entries) = mask("```code `nested` block```");
        assert_eq!(entries.len(), 1);
        assert_eq!(masked, "__MASK_CODE_0__");
        assert_eq!(entries[0].original, "```code `nested` block```");
    }

    #[test]
    fn placeholder_index_is_shared_across_kinds() {
        let (_, entries) = mask("`a` https://b.c @d");
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["__MASK_CODE_0__", "__MASK_URL_1__", "__MASK_TAG_2__"]
        );
    }

    #[test]
    fn url_stops_at_whitespace() {
        let (masked, entries) = mask("see http://a.b/c next word");
        assert_eq!(masked, "see __MASK_URL_0__ next word");
        assert_eq!(entries[0].original, "http://a.b/c");
    }

    #[test]
    fn restore_survives_shuffled_context() {
        let (masked, entries) = mask("kirim ke @budi ya");
        // Simulate a translator reordering the words around the placeholder.
        let translated = masked.replace("kirim ke", "send to").replace(" ya", " ok");
        let restored = restore(&translated, &entries);
        assert_eq!(restored, "send to @budi ok");
    }
}
