//! Small text helpers shared by the handlers.

use rand::Rng;

const PASSWORD_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const PASSWORD_LEN: usize = 8;

/// Random lowercase-alphanumeric password for generated panel accounts.
pub fn random_password() -> String {
    let mut rng = rand::thread_rng();
    (0..PASSWORD_LEN)
        .map(|_| PASSWORD_CHARS[rng.gen_range(0..PASSWORD_CHARS.len())] as char)
        .collect()
}

/// Elide the middle of a credential for display. Long tokens keep the
/// first six and last four characters; short ones only the ends.
pub fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return "-".to_string();
    }
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 10 {
        format!(
            "{}***{}",
            chars[0],
            chars[chars.len() - 1]
        )
    } else {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

/// Split on char boundaries into chunks of at most `max` bytes.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = remaining
            .char_indices()
            .take_while(|(i, _)| *i < max)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(remaining.len());
        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk.to_string());
        remaining = rest;
    }
    chunks
}
