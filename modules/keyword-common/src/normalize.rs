use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical key for a keyword term.
///
/// Decomposes with NFKD and drops combining marks, so composed and decomposed
/// spellings share a key. Also lowercases, drops apostrophes so possessives
/// collapse ("Joe's" and "joes"), turns every other non-alphanumeric character
/// into a space, and collapses whitespace.
pub fn normalize_keyword_term(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for ch in text.nfkd().flat_map(char::to_lowercase) {
        if is_combining_mark(ch) || matches!(ch, '\'' | '\u{2019}' | '`') {
            continue;
        }
        match fold_letter(ch) {
            Some(replacement) => folded.push_str(replacement),
            None if ch.is_alphanumeric() => folded.push(ch),
            None => folded.push(' '),
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Latin letters with no canonical decomposition.
fn fold_letter(ch: char) -> Option<&'static str> {
    match ch {
        'ß' => Some("ss"),
        'ł' => Some("l"),
        'đ' => Some("d"),
        'ø' => Some("o"),
        'æ' => Some("ae"),
        'œ' => Some("oe"),
        'ı' => Some("i"),
        _ => None,
    }
}
