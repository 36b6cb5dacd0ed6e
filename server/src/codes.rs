//! Human-shareable token codes

use rand::Rng;

use crate::policy::TokenKind;

/// Random characters appended after the variant prefix.
pub const CODE_SUFFIX_LEN: usize = 5;

/// Generate a code such as `K1X7Q2M` for the given variant.
pub fn generate_code<R: Rng + ?Sized>(kind: TokenKind, rng: &mut R) -> String {
    let alphabet = kind.code_alphabet();
    let mut code = String::with_capacity(kind.code_prefix().len() + CODE_SUFFIX_LEN);
    code.push_str(kind.code_prefix());
    for _ in 0..CODE_SUFFIX_LEN {
        code.push(alphabet[rng.gen_range(0..alphabet.len())] as char);
    }
    code
}

/// Codes are looked up case-insensitively.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
