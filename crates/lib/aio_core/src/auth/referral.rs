//! Referral code generation.

use rand::{Rng, rng};

/// Referral code length.
pub const REFERRAL_CODE_LEN: usize = 8;

/// Alphabet without look-alike characters (0/O, 1/I).
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a random uppercase referral code.
pub fn generate_referral_code() -> String {
    let mut rng = rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
