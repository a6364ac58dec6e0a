//! Session credential generation.

use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Random connection credentials: a `voodooXX` service name and a 6-char
/// alphanumeric bearer code.
pub fn generate() -> (String, String) {
    (format!("voodoo{}", random_token(2)), random_token(6))
}
