//! Secure generation of one-time codes and correlation ids.

use rand::{rngs::OsRng, Rng, RngCore};

const DIGITS: &[u8] = b"0123456789";
const CORRELATION_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub trait SecureRandom: Send + Sync {
    /// A numeric code of exactly `length` digits.
    fn numeric_code(&self, length: usize) -> String;

    /// An upper-case alphanumeric id of exactly `length` characters.
    fn correlation_id(&self, length: usize) -> String;
}

/// Operating-system entropy.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn numeric_code(&self, length: usize) -> String {
        sample(&mut OsRng, DIGITS, length)
    }

    fn correlation_id(&self, length: usize) -> String {
        sample(&mut OsRng, CORRELATION_ALPHABET, length)
    }
}

// gen_range rejects out-of-range draws, so every symbol is equally likely.
fn sample<R: RngCore + ?Sized>(rng: &mut R, alphabet: &[u8], length: usize) -> String {
    (0..length)
        .filter_map(|_| alphabet.get(rng.gen_range(0..alphabet.len())))
        .map(|&byte| char::from(byte))
        .collect()
}
