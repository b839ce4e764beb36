//! Random multipart delimiter tokens.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;

/// Fixed prefix shared by every boundary.
pub const BOUNDARY_PREFIX: &str = "----WebKitFormBoundary";

/// Number of random `[A-Za-z0-9]` characters after the prefix.
pub const BOUNDARY_RANDOM_LEN: usize = 16;

/// Total token length: prefix plus random suffix.
pub const BOUNDARY_LEN: usize = BOUNDARY_PREFIX.len() + BOUNDARY_RANDOM_LEN;

const MAX_REGENERATE_ATTEMPTS: usize = 8;

/// Multipart delimiter, unique per upload.
///
/// The restricted charset makes an accidental match inside JPEG payloads very
/// unlikely but not impossible; `generate_avoiding` narrows that further by
/// scanning the payloads it will delimit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Boundary(String);

impl Boundary {
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng>(rng: &mut R) -> Self {
        let mut token = String::with_capacity(BOUNDARY_LEN);
        token.push_str(BOUNDARY_PREFIX);
        for _ in 0..BOUNDARY_RANDOM_LEN {
            token.push(char::from(rng.sample(Alphanumeric)));
        }
        Self(token)
    }

    /// Generate a boundary that does not occur in any of `payloads`.
    ///
    /// Gives up after a few attempts and returns the last candidate.
    pub fn generate_avoiding(payloads: &[&[u8]]) -> Self {
        let mut rng = rand::thread_rng();
        let mut candidate = Self::generate_with(&mut rng);
        for _ in 1..MAX_REGENERATE_ATTEMPTS {
            if !payloads.iter().any(|p| candidate.occurs_in(p)) {
                break;
            }
            log::warn!("boundary collided with payload bytes; regenerating");
            candidate = Self::generate_with(&mut rng);
        }
        candidate
    }

    /// Whether the token appears verbatim inside `bytes`.
    pub fn occurs_in(&self, bytes: &[u8]) -> bool {
        let needle = self.0.as_bytes();
        bytes.len() >= needle.len() && bytes.windows(needle.len()).any(|w| w == needle)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
