use sha2::{Digest, Sha256};
use uuid::Uuid;

const SEPARATOR: &str = "$";

/// Stable key for the unordered pair `{a, b}`.
///
/// Both ids are sorted by their hyphenated text form, joined, and hashed, so
/// `room_id(a, b) == room_id(b, a)` and the result is a 64 char hex digest that
/// does not reveal the ids. Conversations and live rooms are both keyed by it.
pub fn room_id(a: Uuid, b: Uuid) -> String {
    let (a, b) = (a.to_string(), b.to_string());
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

    let digest = Sha256::digest(format!("{lo}{SEPARATOR}{hi}").as_bytes());
    format!("{digest:x}")
}

/// The pair in the order [`room_id`] hashes it.
pub fn normalize(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a.to_string() <= b.to_string() { (a, b) } else { (b, a) }
}
