//! Random package ids and archive secrets.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random string over `[0-9A-Za-z]`
pub fn random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// `prefix` followed by `length` random alphanumerics, e.g. `wpkAb12Cd34Ef`
pub fn random_id(prefix: &str, length: usize) -> String {
    format!("{}{}", prefix, random_string(length))
}
