use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use payflow_core::date_key;

/// FNV-1a over `key`, offset by the run seed.
pub fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// RNG for one day's synthetic batch.
pub fn day_rng(seed: u64, date: NaiveDate) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(hash_seed(seed, &format!("transactions:{}", date_key(date))))
}

/// RNG for one customer; independent of the day it is first seen.
pub fn customer_rng(seed: u64, customer_key: i32) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(hash_seed(seed, &format!("customer:{customer_key}")))
}
