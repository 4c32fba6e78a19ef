//! Integer feature vectors and the operators shared by the GA UoWs

use rand::rngs::StdRng;
use rand::seq::index;
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha224};

/// Decode a JSON feature payload into an integer vector.
///
/// Anything that is not an array of integers decodes to an empty vector,
/// which the fitness functions score as worthless rather than panicking
/// on a peer's bad payload.
pub fn decode(features: &Value) -> Vec<i64> {
    features
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

/// Encode an integer vector as its JSON wire form.
pub fn encode(features: &[i64]) -> Value {
    Value::from(features.to_vec())
}

/// Candidate key: SHA-224 hex digest of the JSON encoding.
///
/// The encoding of a `Vec<i64>` is canonical (no whitespace, fixed
/// element order), so equal vectors always produce equal keys.
pub fn digest_key(features: &Value) -> String {
    let json = features.to_string();
    let digest = Sha224::digest(json.as_bytes());
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}

/// Fresh sorted vector of `length` values drawn uniformly from [min, max].
pub fn random_sorted(rng: &mut StdRng, length: usize, min: i64, max: i64) -> Vec<i64> {
    let mut features: Vec<i64> = (0..length).map(|_| rng.gen_range(min..=max)).collect();
    features.sort_unstable();
    features
}

/// Replace one random position with a fresh draw, then re-sort.
pub fn mutate_one(rng: &mut StdRng, features: &[i64], min: i64, max: i64) -> Vec<i64> {
    if features.is_empty() {
        return Vec::new();
    }

    let mut mutated = features.to_vec();
    let pos = rng.gen_range(0..mutated.len());
    mutated[pos] = rng.gen_range(min..=max);
    mutated.sort_unstable();
    mutated
}

/// Midpoint crossover: the first parent's upper half concatenated with the
/// second parent's lower half, sorted.
pub fn crossover_midpoint(a: &[i64], b: &[i64]) -> Vec<i64> {
    let half = a.len() / 2;
    let mut child: Vec<i64> = a[half.min(a.len())..].to_vec();
    child.extend_from_slice(&b[..half.min(b.len())]);
    child.sort_unstable();
    child
}

/// Random permutation of [min, max], for route-shaped problems.
pub fn random_permutation(rng: &mut StdRng, min: i64, max: i64) -> Vec<i64> {
    let pool: Vec<i64> = (min..=max).collect();
    index::sample(rng, pool.len(), pool.len())
        .iter()
        .map(|i| pool[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_digest_is_pure_and_order_sensitive() {
        let a = encode(&[1, 2, 3]);
        let b = encode(&[1, 2, 3]);
        let c = encode(&[3, 2, 1]);

        assert_eq!(digest_key(&a), digest_key(&b));
        assert_ne!(digest_key(&a), digest_key(&c));
        assert_eq!(digest_key(&a).len(), 56); // SHA-224 hex
    }

    #[test]
    fn test_decode_tolerates_garbage() {
        assert_eq!(decode(&serde_json::json!("nope")), Vec::<i64>::new());
        assert_eq!(decode(&serde_json::json!([1, "x", 3])), vec![1, 3]);
    }

    #[test]
    fn test_mutate_changes_one_position_at_most() {
        let mut rng = StdRng::seed_from_u64(7);
        let original = vec![10, 20, 30, 40, 50];
        let mutated = mutate_one(&mut rng, &original, 0, 100);

        assert_eq!(mutated.len(), original.len());
        assert!(mutated.windows(2).all(|w| w[0] <= w[1]), "stays sorted");
    }

    #[test]
    fn test_crossover_midpoint_shape() {
        let child = crossover_midpoint(&[1, 2, 3, 4], &[10, 20, 30, 40]);
        // upper half of a = [3, 4], lower half of b = [10, 20]
        assert_eq!(child, vec![3, 4, 10, 20]);
    }

    #[test]
    fn test_random_permutation_covers_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut perm = random_permutation(&mut rng, 1, 5);
        perm.sort_unstable();
        assert_eq!(perm, vec![1, 2, 3, 4, 5]);
    }
}
