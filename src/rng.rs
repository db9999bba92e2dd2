/// Hash an arbitrary string down to a 32-bit seed.
///
/// Murmur-style imul/rotate folding. The exact constants are an implementation
/// detail; callers may rely on the result being total, stable across calls,
/// and well-avalanched, not on the specific values produced.
pub fn hash_string(s: &str) -> u32 {
    let mut h: u32 = 1_779_033_703 ^ (s.len() as u32);
    for c in s.chars() {
        h = (h ^ (c as u32)).wrapping_mul(3_432_918_353);
        h = h.rotate_left(13);
    }
    h
}

/// Counter-based deterministic generator (mulberry32). Each call advances the
/// internal counter and mixes it; identical seeds yield identical sequences.
#[derive(Clone, Copy, Debug)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn from_str_seed(seed: &str) -> Self {
        Self::new(hash_string(seed))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Uniform draw in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_seeds_produce_identical_sequences() {
        for seed in ["", "a", "coin-1700000000000-0001", "🪙"] {
            let mut a = Mulberry32::from_str_seed(seed);
            let mut b = Mulberry32::from_str_seed(seed);
            for _ in 0..64 {
                assert_eq!(a.next_u32(), b.next_u32());
            }
        }
    }

    #[test]
    fn hash_is_stable_and_total() {
        assert_eq!(hash_string("abc"), hash_string("abc"));
        // No panic on empty or multi-byte input.
        let _ = hash_string("");
        let _ = hash_string("日本語テキスト");
    }

    #[test]
    fn hash_avalanche_spot_check() {
        // One-character difference should flip many output bits.
        let a = hash_string("entry-0001");
        let b = hash_string("entry-0002");
        assert_ne!(a, b);
        assert!((a ^ b).count_ones() >= 8);
    }

    #[test]
    fn draws_stay_in_unit_interval() {
        let mut rng = Mulberry32::new(0xDEAD_BEEF);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn distinct_seeds_diverge() {
        let mut a = Mulberry32::new(1);
        let mut b = Mulberry32::new(2);
        let same = (0..32).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 4);
    }
}
