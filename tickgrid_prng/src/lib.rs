// Seedable pseudo-random source for generative phrases.
//
// xoshiro256++ (Blackman & Vigna, 2019) expanded from a single `u64` seed
// with SplitMix64. The seque phrase strategy draws one scale step per
// sixteenth-note slot from a `NoteRng`, so a message table rebuilt from the
// same notation and the same seed is identical tick for tick. Live reload
// relies on that to republish an equal table for unchanged source.
//
// Integer-only, with no platform-dependent state: the same seed yields the
// same stream on every target.

/// Xoshiro256++ state used by the seque strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteRng {
    state: [u64; 4],
}

impl NoteRng {
    pub fn new(seed: u64) -> Self {
        let mut mix = seed;
        Self {
            state: std::array::from_fn(|_| splitmix64(&mut mix)),
        }
    }

    /// Next raw `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let [s0, s1, s2, s3] = self.state;
        let out = s0.wrapping_add(s3).rotate_left(23).wrapping_add(s0);

        let s2 = s2 ^ s0;
        let s3 = s3 ^ s1;
        let next1 = s1 ^ s2;
        let next0 = s0 ^ s3;
        self.state = [next0, next1, s2 ^ (s1 << 17), s3.rotate_left(45)];

        out
    }

    /// Uniform integer in `[0, bound)` by widening multiply, rejecting the
    /// low products that would bias small results.
    ///
    /// Panics if `bound` is zero.
    pub fn below(&mut self, bound: u64) -> u64 {
        assert!(bound > 0, "below: bound must be positive");
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let wide = u128::from(self.next_u64()) * u128::from(bound);
            if (wide as u64) >= threshold {
                return (wide >> 64) as u64;
            }
        }
    }

    /// A scale step in 1..=7, the alphabet of pitched grid cells.
    pub fn scale_step(&mut self) -> u8 {
        1 + self.below(7) as u8
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
