//! Threshold filter over per-term quantized score vectors.
//!
//! Given one `u8` score vector per query term (one byte per document),
//! [`compute_live_quant16`] marks every document whose summed score
//! reaches `threshold`. Sums are accumulated in 16-bit lanes with
//! saturating addition. One bit is appended per document, in document
//! order.
//!
//! The SIMD paths are drop-in replacements for the scalar loop and
//! produce bit-identical output; equivalence is asserted by tests.

use crate::bits::{BitVector, BitVectorBuilder};

/// Marks documents whose summed quantized score reaches `threshold`,
/// using the fastest implementation available on this CPU.
///
/// `scores` must be non-empty and its vectors must all have the same
/// length.
pub fn compute_live_quant16(scores: &[Vec<u8>], threshold: u16) -> BitVector {
    debug_assert!(!scores.is_empty());
    debug_assert!(scores.iter().all(|s| s.len() == scores[0].len()));

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { x86::compute_live_quant16_avx2(scores, threshold) };
        }
        if is_x86_feature_detected!("sse4.1") {
            return unsafe { x86::compute_live_quant16_sse(scores, threshold) };
        }
    }
    compute_live_quant16_scalar(scores, threshold)
}

/// Portable reference implementation, one document per iteration.
pub fn compute_live_quant16_scalar(scores: &[Vec<u8>], threshold: u16) -> BitVector {
    let num_docs = scores[0].len();
    let mut live = BitVectorBuilder::with_capacity(num_docs as u64);
    for doc in 0..num_docs {
        let mut sum = scores[0][doc] as u16;
        for term in &scores[1..] {
            sum = sum.saturating_add(term[doc] as u16);
        }
        live.append_bits(u64::from(sum >= threshold), 1);
    }
    live.build()
}

#[cfg(target_arch = "x86_64")]
pub mod x86 {
    //! SSE4.1 (8 documents per step) and AVX2 (16 documents per step)
    //! variants. Callers must check CPU support first.

    use std::arch::x86_64::*;

    use crate::bits::{BitVector, BitVectorBuilder};

    #[inline]
    unsafe fn load_8_as_u16(ptr: *const u8) -> __m128i {
        // Widen 8 bytes into 8 unsigned 16-bit lanes.
        _mm_unpacklo_epi8(_mm_loadl_epi64(ptr as *const __m128i), _mm_setzero_si128())
    }

    /// # Safety
    /// Requires SSE4.1.
    #[target_feature(enable = "sse4.1")]
    pub unsafe fn compute_live_quant16_sse(scores: &[Vec<u8>], threshold: u16) -> BitVector {
        let num_docs = scores[0].len();
        let mut live = BitVectorBuilder::with_capacity(num_docs as u64);
        let thresholds = _mm_set1_epi16(threshold as i16);

        let mut doc = 0;
        while num_docs - doc >= 8 {
            let mut sum = load_8_as_u16(scores[0].as_ptr().add(doc));
            for term in &scores[1..] {
                sum = _mm_adds_epu16(sum, load_8_as_u16(term.as_ptr().add(doc)));
            }
            // sum >= threshold per lane: max(sum, threshold) == sum.
            let ge = _mm_cmpeq_epi16(_mm_max_epu16(sum, thresholds), sum);
            let lanes = _mm_shuffle_epi8(
                ge,
                _mm_setr_epi8(0, 2, 4, 6, 8, 10, 12, 14, -1, -1, -1, -1, -1, -1, -1, -1),
            );
            let bits = _mm_movemask_epi8(lanes) as u64;
            live.append_bits(bits & 0xFF, 8);
            doc += 8;
        }

        while doc < num_docs {
            let mut sum = scores[0][doc] as u16;
            for term in &scores[1..] {
                sum = sum.saturating_add(term[doc] as u16);
            }
            live.append_bits(u64::from(sum >= threshold), 1);
            doc += 1;
        }
        live.build()
    }

    #[inline]
    #[target_feature(enable = "avx2")]
    unsafe fn load_16_as_u16(ptr: *const u8) -> __m256i {
        // Widen 16 bytes into 16 unsigned 16-bit lanes.
        _mm256_cvtepu8_epi16(_mm_loadu_si128(ptr as *const __m128i))
    }

    /// # Safety
    /// Requires AVX2.
    #[target_feature(enable = "avx2")]
    pub unsafe fn compute_live_quant16_avx2(scores: &[Vec<u8>], threshold: u16) -> BitVector {
        let num_docs = scores[0].len();
        let mut live = BitVectorBuilder::with_capacity(num_docs as u64);
        let thresholds = _mm256_set1_epi16(threshold as i16);

        let mut doc = 0;
        while num_docs - doc >= 16 {
            let mut sum = load_16_as_u16(scores[0].as_ptr().add(doc));
            for term in &scores[1..] {
                sum = _mm256_adds_epu16(sum, load_16_as_u16(term.as_ptr().add(doc)));
            }
            let ge = _mm256_cmpeq_epi16(_mm256_max_epu16(sum, thresholds), sum);
            let packed = _mm_packs_epi16(
                _mm256_extracti128_si256(ge, 0),
                _mm256_extracti128_si256(ge, 1),
            );
            let bits = _mm_movemask_epi8(packed) as u64;
            live.append_bits(bits & 0xFFFF, 16);
            doc += 16;
        }

        while doc < num_docs {
            let mut sum = scores[0][doc] as u16;
            for term in &scores[1..] {
                sum = sum.saturating_add(term[doc] as u16);
            }
            live.append_bits(u64::from(sum >= threshold), 1);
            doc += 1;
        }
        live.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(scores: &[Vec<u8>], threshold: u16) -> Vec<bool> {
        (0..scores[0].len())
            .map(|doc| {
                let sum = scores
                    .iter()
                    .fold(0u16, |acc, term| acc.saturating_add(term[doc] as u16));
                sum >= threshold
            })
            .collect()
    }

    fn random_scores(terms: usize, docs: usize, seed: u64) -> Vec<Vec<u8>> {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(seed);
        (0..terms)
            .map(|_| (0..docs).map(|_| rng.gen::<u8>()).collect())
            .collect()
    }

    #[test]
    fn scalar_matches_brute_force() {
        let scores = vec![vec![10, 0, 255, 3], vec![10, 0, 255, 4]];
        let live = compute_live_quant16_scalar(&scores, 8);
        let expected = brute_force(&scores, 8);
        assert_eq!(live.len(), 4);
        for (doc, &alive) in expected.iter().enumerate() {
            assert_eq!(live.bit(doc as u64), alive, "doc {doc}");
        }
    }

    #[test]
    fn saturation_still_passes_threshold() {
        // Three maxed-out terms exceed u16::MAX; the saturated sum must
        // still compare greater than any threshold.
        let scores = vec![vec![255u8; 300]; 300];
        let live = compute_live_quant16_scalar(&scores, u16::MAX);
        for doc in 0..300 {
            assert!(live.bit(doc));
        }
    }

    #[test]
    fn dispatched_matches_scalar() {
        for (terms, docs, threshold) in
            [(1, 7, 100u16), (2, 64, 200), (3, 100, 300), (5, 1000, 700)]
        {
            let scores = random_scores(terms, docs, (terms * docs) as u64);
            let expected = compute_live_quant16_scalar(&scores, threshold);
            let observed = compute_live_quant16(&scores, threshold);
            assert_eq!(observed, expected, "{terms} terms, {docs} docs");
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn simd_paths_match_scalar() {
        for (terms, docs, threshold) in [(1, 8, 50u16), (2, 17, 128), (4, 513, 510), (3, 31, 0)] {
            let scores = random_scores(terms, docs, docs as u64 + 1);
            let expected = compute_live_quant16_scalar(&scores, threshold);
            if is_x86_feature_detected!("sse4.1") {
                let sse = unsafe { x86::compute_live_quant16_sse(&scores, threshold) };
                assert_eq!(sse, expected, "sse: {terms} terms, {docs} docs");
            }
            if is_x86_feature_detected!("avx2") {
                let avx = unsafe { x86::compute_live_quant16_avx2(&scores, threshold) };
                assert_eq!(avx, expected, "avx2: {terms} terms, {docs} docs");
            }
        }
    }
}
