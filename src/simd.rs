//! Runtime-dispatched byte primitives for the delta pipeline
//!
//! XOR and copy over state buffers dominate the save path at large state
//! sizes, so the widest safe vector width is selected once per process
//! (256-bit, 128-bit, then scalar) and bound through function pointers.
//! The primitives are semantically identical to their scalar references.

use std::sync::OnceLock;

type XorInPlaceFn = unsafe fn(*mut u8, *const u8, usize);
type XorBuffersFn = unsafe fn(*mut u8, *const u8, *const u8, usize);
type CopyFn = unsafe fn(*mut u8, *const u8, usize);

struct ByteOps {
    xor_in_place: XorInPlaceFn,
    xor_buffers: XorBuffersFn,
    copy: CopyFn,
}

static BYTE_OPS: OnceLock<ByteOps> = OnceLock::new();

fn ops() -> &'static ByteOps {
    BYTE_OPS.get_or_init(detect)
}

fn detect() -> ByteOps {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return ByteOps {
                xor_in_place: x86::xor_in_place_avx2,
                xor_buffers: x86::xor_buffers_avx2,
                copy: x86::copy_avx2,
            };
        }
        if is_x86_feature_detected!("sse2") {
            return ByteOps {
                xor_in_place: x86::xor_in_place_sse2,
                xor_buffers: x86::xor_buffers_sse2,
                copy: x86::copy_sse2,
            };
        }
    }
    ByteOps {
        xor_in_place: xor_in_place_scalar,
        xor_buffers: xor_buffers_scalar,
        copy: copy_scalar,
    }
}

/// `dst[i] ^= src[i]` over the common prefix of the two slices.
pub fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    let len = dst.len().min(src.len());
    debug_assert_eq!(dst.len(), src.len());
    // SAFETY: both pointers are valid for `len` bytes and cannot alias
    // (`dst` is a unique borrow).
    unsafe { (ops().xor_in_place)(dst.as_mut_ptr(), src.as_ptr(), len) }
}

/// `dst[i] = lhs[i] ^ rhs[i]` over the common prefix of the three slices.
pub fn xor_buffers(dst: &mut [u8], lhs: &[u8], rhs: &[u8]) {
    let len = dst.len().min(lhs.len()).min(rhs.len());
    debug_assert!(dst.len() == lhs.len() && lhs.len() == rhs.len());
    // SAFETY: all pointers are valid for `len` bytes; `dst` is unique.
    unsafe { (ops().xor_buffers)(dst.as_mut_ptr(), lhs.as_ptr(), rhs.as_ptr(), len) }
}

/// Vector-width copy of `src` into `dst` over their common prefix.
pub fn copy(dst: &mut [u8], src: &[u8]) {
    let len = dst.len().min(src.len());
    debug_assert_eq!(dst.len(), src.len());
    // SAFETY: both pointers are valid for `len` bytes; `dst` is unique.
    unsafe { (ops().copy)(dst.as_mut_ptr(), src.as_ptr(), len) }
}

unsafe fn xor_in_place_scalar(dst: *mut u8, src: *const u8, len: usize) {
    for i in 0..len {
        *dst.add(i) ^= *src.add(i);
    }
}

unsafe fn xor_buffers_scalar(dst: *mut u8, lhs: *const u8, rhs: *const u8, len: usize) {
    for i in 0..len {
        *dst.add(i) = *lhs.add(i) ^ *rhs.add(i);
    }
}

unsafe fn copy_scalar(dst: *mut u8, src: *const u8, len: usize) {
    std::ptr::copy_nonoverlapping(src, dst, len);
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    #[target_feature(enable = "sse2")]
    pub unsafe fn xor_in_place_sse2(dst: *mut u8, src: *const u8, len: usize) {
        let mut i = 0;
        let limit = len & !15;
        while i < limit {
            let a = _mm_loadu_si128(dst.add(i) as *const __m128i);
            let b = _mm_loadu_si128(src.add(i) as *const __m128i);
            _mm_storeu_si128(dst.add(i) as *mut __m128i, _mm_xor_si128(a, b));
            i += 16;
        }
        while i < len {
            *dst.add(i) ^= *src.add(i);
            i += 1;
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn xor_buffers_sse2(dst: *mut u8, lhs: *const u8, rhs: *const u8, len: usize) {
        let mut i = 0;
        let limit = len & !15;
        while i < limit {
            let a = _mm_loadu_si128(lhs.add(i) as *const __m128i);
            let b = _mm_loadu_si128(rhs.add(i) as *const __m128i);
            _mm_storeu_si128(dst.add(i) as *mut __m128i, _mm_xor_si128(a, b));
            i += 16;
        }
        while i < len {
            *dst.add(i) = *lhs.add(i) ^ *rhs.add(i);
            i += 1;
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn copy_sse2(dst: *mut u8, src: *const u8, len: usize) {
        if len < 32 {
            std::ptr::copy_nonoverlapping(src, dst, len);
            return;
        }
        let mut i = 0;
        let limit = len & !15;
        while i < limit {
            let v = _mm_loadu_si128(src.add(i) as *const __m128i);
            _mm_storeu_si128(dst.add(i) as *mut __m128i, v);
            i += 16;
        }
        while i < len {
            *dst.add(i) = *src.add(i);
            i += 1;
        }
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn xor_in_place_avx2(dst: *mut u8, src: *const u8, len: usize) {
        let mut i = 0;
        let limit = len & !31;
        while i < limit {
            let a = _mm256_loadu_si256(dst.add(i) as *const __m256i);
            let b = _mm256_loadu_si256(src.add(i) as *const __m256i);
            _mm256_storeu_si256(dst.add(i) as *mut __m256i, _mm256_xor_si256(a, b));
            i += 32;
        }
        while i < len {
            *dst.add(i) ^= *src.add(i);
            i += 1;
        }
        // Reset the upper lanes so later SSE code doesn't pay the
        // AVX-to-SSE transition penalty.
        _mm256_zeroupper();
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn xor_buffers_avx2(dst: *mut u8, lhs: *const u8, rhs: *const u8, len: usize) {
        let mut i = 0;
        let limit = len & !31;
        while i < limit {
            let a = _mm256_loadu_si256(lhs.add(i) as *const __m256i);
            let b = _mm256_loadu_si256(rhs.add(i) as *const __m256i);
            _mm256_storeu_si256(dst.add(i) as *mut __m256i, _mm256_xor_si256(a, b));
            i += 32;
        }
        while i < len {
            *dst.add(i) = *lhs.add(i) ^ *rhs.add(i);
            i += 1;
        }
        _mm256_zeroupper();
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn copy_avx2(dst: *mut u8, src: *const u8, len: usize) {
        if len < 64 {
            std::ptr::copy_nonoverlapping(src, dst, len);
            return;
        }
        let mut i = 0;
        let limit = len & !31;
        while i < limit {
            let v = _mm256_loadu_si256(src.add(i) as *const __m256i);
            _mm256_storeu_si256(dst.add(i) as *mut __m256i, v);
            i += 32;
        }
        while i < len {
            *dst.add(i) = *src.add(i);
            i += 1;
        }
        _mm256_zeroupper();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_xor_buffers_matches_scalar() {
        // Odd length exercises the vector tail on every dispatch tier
        for len in [0, 1, 15, 16, 17, 31, 32, 33, 1000, 4093] {
            let lhs = pattern(len, 3);
            let rhs = pattern(len, 97);
            let mut dst = vec![0u8; len];
            xor_buffers(&mut dst, &lhs, &rhs);

            let expected: Vec<u8> = lhs.iter().zip(&rhs).map(|(a, b)| a ^ b).collect();
            assert_eq!(dst, expected, "len {}", len);
        }
    }

    #[test]
    fn test_xor_in_place_roundtrip() {
        let original = pattern(4093, 11);
        let key = pattern(4093, 42);

        let mut buf = original.clone();
        xor_in_place(&mut buf, &key);
        assert_ne!(buf, original);
        xor_in_place(&mut buf, &key);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_copy() {
        for len in [0, 7, 63, 64, 65, 2048] {
            let src = pattern(len, 5);
            let mut dst = vec![0u8; len];
            copy(&mut dst, &src);
            assert_eq!(dst, src);
        }
    }

    #[test]
    fn test_xor_of_equal_buffers_is_zero() {
        let data = pattern(512, 8);
        let mut dst = vec![0xffu8; 512];
        xor_buffers(&mut dst, &data, &data);
        assert!(dst.iter().all(|&b| b == 0));
    }
}
