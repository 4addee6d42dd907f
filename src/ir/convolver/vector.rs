//! Small numeric kernels shared by the segment convolver and the executor.
//!
//! Slices of at least [`SIMD_THRESHOLD`] samples go through fixed-width
//! chunks the compiler can vectorize; shorter ones use a plain loop.

use rustfft::num_complex::Complex;

use super::Sample;

pub const SIMD_THRESHOLD: usize = 8;
const LANES: usize = 8;

/// `dst[n] += src[n]`
#[inline]
pub fn add_into<T: Sample>(dst: &mut [T], src: &[T]) {
    debug_assert_eq!(dst.len(), src.len());

    if dst.len() >= SIMD_THRESHOLD {
        let mut d = dst.chunks_exact_mut(LANES);
        let mut s = src.chunks_exact(LANES);
        for (dc, sc) in d.by_ref().zip(s.by_ref()) {
            for (a, &b) in dc.iter_mut().zip(sc) {
                *a = *a + b;
            }
        }
        for (a, &b) in d.into_remainder().iter_mut().zip(s.remainder()) {
            *a = *a + b;
        }
    } else {
        for (a, &b) in dst.iter_mut().zip(src) {
            *a = *a + b;
        }
    }
}

/// `buf[n] *= gain`, skipped entirely for unity gain.
#[inline]
pub fn scale<T: Sample>(buf: &mut [T], gain: T) {
    if gain == T::one() {
        return;
    }

    if buf.len() >= SIMD_THRESHOLD {
        let mut chunks = buf.chunks_exact_mut(LANES);
        for chunk in chunks.by_ref() {
            for x in chunk.iter_mut() {
                *x = *x * gain;
            }
        }
        for x in chunks.into_remainder() {
            *x = *x * gain;
        }
    } else {
        for x in buf.iter_mut() {
            *x = *x * gain;
        }
    }
}

/// Half-complex multiply-accumulate: `acc += a * b` over a real FFT spectrum.
///
/// Interior bins are complex products. The DC and Nyquist bins of a real
/// signal are purely real, so only their real parts are multiplied and their
/// imaginary parts stay exactly zero.
#[inline]
pub fn complex_mul_add<T: Sample>(acc: &mut [Complex<T>], a: &[Complex<T>], b: &[Complex<T>]) {
    debug_assert_eq!(acc.len(), a.len());
    debug_assert_eq!(acc.len(), b.len());

    let Some(last) = acc.len().checked_sub(1) else {
        return;
    };

    acc[0].re = a[0].re.mul_add(b[0].re, acc[0].re);
    if last == 0 {
        return;
    }
    acc[last].re = a[last].re.mul_add(b[last].re, acc[last].re);

    for ((c, x), h) in acc[1..last]
        .iter_mut()
        .zip(&a[1..last])
        .zip(&b[1..last])
    {
        c.re = c.re + x.re * h.re - x.im * h.im;
        c.im = c.im + x.re * h.im + x.im * h.re;
    }
}

/// `dst[n] = down[n] * prev[n] + up[n] * next[n]`
#[inline]
pub fn crossfade<T: Sample>(dst: &mut [T], prev: &[T], next: &[T], down: &[T], up: &[T]) {
    for ((((out, &p), &n), &d), &u) in dst.iter_mut().zip(prev).zip(next).zip(down).zip(up) {
        *out = d.mul_add(p, u * n);
    }
}
