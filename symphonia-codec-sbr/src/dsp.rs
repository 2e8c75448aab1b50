// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dsp` module defines the inner loops of the high frequency generator and the envelope
//! adjuster as a trait, so that optimized implementations may be substituted for the portable
//! one.

use crate::common::LOW_SLOTS;
use crate::complex::Complex;
use crate::sample::Sample;
use crate::tables::NOISE_TABLE;

/// The autocorrelation of one low band subband, `phi(i, j)`, over the 38 sample span used by
/// the linear prediction in the high frequency generator.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Autocorrelation<S: Sample> {
    pub r01: Complex<S>,
    pub r02: Complex<S>,
    pub r11: S,
    pub r12: Complex<S>,
    pub r22: S,
}

/// The SBR DSP kernels.
pub trait SbrDsp<S: Sample> {
    /// Compute the sum of squared magnitudes of `x`.
    fn sum_square(&self, x: &[Complex<S>]) -> S;

    /// Compute the autocorrelation of one low band subband.
    fn autocorrelate(&self, x: &[Complex<S>; LOW_SLOTS]) -> Autocorrelation<S>;

    /// Patch one subband using a second order complex linear predictor, for each `i` in
    /// `start..end`:
    ///
    /// `x_high[i] = x_low[i] + bw * alpha0 * x_low[i - 1] + bw^2 * alpha1 * x_low[i - 2]`
    #[allow(clippy::too_many_arguments)]
    fn hf_gen(
        &self,
        x_high: &mut [Complex<S>],
        x_low: &[Complex<S>],
        alpha0: Complex<S>,
        alpha1: Complex<S>,
        bw: S,
        start: usize,
        end: usize,
    );

    /// Apply the smoothed gains to time slot `ixh` of a run of high band subbands.
    fn hf_g_filt(
        &self,
        y: &mut [Complex<S>],
        x_high: &[[Complex<S>; LOW_SLOTS]],
        g_filt: &[S],
        ixh: usize,
    );

    /// Add either a sinusoid or noise to each of a run of high band subbands starting at
    /// subband `kx`. A subband receives a sinusoid if its sinusoid level is non-zero.
    ///
    /// `index_sine` selects the phase of the sinusoids, and `index_noise` the position in the
    /// noise table.
    fn hf_apply_noise(
        &self,
        y: &mut [Complex<S>],
        s_m: &[S],
        q_filt: &[S],
        index_noise: usize,
        index_sine: usize,
        kx: usize,
    );
}

/// The portable implementation of the SBR DSP kernels.
#[derive(Copy, Clone, Debug, Default)]
pub struct PortableDsp;

/// Add `val` to `acc` with the sign of `sign`. Nothing is added for a zero sign.
#[inline(always)]
fn add_signed<S: Sample>(acc: &mut S, val: S, sign: i32) {
    if sign > 0 {
        *acc += val;
    }
    else if sign < 0 {
        *acc -= val;
    }
}

impl<S: Sample> SbrDsp<S> for PortableDsp {
    fn sum_square(&self, x: &[Complex<S>]) -> S {
        x.iter().fold(S::ZERO, |acc, x| acc + x.norm_sqr())
    }

    fn autocorrelate(&self, x: &[Complex<S>; LOW_SLOTS]) -> Autocorrelation<S> {
        // The 38 sample spans of the three lags share all but their first or last product.
        let mut energy = S::ZERO;
        let mut lag1 = Complex::ZERO;
        let mut lag2 = Complex::ZERO;

        for i in 1..38 {
            energy += x[i].norm_sqr();
            lag1 += x[i].conj() * x[i + 1];
            lag2 += x[i].conj() * x[i + 2];
        }

        Autocorrelation {
            r01: lag1 + x[38].conj() * x[39],
            r02: lag2 + x[0].conj() * x[2],
            r11: energy + x[38].norm_sqr(),
            r12: lag1 + x[0].conj() * x[1],
            r22: energy + x[0].norm_sqr(),
        }
    }

    fn hf_gen(
        &self,
        x_high: &mut [Complex<S>],
        x_low: &[Complex<S>],
        alpha0: Complex<S>,
        alpha1: Complex<S>,
        bw: S,
        start: usize,
        end: usize,
    ) {
        let a0 = alpha0.scale(bw);
        let a1 = alpha1.scale(bw * bw);

        for i in start..end {
            x_high[i] = x_low[i] + a0 * x_low[i - 1] + a1 * x_low[i - 2];
        }
    }

    fn hf_g_filt(
        &self,
        y: &mut [Complex<S>],
        x_high: &[[Complex<S>; LOW_SLOTS]],
        g_filt: &[S],
        ixh: usize,
    ) {
        for ((y, x_high), &g) in y.iter_mut().zip(x_high).zip(g_filt) {
            *y = x_high[ixh].scale(g);
        }
    }

    fn hf_apply_noise(
        &self,
        y: &mut [Complex<S>],
        s_m: &[S],
        q_filt: &[S],
        index_noise: usize,
        index_sine: usize,
        kx: usize,
    ) {
        // Sinusoids on odd phases alternate sign between subbands, starting with the sign of
        // subband kx.
        let kx_sign = if kx & 1 == 1 { -1 } else { 1 };

        let (re_sign, mut im_sign) = match index_sine & 3 {
            0 => (1, 0),
            1 => (0, kx_sign),
            2 => (-1, 0),
            _ => (0, -kx_sign),
        };

        for (m, ((y, &s), &q)) in y.iter_mut().zip(s_m).zip(q_filt).enumerate() {
            if !s.is_zero() {
                add_signed(&mut y.re, s, re_sign);
                add_signed(&mut y.im, s, im_sign);
            }
            else {
                let noise = &NOISE_TABLE[(index_noise + m + 1) & 0x1ff];
                *y += Complex::from_f32(noise[0], noise[1]).scale(q);
            }

            im_sign = -im_sign;
        }
    }
}
