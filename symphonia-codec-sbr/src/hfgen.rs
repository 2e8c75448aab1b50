// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// Previous Author: Kostya Shishkov <kostya.shiskov@gmail.com>
//
// This source file includes code originally written for the NihAV
// project. With the author's permission, it has been relicensed for,
// and ported to the Symphonia project.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `hfgen` module implements the high frequency generator: the low band buffer, the
//! inverse filtering (linear prediction) of the low band, the chirp factors, the patching of
//! low band subbands into the high band, and the assembly of the QMF matrix that is fed to the
//! synthesis filterbank.

use symphonia_core::errors::{decode_error, Result};

use crate::common::*;
use crate::complex::Complex;
use crate::dsp::SbrDsp;
use crate::freq::FrequencyTables;
use crate::grid::Grid;
use crate::ring::SlotRing;
use crate::sample::Sample;

/// One subband over the low band time span, `LOW_SLOTS` QMF slots.
pub type SubbandRow<S> = [Complex<S>; LOW_SLOTS];

/// Target chirp factors per inverse filtering mode.
const CHIRP_TARGETS: [f32; 4] = [0.0, 0.75, 0.9, 0.98];

/// Chirp factors below this threshold are set to 0.
const CHIRP_MIN: f32 = 0.015625;

/// Build the low band buffer `X_low` from the analysis history `w`.
///
/// `w` holds the last `LOW_SLOTS` analysis slots, newest first. The first `T_HFGEN` slots of
/// `X_low` belong to the previous frame and use the previous frame's crossover band.
pub fn lf_gen<S: Sample>(
    x_low: &mut [SubbandRow<S>],
    w: &SlotRing<Complex<S>>,
    kx: usize,
    kx_prev: usize,
) {
    for row in x_low.iter_mut() {
        row.fill(Complex::ZERO);
    }

    for i in 0..LOW_SLOTS {
        let slot = w.slot(LOW_SLOTS - 1 - i);
        let limit = if i < T_HFGEN { kx_prev } else { kx };

        for (row, &x) in x_low[..limit].iter_mut().zip(slot) {
            row[i] = x;
        }
    }
}

/// Compute the prediction coefficients `alpha0` and `alpha1` for the first `k0` subbands of
/// the low band.
pub fn inverse_filter<S: Sample, D: SbrDsp<S>>(
    dsp: &D,
    x_low: &[SubbandRow<S>],
    k0: usize,
    alpha0: &mut [Complex<S>],
    alpha1: &mut [Complex<S>],
) {
    let bound = S::from_f32(16.0);
    let rel = S::from_f32(1.000001);

    for k in 0..k0 {
        let r = dsp.autocorrelate(&x_low[k]);

        let dk = r.r22 * r.r11 - r.r12.norm_sqr() / rel;

        let a1 = if dk.is_zero() {
            Complex::ZERO
        }
        else {
            let num = r.r01 * r.r12 - r.r02.scale(r.r11);
            Complex::new(num.re / dk, num.im / dk)
        };

        let a0 = if r.r11.is_zero() {
            Complex::ZERO
        }
        else {
            let num = r.r01 + a1 * r.r12.conj();
            Complex::new(-num.re / r.r11, -num.im / r.r11)
        };

        if a0.norm_sqr() >= bound || a1.norm_sqr() >= bound {
            alpha0[k] = Complex::ZERO;
            alpha1[k] = Complex::ZERO;
        }
        else {
            alpha0[k] = a0;
            alpha1[k] = a1;
        }
    }
}

/// Update the chirp factors `bw` of the first `n_q` noise floor bands from the current and
/// previous inverse filtering modes.
pub fn chirp<S: Sample>(bw: &mut [S], invf_mode: &[u8], prev_invf_mode: &[u8], n_q: usize) {
    let min = S::from_f32(CHIRP_MIN);

    for ((bw, &mode), &prev) in bw[..n_q].iter_mut().zip(invf_mode).zip(prev_invf_mode) {
        // Switching between "off" and "low" uses an intermediate target.
        let target = if mode + prev == 1 { 0.6 } else { CHIRP_TARGETS[usize::from(mode & 3)] };
        let target = S::from_f32(target);

        let new = if target < *bw {
            S::from_f32(0.75) * target + S::from_f32(0.25) * *bw
        }
        else {
            S::from_f32(0.90625) * target + S::from_f32(0.09375) * *bw
        };

        *bw = if new < min { S::ZERO } else { new };
    }
}

/// Generate the high band `X_high` by patching low band subbands, each filtered by its
/// prediction coefficients and the chirp factor of the noise floor band it lands in.
#[allow(clippy::too_many_arguments)]
pub fn hf_gen<S: Sample, D: SbrDsp<S>>(
    dsp: &D,
    x_high: &mut [SubbandRow<S>],
    x_low: &[SubbandRow<S>],
    alpha0: &[Complex<S>],
    alpha1: &[Complex<S>],
    bw: &[S],
    tables: &FrequencyTables,
    grid: &Grid,
) -> Result<()> {
    let n_q = tables.n_q();

    let start = grid.env_start(0) + T_HFADJ;
    let end = grid.env_start(grid.num_env) + T_HFADJ;

    let mut k = tables.kx;
    let mut g = 0;

    for patch in tables.patches.iter() {
        for p in patch.start..patch.start + patch.len {
            while g <= n_q && k >= tables.noise[g] {
                g += 1;
            }

            if g == 0 || g > n_q {
                return decode_error("sbr: no noise floor band for patched subband");
            }

            g -= 1;

            dsp.hf_gen(&mut x_high[k], &x_low[p], alpha0[p], alpha1[p], bw[g], start, end);

            k += 1;
        }
    }

    for row in x_high[k..tables.kx + tables.m].iter_mut() {
        row.fill(Complex::ZERO);
    }

    Ok(())
}

/// The bands of the low and high parts of the QMF matrix for one frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BandSplit {
    /// The first high band subband.
    pub kx: usize,
    /// The number of high band subbands.
    pub m: usize,
}

/// Assemble the QMF matrix `X` of one frame from the low band, the high band tail of the
/// previous frame in `y_prev`, and the high band of the current frame in `y_cur`.
///
/// The first `spill` slots are covered by the last envelope of the previous frame, and use
/// the previous frame's band split.
pub fn x_gen<S: Sample>(
    x: &mut [[Complex<S>; SYNTHESIS_BANDS]],
    x_low: &[SubbandRow<S>],
    y_prev: &[[Complex<S>; SYNTHESIS_BANDS]],
    y_cur: &[[Complex<S>; SYNTHESIS_BANDS]],
    prev: BandSplit,
    cur: BandSplit,
    spill: usize,
) {
    for (i, x) in x[..QMF_SLOTS].iter_mut().enumerate() {
        x.fill(Complex::ZERO);

        let (split, y) = if i < spill { (prev, &y_prev[i + QMF_SLOTS]) } else { (cur, &y_cur[i]) };

        for (x, row) in x[..split.kx].iter_mut().zip(x_low) {
            *x = row[i + T_HFADJ];
        }

        let high = split.kx..split.kx + split.m;
        x[high.clone()].copy_from_slice(&y[high]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::PortableDsp;
    use crate::header::SpectrumParams;

    fn tables() -> FrequencyTables {
        let params = SpectrumParams {
            start_freq: 5,
            stop_freq: 9,
            xover_band: 0,
            freq_scale: 2,
            alter_scale: false,
            noise_bands: 2,
        };
        FrequencyTables::new(44100, &params, 2).unwrap()
    }

    fn fixfix_grid(num_env: usize) -> Grid {
        let mut grid = Grid { num_env, num_noise: 1, ..Default::default() };
        for e in 0..=num_env {
            grid.t_env[e] = e * NUM_TIME_SLOTS / num_env;
        }
        grid.t_q[1] = NUM_TIME_SLOTS;
        grid
    }

    #[test]
    fn verify_lf_gen() {
        let mut w = SlotRing::new(LOW_SLOTS, ANALYSIS_BANDS);

        // Slot n carries n + 1 in every subband.
        for n in 0..LOW_SLOTS {
            for x in w.push_slot().iter_mut() {
                *x = Complex::new(n as f32 + 1.0, 0.0);
            }
        }

        let mut x_low = vec![[Complex::ZERO; LOW_SLOTS]; ANALYSIS_BANDS];
        lf_gen(&mut x_low, &w, 20, 10);

        assert_eq!(x_low[5][0], Complex::new(1.0, 0.0));
        assert_eq!(x_low[5][39], Complex::new(40.0, 0.0));

        // The leading slots use the previous crossover band.
        assert_eq!(x_low[15][7], Complex::ZERO);
        assert_eq!(x_low[15][8], Complex::new(9.0, 0.0));
        assert_eq!(x_low[20][20], Complex::ZERO);
    }

    #[test]
    fn verify_inverse_filter_whitens_two_tones() {
        let z1 = Complex::new(0.98 * 0.4f32.cos(), 0.98 * 0.4f32.sin());
        let z2 = Complex::new(0.95 * 1.1f32.cos(), -0.95 * 1.1f32.sin());

        let mut row = [Complex::ZERO; LOW_SLOTS];
        let (mut p1, mut p2) = (Complex::new(1.0, 0.0), Complex::new(0.5, 0.0));
        for x in row.iter_mut() {
            *x = p1 + p2;
            p1 = p1 * z1;
            p2 = p2 * z2;
        }

        let x_low = vec![row, [Complex::ZERO; LOW_SLOTS]];
        let mut alpha0 = [Complex::new(1.0, 1.0); 2];
        let mut alpha1 = [Complex::new(1.0, 1.0); 2];

        inverse_filter(&PortableDsp, &x_low, 2, &mut alpha0, &mut alpha1);

        // A silent subband has no predictor.
        assert_eq!(alpha0[1], Complex::ZERO);
        assert_eq!(alpha1[1], Complex::ZERO);

        // Two tones are fully predictable by a second order predictor.
        let mut residual = [Complex::ZERO; LOW_SLOTS];
        PortableDsp.hf_gen(&mut residual, &row, alpha0[0], alpha1[0], 1.0, 2, LOW_SLOTS);

        for r in &residual[2..] {
            assert!(r.norm_sqr() < 1e-4, "{:?}", r);
        }
    }

    #[test]
    fn verify_chirp() {
        let mut bw = [0.0f32; 5];

        chirp(&mut bw, &[0, 2, 1, 0, 3], &[0, 2, 0, 0, 0], 4);
        for (bw, expected) in bw.iter().zip([0.0, 0.815625, 0.54375, 0.0, 0.0]) {
            assert!((bw - expected).abs() < 1e-6);
        }

        // Decaying towards a lower target.
        chirp(&mut bw, &[0, 0, 1, 0, 0], &[0, 2, 1, 0, 0], 3);
        assert!((bw[1] - 0.20390625).abs() < 1e-6);
        assert!((bw[2] - (0.90625 * 0.75 + 0.09375 * 0.54375)).abs() < 1e-6);

        // Small factors snap to 0.
        let mut bw = [0.05f32];
        chirp(&mut bw, &[0], &[0], 1);
        assert_eq!(bw[0], 0.0);
    }

    #[test]
    fn verify_hf_gen_patches() {
        let tables = tables();
        let grid = fixfix_grid(2);

        let mut x_low = vec![[Complex::ZERO; LOW_SLOTS]; ANALYSIS_BANDS];
        for (k, row) in x_low.iter_mut().enumerate() {
            row.fill(Complex::new(k as f32, 1.0));
        }

        let mut x_high = vec![[Complex::new(9.0, 9.0); LOW_SLOTS]; SYNTHESIS_BANDS];
        let alpha = [Complex::ZERO; ANALYSIS_BANDS];
        let bw = [0.5; MAX_NOISE_BANDS];

        hf_gen(&PortableDsp, &mut x_high, &x_low, &alpha, &alpha, &bw, &tables, &grid).unwrap();

        let mut k = tables.kx;
        for patch in tables.patches.iter() {
            for p in patch.start..patch.start + patch.len {
                assert_eq!(x_high[k][T_HFADJ], Complex::new(p as f32, 1.0));
                assert_eq!(x_high[k][QMF_SLOTS + T_HFADJ - 1], Complex::new(p as f32, 1.0));
                k += 1;
            }
        }
        assert_eq!(k, tables.kx + tables.m);
    }

    #[test]
    fn verify_x_gen() {
        let mut x_low = vec![[Complex::ZERO; LOW_SLOTS]; ANALYSIS_BANDS];
        for (k, row) in x_low.iter_mut().enumerate() {
            for (i, x) in row.iter_mut().enumerate() {
                *x = Complex::new(k as f32, i as f32);
            }
        }

        let y_prev = vec![[Complex::new(-1.0, 0.0); SYNTHESIS_BANDS]; HIGH_SLOTS];
        let y_cur = vec![[Complex::new(1.0, 0.0); SYNTHESIS_BANDS]; HIGH_SLOTS];

        let mut x = vec![[Complex::ZERO; SYNTHESIS_BANDS]; QMF_SLOTS];

        let prev = BandSplit { kx: 16, m: 20 };
        let cur = BandSplit { kx: 14, m: 33 };

        x_gen(&mut x, &x_low, &y_prev, &y_cur, prev, cur, 4);

        assert_eq!(x[0][15], Complex::new(15.0, 2.0));
        assert_eq!(x[0][16], Complex::new(-1.0, 0.0));
        assert_eq!(x[3][35], Complex::new(-1.0, 0.0));
        assert_eq!(x[3][36], Complex::ZERO);

        assert_eq!(x[4][13], Complex::new(13.0, 6.0));
        assert_eq!(x[4][14], Complex::new(1.0, 0.0));
        assert_eq!(x[31][46], Complex::new(1.0, 0.0));
        assert_eq!(x[31][47], Complex::ZERO);
    }
}
