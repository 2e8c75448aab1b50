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

//! The `hfadj` module implements the HF adjuster: it maps the envelope and noise floor scale
//! factors onto the high band subbands, estimates the energy of the generated high band,
//! derives limited gains, and assembles the adjusted high band with added noise and sinusoids.

use symphonia_core::errors::Result;

use crate::bitstream::ChannelFrame;
use crate::common::*;
use crate::complex::Complex;
use crate::dequant::ScaleFactors;
use crate::dsp::SbrDsp;
use crate::freq::FrequencyTables;
use crate::grid::Grid;
use crate::hfgen::SubbandRow;
use crate::ring::SlotRing;
use crate::sample::{ResetReseed, Sample};
use crate::tables::{H_SMOOTH, LIMITER_GAINS};

/// The largest gain the limiter allows.
const MAX_GAIN: f32 = 1e5;

/// The largest compensation gain, about 4 dB.
const MAX_BOOST: f32 = 1.584_893_2;

/// The number of past slots the gain smoothing filter reaches back.
const SMOOTH_LEN: usize = 4;

/// Per envelope and high band subband values of one channel for one frame. All arrays are
/// indexed by envelope, then by `k - kx`.
#[derive(Clone, Debug)]
pub struct Adjustment<S: Sample> {
    /// Reference envelope energies.
    pub e_orig: [[S; MAX_BANDS]; MAX_ENVELOPES],
    /// Noise floor to signal ratios.
    pub q_mapped: [[S; MAX_BANDS]; MAX_ENVELOPES],
    /// Subbands carrying an added sinusoid.
    pub s_index: [[bool; MAX_BANDS]; MAX_ENVELOPES],
    /// Subbands in a band with an added sinusoid.
    pub s_mapped: [[bool; MAX_BANDS]; MAX_ENVELOPES],
    /// Estimated energies of the generated high band.
    pub e_curr: [[S; MAX_BANDS]; MAX_ENVELOPES],
    pub gain: [[S; MAX_BANDS]; MAX_ENVELOPES],
    /// Noise levels.
    pub q_m: [[S; MAX_BANDS]; MAX_ENVELOPES],
    /// Sinusoid levels.
    pub s_m: [[S; MAX_BANDS]; MAX_ENVELOPES],
}

impl<S: Sample> Default for Adjustment<S> {
    fn default() -> Self {
        Adjustment {
            e_orig: [[S::ZERO; MAX_BANDS]; MAX_ENVELOPES],
            q_mapped: [[S::ZERO; MAX_BANDS]; MAX_ENVELOPES],
            s_index: [[false; MAX_BANDS]; MAX_ENVELOPES],
            s_mapped: [[false; MAX_BANDS]; MAX_ENVELOPES],
            e_curr: [[S::ZERO; MAX_BANDS]; MAX_ENVELOPES],
            gain: [[S::ZERO; MAX_BANDS]; MAX_ENVELOPES],
            q_m: [[S::ZERO; MAX_BANDS]; MAX_ENVELOPES],
            s_m: [[S::ZERO; MAX_BANDS]; MAX_ENVELOPES],
        }
    }
}

/// The HF adjuster state of one channel carried from frame to frame.
#[derive(Clone, Debug)]
pub struct AdjusterState<S: Sample> {
    /// Gains of the most recent slots, newest first.
    g_hist: SlotRing<S>,
    /// Noise levels of the most recent slots, newest first.
    q_hist: SlotRing<S>,
    /// Position in the noise table.
    pub index_noise: usize,
    /// Phase of the added sinusoids.
    pub index_sine: usize,
    /// The sinusoid map of the last envelope.
    pub prev_s_index: [bool; MAX_BANDS],
}

impl<S: Sample> AdjusterState<S> {
    pub fn new() -> Self {
        AdjusterState {
            g_hist: SlotRing::new(SMOOTH_LEN + 1, MAX_BANDS),
            q_hist: SlotRing::new(SMOOTH_LEN + 1, MAX_BANDS),
            index_noise: 0,
            index_sine: 0,
            prev_s_index: [false; MAX_BANDS],
        }
    }

    pub fn reset(&mut self) {
        self.g_hist.clear();
        self.q_hist.clear();
        self.index_noise = 0;
        self.index_sine = 0;
        self.prev_s_index = [false; MAX_BANDS];
    }

    fn push_gains(&mut self, gain: &[S], q_m: &[S]) {
        self.g_hist.push_slot()[..gain.len()].copy_from_slice(gain);
        self.q_hist.push_slot()[..q_m.len()].copy_from_slice(q_m);
    }
}

impl<S: Sample> Default for AdjusterState<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Map the dequantized scale factors and the sinusoid flags of a frame onto the high band
/// subbands.
pub fn mapping<S: Sample>(
    adj: &mut Adjustment<S>,
    state: &mut AdjusterState<S>,
    frame: &ChannelFrame,
    facs: &ScaleFactors<S>,
    tables: &FrequencyTables,
) -> Result<()> {
    let grid = &frame.grid;
    let kx = tables.kx;

    adj.s_index = [[false; MAX_BANDS]; MAX_ENVELOPES];

    for e in 0..grid.num_env {
        let table = tables.env_table(grid.freq_res[e]);

        // Tables are always rebuilt together, so this only fails on a logic error.
        validate!(table[0] == kx);

        for (band, &env) in table.windows(2).zip(facs.env[e].iter()) {
            adj.e_orig[e][band[0] - kx..band[1] - kx].fill(env);
        }

        let q = usize::from(grid.num_noise > 1 && grid.t_env[e] >= grid.t_q[1]);

        for (band, &noise) in tables.noise.windows(2).zip(facs.noise[q].iter()) {
            adj.q_mapped[e][band[0] - kx..band[1] - kx].fill(noise);
        }

        if frame.add_harmonic_flag {
            // A sinusoid starts at the transient envelope, unless it was already present.
            let started = match grid.e_a[1] {
                Some(e_a) => e >= e_a,
                None => true,
            };

            for (band, &harmonic) in tables.high.windows(2).zip(frame.add_harmonic.iter()) {
                let mid = ((band[0] + band[1]) >> 1) - kx;
                adj.s_index[e][mid] = harmonic && (started || state.prev_s_index[mid]);
            }
        }

        for band in table.windows(2) {
            let range = band[0] - kx..band[1] - kx;
            let present = adj.s_index[e][range.clone()].contains(&true);
            adj.s_mapped[e][range].fill(present);
        }
    }

    state.prev_s_index = adj.s_index[grid.num_env - 1];

    Ok(())
}

/// Estimate the energy of each envelope of the generated high band, per subband if
/// `interpol_freq` is set, or averaged over each band otherwise.
pub fn env_estimate<S: Sample, D: SbrDsp<S>>(
    dsp: &D,
    adj: &mut Adjustment<S>,
    x_high: &[SubbandRow<S>],
    tables: &FrequencyTables,
    grid: &Grid,
    interpol_freq: bool,
) {
    let kx = tables.kx;

    for e in 0..grid.num_env {
        let ilb = grid.env_start(e) + T_HFADJ;
        let iub = grid.env_end(e) + T_HFADJ;
        let env_size = iub - ilb;

        if interpol_freq {
            let scale = S::ONE / S::from_i32(env_size as i32);

            for (m, e_curr) in adj.e_curr[e][..tables.m].iter_mut().enumerate() {
                *e_curr = dsp.sum_square(&x_high[kx + m][ilb..iub]) * scale;
            }
        }
        else {
            for band in tables.env_table(grid.freq_res[e]).windows(2) {
                let mut sum = S::ZERO;

                for row in x_high[band[0]..band[1]].iter() {
                    sum += dsp.sum_square(&row[ilb..iub]);
                }

                let den = S::from_i32((env_size * (band[1] - band[0])) as i32);
                adj.e_curr[e][band[0] - kx..band[1] - kx].fill(sum / den);
            }
        }
    }
}

/// Compute the gains, noise levels, and sinusoid levels of each envelope, limited per limiter
/// band.
pub fn gain_calc<S: Sample>(
    adj: &mut Adjustment<S>,
    tables: &FrequencyTables,
    grid: &Grid,
    limiter_gains: u8,
) {
    let kx = tables.kx;

    let eps = S::EPSILON;
    let lim_gain = S::from_f32(LIMITER_GAINS[usize::from(limiter_gains & 3)]);
    let max_gain = S::from_f32(MAX_GAIN);
    let max_boost = S::from_f32(MAX_BOOST);

    for e in 0..grid.num_env {
        // Transient envelopes do not add noise.
        let delta = !grid.is_transient(e);

        for band in tables.limiter.windows(2) {
            let range = band[0] - kx..band[1] - kx;

            let mut sum_orig = S::ZERO;
            let mut sum_curr = S::ZERO;

            for m in range.clone() {
                let e_orig = adj.e_orig[e][m];
                let e_curr = adj.e_curr[e][m];
                let q = adj.q_mapped[e][m];

                let temp = e_orig / (S::ONE + q);

                adj.q_m[e][m] = (temp * q).sqrt();
                adj.s_m[e][m] = if adj.s_index[e][m] { temp.sqrt() } else { S::ZERO };

                adj.gain[e][m] = if adj.s_mapped[e][m] {
                    (e_orig * q / ((S::ONE + e_curr) * (S::ONE + q))).sqrt()
                }
                else if delta {
                    (e_orig / ((S::ONE + e_curr) * (S::ONE + q))).sqrt()
                }
                else {
                    (e_orig / (S::ONE + e_curr)).sqrt()
                };

                sum_orig += e_orig;
                sum_curr += e_curr;
            }

            let ratio = (eps + sum_orig) / (eps + sum_curr);
            let gain_max = (lim_gain * ratio.sqrt()).minimum(max_gain);

            for m in range.clone() {
                let gain = adj.gain[e][m];

                if gain > gain_max {
                    adj.q_m[e][m] = adj.q_m[e][m] * gain_max / gain;
                    adj.gain[e][m] = gain_max;
                }
            }

            let mut sum_adj = S::ZERO;

            for m in range.clone() {
                let gain = adj.gain[e][m];
                let q_m = adj.q_m[e][m];
                let s_m = adj.s_m[e][m];

                sum_adj += adj.e_curr[e][m] * gain * gain + s_m * s_m;

                if delta && s_m.is_zero() {
                    sum_adj += q_m * q_m;
                }
            }

            let boost = ((eps + sum_orig) / (eps + sum_adj)).sqrt().minimum(max_boost);

            for m in range {
                adj.gain[e][m] *= boost;
                adj.q_m[e][m] *= boost;
                adj.s_m[e][m] *= boost;
            }
        }
    }
}

/// Apply the gains to the generated high band and add noise and sinusoids, writing the
/// adjusted high band into `y`.
///
/// With `smoothing_mode` clear, gains and noise levels are smoothed over time, except in
/// transient envelopes. On `reset` the smoothing history is re-seeded as selected by
/// `S::RESET_RESEED`.
#[allow(clippy::too_many_arguments)]
pub fn hf_assemble<S: Sample, D: SbrDsp<S>>(
    dsp: &D,
    y: &mut [[Complex<S>; SYNTHESIS_BANDS]],
    x_high: &[SubbandRow<S>],
    adj: &Adjustment<S>,
    state: &mut AdjusterState<S>,
    tables: &FrequencyTables,
    grid: &Grid,
    smoothing_mode: bool,
    reset: bool,
) {
    let kx = tables.kx;
    let m = tables.m;

    let h_sl = if smoothing_mode { 0 } else { SMOOTH_LEN };

    if reset && h_sl > 0 && S::RESET_RESEED == ResetReseed::Broadcast {
        for _ in 0..h_sl {
            state.push_gains(&adj.gain[0][..m], &adj.q_m[0][..m]);
        }
    }

    let h_smooth = H_SMOOTH.map(S::from_f32);

    let mut g_filt = [S::ZERO; MAX_BANDS];
    let mut q_filt = [S::ZERO; MAX_BANDS];

    let mut index_noise = state.index_noise;
    let mut index_sine = state.index_sine;

    for e in 0..grid.num_env {
        let transient = grid.is_transient(e);

        for i in grid.env_start(e)..grid.env_end(e) {
            state.push_gains(&adj.gain[e][..m], &adj.q_m[e][..m]);

            if h_sl > 0 && !transient {
                g_filt[..m].fill(S::ZERO);
                q_filt[..m].fill(S::ZERO);

                for (j, &h) in h_smooth.iter().enumerate() {
                    let g_hist = state.g_hist.slot(j);
                    let q_hist = state.q_hist.slot(j);

                    for k in 0..m {
                        g_filt[k] += g_hist[k] * h;
                        q_filt[k] += q_hist[k] * h;
                    }
                }
            }
            else {
                g_filt[..m].copy_from_slice(&state.g_hist.slot(0)[..m]);
                q_filt[..m].copy_from_slice(&state.q_hist.slot(0)[..m]);
            }

            let y = &mut y[i][kx..kx + m];

            dsp.hf_g_filt(y, &x_high[kx..kx + m], &g_filt[..m], i + T_HFADJ);

            if !transient {
                dsp.hf_apply_noise(y, &adj.s_m[e][..m], &q_filt[..m], index_noise, index_sine, kx);
            }
            else {
                // Transient envelopes always carry their sinusoids, alternating in sign.
                let idx = index_sine & 1;
                let a = if (index_sine + (kx & 1)) & 2 == 0 { S::ONE } else { -S::ONE };
                let b = if idx == 1 { -a } else { a };

                for (k, (y, &s)) in y.iter_mut().zip(adj.s_m[e][..m].iter()).enumerate() {
                    let val = if k & 1 == 0 { s * a } else { s * b };

                    if idx == 0 {
                        y.re += val;
                    }
                    else {
                        y.im += val;
                    }
                }
            }

            index_noise = (index_noise + m) & 0x1ff;
            index_sine = (index_sine + 1) & 3;
        }
    }

    state.index_noise = index_noise;
    state.index_sine = index_sine;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::PortableDsp;
    use crate::grid::PreviousFrameState;
    use crate::header::SpectrumParams;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

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

    fn frame(num_env: usize, num_noise: usize) -> ChannelFrame {
        let mut grid = Grid { num_env, num_noise, ..Default::default() };
        for e in 0..=num_env {
            grid.t_env[e] = e * NUM_TIME_SLOTS / num_env;
        }
        for q in 0..=num_noise {
            grid.t_q[q] = q * NUM_TIME_SLOTS / num_noise;
        }
        ChannelFrame::new(grid, &PreviousFrameState::default())
    }

    #[test]
    fn verify_mapping() {
        let tables = tables();
        let mut state = AdjusterState::<f32>::new();
        let mut adj = Adjustment::default();

        let mut frame = frame(2, 2);
        frame.grid.freq_res[1] = true;
        frame.add_harmonic_flag = true;
        frame.add_harmonic[1] = true;

        let mut facs = ScaleFactors::<f32>::default();
        for (j, env) in facs.env[0].iter_mut().enumerate() {
            *env = j as f32;
        }
        facs.env[1] = facs.env[0];
        facs.noise[0] = [1.0, 2.0, 3.0, 0.0, 0.0];
        facs.noise[1] = [4.0, 5.0, 6.0, 0.0, 0.0];

        mapping(&mut adj, &mut state, &frame, &facs, &tables).unwrap();

        // Low resolution band 1 is subbands 16..18, high resolution band 2 is 16..17.
        assert_eq!(adj.e_orig[0][16 - 14], 1.0);
        assert_eq!(adj.e_orig[0][17 - 14], 1.0);
        assert_eq!(adj.e_orig[1][16 - 14], 2.0);
        assert_eq!(adj.e_orig[1][17 - 14], 3.0);
        assert_eq!(adj.e_orig[1][46 - 14], 17.0);

        // The second envelope starts at the second noise floor.
        assert_eq!(adj.q_mapped[0][0], 1.0);
        assert_eq!(adj.q_mapped[0][32], 3.0);
        assert_eq!(adj.q_mapped[1][6], 5.0);

        // High band 1 spans subbands 15..16, so the sinusoid sits in subband 15.
        assert!(adj.s_index[0][1]);
        assert_eq!(adj.s_index[0].iter().filter(|&&s| s).count(), 1);
        assert!(adj.s_mapped[0][0] && adj.s_mapped[0][1]);
        assert!(!adj.s_mapped[0][2]);
        assert!(adj.s_mapped[1][1] && !adj.s_mapped[1][0]);

        assert_eq!(state.prev_s_index, adj.s_index[1]);
    }

    #[test]
    fn verify_mapping_transient_sinusoids() {
        let tables = tables();
        let mut state = AdjusterState::<f32>::new();
        let mut adj = Adjustment::default();

        let mut frame = frame(4, 2);
        frame.grid.e_a[1] = Some(2);
        frame.add_harmonic_flag = true;
        frame.add_harmonic[0] = true;
        frame.add_harmonic[5] = true;

        let facs = ScaleFactors::<f32>::default();

        // High band 5 spans 19..20. A sinusoid not present before starts at the transient.
        state.prev_s_index[19 - 14] = true;
        mapping(&mut adj, &mut state, &frame, &facs, &tables).unwrap();

        assert!(!adj.s_index[1][0]);
        assert!(adj.s_index[2][0]);
        assert!(adj.s_index[0][5]);
        assert!(adj.s_index[3][5]);
    }

    #[test]
    fn verify_env_estimate() {
        let tables = tables();
        let frame = frame(1, 1);
        let mut adj = Adjustment::<f32>::default();

        let mut x_high = vec![[Complex::ZERO; LOW_SLOTS]; SYNTHESIS_BANDS];
        for (k, row) in x_high.iter_mut().enumerate() {
            row[T_HFADJ..T_HFADJ + QMF_SLOTS].fill(Complex::new(k as f32, 0.0));
        }

        env_estimate(&PortableDsp, &mut adj, &x_high, &tables, &frame.grid, true);
        assert_eq!(adj.e_curr[0][0], 196.0);
        assert_eq!(adj.e_curr[0][1], 225.0);

        // Averaged over low resolution band 0, subbands 14..16.
        env_estimate(&PortableDsp, &mut adj, &x_high, &tables, &frame.grid, false);
        assert_eq!(adj.e_curr[0][0], 210.5);
        assert_eq!(adj.e_curr[0][1], 210.5);
    }

    #[test]
    fn verify_gain_calc() {
        let tables = tables();
        let frame = frame(1, 1);
        let mut adj = Adjustment::<f32>::default();

        // Matching energies and no noise give unity gain.
        adj.e_orig[0][..tables.m].fill(100.0);
        adj.e_curr[0][..tables.m].fill(99.0);

        gain_calc(&mut adj, &tables, &frame.grid, 3);

        for m in 0..tables.m {
            assert!((adj.gain[0][m] - 1.0).abs() < 1e-4);
            assert_eq!(adj.q_m[0][m], 0.0);
            assert_eq!(adj.s_m[0][m], 0.0);
        }
    }

    #[test]
    fn verify_gain_calc_limits() {
        let tables = tables();
        let mut rng = SmallRng::seed_from_u64(0x5b2);

        for _ in 0..200 {
            let mut frame = frame(2, 1);
            if rng.random_bool(0.3) {
                frame.grid.e_a[1] = Some(1);
            }

            let limiter_gains = rng.random_range(0..4u8);
            let mut adj = Adjustment::<f32>::default();

            for e in 0..2 {
                for m in 0..tables.m {
                    adj.e_orig[e][m] = rng.random_range(0.0..1e9f32);
                    adj.e_curr[e][m] = rng.random_range(0.0..1e9f32);
                    adj.q_mapped[e][m] = rng.random_range(0.0..64.0f32);
                    adj.s_index[e][m] = rng.random_bool(0.1);
                    adj.s_mapped[e][m] = adj.s_index[e][m] || rng.random_bool(0.1);
                }
            }

            let reference = adj.clone();
            gain_calc(&mut adj, &tables, &frame.grid, limiter_gains);

            for e in 0..2 {
                for band in tables.limiter.windows(2) {
                    let range = band[0] - 14..band[1] - 14;

                    let sum_orig: f32 = reference.e_orig[e][range.clone()].iter().sum();
                    let sum_curr: f32 = reference.e_curr[e][range.clone()].iter().sum();

                    let ratio = (f32::EPSILON + sum_orig) / (f32::EPSILON + sum_curr);
                    let ceiling = (LIMITER_GAINS[usize::from(limiter_gains)] * ratio.sqrt())
                        .min(MAX_GAIN)
                        * MAX_BOOST;

                    for m in range {
                        assert!(adj.gain[e][m] <= ceiling * 1.0001);
                        assert!(adj.q_m[e][m] >= 0.0);
                        assert!(adj.s_m[e][m] >= 0.0);
                    }
                }
            }
        }
    }

    /// Assemble one frame into a zeroed high band buffer.
    fn assemble(
        adj: &Adjustment<f32>,
        x_high: &[SubbandRow<f32>],
        state: &mut AdjusterState<f32>,
        grid: &Grid,
        smoothing_mode: bool,
        reset: bool,
    ) -> Vec<[Complex<f32>; SYNTHESIS_BANDS]> {
        let tables = tables();
        let mut y = vec![[Complex::ZERO; SYNTHESIS_BANDS]; HIGH_SLOTS];
        hf_assemble(
            &PortableDsp,
            &mut y,
            x_high,
            adj,
            state,
            &tables,
            grid,
            smoothing_mode,
            reset,
        );
        y
    }

    #[test]
    fn verify_hf_assemble() {
        let tables = tables();
        let frame = frame(1, 1);
        let (kx, m) = (tables.kx, tables.m);

        let mut adj = Adjustment::<f32>::default();
        adj.gain[0][..m].fill(2.0);

        let mut x_high = vec![[Complex::ZERO; LOW_SLOTS]; SYNTHESIS_BANDS];
        for row in x_high.iter_mut() {
            row.fill(Complex::new(1.0, -1.0));
        }

        let mut state = AdjusterState::new();

        // Re-seeding on reset keeps smoothed gains flat.
        let y = assemble(&adj, &x_high, &mut state, &frame.grid, false, true);

        for slot in y[..QMF_SLOTS].iter() {
            assert_eq!(slot[kx - 1], Complex::ZERO);
            for y in slot[kx..kx + m].iter() {
                assert!((y.re - 2.0).abs() < 1e-5 && (y.im + 2.0).abs() < 1e-5);
            }
            assert_eq!(slot[kx + m], Complex::ZERO);
        }

        assert_eq!(state.index_noise, (QMF_SLOTS * m) & 0x1ff);
        assert_eq!(state.index_sine, 0);
    }

    #[test]
    fn verify_hf_assemble_smoothing() {
        let tables = tables();
        let frame = frame(1, 1);
        let kx = tables.kx;

        let mut adj = Adjustment::<f32>::default();
        adj.gain[0].fill(1.0);

        let mut x_high = vec![[Complex::ZERO; LOW_SLOTS]; SYNTHESIS_BANDS];
        for row in x_high.iter_mut() {
            row.fill(Complex::new(1.0, 0.0));
        }

        let mut state = AdjusterState::new();

        // Without a reset the gains fade in from the zeroed history.
        let y = assemble(&adj, &x_high, &mut state, &frame.grid, false, false);

        assert!((y[0][kx].re - H_SMOOTH[0]).abs() < 1e-6);
        assert!((y[1][kx].re - (H_SMOOTH[0] + H_SMOOTH[1])).abs() < 1e-6);
        assert!((y[4][kx].re - 1.0).abs() < 1e-5);

        // Smoothing disabled applies the gains directly.
        let mut state = AdjusterState::new();
        let y = assemble(&adj, &x_high, &mut state, &frame.grid, true, false);
        assert_eq!(y[0][kx].re, 1.0);
    }

    #[test]
    fn verify_hf_assemble_transient_sinusoids() {
        let tables = tables();
        let mut frame = frame(1, 1);
        frame.grid.e_a[1] = Some(0);
        let (kx, m) = (tables.kx, tables.m);

        let mut adj = Adjustment::<f32>::default();
        adj.s_m[0][..m].fill(1.0);

        let x_high = vec![[Complex::ZERO; LOW_SLOTS]; SYNTHESIS_BANDS];
        let mut state = AdjusterState::new();
        let y = assemble(&adj, &x_high, &mut state, &frame.grid, false, false);

        // kx is even. Phase 0 is +1 on the real part, phase 1 alternates on the imaginary part.
        assert_eq!(y[0][kx], Complex::new(1.0, 0.0));
        assert_eq!(y[0][kx + 1], Complex::new(1.0, 0.0));
        assert_eq!(y[1][kx], Complex::new(0.0, 1.0));
        assert_eq!(y[1][kx + 1], Complex::new(0.0, -1.0));
        assert_eq!(y[2][kx], Complex::new(-1.0, 0.0));
        assert_eq!(y[3][kx], Complex::new(0.0, -1.0));
        assert_eq!(y[3][kx + 1], Complex::new(0.0, 1.0));
    }
}
