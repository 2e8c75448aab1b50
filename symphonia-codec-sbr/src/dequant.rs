// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dequant` module converts quantized envelope and noise floor scale factors into
//! energies.

use log::warn;

use crate::bitstream::ChannelFrame;
use crate::common::*;
use crate::freq::FrequencyTables;
use crate::sample::Sample;

/// `log2(1e20)`. Envelope energies above `1e20` are invalid.
const MAX_ENV_EXP: f32 = 66.438_56;

/// The noise floor offset, `NOISE_FLOOR_OFFSET`.
const NOISE_OFFSET: f32 = 6.0;

/// Dequantized scale factors of one channel for one frame.
#[derive(Clone, Debug)]
pub struct ScaleFactors<S: Sample> {
    /// Envelope energies per envelope and band.
    pub env: [[S; MAX_BANDS]; MAX_ENVELOPES],
    /// Noise floor to signal ratios per noise floor and band.
    pub noise: [[S; MAX_NOISE_BANDS]; MAX_NOISE_ENVELOPES],
}

impl<S: Sample> Default for ScaleFactors<S> {
    fn default() -> Self {
        ScaleFactors {
            env: [[S::ZERO; MAX_BANDS]; MAX_ENVELOPES],
            noise: [[S::ZERO; MAX_NOISE_BANDS]; MAX_NOISE_ENVELOPES],
        }
    }
}

/// Compute `2^exp` for an envelope energy, replacing invalid energies with 1.
fn env_exp2<S: Sample>(exp: f32) -> S {
    if exp > MAX_ENV_EXP {
        warn!("sbr: envelope scale factor overflow");
        S::ONE
    }
    else {
        S::exp2(exp)
    }
}

/// The dequantization step, in powers of 2, for an amplitude resolution.
fn alpha(amp_res: bool) -> f32 {
    if amp_res {
        1.0
    }
    else {
        0.5
    }
}

/// Dequantize the scale factors of a channel coded independently.
pub fn dequant<S: Sample>(frame: &ChannelFrame, tables: &FrequencyTables) -> ScaleFactors<S> {
    let mut facs = ScaleFactors::default();

    let grid = &frame.grid;
    let alpha = alpha(grid.amp_res);

    for e in 0..grid.num_env {
        let num_bands = tables.num_env_bands(grid.freq_res[e]);

        for (env, &q) in facs.env[e][..num_bands].iter_mut().zip(frame.env_facs[e].iter()) {
            *env = env_exp2(alpha * q as f32 + 6.0);
        }
    }

    for q in 0..grid.num_noise {
        for (noise, &n) in facs.noise[q][..tables.n_q()].iter_mut().zip(frame.noise_facs[q].iter())
        {
            *noise = S::exp2(NOISE_OFFSET - n as f32);
        }
    }

    facs
}

/// Dequantize the scale factors of a coupled channel pair. The left channel carries the level,
/// and the right channel the balance between both channels.
pub fn dequant_coupled<S: Sample>(
    left: &ChannelFrame,
    right: &ChannelFrame,
    tables: &FrequencyTables,
) -> [ScaleFactors<S>; 2] {
    let mut facs = [ScaleFactors::default(), ScaleFactors::default()];

    let grid = &left.grid;
    let alpha = alpha(grid.amp_res);
    let pan_offset = if grid.amp_res { 12.0 } else { 24.0 };

    for e in 0..grid.num_env {
        for k in 0..tables.num_env_bands(grid.freq_res[e]) {
            let level = env_exp2::<S>(alpha * left.env_facs[e][k] as f32 + 7.0);
            let ratio = env_exp2::<S>(alpha * (pan_offset - right.env_facs[e][k] as f32));

            let fac = level / (S::ONE + ratio);

            facs[0].env[e][k] = fac;
            facs[1].env[e][k] = fac * ratio;
        }
    }

    for q in 0..grid.num_noise {
        for k in 0..tables.n_q() {
            let level = S::exp2(NOISE_OFFSET - left.noise_facs[q][k] as f32 + 1.0);
            let ratio = S::exp2(12.0 - right.noise_facs[q][k] as f32);

            let fac = level / (S::ONE + ratio);

            facs[0].noise[q][k] = fac;
            facs[1].noise[q][k] = fac * ratio;
        }
    }

    facs
}
