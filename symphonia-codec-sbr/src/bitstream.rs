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

//! The `bitstream` module parses the SBR payload of a channel element: the grid, the delta
//! coding directions, the inverse filtering modes, the envelope and noise floor scale factors,
//! the sinusoid flags, and the extended data.

use symphonia_core::errors::Result;
use symphonia_core::io::ReadBitsLtr;

use log::{debug, error, warn};

use crate::codebooks::*;
use crate::common::*;
use crate::freq::FrequencyTables;
use crate::grid::{Grid, PreviousFrameState};

/// The largest valid quantized envelope scale factor.
const MAX_ENV_FAC: i32 = 127;
/// The largest valid quantized noise floor scale factor.
const MAX_NOISE_FAC: i32 = 30;

const EXTENSION_ID_PS: u32 = 2;

/// The decoded SBR payload of one channel for one frame.
#[derive(Clone, Debug)]
pub struct ChannelFrame {
    pub grid: Grid,
    /// Per envelope, `true` if delta coded in the time direction.
    pub df_env: [bool; MAX_ENVELOPES],
    /// Per noise floor, `true` if delta coded in the time direction.
    pub df_noise: [bool; MAX_NOISE_ENVELOPES],
    /// The inverse filtering mode per noise floor band.
    pub invf_mode: [u8; MAX_NOISE_BANDS],
    /// The inverse filtering modes of the previous frame.
    pub prev_invf_mode: [u8; MAX_NOISE_BANDS],
    /// Quantized envelope scale factors per envelope and band.
    pub env_facs: [[i32; MAX_BANDS]; MAX_ENVELOPES],
    /// Quantized noise floor scale factors per noise floor and band.
    pub noise_facs: [[i32; MAX_NOISE_BANDS]; MAX_NOISE_ENVELOPES],
    pub add_harmonic_flag: bool,
    /// Per high resolution band, `true` if a sinusoid is added.
    pub add_harmonic: [bool; MAX_BANDS],
}

/// The decoded SBR payload of a channel element.
#[derive(Clone, Debug)]
pub struct ElementData {
    /// `bs_coupling`, only ever set for a channel pair.
    pub coupling: bool,
    pub channels: Vec<ChannelFrame>,
}

impl ChannelFrame {
    pub fn new(grid: Grid, prev: &PreviousFrameState) -> Self {
        ChannelFrame {
            grid,
            df_env: [false; MAX_ENVELOPES],
            df_noise: [false; MAX_NOISE_ENVELOPES],
            invf_mode: [0; MAX_NOISE_BANDS],
            prev_invf_mode: prev.invf_mode,
            env_facs: [[0; MAX_BANDS]; MAX_ENVELOPES],
            noise_facs: [[0; MAX_NOISE_BANDS]; MAX_NOISE_ENVELOPES],
            add_harmonic_flag: false,
            add_harmonic: [false; MAX_BANDS],
        }
    }

    /// The state the next frame of this channel is parsed against.
    pub fn carry(&self) -> PreviousFrameState {
        let num_env = self.grid.num_env;

        PreviousFrameState {
            num_env,
            t_env_end: self.grid.t_env[num_env],
            freq_res: self.grid.freq_res[num_env - 1],
            transient: self.grid.e_a[1],
            env_facs: self.env_facs[num_env - 1],
            noise_facs: self.noise_facs[self.grid.num_noise - 1],
            invf_mode: self.invf_mode,
        }
    }

    /// Read `sbr_dtdf()`.
    fn read_dtdf<B: ReadBitsLtr>(&mut self, bs: &mut B) -> Result<()> {
        for df in self.df_env[..self.grid.num_env].iter_mut() {
            *df = bs.read_bool()?;
        }
        for df in self.df_noise[..self.grid.num_noise].iter_mut() {
            *df = bs.read_bool()?;
        }
        Ok(())
    }

    /// Read `sbr_invf()`.
    fn read_invf<B: ReadBitsLtr>(&mut self, bs: &mut B, n_q: usize) -> Result<()> {
        for mode in self.invf_mode[..n_q].iter_mut() {
            *mode = bs.read_bits_leq32(2)? as u8;
        }
        Ok(())
    }

    /// Read `sbr_envelope()`. The second channel of a coupled pair carries balance values.
    fn read_envelope<B: ReadBitsLtr>(
        &mut self,
        bs: &mut B,
        tables: &FrequencyTables,
        prev: &PreviousFrameState,
        balance: bool,
    ) -> Result<()> {
        let (start_bits, t_cb, f_cb) = match (balance, self.grid.amp_res) {
            (true, true) => (5, &*ENV_BAL_3_0DB_T, &*ENV_BAL_3_0DB_F),
            (true, false) => (6, &*ENV_BAL_1_5DB_T, &*ENV_BAL_1_5DB_F),
            (false, true) => (6, &*ENV_3_0DB_T, &*ENV_3_0DB_F),
            (false, false) => (7, &*ENV_1_5DB_T, &*ENV_1_5DB_F),
        };

        let delta = if balance { 2 } else { 1 };
        let odd = tables.n_high() & 1;

        let mut prev_res = prev.freq_res;
        let mut prev_facs = prev.env_facs;

        for e in 0..self.grid.num_env {
            let res = self.grid.freq_res[e];
            let num_bands = tables.num_env_bands(res);

            let facs = &mut self.env_facs[e];

            if self.df_env[e] {
                for (j, fac) in facs[..num_bands].iter_mut().enumerate() {
                    // Index of the band of the previous envelope covering band j.
                    let k = if res == prev_res {
                        j
                    }
                    else if res {
                        (j + odd) >> 1
                    }
                    else if j == 0 {
                        0
                    }
                    else {
                        2 * j - odd
                    };

                    *fac = prev_facs[k] + delta * t_cb.read(bs)?;
                    validate!((0..=MAX_ENV_FAC).contains(&*fac));
                }
            }
            else {
                facs[0] = delta * bs.read_bits_leq32(start_bits)? as i32;
                validate!(facs[0] <= MAX_ENV_FAC);

                for j in 1..num_bands {
                    facs[j] = facs[j - 1] + delta * f_cb.read(bs)?;
                    validate!((0..=MAX_ENV_FAC).contains(&facs[j]));
                }
            }

            prev_res = res;
            prev_facs = *facs;
        }

        Ok(())
    }

    /// Read `sbr_noise()`.
    fn read_noise<B: ReadBitsLtr>(
        &mut self,
        bs: &mut B,
        tables: &FrequencyTables,
        prev: &PreviousFrameState,
        balance: bool,
    ) -> Result<()> {
        let (t_cb, f_cb) = if balance {
            (&*NOISE_BAL_3_0DB_T, &*ENV_BAL_3_0DB_F)
        }
        else {
            (&*NOISE_3_0DB_T, &*ENV_3_0DB_F)
        };

        let delta = if balance { 2 } else { 1 };
        let n_q = tables.n_q();

        let mut prev_facs = prev.noise_facs;

        for q in 0..self.grid.num_noise {
            let facs = &mut self.noise_facs[q];

            if self.df_noise[q] {
                for (fac, &prev_fac) in facs[..n_q].iter_mut().zip(prev_facs.iter()) {
                    *fac = prev_fac + delta * t_cb.read(bs)?;
                    validate!((0..=MAX_NOISE_FAC).contains(&*fac));
                }
            }
            else {
                facs[0] = delta * bs.read_bits_leq32(5)? as i32;
                validate!(facs[0] <= MAX_NOISE_FAC);

                for j in 1..n_q {
                    facs[j] = facs[j - 1] + delta * f_cb.read(bs)?;
                    validate!((0..=MAX_NOISE_FAC).contains(&facs[j]));
                }
            }

            prev_facs = *facs;
        }

        Ok(())
    }

    /// Read the sinusoidal coding flags.
    fn read_harmonics<B: ReadBitsLtr>(&mut self, bs: &mut B, n_high: usize) -> Result<()> {
        self.add_harmonic_flag = bs.read_bool()?;

        if self.add_harmonic_flag {
            for flag in self.add_harmonic[..n_high].iter_mut() {
                *flag = bs.read_bool()?;
            }
        }
        Ok(())
    }
}

/// Read `sbr_single_channel_element()`, also used for coupling channel elements.
fn read_single_channel<B: ReadBitsLtr>(
    bs: &mut B,
    amp_res: bool,
    tables: &FrequencyTables,
    prev: &PreviousFrameState,
) -> Result<ElementData> {
    // bs_data_extra
    if bs.read_bool()? {
        bs.ignore_bits(4)?;
    }

    let mut frame = ChannelFrame::new(Grid::read(bs, amp_res, prev)?, prev);

    frame.read_dtdf(bs)?;
    frame.read_invf(bs, tables.n_q())?;
    frame.read_envelope(bs, tables, prev, false)?;
    frame.read_noise(bs, tables, prev, false)?;
    frame.read_harmonics(bs, tables.n_high())?;

    Ok(ElementData { coupling: false, channels: vec![frame] })
}

/// Read `sbr_channel_pair_element()`.
fn read_channel_pair<B: ReadBitsLtr>(
    bs: &mut B,
    amp_res: bool,
    tables: &FrequencyTables,
    prev: &[PreviousFrameState],
) -> Result<ElementData> {
    // bs_data_extra
    if bs.read_bool()? {
        bs.ignore_bits(8)?;
    }

    let coupling = bs.read_bool()?;

    let (mut left, mut right) = if coupling {
        let grid = Grid::read(bs, amp_res, &prev[0])?;
        let right_grid = grid.coupled_copy(&prev[1]);

        let mut left = ChannelFrame::new(grid, &prev[0]);
        let mut right = ChannelFrame::new(right_grid, &prev[1]);

        left.read_dtdf(bs)?;
        right.read_dtdf(bs)?;
        left.read_invf(bs, tables.n_q())?;
        right.invf_mode = left.invf_mode;

        left.read_envelope(bs, tables, &prev[0], false)?;
        left.read_noise(bs, tables, &prev[0], false)?;
        right.read_envelope(bs, tables, &prev[1], true)?;
        right.read_noise(bs, tables, &prev[1], true)?;

        (left, right)
    }
    else {
        let left_grid = Grid::read(bs, amp_res, &prev[0])?;
        let right_grid = Grid::read(bs, amp_res, &prev[1])?;

        let mut left = ChannelFrame::new(left_grid, &prev[0]);
        let mut right = ChannelFrame::new(right_grid, &prev[1]);

        left.read_dtdf(bs)?;
        right.read_dtdf(bs)?;
        left.read_invf(bs, tables.n_q())?;
        right.read_invf(bs, tables.n_q())?;

        left.read_envelope(bs, tables, &prev[0], false)?;
        right.read_envelope(bs, tables, &prev[1], false)?;
        left.read_noise(bs, tables, &prev[0], false)?;
        right.read_noise(bs, tables, &prev[1], false)?;

        (left, right)
    };

    left.read_harmonics(bs, tables.n_high())?;
    right.read_harmonics(bs, tables.n_high())?;

    Ok(ElementData { coupling, channels: vec![left, right] })
}

/// Read the SBR data of a channel element, excluding the extended data.
///
/// `prev` holds the state carried over from the previous frame of each channel of the element.
/// Nothing is modified on failure.
pub fn read_element_data<B: ReadBitsLtr>(
    bs: &mut B,
    element: ElementType,
    amp_res: bool,
    tables: &FrequencyTables,
    prev: &[PreviousFrameState],
) -> Result<ElementData> {
    match element {
        ElementType::Sce | ElementType::Cce => read_single_channel(bs, amp_res, tables, &prev[0]),
        ElementType::Cpe => read_channel_pair(bs, amp_res, tables, prev),
    }
}

/// Skip `bits` fill bits, returning `true` if any were set.
fn skip_fill_bits<B: ReadBitsLtr>(bs: &mut B, mut bits: u32) -> Result<bool> {
    let mut non_zero = false;

    while bits > 0 {
        let n = bits.min(32);
        non_zero |= bs.read_bits_leq32(n)? != 0;
        bits -= n;
    }

    Ok(non_zero)
}

/// Read and discard the extended data following the SBR data of a channel element.
pub fn read_extended_data<B: ReadBitsLtr>(bs: &mut B) -> Result<()> {
    // bs_extended_data
    if !bs.read_bool()? {
        return Ok(());
    }

    let mut size = bs.read_bits_leq32(4)?;
    if size == 15 {
        size += bs.read_bits_leq32(8)?;
    }

    let mut bits_left = size << 3;

    while bits_left > 7 {
        let id = bs.read_bits_leq32(2)?;
        bits_left -= 2;

        if id == EXTENSION_ID_PS {
            warn!("sbr: parametric stereo is not implemented, skipping {} bits", bits_left);
            bs.ignore_bits(bits_left)?;
        }
        else {
            // Some encoders pad with a zeroed extension.
            let non_zero = skip_fill_bits(bs, bits_left)?;

            if id != 0 || bits_left > 16 || non_zero {
                debug!("sbr: skipped reserved extension {} ({} bits)", id, bits_left);
            }
        }

        bits_left = 0;
    }

    if bits_left > 0 {
        bs.ignore_bits(bits_left)?;
    }

    Ok(())
}

/// Log a payload that could not be parsed completely.
pub fn log_overread(cnt: usize) {
    error!("sbr: payload exceeds the {} byte extension", cnt);
}
