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

//! The `freq` module derives the master, envelope, noise floor, and limiter frequency band
//! tables, and the HF patches, from the SBR header.

use symphonia_core::errors::{decode_error, unsupported_error, Result};

use log::{debug, error};

use crate::common::{validate, MAX_BANDS, MAX_NOISE_BANDS, MAX_PATCHES, SYNTHESIS_BANDS};
use crate::header::SpectrumParams;
use crate::tables::{LIMITER_BANDS_WARPED, START_OFFSETS};

/// Maximum number of iterations of the patch construction loop. Well-formed tables need at most
/// a handful.
const MAX_PATCH_ITERATIONS: usize = 64;

/// One HF patch: a run of low band subbands copied into the high band.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Patch {
    /// The first low band subband the patch is copied from.
    pub start: usize,
    /// The number of subbands in the patch.
    pub len: usize,
}

/// The frequency band tables of an SBR stream.
///
/// All tables hold QMF subband indicies and are strictly increasing. They are rebuilt whenever
/// the frequency-affecting fields of the SBR header change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrequencyTables {
    /// The first subband of the master table.
    pub k0: usize,
    /// The subband separating the two regions of the master table.
    pub k1: usize,
    /// The last subband of the master table.
    pub k2: usize,
    /// The first subband of the high band.
    pub kx: usize,
    /// The number of subbands in the high band.
    pub m: usize,
    /// The master frequency band table, `n_master + 1` entries.
    pub master: Vec<usize>,
    /// The high resolution envelope band table, `n[1] + 1` entries.
    pub high: Vec<usize>,
    /// The low resolution envelope band table, `n[0] + 1` entries.
    pub low: Vec<usize>,
    /// The noise floor band table, `n_q + 1` entries.
    pub noise: Vec<usize>,
    /// The limiter band table, `n_lim + 1` entries.
    pub limiter: Vec<usize>,
    /// The HF patches.
    pub patches: Vec<Patch>,
}

/// Round to nearest, ties to even.
#[inline(always)]
fn lrint(val: f32) -> i32 {
    val.round_ties_even() as i32
}

/// Generate `num_bands` logarithmically spaced band widths spanning `start` to `stop`.
fn make_bands(bands: &mut [i32], start: i32, stop: i32, num_bands: usize) {
    let base = (stop as f32 / start as f32).powf(1.0 / num_bands as f32);

    let mut prod = start as f32;
    let mut previous = start;

    for band in bands[..num_bands - 1].iter_mut() {
        prod *= base;
        let present = lrint(prod);
        *band = present - previous;
        previous = present;
    }

    bands[num_bands - 1] = stop - previous;
}

/// Convert band widths into band borders, starting at `start`. All widths must be positive.
fn accumulate(widths: &[i32], start: usize, borders: &mut Vec<usize>) -> Result<()> {
    let mut border = start;

    for &width in widths {
        if width <= 0 {
            error!("sbr: invalid band width {}", width);
            return decode_error("sbr: invalid band width");
        }
        border += width as usize;
        borders.push(border);
    }

    Ok(())
}

fn check_n_master(n_master: usize, xover_band: usize) -> Result<()> {
    if n_master == 0 {
        error!("sbr: invalid n_master {}", n_master);
        return decode_error("sbr: invalid n_master");
    }
    if xover_band >= n_master {
        error!("sbr: crossover band {} beyond master table", xover_band);
        return decode_error("sbr: crossover band beyond master table");
    }
    Ok(())
}

/// Get the row of the start offset table used for a SBR sample rate.
fn start_offsets(sample_rate: u32) -> Option<&'static [i8; 16]> {
    let row = match sample_rate {
        16000 => 0,
        22050 => 1,
        24000 => 2,
        32000 => 3,
        44100 | 48000 | 64000 => 4,
        88200 | 96000 | 128000 | 176400 | 192000 => 5,
        _ => return None,
    };
    Some(&START_OFFSETS[row])
}

impl FrequencyTables {
    /// Build the frequency tables for a SBR sample rate (twice the core sample rate).
    pub fn new(sample_rate: u32, params: &SpectrumParams, limiter_bands: u8) -> Result<Self> {
        let mut tables = FrequencyTables {
            k0: 0,
            k1: 0,
            k2: 0,
            kx: 0,
            m: 0,
            master: Vec::with_capacity(SYNTHESIS_BANDS + 1),
            high: Vec::with_capacity(MAX_BANDS + 1),
            low: Vec::with_capacity(MAX_BANDS + 1),
            noise: Vec::with_capacity(MAX_NOISE_BANDS + 1),
            limiter: Vec::with_capacity(MAX_BANDS + MAX_PATCHES),
            patches: Vec::with_capacity(MAX_PATCHES),
        };

        tables.make_master(sample_rate, params)?;
        tables.make_derived(sample_rate, params)?;
        tables.make_limiter(limiter_bands);

        debug!(
            "sbr: tables k0={} k2={} kx={} m={} n_master={} n=[{}, {}] n_q={} n_lim={} patches={}",
            tables.k0,
            tables.k2,
            tables.kx,
            tables.m,
            tables.n_master(),
            tables.n_low(),
            tables.n_high(),
            tables.n_q(),
            tables.n_lim(),
            tables.patches.len()
        );

        Ok(tables)
    }

    /// The number of bands in the master table.
    pub fn n_master(&self) -> usize {
        self.master.len() - 1
    }

    /// The number of low resolution envelope bands, `n[0]`.
    pub fn n_low(&self) -> usize {
        self.low.len() - 1
    }

    /// The number of high resolution envelope bands, `n[1]`.
    pub fn n_high(&self) -> usize {
        self.high.len() - 1
    }

    /// The number of noise floor bands, `n_q`.
    pub fn n_q(&self) -> usize {
        self.noise.len() - 1
    }

    /// The number of limiter bands, `n_lim`.
    pub fn n_lim(&self) -> usize {
        self.limiter.len() - 1
    }

    /// The envelope band table for a frequency resolution.
    pub fn env_table(&self, high_res: bool) -> &[usize] {
        if high_res {
            &self.high
        }
        else {
            &self.low
        }
    }

    /// The number of envelope bands for a frequency resolution.
    pub fn num_env_bands(&self, high_res: bool) -> usize {
        self.env_table(high_res).len() - 1
    }

    /// Master frequency band table (ISO/IEC 14496-3 4.6.18.3.2.1).
    fn make_master(&mut self, sample_rate: u32, params: &SpectrumParams) -> Result<()> {
        let offsets = match start_offsets(sample_rate) {
            Some(offsets) => offsets,
            None => {
                error!("sbr: unsupported sample rate {}", sample_rate);
                return unsupported_error("sbr: unsupported sample rate");
            }
        };

        let temp = if sample_rate < 32000 {
            3000
        }
        else if sample_rate < 64000 {
            4000
        }
        else {
            5000
        };

        let start_min = ((temp << 7) + (sample_rate >> 1)) / sample_rate;
        let stop_min = ((temp << 8) + (sample_rate >> 1)) / sample_rate;

        let k0 = start_min as i32 + i32::from(offsets[usize::from(params.start_freq)]);

        let k2 = match params.stop_freq {
            0..=13 => {
                let mut stop_dk = [0; 13];
                make_bands(&mut stop_dk, stop_min as i32, 64, 13);
                stop_dk.sort_unstable();

                stop_min as i32 + stop_dk[..usize::from(params.stop_freq)].iter().sum::<i32>()
            }
            14 => 2 * k0,
            15 => 3 * k0,
            _ => {
                error!("sbr: invalid stop frequency {}", params.stop_freq);
                return decode_error("sbr: invalid stop frequency");
            }
        };
        let k2 = k2.min(64);

        let max_subbands = if sample_rate <= 32000 {
            48
        }
        else if sample_rate == 44100 {
            35
        }
        else {
            32
        };

        if k2 - k0 > max_subbands {
            error!("sbr: too many qmf subbands {}", k2 - k0);
            return decode_error("sbr: too many qmf subbands");
        }

        validate!(k0 > 0 && k2 > k0);

        let xover_band = usize::from(params.xover_band);

        self.k0 = k0 as usize;
        self.k2 = k2 as usize;
        self.master.clear();

        if params.freq_scale == 0 {
            let dk = if params.alter_scale { 2 } else { 1 };

            let n_master = (((k2 - k0 + (dk & 2)) >> dk) << 1) as usize;
            check_n_master(n_master, xover_band)?;

            let mut widths = [dk; SYNTHESIS_BANDS];
            let widths = &mut widths[..n_master];

            // The remainder is placed on the first or last band only.
            let k2diff = k2 - k0 - n_master as i32 * dk;

            if k2diff < 0 {
                widths[0] -= 1;
                if k2diff < -1 {
                    widths[1] -= 1;
                }
            }
            else if k2diff > 0 {
                widths[n_master - 1] += 1;
            }

            self.k1 = self.k2;
            self.master.push(self.k0);
            accumulate(widths, self.k0, &mut self.master)?;
        }
        else {
            let half_bands = 7 - i32::from(params.freq_scale);

            let two_regions = 49 * k2 > 110 * k0;
            let k1 = if two_regions { 2 * k0 } else { k2 };

            let num_bands_0 = lrint(half_bands as f32 * (k1 as f32 / k0 as f32).log2()) * 2;

            if num_bands_0 <= 0 || num_bands_0 as usize > SYNTHESIS_BANDS {
                error!("sbr: invalid num_bands_0 {}", num_bands_0);
                return decode_error("sbr: invalid num_bands_0");
            }
            let num_bands_0 = num_bands_0 as usize;

            let mut vdk0 = [0; SYNTHESIS_BANDS];
            let vdk0 = &mut vdk0[..num_bands_0];

            make_bands(vdk0, k0, k1, num_bands_0);
            vdk0.sort_unstable();

            let vdk0_max = vdk0[num_bands_0 - 1];

            self.k1 = k1 as usize;
            self.master.push(self.k0);
            accumulate(vdk0, self.k0, &mut self.master)?;

            if two_regions {
                let inv_warp = if params.alter_scale { 0.76923076923076923077 } else { 1.0 };

                let num_bands_1 =
                    lrint(half_bands as f32 * inv_warp * (k2 as f32 / k1 as f32).log2()) * 2;

                validate!(num_bands_1 > 0 && num_bands_0 + num_bands_1 as usize <= SYNTHESIS_BANDS);
                let num_bands_1 = num_bands_1 as usize;

                let mut vdk1 = [0; SYNTHESIS_BANDS];
                let vdk1 = &mut vdk1[..num_bands_1];

                make_bands(vdk1, k1, k2, num_bands_1);

                let vdk1_min = vdk1.iter().copied().min().unwrap_or(0);

                // Widen the narrowest band of the upper region so that it is no narrower than the
                // widest band of the lower region.
                if vdk1_min < vdk0_max {
                    vdk1.sort_unstable();
                    let change =
                        (vdk0_max - vdk1[0]).min((vdk1[num_bands_1 - 1] - vdk1[0]) >> 1);
                    vdk1[0] += change;
                    vdk1[num_bands_1 - 1] -= change;
                }

                vdk1.sort_unstable();

                accumulate(vdk1, self.k1, &mut self.master)?;
            }

            check_n_master(self.n_master(), xover_band)?;
        }

        Ok(())
    }

    /// Derived frequency band tables (ISO/IEC 14496-3 4.6.18.3.2.2).
    fn make_derived(&mut self, sample_rate: u32, params: &SpectrumParams) -> Result<()> {
        let xover_band = usize::from(params.xover_band);

        self.high.clear();
        self.high.extend_from_slice(&self.master[xover_band..]);

        let n_high = self.n_high();
        let n_low = (n_high + 1) >> 1;

        self.kx = self.high[0];
        self.m = self.high[n_high] - self.high[0];

        if self.kx + self.m > SYNTHESIS_BANDS {
            error!("sbr: stop frequency border too high {}", self.kx + self.m);
            return decode_error("sbr: stop frequency border too high");
        }
        if self.kx > 32 {
            error!("sbr: start frequency border too high {}", self.kx);
            return decode_error("sbr: start frequency border too high");
        }
        validate!(self.m > 0 && n_high <= MAX_BANDS);

        // Every other high resolution border, keeping both tables spanning the same range.
        let odd = n_high & 1;

        self.low.clear();
        self.low.push(self.high[0]);
        for k in 1..=n_low {
            self.low.push(self.high[2 * k - odd]);
        }

        let n_q = lrint(f32::from(params.noise_bands) * (self.k2 as f32 / self.kx as f32).log2());
        let n_q = n_q.max(1) as usize;

        if n_q > MAX_NOISE_BANDS {
            error!("sbr: too many noise floor bands {}", n_q);
            return decode_error("sbr: too many noise floor bands");
        }

        self.noise.clear();
        self.noise.push(self.low[0]);

        let mut idx = 0;
        for k in 1..=n_q {
            idx += (n_low - idx) / (n_q + 1 - k);
            self.noise.push(self.low[idx]);
        }

        self.make_patches(sample_rate)
    }

    /// HF patch construction (ISO/IEC 14496-3 4.6.18.6.3).
    fn make_patches(&mut self, sample_rate: u32) -> Result<()> {
        let k0 = self.k0 as i32;
        let kx = self.kx as i32;
        let n_master = self.n_master();
        let master = &self.master;

        let goal_sb = (((1000 << 11) + (sample_rate >> 1)) / sample_rate) as i32;

        let mut msb = k0;
        let mut usb = kx;
        let mut sb = 0;

        let mut k = if goal_sb < kx + self.m as i32 {
            master.iter().position(|&f| f as i32 >= goal_sb).unwrap_or(n_master)
        }
        else {
            n_master
        };

        self.patches.clear();

        let mut iterations = 0;

        loop {
            iterations += 1;
            validate!(iterations <= MAX_PATCH_ITERATIONS);

            // Walk down the master table until the patch source fits below k0 with the same
            // parity.
            let mut odd = 0;
            let mut i = k as isize;

            loop {
                sb = master[i as usize] as i32;
                odd = (sb + k0) & 1;

                i -= 1;

                if sb <= k0 - 1 + msb - odd {
                    break;
                }

                validate!(i >= 0);
            }

            // Six patches are accepted for compatibility with existing encoders.
            if self.patches.len() >= MAX_PATCHES {
                error!("sbr: too many patches {}", self.patches.len());
                return decode_error("sbr: too many patches");
            }

            let len = (sb - usb).max(0);
            let start = k0 - odd - len;

            if len > 0 {
                validate!(start >= 0);

                self.patches.push(Patch { start: start as usize, len: len as usize });
                usb = sb;
                msb = sb;
            }
            else {
                msb = kx;
            }

            if master[k] as i32 - sb < 3 {
                k = n_master;
            }

            if sb == kx + self.m as i32 {
                break;
            }
        }

        if self.patches.len() > 1 && self.patches[self.patches.len() - 1].len < 3 {
            self.patches.pop();
        }

        validate!(!self.patches.is_empty());

        Ok(())
    }

    /// Rebuild the limiter band table. Called on its own when only `bs_limiter_bands` changes.
    pub fn make_limiter(&mut self, limiter_bands: u8) {
        let n_low = self.n_low();

        self.limiter.clear();

        if limiter_bands == 0 {
            self.limiter.push(self.low[0]);
            self.limiter.push(self.low[n_low]);
            return;
        }

        let warp = LIMITER_BANDS_WARPED[usize::from(limiter_bands) - 1];

        let mut patch_borders = [0; MAX_PATCHES + 1];
        patch_borders[0] = self.kx;
        for (i, patch) in self.patches.iter().enumerate() {
            patch_borders[i + 1] = patch_borders[i] + patch.len;
        }
        let patch_borders = &patch_borders[..=self.patches.len()];

        let lim = &mut self.limiter;

        lim.extend_from_slice(&self.low);
        lim.extend_from_slice(&patch_borders[1..self.patches.len()]);
        lim.sort_unstable();

        let mut n_lim = lim.len() - 1;
        let mut out = 0;
        let mut inp = 1;

        // Merge bands narrower than the limiter band density. Patch borders are kept in
        // preference to envelope borders.
        while out < n_lim {
            if lim[inp] as f32 >= lim[out] as f32 * warp {
                out += 1;
                lim[out] = lim[inp];
                inp += 1;
            }
            else if lim[inp] == lim[out] || !patch_borders.contains(&lim[inp]) {
                inp += 1;
                n_lim -= 1;
            }
            else if !patch_borders.contains(&lim[out]) {
                lim[out] = lim[inp];
                inp += 1;
                n_lim -= 1;
            }
            else {
                out += 1;
                lim[out] = lim[inp];
                inp += 1;
            }
        }

        lim.truncate(n_lim + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(start: u8, stop: u8, xover: u8, scale: u8, alter: bool, noise: u8) -> SpectrumParams {
        SpectrumParams {
            start_freq: start,
            stop_freq: stop,
            xover_band: xover,
            freq_scale: scale,
            alter_scale: alter,
            noise_bands: noise,
        }
    }

    fn is_strictly_increasing(table: &[usize]) -> bool {
        table.windows(2).all(|w| w[0] < w[1])
    }

    fn check_invariants(tables: &FrequencyTables, xover: usize) {
        assert!(is_strictly_increasing(&tables.master));
        assert!(is_strictly_increasing(&tables.high));
        assert!(is_strictly_increasing(&tables.low));
        assert!(tables.noise.windows(2).all(|w| w[0] <= w[1]));
        assert!(is_strictly_increasing(&tables.limiter));

        assert_eq!(tables.master[0], tables.k0);
        assert_eq!(*tables.master.last().unwrap(), tables.k2);
        assert!(tables.n_master() > xover);

        assert_eq!(tables.high[0], tables.kx);
        assert_eq!(*tables.high.last().unwrap(), tables.kx + tables.m);
        assert_eq!(tables.low[0], tables.kx);
        assert_eq!(tables.low.last(), tables.high.last());
        assert_eq!(tables.noise[0], tables.kx);
        assert_eq!(tables.noise.last(), tables.low.last());
        assert_eq!(tables.limiter[0], tables.kx);

        assert!(tables.n_q() >= 1 && tables.n_q() <= MAX_NOISE_BANDS);
        assert!(!tables.patches.is_empty() && tables.patches.len() <= MAX_PATCHES);

        // Patches are sourced from below kx. When they cover the whole high band, the last
        // border is a patch border and survives the limiter band merge.
        let covered: usize = tables.patches.iter().map(|p| p.len).sum();
        assert!(covered <= tables.m);
        if covered == tables.m {
            assert_eq!(tables.limiter.last(), tables.low.last());
        }
        for patch in tables.patches.iter() {
            assert!(patch.start + patch.len <= tables.kx);
        }

        // Every low resolution border is a high resolution border.
        for border in tables.low.iter() {
            assert!(tables.high.contains(border));
        }
    }

    #[test]
    fn verify_tables_for_all_rates() {
        let rates = [32000, 44100, 48000, 64000, 88200, 96000];

        let mut valid = 0;

        for &rate in rates.iter() {
            for start in 0..16 {
                for stop in 0..16 {
                    for xover in 0..3 {
                        for scale in 0..4 {
                            for alter in [false, true] {
                                let params = params(start, stop, xover, scale, alter, 2);

                                if let Ok(tables) = FrequencyTables::new(rate, &params, 2) {
                                    check_invariants(&tables, usize::from(xover));
                                    valid += 1;
                                }
                            }
                        }
                    }
                }
            }
        }

        assert!(valid > 10000);
    }

    #[test]
    fn verify_tables_are_idempotent() {
        let params = params(5, 9, 0, 2, false, 2);

        let a = FrequencyTables::new(44100, &params, 2).unwrap();
        let b = FrequencyTables::new(44100, &params, 2).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn verify_tables_44100() {
        // start_min = 12, stop_min = 23, k0 = 12 + 2.
        let tables = FrequencyTables::new(44100, &params(5, 9, 0, 2, false, 2), 2).unwrap();

        assert_eq!(tables.k0, 14);
        assert_eq!(tables.k1, 28);
        assert_eq!(tables.k2, 47);
        check_invariants(&tables, 0);

        assert_eq!(
            tables.master,
            [14, 15, 16, 17, 18, 19, 20, 22, 24, 26, 28, 30, 32, 34, 36, 38, 41, 44, 47]
        );
        assert_eq!(tables.low, [14, 16, 18, 20, 24, 28, 32, 36, 41, 47]);
        assert_eq!(tables.noise, [14, 20, 32, 47]);
        assert_eq!(tables.limiter, [14, 18, 26, 32, 38, 47]);
        assert_eq!(
            tables.patches,
            [Patch { start: 2, len: 12 }, Patch { start: 2, len: 12 }, Patch { start: 4, len: 9 }]
        );

        // No crossover band, so the high resolution table is the master table.
        assert_eq!(tables.high, tables.master);
        assert_eq!(tables.kx, tables.k0);
        assert_eq!(tables.n_low(), (tables.n_high() + 1) / 2);
    }

    #[test]
    fn verify_linear_master_table() {
        let tables = FrequencyTables::new(48000, &params(5, 5, 0, 0, false, 1), 0).unwrap();

        check_invariants(&tables, 0);
        assert_eq!(tables.k0, 13);
        assert_eq!(tables.k2, 32);

        // Unit step bands, with any remainder on the last band.
        let widths: Vec<usize> = tables.master.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(widths[..widths.len() - 1].iter().all(|&w| w == 1));
        assert!(widths[widths.len() - 1] <= 2);
        assert_eq!(tables.n_master() % 2, 0);

        // A single limiter band.
        assert_eq!(tables.limiter, vec![tables.kx, tables.kx + tables.m]);
    }

    #[test]
    fn verify_too_many_subbands() {
        // At 44.1 kHz a stop frequency of 13 spans the whole QMF bank, 50 subbands above k0 = 14.
        let params = params(5, 13, 0, 2, false, 2);

        assert!(FrequencyTables::new(44100, &params, 2).is_err());
    }

    #[test]
    fn verify_invalid_parameters() {
        // Crossover band beyond the master table.
        assert!(FrequencyTables::new(48000, &params(15, 0, 7, 3, false, 2), 2).is_err());

        // Unsupported sample rate.
        assert!(FrequencyTables::new(11025, &params(5, 9, 0, 2, false, 2), 2).is_err());
    }

    #[test]
    fn verify_limiter_rebuild() {
        let mut tables = FrequencyTables::new(44100, &params(5, 9, 0, 2, false, 2), 0).unwrap();
        assert_eq!(tables.n_lim(), 1);

        for bands in 1..4 {
            tables.make_limiter(bands);
            assert!(is_strictly_increasing(&tables.limiter));
            assert_eq!(tables.limiter[0], tables.kx);
            assert_eq!(*tables.limiter.last().unwrap(), tables.kx + tables.m);
        }

        // The limiter rebuilt in place matches a fresh build.
        let fresh = FrequencyTables::new(44100, &params(5, 9, 0, 2, false, 2), 3).unwrap();
        assert_eq!(tables, fresh);
    }
}
