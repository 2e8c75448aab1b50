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

//! The `grid` module parses the SBR time/frequency grid.

use symphonia_core::errors::{decode_error, Result};
use symphonia_core::io::ReadBitsLtr;

use log::error;

use crate::common::*;

/// `ceil(log2(n + 1))`, the bit width of `bs_pointer` for `n` envelopes.
const CEIL_LOG2: [u32; 6] = [0, 1, 2, 2, 3, 3];

/// The frame class, determining whether the leading and trailing envelope borders are fixed
/// to the frame boundaries or variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameClass {
    FixFix,
    FixVar,
    VarFix,
    VarVar,
}

impl FrameClass {
    fn read<B: ReadBitsLtr>(bs: &mut B) -> Result<Self> {
        Ok(match bs.read_bits_leq32(2)? {
            0 => FrameClass::FixFix,
            1 => FrameClass::FixVar,
            2 => FrameClass::VarFix,
            _ => FrameClass::VarVar,
        })
    }

    /// Returns `true` if the trailing border is variable.
    fn has_var_trail(self) -> bool {
        matches!(self, FrameClass::FixVar | FrameClass::VarVar)
    }
}

/// The state of the previous frame a new frame depends upon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviousFrameState {
    /// The number of envelopes.
    pub num_env: usize,
    /// The trailing envelope border in SBR time slots. May exceed the frame length.
    pub t_env_end: usize,
    /// The frequency resolution of the last envelope.
    pub freq_res: bool,
    /// The envelope that started with a transient, if any.
    pub transient: Option<usize>,
    /// The quantized envelope scale factors of the last envelope.
    pub env_facs: [i32; MAX_BANDS],
    /// The quantized noise floor scale factors of the last noise floor.
    pub noise_facs: [i32; MAX_NOISE_BANDS],
    /// The inverse filtering modes.
    pub invf_mode: [u8; MAX_NOISE_BANDS],
}

impl Default for PreviousFrameState {
    fn default() -> Self {
        PreviousFrameState {
            num_env: 0,
            t_env_end: 0,
            freq_res: false,
            transient: None,
            env_facs: [0; MAX_BANDS],
            noise_facs: [0; MAX_NOISE_BANDS],
            invf_mode: [0; MAX_NOISE_BANDS],
        }
    }
}

/// The time/frequency grid of one channel for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    pub class: FrameClass,
    /// The number of envelopes, 1 to 5.
    pub num_env: usize,
    /// The number of noise floors, 1 or 2.
    pub num_noise: usize,
    /// Envelope borders in SBR time slots, `num_env + 1` entries.
    pub t_env: [usize; MAX_ENVELOPES + 1],
    /// Noise floor borders in SBR time slots, `num_noise + 1` entries.
    pub t_q: [usize; MAX_NOISE_ENVELOPES + 1],
    /// Frequency resolution per envelope. `true` selects the high resolution band table.
    pub freq_res: [bool; MAX_ENVELOPES],
    /// The effective amplitude resolution for this frame.
    pub amp_res: bool,
    /// `bs_pointer`.
    pub pointer: usize,
    /// Transient envelope markers. `e_a[0]` marks the first envelope when the last envelope of
    /// the previous frame started with a transient, `e_a[1]` the envelope of this frame that
    /// starts with a transient.
    pub e_a: [Option<usize>; 2],
}

impl Default for Grid {
    fn default() -> Self {
        Grid {
            class: FrameClass::FixFix,
            num_env: 0,
            num_noise: 0,
            t_env: [0; MAX_ENVELOPES + 1],
            t_q: [0; MAX_NOISE_ENVELOPES + 1],
            freq_res: [false; MAX_ENVELOPES],
            amp_res: false,
            pointer: 0,
            e_a: [None; 2],
        }
    }
}

/// Read a relative border, `2 * bs_rel_bord + 2`.
fn read_rel_bord<B: ReadBitsLtr>(bs: &mut B) -> Result<usize> {
    Ok(2 * bs.read_bits_leq32(2)? as usize + 2)
}

fn read_pointer<B: ReadBitsLtr>(bs: &mut B, num_env: usize) -> Result<usize> {
    match CEIL_LOG2[num_env] {
        0 => Ok(0),
        bits => Ok(bs.read_bits_leq32(bits)? as usize),
    }
}

impl Grid {
    /// Read `sbr_grid()`.
    pub fn read<B: ReadBitsLtr>(
        bs: &mut B,
        header_amp_res: bool,
        prev: &PreviousFrameState,
    ) -> Result<Self> {
        let mut grid = Grid { amp_res: header_amp_res, ..Default::default() };

        grid.class = FrameClass::read(bs)?;

        // Trailing borders are computed from the end of the frame and may go negative on a
        // corrupt stream, so work in signed arithmetic.
        let mut t_env = [0i32; MAX_ENVELOPES + 1];

        match grid.class {
            FrameClass::FixFix => {
                grid.num_env = 1 << bs.read_bits_leq32(2)?;

                if grid.num_env == 1 {
                    grid.amp_res = false;
                }

                if grid.num_env > 4 {
                    error!("sbr: too many envelopes in fixfix frame ({})", grid.num_env);
                    return decode_error("sbr: too many envelopes");
                }

                let step = ((NUM_TIME_SLOTS + (grid.num_env >> 1)) / grid.num_env) as i32;

                for i in 1..grid.num_env {
                    t_env[i] = t_env[i - 1] + step;
                }
                t_env[grid.num_env] = NUM_TIME_SLOTS as i32;

                let freq_res = bs.read_bool()?;
                grid.freq_res[..grid.num_env].fill(freq_res);
            }
            FrameClass::FixVar => {
                let abs_bord_trail = NUM_TIME_SLOTS + bs.read_bits_leq32(2)? as usize;
                let num_rel_trail = bs.read_bits_leq32(2)? as usize;

                grid.num_env = num_rel_trail + 1;

                let n = grid.num_env;
                t_env[n] = abs_bord_trail as i32;

                for i in 0..num_rel_trail {
                    t_env[n - 1 - i] = t_env[n - i] - read_rel_bord(bs)? as i32;
                }

                grid.pointer = read_pointer(bs, n)?;

                for freq_res in grid.freq_res[..n].iter_mut().rev() {
                    *freq_res = bs.read_bool()?;
                }
            }
            FrameClass::VarFix => {
                t_env[0] = bs.read_bits_leq32(2)? as i32;
                let num_rel_lead = bs.read_bits_leq32(2)? as usize;

                grid.num_env = num_rel_lead + 1;

                let n = grid.num_env;
                t_env[n] = NUM_TIME_SLOTS as i32;

                for i in 0..num_rel_lead {
                    t_env[i + 1] = t_env[i] + read_rel_bord(bs)? as i32;
                }

                grid.pointer = read_pointer(bs, n)?;

                for freq_res in grid.freq_res[..n].iter_mut() {
                    *freq_res = bs.read_bool()?;
                }
            }
            FrameClass::VarVar => {
                t_env[0] = bs.read_bits_leq32(2)? as i32;
                let abs_bord_trail = NUM_TIME_SLOTS + bs.read_bits_leq32(2)? as usize;
                let num_rel_lead = bs.read_bits_leq32(2)? as usize;
                let num_rel_trail = bs.read_bits_leq32(2)? as usize;

                grid.num_env = num_rel_lead + num_rel_trail + 1;

                if grid.num_env > MAX_ENVELOPES {
                    error!("sbr: too many envelopes in varvar frame ({})", grid.num_env);
                    return decode_error("sbr: too many envelopes");
                }

                let n = grid.num_env;
                t_env[n] = abs_bord_trail as i32;

                for i in 0..num_rel_lead {
                    t_env[i + 1] = t_env[i] + read_rel_bord(bs)? as i32;
                }
                for i in 0..num_rel_trail {
                    t_env[n - 1 - i] = t_env[n - i] - read_rel_bord(bs)? as i32;
                }

                grid.pointer = read_pointer(bs, n)?;

                for freq_res in grid.freq_res[..n].iter_mut() {
                    *freq_res = bs.read_bool()?;
                }
            }
        }

        let n = grid.num_env;

        if grid.pointer > n + 1 {
            error!("sbr: bs_pointer ({}) beyond the time border table", grid.pointer);
            return decode_error("sbr: invalid bs_pointer");
        }

        if t_env[0] < 0 || t_env[..=n].windows(2).any(|w| w[0] >= w[1]) {
            error!("sbr: time borders not strictly monotonic");
            return decode_error("sbr: invalid time borders");
        }

        for (dst, &src) in grid.t_env.iter_mut().zip(t_env[..=n].iter()) {
            *dst = src as usize;
        }

        grid.num_noise = if n > 1 { 2 } else { 1 };

        grid.t_q[0] = grid.t_env[0];
        grid.t_q[grid.num_noise] = grid.t_env[n];

        if grid.num_noise > 1 {
            let mid = match (grid.class, grid.pointer) {
                (FrameClass::FixFix, _) => n >> 1,
                (FrameClass::VarFix, 0) => 1,
                (FrameClass::VarFix, 1) => n - 1,
                (FrameClass::VarFix, ptr) => ptr - 1,
                (_, ptr) => n - ptr.saturating_sub(1).max(1),
            };
            grid.t_q[1] = grid.t_env[mid];
        }

        grid.e_a[0] = Grid::leading_transient(prev);
        grid.e_a[1] = match (grid.class, grid.pointer) {
            (class, ptr) if class.has_var_trail() && ptr > 0 => Some(n + 1 - ptr),
            (FrameClass::VarFix, ptr) if ptr > 1 => Some(ptr - 1),
            _ => None,
        };

        Ok(grid)
    }

    /// Copy the grid of the first channel of a coupled channel pair. The transient carried
    /// over from the previous frame is channel specific.
    pub fn coupled_copy(&self, prev: &PreviousFrameState) -> Self {
        let mut grid = self.clone();
        grid.e_a[0] = Grid::leading_transient(prev);
        grid
    }

    fn leading_transient(prev: &PreviousFrameState) -> Option<usize> {
        match prev.transient {
            Some(e) if e == prev.num_env => Some(0),
            _ => None,
        }
    }

    /// Returns `true` if envelope `e` is marked as a transient envelope.
    #[inline(always)]
    pub fn is_transient(&self, e: usize) -> bool {
        self.e_a.contains(&Some(e))
    }

    /// The first QMF slot of envelope `e`, relative to the start of the high band buffer.
    #[inline(always)]
    pub fn env_start(&self, e: usize) -> usize {
        RATE * self.t_env[e]
    }

    /// The QMF slot one past the last slot of envelope `e`.
    #[inline(always)]
    pub fn env_end(&self, e: usize) -> usize {
        RATE * self.t_env[e + 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;

    use symphonia_core::io::BitReaderLtr;

    fn read_grid(bw: BitWriter, amp_res: bool, prev: &PreviousFrameState) -> Result<Grid> {
        let buf = bw.finish();
        Grid::read(&mut BitReaderLtr::new(&buf), amp_res, prev)
    }

    fn carry(grid: &Grid) -> PreviousFrameState {
        PreviousFrameState {
            num_env: grid.num_env,
            t_env_end: grid.t_env[grid.num_env],
            freq_res: grid.freq_res[grid.num_env - 1],
            transient: grid.e_a[1],
            ..Default::default()
        }
    }

    #[test]
    fn verify_fixfix() {
        let mut bw = BitWriter::default();
        bw.write(0, 2); // FIXFIX
        bw.write(2, 2); // 4 envelopes
        bw.write(1, 1); // freq_res

        let grid = read_grid(bw, true, &Default::default()).unwrap();

        assert_eq!(grid.num_env, 4);
        assert_eq!(grid.num_noise, 2);
        assert_eq!(&grid.t_env[..5], &[0, 4, 8, 12, 16]);
        assert_eq!(grid.t_q, [0, 8, 16]);
        assert_eq!(&grid.freq_res[..4], &[true; 4]);
        assert!(grid.amp_res);
        assert_eq!(grid.e_a, [None, None]);
    }

    #[test]
    fn verify_fixfix_single_envelope_forces_amp_res() {
        let mut bw = BitWriter::default();
        bw.write(0, 2);
        bw.write(0, 2); // 1 envelope
        bw.write(0, 1);

        let grid = read_grid(bw, true, &Default::default()).unwrap();

        assert_eq!(grid.num_env, 1);
        assert_eq!(grid.num_noise, 1);
        assert_eq!(&grid.t_env[..2], &[0, 16]);
        assert_eq!(&grid.t_q[..2], &[0, 16]);
        assert!(!grid.amp_res);
    }

    #[test]
    fn verify_fixfix_too_many_envelopes() {
        let mut bw = BitWriter::default();
        bw.write(0, 2);
        bw.write(3, 2); // 8 envelopes
        bw.write(0, 1);

        assert!(read_grid(bw, false, &Default::default()).is_err());
    }

    #[test]
    fn verify_fixvar() {
        let mut bw = BitWriter::default();
        bw.write(1, 2); // FIXVAR
        bw.write(1, 2); // abs_bord_trail = 17
        bw.write(2, 2); // 3 envelopes
        bw.write(0, 2); // 17 - 2 = 15
        bw.write(1, 2); // 15 - 4 = 11
        bw.write(2, 2); // bs_pointer
        bw.write(0b011, 3); // freq_res, last envelope first

        let grid = read_grid(bw, false, &Default::default()).unwrap();

        assert_eq!(grid.num_env, 3);
        assert_eq!(&grid.t_env[..4], &[0, 11, 15, 17]);
        assert_eq!(&grid.freq_res[..3], &[true, true, false]);
        assert_eq!(grid.pointer, 2);
        // n - max(ptr - 1, 1) = 2
        assert_eq!(grid.t_q, [0, 15, 17]);
        // n + 1 - ptr = 2
        assert_eq!(grid.e_a, [None, Some(2)]);
    }

    #[test]
    fn verify_varfix() {
        let mut bw = BitWriter::default();
        bw.write(2, 2); // VARFIX
        bw.write(2, 2); // t_env[0] = 2
        bw.write(1, 2); // 2 envelopes
        bw.write(3, 2); // 2 + 8 = 10
        bw.write(3, 2); // bs_pointer
        bw.write(0b10, 2);

        let grid = read_grid(bw, false, &Default::default()).unwrap();

        assert_eq!(grid.num_env, 2);
        assert_eq!(&grid.t_env[..3], &[2, 10, 16]);
        assert_eq!(&grid.freq_res[..2], &[true, false]);
        assert_eq!(grid.t_q, [2, 16, 16]);
        assert_eq!(grid.e_a, [None, Some(2)]);
    }

    #[test]
    fn verify_varvar() {
        let mut bw = BitWriter::default();
        bw.write(3, 2); // VARVAR
        bw.write(1, 2); // t_env[0] = 1
        bw.write(2, 2); // abs_bord_trail = 18
        bw.write(1, 2); // 1 leading
        bw.write(1, 2); // 1 trailing
        bw.write(0, 2); // 1 + 2 = 3
        bw.write(2, 2); // 18 - 6 = 12
        bw.write(0, 2); // bs_pointer
        bw.write(0b101, 3);

        let grid = read_grid(bw, true, &Default::default()).unwrap();

        assert_eq!(grid.num_env, 3);
        assert_eq!(&grid.t_env[..4], &[1, 3, 12, 18]);
        assert_eq!(&grid.freq_res[..3], &[true, false, true]);
        assert_eq!(grid.t_q, [1, 12, 18]);
        assert_eq!(grid.e_a, [None, None]);
    }

    #[test]
    fn verify_invalid_pointer() {
        let mut bw = BitWriter::default();
        bw.write(1, 2); // FIXVAR
        bw.write(0, 2);
        bw.write(0, 2); // 1 envelope, 1 pointer bit
        bw.write(1, 1); // bs_pointer = 1, in range
        bw.write(0, 1);

        assert!(read_grid(bw, false, &Default::default()).is_ok());

        let mut bw = BitWriter::default();
        bw.write(3, 2); // VARVAR
        bw.write(0, 2);
        bw.write(0, 2);
        bw.write(0, 2);
        bw.write(1, 2); // 2 envelopes, 2 pointer bits
        bw.write(0, 2);
        bw.write(3, 2); // bs_pointer = 3 = n + 1, in range
        bw.write(0, 2);

        assert!(read_grid(bw, false, &Default::default()).is_ok());

        let mut bw = BitWriter::default();
        bw.write(3, 2); // VARVAR
        bw.write(0, 2);
        bw.write(0, 2);
        bw.write(1, 2);
        bw.write(2, 2); // 4 envelopes, 3 pointer bits
        bw.write(0, 2);
        bw.write(0, 2);
        bw.write(0, 2);
        bw.write(6, 3); // bs_pointer = 6 > n + 1
        bw.write(0, 4);

        assert!(read_grid(bw, false, &Default::default()).is_err());
    }

    #[test]
    fn verify_non_monotonic_borders() {
        let mut bw = BitWriter::default();
        bw.write(3, 2); // VARVAR
        bw.write(3, 2); // t_env[0] = 3
        bw.write(0, 2); // abs_bord_trail = 16
        bw.write(2, 2); // 2 leading
        bw.write(2, 2); // 2 trailing
        for _ in 0..4 {
            bw.write(3, 2); // +8 / -8
        }
        bw.write(0, 3);
        bw.write(0, 5);

        assert!(read_grid(bw, false, &Default::default()).is_err());
    }

    #[test]
    fn verify_transient_continuity() {
        // First frame: FIXVAR with a transient starting in the last envelope.
        let mut bw = BitWriter::default();
        bw.write(1, 2); // FIXVAR
        bw.write(0, 2);
        bw.write(1, 2); // 2 envelopes
        bw.write(1, 2); // 16 - 4 = 12
        bw.write(1, 2); // bs_pointer = 1
        bw.write(0, 2);

        let first = read_grid(bw, false, &Default::default()).unwrap();

        assert_eq!(&first.t_env[..3], &[0, 12, 16]);
        assert_eq!(first.t_q, [0, 12, 16]);
        assert_eq!(first.e_a, [None, Some(2)]);

        // Second frame: FIXFIX, the first envelope follows the transient.
        let mut bw = BitWriter::default();
        bw.write(0, 2);
        bw.write(1, 2); // 2 envelopes
        bw.write(0, 1);

        let second = read_grid(bw, false, &carry(&first)).unwrap();

        assert_eq!(second.e_a, [Some(0), None]);
        assert!(second.is_transient(0));
        assert!(!second.is_transient(1));

        // Third frame: no transient carried.
        let mut bw = BitWriter::default();
        bw.write(0, 2);
        bw.write(1, 2);
        bw.write(0, 1);

        let third = read_grid(bw, false, &carry(&second)).unwrap();

        assert_eq!(third.e_a, [None, None]);

        // A coupled copy takes the transient state of its own channel.
        let copy = first.coupled_copy(&carry(&first));
        assert_eq!(copy.e_a, [Some(0), Some(2)]);
        assert_eq!(copy.t_env, first.t_env);
    }
}
