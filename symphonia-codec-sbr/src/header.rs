// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use symphonia_core::errors::Result;
use symphonia_core::io::ReadBitsLtr;

/// The SBR header fields that determine the frequency band tables. A change to any of these
/// requires the tables to be rebuilt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpectrumParams {
    /// `bs_start_freq`, index of the first master table subband.
    pub start_freq: u8,
    /// `bs_stop_freq`, index of the last master table subband.
    pub stop_freq: u8,
    /// `bs_xover_band`, index of the first high band subband within the master table.
    pub xover_band: u8,
    /// `bs_freq_scale`, the master table band density. 0 selects linear spacing.
    pub freq_scale: u8,
    /// `bs_alter_scale`.
    pub alter_scale: bool,
    /// `bs_noise_bands`, noise floor band density.
    pub noise_bands: u8,
}

/// The SBR header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SbrHeader {
    /// `bs_amp_res`, envelope amplitude resolution. `true` selects 3.0 dB steps, `false`
    /// selects 1.5 dB steps.
    pub amp_res: bool,
    /// The frequency band parameters.
    pub spectrum: SpectrumParams,
    /// `bs_limiter_bands`, limiter band density. 0 selects a single limiter band.
    pub limiter_bands: u8,
    /// `bs_limiter_gains`, index into the limiter gain table.
    pub limiter_gains: u8,
    /// `bs_interpol_freq`, envelope energy estimation per subband instead of per band.
    pub interpol_freq: bool,
    /// `bs_smoothing_mode`, disables temporal gain smoothing when set.
    pub smoothing_mode: bool,
}

/// How a newly read header affects the decoder state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeaderChange {
    /// Nothing table-related changed.
    None,
    /// Only the limiter band density changed. The limiter table must be rebuilt.
    Limiter,
    /// The frequency band parameters changed. All tables must be rebuilt.
    Reset,
}

impl SbrHeader {
    /// Read `sbr_header()`.
    pub fn read<B: ReadBitsLtr>(bs: &mut B) -> Result<Self> {
        let amp_res = bs.read_bool()?;
        let start_freq = bs.read_bits_leq32(4)? as u8;
        let stop_freq = bs.read_bits_leq32(4)? as u8;
        let xover_band = bs.read_bits_leq32(3)? as u8;
        // bs_reserved
        bs.ignore_bits(2)?;

        let header_extra_1 = bs.read_bool()?;
        let header_extra_2 = bs.read_bool()?;

        let (freq_scale, alter_scale, noise_bands) = if header_extra_1 {
            let freq_scale = bs.read_bits_leq32(2)? as u8;
            let alter_scale = bs.read_bool()?;
            let noise_bands = bs.read_bits_leq32(2)? as u8;
            (freq_scale, alter_scale, noise_bands)
        }
        else {
            (2, true, 2)
        };

        let (limiter_bands, limiter_gains, interpol_freq, smoothing_mode) = if header_extra_2 {
            let limiter_bands = bs.read_bits_leq32(2)? as u8;
            let limiter_gains = bs.read_bits_leq32(2)? as u8;
            let interpol_freq = bs.read_bool()?;
            let smoothing_mode = bs.read_bool()?;
            (limiter_bands, limiter_gains, interpol_freq, smoothing_mode)
        }
        else {
            (2, 2, true, true)
        };

        Ok(SbrHeader {
            amp_res,
            spectrum: SpectrumParams {
                start_freq,
                stop_freq,
                xover_band,
                freq_scale,
                alter_scale,
                noise_bands,
            },
            limiter_bands,
            limiter_gains,
            interpol_freq,
            smoothing_mode,
        })
    }

    /// Compare against the spectrum parameters the current tables were built from, and the
    /// previous header.
    ///
    /// Forgotten spectrum parameters (`None`, after the decoder was turned off) always force a
    /// reset.
    pub fn change_from(
        &self,
        spectrum: Option<&SpectrumParams>,
        prev: Option<&SbrHeader>,
    ) -> HeaderChange {
        match spectrum {
            Some(spectrum) if *spectrum == self.spectrum => (),
            _ => return HeaderChange::Reset,
        }

        match prev {
            Some(prev) if prev.limiter_bands != self.limiter_bands => HeaderChange::Limiter,
            _ => HeaderChange::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;

    use symphonia_core::io::BitReaderLtr;

    #[test]
    fn verify_read_header_defaults() {
        let mut bw = BitWriter::default();
        bw.write(1, 1); // amp_res
        bw.write(5, 4); // start_freq
        bw.write(9, 4); // stop_freq
        bw.write(0, 3); // xover_band
        bw.write(0, 2); // reserved
        bw.write(0, 1); // header_extra_1
        bw.write(0, 1); // header_extra_2

        let buf = bw.finish();
        let header = SbrHeader::read(&mut BitReaderLtr::new(&buf)).unwrap();

        assert!(header.amp_res);
        assert_eq!(header.spectrum.start_freq, 5);
        assert_eq!(header.spectrum.stop_freq, 9);
        assert_eq!(header.spectrum.freq_scale, 2);
        assert!(header.spectrum.alter_scale);
        assert_eq!(header.spectrum.noise_bands, 2);
        assert_eq!(header.limiter_bands, 2);
        assert_eq!(header.limiter_gains, 2);
        assert!(header.interpol_freq);
        assert!(header.smoothing_mode);
    }

    #[test]
    fn verify_read_header_extra() {
        let mut bw = BitWriter::default();
        bw.write(0, 1);
        bw.write(3, 4);
        bw.write(7, 4);
        bw.write(1, 3);
        bw.write(0, 2);
        bw.write(1, 1);
        bw.write(1, 1);
        bw.write(1, 2); // freq_scale
        bw.write(0, 1); // alter_scale
        bw.write(3, 2); // noise_bands
        bw.write(0, 2); // limiter_bands
        bw.write(3, 2); // limiter_gains
        bw.write(0, 1); // interpol_freq
        bw.write(0, 1); // smoothing_mode

        let buf = bw.finish();
        let header = SbrHeader::read(&mut BitReaderLtr::new(&buf)).unwrap();

        assert!(!header.amp_res);
        assert_eq!(header.spectrum.xover_band, 1);
        assert_eq!(header.spectrum.freq_scale, 1);
        assert!(!header.spectrum.alter_scale);
        assert_eq!(header.spectrum.noise_bands, 3);
        assert_eq!(header.limiter_bands, 0);
        assert_eq!(header.limiter_gains, 3);
        assert!(!header.interpol_freq);
        assert!(!header.smoothing_mode);
    }

    #[test]
    fn verify_header_change() {
        let spectrum = SpectrumParams {
            start_freq: 5,
            stop_freq: 9,
            xover_band: 0,
            freq_scale: 2,
            alter_scale: false,
            noise_bands: 2,
        };
        let header = SbrHeader {
            amp_res: true,
            spectrum,
            limiter_bands: 2,
            limiter_gains: 2,
            interpol_freq: true,
            smoothing_mode: true,
        };

        assert_eq!(header.change_from(None, None), HeaderChange::Reset);
        assert_eq!(header.change_from(Some(&spectrum), Some(&header)), HeaderChange::None);

        let other = SpectrumParams { stop_freq: 8, ..spectrum };
        assert_eq!(header.change_from(Some(&other), Some(&header)), HeaderChange::Reset);

        let prev = SbrHeader { limiter_bands: 1, amp_res: false, ..header };
        assert_eq!(header.change_from(Some(&spectrum), Some(&prev)), HeaderChange::Limiter);
    }
}
