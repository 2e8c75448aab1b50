// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use symphonia_core::errors::Result;
use symphonia_core::io::{BitReaderLtr, FiniteBitStream, ReadBitsLtr};

use log::{debug, error, trace, warn};

use crate::bitstream::{log_overread, read_element_data, read_extended_data, ChannelFrame};
use crate::common::*;
use crate::complex::Complex;
use crate::dequant::{dequant, dequant_coupled, ScaleFactors};
use crate::dsp::{PortableDsp, SbrDsp};
use crate::freq::FrequencyTables;
use crate::grid::PreviousFrameState;
use crate::header::{HeaderChange, SbrHeader, SpectrumParams};
use crate::hfadj::{self, AdjusterState, Adjustment};
use crate::hfgen::{self, BandSplit, SubbandRow};
use crate::qmf::{QmfAnalysis, QmfSynthesis};
use crate::ring::SlotRing;
use crate::sample::Sample;

/// Zero bytes appended to the private copy of a payload, so that the codebook reader never
/// runs dry before an over-read is detected.
const PAYLOAD_PADDING: usize = 8;

/// The scale between the core decoder's sample range and the range the envelope scale factors
/// refer to.
const SAMPLE_SCALE: f32 = 32768.0;

/// The number of channels of the largest channel element.
const MAX_CHANNELS: usize = 2;

/// The band split while no high band is reconstructed. All analysis subbands pass through.
const PASSTHROUGH: BandSplit = BandSplit { kx: ANALYSIS_BANDS, m: 0 };

/// `SbrOptions` is a common set of options that the SBR decoder uses.
#[derive(Copy, Clone, Debug, Default)]
pub struct SbrOptions {
    /// Synthesize with the downsampled 32 band filterbank. The output is then at the core
    /// sample rate, instead of twice the core sample rate.
    pub downsampled: bool,
}

/// A freshly parsed frame of one channel, waiting to be applied.
struct PendingFrame<S: Sample> {
    frame: ChannelFrame,
    facs: ScaleFactors<S>,
}

/// The state of one channel.
struct SbrChannel<S: Sample> {
    analysis: QmfAnalysis<S>,
    synthesis: QmfSynthesis<S>,
    /// The most recent analysis slots, newest first.
    w: SlotRing<Complex<S>>,
    /// The adjusted high band of the current frame.
    y_cur: Vec<[Complex<S>; SYNTHESIS_BANDS]>,
    /// The adjusted high band of the previous frame.
    y_prev: Vec<[Complex<S>; SYNTHESIS_BANDS]>,
    /// Chirp factors per noise floor band.
    bw: [S; MAX_NOISE_BANDS],
    adjuster: AdjusterState<S>,
    /// The state the next frame is parsed against.
    prev: PreviousFrameState,
    pending: Option<PendingFrame<S>>,
    /// The band split of the previous frame.
    split: BandSplit,
    /// The number of QMF slots at the start of the next frame that belong to the last envelope
    /// of the previous frame.
    spill: usize,
}

impl<S: Sample> SbrChannel<S> {
    fn new(downsampled: bool) -> Self {
        SbrChannel {
            analysis: QmfAnalysis::new(),
            synthesis: QmfSynthesis::new(downsampled),
            w: SlotRing::new(LOW_SLOTS, ANALYSIS_BANDS),
            y_cur: vec![[Complex::ZERO; SYNTHESIS_BANDS]; HIGH_SLOTS],
            y_prev: vec![[Complex::ZERO; SYNTHESIS_BANDS]; HIGH_SLOTS],
            bw: [S::ZERO; MAX_NOISE_BANDS],
            adjuster: AdjusterState::new(),
            prev: PreviousFrameState::default(),
            pending: None,
            split: PASSTHROUGH,
            spill: 0,
        }
    }

    fn reset(&mut self) {
        self.analysis.reset();
        self.synthesis.reset();
        self.w.clear();
        for slot in self.y_cur.iter_mut().chain(self.y_prev.iter_mut()) {
            slot.fill(Complex::ZERO);
        }
        self.bw = [S::ZERO; MAX_NOISE_BANDS];
        self.adjuster.reset();
        self.prev = PreviousFrameState::default();
        self.pending = None;
        self.split = PASSTHROUGH;
        self.spill = 0;
    }
}

/// Buffers shared by all channels, only valid while a channel is being applied.
struct Scratch<S: Sample> {
    x_low: Vec<SubbandRow<S>>,
    x_high: Vec<SubbandRow<S>>,
    /// The QMF matrix fed to the synthesis filterbank.
    x: Vec<[Complex<S>; SYNTHESIS_BANDS]>,
    alpha0: [Complex<S>; ANALYSIS_BANDS],
    alpha1: [Complex<S>; ANALYSIS_BANDS],
    adj: Box<Adjustment<S>>,
}

impl<S: Sample> Scratch<S> {
    fn new() -> Self {
        Scratch {
            x_low: vec![[Complex::ZERO; LOW_SLOTS]; ANALYSIS_BANDS],
            x_high: vec![[Complex::ZERO; LOW_SLOTS]; SYNTHESIS_BANDS],
            x: vec![[Complex::ZERO; SYNTHESIS_BANDS]; QMF_SLOTS],
            alpha0: [Complex::ZERO; ANALYSIS_BANDS],
            alpha1: [Complex::ZERO; ANALYSIS_BANDS],
            adj: Box::default(),
        }
    }
}

/// Spectral Band Replication decoder for the channels of one AAC channel element.
///
/// The core decoder hands each SBR extension payload of the element to
/// [`decode_extension`](SbrDecoder::decode_extension), and then each decoded channel to
/// [`apply`](SbrDecoder::apply).
pub struct SbrDecoder<S: Sample = f32, D: SbrDsp<S> = PortableDsp> {
    dsp: D,
    /// The core sample rate.
    sample_rate: u32,
    downsampled: bool,
    header: Option<SbrHeader>,
    /// The spectrum parameters the tables were built from. Forgotten when turned off.
    spectrum: Option<SpectrumParams>,
    tables: Option<FrequencyTables>,
    /// A valid header was received and the tables are usable.
    start: bool,
    /// The last header reset the tables.
    reset: bool,
    channels: Vec<SbrChannel<S>>,
    scratch: Scratch<S>,
}

impl<S: Sample> SbrDecoder<S, PortableDsp> {
    /// Instantiate a SBR decoder for a core decoder running at `sample_rate`.
    pub fn new(sample_rate: u32, options: &SbrOptions) -> Self {
        Self::with_dsp(sample_rate, options, PortableDsp)
    }
}

impl<S: Sample, D: SbrDsp<S>> SbrDecoder<S, D> {
    /// Instantiate a SBR decoder using the given DSP kernels.
    pub fn with_dsp(sample_rate: u32, options: &SbrOptions, dsp: D) -> Self {
        SbrDecoder {
            dsp,
            sample_rate,
            downsampled: options.downsampled,
            header: None,
            spectrum: None,
            tables: None,
            start: false,
            reset: false,
            channels: (0..MAX_CHANNELS).map(|_| SbrChannel::new(options.downsampled)).collect(),
            scratch: Scratch::new(),
        }
    }

    /// Returns `true` if high band reconstruction is enabled.
    pub fn is_active(&self) -> bool {
        self.start && self.tables.is_some()
    }

    /// Get the frequency tables, if valid.
    pub fn tables(&self) -> Option<&FrequencyTables> {
        self.tables.as_ref()
    }

    /// Get the last header received.
    pub fn header(&self) -> Option<&SbrHeader> {
        self.header.as_ref()
    }

    /// The number of samples `apply` produces per frame.
    pub fn output_frame_len(&self) -> usize {
        if self.downsampled {
            FRAME_LEN
        }
        else {
            2 * FRAME_LEN
        }
    }

    /// The output sample rate.
    pub fn sample_rate(&self) -> u32 {
        if self.downsampled {
            self.sample_rate
        }
        else {
            2 * self.sample_rate
        }
    }

    /// Flush all history and forget the stream configuration.
    pub fn reset(&mut self) {
        self.header = None;
        self.spectrum = None;
        self.tables = None;
        self.start = false;
        self.reset = false;

        for channel in self.channels.iter_mut() {
            channel.reset();
        }
    }

    /// Disable high band reconstruction until the next header.
    fn turn_off(&mut self) {
        self.start = false;
        self.tables = None;
        self.spectrum = None;

        for channel in self.channels.iter_mut() {
            channel.prev.transient = None;
            channel.pending = None;
        }
    }

    /// Decode a SBR extension payload of `cnt` bytes attached to a channel element of type
    /// `element`. The 4 bit extension type must have been consumed, so exactly `8 * cnt - 4`
    /// bits are consumed from `bs`.
    ///
    /// Malformed payloads never fail. The data is discarded and the affected frames are
    /// upsampled without high band reconstruction. Returns the number of bytes consumed.
    pub fn decode_extension<B: ReadBitsLtr>(
        &mut self,
        bs: &mut B,
        cnt: usize,
        crc: bool,
        element: ElementType,
    ) -> usize {
        let num_bits = (8 * cnt).saturating_sub(4);

        self.reset = false;

        for channel in self.channels.iter_mut() {
            channel.pending = None;
        }

        let buf = match copy_payload(bs, num_bits) {
            Ok(buf) => buf,
            Err(err) => {
                warn!("sbr: truncated payload, {}", err);
                return cnt;
            }
        };

        let mut bs = BitReaderLtr::new(&buf);

        if let Err(err) = self.read_payload(&mut bs, crc, element) {
            warn!("sbr: discarding frame, {}", err);
        }

        let consumed = 8 * buf.len() - bs.bits_left() as usize;

        if consumed > num_bits {
            log_overread(cnt);
        }

        cnt
    }

    fn read_payload<B: ReadBitsLtr>(
        &mut self,
        bs: &mut B,
        crc: bool,
        element: ElementType,
    ) -> Result<()> {
        if crc {
            // bs_sbr_crc_bits
            bs.ignore_bits(10)?;
        }

        // bs_header_flag
        if bs.read_bool()? {
            let header = SbrHeader::read(bs)?;
            self.update_header(header);
        }

        if !self.start {
            return Ok(());
        }

        let (header, tables) = match (&self.header, &self.tables) {
            (Some(header), Some(tables)) => (header, tables),
            _ => return Ok(()),
        };

        let num_channels = element.channels();

        let prev: Vec<PreviousFrameState> =
            self.channels[..num_channels].iter().map(|c| c.prev.clone()).collect();

        let data = read_element_data(bs, element, header.amp_res, tables, &prev)?;

        let facs = if data.coupling {
            Vec::from(dequant_coupled(&data.channels[0], &data.channels[1], tables))
        }
        else {
            data.channels.iter().map(|frame| dequant(frame, tables)).collect()
        };

        for ((channel, frame), facs) in self.channels.iter_mut().zip(data.channels).zip(facs) {
            channel.prev = frame.carry();
            channel.pending = Some(PendingFrame { frame, facs });
        }

        read_extended_data(bs)
    }

    /// Act on a newly read header.
    fn update_header(&mut self, header: SbrHeader) {
        match header.change_from(self.spectrum.as_ref(), self.header.as_ref()) {
            HeaderChange::Reset => {
                debug!("sbr: reset, {:?}", header.spectrum);

                self.reset = true;

                let sbr_rate = 2 * self.sample_rate;

                match FrequencyTables::new(sbr_rate, &header.spectrum, header.limiter_bands) {
                    Ok(tables) => {
                        self.tables = Some(tables);
                        self.spectrum = Some(header.spectrum);

                        for channel in self.channels.iter_mut() {
                            channel.adjuster.index_noise = 0;
                        }
                    }
                    Err(err) => {
                        error!("sbr: turning off, {}", err);
                        self.header = Some(header);
                        self.turn_off();
                        return;
                    }
                }
            }
            HeaderChange::Limiter => {
                trace!("sbr: limiter bands changed to {}", header.limiter_bands);

                if let Some(tables) = self.tables.as_mut() {
                    tables.make_limiter(header.limiter_bands);
                }
            }
            HeaderChange::None => (),
        }

        self.header = Some(header);
        self.start = true;
    }

    /// Upsample one frame of core decoded samples of channel `ch`, reconstructing the high band
    /// if a valid frame was decoded for it.
    ///
    /// `input` holds 1024 samples in the range [-1.0, 1.0]. `output` must hold
    /// [`output_frame_len`](SbrDecoder::output_frame_len) samples.
    pub fn apply(&mut self, ch: usize, input: &[f32], output: &mut [f32]) {
        let out_len = self.output_frame_len();

        if input.len() < FRAME_LEN || output.len() < out_len {
            error!("sbr: invalid buffer lengths {} and {}", input.len(), output.len());
            return;
        }

        let SbrDecoder { dsp, header, tables, channels, scratch, reset, start, .. } = self;

        let channel = match channels.get_mut(ch) {
            Some(channel) => channel,
            None => {
                error!("sbr: invalid channel {}", ch);
                return;
            }
        };

        // Analysis.
        let mut samples = [S::ZERO; ANALYSIS_BANDS];

        for chunk in input[..FRAME_LEN].chunks_exact(ANALYSIS_BANDS) {
            for (s, &x) in samples.iter_mut().zip(chunk) {
                *s = S::from_f32(x * SAMPLE_SCALE);
            }
            channel.analysis.analyze(&samples, channel.w.push_slot());
        }

        std::mem::swap(&mut channel.y_cur, &mut channel.y_prev);

        for slot in channel.y_cur.iter_mut() {
            slot.fill(Complex::ZERO);
        }

        let pending = channel.pending.take();
        let prev_split = channel.split;

        let mut split = PASSTHROUGH;
        let mut spill = 0;

        if let (true, Some(pending), Some(header), Some(tables)) =
            (*start, pending, header.as_ref(), tables.as_ref())
        {
            let cur = BandSplit { kx: tables.kx, m: tables.m };

            hfgen::lf_gen(&mut scratch.x_low, &channel.w, cur.kx, prev_split.kx);

            match reconstruct(dsp, scratch, channel, &pending, tables, header, *reset) {
                Ok(()) => {
                    let grid = &pending.frame.grid;

                    split = cur;
                    spill = (RATE * grid.t_env[grid.num_env]).saturating_sub(QMF_SLOTS);
                }
                Err(err) => {
                    warn!("sbr: skipping high band, {}", err);

                    for slot in channel.y_cur.iter_mut() {
                        slot.fill(Complex::ZERO);
                    }
                }
            }
        }

        if split == PASSTHROUGH {
            hfgen::lf_gen(&mut scratch.x_low, &channel.w, split.kx, prev_split.kx);
        }

        hfgen::x_gen(
            &mut scratch.x,
            &scratch.x_low,
            &channel.y_prev,
            &channel.y_cur,
            prev_split,
            split,
            channel.spill,
        );

        channel.split = split;
        channel.spill = spill;

        // Synthesis.
        let bands = channel.synthesis.bands();
        let mut out = [S::ZERO; SYNTHESIS_BANDS];

        for (x, chunk) in scratch.x.iter().zip(output[..out_len].chunks_exact_mut(bands)) {
            channel.synthesis.synthesize(x, &mut out);

            for (y, &s) in chunk.iter_mut().zip(out.iter()) {
                *y = s.to_f32() / SAMPLE_SCALE;
            }
        }
    }
}

/// Generate and adjust the high band of one channel for one frame into `channel.y_cur`. The
/// low band must already be collected into `scratch.x_low`.
fn reconstruct<S: Sample, D: SbrDsp<S>>(
    dsp: &D,
    scratch: &mut Scratch<S>,
    channel: &mut SbrChannel<S>,
    pending: &PendingFrame<S>,
    tables: &FrequencyTables,
    header: &SbrHeader,
    reset: bool,
) -> Result<()> {
    let frame = &pending.frame;
    let grid = &frame.grid;

    let (alpha0, alpha1) = (&mut scratch.alpha0, &mut scratch.alpha1);
    hfgen::inverse_filter(dsp, &scratch.x_low, tables.k0, alpha0, alpha1);

    hfgen::chirp(&mut channel.bw, &frame.invf_mode, &frame.prev_invf_mode, tables.n_q());

    hfgen::hf_gen(
        dsp,
        &mut scratch.x_high,
        &scratch.x_low,
        &scratch.alpha0,
        &scratch.alpha1,
        &channel.bw,
        tables,
        grid,
    )?;

    let adj = &mut *scratch.adj;

    hfadj::mapping(adj, &mut channel.adjuster, frame, &pending.facs, tables)?;

    hfadj::env_estimate(dsp, adj, &scratch.x_high, tables, grid, header.interpol_freq);

    hfadj::gain_calc(adj, tables, grid, header.limiter_gains);

    hfadj::hf_assemble(
        dsp,
        &mut channel.y_cur,
        &scratch.x_high,
        adj,
        &mut channel.adjuster,
        tables,
        grid,
        header.smoothing_mode,
        reset,
    );

    Ok(())
}

/// Copy `num_bits` from `bs` into a zero padded buffer.
fn copy_payload<B: ReadBitsLtr>(bs: &mut B, num_bits: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(num_bits / 8 + 1 + PAYLOAD_PADDING);

    for _ in 0..num_bits / 8 {
        buf.push(bs.read_bits_leq32(8)? as u8);
    }

    let rem = (num_bits & 7) as u32;

    if rem > 0 {
        buf.push((bs.read_bits_leq32(rem)? << (8 - rem)) as u8);
    }

    buf.resize(buf.len() + PAYLOAD_PADDING, 0);

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::softfloat::SoftFloat;
    use crate::tables::{ENV_1_5DB_F_CODES, ENV_1_5DB_F_LENS, ENV_3_0DB_F_CODES, ENV_3_0DB_F_LENS};
    use crate::tables::{ENV_BAL_3_0DB_F_CODES, ENV_BAL_3_0DB_F_LENS};
    use crate::testutil::BitWriter;

    use std::f32::consts::PI;

    /// The delay of the decoder at twice the core sample rate.
    const DELAY: usize = 962;

    const CORE_RATE: u32 = 22050;

    fn write_header(bw: &mut BitWriter, stop_freq: u32) {
        bw.write(1, 1); // bs_header_flag
        bw.write(1, 1); // bs_amp_res
        bw.write(5, 4); // bs_start_freq
        bw.write(stop_freq, 4);
        bw.write(0, 3); // bs_xover_band
        bw.write(0, 2); // bs_reserved
        bw.write(1, 1); // bs_header_extra_1
        bw.write(0, 1); // bs_header_extra_2
        bw.write(2, 2); // bs_freq_scale
        bw.write(0, 1); // bs_alter_scale
        bw.write(2, 2); // bs_noise_bands
    }

    fn write_zero_f(bw: &mut BitWriter, n: usize) {
        for _ in 0..n {
            bw.write(ENV_3_0DB_F_CODES[31], u32::from(ENV_3_0DB_F_LENS[31]));
        }
    }

    /// A single channel element frame with two envelopes, all scale factors flat.
    fn write_sce_frame(bw: &mut BitWriter) {
        bw.write(0, 1); // bs_data_extra
        bw.write(0, 2); // FIXFIX
        bw.write(1, 2); // 2 envelopes
        bw.write(0, 1); // low resolution
        bw.write(0, 4); // dtdf
        bw.write(0, 6); // invf
        for _ in 0..2 {
            bw.write(10, 6);
            write_zero_f(bw, 8);
        }
        for _ in 0..2 {
            bw.write(6, 5);
            write_zero_f(bw, 2);
        }
        bw.write(0, 1); // bs_add_harmonic_flag
        bw.write(0, 1); // bs_extended_data
    }

    /// Pad a payload to a whole number of bytes following the 4 bit extension type, returning
    /// the payload and the byte count.
    fn finish_payload(mut bw: BitWriter) -> (Vec<u8>, usize) {
        let cnt = (bw.bits_written() + 4 + 7) / 8;
        while bw.bits_written() < 8 * cnt - 4 {
            bw.write(0, 1);
        }
        (bw.finish(), cnt)
    }

    fn decode<S: Sample>(dec: &mut SbrDecoder<S>, bw: BitWriter) {
        decode_element(dec, bw, ElementType::Sce);
    }

    fn decode_element<S: Sample>(dec: &mut SbrDecoder<S>, bw: BitWriter, element: ElementType) {
        let (buf, cnt) = finish_payload(bw);
        let mut bs = BitReaderLtr::new(&buf);

        assert_eq!(dec.decode_extension(&mut bs, cnt, false, element), cnt);
        assert_eq!(8 * buf.len() - bs.bits_left() as usize, 8 * cnt - 4);
    }

    fn write_zero_bal_f(bw: &mut BitWriter, n: usize) {
        for _ in 0..n {
            bw.write(ENV_BAL_3_0DB_F_CODES[12], u32::from(ENV_BAL_3_0DB_F_LENS[12]));
        }
    }

    /// A coupled channel pair element frame with two envelopes. The left channel carries flat
    /// levels, and the right channel flat balances of `2 * env_bal` and `2 * noise_bal`.
    fn write_coupled_cpe_frame(bw: &mut BitWriter, env_bal: u32, noise_bal: u32) {
        bw.write(0, 1); // bs_data_extra
        bw.write(1, 1); // bs_coupling
        bw.write(0, 2); // FIXFIX
        bw.write(1, 2); // 2 envelopes
        bw.write(0, 1); // low resolution
        bw.write(0, 4); // dtdf, left
        bw.write(0, 4); // dtdf, right
        bw.write(0, 6); // invf
        for _ in 0..2 {
            bw.write(20, 6);
            write_zero_f(bw, 8);
        }
        for _ in 0..2 {
            bw.write(6, 5);
            write_zero_f(bw, 2);
        }
        for _ in 0..2 {
            bw.write(env_bal, 5);
            write_zero_bal_f(bw, 8);
        }
        for _ in 0..2 {
            bw.write(noise_bal, 5);
            write_zero_bal_f(bw, 2);
        }
        bw.write(0, 1); // bs_add_harmonic_flag, left
        bw.write(0, 1); // bs_add_harmonic_flag, right
        bw.write(0, 1); // bs_extended_data
    }

    fn sine_frame(frame: usize) -> Vec<f32> {
        (0..FRAME_LEN)
            .map(|n| 0.5 * (2.0 * PI * 0.1 * (frame * FRAME_LEN + n) as f32).sin())
            .collect()
    }

    /// Check the output of frame `frame` is the input sine upsampled by 2.
    fn check_upsampled_sine(output: &[f32], frame: usize) {
        for (n, &y) in output.iter().enumerate() {
            let t = (2 * frame * FRAME_LEN + n) as f32 - DELAY as f32;
            let expected = 0.5 * (2.0 * PI * 0.1 * t / 2.0).sin();
            assert!((y - expected).abs() < 0.01, "{} {} {}", n, y, expected);
        }
    }

    #[test]
    fn verify_passthrough_without_sbr_data() {
        let mut dec = SbrDecoder::<f32>::new(CORE_RATE, &SbrOptions::default());

        assert!(!dec.is_active());
        assert_eq!(dec.sample_rate(), 44100);
        assert_eq!(dec.output_frame_len(), 2048);

        let mut output = vec![0.0; 2048];

        for frame in 0..4 {
            dec.apply(0, &sine_frame(frame), &mut output);
        }

        check_upsampled_sine(&output, 3);
    }

    #[test]
    fn verify_downsampled_passthrough() {
        let options = SbrOptions { downsampled: true };
        let mut dec = SbrDecoder::<f32>::new(CORE_RATE, &options);

        assert_eq!(dec.sample_rate(), CORE_RATE);
        assert_eq!(dec.output_frame_len(), 1024);

        let mut output = vec![0.0; 1024];

        for frame in 0..4 {
            dec.apply(0, &sine_frame(frame), &mut output);
        }

        for (n, &y) in output.iter().enumerate() {
            let t = (3 * FRAME_LEN + n) as f32 - 481.0;
            let expected = 0.5 * (2.0 * PI * 0.1 * t).sin();
            assert!((y - expected).abs() < 0.01);
        }
    }

    #[test]
    fn verify_flat_envelopes_give_flat_gains() {
        let mut dec = SbrDecoder::<f32>::new(CORE_RATE, &SbrOptions::default());

        let silence = vec![0.0; FRAME_LEN];
        let mut output = vec![0.0; 2048];

        for frame in 0..2 {
            let mut bw = BitWriter::default();
            if frame == 0 {
                write_header(&mut bw, 9);
            }
            else {
                bw.write(0, 1); // bs_header_flag
            }
            write_sce_frame(&mut bw);
            decode(&mut dec, bw);

            assert!(dec.is_active());

            let tables = dec.tables().unwrap();
            assert_eq!((tables.kx, tables.m), (14, 33));
            assert_eq!((tables.n_low(), tables.n_high(), tables.n_q()), (9, 18, 3));
            assert!(tables.patches.len() <= MAX_PATCHES);
            let m = tables.m;

            dec.apply(0, &silence, &mut output);

            let adj = &dec.scratch.adj;
            for e in 0..2 {
                let (gain, q_m) = (adj.gain[e][0], adj.q_m[e][0]);
                assert!(gain > 0.0);
                assert!(adj.gain[e][..m].iter().all(|&g| (g - gain).abs() <= 1e-5 * gain));
                assert!(adj.q_m[e][..m].iter().all(|&q| (q - q_m).abs() <= 1e-5 * q_m));
            }
        }

        // Noise is added to the high band of silent input.
        assert!(output.iter().any(|&y| y != 0.0));
        assert!(output.iter().all(|y| y.is_finite()));
    }

    /// Decode four frames of a coupled channel pair carrying the same sine on both channels,
    /// returning the high band energy of the last frame of each channel.
    fn coupled_pair_hf_energy(env_bal: u32, noise_bal: u32) -> [f32; 2] {
        let mut dec = SbrDecoder::<f32>::new(CORE_RATE, &SbrOptions::default());
        let mut plain = SbrDecoder::<f32>::new(CORE_RATE, &SbrOptions::default());

        let mut output = [vec![0.0; 2048], vec![0.0; 2048]];
        let mut upsampled = vec![0.0; 2048];

        for frame in 0..4 {
            let mut bw = BitWriter::default();
            if frame == 0 {
                write_header(&mut bw, 9);
            }
            else {
                bw.write(0, 1); // bs_header_flag
            }
            write_coupled_cpe_frame(&mut bw, env_bal, noise_bal);
            decode_element(&mut dec, bw, ElementType::Cpe);

            assert!(dec.is_active());

            for (ch, output) in output.iter_mut().enumerate() {
                assert!(dec.channels[ch].pending.is_some());
                dec.apply(ch, &sine_frame(frame), output);
                assert_eq!(dec.channels[ch].split, BandSplit { kx: 14, m: 33 });
            }

            plain.apply(0, &sine_frame(frame), &mut upsampled);
        }

        // The low band is the same as plain upsampling, the remainder is the high band.
        let mut energy = [0.0; 2];

        for (e, output) in energy.iter_mut().zip(output.iter()) {
            assert!(output.iter().all(|y| y.is_finite()));
            *e = output.iter().zip(upsampled.iter()).map(|(y, u)| (y - u) * (y - u)).sum();
        }

        energy
    }

    #[test]
    fn verify_coupled_channel_pair() {
        // Balance 12 is centred at 3 dB resolution.
        let [left, right] = coupled_pair_hf_energy(6, 6);

        assert!(left > 1e-3);
        assert!((left - right).abs() <= 1e-3 * left, "{} {}", left, right);

        // Balance 0 moves both the envelope and the noise floor to the right channel.
        let [left, right] = coupled_pair_hf_energy(0, 0);

        assert!(right > 1e-3);
        assert!(right > 100.0 * left, "{} {}", left, right);
    }

    #[test]
    fn verify_invalid_tables_fall_back_to_upsampling() {
        let mut dec = SbrDecoder::<f32>::new(CORE_RATE, &SbrOptions::default());
        let mut output = vec![0.0; 2048];

        // At 44.1 kHz a stop frequency of 13 spans too many subbands.
        let mut bw = BitWriter::default();
        write_header(&mut bw, 13);
        write_sce_frame(&mut bw);
        decode(&mut dec, bw);

        assert!(!dec.is_active());
        assert!(dec.tables().is_none());
        assert!(dec.header().is_some());

        for frame in 0..4 {
            dec.apply(0, &sine_frame(frame), &mut output);
        }

        check_upsampled_sine(&output, 3);

        // A corrected header turns reconstruction back on.
        let mut bw = BitWriter::default();
        write_header(&mut bw, 9);
        write_sce_frame(&mut bw);
        decode(&mut dec, bw);

        assert!(dec.is_active());
    }

    #[test]
    fn verify_malformed_frame_is_skipped() {
        let mut dec = SbrDecoder::<f32>::new(CORE_RATE, &SbrOptions::default());
        let mut output = vec![0.0; 2048];

        let mut bw = BitWriter::default();
        write_header(&mut bw, 9);
        write_sce_frame(&mut bw);
        decode(&mut dec, bw);

        for frame in 0..4 {
            let mut bw = BitWriter::default();
            bw.write(0, 1); // bs_header_flag
            bw.write(0, 1); // bs_data_extra
            bw.write(0, 2); // FIXFIX
            bw.write(0, 2); // 1 envelope, 1.5 dB
            bw.write(0, 1); // low resolution
            bw.write(0, 2); // dtdf
            bw.write(0, 6); // invf
            // The second band's scale factor is out of range.
            bw.write(127, 7);
            bw.write(ENV_1_5DB_F_CODES[61], u32::from(ENV_1_5DB_F_LENS[61]));
            decode(&mut dec, bw);

            dec.apply(0, &sine_frame(frame), &mut output);
        }

        // The decoder stays configured, but the high band is not reconstructed.
        assert!(dec.is_active());
        check_upsampled_sine(&output, 3);
    }

    #[test]
    fn verify_short_payload() {
        let mut dec = SbrDecoder::<f32>::new(CORE_RATE, &SbrOptions::default());

        let mut bw = BitWriter::default();
        write_header(&mut bw, 9);
        write_sce_frame(&mut bw);
        let buf = bw.finish();

        // The host's byte count is too small, exactly that many bits are consumed anyway.
        let mut bs = BitReaderLtr::new(&buf);
        assert_eq!(dec.decode_extension(&mut bs, 3, false, ElementType::Sce), 3);
        assert_eq!(8 * buf.len() - bs.bits_left() as usize, 20);
    }

    #[test]
    fn verify_softfloat_decoder() {
        let mut dec = SbrDecoder::<SoftFloat>::new(CORE_RATE, &SbrOptions::default());
        let mut output = vec![0.0; 2048];

        for frame in 0..3 {
            let mut bw = BitWriter::default();
            write_header(&mut bw, 9);
            write_sce_frame(&mut bw);
            decode(&mut dec, bw);

            dec.apply(0, &sine_frame(frame), &mut output);
        }

        assert!(dec.is_active());
        assert!(output.iter().all(|y| y.is_finite()));
        assert!(output.iter().any(|&y| y != 0.0));
    }
}
