// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `qmf` module implements the complex-exponential modulated QMF filterbanks: the 32 band
//! analysis filterbank, and the 64 band and downsampled 32 band synthesis filterbanks.
//!
//! All three are derived from the 640 tap prototype filter of ISO/IEC 14496-3. Analysis followed
//! by synthesis is a delay of 578 (64 bands), or 289 (32 bands), output samples.
//!
//! Windowing and polyphase folding are shared by every [`Sample`] type. The complex modulation
//! stage is selected by [`Sample::Modulation`]: `f32` uses the FFT and IMDCT of
//! `symphonia-core`, while other types evaluate the modulation sums directly.

use std::f64::consts::PI;

use lazy_static::lazy_static;
use symphonia_core::dsp::complex::Complex as FftComplex;
use symphonia_core::dsp::fft::Fft;
use symphonia_core::dsp::mdct::Imdct;

use crate::common::{ANALYSIS_BANDS, SYNTHESIS_BANDS};
use crate::complex::Complex;
use crate::ring::SlotRing;
use crate::sample::Sample;

/// The number of prototype filter taps.
const PROTOTYPE_LEN: usize = 640;

/// The number of input samples the analysis filterbank windows per slot.
const ANALYSIS_WINDOW_LEN: usize = PROTOTYPE_LEN / 2;

/// The number of polyphase components summed per output sample.
const TAPS_PER_PHASE: usize = 10;

/// The number of folded samples modulated per analysis slot.
const FOLD_LEN: usize = 2 * ANALYSIS_BANDS;

/// Taps 0 to 320 of the prototype filter. The taps of every second block of 128 are stored
/// negated.
#[rustfmt::skip]
const QMF_WINDOW_HALF: [f64; ANALYSIS_WINDOW_LEN + 1] = [
     0.0000000000, -0.0005525286, -0.0005617692, -0.0004947518,
    -0.0004875227, -0.0004893791, -0.0005040714, -0.0005226564,
    -0.0005466565, -0.0005677802, -0.0005870930, -0.0006132747,
    -0.0006312493, -0.0006540333, -0.0006777690, -0.0006941614,
    -0.0007157736, -0.0007255043, -0.0007440941, -0.0007490598,
    -0.0007681371, -0.0007724848, -0.0007834332, -0.0007779869,
    -0.0007803664, -0.0007801449, -0.0007757977, -0.0007630793,
    -0.0007530001, -0.0007319357, -0.0007215391, -0.0006917937,
    -0.0006650415, -0.0006341594, -0.0005946118, -0.0005564576,
    -0.0005145572, -0.0004606325, -0.0004095121, -0.0003501175,
    -0.0002896981, -0.0002098337, -0.0001446380, -0.0000617334,
     0.0000134949,  0.0001094383,  0.0002043017,  0.0002949531,
     0.0004026540,  0.0005107388,  0.0006239376,  0.0007458025,
     0.0008608443,  0.0009885988,  0.0011250155,  0.0012577884,
     0.0013902494,  0.0015443219,  0.0016868083,  0.0018348265,
     0.0019841140,  0.0021461583,  0.0023017254,  0.0024625616,
     0.0026201758,  0.0027870464,  0.0029469447,  0.0031125420,
     0.0032739613,  0.0034418874,  0.0036008268,  0.0037603922,
     0.0039207432,  0.0040819753,  0.0042264269,  0.0043730719,
     0.0045209852,  0.0046606460,  0.0047932560,  0.0049137603,
     0.0050393022,  0.0051407353,  0.0052461166,  0.0053471681,
     0.0054196775,  0.0054876040,  0.0055475714,  0.0055938023,
     0.0056220643,  0.0056455196,  0.0056389199,  0.0056266114,
     0.0055917128,  0.0055404363,  0.0054753783,  0.0053838975,
     0.0052715758,  0.0051382275,  0.0049839687,  0.0048109469,
     0.0046039530,  0.0043801861,  0.0041251642,  0.0038456408,
     0.0035401246,  0.0032091885,  0.0028446757,  0.0024508540,
     0.0020274176,  0.0015784682,  0.0010902329,  0.0005832264,
     0.0000276045, -0.0005464280, -0.0011568135, -0.0018039472,
    -0.0024826723, -0.0031933778, -0.0039401124, -0.0047222596,
    -0.0055337211, -0.0063792293, -0.0072615816, -0.0081798233,
    -0.0091325329, -0.0101150215, -0.0111315548, -0.0121849995,
     0.0132718220,  0.0143904666,  0.0155405553,  0.0167324712,
     0.0179433381,  0.0191872431,  0.0204531793,  0.0217467550,
     0.0230680169,  0.0244160992,  0.0257875847,  0.0271859429,
     0.0286072173,  0.0300502657,  0.0315017608,  0.0329754081,
     0.0344620948,  0.0359697560,  0.0374812850,  0.0390053679,
     0.0405349170,  0.0420649094,  0.0436097542,  0.0451488405,
     0.0466843027,  0.0482165720,  0.0497385755,  0.0512556155,
     0.0527630746,  0.0542452768,  0.0557173648,  0.0571616450,
     0.0585915683,  0.0599837480,  0.0613455171,  0.0626857808,
     0.0639715898,  0.0652247106,  0.0664367512,  0.0676075985,
     0.0687043828,  0.0697630244,  0.0707628710,  0.0717002673,
     0.0725682583,  0.0733620255,  0.0741003642,  0.0747452558,
     0.0753137336,  0.0758008358,  0.0761992479,  0.0764992170,
     0.0767093490,  0.0768173975,  0.0768230011,  0.0767204924,
     0.0765050718,  0.0761748321,  0.0757305756,  0.0751576255,
     0.0744664394,  0.0736406005,  0.0726774642,  0.0715826364,
     0.0703533073,  0.0689664013,  0.0674525021,  0.0657690668,
     0.0639444805,  0.0619602779,  0.0598166570,  0.0575152691,
     0.0550460034,  0.0524093821,  0.0495978676,  0.0466303305,
     0.0434768782,  0.0401458278,  0.0366418116,  0.0329583930,
     0.0290824006,  0.0250307561,  0.0207997072,  0.0163701258,
     0.0117623832,  0.0069636862,  0.0019765601, -0.0032086896,
    -0.0085711749, -0.0141288827, -0.0198834129, -0.0258227288,
    -0.0319531274, -0.0382776572, -0.0447806821, -0.0514804176,
    -0.0583705326, -0.0654409853, -0.0726943300, -0.0801372934,
    -0.0877547536, -0.0955533352, -0.1035329531, -0.1116826931,
    -0.1200077984, -0.1285002850, -0.1371551761, -0.1459766491,
    -0.1549607071, -0.1640958855, -0.1733808172, -0.1828172548,
    -0.1923966745, -0.2021250176, -0.2119735853, -0.2219652696,
    -0.2320690870, -0.2423016884, -0.2526480309, -0.2631053299,
    -0.2736634040, -0.2843214189, -0.2950716717, -0.3059098575,
    -0.3168278913, -0.3278113727, -0.3388722693, -0.3499914122,
     0.3611589903,  0.3723795546,  0.3836350013,  0.3949211761,
     0.4062317676,  0.4175696896,  0.4289119920,  0.4402553754,
     0.4515996535,  0.4629308085,  0.4742453214,  0.4855253091,
     0.4967708254,  0.5079817500,  0.5191234970,  0.5302240895,
     0.5412553448,  0.5522051258,  0.5630789140,  0.5738524131,
     0.5845403235,  0.5951123086,  0.6055783538,  0.6159109932,
     0.6261242695,  0.6361980107,  0.6461269695,  0.6559016302,
     0.6655139880,  0.6749663190,  0.6842353293,  0.6933282376,
     0.7022388719,  0.7109410426,  0.7194462634,  0.7277448900,
     0.7358211758,  0.7436827863,  0.7513137456,  0.7587080760,
     0.7658674865,  0.7727780881,  0.7794287519,  0.7858353120,
     0.7919735841,  0.7978466413,  0.8034485751,  0.8087695004,
     0.8138191270,  0.8185776004,  0.8230419890,  0.8272275347,
     0.8311038457,  0.8346937361,  0.8379717337,  0.8409541392,
     0.8436238281,  0.8459818469,  0.8480315777,  0.8497805198,
     0.8511971524,  0.8523047035,  0.8531020949,  0.8535720573,
     0.8537385600,
];

lazy_static! {
    /// The prototype filter `c(n)`, with the sign of every second block of 128 taps inverted.
    static ref QMF_WINDOW: [f64; PROTOTYPE_LEN] = {
        let mut window = [0f64; PROTOTYPE_LEN];

        window[..=ANALYSIS_WINDOW_LEN].copy_from_slice(&QMF_WINDOW_HALF);

        // The prototype is symmetric about tap 320.
        for n in 1..ANALYSIS_WINDOW_LEN {
            window[ANALYSIS_WINDOW_LEN + n] = window[ANALYSIS_WINDOW_LEN - n];
        }

        // Mirroring carries the sign of the wrong block into the first tap of blocks 3 and 4.
        window[384] = -window[384];
        window[512] = -window[512];

        window
    };
}

/// The complex modulation stage of the QMF filterbanks.
pub trait QmfModulation<S: Sample>: Send + Sync + Sized {
    /// Instantiate the modulation of the 32 band analysis filterbank.
    fn new_analysis() -> Self;

    /// Instantiate the modulation of a synthesis filterbank with `bands` subbands, 64 or 32.
    fn new_synthesis(bands: usize) -> Self;

    /// Modulate 64 folded samples, `u`, into 32 subband samples:
    ///
    /// `W(k) = 2 * sum(u(n) * exp(i*pi*(k + 0.5)*(2n - 0.5)/64))`
    fn analysis(&mut self, u: &[S; FOLD_LEN], w: &mut [Complex<S>]);

    /// Demodulate one slot of subband samples, `x`, into `2 * bands` samples, `v`. With 64
    /// bands:
    ///
    /// `v(n) = 1/64 * sum(Re(X(k) * exp(i*pi*(k + 0.5)*(2n - 255)/128)))`
    ///
    /// With 32 bands, the even samples of the 64 band result for an empty upper half.
    fn synthesis(&mut self, x: &[Complex<S>], v: &mut [S]);
}

/// The modulation sums evaluated directly from precomputed twiddle factors.
pub struct DirectModulation<S: Sample> {
    bands: usize,
    twiddle: Box<[Complex<S>]>,
}

impl<S: Sample> QmfModulation<S> for DirectModulation<S> {
    fn new_analysis() -> Self {
        let mut twiddle = Vec::with_capacity(ANALYSIS_BANDS * FOLD_LEN);

        for k in 0..ANALYSIS_BANDS {
            for n in 0..FOLD_LEN {
                let theta = PI * (k as f64 + 0.5) * (2.0 * n as f64 - 0.5) / 64.0;
                twiddle.push(Complex::new(
                    S::from_f64(2.0 * theta.cos()),
                    S::from_f64(2.0 * theta.sin()),
                ));
            }
        }

        DirectModulation { bands: ANALYSIS_BANDS, twiddle: twiddle.into_boxed_slice() }
    }

    fn new_synthesis(bands: usize) -> Self {
        let offset = if bands == SYNTHESIS_BANDS { 255.0 } else { 127.5 };

        let scale = 1.0 / 64.0;
        let mut twiddle = Vec::with_capacity(2 * bands * bands);

        for n in 0..2 * bands {
            for k in 0..bands {
                let theta = PI * (k as f64 + 0.5) * (2.0 * n as f64 - offset) / (2 * bands) as f64;
                twiddle.push(Complex::new(
                    S::from_f64(scale * theta.cos()),
                    S::from_f64(scale * theta.sin()),
                ));
            }
        }

        DirectModulation { bands, twiddle: twiddle.into_boxed_slice() }
    }

    fn analysis(&mut self, u: &[S; FOLD_LEN], w: &mut [Complex<S>]) {
        for (w, twiddle) in w[..ANALYSIS_BANDS].iter_mut().zip(self.twiddle.chunks_exact(FOLD_LEN))
        {
            let mut acc = Complex::ZERO;

            for (&u, tw) in u.iter().zip(twiddle) {
                acc += tw.scale(u);
            }

            *w = acc;
        }
    }

    fn synthesis(&mut self, x: &[Complex<S>], v: &mut [S]) {
        let bands = self.bands;

        for (v, twiddle) in v[..2 * bands].iter_mut().zip(self.twiddle.chunks_exact(bands)) {
            let mut acc = S::ZERO;

            for (x, tw) in x[..bands].iter().zip(twiddle) {
                acc += x.re * tw.re - x.im * tw.im;
            }

            *v = acc;
        }
    }
}

/// The modulation sums computed with a 64 point FFT (analysis), or a pair of 64 point IMDCTs
/// (synthesis).
pub struct FftModulation {
    bands: usize,
    fft: Fft,
    imdct: Imdct,
    /// Analysis pre-twiddle, `exp(-i*pi*n/64)`.
    pre: Box<[FftComplex]>,
    /// Analysis post-twiddle, `2 * exp(-i*pi*(2k + 1)/256)`.
    post: Box<[FftComplex]>,
    buf: Box<[FftComplex]>,
    spectrum: Box<[f32]>,
    re: Box<[f32]>,
    im: Box<[f32]>,
}

impl FftModulation {
    fn new(bands: usize) -> Self {
        let pre = (0..FOLD_LEN)
            .map(|n| {
                let theta = -PI * n as f64 / 64.0;
                FftComplex::new(theta.cos() as f32, theta.sin() as f32)
            })
            .collect();

        let post = (0..ANALYSIS_BANDS)
            .map(|k| {
                let theta = -PI * (2 * k + 1) as f64 / 256.0;
                FftComplex::new((2.0 * theta.cos()) as f32, (2.0 * theta.sin()) as f32)
            })
            .collect();

        FftModulation {
            bands,
            fft: Fft::new(FOLD_LEN),
            imdct: Imdct::new_scaled(SYNTHESIS_BANDS, 1.0 / 64.0),
            pre,
            post,
            buf: vec![Default::default(); FOLD_LEN].into_boxed_slice(),
            spectrum: vec![0.0; SYNTHESIS_BANDS].into_boxed_slice(),
            re: vec![0.0; 2 * SYNTHESIS_BANDS].into_boxed_slice(),
            im: vec![0.0; 2 * SYNTHESIS_BANDS].into_boxed_slice(),
        }
    }
}

/// Map sample `n` of a 128 sample IMDCT output onto the synthesis phase `n - 127.5`.
#[inline(always)]
fn imdct_phase(y: &[f32], n: usize) -> f32 {
    if n < 32 {
        y[n + 96]
    }
    else {
        -y[n - 32]
    }
}

impl QmfModulation<f32> for FftModulation {
    fn new_analysis() -> Self {
        Self::new(ANALYSIS_BANDS)
    }

    fn new_synthesis(bands: usize) -> Self {
        Self::new(bands)
    }

    fn analysis(&mut self, u: &[f32; FOLD_LEN], w: &mut [Complex<f32>]) {
        for ((b, &u), &pre) in self.buf.iter_mut().zip(u.iter()).zip(self.pre.iter()) {
            *b = pre.scale(u);
        }

        self.fft.fft_inplace(&mut self.buf);

        // Only the lower half of the spectrum is needed.
        for (k, w) in w[..ANALYSIS_BANDS].iter_mut().enumerate() {
            let y = self.post[k] * self.buf[k].conj();
            *w = Complex::new(y.re, y.im);
        }
    }

    fn synthesis(&mut self, x: &[Complex<f32>], v: &mut [f32]) {
        let bands = self.bands;

        // Cosine part.
        for (k, s) in self.spectrum.iter_mut().enumerate() {
            *s = if k < bands { x[k].re } else { 0.0 };
        }

        self.imdct.imdct(&self.spectrum, &mut self.re);

        // Sine part, as a cosine transform of the reversed spectrum with alternating signs.
        for (k, s) in self.spectrum.iter_mut().enumerate() {
            let j = SYNTHESIS_BANDS - 1 - k;
            *s = if j < bands { x[j].im } else { 0.0 };
        }

        self.imdct.imdct(&self.spectrum, &mut self.im);

        if bands == SYNTHESIS_BANDS {
            for (n, v) in v[..2 * bands].iter_mut().enumerate() {
                let im = imdct_phase(&self.im, n);
                *v = imdct_phase(&self.re, n) - if n & 1 == 0 { im } else { -im };
            }
        }
        else {
            for (p, v) in v[..2 * bands].iter_mut().enumerate() {
                *v = imdct_phase(&self.re, 2 * p) - imdct_phase(&self.im, 2 * p);
            }
        }
    }
}

/// The 32 band analysis filterbank.
pub struct QmfAnalysis<S: Sample> {
    /// Every second prototype tap.
    window: Box<[S]>,
    modulation: S::Modulation,
    /// The last 320 input samples, oldest first.
    history: Box<[S]>,
    limit: Option<S>,
}

impl<S: Sample> QmfAnalysis<S> {
    pub fn new() -> Self {
        let window = (0..ANALYSIS_WINDOW_LEN).map(|n| S::from_f64(QMF_WINDOW[2 * n])).collect();

        QmfAnalysis {
            window,
            modulation: S::Modulation::new_analysis(),
            history: vec![S::ZERO; ANALYSIS_WINDOW_LEN].into_boxed_slice(),
            limit: S::ANALYSIS_LIMIT.map(S::from_f32),
        }
    }

    pub fn reset(&mut self) {
        self.history.fill(S::ZERO);
    }

    /// Analyse the next 32 input samples into one slot of 32 subband samples.
    pub fn analyze(&mut self, input: &[S], out: &mut [Complex<S>]) {
        let len = self.history.len();

        self.history.copy_within(ANALYSIS_BANDS.., 0);
        self.history[len - ANALYSIS_BANDS..].copy_from_slice(&input[..ANALYSIS_BANDS]);

        let mut folded = [S::ZERO; FOLD_LEN];

        for (n, fold) in folded.iter_mut().enumerate() {
            let mut acc = S::ZERO;

            for m in (n..ANALYSIS_WINDOW_LEN).step_by(FOLD_LEN) {
                acc += self.history[len - 1 - m] * self.window[m];
            }

            *fold = match self.limit {
                Some(limit) => acc.maximum(-limit).minimum(limit),
                None => acc,
            };
        }

        self.modulation.analysis(&folded, out);
    }
}

impl<S: Sample> Default for QmfAnalysis<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// The 64 band synthesis filterbank, or the downsampled 32 band synthesis filterbank.
pub struct QmfSynthesis<S: Sample> {
    bands: usize,
    window: Box<[S]>,
    modulation: S::Modulation,
    /// The last 10 slots of `2 * bands` intermediate samples.
    ring: SlotRing<S>,
}

impl<S: Sample> QmfSynthesis<S> {
    /// Instantiate a synthesis filterbank with 64 (full rate) or 32 (downsampled) bands.
    pub fn new(downsampled: bool) -> Self {
        let (bands, step) = if downsampled { (ANALYSIS_BANDS, 2) } else { (SYNTHESIS_BANDS, 1) };

        let window =
            (0..TAPS_PER_PHASE * bands).map(|i| S::from_f64(QMF_WINDOW[step * i])).collect();

        QmfSynthesis {
            bands,
            window,
            modulation: S::Modulation::new_synthesis(bands),
            ring: SlotRing::new(TAPS_PER_PHASE, 2 * bands),
        }
    }

    /// The number of subbands consumed, and output samples produced, per slot.
    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn reset(&mut self) {
        self.ring.clear();
    }

    /// Synthesize one slot of subband samples into output samples.
    pub fn synthesize(&mut self, x: &[Complex<S>], out: &mut [S]) {
        let bands = self.bands;

        self.modulation.synthesis(x, self.ring.push_slot());

        // Even taps read the first half of a slot, odd taps the second half.
        for (j, out) in out[..bands].iter_mut().enumerate() {
            let mut acc = S::ZERO;

            for i in 0..TAPS_PER_PHASE {
                acc += self.ring.slot(i)[j + (i & 1) * bands] * self.window[j + bands * i];
            }

            *out = acc;
        }
    }
}
