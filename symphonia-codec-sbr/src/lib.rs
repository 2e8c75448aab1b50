// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A Spectral Band Replication (SBR) decoder for MPEG-4 AAC (HE-AAC).
//!
//! SBR reconstructs the high band of a signal from its core decoded low band and a small amount
//! of side information carried in the extension payloads of the core bitstream. The
//! [`SbrDecoder`] is owned by a core AAC decoder, which:
//!
//! 1. hands it every SBR extension payload with
//!    [`decode_extension`](SbrDecoder::decode_extension), and then,
//! 2. passes each channel's 1024 core decoded samples through
//!    [`apply`](SbrDecoder::apply), receiving 2048 samples at twice the core sample rate.
//!
//! When no valid SBR data is available the core output is upsampled without high band
//! reconstruction.

#![allow(clippy::needless_range_loop)]

mod bitstream;
mod codebooks;
mod common;
mod complex;
mod decoder;
mod dequant;
mod dsp;
mod freq;
mod grid;
mod header;
mod hfadj;
mod hfgen;
mod qmf;
mod ring;
mod sample;
mod softfloat;
mod tables;

#[cfg(test)]
mod testutil;

pub use common::ElementType;
pub use complex::Complex;
pub use decoder::{SbrDecoder, SbrOptions};
pub use dsp::{Autocorrelation, PortableDsp, SbrDsp};
pub use freq::{FrequencyTables, Patch};
pub use header::{SbrHeader, SpectrumParams};
pub use qmf::{DirectModulation, FftModulation, QmfModulation};
pub use sample::{ResetReseed, Sample};
pub use softfloat::SoftFloat;
