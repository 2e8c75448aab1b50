// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Constants and helpers shared by every SBR stage.

/// Number of core decoder samples per channel per frame.
pub const FRAME_LEN: usize = 1024;

/// Number of SBR time slots per frame (960-sample frames are not supported).
pub const NUM_TIME_SLOTS: usize = 16;

/// Number of QMF slots per SBR time slot.
pub const RATE: usize = 2;

/// Number of QMF slots per frame.
pub const QMF_SLOTS: usize = NUM_TIME_SLOTS * RATE;

/// Number of subbands produced by the analysis filterbank.
pub const ANALYSIS_BANDS: usize = 32;

/// Number of subbands consumed by the full-rate synthesis filterbank.
pub const SYNTHESIS_BANDS: usize = 64;

/// Look-ahead of the low band buffer into the previous frame, in QMF slots.
pub const T_HFGEN: usize = 8;

/// Offset of the envelope adjuster relative to the high band generator, in QMF slots.
pub const T_HFADJ: usize = 2;

/// Number of QMF slots held by the low band buffer.
pub const LOW_SLOTS: usize = QMF_SLOTS + T_HFGEN;

/// Number of QMF slots the envelope adjuster may write. The last envelope border may extend 3
/// SBR time slots into the next frame.
pub const HIGH_SLOTS: usize = QMF_SLOTS + 3 * RATE;

/// Maximum number of envelopes in one frame.
pub const MAX_ENVELOPES: usize = 5;

/// Maximum number of noise floor envelopes in one frame.
pub const MAX_NOISE_ENVELOPES: usize = 2;

/// Maximum number of noise floor bands.
pub const MAX_NOISE_BANDS: usize = 5;

/// Maximum number of high band subbands (`m`), and of envelope bands.
pub const MAX_BANDS: usize = 48;

/// Maximum number of HF patches. The format allows 5, but conformance streams use 6.
pub const MAX_PATCHES: usize = 6;

/// The syntactic element an SBR extension payload is attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ElementType {
    /// Single channel element.
    Sce,
    /// Channel pair element.
    Cpe,
    /// Coupling channel element.
    Cce,
}

impl ElementType {
    /// The number of SBR channels carried by the element.
    pub fn channels(self) -> usize {
        match self {
            ElementType::Cpe => 2,
            _ => 1,
        }
    }
}

macro_rules! validate {
    ($a:expr) => {
        if !$a {
            log::error!("check failed at {}:{}", file!(), line!());
            return symphonia_core::errors::decode_error("sbr: invalid data");
        }
    };
}

pub(crate) use validate;
