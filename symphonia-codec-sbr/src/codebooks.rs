// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use symphonia_core::errors::Result;
use symphonia_core::io::vlc::{BitOrder, Codebook, CodebookBuilder, Entry8x16};
use symphonia_core::io::ReadBitsLtr;

use lazy_static::lazy_static;

use crate::tables::*;

/// A Huffman codebook of signed envelope or noise floor deltas.
pub struct DeltaCodebook {
    codebook: Codebook<Entry8x16>,
    /// The largest absolute delta. The entry with index `i` decodes to `i - lav`.
    lav: i32,
}

impl DeltaCodebook {
    fn new(codes: &[u32], lens: &[u8], lav: i32) -> Self {
        let values: Vec<u8> = (0..codes.len() as u8).collect();

        let mut builder = CodebookBuilder::new(BitOrder::Verbatim);
        builder.bits_per_read(8);

        let codebook = builder.make::<Entry8x16>(codes, lens, &values).unwrap();

        DeltaCodebook { codebook, lav }
    }

    /// Read one delta.
    #[inline(always)]
    pub fn read<B: ReadBitsLtr>(&self, bs: &mut B) -> Result<i32> {
        Ok(i32::from(bs.read_codebook(&self.codebook)?.0) - self.lav)
    }
}

lazy_static! {
    pub static ref ENV_1_5DB_F: DeltaCodebook =
        DeltaCodebook::new(&ENV_1_5DB_F_CODES, &ENV_1_5DB_F_LENS, 60);
    pub static ref ENV_1_5DB_T: DeltaCodebook =
        DeltaCodebook::new(&ENV_1_5DB_T_CODES, &ENV_1_5DB_T_LENS, 60);
    pub static ref ENV_BAL_1_5DB_F: DeltaCodebook =
        DeltaCodebook::new(&ENV_BAL_1_5DB_F_CODES, &ENV_BAL_1_5DB_F_LENS, 24);
    pub static ref ENV_BAL_1_5DB_T: DeltaCodebook =
        DeltaCodebook::new(&ENV_BAL_1_5DB_T_CODES, &ENV_BAL_1_5DB_T_LENS, 24);
    pub static ref ENV_3_0DB_F: DeltaCodebook =
        DeltaCodebook::new(&ENV_3_0DB_F_CODES, &ENV_3_0DB_F_LENS, 31);
    pub static ref ENV_3_0DB_T: DeltaCodebook =
        DeltaCodebook::new(&ENV_3_0DB_T_CODES, &ENV_3_0DB_T_LENS, 31);
    pub static ref ENV_BAL_3_0DB_F: DeltaCodebook =
        DeltaCodebook::new(&ENV_BAL_3_0DB_F_CODES, &ENV_BAL_3_0DB_F_LENS, 12);
    pub static ref ENV_BAL_3_0DB_T: DeltaCodebook =
        DeltaCodebook::new(&ENV_BAL_3_0DB_T_CODES, &ENV_BAL_3_0DB_T_LENS, 12);
    pub static ref NOISE_3_0DB_T: DeltaCodebook =
        DeltaCodebook::new(&NOISE_3_0DB_T_CODES, &NOISE_3_0DB_T_LENS, 31);
    pub static ref NOISE_BAL_3_0DB_T: DeltaCodebook =
        DeltaCodebook::new(&NOISE_BAL_3_0DB_T_CODES, &NOISE_BAL_3_0DB_T_LENS, 12);
}
