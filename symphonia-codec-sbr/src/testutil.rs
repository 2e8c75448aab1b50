// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Helpers for building SBR bitstreams in unit tests.

/// A most-significant-bit first bit writer.
#[derive(Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    acc: u8,
    n_bits: u32,
}

impl BitWriter {
    /// Write the `bits` least significant bits of `value`.
    pub fn write(&mut self, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            self.acc = (self.acc << 1) | ((value >> i) & 1) as u8;
            self.n_bits += 1;

            if self.n_bits == 8 {
                self.buf.push(self.acc);
                self.acc = 0;
                self.n_bits = 0;
            }
        }
    }

    /// The number of bits written so far.
    pub fn bits_written(&self) -> usize {
        8 * self.buf.len() + self.n_bits as usize
    }

    /// Zero-pad to a byte boundary and return the buffer.
    pub fn finish(mut self) -> Vec<u8> {
        if self.n_bits > 0 {
            self.buf.push(self.acc << (8 - self.n_bits));
        }
        self.buf
    }
}
