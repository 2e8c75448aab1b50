// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `sample` module defines the numeric type the SBR reconstruction pipeline is written
//! against.
//!
//! The high frequency generator, the envelope adjuster, and both QMF filterbanks are generic
//! over [`Sample`]. Two implementations are provided: IEEE 32-bit floating point (`f32`), and
//! [`SoftFloat`](crate::SoftFloat), a software mantissa/exponent number with fully deterministic
//! rounding.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::qmf::{FftModulation, QmfModulation};

/// How the gain smoothing history is re-seeded on a frame following a frequency table reset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResetReseed {
    /// Every history slot is overwritten with the gains of the first envelope.
    Broadcast,
    /// The history carried over from the previous frame is shifted into place, as on any other
    /// frame.
    ShiftedCopy,
}

/// A real number usable by the SBR reconstruction pipeline.
pub trait Sample:
    Copy
    + Default
    + Debug
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
{
    /// The additive identity.
    const ZERO: Self;
    /// The multiplicative identity.
    const ONE: Self;
    /// The guard added to energies before they are divided.
    const EPSILON: Self;
    /// The smoothing history re-seeding strategy of this backend.
    const RESET_RESEED: ResetReseed;
    /// The magnitude pre-modulation analysis values saturate at, if any.
    const ANALYSIS_LIMIT: Option<f32>;

    /// The complex modulation stage of the QMF filterbanks.
    type Modulation: QmfModulation<Self>;

    /// Convert from a 64-bit float. Used to instantiate tables.
    fn from_f64(val: f64) -> Self;

    /// Convert from a 32-bit float.
    fn from_f32(val: f32) -> Self {
        Self::from_f64(f64::from(val))
    }

    /// Convert from an integer.
    fn from_i32(val: i32) -> Self {
        Self::from_f64(f64::from(val))
    }

    /// Convert to a 32-bit float.
    fn to_f32(self) -> f32;

    /// The square root. Negative values yield zero.
    fn sqrt(self) -> Self;

    /// Compute `2^exp`.
    fn exp2(exp: f32) -> Self;

    /// The lesser of `self` and `other`.
    #[inline(always)]
    fn minimum(self, other: Self) -> Self {
        if other < self {
            other
        }
        else {
            self
        }
    }

    /// The greater of `self` and `other`.
    #[inline(always)]
    fn maximum(self, other: Self) -> Self {
        if other > self {
            other
        }
        else {
            self
        }
    }

    /// Returns `true` if the value is exactly zero.
    #[inline(always)]
    fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

impl Sample for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const EPSILON: Self = f32::EPSILON;
    const RESET_RESEED: ResetReseed = ResetReseed::Broadcast;
    const ANALYSIS_LIMIT: Option<f32> = None;

    type Modulation = FftModulation;

    #[inline(always)]
    fn from_f64(val: f64) -> Self {
        val as f32
    }

    #[inline(always)]
    fn from_f32(val: f32) -> Self {
        val
    }

    #[inline(always)]
    fn from_i32(val: i32) -> Self {
        val as f32
    }

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline(always)]
    fn sqrt(self) -> Self {
        if self > 0.0 {
            f32::sqrt(self)
        }
        else {
            0.0
        }
    }

    #[inline(always)]
    fn exp2(exp: f32) -> Self {
        f32::exp2(exp)
    }
}

#[cfg(test)]
mod tests {
    use super::Sample;

    #[test]
    fn verify_f32_sample() {
        assert_eq!(<f32 as Sample>::exp2(6.0), 64.0);
        assert_eq!(<f32 as Sample>::exp2(-1.0), 0.5);
        assert_eq!(Sample::sqrt(16.0f32), 4.0);
        assert_eq!(Sample::sqrt(-4.0f32), 0.0);
        assert_eq!(2.0f32.minimum(3.0), 2.0);
        assert_eq!(2.0f32.maximum(3.0), 3.0);
        assert!(<f32 as Sample>::ZERO.is_zero());
    }
}
