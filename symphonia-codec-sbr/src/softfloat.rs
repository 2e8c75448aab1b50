// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `softfloat` module implements a software floating point number with an explicit
//! mantissa and exponent.
//!
//! Arithmetic, comparisons and square roots are carried out with integer arithmetic, and every
//! result is rounded the same way regardless of the host floating point unit. Only the
//! conversions from and to host floats, and `exp2` of a float exponent, use the floating point
//! unit. This is the numeric backend for decoders that must be bit-exact across platforms.

use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::qmf::DirectModulation;
use crate::sample::{ResetReseed, Sample};

/// The bit length of a normalized mantissa.
const MANT_BITS: i32 = 30;

/// Exponent bounds. Values below underflow to zero, values above saturate.
const MIN_EXP: i32 = -512;
const MAX_EXP: i32 = 512;

/// A software floating point number.
///
/// The represented value is `mant * 2^(exp - 30)`. A normalized non-zero mantissa has a
/// magnitude in `[2^29, 2^30)`. Zero is always stored as `mant = 0, exp = 0` so that structural
/// equality is value equality.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct SoftFloat {
    mant: i32,
    exp: i32,
}

impl SoftFloat {
    /// The value zero.
    pub const ZERO: SoftFloat = SoftFloat { mant: 0, exp: 0 };

    /// The value one.
    pub const ONE: SoftFloat = SoftFloat { mant: 1 << (MANT_BITS - 1), exp: 1 };

    /// Get the signed mantissa.
    pub fn mantissa(&self) -> i32 {
        self.mant
    }

    /// Get the exponent.
    pub fn exponent(&self) -> i32 {
        self.exp
    }

    /// Normalize a wide mantissa. The value of the result is `mant * 2^(exp - 30)`, rounded to
    /// nearest.
    fn normalize(mant: i64, exp: i32) -> Self {
        if mant == 0 {
            return SoftFloat::ZERO;
        }

        let neg = mant < 0;
        let mut mag = mant.unsigned_abs();
        let mut exp = exp;

        let bits = 64 - mag.leading_zeros() as i32;

        if bits > MANT_BITS {
            let shift = (bits - MANT_BITS) as u32;

            mag = (mag + (1 << (shift - 1))) >> shift;
            exp += shift as i32;

            // Rounding may carry into a new bit.
            if mag >> MANT_BITS != 0 {
                mag >>= 1;
                exp += 1;
            }
        }
        else if bits < MANT_BITS {
            let shift = (MANT_BITS - bits) as u32;

            mag <<= shift;
            exp -= shift as i32;
        }

        if exp < MIN_EXP {
            return SoftFloat::ZERO;
        }

        if exp > MAX_EXP {
            mag = (1 << MANT_BITS) - 1;
            exp = MAX_EXP;
        }

        let mant = mag as i32;

        SoftFloat { mant: if neg { -mant } else { mant }, exp }
    }

    /// Convert to a 64-bit float.
    pub fn to_f64(self) -> f64 {
        f64::from(self.mant) * 2f64.powi(self.exp - MANT_BITS)
    }
}

/// Integer square root, rounded down, computed one bit of the root at a time.
fn isqrt(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }

    let mut rem = n;
    let mut root = 0u64;

    // The greatest power of four not above `n`.
    let mut bit = 1u64 << ((63 - n.leading_zeros()) & !1);

    while bit != 0 {
        if rem >= root + bit {
            rem -= root + bit;
            root = (root >> 1) + bit;
        }
        else {
            root >>= 1;
        }
        bit >>= 2;
    }

    root
}

impl Add for SoftFloat {
    type Output = SoftFloat;

    fn add(self, rhs: Self) -> Self::Output {
        if self.mant == 0 {
            return rhs;
        }
        if rhs.mant == 0 {
            return self;
        }

        let (big, small) = if self.exp >= rhs.exp { (self, rhs) } else { (rhs, self) };

        let diff = big.exp - small.exp;

        // The smaller operand is below a quarter of the larger operand's last mantissa bit.
        if diff > 32 {
            return big;
        }

        let wide = (i64::from(big.mant) << 32) + ((i64::from(small.mant) << 32) >> diff);

        SoftFloat::normalize(wide, big.exp - 32)
    }
}

impl AddAssign for SoftFloat {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for SoftFloat {
    type Output = SoftFloat;

    fn sub(self, rhs: Self) -> Self::Output {
        self + -rhs
    }
}

impl SubAssign for SoftFloat {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul for SoftFloat {
    type Output = SoftFloat;

    fn mul(self, rhs: Self) -> Self::Output {
        if self.mant == 0 || rhs.mant == 0 {
            return SoftFloat::ZERO;
        }

        SoftFloat::normalize(i64::from(self.mant) * i64::from(rhs.mant), self.exp + rhs.exp - 30)
    }
}

impl MulAssign for SoftFloat {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Div for SoftFloat {
    type Output = SoftFloat;

    /// Divide. Division by zero yields zero; callers guard their denominators.
    fn div(self, rhs: Self) -> Self::Output {
        if self.mant == 0 || rhs.mant == 0 {
            return SoftFloat::ZERO;
        }

        let quot = (i64::from(self.mant) << 32) / i64::from(rhs.mant);

        SoftFloat::normalize(quot, self.exp - rhs.exp - 2)
    }
}

impl Neg for SoftFloat {
    type Output = SoftFloat;

    fn neg(self) -> Self::Output {
        SoftFloat { mant: -self.mant, exp: self.exp }
    }
}

impl PartialOrd for SoftFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some((*self - *other).mant.cmp(&0))
    }
}

impl Sample for SoftFloat {
    const ZERO: Self = SoftFloat::ZERO;
    const ONE: Self = SoftFloat::ONE;
    // 2^-23, the distance from 1.0 to the next 32-bit float.
    const EPSILON: Self = SoftFloat { mant: 1 << (MANT_BITS - 1), exp: -22 };
    const RESET_RESEED: ResetReseed = ResetReseed::ShiftedCopy;
    const ANALYSIS_LIMIT: Option<f32> = Some(16777216.0);

    type Modulation = DirectModulation<SoftFloat>;

    fn from_f64(val: f64) -> Self {
        if val.is_nan() || val == 0.0 {
            return SoftFloat::ZERO;
        }

        if val.is_infinite() {
            let max = SoftFloat { mant: (1 << MANT_BITS) - 1, exp: MAX_EXP };
            return if val > 0.0 { max } else { -max };
        }

        let bits = val.abs().to_bits();
        let biased = ((bits >> 52) & 0x7ff) as i32;

        // Subnormals are far below the exponent range.
        if biased == 0 {
            return SoftFloat::ZERO;
        }

        // Split into a fraction in [0.5, 1.0) and a power of two.
        let frac = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
        let exp = biased - 1022;

        let mant = (frac * f64::from(1 << MANT_BITS)).round() as i64;
        let mant = if val < 0.0 { -mant } else { mant };

        SoftFloat::normalize(mant, exp)
    }

    fn from_i32(val: i32) -> Self {
        SoftFloat::normalize(i64::from(val), MANT_BITS)
    }

    fn to_f32(self) -> f32 {
        self.to_f64() as f32
    }

    fn sqrt(self) -> Self {
        if self.mant <= 0 {
            return SoftFloat::ZERO;
        }

        let mut mant = self.mant as u64;
        let mut exp = self.exp - MANT_BITS;

        // Make the power of two even so that it halves exactly.
        if exp & 1 != 0 {
            mant <<= 1;
            exp -= 1;
        }

        let root = isqrt(mant << 32);

        SoftFloat::normalize(root as i64, exp / 2 + 14)
    }

    fn exp2(exp: f32) -> Self {
        let whole = exp.floor();
        let frac = f64::from(exp - whole);
        let whole = whole as i32;

        if frac == 0.0 {
            return SoftFloat { mant: 1 << (MANT_BITS - 1), exp: whole + 1 };
        }

        let mant = (2f64.powf(frac) * f64::from(1 << (MANT_BITS - 1))).round() as i64;

        SoftFloat::normalize(mant, whole + 1)
    }
}
