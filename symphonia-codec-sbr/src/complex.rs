// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `complex` module implements a complex number generic over the [`Sample`] type.

use crate::sample::Sample;

/// A complex number.
#[derive(Copy, Clone, Default, Debug, PartialEq)]
pub struct Complex<S: Sample> {
    /// The real component.
    pub re: S,
    /// The imaginary component.
    pub im: S,
}

impl<S: Sample> Complex<S> {
    /// The complex number `0 + j0`.
    pub const ZERO: Self = Complex { re: S::ZERO, im: S::ZERO };

    /// Create a new complex number.
    #[inline(always)]
    pub fn new(re: S, im: S) -> Self {
        Self { re, im }
    }

    /// Create a complex number from a pair of 32-bit floats.
    #[inline(always)]
    pub fn from_f32(re: f32, im: f32) -> Self {
        Self { re: S::from_f32(re), im: S::from_f32(im) }
    }

    /// Scale the complex number.
    #[inline(always)]
    pub fn scale(&self, scale: S) -> Self {
        Self { re: self.re * scale, im: self.im * scale }
    }

    /// Take the complex conjugate of `self`.
    ///
    /// For a complex number defined as `a + jb` the complex conjugate is defined to be `a - jb`.
    #[inline(always)]
    pub fn conj(&self) -> Self {
        Self { re: self.re, im: -self.im }
    }

    /// The squared magnitude, `a^2 + b^2`.
    #[inline(always)]
    pub fn norm_sqr(&self) -> S {
        self.re * self.re + self.im * self.im
    }
}

impl<S: Sample> core::ops::Add for Complex<S> {
    type Output = Complex<S>;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self::Output {
        Self::Output { re: self.re + rhs.re, im: self.im + rhs.im }
    }
}

impl<S: Sample> core::ops::AddAssign for Complex<S> {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<S: Sample> core::ops::Sub for Complex<S> {
    type Output = Complex<S>;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output { re: self.re - rhs.re, im: self.im - rhs.im }
    }
}

impl<S: Sample> core::ops::Mul for Complex<S> {
    type Output = Complex<S>;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self::Output {
        Self::Output {
            re: (self.re * rhs.re) - (self.im * rhs.im),
            im: (self.re * rhs.im) + (self.im * rhs.re),
        }
    }
}

impl<S: Sample> core::ops::Neg for Complex<S> {
    type Output = Complex<S>;

    #[inline(always)]
    fn neg(self) -> Self::Output {
        Self::Output { re: -self.re, im: -self.im }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::softfloat::SoftFloat;

    #[test]
    fn verify_complex() {
        type C = Complex<f32>;

        assert_eq!(C::new(1.0, 10.0).conj(), C::new(1.0, -10.0));
        assert_eq!(C::new(5.0, 2.0).scale(3.0), C::new(15.0, 6.0));
        assert_eq!(C::new(3.0, 4.0).norm_sqr(), 25.0);

        assert_eq!(C::new(1.0, 2.0) + C::new(3.0, -4.0), C::new(4.0, -2.0));
        assert_eq!(C::new(1.0, 2.0) - C::new(3.0, -4.0), C::new(-2.0, 6.0));
        assert_eq!(C::new(1.0, 2.0) * C::new(3.0, -4.0), C::new(11.0, 2.0));
        assert_eq!(-C::new(1.0, -2.0), C::new(-1.0, 2.0));
        assert_eq!(C::ZERO, C::default());
    }

    #[test]
    fn verify_complex_softfloat() {
        type C = Complex<SoftFloat>;

        let a = C::from_f32(1.0, 2.0);
        let b = C::from_f32(3.0, -4.0);

        assert_eq!(a * b, C::from_f32(11.0, 2.0));
        assert_eq!(b.norm_sqr(), SoftFloat::from_f32(25.0));
        assert_eq!(C::ZERO, C::default());
    }
}
