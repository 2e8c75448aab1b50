// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// A fixed-capacity ring of equally sized slots backed by a single allocation.
///
/// Slots are addressed by age: age 0 is the most recently pushed slot, age `num_slots - 1` the
/// oldest.
#[derive(Clone, Debug)]
pub struct SlotRing<T> {
    buf: Box<[T]>,
    width: usize,
    num_slots: usize,
    head: usize,
}

impl<T: Copy + Default> SlotRing<T> {
    /// Create a ring of `num_slots` zeroed slots of `width` elements each.
    pub fn new(num_slots: usize, width: usize) -> Self {
        SlotRing {
            buf: vec![T::default(); num_slots * width].into_boxed_slice(),
            width,
            num_slots,
            head: 0,
        }
    }

    /// Discard the oldest slot and return the new, zeroed, newest slot.
    pub fn push_slot(&mut self) -> &mut [T] {
        self.head = if self.head == 0 { self.num_slots - 1 } else { self.head - 1 };

        let slot = self.slot_mut(0);
        slot.fill(T::default());
        slot
    }

    #[inline(always)]
    fn offset(&self, age: usize) -> usize {
        debug_assert!(age < self.num_slots);

        let idx = self.head + age;
        let idx = if idx >= self.num_slots { idx - self.num_slots } else { idx };

        idx * self.width
    }

    /// Get the slot pushed `age` pushes ago.
    #[inline(always)]
    pub fn slot(&self, age: usize) -> &[T] {
        let start = self.offset(age);
        &self.buf[start..start + self.width]
    }

    /// Get the slot pushed `age` pushes ago, mutably.
    #[inline(always)]
    pub fn slot_mut(&mut self, age: usize) -> &mut [T] {
        let start = self.offset(age);
        &mut self.buf[start..start + self.width]
    }

    /// Zero every slot.
    pub fn clear(&mut self) {
        self.buf.fill(T::default());
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::SlotRing;

    #[test]
    fn verify_slot_ring() {
        let mut ring = SlotRing::<u32>::new(3, 2);

        for i in 1..=4 {
            ring.push_slot().copy_from_slice(&[i, 10 * i]);
        }

        assert_eq!(ring.slot(0), &[4, 40]);
        assert_eq!(ring.slot(1), &[3, 30]);
        assert_eq!(ring.slot(2), &[2, 20]);

        ring.slot_mut(2)[0] = 7;
        assert_eq!(ring.slot(2), &[7, 20]);

        // The pushed slot is zeroed.
        assert_eq!(ring.push_slot(), &[0, 0]);
        assert_eq!(ring.slot(1), &[4, 40]);

        ring.clear();
        assert_eq!(ring.slot(1), &[0, 0]);
    }
}
