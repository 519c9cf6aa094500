/*
Copyright 2025 The Hyperlight Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Views over the three kinds of blocks in sandbox memory. Every field
//! is located with `offset_of!` on the `#[repr(C)]` layout structs, so
//! the views cannot drift from the offsets generated code uses.

use std::mem::offset_of;
use std::ops::Range;

use tcsandbox_common::layout::{
    ACTOR_CODE_SIZE, ACTOR_DATA_SIZE, ActorCode, ActorData, GPR_SEED_COUNT, GPR_SEED_SIZE,
    STORED_RSP_SIZE, VECTOR_SEED_COUNT, VECTOR_SEED_SIZE, l1d_priming_area_size,
    util_measurement_start, util_size, util_stored_rsp_start,
};
use tcsandbox_common::measurement::{MEASUREMENT_SIZE, Measurement};

use crate::Result;
use crate::error::SandboxError::BoundsCheckFailed;

const MACRO_STACK: Range<usize> =
    offset_of!(ActorData, macro_stack)..offset_of!(ActorData, underflow_pad);
const UNDERFLOW_PAD: Range<usize> =
    offset_of!(ActorData, underflow_pad)..offset_of!(ActorData, main_area);
const MAIN_AREA: Range<usize> =
    offset_of!(ActorData, main_area)..offset_of!(ActorData, faulty_area);
const FAULTY_AREA: Range<usize> =
    offset_of!(ActorData, faulty_area)..offset_of!(ActorData, reg_init_area);
const REG_INIT_AREA: Range<usize> =
    offset_of!(ActorData, reg_init_area)..offset_of!(ActorData, overflow_pad);
const OVERFLOW_PAD: Range<usize> = offset_of!(ActorData, overflow_pad)..ACTOR_DATA_SIZE;

const CODE_SECTION: Range<usize> = offset_of!(ActorCode, section)..offset_of!(ActorCode, macros);
const CODE_MACROS: Range<usize> = offset_of!(ActorCode, macros)..ACTOR_CODE_SIZE;

// GPR seeds come first in the register init area, then the YMM seeds
fn gpr_seed_range(index: usize) -> Result<Range<usize>> {
    if index >= GPR_SEED_COUNT {
        return Err(BoundsCheckFailed(index as u64, GPR_SEED_COUNT));
    }
    let start = REG_INIT_AREA.start + index * GPR_SEED_SIZE;
    Ok(start..start + GPR_SEED_SIZE)
}

fn vector_seed_range(index: usize) -> Result<Range<usize>> {
    if index >= VECTOR_SEED_COUNT {
        return Err(BoundsCheckFailed(index as u64, VECTOR_SEED_COUNT));
    }
    let start = REG_INIT_AREA.start + GPR_SEED_COUNT * GPR_SEED_SIZE + index * VECTOR_SEED_SIZE;
    Ok(start..start + VECTOR_SEED_SIZE)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut word = [0u8; size_of::<u64>()];
    word.copy_from_slice(bytes);
    u64::from_ne_bytes(word)
}

/// Read-only view of the data block of one actor
#[derive(Debug, Clone, Copy)]
pub struct ActorDataView<'a> {
    actor: usize,
    bytes: &'a [u8],
}

impl<'a> ActorDataView<'a> {
    pub(crate) fn new(actor: usize, bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len(), ACTOR_DATA_SIZE);
        Self { actor, bytes }
    }

    /// Index of the actor this block belongs to
    pub fn actor(&self) -> usize {
        self.actor
    }

    /// The whole block
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn macro_stack(&self) -> &'a [u8] {
        &self.bytes[MACRO_STACK]
    }

    pub fn underflow_pad(&self) -> &'a [u8] {
        &self.bytes[UNDERFLOW_PAD]
    }

    pub fn main_area(&self) -> &'a [u8] {
        &self.bytes[MAIN_AREA]
    }

    pub fn faulty_area(&self) -> &'a [u8] {
        &self.bytes[FAULTY_AREA]
    }

    pub fn reg_init_area(&self) -> &'a [u8] {
        &self.bytes[REG_INIT_AREA]
    }

    pub fn overflow_pad(&self) -> &'a [u8] {
        &self.bytes[OVERFLOW_PAD]
    }

    /// The initial value of general purpose register `index`
    pub fn gpr_seed(&self, index: usize) -> Result<u64> {
        Ok(read_u64(&self.bytes[gpr_seed_range(index)?]))
    }

    /// The initial value of vector register `index`
    pub fn vector_seed(&self, index: usize) -> Result<[u8; VECTOR_SEED_SIZE]> {
        let mut seed = [0u8; VECTOR_SEED_SIZE];
        seed.copy_from_slice(&self.bytes[vector_seed_range(index)?]);
        Ok(seed)
    }
}

/// Mutable view of the data block of one actor, used to load inputs
/// before a run
#[derive(Debug)]
pub struct ActorDataViewMut<'a> {
    actor: usize,
    bytes: &'a mut [u8],
}

impl<'a> ActorDataViewMut<'a> {
    pub(crate) fn new(actor: usize, bytes: &'a mut [u8]) -> Self {
        debug_assert_eq!(bytes.len(), ACTOR_DATA_SIZE);
        Self { actor, bytes }
    }

    /// Reborrow as a read-only view
    pub fn view(&self) -> ActorDataView<'_> {
        ActorDataView::new(self.actor, &*self.bytes)
    }

    pub fn macro_stack_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[MACRO_STACK]
    }

    pub fn main_area_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[MAIN_AREA]
    }

    pub fn faulty_area_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[FAULTY_AREA]
    }

    pub fn reg_init_area_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[REG_INIT_AREA]
    }

    pub fn set_gpr_seed(&mut self, index: usize, value: u64) -> Result<()> {
        let range = gpr_seed_range(index)?;
        self.bytes[range].copy_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    pub fn set_vector_seed(&mut self, index: usize, value: &[u8; VECTOR_SEED_SIZE]) -> Result<()> {
        let range = vector_seed_range(index)?;
        self.bytes[range].copy_from_slice(value);
        Ok(())
    }
}

/// Read-only view of the utility region. Where its fields start depends
/// on the L1D associativity the sandbox was laid out for.
#[derive(Debug, Clone, Copy)]
pub struct UtilView<'a> {
    l1d_associativity: usize,
    bytes: &'a [u8],
}

impl<'a> UtilView<'a> {
    pub(crate) fn new(l1d_associativity: usize, bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len(), util_size(l1d_associativity));
        Self {
            l1d_associativity,
            bytes,
        }
    }

    fn stored_rsp_range(&self) -> Range<usize> {
        let start = util_stored_rsp_start(self.l1d_associativity);
        start..start + STORED_RSP_SIZE
    }

    fn measurement_range(&self) -> Range<usize> {
        let start = util_measurement_start(self.l1d_associativity);
        start..start + MEASUREMENT_SIZE
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// One page per way of the L1 data cache
    pub fn priming_area(&self) -> &'a [u8] {
        &self.bytes[..l1d_priming_area_size(self.l1d_associativity)]
    }

    /// Host stack pointer saved by the test case prologue
    pub fn stored_rsp(&self) -> u64 {
        read_u64(&self.bytes[self.stored_rsp_range()])
    }

    /// The measurement written by the last run
    pub fn measurement(&self) -> Measurement {
        let mut raw = [0u8; MEASUREMENT_SIZE];
        raw.copy_from_slice(&self.bytes[self.measurement_range()]);
        Measurement::from_ne_bytes(&raw)
    }
}

/// Mutable view of the utility region
#[derive(Debug)]
pub struct UtilViewMut<'a> {
    l1d_associativity: usize,
    bytes: &'a mut [u8],
}

impl<'a> UtilViewMut<'a> {
    pub(crate) fn new(l1d_associativity: usize, bytes: &'a mut [u8]) -> Self {
        debug_assert_eq!(bytes.len(), util_size(l1d_associativity));
        Self {
            l1d_associativity,
            bytes,
        }
    }

    /// Reborrow as a read-only view
    pub fn view(&self) -> UtilView<'_> {
        UtilView::new(self.l1d_associativity, &*self.bytes)
    }

    pub fn priming_area_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..l1d_priming_area_size(self.l1d_associativity)]
    }

    pub fn set_stored_rsp(&mut self, rsp: u64) {
        let range = self.view().stored_rsp_range();
        self.bytes[range].copy_from_slice(&rsp.to_ne_bytes());
    }

    pub fn set_measurement(&mut self, measurement: &Measurement) {
        let range = self.view().measurement_range();
        self.bytes[range].copy_from_slice(&measurement.to_ne_bytes());
    }
}

/// Read-only view of the code block of one actor
#[derive(Debug, Clone, Copy)]
pub struct ActorCodeView<'a> {
    actor: usize,
    bytes: &'a [u8],
}

impl<'a> ActorCodeView<'a> {
    pub(crate) fn new(actor: usize, bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len(), ACTOR_CODE_SIZE);
        Self { actor, bytes }
    }

    pub fn actor(&self) -> usize {
        self.actor
    }

    /// The expanded test-case instructions
    pub fn section(&self) -> &'a [u8] {
        &self.bytes[CODE_SECTION]
    }

    /// The expanded macro bodies
    pub fn macros(&self) -> &'a [u8] {
        &self.bytes[CODE_MACROS]
    }
}

/// Mutable view of the code block of one actor
#[derive(Debug)]
pub struct ActorCodeViewMut<'a> {
    actor: usize,
    bytes: &'a mut [u8],
}

impl<'a> ActorCodeViewMut<'a> {
    pub(crate) fn new(actor: usize, bytes: &'a mut [u8]) -> Self {
        debug_assert_eq!(bytes.len(), ACTOR_CODE_SIZE);
        Self { actor, bytes }
    }

    /// Reborrow as a read-only view
    pub fn view(&self) -> ActorCodeView<'_> {
        ActorCodeView::new(self.actor, &*self.bytes)
    }

    /// Load expanded test-case code. The rest of the section is zeroed
    /// so no instructions from an earlier, longer test case remain.
    pub fn write_section(&mut self, code: &[u8]) -> Result<()> {
        Self::write_zero_padded(&mut self.bytes[CODE_SECTION], code)
    }

    /// Load expanded macro bodies, zeroing the rest of the macro area.
    pub fn write_macros(&mut self, code: &[u8]) -> Result<()> {
        Self::write_zero_padded(&mut self.bytes[CODE_MACROS], code)
    }

    fn write_zero_padded(dst: &mut [u8], code: &[u8]) -> Result<()> {
        if code.len() > dst.len() {
            return Err(BoundsCheckFailed(code.len() as u64, dst.len()));
        }
        let (head, tail) = dst.split_at_mut(code.len());
        head.copy_from_slice(code);
        tail.fill(0);
        Ok(())
    }
}
