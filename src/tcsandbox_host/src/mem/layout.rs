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

//! This module computes where each region of a sandbox lives inside
//! its single backing allocation, for a given number of actors and L1D
//! associativity. With `n` actors the allocation is laid out as:
//!
//! +-------------------------------------------+ (memory size)
//! |            Actor Code 0 .. n-1            | (ACTOR_CODE_SIZE each)
//! +-------------------------------------------+ actor code offset
//! |            Actor Data 0 .. n-1            | (ACTOR_DATA_SIZE each)
//! +-------------------------------------------+ actor data offset
//! |               Util Data                   | (1 page)
//! +-------------------------------------------+
//! |            L1D Priming Area               | (associativity pages)
//! +-------------------------------------------+ 0x0
//!
//! The offsets generated code uses are relative to the main area of
//! actor 0, not to the start of the allocation; [`SandboxMemoryLayout::new`]
//! checks that they still hold for the configured associativity.

use std::fmt::Debug;
use std::mem::offset_of;

use tcsandbox_common::PAGE_SIZE;
use tcsandbox_common::layout::{
    ACTOR_CODE_SIZE, ACTOR_DATA_SIZE, ActorCode, ActorData, FAULTY_AREA_SIZE, MACRO_STACK_SIZE,
    MAIN_AREA_SIZE, MAX_EXPANDED_MACROS_SIZE, MAX_EXPANDED_SECTION_SIZE, MEASUREMENT_OFFSET,
    OVERFLOW_PAD_SIZE, REG_INIT_AREA_SIZE, STORED_RSP_OFFSET, UNDERFLOW_PAD_SIZE, UTIL_OFFSET,
    l1d_priming_area_size, l1d_priming_offset, util_measurement_start, util_size,
    util_stored_rsp_start,
};
use tracing::{Span, instrument};

use super::memory_region::MemoryRegionType::{
    CodeMacros, CodeSection, FaultyArea, L1dPrimingArea, MacroStack, MainArea, OverflowPad,
    RegInitArea, UnderflowPad, UtilData,
};
use super::memory_region::{MemoryRegion, MemoryRegionFlags, MemoryRegionVecBuilder};
use crate::Result;
use crate::error::SandboxError::{ActorIndexOutOfRange, LayoutMismatch, MemoryRequestTooBig};
use crate::sandbox::SandboxConfiguration;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct SandboxMemoryLayout {
    actor_count: usize,
    l1d_associativity: usize,

    // The following are offsets from the start of the backing memory
    util_offset: usize,
    util_size: usize,
    stored_rsp_offset: usize,
    measurement_offset: usize,
    actor_data_offset: usize,
    actor_code_offset: usize,
    // Where the base register of the generated code points: the main
    // area of actor 0
    base_register_offset: usize,
}

impl Debug for SandboxMemoryLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxMemoryLayout")
            .field(
                "Total Memory Size",
                &format_args!("{:#x}", self.get_memory_size().unwrap_or(0)),
            )
            .field("Actor Count", &self.actor_count)
            .field("L1D Associativity", &self.l1d_associativity)
            .field("Util Offset", &format_args!("{:#x}", self.util_offset))
            .field("Util Size", &format_args!("{:#x}", self.util_size))
            .field(
                "Stored RSP Offset",
                &format_args!("{:#x}", self.stored_rsp_offset),
            )
            .field(
                "Measurement Offset",
                &format_args!("{:#x}", self.measurement_offset),
            )
            .field(
                "Actor Data Offset",
                &format_args!("{:#x}", self.actor_data_offset),
            )
            .field(
                "Base Register Offset",
                &format_args!("{:#x}", self.base_register_offset),
            )
            .field(
                "Actor Code Offset",
                &format_args!("{:#x}", self.actor_code_offset),
            )
            .finish()
    }
}

impl SandboxMemoryLayout {
    /// The maximum amount of memory a single sandbox will be allowed.
    pub const MAX_MEMORY_SIZE: usize = 0x4000_0000;

    /// Create a new `SandboxMemoryLayout` for the given
    /// `SandboxConfiguration`.
    #[instrument(err(Debug), skip_all, parent = Span::current(), level= "Trace")]
    pub fn new(cfg: SandboxConfiguration) -> Result<Self> {
        cfg.validate()?;
        let actor_count = cfg.get_actor_count();
        let l1d_associativity = cfg.get_l1d_associativity();

        let util_offset = 0;
        let util_size = util_size(l1d_associativity);
        let stored_rsp_offset = util_offset + util_stored_rsp_start(l1d_associativity);
        let measurement_offset = util_offset + util_measurement_start(l1d_associativity);
        // actor 0 sits directly on top of the utility region
        let actor_data_offset = util_offset + util_size;
        let base_register_offset = actor_data_offset + offset_of!(ActorData, main_area);
        let actor_code_offset = actor_data_offset + actor_count * ACTOR_DATA_SIZE;

        let layout = Self {
            actor_count,
            l1d_associativity,
            util_offset,
            util_size,
            stored_rsp_offset,
            measurement_offset,
            actor_data_offset,
            actor_code_offset,
            base_register_offset,
        };
        layout.check_fixed_immediates()?;
        log::debug!("computed sandbox layout {:?}", layout);
        Ok(layout)
    }

    /// The displacements baked into generated code must resolve to the
    /// fields computed here.
    fn check_fixed_immediates(&self) -> Result<()> {
        let base = self.base_register_offset;
        expect_offset("Util", base - UTIL_OFFSET, self.actor_data_offset)?;
        expect_offset(
            "Stored RSP",
            base - STORED_RSP_OFFSET,
            self.stored_rsp_offset,
        )?;
        expect_offset(
            "Measurement",
            base - MEASUREMENT_OFFSET,
            self.measurement_offset,
        )?;
        expect_offset(
            "L1D Priming Area",
            base - l1d_priming_offset(self.l1d_associativity),
            self.util_offset,
        )
    }

    pub fn get_actor_count(&self) -> usize {
        self.actor_count
    }

    pub fn get_l1d_associativity(&self) -> usize {
        self.l1d_associativity
    }

    /// Get the offset of the utility region, which is also where the L1D
    /// priming area starts
    pub fn get_util_offset(&self) -> usize {
        self.util_offset
    }

    pub fn get_util_size(&self) -> usize {
        self.util_size
    }

    pub fn get_l1d_priming_area_size(&self) -> usize {
        l1d_priming_area_size(self.l1d_associativity)
    }

    /// Get the offset of the stored host stack pointer
    pub fn get_stored_rsp_offset(&self) -> usize {
        self.stored_rsp_offset
    }

    /// Get the offset of the latest measurement
    pub fn get_measurement_offset(&self) -> usize {
        self.measurement_offset
    }

    /// Get the offset of the array of actor data blocks
    pub fn get_data_offset(&self) -> usize {
        self.actor_data_offset
    }

    /// Get the offset of the array of actor code blocks
    pub fn get_code_offset(&self) -> usize {
        self.actor_code_offset
    }

    /// Get the offset the base register of generated code points to:
    /// the main area of actor 0
    pub fn get_base_register_offset(&self) -> usize {
        self.base_register_offset
    }

    fn check_actor(&self, actor: usize) -> Result<()> {
        if actor >= self.actor_count {
            return Err(ActorIndexOutOfRange(actor, self.actor_count));
        }
        Ok(())
    }

    /// Get the offset of the data block of `actor`
    pub fn get_actor_data_offset(&self, actor: usize) -> Result<usize> {
        self.check_actor(actor)?;
        Ok(self.actor_data_offset + actor * ACTOR_DATA_SIZE)
    }

    /// Get the offset of the main area of `actor`
    pub fn get_main_area_offset(&self, actor: usize) -> Result<usize> {
        Ok(self.get_actor_data_offset(actor)? + offset_of!(ActorData, main_area))
    }

    /// Get the offset of the faulty area of `actor`
    pub fn get_faulty_area_offset(&self, actor: usize) -> Result<usize> {
        Ok(self.get_actor_data_offset(actor)? + offset_of!(ActorData, faulty_area))
    }

    /// Get the offset of the register init area of `actor`
    pub fn get_reg_init_offset(&self, actor: usize) -> Result<usize> {
        Ok(self.get_actor_data_offset(actor)? + offset_of!(ActorData, reg_init_area))
    }

    /// Get the offset of the code block of `actor`
    pub fn get_actor_code_offset(&self, actor: usize) -> Result<usize> {
        self.check_actor(actor)?;
        Ok(self.actor_code_offset + actor * ACTOR_CODE_SIZE)
    }

    /// Get the offset of the expanded macros of `actor`
    pub fn get_actor_macros_offset(&self, actor: usize) -> Result<usize> {
        Ok(self.get_actor_code_offset(actor)? + offset_of!(ActorCode, macros))
    }

    /// Get the total size of the sandbox memory in `self`'s layout.
    #[instrument(skip_all, parent = Span::current(), level= "Trace")]
    pub fn get_memory_size(&self) -> Result<usize> {
        let size = self.actor_code_offset + self.actor_count * ACTOR_CODE_SIZE;
        debug_assert_eq!(size % PAGE_SIZE, 0);

        if size > Self::MAX_MEMORY_SIZE {
            Err(MemoryRequestTooBig(size, Self::MAX_MEMORY_SIZE))
        } else {
            Ok(size)
        }
    }

    /// Returns the memory regions associated with this memory layout, in
    /// address order, each checked against the offsets computed in `new`
    #[instrument(err(Debug), skip_all, parent = Span::current(), level= "Trace")]
    pub fn get_memory_regions(&self) -> Result<Vec<MemoryRegion>> {
        let data_flags = MemoryRegionFlags::READ | MemoryRegionFlags::WRITE;
        let code_flags =
            MemoryRegionFlags::READ | MemoryRegionFlags::WRITE | MemoryRegionFlags::EXECUTE;
        let mut builder = MemoryRegionVecBuilder::new(self.util_offset);

        // util
        let stored_rsp_offset = builder.push_page_aligned(
            self.get_l1d_priming_area_size(),
            data_flags,
            L1dPrimingArea,
            None,
        );
        expect_offset("Stored RSP", self.stored_rsp_offset, stored_rsp_offset)?;
        let mut offset = builder.push(PAGE_SIZE, data_flags, UtilData, None);

        // actor data
        expect_offset("Actor Data", self.actor_data_offset, offset)?;
        for actor in 0..self.actor_count {
            expect_offset("Actor Data", self.get_actor_data_offset(actor)?, offset)?;
            builder.push(MACRO_STACK_SIZE, data_flags, MacroStack, Some(actor));
            offset = builder.push(UNDERFLOW_PAD_SIZE, data_flags, UnderflowPad, Some(actor));
            expect_offset("Main Area", self.get_main_area_offset(actor)?, offset)?;
            offset = builder.push(MAIN_AREA_SIZE, data_flags, MainArea, Some(actor));
            expect_offset("Faulty Area", self.get_faulty_area_offset(actor)?, offset)?;
            offset = builder.push(FAULTY_AREA_SIZE, data_flags, FaultyArea, Some(actor));
            expect_offset("Register Init Area", self.get_reg_init_offset(actor)?, offset)?;
            builder.push(REG_INIT_AREA_SIZE, data_flags, RegInitArea, Some(actor));
            offset = builder.push(OVERFLOW_PAD_SIZE, data_flags, OverflowPad, Some(actor));
        }

        // actor code
        expect_offset("Actor Code", self.actor_code_offset, offset)?;
        for actor in 0..self.actor_count {
            expect_offset("Actor Code", self.get_actor_code_offset(actor)?, offset)?;
            offset = builder.push(MAX_EXPANDED_SECTION_SIZE, code_flags, CodeSection, Some(actor));
            expect_offset("Actor Macros", self.get_actor_macros_offset(actor)?, offset)?;
            offset = builder.push(MAX_EXPANDED_MACROS_SIZE, code_flags, CodeMacros, Some(actor));
        }

        expect_offset("Final", self.get_memory_size()?, offset)?;

        Ok(builder.build())
    }
}

fn expect_offset(name: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(LayoutMismatch(name, expected, actual));
    }
    Ok(())
}
