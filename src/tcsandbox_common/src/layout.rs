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

//! Byte layout of the sandbox data region.
//!
//! A sandbox with `n` actors occupies a single contiguous allocation:
//!
//! +-------------------------------------------+ (end of allocation)
//! |          Actor Code n-1 .. 0              | (ActorCode each)
//! +-------------------------------------------+
//! |          Actor Data n-1 .. 1              | (ActorData each)
//! +-------------------------------------------+
//! |              Overflow Pad                 |
//! |            Register Init Area             |
//! |              Faulty Area                  |
//! |               Main Area                   | <- base register (actor 0)
//! |              Underflow Pad                |
//! |              Macro Stack                  |
//! +-------------------------------------------+
//! |            Util: unused                   |
//! |            Util: latest measurement       |
//! |            Util: stored rsp               |
//! |            Util: L1D priming area         | (associativity pages)
//! +-------------------------------------------+ (start of allocation)
//!
//! Generated code keeps the address of actor 0's main area in a base
//! register. The `*_OFFSET` constants below the main area
//! (`MACRO_STACK_TOP_OFFSET`, `UTIL_OFFSET`, `STORED_RSP_OFFSET`,
//! `MEASUREMENT_OFFSET`, `L1D_PRIMING_OFFSET`) are subtracted from that
//! register; the ones inside the actor's pages (`MAIN_AREA_OFFSET`,
//! `FAULTY_AREA_OFFSET`, `REG_INIT_OFFSET`, `OVERFLOW_PAD_OFFSET`) are
//! added to it.

use core::mem::{offset_of, size_of};

use crate::PAGE_SIZE;
use crate::hardware_desc::L1D_ASSOCIATIVITY;
use crate::measurement::{MEASUREMENT_SIZE, Measurement};

/// Version of the constants in this module. Any change to a size or an
/// offset invalidates previously generated test cases and must bump it.
pub const LAYOUT_ABI_VERSION: u32 = 1;

// =============================================================================
// Actor data
// =============================================================================

pub const MACRO_STACK_SIZE: usize = 64;
pub const UNDERFLOW_PAD_SIZE: usize = PAGE_SIZE - MACRO_STACK_SIZE;
pub const MAIN_AREA_SIZE: usize = PAGE_SIZE;
pub const FAULTY_AREA_SIZE: usize = PAGE_SIZE;

pub const GPR_SEED_COUNT: usize = 8;
pub const GPR_SEED_SIZE: usize = size_of::<u64>();
pub const VECTOR_SEED_COUNT: usize = 8;
/// One 256-bit YMM register.
pub const VECTOR_SEED_SIZE: usize = 32;
pub const REG_INIT_AREA_SIZE: usize =
    GPR_SEED_COUNT * GPR_SEED_SIZE + VECTOR_SEED_COUNT * VECTOR_SEED_SIZE;
pub const OVERFLOW_PAD_SIZE: usize = PAGE_SIZE - REG_INIT_AREA_SIZE;

pub const ACTOR_DATA_SIZE: usize = MACRO_STACK_SIZE
    + UNDERFLOW_PAD_SIZE
    + MAIN_AREA_SIZE
    + FAULTY_AREA_SIZE
    + REG_INIT_AREA_SIZE
    + OVERFLOW_PAD_SIZE;

/// Memory accessible by an actor's code.
#[repr(C)]
pub struct ActorData {
    /// Stack for storing registers when calling macros
    pub macro_stack: [u8; MACRO_STACK_SIZE],
    /// Zero-initialized region for accidental underflows
    pub underflow_pad: [u8; UNDERFLOW_PAD_SIZE],
    /// First input page; does not cause faults
    pub main_area: [u8; MAIN_AREA_SIZE],
    /// Second input page; causes a (configurable) fault
    pub faulty_area: [u8; FAULTY_AREA_SIZE],
    /// Initial values of the general purpose and vector registers
    pub reg_init_area: [u8; REG_INIT_AREA_SIZE],
    /// Zero-initialized region for accidental overflows
    pub overflow_pad: [u8; OVERFLOW_PAD_SIZE],
}

// =============================================================================
// Utility data
// =============================================================================

pub const STORED_RSP_SIZE: usize = size_of::<u64>();
pub const UTIL_UNUSED_SIZE: usize = PAGE_SIZE - STORED_RSP_SIZE - MEASUREMENT_SIZE;

pub const fn l1d_priming_area_size(associativity: usize) -> usize {
    associativity * PAGE_SIZE
}

/// Total size of the utility region: the priming area plus one page for
/// the stored stack pointer and the measurement.
pub const fn util_size(associativity: usize) -> usize {
    l1d_priming_area_size(associativity) + PAGE_SIZE
}

/// Offset of the stored stack pointer from the start of the utility region.
pub const fn util_stored_rsp_start(associativity: usize) -> usize {
    l1d_priming_area_size(associativity)
}

/// Offset of the measurement from the start of the utility region.
pub const fn util_measurement_start(associativity: usize) -> usize {
    util_stored_rsp_start(associativity) + STORED_RSP_SIZE
}

pub const L1D_PRIMING_AREA_SIZE: usize = l1d_priming_area_size(L1D_ASSOCIATIVITY);
pub const UTIL_SIZE: usize = util_size(L1D_ASSOCIATIVITY);

/// Data used by the primitives of a test case.
///
/// Must be allocated strictly before the data of actor 0, as test cases
/// reach its fields with constant offsets from actor 0's main area.
#[repr(C)]
pub struct UtilData {
    pub l1d_priming_area: [u8; L1D_PRIMING_AREA_SIZE],
    /// Host stack pointer saved before entering the test case
    pub stored_rsp: u64,
    pub latest_measurement: Measurement,
    pub unused: [u8; UTIL_UNUSED_SIZE],
}

// =============================================================================
// Offsets w.r.t. the main area of actor 0
// =============================================================================

pub const MACRO_STACK_TOP_OFFSET: usize = UNDERFLOW_PAD_SIZE;
pub const UTIL_OFFSET: usize = MACRO_STACK_TOP_OFFSET + MACRO_STACK_SIZE;
pub const STORED_RSP_OFFSET: usize = UTIL_OFFSET + PAGE_SIZE;
pub const MEASUREMENT_OFFSET: usize = UTIL_OFFSET + PAGE_SIZE - STORED_RSP_SIZE;

pub const fn l1d_priming_offset(associativity: usize) -> usize {
    STORED_RSP_OFFSET + l1d_priming_area_size(associativity)
}

pub const L1D_PRIMING_OFFSET: usize = l1d_priming_offset(L1D_ASSOCIATIVITY);

pub const MAIN_AREA_OFFSET: usize = 0;
pub const FAULTY_AREA_OFFSET: usize = MAIN_AREA_OFFSET + MAIN_AREA_SIZE;
pub const REG_INIT_OFFSET: usize = FAULTY_AREA_OFFSET + FAULTY_AREA_SIZE;
pub const OVERFLOW_PAD_OFFSET: usize = REG_INIT_OFFSET + REG_INIT_AREA_SIZE;

// =============================================================================
// Actor code
// =============================================================================

pub const MAX_EXPANDED_SECTION_SIZE: usize = 2 * PAGE_SIZE;
pub const MAX_EXPANDED_MACROS_SIZE: usize = PAGE_SIZE;
pub const ACTOR_CODE_SIZE: usize = MAX_EXPANDED_SECTION_SIZE + MAX_EXPANDED_MACROS_SIZE;

/// Expanded test-case code of one actor.
#[repr(C)]
pub struct ActorCode {
    pub section: [u8; MAX_EXPANDED_SECTION_SIZE],
    pub macros: [u8; MAX_EXPANDED_MACROS_SIZE],
}

// =============================================================================
// Build-time validation
// =============================================================================

const _: () = assert!(size_of::<ActorData>() == ACTOR_DATA_SIZE);
const _: () = assert!(ACTOR_DATA_SIZE % PAGE_SIZE == 0);
const _: () = assert!(offset_of!(ActorData, main_area) % PAGE_SIZE == 0);
const _: () = assert!(offset_of!(ActorData, faulty_area) % PAGE_SIZE == 0);
const _: () = assert!(
    offset_of!(ActorData, main_area) - offset_of!(ActorData, underflow_pad)
        == MACRO_STACK_TOP_OFFSET
);
const _: () = assert!(offset_of!(ActorData, main_area) == UTIL_OFFSET);
const _: () = assert!(
    offset_of!(ActorData, faulty_area) - offset_of!(ActorData, main_area) == FAULTY_AREA_OFFSET
);
const _: () = assert!(
    offset_of!(ActorData, reg_init_area) - offset_of!(ActorData, main_area) == REG_INIT_OFFSET
);
const _: () = assert!(
    offset_of!(ActorData, overflow_pad) - offset_of!(ActorData, main_area) == OVERFLOW_PAD_OFFSET
);

const _: () = assert!(MEASUREMENT_SIZE <= PAGE_SIZE - STORED_RSP_SIZE);
const _: () = assert!(size_of::<UtilData>() == UTIL_SIZE);
const _: () = assert!(UTIL_SIZE % PAGE_SIZE == 0);
const _: () =
    assert!(offset_of!(UtilData, stored_rsp) == util_stored_rsp_start(L1D_ASSOCIATIVITY));
const _: () = assert!(
    offset_of!(UtilData, latest_measurement) == util_measurement_start(L1D_ASSOCIATIVITY)
);
// the utility region ends where actor 0 starts, UTIL_OFFSET below the base
const _: () =
    assert!(UTIL_SIZE - offset_of!(UtilData, stored_rsp) + UTIL_OFFSET == STORED_RSP_OFFSET);
const _: () = assert!(
    UTIL_SIZE - offset_of!(UtilData, latest_measurement) + UTIL_OFFSET == MEASUREMENT_OFFSET
);
const _: () = assert!(
    UTIL_SIZE - offset_of!(UtilData, l1d_priming_area) + UTIL_OFFSET == L1D_PRIMING_OFFSET
);

const _: () = assert!(size_of::<ActorCode>() == ACTOR_CODE_SIZE);
const _: () = assert!(ACTOR_CODE_SIZE % PAGE_SIZE == 0);

#[cfg(test)]
mod tests {
    use super::*;

    /// Associativity 8 on 4K pages, worked out by hand.
    #[test]
    fn offsets_for_eight_way_cache() {
        assert_eq!(l1d_priming_area_size(8), 32768);
        assert_eq!(UTIL_OFFSET, 64 + (4096 - 64));
        assert_eq!(UTIL_OFFSET, 4096);
        assert_eq!(STORED_RSP_OFFSET, 4096 + 4096);
        assert_eq!(STORED_RSP_OFFSET, 8192);
        assert_eq!(MEASUREMENT_OFFSET, 8192 - 8);
        assert_eq!(MEASUREMENT_OFFSET, 8184);
        assert_eq!(l1d_priming_offset(8), 8192 + 32768);
        assert_eq!(l1d_priming_offset(8), 40960);
    }

    #[test]
    fn default_offsets_match_formulas() {
        assert_eq!(L1D_PRIMING_AREA_SIZE, L1D_ASSOCIATIVITY * PAGE_SIZE);
        assert_eq!(MACRO_STACK_TOP_OFFSET, UNDERFLOW_PAD_SIZE);
        assert_eq!(UTIL_OFFSET, MACRO_STACK_TOP_OFFSET + MACRO_STACK_SIZE);
        assert_eq!(STORED_RSP_OFFSET, UTIL_OFFSET + PAGE_SIZE);
        assert_eq!(MEASUREMENT_OFFSET, UTIL_OFFSET + PAGE_SIZE - 8);
        assert_eq!(L1D_PRIMING_OFFSET, STORED_RSP_OFFSET + L1D_PRIMING_AREA_SIZE);
        assert_eq!(FAULTY_AREA_OFFSET, MAIN_AREA_SIZE);
        assert_eq!(REG_INIT_OFFSET, FAULTY_AREA_OFFSET + FAULTY_AREA_SIZE);
        assert_eq!(OVERFLOW_PAD_OFFSET, REG_INIT_OFFSET + REG_INIT_AREA_SIZE);
        assert_eq!(REG_INIT_AREA_SIZE, 320);
    }

    #[test]
    fn every_region_is_page_multiple() {
        for (name, size) in [
            ("actor data", ACTOR_DATA_SIZE),
            ("util", UTIL_SIZE),
            ("actor code", ACTOR_CODE_SIZE),
            ("macro stack + underflow pad", MACRO_STACK_SIZE + UNDERFLOW_PAD_SIZE),
            ("main area", MAIN_AREA_SIZE),
            ("faulty area", FAULTY_AREA_SIZE),
            ("reg init + overflow pad", REG_INIT_AREA_SIZE + OVERFLOW_PAD_SIZE),
        ] {
            assert_eq!(size % PAGE_SIZE, 0, "{} is {:#x} bytes", name, size);
        }
        for assoc in 1..=32 {
            assert_eq!(util_size(assoc) % PAGE_SIZE, 0);
        }
    }

    #[test]
    fn util_offsets_fall_inside_util_region() {
        // Measured downwards from actor 0's main area, the utility region
        // spans (UTIL_OFFSET, UTIL_OFFSET + UTIL_SIZE].
        let util_top = UTIL_OFFSET;
        let util_bottom = UTIL_OFFSET + UTIL_SIZE;
        for offset in [STORED_RSP_OFFSET, MEASUREMENT_OFFSET, L1D_PRIMING_OFFSET] {
            assert!(offset > util_top && offset <= util_bottom);
        }
        // priming area starts the region, stored rsp follows it directly
        assert_eq!(L1D_PRIMING_OFFSET, util_bottom);
        assert_eq!(L1D_PRIMING_OFFSET - L1D_PRIMING_AREA_SIZE, STORED_RSP_OFFSET);
        assert_eq!(STORED_RSP_OFFSET - STORED_RSP_SIZE, MEASUREMENT_OFFSET);
        // measurement must end before actor 0 begins
        assert!(MEASUREMENT_OFFSET - MEASUREMENT_SIZE >= UTIL_OFFSET);
    }

    #[test]
    fn runtime_associativity_keeps_fixed_immediates() {
        // only the priming offset depends on the associativity
        for assoc in [1, 4, 8, 12, 16] {
            let size = util_size(assoc);
            assert_eq!(size - util_stored_rsp_start(assoc) + UTIL_OFFSET, STORED_RSP_OFFSET);
            assert_eq!(size - util_measurement_start(assoc) + UTIL_OFFSET, MEASUREMENT_OFFSET);
            assert_eq!(size + UTIL_OFFSET, l1d_priming_offset(assoc));
        }
    }
}
