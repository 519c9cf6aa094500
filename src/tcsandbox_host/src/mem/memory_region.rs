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

use std::fmt::{Display, Formatter};
use std::ops::Range;

use bitflags::bitflags;
use tcsandbox_common::PAGE_SIZE;
use tcsandbox_common::util::round_up_to;

bitflags! {
    /// flags representing memory permission for a memory region
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct MemoryRegionFlags: u32 {
        /// no permissions
        const NONE = 0;
        /// allow reads
        const READ = 1;
        /// allow writes
        const WRITE = 2;
        /// allow execute
        const EXECUTE = 4;
    }
}

impl MemoryRegionFlags {
    /// The `PROT_*` bits for `mprotect`.
    pub(crate) fn as_prot(self) -> libc::c_int {
        let mut prot = libc::PROT_NONE;
        if self.contains(MemoryRegionFlags::READ) {
            prot |= libc::PROT_READ;
        }
        if self.contains(MemoryRegionFlags::WRITE) {
            prot |= libc::PROT_WRITE;
        }
        if self.contains(MemoryRegionFlags::EXECUTE) {
            prot |= libc::PROT_EXEC;
        }
        prot
    }
}

impl Display for MemoryRegionFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "NONE")
        } else {
            let mut first = true;
            for (name, _) in self.iter_names() {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
            Ok(())
        }
    }
}

/// The kind of data a region of sandbox memory holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRegionType {
    /// Cache priming buffer at the bottom of the utility region
    L1dPrimingArea,
    /// Stored stack pointer, latest measurement and padding
    UtilData,
    /// Stack used when calling macros
    MacroStack,
    /// Guard below the main area
    UnderflowPad,
    /// First input page of an actor
    MainArea,
    /// Second input page of an actor, the one made to fault
    FaultyArea,
    /// Register initial values
    RegInitArea,
    /// Guard above the register init area
    OverflowPad,
    /// Expanded test-case instructions
    CodeSection,
    /// Expanded macro bodies
    CodeMacros,
}

impl MemoryRegionType {
    /// Whether the region only exists to absorb out-of-bounds accesses
    pub fn is_guard_pad(&self) -> bool {
        matches!(
            self,
            MemoryRegionType::UnderflowPad | MemoryRegionType::OverflowPad
        )
    }

    /// Whether the region belongs to an actor's data block
    pub fn is_actor_data(&self) -> bool {
        matches!(
            self,
            MemoryRegionType::MacroStack
                | MemoryRegionType::UnderflowPad
                | MemoryRegionType::MainArea
                | MemoryRegionType::FaultyArea
                | MemoryRegionType::RegInitArea
                | MemoryRegionType::OverflowPad
        )
    }
}

/// A region of sandbox memory, as offsets into the backing mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryRegion {
    /// offsets of the region within the sandbox memory
    pub offset_region: Range<usize>,
    /// memory access flags for the given region
    pub flags: MemoryRegionFlags,
    /// the type of memory region
    pub region_type: MemoryRegionType,
    /// the actor owning the region, if it is per actor
    pub actor: Option<usize>,
}

impl MemoryRegion {
    pub fn len(&self) -> usize {
        self.offset_region.end - self.offset_region.start
    }

    pub fn is_empty(&self) -> bool {
        self.offset_region.is_empty()
    }
}

/// Builds a contiguous list of regions, handing back the running offset
/// so the caller can check it against the layout after every push
pub(crate) struct MemoryRegionVecBuilder {
    offset: usize,
    regions: Vec<MemoryRegion>,
}

impl MemoryRegionVecBuilder {
    pub(crate) fn new(start_offset: usize) -> Self {
        Self {
            offset: start_offset,
            regions: Vec::new(),
        }
    }

    /// Push a region of exactly `size` bytes, returning the offset
    /// directly after it.
    pub(crate) fn push(
        &mut self,
        size: usize,
        flags: MemoryRegionFlags,
        region_type: MemoryRegionType,
        actor: Option<usize>,
    ) -> usize {
        let start = self.offset;
        self.offset += size;
        self.regions.push(MemoryRegion {
            offset_region: start..self.offset,
            flags,
            region_type,
            actor,
        });
        self.offset
    }

    /// Push a region rounded up to whole pages, returning the offset
    /// directly after it.
    pub(crate) fn push_page_aligned(
        &mut self,
        size: usize,
        flags: MemoryRegionFlags,
        region_type: MemoryRegionType,
        actor: Option<usize>,
    ) -> usize {
        self.push(round_up_to(size, PAGE_SIZE), flags, region_type, actor)
    }

    pub(crate) fn build(self) -> Vec<MemoryRegion> {
        self.regions
    }
}
