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

use std::fmt::Debug;
use std::ops::Range;

use tcsandbox_common::layout::{ACTOR_CODE_SIZE, ACTOR_DATA_SIZE, FAULTY_AREA_SIZE};
use tcsandbox_common::util::is_page_aligned;
use tracing::{Span, instrument};

use crate::Result;
use crate::error::SandboxError::LayoutMismatch;
use crate::mem::layout::SandboxMemoryLayout;
use crate::mem::memory_region::{MemoryRegion, MemoryRegionFlags};
use crate::mem::shared_mem::ExclusiveSharedMemory;
use crate::mem::views::{
    ActorCodeView, ActorCodeViewMut, ActorDataView, ActorDataViewMut, UtilView, UtilViewMut,
};

const DEFAULT_FLAGS: MemoryRegionFlags = MemoryRegionFlags::READ.union(MemoryRegionFlags::WRITE);

/// An allocated sandbox: one zeroed, page-aligned mapping holding the
/// utility region, the data block of every actor and the code block of
/// every actor, laid out as described by its [`SandboxMemoryLayout`].
///
/// A `Sandbox` is only ever lent out by the
/// [`SandboxManager`](crate::SandboxManager) that owns it, so no
/// reference to its memory can outlive the release of that memory.
pub struct Sandbox {
    id: u64,
    layout: SandboxMemoryLayout,
    shared_mem: ExclusiveSharedMemory,
    // host stack pointer saved when control is handed to the test case
    main_stack_base: Option<u64>,
}

impl Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("base", &format_args!("{:#x}", self.shared_mem.base_addr()))
            .field("size", &format_args!("{:#x}", self.shared_mem.mem_size()))
            .field(
                "main_stack_base",
                &self.main_stack_base.map(|rsp| format!("{:#x}", rsp)),
            )
            .field("layout", &self.layout)
            .finish()
    }
}

impl Sandbox {
    /// Map, zero and check the memory for `layout`. Nothing is kept if
    /// any step fails.
    #[instrument(err(Debug), skip(layout), parent = Span::current(), level= "Trace")]
    pub(crate) fn new(id: u64, layout: SandboxMemoryLayout) -> Result<Self> {
        let mem_size = layout.get_memory_size()?;
        // checks every region against the computed offsets
        let regions = layout.get_memory_regions()?;
        let covered = regions.last().map_or(0, |r| r.offset_region.end);
        if covered != mem_size {
            return Err(LayoutMismatch("Memory Regions", mem_size, covered));
        }

        let mut shared_mem = ExclusiveSharedMemory::new(mem_size)?;
        if !is_page_aligned(shared_mem.base_addr()) {
            return Err(LayoutMismatch(
                "Sandbox Base",
                0,
                shared_mem.base_addr() % tcsandbox_common::PAGE_SIZE,
            ));
        }

        // the mapping starts out READ | WRITE, apply what differs
        for region in regions.iter().filter(|r| r.flags != DEFAULT_FLAGS) {
            // SAFETY: every region keeps READ | WRITE, so the views stay
            // usable, and nothing runs from this memory yet
            unsafe { shared_mem.protect(region.offset_region.clone(), region.flags)? };
        }

        Ok(Self {
            id,
            layout,
            shared_mem,
            main_stack_base: None,
        })
    }

    /// The process-unique id of this allocation
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn layout(&self) -> &SandboxMemoryLayout {
        &self.layout
    }

    pub fn actor_count(&self) -> usize {
        self.layout.get_actor_count()
    }

    /// The regions of this sandbox, offsets relative to [`Self::base_addr`]
    pub fn memory_regions(&self) -> Result<Vec<MemoryRegion>> {
        self.layout.get_memory_regions()
    }

    /// Address of the first byte of the sandbox, which is the first
    /// byte of the L1D priming area
    pub fn base_addr(&self) -> usize {
        self.shared_mem.base_addr()
    }

    /// Pointer to the utility region
    pub fn util_ptr(&self) -> *mut u8 {
        self.ptr_at(self.layout.get_util_offset())
    }

    /// Pointer to the data block of actor 0, directly after the utility
    /// region
    pub fn data_ptr(&self) -> *mut u8 {
        self.ptr_at(self.layout.get_data_offset())
    }

    /// Pointer to the code block of actor 0
    pub fn code_ptr(&self) -> *mut u8 {
        self.ptr_at(self.layout.get_code_offset())
    }

    /// The value generated code expects in its base register: the
    /// address of the main area of actor 0
    pub fn base_register_value(&self) -> u64 {
        (self.base_addr() + self.layout.get_base_register_offset()) as u64
    }

    fn ptr_at(&self, offset: usize) -> *mut u8 {
        // stays inside the mapping, offsets come from the layout
        self.shared_mem.base_ptr().wrapping_add(offset)
    }

    /// Record the host stack pointer at the time control is handed to
    /// the test case, so it can be recovered if the test case does not
    /// return normally
    pub fn set_main_stack_base(&mut self, rsp: u64) {
        self.main_stack_base = Some(rsp);
    }

    pub fn main_stack_base(&self) -> Option<u64> {
        self.main_stack_base
    }

    /// The whole sandbox memory
    pub fn memory(&self) -> &[u8] {
        self.shared_mem.as_slice()
    }

    fn actor_data_range(&self, actor: usize) -> Result<Range<usize>> {
        let start = self.layout.get_actor_data_offset(actor)?;
        Ok(start..start + ACTOR_DATA_SIZE)
    }

    fn actor_code_range(&self, actor: usize) -> Result<Range<usize>> {
        let start = self.layout.get_actor_code_offset(actor)?;
        Ok(start..start + ACTOR_CODE_SIZE)
    }

    fn util_range(&self) -> Range<usize> {
        let start = self.layout.get_util_offset();
        start..start + self.layout.get_util_size()
    }

    pub fn actor(&self, actor: usize) -> Result<ActorDataView<'_>> {
        let range = self.actor_data_range(actor)?;
        Ok(ActorDataView::new(actor, &self.shared_mem.as_slice()[range]))
    }

    pub fn actor_mut(&mut self, actor: usize) -> Result<ActorDataViewMut<'_>> {
        let range = self.actor_data_range(actor)?;
        Ok(ActorDataViewMut::new(
            actor,
            &mut self.shared_mem.as_mut_slice()[range],
        ))
    }

    pub fn util(&self) -> UtilView<'_> {
        UtilView::new(
            self.layout.get_l1d_associativity(),
            &self.shared_mem.as_slice()[self.util_range()],
        )
    }

    pub fn util_mut(&mut self) -> UtilViewMut<'_> {
        let range = self.util_range();
        UtilViewMut::new(
            self.layout.get_l1d_associativity(),
            &mut self.shared_mem.as_mut_slice()[range],
        )
    }

    pub fn code(&self, actor: usize) -> Result<ActorCodeView<'_>> {
        let range = self.actor_code_range(actor)?;
        Ok(ActorCodeView::new(actor, &self.shared_mem.as_slice()[range]))
    }

    pub fn code_mut(&mut self, actor: usize) -> Result<ActorCodeViewMut<'_>> {
        let range = self.actor_code_range(actor)?;
        Ok(ActorCodeViewMut::new(
            actor,
            &mut self.shared_mem.as_mut_slice()[range],
        ))
    }

    /// Absolute address range of the faulty area of `actor`. It is
    /// always exactly one page, starting on a page boundary.
    pub fn faulty_area_range(&self, actor: usize) -> Result<Range<usize>> {
        let start = self.base_addr() + self.layout.get_faulty_area_offset(actor)?;
        Ok(start..start + FAULTY_AREA_SIZE)
    }

    /// Change the host permissions of the faulty area of `actor`.
    ///
    /// # Safety
    ///
    /// While the faulty area is not `READ | WRITE`, the views and
    /// [`Self::memory`] fault when they touch it. The caller must
    /// restore `READ | WRITE` before using them on that page.
    pub unsafe fn protect_faulty_area(
        &mut self,
        actor: usize,
        flags: MemoryRegionFlags,
    ) -> Result<()> {
        let start = self.layout.get_faulty_area_offset(actor)?;
        let range = start..start + FAULTY_AREA_SIZE;
        // SAFETY: forwarded to the caller
        unsafe { self.shared_mem.protect(range, flags) }
    }
}
