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

use std::ffi::c_void;
use std::io::Error;
use std::ops::Range;
use std::ptr::null_mut;

use libc::{
    MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE, mmap,
    mprotect, munmap,
};
use tcsandbox_common::PAGE_SIZE;
use tcsandbox_common::util::is_page_aligned;
use tracing::{Span, instrument};

use super::memory_region::MemoryRegionFlags;
use crate::error::SandboxError::{
    BoundsCheckFailed, MemoryRequestTooBig, MmapFailed, MprotectFailed, UnalignedProtection,
};
use crate::{Result, log_then_return, new_error};

/// Makes sure that the given `offset` and `size` are within the bounds of
/// the memory with size `mem_size`.
macro_rules! bounds_check {
    ($offset:expr, $size:expr, $mem_size:expr) => {
        if $offset
            .checked_add($size)
            .is_none_or(|end| end > $mem_size)
        {
            return Err(BoundsCheckFailed(
                ($offset as u64).saturating_add($size as u64),
                $mem_size,
            ));
        }
    };
}

/// A mapping of host memory, unmapped when dropped.
#[derive(Debug)]
struct HostMapping {
    ptr: *mut u8,
    size: usize,
}

impl Drop for HostMapping {
    fn drop(&mut self) {
        // SAFETY: ptr and size describe a mapping created by a successful
        // mmap call, and this is the only place that unmaps it
        if unsafe { munmap(self.ptr as *mut c_void, self.size) } != 0 {
            tracing::error!(
                "Failed to munmap sandbox memory: {:?}",
                Error::last_os_error()
            );
        }
    }
}

/// Page-aligned, zeroed memory owned by exactly one sandbox.
///
/// The usable region is surrounded by one host guard page on each side,
/// both mapped `PROT_NONE`, so an access just outside the sandbox traps
/// instead of landing in unrelated host memory:
///
/// ```text
/// [guard] [usable ......................] [guard]
///  NONE    READ|WRITE (+ per-page changes)  NONE
///          ^base_addr                       ^base_addr + mem_size
/// ```
#[derive(Debug)]
pub struct ExclusiveSharedMemory {
    region: HostMapping,
}

// SAFETY: the mapping is owned by this value alone and never aliased,
// so moving it to another thread is sound. It is not Sync: the pointers
// it hands out allow mutation through `&self` in generated code.
unsafe impl Send for ExclusiveSharedMemory {}

impl ExclusiveSharedMemory {
    /// Create a new region of shared memory with the given minimum
    /// size in bytes. The region will be surrounded by guard pages.
    ///
    /// Return `Err` if shared memory could not be allocated.
    #[instrument(err(Debug), skip_all, parent = Span::current(), level= "Trace")]
    pub fn new(min_size_bytes: usize) -> Result<Self> {
        if min_size_bytes == 0 {
            return Err(new_error!("Cannot create shared memory with size 0"));
        }

        let total_size = min_size_bytes
            .checked_add(2 * PAGE_SIZE) // guard page around the memory
            .ok_or(MemoryRequestTooBig(min_size_bytes, usize::MAX))?;

        if total_size % PAGE_SIZE != 0 {
            return Err(new_error!(
                "shared memory must be a multiple of {}",
                PAGE_SIZE
            ));
        }

        // usize and isize are guaranteed to be the same size, and
        // isize::MAX should be positive, so this cast should be safe.
        if total_size > isize::MAX as usize {
            return Err(MemoryRequestTooBig(total_size, isize::MAX as usize));
        }

        // SAFETY: anonymous private mapping at a kernel-chosen address,
        // no existing memory is affected
        let addr = unsafe {
            mmap(
                null_mut(),
                total_size as libc::size_t,
                PROT_READ | PROT_WRITE,
                MAP_ANONYMOUS | MAP_PRIVATE | MAP_NORESERVE,
                -1,
                0 as libc::off_t,
            )
        };
        if addr == MAP_FAILED {
            let err = MmapFailed(Error::last_os_error().raw_os_error());
            log_then_return!(err);
        }
        // from here on the mapping is released if anything below fails
        let region = HostMapping {
            ptr: addr as *mut u8,
            size: total_size,
        };

        // protect the guard pages

        // SAFETY: the first page lies inside the mapping created above
        let res = unsafe { mprotect(addr, PAGE_SIZE, PROT_NONE) };
        if res != 0 {
            return Err(MprotectFailed(Error::last_os_error().raw_os_error()));
        }
        // SAFETY: the last page lies inside the mapping created above
        let res = unsafe {
            mprotect(
                region.ptr.add(total_size - PAGE_SIZE) as *mut c_void,
                PAGE_SIZE,
                PROT_NONE,
            )
        };
        if res != 0 {
            return Err(MprotectFailed(Error::last_os_error().raw_os_error()));
        }

        let mut mem = Self { region };
        mem.zero();
        Ok(mem)
    }

    /// Get the base address of the usable memory as a `usize`, which is
    /// the first byte after the lower guard page.
    pub fn base_addr(&self) -> usize {
        self.region.ptr as usize + PAGE_SIZE
    }

    /// Get the base address of the usable memory as a raw pointer.
    pub fn base_ptr(&self) -> *mut u8 {
        self.base_addr() as *mut u8
    }

    /// Get the size of the usable memory in bytes, excluding the guard
    /// pages.
    pub fn mem_size(&self) -> usize {
        self.region.size - 2 * PAGE_SIZE
    }

    /// View the usable memory as a slice. Any page made inaccessible
    /// with [`Self::protect`] must be restored first.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the usable region is mapped for mem_size bytes and
        // borrowed for the lifetime of &self
        unsafe { std::slice::from_raw_parts(self.base_ptr(), self.mem_size()) }
    }

    /// View the usable memory as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the usable region is mapped for mem_size bytes and
        // exclusively borrowed through &mut self
        unsafe { std::slice::from_raw_parts_mut(self.base_ptr(), self.mem_size()) }
    }

    /// Fill the usable memory with zeroes.
    #[instrument(skip_all, parent = Span::current(), level= "Trace")]
    pub fn zero(&mut self) {
        self.as_mut_slice().fill(0);
    }

    /// Change the host permissions of `range`, given as offsets into the
    /// usable memory. The range must start and end on a page boundary.
    ///
    /// # Safety
    ///
    /// Removing `READ` or `WRITE` from a page makes every safe accessor
    /// of this type (and of the views built on it) fault when it touches
    /// that page. The caller must restore `READ | WRITE` before any such
    /// access, and must not remove permissions from memory that
    /// currently executing code relies on.
    #[instrument(err(Debug), skip(self), parent = Span::current(), level= "Trace")]
    pub unsafe fn protect(&mut self, range: Range<usize>, flags: MemoryRegionFlags) -> Result<()> {
        if !is_page_aligned(range.start) || !is_page_aligned(range.end) || range.is_empty() {
            return Err(UnalignedProtection(range.start, range.end, flags));
        }
        bounds_check!(range.start, range.end - range.start, self.mem_size());

        // SAFETY: the range is page aligned and inside the usable
        // region, so the guard pages and other mappings are untouched
        let res = unsafe {
            mprotect(
                self.base_ptr().add(range.start) as *mut c_void,
                range.end - range.start,
                flags.as_prot(),
            )
        };
        if res != 0 {
            return Err(MprotectFailed(Error::last_os_error().raw_os_error()));
        }
        Ok(())
    }
}
