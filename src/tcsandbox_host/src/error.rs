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

use thiserror::Error;

use crate::mem::memory_region::MemoryRegionFlags;

/// The error type for sandbox memory operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// An actor index beyond the actors of the sandbox
    #[error("Actor {0} does not exist, the sandbox has {1} actors")]
    ActorIndexOutOfRange(usize, usize),

    /// Memory access out of bounds
    #[error("Offset: {0} out of bounds, Max is: {1}")]
    BoundsCheckFailed(u64, usize),

    /// A generic error with a message
    #[error("{0}")]
    Error(String),

    /// The actor count is outside the supported range
    #[error("Actor count {0} is invalid, expected between {1} and {2}")]
    InvalidActorCount(usize, usize, usize),

    /// The L1D associativity is outside the supported range
    #[error("L1D associativity {0} is invalid, expected between {1} and {2}")]
    InvalidAssociativity(usize, usize, usize),

    /// A region of the computed layout is not where the ABI constants put it
    #[error("{0} offset does not match expected offset expected: {1:#x}, actual: {2:#x}")]
    LayoutMismatch(&'static str, usize, usize),

    /// `init` was called again without releasing the manager first
    #[error("The sandbox manager is already initialized")]
    ManagerAlreadyInitialized,

    /// An operation that needs a configured manager was called before `init`
    #[error("The sandbox manager is not initialized")]
    ManagerNotInitialized,

    /// The memory request exceeds the maximum size allowed
    #[error("Memory requested {0} exceeds maximum size allowed {1}")]
    MemoryRequestTooBig(usize, usize),

    /// mmap Failed.
    #[error("mmap failed with os error {0:?}")]
    MmapFailed(Option<i32>),

    /// mprotect Failed.
    #[error("mprotect failed with os error {0:?}")]
    MprotectFailed(Option<i32>),

    /// The host does not use the page size the layout was built for
    #[error("Host page size {0:#x} does not match the sandbox page size {1:#x}")]
    PageSizeMismatch(usize, usize),

    /// A protection change was requested for a range that is not whole pages
    #[error("Range {0:#x}..{1:#x} cannot be protected as {2:?}, it is not page aligned")]
    UnalignedProtection(usize, usize, MemoryRegionFlags),
}

/// The two classes of failure a caller has to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A layout constraint or a usage contract was violated. Retrying
    /// without changing the configuration or call order will fail again.
    Configuration,
    /// The host could not supply memory with the required properties.
    Allocation,
}

impl From<&str> for SandboxError {
    fn from(s: &str) -> Self {
        SandboxError::Error(s.to_string())
    }
}

impl SandboxError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        // wildcard _ or matches! not used here purposefully to ensure that new error variants
        // are explicitly classified.
        match self {
            SandboxError::ActorIndexOutOfRange(_, _)
            | SandboxError::BoundsCheckFailed(_, _)
            | SandboxError::Error(_)
            | SandboxError::InvalidActorCount(_, _, _)
            | SandboxError::InvalidAssociativity(_, _, _)
            | SandboxError::LayoutMismatch(_, _, _)
            | SandboxError::ManagerAlreadyInitialized
            | SandboxError::ManagerNotInitialized
            | SandboxError::PageSizeMismatch(_, _)
            | SandboxError::UnalignedProtection(_, _, _) => ErrorKind::Configuration,

            SandboxError::MemoryRequestTooBig(_, _)
            | SandboxError::MmapFailed(_)
            | SandboxError::MprotectFailed(_) => ErrorKind::Allocation,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_allocation_error(&self) -> bool {
        self.kind() == ErrorKind::Allocation
    }
}

/// Creates a `SandboxError::Error` from a string literal or format string
#[macro_export]
macro_rules! new_error {
    ($msg:literal $(,)?) => {{
        let __args = std::format_args!($msg);
        let __err_msg = match __args.as_str() {
            Some(msg) => String::from(msg),
            None => std::format!($msg),
        };
        $crate::SandboxError::Error(__err_msg)
    }};
    ($fmtstr:expr, $($arg:tt)*) => {{
           let __err_msg = std::format!($fmtstr, $($arg)*);
           $crate::error::SandboxError::Error(__err_msg)
    }};
}
