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

#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::panic))]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::expect_used))]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::unwrap_used))]
//! This crate owns the memory in which generated test cases run.
//!
//! A test case is machine code that reaches every piece of data it
//! uses through constant displacements from one base register, so the
//! memory behind it has to have exactly the shape described by
//! [`tcsandbox_common::layout`]. The [`SandboxManager`] allocates that
//! memory as a single page-aligned, zeroed, guard-paged mapping and
//! lends it out as a [`Sandbox`] handle.

#[cfg(not(unix))]
compile_error!("tcsandbox-host requires a unix host (mmap/mprotect)");

/// Errors that can be returned by this crate
pub mod error;
/// Memory layout, backing memory and the lifecycle manager
pub mod mem;
/// Metric definitions and helpers
pub(crate) mod metrics;
/// The sandbox handle and its configuration
pub mod sandbox;

/// The re-export for the `SandboxError` type
pub use error::{ErrorKind, SandboxError};
/// The re-export for the lifecycle manager
pub use mem::mgr::SandboxManager;
/// The re-export for the `Sandbox` handle
pub use sandbox::Sandbox;
/// The re-export for the configuration type
pub use sandbox::SandboxConfiguration;

/// The universal `Result` type used throughout this crate
pub type Result<T> = core::result::Result<T, error::SandboxError>;

/// Logs an error then returns with it, more or less equivalent to the bail! macro in anyhow
/// but for `SandboxError` instead of anyhow::Error
#[macro_export]
macro_rules! log_then_return {
    ($msg:literal $(,)?) => {{
        let __args = std::format_args!($msg);
        let __err_msg = match __args.as_str() {
            Some(msg) => String::from(msg),
            None => std::format!($msg),
        };
        let __err = $crate::SandboxError::Error(__err_msg);
        log::error!("{}", __err);
        return Err(__err);
    }};
    ($err:expr $(,)?) => {
        log::error!("{}", $err);
        return Err($err);
    };
    ($fmtstr:expr, $($arg:tt)*) => {
           let __err_msg = std::format!($fmtstr, $($arg)*);
           let __err = $crate::error::SandboxError::Error(__err_msg);
           log::error!("{}", __err);
           return Err(__err);
    };
}
