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
#![cfg_attr(not(test), no_std)]

pub const PAGE_SIZE: usize = 0x1_000; // 4KB

/// Properties of the target CPU that the sandbox layout is sized by.
pub mod hardware_desc;

/// The sandbox layout is an ABI: generated test-case code addresses
/// every field below through immediate displacements from a single
/// base register, so these constants are shared verbatim by the host
/// and by whatever emits the machine code.
pub mod layout;

/// The record written by the measurement primitives of a test case.
pub mod measurement;

pub mod util;
