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

/// Computes where every region of a sandbox lives in its backing memory
pub mod layout;
/// Typed description of the regions of a sandbox
pub mod memory_region;
/// Owns the sandbox and enforces the allocate/free discipline
pub mod mgr;
/// The mmap-backed memory a sandbox lives in
pub mod shared_mem;
/// Typed, bounds-checked views over the actor, utility and code regions
pub mod views;
