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

//! The host does not discover these values; whoever builds the
//! executor for a given CPU selects them.

/// Number of ways in the L1 data cache.
#[cfg(not(feature = "l1d_assoc_12"))]
pub const L1D_ASSOCIATIVITY: usize = 8;

/// Number of ways in the L1 data cache.
#[cfg(feature = "l1d_assoc_12")]
pub const L1D_ASSOCIATIVITY: usize = 12;
