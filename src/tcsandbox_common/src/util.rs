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

use crate::PAGE_SIZE;

/// Round `value` up to the next multiple of `multiple`.
pub const fn round_up_to(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

pub const fn is_page_aligned(value: usize) -> bool {
    value % PAGE_SIZE == 0
}
