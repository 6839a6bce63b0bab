// Copyright 2024 The Hearth Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Synchronization between task context and interrupt context.
//!
//! All user code runs on one logical stack; interrupts only publish state
//! through [`Interrupt`] words which event-loop handlers drain in task
//! context. Nothing here blocks.

#![no_std]

mod interrupt;
mod mutex;
mod take;

pub use interrupt::Interrupt;
pub use mutex::{Mutex, MutexGuard};
pub use take::TakeCell;
