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

//! Contract between drivers and the event loop.
//!
//! A driver splits into three parts:
//! - the interrupt routine, which mutates pre-reserved driver state and
//!   raises bits on an [`Interrupt`] word, never touching waitlists;
//! - a handler registered with [`crate::Runtime::add_handler`], which drains
//!   the pending bits each loop iteration and resumes the driver's waitlists
//!   in task context;
//! - the awaitable operations below, whose futures park on those waitlists.
//!
//! Caller-owned buffers stay borrowed by the returned future, so they remain
//! valid until the operation resumes or is cancelled by dropping the future
//! (e.g. by losing a [`crate::select2`]).

use hearth_error::Error;
pub use hearth_sync::Interrupt;

/// A character device on the multi-drop serial bus or a UART.
#[allow(async_fn_in_trait)]
pub trait Serial {
    /// Receives a frame into `data`, returning the received length.
    async fn receive(&self, data: &mut [u8]) -> Result<usize, Error>;

    /// Sends a frame.
    async fn send(&self, data: &[u8]) -> Result<(), Error>;
}

/// An SPI bus master.
#[allow(async_fn_in_trait)]
pub trait SpiMaster {
    /// Writes `write` while reading `read.len()` bytes into `read`.
    async fn transfer(&self, write: &[u8], read: &mut [u8]) -> Result<(), Error>;
}
