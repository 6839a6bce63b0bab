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

//! Bounded readers and writers for wire formats, with in-place
//! authenticated encryption for the protected parts of a frame.
//!
//! Readers never run past their slice: overrunning reads return zero and
//! poison the reader, which [`MessageReader::is_valid`] reports after
//! parsing. Writers drop overflowing writes. Encryption is AES-128-CCM with
//! a 13-byte nonce and a 4-byte message integrity code, done in place over
//! one buffer split into header ("string a") and payload views.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod crypt;
mod reader;
mod writer;

pub use crypt::{Aes128Ccm, MIC_LENGTH, Nonce, new_cipher};
pub use reader::{DecryptReader, MessageReader};
pub use writer::{EncryptWriter, MessageWriter};
