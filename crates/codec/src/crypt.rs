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

use aead::KeyInit;
use aes::Aes128;
use ccm::Ccm;
use ccm::consts::{U4, U13};

/// AES-128 in CCM mode with a 4-byte tag and 13-byte nonce, the mode of the
/// radio and bus security layers.
pub type Aes128Ccm = Ccm<Aes128, U4, U13>;

/// Length of the message integrity code appended to protected frames.
pub const MIC_LENGTH: usize = 4;

/// Creates the CCM cipher for a 16-byte network or link key.
pub fn new_cipher(key: &[u8; 16]) -> Aes128Ccm {
    Aes128Ccm::new(key.into())
}

/// The 13-byte CCM nonce.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Nonce(pub(crate) [u8; 13]);

impl Nonce {
    /// Nonce of a mains-powered device identified by a 32-bit id: the id
    /// twice, the security counter, and a fixed security control byte.
    pub fn device(device_id: u32, counter: u32) -> Self {
        let mut nonce = [0; 13];
        nonce[0..4].copy_from_slice(&device_id.to_le_bytes());
        nonce[4..8].copy_from_slice(&device_id.to_le_bytes());
        nonce[8..12].copy_from_slice(&counter.to_le_bytes());
        nonce[12] = 0x05;
        Nonce(nonce)
    }

    /// Nonce of a device identified by a 64-bit source address.
    pub fn address(source: u64, counter: u32, control: u8) -> Self {
        let mut nonce = [0; 13];
        nonce[0..8].copy_from_slice(&source.to_le_bytes());
        nonce[8..12].copy_from_slice(&counter.to_le_bytes());
        nonce[12] = control;
        Nonce(nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_layout() {
        let nonce = Nonce::device(0x0403_0201, 0x0807_0605);
        assert_eq!(nonce.0, [1, 2, 3, 4, 1, 2, 3, 4, 5, 6, 7, 8, 5]);
        let nonce = Nonce::address(0x0807_0605_0403_0201, 0x0c0b_0a09, 0x25);
        assert_eq!(nonce.0, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 0x25]);
    }
}
