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

use hearth_codec::{DecryptReader, EncryptWriter, MIC_LENGTH, Nonce, new_cipher};
use hearth_error::Error;

fn protected_frame(counter: u32) -> (Vec<u8>, usize) {
    let cipher = new_cipher(&[0x42; 16]);
    let nonce = Nonce::device(0x1234_5678, counter);
    let mut frame = vec![0; 32];
    let mut writer = EncryptWriter::new(&mut frame);
    writer.u8(0x0a);
    writer.set_header();
    writer.u32l(0x1234_5678);
    writer.set_message();
    writer.u16l(0xbeef);
    writer.bytes(&[1, 2, 3, 4]);
    writer.encrypt(&nonce, &cipher).unwrap();
    let length = writer.position();
    (frame, length)
}

#[test]
fn encrypted_frame_round_trip() {
    let (mut frame, length) = protected_frame(7);
    assert_eq!(length, 1 + 4 + 6 + MIC_LENGTH);
    // the payload is scrambled on the wire
    assert_ne!(&frame[5..11], &[0xef, 0xbe, 1, 2, 3, 4]);

    let cipher = new_cipher(&[0x42; 16]);
    let mut reader = DecryptReader::new(&mut frame[..length]);
    assert_eq!(reader.u8(), 0x0a);
    reader.set_header();
    let device_id = reader.u32l();
    assert_eq!(device_id, 0x1234_5678);
    reader.set_message();
    reader.decrypt(&Nonce::device(device_id, 7), &cipher).unwrap();
    assert_eq!(reader.u16l(), 0xbeef);
    assert_eq!(reader.bytes(4), [1, 2, 3, 4]);
    assert_eq!(reader.remaining(), 0);
    assert!(reader.is_valid());
}

#[test]
fn tampering_is_detected() {
    let cipher = new_cipher(&[0x42; 16]);
    for tampered in [0, 2, 6, 12] {
        let (mut frame, length) = protected_frame(7);
        frame[tampered] ^= 0x80;
        let mut reader = DecryptReader::new(&mut frame[..length]);
        reader.u8();
        reader.set_header();
        reader.u32l();
        reader.set_message();
        assert_eq!(
            reader.decrypt(&Nonce::device(0x1234_5678, 7), &cipher),
            match tampered {
                // the clear length byte is not authenticated
                0 => Ok(()),
                _ => Err(Error::BadMic),
            },
        );
    }
}

#[test]
fn wrong_counter_fails_authentication() {
    let cipher = new_cipher(&[0x42; 16]);
    let (mut frame, length) = protected_frame(7);
    let mut reader = DecryptReader::new(&mut frame[..length]);
    reader.u8();
    reader.set_header();
    reader.u32l();
    reader.set_message();
    assert_eq!(
        reader.decrypt(&Nonce::device(0x1234_5678, 8), &cipher),
        Err(Error::BadMic),
    );
}

#[test]
fn counters_change_the_keystream() {
    let (one, _) = protected_frame(1);
    let (two, _) = protected_frame(2);
    assert_ne!(one[5..11], two[5..11]);
}
