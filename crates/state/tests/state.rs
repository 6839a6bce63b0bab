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

use hearth_runtime::{ManualEnv, Runtime};
use hearth_state::{MemFram, PersistentStateManager};

const FRAM_SIZE: usize = 4096;

#[test]
fn fresh_states_use_defaults() {
    let manager = PersistentStateManager::new(MemFram::new(FRAM_SIZE));
    let counter = manager.restore::<u16>(0, 0x1234).unwrap();
    assert_eq!(counter.get(), 0x1234);
    let wide = manager.restore::<u32>(6, 7).unwrap();
    assert_eq!(wide.get(), 7);
}

#[test]
fn allocation_splits_block_halves() {
    let manager = PersistentStateManager::new(MemFram::new(FRAM_SIZE));
    // 1 and 2 byte payloads fill the 6-byte slots at block offset 0
    assert_eq!(manager.allocate::<u8>(0).offset(), 0);
    assert_eq!(manager.allocate::<u16>(0).offset(), 16);
    // 3 and 4 byte payloads fill the 10-byte slots at block offset 6
    assert_eq!(manager.allocate::<u32>(0).offset(), 6);
    assert_eq!(manager.allocate::<i32>(0).offset(), 22);
}

#[test]
fn restore_occupies_the_slot() {
    let manager = PersistentStateManager::new(MemFram::new(FRAM_SIZE));
    let restored = manager.restore::<u8>(0, 0).unwrap();
    assert_eq!(restored.offset(), 0);
    assert_eq!(manager.allocate::<u8>(0).offset(), 16);
    let upper = manager.restore::<u32>(6, 0).unwrap();
    assert_eq!(upper.offset(), 6);
    assert_eq!(manager.allocate::<u32>(0).offset(), 22);
}

#[test]
fn updates_survive_a_restart() {
    let fram = MemFram::new(FRAM_SIZE);
    {
        let manager = PersistentStateManager::new(fram.clone());
        let counter = manager.allocate::<u32>(0);
        counter.set(0xdead_beef);
        manager.flush().unwrap();
    }
    let manager = PersistentStateManager::new(fram);
    let counter = manager.restore::<u32>(6, 0).unwrap();
    assert_eq!(counter.get(), 0xdead_beef);
}

#[test]
fn updates_alternate_copies() {
    let fram = MemFram::new(FRAM_SIZE);
    let manager = PersistentStateManager::new(fram.clone());
    let counter = manager.restore::<u16>(0, 0).unwrap();

    counter.set(0xaaaa);
    manager.flush().unwrap();
    counter.set(0xbbbb);
    manager.flush().unwrap();
    counter.set(0xcccc);
    manager.flush().unwrap();

    // copy 0 spans bytes 0..3, copy 1 spans 3..6; one copy per update
    assert_eq!(fram.writes(), [(0, 3), (3, 3), (0, 3)]);
    let manager = PersistentStateManager::new(fram);
    assert_eq!(manager.restore::<u16>(0, 0).unwrap().get(), 0xcccc);
}

#[test]
fn torn_write_keeps_previous_value() {
    let fram = MemFram::new(FRAM_SIZE);
    let manager = PersistentStateManager::new(fram.clone());
    let counter = manager.restore::<u16>(0, 0).unwrap();
    counter.set(0xaaaa);
    manager.flush().unwrap();
    counter.set(0xbbbb);
    manager.flush().unwrap();

    // the second update went to copy 1; tear its counter byte
    assert_eq!(fram.writes().last(), Some(&(3, 3)));
    fram.poke(5, 0x57);
    let manager = PersistentStateManager::new(fram);
    assert_eq!(manager.restore::<u16>(0, 0).unwrap().get(), 0xaaaa);
}

#[test]
fn newer_valid_copy_wins() {
    let fram = MemFram::new(FRAM_SIZE);
    // copy 0: 0x1111 with counter 0x55; copy 1: 0x2222 with counter 0x56
    fram.poke(0, 0x11);
    fram.poke(1, 0x11);
    fram.poke(2, 0x55);
    fram.poke(3, 0x22);
    fram.poke(4, 0x22);
    fram.poke(5, 0x56);
    let manager = PersistentStateManager::new(fram.clone());
    assert_eq!(manager.restore::<u16>(0, 0).unwrap().get(), 0x2222);

    // an invalid counter disqualifies its copy regardless of order
    fram.poke(5, 0xff);
    let manager = PersistentStateManager::new(fram);
    assert_eq!(manager.restore::<u16>(0, 0).unwrap().get(), 0x1111);
}

#[test]
fn flusher_persists_in_the_background() {
    let (env, _clock) = ManualEnv::new();
    let rt = Runtime::new(env);
    let fram = MemFram::new(FRAM_SIZE);
    let manager = PersistentStateManager::new(fram.clone());

    let counter = manager.allocate::<u32>(5);
    rt.spawn(manager.flusher()).detach();
    assert_eq!(counter.increment(), 6);
    assert_eq!(counter.increment(), 7);
    rt.run_once();

    // both increments collapsed into one programmed copy
    assert_eq!(fram.writes().len(), 1);
    let data = fram.snapshot();
    assert_eq!(data[6..10], [7, 0, 0, 0]);
    assert_eq!(data[10], 0x56);

    // later updates wake the flusher again
    counter.post_decrement();
    rt.run_once();
    assert_eq!(fram.writes().len(), 2);
    let manager = PersistentStateManager::new(fram);
    assert_eq!(manager.restore::<u32>(6, 0).unwrap().get(), 6);
}
