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

use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Signed span between two [`SystemTime`]s, in milliseconds.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SystemDuration {
    value: i32,
}

impl SystemDuration {
    pub const ZERO: SystemDuration = SystemDuration::from_millis(0);
    pub const MAX: SystemDuration = SystemDuration::from_millis(i32::MAX);

    pub const fn from_millis(millis: i32) -> Self {
        SystemDuration { value: millis }
    }

    pub const fn from_secs(secs: i32) -> Self {
        SystemDuration { value: secs * 1000 }
    }

    pub const fn as_millis(self) -> i32 {
        self.value
    }
}

impl Add for SystemDuration {
    type Output = SystemDuration;

    fn add(self, other: SystemDuration) -> SystemDuration {
        SystemDuration { value: self.value.wrapping_add(other.value) }
    }
}

impl Sub for SystemDuration {
    type Output = SystemDuration;

    fn sub(self, other: SystemDuration) -> SystemDuration {
        SystemDuration { value: self.value.wrapping_sub(other.value) }
    }
}

impl Neg for SystemDuration {
    type Output = SystemDuration;

    fn neg(self) -> SystemDuration {
        SystemDuration { value: self.value.wrapping_neg() }
    }
}

/// Time of the node since boot, a wrapping 32-bit millisecond tick.
///
/// Comparisons are by signed distance and only meaningful for times less
/// than 2^31 milliseconds apart, which the sleep queue guarantees.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SystemTime {
    value: u32,
}

impl SystemTime {
    pub const fn from_ticks(ticks: u32) -> Self {
        SystemTime { value: ticks }
    }

    pub const fn ticks(self) -> u32 {
        self.value
    }
}

impl Add<SystemDuration> for SystemTime {
    type Output = SystemTime;

    fn add(self, duration: SystemDuration) -> SystemTime {
        SystemTime { value: self.value.wrapping_add(duration.value as u32) }
    }
}

impl AddAssign<SystemDuration> for SystemTime {
    fn add_assign(&mut self, duration: SystemDuration) {
        *self = *self + duration;
    }
}

impl Sub<SystemDuration> for SystemTime {
    type Output = SystemTime;

    fn sub(self, duration: SystemDuration) -> SystemTime {
        SystemTime { value: self.value.wrapping_sub(duration.value as u32) }
    }
}

impl SubAssign<SystemDuration> for SystemTime {
    fn sub_assign(&mut self, duration: SystemDuration) {
        *self = *self - duration;
    }
}

impl Sub for SystemTime {
    type Output = SystemDuration;

    fn sub(self, other: SystemTime) -> SystemDuration {
        SystemDuration { value: self.value.wrapping_sub(other.value) as i32 }
    }
}

impl PartialOrd for SystemTime {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some((*self - *other).value.cmp(&0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let t = SystemTime::from_ticks(1000);
        assert_eq!(t + SystemDuration::from_secs(2), SystemTime::from_ticks(3000));
        assert_eq!(t - SystemDuration::from_millis(1), SystemTime::from_ticks(999));
        assert_eq!(SystemTime::from_ticks(3000) - t, SystemDuration::from_secs(2));
    }

    #[test]
    fn comparison_wraps() {
        let before = SystemTime::from_ticks(u32::MAX - 10);
        let after = before + SystemDuration::from_millis(20);
        assert_eq!(after.ticks(), 9);
        assert!(before < after);
        assert!(after > before);
        assert_eq!(after - before, SystemDuration::from_millis(20));
    }
}
