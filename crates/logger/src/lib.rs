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

//! Logging facade.
//!
//! Statements compile to nothing unless the `log` (host) or `defmt`
//! (embedded) feature is enabled. Enable at most one.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "defmt")]
pub use defmt::{Debug2Format, Display2Format, debug, error, flush, info, panic, trace, warn};
#[cfg(feature = "log")]
pub use log::{debug, error, info, trace, warn};
#[cfg(not(feature = "defmt"))]
pub use no_defmt::*;

#[cfg(not(feature = "defmt"))]
mod no_defmt {
    use core::fmt::{Debug, Display, Formatter, Result};
    pub use core::panic;

    /// Adapter to format a `Debug` value where `defmt` would need a wrapper.
    pub struct Debug2Format<T>(pub T);
    impl<T: Debug> Display for Debug2Format<T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> Result {
            self.0.fmt(f)
        }
    }

    /// Adapter to format a `Display` value where `defmt` would need a wrapper.
    pub struct Display2Format<T>(pub T);
    impl<T: Display> Display for Display2Format<T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> Result {
            self.0.fmt(f)
        }
    }
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
mod off {
    #[macro_export]
    macro_rules! trace {
        ($($args: expr),*$(,)?) => { if false { $(let _ = $args;)* } };
    }

    #[macro_export]
    macro_rules! debug {
        ($($args: expr),*$(,)?) => { if false { $(let _ = $args;)* } };
    }

    #[macro_export]
    macro_rules! info {
        ($($args: expr),*$(,)?) => { if false { $(let _ = $args;)* } };
    }

    #[macro_export]
    macro_rules! warn {
        ($($args: expr),*$(,)?) => { if false { $(let _ = $args;)* } };
    }

    #[macro_export]
    macro_rules! error {
        ($($args: expr),*$(,)?) => { if false { $(let _ = $args;)* } };
    }
}

#[cfg(feature = "log")]
pub fn flush() {
    log::logger().flush();
}
#[cfg(not(any(feature = "log", feature = "defmt")))]
pub fn flush() {}
