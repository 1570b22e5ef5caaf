//! A thin `Deref`-to-`std::time::Duration` newtype so certificate validity
//! periods can be expressed in whole days without pulling in a calendar
//! library, mirroring the small time-helper types the teacher workspace
//! keeps next to its PKI code.

use std::ops::Deref;
use std::time::Duration as StdDuration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Duration(StdDuration);

impl Duration {
    pub const fn from_days_unchecked(days: u64) -> Self {
        Self(StdDuration::from_secs(days * 24 * 60 * 60))
    }
}

impl Deref for Duration {
    type Target = StdDuration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
