//! WASI status codes and stub policy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Guest-visible status codes (WASI preview 1 numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Errno {
    Success = 0,
    BadFileDescriptor = 8,
    Fault = 21,
    InvalidArgument = 28,
    NotImplemented = 52,
}

impl Errno {
    pub fn raw(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Errno::Success => write!(f, "success"),
            Errno::BadFileDescriptor => write!(f, "badf"),
            Errno::Fault => write!(f, "fault"),
            Errno::InvalidArgument => write!(f, "inval"),
            Errno::NotImplemented => write!(f, "nosys"),
        }
    }
}

/// Status every stub handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StubPolicy {
    /// Pretend the call worked
    #[default]
    Succeed,
    /// Report `NotImplemented`
    NotImplemented,
}

impl StubPolicy {
    pub fn errno(self) -> Errno {
        match self {
            StubPolicy::Succeed => Errno::Success,
            StubPolicy::NotImplemented => Errno::NotImplemented,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_codes() {
        assert_eq!(Errno::Success.raw(), 0);
        assert_eq!(Errno::BadFileDescriptor.raw(), 8);
        assert_eq!(Errno::Fault.raw(), 21);
        assert_eq!(Errno::InvalidArgument.raw(), 28);
        assert_eq!(Errno::NotImplemented.raw(), 52);
    }

    #[test]
    fn test_stub_policy() {
        assert_eq!(StubPolicy::default().errno(), Errno::Success);
        assert_eq!(StubPolicy::NotImplemented.errno(), Errno::NotImplemented);

        let policy: StubPolicy = serde_json::from_str("\"not-implemented\"").unwrap();
        assert_eq!(policy, StubPolicy::NotImplemented);
    }
}
