//! Strongly-typed rank and tag identifiers.

use std::fmt;

/// Identifies a communication endpoint (a process or logical partner).
///
/// Ranks are dense integers assigned by the domain-decomposition layer;
/// `Rank(n)` is the n-th endpoint of the communicator the subsystem was
/// constructed with. "No further completions this cycle" is expressed as
/// `Option<Rank>` being `None`, not as a sentinel value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rank(pub u32);

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Rank {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Integer namespace separating concurrently active message streams.
///
/// Two buffer systems sharing one communicator must use distinct tags,
/// otherwise their messages cross-talk. This is a caller contract; it is
/// not enforced internally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u32);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Tag {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_display_and_from() {
        let r: Rank = 3u32.into();
        assert_eq!(r, Rank(3));
        assert_eq!(format!("{r}"), "3");
    }

    #[test]
    fn tag_ordering() {
        assert!(Tag(1) < Tag(2));
        assert_eq!(format!("{}", Tag(7)), "7");
    }
}
