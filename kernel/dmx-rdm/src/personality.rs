//! DMX personalities: named (footprint, description) pairs a port can be
//! switched between via `DMX_PERSONALITY`.

use heapless::String;

/// Maximum length of a personality's human-readable description.
pub const DESCRIPTION_MAX: usize = 32;

/// One entry in a port's personality list.
///
/// Personalities are 1-indexed on the wire (`DMX_PERSONALITY` GET/SET);
/// index 0 is reserved and never assigned to a real entry.
#[derive(Debug, Clone)]
pub struct Personality {
    footprint: u16,
    description: String<DESCRIPTION_MAX>,
}

impl Personality {
    /// Creates a personality, truncating `description` to
    /// [`DESCRIPTION_MAX`] bytes if necessary.
    ///
    /// Returns `None` if `footprint` is outside `1..=512`.
    #[must_use]
    pub fn new(footprint: u16, description: &str) -> Option<Self> {
        if footprint == 0 || footprint > 512 {
            return None;
        }
        let mut s = String::new();
        for ch in description.chars() {
            if s.push(ch).is_err() {
                break;
            }
        }
        Some(Self {
            footprint,
            description: s,
        })
    }

    /// Number of DMX slots this personality occupies (1..=512).
    #[must_use]
    pub const fn footprint(&self) -> u16 {
        self.footprint
    }

    /// Human-readable description, truncated to [`DESCRIPTION_MAX`] bytes.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_footprint() {
        assert!(Personality::new(0, "invalid").is_none());
    }

    #[test]
    fn rejects_footprint_above_512() {
        assert!(Personality::new(513, "invalid").is_none());
    }

    #[test]
    fn accepts_boundary_footprints() {
        assert!(Personality::new(1, "one slot").is_some());
        assert!(Personality::new(512, "full universe").is_some());
    }

    #[test]
    fn truncates_long_description() {
        let long = "x".repeat(100);
        let p = Personality::new(4, &long).unwrap();
        assert_eq!(p.description().len(), DESCRIPTION_MAX);
    }
}
