//! Runtime version descriptors
//!
//! Version strings such as `1.8.0_202` are split on `.` and `_` into up
//! to ten numeric components; missing components compare as zero, so
//! `1.8` and `1.8.0` are equal.

use std::cmp::Ordering;
use std::fmt;

const MAX_COMPONENTS: usize = 10;

/// A parsed runtime version.
#[derive(Debug, Clone)]
pub struct VersionDescriptor {
    text: String,
    components: [u32; MAX_COMPONENTS],
    specified: usize,
}

impl VersionDescriptor {
    pub fn parse(text: &str) -> Self {
        let mut components = [0u32; MAX_COMPONENTS];
        let mut specified = 0;
        for (slot, part) in components.iter_mut().zip(text.split(['.', '_'])) {
            *slot = leading_number(part);
            specified += 1;
        }
        VersionDescriptor {
            text: text.to_string(),
            components,
            specified,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Upper-bound form of this version: components the text leaves
    /// unspecified compare as the maximum, so the bound `1.8` admits
    /// every `1.8.x` release while still excluding `1.9`.
    pub fn as_max_bound(&self) -> VersionDescriptor {
        let mut components = self.components;
        for slot in components.iter_mut().skip(self.specified) {
            *slot = u32::MAX;
        }
        VersionDescriptor {
            text: self.text.clone(),
            components,
            specified: MAX_COMPONENTS,
        }
    }
}

/// Numeric prefix of a component; `8u` parses as 8, a non-numeric
/// component as 0.
fn leading_number(part: &str) -> u32 {
    let digits: &str = part
        .split_once(|c: char| !c.is_ascii_digit())
        .map_or(part, |(d, _)| d);
    digits.parse().unwrap_or(0)
}

impl PartialEq for VersionDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for VersionDescriptor {}

impl PartialOrd for VersionDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> VersionDescriptor {
        VersionDescriptor::parse(s)
    }

    #[test]
    fn test_total_order() {
        assert!(v("1.8.0_202") > v("1.8.0_45"));
        assert!(v("1.8.0_45") > v("1.7.0"));
        assert!(v("9.0") > v("1.8.0_202"));
        assert!(v("11") > v("9.0.1"));
    }

    #[test]
    fn test_missing_components_compare_as_zero() {
        assert_eq!(v("1.8"), v("1.8.0"));
        assert_eq!(v("1.8"), v("1.8.0.0.0"));
        assert!(v("1.8.0_1") > v("1.8"));
    }

    #[test]
    fn test_leading_digits_only() {
        assert_eq!(v("1.8u"), v("1.8"));
        assert_eq!(v("1.beta"), v("1.0"));
    }

    #[test]
    fn test_max_bound_admits_unspecified_tail() {
        let bound = v("1.8").as_max_bound();
        assert!(v("1.8.0_202") <= bound);
        assert!(v("1.8") <= bound);
        assert!(v("1.9") > bound);
        // A fully specified bound stays strict.
        assert!(v("1.8.0_202") > v("1.8.0_45").as_max_bound());
    }

    #[test]
    fn test_display_preserves_original_text() {
        assert_eq!(v("1.8.0_202").to_string(), "1.8.0_202");
    }
}
