use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// A half-open, 0-based index range. Open ends are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<usize>,
    pub stop: Option<usize>,
}

impl Slice {
    fn indices(&self, len: usize) -> std::ops::Range<usize> {
        let start = self.start.unwrap_or(0).min(len);
        let stop = self.stop.unwrap_or(len).min(len);
        start..stop.max(start)
    }
}

/// A page selector such as `3,5-7,9-` over 1-based ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageSelection {
    slices: Vec<Slice>,
}

impl PageSelection {
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// The selected 1-based ids among `1..=len`.
    pub fn resolve(&self, len: usize) -> BTreeSet<usize> {
        self.slices
            .iter()
            .flat_map(|slice| slice.indices(len))
            .map(|index| index + 1)
            .collect()
    }

    pub fn contains(&self, id: usize) -> bool {
        id >= 1
            && self.slices.iter().any(|s| {
                s.start.is_none_or(|start| id > start) && s.stop.is_none_or(|stop| id <= stop)
            })
    }
}

fn parse_id(part: &str, original: &str) -> Result<usize, ConfigError> {
    match part.trim().parse::<usize>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ConfigError::InvalidPages(original.to_string())),
    }
}

impl FromStr for PageSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut slices = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let slice = match part.split_once('-') {
                None => {
                    let id = parse_id(part, s)?;
                    Slice {
                        start: Some(id - 1),
                        stop: Some(id),
                    }
                }
                Some((lo, hi)) => {
                    let start = match lo.trim() {
                        "" => None,
                        lo => Some(parse_id(lo, s)? - 1),
                    };
                    let stop = match hi.trim() {
                        "" => None,
                        hi => Some(parse_id(hi, s)?),
                    };
                    if start.is_none() && stop.is_none() {
                        return Err(ConfigError::InvalidPages(s.to_string()));
                    }
                    Slice { start, stop }
                }
            };
            slices.push(slice);
        }
        Ok(PageSelection { slices })
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .slices
            .iter()
            .map(|s| match (s.start, s.stop) {
                (Some(a), Some(b)) if b == a + 1 => b.to_string(),
                (Some(a), Some(b)) => format!("{}-{}", a + 1, b),
                (Some(a), None) => format!("{}-", a + 1),
                (None, Some(b)) => format!("-{}", b),
                (None, None) => String::new(),
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_ids() {
        let pages: PageSelection = "3,5,7".parse().unwrap();
        assert_eq!(
            pages.slices()[0],
            Slice {
                start: Some(2),
                stop: Some(3)
            }
        );
        assert_eq!(
            pages.resolve(10).into_iter().collect::<Vec<_>>(),
            vec![3, 5, 7]
        );
    }

    #[test]
    fn test_ranges() {
        let pages: PageSelection = "-2,4-5,9-".parse().unwrap();
        assert_eq!(
            pages.resolve(10).into_iter().collect::<Vec<_>>(),
            vec![1, 2, 4, 5, 9, 10]
        );
        assert!(pages.contains(1));
        assert!(!pages.contains(3));
        assert!(pages.contains(10));
        assert!(pages.contains(42));
    }

    #[test]
    fn test_out_of_bounds_is_clamped() {
        let pages: PageSelection = "8-12".parse().unwrap();
        assert_eq!(pages.resolve(9).into_iter().collect::<Vec<_>>(), vec![8, 9]);
    }

    #[test]
    fn test_display() {
        let pages: PageSelection = "3, 5-7 ,9-,-2".parse().unwrap();
        assert_eq!(pages.to_string(), "3,5-7,9-,-2");
    }

    #[test]
    fn test_invalid() {
        assert!("0".parse::<PageSelection>().is_err());
        assert!("a-b".parse::<PageSelection>().is_err());
        assert!("-".parse::<PageSelection>().is_err());
        assert!("".parse::<PageSelection>().unwrap().is_empty());
    }
}
