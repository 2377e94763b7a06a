//! Rectangles (and the degenerate case, points) used by spatial indexes, plus
//! their textual codec.
//!
//! Wire format: `[a b c]` is a point (`min == max`, 3 dimensions); `[a b],[c
//! d]` is a box with `min = (a, b)`, `max = (c, d)`. Dimensionality ranges
//! from 1 to 20 (spec.md §2/§3); the rest of the crate (`spatial.rs`) maps
//! that onto a fixed-size array for use with the R-tree container.
use crate::error::ParseRectError;

pub const MAX_DIMENSIONS: usize = 20;

/// An axis-aligned hyper-rectangle, 1 to 20 dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl Rect {
    /// Builds a rectangle from explicit min/max corners. Panics if the
    /// dimensions mismatch or fall outside 1..=20 — this is a programming
    /// error at the call site (e.g. a `rect_of` extractor), not a runtime
    /// condition to recover from.
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Self {
        assert_eq!(min.len(), max.len(), "rect min/max dimension mismatch");
        assert!(
            !min.is_empty() && min.len() <= MAX_DIMENSIONS,
            "rect dimensionality must be 1..=20, got {}",
            min.len()
        );
        Rect { min, max }
    }

    /// A degenerate rectangle whose min and max corners coincide.
    pub fn point(coords: Vec<f64>) -> Self {
        Rect::new(coords.clone(), coords)
    }

    pub fn dims(&self) -> usize {
        self.min.len()
    }

    pub fn is_point(&self) -> bool {
        self.min == self.max
    }

    /// True if `self` and `other` intersect on every shared axis. Rects
    /// compared this way must share dimensionality — callers only ever
    /// compare rects drawn from the same spatial index, whose `rect_of`
    /// always returns the same arity.
    pub fn intersects(&self, other: &Rect) -> bool {
        if self.dims() != other.dims() {
            return false;
        }
        (0..self.dims()).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    pub fn to_string_repr(&self) -> String {
        if self.is_point() {
            format!("[{}]", join(&self.min))
        } else {
            format!("[{}],[{}]", join(&self.min), join(&self.max))
        }
    }

    /// Parses the `[a b c]` / `[a b],[c d]` textual form.
    pub fn parse(s: &str) -> Result<Rect, ParseRectError> {
        let s = s.trim();
        let parts: Vec<&str> = split_groups(s)?;
        match parts.len() {
            1 => {
                let coords = parse_group(parts[0])?;
                Ok(Rect::point(coords))
            }
            2 => {
                let min = parse_group(parts[0])?;
                let max = parse_group(parts[1])?;
                if min.len() != max.len() {
                    return Err(ParseRectError(format!(
                        "min/max dimension mismatch in {s:?}"
                    )));
                }
                Ok(Rect::new(min, max))
            }
            _ => Err(ParseRectError(format!("too many groups in {s:?}"))),
        }
    }
}

fn join(v: &[f64]) -> String {
    v.iter()
        .map(|f| format_coord(*f))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_coord(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

/// Splits `"[a b],[c d]"` into `["a b", "c d"]`, or `"[a b c]"` into
/// `["a b c"]`.
fn split_groups(s: &str) -> Result<Vec<&str>, ParseRectError> {
    let mut groups = Vec::new();
    let mut rest = s;
    loop {
        let rest_trimmed = rest.trim_start_matches(',').trim();
        if rest_trimmed.is_empty() {
            break;
        }
        let open = rest_trimmed
            .strip_prefix('[')
            .ok_or_else(|| ParseRectError(s.to_string()))?;
        let close = open
            .find(']')
            .ok_or_else(|| ParseRectError(s.to_string()))?;
        groups.push(&open[..close]);
        rest = &open[close + 1..];
        if rest.trim().is_empty() {
            break;
        }
    }
    if groups.is_empty() {
        return Err(ParseRectError(s.to_string()));
    }
    Ok(groups)
}

fn parse_group(group: &str) -> Result<Vec<f64>, ParseRectError> {
    let coords: Result<Vec<f64>, _> = group
        .split_whitespace()
        .map(|tok| tok.parse::<f64>())
        .collect();
    let coords = coords.map_err(|_| ParseRectError(group.to_string()))?;
    if coords.is_empty() || coords.len() > MAX_DIMENSIONS {
        return Err(ParseRectError(group.to_string()));
    }
    Ok(coords)
}

/// `Point(v...)` shorthand for `min == max == v`.
pub fn point(coords: Vec<f64>) -> Rect {
    Rect::point(coords)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_point() {
        let r = Rect::parse("[-112.5 33.4 10]").unwrap();
        assert!(r.is_point());
        assert_eq!(r.min, vec![-112.5, 33.4, 10.0]);
    }

    #[test]
    fn parses_box() {
        let r = Rect::parse("[-117 30],[-112 36]").unwrap();
        assert!(!r.is_point());
        assert_eq!(r.min, vec![-117.0, 30.0]);
        assert_eq!(r.max, vec![-112.0, 36.0]);
    }

    #[test]
    fn round_trips_through_display() {
        let r = Rect::new(vec![-117.0, 30.0], vec![-112.0, 36.0]);
        let s = r.to_string_repr();
        let back = Rect::parse(&s).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn point_round_trips() {
        let r = Rect::point(vec![1.0, 2.0, 3.0]);
        let s = r.to_string_repr();
        assert_eq!(s, "[1 2 3]");
        assert_eq!(Rect::parse(&s).unwrap(), r);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Rect::parse("not a rect").is_err());
        assert!(Rect::parse("[1 2],[1]").is_err());
    }

    #[test]
    fn intersects_matches_axis_overlap() {
        let a = Rect::new(vec![0.0, 0.0], vec![10.0, 10.0]);
        let b = Rect::new(vec![5.0, 5.0], vec![15.0, 15.0]);
        let c = Rect::new(vec![20.0, 20.0], vec![30.0, 30.0]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
