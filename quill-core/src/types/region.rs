//! Regions: areas of the screen described as sets of disjoint rectangles.
//!
//! Used for damage accumulation and occlusion. The rectangles of a region
//! never overlap; `add` and `subtract` maintain that property.

use super::geometry::Rect;

/// A set of pairwise disjoint, non-empty rectangles.
///
/// # Examples
///
/// ```
/// use quill_core::types::{Rect, Region};
///
/// let mut region = Region::from_rect(Rect::new(0, 0, 100, 100));
/// region.subtract(Rect::new(50, 50, 100, 100));
/// assert_eq!(
///     region.rects(),
///     &[Rect::new(0, 0, 100, 50), Rect::new(0, 50, 50, 50)]
/// );
/// assert_eq!(region.area(), 7500);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Region::new();
        region.add(rect);
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rect> {
        self.rects.iter()
    }

    /// Total number of pixels covered.
    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Smallest rectangle covering the whole region.
    pub fn bounding_rect(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::default(), |acc, r| acc.united(r))
    }

    pub fn intersects(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|r| r.intersects(rect))
    }

    /// Adds `rect` to the region. Only the parts not already covered are
    /// inserted, so the rectangles stay disjoint.
    pub fn add(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        let mut pieces = vec![rect];
        for existing in &self.rects {
            pieces = pieces
                .into_iter()
                .flat_map(|piece| subtract_rect(piece, existing))
                .collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
        merge_adjacent(&mut self.rects);
    }

    pub fn add_region(&mut self, other: &Region) {
        for rect in &other.rects {
            self.add(*rect);
        }
    }

    /// Removes `sub` from the region, fragmenting rectangles it cuts through.
    pub fn subtract(&mut self, sub: Rect) {
        if sub.is_empty() || self.rects.is_empty() {
            return;
        }
        let rects = std::mem::take(&mut self.rects);
        self.rects = rects
            .into_iter()
            .flat_map(|existing| subtract_rect(existing, &sub))
            .collect();
        merge_adjacent(&mut self.rects);
    }

    pub fn subtract_region(&mut self, other: &Region) {
        for rect in &other.rects {
            self.subtract(*rect);
        }
    }

    /// Clips the region to `clip`.
    pub fn intersect(&mut self, clip: Rect) {
        self.rects = self
            .rects
            .iter()
            .map(|r| r.intersected(&clip))
            .filter(|r| !r.is_empty())
            .collect();
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Region {
        Region {
            rects: self.rects.iter().map(|r| r.translated(dx, dy)).collect(),
        }
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}

/// Splits `existing - sub` into at most four disjoint pieces: full-width
/// bands above and below `sub`, then the left and right slices within the
/// vertical overlap.
fn subtract_rect(existing: Rect, sub: &Rect) -> Vec<Rect> {
    if !existing.intersects(sub) {
        return vec![existing];
    }
    if sub.contains(&existing) {
        return Vec::new();
    }

    let mut pieces = Vec::with_capacity(4);
    if existing.top() < sub.top() {
        pieces.push(Rect::from_edges(
            existing.left(),
            existing.top(),
            existing.right(),
            sub.top(),
        ));
    }
    if existing.bottom() > sub.bottom() {
        pieces.push(Rect::from_edges(
            existing.left(),
            sub.bottom(),
            existing.right(),
            existing.bottom(),
        ));
    }
    let band_top = existing.top().max(sub.top());
    let band_bottom = existing.bottom().min(sub.bottom());
    if band_top < band_bottom {
        if existing.left() < sub.left() {
            pieces.push(Rect::from_edges(
                existing.left(),
                band_top,
                sub.left(),
                band_bottom,
            ));
        }
        if existing.right() > sub.right() {
            pieces.push(Rect::from_edges(
                sub.right(),
                band_top,
                existing.right(),
                band_bottom,
            ));
        }
    }
    pieces
}

/// Merges pairs that share a full edge into one rectangle. Overlapping pairs
/// cannot occur, so only exact adjacency is considered.
fn merge_adjacent(rects: &mut Vec<Rect>) {
    let mut i = 0;
    while i < rects.len() {
        let mut merged = false;
        let mut j = i + 1;
        while j < rects.len() {
            let (a, b) = (rects[i], rects[j]);
            let vertical = a.x == b.x
                && a.width == b.width
                && (a.bottom() == b.top() || b.bottom() == a.top());
            let horizontal = a.y == b.y
                && a.height == b.height
                && (a.right() == b.left() || b.right() == a.left());
            if vertical || horizontal {
                rects[i] = a.united(&b);
                rects.remove(j);
                merged = true;
            } else {
                j += 1;
            }
        }
        if merged {
            i = 0;
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assert_disjoint(region: &Region) {
        let rects = region.rects();
        for (i, a) in rects.iter().enumerate() {
            assert!(!a.is_empty());
            for b in &rects[i + 1..] {
                assert!(!a.intersects(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_occlusion_of_lower_window() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 50, 100, 100);
        let mut region = Region::from_rect(a);
        region.subtract(b);
        assert_eq!(
            region.rects(),
            &[Rect::new(0, 0, 100, 50), Rect::new(0, 50, 50, 50)]
        );
    }

    #[test]
    fn test_subtract_hole_creates_four_pieces() {
        let mut region = Region::from_rect(Rect::new(0, 0, 30, 30));
        region.subtract(Rect::new(10, 10, 10, 10));
        assert_eq!(region.area(), 800);
        assert_eq!(region.rects().len(), 4);
        assert_disjoint(&region);
        assert!(!region.intersects(&Rect::new(10, 10, 10, 10)));
    }

    #[test]
    fn test_subtract_everything() {
        let mut region = Region::from_rect(Rect::new(5, 5, 10, 10));
        region.subtract(Rect::new(0, 0, 100, 100));
        assert!(region.is_empty());
    }

    #[test]
    fn test_add_overlapping_keeps_disjoint() {
        let mut region = Region::new();
        region.add(Rect::new(0, 0, 50, 50));
        region.add(Rect::new(25, 25, 50, 50));
        assert_disjoint(&region);
        assert_eq!(region.area(), 2500 + 2500 - 625);
        assert_eq!(region.bounding_rect(), Rect::new(0, 0, 75, 75));
    }

    #[test]
    fn test_add_covered_rect_is_noop() {
        let mut region = Region::from_rect(Rect::new(0, 0, 100, 100));
        let before = region.clone();
        region.add(Rect::new(10, 10, 10, 10));
        region.add(Rect::default());
        assert_eq!(region, before);
    }

    #[test]
    fn test_adjacent_rects_merge() {
        let mut region = Region::new();
        region.add(Rect::new(0, 0, 10, 10));
        region.add(Rect::new(10, 0, 10, 10));
        region.add(Rect::new(0, 10, 20, 5));
        assert_eq!(region.rects(), &[Rect::new(0, 0, 20, 15)]);
    }

    #[test]
    fn test_intersect_and_translate() {
        let mut region = Region::new();
        region.add(Rect::new(0, 0, 10, 10));
        region.add(Rect::new(20, 0, 10, 10));
        region.intersect(Rect::new(5, 0, 20, 5));
        assert_eq!(
            region.rects(),
            &[Rect::new(5, 0, 5, 5), Rect::new(20, 0, 5, 5)]
        );
        let moved = region.translated(-5, 1);
        assert_eq!(moved.rects()[0], Rect::new(0, 1, 5, 5));
    }

    #[test]
    fn test_subtract_region() {
        let mut screen = Region::from_rect(Rect::new(0, 0, 100, 100));
        let mut covered = Region::new();
        covered.add(Rect::new(0, 0, 100, 40));
        covered.add(Rect::new(0, 60, 100, 40));
        screen.subtract_region(&covered);
        assert_eq!(screen.rects(), &[Rect::new(0, 40, 100, 20)]);
    }
}
