//! Guo-Hall topological thinning.
//!
//! Each iteration runs two sub-iterations; every sub-iteration marks the
//! boundary pixels whose removal keeps the shape connected and does not
//! shorten a stroke end, then deletes them all at once. The loop stops at
//! the fixed point (an iteration that deletes nothing) or when the time
//! budget runs out. Pixels outside the image count as background.

use crate::budget::TraceContext;
use crate::raster::BinaryMask;

/// Result of [`thin`].
#[derive(Debug, Clone)]
pub struct ThinningOutcome {
    /// The one-pixel-wide skeleton.
    pub skeleton: BinaryMask,
    /// Full iterations completed.
    pub iterations: u32,
    /// Whether the fixed point was reached.
    pub converged: bool,
}

/// Thin `mask` to a one-pixel-wide skeleton.
#[must_use = "returns the skeleton"]
pub fn thin(mask: &BinaryMask, ctx: &mut TraceContext) -> ThinningOutcome {
    let mut skeleton = mask.clone();
    let mut iterations = 0;
    loop {
        if ctx.is_exhausted() {
            ctx.timeout("thinning");
            return ThinningOutcome {
                skeleton,
                iterations,
                converged: false,
            };
        }
        let removed = sub_iteration(&mut skeleton, false) + sub_iteration(&mut skeleton, true);
        iterations += 1;
        if removed == 0 {
            return ThinningOutcome {
                skeleton,
                iterations,
                converged: true,
            };
        }
    }
}

/// Delete every pixel that qualifies in this sub-iteration; returns the
/// number deleted.
fn sub_iteration(mask: &mut BinaryMask, odd: bool) -> usize {
    let current = &*mask;
    let marked = BinaryMask::par_from_rows(current.width(), current.height(), |y, row| {
        for (x, out) in (0u32..).zip(row.iter_mut()) {
            *out = current.get(x, y) && deletable(current, i64::from(x), i64::from(y), odd);
        }
    });
    let marked: Vec<(u32, u32)> = marked.foreground().collect();
    for &(x, y) in &marked {
        mask.set(x, y, false);
    }
    marked.len()
}

/// The Guo-Hall deletion test for the pixel at `(x, y)`.
///
/// Neighbours are named clockwise from north: `p2` N, `p3` NE, `p4` E,
/// `p5` SE, `p6` S, `p7` SW, `p8` W, `p9` NW.
fn deletable(mask: &BinaryMask, x: i64, y: i64, odd: bool) -> bool {
    let at = |dx: i64, dy: i64| u8::from(mask.get_signed(x + dx, y + dy));
    let (p2, p3, p4, p5) = (at(0, -1), at(1, -1), at(1, 0), at(1, 1));
    let (p6, p7, p8, p9) = (at(0, 1), at(-1, 1), at(-1, 0), at(-1, -1));
    let not = |p: u8| 1 - p;

    let c = (not(p2) & (p3 | p4))
        + (not(p4) & (p5 | p6))
        + (not(p6) & (p7 | p8))
        + (not(p8) & (p9 | p2));
    let n1 = (p9 | p2) + (p3 | p4) + (p5 | p6) + (p7 | p8);
    let n2 = (p2 | p3) + (p4 | p5) + (p6 | p7) + (p8 | p9);
    let n = n1.min(n2);
    let m = if odd {
        (p2 | p3 | not(p5)) & p4
    } else {
        (p6 | p7 | not(p9)) & p8
    };
    c == 1 && (2..=3).contains(&n) && m == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::TimeBudget;

    fn bar(w: u32, h: u32, x0: u32, x1: u32, y0: u32, y1: u32) -> BinaryMask {
        BinaryMask::from_fn(w, h, |x, y| (x0..x1).contains(&x) && (y0..y1).contains(&y))
    }

    fn is_one_pixel_wide(mask: &BinaryMask) -> bool {
        // No 2x2 block is fully set.
        (0..mask.height().saturating_sub(1)).all(|y| {
            (0..mask.width().saturating_sub(1)).all(|x| {
                !(mask.get(x, y) && mask.get(x + 1, y) && mask.get(x, y + 1) && mask.get(x + 1, y + 1))
            })
        })
    }

    #[test]
    fn thick_bar_thins_to_a_line() {
        let mask = bar(40, 20, 5, 35, 7, 13);
        let mut ctx = TraceContext::unlimited();
        let outcome = thin(&mask, &mut ctx);
        assert!(outcome.converged);
        assert!(is_one_pixel_wide(&outcome.skeleton));
        let count = outcome.skeleton.count();
        assert!((15..=32).contains(&count), "{count} skeleton pixels");
        // Stays inside the original shape.
        assert!(outcome.skeleton.foreground().all(|(x, y)| mask.get(x, y)));
    }

    #[test]
    fn thinning_is_idempotent() {
        let mask = BinaryMask::from_fn(50, 50, |x, y| {
            let dx = f64::from(x) - 25.0;
            let dy = f64::from(y) - 25.0;
            let r = dx.hypot(dy);
            (8.0..14.0).contains(&r) || ((20..30).contains(&x) && y < 12)
        });
        let mut ctx = TraceContext::unlimited();
        let once = thin(&mask, &mut ctx);
        let twice = thin(&once.skeleton, &mut ctx);
        assert_eq!(once.skeleton, twice.skeleton);
        assert_eq!(twice.iterations, 1);
    }

    #[test]
    fn single_line_is_untouched() {
        let mask = bar(20, 5, 2, 18, 2, 3);
        let mut ctx = TraceContext::unlimited();
        let outcome = thin(&mask, &mut ctx);
        assert_eq!(outcome.skeleton, mask);
    }

    #[test]
    fn ring_stays_connected() {
        let mask = BinaryMask::from_fn(30, 30, |x, y| {
            let outer = (5..25).contains(&x) && (5..25).contains(&y);
            let inner = (8..22).contains(&x) && (8..22).contains(&y);
            outer && !inner
        });
        let mut ctx = TraceContext::unlimited();
        let skeleton = thin(&mask, &mut ctx).skeleton;
        // Both vertical sides of the band still carry the skeleton on every
        // row between the horizontal sides.
        assert!((8..22).all(|y| (5..8).any(|x| skeleton.get(x, y))));
        assert!((8..22).all(|y| (22..25).any(|x| skeleton.get(x, y))));
        assert!((8..22).all(|x| (5..8).any(|y| skeleton.get(x, y))));
    }

    #[test]
    fn exhausted_budget_returns_input() {
        let mask = bar(20, 20, 2, 18, 2, 18);
        let mut ctx = TraceContext::new(TimeBudget::new(0));
        let outcome = thin(&mask, &mut ctx);
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.skeleton, mask);
        assert!(ctx.is_partial());
    }
}
