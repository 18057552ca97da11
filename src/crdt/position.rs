//! Dense fractional position identifiers.
//!
//! A position is a non-empty vector of `(digit, node)` identifiers, read as
//! a fraction in base `BASE`: `[3, 17]` is `3/256 + 17/65536`. Positions are
//! totally ordered digit-first, node-second, shorter-prefix-first, and are
//! dense: between any two distinct positions another one can be allocated.
//!
//! The node component does double duty. It breaks ties between digits
//! allocated concurrently by different replicas, and on the final identifier
//! it records the allocator, which is what keeps concurrent allocations
//! between the same neighbors distinct.
//!
//! Invariant violations here (inverted bounds, digit overflow past the most
//! significant place) are local bugs, never remote input, and panic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Radix for position digits. Stored digits are always below `BASE`; only
/// the virtual "after everything" endpoint uses `BASE` itself.
pub const BASE: u32 = 256;

/// Replica identifier. Assumed unique per replica and totally ordered.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One digit of a position vector.
///
/// Field order matters: the derived `Ord` compares digit before node, which
/// is exactly the position total order per element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Identifier {
    pub digit: u32,
    pub node: NodeId,
}

impl Identifier {
    pub fn new(digit: u32, node: NodeId) -> Identifier {
        Identifier { digit, node }
    }
}

// Manual Deserialize so a peer cannot smuggle in digits the allocation
// arithmetic cannot carry; an out-of-range digit is a protocol error and
// fails the frame decode.
impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Identifier, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawIdentifier {
            digit: u32,
            node: NodeId,
        }

        let raw = RawIdentifier::deserialize(deserializer)?;
        if raw.digit >= BASE {
            return Err(serde::de::Error::custom(format!(
                "identifier digit {} outside [0, {BASE})",
                raw.digit,
            )));
        }
        Ok(Identifier::new(raw.digit, raw.node))
    }
}

/// An allocated position: immutable identifier vector.
///
/// The derived `Ord` over the vector (elementwise identifier comparison,
/// then length) is the document total order. The empty position sorts before
/// everything and stands for "document start" in cursor coordinates; stored
/// characters always carry non-empty positions.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(Vec<Identifier>);

impl Position {
    pub fn empty() -> Position {
        Position(Vec::new())
    }

    pub fn identifiers(&self) -> &[Identifier] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<Identifier>> for Position {
    fn from(identifiers: Vec<Identifier>) -> Position {
        Position(identifiers)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}:{}", id.digit, id.node)?;
        }
        write!(f, "]")
    }
}

/// Digit vector of a position, dropping the node tags.
fn digits(identifiers: &[Identifier]) -> Vec<u32> {
    identifiers.iter().map(|id| id.digit).collect()
}

/// `n1 - n2` over left-aligned base-`BASE` fractions, `n1 > n2`.
///
/// Missing digits are zero. A borrow out of the most significant digit is
/// dropped: that is what makes an empty `n1` behave as the virtual upper
/// endpoint (a whole 1.0).
fn subtract_greater_than(n1: &[u32], n2: &[u32]) -> Vec<u32> {
    let len = n1.len().max(n2.len());
    let mut diff = vec![0u32; len];
    let mut borrow = 0u32;
    for i in (0..len).rev() {
        let d1 = i64::from(n1.get(i).copied().unwrap_or(0)) - i64::from(borrow);
        let d2 = i64::from(n2.get(i).copied().unwrap_or(0));
        if d1 < d2 {
            borrow = 1;
            diff[i] = (d1 + i64::from(BASE) - d2) as u32;
        } else {
            borrow = 0;
            diff[i] = (d1 - d2) as u32;
        }
    }
    diff
}

/// `n1 + n2` over left-aligned base-`BASE` fractions.
///
/// Panics if the sum carries past the most significant digit: the allocation
/// increment is always smaller than the gap, so overflow means the caller
/// violated `lo < hi`.
fn add(n1: &[u32], n2: &[u32]) -> Vec<u32> {
    let len = n1.len().max(n2.len());
    let mut sum = vec![0u32; len];
    let mut carry = 0u32;
    for i in (0..len).rev() {
        let s = carry + n1.get(i).copied().unwrap_or(0) + n2.get(i).copied().unwrap_or(0);
        carry = s / BASE;
        sum[i] = s % BASE;
    }
    assert_eq!(carry, 0, "position digit sum overflowed the unit interval");
    sum
}

/// Advance `n1` by an amount strictly smaller than `delta`.
///
/// The increment is one unit at the digit position just past `delta`'s first
/// non-zero digit, re-applied once if the result would end in a zero digit
/// (a trailing zero adds length without adding order information).
///
/// Panics if `delta` is all zeros, i.e. the bounds were equal.
fn increment(n1: &[u32], delta: &[u32]) -> Vec<u32> {
    let first_non_zero = delta
        .iter()
        .position(|&d| d != 0)
        .expect("position delta must contain a non-zero digit");

    let mut inc = vec![0u32; first_non_zero];
    inc.extend_from_slice(&[0, 1]);

    let mut next = add(n1, &inc);
    if next.last() == Some(&0) {
        next = add(&next, &inc);
    }
    next
}

/// Re-tag a digit vector with node ids.
///
/// Digits copied unchanged from a bound keep that bound's node; fresh digits
/// and always the final digit carry the allocator's node.
fn wrap_identifiers(
    digits: Vec<u32>,
    before: &[Identifier],
    after: &[Identifier],
    node: NodeId,
) -> Position {
    let last = digits.len() - 1;
    let identifiers = digits
        .into_iter()
        .enumerate()
        .map(|(i, digit)| {
            if i == last {
                Identifier::new(digit, node)
            } else if before.get(i).is_some_and(|id| id.digit == digit) {
                Identifier::new(digit, before[i].node)
            } else if after.get(i).is_some_and(|id| id.digit == digit) {
                Identifier::new(digit, after[i].node)
            } else {
                Identifier::new(digit, node)
            }
        })
        .collect();
    Position(identifiers)
}

/// Allocate a position strictly between `lo` and `hi` for `node`.
///
/// An empty `lo` means "before everything" (virtual leading digit 0); an
/// empty `hi` means "after everything" (virtual leading digit `BASE`). The
/// result always ends in an identifier tagged with `node`, so concurrent
/// allocations between the same neighbors on different replicas never
/// collide.
///
/// Panics when `lo >= hi` under the position order: that is a broken caller,
/// not a recoverable condition.
pub fn generate_position_between(lo: &[Identifier], hi: &[Identifier], node: NodeId) -> Position {
    // Both sides virtual: the whole unit interval is free. Seed with the
    // same single-digit shape from_text uses.
    if lo.is_empty() && hi.is_empty() {
        return Position(vec![Identifier::new(1, node)]);
    }

    let head_lo = lo
        .first()
        .copied()
        .unwrap_or_else(|| Identifier::new(0, node));
    let head_hi = hi
        .first()
        .copied()
        .unwrap_or_else(|| Identifier::new(BASE, node));

    if head_lo.digit != head_hi.digit {
        assert!(
            head_lo.digit < head_hi.digit,
            "position bounds inverted: {} !< {}",
            head_lo.digit,
            head_hi.digit,
        );
        let n1 = digits(lo);
        let n2 = digits(hi);
        let delta = subtract_greater_than(&n2, &n1);
        let next = increment(&n1, &delta);
        wrap_identifiers(next, lo, hi, node)
    } else if lo.is_empty() {
        // The virtual low head collided with a real zero digit. The node on
        // the virtual side is ours, not an ordering claim, so it must not
        // be compared against hi's; stay below hi either with a fresh
        // smaller head or by descending under hi's own head.
        if node < head_hi.node {
            let mut identifiers = vec![Identifier::new(0, node)];
            identifiers.extend(generate_position_between(&[], &[], node).0);
            Position(identifiers)
        } else {
            // a zero digit is never last, so hi has a tail to descend into
            let mut identifiers = vec![head_hi];
            identifiers.extend(generate_position_between(&[], &hi[1..], node).0);
            Position(identifiers)
        }
    } else if head_lo.node < head_hi.node {
        // Same digit, different replicas: everything under lo's head is
        // still below hi, so descend with an open upper bound.
        let mut identifiers = vec![head_lo];
        identifiers.extend(generate_position_between(&lo[1..], &[], node).0);
        Position(identifiers)
    } else if head_lo.node == head_hi.node {
        // equal digits rule out a virtual upper head, so hi is non-empty
        let mut identifiers = vec![head_lo];
        identifiers.extend(generate_position_between(&lo[1..], &hi[1..], node).0);
        Position(identifiers)
    } else {
        panic!(
            "position bounds inverted: node {} !< {} at equal digit {}",
            head_lo.node, head_hi.node, head_lo.digit,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(ids: &[(u32, u64)]) -> Position {
        Position(
            ids.iter()
                .map(|&(digit, node)| Identifier::new(digit, NodeId(node)))
                .collect(),
        )
    }

    fn between(lo: &Position, hi: &Position, node: u64) -> Position {
        generate_position_between(lo.identifiers(), hi.identifiers(), NodeId(node))
    }

    #[test]
    fn ordering_digit_then_node_then_length() {
        assert!(pos(&[(1, 1)]) < pos(&[(2, 1)]));
        assert!(pos(&[(1, 1)]) < pos(&[(1, 2)]));
        assert!(pos(&[(1, 1)]) < pos(&[(1, 1), (0, 1)]));
        assert!(Position::empty() < pos(&[(0, 1)]));
    }

    #[test]
    fn subtract_borrows_through_implicit_zeros() {
        // [1,0,0] - [0,1,1] = [0,254,255]
        assert_eq!(subtract_greater_than(&[1], &[0, 1, 1]), vec![0, 254, 255]);
    }

    #[test]
    fn subtract_empty_minuend_wraps_to_one() {
        // virtual upper endpoint: 1.0 - 5/256 = 251/256
        assert_eq!(subtract_greater_than(&[], &[5]), vec![251]);
    }

    #[test]
    #[should_panic(expected = "overflowed")]
    fn add_overflow_panics() {
        add(&[255], &[1]);
    }

    #[test]
    fn increment_avoids_trailing_zero() {
        // [5,255] + [0,1] would end in zero; applied twice lands on [6,1]
        assert_eq!(increment(&[5, 255], &[1, 1]), vec![6, 1]);
    }

    #[test]
    fn allocates_between_adjacent_digits() {
        let lo = pos(&[(5, 1)]);
        let hi = pos(&[(6, 2)]);
        let mid = between(&lo, &hi, 3);
        assert!(lo < mid && mid < hi, "{lo} < {mid} < {hi}");
        // prefix digit reuses lo's node; final identifier carries the allocator
        assert_eq!(mid.identifiers()[0], Identifier::new(5, NodeId(1)));
        assert_eq!(mid.identifiers().last().unwrap().node, NodeId(3));
    }

    #[test]
    fn allocates_between_same_digit_different_nodes() {
        // no digit gap at all, but anything extending [(5,1)] still sorts
        // below [(5,2)]
        let lo = pos(&[(5, 1)]);
        let hi = pos(&[(5, 2)]);
        let mid = between(&lo, &hi, 3);
        assert!(lo < mid && mid < hi, "{lo} < {mid} < {hi}");
    }

    #[test]
    fn allocates_under_shared_prefix() {
        let lo = pos(&[(5, 1)]);
        let hi = pos(&[(5, 1), (7, 2)]);
        let mid = between(&lo, &hi, 3);
        assert!(lo < mid && mid < hi, "{lo} < {mid} < {hi}");
    }

    #[test]
    fn allocates_at_virtual_endpoints() {
        let only = pos(&[(10, 1)]);
        let before = between(&Position::empty(), &only, 2);
        let after = between(&only, &Position::empty(), 2);
        assert!(before < only, "{before} < {only}");
        assert!(only < after, "{only} < {after}");

        let seed = between(&Position::empty(), &Position::empty(), 2);
        assert_eq!(seed, pos(&[(1, 2)]));
    }

    #[test]
    fn zero_digit_upper_bound_with_any_allocator_node() {
        // hi starts with a real zero digit; allocator nodes on either side
        // of hi's node must both find room below it
        let hi = pos(&[(0, 2), (7, 1)]);
        for allocator in [1, 2, 5] {
            let mid = between(&Position::empty(), &hi, allocator);
            assert!(mid < hi, "node {allocator}: {mid} < {hi}");
            assert!(!mid.is_empty());
        }

        // the same shape one level down, under a shared prefix
        let lo = pos(&[(5, 3)]);
        let deep_hi = pos(&[(5, 3), (0, 2), (7, 1)]);
        for allocator in [1, 2, 5] {
            let mid = between(&lo, &deep_hi, allocator);
            assert!(lo < mid && mid < deep_hi, "node {allocator}: {lo} < {mid} < {deep_hi}");
        }
    }

    #[test]
    fn concurrent_allocations_differ_by_node_tag() {
        let lo = pos(&[(1, 1)]);
        let hi = pos(&[(2, 1)]);
        let a = between(&lo, &hi, 10);
        let b = between(&lo, &hi, 20);
        assert_ne!(a, b);
        assert!(lo < a && a < hi);
        assert!(lo < b && b < hi);
    }

    #[test]
    fn repeated_halving_stays_ordered() {
        // Squeeze 100 positions into the same gap; order must stay strict.
        let mut lo = pos(&[(1, 1)]);
        let hi = pos(&[(2, 1)]);
        for round in 0..100 {
            let mid = between(&lo, &hi, 7);
            assert!(lo < mid && mid < hi, "round {round}: {lo} < {mid} < {hi}");
            lo = mid;
        }
    }

    #[test]
    fn rejects_out_of_range_digit_on_decode() {
        let err = serde_json::from_str::<Identifier>(r#"{"digit":256,"node":1}"#).unwrap_err();
        assert!(err.to_string().contains("outside"));
        let ok: Identifier = serde_json::from_str(r#"{"digit":255,"node":1}"#).unwrap();
        assert_eq!(ok, Identifier::new(255, NodeId(1)));
    }

    #[test]
    #[should_panic(expected = "bounds inverted")]
    fn inverted_bounds_panic() {
        let lo = pos(&[(5, 2)]);
        let hi = pos(&[(5, 1)]);
        between(&lo, &hi, 3);
    }
}
