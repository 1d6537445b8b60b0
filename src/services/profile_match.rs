// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Attribute a weight to a profile by weight range.
//!
//! Ranges are expected not to overlap. When they do, the narrowest range
//! wins and ties go to the lowest profile id.

use std::cmp::Ordering;

use crate::models::Profile;

/// Outcome of matching a weight against the profile set.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileMatch<'a> {
    /// Exactly one profile's range contains the weight.
    Matched(&'a Profile),
    /// Several ranges contain the weight; `chosen` won the tie-break.
    Ambiguous {
        chosen: &'a Profile,
        candidates: Vec<u64>,
    },
    /// No range contains the weight.
    Unassigned,
}

impl<'a> ProfileMatch<'a> {
    /// The profile the measurement belongs to, if any.
    pub fn profile(&self) -> Option<&'a Profile> {
        match self {
            ProfileMatch::Matched(p) => Some(p),
            ProfileMatch::Ambiguous { chosen, .. } => Some(chosen),
            ProfileMatch::Unassigned => None,
        }
    }

    pub fn profile_id(&self) -> Option<u64> {
        self.profile().map(|p| p.id)
    }
}

/// Match `weight_kg` against `profiles`.
pub fn match_profile(weight_kg: f64, profiles: &[Profile]) -> ProfileMatch<'_> {
    let mut candidates: Vec<&Profile> = profiles.iter().filter(|p| p.contains(weight_kg)).collect();

    match candidates.len() {
        0 => ProfileMatch::Unassigned,
        1 => ProfileMatch::Matched(candidates[0]),
        _ => {
            candidates.sort_by(|a, b| tie_break(a, b));
            ProfileMatch::Ambiguous {
                chosen: candidates[0],
                candidates: candidates.iter().map(|p| p.id).collect(),
            }
        }
    }
}

/// Narrowest range first, then lowest id.
fn tie_break(a: &Profile, b: &Profile) -> Ordering {
    a.range_width()
        .total_cmp(&b.range_width())
        .then_with(|| a.id.cmp(&b.id))
}

/// Pairs of profiles whose weight ranges overlap, as `(lower_id, higher_id)`.
pub fn find_overlaps(profiles: &[Profile]) -> Vec<(u64, u64)> {
    let mut overlaps = Vec::new();
    for (i, a) in profiles.iter().enumerate() {
        for b in &profiles[i + 1..] {
            if a.min_weight_kg <= b.max_weight_kg && b.min_weight_kg <= a.max_weight_kg {
                overlaps.push((a.id.min(b.id), a.id.max(b.id)));
            }
        }
    }
    overlaps.sort_unstable();
    overlaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;

    fn profile(id: u64, min: f64, max: f64) -> Profile {
        Profile {
            id,
            name: format!("Profile {}", id),
            height_cm: 170,
            age: 30,
            gender: Gender::Male,
            min_weight_kg: min,
            max_weight_kg: max,
        }
    }

    #[test]
    fn test_disjoint_ranges_match_one() {
        let profiles = vec![profile(1, 40.0, 60.0), profile(2, 61.0, 90.0)];
        assert_eq!(
            match_profile(70.0, &profiles),
            ProfileMatch::Matched(&profiles[1])
        );
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let profiles = vec![profile(1, 40.0, 60.0)];
        assert_eq!(match_profile(40.0, &profiles).profile_id(), Some(1));
        assert_eq!(match_profile(60.0, &profiles).profile_id(), Some(1));
    }

    #[test]
    fn test_gap_between_ranges_is_unassigned() {
        let profiles = vec![profile(1, 40.0, 60.0), profile(2, 61.0, 90.0)];
        assert_eq!(match_profile(60.5, &profiles), ProfileMatch::Unassigned);
        assert_eq!(match_profile(120.0, &[]), ProfileMatch::Unassigned);
    }

    #[test]
    fn test_overlap_prefers_narrower_range() {
        let profiles = vec![profile(1, 50.0, 80.0), profile(2, 60.0, 90.0)];
        let result = match_profile(70.0, &profiles);
        // Widths are 30 and 30: equal, so the lower id wins.
        assert_eq!(result.profile_id(), Some(1));

        let profiles = vec![
            profile(1, 60.0, 90.0),
            profile(2, 50.0, 80.0),
            profile(3, 65.0, 75.0),
        ];
        match match_profile(70.0, &profiles) {
            ProfileMatch::Ambiguous { chosen, candidates } => {
                assert_eq!(chosen.id, 3);
                assert_eq!(candidates, vec![3, 1, 2]);
            }
            other => panic!("expected ambiguous match, got {:?}", other),
        }
    }

    #[test]
    fn test_tie_break_is_order_independent() {
        let a = profile(7, 55.0, 85.0);
        let b = profile(4, 60.0, 90.0);
        let forward = match_profile(70.0, &[a.clone(), b.clone()]).profile_id();
        let backward = match_profile(70.0, &[b, a]).profile_id();
        assert_eq!(forward, Some(4));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_find_overlaps() {
        let profiles = vec![
            profile(3, 50.0, 80.0),
            profile(1, 60.0, 90.0),
            profile(2, 91.0, 120.0),
        ];
        assert_eq!(find_overlaps(&profiles), vec![(1, 3)]);
        assert!(find_overlaps(&profiles[2..]).is_empty());
    }
}
