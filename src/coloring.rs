//! Element coloring for conflict-free parallel scatter-add.
//!
//! Two elements that share a global slot can not accumulate into the L-vector concurrently
//! without synchronization. A coloring partitions the elements into classes such that no two
//! elements in the same class share a slot. Classes are processed one after the other, while
//! the elements within a class can be processed in parallel.
use crate::index_map::IndexMap;
use fenris_nested_vec::NestedVec;
use fenris_paradis::coloring::sequential_greedy_coloring;
use fenris_paradis::DisjointSubsets;
use serde::{Deserialize, Serialize};

/// A partition of elements into classes of pairwise slot-disjoint elements.
///
/// Each class is a set of [`DisjointSubsets`] over L-vector entries. The subset of an element
/// is labeled with the element index and holds the entries `s * index + c` of its slots,
/// ordered slot-major: entry `k` of the subset is component `k % s` of local slot `k / s`,
/// where `s` is the number of components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorClasses {
    colors: Vec<DisjointSubsets>,
}

/// The L-vector entries of every element, slot-major.
fn element_entries(map: &IndexMap) -> NestedVec<usize> {
    let s = map.num_components();
    let mut entries = NestedVec::new();
    let mut buffer = Vec::new();
    for indices in map.iter_elements() {
        buffer.clear();
        buffer.extend(indices.iter().flat_map(|&index| (0..s).map(move |c| s * index + c)));
        entries.push(&buffer);
    }
    entries
}

impl ColorClasses {
    /// Color the elements of the map with a sequential greedy algorithm.
    ///
    /// A map without any slots has nothing to scatter and gets no colors.
    pub fn from_index_map(map: &IndexMap) -> Self {
        if map.num_slots() == 0 {
            return Self { colors: Vec::new() };
        }
        Self {
            colors: sequential_greedy_coloring(&element_entries(map)),
        }
    }

    pub fn num_colors(&self) -> usize {
        self.colors.len()
    }

    pub fn colors(&self) -> &[DisjointSubsets] {
        &self.colors
    }

    /// The elements of the given color class.
    pub fn color_elements(&self, color: usize) -> &[usize] {
        self.colors[color].labels()
    }

    /// Check that every element of the map with at least one slot is colored exactly once, that
    /// each subset holds the entries of its element and that no two elements of the same color
    /// share an entry.
    pub fn is_valid_for(&self, map: &IndexMap) -> bool {
        let expected = element_entries(map);
        let mut seen_elements = vec![false; map.num_elements()];
        let mut entry_owner = vec![None; map.l_size() * map.num_components()];
        for (color_idx, color) in self.colors.iter().enumerate() {
            for (&element, entries) in color.labels().iter().zip(color.subsets().iter()) {
                match seen_elements.get_mut(element) {
                    Some(seen) if !*seen => *seen = true,
                    _ => return false,
                }
                if expected.get(element) != Some(entries) {
                    return false;
                }
                for &entry in entries {
                    match entry_owner[entry] {
                        Some((owner_color, owner)) if owner_color == color_idx && owner != element => return false,
                        _ => entry_owner[entry] = Some((color_idx, element)),
                    }
                }
            }
        }
        seen_elements
            .into_iter()
            .enumerate()
            .all(|(element, seen)| seen || map.element_slot_count(element) == 0)
    }
}
