//! Gather (restrict) and scatter-add (restrict transpose) between L-vectors and E-vectors.
//!
//! Layouts:
//!
//! - The L-vector is node-major: component `c` of global slot `i` is stored at
//!   `i * num_components + c`.
//! - The E-vector stores the values of element `e` contiguously in
//!   `[offsets[e] * num_components, offsets[e + 1] * num_components)`. Within an element,
//!   component `c` of local slot `j` is stored at `c * n_e + j`, where `n_e` is the number of
//!   slots in the element. This is the component-major layout expected by pointwise kernels.
use crate::coloring::ColorClasses;
use crate::index_map::{IndexMap, NoPointsAssigned, ValidationError};
use crate::vector::{CopyMode, LVector, VectorStorage};
use log::{debug, trace};
use num::Zero;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::mem;
use std::ops::AddAssign;
use std::sync::OnceLock;

/// How a transpose apply treats the existing contents of the destination L-vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScatterMode {
    /// Accumulate into the existing contents.
    Add,
    /// Request a fresh result: the destination is cleared before accumulation.
    Request,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestrictionError {
    Validation(ValidationError),
    NoPointsAssigned,
    ElementOutOfRange { element: usize, num_elements: usize },
    ShapeMismatch { what: &'static str, expected: usize, actual: usize },
}

impl fmt::Display for RestrictionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "Invalid index map: {}", err),
            Self::NoPointsAssigned => write!(f, "{}", NoPointsAssigned),
            Self::ElementOutOfRange { element, num_elements } => write!(
                f,
                "Element {} is out of range for restriction with {} elements",
                element, num_elements
            ),
            Self::ShapeMismatch { what, expected, actual } => {
                write!(f, "Expected {} of length {}, got {}", what, expected, actual)
            }
        }
    }
}

impl Error for RestrictionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RestrictionError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<NoPointsAssigned> for RestrictionError {
    fn from(_: NoPointsAssigned) -> Self {
        Self::NoPointsAssigned
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), RestrictionError> {
    if expected == actual {
        Ok(())
    } else {
        Err(RestrictionError::ShapeMismatch { what, expected, actual })
    }
}

fn check_min_len(what: &'static str, expected: usize, actual: usize) -> Result<(), RestrictionError> {
    if actual >= expected {
        Ok(())
    } else {
        Err(RestrictionError::ShapeMismatch { what, expected, actual })
    }
}

/// Restriction between an L-vector and an E-vector, defined by an [`IndexMap`].
///
/// A restriction is immutable once built. The index arrays are owned or borrowed according to
/// the [`CopyMode`] used at construction; borrowed arrays must outlive the restriction, which the
/// lifetime parameter enforces. Owned or copied arrays are released when the restriction is
/// dropped.
#[derive(Debug)]
pub struct Restriction<'a> {
    map: IndexMap<'a>,
    copy_mode: CopyMode,
    // Computed on first parallel transpose apply
    colors: OnceLock<ColorClasses>,
}

impl Restriction<'static> {
    /// Build a restriction from copies of the caller's offset and index arrays.
    pub fn copy_from(
        num_elements: usize,
        l_size: usize,
        num_components: usize,
        offsets: &[usize],
        indices: &[usize],
    ) -> Result<Self, RestrictionError> {
        let map = IndexMap::build(num_elements, l_size, num_components, offsets.to_vec(), indices.to_vec())?;
        Ok(Self::from_index_map(map, CopyMode::Copy))
    }

    /// Build a restriction that takes ownership of the given arrays.
    pub fn take(
        num_elements: usize,
        l_size: usize,
        num_components: usize,
        offsets: Vec<usize>,
        indices: Vec<usize>,
    ) -> Result<Self, RestrictionError> {
        let map = IndexMap::build(num_elements, l_size, num_components, offsets, indices)?;
        Ok(Self::from_index_map(map, CopyMode::Take))
    }
}

impl<'a> Restriction<'a> {
    /// Build a restriction that borrows the caller's arrays.
    pub fn borrow_from(
        num_elements: usize,
        l_size: usize,
        num_components: usize,
        offsets: &'a [usize],
        indices: &'a [usize],
    ) -> Result<Self, RestrictionError> {
        let map = IndexMap::build(num_elements, l_size, num_components, offsets, indices)?;
        Ok(Self::from_index_map(map, CopyMode::Borrow))
    }

    /// Wrap an already validated index map. The copy mode is recorded as given.
    pub fn from_index_map(map: IndexMap<'a>, copy_mode: CopyMode) -> Self {
        debug!(
            "Created restriction ({}) with {} elements, {} components, L-size {}",
            copy_mode,
            map.num_elements(),
            map.num_components(),
            map.l_size()
        );
        Self {
            map,
            copy_mode,
            colors: OnceLock::new(),
        }
    }

    pub fn index_map(&self) -> &IndexMap<'a> {
        &self.map
    }

    pub fn copy_mode(&self) -> CopyMode {
        self.copy_mode
    }

    pub fn num_elements(&self) -> usize {
        self.map.num_elements()
    }

    pub fn num_components(&self) -> usize {
        self.map.num_components()
    }

    pub fn element_slot_count(&self, element: usize) -> usize {
        self.map.element_slot_count(element)
    }

    pub fn min_slots_per_element(&self) -> Result<usize, RestrictionError> {
        Ok(self.map.min_slots_per_element()?)
    }

    pub fn max_slots_per_element(&self) -> Result<usize, RestrictionError> {
        Ok(self.map.max_slots_per_element()?)
    }

    /// Length of an L-vector compatible with this restriction.
    pub fn lvector_len(&self) -> usize {
        self.map.l_size() * self.map.num_components()
    }

    /// Length of an E-vector compatible with this restriction.
    pub fn evector_len(&self) -> usize {
        self.map.num_slots() * self.map.num_components()
    }

    pub fn create_lvector<T: Clone + Zero>(&self) -> LVector<'static, T> {
        LVector::zeros(self.map.l_size(), self.map.num_components())
    }

    pub fn create_evector<T: Clone + Zero>(&self) -> Vec<T> {
        vec![T::zero(); self.evector_len()]
    }

    /// The color classes used by [`par_apply_transpose`](Self::par_apply_transpose).
    pub fn color_classes(&self) -> &ColorClasses {
        self.colors.get_or_init(|| {
            let colors = ColorClasses::from_index_map(&self.map);
            debug!(
                "Colored {} elements with {} colors",
                self.map.num_elements(),
                colors.num_colors()
            );
            colors
        })
    }

    fn check_element(&self, element: usize) -> Result<(), RestrictionError> {
        if element < self.num_elements() {
            Ok(())
        } else {
            Err(RestrictionError::ElementOutOfRange {
                element,
                num_elements: self.num_elements(),
            })
        }
    }

    fn check_vectors(&self, l_len: usize, e_len: usize) -> Result<(), RestrictionError> {
        check_len("L-vector", self.lvector_len(), l_len)?;
        check_len("E-vector", self.evector_len(), e_len)
    }

    fn check_storage<T, V: ?Sized + VectorStorage<T>>(&self, storage: &V) -> Result<(), RestrictionError> {
        check_len("L-vector components", self.num_components(), storage.num_components())?;
        check_len("L-vector slots", self.map.l_size(), storage.len())
    }
}

/// Gather the values of one element from `l_vector` into `local`, component-major.
fn gather_element<T: Copy>(local: &mut [T], l_vector: &[T], indices: &[usize], num_components: usize) {
    let s = num_components;
    let n = indices.len();
    for (j, &index) in indices.iter().enumerate() {
        for c in 0..s {
            local[c * n + j] = l_vector[s * index + c];
        }
    }
}

/// Add the values of one element in `local` into `l_vector`.
fn scatter_add_element<T: Copy + AddAssign>(
    l_vector: &mut [T],
    local: &[T],
    indices: &[usize],
    num_components: usize,
) {
    let s = num_components;
    let n = indices.len();
    for (j, &index) in indices.iter().enumerate() {
        for c in 0..s {
            l_vector[s * index + c] += local[c * n + j];
        }
    }
}

impl<'a> Restriction<'a> {
    /// Gather the full E-vector from the L-vector.
    ///
    /// The L-vector can be any contiguous buffer, such as a slice, a `Vec` or an [`LVector`].
    pub fn apply<T: Copy>(
        &self,
        l_vector: &(impl ?Sized + AsRef<[T]>),
        e_vector: &mut [T],
    ) -> Result<(), RestrictionError> {
        let l_vector = l_vector.as_ref();
        self.check_vectors(l_vector.len(), e_vector.len())?;
        trace!("Restricting {} elements", self.num_elements());
        let s = self.num_components();
        for element in 0..self.num_elements() {
            let local = &mut e_vector[self.map.element_evector_range(element)];
            gather_element(local, l_vector, self.map.element_indices(element), s);
        }
        Ok(())
    }

    /// Gather the full E-vector from the L-vector, processing elements in parallel.
    ///
    /// Writes are partitioned by element, so no synchronization is needed.
    pub fn par_apply<T: Copy + Send + Sync>(
        &self,
        l_vector: &(impl ?Sized + AsRef<[T]>),
        e_vector: &mut [T],
    ) -> Result<(), RestrictionError> {
        let l_vector = l_vector.as_ref();
        self.check_vectors(l_vector.len(), e_vector.len())?;
        trace!("Restricting {} elements in parallel", self.num_elements());
        let s = self.num_components();
        self.split_evector_mut(e_vector)
            .into_par_iter()
            .enumerate()
            .for_each(|(element, local)| gather_element(local, l_vector, self.map.element_indices(element), s));
        Ok(())
    }

    /// Gather the values of a single element from a vector storage into `local`.
    ///
    /// `local` must hold at least `num_components` times the number of slots of the element,
    /// which is bounded by `num_components * max_slots_per_element()`. Entries beyond that are
    /// left untouched.
    pub fn apply_in_element<T: Copy, V: ?Sized + VectorStorage<T>>(
        &self,
        element: usize,
        l_vector: &V,
        local: &mut [T],
    ) -> Result<(), RestrictionError> {
        self.check_element(element)?;
        self.check_storage(l_vector)?;
        let indices = self.map.element_indices(element);
        let s = self.num_components();
        let n = indices.len();
        check_min_len("element buffer", s * n, local.len())?;
        for (j, &index) in indices.iter().enumerate() {
            for c in 0..s {
                local[c * n + j] = l_vector.get(index, c);
            }
        }
        Ok(())
    }

    /// Scatter-add the full E-vector into the L-vector.
    pub fn apply_transpose<T: Copy + Zero + AddAssign>(
        &self,
        e_vector: &[T],
        l_vector: &mut (impl ?Sized + AsMut<[T]>),
        mode: ScatterMode,
    ) -> Result<(), RestrictionError> {
        let l_vector = l_vector.as_mut();
        self.check_vectors(l_vector.len(), e_vector.len())?;
        trace!("Scattering {} elements ({:?})", self.num_elements(), mode);
        if mode == ScatterMode::Request {
            l_vector.fill(T::zero());
        }
        let s = self.num_components();
        for element in 0..self.num_elements() {
            let local = &e_vector[self.map.element_evector_range(element)];
            scatter_add_element(l_vector, local, self.map.element_indices(element), s);
        }
        Ok(())
    }

    /// Scatter-add the full E-vector into the L-vector, processing elements in parallel.
    ///
    /// Elements are processed one color class at a time, and elements within the same class
    /// never share a global slot. The summation order differs from
    /// [`apply_transpose`](Self::apply_transpose), so results may differ by rounding.
    pub fn par_apply_transpose<T: Copy + Zero + AddAssign + Send + Sync>(
        &self,
        e_vector: &[T],
        l_vector: &mut (impl ?Sized + AsMut<[T]>),
        mode: ScatterMode,
    ) -> Result<(), RestrictionError> {
        let l_vector = l_vector.as_mut();
        self.check_vectors(l_vector.len(), e_vector.len())?;
        let colors = self.color_classes();
        trace!(
            "Scattering {} elements in parallel over {} colors ({:?})",
            self.num_elements(),
            colors.num_colors(),
            mode
        );
        if mode == ScatterMode::Request {
            l_vector.fill(T::zero());
        }
        let s = self.num_components();
        for color in colors.colors() {
            color.subsets_par_iter(&mut *l_vector).for_each(|mut subset| {
                let element = subset.label();
                let local = &e_vector[self.map.element_evector_range(element)];
                let n = self.map.element_slot_count(element);
                // Subset entries are slot-major, see `ColorClasses`
                for j in 0..n {
                    for c in 0..s {
                        *subset.get_mut(s * j + c) += local[c * n + j];
                    }
                }
            });
        }
        Ok(())
    }

    /// Accumulate the contributions of a single element into a vector storage, leaving all
    /// other entries untouched.
    ///
    /// Only the first `num_components` times the number of slots of the element are read from
    /// `local`.
    pub fn apply_transpose_in_element<T: Copy, V: ?Sized + VectorStorage<T>>(
        &self,
        element: usize,
        local: &[T],
        l_vector: &mut V,
    ) -> Result<(), RestrictionError> {
        self.check_element(element)?;
        self.check_storage(l_vector)?;
        let indices = self.map.element_indices(element);
        let s = self.num_components();
        let n = indices.len();
        check_min_len("element buffer", s * n, local.len())?;
        for (j, &index) in indices.iter().enumerate() {
            for c in 0..s {
                l_vector.accumulate(index, c, local[c * n + j]);
            }
        }
        Ok(())
    }

    /// Split an E-vector into the disjoint blocks belonging to each element.
    pub fn split_evector_mut<'v, T>(&self, e_vector: &'v mut [T]) -> Vec<&'v mut [T]> {
        let mut blocks = Vec::with_capacity(self.num_elements());
        let mut remaining = e_vector;
        for element in 0..self.num_elements() {
            let block_len = self.map.element_evector_range(element).len();
            let (block, rest) = mem::take(&mut remaining).split_at_mut(block_len);
            blocks.push(block);
            remaining = rest;
        }
        blocks
    }
}
