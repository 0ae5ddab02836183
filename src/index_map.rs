//! Validated offset/index arrays describing which global slots each element touches.
//!
//! An [`IndexMap`] is a CSR-style pair of arrays: `offsets` has one entry per element plus one,
//! and the slots owned by element `e` are `indices[offsets[e] .. offsets[e + 1]]`. Global slots
//! may be shared by several elements. Elements may own different numbers of slots, which is the
//! case for restrictions "at points".
use log::debug;
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::ops::Range;

/// Error produced when offset/index arrays do not describe a valid index map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An index refers to a slot outside `[0, l_size)`.
    OutOfRangeIndex { element: usize, index: usize, l_size: usize },
    /// `offsets[element + 1] < offsets[element]`.
    NonMonotonicOffsets { element: usize, begin: usize, end: usize },
    /// The offsets array does not have `num_elements + 1` entries.
    OffsetsLength { expected: usize, actual: usize },
    /// The first offset must be zero.
    NonZeroFirstOffset(usize),
    /// The number of indices does not match the final offset.
    IndexCount { expected: usize, actual: usize },
    /// The leading offsets of a packed array do not point into the index section.
    InvalidPackedOffsets,
    /// Every slot must hold at least one component.
    ZeroComponents,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::OutOfRangeIndex { element, index, l_size } => write!(
                f,
                "Index {} in element {} is out of range for L-vector size {}",
                index, element, l_size
            ),
            Self::NonMonotonicOffsets { element, begin, end } => write!(
                f,
                "Offsets are not monotonic at element {}: {} followed by {}",
                element, begin, end
            ),
            Self::OffsetsLength { expected, actual } => {
                write!(f, "Expected {} offsets, got {}", expected, actual)
            }
            Self::NonZeroFirstOffset(first) => write!(f, "First offset must be 0, got {}", first),
            Self::IndexCount { expected, actual } => {
                write!(f, "Offsets describe {} indices, but {} were given", expected, actual)
            }
            Self::InvalidPackedOffsets => write!(f, "Packed offsets do not point past the offset header"),
            Self::ZeroComponents => write!(f, "Number of components must be positive"),
        }
    }
}

impl Error for ValidationError {}

/// Error returned when querying slot counts of an index map in which no element owns any slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NoPointsAssigned;

impl fmt::Display for NoPointsAssigned {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "No points have been assigned to any element")
    }
}

impl Error for NoPointsAssigned {}

/// Element-to-slot connectivity in CSR form.
///
/// The arrays are immutable for the lifetime of the map. They are either owned or borrowed,
/// see [`Restriction`](crate::restriction::Restriction) for the ownership policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMap<'a> {
    num_elements: usize,
    num_components: usize,
    l_size: usize,
    offsets: Cow<'a, [usize]>,
    indices: Cow<'a, [usize]>,
    // (min, max) number of slots over all elements, None if no slots are assigned
    slot_range: Option<(usize, usize)>,
}

impl<'a> IndexMap<'a> {
    /// Validate the given arrays and build an index map from them.
    ///
    /// `l_size` is the number of global slots. Each global slot holds `num_components` values.
    pub fn build(
        num_elements: usize,
        l_size: usize,
        num_components: usize,
        offsets: impl Into<Cow<'a, [usize]>>,
        indices: impl Into<Cow<'a, [usize]>>,
    ) -> Result<Self, ValidationError> {
        let offsets = offsets.into();
        let indices = indices.into();

        if num_components == 0 {
            return Err(ValidationError::ZeroComponents);
        }
        if offsets.len() != num_elements + 1 {
            return Err(ValidationError::OffsetsLength {
                expected: num_elements + 1,
                actual: offsets.len(),
            });
        }
        if offsets[0] != 0 {
            return Err(ValidationError::NonZeroFirstOffset(offsets[0]));
        }

        let mut min_slots = usize::MAX;
        let mut max_slots = 0;
        for (element, window) in offsets.windows(2).enumerate() {
            let (begin, end) = (window[0], window[1]);
            if end < begin {
                return Err(ValidationError::NonMonotonicOffsets { element, begin, end });
            }
            min_slots = min_slots.min(end - begin);
            max_slots = max_slots.max(end - begin);
        }

        let num_indices = offsets[num_elements];
        if indices.len() != num_indices {
            return Err(ValidationError::IndexCount {
                expected: num_indices,
                actual: indices.len(),
            });
        }

        for element in 0..num_elements {
            let element_indices = &indices[offsets[element]..offsets[element + 1]];
            if let Some(&index) = element_indices.iter().find(|&&index| index >= l_size) {
                return Err(ValidationError::OutOfRangeIndex { element, index, l_size });
            }
        }

        let slot_range = (num_indices > 0).then(|| (min_slots, max_slots));
        debug!(
            "Built index map with {} elements, {} slots, L-size {}, slot range {:?}",
            num_elements, num_indices, l_size, slot_range
        );

        Ok(Self {
            num_elements,
            num_components,
            l_size,
            offsets,
            indices,
            slot_range,
        })
    }

    /// Index map in which every element owns exactly `element_size` slots.
    ///
    /// `indices` holds the slots of element `e` at `indices[e * element_size .. (e + 1) * element_size]`.
    pub fn uniform(
        num_elements: usize,
        element_size: usize,
        num_components: usize,
        l_size: usize,
        indices: impl Into<Cow<'a, [usize]>>,
    ) -> Result<Self, ValidationError> {
        let offsets: Vec<_> = (0..=num_elements).map(|e| e * element_size).collect();
        Self::build(num_elements, l_size, num_components, offsets, indices)
    }

    /// Parse the packed layout in which the first `num_elements + 1` entries are offsets into the
    /// packed array itself, followed by the slot indices.
    pub fn from_packed(
        num_elements: usize,
        num_components: usize,
        l_size: usize,
        packed: &[usize],
    ) -> Result<IndexMap<'static>, ValidationError> {
        let header_len = num_elements + 1;
        if packed.len() < header_len {
            return Err(ValidationError::OffsetsLength {
                expected: header_len,
                actual: packed.len(),
            });
        }
        let (header, indices) = packed.split_at(header_len);
        if header[0] != header_len {
            return Err(ValidationError::InvalidPackedOffsets);
        }
        if header.iter().any(|&offset| offset < header_len) {
            return Err(ValidationError::InvalidPackedOffsets);
        }
        let offsets: Vec<_> = header.iter().map(|&offset| offset - header_len).collect();
        let num_indices = header[num_elements] - header_len;
        let indices = indices.get(..num_indices).ok_or(ValidationError::IndexCount {
            expected: num_indices,
            actual: indices.len(),
        })?;
        IndexMap::build(num_elements, l_size, num_components, offsets, indices.to_vec())
    }
}

impl IndexMap<'static> {
    /// Identity index map in which slot `j` of element `e` maps to `e * element_size + j`.
    pub fn strided(num_elements: usize, element_size: usize, num_components: usize) -> Self {
        let l_size = num_elements * element_size;
        Self::uniform(num_elements, element_size, num_components, l_size, (0..l_size).collect::<Vec<_>>())
            .expect("Internal error: Strided index maps are valid by construction")
    }
}

impl<'a> IndexMap<'a> {
    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    /// Number of global slots.
    pub fn l_size(&self) -> usize {
        self.l_size
    }

    /// Total number of local slots over all elements.
    pub fn num_slots(&self) -> usize {
        self.offsets[self.num_elements]
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of slots owned by the given element.
    ///
    /// # Panics
    ///
    /// Panics if the element index is out of bounds.
    pub fn element_slot_count(&self, element: usize) -> usize {
        self.offsets[element + 1] - self.offsets[element]
    }

    /// Global slots owned by the given element.
    ///
    /// # Panics
    ///
    /// Panics if the element index is out of bounds.
    pub fn element_indices(&self, element: usize) -> &[usize] {
        &self.indices[self.offsets[element]..self.offsets[element + 1]]
    }

    /// The range of the E-vector occupied by the given element.
    pub fn element_evector_range(&self, element: usize) -> Range<usize> {
        let s = self.num_components;
        s * self.offsets[element]..s * self.offsets[element + 1]
    }

    /// Iterate over the global slots owned by each element.
    pub fn iter_elements(&self) -> impl '_ + ExactSizeIterator<Item = &[usize]> {
        (0..self.num_elements).map(move |e| self.element_indices(e))
    }

    pub fn min_slots_per_element(&self) -> Result<usize, NoPointsAssigned> {
        self.slot_range.map(|(min, _)| min).ok_or(NoPointsAssigned)
    }

    pub fn max_slots_per_element(&self) -> Result<usize, NoPointsAssigned> {
        self.slot_range.map(|(_, max)| max).ok_or(NoPointsAssigned)
    }

    /// Returns the common slot count if all elements own the same number of slots.
    pub fn uniform_slot_count(&self) -> Option<usize> {
        match self.slot_range {
            Some((min, max)) if min == max => Some(min),
            _ => None,
        }
    }

    /// Returns an index map that owns its arrays.
    pub fn into_owned(self) -> IndexMap<'static> {
        IndexMap {
            num_elements: self.num_elements,
            num_components: self.num_components,
            l_size: self.l_size,
            offsets: Cow::Owned(self.offsets.into_owned()),
            indices: Cow::Owned(self.indices.into_owned()),
            slot_range: self.slot_range,
        }
    }
}
