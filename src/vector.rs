//! Ownership policies and node-major storage of global (L-) vectors.
use num::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{AddAssign, Deref, DerefMut};

/// Ownership policy for arrays handed over by a caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CopyMode {
    /// The caller's array is duplicated.
    Copy,
    /// The caller's array is referenced, and must outlive the borrowing object.
    Borrow,
    /// Ownership of the caller's array is transferred.
    Take,
}

impl fmt::Display for CopyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Borrow => write!(f, "borrow"),
            Self::Take => write!(f, "take"),
        }
    }
}

/// Access to a global vector in terms of (slot, component) pairs.
pub trait VectorStorage<T> {
    fn num_components(&self) -> usize;

    /// Number of slots.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize, component: usize) -> T;

    fn accumulate(&mut self, index: usize, component: usize, delta: T);
}

#[derive(Debug)]
enum Data<'a, T> {
    Owned(Vec<T>),
    Borrowed(&'a mut [T]),
}

impl<'a, T> Deref for Data<'a, T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::Borrowed(borrowed) => borrowed,
        }
    }
}

impl<'a, T> DerefMut for Data<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::Borrowed(borrowed) => borrowed,
        }
    }
}

/// A global vector with `num_components` values per slot, stored node-major:
/// component `c` of slot `i` lives at `i * num_components + c`.
///
/// The storage is either owned or borrowed from the caller according to the [`CopyMode`]
/// used to construct it.
#[derive(Debug)]
pub struct LVector<'a, T> {
    num_components: usize,
    copy_mode: CopyMode,
    data: Data<'a, T>,
}

impl<T: Clone + Zero> LVector<'static, T> {
    pub fn zeros(len: usize, num_components: usize) -> Self {
        Self::take(vec![T::zero(); len * num_components], num_components)
    }
}

impl<T: Clone> LVector<'static, T> {
    pub fn copy_from(data: &[T], num_components: usize) -> Self {
        Self::with_mode(Data::Owned(data.to_vec()), num_components, CopyMode::Copy)
    }
}

impl<T> LVector<'static, T> {
    pub fn take(data: Vec<T>, num_components: usize) -> Self {
        Self::with_mode(Data::Owned(data), num_components, CopyMode::Take)
    }
}

impl<'a, T> LVector<'a, T> {
    pub fn borrow_from(data: &'a mut [T], num_components: usize) -> Self {
        Self::with_mode(Data::Borrowed(data), num_components, CopyMode::Borrow)
    }

    fn with_mode(data: Data<'a, T>, num_components: usize, copy_mode: CopyMode) -> Self {
        assert!(num_components > 0, "Number of components must be positive.");
        assert_eq!(
            data.len() % num_components,
            0,
            "Data length must be divisible by the number of components."
        );
        Self {
            num_components,
            copy_mode,
            data,
        }
    }

    pub fn copy_mode(&self) -> CopyMode {
        self.copy_mode
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// The values of all components of the given slot.
    pub fn slot(&self, index: usize) -> &[T] {
        let s = self.num_components;
        &self.data[s * index..s * index + s]
    }
}

impl<'a, T: Clone> LVector<'a, T> {
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn into_vec(self) -> Vec<T> {
        match self.data {
            Data::Owned(owned) => owned,
            Data::Borrowed(borrowed) => borrowed.to_vec(),
        }
    }
}

impl<'a, T: Copy + AddAssign> VectorStorage<T> for LVector<'a, T> {
    fn num_components(&self) -> usize {
        self.num_components
    }

    fn len(&self) -> usize {
        self.data.len() / self.num_components
    }

    fn get(&self, index: usize, component: usize) -> T {
        assert!(component < self.num_components, "Component out of bounds.");
        self.data[self.num_components * index + component]
    }

    fn accumulate(&mut self, index: usize, component: usize, delta: T) {
        assert!(component < self.num_components, "Component out of bounds.");
        self.data[self.num_components * index + component] += delta;
    }
}

impl<'a, T> AsRef<[T]> for LVector<'a, T> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'a, T> AsMut<[T]> for LVector<'a, T> {
    fn as_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}
