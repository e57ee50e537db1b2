//! Search and replace of file-backed leaves inside wrapper trees.
//!
//! Every wrapper type implements [`Structural`] by forwarding to the fields
//! that may hold a payload. Attribute maps are opaque and never searched.

use crate::lazy::LazyArray;
use crate::payload::Payload;

/// A value that may contain file-backed [`LazyArray`] leaves.
pub trait Structural {
    /// Call `visit` on every file-backed leaf, in field order.
    fn visit_files<'a>(&'a self, visit: &mut dyn FnMut(&'a LazyArray));

    /// A copy of `self` with every file-backed leaf replaced by `open(leaf)`.
    ///
    /// All other fields are carried over unchanged.
    fn replace_files(&self, open: &mut dyn FnMut(&LazyArray) -> Payload) -> Self
    where
        Self: Sized;
}

/// All file-backed leaves reachable from `value`.
pub fn find_files<T: Structural + ?Sized>(value: &T) -> Vec<&LazyArray> {
    let mut found = Vec::new();
    value.visit_files(&mut |leaf| found.push(leaf));
    found
}

/// Number of file-backed leaves reachable from `value`.
pub fn file_count<T: Structural + ?Sized>(value: &T) -> usize {
    let mut count = 0;
    value.visit_files(&mut |_| count += 1);
    count
}

impl Structural for Payload {
    fn visit_files<'a>(&'a self, visit: &mut dyn FnMut(&'a LazyArray)) {
        self.visit_lazy(visit);
    }

    fn replace_files(&self, open: &mut dyn FnMut(&LazyArray) -> Payload) -> Self {
        self.map_lazy(open)
    }
}

impl<T: Structural> Structural for Box<T> {
    fn visit_files<'a>(&'a self, visit: &mut dyn FnMut(&'a LazyArray)) {
        (**self).visit_files(visit);
    }

    fn replace_files(&self, open: &mut dyn FnMut(&LazyArray) -> Payload) -> Self {
        Box::new((**self).replace_files(open))
    }
}

impl<T: Structural> Structural for Option<T> {
    fn visit_files<'a>(&'a self, visit: &mut dyn FnMut(&'a LazyArray)) {
        if let Some(inner) = self {
            inner.visit_files(visit);
        }
    }

    fn replace_files(&self, open: &mut dyn FnMut(&LazyArray) -> Payload) -> Self {
        self.as_ref().map(|inner| inner.replace_files(open))
    }
}

impl<T: Structural> Structural for Vec<T> {
    fn visit_files<'a>(&'a self, visit: &mut dyn FnMut(&'a LazyArray)) {
        for item in self {
            item.visit_files(visit);
        }
    }

    fn replace_files(&self, open: &mut dyn FnMut(&LazyArray) -> Payload) -> Self {
        self.iter().map(|item| item.replace_files(open)).collect()
    }
}

impl<A: Structural, B: Structural> Structural for (A, B) {
    fn visit_files<'a>(&'a self, visit: &mut dyn FnMut(&'a LazyArray)) {
        self.0.visit_files(visit);
        self.1.visit_files(visit);
    }

    fn replace_files(&self, open: &mut dyn FnMut(&LazyArray) -> Payload) -> Self {
        (self.0.replace_files(open), self.1.replace_files(open))
    }
}

impl<A: Structural, B: Structural, C: Structural> Structural for (A, B, C) {
    fn visit_files<'a>(&'a self, visit: &mut dyn FnMut(&'a LazyArray)) {
        self.0.visit_files(visit);
        self.1.visit_files(visit);
        self.2.visit_files(visit);
    }

    fn replace_files(&self, open: &mut dyn FnMut(&LazyArray) -> Payload) -> Self {
        (
            self.0.replace_files(open),
            self.1.replace_files(open),
            self.2.replace_files(open),
        )
    }
}
