// Copyright 2024 The Noema Authors

// This file is part of Noema.

// Noema is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Noema is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Noema.  If not, see <https://www.gnu.org/licenses/>.

//! Session-scoped memoisation of name vectors.
//!
//! Any two parts of a session looking up the same `(name, theory)` pair
//! see the same vector. Entries are never evicted; the index is bounded
//! only by the number of distinct symbols the session touches.

use std::collections::HashMap;

use crate::hdc::{HdcStrategy, Vector};

#[derive(Default)]
pub struct VocabIndex {
    entries: HashMap<(String, Option<String>), Vector>,
}

impl VocabIndex {
    pub fn new() -> VocabIndex {
        VocabIndex::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str, theory_id: Option<&str>) -> bool {
        self.entries
            .contains_key(&(name.to_string(), theory_id.map(|s| s.to_string())))
    }

    /// Returns the memoised vector for `name`, creating it through the
    /// strategy on first sight.
    pub fn get_or_create(
        &mut self,
        name: &str,
        theory_id: Option<&str>,
        strategy: &dyn HdcStrategy,
        geometry: usize,
    ) -> &Vector {
        self.entries
            .entry((name.to_string(), theory_id.map(|s| s.to_string())))
            .or_insert_with(|| strategy.create_from_name(name, geometry, theory_id))
    }
}
