//! Shared state between the sampling and display loops.
//!
//! One explicit context object, constructed at startup and handed to both
//! loops behind an `Arc`. The histogram tables are the coarse,
//! eventually-consistent share: the sampler inserts under the table's lock,
//! the display collapses and snapshots under the same lock, so a snapshot
//! can lag the newest insert by a render cycle but never observes a
//! half-updated entry. The terminal geometry has a single writer (the
//! display loop's resize handling) and tolerates staleness.

use std::sync::Mutex;

use crate::hist::{HistTable, SortSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermGeometry {
    pub rows: u16,
    pub cols: u16,
}

/// One histogram table per open event, with its display name.
pub struct TableSlot {
    pub name: String,
    pub table: Mutex<HistTable>,
}

pub struct SharedContext {
    pub tables: Vec<TableSlot>,
    pub sort: SortSpec,
    geometry: Mutex<TermGeometry>,
}

impl SharedContext {
    pub fn new(event_names: Vec<String>, sort: SortSpec, geometry: TermGeometry) -> Self {
        let tables = event_names
            .into_iter()
            .map(|name| TableSlot { name, table: Mutex::new(HistTable::new()) })
            .collect();
        Self { tables, sort, geometry: Mutex::new(geometry) }
    }

    pub fn geometry(&self) -> TermGeometry {
        *self.geometry.lock().expect("geometry lock poisoned")
    }

    pub fn set_geometry(&self, geometry: TermGeometry) {
        *self.geometry.lock().expect("geometry lock poisoned") = geometry;
    }
}
