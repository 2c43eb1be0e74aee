//! Sort keys for the histogram.
//!
//! `-s pid,comm,dso,symbol` picks which key components entries are grouped
//! and ordered by. Components absent from the sort list are ignored when
//! collapsing, so `-s comm` folds every location of a command into one row.

use crate::domain::ProfilerError;
use crate::hist::HistKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Pid,
    Comm,
    Dso,
    Symbol,
}

impl SortKey {
    fn parse(s: &str) -> Result<Self, ProfilerError> {
        match s {
            "pid" => Ok(Self::Pid),
            "comm" => Ok(Self::Comm),
            "dso" => Ok(Self::Dso),
            "symbol" => Ok(Self::Symbol),
            other => Err(ProfilerError::UnknownSortKey(other.to_string())),
        }
    }
}

/// One comparable component of a projected key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortField {
    Num(i64),
    Text(String),
}

/// The ordered sort-key list. Projections of two keys are equal exactly when
/// the table's comparison policy considers the entries mergeable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self { keys: vec![SortKey::Comm, SortKey::Dso, SortKey::Symbol] }
    }
}

impl SortSpec {
    pub fn parse(list: &str) -> Result<Self, ProfilerError> {
        let keys = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SortKey::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if keys.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self { keys })
    }

    /// Project a key down to the components the sort order looks at.
    pub fn project(&self, key: &HistKey) -> Vec<SortField> {
        self.keys
            .iter()
            .map(|k| match k {
                SortKey::Pid => SortField::Num(i64::from(key.pid.0)),
                SortKey::Comm => SortField::Text(key.comm.clone()),
                SortKey::Dso => SortField::Text(key.module.clone().unwrap_or_default()),
                SortKey::Symbol => SortField::Text(key.symbol.to_string()),
            })
            .collect()
    }
}
