//! Merged token snapshot
//!
//! An [`Aggregate`] is built once per refresh and never mutated after it is
//! handed out. Records keep the order in which their identity was first seen.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::AggregatedRecord;

/// Identity-keyed snapshot of every aggregated token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<AggregatedRecord>", into = "Vec<AggregatedRecord>")]
pub struct Aggregate {
    records: Vec<AggregatedRecord>,
    positions: HashMap<String, usize>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any record with the same identity in place
    pub fn upsert(&mut self, record: AggregatedRecord) {
        match self.positions.get(record.address()) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.positions
                    .insert(record.address().to_string(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<&AggregatedRecord> {
        self.positions.get(address).map(|&pos| &self.records[pos])
    }

    pub fn get_mut(&mut self, address: &str) -> Option<&mut AggregatedRecord> {
        match self.positions.get(address) {
            Some(&pos) => self.records.get_mut(pos),
            None => None,
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.positions.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AggregatedRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[AggregatedRecord] {
        &self.records
    }

    /// First `n` records in aggregate order
    pub fn top(&self, n: usize) -> Vec<AggregatedRecord> {
        self.records.iter().take(n).cloned().collect()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.address())
    }
}

impl From<Vec<AggregatedRecord>> for Aggregate {
    fn from(records: Vec<AggregatedRecord>) -> Self {
        let mut aggregate = Aggregate::new();
        for record in records {
            aggregate.upsert(record);
        }
        aggregate
    }
}

impl From<Aggregate> for Vec<AggregatedRecord> {
    fn from(aggregate: Aggregate) -> Self {
        aggregate.records
    }
}

impl FromIterator<AggregatedRecord> for Aggregate {
    fn from_iter<I: IntoIterator<Item = AggregatedRecord>>(iter: I) -> Self {
        let mut aggregate = Aggregate::new();
        for record in iter {
            aggregate.upsert(record);
        }
        aggregate
    }
}
