//! GTID set arithmetic.
//!
//! A GTID set maps a source server uuid to the closed intervals of
//! transaction numbers executed from it, e.g.
//! `3e11fa47-71ca-11e1-9e33-c80aa9429562:1-5:11-18`.

use crate::core::{AdminError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GtidSet {
    /// Sorted, non-overlapping, non-adjacent inclusive intervals per uuid
    sources: BTreeMap<String, Vec<(u64, u64)>>,
}

impl GtidSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut set = Self::new();
        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if cleaned.is_empty() {
            return Ok(set);
        }

        for part in cleaned.split(',') {
            if part.is_empty() {
                continue;
            }
            let mut fields = part.split(':');
            let uuid = fields
                .next()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| invalid(text))?
                .to_ascii_lowercase();

            let mut any = false;
            for range in fields {
                any = true;
                let (start, end) = match range.split_once('-') {
                    Some((a, b)) => (parse_number(a, text)?, parse_number(b, text)?),
                    None => {
                        let n = parse_number(range, text)?;
                        (n, n)
                    }
                };
                if start == 0 || end < start {
                    return Err(invalid(text));
                }
                set.add_interval(&uuid, start, end);
            }
            if !any {
                return Err(invalid(text));
            }
        }
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Number of transactions in the set
    pub fn count(&self) -> u64 {
        self.sources
            .values()
            .flat_map(|v| v.iter())
            .map(|(a, b)| b - a + 1)
            .sum()
    }

    pub fn contains(&self, uuid: &str, number: u64) -> bool {
        self.sources
            .get(&uuid.to_ascii_lowercase())
            .is_some_and(|v| v.iter().any(|(a, b)| *a <= number && number <= *b))
    }

    pub fn add_interval(&mut self, uuid: &str, start: u64, end: u64) {
        let intervals = self.sources.entry(uuid.to_ascii_lowercase()).or_default();
        intervals.push((start, end));
        normalize(intervals);
    }

    /// Transactions in `self` that are not in `other`
    pub fn subtract(&self, other: &GtidSet) -> GtidSet {
        let mut result = GtidSet::new();
        for (uuid, intervals) in &self.sources {
            let remaining = match other.sources.get(uuid) {
                None => intervals.clone(),
                Some(removed) => subtract_intervals(intervals, removed),
            };
            if !remaining.is_empty() {
                result.sources.insert(uuid.clone(), remaining);
            }
        }
        result
    }

    pub fn is_subset_of(&self, other: &GtidSet) -> bool {
        self.subtract(other).is_empty()
    }
}

fn invalid(text: &str) -> AdminError {
    AdminError::runtime(format!("Malformed GTID set specification '{}'", text))
}

/// Transaction numbers are signed 64-bit on the server side.
fn parse_number(s: &str, text: &str) -> Result<u64> {
    s.parse::<u64>()
        .ok()
        .filter(|n| *n <= i64::MAX as u64)
        .ok_or_else(|| invalid(text))
}

fn normalize(intervals: &mut Vec<(u64, u64)>) {
    intervals.sort_unstable();
    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(intervals.len());
    for &(a, b) in intervals.iter() {
        match merged.last_mut() {
            Some(last) if a <= last.1.saturating_add(1) => last.1 = last.1.max(b),
            _ => merged.push((a, b)),
        }
    }
    *intervals = merged;
}

fn subtract_intervals(from: &[(u64, u64)], removed: &[(u64, u64)]) -> Vec<(u64, u64)> {
    let mut out = Vec::new();
    for &(mut a, b) in from {
        for &(ra, rb) in removed {
            if rb < a || ra > b {
                continue;
            }
            if ra > a {
                out.push((a, ra - 1));
            }
            if rb >= b {
                a = b + 1;
                break;
            }
            a = rb + 1;
        }
        if a <= b {
            out.push((a, b));
        }
    }
    out
}

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (uuid, intervals) in &self.sources {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "{}", uuid)?;
            for (a, b) in intervals {
                if a == b {
                    write!(f, ":{}", a)?;
                } else {
                    write!(f, ":{}-{}", a, b)?;
                }
            }
        }
        Ok(())
    }
}

impl FromStr for GtidSet {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Transaction-state relation between a candidate instance and the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GtidConsistency {
    /// The candidate has executed no transactions
    New,
    /// Everything the candidate executed is also in the group
    Recoverable,
    /// Each side executed transactions the other lacks
    Diverged,
    /// The candidate executed transactions the group does not have
    LostTransactions,
}

impl GtidConsistency {
    pub fn classify(candidate: &GtidSet, group: &GtidSet) -> Self {
        if candidate.is_empty() {
            return Self::New;
        }
        let errant = candidate.subtract(group);
        if errant.is_empty() {
            return Self::Recoverable;
        }
        if group.is_subset_of(candidate) {
            Self::LostTransactions
        } else {
            Self::Diverged
        }
    }

    /// Whether proceeding with the candidate is safe.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::New | Self::Recoverable)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Recoverable => "recoverable",
            Self::Diverged => "diverged",
            Self::LostTransactions => "lost_transactions",
        }
    }
}
