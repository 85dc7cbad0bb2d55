//! Manager -> submitter routing table and split directives.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::split::{split, SplitError};

/// Label shown for submitters no manager lists.
pub const UNASSIGNED_LABEL: &str = "기타";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub manager: String,
    pub submitters: Vec<String>,
}

/// One submitter's records are partitioned across `managers`, in this order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitAssignment {
    pub submitter: String,
    pub managers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner<'a> {
    Manager(&'a str),
    Unassigned,
}

impl fmt::Display for Owner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Manager(name) => f.write_str(name),
            Owner::Unassigned => f.write_str(UNASSIGNED_LABEL),
        }
    }
}

/// The records one manager receives for one submitter. `part` is
/// `(index, count)` when a split directive applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routed<'a, T> {
    pub items: &'a [T],
    pub part: Option<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRouter {
    assignments: Vec<Assignment>,
    splits: Vec<SplitAssignment>,
}

impl AssignmentRouter {
    /// Build the router, collecting every structural problem of the table.
    pub fn new(
        assignments: Vec<Assignment>,
        splits: Vec<SplitAssignment>,
    ) -> Result<Self, Vec<String>> {
        let router = Self {
            assignments,
            splits,
        };
        let problems = router.check();
        if problems.is_empty() {
            Ok(router)
        } else {
            Err(problems)
        }
    }

    fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut managers = HashSet::new();
        for (i, a) in self.assignments.iter().enumerate() {
            if a.manager.trim().is_empty() {
                problems.push(format!("assignments[{}]: manager must be non-empty", i));
            } else if !managers.insert(a.manager.as_str()) {
                problems.push(format!("assignments: manager '{}' is declared twice", a.manager));
            }
            if a.submitters.iter().any(|s| s.trim().is_empty()) {
                problems.push(format!(
                    "assignments[{}] ({}): submitter names must be non-empty",
                    i, a.manager
                ));
            }
            let mut listed = HashSet::new();
            for s in a.submitters.iter().filter(|s| !s.trim().is_empty()) {
                if !listed.insert(s.as_str()) {
                    problems.push(format!(
                        "assignments[{}] ({}): submitter '{}' is listed twice",
                        i, a.manager, s
                    ));
                }
            }
        }

        let mut split_submitters = HashSet::new();
        for s in &self.splits {
            if !split_submitters.insert(s.submitter.as_str()) {
                problems.push(format!("splits: '{}' has more than one split directive", s.submitter));
            }
            if s.managers.is_empty() {
                problems.push(format!("splits: '{}' lists no managers", s.submitter));
                continue;
            }
            let mut seen = HashSet::new();
            for m in &s.managers {
                if !seen.insert(m.as_str()) {
                    problems.push(format!("splits: '{}' lists manager '{}' twice", s.submitter, m));
                }
            }
            if self.managers_for(&s.submitter).is_empty() {
                problems.push(format!(
                    "splits: '{}' does not appear in any manager's submitter list",
                    s.submitter
                ));
            }
            for m in &s.managers {
                let lists_submitter = self
                    .assignments
                    .iter()
                    .any(|a| &a.manager == m && a.submitters.contains(&s.submitter));
                if !lists_submitter {
                    problems.push(format!(
                        "splits: manager '{}' must list '{}' under assignments",
                        m, s.submitter
                    ));
                }
            }
        }

        problems
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn splits(&self) -> &[SplitAssignment] {
        &self.splits
    }

    pub fn all_submitters(&self) -> BTreeSet<&str> {
        self.assignments
            .iter()
            .flat_map(|a| a.submitters.iter().map(String::as_str))
            .collect()
    }

    /// First manager, in declaration order, listing `submitter`.
    pub fn manager_for(&self, submitter: &str) -> Owner<'_> {
        self.assignments
            .iter()
            .find(|a| a.submitters.iter().any(|s| s == submitter))
            .map(|a| Owner::Manager(a.manager.as_str()))
            .unwrap_or(Owner::Unassigned)
    }

    /// Every manager listing `submitter`, in declaration order.
    pub fn managers_for(&self, submitter: &str) -> Vec<&str> {
        self.assignments
            .iter()
            .filter(|a| a.submitters.iter().any(|s| s == submitter))
            .map(|a| a.manager.as_str())
            .collect()
    }

    pub fn split_for(&self, submitter: &str) -> Option<&SplitAssignment> {
        self.splits.iter().find(|s| s.submitter == submitter)
    }

    /// Submitters listed under more than one manager with no split directive.
    /// Each such manager receives the full list.
    pub fn duplicates(&self) -> Vec<(&str, Vec<&str>)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for submitter in self.assignments.iter().flat_map(|a| a.submitters.iter()) {
            if !seen.insert(submitter.as_str()) || self.split_for(submitter).is_some() {
                continue;
            }
            let managers = self.managers_for(submitter);
            if managers.len() > 1 {
                out.push((submitter.as_str(), managers));
            }
        }
        out
    }

    /// The slice of `items` that `manager` receives for `submitter`.
    pub fn route<'a, T>(
        &self,
        manager: &str,
        submitter: &str,
        items: &'a [T],
    ) -> Result<Routed<'a, T>, SplitError> {
        let position = self.split_for(submitter).and_then(|s| {
            s.managers
                .iter()
                .position(|m| m == manager)
                .map(|idx| (idx, s.managers.len()))
        });
        match position {
            Some((idx, count)) => Ok(Routed {
                items: split(items, idx as i64, count as i64)?,
                part: Some((idx, count)),
            }),
            None => Ok(Routed { items, part: None }),
        }
    }
}
