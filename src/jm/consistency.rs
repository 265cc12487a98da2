use crate::jm::error::StoreError;
use crate::jm::job::{GlobalServiceIndex, Job};
use crate::jm::store::JobStore;
use std::collections::HashSet;

/// Outcome of comparing declared services against the global index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Indexed (ever declared) but no longer declared by any job; index order, deduplicated.
    pub orphans: Vec<String>,
    pub consistent: bool,
}

pub fn check(jobs: &[Job], index: &GlobalServiceIndex) -> ConsistencyReport {
    let declared: HashSet<&str> = jobs.iter().flat_map(|j| j.service_names()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let orphans: Vec<String> = index
        .service_names
        .iter()
        .map(String::as_str)
        .filter(|name| !declared.contains(name) && seen.insert(*name))
        .map(str::to_string)
        .collect();
    ConsistencyReport {
        consistent: orphans.is_empty(),
        orphans,
    }
}

/// Read everything and check. No partial result on a read failure.
pub fn check_store(store: &dyn JobStore) -> Result<(Vec<Job>, ConsistencyReport), StoreError> {
    let jobs = store.read_all()?;
    let report = check(&jobs, &store.read_index());
    Ok((jobs, report))
}

/// Append every declared service missing from the index (left behind when a job record
/// was written but the process died before the index update). Returns the names added.
pub fn repair_index(store: &mut dyn JobStore, jobs: &[Job]) -> Result<Vec<String>, StoreError> {
    let mut index = store.read_index();
    let added: Vec<String> = jobs
        .iter()
        .flat_map(|j| j.service_names())
        .filter(|name| index.append_unique(name))
        .map(str::to_string)
        .collect();
    if !added.is_empty() {
        store.write_index(&index)?;
        tracing::info!(
            component = "reconcile",
            added = %added.join(","),
            "repaired global service index"
        );
    }
    Ok(added)
}
