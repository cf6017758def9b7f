// ABOUTME: Dependency graph over table configs with cycle detection
// ABOUTME: Emits the insert order (parents first) and delete order (children first)

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

/// The resolved processing order for a multi-table run.
///
/// Tables are referred to by index into the config list, so the structure is
/// trivially copyable and free of interior references.
#[derive(Debug, Clone)]
pub struct SyncOrder {
    /// Topological order, parents before children.
    pub insert_order: Vec<usize>,
}

impl SyncOrder {
    /// The reverse of the insert order: children before parents.
    pub fn delete_order(&self) -> Vec<usize> {
        self.insert_order.iter().rev().copied().collect()
    }
}

/// Build the dependency graph over the given table configs and produce the
/// insert order via Kahn's algorithm.
///
/// A declared dependency "A" on table B means "A must exist before B". Fails
/// on duplicate table names, dependencies on undeclared tables, and cycles.
/// Tie-breaking among simultaneously-ready tables is by config index, so the
/// order is deterministic for a given configuration.
pub fn sync_order(configs: &[&SyncConfig]) -> Result<SyncOrder> {
    let mut index_by_name: HashMap<&str, usize> = HashMap::new();
    for (index, cfg) in configs.iter().enumerate() {
        if index_by_name.insert(cfg.table.as_str(), index).is_some() {
            return Err(SyncError::DuplicateTable {
                table: cfg.table.clone(),
            });
        }
    }

    // Adjacency over config indices: edge parent -> child.
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); configs.len()];
    let mut in_degree: Vec<usize> = vec![0; configs.len()];
    for (child, cfg) in configs.iter().enumerate() {
        for dependency in &cfg.depends_on {
            let parent = *index_by_name.get(dependency.as_str()).ok_or_else(|| {
                SyncError::UnknownDependency {
                    table: cfg.table.clone(),
                    dependency: dependency.clone(),
                }
            })?;
            adjacency[parent].push(child);
            in_degree[child] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(index, _)| Reverse(index))
        .collect();

    let mut insert_order = Vec::with_capacity(configs.len());
    while let Some(Reverse(index)) = ready.pop() {
        insert_order.push(index);
        for &child in &adjacency[index] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.push(Reverse(child));
            }
        }
    }

    if insert_order.len() < configs.len() {
        // Any node still carrying in-degree sits on a cycle; report the
        // lowest-indexed one for a stable message.
        let stuck = in_degree
            .iter()
            .position(|&degree| degree > 0)
            .expect("unsorted node must remain when the order is short");
        return Err(SyncError::CycleDetected {
            table: configs[stuck].table.clone(),
        });
    }

    Ok(SyncOrder { insert_order })
}
