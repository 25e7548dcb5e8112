//! Structural validation of protocol definitions.
//!
//! A protocol must pass validation before it enters the registry. The checks run
//! in a fixed order so error messages stay meaningful:
//!
//! 1. **Non-empty**: at least one step, since the first step is the entry point
//! 2. **Uniqueness**: step ids are unique within the protocol
//! 3. **Reference resolution**: every `next_step_ids` entry names a defined step
//!
//! Cycles are legal. Steps may loop back to earlier steps to model periodic work,
//! so [`find_cycle`] only reports a loop for diagnostics and never rejects one.
//!
//! # Examples
//!
//! ```rust
//! use tactical_protocols::config::validate_protocol;
//! use tactical_protocols::errors::ValidationError;
//! use tactical_protocols::protocol::{Protocol, Step};
//!
//! let protocol = Protocol::new(
//!     "perimeter",
//!     "Perimeter",
//!     vec![Step::new("mark", "mark_location").then(["survey"])],
//! );
//!
//! match validate_protocol(&protocol) {
//!     Err(ValidationError::DanglingStepReference { step_id, target, .. }) => {
//!         assert_eq!(step_id, "mark");
//!         assert_eq!(target, "survey");
//!     }
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

use std::collections::{HashMap, HashSet};

use crate::errors::ValidationError;
use crate::protocol::Protocol;

/// Validate a protocol, returning the first violation found.
pub fn validate_protocol(protocol: &Protocol) -> Result<(), ValidationError> {
    match find_violations(protocol).into_iter().next() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Collect every violation in a protocol.
///
/// An empty protocol short-circuits: there is nothing else to check.
pub fn find_violations(protocol: &Protocol) -> Vec<ValidationError> {
    if protocol.steps.is_empty() {
        return vec![ValidationError::EmptyProtocol {
            protocol_id: protocol.id.clone(),
        }];
    }

    let mut errors = duplicate_step_ids(protocol);
    errors.extend(dangling_references(protocol));
    errors
}

fn duplicate_step_ids(protocol: &Protocol) -> Vec<ValidationError> {
    let mut seen_ids = HashSet::new();
    let mut errors = Vec::new();

    for step in &protocol.steps {
        if !seen_ids.insert(step.id.as_str()) {
            errors.push(ValidationError::DuplicateStepId {
                protocol_id: protocol.id.clone(),
                step_id: step.id.clone(),
            });
        }
    }

    errors
}

fn dangling_references(protocol: &Protocol) -> Vec<ValidationError> {
    let step_ids: HashSet<&str> = protocol.steps.iter().map(|s| s.id.as_str()).collect();
    let mut errors = Vec::new();

    for step in &protocol.steps {
        for target in &step.next_step_ids {
            if !step_ids.contains(target.as_str()) {
                errors.push(ValidationError::DanglingStepReference {
                    protocol_id: protocol.id.clone(),
                    step_id: step.id.clone(),
                    target: target.clone(),
                });
            }
        }
    }

    errors
}

/// Find one loop in the step graph, if any.
///
/// Uses a depth-first search with a recursion stack (gray nodes). When an edge
/// reaches a node that is still on the stack, the path from that node to the
/// current one plus the back edge is the cycle, e.g. `["scan", "report", "scan"]`.
/// Dangling references are ignored, so this is safe to call on unvalidated input.
pub fn find_cycle(protocol: &Protocol) -> Option<Vec<String>> {
    let graph: HashMap<&str, Vec<&str>> = protocol
        .steps
        .iter()
        .map(|s| (s.id.as_str(), s.next_step_ids.iter().map(String::as_str).collect()))
        .collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    // Walk in definition order so the reported cycle is deterministic.
    for step in &protocol.steps {
        if !visited.contains(step.id.as_str()) {
            if let Some(cycle) =
                dfs_cycle_detection(&step.id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(cycle);
            }
        }
    }

    None
}

fn dfs_cycle_detection<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !graph.contains_key(neighbor) {
                continue;
            }
            if !visited.contains(neighbor) {
                if let Some(cycle) = dfs_cycle_detection(neighbor, graph, visited, rec_stack, path)
                {
                    return Some(cycle);
                }
            } else if rec_stack.contains(neighbor) {
                let cycle_start = path.iter().position(|&x| x == neighbor).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[cycle_start..].iter().map(|s| s.to_string()).collect();
                cycle.push(neighbor.to_string());
                return Some(cycle);
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}
