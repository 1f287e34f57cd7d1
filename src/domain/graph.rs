//! Dependency graph algorithms over service ids.
//!
//! Edges point from a service to the services it depends on. All traversals
//! are deterministic: neighbours and roots are visited in name order.

use std::collections::{BTreeMap, BTreeSet};

use super::error::DomainError;
use super::id::ServiceId;

/// Adjacency list: service -> its dependencies.
pub type DependencyEdges = BTreeMap<ServiceId, Vec<ServiceId>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Check that every edge resolves and the graph is acyclic.
///
/// Unresolved edges are reported before cycles so the operator fixes typos
/// first.
pub fn validate(edges: &DependencyEdges) -> Result<(), DomainError> {
    for (service, deps) in edges {
        for dep in deps {
            if !edges.contains_key(dep) {
                return Err(DomainError::UnresolvedDependency {
                    service: service.to_string(),
                    dependency: dep.to_string(),
                });
            }
        }
    }

    let mut marks: BTreeMap<&ServiceId, Mark> =
        edges.keys().map(|id| (id, Mark::Unvisited)).collect();
    let mut stack: Vec<&ServiceId> = Vec::new();

    for root in edges.keys() {
        if marks[root] == Mark::Unvisited {
            visit(root, edges, &mut marks, &mut stack)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    node: &'a ServiceId,
    edges: &'a DependencyEdges,
    marks: &mut BTreeMap<&'a ServiceId, Mark>,
    stack: &mut Vec<&'a ServiceId>,
) -> Result<(), DomainError> {
    marks.insert(node, Mark::OnStack);
    stack.push(node);

    let mut deps: Vec<&ServiceId> = edges[node].iter().collect();
    deps.sort();
    deps.dedup();

    for dep in deps {
        match marks[dep] {
            Mark::OnStack => {
                let start = stack.iter().position(|id| *id == dep).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|id| id.to_string()).collect();
                cycle.push(dep.to_string());
                return Err(DomainError::CyclicDependency { cycle });
            }
            Mark::Unvisited => visit(dep, edges, marks, stack)?,
            Mark::Done => {}
        }
    }

    stack.pop();
    marks.insert(node, Mark::Done);
    Ok(())
}

/// Dependencies-first order; ties broken by name.
///
/// Assumes a validated graph. Nodes caught in a cycle are omitted.
#[must_use]
pub fn topological_order(edges: &DependencyEdges) -> Vec<ServiceId> {
    let mut remaining: BTreeMap<&ServiceId, usize> = edges
        .iter()
        .map(|(id, deps)| {
            let unique: BTreeSet<&ServiceId> = deps.iter().filter(|d| edges.contains_key(*d)).collect();
            (id, unique.len())
        })
        .collect();
    let dependents = reverse(edges);

    let mut ready: BTreeSet<&ServiceId> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(edges.len());

    while let Some(next) = ready.pop_first() {
        order.push(next.clone());
        if let Some(children) = dependents.get(next) {
            for child in children {
                if let Some(count) = remaining.get_mut(child) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(edges.get_key_value(child).map_or(child, |(k, _)| k));
                    }
                }
            }
        }
    }
    order
}

/// Invert the edges: service -> services that depend on it.
#[must_use]
pub fn reverse(edges: &DependencyEdges) -> DependencyEdges {
    let mut out: DependencyEdges = edges.keys().map(|id| (id.clone(), Vec::new())).collect();
    for (service, deps) in edges {
        let unique: BTreeSet<&ServiceId> = deps.iter().collect();
        for dep in unique {
            out.entry(dep.clone()).or_default().push(service.clone());
        }
    }
    out
}

/// Seeds plus everything reachable from them along `edges`.
#[must_use]
pub fn closure(edges: &DependencyEdges, seeds: &BTreeSet<ServiceId>) -> BTreeSet<ServiceId> {
    let mut seen = BTreeSet::new();
    let mut queue: Vec<ServiceId> = seeds.iter().cloned().collect();
    while let Some(id) = queue.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(next) = edges.get(&id) {
            queue.extend(next.iter().cloned());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &[&str])]) -> DependencyEdges {
        pairs.iter()
            .map(|(id, deps)| {
                (
                    ServiceId::new(*id),
                    deps.iter().map(|d| ServiceId::new(*d)).collect(),
                )
            })
            .collect()
    }

    fn names(ids: &[ServiceId]) -> Vec<&str> {
        ids.iter().map(ServiceId::as_str).collect()
    }

    #[test]
    fn validate_accepts_dag() {
        let graph = edges(&[("db", &[]), ("api", &["db"]), ("web", &["api", "db"])]);
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn validate_rejects_unresolved_dependency() {
        let graph = edges(&[("api", &["db"])]);
        assert_eq!(
            validate(&graph),
            Err(DomainError::UnresolvedDependency {
                service: "api".into(),
                dependency: "db".into(),
            })
        );
    }

    #[test]
    fn validate_reports_cycle_path() {
        let graph = edges(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);
        match validate(&graph) {
            Err(DomainError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_self_loop() {
        let graph = edges(&[("a", &["a"])]);
        assert!(matches!(
            validate(&graph),
            Err(DomainError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let graph = edges(&[
            ("base", &[]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("top", &["left", "right"]),
        ]);
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let graph = edges(&[
            ("web", &["api"]),
            ("api", &["db", "cache"]),
            ("db", &[]),
            ("cache", &[]),
            ("worker", &["db"]),
        ]);
        let order = topological_order(&graph);
        assert_eq!(names(&order), vec!["cache", "db", "api", "web", "worker"]);
    }

    #[test]
    fn topological_order_tolerates_duplicate_edges() {
        let graph = edges(&[("db", &[]), ("api", &["db", "db"])]);
        assert_eq!(names(&topological_order(&graph)), vec!["db", "api"]);
    }

    #[test]
    fn reverse_lists_dependents() {
        let graph = edges(&[("db", &[]), ("api", &["db"]), ("worker", &["db"])]);
        let rev = reverse(&graph);
        assert_eq!(names(&rev[&ServiceId::new("db")]), vec!["api", "worker"]);
        assert!(rev[&ServiceId::new("api")].is_empty());
    }

    #[test]
    fn closure_follows_edges_transitively() {
        let graph = edges(&[("db", &[]), ("api", &["db"]), ("web", &["api"]), ("docs", &[])]);
        let seeds = [ServiceId::new("web")].into_iter().collect();
        let deps = closure(&graph, &seeds);
        let got: Vec<_> = deps.iter().map(ServiceId::as_str).collect();
        assert_eq!(got, vec!["api", "db", "web"]);

        let dependents = closure(&reverse(&graph), &[ServiceId::new("db")].into_iter().collect());
        let got: Vec<_> = dependents.iter().map(ServiceId::as_str).collect();
        assert_eq!(got, vec!["api", "db", "web"]);
    }
}
