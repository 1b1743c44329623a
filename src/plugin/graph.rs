//! Plugin dependency graph
//!
//! Nodes keep their declaration order; topological ordering breaks ties
//! by that order so the same registry always yields the same plan.

use crate::error::HubError;
use crate::Result;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<String>,
    index: HashMap<String, usize>,
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Names in declaration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn dependencies(&self, name: &str) -> &[String] {
        self.dependencies
            .get(name)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Add a node without any checks; callers validate with [`find_cycle`](Self::find_cycle)
    pub fn add_node(&mut self, name: impl Into<String>, dependencies: Vec<String>) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(HubError::DuplicateName(name));
        }
        self.index.insert(name.clone(), self.order.len());
        self.order.push(name.clone());
        self.dependencies.insert(name, dependencies);
        Ok(())
    }

    /// First cycle found among registered nodes, closed (first == last).
    /// Edges to unregistered names are ignored.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let nodes: HashSet<&str> = self.order.iter().map(|s| s.as_str()).collect();
        self.find_cycle_within(&nodes)
    }

    /// Requested names plus everything they transitively depend on
    pub fn closure<S: AsRef<str>>(&self, requested: &[S]) -> Result<HashSet<String>> {
        let mut seen = HashSet::new();
        let mut stack: Vec<String> = Vec::with_capacity(requested.len());

        for name in requested {
            let name = name.as_ref();
            if !self.contains(name) {
                return Err(HubError::UnknownPlugin(name.to_string()));
            }
            stack.push(name.to_string());
        }

        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            for dep in self.dependencies(&name) {
                if !self.contains(dep) {
                    return Err(HubError::UnknownDependency {
                        plugin: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                if !seen.contains(dep) {
                    stack.push(dep.clone());
                }
            }
        }

        Ok(seen)
    }

    /// Topological order of the requested names and their transitive dependencies
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<String>> {
        let nodes = self.closure(requested)?;
        self.topological_order(&nodes)
    }

    /// Kahn's algorithm over `nodes`; ready nodes are taken in declaration order
    pub fn topological_order(&self, nodes: &HashSet<String>) -> Result<Vec<String>> {
        let mut remaining: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for name in nodes {
            let deps: Vec<&str> = self
                .dependencies(name)
                .iter()
                .map(|d| d.as_str())
                .filter(|d| nodes.contains(*d))
                .collect();
            remaining.insert(name.as_str(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(name.as_str());
            }
        }

        let mut ready: BTreeSet<usize> = remaining
            .iter()
            .filter(|(_, &count)| count == 0)
            .filter_map(|(name, _)| self.index.get(*name).copied())
            .collect();

        let mut sorted = Vec::with_capacity(nodes.len());
        while let Some(idx) = ready.pop_first() {
            let name = self.order[idx].as_str();
            sorted.push(name.to_string());

            for dependent in dependents.get(name).map(|d| d.as_slice()).unwrap_or(&[]) {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        if let Some(&i) = self.index.get(*dependent) {
                            ready.insert(i);
                        }
                    }
                }
            }
        }

        if sorted.len() != nodes.len() {
            let placed: HashSet<&str> = sorted.iter().map(|s| s.as_str()).collect();
            let stuck: HashSet<&str> = nodes
                .iter()
                .map(|s| s.as_str())
                .filter(|n| !placed.contains(n))
                .collect();
            let cycle = self
                .find_cycle_within(&stuck)
                .unwrap_or_else(|| self.in_declaration_order(&stuck));
            return Err(HubError::CyclicDependency(cycle));
        }

        Ok(sorted)
    }

    fn in_declaration_order(&self, nodes: &HashSet<&str>) -> Vec<String> {
        self.order
            .iter()
            .filter(|n| nodes.contains(n.as_str()))
            .cloned()
            .collect()
    }

    fn find_cycle_within(&self, nodes: &HashSet<&str>) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = nodes.iter().map(|n| (*n, Mark::Unvisited)).collect();

        for start in self.order.iter().map(|s| s.as_str()) {
            if marks.get(start) != Some(&Mark::Unvisited) {
                continue;
            }

            // Iterative DFS: (node, next dependency index)
            let mut path: Vec<(&str, usize)> = vec![(start, 0)];
            marks.insert(start, Mark::InProgress);

            while let Some((node, next)) = path.last().copied() {
                let deps = self.dependencies(node);
                if next >= deps.len() {
                    marks.insert(node, Mark::Done);
                    path.pop();
                    continue;
                }
                if let Some(top) = path.last_mut() {
                    top.1 += 1;
                }

                let dep = deps[next].as_str();
                match marks.get(dep).copied() {
                    Some(Mark::Unvisited) => {
                        marks.insert(dep, Mark::InProgress);
                        path.push((dep, 0));
                    }
                    Some(Mark::InProgress) => {
                        let from = path.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[from..].iter().map(|(n, _)| n.to_string()).collect();
                        cycle.push(dep.to_string());
                        return Some(cycle);
                    }
                    _ => {}
                }
            }
        }

        None
    }
}
