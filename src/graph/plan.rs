//! Plan phase: resolve requested targets into a dependency graph.

use anyhow::{Result, anyhow};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, VecDeque};

use super::TaskGraph;
use crate::core::{QuireError, Target};

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// The transitive closure of a set of requested targets.
///
/// An edge `a → b` means `a` depends on `b`.
pub struct BuildPlan {
    graph: DiGraph<Target, ()>,
    node_map: HashMap<Target, NodeIndex>,
}

impl BuildPlan {
    /// Resolve `roots` and everything they depend on.
    ///
    /// Fails with [`QuireError::Cycle`] when a target depends on itself,
    /// directly or transitively.
    pub fn new(tasks: &TaskGraph, roots: &[Target]) -> Result<Self> {
        let mut plan = Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        };

        let mut queue: VecDeque<Target> = VecDeque::new();
        for root in roots {
            plan.ensure_node(root.clone());
            queue.push_back(root.clone());
        }

        while let Some(target) = queue.pop_front() {
            let resolution = tasks.resolve(&target)?;
            let from = plan.ensure_node(target.clone());
            for dep in resolution.deps() {
                let known = plan.node_map.contains_key(dep);
                let to = plan.ensure_node(dep.clone());
                if !plan.graph.contains_edge(from, to) {
                    plan.graph.add_edge(from, to, ());
                }
                if !known {
                    queue.push_back(dep.clone());
                }
            }
        }

        plan.detect_cycles()?;
        Ok(plan)
    }

    fn ensure_node(&mut self, target: Target) -> NodeIndex {
        if let Some(&index) = self.node_map.get(&target) {
            index
        } else {
            let index = self.graph.add_node(target.clone());
            self.node_map.insert(target, index);
            index
        }
    }

    fn detect_cycles(&self) -> Result<()> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|n| (n, Color::White)).collect();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            if matches!(colors.get(&node), Some(Color::White))
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                let chain = cycle.iter().map(|&i| self.graph[i].to_string()).collect::<Vec<_>>().join(" → ");
                return Err(QuireError::Cycle {
                    chain,
                }
                .into());
            }
        }
        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for neighbor in self.graph.neighbors(node) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let start = path.iter().position(|&n| n == neighbor).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// Targets with every dependency before its dependents.
    pub fn order(&self) -> Result<Vec<Target>> {
        let indices = toposort(&self.graph, None).map_err(|_| anyhow!("Failed to determine build order"))?;
        Ok(indices.into_iter().rev().map(|i| self.graph[i].clone()).collect())
    }

    pub fn contains(&self, target: &Target) -> bool {
        self.node_map.contains_key(target)
    }

    /// Direct dependencies of `target` within the plan.
    pub fn dependencies(&self, target: &Target) -> Vec<Target> {
        self.node_map
            .get(target)
            .map(|&i| self.graph.neighbors(i).map(|n| self.graph[n].clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{TargetPattern, action, deps_fn};

    fn noop() -> crate::graph::Action {
        action(|_ctx| async { Ok(()) })
    }

    #[test]
    fn test_diamond_orders_dependencies_first() {
        let mut tasks = TaskGraph::new();
        tasks.phony("all", vec![Target::file("b"), Target::file("c")], noop());
        tasks.file("b", vec![Target::file("d")], noop());
        tasks.file("c", vec![Target::file("d")], noop());

        let plan = BuildPlan::new(&tasks, &[Target::phony("all")]).unwrap();
        assert_eq!(plan.len(), 4);
        let order = plan.order().unwrap();
        let pos = |t: &Target| order.iter().position(|o| o == t).unwrap();
        assert!(pos(&Target::file("d")) < pos(&Target::file("b")));
        assert!(pos(&Target::file("d")) < pos(&Target::file("c")));
        assert!(pos(&Target::file("b")) < pos(&Target::phony("all")));
    }

    #[test]
    fn test_cycle_names_chain() {
        let mut tasks = TaskGraph::new();
        tasks.file("a", vec![Target::file("b")], noop());
        tasks.file("b", vec![Target::file("c")], noop());
        tasks.file("c", vec![Target::file("a")], noop());

        let err = BuildPlan::new(&tasks, &[Target::file("a")]).err().unwrap();
        match err.downcast_ref::<QuireError>() {
            Some(QuireError::Cycle { chain }) => assert_eq!(chain, "a → b → c → a"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_rule_dependencies_are_followed() {
        let mut tasks = TaskGraph::new();
        tasks.rule(
            TargetPattern::glob("out/*.html").unwrap(),
            deps_fn(|path| {
                let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
                Ok(vec![Target::file(format!("src/{stem}.md"))])
            }),
            noop(),
        );

        let plan = BuildPlan::new(&tasks, &[Target::file("out/ch1.html")]).unwrap();
        assert!(plan.contains(&Target::file("src/ch1.md")));
        assert_eq!(plan.dependencies(&Target::file("out/ch1.html")), vec![Target::file("src/ch1.md")]);
    }
}
