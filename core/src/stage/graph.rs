use std::collections::{HashMap, HashSet};

use crate::error::GraphError;

use super::types::Stage;

/// Position of a stage in the graph arena.
pub type StageIndex = usize;

/// Stage dependency graph (DAG) stored as an arena.
///
/// Edges are kept as index lists in both directions so stages never hold
/// references to each other.
#[derive(Debug, Clone, Default)]
pub struct StageGraph {
    stages: Vec<Stage>,

    /// next[i]: stages unblocked by stage i
    next: Vec<Vec<StageIndex>>,

    /// prerequisites[i]: stages that must finish before stage i, in declaration order
    prerequisites: Vec<Vec<StageIndex>>,

    by_id: HashMap<String, StageIndex>,
}

impl StageGraph {
    pub fn builder() -> StageGraphBuilder {
        StageGraphBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, index: StageIndex) -> &Stage {
        &self.stages[index]
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    pub fn index_of(&self, id: &str) -> Option<StageIndex> {
        self.by_id.get(id).copied()
    }

    pub fn next(&self, index: StageIndex) -> &[StageIndex] {
        &self.next[index]
    }

    pub fn prerequisites(&self, index: StageIndex) -> &[StageIndex] {
        &self.prerequisites[index]
    }

    /// Marks every stage reachable from `root` through `next` edges.
    pub fn reachable_from(&self, root: StageIndex) -> Vec<bool> {
        let mut seen = vec![false; self.stages.len()];
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            if std::mem::replace(&mut seen[index], true) {
                continue;
            }
            stack.extend(self.next[index].iter().copied().filter(|&n| !seen[n]));
        }
        seen
    }

    /// Topological layers of the subgraph reachable from `root` (Kahn's
    /// algorithm). Stages in one layer have no ordering between them.
    pub fn layers(&self, root: StageIndex) -> Vec<Vec<StageIndex>> {
        let reachable = self.reachable_from(root);
        let mut in_degree: Vec<usize> = (0..self.stages.len())
            .map(|i| {
                self.prerequisites[i]
                    .iter()
                    .filter(|&&p| reachable[p])
                    .count()
            })
            .collect();

        let mut layers = Vec::new();
        let mut current = vec![root];
        while !current.is_empty() {
            let mut following = Vec::new();
            for &index in &current {
                for &dependent in &self.next[index] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        following.push(dependent);
                    }
                }
            }
            following.sort_unstable();
            layers.push(std::mem::replace(&mut current, following));
        }
        layers
    }

    /// Validate that the graph is acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        if let Some(cycle) = self.detect_cycle() {
            return Err(GraphError::CircularDependency(cycle));
        }
        Ok(())
    }

    /// Detect circular dependencies using DFS
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of stages, E = number of edges
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for index in 0..self.stages.len() {
            if !visited.contains(&index) && self.dfs_cycle(index, &mut visited, &mut stack) {
                return Some(self.format_cycle_path(&stack));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: StageIndex,
        visited: &mut HashSet<StageIndex>,
        stack: &mut Vec<StageIndex>,
    ) -> bool {
        visited.insert(node);
        stack.push(node);

        for &next in &self.next[node] {
            // Back edge into the current path closes a cycle.
            if let Some(pos) = stack.iter().position(|&x| x == next) {
                stack.push(next);
                *stack = stack[pos..].to_vec();
                return true;
            }

            if !visited.contains(&next) && self.dfs_cycle(next, visited, stack) {
                return true;
            }
        }

        stack.pop();
        false
    }

    fn format_cycle_path(&self, stack: &[StageIndex]) -> String {
        stack
            .iter()
            .map(|&i| self.stages[i].id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[derive(Debug, Default)]
pub struct StageGraphBuilder {
    stages: Vec<Stage>,
    edges: Vec<(String, String)>,
}

impl StageGraphBuilder {
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Declares that `to` runs after `from`.
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn build(self) -> Result<StageGraph, GraphError> {
        let mut by_id = HashMap::new();
        for (index, stage) in self.stages.iter().enumerate() {
            if by_id.insert(stage.id.clone(), index).is_some() {
                return Err(GraphError::DuplicateStageId {
                    id: stage.id.clone(),
                    first: stage.id.clone(),
                    second: stage.id.clone(),
                });
            }
            check_query_file_stems(stage)?;
        }

        let mut next = vec![Vec::new(); self.stages.len()];
        let mut prerequisites = vec![Vec::new(); self.stages.len()];
        for (from, to) in &self.edges {
            let lookup = |id: &String| {
                by_id
                    .get(id)
                    .copied()
                    .ok_or_else(|| GraphError::NextStageNotFound {
                        stage_id: from.clone(),
                        missing: id.clone(),
                    })
            };
            let (from_index, to_index) = (lookup(from)?, lookup(to)?);
            if next[from_index].contains(&to_index) {
                continue;
            }
            next[from_index].push(to_index);
            prerequisites[to_index].push(from_index);
        }

        let graph = StageGraph {
            stages: self.stages,
            next,
            prerequisites,
            by_id,
        };
        graph.validate()?;
        Ok(graph)
    }
}

/// Query output files are named after the file stem, so two files with
/// the same stem in one stage would overwrite each other's output.
fn check_query_file_stems(stage: &Stage) -> Result<(), GraphError> {
    let mut stems = HashSet::new();
    for file in &stage.query_files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !stems.insert(stem.clone()) {
            return Err(GraphError::DuplicateQueryFileStem {
                stage_id: stage.id.clone(),
                stem,
            });
        }
    }
    Ok(())
}
