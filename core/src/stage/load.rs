//! Loads a stage graph from JSON stage files.
//!
//! A stage file names its follow-up stages by path (`next`), relative to its
//! own directory. Loading starts at the root file and walks every `next`
//! reference; each file becomes one stage whose id is the file stem.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::client::Session;
use crate::error::GraphError;

use super::graph::StageGraph;
use super::types::{Stage, StageFlags};

#[derive(Debug, Default, Deserialize)]
struct StageFile {
    #[serde(default)]
    catalog: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    session_params: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    queries: Vec<String>,
    #[serde(default)]
    query_files: Vec<String>,
    #[serde(default)]
    start_on_new_client: bool,
    #[serde(default)]
    abort_on_error: Option<bool>,
    #[serde(default)]
    save_output: Option<bool>,
    #[serde(default)]
    save_json: Option<bool>,
    #[serde(default)]
    output_path: Option<String>,
    #[serde(default)]
    next: Vec<String>,
}

/// A loaded graph together with the id of the stage the run starts from.
#[derive(Debug, Clone)]
pub struct LoadedGraph {
    pub graph: StageGraph,
    pub root: String,
}

pub fn load_stage_graph(root_file: &Path) -> Result<LoadedGraph, GraphError> {
    let root_path = canonical(root_file)?;

    let mut builder = StageGraph::builder();
    let mut ids_by_path: HashMap<PathBuf, String> = HashMap::new();
    let mut paths_by_id: HashMap<String, PathBuf> = HashMap::new();
    let mut pending_edges: Vec<(String, PathBuf)> = Vec::new();
    let mut queue = VecDeque::from([root_path.clone()]);

    while let Some(path) = queue.pop_front() {
        if ids_by_path.contains_key(&path) {
            continue;
        }

        let (stage, next_paths) = read_stage(&path)?;
        if let Some(first) = paths_by_id.get(&stage.id) {
            return Err(GraphError::DuplicateStageId {
                id: stage.id.clone(),
                first: first.display().to_string(),
                second: path.display().to_string(),
            });
        }
        tracing::debug!(stage_id = %stage.id, path = %path.display(), "loaded stage");

        for next in next_paths {
            pending_edges.push((stage.id.clone(), next.clone()));
            queue.push_back(next);
        }
        ids_by_path.insert(path.clone(), stage.id.clone());
        paths_by_id.insert(stage.id.clone(), path);
        builder = builder.stage(stage);
    }

    for (from, next_path) in pending_edges {
        // Every queued path was loaded above, so the lookup cannot miss.
        if let Some(to) = ids_by_path.get(&next_path) {
            builder = builder.edge(from, to.clone());
        }
    }

    let graph = builder.build()?;
    let root = ids_by_path
        .remove(&root_path)
        .unwrap_or_else(|| stage_id_of(&root_path));
    Ok(LoadedGraph { graph, root })
}

fn read_stage(path: &Path) -> Result<(Stage, Vec<PathBuf>), GraphError> {
    let raw = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: StageFile = serde_json::from_str(&raw).map_err(|source| GraphError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let next = file
        .next
        .iter()
        .map(|n| canonical(&base_dir.join(n)))
        .collect::<Result<Vec<_>, _>>()?;

    let stage = Stage {
        id: stage_id_of(path),
        session: Session {
            catalog: file.catalog,
            schema: file.schema,
            params: file.session_params,
        },
        start_on_new_client: file.start_on_new_client,
        flags: StageFlags {
            abort_on_error: file.abort_on_error,
            save_output: file.save_output,
            save_json: file.save_json,
        },
        queries: file.queries,
        query_files: file.query_files.iter().map(|f| base_dir.join(f)).collect(),
        output_path: Some(
            file.output_path
                .map(|p| base_dir.join(p))
                .unwrap_or_else(|| base_dir.to_path_buf()),
        ),
    };
    Ok((stage, next))
}

fn canonical(path: &Path) -> Result<PathBuf, GraphError> {
    path.canonicalize().map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The file name without its directory and extension.
fn stage_id_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_graph_with_shared_descendant() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(
            dir.path(),
            "main.json",
            r#"{
                "catalog": "hive",
                "schema": "tpch_sf1",
                "session_params": {"query_max_run_time": "30m"},
                "abort_on_error": true,
                "queries": ["select 1"],
                "next": ["stages/left.json", "stages/right.json"]
            }"#,
        );
        write(
            dir.path(),
            "stages/left.json",
            r#"{"query_files": ["../sql/q1.sql"], "next": ["join.json"]}"#,
        );
        write(
            dir.path(),
            "stages/right.json",
            r#"{"save_output": true, "next": ["./join.json"]}"#,
        );
        write(dir.path(), "stages/join.json", r#"{"queries": ["select 2"]}"#);

        let loaded = load_stage_graph(&root).unwrap();
        let graph = &loaded.graph;

        assert_eq!(loaded.root, "main");
        assert_eq!(graph.len(), 4);

        let main = graph.stage(graph.index_of("main").unwrap());
        assert_eq!(main.session.catalog.as_deref(), Some("hive"));
        assert_eq!(main.flags.abort_on_error, Some(true));
        assert_eq!(main.output_path.as_deref(), root.canonicalize().unwrap().parent());

        let left = graph.stage(graph.index_of("left").unwrap());
        assert!(left.query_files[0].ends_with("stages/../sql/q1.sql"));

        let join = graph.index_of("join").unwrap();
        let prerequisites: Vec<&str> = graph
            .prerequisites(join)
            .iter()
            .map(|&i| graph.stage(i).id.as_str())
            .collect();
        assert_eq!(prerequisites, vec!["left", "right"]);
    }

    #[test]
    fn missing_next_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "main.json", r#"{"next": ["nope.json"]}"#);

        assert!(matches!(
            load_stage_graph(&root),
            Err(GraphError::Io { .. })
        ));
    }

    #[test]
    fn same_id_from_two_files_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "main.json", r#"{"next": ["a/s.json", "b/s.json"]}"#);
        write(dir.path(), "a/s.json", "{}");
        write(dir.path(), "b/s.json", "{}");

        assert!(matches!(
            load_stage_graph(&root),
            Err(GraphError::DuplicateStageId { ref id, .. }) if id == "s"
        ));
    }

    #[test]
    fn cyclic_stage_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "main.json", r#"{"next": ["loop.json"]}"#);
        write(dir.path(), "loop.json", r#"{"next": ["main.json"]}"#);

        assert!(matches!(
            load_stage_graph(&root),
            Err(GraphError::CircularDependency(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(dir.path(), "main.json", r#"{"queries": "#);

        assert!(matches!(
            load_stage_graph(&root),
            Err(GraphError::Parse { .. })
        ));
    }
}
