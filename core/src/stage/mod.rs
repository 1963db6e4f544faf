mod cancel;
mod exit;
mod gate;
mod graph;
mod load;
mod run;
mod runner;
mod types;

pub use cancel::RunCancellation;
pub use exit::ExitGate;
pub use gate::PrerequisiteGate;
pub use graph::{StageGraph, StageGraphBuilder, StageIndex};
pub use load::{load_stage_graph, LoadedGraph};
pub use run::{RunOptions, RunReport, StageRunner};
pub use runner::QueryCompletionFn;
pub use types::{EffectiveStage, ResolvedFlags, Stage, StageFlags};
