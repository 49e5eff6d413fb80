//! The dependency graph (C6) and the builder that constructs it from
//! observed records (C7).

mod builder;
mod node;

pub use builder::build_graph;
pub use node::{CpuNodeData, Graph, Node, NetworkNodeData, NodeIndex, NodeKind};
