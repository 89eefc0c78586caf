pub mod callgraph;
pub mod extract;
pub mod parser;
pub mod pipeline;
pub mod references;
pub mod symbols;
