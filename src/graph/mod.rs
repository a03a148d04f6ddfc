pub mod construction;
pub mod model;
pub mod operator;

pub use construction::GraphLoader;
pub use model::DirectedGraph;
