pub mod parser;
pub mod pipeline;
pub mod pruner;
pub mod renderer;
pub mod traits;
pub mod types;
