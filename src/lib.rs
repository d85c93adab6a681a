pub mod catalog;
pub mod correlate;
pub mod describe;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod pipeline;
