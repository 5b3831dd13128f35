pub mod annotation;
pub mod flatten;
pub mod graph;
pub mod matcher;
pub mod pipeline;
pub mod reconstruct;

pub use matcher::MatchOptions;
pub use pipeline::{read_drawing, write_drawing};
