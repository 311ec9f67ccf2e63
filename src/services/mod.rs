pub mod embedding;
pub mod fragments;
pub mod index;
pub mod pipeline;
pub mod probe;
pub mod ranker;
pub mod resolver;
pub mod retrieval;
