pub mod bm25;
pub mod engine;
pub mod hybrid;
pub mod path_index;
pub mod render;
pub mod repository;
pub mod scope;
pub mod vector;
