#![deny(unused_imports)]

pub mod artifact;
pub mod blend;
pub mod boost;
pub mod data;
pub mod hooks;
pub mod preprocess;
pub mod score;
