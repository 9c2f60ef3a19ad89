pub mod aggregate;
pub mod engine;
pub mod error;
pub mod io;
pub mod model;
pub mod rank;
pub mod reader;
pub mod stats;
