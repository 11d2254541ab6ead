pub mod animate;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod harvest;
pub mod pipeline;
pub mod store;
pub mod table;
