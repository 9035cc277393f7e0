// Core data structures and algorithms for Glassbox.

pub mod call_chain;
pub mod capture;
pub mod graph;
pub mod ident;
pub mod layout;
pub mod value;
