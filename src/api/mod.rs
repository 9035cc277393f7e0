// Serialization boundary for the render frontend.

pub mod dto;
