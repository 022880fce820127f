//! Machine configuration: on-disk/on-wire shape ([`types`]) plus structural
//! validation and condition compilation ([`compile`]).

pub mod compile;
pub mod types;
