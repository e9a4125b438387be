pub mod cluster;
pub mod display;
pub mod filters;
pub mod lod;
pub mod point;
pub mod selection;
pub mod symbology;
pub mod viewport;

pub use cluster::*;
pub use display::*;
pub use filters::*;
pub use lod::*;
pub use point::*;
pub use selection::*;
pub use viewport::*;
