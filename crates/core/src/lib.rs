#![forbid(unsafe_code)]

pub mod bbox;
pub mod cloud;
pub mod error;
pub mod point;

pub use bbox::Aabb;
pub use cloud::{Colors, Normals, PointCloud};
pub use error::{Error, Result};
pub use point::Point;
