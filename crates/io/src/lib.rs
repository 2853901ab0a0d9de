#![forbid(unsafe_code)]

pub mod header;
pub mod pcd;

pub use header::{DataFormat, Field, FieldKind, PcdHeader};
pub use pcd::{decode, encode, read_pcd, write_pcd};
