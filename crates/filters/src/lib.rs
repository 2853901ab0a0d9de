#![forbid(unsafe_code)]

pub mod voxel_downsample;

pub use voxel_downsample::{
    check_voxel_size, voxel_downsample, voxel_downsample_with_trace, VoxelKey,
};
