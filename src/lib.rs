#![forbid(unsafe_code)]

//! Command-line front end: read a PCD file, voxel-downsample it, write the
//! result.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use voxdown_filters::{check_voxel_size, voxel_downsample};
use voxdown_io::{read_pcd, write_pcd, DataFormat};

#[derive(Debug, Parser)]
#[command(name = "voxdown", version, about = "Voxel grid downsampling for PCD point clouds")]
pub struct Args {
    /// Source PCD file.
    pub input: PathBuf,

    /// Destination PCD file; replaced atomically.
    pub output: PathBuf,

    /// Voxel edge length, in the cloud's units.
    #[arg(short = 's', long, default_value_t = 1.0)]
    pub voxel_size: f32,

    /// Write ASCII records instead of binary.
    #[arg(long)]
    pub ascii: bool,
}

impl Args {
    pub fn format(&self) -> DataFormat {
        if self.ascii {
            DataFormat::Ascii
        } else {
            DataFormat::Binary
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub input_points: usize,
    pub output_points: usize,
}

pub fn run(args: &Args) -> Result<Summary> {
    // Rejected before either path is touched.
    check_voxel_size(args.voxel_size)?;

    let cloud = read_pcd(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let aabb = cloud.aabb();
    log::info!(
        "read {} points from {} (extent {:?})",
        cloud.len(),
        args.input.display(),
        aabb.extent()
    );

    let reduced = voxel_downsample(&cloud, args.voxel_size)
        .with_context(|| format!("failed to downsample {}", args.input.display()))?;

    write_pcd(&args.output, &reduced, args.format())
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    log::info!(
        "wrote {} points to {} ({} PCD)",
        reduced.len(),
        args.output.display(),
        args.format()
    );

    Ok(Summary {
        input_points: cloud.len(),
        output_points: reduced.len(),
    })
}
