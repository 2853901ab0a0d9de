use clap::Parser;
use std::process::ExitCode;
use voxdown::{run, Args};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(summary) => {
            log::info!(
                "downsampled {} -> {} points at voxel size {}",
                summary.input_points,
                summary.output_points,
                args.voxel_size
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
