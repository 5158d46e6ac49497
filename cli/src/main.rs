use anyhow::Result;
use clap::Parser;
use common::AppConfig;
use common::logger::init_from_config;
use gradeflow::{Args, grade_files, write_output};

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::from_env();
    // Results go to stdout when no output file is given; keep logs out of it.
    if args.output.is_none() {
        config.log_to_stdout = false;
    }
    let _guard = init_from_config(&config);

    let output = grade_files(&args, &config)?;
    write_output(&output, &args)
}
