//! Command-line front end: loads a rubric and submissions from JSON files, grades them and
//! writes the results as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use common::AppConfig;
use marker::schema::{AssessmentSchema, validate_rubric};
use marker::{GradeOutput, Grader, Rubric, Submission};
use serde::de::DeserializeOwned;

#[derive(Parser, Debug)]
#[command(version, about = "Grade submissions against a rubric")]
pub struct Args {
    /// Rubric JSON file
    #[arg(long)]
    pub rubric: PathBuf,
    /// Submissions JSON file (an array of submissions)
    #[arg(long)]
    pub submissions: PathBuf,
    /// Write results here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Assessment schema JSON file to check the rubric against before grading
    #[arg(long)]
    pub schema: Option<PathBuf>,
    /// Pretty-print the results
    #[arg(long)]
    pub pretty: bool,
}

fn load_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid {what} JSON in {}", path.display()))
}

pub fn load_rubric(path: &Path) -> Result<Rubric> {
    load_json(path, "rubric")
}

pub fn load_submissions(path: &Path) -> Result<Vec<Submission>> {
    load_json(path, "submissions")
}

/// Validates and grades everything `args` names.
///
/// # Errors
///
/// Unreadable or malformed input files, an invalid rubric, a rubric that does not fit the
/// schema, or a fatal grading failure.
pub fn grade_files(args: &Args, config: &AppConfig) -> Result<GradeOutput> {
    let rubric = load_rubric(&args.rubric)?;
    let submissions = load_submissions(&args.submissions)?;

    rubric
        .validate()
        .with_context(|| format!("Rubric '{}' is invalid", rubric.name))?;

    if let Some(path) = &args.schema {
        let schema: AssessmentSchema = load_json(path, "schema")?;
        let errors = validate_rubric(&rubric, &schema.questions);
        if !errors.is_empty() {
            for error in &errors {
                tracing::error!(schema = %schema.name, "{error}");
            }
            bail!(
                "Rubric '{}' does not fit schema '{}':\n  - {}",
                rubric.name,
                schema.name,
                errors.join("\n  - ")
            );
        }
    }

    let mut progress = |done: usize, total: usize| -> std::result::Result<(), String> {
        tracing::info!("Graded {done}/{total} submissions");
        Ok(())
    };
    let output = Grader::from_config(config).grade(&rubric, &submissions, Some(&mut progress))?;
    Ok(output)
}

/// Serialises `output` to the requested destination.
pub fn write_output(output: &GradeOutput, args: &Args) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(output)?
    } else {
        serde_json::to_string(output)?
    };
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(path, json)
                .with_context(|| format!("Failed to write results to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Results written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
