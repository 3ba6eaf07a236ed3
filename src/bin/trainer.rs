use anyhow::{bail, Context};
use clap::Parser;
use vehicle_match::checkpoint::Checkpoint;
use vehicle_match::config_loader::{extract_config, TrainingConfig};
use vehicle_match::dataset::{synthetic_records, write_csv, Dataset};
use vehicle_match::feature_schema::{schema_fingerprint, SCHEMA_VERSION};
use vehicle_match::logging::init_logging;
use vehicle_match::training::train_from_dataset;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the vehicle match model and write a checkpoint")]
struct Args {
    /// Labeled CSV: request fields plus a `label` column
    #[arg(short, long, conflicts_with = "synthetic")]
    csv: Option<String>,

    /// Train on this many generated rows instead of a CSV
    #[arg(long)]
    synthetic: Option<usize>,

    /// Also write the generated rows to this CSV
    #[arg(long, requires = "synthetic")]
    export_csv: Option<String>,

    /// Checkpoint destination, defaults to the configured path
    #[arg(short, long)]
    output: Option<String>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    validation_ratio: Option<f64>,

    #[arg(long)]
    validation_interval: Option<usize>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn training_config(&self, base: TrainingConfig) -> TrainingConfig {
        TrainingConfig {
            epochs: self.epochs.unwrap_or(base.epochs),
            learning_rate: self.learning_rate.unwrap_or(base.learning_rate),
            validation_interval: self.validation_interval.unwrap_or(base.validation_interval),
            validation_ratio: self.validation_ratio.unwrap_or(base.validation_ratio),
            seed: self.seed.unwrap_or(base.seed),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    // Only the training section after CLI overrides is validated, so a bad
    // file value can be corrected from the command line.
    let config = extract_config().context("failed to load configuration")?;
    init_logging(args.log_level.as_deref().unwrap_or(&config.log_level));

    let training = args.training_config(config.training.clone());
    training.validate()?;

    let dataset = match (&args.csv, args.synthetic) {
        (Some(path), None) => Dataset::from_csv(path)?,
        (None, Some(rows)) => {
            let records = synthetic_records(rows, training.synthetic_seed())?;
            if let Some(path) = &args.export_csv {
                write_csv(&records, path)?;
                tracing::info!(path = %path, rows, "synthetic dataset exported");
            }
            Dataset::from_records(records)?
        }
        _ => bail!("pass exactly one of --csv or --synthetic"),
    };

    tracing::info!(
        schema = SCHEMA_VERSION,
        fingerprint = %schema_fingerprint(),
        rows = dataset.len(),
        positive_rate = dataset.positive_rate(),
        "dataset ready"
    );

    let outcome = train_from_dataset(&dataset, &training)?;

    // Written once, only after every epoch completed without divergence.
    let output = args.output.unwrap_or(config.checkpoint_path);
    if output.trim().is_empty() {
        bail!("checkpoint output path cannot be empty");
    }
    let checkpoint = Checkpoint::new(outcome.parameters, outcome.summary)?;
    checkpoint.save(&output)?;

    println!("✅ Model saved to {output}");
    println!("   SHA256: {}", checkpoint.parameters_sha256);
    println!(
        "   Val loss: {:.4} | Val acc: {:.3}",
        checkpoint.training.final_validation_loss, checkpoint.training.final_validation_accuracy
    );

    Ok(())
}
