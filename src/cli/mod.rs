//! Command-line interface for the pipeline, the server and the prediction form

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::client::{PredictionClient, RiskBand, DEFAULT_API_URL};
use crate::config::{PipelineConfig, Schema};
use crate::data::DataIngestion;
use crate::pipeline::Pipeline;
use crate::preprocessing::DataTransformation;
use crate::serving::{run_server, DiabetesInput, ServerConfig};
use crate::tracking::{parse_tracking_uri, ModelRegistry};
use crate::training::{ModelTrainer, TrainingReport};
use crate::validation::{ensure_validated, read_status, DataValidation};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(230, 100, 100) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn step_failed() {
    println!("{}", bad("failed"));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

/// Run `f` between a step_run/step_done pair.
fn step<T>(msg: &str, f: impl FnOnce() -> crate::error::Result<T>, detail: impl FnOnce(&T) -> String) -> anyhow::Result<T> {
    step_run(msg);
    let start = Instant::now();
    match f() {
        Ok(value) => {
            step_done(&format!("{} in {:?}", detail(&value), start.elapsed()));
            Ok(value)
        }
        Err(e) => {
            step_failed();
            Err(e.into())
        }
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "diabetes-mlops")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train, publish and serve a diabetes progression model")]
#[command(long_about = None)]
pub struct Cli {
    /// Pipeline configuration file
    #[arg(short, long, global = true, default_value = "configs/config.yaml")]
    pub config: PathBuf,

    /// Column schema file
    #[arg(short, long, global = true, default_value = "configs/schema.yaml")]
    pub schema: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest, validate, transform and train in one go
    Run,

    /// Write the raw dataset
    Ingest,

    /// Check the raw dataset against the schema and record the status
    Validate,

    /// Transform the raw dataset and train/publish the champion
    Train,

    /// Serve the published model over HTTP
    Serve {
        /// Bind address (overrides serving.host)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides serving.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one record to a running server
    Predict {
        /// Prediction service base URL
        #[arg(long, env = "API_URL", default_value = DEFAULT_API_URL)]
        url: String,

        #[command(flatten)]
        form: PatientForm,
    },

    /// Show the recorded validation status and registry versions
    Status,
}

/// Raw patient values, defaulting to the form's starting record
#[derive(Args, Debug, Clone)]
pub struct PatientForm {
    #[arg(long, default_value_t = 59.0)]
    pub age: f64,
    #[arg(long, default_value_t = 2.0)]
    pub sex: f64,
    #[arg(long, default_value_t = 32.1)]
    pub bmi: f64,
    /// Average blood pressure
    #[arg(long, default_value_t = 101.0)]
    pub bp: f64,
    /// Total serum cholesterol
    #[arg(long, default_value_t = 157.0)]
    pub s1: f64,
    /// Low-density lipoproteins
    #[arg(long, default_value_t = 93.2)]
    pub s2: f64,
    /// High-density lipoproteins
    #[arg(long, default_value_t = 38.0)]
    pub s3: f64,
    /// Total cholesterol / HDL
    #[arg(long, default_value_t = 4.0)]
    pub s4: f64,
    /// Log of serum triglycerides
    #[arg(long, default_value_t = 4.85)]
    pub s5: f64,
    /// Blood sugar level
    #[arg(long, default_value_t = 87.0)]
    pub s6: f64,
}

impl From<PatientForm> for DiabetesInput {
    fn from(f: PatientForm) -> Self {
        DiabetesInput {
            age: f.age,
            sex: f.sex,
            bmi: f.bmi,
            bp: f.bp,
            s1: f.s1,
            s2: f.s2,
            s3: f.s3,
            s4: f.s4,
            s5: f.s5,
            s6: f.s6,
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    Ok(PipelineConfig::from_yaml_file(path)?)
}

fn print_training(report: &TrainingReport) {
    section("Families");
    println!(
        "  {:<20} {:>8} {:>8} {:>8} {:>8}",
        muted("family"),
        muted("cv_r2"),
        muted("r2"),
        muted("rmse"),
        muted("mae")
    );
    for c in &report.candidates {
        let marker = if c.family == report.champion.family { ok("★") } else { dim(" ") };
        println!(
            "  {} {:<18} {:>8.4} {:>8.4} {:>8.2} {:>8.2}",
            marker,
            c.family.to_string(),
            c.cv_r2,
            c.metrics.r2,
            c.metrics.rmse,
            c.metrics.mae
        );
    }

    section("Champion");
    kv("Family", &report.champion.family.to_string());
    kv("Params", &report.champion.params.to_string());
    kv("Test R²", &format!("{:.4}", report.champion.metrics.r2));
    kv("Registry version", &report.registry_version.to_string());
    kv("Local copy", &report.model_path.display().to_string());
    println!();
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(config_path: &Path, schema_path: &Path) -> anyhow::Result<()> {
    section("Pipeline");
    let config = load_config(config_path)?;
    let schema = Schema::from_yaml_file(schema_path)?;

    let pipeline = Pipeline::new(config, schema);
    let summary = step("Running ingest → validate → transform → train", || pipeline.run(), |s| {
        format!("{} train / {} test rows", s.n_train, s.n_test)
    })?;

    kv("Raw data", &summary.raw_path.display().to_string());
    kv("Validation", &format!("passed ({} columns)", summary.validation.checked_columns));
    print_training(&summary.training);
    Ok(())
}

pub fn cmd_ingest(config_path: &Path) -> anyhow::Result<()> {
    section("Ingest");
    let config = load_config(config_path)?;
    let path = step("Writing raw dataset", || DataIngestion::new(&config.data).initiate(), |p| {
        p.display().to_string()
    })?;
    kv("Rows", &config.data.n_samples.to_string());
    kv("Path", &path.display().to_string());
    println!();
    Ok(())
}

pub fn cmd_validate(config_path: &Path, schema_path: &Path) -> anyhow::Result<()> {
    section("Validate");
    let config = load_config(config_path)?;
    let schema = Schema::from_yaml_file(schema_path)?;

    let report = step(
        "Checking columns against schema",
        || DataValidation::new(&config, schema).validate_all_columns(),
        |r| format!("{} columns", r.checked_columns),
    )?;

    for failure in &report.failures {
        println!("  {} {}", bad("✗"), failure);
    }
    let verdict = if report.status { ok("passed") } else { bad("failed") };
    println!("  {:<18} {}", muted("Status"), verdict);
    println!();

    report.into_result()?;
    Ok(())
}

pub fn cmd_train(config_path: &Path) -> anyhow::Result<()> {
    section("Train");
    let config = load_config(config_path)?;
    ensure_validated(&config.artifacts.status_path())?;

    let data = step("Splitting and scaling", || DataTransformation::new(&config).initiate(), |d| {
        format!("{} train / {} test rows", d.x_train.nrows(), d.x_test.nrows())
    })?;

    let report = step(
        &format!("Grid-searching {} families", config.training.models.len().to_string().cyan()),
        || ModelTrainer::new(&config).initiate_model_trainer(&data),
        |r| format!("champion {}", r.champion.family),
    )?;

    print_training(&report);
    Ok(())
}

pub async fn cmd_serve(config_path: &Path, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut server = ServerConfig::from_pipeline(&config);
    if let Some(host) = host {
        server = server.with_host(host);
    }
    if let Some(port) = port {
        server = server.with_port(port);
    }

    section("Serve");
    kv("Address", &format!("http://{}:{}", server.host, server.port));
    kv("Model", &config.mlflow.model_name);
    kv("Stage", &config.mlflow.stage);
    println!();

    run_server(&config, server).await
}

pub async fn cmd_predict(url: &str, form: PatientForm) -> anyhow::Result<()> {
    section("Predict");
    let input: DiabetesInput = form.into();
    let client = PredictionClient::new(url)?;

    step_run(&format!("Calling {}", client.base_url()));
    let start = Instant::now();
    let prediction = match client.predict(&input).await {
        Ok(p) => {
            step_done(&format!("{:?}", start.elapsed()));
            p
        }
        Err(e) => {
            step_failed();
            return Err(e.into());
        }
    };

    let band = RiskBand::from_prediction(prediction);
    let band_label = match band {
        RiskBand::Low => ok(&band.to_string()),
        RiskBand::Moderate => accent(&band.to_string()),
        RiskBand::High => bad(&band.to_string()),
    };
    println!();
    println!("  {:<18} {}", muted("Progression"), format!("{:.2}", prediction).white().bold());
    println!("  {:<18} {}", muted("Risk"), band_label);
    println!();
    Ok(())
}

pub fn cmd_status(config_path: &Path) -> anyhow::Result<()> {
    section("Status");
    let config = load_config(config_path)?;

    let status_path = config.artifacts.status_path();
    let validation = match read_status(&status_path)? {
        Some(true) => ok("passed"),
        Some(false) => bad("failed"),
        None => dim("not run"),
    };
    println!("  {:<18} {}", muted("Validation"), validation);

    for (label, path) in [("Model file", config.artifacts.model_path()), ("Scaler file", config.artifacts.scaler_path())] {
        let state = if path.exists() { ok("present") } else { dim("missing") };
        println!("  {:<18} {} {}", muted(label), state, dim(&path.display().to_string()));
    }

    section("Registry");
    let registry = parse_tracking_uri(&config.mlflow.tracking_uri).and_then(ModelRegistry::open);
    match registry.and_then(|r| r.get_registered_model(&config.mlflow.model_name)) {
        Ok(model) if !model.versions.is_empty() => {
            for v in &model.versions {
                println!(
                    "  v{:<4} {:<12} {}",
                    v.version,
                    v.stage.to_string(),
                    dim(&v.created_at)
                );
            }
        }
        Ok(_) => println!("  {}", dim("no versions registered")),
        Err(e) => println!("  {}", dim(&e.to_string())),
    }
    println!();
    Ok(())
}
