use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::domain::RequestSchema;

#[derive(Parser)]
#[command(name = "agri-yield")]
#[command(version = "0.1.0")]
#[command(about = "Agricultural yield prediction service and ONNX model tools", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the prediction API (default when no command is given)
    Serve(ServeArgs),
    /// Convert double-precision tensors in a model to single precision
    Repair(RepairArgs),
    /// Write a placeholder ONNX model
    CreateModel {
        /// Placeholder layout
        #[arg(long, value_enum, default_value = "agronomic")]
        kind: PlaceholderKind,
        /// Input width for the identity placeholder
        #[arg(long, default_value_t = 6)]
        input_dim: usize,
        /// Output path (defaults per kind)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Try every load strategy on a model and run one sample inference
    Probe {
        /// Model file to probe
        #[arg(short, long, default_value = "working_agricultural_model.onnx")]
        model: PathBuf,
        /// Request schema used for the sample
        #[arg(long, value_enum, default_value = "agronomic")]
        schema: RequestSchema,
        /// Input width for the features schema
        #[arg(long, default_value_t = 4)]
        feature_dim: usize,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Directory holding default.toml and environment overrides
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,
    /// Model file (overrides model.path)
    #[arg(short, long)]
    pub model: Option<PathBuf>,
    /// Listen port (overrides server.port)
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Request schema (overrides model.schema)
    #[arg(long, value_enum)]
    pub schema: Option<RequestSchema>,
}

#[derive(Args, Debug, Clone)]
pub struct RepairArgs {
    /// Model to repair
    #[arg(short, long, default_value = "agri_yield.onnx")]
    pub input: PathBuf,
    /// Where to write the repaired model (must differ from input)
    #[arg(short, long, default_value = "agri_yield_fixed.onnx")]
    pub output: PathBuf,
    /// Load the repaired model in the runtime afterwards
    #[arg(long)]
    pub verify: bool,
    /// Write an identity placeholder model when repair or verification fails
    #[arg(long)]
    pub placeholder_on_failure: bool,
    /// Path of the placeholder model
    #[arg(long, default_value = "simple_working_model.onnx")]
    pub placeholder_output: PathBuf,
    /// Input width of the placeholder model
    #[arg(long, default_value_t = 6)]
    pub placeholder_dim: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlaceholderKind {
    /// Six named inputs, weighted sum and sigmoid
    Agronomic,
    /// One `[1, dim]` input passed through
    Identity,
}

impl PlaceholderKind {
    pub fn default_output(&self) -> PathBuf {
        match self {
            Self::Agronomic => PathBuf::from("working_agricultural_model.onnx"),
            Self::Identity => PathBuf::from("simple_working_model.onnx"),
        }
    }
}
