mod config;
pub mod prompts;
mod translator;

pub use config::{
    default_checkpoint_for, default_output_for, init_default_config, PipelineConfig, PipelineOverrides,
};
pub use translator::{LocalizationPipeline, RunPlan, RunReport};
