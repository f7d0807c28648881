use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser};

use xml_loc_translator::batch::RunState;
use xml_loc_translator::pipeline::{
    default_output_for, init_default_config, LocalizationPipeline, PipelineConfig, PipelineOverrides, RunPlan,
};
use xml_loc_translator::progress::ConsoleProgress;
use xml_loc_translator::xml::compare_files;

#[derive(Parser, Debug)]
#[command(name = "xml-loc-translator")]
#[command(about = "Extract, translate and re-inject text in game-data XML files", long_about = None)]
struct Args {
    /// Generate default config + prompt files + glossary, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input XML file
    #[arg(value_name = "XML")]
    input: Option<PathBuf>,

    /// Output XML (default: <input_stem>_translated.xml)
    #[arg(short, long, value_name = "XML")]
    output: Option<PathBuf>,

    /// Do not write the translated XML
    #[arg(long)]
    no_inject: bool,

    /// Config file path (default: search for xml-loc-translator.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tag whose text is translated
    #[arg(long)]
    target_tag: Option<String>,

    /// Only take target tags that are direct children of this tag
    #[arg(long)]
    parent_tag: Option<String>,

    /// Target language code (e.g. pt, es, fr, ja)
    #[arg(long)]
    target_lang: Option<String>,

    /// Source language name used in prompts (default: English)
    #[arg(long)]
    source_label: Option<String>,

    /// Translation provider: gemini, openai, ollama, deepl
    #[arg(long)]
    provider: Option<String>,

    /// Provider model name
    #[arg(long)]
    model: Option<String>,

    /// Provider API key (or set <PROVIDER>_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Provider base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Provider request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Glossary JSON path
    #[arg(long, value_name = "JSON")]
    glossary: Option<PathBuf>,

    /// Import translations from JSON (address -> text)
    #[arg(long, value_name = "JSON")]
    import_json: Vec<PathBuf>,

    /// Import translations from CSV (xpath, translated_text columns)
    #[arg(long, value_name = "CSV")]
    import_csv: Vec<PathBuf>,

    /// Translate a single address (repeatable)
    #[arg(long, value_name = "ADDRESS")]
    suggest: Vec<String>,

    /// Batch-translate every pending text, resuming from the checkpoint
    #[arg(long)]
    translate: bool,

    /// Entries per batch (default: 120)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Pause between batches in milliseconds (default: 5000)
    #[arg(long)]
    batch_delay_ms: Option<u64>,

    /// Checkpoint JSON (default: <input_stem>.checkpoint.json)
    #[arg(long, value_name = "JSON")]
    checkpoint: Option<PathBuf>,

    /// Export translations as JSON
    #[arg(long, value_name = "JSON")]
    export_json: Option<PathBuf>,

    /// Export rows as CSV (xpath, original_text, translated_text)
    #[arg(long, value_name = "CSV")]
    export_csv: Option<PathBuf>,

    /// Export source texts as JSON for offline translation
    #[arg(long, value_name = "JSON")]
    export_source_json: Option<PathBuf>,

    /// Compare the output's tag counts with the input after writing
    #[arg(long)]
    validate: bool,

    /// Compare the tag counts of two XML files, then exit
    #[arg(long, num_args = 2, value_names = ["A", "B"])]
    validate_only: Option<Vec<PathBuf>>,

    /// Suppress progress lines on stderr
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xml_loc_translator=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    if let Some(pair) = args.validate_only.as_deref() {
        let [a, b] = pair else {
            return Err(anyhow::anyhow!("--validate-only needs exactly two files"));
        };
        let diff = compare_files(a, b)?;
        println!("{}", diff.summary());
        if !diff.identical {
            std::process::exit(1);
        }
        return Ok(());
    }

    let input = match args.input {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  xml-loc-translator <items.xml> --target-tag name [--parent-tag item] --translate\n\nTIPS:\n  - Default config search: xml-loc-translator.toml (upwards), or set XML_LOC_TRANSLATOR_CONFIG.\n  - Re-running --translate resumes from the checkpoint.\n"
            );
            return Ok(());
        }
    };
    let output = if args.no_inject {
        None
    } else {
        Some(args.output.clone().unwrap_or_else(|| default_output_for(&input)))
    };

    let cfg = PipelineConfig::from_input_and_args(
        &input,
        PipelineOverrides {
            config: args.config,
            provider: args.provider,
            parent_tag: args.parent_tag,
            target_tag: args.target_tag,
            target_lang: args.target_lang,
            source_label: args.source_label,
            model: args.model,
            api_key: args.api_key,
            endpoint: args.endpoint,
            timeout: args.timeout,
            batch_size: args.batch_size,
            batch_delay_ms: args.batch_delay_ms,
            checkpoint: args.checkpoint,
            glossary: args.glossary,
        },
    )
    .context("build config")?;

    let plan = RunPlan {
        import_json: args.import_json,
        import_csv: args.import_csv,
        suggest: args.suggest,
        translate: args.translate,
        export_json: args.export_json,
        export_csv: args.export_csv,
        export_source_json: args.export_source_json,
        output,
        validate: args.validate,
    };

    let mut pipeline = LocalizationPipeline::new(cfg, progress)?;
    let report = pipeline.run(&input, &plan)?;

    let batch_failed = matches!(
        report.batch.as_ref().map(|b| &b.state),
        Some(RunState::Failed(_))
    );
    let drifted = report.diff.as_ref().is_some_and(|d| !d.identical);
    if batch_failed || drifted {
        std::process::exit(2);
    }
    Ok(())
}
