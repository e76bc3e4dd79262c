use anyhow::Result;
use bnfmap::{ColumnPolicy, MappingETL, PipelineOptions, DEFAULT_INDEX_URL};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Download every published BNF SNOMED mapping snapshot, merge them into one deduplicated
/// table and keep the newest snapshot in `latest/`. Safe to re-run: finished stages are skipped.
#[derive(Parser, Debug)]
#[command(name = "bnfmap", version, about, long_about = None)]
struct Cli {
    /// Root of the cache/output tree
    #[arg(long, env = "BNFMAP_BASE_DIR", default_value = "bnf_snomed_mapping_data")]
    base_dir: PathBuf,

    /// Page listing the snapshot archives
    #[arg(long, env = "BNFMAP_INDEX_URL", default_value = DEFAULT_INDEX_URL)]
    index_url: String,

    /// Converter program run once per table
    #[arg(long, env = "BNFMAP_CONVERTER")]
    converter: Option<String>,

    /// Converter argument; repeat for each. `{input}` and `{output}` are substituted
    #[arg(long = "converter-arg", env = "BNFMAP_CONVERTER_ARGS", value_delimiter = ' ', allow_hyphen_values = true)]
    converter_args: Vec<String>,

    /// Kill the converter after this many seconds
    #[arg(long, env = "BNFMAP_CONVERTER_TIMEOUT_SECS", default_value_t = 300)]
    converter_timeout_secs: u64,

    /// Read tables narrower than 11 columns, padding with blanks, instead of skipping them
    #[arg(long)]
    pad_short_tables: bool,

    /// Skip downloading; merge what is already cached
    #[arg(long)]
    offline: bool,

    /// Only write the csv export
    #[arg(long)]
    no_xlsx: bool,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut opts = PipelineOptions::default()
        .with_base_dir(&cli.base_dir)
        .with_index_url(cli.index_url)
        .with_offline(cli.offline)
        .with_converter_timeout(Duration::from_secs(cli.converter_timeout_secs))
        .with_xlsx_export(!cli.no_xlsx)
        .with_progress(!cli.no_progress);
    if cli.pad_short_tables {
        opts = opts.with_column_policy(ColumnPolicy::Pad);
    }
    if let Some(program) = cli.converter {
        let args = if cli.converter_args.is_empty() { opts.converter_args.clone() } else { cli.converter_args };
        opts = opts.with_converter(program, args);
    } else if !cli.converter_args.is_empty() {
        let program = opts.converter_program.clone();
        opts = opts.with_converter(program, cli.converter_args);
    }

    let summary = MappingETL::with_options(opts).run()?;
    println!(
        "{} canonical rows; latest: {}; failures: {}",
        summary.canonical_rows,
        summary.latest.as_deref().unwrap_or("(none)"),
        summary.total_failures()
    );
    Ok(())
}
