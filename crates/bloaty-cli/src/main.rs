use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use bloaty_core::{Config, DataSource, DemangleMode, NameMunger, Rollup, SortKey};

/// A size profiler for compiled binaries: attributes every byte of an
/// ELF/Mach-O/PE/WebAssembly input to segments, sections, symbols,
/// compile units, or inlined source lines (spec.md §6).
#[derive(Parser, Debug)]
#[command(name = "bloaty", version, about)]
struct Cli {
    /// Ordered list of data sources (comma-separated), e.g. -d segments,symbols
    #[arg(short = 'd', value_delimiter = ',')]
    data_sources: Vec<String>,

    /// Max rows per level before "[N Others]" collapse; 0 = unlimited
    #[arg(short = 'n', default_value_t = 20)]
    max_rows: usize,

    /// Sort key
    #[arg(short = 's', default_value = "vm")]
    sort: String,

    /// Which domains to show
    #[arg(long, default_value = "both")]
    domain: String,

    /// Symbol demangle mode
    #[arg(short = 'C', default_value = "short")]
    demangle: String,

    #[arg(long)]
    csv: bool,

    #[arg(long)]
    tsv: bool,

    /// Load configuration from a text-format options file
    #[arg(short = 'c')]
    config: Option<PathBuf>,

    /// Supply stripped-symbol companion file (matched by build-id)
    #[arg(long)]
    debug_file: Option<PathBuf>,

    /// Disassemble one function (external engine; not implemented locally)
    #[arg(long)]
    disassemble: Option<String>,

    /// Include only ranges with a matching label
    #[arg(long)]
    source_filter: Option<String>,

    #[arg(long)]
    debug_vmaddr: Option<String>,

    #[arg(long)]
    debug_fileoff: Option<String>,

    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long)]
    list_sources: bool,

    /// Input files; anything after `--` is a baseline for --diff
    inputs: Vec<PathBuf>,

    #[arg(last = true)]
    baseline_inputs: Vec<PathBuf>,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
}

const BUILTIN_SOURCES: &[&str] = &[
    "segments",
    "sections",
    "symbols",
    "rawsymbols",
    "shortsymbols",
    "fullsymbols",
    "armembers",
    "compileunits",
    "inlines",
    "inputfiles",
];

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bloaty: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.list_sources {
        for name in BUILTIN_SOURCES {
            println!("{name}");
        }
        return Ok(());
    }

    let mut config = Config::default();
    if let Some(path) = &cli.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        config = Config::parse(&text)?;
    }

    let mut sources: Vec<DataSource> = cli
        .data_sources
        .iter()
        .map(|s| {
            DataSource::parse(s).ok_or_else(|| anyhow::anyhow!("unknown data source '{s}'"))
        })
        .collect::<Result<_>>()?;
    if sources.is_empty() {
        sources = config.data_sources.clone();
    }
    if sources.is_empty() {
        sources.push(DataSource::Sections);
    }

    if cli.inputs.is_empty() {
        bail!("no input files given");
    }

    let demangle_mode = DemangleMode::parse(&cli.demangle)
        .ok_or_else(|| anyhow::anyhow!("unknown --demangle mode '{}'", cli.demangle))?;
    let sort_key = SortKey::parse(&cli.sort)
        .ok_or_else(|| anyhow::anyhow!("unknown -s sort key '{}'", cli.sort))?;
    if !matches!(cli.domain.as_str(), "vm" | "file" | "both") {
        bail!("unknown --domain '{}'", cli.domain);
    }

    let munger = NameMunger::with_demangle_mode(demangle_mode);
    let mut rollup =
        bloaty_core::scan::scan_all(&cli.inputs, &sources, &munger, cli.debug_file.as_deref())?;

    if let Some(pattern) = cli.source_filter.as_ref().or(config.source_filter.as_ref()) {
        let re = regex::Regex::new(pattern).context("compiling --source-filter pattern")?;
        rollup.apply_source_filter(&re);
    }

    if !cli.baseline_inputs.is_empty() {
        let baseline = bloaty_core::scan::scan_all(&cli.baseline_inputs, &sources, &munger, None)?;
        rollup = rollup.diff_against(&baseline);
    }

    rollup.sort_by_key(sort_key);
    if cli.max_rows > 0 {
        rollup.truncate(cli.max_rows);
    }

    render(&rollup, &cli);
    Ok(())
}

fn render(rollup: &Rollup, cli: &Cli) {
    if cli.csv {
        render_delimited(rollup, ',', &cli.domain);
    } else if cli.tsv {
        render_delimited(rollup, '\t', &cli.domain);
    } else {
        render_pretty(rollup, &cli.domain);
    }
}

fn render_delimited(rollup: &Rollup, sep: char, domain: &str) {
    match domain {
        "vm" => println!("vmsize{sep}name"),
        "file" => println!("filesize{sep}name"),
        _ => println!("vmsize{sep}filesize{sep}name"),
    }
    for row in &rollup.rows {
        match domain {
            "vm" => println!("{}{sep}{}", row.vm_size, row.label),
            "file" => println!("{}{sep}{}", row.file_size, row.label),
            _ => println!("{}{sep}{}{sep}{}", row.vm_size, row.file_size, row.label),
        }
    }
}

fn render_pretty(rollup: &Rollup, domain: &str) {
    match domain {
        "vm" => println!("{:>10} {}", "VM SIZE", "NAME"),
        "file" => println!("{:>10} {}", "FILE SIZE", "NAME"),
        _ => println!("{:>10} {:>10} {}", "VM SIZE", "FILE SIZE", "NAME"),
    }
    for row in &rollup.rows {
        let vm_pct = rollup.vm_percent(row);
        let file_pct = rollup.file_percent(row);
        let tag = match row.diff_status {
            Some(bloaty_core::DiffStatus::New) => " [NEW]",
            Some(bloaty_core::DiffStatus::Deleted) => " [DEL]",
            None => "",
        };
        match domain {
            "vm" => println!("{vm_pct:>6.1}% {:>8}  {}{tag}", row.vm_size, row.label),
            "file" => println!("{file_pct:>6.1}% {:>8}  {}{tag}", row.file_size, row.label),
            _ => println!(
                "{vm_pct:>6.1}% {vm:>8} {file_pct:>6.1}% {file:>8}  {label}{tag}",
                vm = row.vm_size,
                file = row.file_size,
                label = row.label,
            ),
        }
    }
    match domain {
        "vm" => println!("{:>6.1}% {:>8}  TOTAL", 100.0, rollup.vm_total),
        "file" => println!("{:>6.1}% {:>8}  TOTAL", 100.0, rollup.file_total),
        _ => println!(
            "{:>6.1}% {:>8} {:>6.1}% {:>8}  TOTAL",
            100.0, rollup.vm_total, 100.0, rollup.file_total
        ),
    }
}
