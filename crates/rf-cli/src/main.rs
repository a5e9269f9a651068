//! Band and combo analysis CLI

use clap::{Parser, Subcommand};
use rf_core::report::{self, ReportFormat};
use rf_core::{
    AnalysisConfig, AnalysisContext, AnalysisInput, Analyzer, ComboFormat, ComboSet, ControlSource,
    PruneSource, RuleBase, StaticRuleBase,
};
use rf_parsers::efs::{self, ControlFile, EfsControls};
use rf_parsers::{capability, notation, BandEncoding, BitmaskLayout, IndexBase, Rat};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "rf-trace")]
#[command(about = "Band pipeline tracing and combo comparison tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a band bitmask or index list
    Decode {
        /// Band list text (reads --file when absent)
        #[arg(short, long)]
        words: Option<String>,

        /// File holding the band list
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Encoding (decimal, hex, index, ranged, rfc-xml, uecap-xml)
        #[arg(short, long, default_value = "decimal")]
        encoding: String,

        /// Radio access technology (lte, nr)
        #[arg(long, default_value = "lte")]
        rat: String,

        /// Bits per word
        #[arg(long, default_value = "8")]
        width: usize,

        /// Band number of the first ordinal
        #[arg(long, default_value = "1")]
        start: u32,

        /// Index base (zero, one)
        #[arg(long, default_value = "zero")]
        index_base: String,

        /// Declared number of bands covered
        #[arg(long)]
        band_count: Option<u32>,

        /// Read hex words following this label (or, for ranged, the
        /// label before each `first_last = 0x...` word)
        #[arg(long)]
        label: Option<String>,
    },

    /// Parse combo strings into canonical keys
    Parse {
        /// Combo strings
        combos: Vec<String>,

        /// File with one combo per line
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Compare two combo lists
    Compare {
        /// Reference combo file
        #[arg(short, long)]
        reference: PathBuf,

        /// Target combo file
        #[arg(short, long)]
        target: PathBuf,

        /// Input format (notation, report, rfc-xml, uecap-xml)
        #[arg(long, default_value = "notation")]
        format: String,

        /// Compare each combo category separately
        #[arg(long)]
        by_category: bool,
    },

    /// Read the EFS control files under a directory
    Controls {
        /// EFS root directory
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Run a full analysis from a manifest
    Analyze {
        /// Analysis manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// EFS root to read control files and the prune list from
        #[arg(long)]
        efs: Option<PathBuf>,

        /// Rule base (JSON)
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Active geography
        #[arg(short, long)]
        geography: Option<String>,

        /// Active carrier
        #[arg(short, long)]
        carrier: Option<String>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip UL class, MIMO and bandwidth comparison
        #[arg(long)]
        no_attributes: bool,

        /// Skip band-level discrepancies
        #[arg(long)]
        no_band_discrepancies: bool,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    match cli.command {
        Commands::Decode { words, file, encoding, rat, width, start, index_base, band_count, label } => {
            cmd_decode(words, file, encoding, rat, width, start, index_base, band_count, label);
        }
        Commands::Parse { combos, file } => {
            cmd_parse(combos, file);
        }
        Commands::Compare { reference, target, format, by_category } => {
            cmd_compare(reference, target, format, by_category);
        }
        Commands::Controls { dir } => {
            cmd_controls(dir);
        }
        Commands::Analyze {
            manifest,
            efs,
            rules,
            geography,
            carrier,
            output,
            no_attributes,
            no_band_discrepancies,
            compact,
        } => {
            let config = AnalysisConfig {
                context: AnalysisContext { geography, carrier },
                check_attributes: !no_attributes,
                band_discrepancies: !no_band_discrepancies,
                ..Default::default()
            };
            let format = if compact { ReportFormat::CompactJson } else { ReportFormat::Json };
            cmd_analyze(manifest, efs, rules, config, output, format);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_decode(
    words: Option<String>,
    file: Option<PathBuf>,
    encoding: String,
    rat: String,
    width: usize,
    start: u32,
    index_base: String,
    band_count: Option<u32>,
    label: Option<String>,
) {
    let text = match (words, file) {
        (Some(words), _) => words,
        (None, Some(path)) => read_or_exit(&path),
        (None, None) => {
            error!("Either --words or --file is required");
            std::process::exit(1);
        }
    };

    let rat = parse_rat(&rat);
    let index_base = match index_base.to_lowercase().as_str() {
        "zero" | "0" | "zero-based" => IndexBase::ZeroBased,
        "one" | "1" | "one-based" => IndexBase::OneBased,
        other => {
            error!("Unknown index base '{}'", other);
            std::process::exit(1);
        }
    };
    let mut layout = BitmaskLayout::new(rat, width, start, index_base);
    if let Some(count) = band_count {
        layout = layout.with_band_count(count);
    }

    let encoding = match (encoding.to_lowercase().as_str(), label) {
        ("ranged", Some(label)) => BandEncoding::RangedHex { label, rat },
        ("ranged", None) => {
            error!("--label is required for ranged words");
            std::process::exit(1);
        }
        ("rfc-xml", _) => BandEncoding::RfcXml { rat },
        ("uecap-xml", _) => BandEncoding::UeCapabilityXml { rat },
        (_, Some(label)) => BandEncoding::LabeledHex { label, layout },
        ("hex", None) => BandEncoding::HexWords { layout },
        ("index", None) => BandEncoding::IndexList { rat, index_base },
        _ => BandEncoding::DecimalBytes { layout },
    };

    match encoding.decode(&text) {
        Ok(bands) => {
            info!("Decoded {} bands", bands.len());
            let names: Vec<String> = bands.iter().map(|b| b.to_string()).collect();
            println!("{}", names.join(" "));
        }
        Err(e) => {
            error!("Decode failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_parse(combos: Vec<String>, file: Option<PathBuf>) {
    let mut text = combos.join("\n");
    if let Some(path) = file {
        text.push('\n');
        text.push_str(&read_or_exit(&path));
    }

    let parsed = notation::parse_lines(&text, "cli");
    for combo in &parsed.items {
        let normalized = rf_core::normalize_combo(combo.clone());
        println!("{}\t{}", normalized.canonical_key(), normalized.category());
    }

    if !parsed.is_clean() {
        for failure in &parsed.failures {
            error!("Entry {}: {}", failure.line, failure.error);
        }
        std::process::exit(1);
    }
}

fn cmd_compare(reference: PathBuf, target: PathBuf, format: String, by_category: bool) {
    let format = match format.to_lowercase().as_str() {
        "notation" => ComboFormat::Notation,
        "report" => ComboFormat::CapabilityReport,
        "rfc-xml" => ComboFormat::RfcXml,
        "uecap-xml" => ComboFormat::UeCapabilityXml,
        other => {
            error!("Unknown combo format '{}'", other);
            std::process::exit(1);
        }
    };
    let a = load_combo_set(&reference, format);
    let b = load_combo_set(&target, format);

    let json = if by_category {
        let results: Vec<_> = rf_core::compare_by_category(&a, &b).into_values().collect();
        serde_json::to_string_pretty(&results)
    } else {
        let result = rf_core::compare(&a, &b);
        info!(
            "{:.1}% match: {} only in {}, {} only in {}",
            result.match_percentage(),
            result.only_in_a.len(),
            result.reference,
            result.only_in_b.len(),
            result.target
        );
        serde_json::to_string_pretty(&result)
    };

    match json {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize comparison: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_controls(dir: PathBuf) {
    let (controls, _) = load_efs(&dir);
    let mut state = EfsControls::new();
    for control in &controls {
        if let Err(e) = state.apply(control.file, control.data()) {
            error!("{}: {}", control.name, e);
            std::process::exit(1);
        }
    }
    info!("Read {} control files from {}", controls.len(), dir.display());

    match serde_json::to_string_pretty(&state) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize controls: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_analyze(
    manifest: PathBuf,
    efs_root: Option<PathBuf>,
    rules: Option<PathBuf>,
    config: AnalysisConfig,
    output: Option<PathBuf>,
    format: ReportFormat,
) {
    info!("Analyzing manifest: {}", manifest.display());

    let mut input = match AnalysisInput::from_json(&read_or_exit(&manifest)) {
        Ok(input) => input,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    if let Some(root) = efs_root {
        let (controls, prune) = load_efs(&root);
        info!("EFS {}: {} control files", root.display(), controls.len());
        input.controls.extend(controls);
        input.prune_lists.extend(prune);
    }

    let rules: Box<dyn RuleBase> = match rules {
        Some(path) => match StaticRuleBase::from_json(&read_or_exit(&path)) {
            Ok(rules) => Box::new(rules),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        None => Box::new(StaticRuleBase::default()),
    };

    let analyzer = Analyzer::new(config, rules);
    let result = match analyzer.run(&input) {
        Ok(result) => result,
        Err(e) => {
            error!("Analysis failed: {}", e);
            std::process::exit(1);
        }
    };

    match report::generate_report(&result, format) {
        Ok(content) => {
            if let Some(path) = output {
                if let Err(e) = std::fs::write(&path, &content) {
                    error!("Failed to write {}: {}", path.display(), e);
                    std::process::exit(1);
                }
                info!("Report written to: {}", path.display());
            } else {
                println!("{}", content);
            }
        }
        Err(e) => {
            error!("Failed to generate report: {}", e);
            std::process::exit(1);
        }
    }
}

/// First existing copy of a file under the EFS root
fn find_efs_file(root: &Path, dirs: &[&str], name: &str) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| root.join(dir).join(name))
        .find(|path| path.is_file())
}

/// Control files and the prune list found under an EFS root
fn load_efs(root: &Path) -> (Vec<ControlSource>, Option<PruneSource>) {
    let mut controls = Vec::new();
    for file in ControlFile::ALL {
        let path = match find_efs_file(root, file.search_dirs(), file.file_name()) {
            Some(path) => path,
            None => continue,
        };
        match std::fs::read(&path) {
            Ok(bytes) => controls.push(ControlSource::new(file, bytes)),
            Err(e) => warn!("Failed to read {}: {}", path.display(), e),
        }
    }

    let prune = find_efs_file(root, &efs::LTE_CAP_DIRS, efs::PRUNE_FILE).map(|path| PruneSource {
        name: efs::PRUNE_FILE.to_string(),
        text: read_or_exit(&path),
    });
    (controls, prune)
}

fn load_combo_set(path: &Path, format: ComboFormat) -> ComboSet {
    let text = read_or_exit(path);
    let tag = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let parsed = format.parse(&text, &tag);
    for failure in &parsed.failures {
        warn!("{} line {}: {}", tag, failure.line, failure.error);
    }

    ComboSet::from_combos(tag, parsed.items)
}

fn parse_rat(name: &str) -> Rat {
    match capability::parse_rat_name(name) {
        Ok(rat) => rat,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn read_or_exit(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
