use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::error::Error;
use std::path::{Path, PathBuf};

use glyph_audit::analysis::build_discrepancies;
use glyph_audit::auto_annotate::annotate_manifest;
use glyph_audit::cluster_crops::generate_cluster_crops;
use glyph_audit::ledger::{
    self, Direction, ManualObservation, add_sign_observation, build_observations,
    build_prior_readings,
};
use glyph_audit::manifest::{EvidenceIndex, Manifest};
use glyph_audit::report::{ReportInputs, build_report};
use glyph_audit::segment::SegmentConfig;

#[derive(Parser, Debug)]
#[command(
    name = "glyph_audit",
    about = "Segment inscription evidence into glyph clusters and maintain the observation ledger",
    version
)]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct PathArgs {
    /// Source manifest (JSON)
    #[arg(long, global = true, default_value = "source_manifest.json")]
    manifest: PathBuf,

    /// Observation ledger (JSONL)
    #[arg(long, global = true, default_value = "ledger/observations.jsonl")]
    ledger: PathBuf,

    /// Prior-readings ledger (JSONL), rewritten by rebuild
    #[arg(long = "prior-readings", global = true, default_value = "ledger/prior_readings.jsonl")]
    prior_readings: PathBuf,

    /// Root that manifest evidence paths and cluster crops are relative to
    #[arg(long = "output-root", global = true, default_value = ".")]
    output_root: PathBuf,
}

#[derive(Args, Debug, Clone, Copy)]
struct SegmentArgs {
    /// Luminance below this value counts as ink
    #[arg(long, default_value_t = 140)]
    threshold: u8,

    /// Resampling factor applied before thresholding
    #[arg(long, default_value_t = 0.5)]
    scale: f64,

    /// Smallest cluster kept, in scaled-mask cells
    #[arg(long = "min-area", default_value_t = 80)]
    min_area: usize,

    /// Odd side length of the square dilation window (1 disables it)
    #[arg(long, default_value_t = 3)]
    dilation: u32,

    /// Pixels added around each cluster box
    #[arg(long, default_value_t = 4)]
    margin: u32,

    /// Replace observations on lines that already have some
    #[arg(long)]
    overwrite: bool,
}

impl SegmentArgs {
    fn config(&self) -> SegmentConfig {
        SegmentConfig {
            threshold: self.threshold,
            scale: self.scale,
            min_area: self.min_area,
            dilation: self.dilation,
            margin: self.margin,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the observation ledger and the prior-readings ledger from the manifest
    Rebuild,
    /// Segment every line's primary evidence into auto-annotated clusters
    AutoAnnotate(SegmentArgs),
    /// Record one manual sign observation on a line
    Observe {
        #[arg(long = "line-id")]
        line_id: String,
        #[arg(long = "sign-id")]
        sign_id: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Bounding box as x1,y1,x2,y2 in source pixels
        #[arg(long, value_parser = parse_bbox)]
        bbox: Option<[f64; 4]>,
        #[arg(long)]
        confidence: Option<f64>,
        #[arg(long, value_parser = parse_direction)]
        direction: Option<Direction>,
        #[arg(long = "direction-basis")]
        direction_basis: Option<String>,
        #[arg(long = "direction-confidence")]
        direction_confidence: Option<f64>,
    },
    /// Write per-sign crops and contact sheets and record their paths
    ExportClusters,
    /// Score prior readings against observations
    Discrepancies {
        #[arg(long, default_value = "ledger/discrepancies.jsonl")]
        out: PathBuf,
    },
    /// Write the Markdown observation report
    Report {
        #[arg(long, default_value = "reports/observation_report.md")]
        out: PathBuf,
        /// Discrepancy ledger to summarise; a missing file reads as empty
        #[arg(long, default_value = "ledger/discrepancies.jsonl")]
        discrepancies: PathBuf,
    },
    /// rebuild, auto-annotate, export-clusters, discrepancies and report in turn
    RunAll {
        #[command(flatten)]
        segment: SegmentArgs,
        #[arg(long, default_value = "ledger/discrepancies.jsonl")]
        discrepancies: PathBuf,
        #[arg(long, default_value = "reports/observation_report.md")]
        report: PathBuf,
    },
}

fn parse_bbox(s: &str) -> Result<[f64; 4], String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<_, _>>()?;
    <[f64; 4]>::try_from(parts)
        .map_err(|parts| format!("expected x1,y1,x2,y2, got {} values", parts.len()))
}

fn parse_direction(s: &str) -> Result<Direction, String> {
    s.parse()
}

fn load_manifest(path: &Path) -> Result<Manifest, Box<dyn Error>> {
    let manifest = Manifest::load(path)?;
    for issue in manifest.check_references() {
        warn!("{}: {issue}", path.display());
    }
    Ok(manifest)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let paths = &cli.paths;

    match cli.command {
        Command::Rebuild => {
            let manifest = load_manifest(&paths.manifest)?;
            build_observations(&manifest, &paths.ledger)?;
            build_prior_readings(&manifest, &paths.prior_readings)?;
        }
        Command::AutoAnnotate(segment) => {
            let manifest = load_manifest(&paths.manifest)?;
            let index = EvidenceIndex::from_manifest(&manifest, &paths.output_root);
            annotate_manifest(
                &manifest,
                &index,
                &paths.ledger,
                &segment.config(),
                segment.overwrite,
            )?;
        }
        Command::Observe {
            line_id,
            sign_id,
            description,
            bbox,
            confidence,
            direction,
            direction_basis,
            direction_confidence,
        } => {
            let observation = ManualObservation {
                bbox,
                confidence,
                direction,
                direction_basis,
                direction_confidence,
                ..ManualObservation::new(sign_id, description)
            };
            let record = add_sign_observation(&paths.ledger, &line_id, &observation)?;
            println!("{}", ledger::jsonl::to_ascii_line(&record)?);
        }
        Command::ExportClusters => {
            let manifest = load_manifest(&paths.manifest)?;
            let index = EvidenceIndex::from_manifest(&manifest, &paths.output_root);
            generate_cluster_crops(&index, &paths.ledger, &paths.output_root)?;
        }
        Command::Discrepancies { out } => {
            let manifest = load_manifest(&paths.manifest)?;
            build_discrepancies(&manifest, &out)?;
        }
        Command::Report { out, discrepancies } => {
            let manifest = load_manifest(&paths.manifest)?;
            let records = ledger::load_observations(&paths.ledger)?;
            let readings = ledger::load_prior_readings(&paths.prior_readings)?;
            let discrepancies = ledger::jsonl::read_jsonl(&discrepancies)?;
            let inputs = ReportInputs {
                observations: &records,
                prior_readings: &readings,
                discrepancies: &discrepancies,
            };
            build_report(&manifest, &inputs, &out)?;
        }
        Command::RunAll {
            segment,
            discrepancies,
            report,
        } => {
            let manifest = load_manifest(&paths.manifest)?;
            let index = EvidenceIndex::from_manifest(&manifest, &paths.output_root);
            build_observations(&manifest, &paths.ledger)?;
            let readings = build_prior_readings(&manifest, &paths.prior_readings)?;
            let summary = annotate_manifest(
                &manifest,
                &index,
                &paths.ledger,
                &segment.config(),
                segment.overwrite,
            )?;
            let records = generate_cluster_crops(&index, &paths.ledger, &paths.output_root)?;
            let scored = build_discrepancies(&manifest, &discrepancies)?;
            let inputs = ReportInputs {
                observations: &records,
                prior_readings: &readings,
                discrepancies: &scored,
            };
            build_report(&manifest, &inputs, &report)?;
            info!(
                "run-all: {} lines, {} annotated, {} failed",
                records.len(),
                summary.annotated,
                summary.failed
            );
        }
    }
    Ok(())
}
