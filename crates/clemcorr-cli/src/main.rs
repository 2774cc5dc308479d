//! clemcorr CLI — three-system correlation and particle extraction.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Deserialize;

use clemcorr::{
    build_report, establish, positions::read_table, project_spots, CorrelationConfig,
    CorrelationReport, MarkerResiduals, MarkerSpec, MosaicShift, RowSelect, SearchMode, SpotSet,
    TableSource, TransformKind, TransformSummary,
};
use tomopart::{
    extract_all, ExtractOptions, Extractor, GroupSpec, MrcSource, MrcWriter, PathTable,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "clemcorr")]
#[command(about = "Correlate LM and EM coordinate systems; extract particles from tomograms")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Establish an LM ↔ overview ↔ search correlation and correlate spots.
    Correlate {
        /// Correlation run description (JSON).
        #[arg(long)]
        config: PathBuf,

        /// Path to write the text results file.
        #[arg(long)]
        out: PathBuf,

        /// Optional path to also write the full report as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Extract particles from segmented tomograms.
    Extract {
        /// Dataset manifest (JSON).
        #[arg(long)]
        manifest: PathBuf,

        /// Override the particle output directory from the manifest.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Path to write the particle catalog (JSON); defaults to
        /// `<particle_dir>/catalog.json`.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Correlate { config, out, json } => run_correlate(&config, &out, json.as_deref()),
        Commands::Extract {
            manifest,
            out_dir,
            catalog,
        } => run_extract(&manifest, out_dir, catalog),
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

// ── correlate ────────────────────────────────────────────────────────────

/// A point set given inline or as file + row selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PointSpec {
    Inline(Vec<[f64; 2]>),
    File {
        file: PathBuf,
        #[serde(default)]
        rows: Option<RowSelect>,
        #[serde(default)]
        xy_columns: Option<[isize; 2]>,
    },
}

impl PointSpec {
    fn resolve(&self, root: &Path, default_xy: [isize; 2]) -> CliResult<Vec<[f64; 2]>> {
        match self {
            Self::Inline(points) => Ok(points.clone()),
            Self::File {
                file,
                rows,
                xy_columns,
            } => {
                let text = read_table(&root.join(file))?;
                let rows = rows.clone().unwrap_or(RowSelect::All);
                Ok(TableSource::parse(
                    &text,
                    &rows,
                    xy_columns.unwrap_or(default_xy),
                )?)
            }
        }
    }

    fn resolve_one(&self, root: &Path, default_xy: [isize; 2]) -> CliResult<[f64; 2]> {
        let points = self.resolve(root, default_xy)?;
        match points.as_slice() {
            [p] => Ok(*p),
            other => Err(format!("expected exactly one point, got {}", other.len()).into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeArg {
    Collage,
    MoveSearch,
    MoveOverview,
}

#[derive(Debug, Clone, Deserialize)]
struct MosaicArg {
    /// The reconciliation feature on the mosaic image.
    mosaic_main: PointSpec,
    /// The same feature on the single overview image.
    overview_main: PointSpec,
}

fn default_xy_columns() -> [isize; 2] {
    [0, 1]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CorrelateFile {
    /// Default x/y columns for all file-based point specs.
    #[serde(default = "default_xy_columns")]
    xy_columns: [isize; 2],

    // Joint markers — exclusive with the split family below.
    lm_markers: Option<PointSpec>,
    overview_markers: Option<PointSpec>,

    // Split markers: gl sets fix the linear part, d sets the translation.
    lm_markers_gl: Option<PointSpec>,
    overview_markers_gl: Option<PointSpec>,
    lm_markers_d: Option<PointSpec>,
    overview_markers_d: Option<PointSpec>,

    overview_detail: PointSpec,
    search_detail: PointSpec,

    lm2overview_type: TransformKind,
    overview2search_type: TransformKind,

    mode: ModeArg,
    search_main: Option<[f64; 2]>,
    overview_center: Option<[f64; 2]>,
    mosaic: Option<MosaicArg>,

    lm_spots: Option<PointSpec>,
    lm_spot_labels: Option<Vec<String>>,
    overview_spots: Option<PointSpec>,
    overview_spot_labels: Option<Vec<String>>,
    search_spots: Option<PointSpec>,
    search_spot_labels: Option<Vec<String>>,
}

impl CorrelateFile {
    fn markers(&self, root: &Path) -> CliResult<MarkerSpec> {
        let joint = self.lm_markers.is_some() || self.overview_markers.is_some();
        let split = self.lm_markers_gl.is_some()
            || self.overview_markers_gl.is_some()
            || self.lm_markers_d.is_some()
            || self.overview_markers_d.is_some();
        match (joint, split) {
            (true, true) => {
                Err("both joint and split marker sets supplied; use exactly one family".into())
            }
            (false, false) => {
                Err("no marker sets supplied; use lm_markers/overview_markers or the _gl/_d family"
                    .into())
            }
            (true, false) => Ok(MarkerSpec::Joint {
                lm: self.required(&self.lm_markers, "lm_markers", root)?,
                overview: self.required(&self.overview_markers, "overview_markers", root)?,
            }),
            (false, true) => Ok(MarkerSpec::Split {
                lm_gl: self.required(&self.lm_markers_gl, "lm_markers_gl", root)?,
                overview_gl: self.required(&self.overview_markers_gl, "overview_markers_gl", root)?,
                lm_d: self.required(&self.lm_markers_d, "lm_markers_d", root)?,
                overview_d: self.required(&self.overview_markers_d, "overview_markers_d", root)?,
            }),
        }
    }

    fn required(
        &self,
        spec: &Option<PointSpec>,
        name: &str,
        root: &Path,
    ) -> CliResult<Vec<[f64; 2]>> {
        spec.as_ref()
            .ok_or_else(|| CliError::from(format!("missing marker set {}", name)))?
            .resolve(root, self.xy_columns)
    }

    fn mode(&self, root: &Path) -> CliResult<SearchMode> {
        match self.mode_arg() {
            ModeArg::Collage => Ok(SearchMode::Collage),
            ModeArg::MoveSearch => Ok(SearchMode::MoveSearch),
            ModeArg::MoveOverview => {
                let search_main = self
                    .search_main
                    .ok_or("move_overview mode requires search_main")?;
                let overview_center = self
                    .overview_center
                    .ok_or("move_overview mode requires overview_center")?;
                let mosaic = match &self.mosaic {
                    Some(arg) => Some(MosaicShift {
                        mosaic_main: arg.mosaic_main.resolve_one(root, self.xy_columns)?,
                        overview_main: arg.overview_main.resolve_one(root, self.xy_columns)?,
                    }),
                    None => None,
                };
                Ok(SearchMode::MoveOverview {
                    search_main,
                    overview_center,
                    mosaic,
                })
            }
        }
    }

    fn mode_arg(&self) -> ModeArg {
        self.mode
    }

    fn spot_set(
        &self,
        spec: &Option<PointSpec>,
        labels: &Option<Vec<String>>,
        root: &Path,
    ) -> CliResult<Option<SpotSet>> {
        match spec {
            None => Ok(None),
            Some(spec) => {
                let points = spec.resolve(root, self.xy_columns)?;
                Ok(Some(match labels {
                    Some(labels) => SpotSet::with_labels(points, labels.clone()),
                    None => SpotSet::new(points),
                }))
            }
        }
    }
}

fn run_correlate(config_path: &Path, out: &Path, json: Option<&Path>) -> CliResult<()> {
    let text = std::fs::read_to_string(config_path)
        .map_err(|e| format!("{}: {}", config_path.display(), e))?;
    let file: CorrelateFile =
        serde_json::from_str(&text).map_err(|e| format!("{}: {}", config_path.display(), e))?;
    let root = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();

    let config = CorrelationConfig {
        markers: file.markers(&root)?,
        overview_detail: file.overview_detail.resolve(&root, file.xy_columns)?,
        search_detail: file.search_detail.resolve(&root, file.xy_columns)?,
        mode: file.mode(&root)?,
        lm2overview_kind: file.lm2overview_type,
        overview2search_kind: file.overview2search_type,
    };

    let ctx = establish(config)?;
    let spots = project_spots(
        &ctx,
        file.spot_set(&file.lm_spots, &file.lm_spot_labels, &root)?,
        file.spot_set(&file.overview_spots, &file.overview_spot_labels, &root)?,
        file.spot_set(&file.search_spots, &file.search_spot_labels, &root)?,
    )?;
    let report = build_report(&ctx, spots)?;

    let mut out_file =
        std::fs::File::create(out).map_err(|e| format!("{}: {}", out.display(), e))?;
    out_file.write_all(render_report(&report).as_bytes())?;
    tracing::info!(path = %out.display(), "results written");

    if let Some(json_path) = json {
        let file = std::fs::File::create(json_path)
            .map_err(|e| format!("{}: {}", json_path.display(), e))?;
        serde_json::to_writer_pretty(file, &report)?;
        tracing::info!(path = %json_path.display(), "json report written");
    }
    Ok(())
}

// ── report rendering ─────────────────────────────────────────────────────

fn parity_sign(parity: bool) -> i32 {
    if parity {
        -1
    } else {
        1
    }
}

fn rms_string(summary: &TransformSummary) -> (String, &'static str) {
    match summary.rms.value() {
        Some(v) => (
            format!("{:6.2}", v),
            if summary.rms.is_estimated() {
                " (estimated)"
            } else {
                ""
            },
        ),
        None => ("  n/a".to_string(), ""),
    }
}

fn push_transform_block(
    lines: &mut Vec<String>,
    title: &str,
    forward: &TransformSummary,
    forward_units: &str,
    inverse: Option<(&TransformSummary, &str)>,
) {
    lines.push("#".to_string());
    lines.push(format!("# {}:", title));
    lines.push(format!(
        "#   - rotation = {:6.1},  scale = [{:6.3}, {:6.3}],  parity = {},  shear = {:7.3}",
        forward.rotation_deg,
        forward.scale[0],
        forward.scale[1],
        parity_sign(forward.parity),
        forward.shear
    ));
    lines.push(format!(
        "#   - translation = [{:6.3}, {:6.3}]",
        forward.translation[0], forward.translation[1]
    ));
    let (fwd_rms, fwd_est) = rms_string(forward);
    match inverse {
        Some((inv, inv_units)) => {
            let (inv_rms, _) = rms_string(inv);
            lines.push(format!(
                "#   - rms error{}: (in {}) {},  (in {}) {}",
                fwd_est, forward_units, fwd_rms, inv_units, inv_rms
            ));
        }
        None => {
            lines.push(format!(
                "#   - rms error{}: (in {}) {}",
                fwd_est, forward_units, fwd_rms
            ));
        }
    }
}

fn format_point_row(id: usize, lm: [f64; 2], ov: [f64; 2], se: [f64; 2], label: Option<&str>) -> String {
    let mut row = format!(
        " {:3}   {:6.2} {:6.2}   {:6.0} {:6.0}   {:6.1} {:6.1} ",
        id, lm[0], lm[1], ov[0], ov[1], se[0], se[1]
    );
    if let Some(label) = label {
        row.push_str("  ");
        row.push_str(label);
    }
    row
}

fn render_report(report: &CorrelationReport) -> String {
    let mut lines = vec!["#".to_string(), "# Transformation parameters".to_string()];

    push_transform_block(
        &mut lines,
        "LM to EM overview",
        &report.lm2overview,
        "EM overview units",
        Some((&report.overview2lm, "LM units")),
    );
    match &report.marker_errors {
        MarkerResiduals::Joint(errors) => {
            lines.push(format!(
                "#   - error (in EM overview units): {}",
                format_residuals(errors)
            ));
        }
        MarkerResiduals::Split { gl, d } => {
            lines.push(format!(
                "#   - Gl error (in EM overview units): {}",
                format_residuals(gl)
            ));
            lines.push(format!(
                "#   - Translation error (in EM overview units): {}",
                format_residuals(d)
            ));
        }
    }

    push_transform_block(
        &mut lines,
        "EM overview to search",
        &report.overview2search,
        "EM search units",
        Some((&report.search2overview, "EM overview units")),
    );
    lines.push(format!(
        "#   - error (in EM search units): {}",
        format_residuals(&report.detail_errors)
    ));

    push_transform_block(
        &mut lines,
        "LM to EM search",
        &report.lm2search,
        "EM search units",
        None,
    );

    if let (Some(center), Some(main)) = (report.overview_center, report.search_main) {
        lines.push("#".to_string());
        lines.push(format!(
            "# Overview center: [{:.0}, {:.0}]",
            center[0], center[1]
        ));
        lines.push(format!("# Main search: [{:.0}, {:.0}]", main[0], main[1]));
        lines.push("#".to_string());
    }

    for projection in &report.spots {
        let system = match projection.system {
            clemcorr::SpotSystem::Lm => "LM",
            clemcorr::SpotSystem::Overview => "EM overview",
            clemcorr::SpotSystem::Search => "EM search",
        };
        lines.push(String::new());
        lines.push("#".to_string());
        lines.push(format!("# Correlation of {} spots", system));
        lines.push("#".to_string());
        lines.push("#  id        LM         EM overview       EM search".to_string());
        for i in 0..projection.lm.len() {
            let label = projection
                .labels
                .as_ref()
                .map(|labels| labels[i].as_str());
            lines.push(format_point_row(
                i,
                projection.lm[i],
                projection.overview[i],
                projection.search[i],
                label,
            ));
        }
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn format_residuals(errors: &[[f64; 2]]) -> String {
    let parts: Vec<String> = errors
        .iter()
        .map(|e| format!("[{:.2}, {:.2}]", e[0], e[1]))
        .collect();
    format!("[{}]", parts.join(", "))
}

// ── extract ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VolumeEntry {
    tomo: PathBuf,
    labels: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    groups: Vec<GroupSpec>,
    /// Identifiers to process; defaults to every dataset in group order.
    identifiers: Option<Vec<String>>,
    /// identifier → volume paths (relative to the manifest).
    volumes: BTreeMap<String, VolumeEntry>,
    options: ExtractOptions,
}

fn run_extract(
    manifest_path: &Path,
    out_dir: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
) -> CliResult<()> {
    let text = std::fs::read_to_string(manifest_path)
        .map_err(|e| format!("{}: {}", manifest_path.display(), e))?;
    let manifest: ManifestFile =
        serde_json::from_str(&text).map_err(|e| format!("{}: {}", manifest_path.display(), e))?;
    let root = manifest_path.parent().unwrap_or(Path::new(".")).to_path_buf();

    let mut options = manifest.options;
    if let Some(dir) = out_dir {
        options.particle_dir = dir;
    }
    let particle_dir = options.particle_dir.clone();

    let identifiers = manifest.identifiers.unwrap_or_else(|| {
        manifest
            .groups
            .iter()
            .flat_map(|g| g.datasets.iter().map(|d| d.identifier.clone()))
            .collect()
    });

    let mut locator = PathTable::default();
    for (identifier, entry) in &manifest.volumes {
        locator.paths.insert(
            identifier.clone(),
            (root.join(&entry.tomo), root.join(&entry.labels)),
        );
    }

    let mut extractor = Extractor::new(options);
    let outcomes = extract_all(
        &mut extractor,
        &manifest.groups,
        &identifiers,
        &locator,
        &MrcSource,
        &MrcWriter,
    )?;

    let n_ok: usize = outcomes.iter().map(|o| o.records.len()).sum();
    let n_failed: usize = outcomes.iter().map(|o| o.failures.len()).sum();
    for outcome in &outcomes {
        for (id, error) in &outcome.failures {
            tracing::error!(id = *id, %error, "object skipped");
        }
    }
    tracing::info!(n_ok, n_failed, "extraction finished");

    let catalog_path = catalog_path.unwrap_or_else(|| particle_dir.join("catalog.json"));
    let file = std::fs::File::create(&catalog_path)
        .map_err(|e| format!("{}: {}", catalog_path.display(), e))?;
    serde_json::to_writer_pretty(file, extractor.catalog())?;
    tracing::info!(path = %catalog_path.display(), "catalog written");

    if n_failed > 0 {
        return Err(format!("{} objects failed to extract", n_failed).into());
    }
    Ok(())
}
