use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use stereoseed::engine::reference::BlockMatcher;
use stereoseed::io::{full_mask, load_gray_raster, load_mask};
use stereoseed::{
    downsample_image, downsample_mask, CorrConfig, CostMetric, FilterParams, PixelBox, Pipeline,
    PipelineInputs, Prefilter, Raster, SearchRange, SeedMode, Workspace,
};
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "StereoSeed CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for stage profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SeedModeConfig {
    None,
    LowRes,
    External,
}

impl From<SeedModeConfig> for SeedMode {
    fn from(value: SeedModeConfig) -> Self {
        match value {
            SeedModeConfig::None => SeedMode::None,
            SeedModeConfig::LowRes => SeedMode::LowResCorrelation,
            SeedModeConfig::External => SeedMode::ExternalSupplied,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CostConfig {
    AbsoluteDifference,
    SquaredDifference,
    CrossCorrelation,
    Census,
    TernaryCensus,
}

impl From<CostConfig> for CostMetric {
    fn from(value: CostConfig) -> Self {
        match value {
            CostConfig::AbsoluteDifference => CostMetric::AbsoluteDifference,
            CostConfig::SquaredDifference => CostMetric::SquaredDifference,
            CostConfig::CrossCorrelation => CostMetric::CrossCorrelation,
            CostConfig::Census => CostMetric::CensusTransform,
            CostConfig::TernaryCensus => CostMetric::TernaryCensusTransform,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PrefilterConfig {
    None,
    SubtractedMean,
    LogFilter,
}

impl From<PrefilterConfig> for Prefilter {
    fn from(value: PrefilterConfig) -> Self {
        match value {
            PrefilterConfig::None => Prefilter::None,
            PrefilterConfig::SubtractedMean => Prefilter::SubtractedMean,
            PrefilterConfig::LogFilter => Prefilter::LaplacianOfGaussian,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FilterConfigJson {
    rm_threshold: f32,
    rm_min_matches: f32,
    quantile_percentile: f32,
    quantile_multiple: f32,
}

impl Default for FilterConfigJson {
    fn default() -> Self {
        let params = FilterParams::default();
        Self {
            rm_threshold: params.rm_threshold,
            rm_min_matches: params.rm_min_matches,
            quantile_percentile: params.quantile_percentile,
            quantile_multiple: params.quantile_multiple,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CorrConfigJson {
    seed_mode: SeedModeConfig,
    /// Global search range `[min_x, min_y, max_x, max_y]`; highest priority.
    search_range: Option<[f32; 4]>,
    seed_percent_pad: f32,
    cost: CostConfig,
    prefilter: PrefilterConfig,
    kernel_size: [usize; 2],
    corr_timeout: u32,
    use_sgm: bool,
    use_local_homography: bool,
    corr_tile_size: i64,
    collar_size: i64,
    /// Output crop window `[x, y, width, height]`; omitted computes everything.
    crop_win: Option<[i64; 4]>,
    skip_low_res: bool,
    compute_low_res_only: bool,
    filter: FilterConfigJson,
}

impl Default for CorrConfigJson {
    fn default() -> Self {
        let cfg = CorrConfig::default();
        Self {
            seed_mode: SeedModeConfig::LowRes,
            search_range: None,
            seed_percent_pad: cfg.seed_percent_pad,
            cost: CostConfig::CrossCorrelation,
            prefilter: PrefilterConfig::LogFilter,
            kernel_size: [cfg.kernel_size.0, cfg.kernel_size.1],
            corr_timeout: cfg.corr_timeout,
            use_sgm: cfg.use_sgm,
            use_local_homography: cfg.use_local_homography,
            corr_tile_size: cfg.corr_tile_size,
            collar_size: cfg.collar_size,
            crop_win: None,
            skip_low_res: cfg.skip_low_res,
            compute_low_res_only: cfg.compute_low_res_only,
            filter: FilterConfigJson::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    left_image: String,
    right_image: String,
    left_mask: Option<String>,
    right_mask: Option<String>,
    output_prefix: String,
    /// Number of 2x decimations applied to build the low-resolution pair.
    seed_levels: u32,
    corr: CorrConfigJson,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            left_image: String::new(),
            right_image: String::new(),
            left_mask: None,
            right_mask: None,
            output_prefix: "stereoseed-out".into(),
            seed_levels: 3,
            corr: CorrConfigJson::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    width: usize,
    height: usize,
    valid: usize,
    disparity_path: Option<String>,
}

fn decimate(
    mut image: Raster<f32>,
    mut mask: Raster<u8>,
    levels: u32,
) -> Result<(Raster<f32>, Raster<u8>), Box<dyn std::error::Error>> {
    for _ in 0..levels {
        if image.width() < 2 || image.height() < 2 {
            break;
        }
        image = downsample_image(&image)?;
        mask = downsample_mask(&mask)?;
    }
    Ok((image, mask))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("stereoseed=info".parse()?),
            )
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.left_image.is_empty() || config.right_image.is_empty() {
        return Err("left_image and right_image must be set in the config".into());
    }

    let left = load_gray_raster(&config.left_image)?;
    let right = load_gray_raster(&config.right_image)?;
    let left_mask = match &config.left_mask {
        Some(path) => load_mask(path)?,
        None => full_mask(left.width(), left.height())?,
    };
    let right_mask = match &config.right_mask {
        Some(path) => load_mask(path)?,
        None => full_mask(right.width(), right.height())?,
    };

    let (left_low, left_mask_low) = decimate(left.clone(), left_mask.clone(), config.seed_levels)?;
    let (right_low, right_mask_low) =
        decimate(right.clone(), right_mask.clone(), config.seed_levels)?;

    let corr = config.corr;
    let cfg = CorrConfig {
        seed_mode: corr.seed_mode.into(),
        user_search_range: corr
            .search_range
            .map(|r| SearchRange::new(r[0], r[1], r[2], r[3])),
        seed_percent_pad: corr.seed_percent_pad,
        cost: corr.cost.into(),
        prefilter: corr.prefilter.into(),
        kernel_size: (corr.kernel_size[0], corr.kernel_size[1]),
        corr_timeout: corr.corr_timeout,
        use_sgm: corr.use_sgm,
        use_local_homography: corr.use_local_homography,
        corr_tile_size: corr.corr_tile_size,
        collar_size: corr.collar_size,
        crop_win: corr
            .crop_win
            .map(|w| PixelBox::from_size(w[0], w[1], w[2], w[3])),
        skip_low_res: corr.skip_low_res,
        compute_low_res_only: corr.compute_low_res_only,
        filter: FilterParams {
            rm_threshold: corr.filter.rm_threshold,
            rm_min_matches: corr.filter.rm_min_matches,
            quantile_percentile: corr.filter.quantile_percentile,
            quantile_multiple: corr.filter.quantile_multiple,
            ..FilterParams::default()
        },
        ..CorrConfig::default()
    };

    let ws = Workspace::new(&config.output_prefix);
    let inputs = PipelineInputs {
        left: &left,
        right: &right,
        left_mask: &left_mask,
        right_mask: &right_mask,
        left_low: &left_low,
        right_low: &right_low,
        left_mask_low: &left_mask_low,
        right_mask_low: &right_mask_low,
    };
    let pipeline = Pipeline::new(&cfg, ws, inputs)?;
    let engine = BlockMatcher::default();

    let output = match pipeline.run(&engine, None, None)? {
        Some(field) => Output {
            width: field.width(),
            height: field.height(),
            valid: field.valid_count(),
            disparity_path: Some(
                pipeline.workspace().full_disparity().display().to_string(),
            ),
        },
        None => Output {
            width: left_low.width(),
            height: left_low.height(),
            valid: 0,
            disparity_path: None,
        },
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
