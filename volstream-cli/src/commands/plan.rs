//! `volstream plan` - show which level, region and chunks a load would use.

use clap::Args;
use tracing::debug;
use volstream::config::ConfigFile;
use volstream::loader::{plan_load, LoadPlan, LoadSpec};
use volstream::multiscale::{LevelShape, Subregion};

use super::common::{parse_region, parse_zyx};
use crate::error::CliError;

/// Arguments for the plan command.
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Level shape as ZxYxX, finest first (repeat once per level)
    #[arg(long = "level", value_parser = parse_zyx, required = true)]
    pub levels: Vec<[usize; 3]>,

    /// Storage chunk shape as ZxYxX (default: one chunk per level)
    #[arg(long, value_parser = parse_zyx)]
    pub chunk: Option<[usize; 3]>,

    /// Normalized region z0,y0,x0,z1,y1,x1 (default: whole volume)
    #[arg(long, value_parser = parse_region)]
    pub region: Option<Subregion>,

    /// Maximum atlas edge in pixels (default: from config)
    #[arg(long)]
    pub max_atlas_edge: Option<usize>,

    /// Finest level allowed
    #[arg(long)]
    pub min_level: Option<usize>,

    /// Levels added to the estimate; negative loads finer data
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub level_bias: i32,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    fn level_shapes(&self) -> Vec<LevelShape> {
        self.levels
            .iter()
            .map(|&[z, y, x]| {
                let [cz, cy, cx] = self.chunk.unwrap_or([z, y, x]);
                LevelShape::new([1, 1, z, y, x], [1, 1, cz, cy, cx])
            })
            .collect()
    }

    fn load_spec(&self, default_edge: usize) -> LoadSpec {
        let mut spec = LoadSpec::new(0)
            .with_subregion(self.region.unwrap_or_default())
            .with_level_bias(self.level_bias)
            .with_max_atlas_edge(self.max_atlas_edge.unwrap_or(default_edge));
        if let Some(level) = self.min_level {
            spec = spec.with_min_level(level);
        }
        spec
    }
}

/// Run the plan command.
pub fn run(args: PlanArgs) -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let spec = args.load_spec(config.max_atlas_edge);
    debug!(?spec, "Planning load");

    let plan = plan_load(&spec, &args.level_shapes())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(())
}

fn print_plan(plan: &LoadPlan) {
    let [z, y, x] = plan.region.shape();
    println!("Load Plan");
    println!("=========");
    println!();
    println!("  Level:        {}", plan.level);
    println!(
        "  Level shape:  {}x{}x{}",
        plan.level_shape[0], plan.level_shape[1], plan.level_shape[2]
    );
    println!(
        "  Region:       {:?}..{:?} ({}x{}x{})",
        plan.region.start, plan.region.end, z, y, x
    );
    println!(
        "  Atlas:        {} rows x {} cols ({}x{} px)",
        plan.atlas.rows, plan.atlas.cols, plan.atlas_size.0, plan.atlas_size.1
    );
    println!(
        "  Chunks:       {} of {}x{}x{}",
        plan.chunks.len(),
        plan.chunk_shape[0],
        plan.chunk_shape[1],
        plan.chunk_shape[2]
    );
}
