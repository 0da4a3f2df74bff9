//! Data export system for analysis in external tools.

use crate::dynamics::Dynamics;
use crate::error::SimResult;
use crate::stats::StatsHistory;
use std::fs::{File, OpenOptions};
use std::io::{Result, Write};
use std::path::{Path, PathBuf};

const STATE_CSV_HEADER: &str = "initial_tree_cover,time,tree_cover,population_size,seeds_spread,fire_spatial_extent";

/// Export system for saving simulation data
pub struct ExportSystem;

impl ExportSystem {
    /// Append one row of the state time series, writing the header for a new file
    pub fn append_state_csv<P: AsRef<Path>>(dynamics: &Dynamics, path: P) -> Result<()> {
        let path = path.as_ref();
        let is_new = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if is_new {
            writeln!(file, "{}", STATE_CSV_HEADER)?;
        }
        writeln!(
            file,
            "{:.4},{},{:.4},{},{},{:.2}",
            dynamics.config.dynamics.initial_tree_cover,
            dynamics.time,
            dynamics.tree_cover(),
            dynamics.population(),
            dynamics.stats.seeds_produced,
            dynamics.stats.fire_spatial_extent,
        )
    }

    /// Land-cover map as a `width × width` CSV matrix
    pub fn export_land_cover_csv<P: AsRef<Path>>(dynamics: &mut Dynamics, path: P) -> SimResult<()> {
        let width = dynamics.state()?.grid.width();
        let codes = dynamics.state_distribution(true)?;
        let mut file = File::create(path)?;
        for row in codes.chunks(width.max(1)) {
            let line: Vec<String> = row.iter().map(i32::to_string).collect();
            writeln!(file, "{}", line.join(","))?;
        }
        Ok(())
    }

    /// Tree positions and sizes
    pub fn export_trees_csv<P: AsRef<Path>>(dynamics: &Dynamics, path: P) -> SimResult<()> {
        let state = dynamics.state()?;
        let mut file = File::create(path)?;
        writeln!(file, "id,x,y,radius,vector,reproductive")?;
        for tree in state.population.trees() {
            let vector = state.population.strategy(tree.id).map_or("", |s| s.vector.name());
            writeln!(
                file,
                "{},{:.3},{:.3},{:.3},{},{}",
                tree.id,
                tree.position.x,
                tree.position.y,
                tree.radius,
                vector,
                tree.is_reproductive(),
            )?;
        }
        Ok(())
    }

    /// Time since the last fire per cell as a `width × width` CSV matrix
    pub fn export_fire_intervals_csv<P: AsRef<Path>>(dynamics: &Dynamics, path: P) -> SimResult<()> {
        let grid = &dynamics.state()?.grid;
        let intervals = grid.fire_free_intervals(dynamics.time as f32);
        let mut file = File::create(path)?;
        for row in intervals.chunks(grid.width().max(1)) {
            let line: Vec<String> = row.iter().map(|t| format!("{:.2}", t)).collect();
            writeln!(file, "{}", line.join(","))?;
        }
        Ok(())
    }

    /// Stats history to JSON
    pub fn export_stats_json<P: AsRef<Path>>(history: &StatsHistory, path: P) -> Result<()> {
        history.save(path)
    }

    /// Land cover, tree positions, fire-free intervals and stats history into `base`
    pub fn export_full_state<P: AsRef<Path>>(dynamics: &mut Dynamics, base_path: P) -> SimResult<ExportManifest> {
        let base = base_path.as_ref();
        std::fs::create_dir_all(base)?;

        let land_cover_file = base.join(format!("land_cover_{}.csv", dynamics.time));
        let trees_file = base.join(format!("trees_{}.csv", dynamics.time));
        let fire_intervals_file = base.join(format!("fire_intervals_{}.csv", dynamics.time));
        let stats_file = base.join("stats_history.json");

        Self::export_land_cover_csv(dynamics, &land_cover_file)?;
        Self::export_trees_csv(dynamics, &trees_file)?;
        Self::export_fire_intervals_csv(dynamics, &fire_intervals_file)?;
        Self::export_stats_json(&dynamics.stats_history, &stats_file)?;

        Ok(ExportManifest {
            time: dynamics.time,
            land_cover_file,
            trees_file,
            fire_intervals_file,
            stats_file,
        })
    }
}

/// Files written by [`ExportSystem::export_full_state`]
#[derive(Debug, Clone)]
pub struct ExportManifest {
    pub time: u64,
    pub land_cover_file: PathBuf,
    pub trees_file: PathBuf,
    pub fire_intervals_file: PathBuf,
    pub stats_file: PathBuf,
}
