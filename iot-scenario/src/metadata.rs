//! Descriptions of the run written before the simulation starts

use crate::config::RunConfig;
use crate::file_sink::{ensure_dir, wall_clock_timestamp, write_table};
use crate::topology::{Population, Topology};
use anyhow::Context;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const NODES_HEADER: &str = "node_id,ip_address,node_type";

pub fn nodes_file(output_dir: &Path) -> PathBuf {
    output_dir.join("node_metadata").join("nodes.csv")
}

/// Writes `node_metadata/nodes.csv`: one row per node, grouped by population
pub fn write_node_metadata(topology: &Topology, output_dir: &Path) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    let mut offset = 0;
    for population in Population::ALL {
        let nodes = topology.population(population);
        for (index, node) in nodes.iter().enumerate() {
            let Some(address) = topology.addresses.get(offset + index) else {
                tracing::error!(
                    "invalid interface index for {} node {index}",
                    population.label()
                );
                continue;
            };

            rows.push(format!("{node},{address},{}", population.label()));
        }
        offset += nodes.len();
    }

    let path = nodes_file(output_dir);
    write_table(&path, NODES_HEADER, rows)?;
    tracing::info!("Node metadata written to {}", path.display());
    Ok(())
}

/// Human readable listing of the configuration
pub fn simulation_metadata(config: &RunConfig, timestamp: &str) -> String {
    let p = &config.populations;
    let mut metadata = String::new();
    _ = writeln!(metadata, "Metadatos de Simulación");
    _ = writeln!(metadata, "Timestamp: {timestamp}");
    _ = writeln!(metadata, "Nodos Fijos: {}", p.fixed);
    _ = writeln!(metadata, "Nodos Móviles: {}", p.mobile);
    _ = writeln!(metadata, "Nodos Maliciosos: {}", p.malicious);
    _ = writeln!(metadata, "Nodos Interferentes: {}", p.interfering);
    _ = writeln!(metadata, "Tiempo de Simulación: {} segundos", config.sim_time);
    _ = writeln!(metadata, "Protocolo de Enrutamiento: {}", config.routing_protocol);
    _ = writeln!(metadata, "Nombre de Configuración: {}", config.config_name);
    _ = writeln!(metadata, "Semilla Aleatoria: {}", config.seed);
    metadata
}

/// Writes `metadata.txt`
pub fn write_simulation_metadata(config: &RunConfig) -> anyhow::Result<()> {
    let path = config.output_dir.join("metadata.txt");
    ensure_dir(&config.output_dir)?;
    std::fs::write(&path, simulation_metadata(config, &wall_clock_timestamp()))
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!("Simulation metadata written to {}", path.display());
    Ok(())
}
