use crate::cli::OrderArgs;
use crate::config::{PartialJobConfig, StructureEntry};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use ewaldorder::engine::progress::ProgressReporter;
use ewaldorder::engine::state::Manipulation;
use ewaldorder::workflows::order::{self, OrderedStructure, OrderingResult};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Serialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct ResultsFile {
    algorithm: String,
    /// Kept as text: the count can exceed TOML's 64-bit integers.
    total_combinations: String,
    initial_energy: f64,
    budget_exhausted: bool,
    orderings: Vec<OrderingEntry>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct OrderingEntry {
    rank: usize,
    energy: f64,
    energy_above_minimum: f64,
    formula: String,
    removed: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    replaced: Vec<ReplacementEntry>,
    structure: StructureEntry,
}

#[derive(Serialize, Debug)]
struct ReplacementEntry {
    index: usize,
    species: String,
}

#[derive(Serialize, Debug)]
struct SummaryRow {
    rank: usize,
    energy: f64,
    energy_above_minimum: f64,
    formula: String,
    removed: String,
    replaced: String,
}

pub fn run(args: OrderArgs) -> Result<()> {
    let partial_config = PartialJobConfig::from_file(&args.config)?;
    info!("Merging job file with CLI arguments...");
    let job = partial_config.merge_with_cli(&args)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Ordering {} sites with the {} algorithm...",
        job.structure.len(),
        job.config.algorithm
    );
    let result = order::run(&job.structure, &job.config, &job.symmetry, &reporter)?;
    info!("Workflow finished with {} ordering(s).", result.structures.len());

    if result.budget_exhausted {
        warn!("Search budget exhausted; results are the best found so far.");
        println!("Warning: the search budget was exhausted before the search completed.");
    }
    print_table(&result);

    if let Some(path) = &args.output {
        write_results(path, &result)?;
        println!("✓ Orderings written to: {}", path.display());
    }
    if let Some(path) = &args.summary {
        write_summary(path, &result)?;
        println!("✓ Summary written to: {}", path.display());
    }
    Ok(())
}

fn print_table(result: &OrderingResult) {
    println!(
        "\n{} of {} possible orderings (initial energy {:.6} eV):",
        result.structures.len(),
        result.total_combinations,
        result.initial_energy
    );
    println!("{:>5}  {:>16}  {:>14}  {:<16}  {}", "rank", "energy (eV)", "dE/atom (eV)", "formula", "removed");
    for (rank, ordered) in result.structures.iter().enumerate() {
        println!(
            "{:>5}  {:>16.6}  {:>14.6}  {:<16}  {}",
            rank + 1,
            ordered.energy,
            ordered.energy_above_minimum,
            ordered.structure.formula(),
            join_indices(removed(&ordered.manipulations))
        );
    }
}

fn removed(manipulations: &[Manipulation]) -> impl Iterator<Item = usize> + '_ {
    manipulations.iter().filter(|m| m.replacement.is_none()).map(|m| m.index)
}

fn replaced(manipulations: &[Manipulation]) -> impl Iterator<Item = (usize, String)> + '_ {
    manipulations
        .iter()
        .filter_map(|m| m.replacement.map(|sp| (m.index, sp.to_string())))
}

fn join_indices(indices: impl Iterator<Item = usize>) -> String {
    indices.map(|i| i.to_string()).collect::<Vec<_>>().join(";")
}

fn entry(rank: usize, ordered: &OrderedStructure) -> OrderingEntry {
    OrderingEntry {
        rank,
        energy: ordered.energy,
        energy_above_minimum: ordered.energy_above_minimum,
        formula: ordered.structure.formula(),
        removed: removed(&ordered.manipulations).collect(),
        replaced: replaced(&ordered.manipulations)
            .map(|(index, species)| ReplacementEntry { index, species })
            .collect(),
        structure: StructureEntry::from_structure(&ordered.structure),
    }
}

fn write_results(path: &Path, result: &OrderingResult) -> Result<()> {
    let file = ResultsFile {
        algorithm: result.algorithm.to_string(),
        total_combinations: result.total_combinations.to_string(),
        initial_energy: result.initial_energy,
        budget_exhausted: result.budget_exhausted,
        orderings: result
            .structures
            .iter()
            .enumerate()
            .map(|(k, ordered)| entry(k + 1, ordered))
            .collect(),
    };
    let content = toml::to_string(&file).map_err(|e| CliError::Output {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    std::fs::write(path, content)?;
    Ok(())
}

fn write_summary(path: &Path, result: &OrderingResult) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (k, ordered) in result.structures.iter().enumerate() {
        writer.serialize(SummaryRow {
            rank: k + 1,
            energy: ordered.energy,
            energy_above_minimum: ordered.energy_above_minimum,
            formula: ordered.structure.formula(),
            removed: join_indices(removed(&ordered.manipulations)),
            replaced: replaced(&ordered.manipulations)
                .map(|(index, species)| format!("{}:{}", index, species))
                .collect::<Vec<_>>()
                .join(";"),
        })?;
    }
    writer.flush()?;
    Ok(())
}
