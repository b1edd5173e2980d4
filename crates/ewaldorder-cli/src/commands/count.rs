use crate::cli::CountArgs;
use crate::config::PartialJobConfig;
use crate::error::{CliError, Result};
use ewaldorder::core::utils::combinatorics;
use ewaldorder::engine::config::RemovalGroup;
use tracing::info;

pub fn run(args: CountArgs) -> Result<()> {
    let job = PartialJobConfig::from_file(&args.config)?.into_job()?;
    let groups = job
        .config
        .resolve_groups(&job.structure)
        .map_err(|e| CliError::Config(e.to_string()))?;

    let total = combinatorics::total_combinations(groups.iter().map(|g| (g.len(), g.count)));
    info!(groups = groups.len(), total_combinations = %total, "Counted orderings.");

    println!(
        "Structure: {} ({} sites, {:.3} atoms)",
        job.structure.formula(),
        job.structure.len(),
        job.structure.num_atoms()
    );
    println!("{:>5}  {:>6}  {:>7}  {:<12}  {}", "group", "sites", "select", "action", "combinations");
    for (k, group) in groups.iter().enumerate() {
        println!(
            "{:>5}  {:>6}  {:>7}  {:<12}  {}",
            k,
            group.len(),
            group.count,
            describe(group),
            combinatorics::binomial(group.len(), group.count)
        );
    }
    println!("Total orderings: {}", total);
    Ok(())
}

fn describe(group: &RemovalGroup) -> String {
    match group.replacement {
        None => "remove".to_string(),
        Some(species) => format!("-> {}", species),
    }
}
