use crate::core::ewald::summation::EwaldSummation;
use crate::core::models::structure::Structure;
use crate::core::symmetry::SymmetryOracle;
use crate::core::utils::combinatorics;
use crate::engine::config::{ConfigError, OrderingAlgorithm, OrderingConfig, RemovalGroup};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::{Manipulation, Solution};
use crate::engine::tasks::{self, complete::CompleteSettings};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// One ordered structure with its Ewald energy (eV) and its energy above the
/// best result, per atom of the input structure.
#[derive(Debug, Clone, Serialize)]
pub struct OrderedStructure {
    pub structure: Structure,
    pub energy: f64,
    pub energy_above_minimum: f64,
    pub manipulations: Vec<Manipulation>,
}

#[derive(Debug, Clone)]
pub struct OrderingResult {
    pub algorithm: OrderingAlgorithm,
    /// Ascending by energy, at most `num_to_return` entries.
    pub structures: Vec<OrderedStructure>,
    pub total_combinations: u128,
    pub initial_energy: f64,
    pub budget_exhausted: bool,
}

impl OrderingResult {
    pub fn best(&self) -> Option<&OrderedStructure> {
        self.structures.first()
    }
}

/// Number of distinct orderings `prod C(n_g, k_g)` the configuration admits,
/// after validating it against `structure`.
pub fn total_combinations(structure: &Structure, config: &OrderingConfig) -> Result<u128, ConfigError> {
    let groups = config.resolve_groups(structure)?;
    Ok(count(&groups))
}

fn count(groups: &[RemovalGroup]) -> u128 {
    combinatorics::total_combinations(groups.iter().map(|g| (g.len(), g.count)))
}

#[instrument(skip_all, name = "ordering_workflow", fields(algorithm = %config.algorithm, sites = structure.len()))]
pub fn run(
    structure: &Structure,
    config: &OrderingConfig,
    oracle: &dyn SymmetryOracle,
    reporter: &ProgressReporter,
) -> Result<OrderingResult, EngineError> {
    // === Phase 1: Validation ===
    reporter.report(Progress::PhaseStart { name: "Validation" });
    let groups = config.resolve_groups(structure)?;
    let total_combinations = count(&groups);
    for (k, group) in groups.iter().enumerate() {
        debug!(
            group = k,
            sites = group.len(),
            count = group.count,
            replacement = ?group.replacement,
            "Resolved site group."
        );
    }
    info!(total_combinations, "Validated ordering request.");
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Ewald summation ===
    reporter.report(Progress::PhaseStart {
        name: "Ewald summation",
    });
    let ewald = EwaldSummation::new(structure, &config.ewald)?;
    let initial_energy = ewald.total_energy();
    reporter.report(Progress::PhaseFinish);

    // === Phase 3: Search ===
    reporter.report(Progress::PhaseStart { name: "Search" });
    let (mut solutions, budget_exhausted) = search(structure, config, &groups, &ewald, oracle, reporter)?;
    reporter.report(Progress::PhaseFinish);

    solutions.truncate(config.num_to_return);
    let Some(minimum) = solutions.first().map(|s| s.energy) else {
        return Err(EngineError::NoSolution);
    };

    // === Phase 4: Materialization ===
    reporter.report(Progress::PhaseStart {
        name: "Materialization",
    });
    let num_atoms = structure.num_atoms();
    let per_atom = if num_atoms > 0.0 { num_atoms } else { 1.0 };
    let structures = solutions
        .into_iter()
        .map(|solution| {
            let ordered = materialize(structure, &solution)?;
            Ok(OrderedStructure {
                structure: ordered,
                energy: solution.energy,
                energy_above_minimum: (solution.energy - minimum) / per_atom,
                manipulations: solution.manipulations,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;
    reporter.report(Progress::PhaseFinish);

    info!(
        returned = structures.len(),
        best_energy = minimum,
        "Ordering workflow finished."
    );

    Ok(OrderingResult {
        algorithm: config.algorithm,
        structures,
        total_combinations,
        initial_energy,
        budget_exhausted,
    })
}

/// Runs the ordering and returns only the lowest-energy structure.
pub fn apply(
    structure: &Structure,
    config: &OrderingConfig,
    oracle: &dyn SymmetryOracle,
    reporter: &ProgressReporter,
) -> Result<Structure, EngineError> {
    run(structure, config, oracle, reporter)?
        .structures
        .into_iter()
        .next()
        .map(|best| best.structure)
        .ok_or(EngineError::NoSolution)
}

fn search(
    structure: &Structure,
    config: &OrderingConfig,
    groups: &[RemovalGroup],
    ewald: &EwaldSummation,
    oracle: &dyn SymmetryOracle,
    reporter: &ProgressReporter,
) -> Result<(Vec<Solution>, bool), EngineError> {
    match config.algorithm {
        OrderingAlgorithm::Fast => {
            let result = tasks::fast::run(ewald, groups, config.num_to_return, config.budget, reporter)?;
            Ok((result.solutions, result.budget_exhausted))
        }
        OrderingAlgorithm::Complete => {
            let settings = CompleteSettings {
                energy_tolerance: config.energy_tolerance,
                symmetry_tolerance: config.symmetry_tolerance,
                budget: config.budget,
            };
            let result = tasks::complete::run(structure, ewald, groups, &settings, oracle, reporter)?;
            Ok((result.solutions, result.budget_exhausted))
        }
        OrderingAlgorithm::BestFirst => {
            if !config.budget.is_unlimited() {
                debug!("Best-first ordering runs a fixed number of steps; the search budget is ignored.");
            }
            if config.num_to_return > 1 {
                warn!(
                    requested = config.num_to_return,
                    "Best-first ordering produces a single structure."
                );
            }
            Ok((vec![tasks::best_first::run(ewald, groups)?], false))
        }
    }
}

/// Replacements first, then deletions, then a sorted copy.
fn materialize(structure: &Structure, solution: &Solution) -> Result<Structure, EngineError> {
    let mut edited = structure.clone();
    edited.apply_manipulations(
        solution
            .manipulations
            .iter()
            .map(|m| (m.index, m.replacement.as_ref())),
    )?;
    Ok(edited.sorted())
}
