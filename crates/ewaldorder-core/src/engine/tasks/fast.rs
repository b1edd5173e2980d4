use crate::core::ewald::summation::EwaldSummation;
use crate::engine::config::{RemovalGroup, SearchBudget};
use crate::engine::energy_matrix::EnergyMatrix;
use crate::engine::error::EngineError;
use crate::engine::minimizer::EwaldMinimizer;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::Solution;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct FastResult {
    pub solutions: Vec<Solution>,
    pub budget_exhausted: bool,
}

#[instrument(skip_all, name = "fast_ordering_task", fields(groups = groups.len(), num_to_return = num_to_return))]
pub fn run(
    ewald: &EwaldSummation,
    groups: &[RemovalGroup],
    num_to_return: usize,
    budget: SearchBudget,
    reporter: &ProgressReporter,
) -> Result<FastResult, EngineError> {
    reporter.report(Progress::Message(format!(
        "Branch-and-bound over {} site(s) in {} group(s)",
        groups.iter().map(RemovalGroup::len).sum::<usize>(),
        groups.len()
    )));

    let matrix = EnergyMatrix::from_ewald(ewald);
    let outcome = EwaldMinimizer::new(matrix, groups.to_vec(), num_to_return, budget).minimize();

    debug!(
        nodes = outcome.nodes_expanded,
        found = outcome.solutions.len(),
        "Fast ordering finished."
    );

    if outcome.solutions.is_empty() {
        return Err(EngineError::NoSolution);
    }
    Ok(FastResult {
        solutions: outcome.solutions,
        budget_exhausted: outcome.budget_exhausted,
    })
}
