use crate::cli::OrderArgs;
use crate::error::{CliError, Result};
use ewaldorder::core::ewald::params::EwaldParams;
use ewaldorder::core::models::lattice::Lattice;
use ewaldorder::core::models::site::Site;
use ewaldorder::core::models::species::Species;
use ewaldorder::core::models::structure::Structure;
use ewaldorder::core::symmetry::{SymmetryOperation, SymmetryOperations};
use ewaldorder::engine::config as core_config;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// One site as written in job and result files: fractional coordinates and a
/// `species -> occupancy` table such as `{ "Li+" = 0.5 }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SiteEntry {
    pub coords: [f64; 3],
    pub species: BTreeMap<String, f64>,
}

impl SiteEntry {
    pub fn from_site(site: &Site) -> Self {
        Self {
            coords: [site.frac_coords.x, site.frac_coords.y, site.frac_coords.z],
            species: site
                .species
                .iter()
                .map(|(sp, occupancy)| (sp.to_string(), *occupancy))
                .collect(),
        }
    }

    fn to_site(&self, index: usize) -> Result<Site> {
        if self.species.is_empty() {
            return Err(CliError::Config(format!("Site {} lists no species.", index)));
        }
        let species = self
            .species
            .iter()
            .map(|(label, &occupancy)| {
                let sp = Species::from_str(label)
                    .map_err(|e| CliError::Config(format!("Site {}: {}", index, e)))?;
                Ok((sp, occupancy))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Site::new(species, Vector3::from(self.coords)))
    }
}

/// A structure in job and result files. The lattice is given either as three
/// vectors (`lattice`, Angstroms) or as `parameters = [a, b, c, alpha, beta, gamma]`.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct StructureEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lattice: Option<[[f64; 3]; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<[f64; 6]>,
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
}

impl StructureEntry {
    pub fn from_structure(structure: &Structure) -> Self {
        Self {
            lattice: Some(structure.lattice().clone().into()),
            parameters: None,
            sites: structure.sites().iter().map(SiteEntry::from_site).collect(),
        }
    }

    pub fn to_structure(&self) -> Result<Structure> {
        let lattice = match (self.lattice, self.parameters) {
            (Some(vectors), None) => Lattice::try_from(vectors),
            (None, Some([a, b, c, alpha, beta, gamma])) => Lattice::from_parameters(a, b, c, alpha, beta, gamma),
            (Some(_), Some(_)) => {
                return Err(CliError::Config(
                    "`structure` must give either `lattice` or `parameters`, not both.".to_string(),
                ));
            }
            (None, None) => {
                return Err(CliError::Config(
                    "`structure` requires a `lattice` or `parameters` entry.".to_string(),
                ));
            }
        }
        .map_err(|e| CliError::Config(e.to_string()))?;

        let sites = self
            .sites
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.to_site(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Structure::new(lattice, sites))
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialGroup {
    indices: Vec<usize>,
    fraction: f64,
    replacement: Option<String>,
}

impl PartialGroup {
    fn into_site_group(self, position: usize) -> Result<core_config::SiteGroup> {
        Ok(match self.replacement {
            None => core_config::SiteGroup::removal(self.indices, self.fraction),
            Some(label) => {
                let species = Species::from_str(&label)
                    .map_err(|e| CliError::Config(format!("Group {}: {}", position, e)))?;
                core_config::SiteGroup::replacement(self.indices, self.fraction, species)
            }
        })
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialOrderingConfig {
    algorithm: Option<String>,
    #[serde(rename = "num-to-return")]
    num_to_return: Option<usize>,
    #[serde(rename = "energy-tolerance")]
    energy_tolerance: Option<f64>,
    #[serde(rename = "symmetry-tolerance")]
    symmetry_tolerance: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialEwaldConfig {
    eta: Option<f64>,
    #[serde(rename = "real-space-cutoff")]
    real_space_cutoff: Option<f64>,
    #[serde(rename = "recip-space-cutoff")]
    recip_space_cutoff: Option<f64>,
    #[serde(rename = "accuracy-factor")]
    accuracy_factor: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialBudgetConfig {
    #[serde(rename = "max-nodes")]
    max_nodes: Option<u64>,
    #[serde(rename = "time-limit-seconds")]
    time_limit_seconds: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialOperation {
    /// Rows of the integer rotation in the fractional basis.
    rotation: [[i8; 3]; 3],
    #[serde(default)]
    translation: [f64; 3],
}

impl From<PartialOperation> for SymmetryOperation {
    fn from(p: PartialOperation) -> Self {
        let r = p.rotation;
        SymmetryOperation::new(
            Matrix3::new(
                r[0][0], r[0][1], r[0][2], r[1][0], r[1][1], r[1][2], r[2][0], r[2][1], r[2][2],
            ),
            Vector3::from(p.translation),
        )
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSymmetryConfig {
    #[serde(default)]
    operations: Vec<PartialOperation>,
}

/// A job file as read from disk, before validation.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialJobConfig {
    structure: Option<StructureEntry>,
    groups: Option<Vec<PartialGroup>>,
    ordering: Option<PartialOrderingConfig>,
    ewald: Option<PartialEwaldConfig>,
    budget: Option<PartialBudgetConfig>,
    symmetry: Option<PartialSymmetryConfig>,
}

/// Everything an ordering run needs, fully validated.
#[derive(Debug, Clone)]
pub struct Job {
    pub structure: Structure,
    pub config: core_config::OrderingConfig,
    pub symmetry: SymmetryOperations,
}

#[derive(Debug, Default)]
struct CliOverrides {
    algorithm: Option<core_config::OrderingAlgorithm>,
    num_to_return: Option<usize>,
    max_nodes: Option<u64>,
    time_limit_seconds: Option<f64>,
}

impl PartialJobConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading job file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Applies `-S` overrides, then the dedicated CLI flags, which take precedence.
    pub fn merge_with_cli(mut self, args: &OrderArgs) -> Result<Job> {
        self.apply_set_values(&args.set_values)?;
        self.into_job_with(CliOverrides {
            algorithm: args.algorithm,
            num_to_return: args.num_to_return,
            max_nodes: args.max_nodes,
            time_limit_seconds: args.time_limit,
        })
    }

    pub fn into_job(self) -> Result<Job> {
        self.into_job_with(CliOverrides::default())
    }

    fn into_job_with(self, cli: CliOverrides) -> Result<Job> {
        let structure = self
            .structure
            .ok_or_else(|| CliError::Config("`structure` section is required.".to_string()))?
            .to_structure()?;

        let groups = self
            .groups
            .ok_or_else(|| CliError::Config("At least one `[[groups]]` entry is required.".to_string()))?
            .into_iter()
            .enumerate()
            .map(|(position, group)| group.into_site_group(position))
            .collect::<Result<Vec<_>>>()?;

        let ordering = self.ordering.unwrap_or_default();
        let algorithm = match (cli.algorithm, ordering.algorithm) {
            (Some(algorithm), _) => algorithm,
            (None, Some(name)) => name
                .parse::<core_config::OrderingAlgorithm>()
                .map_err(|e| CliError::Config(e.to_string()))?,
            (None, None) => core_config::OrderingAlgorithm::default(),
        };

        let ewald = Self::merge_ewald(self.ewald.unwrap_or_default());
        let budget = Self::merge_budget(self.budget.unwrap_or_default(), &cli)?;

        let mut builder = core_config::OrderingConfigBuilder::new()
            .groups(groups)
            .algorithm(algorithm)
            .num_to_return(cli.num_to_return.or(ordering.num_to_return).unwrap_or(1))
            .ewald(ewald)
            .budget(budget);
        if let Some(tolerance) = ordering.energy_tolerance {
            builder = builder.energy_tolerance(tolerance);
        }
        if let Some(tolerance) = ordering.symmetry_tolerance {
            builder = builder.symmetry_tolerance(tolerance);
        }
        let config = builder.build().map_err(|e| CliError::Config(e.to_string()))?;

        let operations = self
            .symmetry
            .unwrap_or_default()
            .operations
            .into_iter()
            .map(SymmetryOperation::from)
            .collect();

        Ok(Job {
            structure,
            config,
            symmetry: SymmetryOperations::new(operations),
        })
    }

    fn merge_ewald(partial: PartialEwaldConfig) -> EwaldParams {
        let defaults = EwaldParams::default();
        EwaldParams {
            eta: partial.eta,
            real_space_cutoff: partial.real_space_cutoff,
            recip_space_cutoff: partial.recip_space_cutoff,
            accuracy_factor: partial.accuracy_factor.unwrap_or(defaults.accuracy_factor),
        }
    }

    fn merge_budget(partial: PartialBudgetConfig, cli: &CliOverrides) -> Result<core_config::SearchBudget> {
        let time_limit = match cli.time_limit_seconds.or(partial.time_limit_seconds) {
            Some(seconds) => Some(Duration::try_from_secs_f64(seconds).map_err(|_| {
                CliError::Config(format!("Invalid time limit: {} seconds.", seconds))
            })?),
            None => None,
        };
        Ok(core_config::SearchBudget {
            max_nodes: cli.max_nodes.or(partial.max_nodes),
            time_limit,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "ordering.algorithm" => {
                    self.ordering.get_or_insert_with(Default::default).algorithm = Some(value_str.to_string());
                }
                "ordering.num-to-return" => {
                    self.ordering.get_or_insert_with(Default::default).num_to_return =
                        Some(parse_value(key, value_str)?);
                }
                "ordering.energy-tolerance" => {
                    self.ordering.get_or_insert_with(Default::default).energy_tolerance =
                        Some(parse_value(key, value_str)?);
                }
                "ordering.symmetry-tolerance" => {
                    self.ordering.get_or_insert_with(Default::default).symmetry_tolerance =
                        Some(parse_value(key, value_str)?);
                }
                "ewald.eta" => {
                    self.ewald.get_or_insert_with(Default::default).eta = Some(parse_value(key, value_str)?);
                }
                "ewald.real-space-cutoff" => {
                    self.ewald.get_or_insert_with(Default::default).real_space_cutoff =
                        Some(parse_value(key, value_str)?);
                }
                "ewald.recip-space-cutoff" => {
                    self.ewald.get_or_insert_with(Default::default).recip_space_cutoff =
                        Some(parse_value(key, value_str)?);
                }
                "ewald.accuracy-factor" => {
                    self.ewald.get_or_insert_with(Default::default).accuracy_factor =
                        Some(parse_value(key, value_str)?);
                }
                "budget.max-nodes" => {
                    self.budget.get_or_insert_with(Default::default).max_nodes = Some(parse_value(key, value_str)?);
                }
                "budget.time-limit-seconds" => {
                    self.budget.get_or_insert_with(Default::default).time_limit_seconds =
                        Some(parse_value(key, value_str)?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use ewaldorder::core::symmetry::SymmetryOracle;
    use ewaldorder::engine::config::OrderingAlgorithm;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    const JOB: &str = r#"
[structure]
lattice = [[5.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 5.0]]

[[structure.sites]]
coords = [0.0, 0.0, 0.0]
species = { "O2-" = 1.0 }

[[structure.sites]]
coords = [0.25, 0.25, 0.25]
species = { "Li+" = 0.5 }

[[structure.sites]]
coords = [0.75, 0.75, 0.25]
species = { "Li+" = 0.5 }

[[structure.sites]]
coords = [0.75, 0.25, 0.75]
species = { "Li+" = 0.5 }

[[structure.sites]]
coords = [0.25, 0.75, 0.75]
species = { "Li+" = 0.5 }

[[groups]]
indices = [1, 2, 3, 4]
fraction = 0.5

[ordering]
algorithm = "complete"
num-to-return = 2

[ewald]
accuracy-factor = 6.0
"#;

    fn write_job(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("job.toml");
        fs::write(&path, content).unwrap();
        path
    }

    fn order_args(path: &Path, extra: &[&str]) -> OrderArgs {
        let mut argv = vec!["ewaldorder", "order", "-c", path.to_str().unwrap()];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Order(args) => args,
            _ => panic!("Expected 'order' subcommand"),
        }
    }

    #[test]
    fn job_file_values_are_loaded() {
        let dir = tempdir().unwrap();
        let path = write_job(&dir, JOB);
        let job = PartialJobConfig::from_file(&path).unwrap().into_job().unwrap();

        assert_eq!(job.structure.len(), 5);
        assert_eq!(job.structure.sites()[1].species[0].1, 0.5);
        assert_eq!(job.config.algorithm, OrderingAlgorithm::Complete);
        assert_eq!(job.config.num_to_return, 2);
        assert_eq!(job.config.ewald.accuracy_factor, 6.0);
        assert!(job.config.ewald.eta.is_none());
        assert!(job.config.budget.is_unlimited());
        assert_eq!(job.config.groups.len(), 1);
        assert_eq!(job.symmetry.len(), 1);
    }

    #[test]
    fn cli_flags_override_set_values_and_file() {
        let dir = tempdir().unwrap();
        let path = write_job(&dir, JOB);
        let args = order_args(
            &path,
            &[
                "-S",
                "ordering.num-to-return=4",
                "-S",
                "ewald.eta=0.25",
                "-n",
                "3",
                "--algorithm",
                "fast",
                "--time-limit",
                "1.5",
            ],
        );
        let job = PartialJobConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&args)
            .unwrap();

        assert_eq!(job.config.num_to_return, 3);
        assert_eq!(job.config.algorithm, OrderingAlgorithm::Fast);
        assert_eq!(job.config.ewald.eta, Some(0.25));
        assert_eq!(job.config.budget.time_limit, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn set_values_reach_nested_sections() {
        let mut partial: PartialJobConfig = toml::from_str(JOB).unwrap();
        partial
            .apply_set_values(&[
                "budget.max-nodes=500".to_string(),
                "ordering.algorithm=best_first".to_string(),
                "ordering.symmetry-tolerance=0.05".to_string(),
            ])
            .unwrap();
        let job = partial.into_job().unwrap();
        assert_eq!(job.config.budget.max_nodes, Some(500));
        assert_eq!(job.config.algorithm, OrderingAlgorithm::BestFirst);
        assert_eq!(job.config.symmetry_tolerance, 0.05);
    }

    #[test]
    fn malformed_set_values_are_rejected() {
        let mut partial = PartialJobConfig::default();
        for bad in ["ewald.eta", "ewald.eta=abc", "forcefield.s-factor=1.0"] {
            let result = partial.apply_set_values(&[bad.to_string()]);
            assert!(matches!(result, Err(CliError::Config(_))), "accepted '{}'", bad);
        }
    }

    #[test]
    fn unknown_fields_fail_to_parse() {
        let dir = tempdir().unwrap();
        let path = write_job(&dir, &format!("{}\n[extras]\nfoo = 1\n", JOB));
        assert!(matches!(
            PartialJobConfig::from_file(&path),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn missing_sections_are_reported() {
        let no_groups = JOB.split("[[groups]]").next().unwrap();
        let partial: PartialJobConfig = toml::from_str(no_groups).unwrap();
        assert!(matches!(partial.into_job(), Err(CliError::Config(_))));

        let partial: PartialJobConfig = toml::from_str("[[groups]]\nindices = [0]\nfraction = 1.0\n").unwrap();
        assert!(matches!(partial.into_job(), Err(CliError::Config(_))));
    }

    #[test]
    fn bad_species_and_algorithm_are_config_errors() {
        let bad_species = JOB.replace("\"O2-\"", "\"Xx2-\"");
        let partial: PartialJobConfig = toml::from_str(&bad_species).unwrap();
        assert!(matches!(partial.into_job(), Err(CliError::Config(_))));

        let bad_algorithm = JOB.replace("\"complete\"", "\"annealing\"");
        let partial: PartialJobConfig = toml::from_str(&bad_algorithm).unwrap();
        assert!(matches!(partial.into_job(), Err(CliError::Config(_))));
    }

    #[test]
    fn lattice_parameters_and_symmetry_operations_are_accepted() {
        let content = JOB
            .replace(
                "lattice = [[5.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 5.0]]",
                "parameters = [5.0, 5.0, 5.0, 90.0, 90.0, 90.0]",
            )
            + r#"
[symmetry]
operations = [
    { rotation = [[1, 0, 0], [0, 1, 0], [0, 0, 1]], translation = [0.5, 0.5, 0.0] },
]
"#;
        let job = toml::from_str::<PartialJobConfig>(&content)
            .unwrap()
            .into_job()
            .unwrap();
        assert!((job.structure.lattice().volume() - 125.0).abs() < 1e-9);
        assert_eq!(job.symmetry.len(), 2);

        let sites = job.structure.sites();
        assert!(job.symmetry.are_equivalent(&[&sites[1]], &[&sites[2]], 0.01));
    }

    #[test]
    fn structure_entries_round_trip_through_sites() {
        let partial: PartialJobConfig = toml::from_str(JOB).unwrap();
        let structure = partial.structure.unwrap().to_structure().unwrap();
        let entry = StructureEntry::from_structure(&structure);
        assert_eq!(entry.sites[2].species.get("Li+"), Some(&0.5));
        let rebuilt = entry.to_structure().unwrap();
        assert_eq!(rebuilt.sites(), structure.sites());
    }
}
