use super::element::Element;
use super::error::ModelError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static SPECIES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][a-z]?)(?:(\d+(?:\.\d+)?)?([+-]))?$").expect("species pattern is valid")
});

/// An element optionally decorated with an oxidation state.
///
/// Species are parsed from and rendered to the conventional notation
/// (`"Fe2+"`, `"O2-"`, `"Li+"`, `"Fe2.5+"`). A bare symbol (`"Na"`) carries no
/// oxidation state and therefore no charge; such species cannot take part in
/// an Ewald summation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Species {
    element: &'static Element,
    oxidation_state: Option<f64>,
}

impl Species {
    pub fn new(symbol: &str, oxidation_state: Option<f64>) -> Result<Self, ModelError> {
        let element = Element::from_symbol(symbol)
            .ok_or_else(|| ModelError::UnknownElement(symbol.to_string()))?;
        Ok(Self {
            element,
            oxidation_state,
        })
    }

    pub fn element(&self) -> &'static Element {
        self.element
    }

    pub fn symbol(&self) -> &'static str {
        self.element.symbol
    }

    pub fn oxidation_state(&self) -> Option<f64> {
        self.oxidation_state
    }

    pub fn with_oxidation_state(self, oxidation_state: f64) -> Self {
        Self {
            oxidation_state: Some(oxidation_state),
            ..self
        }
    }

    /// Electronegativity first, then oxidation state.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        self.element
            .sort_electronegativity()
            .total_cmp(&other.element.sort_electronegativity())
            .then_with(|| self.element.z.cmp(&other.element.z))
            .then_with(|| {
                self.oxidation_state
                    .unwrap_or(0.0)
                    .total_cmp(&other.oxidation_state.unwrap_or(0.0))
            })
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element.symbol)?;
        if let Some(oxi) = self.oxidation_state {
            let sign = if oxi < 0.0 { '-' } else { '+' };
            let magnitude = oxi.abs();
            if (magnitude - 1.0).abs() < 1e-12 {
                write!(f, "{}", sign)?;
            } else if (magnitude - magnitude.round()).abs() < 1e-12 {
                write!(f, "{}{}", magnitude.round() as i64, sign)?;
            } else {
                write!(f, "{}{}", magnitude, sign)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Species {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let captures = SPECIES_PATTERN
            .captures(trimmed)
            .ok_or_else(|| ModelError::InvalidSpecies(s.to_string()))?;

        let symbol = &captures[1];
        let oxidation_state = match captures.get(3) {
            None => None,
            Some(sign) => {
                let magnitude = match captures.get(2) {
                    Some(m) => m
                        .as_str()
                        .parse::<f64>()
                        .map_err(|_| ModelError::InvalidSpecies(s.to_string()))?,
                    None => 1.0,
                };
                Some(if sign.as_str() == "-" {
                    -magnitude
                } else {
                    magnitude
                })
            }
        };
        Species::new(symbol, oxidation_state)
    }
}

impl TryFrom<String> for Species {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Species> for String {
    fn from(species: Species) -> Self {
        species.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_oxidation_states() {
        let fe: Species = "Fe2+".parse().unwrap();
        assert_eq!(fe.symbol(), "Fe");
        assert_eq!(fe.oxidation_state(), Some(2.0));

        let o: Species = "O2-".parse().unwrap();
        assert_eq!(o.oxidation_state(), Some(-2.0));
    }

    #[test]
    fn parses_implicit_unit_charge() {
        let li: Species = "Li+".parse().unwrap();
        assert_eq!(li.oxidation_state(), Some(1.0));
        let cl: Species = "Cl-".parse().unwrap();
        assert_eq!(cl.oxidation_state(), Some(-1.0));
    }

    #[test]
    fn parses_fractional_and_bare_species() {
        let fe: Species = "Fe2.5+".parse().unwrap();
        assert_eq!(fe.oxidation_state(), Some(2.5));
        let na: Species = "Na".parse().unwrap();
        assert_eq!(na.oxidation_state(), None);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(matches!(
            "Fe2".parse::<Species>(),
            Err(ModelError::InvalidSpecies(_))
        ));
        assert!(matches!(
            "fe2+".parse::<Species>(),
            Err(ModelError::InvalidSpecies(_))
        ));
        assert!(matches!(
            "Qq3+".parse::<Species>(),
            Err(ModelError::UnknownElement(_))
        ));
    }

    #[test]
    fn display_uses_conventional_notation() {
        for text in ["Fe2+", "O2-", "Li+", "Cl-", "Fe2.5+", "Na", "Mn0+"] {
            let species: Species = text.parse().unwrap();
            assert_eq!(species.to_string(), text);
        }
    }

    #[test]
    fn sort_cmp_orders_by_electronegativity_then_oxidation_state() {
        let li: Species = "Li+".parse().unwrap();
        let o: Species = "O2-".parse().unwrap();
        let fe2: Species = "Fe2+".parse().unwrap();
        let fe3: Species = "Fe3+".parse().unwrap();
        assert_eq!(li.sort_cmp(&o), Ordering::Less);
        assert_eq!(fe2.sort_cmp(&fe3), Ordering::Less);
        assert_eq!(fe3.sort_cmp(&fe3), Ordering::Equal);
    }

    #[test]
    fn with_oxidation_state_decorates_bare_species() {
        let na: Species = "Na".parse().unwrap();
        assert_eq!(na.with_oxidation_state(1.0).to_string(), "Na+");
    }
}
