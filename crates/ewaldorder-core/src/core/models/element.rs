use phf::{Map, phf_map};

/// Immutable per-element reference data.
///
/// Only the properties the ordering engine consumes are carried: the atomic
/// number (used as a stable secondary sort key) and the Pauling
/// electronegativity (used to order sites in output structures).
#[derive(Debug, PartialEq)]
pub struct Element {
    /// Chemical symbol, e.g. `"Fe"`.
    pub symbol: &'static str,
    /// Atomic number.
    pub z: u8,
    /// Pauling electronegativity, absent for elements without a tabulated value.
    pub electronegativity: Option<f64>,
}

macro_rules! element {
    ($sym:literal, $z:literal, None) => {
        Element {
            symbol: $sym,
            z: $z,
            electronegativity: None,
        }
    };
    ($sym:literal, $z:literal, $x:literal) => {
        Element {
            symbol: $sym,
            z: $z,
            electronegativity: Some($x),
        }
    };
}

static ELEMENTS: Map<&'static str, Element> = phf_map! {
    "H" => element!("H", 1, 2.20),
    "He" => element!("He", 2, None),
    "Li" => element!("Li", 3, 0.98),
    "Be" => element!("Be", 4, 1.57),
    "B" => element!("B", 5, 2.04),
    "C" => element!("C", 6, 2.55),
    "N" => element!("N", 7, 3.04),
    "O" => element!("O", 8, 3.44),
    "F" => element!("F", 9, 3.98),
    "Ne" => element!("Ne", 10, None),
    "Na" => element!("Na", 11, 0.93),
    "Mg" => element!("Mg", 12, 1.31),
    "Al" => element!("Al", 13, 1.61),
    "Si" => element!("Si", 14, 1.90),
    "P" => element!("P", 15, 2.19),
    "S" => element!("S", 16, 2.58),
    "Cl" => element!("Cl", 17, 3.16),
    "Ar" => element!("Ar", 18, None),
    "K" => element!("K", 19, 0.82),
    "Ca" => element!("Ca", 20, 1.00),
    "Sc" => element!("Sc", 21, 1.36),
    "Ti" => element!("Ti", 22, 1.54),
    "V" => element!("V", 23, 1.63),
    "Cr" => element!("Cr", 24, 1.66),
    "Mn" => element!("Mn", 25, 1.55),
    "Fe" => element!("Fe", 26, 1.83),
    "Co" => element!("Co", 27, 1.88),
    "Ni" => element!("Ni", 28, 1.91),
    "Cu" => element!("Cu", 29, 1.90),
    "Zn" => element!("Zn", 30, 1.65),
    "Ga" => element!("Ga", 31, 1.81),
    "Ge" => element!("Ge", 32, 2.01),
    "As" => element!("As", 33, 2.18),
    "Se" => element!("Se", 34, 2.55),
    "Br" => element!("Br", 35, 2.96),
    "Kr" => element!("Kr", 36, 3.00),
    "Rb" => element!("Rb", 37, 0.82),
    "Sr" => element!("Sr", 38, 0.95),
    "Y" => element!("Y", 39, 1.22),
    "Zr" => element!("Zr", 40, 1.33),
    "Nb" => element!("Nb", 41, 1.60),
    "Mo" => element!("Mo", 42, 2.16),
    "Tc" => element!("Tc", 43, 1.90),
    "Ru" => element!("Ru", 44, 2.20),
    "Rh" => element!("Rh", 45, 2.28),
    "Pd" => element!("Pd", 46, 2.20),
    "Ag" => element!("Ag", 47, 1.93),
    "Cd" => element!("Cd", 48, 1.69),
    "In" => element!("In", 49, 1.78),
    "Sn" => element!("Sn", 50, 1.96),
    "Sb" => element!("Sb", 51, 2.05),
    "Te" => element!("Te", 52, 2.10),
    "I" => element!("I", 53, 2.66),
    "Xe" => element!("Xe", 54, 2.60),
    "Cs" => element!("Cs", 55, 0.79),
    "Ba" => element!("Ba", 56, 0.89),
    "La" => element!("La", 57, 1.10),
    "Ce" => element!("Ce", 58, 1.12),
    "Pr" => element!("Pr", 59, 1.13),
    "Nd" => element!("Nd", 60, 1.14),
    "Pm" => element!("Pm", 61, 1.13),
    "Sm" => element!("Sm", 62, 1.17),
    "Eu" => element!("Eu", 63, 1.20),
    "Gd" => element!("Gd", 64, 1.20),
    "Tb" => element!("Tb", 65, 1.10),
    "Dy" => element!("Dy", 66, 1.22),
    "Ho" => element!("Ho", 67, 1.23),
    "Er" => element!("Er", 68, 1.24),
    "Tm" => element!("Tm", 69, 1.25),
    "Yb" => element!("Yb", 70, 1.10),
    "Lu" => element!("Lu", 71, 1.27),
    "Hf" => element!("Hf", 72, 1.30),
    "Ta" => element!("Ta", 73, 1.50),
    "W" => element!("W", 74, 2.36),
    "Re" => element!("Re", 75, 1.90),
    "Os" => element!("Os", 76, 2.20),
    "Ir" => element!("Ir", 77, 2.20),
    "Pt" => element!("Pt", 78, 2.28),
    "Au" => element!("Au", 79, 2.54),
    "Hg" => element!("Hg", 80, 2.00),
    "Tl" => element!("Tl", 81, 1.62),
    "Pb" => element!("Pb", 82, 2.33),
    "Bi" => element!("Bi", 83, 2.02),
    "Po" => element!("Po", 84, 2.00),
    "At" => element!("At", 85, 2.20),
    "Rn" => element!("Rn", 86, None),
    "Fr" => element!("Fr", 87, 0.70),
    "Ra" => element!("Ra", 88, 0.90),
    "Ac" => element!("Ac", 89, 1.10),
    "Th" => element!("Th", 90, 1.30),
    "Pa" => element!("Pa", 91, 1.50),
    "U" => element!("U", 92, 1.38),
    "Np" => element!("Np", 93, 1.36),
    "Pu" => element!("Pu", 94, 1.28),
};

impl Element {
    /// Looks up an element by its chemical symbol (case-sensitive).
    pub fn from_symbol(symbol: &str) -> Option<&'static Element> {
        ELEMENTS.get(symbol)
    }

    pub fn is_valid_symbol(symbol: &str) -> bool {
        ELEMENTS.contains_key(symbol)
    }

    /// Electronegativity used for ordering; elements without a value sort last.
    pub fn sort_electronegativity(&self) -> f64 {
        self.electronegativity.unwrap_or(f64::INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_symbol_returns_known_elements() {
        let fe = Element::from_symbol("Fe").unwrap();
        assert_eq!(fe.z, 26);
        assert_eq!(fe.symbol, "Fe");
        assert_eq!(fe.electronegativity, Some(1.83));
    }

    #[test]
    fn from_symbol_is_case_sensitive() {
        assert!(Element::from_symbol("fe").is_none());
        assert!(Element::from_symbol("FE").is_none());
    }

    #[test]
    fn unknown_symbols_are_rejected() {
        assert!(!Element::is_valid_symbol("Xx"));
        assert!(!Element::is_valid_symbol(""));
        assert!(Element::is_valid_symbol("O"));
    }

    #[test]
    fn noble_gases_without_electronegativity_sort_last() {
        let he = Element::from_symbol("He").unwrap();
        let f = Element::from_symbol("F").unwrap();
        assert!(he.electronegativity.is_none());
        assert!(he.sort_electronegativity() > f.sort_electronegativity());
    }

    #[test]
    fn atomic_numbers_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (_, element) in ELEMENTS.entries() {
            assert!(seen.insert(element.z), "duplicate Z for {}", element.symbol);
        }
        assert_eq!(seen.len(), 94);
    }
}
