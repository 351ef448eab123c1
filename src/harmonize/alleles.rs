use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base {
    A,
    C,
    G,
    T,
}

impl Base {
    /// Parse a single-base allele, ignoring case. Anything else is treated
    /// as a missing allele.
    pub fn parse(allele: &str) -> Option<Base> {
        match allele.trim() {
            "A" | "a" => Some(Base::A),
            "C" | "c" => Some(Base::C),
            "G" | "g" => Some(Base::G),
            "T" | "t" => Some(Base::T),
            _ => None,
        }
    }

    pub fn complement(self) -> Base {
        match self {
            Base::A => Base::T,
            Base::T => Base::A,
            Base::G => Base::C,
            Base::C => Base::G,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllelePair {
    pub effect: Option<Base>,
    pub non_effect: Option<Base>,
}

impl AllelePair {
    pub fn new(effect: Option<Base>, non_effect: Option<Base>) -> Self {
        AllelePair { effect, non_effect }
    }

    pub fn parse(effect: Option<&str>, non_effect: Option<&str>) -> Self {
        AllelePair {
            effect: effect.and_then(Base::parse),
            non_effect: non_effect.and_then(Base::parse),
        }
    }

    pub fn swapped(self) -> Self {
        AllelePair {
            effect: self.non_effect,
            non_effect: self.effect,
        }
    }

    pub fn complemented(self) -> Self {
        AllelePair {
            effect: self.effect.map(Base::complement),
            non_effect: self.non_effect.map(Base::complement),
        }
    }
}

/// Orientation of a query allele pair relative to a reference pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flip {
    Same,
    Flipped,
    /// Missing, palindromic or incompatible alleles.
    Undetermined,
}

impl Flip {
    pub fn sign(self) -> Option<f64> {
        match self {
            Flip::Same => Some(1.0),
            Flip::Flipped => Some(-1.0),
            Flip::Undetermined => None,
        }
    }

    /// Re-express a signed value in the reference orientation. An
    /// undetermined orientation always yields a missing value.
    pub fn orient(self, value: f64) -> Option<f64> {
        self.sign().map(|s| s * value)
    }

    pub fn negate(self) -> Flip {
        match self {
            Flip::Same => Flip::Flipped,
            Flip::Flipped => Flip::Same,
            Flip::Undetermined => Flip::Undetermined,
        }
    }
}

/// Decide whether `(a0, a1)` and `(b0, b1)` describe the same SNP in the
/// same direction. Checks run in a fixed order: missing, palindromic,
/// exact, swapped, complement, complement swapped.
pub fn check_flip(a0: Option<Base>, a1: Option<Base>, b0: Option<Base>, b1: Option<Base>) -> Flip {
    let (Some(a0), Some(a1), Some(b0), Some(b1)) = (a0, a1, b0, b1) else {
        return Flip::Undetermined;
    };

    // Palindromic pairs cannot be oriented; identical pairs are not SNPs.
    if a0 == a1.complement() || b0 == b1.complement() || a0 == a1 || b0 == b1 {
        return Flip::Undetermined;
    }

    if a0 == b0 && a1 == b1 {
        Flip::Same
    } else if a0 == b1 && a1 == b0 {
        Flip::Flipped
    } else if a0 == b0.complement() && a1 == b1.complement() {
        Flip::Same
    } else if a0 == b1.complement() && a1 == b0.complement() {
        Flip::Flipped
    } else {
        Flip::Undetermined
    }
}

pub fn check_pair(query: AllelePair, reference: AllelePair) -> Flip {
    check_flip(
        query.effect,
        query.non_effect,
        reference.effect,
        reference.non_effect,
    )
}

/// Elementwise `check_pair` over aligned slices.
pub fn check_flips(query: &[AllelePair], reference: &[AllelePair]) -> Vec<Flip> {
    assert_eq!(
        query.len(),
        reference.len(),
        "Allele slices must be aligned"
    );
    query
        .par_iter()
        .zip(reference.par_iter())
        .map(|(q, r)| check_pair(*q, *r))
        .collect()
}
