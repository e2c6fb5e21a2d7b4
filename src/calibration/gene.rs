/*!
Genes and genomes. A genome is a plain vector of genes, copied by value;
every gene knows how to draw its initial value and how to mutate.
*/
use crate::error::{invalid, Result};
use crate::input::Scenario;
use itertools::Itertools;
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// Genes per breed before the niche weights start.
pub const DEMOGRAPHIC_GENES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneKind {
    CarryingCapacity,
    FissionThreshold,
    Catchment,
    LeapDistance,
    Permanence,
    NicheWeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gene {
    CarryingCapacity(u32),
    FissionThreshold(u32),
    Catchment(u32),
    LeapDistance(u32),
    Permanence(u32),
    NicheWeight(f64),
}

/**
A random walk on the closed interval `[lo, hi]`, in steps shorter than
`max_step`. From the interior any step but zero is possible; at an edge the
walk can only go inward. The result is clamped to the interval.
*/
fn walk<R: Rng + ?Sized>(value: u32, lo: u32, hi: u32, max_step: i64, rng: &mut R) -> u32 {
    let step = if value <= lo {
        rng.gen_range(1..max_step)
    } else if value >= hi {
        -rng.gen_range(1..max_step)
    } else {
        match rng.gen_range(1 - max_step..max_step) {
            0 => *[-1, 1].choose(rng).unwrap_or(&1),
            s => s,
        }
    };
    (i64::from(value) + step).clamp(i64::from(lo), i64::from(hi)) as u32
}

impl GeneKind {
    /// Draw a value from the prior of this gene.
    pub fn initialize<R: Rng + ?Sized>(self, rng: &mut R) -> Gene {
        match self {
            GeneKind::CarryingCapacity => Gene::CarryingCapacity(rng.gen_range(20..100)),
            GeneKind::FissionThreshold => Gene::FissionThreshold(rng.gen_range(50..250)),
            GeneKind::Catchment => Gene::Catchment(*[1, 2, 3].choose(rng).unwrap_or(&2)),
            GeneKind::LeapDistance => Gene::LeapDistance(if rng.gen_bool(0.5) {
                0
            } else {
                rng.gen_range(15..25)
            }),
            GeneKind::Permanence => Gene::Permanence(rng.gen_range(10..30)),
            GeneKind::NicheWeight => Gene::NicheWeight(rng.gen_range(-5.0..5.0)),
        }
    }
}

impl Gene {
    pub fn kind(&self) -> GeneKind {
        match self {
            Gene::CarryingCapacity(_) => GeneKind::CarryingCapacity,
            Gene::FissionThreshold(_) => GeneKind::FissionThreshold,
            Gene::Catchment(_) => GeneKind::Catchment,
            Gene::LeapDistance(_) => GeneKind::LeapDistance,
            Gene::Permanence(_) => GeneKind::Permanence,
            Gene::NicheWeight(_) => GeneKind::NicheWeight,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            Gene::CarryingCapacity(v)
            | Gene::FissionThreshold(v)
            | Gene::Catchment(v)
            | Gene::LeapDistance(v)
            | Gene::Permanence(v) => f64::from(v),
            Gene::NicheWeight(w) => w,
        }
    }

    pub fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        *self = match *self {
            Gene::CarryingCapacity(v) => Gene::CarryingCapacity(walk(v, 20, 100, 40, rng)),
            Gene::FissionThreshold(v) => Gene::FissionThreshold(walk(v, 50, 250, 100, rng)),
            Gene::Catchment(2) => Gene::Catchment(*[1, 3].choose(rng).unwrap_or(&1)),
            Gene::Catchment(_) => Gene::Catchment(2),
            Gene::LeapDistance(v) => Gene::LeapDistance(if rng.gen_bool(0.25) {
                0
            } else if v == 0 {
                15
            } else {
                walk(v, 15, 25, 10, rng)
            }),
            Gene::Permanence(v) => Gene::Permanence(walk(v, 10, 30, 10, rng)),
            Gene::NicheWeight(w) => {
                let proposal = w + 2. * rng.sample::<f64, _>(StandardNormal);
                Gene::NicheWeight(if (-20.0..=20.0).contains(&proposal) {
                    proposal
                } else {
                    w
                })
            }
        };
    }
}

impl fmt::Display for Gene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gene::NicheWeight(w) => write!(f, "{:.3}", w),
            _ => write!(f, "{}", self.value()),
        }
    }
}

/// A candidate parameter vector. The fitness is `None` until evaluated, and
/// is reset whenever the genes change.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub genes: Vec<Gene>,
    pub fitness: Option<f64>,
}

impl Genome {
    pub fn new(genes: Vec<Gene>) -> Genome {
        Genome {
            genes,
            fitness: None,
        }
    }

    /// Fitness for ranking: unevaluated and non-finite genomes rank last.
    pub fn rank(&self) -> f64 {
        match self.fitness {
            Some(f) if f.is_finite() => f,
            _ => f64::NEG_INFINITY,
        }
    }

    /// With probability `p`, mutate one gene chosen uniformly. Returns
    /// whether a mutation happened.
    pub fn mutate<R: Rng + ?Sized>(&mut self, p: f64, rng: &mut R) -> bool {
        if self.genes.is_empty() || !rng.gen_bool(p) {
            return false;
        }
        let point = rng.gen_range(0..self.genes.len());
        self.genes[point].mutate(rng);
        self.fitness = None;
        true
    }

    /**
    Single-point crossover: both children take the genes before `point` from
    one parent and the rest from the other.

    ```rust
    # use model::calibration::{Gene, Genome};
    let a = Genome::new(vec![Gene::Catchment(1), Gene::Permanence(10), Gene::LeapDistance(0)]);
    let b = Genome::new(vec![Gene::Catchment(3), Gene::Permanence(30), Gene::LeapDistance(20)]);
    let (c, d) = a.crossover(&b, 1);
    assert_eq!(c.genes, vec![Gene::Catchment(1), Gene::Permanence(30), Gene::LeapDistance(20)]);
    assert_eq!(d.genes, vec![Gene::Catchment(3), Gene::Permanence(10), Gene::LeapDistance(0)]);
    assert_eq!(c.fitness, None);
    ```
    */
    pub fn crossover(&self, other: &Genome, point: usize) -> (Genome, Genome) {
        let mut first = self.genes[..point].to_vec();
        first.extend_from_slice(&other.genes[point..]);
        let mut second = other.genes[..point].to_vec();
        second.extend_from_slice(&self.genes[point..]);
        (Genome::new(first), Genome::new(second))
    }

    pub fn values(&self) -> Vec<f64> {
        self.genes.iter().map(Gene::value).collect()
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.genes.iter().join(", "))
    }
}

/// The sequence of gene kinds a scenario is calibrated with: the five
/// demographic genes of every breed, then the niche weights of every breed
/// whose suitability comes from a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeLayout {
    pub kinds: Vec<GeneKind>,
}

impl GenomeLayout {
    pub fn for_scenario(scenario: &Scenario) -> GenomeLayout {
        let demographic = [
            GeneKind::CarryingCapacity,
            GeneKind::FissionThreshold,
            GeneKind::Catchment,
            GeneKind::LeapDistance,
            GeneKind::Permanence,
        ];
        let mut kinds = vec![];
        for _ in &scenario.breeds {
            kinds.extend_from_slice(&demographic);
        }
        for b in &scenario.breeds {
            kinds.extend(std::iter::repeat(GeneKind::NicheWeight).take(b.suitability.weight_count()));
        }
        GenomeLayout { kinds }
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Genome {
        Genome::new(self.kinds.iter().map(|k| k.initialize(rng)).collect())
    }

    /// Whether the genome has exactly this layout's gene kinds, in order.
    pub fn fits(&self, genome: &Genome) -> bool {
        genome.genes.iter().map(Gene::kind).eq(self.kinds.iter().copied())
    }

    /// The scenario with the genome's values filled in.
    pub fn apply(&self, genome: &Genome, base: &Scenario) -> Result<Scenario> {
        if !self.fits(genome) {
            return invalid("genome", "genes do not match the scenario's layout");
        }
        let mut scenario = base.clone();
        let mut genes = genome.genes.iter();
        for b in scenario.breeds.iter_mut() {
            for gene in genes.by_ref().take(DEMOGRAPHIC_GENES) {
                match *gene {
                    Gene::CarryingCapacity(v) => b.founder.k = v,
                    Gene::FissionThreshold(v) => b.founder.fission_threshold = v,
                    Gene::Catchment(v) => b.founder.catchment = v,
                    Gene::LeapDistance(v) => b.founder.leap_distance = v,
                    Gene::Permanence(v) => b.founder.permanence = v,
                    Gene::NicheWeight(_) => {}
                }
            }
        }
        for b in scenario.breeds.iter_mut() {
            let n = b.suitability.weight_count();
            if n > 0 {
                let weights: Vec<f64> = genes.by_ref().take(n).map(Gene::value).collect();
                b.suitability = b.suitability.with_weights(&weights);
            }
        }
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn walks_stay_in_bounds() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let mut v = 20;
        for _ in 0..1000 {
            v = walk(v, 20, 100, 40, &mut rng);
            assert!((20..=100).contains(&v));
        }
    }

    #[test]
    fn walks_leave_the_edges_inward() {
        let mut rng = ChaCha12Rng::seed_from_u64(8);
        for _ in 0..100 {
            assert!(walk(10, 10, 30, 10, &mut rng) > 10);
            assert!(walk(30, 10, 30, 10, &mut rng) < 30);
        }
    }

    #[test]
    fn interior_walks_always_move() {
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        for _ in 0..1000 {
            assert_ne!(walk(20, 15, 25, 10, &mut rng), 20);
        }
    }

    #[test]
    fn priors_respect_their_bounds() {
        let mut rng = ChaCha12Rng::seed_from_u64(10);
        for _ in 0..500 {
            match GeneKind::LeapDistance.initialize(&mut rng) {
                Gene::LeapDistance(v) => assert!(v == 0 || (15..25).contains(&v)),
                g => panic!("wrong gene {:?}", g),
            }
            let w = GeneKind::NicheWeight.initialize(&mut rng).value();
            assert!((-5.0..5.0).contains(&w));
            let c = GeneKind::Catchment.initialize(&mut rng).value();
            assert!([1., 2., 3.].contains(&c));
        }
    }

    #[test]
    fn catchment_mutates_through_two() {
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let mut g = Gene::Catchment(3);
        g.mutate(&mut rng);
        assert_eq!(g, Gene::Catchment(2));
        g.mutate(&mut rng);
        assert!(g == Gene::Catchment(1) || g == Gene::Catchment(3));
    }

    #[test]
    fn niche_weights_never_leave_their_range() {
        let mut rng = ChaCha12Rng::seed_from_u64(12);
        let mut g = Gene::NicheWeight(19.5);
        for _ in 0..1000 {
            g.mutate(&mut rng);
            assert!((-20.0..=20.0).contains(&g.value()));
        }
    }

    #[test]
    fn mutation_resets_fitness() {
        let mut rng = ChaCha12Rng::seed_from_u64(13);
        let mut genome = Genome::new(vec![Gene::Permanence(20); 3]);
        genome.fitness = Some(0.5);
        assert!(!genome.mutate(0., &mut rng));
        assert_eq!(genome.fitness, Some(0.5));
        assert!(genome.mutate(1., &mut rng));
        assert_eq!(genome.fitness, None);
    }

    #[test]
    fn layouts_check_gene_order_not_just_length() {
        let layout = GenomeLayout {
            kinds: vec![GeneKind::Catchment, GeneKind::Permanence],
        };
        assert!(layout.fits(&Genome::new(vec![Gene::Catchment(2), Gene::Permanence(12)])));
        assert!(!layout.fits(&Genome::new(vec![Gene::Permanence(12), Gene::Catchment(2)])));
        assert!(!layout.fits(&Genome::new(vec![Gene::Catchment(2)])));
    }

    #[test]
    fn unevaluated_genomes_rank_last() {
        let mut g = Genome::new(vec![]);
        assert_eq!(g.rank(), f64::NEG_INFINITY);
        g.fitness = Some(f64::NAN);
        assert_eq!(g.rank(), f64::NEG_INFINITY);
        g.fitness = Some(-1.);
        assert_eq!(g.rank(), -1.);
    }
}
