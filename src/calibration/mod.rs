/*!
Calibration by a genetic algorithm.

A population of genomes, each a full set of model parameters, is evolved over
a fixed number of generations. In every generation,

 1. every genome without a fitness is evaluated by running a model with its
    parameters, in parallel on a pool of workers,
 2. the best genomes are selected as parents,
 3. parents are paired up cyclically and recombined by single-point
    crossover, or copied unchanged,
 4. some offspring mutate in one gene, and
 5. the offspring, together with the best few parents, form the next
    generation.

The state of the calibration, including the random number generator, is
checkpointed regularly so that an interrupted calibration can be resumed.
*/
use crate::error::{invalid, Error, Result};
use crate::input::Scenario;
use crate::observation::ObservationSettings;
use crate::SettlementModel;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

mod gene;
pub use gene::{Gene, GeneKind, Genome, GenomeLayout, DEMOGRAPHIC_GENES};

/// Fitness of a run that could not be completed. All real scores lie in
/// `[0, 1]`.
pub const WORST_FITNESS: f64 = -1.;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Genomes per generation.
    pub n_pop: usize,
    /// Parents selected per generation.
    pub n_select: usize,
    /// Parents carried over unchanged.
    pub n_elit: usize,
    pub p_cross: f64,
    pub p_mut: f64,
    /// Number of generations.
    pub max_it: usize,
    pub checkpoint_every: usize,
    /// Wall-clock budget of a single model run, in seconds.
    pub time_budget: u64,
    pub workers: usize,
    pub seed: u64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        CalibrationSettings {
            n_pop: 100,
            n_select: 40,
            n_elit: 5,
            p_cross: 0.8,
            p_mut: 0.2,
            max_it: 101,
            checkpoint_every: 10,
            time_budget: 600,
            workers: 10,
            seed: 0,
        }
    }
}

impl CalibrationSettings {
    pub fn validate(&self) -> Result<()> {
        if self.n_select < 2 {
            return invalid("n_select", "crossover needs at least two parents");
        }
        if self.n_select > self.n_pop {
            return invalid(
                "n_select",
                format!("cannot select {} of {} genomes", self.n_select, self.n_pop),
            );
        }
        if self.n_elit > self.n_select {
            return invalid("n_elit", "elites must be among the selected parents");
        }
        if self.n_elit >= self.n_pop {
            return invalid("n_elit", "no room left for offspring");
        }
        for (name, p) in [("p_cross", self.p_cross), ("p_mut", self.p_mut)] {
            if !(0.0..=1.0).contains(&p) {
                return invalid(name, format!("{} is not a probability", p));
            }
        }
        if self.workers == 0 {
            return invalid("workers", "at least one worker is needed");
        }
        Ok(())
    }
}

/// Assigns a fitness to a genome. Evaluations run concurrently, and must not
/// depend on each other.
pub trait Evaluator: Sync {
    fn evaluate(&self, genome: &Genome) -> f64;
}

impl<F> Evaluator for F
where
    F: Fn(&Genome) -> f64 + Sync,
{
    fn evaluate(&self, genome: &Genome) -> f64 {
        self(genome)
    }
}

/// Evaluates a genome by running the scenario with the genome's parameters
/// to its end date and scoring it against the dated sites.
pub struct SimulationEvaluator {
    pub scenario: Scenario,
    pub layout: GenomeLayout,
    pub time_budget: Duration,
}

impl SimulationEvaluator {
    pub fn new(scenario: Scenario, time_budget: Duration) -> Self {
        SimulationEvaluator {
            layout: GenomeLayout::for_scenario(&scenario),
            scenario,
            time_budget,
        }
    }

    pub fn run(&self, genome: &Genome) -> Result<f64> {
        let scenario = self.layout.apply(genome, &self.scenario)?;
        let mut model = SettlementModel::new(&scenario)?;
        model.run(
            scenario.end_date,
            Some(self.time_budget),
            &ObservationSettings::default(),
        )?;
        Ok(model.eval())
    }
}

impl Evaluator for SimulationEvaluator {
    fn evaluate(&self, genome: &Genome) -> f64 {
        match self.run(genome) {
            Ok(fitness) => fitness,
            Err(Error::EvaluationTimeout { elapsed }) => {
                warn!(genome = %genome, ?elapsed, "evaluation timed out");
                WORST_FITNESS
            }
            Err(e) => {
                warn!(genome = %genome, "evaluation failed: {}", e);
                WORST_FITNESS
            }
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Calibrator {
    pub settings: CalibrationSettings,
    pub population: Vec<Genome>,
    /// Number of completed generations.
    pub generation: usize,
    rng: ChaCha12Rng,
}

impl Calibrator {
    pub fn new(settings: CalibrationSettings, layout: &GenomeLayout) -> Result<Calibrator> {
        settings.validate()?;
        let mut rng = ChaCha12Rng::seed_from_u64(settings.seed);
        let population = (0..settings.n_pop).map(|_| layout.random(&mut rng)).collect();
        Ok(Calibrator {
            settings,
            population,
            generation: 0,
            rng,
        })
    }

    /// Evaluate every genome that has no fitness yet.
    pub fn evaluate<E: Evaluator>(&mut self, evaluator: &E) {
        self.population
            .par_iter_mut()
            .filter(|g| g.fitness.is_none())
            .for_each(|g| g.fitness = Some(evaluator.evaluate(g)));
    }

    /// The `n_select` fittest genomes, best first. Ties keep population
    /// order.
    pub fn select(&self) -> Vec<Genome> {
        let mut ranked = self.population.clone();
        ranked.sort_by(|a, b| b.rank().total_cmp(&a.rank()));
        ranked.truncate(self.settings.n_select);
        ranked
    }

    /// Pair parents cyclically until there are `count` offspring.
    pub fn crossover(&mut self, parents: &[Genome], count: usize) -> Vec<Genome> {
        let mut offspring = Vec::with_capacity(count + 1);
        let (mut i, mut j) = (0, 1 % parents.len().max(1));
        while offspring.len() < count && !parents.is_empty() {
            let (a, b) = (&parents[i], &parents[j]);
            if a.genes.len() > 1 && self.rng.gen_bool(self.settings.p_cross) {
                let point = self.rng.gen_range(1..a.genes.len());
                let (c, d) = a.crossover(b, point);
                offspring.push(c);
                offspring.push(d);
            } else {
                offspring.push(a.clone());
                offspring.push(b.clone());
            }
            i = (i + 1) % parents.len();
            j = (j + 1) % parents.len();
        }
        offspring.truncate(count);
        offspring
    }

    pub fn mutate(&mut self, offspring: &mut [Genome]) {
        for genome in offspring.iter_mut() {
            genome.mutate(self.settings.p_mut, &mut self.rng);
        }
    }

    /// One generation: evaluate, select, recombine, mutate, replace. Returns
    /// the parents, best first.
    pub fn next_generation<E: Evaluator>(&mut self, evaluator: &E) -> Vec<Genome> {
        self.evaluate(evaluator);
        let parents = self.select();
        log_generation(self.generation, &self.population, &parents);
        let mut offspring = self.crossover(&parents, self.settings.n_pop - self.settings.n_elit);
        self.mutate(&mut offspring);
        offspring.extend(parents.iter().take(self.settings.n_elit).cloned());
        self.population = offspring;
        self.generation += 1;
        parents
    }

    /// Run the remaining generations on a pool of `workers` threads,
    /// checkpointing to `checkpoint` if given. The final population is
    /// evaluated before returning.
    pub fn evolve<E: Evaluator>(&mut self, evaluator: &E, checkpoint: Option<&Path>) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.workers)
            .build()?;
        pool.install(|| -> Result<()> {
            while self.generation < self.settings.max_it {
                let it = self.generation;
                self.next_generation(evaluator);

                if let Some(path) = checkpoint {
                    if self.settings.checkpoint_every > 0 && it % self.settings.checkpoint_every == 0 {
                        info!(generation = it, path = %path.display(), "checkpoint");
                        self.save(path)?;
                    }
                }
            }
            self.evaluate(evaluator);
            Ok(())
        })?;
        if let Some(best) = self.best() {
            info!(fitness = ?best.fitness, genome = %best, "best genome");
        }
        Ok(())
    }

    pub fn best(&self) -> Option<&Genome> {
        self.population
            .iter()
            .filter(|g| g.fitness.is_some())
            .max_by(|a, b| a.rank().total_cmp(&b.rank()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        bincode::serialize_into(file, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Calibrator> {
        let file = BufReader::new(File::open(path)?);
        let calibrator: Calibrator = bincode::deserialize_from(file)?;
        calibrator.settings.validate()?;
        Ok(calibrator)
    }
}

fn log_generation(it: usize, population: &[Genome], parents: &[Genome]) {
    let finite: Vec<f64> = population
        .iter()
        .filter_map(|g| g.fitness)
        .filter(|f| f.is_finite())
        .collect();
    let mean = finite.iter().sum::<f64>() / finite.len().max(1) as f64;
    let min = finite.iter().cloned().fold(f64::INFINITY, f64::min);
    info!(generation = it + 1, mean, min, "generation");
    for g in parents.iter().take(5) {
        debug!(fitness = ?g.fitness, genome = %g, "parent");
    }
}
