/*!
Model Description
=================

This model description follows the ODD (Overview, Design concept, Details)
protocol (Grimm et al., 2006; Grimm et al., 2010). As far as it is useful in
Rust source code, the description follows the idea of literate programming
(Knuth 1992): the model is compiled from this file that documents it, but the
source is commented in natural language rather than generated from it.

# 1. Purpose

The settlement model simulates the demic dispersal of farming villages over a
landscape, with the aim of reconstructing where and when the speakers of a
language family arrived. Villages grow, split, and move according to a small
number of demographic parameters and the ecological suitability of the land.
The simulated arrival dates are compared to radiocarbon-dated archaeological
sites, and a genetic algorithm searches the parameter space for the settings
that reproduce the archaeological record best.

 */

// Load useful modules

use serde_derive::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

pub mod argparse;
pub mod error;
mod debug;

pub use error::{Error, Result};

/**

# 2. Entities, state variables, and scales

The model consists of villages living on a square grid in discrete time. One
time step is one year. Time is measured as a calendar date in years before
present (BP), so the clock runs backwards: every step decreases it by one.

 */
pub type YearsBP = i32;

/**
Each village has a unique numeric identifier, handed out by its model. Ids
are never reused within one model run.
 */
pub type VillageId = u64;

/**
## 2.1 Grid and Cells

The geography is a raster of square cells, 10 km on each side in the
reference landscape, addressed by column `x` (growing east) and row `y`
(growing south). Coordinates are signed, so that neighborhoods reaching over
the edge of the landscape can be expressed and then clipped.

```rust
# use model::Coords;
let c = Coords::from_index(3, 4);
assert_eq!(c, Coords::new(3, 4));
assert!(Coords::new(0, 5) < Coords::new(1, 0));
```

 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coords {
    pub x: i32,
    pub y: i32,
}

impl Coords {
    pub fn new(x: i32, y: i32) -> Self {
        Coords { x, y }
    }

    /// From column and row of a raster.
    pub fn from_index(x: usize, y: usize) -> Self {
        Coords {
            x: x as i32,
            y: y as i32,
        }
    }
}

/**
Every cell has an owner (free, a village, or permanently unsettleable because
it is water or lacks data), possibly the settlement of a village, and for
every breed a niche suitability between 0 and 1 and the date at which that
breed first reached the cell. The grid answers neighborhood queries within a
radius and on rings at a given distance, with distances measured as rounded
euclidean distances.

 */
pub mod grid;

/**
## 2.2 Villages

The agents of the simulation are villages. A village has a population, a
location, and a territory of claimed cells around it whose carrying capacity
bounds the population. Each village carries a copy of the demographic
parameters of its breed (2.3).

 */
pub mod village;

/**
## 2.3 Breeds

A breed is a culture with its own founding village, its own ecological niche
and its own archaeological record. All breeds compete for the same land: a
cell owned by a village of one breed is not available to another.

 */
pub mod parameters;

/**
## 2.4 State

The model state consists of the grid, the villages currently alive, the
clock, the breeds, the behavioural policy shared by all villages, and the
allocator of village ids. Villages are kept ordered by id, which fixes the
order in which they act.

 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreedRecord {
    pub name: String,
    pub founder: parameters::Parameters,
    pub sites: dates::DatedSites,
    /// Whether the founder village has been placed yet.
    pub founded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementModel {
    pub grid: grid::SpatialGrid,
    pub villages: BTreeMap<VillageId, village::Village>,
    /// The current date.
    pub bp: YearsBP,
    pub breeds: Vec<BreedRecord>,
    pub policy: parameters::Policy,
    ids: village::VillageIds,
}

/**
# 3. Process overview and scheduling

The model progresses in yearly steps from the founding of the earliest breed
until the end date of the scenario. In each step,

 1. the founder villages of all breeds whose start date is the current date
    are placed (5.),
 2. every village alive at the start of the step acts in turn, in order of
    ascending id, by growing, possibly splitting, and possibly moving (7.1),
    where villages created during the step join afterwards and first act in
    the next step,
 3. villages that have become inactive are removed, and
 4. the clock advances by one year.

Villages act sequentially on the shared grid, so the outcome of a step only
depends on the state at its beginning.

 */
impl SettlementModel {
    pub fn step(&mut self) {
        self.found_due();

        let ids: Vec<VillageId> = self.villages.keys().copied().collect();
        let mut newborn = vec![];
        for id in ids {
            if let Some(village) = self.villages.get_mut(&id) {
                let mut h = village::Habitat::new(
                    &mut self.grid,
                    self.bp,
                    &self.policy,
                    &mut self.ids,
                    &mut newborn,
                );
                village.step(&mut h);
            }
        }
        for v in newborn {
            self.villages.insert(v.id, v);
        }

        self.sweep();
        self.bp -= 1;
    }

    fn sweep(&mut self) {
        let inactive: Vec<VillageId> = self
            .villages
            .values()
            .filter(|v| !v.active)
            .map(|v| v.id)
            .collect();
        if inactive.is_empty() {
            return;
        }
        let mut newborn = vec![];
        let mut h = village::Habitat::new(
            &mut self.grid,
            self.bp,
            &self.policy,
            &mut self.ids,
            &mut newborn,
        );
        for id in inactive {
            if let Some(mut v) = self.villages.remove(&id) {
                v.retire(&mut h);
            }
        }
    }

    /// Step until the clock reaches `end_date`. With a time budget, the run
    /// is aborted as soon as it has taken longer than that.
    pub fn run(
        &mut self,
        end_date: YearsBP,
        budget: Option<Duration>,
        o: &observation::ObservationSettings,
    ) -> Result<()> {
        let started = Instant::now();
        debug!(from = self.bp, to = end_date, "running");
        while self.bp > end_date {
            self.step();

            if let Some(budget) = budget {
                let elapsed = started.elapsed();
                if elapsed >= budget {
                    return Err(Error::EvaluationTimeout { elapsed });
                }
            }
            if o.log_every > 0 && self.bp % o.log_every == 0 {
                observation::log_census(self);
            }
            if o.store_every > 0 && self.bp % o.store_every == 0 {
                if let Err(e) = self.store_state(&o.statefile) {
                    warn!("could not store state: {}", e);
                }
            }
            if self.villages.is_empty() && self.breeds.iter().all(|b| b.founded) {
                debug!(bp = self.bp, "died out");
                break;
            }
        }
        debug!(bp = self.bp, villages = self.villages.len(), "ended");
        Ok(())
    }
}

/**
# 4. Design concepts

## 4.1 Basic principles

Farming villages expand demographically: a growing village needs more land,
and once it is large enough, part of it splits off and founds a new village
nearby. Every so often, villages move on, because soils get exhausted. The
dispersal of a language family is an emergent product of these local
decisions, constrained by the ecology of the landscape.

## 4.2 Emergence

The arrival dates of breeds across the landscape, and thus the speed and
direction of their expansion, emerge from village demography. They are the
observable outcome compared to the archaeological record.

## 4.3 Adaptation

Villages always prefer the most suitable land available. Among equally
suitable cells, they take the first one in a fixed scanning order (west to
east, then north to south, within a mask centered on the village), which
makes every run fully reproducible.

## 4.4 Sensing

Villages see the ownership, settlements, suitability and arrival dates of
all cells within their catchment, within twice their catchment, and on the
ring at their leapfrogging distance.

## 4.5 Interaction

Villages interact only indirectly, through the land they own: a cell owned
by one village is unavailable to all others. A village that wants to split
refrains from settling its daughter nearby when too many other settlements
are close already.

## 4.6 Stochasticity

The simulation itself is deterministic. Randomness only enters through the
calibration (7.2), which draws initial parameters and mutations.

## 4.7 Observation

At the end of a run, the model reports the arrival date of every breed in
every cell and the score of every dated site.

 */
pub mod observation;

/**
# 5. Initialization

The grid is built from the landscape layers: every breed gets its suitability
layer, and cells without data for any breed become unsettleable for all.
The clock starts at the latest start date of all breeds, and the founders
due at that date are placed immediately.

A founder village starts with a population at its fission threshold. It
settles at its origin, dates the arrival of its breed throughout its
catchment, and claims land until its population fits. Villages that
already live within the founder's catchment are evicted.

A founder that cannot be placed, because its origin lies outside the
landscape or on unsettleable land, or because there is no land it tolerates
within its catchment, is a setup error.

 */
impl SettlementModel {
    pub fn new(scenario: &input::Scenario) -> Result<SettlementModel> {
        scenario.landscape.validate()?;
        let bp = scenario.start_date()?;
        let (width, height) = (scenario.landscape.width, scenario.landscape.height);

        let mut grid = grid::SpatialGrid::new(width, height);
        let mut unsettleable = vec![false; width * height];
        for breed in &scenario.breeds {
            breed.founder.validate()?;
            let values = breed.suitability.evaluate(&scenario.landscape)?;
            for (flag, v) in unsettleable.iter_mut().zip(&values) {
                *flag |= v.is_none();
            }
            grid.add_breed(values.into_iter().map(|v| v.unwrap_or(0.)).collect());
        }
        for (i, _) in unsettleable.iter().enumerate().filter(|&(_, &u)| u) {
            grid.set_unsettleable(Coords::from_index(i % width, i / width));
        }

        let mut model = SettlementModel {
            grid,
            villages: BTreeMap::new(),
            bp,
            breeds: scenario
                .breeds
                .iter()
                .map(|b| BreedRecord {
                    name: b.name.clone(),
                    founder: b.founder,
                    sites: b.sites.clone(),
                    founded: false,
                })
                .collect(),
            policy: scenario.policy,
            ids: village::VillageIds::default(),
        };
        for breed in 0..model.breeds.len() {
            model.check_origin(breed)?;
        }
        model.found_due();
        Ok(model)
    }

    fn check_origin(&mut self, breed: grid::Breed) -> Result<()> {
        let p = self.breeds[breed].founder;
        let fail = |reason| Error::FoundingFailed {
            breed: self.breeds[breed].name.clone(),
            coords: p.origin,
            reason,
        };
        match self.grid.owner(p.origin) {
            None => return Err(fail("origin outside the landscape")),
            Some(grid::Owner::Unsettleable) => return Err(fail("origin is unsettleable")),
            Some(_) => {}
        }
        let habitable = self
            .grid
            .neighborhood(p.origin, p.catchment, breed)
            .iter()
            .any(|(_, cell)| cell.owner != grid::Owner::Unsettleable && cell.suitability >= p.tolerance);
        if habitable {
            Ok(())
        } else {
            Err(fail("no tolerable land within the catchment"))
        }
    }

    fn found_due(&mut self) {
        for breed in 0..self.breeds.len() {
            if !self.breeds[breed].founded && self.breeds[breed].founder.start_date == self.bp {
                self.breeds[breed].founded = true;
                self.found(breed);
            }
        }
    }

    fn found(&mut self, breed: grid::Breed) {
        let p = self.breeds[breed].founder;
        let mut newborn = vec![];
        let mut h = village::Habitat::new(
            &mut self.grid,
            self.bp,
            &self.policy,
            &mut self.ids,
            &mut newborn,
        );

        let mut evicted: Vec<(Coords, VillageId)> = h
            .neighborhood(p.origin, p.catchment, breed)
            .iter()
            .filter_map(|&(c, cell)| cell.settlement.map(|id| (c, id)))
            .collect();
        if let Some(grid::Cell {
            owner: grid::Owner::Village(id),
            ..
        }) = h.lookup(p.origin, breed)
        {
            evicted.push((p.origin, id));
        }
        for (c, id) in evicted {
            h.vacate(c, id);
            if let Some(mut v) = self.villages.remove(&id) {
                v.abandon_land(&mut h);
                h.vacate(v.coords, id);
                debug!(village = id, "evicted by a founder");
            }
        }

        let id = h.next_id();
        let mut founder = village::Village::new(id, breed, p.origin, p);
        founder.establish(&mut h);
        debug!(
            breed = %self.breeds[breed].name,
            village = id,
            x = p.origin.x,
            y = p.origin.y,
            bp = self.bp,
            "founded"
        );
        self.villages.insert(id, founder);
    }
}

/**
# 6. Input Data

The landscape layers, the niche of every breed and the dated sites are
prepared outside the model and bundled into a scenario.

 */
pub mod dates;
pub mod input;
pub mod landscape;
pub mod niche;

/**
# 7. Submodels

## 7.1 Village life

Growth, land use, fission, leapfrogging and relocation are described in the
[`village`] module.

## 7.2 Fitness

The fitness of a run is the mean, over all breeds with archaeological
evidence, of the mean score of that breed's dated sites. A site scores the
calibrated probability of the simulated arrival date at its cell, relative
to its most probable date. A site outside the grid, or a cell the breed
never reached, scores zero.

 */
impl SettlementModel {
    pub fn eval(&self) -> f64 {
        let scores: Vec<f64> = self
            .breeds
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.sites.is_empty())
            .map(|(breed, b)| b.sites.mean_score(|c| self.grid.arrival_time(c, breed)))
            .collect();
        if scores.is_empty() {
            0.
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        }
    }
}

/**
## 7.3 Calibration

The parameters of the founders, and the weights of network-driven niches, are
calibrated by a genetic algorithm described in the [`calibration`] module.

 */
pub mod calibration;

pub fn store_state(state: &SettlementModel, statefile: impl AsRef<Path>) -> Result<()> {
    let file = BufWriter::new(File::create(statefile)?);
    serde_json::to_writer_pretty(file, state)?;
    Ok(())
}

impl SettlementModel {
    pub fn store_state(&self, statefile: impl AsRef<Path>) -> Result<()> {
        store_state(self, statefile)
    }

    pub fn load_state(statefile: impl AsRef<Path>) -> Result<SettlementModel> {
        let file = BufReader::new(File::open(statefile)?);
        Ok(serde_json::from_reader(file)?)
    }
}

#[cfg(test)]
mod tests;
