/*!
Villages: the agents of the model.

A village sits in one cell and exploits the land it has claimed within its
catchment. It grows, claims more land while it outgrows its carrying
capacity, splits when it reaches the fission threshold, and packs up and
moves when it has stayed in one place for too long. A village that cannot
find land for its people any more becomes inactive and never acts again.

Villages never touch the grid directly. They act on the world through a
[`Habitat`], which the model hands them for the duration of their step.
*/
use crate::grid::{Breed, Cell, Owner, SpatialGrid};
use crate::parameters::{LandWeighting, Parameters, Policy, SearchShape};
use crate::{Coords, VillageId, YearsBP};
use serde_derive::{Deserialize, Serialize};
use tracing::debug;

/// Intrinsic population growth per time step.
pub const GROWTH_RATE: f64 = 0.025;

/// Hands out village ids. Ids start at 1 and are never reused within a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VillageIds {
    last: VillageId,
}

impl VillageIds {
    pub fn next_id(&mut self) -> VillageId {
        self.last += 1;
        self.last
    }
}

/// The operations a village may perform on the shared world.
pub struct Habitat<'a> {
    grid: &'a mut SpatialGrid,
    bp: YearsBP,
    policy: &'a Policy,
    ids: &'a mut VillageIds,
    newborn: &'a mut Vec<Village>,
}

impl<'a> Habitat<'a> {
    pub(crate) fn new(
        grid: &'a mut SpatialGrid,
        bp: YearsBP,
        policy: &'a Policy,
        ids: &'a mut VillageIds,
        newborn: &'a mut Vec<Village>,
    ) -> Self {
        Habitat {
            grid,
            bp,
            policy,
            ids,
            newborn,
        }
    }

    pub fn clock(&self) -> YearsBP {
        self.bp
    }

    pub fn policy(&self) -> &'a Policy {
        self.policy
    }

    pub fn lookup(&self, c: Coords, breed: Breed) -> Option<Cell> {
        self.grid.get(c, breed)
    }

    pub fn neighborhood(&mut self, center: Coords, radius: u32, breed: Breed) -> Vec<(Coords, Cell)> {
        self.grid.neighborhood(center, radius, breed)
    }

    pub fn ring(&mut self, center: Coords, distance: u32, breed: Breed) -> Vec<(Coords, Cell)> {
        self.grid.ring_at_distance(center, distance, breed)
    }

    /// Take ownership of a cell and date the breed's arrival there, if it
    /// is the first time. Returns the cell's suitability.
    pub fn claim(&mut self, c: Coords, id: VillageId, breed: Breed) -> f64 {
        self.grid.set_owner(c, Owner::Village(id));
        self.grid.record_arrival(c, breed, self.bp);
        self.grid.suitability(c, breed).unwrap_or(0.)
    }

    /// Give up a cell, if it still belongs to the village.
    pub fn release(&mut self, c: Coords, id: VillageId) {
        if self.grid.owner(c) == Some(Owner::Village(id)) {
            self.grid.set_owner(c, Owner::Free);
        }
    }

    pub fn record_arrival(&mut self, c: Coords, breed: Breed) {
        if self.grid.owner(c) != Some(Owner::Unsettleable) {
            self.grid.record_arrival(c, breed, self.bp);
        }
    }

    pub fn settle(&mut self, c: Coords, id: VillageId) {
        self.grid.set_settlement(c, Some(id));
    }

    pub fn vacate(&mut self, c: Coords, id: VillageId) {
        if self.grid.settlement(c) == Some(id) {
            self.grid.set_settlement(c, None);
        }
    }

    pub fn next_id(&mut self) -> VillageId {
        self.ids.next_id()
    }

    /// Hand a new village to the model. It joins the model after the
    /// current village's step and is not stepped before the next tick.
    pub fn spawn(&mut self, village: Village) {
        self.newborn.push(village);
    }
}

/// The most suitable candidate, the first one in mask order on ties.
fn best(candidates: &[(Coords, Cell)]) -> Option<(Coords, f64)> {
    let mut target: Option<(Coords, f64)> = None;
    for &(c, cell) in candidates {
        match target {
            Some((_, s)) if cell.suitability <= s => {}
            _ => target = Some((c, cell.suitability)),
        }
    }
    target
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Village {
    pub id: VillageId,
    pub breed: Breed,
    pub coords: Coords,
    pub population: u64,
    /// Carrying capacity of the current territory.
    pub total_k: f64,
    /// Claimed cells, in order of claiming.
    pub land: Vec<Coords>,
    /// Steps since the last move.
    pub time_here: u32,
    pub active: bool,
    pub p: Parameters,
}

impl Village {
    /// A village starts out at its fission threshold, without land.
    pub fn new(id: VillageId, breed: Breed, coords: Coords, p: Parameters) -> Village {
        Village {
            id,
            breed,
            coords,
            population: u64::from(p.fission_threshold),
            total_k: 0.,
            land: vec![],
            time_here: 0,
            active: true,
            p,
        }
    }

    pub fn step(&mut self, h: &mut Habitat) {
        if !self.active {
            return;
        }
        self.grow(h);
        self.check_fission(h);
        self.check_move(h);
    }

    /// Settle a founder village at its current location.
    pub fn establish(&mut self, h: &mut Habitat) {
        h.settle(self.coords, self.id);
        self.record_date(h);
        self.claim_land(h, self.coords);
        self.update_land(h);
    }

    fn deactivate(&mut self, reason: &str) {
        debug!(village = self.id, population = self.population, "inactive: {}", reason);
        self.active = false;
    }

    /// Free, tolerable cells among the candidates. Pioneers only consider
    /// cells their breed has never reached before.
    fn available(&self, cells: Vec<(Coords, Cell)>, pioneer: bool) -> Vec<(Coords, Cell)> {
        cells
            .into_iter()
            .filter(|(_, cell)| {
                cell.owner.is_free()
                    && cell.suitability >= self.p.tolerance
                    && !(pioneer && cell.arrival_time.is_some())
            })
            .collect()
    }

    fn current_suitability(&self, h: &Habitat) -> f64 {
        h.lookup(self.coords, self.breed)
            .map(|c| c.suitability)
            .unwrap_or(0.)
    }

    /// Distinct other settlements within `radius`.
    fn rivals(&self, h: &mut Habitat, radius: u32) -> usize {
        h.neighborhood(self.coords, radius, self.breed)
            .iter()
            .filter_map(|(_, cell)| cell.settlement)
            .filter(|&id| id != self.id)
            .count()
    }

    /// Candidate destinations for a leapfrogging move, if the best of them
    /// beats the current location.
    fn leap_destinations(&self, h: &mut Habitat) -> Option<Vec<(Coords, Cell)>> {
        if self.p.leap_distance == 0 {
            return None;
        }
        let ring = h.ring(self.coords, self.p.leap_distance, self.breed);
        let distant = self.available(ring, true);
        match best(&distant) {
            Some((_, s)) if s > self.current_suitability(h) => Some(distant),
            _ => None,
        }
    }

    /**
    Exponential growth. The increment is rounded half to even, so a village
    of 100 grows by 2, not 3.

    ```rust
    # use model::village::GROWTH_RATE;
    assert_eq!((GROWTH_RATE * 100_f64).round_ties_even(), 2.);
    assert_eq!((GROWTH_RATE * 140_f64).round_ties_even(), 4.);
    ```
    */
    pub fn grow(&mut self, h: &mut Habitat) {
        self.population += (GROWTH_RATE * self.population as f64).round_ties_even() as u64;
        self.update_land(h);
    }

    /// Claim the best free land in the catchment until the population fits
    /// the carrying capacity. When the catchment is exhausted, the
    /// population is cut back to what the land can carry and the village
    /// gives up.
    pub fn update_land(&mut self, h: &mut Habitat) {
        while self.population as f64 > self.total_k {
            let territory = h.neighborhood(self.coords, self.p.catchment, self.breed);
            let free_land = self.available(territory, false);
            match best(&free_land) {
                Some((c, _)) => self.claim_land(h, c),
                None => {
                    self.population = self.total_k.floor() as u64;
                    self.deactivate("catchment exhausted");
                    break;
                }
            }
        }
    }

    pub fn claim_land(&mut self, h: &mut Habitat, c: Coords) {
        let suitability = h.claim(c, self.id, self.breed);
        self.land.push(c);
        self.total_k = match h.policy().land_weighting {
            LandWeighting::Count => f64::from(self.p.k) * self.land.len() as f64,
            LandWeighting::SuitabilityWeighted => self.total_k + f64::from(self.p.k) * suitability,
        };
        debug_assert!(self.total_k >= 0.);
    }

    /// Date the arrival of the breed over the whole catchment.
    pub fn record_date(&self, h: &mut Habitat) {
        for (c, _) in h.neighborhood(self.coords, self.p.catchment, self.breed) {
            h.record_arrival(c, self.breed);
        }
    }

    pub fn check_fission(&mut self, h: &mut Habitat) {
        if self.population < u64::from(self.p.fission_threshold) {
            return;
        }
        let radius = self.p.catchment * 2;
        let nearby = match h.policy().fission_search {
            SearchShape::Disk => h.neighborhood(self.coords, radius, self.breed),
            SearchShape::Ring => h.ring(self.coords, radius, self.breed),
        };
        let empty_land = self.available(nearby, false);
        let crowded = match h.policy().rival_cap {
            Some(cap) => self.rivals(h, radius) >= cap,
            None => false,
        };

        if !empty_land.is_empty() && !crowded {
            let mut daughter = self.fission(h);
            daughter.move_to(h, &empty_land);
            debug!(
                bp = h.clock(),
                parent = self.id,
                village = daughter.id,
                to = ?daughter.coords,
                "fission"
            );
            h.spawn(daughter);
        } else if let Some(distant) = self.leap_destinations(h) {
            let mut daughter = self.fission(h);
            daughter.move_to(h, &distant);
            debug!(
                bp = h.clock(),
                parent = self.id,
                village = daughter.id,
                to = ?daughter.coords,
                "leapfrog"
            );
            h.spawn(daughter);
        } else if h.policy().inactive_on_failed_fission {
            self.deactivate("nowhere to split to");
        }
    }

    /// Split off a daughter village in the same cell, taking half of the
    /// population (rounded down on the parent's side).
    pub fn fission(&mut self, h: &mut Habitat) -> Village {
        let mut daughter = Village::new(h.next_id(), self.breed, self.coords, self.p);
        self.population /= 2;
        daughter.population = self.population;
        daughter
    }

    /// Move the settlement to the most suitable candidate and claim land
    /// around it. Land held so far is kept unless abandoned beforehand.
    pub fn move_to(&mut self, h: &mut Habitat, candidates: &[(Coords, Cell)]) {
        let (home, _) = match best(candidates) {
            Some(b) => b,
            None => return,
        };
        h.vacate(self.coords, self.id);
        self.coords = home;
        h.settle(home, self.id);
        self.record_date(h);
        self.claim_land(h, home);
        self.update_land(h);
    }

    pub fn abandon_land(&mut self, h: &mut Habitat) {
        for c in self.land.drain(..) {
            h.release(c, self.id);
        }
        self.total_k = 0.;
    }

    /// Relocate once the village has outstayed its permanence.
    pub fn check_move(&mut self, h: &mut Habitat) {
        if self.time_here < self.p.permanence {
            self.time_here += 1;
            return;
        }
        let ring = h.ring(self.coords, self.p.catchment * 2, self.breed);
        let empty_land = self.available(ring, false);
        if !empty_land.is_empty() {
            self.abandon_land(h);
            self.move_to(h, &empty_land);
            self.time_here = 0;
            debug!(bp = h.clock(), village = self.id, to = ?self.coords, "relocated");
        } else if let Some(distant) = self.leap_destinations(h) {
            if h.policy().leap_requires_abandon {
                self.abandon_land(h);
            }
            self.move_to(h, &distant);
            self.time_here = 0;
            debug!(bp = h.clock(), village = self.id, to = ?self.coords, "leapfrogged");
        } else if h.policy().inactive_when_stranded {
            self.deactivate("stranded");
        } else {
            self.time_here += 1;
        }
    }

    /// Remove the village from the world: release its land if the policy
    /// says so, otherwise leave the land to its memory.
    pub fn retire(&mut self, h: &mut Habitat) {
        if h.policy().abandon_land_on_death {
            self.abandon_land(h);
            h.vacate(self.coords, self.id);
        }
    }
}
