/*!
The spatial grid: a dense, row-major raster of cells holding land ownership,
settlement markers, and for every breed its niche suitability and the date at
which the breed first arrived in the cell.

Neighborhood queries are answered through offset masks. A mask only depends
on the radius, not on the center, so it is computed once per radius and then
translated to wherever it is needed.
*/
use crate::{Coords, VillageId, YearsBP};
use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;

/// Index of a breed (culture) in the model.
pub type Breed = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Owner {
    Free,
    /// Water or no-data; never settled by anyone.
    Unsettleable,
    Village(VillageId),
}

impl Owner {
    pub fn is_free(self) -> bool {
        self == Owner::Free
    }
}

/// A snapshot of one cell, seen through the layers of one breed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub owner: Owner,
    /// The village whose settlement sits in this cell, if any.
    pub settlement: Option<VillageId>,
    pub suitability: f64,
    pub arrival_time: Option<YearsBP>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BreedLayer {
    suitability: Vec<f64>,
    arrival: Vec<Option<YearsBP>>,
}

type Mask = Arc<Vec<(i32, i32)>>;

#[derive(Debug, Clone, Default)]
struct Masks {
    disks: FxHashMap<u32, Mask>,
    rings: FxHashMap<u32, Mask>,
}

/**
Distance between two cells, in cells: the euclidean distance rounded to the
nearest integer. Integer offsets never produce a distance of exactly k + ½, so
the rounding mode does not matter.

```rust
# use model::{grid::distance, Coords};
assert_eq!(distance(Coords::new(0, 0), Coords::new(3, 4)), 5);
assert_eq!(distance(Coords::new(0, 0), Coords::new(1, 1)), 1);
assert_eq!(distance(Coords::new(2, 2), Coords::new(0, 0)), 3);
```
*/
pub fn distance(a: Coords, b: Coords) -> u32 {
    offset_length(b.x - a.x, b.y - a.y)
}

fn offset_length(dx: i32, dy: i32) -> u32 {
    f64::from(dx).hypot(f64::from(dy)).round() as u32
}

/// All offsets within `radius`, in mask order: `dx` ascending, then `dy`
/// ascending. Tie-breaks everywhere in the model follow this order.
fn disk_offsets(radius: u32) -> Vec<(i32, i32)> {
    let r = radius as i32;
    (-r..=r)
        .cartesian_product(-r..=r)
        .filter(|&(dx, dy)| offset_length(dx, dy) <= radius)
        .collect()
}

fn ring_offsets(distance: u32) -> Vec<(i32, i32)> {
    let r = distance as i32;
    (-r..=r)
        .cartesian_product(-r..=r)
        .filter(|&(dx, dy)| offset_length(dx, dy) == distance)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialGrid {
    width: usize,
    height: usize,
    owner: Vec<Owner>,
    settlement: Vec<Option<VillageId>>,
    breeds: Vec<BreedLayer>,
    #[serde(skip)]
    masks: Masks,
}

impl SpatialGrid {
    /// An empty landscape where every cell is free and no breed is known yet.
    pub fn new(width: usize, height: usize) -> Self {
        SpatialGrid {
            width,
            height,
            owner: vec![Owner::Free; width * height],
            settlement: vec![None; width * height],
            breeds: vec![],
            masks: Masks::default(),
        }
    }

    /// Register the suitability layer (row-major) of another breed.
    pub fn add_breed(&mut self, suitability: Vec<f64>) -> Breed {
        debug_assert_eq!(suitability.len(), self.width * self.height);
        self.breeds.push(BreedLayer {
            arrival: vec![None; suitability.len()],
            suitability,
        });
        self.breeds.len() - 1
    }

    fn index(&self, c: Coords) -> Option<usize> {
        if c.x < 0 || c.y < 0 {
            return None;
        }
        let (x, y) = (c.x as usize, c.y as usize);
        if x >= self.width || y >= self.height {
            None
        } else {
            Some(y * self.width + x)
        }
    }

    pub fn get(&self, c: Coords, breed: Breed) -> Option<Cell> {
        let i = self.index(c)?;
        let layer = &self.breeds[breed];
        Some(Cell {
            owner: self.owner[i],
            settlement: self.settlement[i],
            suitability: layer.suitability[i],
            arrival_time: layer.arrival[i],
        })
    }

    pub fn owner(&self, c: Coords) -> Option<Owner> {
        self.index(c).map(|i| self.owner[i])
    }

    pub fn set_owner(&mut self, c: Coords, owner: Owner) {
        let i = self.index(c).expect("ownership change outside the grid");
        debug_assert!(
            self.owner[i] != Owner::Unsettleable,
            "unsettleable cell {:?} cannot change owner",
            c
        );
        self.owner[i] = owner;
    }

    /// Mark a cell as permanently off limits.
    pub fn set_unsettleable(&mut self, c: Coords) {
        if let Some(i) = self.index(c) {
            self.owner[i] = Owner::Unsettleable;
        }
    }

    pub fn settlement(&self, c: Coords) -> Option<VillageId> {
        self.index(c).and_then(|i| self.settlement[i])
    }

    pub fn set_settlement(&mut self, c: Coords, village: Option<VillageId>) {
        if let Some(i) = self.index(c) {
            self.settlement[i] = village;
        }
    }

    pub fn suitability(&self, c: Coords, breed: Breed) -> Option<f64> {
        self.index(c).map(|i| self.breeds[breed].suitability[i])
    }

    pub fn arrival_time(&self, c: Coords, breed: Breed) -> Option<YearsBP> {
        self.index(c).and_then(|i| self.breeds[breed].arrival[i])
    }

    /// Write-once: returns whether the date was recorded, which only happens
    /// the first time a breed reaches the cell.
    pub fn record_arrival(&mut self, c: Coords, breed: Breed, bp: YearsBP) -> bool {
        match self.index(c) {
            Some(i) if self.breeds[breed].arrival[i].is_none() => {
                self.breeds[breed].arrival[i] = Some(bp);
                true
            }
            _ => false,
        }
    }

    /// Every cell the breed has reached, with its arrival date.
    pub fn arrivals(&self, breed: Breed) -> impl Iterator<Item = (Coords, YearsBP)> + '_ {
        let width = self.width;
        self.breeds[breed]
            .arrival
            .iter()
            .enumerate()
            .filter_map(move |(i, a)| a.map(|bp| (Coords::from_index(i % width, i / width), bp)))
    }

    /// The number of cells currently owned by a village.
    pub fn territory_size(&self, id: VillageId) -> usize {
        self.owner
            .iter()
            .filter(|&&o| o == Owner::Village(id))
            .count()
    }

    fn disk(&mut self, radius: u32) -> Mask {
        self.masks
            .disks
            .entry(radius)
            .or_insert_with(|| Arc::new(disk_offsets(radius)))
            .clone()
    }

    fn ring(&mut self, distance: u32) -> Mask {
        self.masks
            .rings
            .entry(distance)
            .or_insert_with(|| Arc::new(ring_offsets(distance)))
            .clone()
    }

    fn translate(&self, center: Coords, mask: &[(i32, i32)], breed: Breed) -> Vec<(Coords, Cell)> {
        mask.iter()
            .filter_map(|&(dx, dy)| {
                let c = Coords::new(center.x + dx, center.y + dy);
                Some((c, self.get(c, breed)?))
            })
            .collect()
    }

    /// All in-bounds cells within `radius` of `center`, in mask order.
    pub fn neighborhood(&mut self, center: Coords, radius: u32, breed: Breed) -> Vec<(Coords, Cell)> {
        let mask = self.disk(radius);
        self.translate(center, &mask, breed)
    }

    /// All in-bounds cells at exactly `distance` from `center`, in mask order.
    pub fn ring_at_distance(
        &mut self,
        center: Coords,
        distance: u32,
        breed: Breed,
    ) -> Vec<(Coords, Cell)> {
        let mask = self.ring(distance);
        self.translate(center, &mask, breed)
    }
}
