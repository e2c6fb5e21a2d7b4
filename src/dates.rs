/*!
Radiocarbon evidence. Each dated archaeological site comes with the
calibrated probability of every calendar year (BP) being the date of the
earliest occupation. The simulation is scored by how probable its arrival
dates are at those sites.
*/
use crate::{Coords, YearsBP};
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub coords: Coords,
    /// Calibrated probability by date; need not sum to one.
    pub probabilities: BTreeMap<YearsBP, f64>,
}

impl Site {
    /**
    The probability of the simulated arrival date relative to the most
    probable date of the site, so a perfect hit scores 1 and a date outside
    the calibrated range scores 0.

    ```rust
    # use model::{dates::Site, Coords};
    let site = Site {
        coords: Coords::new(3, 4),
        probabilities: vec![(2000, 0.01), (2001, 0.04), (2002, 0.02)].into_iter().collect(),
    };
    assert_eq!(site.score(Some(2001)), 1.0);
    assert_eq!(site.score(Some(2002)), 0.5);
    assert_eq!(site.score(Some(1999)), 0.0);
    assert_eq!(site.score(None), 0.0);
    ```
    */
    pub fn score(&self, simulated: Option<YearsBP>) -> f64 {
        let max = self.probabilities.values().cloned().fold(0., f64::max);
        match simulated.and_then(|bp| self.probabilities.get(&bp)) {
            Some(&p) if max > 0. => f64::max(p, 0.) / max,
            _ => 0.,
        }
    }
}

/// The dated sites of one breed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatedSites {
    pub sites: Vec<Site>,
}

impl DatedSites {
    pub fn new() -> Self {
        DatedSites::default()
    }

    pub fn insert<I>(&mut self, coords: Coords, probabilities: I)
    where
        I: IntoIterator<Item = (YearsBP, f64)>,
    {
        self.sites.push(Site {
            coords,
            probabilities: probabilities.into_iter().collect(),
        });
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Score of every site, given the simulated arrival date at a cell.
    pub fn scores<'a, F>(&'a self, arrival: F) -> impl Iterator<Item = (&'a Site, f64)> + 'a
    where
        F: Fn(Coords) -> Option<YearsBP> + 'a,
    {
        self.sites.iter().map(move |s| (s, s.score(arrival(s.coords))))
    }

    /// Mean site score, 0 for a breed without evidence.
    pub fn mean_score<F>(&self, arrival: F) -> f64
    where
        F: Fn(Coords) -> Option<YearsBP>,
    {
        if self.sites.is_empty() {
            return 0.;
        }
        self.sites
            .iter()
            .map(|s| s.score(arrival(s.coords)))
            .sum::<f64>()
            / self.sites.len() as f64
    }
}
