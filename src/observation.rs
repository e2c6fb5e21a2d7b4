use crate::error::Result;
use crate::landscape::CoordinateTransform;
use crate::{Coords, SettlementModel, YearsBP};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

pub struct ObservationSettings {
    /// Period of census logging, in years; 0 disables it.
    pub log_every: YearsBP,
    /// Period of state snapshots, in years; 0 disables them.
    pub store_every: YearsBP,
    pub statefile: String,
}

impl Default for ObservationSettings {
    fn default() -> Self {
        ObservationSettings {
            log_every: 0,
            store_every: 0,
            statefile: "state.json".to_string(),
        }
    }
}

/// Number of villages and people per breed.
pub fn census(model: &SettlementModel) -> Vec<(usize, u64)> {
    let mut counts = vec![(0, 0); model.breeds.len()];
    for v in model.villages.values() {
        counts[v.breed].0 += 1;
        counts[v.breed].1 += v.population;
    }
    counts
}

pub fn log_census(model: &SettlementModel) {
    for (b, (villages, population)) in model.breeds.iter().zip(census(model)) {
        info!(bp = model.bp, breed = %b.name, villages, population, "census");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteScore<'a> {
    pub breed: &'a str,
    pub coords: Coords,
    pub arrival: Option<YearsBP>,
    pub score: f64,
}

/// The score of every dated site, breed by breed.
pub fn site_scores(model: &SettlementModel) -> Vec<SiteScore<'_>> {
    model
        .breeds
        .iter()
        .enumerate()
        .flat_map(|(breed, b)| {
            let arrival = move |c: Coords| model.grid.arrival_time(c, breed);
            b.sites.scores(arrival).map(move |(site, score)| SiteScore {
                breed: &b.name,
                coords: site.coords,
                arrival: arrival(site.coords),
                score,
            })
        })
        .collect()
}

/**
Write the arrival date of every breed in every cell it reached, as CSV rows
`breed,x,y,bp` in projected coordinates.

```rust
# use model::observation::write_arrivals;
# use model::landscape::{Landscape, LinearTransform};
# use model::input::{Scenario, BreedSpec};
# use model::niche::Suitability;
# use model::parameters::{Parameters, Policy};
# use model::SettlementModel;
let scenario = Scenario {
    landscape: Landscape::new(1, 1).with_layer("s", vec![vec![1.0]])?,
    breeds: vec![BreedSpec {
        name: "tupi".into(),
        founder: Parameters { start_date: 3000, catchment: 1, k: 200, ..Parameters::default() },
        suitability: Suitability::Layer("s".into()),
        sites: Default::default(),
    }],
    policy: Policy::default(),
    transform: LinearTransform { west: 0., north: 0., cell_size: 1. },
    end_date: 2000,
};
let model = SettlementModel::new(&scenario)?;
let mut out = vec![];
write_arrivals(&model, &scenario.transform, &mut out)?;
assert_eq!(String::from_utf8(out).unwrap(), "breed,x,y,bp\ntupi,0,0,3000\n");
# Ok::<(), model::Error>(())
```
*/
pub fn write_arrivals<W: Write>(
    model: &SettlementModel,
    transform: &impl CoordinateTransform,
    mut out: W,
) -> Result<()> {
    writeln!(out, "breed,x,y,bp")?;
    for (breed, b) in model.breeds.iter().enumerate() {
        for (c, bp) in model.grid.arrivals(breed) {
            let (x, y) = transform.to_projected(c);
            writeln!(out, "{},{},{},{}", b.name, x, y, bp)?;
        }
    }
    Ok(())
}

/// CSV rows `breed,x,y,arrival,score`, with an empty arrival where the
/// breed never reached the site.
pub fn write_site_scores<W: Write>(
    model: &SettlementModel,
    transform: &impl CoordinateTransform,
    mut out: W,
) -> Result<()> {
    writeln!(out, "breed,x,y,arrival,score")?;
    for s in site_scores(model) {
        let (x, y) = transform.to_projected(s.coords);
        let arrival = s.arrival.map(|bp| bp.to_string()).unwrap_or_default();
        writeln!(out, "{},{},{},{},{}", s.breed, x, y, arrival, s.score)?;
    }
    Ok(())
}

/// Write `<stem>.csv` with the arrival dates and `<stem>_sites.csv` with the
/// site scores. The model is left untouched.
pub fn write(
    model: &SettlementModel,
    transform: &impl CoordinateTransform,
    stem: impl AsRef<Path>,
) -> Result<()> {
    let stem = stem.as_ref();
    let mut arrivals = BufWriter::new(File::create(stem.with_extension("csv"))?);
    write_arrivals(model, transform, &mut arrivals)?;
    arrivals.flush()?;

    let mut name = stem.file_name().unwrap_or_default().to_os_string();
    name.push("_sites.csv");
    let mut sites = BufWriter::new(File::create(stem.with_file_name(name))?);
    write_site_scores(model, transform, &mut sites)?;
    sites.flush()?;
    Ok(())
}
