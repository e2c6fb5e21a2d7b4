/*!
Everything a model is built from: the landscape layers, the breeds with
their founders, niches and dated sites, and the behavioural policy. A
scenario is prepared elsewhere (rasters loaded, dates calibrated) and read
here as JSON, or as bincode if the file name ends in `.bin`.
*/
use crate::dates::DatedSites;
use crate::error::{invalid, Result};
use crate::landscape::{Landscape, LinearTransform};
use crate::niche::Suitability;
use crate::parameters::{Parameters, Policy};
use crate::YearsBP;
use serde_derive::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedSpec {
    pub name: String,
    pub founder: Parameters,
    pub suitability: Suitability,
    #[serde(default)]
    pub sites: DatedSites,
}

fn default_end_date() -> YearsBP {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub landscape: Landscape,
    pub breeds: Vec<BreedSpec>,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub transform: LinearTransform,
    /// The simulation stops once the clock reaches this date.
    #[serde(default = "default_end_date")]
    pub end_date: YearsBP,
}

fn is_bincode(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "bin")
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Scenario> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let scenario: Scenario = if is_bincode(path) {
            bincode::deserialize_from(reader)?
        } else {
            serde_json::from_reader(reader)?
        };
        scenario.landscape.validate()?;
        Ok(scenario)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        if is_bincode(path) {
            bincode::serialize_into(writer, self)?;
        } else {
            serde_json::to_writer_pretty(writer, self)?;
        }
        Ok(())
    }

    /// The date at which the simulation clock starts.
    pub fn start_date(&self) -> Result<YearsBP> {
        match self.breeds.iter().map(|b| b.founder.start_date).max() {
            Some(bp) if bp > self.end_date => Ok(bp),
            Some(bp) => invalid(
                "end_date",
                format!("{} is not before the first founding at {}", self.end_date, bp),
            ),
            None => invalid("breeds", "a scenario needs at least one breed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Scenario {
        Scenario {
            landscape: Landscape::new(2, 2)
                .with_layer("suitability", vec![vec![0.5, 0.6], vec![0.7, 0.8]])
                .unwrap(),
            breeds: vec![BreedSpec {
                name: "arawak".into(),
                founder: Parameters::default(),
                suitability: Suitability::Layer("suitability".into()),
                sites: DatedSites::new(),
            }],
            policy: Policy::default(),
            transform: LinearTransform::default(),
            end_date: 500,
        }
    }

    #[test]
    fn saved_scenarios_load_again() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["scenario.json", "scenario.bin"] {
            let path = dir.path().join(name);
            scenario().save(&path).unwrap();
            let back = Scenario::load(&path).unwrap();
            assert_eq!(back.breeds, scenario().breeds);
            assert_eq!(back.landscape.layers[0].values, vec![0.5, 0.6, 0.7, 0.8]);
        }
    }

    #[test]
    fn optional_sections_have_defaults() {
        let json = r#"{
            "landscape": {"width": 1, "height": 1, "layers": [{"name": "s", "values": [1.0]}]},
            "breeds": []
        }"#;
        let s: Scenario = serde_json::from_str(json).unwrap();
        assert_eq!(s.end_date, 500);
        assert_eq!(s.policy, Policy::default());
        assert!(s.start_date().is_err());
    }

    #[test]
    fn the_clock_starts_at_the_latest_founding() {
        let mut s = scenario();
        let mut second = s.breeds[0].clone();
        second.founder.start_date = 4800;
        s.breeds.push(second);
        assert_eq!(s.start_date().unwrap(), 4800);
        s.end_date = 4800;
        assert!(s.start_date().is_err());
    }
}
