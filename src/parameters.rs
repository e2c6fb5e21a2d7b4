use crate::error::{invalid, Result};
use crate::{Coords, YearsBP};
use serde_derive::{Deserialize, Serialize};
use std::str::FromStr;

/// The founding parameters of one breed. Every village of that breed,
/// including all descendants through fission, carries a copy.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Parameters {
    /// Date (years BP) at which the founder village appears.
    pub start_date: YearsBP,
    pub origin: Coords,
    /// Carrying capacity per claimed cell.
    pub k: u32,
    pub fission_threshold: u32,
    /// Radius of the village territory, in cells.
    pub catchment: u32,
    /// Distance of leapfrogging moves; 0 disables leapfrogging.
    pub leap_distance: u32,
    /// Steps a village stays put before it looks for a new home.
    pub permanence: u32,
    /// Minimum suitability of a cell for it to be settled.
    pub tolerance: f64,
}

impl Default for Parameters {
    fn default() -> Parameters {
        Parameters {
            start_date: 4500,
            origin: Coords::new(0, 0),
            k: 62,
            fission_threshold: 126,
            catchment: 2,
            leap_distance: 20,
            permanence: 15,
            tolerance: 0.4,
        }
    }
}

impl Parameters {
    /// Reject values outside the domain of the model. Nothing is clamped.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return invalid("k", "carrying capacity must be positive");
        }
        if self.fission_threshold < 2 {
            return invalid(
                "fission_threshold",
                format!("{} is too small to split a village", self.fission_threshold),
            );
        }
        if self.catchment == 0 {
            return invalid("catchment", "a village needs a catchment of at least one cell");
        }
        if !(self.tolerance.is_finite() && (0.0..=1.0).contains(&self.tolerance)) {
            return invalid("tolerance", format!("{} is not in [0, 1]", self.tolerance));
        }
        if self.origin.x < 0 || self.origin.y < 0 {
            return invalid("origin", format!("{:?} has negative coordinates", self.origin));
        }
        Ok(())
    }
}

/// How a village's carrying capacity derives from its territory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandWeighting {
    /// `k` per claimed cell.
    Count,
    /// `k` times the summed suitability of the claimed cells.
    SuitabilityWeighted,
}

impl FromStr for LandWeighting {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "count" => Ok(LandWeighting::Count),
            "suitability" | "weighted" => Ok(LandWeighting::SuitabilityWeighted),
            _ => Err(format!("unknown land weighting `{}`", s)),
        }
    }
}

/// Where a splitting village looks for a home for its daughter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchShape {
    /// Anywhere within twice the catchment.
    Disk,
    /// Exactly at twice the catchment.
    Ring,
}

impl FromStr for SearchShape {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "disk" => Ok(SearchShape::Disk),
            "ring" => Ok(SearchShape::Ring),
            _ => Err(format!("unknown search shape `{}`", s)),
        }
    }
}

/**
The behavioural variants of villages, fixed for the lifetime of a model.

```rust
# use model::parameters::{Policy, LandWeighting};
let p = Policy::default();
assert_eq!(p.land_weighting, LandWeighting::Count);
assert_eq!(p.rival_cap, Some(6));
```
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub land_weighting: LandWeighting,
    pub fission_search: SearchShape,
    /// Fission into the vicinity only happens with fewer rival settlements
    /// than this nearby.
    pub rival_cap: Option<usize>,
    /// A village that wants to split but finds nowhere to go gives up.
    pub inactive_on_failed_fission: bool,
    /// A village leapfrogging on relocation leaves its old land behind.
    pub leap_requires_abandon: bool,
    /// A village that has outstayed its permanence and finds nowhere to move
    /// gives up instead of waiting.
    pub inactive_when_stranded: bool,
    /// Inactive villages release their land when they are removed.
    pub abandon_land_on_death: bool,
}

impl Default for Policy {
    fn default() -> Policy {
        Policy {
            land_weighting: LandWeighting::Count,
            fission_search: SearchShape::Disk,
            rival_cap: Some(6),
            inactive_on_failed_fission: false,
            leap_requires_abandon: true,
            inactive_when_stranded: false,
            abandon_land_on_death: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Parameters::default().validate().is_ok());
    }

    #[test]
    fn zero_catchment_is_rejected() {
        let p = Parameters {
            catchment: 0,
            ..Parameters::default()
        };
        let e = p.validate().unwrap_err();
        assert!(e.to_string().contains("catchment"));
    }

    #[test]
    fn tolerance_is_not_clamped() {
        for tolerance in [-0.1, 1.5, f64::NAN] {
            let p = Parameters {
                tolerance,
                ..Parameters::default()
            };
            assert!(p.validate().is_err());
        }
    }

    #[test]
    fn policy_variants_parse_from_their_names() {
        assert_eq!("weighted".parse(), Ok(LandWeighting::SuitabilityWeighted));
        assert_eq!("ring".parse(), Ok(SearchShape::Ring));
        assert!("hexagon".parse::<SearchShape>().is_err());
    }

    #[test]
    fn partial_policy_json_falls_back_to_defaults() {
        let p: Policy = serde_json::from_str(r#"{"inactive_when_stranded": true}"#).unwrap();
        assert!(p.inactive_when_stranded);
        assert_eq!(p.rival_cap, Some(6));
        assert_eq!(p.fission_search, SearchShape::Disk);
    }
}
