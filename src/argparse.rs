use crate::calibration::CalibrationSettings;
use crate::observation::ObservationSettings;
use crate::parameters::{LandWeighting, Parameters, Policy, SearchShape};
use crate::YearsBP;
use ::argparse::action::Action::Single;
use ::argparse::action::ParseResult::{Error, Parsed};
use ::argparse::action::{Action, IArgAction, ParseResult, TypedAction};
use ::argparse::{ArgumentParser, Store, StoreOption};
use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

/// Install the `tracing` subscriber used by all binaries, filtered by
/// `RUST_LOG` and defaulting to `info`.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Founding parameters given on the command line. Anything not given keeps
/// the value from the scenario.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParameterOverrides {
    pub start_date: Option<YearsBP>,
    pub origin_x: Option<i32>,
    pub origin_y: Option<i32>,
    pub k: Option<u32>,
    pub fission_threshold: Option<u32>,
    pub catchment: Option<u32>,
    pub leap_distance: Option<u32>,
    pub permanence: Option<u32>,
    pub tolerance: Option<f64>,
}

impl ParameterOverrides {
    pub fn apply(&self, p: &mut Parameters) {
        fn set<T: Copy>(target: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *target = v;
            }
        }
        set(&mut p.start_date, self.start_date);
        set(&mut p.origin.x, self.origin_x);
        set(&mut p.origin.y, self.origin_y);
        set(&mut p.k, self.k);
        set(&mut p.fission_threshold, self.fission_threshold);
        set(&mut p.catchment, self.catchment);
        set(&mut p.leap_distance, self.leap_distance);
        set(&mut p.permanence, self.permanence);
        set(&mut p.tolerance, self.tolerance);
    }

    pub fn bind<'a>(&'a mut self, parser: &mut ArgumentParser<'a>) {
        parser.refer(&mut self.start_date).add_option(
            &["--start-date"],
            StoreOption,
            "date (years BP) at which the founder village appears",
        );
        parser.refer(&mut self.origin_x).add_option(
            &["--origin-x"],
            StoreOption,
            "column of the founder village",
        );
        parser.refer(&mut self.origin_y).add_option(
            &["--origin-y"],
            StoreOption,
            "row of the founder village",
        );
        parser
            .refer(&mut self.k)
            .add_option(&["--k"], StoreOption, "carrying capacity per cell");
        parser.refer(&mut self.fission_threshold).add_option(
            &["--fission-threshold"],
            StoreOption,
            "population at which a village splits",
        );
        parser.refer(&mut self.catchment).add_option(
            &["--catchment"],
            StoreOption,
            "radius of a village's territory, in cells",
        );
        parser.refer(&mut self.leap_distance).add_option(
            &["--leap-distance"],
            StoreOption,
            "distance of leapfrogging moves, in cells; 0 disables leapfrogging",
        );
        parser.refer(&mut self.permanence).add_option(
            &["--permanence"],
            StoreOption,
            "years a village stays before it looks for a new home",
        );
        parser.refer(&mut self.tolerance).add_option(
            &["--tolerance"],
            StoreOption,
            "minimum suitability of settled cells",
        );
    }
}

/// Parses `none` as no cap, anything else as the number of rivals.
pub struct StoreRivalCapAction<'a> {
    pub cell: Rc<RefCell<&'a mut Option<Option<usize>>>>,
}

impl<'a> IArgAction for StoreRivalCapAction<'a> {
    fn parse_arg(&self, arg: &str) -> ParseResult {
        if arg == "none" {
            **self.cell.borrow_mut() = Some(None);
            return Parsed;
        }
        match usize::from_str(arg) {
            Ok(x) => {
                **self.cell.borrow_mut() = Some(Some(x));
                Parsed
            }
            Err(_) => Error(format!("Bad value {}", arg)),
        }
    }
}

struct StoreRivalCap;

impl TypedAction<Option<Option<usize>>> for StoreRivalCap {
    fn bind<'x>(&self, cell: Rc<RefCell<&'x mut Option<Option<usize>>>>) -> Action<'x> {
        Single(Box::new(StoreRivalCapAction { cell }))
    }
}

/// Policy switches given on the command line.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PolicyOverrides {
    pub land_weighting: Option<LandWeighting>,
    pub fission_search: Option<SearchShape>,
    pub rival_cap: Option<Option<usize>>,
    pub inactive_on_failed_fission: Option<bool>,
    pub leap_requires_abandon: Option<bool>,
    pub inactive_when_stranded: Option<bool>,
    pub abandon_land_on_death: Option<bool>,
}

impl PolicyOverrides {
    pub fn apply(&self, policy: &mut Policy) {
        if let Some(v) = self.land_weighting {
            policy.land_weighting = v;
        }
        if let Some(v) = self.fission_search {
            policy.fission_search = v;
        }
        if let Some(v) = self.rival_cap {
            policy.rival_cap = v;
        }
        if let Some(v) = self.inactive_on_failed_fission {
            policy.inactive_on_failed_fission = v;
        }
        if let Some(v) = self.leap_requires_abandon {
            policy.leap_requires_abandon = v;
        }
        if let Some(v) = self.inactive_when_stranded {
            policy.inactive_when_stranded = v;
        }
        if let Some(v) = self.abandon_land_on_death {
            policy.abandon_land_on_death = v;
        }
    }

    pub fn bind<'a>(&'a mut self, parser: &mut ArgumentParser<'a>) {
        parser.refer(&mut self.land_weighting).add_option(
            &["--land-weighting"],
            StoreOption,
            "carrying capacity from the number of cells (count) or their suitability (weighted)",
        );
        parser.refer(&mut self.fission_search).add_option(
            &["--fission-search"],
            StoreOption,
            "where daughter villages settle: within twice the catchment (disk) or exactly there (ring)",
        );
        parser.refer(&mut self.rival_cap).add_option(
            &["--rival-cap"],
            StoreRivalCap,
            "number of nearby settlements that prevents fission into the vicinity, or none",
        );
        parser.refer(&mut self.inactive_on_failed_fission).add_option(
            &["--inactive-on-failed-fission"],
            StoreOption,
            "whether a village that cannot split gives up (true/false)",
        );
        parser.refer(&mut self.leap_requires_abandon).add_option(
            &["--leap-requires-abandon"],
            StoreOption,
            "whether a leapfrogging village leaves its old land (true/false)",
        );
        parser.refer(&mut self.inactive_when_stranded).add_option(
            &["--inactive-when-stranded"],
            StoreOption,
            "whether a village that cannot move gives up (true/false)",
        );
        parser.refer(&mut self.abandon_land_on_death).add_option(
            &["--abandon-land-on-death"],
            StoreOption,
            "whether inactive villages release their land (true/false)",
        );
    }
}

pub fn bind_observation<'a>(parser: &mut ArgumentParser<'a>, o: &'a mut ObservationSettings) {
    parser.refer(&mut o.log_every).add_option(
        &["--log-every"],
        Store,
        "period of census logging, in years",
    );
    parser.refer(&mut o.store_every).add_option(
        &["--store-every"],
        Store,
        "period of state saving, in years",
    );
    parser.refer(&mut o.statefile).add_option(
        &["--statefile"],
        Store,
        "file to store the model state to",
    );
}

pub fn bind_calibration<'a>(parser: &mut ArgumentParser<'a>, s: &'a mut CalibrationSettings) {
    parser
        .refer(&mut s.n_pop)
        .add_option(&["--population"], Store, "genomes per generation");
    parser.refer(&mut s.n_select).add_option(
        &["--select"],
        Store,
        "genomes selected as parents",
    );
    parser.refer(&mut s.n_elit).add_option(
        &["--elite"],
        Store,
        "parents carried over unchanged",
    );
    parser.refer(&mut s.p_cross).add_option(
        &["--crossover-probability"],
        Store,
        "probability of crossover for a pair of parents",
    );
    parser.refer(&mut s.p_mut).add_option(
        &["--mutation-probability"],
        Store,
        "probability of a mutation in an offspring",
    );
    parser
        .refer(&mut s.max_it)
        .add_option(&["--generations"], Store, "number of generations");
    parser.refer(&mut s.checkpoint_every).add_option(
        &["--checkpoint-every"],
        Store,
        "period of checkpoints, in generations",
    );
    parser.refer(&mut s.time_budget).add_option(
        &["--time-budget"],
        Store,
        "wall-clock budget of one model run, in seconds",
    );
    parser
        .refer(&mut s.workers)
        .add_option(&["--workers"], Store, "parallel model runs");
    parser
        .refer(&mut s.seed)
        .add_option(&["--seed"], Store, "seed of the random number generator");
}
