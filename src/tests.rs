use crate::*;

use crate::calibration::{
    CalibrationSettings, Calibrator, GeneKind, Genome, GenomeLayout, SimulationEvaluator,
    WORST_FITNESS,
};
use crate::dates::DatedSites;
use crate::grid::Owner;
use crate::input::{BreedSpec, Scenario};
use crate::landscape::{Landscape, LinearTransform, NO_DATA};
use crate::niche::Suitability;
use crate::observation::ObservationSettings;
use crate::parameters::{LandWeighting, Parameters, Policy, SearchShape};
use itertools::iproduct;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn rows(width: usize, height: usize, f: impl Fn(usize, usize) -> f64) -> Vec<Vec<f64>> {
    (0..height)
        .map(|y| (0..width).map(|x| f(x, y)).collect())
        .collect()
}

fn founder(origin: Coords, start_date: YearsBP) -> Parameters {
    Parameters {
        start_date,
        origin,
        k: 50,
        fission_threshold: 100,
        catchment: 1,
        leap_distance: 0,
        permanence: 5,
        tolerance: 0.3,
    }
}

fn breed(name: &str, founder: Parameters) -> BreedSpec {
    BreedSpec {
        name: name.into(),
        founder,
        suitability: Suitability::Layer("suitability".into()),
        sites: DatedSites::new(),
    }
}

fn scenario(landscape: Landscape, breeds: Vec<BreedSpec>) -> Scenario {
    Scenario {
        landscape,
        breeds,
        policy: Policy::default(),
        transform: LinearTransform::default(),
        end_date: 0,
    }
}

fn flat(width: usize, height: usize) -> Landscape {
    Landscape::new(width, height)
        .with_layer("suitability", rows(width, height, |_, _| 1.))
        .unwrap()
}

fn patchy(width: usize, height: usize) -> Landscape {
    Landscape::new(width, height)
        .with_layer(
            "suitability",
            rows(width, height, |x, y| 0.5 + 0.125 * ((x * 7 + y * 3) % 5) as f64),
        )
        .unwrap()
}

/// Every active village owns each cell of its land, and nobody else does.
fn assert_territories_consistent(model: &SettlementModel) {
    for v in model.villages.values().filter(|v| v.active) {
        assert!(!v.land.is_empty(), "village {} has no land", v.id);
        assert_eq!(model.grid.territory_size(v.id), v.land.len());
        for &c in &v.land {
            assert_eq!(model.grid.owner(c), Some(Owner::Village(v.id)));
        }
        assert!(v.population as f64 <= v.total_k + 1e-9);
    }
}

fn arrivals(model: &SettlementModel, breed: grid::Breed) -> Vec<(Coords, YearsBP)> {
    model.grid.arrivals(breed).collect()
}

#[test]
pub fn test_territory_carries_population_after_growth() {
    let s = scenario(flat(5, 5), vec![breed("tupi", founder(Coords::new(2, 2), 3000))]);
    let mut model = SettlementModel::new(&s).unwrap();
    model.step();
    for v in model.villages.values() {
        let capacity = u64::from(v.p.k) * model.grid.territory_size(v.id) as u64;
        assert!(capacity >= v.population, "{:?}", v);
    }
}

#[test]
pub fn test_distant_breeds_keep_separate_territories() {
    let s = scenario(
        flat(30, 10),
        vec![
            breed("tupi", founder(Coords::new(3, 5), 3000)),
            breed("arawak", founder(Coords::new(26, 5), 3000)),
        ],
    );
    let mut model = SettlementModel::new(&s).unwrap();
    let founders: Vec<VillageId> = model.villages.keys().copied().collect();
    assert_eq!(founders.len(), 2);
    for _ in 0..50 {
        model.step();
        for &id in &founders {
            assert!(model.grid.territory_size(id) > 0);
        }
        assert_territories_consistent(&model);
    }
    assert_eq!(model.bp, 2950);
}

#[test]
pub fn test_arrival_dates_are_never_overwritten() {
    let s = scenario(patchy(20, 20), vec![breed("tupi", founder(Coords::new(10, 10), 3000))]);
    let mut model = SettlementModel::new(&s).unwrap();
    for _ in 0..10 {
        model.step();
    }
    let early = arrivals(&model, 0);
    assert!(early.len() > 1);
    for _ in 0..20 {
        model.step();
    }
    for (c, bp) in early {
        assert_eq!(model.grid.arrival_time(c, 0), Some(bp));
    }
}

#[test]
pub fn test_founding_dates_the_catchment() {
    let s = scenario(flat(5, 5), vec![breed("tupi", founder(Coords::new(2, 2), 3000))]);
    let model = SettlementModel::new(&s).unwrap();
    assert_eq!(arrivals(&model, 0).len(), 9);
    assert!(arrivals(&model, 0).iter().all(|&(_, bp)| bp == 3000));
    assert_eq!(model.bp, 3000);
}

#[test]
pub fn test_runs_are_reproducible() {
    let s = scenario(patchy(15, 15), vec![breed("tupi", founder(Coords::new(7, 7), 3000))]);
    let mut a = SettlementModel::new(&s).unwrap();
    let mut b = SettlementModel::new(&s).unwrap();
    for _ in 0..30 {
        a.step();
        b.step();
    }
    assert_eq!(arrivals(&a, 0), arrivals(&b, 0));
    assert_eq!(
        a.villages.keys().collect::<Vec<_>>(),
        b.villages.keys().collect::<Vec<_>>()
    );
}

#[test]
pub fn test_unsettleable_cells_stay_empty() {
    let landscape = Landscape::new(12, 12)
        .with_layer(
            "suitability",
            rows(12, 12, |x, _| if x == 8 { NO_DATA } else { 1. }),
        )
        .unwrap();
    let s = scenario(landscape, vec![breed("tupi", founder(Coords::new(4, 6), 3000))]);
    let mut model = SettlementModel::new(&s).unwrap();
    for _ in 0..30 {
        model.step();
    }
    for y in 0..12 {
        let c = Coords::new(8, y);
        assert_eq!(model.grid.owner(c), Some(Owner::Unsettleable));
        assert_eq!(model.grid.arrival_time(c, 0), None);
        assert_eq!(model.grid.settlement(c), None);
    }
}

#[test]
pub fn test_founding_failures() {
    let outside = scenario(flat(5, 5), vec![breed("tupi", founder(Coords::new(9, 2), 3000))]);
    assert!(matches!(
        SettlementModel::new(&outside),
        Err(Error::FoundingFailed { .. })
    ));

    let water = Landscape::new(5, 5)
        .with_layer(
            "suitability",
            rows(5, 5, |x, y| if (x, y) == (2, 2) { NO_DATA } else { 1. }),
        )
        .unwrap();
    let wet = scenario(water, vec![breed("tupi", founder(Coords::new(2, 2), 3000))]);
    match SettlementModel::new(&wet) {
        Err(Error::FoundingFailed { breed, coords, .. }) => {
            assert_eq!(breed, "tupi");
            assert_eq!(coords, Coords::new(2, 2));
        }
        other => panic!("expected a founding failure, got {:?}", other.map(|m| m.bp)),
    }

    let poor = Landscape::new(5, 5)
        .with_layer("suitability", rows(5, 5, |_, _| 0.2))
        .unwrap();
    let intolerable = scenario(poor, vec![breed("tupi", founder(Coords::new(2, 2), 3000))]);
    assert!(matches!(
        SettlementModel::new(&intolerable),
        Err(Error::FoundingFailed { .. })
    ));
}

#[test]
pub fn test_invalid_parameters_are_rejected() {
    let mut p = founder(Coords::new(2, 2), 3000);
    p.catchment = 0;
    let s = scenario(flat(5, 5), vec![breed("tupi", p)]);
    assert!(matches!(
        SettlementModel::new(&s),
        Err(Error::InvalidParameter { .. })
    ));
}

#[test]
pub fn test_later_founder_evicts_settlements_in_its_catchment() {
    let mut first = founder(Coords::new(5, 5), 3000);
    first.permanence = 1000;
    let mut second = founder(Coords::new(5, 5), 2990);
    second.permanence = 1000;
    let s = scenario(flat(11, 11), vec![breed("tupi", first), breed("arawak", second)]);
    let mut model = SettlementModel::new(&s).unwrap();
    assert!(!model.breeds[1].founded);
    for _ in 0..11 {
        model.step();
    }
    assert!(model.breeds[1].founded);
    assert!(!model.villages.contains_key(&1));
    let newcomer = model
        .villages
        .values()
        .find(|v| v.breed == 1 && v.coords == Coords::new(5, 5))
        .expect("the second founder");
    assert_eq!(model.grid.settlement(Coords::new(5, 5)), Some(newcomer.id));
    assert_eq!(model.grid.owner(Coords::new(5, 5)), Some(Owner::Village(newcomer.id)));
    assert_eq!(model.grid.arrival_time(Coords::new(5, 5), 1), Some(2990));
    assert_territories_consistent(&model);
}

#[test]
pub fn test_policy_variants_keep_territories_consistent() {
    let weightings = [LandWeighting::Count, LandWeighting::SuitabilityWeighted];
    let searches = [SearchShape::Disk, SearchShape::Ring];
    let caps = [Some(6), None];
    for (weighting, search, rival_cap, leap_requires_abandon, stranded) in
        iproduct!(weightings, searches, caps, [true, false], [true, false])
    {
        let mut p = founder(Coords::new(8, 8), 3000);
        p.leap_distance = 4;
        let mut s = scenario(patchy(16, 16), vec![breed("tupi", p)]);
        s.policy = Policy {
            land_weighting: weighting,
            fission_search: search,
            rival_cap,
            leap_requires_abandon,
            inactive_when_stranded: stranded,
            inactive_on_failed_fission: stranded,
            abandon_land_on_death: stranded,
        };
        let mut model = SettlementModel::new(&s).unwrap();
        for _ in 0..40 {
            model.step();
            assert_territories_consistent(&model);
            if weighting == LandWeighting::Count {
                for v in model.villages.values() {
                    assert_eq!(v.total_k, f64::from(v.p.k) * v.land.len() as f64);
                }
            }
        }
        assert!(model.villages.len() > 1, "{:?} never split", s.policy);
    }
}

#[test]
pub fn test_dead_villages_release_land_when_told_to() {
    let mut p = founder(Coords::new(0, 0), 3000);
    p.permanence = 1000;
    let mut s = scenario(flat(1, 1), vec![breed("tupi", p)]);
    s.policy.abandon_land_on_death = true;
    let mut model = SettlementModel::new(&s).unwrap();
    // A single cell cannot hold the founder, so it gives up at once.
    assert!(!model.villages[&1].active);
    model.step();
    assert!(model.villages.is_empty());
    assert_eq!(model.grid.owner(Coords::new(0, 0)), Some(Owner::Free));
    assert_eq!(model.grid.arrival_time(Coords::new(0, 0), 0), Some(3000));

    s.policy.abandon_land_on_death = false;
    let mut model = SettlementModel::new(&s).unwrap();
    model.step();
    assert!(model.villages.is_empty());
    assert_eq!(model.grid.owner(Coords::new(0, 0)), Some(Owner::Village(1)));
}

#[test]
pub fn test_run_stops_at_end_date_or_when_everyone_died() {
    let mut s = scenario(flat(9, 9), vec![breed("tupi", founder(Coords::new(4, 4), 3000))]);
    s.end_date = 2980;
    let mut model = SettlementModel::new(&s).unwrap();
    model.run(s.end_date, None, &ObservationSettings::default()).unwrap();
    assert_eq!(model.bp, 2980);

    let mut p = founder(Coords::new(0, 0), 3000);
    p.permanence = 1000;
    let lonely = scenario(flat(1, 1), vec![breed("tupi", p)]);
    let mut model = SettlementModel::new(&lonely).unwrap();
    model.run(0, None, &ObservationSettings::default()).unwrap();
    assert!(model.villages.is_empty());
    assert_eq!(model.bp, 2999);
}

#[test]
pub fn test_exhausted_time_budget_aborts_the_run() {
    let s = scenario(flat(9, 9), vec![breed("tupi", founder(Coords::new(4, 4), 3000))]);
    let mut model = SettlementModel::new(&s).unwrap();
    let result = model.run(0, Some(Duration::ZERO), &ObservationSettings::default());
    assert!(matches!(result, Err(Error::EvaluationTimeout { .. })));
}

#[test]
pub fn test_stored_state_resumes_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let s = scenario(flat(12, 12), vec![breed("tupi", founder(Coords::new(6, 6), 3000))]);
    let mut model = SettlementModel::new(&s).unwrap();
    for _ in 0..10 {
        model.step();
    }
    model.store_state(&path).unwrap();
    let mut back = SettlementModel::load_state(&path).unwrap();
    assert_eq!(back.bp, model.bp);
    assert_eq!(arrivals(&back, 0), arrivals(&model, 0));
    for _ in 0..10 {
        model.step();
        back.step();
    }
    assert_eq!(arrivals(&back, 0), arrivals(&model, 0));
    assert_eq!(
        back.villages.keys().collect::<Vec<_>>(),
        model.villages.keys().collect::<Vec<_>>()
    );
}

#[test]
pub fn test_eval_scores_dated_sites() {
    let mut tupi = breed("tupi", founder(Coords::new(2, 2), 3000));
    tupi.sites.insert(Coords::new(2, 2), vec![(3001, 0.1), (3000, 0.4)]);
    tupi.sites.insert(Coords::new(-5, -5), vec![(3000, 0.4)]);
    let undated = breed("arawak", founder(Coords::new(7, 7), 3000));
    let s = scenario(flat(10, 10), vec![tupi, undated]);
    let model = SettlementModel::new(&s).unwrap();
    assert_eq!(model.eval(), 0.5);
    assert_eq!(model.eval(), model.eval());
}

fn genome_layout() -> GenomeLayout {
    GenomeLayout {
        kinds: vec![
            GeneKind::CarryingCapacity,
            GeneKind::FissionThreshold,
            GeneKind::Catchment,
            GeneKind::NicheWeight,
            GeneKind::NicheWeight,
        ],
    }
}

fn settings() -> CalibrationSettings {
    CalibrationSettings {
        n_pop: 20,
        n_select: 8,
        n_elit: 2,
        max_it: 5,
        workers: 2,
        seed: 7,
        ..CalibrationSettings::default()
    }
}

#[test]
pub fn test_without_variation_genomes_are_only_copied() {
    let mut c = Calibrator::new(
        CalibrationSettings {
            p_cross: 0.,
            p_mut: 0.,
            ..settings()
        },
        &genome_layout(),
    )
    .unwrap();
    let initial = c.population.clone();
    let fitness = |g: &Genome| g.values().iter().sum::<f64>();
    c.evolve(&fitness, None).unwrap();
    assert_eq!(c.generation, 5);
    for g in &c.population {
        assert!(initial.iter().any(|i| i.genes == g.genes));
    }
}

#[test]
pub fn test_only_new_genomes_are_evaluated() {
    let calls = AtomicUsize::new(0);
    let counting = |g: &Genome| {
        calls.fetch_add(1, Ordering::SeqCst);
        g.values()[0]
    };
    let mut c = Calibrator::new(
        CalibrationSettings {
            p_mut: 1.,
            ..settings()
        },
        &genome_layout(),
    )
    .unwrap();
    c.evaluate(&counting);
    assert_eq!(calls.load(Ordering::SeqCst), 20);

    c.next_generation(&counting);
    assert_eq!(calls.load(Ordering::SeqCst), 20);
    let fresh = c.population.iter().filter(|g| g.fitness.is_none()).count();
    assert!(fresh <= 18);

    c.evaluate(&counting);
    assert_eq!(calls.load(Ordering::SeqCst), 20 + fresh);
    c.evaluate(&counting);
    assert_eq!(calls.load(Ordering::SeqCst), 20 + fresh);
}

fn dated_scenario() -> Scenario {
    let mut tupi = breed("tupi", founder(Coords::new(6, 6), 3000));
    tupi.founder.tolerance = 0.4;
    tupi.sites.insert(Coords::new(6, 6), vec![(3000, 0.2), (2999, 0.1)]);
    let mut s = scenario(flat(12, 12), vec![tupi]);
    s.end_date = 2990;
    s
}

#[test]
pub fn test_simulation_evaluator_scores_runs() {
    let evaluator = SimulationEvaluator::new(dated_scenario(), Duration::from_secs(60));
    assert_eq!(evaluator.layout.len(), 5);
    let c = Calibrator::new(settings(), &evaluator.layout).unwrap();
    for genome in c.population.iter().take(4) {
        assert_eq!(calibration::Evaluator::evaluate(&evaluator, genome), 1.0);
    }
}

#[test]
pub fn test_failed_runs_get_the_worst_fitness() {
    let evaluator = SimulationEvaluator::new(dated_scenario(), Duration::ZERO);
    let c = Calibrator::new(settings(), &evaluator.layout).unwrap();
    let genome = &c.population[0];
    assert_eq!(calibration::Evaluator::evaluate(&evaluator, genome), WORST_FITNESS);

    let mut elsewhere = dated_scenario();
    elsewhere.breeds[0].founder.origin = Coords::new(40, 40);
    let evaluator = SimulationEvaluator::new(elsewhere, Duration::from_secs(60));
    assert_eq!(calibration::Evaluator::evaluate(&evaluator, genome), WORST_FITNESS);
}
