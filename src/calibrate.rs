use ::argparse::{ArgumentParser, Store, StoreOption};
use model::argparse::{bind_calibration, init_logging, PolicyOverrides};
use model::calibration::{CalibrationSettings, Calibrator, SimulationEvaluator};
use model::input::Scenario;
use model::YearsBP;
use std::path::Path;
use std::time::Duration;
use tracing::info;

fn main() -> Result<(), String> {
    let mut scenario_file = String::new();
    let mut checkpoint = "calibration.bin".to_string();
    let mut best_file = "best.json".to_string();
    let mut end_date: Option<YearsBP> = None;
    let mut settings = CalibrationSettings::default();
    let mut policy = PolicyOverrides::default();
    {
        let mut parser = ArgumentParser::new();
        parser.set_description("Calibrate a village dispersal scenario against dated sites");
        parser
            .refer(&mut scenario_file)
            .add_option(&["--scenario"], Store, "scenario file (JSON, or bincode ending in .bin)")
            .required();
        parser.refer(&mut checkpoint).add_option(
            &["--checkpoint"],
            Store,
            "file to checkpoint the calibration to",
        );
        parser.refer(&mut best_file).add_option(
            &["--best"],
            Store,
            "file to write the scenario with the best parameters to",
        );
        parser.refer(&mut end_date).add_option(
            &["--end-date"],
            StoreOption,
            "date (years BP) at which every model run stops",
        );
        bind_calibration(&mut parser, &mut settings);
        policy.bind(&mut parser);
        parser.parse_args_or_exit();
    }
    init_logging();

    let mut scenario = Scenario::load(&scenario_file).map_err(|e| e.to_string())?;
    policy.apply(&mut scenario.policy);
    if let Some(e) = end_date {
        scenario.end_date = e;
    }
    let evaluator = SimulationEvaluator::new(scenario, Duration::from_secs(settings.time_budget));
    info!(
        genes = evaluator.layout.len(),
        population = settings.n_pop,
        generations = settings.max_it,
        "calibrating"
    );

    let mut calibrator = Calibrator::new(settings, &evaluator.layout).map_err(|e| e.to_string())?;
    calibrator
        .evolve(&evaluator, Some(Path::new(&checkpoint)))
        .map_err(|e| e.to_string())?;
    calibrator.save(&checkpoint).map_err(|e| e.to_string())?;

    if let Some(best) = calibrator.best() {
        let scenario = evaluator
            .layout
            .apply(best, &evaluator.scenario)
            .map_err(|e| e.to_string())?;
        scenario.save(&best_file).map_err(|e| e.to_string())?;
    }
    Ok(())
}
