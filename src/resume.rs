use ::argparse::{ArgumentParser, Store, StoreOption};
use model::argparse::init_logging;
use model::calibration::{Calibrator, SimulationEvaluator};
use model::input::Scenario;
use std::path::Path;
use std::time::Duration;
use tracing::info;

fn main() -> Result<(), String> {
    let mut resume_from = "calibration.bin".to_string();
    let mut checkpoint: Option<String> = None;
    let mut scenario_file = String::new();
    let mut generations: Option<usize> = None;
    let mut workers: Option<usize> = None;
    {
        let mut parser = ArgumentParser::new();
        parser.set_description("Resume a calibration from a checkpoint");
        parser.refer(&mut resume_from).add_option(
            &["--resume-from"],
            Store,
            "checkpoint to read the calibration from",
        );
        parser.refer(&mut checkpoint).add_option(
            &["--checkpoint"],
            StoreOption,
            "file to write further checkpoints to (default: the one resumed from)",
        );
        parser
            .refer(&mut scenario_file)
            .add_option(&["--scenario"], Store, "the scenario being calibrated")
            .required();
        parser.refer(&mut generations).add_option(
            &["--generations"],
            StoreOption,
            "total number of generations to finish the calibration at",
        );
        parser.refer(&mut workers).add_option(
            &["--workers"],
            StoreOption,
            "parallel model runs",
        );
        parser.parse_args_or_exit();
    }
    init_logging();

    let mut calibrator = Calibrator::load(&resume_from).map_err(|e| e.to_string())?;
    if let Some(g) = generations {
        calibrator.settings.max_it = g;
    }
    if let Some(w) = workers {
        calibrator.settings.workers = w;
    }
    calibrator.settings.validate().map_err(|e| e.to_string())?;

    let scenario = Scenario::load(&scenario_file).map_err(|e| e.to_string())?;
    let evaluator = SimulationEvaluator::new(
        scenario,
        Duration::from_secs(calibrator.settings.time_budget),
    );
    if !calibrator.population.iter().all(|g| evaluator.layout.fits(g)) {
        return Err(format!(
            "Checkpoint {} does not belong to scenario {}",
            resume_from, scenario_file
        ));
    }
    info!(
        generation = calibrator.generation,
        until = calibrator.settings.max_it,
        "resuming"
    );

    let checkpoint = checkpoint.unwrap_or_else(|| resume_from.clone());
    calibrator
        .evolve(&evaluator, Some(Path::new(&checkpoint)))
        .map_err(|e| e.to_string())?;
    calibrator.save(&checkpoint).map_err(|e| e.to_string())
}
