use ::argparse::{ArgumentParser, Store, StoreOption};
use model::argparse::{bind_observation, init_logging, ParameterOverrides, PolicyOverrides};
use model::input::Scenario;
use model::observation::{self, ObservationSettings};
use model::{SettlementModel, YearsBP};
use tracing::info;

fn main() -> Result<(), String> {
    let mut scenario_file = String::new();
    let mut breed: Option<String> = None;
    let mut end_date: Option<YearsBP> = None;
    let mut output = "arrivals".to_string();
    let mut parameters = ParameterOverrides::default();
    let mut policy = PolicyOverrides::default();
    let mut o = ObservationSettings {
        log_every: 100,
        ..ObservationSettings::default()
    };
    {
        let mut parser = ArgumentParser::new();
        parser.set_description("Run a village dispersal simulation");
        parser
            .refer(&mut scenario_file)
            .add_option(&["--scenario"], Store, "scenario file (JSON, or bincode ending in .bin)")
            .required();
        parser.refer(&mut breed).add_option(
            &["--breed"],
            StoreOption,
            "apply the parameters given here only to this breed",
        );
        parser.refer(&mut end_date).add_option(
            &["--end-date"],
            StoreOption,
            "date (years BP) at which to stop",
        );
        parser.refer(&mut output).add_option(
            &["--output"],
            Store,
            "stem of the CSV files to write arrival dates and site scores to",
        );
        parameters.bind(&mut parser);
        policy.bind(&mut parser);
        bind_observation(&mut parser, &mut o);
        parser.parse_args_or_exit();
    }
    init_logging();

    let mut scenario = Scenario::load(&scenario_file).map_err(|e| e.to_string())?;
    let mut matched = false;
    for b in scenario.breeds.iter_mut() {
        if breed.as_ref().map_or(true, |name| name == &b.name) {
            parameters.apply(&mut b.founder);
            matched = true;
        }
    }
    if let (Some(name), false) = (&breed, matched) {
        return Err(format!("No breed named {} in {}", name, scenario_file));
    }
    policy.apply(&mut scenario.policy);
    if let Some(e) = end_date {
        scenario.end_date = e;
    }

    let mut model = SettlementModel::new(&scenario).map_err(|e| e.to_string())?;
    info!(
        breeds = model.breeds.len(),
        from = model.bp,
        to = scenario.end_date,
        "starting"
    );
    model
        .run(scenario.end_date, None, &o)
        .map_err(|e| e.to_string())?;
    info!(fitness = model.eval(), villages = model.villages.len(), "finished");

    observation::write(&model, &scenario.transform, &output).map_err(|e| e.to_string())?;
    Ok(())
}
