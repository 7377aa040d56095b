use std::path::Path;
use std::time::Instant;
use std::iter::FromIterator;

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use seirtools::config::*;
use seirtools::errors::*;
use seirtools::hierarchical::HierarchicalModel;
use seirtools::inference::*;
use seirtools::seir::SeirModel;
use seirtools::store;
use seirtools::summary::*;
use seirtools::util::*;

#[derive(Serialize, Deserialize)]
struct Config {
    place: Option<String>,
    model: ModelConfig,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    inference: InferenceConfig,
    #[serde(default = "default_fields")]
    fields: Vec<Field>,

    output_path: Option<String>,
    write_to_stdout: Option<bool>,
}

fn default_fields() -> Vec<Field> {
    vec![Field::Confirmed, Field::C, Field::I]
}

#[derive(Serialize)]
struct Output {
    place: Option<String>,
    rng_seed: u32,
    num_draws: usize,
    effective_sample_size: f64,
    log_marginal_likelihood: f64,
    regions: Vec<RegionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<serde_json::Value>,
}

fn parse_data<T: Default + serde::de::DeserializeOwned>(data: &serde_json::Value) -> Result<T> {
    if data.is_null() {
        Ok(T::default())
    }
    else {
        Ok(serde_json::from_value(data.clone())?)
    }
}

/// Fits `model` to its data, then forecasts `forecast_steps` past it from
/// every posterior draw.
fn fit<M: GenerativeModel>(
    model: &M, forecast_steps: usize, config: &InferenceConfig, rng: &mut Xoshiro256PlusPlus,
) -> Result<(Posterior, Vec<Vec<ForecastPath>>)> {
    let posterior = ImportanceSampler::from_config(config).run(model, rng)?;
    let outputs = forecast(model, &posterior.traces, forecast_steps, rng)?;
    let paths = region_paths(model, &outputs)?;
    Ok((posterior, paths))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    // Read JSON data from file specified in first command-line argument or from stdin
    let args: Vec<String> = std::env::args().collect();
    let json_data = read_input(&args)?;
    let value: serde_json::Value = serde_json::from_str(&json_data)?;
    if let Some(model) = value.get("model") {
        check_compartment_model(model)?;
    }
    let config: Config = serde_json::from_value(value)?;

    // If we were given a config file, use its parent as our working directory
    if args.len() > 1 {
        if let Some(parent) = Path::new(&args[1]).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::env::set_current_dir(parent)?;
        }
    }

    // Write to DB file specified in config file
    // (or use in-memory database if not specified)
    let mut db_connection = store::open_output(config.output_path.as_deref())?;

    let rng_seed = config.inference.rng_seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(rng_seed as u64);
    let forecast_steps = config.model.forecast_steps();
    info!(rng_seed, place = ?config.place, num_steps = config.model.num_steps(), forecast_steps, "fitting");

    let start = Instant::now();
    let (posterior, paths) = match &config.model {
        ModelConfig::Stochastic(c) => {
            let model = SeirModel::new(
                SeirConfig { forecast_steps: 0, ..c.clone() }, parse_data(&config.data)?
            );
            fit(&model, forecast_steps, &config.inference, &mut rng)?
        },
        ModelConfig::Hierarchical(c) => {
            let model = HierarchicalModel::new(
                HierarchicalConfig { forecast_steps: 0, ..c.clone() }, parse_data(&config.data)?
            );
            fit(&model, forecast_steps, &config.inference, &mut rng)?
        },
    };
    info!(elapsed_s = start.elapsed().as_secs_f64(), "done");

    let regions = summarize_regions(
        &paths, &config.fields, config.inference.horizon, config.inference.num_sample_paths
    )?;

    {
        let db_transaction = db_connection.transaction()?;
        store::create_tables(&db_transaction)?;
        store::write_meta(&db_transaction, "rng_seed", rng_seed)?;
        store::write_meta(&db_transaction, "place", config.place.clone())?;
        store::write_meta(&db_transaction, "model", serde_json::to_string(&config.model)?)?;
        store::write_meta(&db_transaction, "effective_sample_size", posterior.effective_sample_size)?;
        store::write_traces(&db_transaction, &posterior.traces)?;
        db_transaction.commit()?;
    }
    if let Some(output_path) = &config.output_path {
        info!(path = %output_path, num_traces = posterior.traces.len(), "wrote posterior traces");
    }

    let database = if config.write_to_stdout.unwrap_or(false) {
        info!("Writing DB to stdout in JSON format...");
        let tables = store::TABLES.iter().map(|(table_name, col_names)| -> Result<(String, serde_json::Value)> {
            Ok((
                String::from(*table_name),
                db_table_to_json_object(&db_connection, table_name, col_names)?
            ))
        }).collect::<Result<Vec<_>>>()?;
        Some(serde_json::Value::Object(serde_json::Map::from_iter(tables)))
    }
    else {
        None
    };

    let output = Output {
        place: config.place,
        rng_seed,
        num_draws: config.inference.num_draws,
        effective_sample_size: posterior.effective_sample_size,
        log_marginal_likelihood: posterior.log_marginal_likelihood,
        regions,
        database,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
