use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use seirtools::config::*;
use seirtools::errors::*;
use seirtools::hierarchical::HierarchicalModel;
use seirtools::inference::*;
use seirtools::seir::SeirModel;
use seirtools::summary::*;
use seirtools::util::*;

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    match run() {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct InputData {
    model: ModelConfig,
    #[serde(default)]
    data: Option<HierarchicalData>,
    rng_seed: Option<u32>,
    #[serde(default = "default_num_samples")]
    num_samples: usize,
    #[serde(default)]
    num_sample_paths: usize,
    horizon: Option<usize>,
    #[serde(default = "default_fields")]
    fields: Vec<Field>,
}

fn default_num_samples() -> usize {
    500
}

fn default_fields() -> Vec<Field> {
    vec![Field::Confirmed, Field::C, Field::I]
}

#[derive(Debug, Serialize)]
struct OutputData {
    rng_seed: u32,
    num_samples: usize,
    regions: Vec<RegionSummary>,
}

fn prior_paths<M: GenerativeModel>(
    model: &M, num_samples: usize, rng: &mut Xoshiro256PlusPlus
) -> Result<Vec<Vec<ForecastPath>>> {
    let outputs = sample_prior(model, num_samples, rng)?;
    region_paths(model, &outputs)
}

fn run() -> Result<OutputData> {
    // Read config from file specified in first command-line argument or from stdin
    let args: Vec<String> = std::env::args().collect();
    let json_data = read_input(&args)?;
    let value: serde_json::Value = serde_json::from_str(&json_data)?;
    if let Some(model) = value.get("model") {
        check_compartment_model(model)?;
    }
    let input_data: InputData = serde_json::from_value(value)?;

    let rng_seed = input_data.rng_seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(rng_seed as u64);
    info!(rng_seed, num_samples = input_data.num_samples, "sampling prior predictive");

    // Only the hierarchical model needs data here: its region covariates
    let paths = match &input_data.model {
        ModelConfig::Stochastic(c) => {
            let model = SeirModel::new(c.clone(), SeirData::default());
            prior_paths(&model, input_data.num_samples, &mut rng)?
        },
        ModelConfig::Hierarchical(c) => {
            let data = input_data.data.clone().unwrap_or_default();
            let model = HierarchicalModel::new(
                c.clone(), HierarchicalData { confirmed: None, ..data }
            );
            prior_paths(&model, input_data.num_samples, &mut rng)?
        },
    };

    Ok(OutputData {
        rng_seed,
        num_samples: input_data.num_samples,
        regions: summarize_regions(
            &paths, &input_data.fields, input_data.horizon, input_data.num_sample_paths
        )?,
    })
}
