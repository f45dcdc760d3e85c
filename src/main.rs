use std::env;

use burn::backend::NdArray;
use dotenv::dotenv;
use hdqn::{
    BlankEnvironment, Environment, HistoryBuffer, Policy, PolicySpec, QNetwork, SkillRunner,
    WeightStore,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

type InferenceBackend = NdArray;

fn get_env_var_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|val| val.parse::<usize>().ok())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hdqn=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let spec_path =
        env::var("HDQN_POLICY").expect("HDQN_POLICY environment variable is required");
    let store = env::var("HDQN_WEIGHTS_DIR")
        .map(WeightStore::new)
        .unwrap_or_default();
    let steps = get_env_var_usize("HDQN_STEPS").unwrap_or(10);

    let spec = PolicySpec::from_file(&spec_path)?;
    tracing::info!(
        "Policy {}: {} native actions, {} sub-models, weights from {}",
        spec_path,
        spec.actions.len(),
        spec.sub_models.len(),
        store.dir().display()
    );

    let device = Default::default();
    let mut policy =
        Policy::<InferenceBackend, QNetwork<InferenceBackend>>::from_spec(&spec, &device)?;
    policy.load_spec_weights(&spec, &store)?;

    let [height, width] = spec.resolution;
    let mut environment = BlankEnvironment::new(height, width);
    let mut history = HistoryBuffer::new(policy.nb_frames());
    let perception = policy.perception();
    let mut runner = SkillRunner::new(policy);

    for tick in 0..steps {
        history.push(environment.processed_state(perception))?;
        let action = runner.step(&mut environment, &history)?;
        tracing::info!("Tick {}: action {} (skill {:?})", tick, action, runner.active_skill());
    }

    Ok(())
}
