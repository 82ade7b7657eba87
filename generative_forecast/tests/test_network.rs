use generative_forecast::error::ForecastError;
use generative_forecast::network::{
    initialize_network, DenseLayer, InputPerturbation, Network, NetworkParams,
};
use generative_forecast::normalization::NormalizationBoundary;
use ndarray::{array, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn params(io_dim: usize) -> NetworkParams {
    NetworkParams {
        io_dim,
        layer_width: 8,
        max_history: 50,
        initial_lr: 0.25,
        lr_multiplier: 1.0,
        io_noise: 0.04,
        lookback_beam_width: 3,
        future_beam_width: 2,
    }
}

fn headers(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("v{}", i)).collect()
}

fn boundaries(n: usize) -> Vec<NormalizationBoundary> {
    vec![NormalizationBoundary::new(0.0, 1.0).unwrap(); n]
}

#[test]
fn test_initialize_network() {
    let mut rng = StdRng::seed_from_u64(1);
    let (network, state) = initialize_network(&params(2), headers(2), &mut rng).unwrap();

    let config = network.config();
    assert_eq!(config.io_dim, 2);
    assert_eq!(config.layer_width, 8);
    assert_eq!(config.input_width(), 6);
    assert!(!network.is_initialized());
    assert!(network.is_finite());

    assert_eq!(state.prime_lr, 0.25);
    assert_eq!(state.io_width, 2);
    assert_eq!(state.max_history, 50);
    assert_eq!(state.history_len(), 0);
    assert!(!state.has_boundaries());
    assert_eq!(state.training_sessions, 0);
}

#[test]
fn test_initialize_network_rejects_bad_params() {
    let mut rng = StdRng::seed_from_u64(1);
    assert!(matches!(
        initialize_network(&params(2), headers(3), &mut rng),
        Err(ForecastError::InvalidConfig { .. })
    ));

    let mut zero_width = params(1);
    zero_width.layer_width = 0;
    assert!(initialize_network(&zero_width, headers(1), &mut rng).is_err());

    let mut short_history = params(1);
    short_history.max_history = 4;
    assert!(initialize_network(&short_history, headers(1), &mut rng).is_err());

    let mut no_lookback = params(1);
    no_lookback.lookback_beam_width = 0;
    assert!(initialize_network(&no_lookback, headers(1), &mut rng).is_err());
}

#[test]
fn test_initialize_meta_only_once() {
    let mut rng = StdRng::seed_from_u64(2);
    let (mut network, _) = initialize_network(&params(1), headers(1), &mut rng).unwrap();

    network.initialize_meta(42, &boundaries(1)).unwrap();
    assert!(network.is_initialized());
    assert_eq!(network.meta().unwrap().num_examples, 42);

    assert!(matches!(
        network.initialize_meta(42, &boundaries(1)),
        Err(ForecastError::AlreadyInitialized)
    ));
}

#[test]
fn test_initialize_meta_checks_boundary_count() {
    let mut rng = StdRng::seed_from_u64(2);
    let (mut network, _) = initialize_network(&params(2), headers(2), &mut rng).unwrap();
    assert!(network.initialize_meta(1, &boundaries(1)).is_err());
    assert!(!network.is_initialized());
}

#[test]
fn test_generate_shape_and_determinism() {
    let mut rng = StdRng::seed_from_u64(3);
    let (network, _) = initialize_network(&params(2), headers(2), &mut rng).unwrap();
    let seed = array![[0.1, -0.1], [0.2, -0.2], [0.3, -0.3]];
    let perturbation = InputPerturbation::noise_only(0.05).unwrap();

    let first = network
        .generate(seed.view(), 7, &perturbation, &mut StdRng::seed_from_u64(9))
        .unwrap();
    let second = network
        .generate(seed.view(), 7, &perturbation, &mut StdRng::seed_from_u64(9))
        .unwrap();
    let other = network
        .generate(seed.view(), 7, &perturbation, &mut StdRng::seed_from_u64(10))
        .unwrap();

    assert_eq!(first.shape(), &[7, 2]);
    assert_eq!(first, second);
    assert_ne!(first, other);
}

#[test]
fn test_generate_first_row_matches_step() {
    let mut rng = StdRng::seed_from_u64(4);
    let (network, _) = initialize_network(&params(1), headers(1), &mut rng).unwrap();
    let seed = array![[0.0], [0.5], [1.0]];
    let quiet = InputPerturbation::none();

    let generated = network.generate(seed.view(), 3, &quiet, &mut rng).unwrap();
    let step = network.step(seed.view(), &quiet, &mut rng).unwrap();
    assert_eq!(generated.row(0), step);
}

#[test]
fn test_step_validates_window() {
    let mut rng = StdRng::seed_from_u64(5);
    let (network, _) = initialize_network(&params(2), headers(2), &mut rng).unwrap();
    let quiet = InputPerturbation::none();

    let short = Array2::zeros((2, 2));
    assert!(matches!(
        network.step(short.view(), &quiet, &mut rng),
        Err(ForecastError::InsufficientData { .. })
    ));

    let narrow = Array2::zeros((3, 1));
    assert!(matches!(
        network.step(narrow.view(), &quiet, &mut rng),
        Err(ForecastError::InvalidConfig { .. })
    ));
}

#[test]
fn test_from_parts_detects_shape_mismatch() {
    let mut rng = StdRng::seed_from_u64(6);
    let (network, _) = initialize_network(&params(1), headers(1), &mut rng).unwrap();
    let config = *network.config();

    let wrong_hidden = DenseLayer::new(5, config.layer_width, 1.0, &mut rng).unwrap();
    let output = DenseLayer::new(config.layer_width, config.io_dim, 0.1, &mut rng).unwrap();
    assert!(matches!(
        Network::from_parts(config, wrong_hidden, output, None),
        Err(ForecastError::CorruptCheckpoint(_))
    ));

    let hidden = DenseLayer::new(config.input_width(), config.layer_width, 1.0, &mut rng).unwrap();
    let output = DenseLayer::new(config.layer_width, config.io_dim, 0.1, &mut rng).unwrap();
    let rebuilt = Network::from_parts(config, hidden, output, None).unwrap();
    assert!(rebuilt.validate_architecture().is_ok());
}
