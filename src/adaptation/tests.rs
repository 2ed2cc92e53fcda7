use super::fuzzy::{FuzzyController, OUTPUT_FACTORS, defuzzify, output_factor, quantize_down};
use super::*;
use crate::config::{AdaptationConfig, AlgorithmKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::Instant;

fn observation(
    bytes_added: u64,
    transmit_time: Duration,
    occupancy: u64,
) -> TransmissionObservation {
    TransmissionObservation {
        now: Instant::now(),
        bytes_added,
        transmit_time,
        transport_occupancy: occupancy,
        queued_bytes: 0,
    }
}

fn config(algorithm: AlgorithmKind) -> AdaptationConfig {
    AdaptationConfig {
        algorithm,
        ..Default::default()
    }
}

#[test]
fn test_factory_builds_selected_algorithm() {
    assert!(build(&config(AlgorithmKind::None)).is_none());
    for (kind, name) in [
        (AlgorithmKind::Fuzzy, "fuzzy"),
        (AlgorithmKind::Google, "google"),
        (AlgorithmKind::Bola, "bola"),
        (AlgorithmKind::Mpc, "mpc"),
    ] {
        let algorithm = build(&config(kind)).unwrap();
        assert_eq!(algorithm.name(), name);
    }
}

#[test]
fn test_every_algorithm_answers_first_call_with_default() {
    let cfg = AdaptationConfig::default();
    for kind in [
        AlgorithmKind::Fuzzy,
        AlgorithmKind::Google,
        AlgorithmKind::Bola,
        AlgorithmKind::Mpc,
    ] {
        let mut algorithm = build(&config(kind)).unwrap();
        let rate = algorithm.observe_transmission(&observation(
            50_000,
            Duration::from_millis(10),
            1_000,
        ));
        assert_eq!(rate, cfg.default_rate, "{}", algorithm.name());
    }
}

#[test]
fn test_zero_transmit_time_falls_back_to_default() {
    let cfg = AdaptationConfig::default();
    for kind in [AlgorithmKind::Fuzzy, AlgorithmKind::Google] {
        let mut algorithm = build(&config(kind)).unwrap();
        algorithm.observe_transmission(&observation(10_000, Duration::from_millis(5), 0));
        let rate = algorithm.observe_transmission(&observation(0, Duration::ZERO, 0));
        assert_eq!(rate, cfg.default_rate, "{}", algorithm.name());
    }
}

#[test]
fn test_algorithms_are_deterministic() {
    let mut rng = StdRng::seed_from_u64(7);
    let observations: Vec<_> = (0..50)
        .map(|_| {
            observation(
                rng.random_range(1_000..200_000),
                Duration::from_micros(rng.random_range(0..20_000)),
                rng.random_range(0..8_000),
            )
        })
        .collect();

    for kind in [
        AlgorithmKind::Fuzzy,
        AlgorithmKind::Google,
        AlgorithmKind::Bola,
        AlgorithmKind::Mpc,
    ] {
        let mut a = build(&config(kind)).unwrap();
        let mut b = build(&config(kind)).unwrap();
        for obs in &observations {
            assert_eq!(a.observe_transmission(obs), b.observe_transmission(obs));
        }
    }
}

#[test]
fn test_fuzzy_factor_stays_within_output_levels() {
    let target = 2000.0;
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..10_000 {
        let occupancy = rng.random_range(0.0..10_000.0);
        let delta = rng.random_range(-10_000.0..10_000.0);
        let factor = output_factor(occupancy, delta, target).unwrap();
        assert!(
            (OUTPUT_FACTORS[0]..=OUTPUT_FACTORS[4]).contains(&factor),
            "factor {factor} at occupancy {occupancy}, delta {delta}"
        );
    }
}

#[test]
fn test_fuzzy_output_bounded_by_four_times_last_rate() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut controller = FuzzyController::new(&AdaptationConfig::default());
    controller.observe_transmission(&observation(1, Duration::from_millis(1), 0));
    for _ in 0..1_000 {
        let obs = observation(
            rng.random_range(1..100_000),
            Duration::from_micros(rng.random_range(1..50_000)),
            rng.random_range(0..10_000),
        );
        let last_rate = obs.last_rate().unwrap();
        let rate = controller.observe_transmission(&obs);
        assert!(rate <= last_rate.scale(4.0), "{rate} > 4 x {last_rate}");
    }
}

#[test]
fn test_fuzzy_target_occupancy_keeps_last_rate() {
    assert_eq!(output_factor(2000.0, 0.0, 2000.0), Some(1.0));

    let mut controller = FuzzyController::new(&AdaptationConfig::default());
    controller.observe_transmission(&observation(10_000, Duration::from_millis(10), 2000));
    let obs = observation(1_000_000, Duration::from_secs(1), 2000);
    let rate = controller.observe_transmission(&obs);
    assert_eq!(rate, obs.last_rate().unwrap());
    assert_eq!(rate, DataRate::from_mbps(8));
}

#[test]
fn test_fuzzy_extremes() {
    // Empty and draining fast: strongest increase.
    assert_eq!(output_factor(0.0, -5000.0, 2000.0), Some(4.0));
    // Full and filling: strongest decrease.
    assert_eq!(output_factor(5000.0, 5000.0, 2000.0), Some(0.25));
}

#[test]
fn test_defuzzify_without_activation() {
    assert_eq!(defuzzify([0.0; 5]), None);
    assert_eq!(defuzzify([f64::NAN, 0.0, 0.0, 0.0, 0.0]), None);
    assert_eq!(defuzzify([0.0, 0.0, 1.0, 0.0, 1.0]), Some(2.5));
}

#[test]
fn test_fuzzy_quantization_snaps_down_to_ladder() {
    let ladder: Vec<_> = [1_000, 2_000, 4_000]
        .into_iter()
        .map(DataRate::from_kbps)
        .collect();
    assert_eq!(
        quantize_down(&ladder, DataRate::from_kbps(3_999)),
        DataRate::from_kbps(2_000)
    );
    assert_eq!(
        quantize_down(&ladder, DataRate::from_kbps(9_000)),
        DataRate::from_kbps(4_000)
    );
    assert_eq!(
        quantize_down(&ladder, DataRate::from_kbps(10)),
        DataRate::from_kbps(1_000)
    );

    let cfg = AdaptationConfig {
        fuzzy_quantize: true,
        ..Default::default()
    };
    let mut controller = FuzzyController::new(&cfg);
    controller.observe_transmission(&observation(10_000, Duration::from_millis(10), 2000));
    // 8 Mbit/s at the target occupancy, quantized to the 6.408 Mbit/s step.
    let rate =
        controller.observe_transmission(&observation(1_000_000, Duration::from_secs(1), 2000));
    assert_eq!(rate, DataRate::from_bps(6_408_000));
}

#[test]
fn test_ewma_converges_to_safety_fraction() {
    let mut estimator = ewma::EwmaEstimator::new(&AdaptationConfig::default());
    // 100 kB over 100 ms: 8 Mbit/s.
    let steady = observation(100_000, Duration::from_millis(100), 0);
    let mut rate = DataRate::ZERO;
    for _ in 0..3_000 {
        rate = estimator.observe_transmission(&steady);
    }
    let expected = 0.95 * 8_000_000.0;
    assert!((rate.as_bps_f64() - expected).abs() / expected < 1e-3, "{rate}");
}

#[test]
fn test_ewma_falls_faster_than_it_recovers() {
    let mut estimator = ewma::EwmaEstimator::new(&AdaptationConfig::default());
    let high = observation(100_000, Duration::from_millis(100), 0);
    for _ in 0..3_000 {
        estimator.observe_transmission(&high);
    }
    let low = observation(25_000, Duration::from_millis(100), 0);
    let rate = estimator.observe_transmission(&low);
    let (slow, fast) = estimator.estimates();
    assert!(fast < slow);
    assert!((rate.as_bps_f64() - 0.95 * fast.as_bps_f64()).abs() <= 1.0);
}
