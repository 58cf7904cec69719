use std::sync::Arc;
use std::time::Duration;

use backflow::settings::BackPressureSettings;
use backflow::{
    BackPressureConfig, BackPressureStrategy, ManualTimeSource, RateBasedBackPressure,
};
use proptest::prelude::*;

fn controller(
    high: f64,
    low: f64,
    factor: f64,
    window_ms: u64,
) -> (RateBasedBackPressure, ManualTimeSource) {
    let time = ManualTimeSource::default();
    let settings = BackPressureSettings {
        high_ratio: high,
        low_ratio: low,
        factor,
        window_ms,
    };
    let controller = RateBasedBackPressure::new(
        &settings.to_params(),
        Arc::new(time.clone()),
        settings.window(),
    )
    .unwrap();
    (controller, time)
}

proptest! {
    #[test]
    fn test_valid_configurations_construct(
        low in 0.001f64..0.99,
        gap in 0.001f64..1.0,
        factor in 1.0f64..100.0,
    ) {
        let high = (low + gap).min(1.0);
        prop_assume!(high > low);
        prop_assert!(BackPressureConfig::new(high, low, factor).is_ok());
    }

    #[test]
    fn test_invalid_configurations_fail(
        high in -2.0f64..3.0,
        low in -2.0f64..3.0,
        factor in -5.0f64..5.0,
    ) {
        let valid = high > 0.0 && high <= 1.0
            && low > 0.0 && low <= 1.0
            && high > low
            && factor >= 1.0;
        prop_assert_eq!(BackPressureConfig::new(high, low, factor).is_ok(), valid);
    }

    #[test]
    fn test_rate_is_never_negative(
        windows in prop::collection::vec((0u64..500, 0u64..500), 1..20),
    ) {
        let (strategy, time) = controller(0.9, 0.1, 5.0, 1000);
        let state = strategy.new_state("peer".into());
        for (incoming, outgoing) in windows {
            state.record_incoming(incoming);
            state.record_outgoing(outgoing);
            time.advance(Duration::from_millis(1000));
            strategy.apply(&state);
            let rate = state.current_rate();
            prop_assert!(rate >= 0.0);
            prop_assert!(!rate.is_nan());
        }
    }

    #[test]
    fn test_apply_inside_window_is_a_no_op(
        incoming in 0u64..1000,
        outgoing in 0u64..1000,
        offset in 0u64..1000,
    ) {
        let (strategy, time) = controller(0.9, 0.1, 10.0, 1000);
        let state = strategy.new_state("peer".into());
        state.record_incoming(incoming);
        state.record_outgoing(outgoing);
        time.advance(Duration::from_millis(1000));
        strategy.apply(&state);

        let rate = state.current_rate();
        let overloaded = state.is_overloaded();
        let last = state.last_decision();

        state.record_outgoing(outgoing + 1);
        time.advance(Duration::from_millis(offset.min(999)));
        strategy.apply(&state);

        prop_assert_eq!(state.current_rate().to_bits(), rate.to_bits());
        prop_assert_eq!(state.is_overloaded(), overloaded);
        prop_assert_eq!(state.last_decision(), last);
    }

    #[test]
    fn test_growth_is_bounded_by_factor(
        start_in in 1u64..100,
        factor in 1.0f64..20.0,
    ) {
        let (strategy, time) = controller(0.9, 0.1, factor, 1000);
        let state = strategy.new_state("peer".into());
        // force a finite rate: ratio 0.5
        state.record_incoming(start_in);
        state.record_outgoing(start_in * 2);
        time.advance(Duration::from_millis(1000));
        strategy.apply(&state);
        let before = state.current_rate();

        // healthy window well above the limiter
        state.record_incoming(10_000);
        state.record_outgoing(10_000);
        time.advance(Duration::from_millis(1000));
        strategy.apply(&state);
        let after = state.current_rate();

        prop_assert!(after > before);
        prop_assert!(after <= before + before / factor + 1e-9);
    }
}
