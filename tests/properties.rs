mod common;

use backflow_guard::control::ControlParams;
use proptest::prelude::*;

use common::controller;

/// One raw reading: time step since the previous reading and the load.
#[derive(Debug, Clone, Copy)]
struct Reading {
    gap_s: f64,
    load_kw: f64,
}

fn reading() -> impl Strategy<Value = Reading> {
    let gap = prop_oneof![Just(0.05), Just(0.5), Just(1.0), Just(2.0), 0.1f64..15.0];
    let load = prop_oneof![
        8 => 0.001f64..150.0,
        1 => Just(-3.0),
        1 => Just(f64::NAN),
    ];
    (gap, load).prop_map(|(gap_s, load_kw)| Reading { gap_s, load_kw })
}

prop_compose! {
    fn params_strategy()(
        enable_dynamic_safety in any::<bool>(),
        adaptive_safety in any::<bool>(),
        use_safety_ceiling in prop::bool::weighted(0.8),
        s_down_max in prop::option::of(1.0f64..30.0),
        r_up in 0.5f64..20.0,
        r_down in 0.5f64..60.0,
        p_max in 10.0f64..200.0,
        local_window_size in 2usize..30,
    ) -> ControlParams {
        ControlParams {
            enable_dynamic_safety,
            adaptive_safety,
            use_safety_ceiling,
            s_down_max,
            r_up,
            r_down,
            p_max,
            local_window_size,
            ..ControlParams::default()
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn commands_respect_every_bound(
        params in params_strategy(),
        initial in 1.0f64..150.0,
        readings in prop::collection::vec(reading(), 1..80),
    ) {
        let mut ctrl = controller(params.clone(), initial);
        let mut time = 0.0;
        let mut prev_time: Option<f64> = None;

        for r in readings {
            time += r.gap_s;
            let prev = ctrl.last_command();
            let out = ctrl.compute_control(r.load_kw, time);

            prop_assert!(out.command >= 0.0);
            prop_assert!(out.command <= params.p_max + 1e-9);

            if !(r.load_kw.is_finite() && r.load_kw > 0.0) {
                prop_assert_eq!(out.command, 0.0);
                prop_assert!(out.safety_bypass);
                prop_assert_eq!(ctrl.last_command(), prev);
                continue;
            }

            let dt = prev_time.map_or(1.0, |p| time - p).clamp(0.1, 10.0);
            prev_time = Some(time);

            prop_assert!(out.command - prev <= params.r_up * dt + 1e-9);
            prop_assert!(out.predicted_lower_bound <= out.predicted_mean + 1e-9);

            if !out.safety_bypass {
                prop_assert!(out.command >= prev);
            }
            if out.emergency_drop {
                prop_assert!(out.command <= params.buffered(r.load_kw) + 1e-9);
            }
            if out.applied_ceiling < prev - 1e-6 {
                prop_assert!(out.safety_bypass);
                prop_assert_eq!(out.command, out.applied_ceiling.min(params.p_max).max(0.0));
            }
        }
    }

    #[test]
    fn runs_are_deterministic(
        params in params_strategy(),
        readings in prop::collection::vec(reading(), 1..40),
    ) {
        let mut a = controller(params.clone(), 40.0);
        let mut b = controller(params, 40.0);
        let mut time = 0.0;
        for r in readings {
            time += r.gap_s;
            let oa = a.compute_control(r.load_kw, time);
            let ob = b.compute_control(r.load_kw, time);
            prop_assert_eq!(oa, ob);
        }
    }
}
