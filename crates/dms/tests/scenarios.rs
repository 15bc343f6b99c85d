//! End-to-end driving scenarios through the fatigue engine

use dms::{
    AlarmLevel, CalibrationCoupling, CalibrationError, CalibrationStatus, DefenseFlags, DmsConfig,
    DmsError, FatigueEngine, FrameInput, StrategyMode, Thresholds,
};
use feature_engine::landmarks::indices;
use feature_engine::{FrameDims, GeometryError, Landmark, LandmarkFrame, Orientation};
use proptest::prelude::*;

const OPEN: f64 = 0.35;
const CLOSED: f64 = 0.05;

fn dims() -> FrameDims {
    FrameDims::new(1280.0, 720.0)
}

fn face(ts: u64, ear: f64) -> FrameInput {
    FrameInput::new(ts, Some(LandmarkFrame::frontal_face(ear, dims())), dims())
}

fn no_face(ts: u64) -> FrameInput {
    FrameInput::new(ts, None, dims())
}

/// Engine without pose compensation so openness equals the synthetic EAR
fn plain_config() -> DmsConfig {
    let mut config = DmsConfig::default();
    config.defense.pose_compensation = false;
    config
}

fn engine() -> FatigueEngine {
    FatigueEngine::new(plain_config()).unwrap()
}

/// Feed `count` frames of constant openness every `step_ms`, starting at `start_ms`.
/// Returns the timestamp after the last frame.
fn drive(engine: &mut FatigueEngine, start_ms: u64, step_ms: u64, count: u64, ear: f64) -> u64 {
    for i in 0..count {
        engine.process(face(start_ms + i * step_ms, ear)).unwrap();
    }
    start_ms + count * step_ms
}

#[test]
fn test_calibration_through_engine() {
    let mut engine = engine();
    engine.start_calibration().unwrap();
    assert_eq!(engine.calibration_status(), CalibrationStatus::Pending);

    let mut report = None;
    for frame in 0..=300u64 {
        let event = engine.process(face(5_000 + frame * 1000 / 30, 0.30)).unwrap();
        if let Some(result) = event.calibration_result {
            assert_eq!(event.calibration, CalibrationStatus::Idle);
            report = Some(result.unwrap());
            break;
        }
        assert!(matches!(
            event.calibration,
            CalibrationStatus::Collecting { .. }
        ));
    }

    let report = report.expect("calibration did not complete");
    let t = engine.thresholds();
    assert_eq!(report.thresholds, t);
    assert!((t.baseline - 0.30).abs() < 1e-9);
    assert!((t.warn_threshold - 0.255).abs() < 1e-9);
    assert!((t.crit_threshold - 0.15).abs() < 1e-9);
    assert!(report.stats.count >= 30);
}

#[test]
fn test_paused_coupling_freezes_fatigue() {
    let mut engine = engine();
    engine.start_calibration().unwrap();
    drive(&mut engine, 0, 50, 60, CLOSED);

    let state = engine.fatigue_state();
    assert_eq!(state.closed_seconds, 0.0);
    assert_eq!(state.window_len, 0);
    assert_eq!(engine.alarm_level(), AlarmLevel::Safe);
}

#[test]
fn test_shadow_coupling_keeps_tracking() {
    let mut config = plain_config();
    config.calibration_coupling = CalibrationCoupling::Shadow;
    let mut engine = FatigueEngine::new(config).unwrap();

    engine.start_calibration().unwrap();
    drive(&mut engine, 0, 50, 60, CLOSED);

    assert!(engine.fatigue_state().closed_seconds > 2.0);
    assert_eq!(engine.alarm_level(), AlarmLevel::Critical);
    assert!(engine.calibration_status() != CalibrationStatus::Idle);
}

#[test]
fn test_failed_calibration_keeps_thresholds() {
    let mut engine = engine();
    let before = engine.thresholds();
    engine.start_calibration().unwrap();

    // Driver with eyes nearly shut the whole session
    let mut outcome = None;
    for frame in 0..=200u64 {
        let event = engine.process(face(frame * 50, CLOSED)).unwrap();
        if event.calibration_result.is_some() {
            outcome = event.calibration_result;
            break;
        }
    }

    assert!(matches!(
        outcome,
        Some(Err(CalibrationError::ImplausibleBaseline { .. }))
    ));
    assert_eq!(engine.thresholds(), before);
}

#[test]
fn test_calibration_completes_without_face() {
    let mut engine = engine();
    engine.start_calibration().unwrap();

    let mut outcome = None;
    for frame in 0..=80u64 {
        let event = engine.process(no_face(frame * 100)).unwrap();
        if event.calibration_result.is_some() {
            outcome = event.calibration_result;
            break;
        }
    }
    assert_eq!(
        outcome,
        Some(Err(CalibrationError::InsufficientSamples {
            got: 0,
            required: 30
        }))
    );
    assert_eq!(engine.calibration_status(), CalibrationStatus::Idle);
}

#[test]
fn test_orientation_changes_openness() {
    let mut landscape = engine();
    let mut portrait = engine();

    let frame = face(0, 0.30);
    let a = landscape.process(frame.clone()).unwrap();
    let b = portrait
        .process(frame.with_orientation(Orientation::Portrait))
        .unwrap();

    let a = a.avg_openness.unwrap();
    let b = b.avg_openness.unwrap();
    assert!((a - 0.30).abs() < 1e-9);
    assert!((a - b).abs() > 1e-3);
}

#[test]
fn test_closure_timing_independent_of_frame_rate() {
    for step_ms in [20u64, 50, 100] {
        let mut engine = engine();
        // 1.5s of closure: closed = 3.0s at critical rate
        let frames = 1_500 / step_ms + 1;
        drive(&mut engine, 0, step_ms, frames, CLOSED);
        let closed = engine.fatigue_state().closed_seconds;
        assert!((closed - 3.0).abs() < 1e-9, "{}ms frames gave {}", step_ms, closed);
    }
}

#[test]
fn test_stream_gap_is_capped() {
    let mut engine = engine();
    engine.process(face(0, CLOSED)).unwrap();
    // Ten-second stall integrates as at most one second
    engine.process(face(10_000, CLOSED)).unwrap();
    assert!((engine.fatigue_state().closed_seconds - 2.0).abs() < 1e-12);
}

#[test]
fn test_strategy_escalates_and_recovers() {
    let mut engine = engine();

    let ts = drive(&mut engine, 0, 50, 40, CLOSED);
    assert_eq!(engine.strategy_mode(), StrategyMode::Aggressive);
    let active = engine.active_thresholds();
    let base = engine.thresholds();
    assert!(active.warn_threshold > base.warn_threshold);
    assert!(active.warn_threshold <= base.baseline);

    // Flush closure and PERCLOS, then recovery still needs 15s
    let ts = drive(&mut engine, ts, 50, 200, OPEN);
    assert_eq!(engine.strategy_mode(), StrategyMode::Aggressive);

    // One slow blink breaks the recovery streak
    let ts = drive(&mut engine, ts, 50, 1, CLOSED);
    let ts = drive(&mut engine, ts, 50, 250, OPEN);
    assert_eq!(engine.strategy_mode(), StrategyMode::Aggressive);

    drive(&mut engine, ts, 50, 100, OPEN);
    assert_eq!(engine.strategy_mode(), StrategyMode::Conservative);
    assert_eq!(engine.active_thresholds(), engine.thresholds());
}

#[test]
fn test_dual_calibration_off_keeps_base_thresholds() {
    let mut engine = engine();
    engine.set_defense_flags(DefenseFlags {
        pose_compensation: false,
        iris_correction: false,
        dual_calibration: false,
    });
    drive(&mut engine, 0, 50, 40, CLOSED);
    assert_eq!(engine.strategy_mode(), StrategyMode::Aggressive);
    assert_eq!(engine.active_thresholds(), engine.thresholds());
}

#[test]
fn test_critical_edge_once_per_excursion() {
    let mut engine = engine();
    let mut edges = Vec::new();

    let mut ts = 0;
    for _ in 0..2 {
        for _ in 0..60 {
            let event = engine.process(face(ts, CLOSED)).unwrap();
            if event.critical_edge_fired {
                edges.push(ts);
            }
            ts += 50;
        }
        // Long open spell drains closure and PERCLOS back to safe
        for _ in 0..300 {
            engine.process(face(ts, OPEN)).unwrap();
            ts += 50;
        }
        assert_eq!(engine.alarm_level(), AlarmLevel::Safe);
    }

    assert_eq!(edges.len(), 2);
    assert_eq!(engine.critical_count(), 2);
}

#[test]
fn test_invalid_frame_leaves_state_untouched() {
    let mut engine = engine();
    // 11 frames at 100ms: 1.0s integrated at the critical rate
    drive(&mut engine, 0, 100, 11, CLOSED);
    let before = engine.fatigue_state();
    assert!((before.closed_seconds - 2.0).abs() < 1e-9);

    let mut broken = LandmarkFrame::frontal_face(CLOSED, dims());
    broken.points[indices::NOSE_TIP].x = f64::NAN;
    let result = engine.process(FrameInput::new(5_000, Some(broken), dims()));
    assert!(matches!(result, Err(DmsError::InvalidFrame(_))));
    assert_eq!(engine.fatigue_state(), before);

    // Clock was not advanced by the rejected frame
    engine.process(face(1_100, CLOSED)).unwrap();
    assert!((engine.fatigue_state().closed_seconds - 2.2).abs() < 1e-9);
}

#[test]
fn test_invalid_dimensions_rejected() {
    let mut engine = engine();
    let input = FrameInput::new(
        0,
        Some(LandmarkFrame::frontal_face(OPEN, dims())),
        FrameDims::new(0.0, 720.0),
    );
    assert!(matches!(
        engine.process(input),
        Err(DmsError::InvalidFrame(_))
    ));
}

fn collapsed_eye(ear: f64) -> LandmarkFrame {
    let mut frame = LandmarkFrame::frontal_face(ear, dims());
    let [p1, _, _, p4, _, _] = indices::LEFT_EYE;
    frame.points[p4] = frame.points[p1];
    frame
}

#[test]
fn test_degenerate_geometry_reuses_previous() {
    let mut engine = engine();

    let first = engine.process(FrameInput::new(0, Some(collapsed_eye(OPEN)), dims()));
    assert_eq!(
        first.unwrap_err(),
        DmsError::Geometry(GeometryError::DegenerateGeometry)
    );

    let good = engine.process(face(33, 0.28)).unwrap();
    let event = engine
        .process(FrameInput::new(66, Some(collapsed_eye(OPEN)), dims()))
        .unwrap();
    let metrics = event.metrics.unwrap();
    assert!(metrics.substituted);
    assert_eq!(metrics.avg_openness, good.avg_openness.unwrap());
    assert!(metrics.avg_openness.is_finite());
}

#[test]
fn test_iris_correction_adds_bonus_when_looking_down() {
    let mut frame = LandmarkFrame::frontal_face(0.20, dims());
    for (lower, iris) in [
        (indices::LEFT_LOWER_LID, indices::LEFT_IRIS_CENTER),
        (indices::RIGHT_LOWER_LID, indices::RIGHT_IRIS_CENTER),
    ] {
        frame.points[iris] = Landmark::new(frame.points[iris].x, frame.points[lower].y);
    }

    let mut engine = engine();
    let plain = engine
        .process(FrameInput::new(0, Some(frame.clone()), dims()))
        .unwrap();

    engine.set_defense_flags(DefenseFlags {
        pose_compensation: false,
        iris_correction: true,
        dual_calibration: true,
    });
    let corrected = engine
        .process(FrameInput::new(33, Some(frame), dims()))
        .unwrap();

    let metrics = corrected.metrics.unwrap();
    assert!(metrics.iris_vertical_ratio > 0.65);
    assert!(
        (corrected.avg_openness.unwrap() - plain.avg_openness.unwrap() - 0.05).abs() < 1e-9
    );
}

#[test]
fn test_face_lost_after_sustained_absence() {
    let mut engine = engine();
    drive(&mut engine, 0, 50, 10, CLOSED);
    let before = engine.fatigue_state();

    let mut last = None;
    for i in 0..30u64 {
        last = Some(engine.process(no_face(500 + i * 50)).unwrap());
    }
    let last = last.unwrap();
    assert!(last.face_lost);
    assert_eq!(last.face_absent_frames, 30);
    assert_eq!(engine.fatigue_state(), before);

    let event = engine.process(face(2_000, OPEN)).unwrap();
    assert_eq!(event.face_absent_frames, 0);
    assert!(!event.face_lost);
}

#[test]
fn test_reset_keeps_thresholds() {
    let mut engine = engine();
    let custom = Thresholds::new(0.40, 0.30, 0.20).unwrap();
    engine.override_thresholds(custom).unwrap();
    drive(&mut engine, 0, 50, 60, CLOSED);
    engine.start_calibration().unwrap();

    engine.reset();

    assert_eq!(engine.thresholds(), custom);
    assert_eq!(engine.fatigue_state().closed_seconds, 0.0);
    assert_eq!(engine.fatigue_state().window_len, 0);
    assert_eq!(engine.critical_count(), 0);
    assert_eq!(engine.alarm_level(), AlarmLevel::Safe);
    assert_eq!(engine.strategy_mode(), StrategyMode::Conservative);
    assert_eq!(engine.calibration_status(), CalibrationStatus::Idle);
}

#[test]
fn test_relax_until_refused() {
    let mut engine = engine();
    let relaxed = engine.relax_sensitivity().unwrap();
    assert!((relaxed.warn_threshold - 0.275).abs() < 1e-12);

    let refused = engine.relax_sensitivity();
    assert!(matches!(
        refused,
        Err(DmsError::Calibration(
            CalibrationError::CannotRelaxFurther { .. }
        ))
    ));
    assert_eq!(engine.thresholds(), relaxed);
}

#[test]
fn test_frame_input_from_json() {
    let frame = LandmarkFrame::frontal_face(OPEN, dims());
    let json = format!(
        r#"{{"timestamp_ms": 42, "width": 1280, "height": 720, "landmarks": {}}}"#,
        serde_json::to_string(&frame).unwrap()
    );
    let input: FrameInput = serde_json::from_str(&json).unwrap();
    assert_eq!(input.orientation, Orientation::Landscape);

    let mut engine = engine();
    let event = engine.process(input).unwrap();
    assert_eq!(event.timestamp_ms, 42);

    let no_face: FrameInput =
        serde_json::from_str(r#"{"timestamp_ms": 43, "width": 1280, "height": 720}"#).unwrap();
    assert!(no_face.landmarks.is_none());
}

proptest! {
    #[test]
    fn prop_engine_state_stays_bounded(
        frames in proptest::collection::vec((0.0f64..0.45, 1u64..120, any::<bool>()), 1..300),
    ) {
        let mut engine = engine();
        let mut ts = 0u64;
        for (ear, gap_ms, has_face) in frames {
            ts += gap_ms;
            let input = if has_face { face(ts, ear) } else { no_face(ts) };
            let event = match engine.process(input) {
                Ok(event) => event,
                Err(DmsError::Geometry(_)) => continue,
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            };
            prop_assert!(event.closed_seconds >= 0.0);
            prop_assert!(event.closed_seconds.is_finite());
            prop_assert!((0.0..=1.0).contains(&event.perclos_value));
            prop_assert!(engine.fatigue_state().window_len <= 150);
            let t = event.active_thresholds;
            prop_assert!(t.crit_threshold < t.warn_threshold);
            prop_assert!(t.warn_threshold <= t.baseline);
        }
    }
}
