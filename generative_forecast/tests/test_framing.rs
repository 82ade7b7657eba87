use approx::assert_abs_diff_eq;
use generative_forecast::data::TimeSeriesFrame;
use generative_forecast::error::ForecastError;
use generative_forecast::framing::{process_frames_incremental, process_frames_initial, BeamWidths};
use generative_forecast::state::CheckpointState;
use ndarray::{s, Axis};
use rstest::rstest;

fn ramp(name: &str, len: usize) -> TimeSeriesFrame {
    TimeSeriesFrame::from_columns(vec![(name.to_string(), (0..len).map(|i| i as f64).collect())])
        .unwrap()
}

fn state_for(frame: &TimeSeriesFrame, beams: BeamWidths) -> CheckpointState {
    let (data, boundaries) = process_frames_initial(frame, 5.0, beams).unwrap();
    let mut state = CheckpointState::new(frame.headers().to_vec(), 500, 0.5, 1.0, 0.04, beams);
    state.bind_boundaries(&boundaries).unwrap();
    state.extend_history(data.observations.view()).unwrap();
    state
}

#[rstest]
#[case(3, 3, 10, 5)]
#[case(1, 1, 10, 9)]
#[case(4, 2, 6, 1)]
fn test_initial_example_count(
    #[case] lookback: usize,
    #[case] future: usize,
    #[case] rows: usize,
    #[case] expected: usize,
) {
    let beams = BeamWidths::new(lookback, future).unwrap();
    let (data, boundaries) = process_frames_initial(&ramp("v", rows), 5.0, beams).unwrap();

    assert_eq!(data.num_examples(), expected);
    assert_eq!(data.x.shape(), &[expected, lookback, 1]);
    assert_eq!(data.y.shape(), &[expected, future, 1]);
    assert_eq!(data.new_rows(), rows);
    assert_eq!(boundaries.len(), 1);
}

#[test]
fn test_initial_windows_are_contiguous() {
    let beams = BeamWidths::new(2, 1).unwrap();
    let (data, boundaries) = process_frames_initial(&ramp("v", 5), 5.0, beams).unwrap();

    assert_eq!(boundaries[0].min, 0.0);
    assert_eq!(boundaries[0].max, 4.0);
    // Normalized ramp: -1, -0.5, 0, 0.5, 1
    assert_abs_diff_eq!(data.x[[1, 0, 0]], -0.5);
    assert_abs_diff_eq!(data.x[[1, 1, 0]], 0.0);
    assert_abs_diff_eq!(data.y[[1, 0, 0]], 0.5);
    assert_abs_diff_eq!(data.y[[2, 0, 0]], 1.0);
}

#[test]
fn test_initial_insufficient_data() {
    let beams = BeamWidths::new(3, 3).unwrap();
    let result = process_frames_initial(&ramp("v", 5), 5.0, beams);
    match result {
        Err(ForecastError::InsufficientData {
            required,
            available,
        }) => {
            assert_eq!(required, 6);
            assert_eq!(available, 5);
        }
        other => panic!("expected InsufficientData, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_invalid_beam_widths() {
    assert!(matches!(
        BeamWidths::new(0, 3),
        Err(ForecastError::InvalidConfig { .. })
    ));
    assert!(BeamWidths::new(3, 0).is_err());
}

#[test]
fn test_incremental_prepends_history_tail() {
    let beams = BeamWidths::new(3, 3).unwrap();
    let state = state_for(&ramp("v", 20), beams);

    let update = TimeSeriesFrame::from_columns(vec![("v".to_string(), vec![5.0, 6.0, 7.0, 8.0])])
        .unwrap();
    let data = process_frames_incremental(&update, &state, 5.0).unwrap();

    // 5 carried rows + 4 new rows = 9 rows, 4 windows of 6
    assert_eq!(data.context_len, 9);
    assert_eq!(data.new_rows(), 4);
    assert_eq!(data.num_examples(), 4);

    // Every example's target reaches into the new rows
    let last_target = data.y.index_axis(Axis(0), 3);
    let expected = state.normalization_boundaries[0].normalize(8.0);
    assert_abs_diff_eq!(last_target[[2, 0]], expected);

    // The first window starts with the carried history
    let tail = state.history_tail(5);
    assert_eq!(data.x.slice(s![0, .., ..]), tail.slice(s![..3, ..]));
}

#[test]
fn test_incremental_reuses_boundaries() {
    let beams = BeamWidths::new(2, 1).unwrap();
    let state = state_for(&ramp("v", 10), beams);

    let update =
        TimeSeriesFrame::from_columns(vec![("v".to_string(), vec![50.0, 60.0])]).unwrap();
    let data = process_frames_incremental(&update, &state, 5.0).unwrap();

    // Boundaries stay [0, 9]; values beyond them clamp to the range end
    assert_eq!(state.normalization_boundaries[0].max, 9.0);
    assert!(data.observations.iter().all(|&v| v == 1.0));
}

#[test]
fn test_incremental_with_fewer_rows_than_window() {
    let beams = BeamWidths::new(3, 3).unwrap();
    let mut state = CheckpointState::new(vec!["v".to_string()], 500, 0.5, 1.0, 0.04, beams);
    let (_, boundaries) = process_frames_initial(&ramp("v", 10), 5.0, beams).unwrap();
    state.bind_boundaries(&boundaries).unwrap();

    // Empty history, two new rows: nothing to train on, history still grows
    let update = TimeSeriesFrame::from_columns(vec![("v".to_string(), vec![1.0, 2.0])]).unwrap();
    let data = process_frames_incremental(&update, &state, 5.0).unwrap();
    assert!(!data.has_examples());
    assert_eq!(data.new_rows(), 2);
}

#[test]
fn test_incremental_schema_mismatch() {
    let beams = BeamWidths::new(2, 2).unwrap();
    let state = state_for(&ramp("v", 10), beams);

    let update = ramp("w", 10);
    match process_frames_incremental(&update, &state, 5.0) {
        Err(ForecastError::SchemaMismatch { expected, found }) => {
            assert_eq!(expected, vec!["v".to_string()]);
            assert_eq!(found, vec!["w".to_string()]);
        }
        other => panic!("expected SchemaMismatch, got {:?}", other.map(|_| ())),
    }
}
