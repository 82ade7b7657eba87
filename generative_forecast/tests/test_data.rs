use generative_forecast::data::{DataLoader, TimeSeriesFrame};
use generative_forecast::error::ForecastError;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_data_loader_from_csv() {
    // Create a temporary CSV file
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,sales,visitors").unwrap();
    writeln!(file, "2023-01-01,100.0,10").unwrap();
    writeln!(file, "2023-01-02,103.0,12").unwrap();
    writeln!(file, "2023-01-03,106.0,15").unwrap();

    let frame = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(frame.len(), 3);
    assert!(!frame.is_empty());
    assert_eq!(frame.headers(), &["sales".to_string(), "visitors".to_string()]);
    assert_eq!(frame.rows()[2], vec![Some(106.0), Some(15.0)]);
}

#[test]
fn test_data_loader_without_time_column() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "value").unwrap();
    for i in 0..5 {
        writeln!(file, "{}", i as f64 * 0.5).unwrap();
    }

    let frame = DataLoader::from_csv(file.path()).unwrap();
    assert_eq!(frame.width(), 1);
    assert_eq!(frame.clean_rows().last().unwrap(), &vec![2.0]);
}

#[test]
fn test_data_loader_from_dataframe_skips_timestamp() {
    let df = df! {
        "timestamp" => &["a", "b", "c"],
        "x" => &[1.0, 2.0, 3.0],
        "y" => &[4i64, 5, 6],
    }
    .unwrap();

    let frame = DataLoader::from_dataframe(df).unwrap();
    assert_eq!(frame.headers(), &["x".to_string(), "y".to_string()]);
    assert_eq!(frame.clean_rows(), vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]);
}

#[test]
fn test_variables_named_like_time_are_kept() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "response_time").unwrap();
    writeln!(file, "120.5").unwrap();
    writeln!(file, "98.0").unwrap();

    let frame = DataLoader::from_csv(file.path()).unwrap();
    assert_eq!(frame.headers(), &["response_time".to_string()]);
    assert_eq!(frame.clean_rows(), vec![vec![120.5], vec![98.0]]);
}

#[test]
fn test_only_leading_time_column_is_skipped() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Time,load,downtime").unwrap();
    writeln!(file, "0,0.5,3").unwrap();
    writeln!(file, "1,0.7,0").unwrap();

    let frame = DataLoader::from_csv(file.path()).unwrap();
    assert_eq!(frame.headers(), &["load".to_string(), "downtime".to_string()]);
    assert_eq!(frame.rows()[1], vec![Some(0.7), Some(0.0)]);
}

#[test]
fn test_data_loader_error_handling() {
    // Test with non-existent file
    let result = DataLoader::from_csv("nonexistent_file.csv");
    assert!(matches!(result, Err(ForecastError::Io(_))));

    // Only a time column
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date").unwrap();
    writeln!(file, "2023-01-01").unwrap();
    let result = DataLoader::from_csv(file.path());
    assert!(matches!(result, Err(ForecastError::DataFormat(_))));

    // Column without a single number
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "label,value").unwrap();
    writeln!(file, "abc,1.0").unwrap();
    writeln!(file, "def,2.0").unwrap();
    let result = DataLoader::from_csv(file.path());
    assert!(matches!(result, Err(ForecastError::DataFormat(_))));
}

#[test]
fn test_frame_validation() {
    let duplicate = TimeSeriesFrame::new(
        vec!["a".to_string(), "a".to_string()],
        vec![vec![Some(1.0), Some(2.0)]],
    );
    assert!(matches!(duplicate, Err(ForecastError::DataFormat(_))));

    let ragged = TimeSeriesFrame::new(vec!["a".to_string()], vec![vec![Some(1.0), Some(2.0)]]);
    assert!(matches!(ragged, Err(ForecastError::DataFormat(_))));

    let empty = TimeSeriesFrame::new(Vec::new(), Vec::new());
    assert!(empty.is_err());

    let uneven = TimeSeriesFrame::from_columns(vec![
        ("a".to_string(), vec![1.0, 2.0]),
        ("b".to_string(), vec![1.0]),
    ]);
    assert!(uneven.is_err());
}

#[test]
fn test_clean_rows_fills_interior_gaps() {
    let frame = TimeSeriesFrame::new(
        vec!["a".to_string()],
        vec![
            vec![None],
            vec![Some(1.0)],
            vec![None],
            vec![Some(f64::INFINITY)],
            vec![Some(4.0)],
            vec![None],
        ],
    )
    .unwrap();

    assert_eq!(frame.len(), 6);
    assert_eq!(frame.clean_rows(), vec![vec![1.0], vec![1.0], vec![1.0], vec![4.0]]);
}

#[test]
fn test_clean_rows_without_complete_row() {
    let frame = TimeSeriesFrame::new(
        vec!["a".to_string(), "b".to_string()],
        vec![vec![Some(1.0), None], vec![None, Some(2.0)]],
    )
    .unwrap();
    assert!(frame.clean_rows().is_empty());
}
