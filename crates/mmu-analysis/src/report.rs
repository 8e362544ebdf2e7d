use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use arrow_array::builder::{Float64Builder, Int64Builder};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::arrow_writer::ArrowWriter;

/// Smallest window picked by [`log_spaced_windows`], in nanoseconds
const MIN_WINDOW: i64 = 1_000;

/// Picks `points` window sizes spaced evenly on a log scale from 1µs (or 1ns
/// for very short traces) up to `span`.
pub fn log_spaced_windows(span: i64, points: usize) -> Vec<i64> {
    if span <= 0 || points == 0 {
        return Vec::new();
    }
    if points == 1 {
        return vec![span];
    }

    let min = if span > MIN_WINDOW { MIN_WINDOW } else { 1 };
    let ratio = (span as f64 / min as f64).ln();
    let mut windows: Vec<i64> = (0..points)
        .map(|k| {
            let w = min as f64 * (ratio * k as f64 / (points - 1) as f64).exp();
            (w.round() as i64).clamp(min, span)
        })
        .collect();
    windows.dedup();
    windows
}

/// Create the schema for MMU report record batches
pub fn create_report_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("window_ns", DataType::Int64, false),
        Field::new("mmu", DataType::Float64, false),
    ]))
}

/// Convert `(window, mmu)` rows to an Arrow RecordBatch
pub fn report_to_batch(rows: &[(i64, f64)], schema: SchemaRef) -> Result<RecordBatch> {
    let mut window_builder = Int64Builder::with_capacity(rows.len());
    let mut mmu_builder = Float64Builder::with_capacity(rows.len());

    for &(window, mmu) in rows {
        window_builder.append_value(window);
        mmu_builder.append_value(mmu);
    }

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(window_builder.finish()),
        Arc::new(mmu_builder.finish()),
    ];

    RecordBatch::try_new(schema, arrays).map_err(|e| anyhow!("Failed to create RecordBatch: {}", e))
}

/// Writes `(window, mmu)` rows as a Parquet file
pub fn write_report<W: Write + Send>(writer: W, rows: &[(i64, f64)]) -> Result<()> {
    let schema = create_report_schema();
    let batch = report_to_batch(rows, schema.clone())?;

    let mut arrow_writer = ArrowWriter::try_new(writer, schema, None)
        .map_err(|e| anyhow!("Failed to create Arrow writer: {}", e))?;
    arrow_writer
        .write(&batch)
        .map_err(|e| anyhow!("Failed to write batch to Parquet: {}", e))?;
    arrow_writer
        .close()
        .map(|_| ())
        .map_err(|e| anyhow!("Failed to close Parquet writer: {}", e))
}

/// Renders rows as a fixed-width text table
pub fn format_table(rows: &[(i64, f64)]) -> String {
    let mut table = format!("{:>16}  {:>8}\n", "window_ns", "mmu");
    for &(window, mmu) in rows {
        table.push_str(&format!("{:>16}  {:>8.4}\n", window, mmu));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Float64Array, Int64Array};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::File;

    #[test]
    fn test_log_spaced_windows() {
        let windows = log_spaced_windows(1_000_000, 4);
        assert_eq!(windows, vec![1_000, 10_000, 100_000, 1_000_000]);
    }

    #[test]
    fn test_log_spaced_windows_short_trace() {
        let windows = log_spaced_windows(100, 3);
        assert_eq!(windows, vec![1, 10, 100]);
    }

    #[test]
    fn test_log_spaced_windows_deduplicates() {
        let windows = log_spaced_windows(3, 10);
        assert_eq!(windows, vec![1, 2, 3]);
    }

    #[test]
    fn test_log_spaced_windows_degenerate() {
        assert!(log_spaced_windows(0, 5).is_empty());
        assert!(log_spaced_windows(100, 0).is_empty());
        assert_eq!(log_spaced_windows(100, 1), vec![100]);
    }

    #[test]
    fn test_report_to_batch() {
        let rows = vec![(10, 0.0), (100, 0.5)];
        let batch = report_to_batch(&rows, create_report_schema()).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let mmu_col = batch
            .column_by_name("mmu")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(mmu_col.value(1), 0.5);
    }

    #[test]
    fn test_write_report_round_trips_through_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.parquet");
        let rows = vec![(10, 0.0), (100, 0.5), (1000, 0.95)];

        write_report(File::create(&path).unwrap(), &rows).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 1);

        let windows = batches[0]
            .column_by_name("window_ns")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(windows.values().to_vec(), vec![10, 100, 1000]);
    }

    #[test]
    fn test_format_table() {
        let table = format_table(&[(100, 0.5)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("window_ns"));
        assert_eq!(lines[1], "             100    0.5000");
    }
}
