use anyhow::{anyhow, Context, Result};
use arrow_array::{Array, Int64Array, RecordBatch, StringArray};
use mmu::{Event, EventId, EventKind};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;

/// Decodes a Parquet event table into trace events.
///
/// Each row is one event and its row number across the whole file is its
/// [`EventId`], which is what the `link` column refers to.
pub struct EventDecoder {
    events: Vec<Event>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn process_parquet_file(
        &mut self,
        builder: ParquetRecordBatchReaderBuilder<File>,
    ) -> Result<()> {
        let arrow_reader = builder
            .build()
            .with_context(|| "Failed to build Arrow reader")?;

        for batch in arrow_reader {
            let batch = batch.with_context(|| "Failed to read record batch")?;
            self.process_record_batch(&batch)?;
        }

        log::debug!("Decoded {} events", self.events.len());
        Ok(())
    }

    fn process_record_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let timestamp_col = int64_column(batch, "timestamp")?;
        let kind_col = string_column(batch, "kind")?;
        let goroutine_col = int64_column(batch, "goroutine")?;
        let procs_col = int64_column(batch, "procs")?;
        let label_col = string_column(batch, "label")?;
        let link_col = int64_column(batch, "link")?;

        for i in 0..batch.num_rows() {
            let row = self.events.len();
            let ts = optional_value(timestamp_col, i)
                .ok_or_else(|| anyhow!("timestamp is null for event at row {}", row))?;
            if let Some(prev) = self.events.last() {
                if ts < prev.ts {
                    return Err(anyhow!(
                        "Timestamps must be non-decreasing: row {} has {} after {}",
                        row,
                        ts,
                        prev.ts
                    ));
                }
            }

            let goroutine = || -> Result<u64> {
                let value = optional_value(goroutine_col, i)
                    .ok_or_else(|| anyhow!("goroutine is null for event at row {}", row))?;
                u64::try_from(value)
                    .with_context(|| format!("Invalid goroutine {} at row {}", value, row))
            };

            if kind_col.is_null(i) {
                return Err(anyhow!("kind is null for event at row {}", row));
            }
            let kind = match kind_col.value(i) {
                "procs" => {
                    let procs = optional_value(procs_col, i)
                        .ok_or_else(|| anyhow!("procs is null for event at row {}", row))?;
                    EventKind::ProcessorCountChanged {
                        procs: u64::try_from(procs).with_context(|| {
                            format!("Invalid processor count {} at row {}", procs, row)
                        })?,
                    }
                }
                "stw_start" => EventKind::StwStart,
                "stw_end" => EventKind::StwEnd,
                "assist_start" => EventKind::AssistStart {
                    goroutine: goroutine()?,
                },
                "assist_done" => EventKind::AssistDone {
                    goroutine: goroutine()?,
                },
                "go_start" => {
                    let stop_link = optional_value(link_col, i)
                        .map(|link| {
                            usize::try_from(link)
                                .map(EventId)
                                .with_context(|| format!("Invalid link {} at row {}", link, row))
                        })
                        .transpose()?;
                    EventKind::GoroutineScheduled {
                        goroutine: goroutine()?,
                        label: (!label_col.is_null(i)).then(|| label_col.value(i).to_string()),
                        stop_link,
                    }
                }
                "other" => EventKind::Other {
                    goroutine: goroutine()?,
                    id: EventId(row),
                },
                unknown => {
                    return Err(anyhow!("Unknown event kind {:?} at row {}", unknown, row));
                }
            };

            self.events.push(Event::new(ts, kind));
        }

        Ok(())
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

fn optional_value(col: &Int64Array, i: usize) -> Option<i64> {
    if col.is_null(i) {
        None
    } else {
        Some(col.value(i))
    }
}

fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("{} column not found", name))?
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| anyhow!("{} column is not Int64Array", name))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("{} column not found", name))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("{} column is not StringArray", name))
}
