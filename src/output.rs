use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use arrow::util::display::{ArrayFormatter, FormatOptions};
use arrow::util::pretty::pretty_format_batches;
use arrow_array::RecordBatch;
use arrow_ipc::writer::FileWriter;
use arrow_schema::{Schema, SchemaRef};
use clap::ValueEnum;
use tracing::{info, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per record batch, as it arrives
    #[default]
    Lines,
    /// A single table of all rows once the stream ends
    Table,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub batches: usize,
    pub rows: usize,
}

pub fn describe_schema(schema: &Schema) -> String {
    let mut out = format!("schema:\n  fields: {}", schema.fields().len());
    for field in schema.fields() {
        out.push_str(&format!(
            "\n    - {}: type={}{}",
            field.name(),
            field.data_type(),
            if field.is_nullable() { ", nullable" } else { "" }
        ));
    }
    out
}

/// Single-line rendering of a batch: `record: rows=N col[i][name]: [v, ...] ...`.
pub fn format_batch(batch: &RecordBatch) -> Result<String> {
    let options = FormatOptions::default().with_null("null");
    let schema = batch.schema();
    let mut line = format!("record: rows={}", batch.num_rows());
    for (idx, column) in batch.columns().iter().enumerate() {
        let formatter = ArrayFormatter::try_new(column.as_ref(), &options)?;
        let values = (0..column.len())
            .map(|row| formatter.value(row).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        line.push_str(&format!(" col[{idx}][{}]: [{values}]", schema.field(idx).name()));
    }
    Ok(line)
}

/// Writes a result set to `out` and, optionally, to an Arrow IPC file.
pub struct ResultPrinter<W: Write> {
    out: W,
    format: OutputFormat,
    save_to: Option<PathBuf>,
    schema: Option<SchemaRef>,
    buffered: Vec<RecordBatch>,
    ipc: Option<FileWriter<BufWriter<File>>>,
    stats: QueryStats,
}

impl<W: Write> ResultPrinter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            save_to: None,
            schema: None,
            buffered: Vec::new(),
            ipc: None,
            stats: QueryStats::default(),
        }
    }

    pub fn with_save_to(mut self, path: Option<PathBuf>) -> Self {
        self.save_to = path;
        self
    }

    pub fn write_schema(&mut self, schema: &SchemaRef) -> Result<()> {
        writeln!(self.out, "{}", describe_schema(schema))?;
        self.schema = Some(schema.clone());
        Ok(())
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        match self.format {
            OutputFormat::Lines => writeln!(self.out, "{}", format_batch(batch)?)?,
            OutputFormat::Table => self.buffered.push(batch.clone()),
        }
        // the stream's own schema, which may carry metadata GetSchema lacked
        if let Some(writer) = self.ipc_writer(&batch.schema())? {
            writer.write(batch)?;
        }
        self.stats.batches += 1;
        self.stats.rows += batch.num_rows();
        Ok(())
    }

    pub fn finish(mut self) -> Result<QueryStats> {
        if self.format == OutputFormat::Table && !self.buffered.is_empty() {
            writeln!(self.out, "{}", pretty_format_batches(&self.buffered)?)?;
        }
        if self.ipc.is_none() {
            if let Some(schema) = self.schema.clone() {
                self.ipc_writer(&schema)?;
            }
        }
        if let Some(mut writer) = self.ipc.take() {
            writer.finish()?;
            if let Some(path) = &self.save_to {
                info!(
                    path = %path.display(),
                    batches = self.stats.batches,
                    "saved results as Arrow IPC file"
                );
            }
        }
        self.out.flush()?;
        Ok(self.stats)
    }

    /// Drops a result set that failed partway, removing the unfinished IPC file.
    pub fn abort(mut self) {
        let Some(writer) = self.ipc.take() else {
            return;
        };
        drop(writer);
        if let Some(path) = &self.save_to {
            match std::fs::remove_file(path) {
                Ok(()) => info!(path = %path.display(), "removed incomplete results file"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove results file")
                }
            }
        }
    }

    /// Opens the IPC file on first use; `None` when results are not being saved.
    fn ipc_writer(
        &mut self,
        schema: &SchemaRef,
    ) -> Result<Option<&mut FileWriter<BufWriter<File>>>> {
        if self.ipc.is_none() {
            if let Some(path) = &self.save_to {
                let file = BufWriter::new(File::create(path)?);
                self.ipc = Some(FileWriter::try_new(file, schema)?);
            }
        }
        Ok(self.ipc.as_mut())
    }
}
