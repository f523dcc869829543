use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use parquet::basic::Compression;
use parquet::column::reader::{ColumnReader, ColumnReaderImpl};
use parquet::data_type::{
    BoolType, ByteArrayType, DataType, DoubleType, FixedLenByteArrayType, FloatType, Int32Type,
    Int64Type, Int96Type,
};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, RowGroupReader, SerializedFileReader};
use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
use parquet::schema::types::{Type, TypePtr};
use serde::Serialize;

use crate::buildings::FLAT_LAYOUT_YEAR;
use crate::domain::ReleaseRecord;
use crate::error::FetchError;

pub const COLUMNS_TO_KEEP: &[&str] = &[
    "in.puma",
    "in.nhgis_puma_gisjoin",
    "in.resstock_puma_id",
    "in.state",
    "in.state_name",
    "in.resstock_county_id",
    "in.county",
    "bldg_id",
    "upgrade",
];

const COPY_BATCH_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataFile {
    /// `None` for releases that publish a single combined table.
    pub upgrade_id: Option<u32>,
    pub relative_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableProjection {
    pub columns: Vec<String>,
    pub missing_columns: Vec<String>,
    pub rows: i64,
}

pub fn metadata_files(record: &ReleaseRecord) -> Vec<MetadataFile> {
    let metadata_dir = format!("{}/metadata", record.release_dir());
    if record.release_year == FLAT_LAYOUT_YEAR {
        return vec![MetadataFile {
            upgrade_id: None,
            relative_key: format!("{metadata_dir}/metadata.parquet"),
        }];
    }

    let mut upgrades = record.upgrade_ids.clone();
    if !upgrades.contains(&0) {
        upgrades.insert(0, 0);
    }
    upgrades
        .into_iter()
        .map(|upgrade| MetadataFile {
            upgrade_id: Some(upgrade),
            relative_key: if upgrade == 0 {
                format!("{metadata_dir}/baseline.parquet")
            } else {
                format!("{metadata_dir}/upgrade{upgrade:02}.parquet")
            },
        })
        .collect()
}

/// Copies the top-level columns of `source` named in `keep` into a new table
/// at `destination`, in file order. If none of them exist every top-level
/// column is copied.
pub fn project_table(
    source: &Path,
    destination: &Path,
    keep: &[&str],
) -> Result<TableProjection, FetchError> {
    let file = File::open(source)
        .map_err(|err| FetchError::Filesystem(format!("open {}: {err}", source.display())))?;
    let reader = SerializedFileReader::new(file).map_err(parquet_error)?;
    let metadata = reader.metadata();
    let schema = metadata.file_metadata().schema_descr();

    let top_level: Vec<usize> = (0..schema.num_columns())
        .filter(|&idx| schema.column(idx).path().parts().len() == 1)
        .collect();
    let missing_columns: Vec<String> = keep
        .iter()
        .filter(|name| !top_level.iter().any(|&idx| schema.column(idx).name() == **name))
        .map(|name| name.to_string())
        .collect();
    if !missing_columns.is_empty() {
        tracing::warn!(
            table = %source.display(),
            missing = ?missing_columns,
            "metadata columns not present, skipping them"
        );
    }

    let mut selected: Vec<usize> = top_level
        .iter()
        .copied()
        .filter(|&idx| keep.contains(&schema.column(idx).name()))
        .collect();
    if selected.is_empty() {
        selected = top_level;
    }

    let fields: Vec<TypePtr> = selected
        .iter()
        .map(|&idx| schema.column(idx).self_type_ptr())
        .collect();
    let projected = Type::group_type_builder(schema.root_schema().name())
        .with_fields(fields)
        .build()
        .map_err(parquet_error)?;
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build(),
    );

    let output = File::create(destination)
        .map_err(|err| FetchError::Filesystem(format!("create {}: {err}", destination.display())))?;
    let mut writer =
        SerializedFileWriter::new(output, Arc::new(projected), props).map_err(parquet_error)?;
    for group in 0..reader.num_row_groups() {
        let row_group = reader.get_row_group(group).map_err(parquet_error)?;
        let mut group_writer = writer.next_row_group().map_err(parquet_error)?;
        for &idx in &selected {
            let Some(mut column_writer) = group_writer.next_column().map_err(parquet_error)? else {
                return Err(FetchError::Parquet("projected schema ran out of columns".to_string()));
            };
            let descr = schema.column(idx);
            let column_reader = row_group.get_column_reader(idx).map_err(parquet_error)?;
            copy_column(
                column_reader,
                &mut column_writer,
                descr.max_def_level(),
                descr.max_rep_level(),
            )
            .map_err(parquet_error)?;
            column_writer.close().map_err(parquet_error)?;
        }
        group_writer.close().map_err(parquet_error)?;
    }
    writer.close().map_err(parquet_error)?;

    Ok(TableProjection {
        columns: selected
            .iter()
            .map(|&idx| schema.column(idx).name().to_string())
            .collect(),
        missing_columns,
        rows: metadata.file_metadata().num_rows(),
    })
}

fn copy_column(
    reader: ColumnReader,
    writer: &mut SerializedColumnWriter<'_>,
    max_def: i16,
    max_rep: i16,
) -> Result<(), ParquetError> {
    match reader {
        ColumnReader::BoolColumnReader(r) => copy_values::<BoolType>(r, writer, max_def, max_rep),
        ColumnReader::Int32ColumnReader(r) => copy_values::<Int32Type>(r, writer, max_def, max_rep),
        ColumnReader::Int64ColumnReader(r) => copy_values::<Int64Type>(r, writer, max_def, max_rep),
        ColumnReader::Int96ColumnReader(r) => copy_values::<Int96Type>(r, writer, max_def, max_rep),
        ColumnReader::FloatColumnReader(r) => copy_values::<FloatType>(r, writer, max_def, max_rep),
        ColumnReader::DoubleColumnReader(r) => {
            copy_values::<DoubleType>(r, writer, max_def, max_rep)
        }
        ColumnReader::ByteArrayColumnReader(r) => {
            copy_values::<ByteArrayType>(r, writer, max_def, max_rep)
        }
        ColumnReader::FixedLenByteArrayColumnReader(r) => {
            copy_values::<FixedLenByteArrayType>(r, writer, max_def, max_rep)
        }
    }
}

fn copy_values<T: DataType>(
    mut reader: ColumnReaderImpl<T>,
    writer: &mut SerializedColumnWriter<'_>,
    max_def: i16,
    max_rep: i16,
) -> Result<(), ParquetError> {
    let mut values = Vec::new();
    let mut def_levels = Vec::new();
    let mut rep_levels = Vec::new();
    loop {
        let (records, _, _) = reader.read_records(
            COPY_BATCH_SIZE,
            (max_def > 0).then_some(&mut def_levels),
            (max_rep > 0).then_some(&mut rep_levels),
            &mut values,
        )?;
        if records == 0 {
            break;
        }
    }
    writer.typed::<T>().write_batch(
        &values,
        (max_def > 0).then_some(def_levels.as_slice()),
        (max_rep > 0).then_some(rep_levels.as_slice()),
    )?;
    Ok(())
}

fn parquet_error(err: ParquetError) -> FetchError {
    FetchError::Parquet(err.to_string())
}
