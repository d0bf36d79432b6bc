//! FITS binary-table access for raw and processed light curves.
//!
//! Raw products carry the light curve in the first extension with (at least)
//! `TIME`, `PDCSAP_FLUX` and `PDCSAP_FLUX_ERR` columns; names are matched
//! case-insensitively. Processed products are written with exactly those
//! three double columns in a `LIGHTCURVE` extension.

use chrono::{DateTime, Utc};
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::tables::{ColumnDataType, ColumnDescription, ConcreteColumnDescription};
use fitsio::FitsFile;
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::{ObjectIdentifier, ProcessedSeries, Provenance, RawSeries, SampleColumn};
use crate::artifacts::temporary_path;

pub const TIME_COLUMN: &str = "TIME";
pub const FLUX_COLUMN: &str = "PDCSAP_FLUX";
pub const FLUX_ERR_COLUMN: &str = "PDCSAP_FLUX_ERR";
pub const TABLE_EXTENSION: &str = "LIGHTCURVE";

// Primary-header keywords stamped at acquisition time.
const KEY_SOURCE_CATALOG: &str = "SRC_CAT";
const KEY_ACQUIRED_AT: &str = "ACQ_TIME";
const KEY_CHECKSUM: &str = "ACQ_SHA";
const KEY_MISSION: &str = "TELESCOP";
const KEY_OBJECT: &str = "OBJECT";

/// Errors that can occur when reading or writing a light-curve FITS file.
#[derive(Debug, thiserror::Error)]
pub enum FitsError {
    #[error("FITS error in '{path}': {source}")]
    Fits {
        path: PathBuf,
        source: fitsio::errors::Error,
    },

    #[error("Extension {hdu} of '{path}' is not a binary table")]
    NotATable { path: PathBuf, hdu: usize },

    #[error("Column '{column}' not found in '{path}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Column '{column}' in '{path}' is malformed: {reason}")]
    MalformedColumn {
        path: PathBuf,
        column: String,
        reason: String,
    },

    #[error("Failed to move '{path}' into place: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn fits_err(path: &Path) -> impl Fn(fitsio::errors::Error) -> FitsError + '_ {
    move |source| FitsError::Fits {
        path: path.to_path_buf(),
        source,
    }
}

/// Read the three light-curve columns of a raw product.
///
/// Multi-dimensional columns are kept as they are; collapsing them is the
/// preprocessor's job. Provenance comes from the primary header, falling back
/// to `unknown` for products that were never stamped.
pub fn read_raw_series(path: &Path, identifier: &ObjectIdentifier) -> Result<RawSeries, FitsError> {
    let mut fptr = FitsFile::open(path).map_err(fits_err(path))?;

    let provenance = {
        let primary = fptr.primary_hdu().map_err(fits_err(path))?;
        read_provenance(&primary, &mut fptr)
    };

    let hdu = fptr.hdu(1).map_err(fits_err(path))?;
    let (columns, num_rows) = match &hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            num_rows,
        } => (column_descriptions.clone(), *num_rows),
        _ => {
            return Err(FitsError::NotATable {
                path: path.to_path_buf(),
                hdu: 1,
            })
        }
    };

    let time = read_column(path, &hdu, &mut fptr, &columns, num_rows, TIME_COLUMN)?;
    let flux = read_column(path, &hdu, &mut fptr, &columns, num_rows, FLUX_COLUMN)?;
    let flux_err = read_column(path, &hdu, &mut fptr, &columns, num_rows, FLUX_ERR_COLUMN)?;

    Ok(RawSeries {
        identifier: identifier.clone(),
        time,
        flux,
        flux_err,
        provenance,
    })
}

/// Read a processed product written by [`write_processed_series`].
pub fn read_processed_series(
    path: &Path,
    identifier: &ObjectIdentifier,
) -> Result<ProcessedSeries, FitsError> {
    let raw = read_raw_series(path, identifier)?;
    Ok(ProcessedSeries {
        identifier: raw.identifier,
        time: raw.time.first_subcolumn(),
        flux: raw.flux.first_subcolumn(),
        flux_err: raw.flux_err.first_subcolumn(),
    })
}

fn read_column(
    path: &Path,
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    columns: &[ConcreteColumnDescription],
    num_rows: usize,
    wanted: &str,
) -> Result<SampleColumn, FitsError> {
    let description = columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| FitsError::MissingColumn {
            path: path.to_path_buf(),
            column: wanted.to_string(),
        })?;

    let width = description.data_type.repeat.max(1);
    // cfitsio continues into the following rows once a row's vector is
    // exhausted, so reading rows × width elements yields the row-major data.
    let values: Vec<f64> = hdu
        .read_col_range(fptr, &description.name, &(0..num_rows * width))
        .map_err(fits_err(path))?;

    SampleColumn::with_width(values, width).map_err(|reason| FitsError::MalformedColumn {
        path: path.to_path_buf(),
        column: description.name.clone(),
        reason,
    })
}

fn read_provenance(primary: &FitsHdu, fptr: &mut FitsFile) -> Provenance {
    let fallback = Provenance::unknown();
    let read = |fptr: &mut FitsFile, key: &str| primary.read_key::<String>(fptr, key).ok();

    let acquired_at = read(fptr, KEY_ACQUIRED_AT)
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(fallback.acquired_at);

    Provenance {
        source_catalog: read(fptr, KEY_SOURCE_CATALOG)
            .map(|s| s.trim().to_string())
            .unwrap_or(fallback.source_catalog),
        mission: read(fptr, KEY_MISSION)
            .map(|s| s.trim().to_string())
            .unwrap_or(fallback.mission),
        acquired_at,
        checksum: read(fptr, KEY_CHECKSUM).map(|s| s.trim().to_string()),
    }
}

/// Record acquisition provenance in the primary header of an existing file.
pub fn stamp_provenance(path: &Path, provenance: &Provenance) -> Result<(), FitsError> {
    let mut fptr = FitsFile::edit(path).map_err(fits_err(path))?;
    let primary = fptr.primary_hdu().map_err(fits_err(path))?;

    primary
        .write_key(&mut fptr, KEY_SOURCE_CATALOG, provenance.source_catalog.clone())
        .map_err(fits_err(path))?;
    primary
        .write_key(&mut fptr, KEY_ACQUIRED_AT, provenance.acquired_at.to_rfc3339())
        .map_err(fits_err(path))?;
    if let Some(checksum) = &provenance.checksum {
        primary
            .write_key(&mut fptr, KEY_CHECKSUM, checksum.clone())
            .map_err(fits_err(path))?;
    }
    Ok(())
}

/// Write a processed series as a `LIGHTCURVE` binary table.
///
/// The file is assembled under a temporary name and renamed into place.
pub fn write_processed_series(path: &Path, series: &ProcessedSeries) -> Result<(), FitsError> {
    let columns = [
        (TIME_COLUMN, SampleColumn::from_values(series.time.clone())),
        (FLUX_COLUMN, SampleColumn::from_values(series.flux.clone())),
        (FLUX_ERR_COLUMN, SampleColumn::from_values(series.flux_err.clone())),
    ];
    write_table(path, &series.identifier, None, &columns)
}

/// Write a raw series in the layout of a downloaded product.
///
/// Used to stage local light curves for [`DirectoryProvider`] and tests;
/// column widths are preserved.
///
/// [`DirectoryProvider`]: crate::clients::local::DirectoryProvider
pub fn write_raw_series(path: &Path, series: &RawSeries) -> Result<(), FitsError> {
    let columns = [
        (TIME_COLUMN, series.time.clone()),
        (FLUX_COLUMN, series.flux.clone()),
        (FLUX_ERR_COLUMN, series.flux_err.clone()),
    ];
    write_table(path, &series.identifier, Some(&series.provenance), &columns)
}

fn write_table(
    path: &Path,
    identifier: &ObjectIdentifier,
    provenance: Option<&Provenance>,
    columns: &[(&str, SampleColumn)],
) -> Result<(), FitsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| FitsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let tmp = temporary_path(path);
    {
        let mut fptr = FitsFile::create(&tmp)
            .overwrite()
            .open()
            .map_err(fits_err(&tmp))?;

        let primary = fptr.primary_hdu().map_err(fits_err(&tmp))?;
        primary
            .write_key(&mut fptr, KEY_OBJECT, identifier.to_string())
            .map_err(fits_err(&tmp))?;
        if let Some(provenance) = provenance {
            primary
                .write_key(&mut fptr, KEY_MISSION, provenance.mission.clone())
                .map_err(fits_err(&tmp))?;
        }

        let descriptions = columns
            .iter()
            .map(|(name, column)| {
                ColumnDescription::new(*name)
                    .with_type(ColumnDataType::Double)
                    .that_repeats(column.width())
                    .create()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(fits_err(&tmp))?;

        let hdu = fptr
            .create_table(TABLE_EXTENSION.to_string(), &descriptions)
            .map_err(fits_err(&tmp))?;
        for (name, column) in columns {
            hdu.write_col(&mut fptr, *name, column.values())
                .map_err(fits_err(&tmp))?;
        }
    }

    if let Some(provenance) = provenance {
        stamp_provenance(&tmp, provenance)?;
    }

    fs::rename(&tmp, path).map_err(|source| FitsError::Io {
        path: path.to_path_buf(),
        source,
    })
}
