//! Demand Input
//!
//! Reads the tabular demand data, one row per product, week and discount. Columns are found by
//! header name, so their order does not matter and unknown columns are ignored:
//!
//! `product_id, price, week, group, demand, selling_price, total_inventory, cost_price`
//!
//! The `price` column holds the discount tier in percentage points.

use std::{fs::File, io, path::Path};

use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    discounts::{Discount, DiscountError},
    horizon::WeekId,
    products::{PriceDemand, ProductId},
};

/// Errors raised while reading demand input.
#[derive(Debug, Error)]
pub enum InputError {
    /// The input file could not be opened.
    #[error("failed to open demand input: {0}")]
    Io(#[from] io::Error),

    /// A row could not be parsed.
    #[error("failed to parse demand input: {0}")]
    Csv(#[from] csv::Error),

    /// A field parsed but holds a value outside its domain.
    #[error("row {row}: invalid {field} value {value}")]
    InvalidField {
        /// 1-based data row number (the header is row 0)
        row: usize,
        /// Column name
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// The discount tier is invalid.
    #[error("row {row}: {source}")]
    Discount {
        /// 1-based data row number
        row: usize,
        /// Underlying discount error
        source: DiscountError,
    },
}

/// One validated input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandRecord {
    /// Product identifier
    pub product_id: ProductId,

    /// Discount tier
    pub discount: Discount,

    /// Week identifier
    pub week: WeekId,

    /// Group the product belongs to
    pub group: String,

    /// Selling price and demand at this discount
    pub price_demand: PriceDemand,

    /// Units on hand at the start of the horizon
    pub inventory: u64,

    /// Unit cost
    pub cost: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    product_id: u64,
    #[serde(rename = "price", with = "rust_decimal::serde::str")]
    discount: Decimal,
    week: WeekId,
    group: String,
    demand: f64,
    #[serde(with = "rust_decimal::serde::str")]
    selling_price: Decimal,
    total_inventory: f64,
    #[serde(with = "rust_decimal::serde::str")]
    cost_price: Decimal,
}

impl RawRecord {
    fn validate(self, row: usize) -> Result<DemandRecord, InputError> {
        let discount =
            Discount::new(self.discount).map_err(|source| InputError::Discount { row, source })?;

        let demand = whole_units(self.demand).ok_or_else(|| InputError::InvalidField {
            row,
            field: "demand",
            value: self.demand.to_string(),
        })?;

        let inventory =
            whole_units(self.total_inventory).ok_or_else(|| InputError::InvalidField {
                row,
                field: "total_inventory",
                value: self.total_inventory.to_string(),
            })?;

        if self.selling_price.is_sign_negative() {
            return Err(InputError::InvalidField {
                row,
                field: "selling_price",
                value: self.selling_price.to_string(),
            });
        }

        if self.cost_price.is_sign_negative() {
            return Err(InputError::InvalidField {
                row,
                field: "cost_price",
                value: self.cost_price.to_string(),
            });
        }

        Ok(DemandRecord {
            product_id: ProductId(self.product_id),
            discount,
            week: self.week,
            group: self.group,
            price_demand: PriceDemand::new(self.selling_price, demand),
            inventory,
            cost: self.cost_price,
        })
    }
}

/// Truncate a non-negative quantity towards zero. Negative and non-finite values are rejected.
fn whole_units(value: f64) -> Option<u64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    value.trunc().to_u64()
}

/// Read demand records from CSV text.
///
/// # Errors
///
/// Returns an [`InputError`] for the first row that is missing a column or holds an invalid value.
pub fn read_records(reader: impl io::Read) -> Result<Vec<DemandRecord>, InputError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let records = csv_reader
        .deserialize::<RawRecord>()
        .enumerate()
        .map(|(idx, raw)| raw?.validate(idx + 1))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(rows = records.len(), "read demand records");

    Ok(records)
}

/// Read demand records from a CSV file.
///
/// # Errors
///
/// Returns an [`InputError`] if the file cannot be opened or any row is invalid.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<DemandRecord>, InputError> {
    read_records(File::open(path)?)
}
