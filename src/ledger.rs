//! Sales Ledger
//!
//! Per-product, per-week record of a schedule's outcome. Both engines produce one, and it is what
//! gets written to the CSV output.

use std::{fs::File, io, path::Path};

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::{horizon::WeekId, products::ProductId};

/// Errors raised while writing a ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The output file could not be created.
    #[error("failed to create ledger output: {0}")]
    Io(#[from] io::Error),

    /// A row could not be written.
    #[error("failed to write ledger: {0}")]
    Csv(#[from] csv::Error),
}

/// Outcome of one product in one week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Product identifier
    #[serde(rename = "Product Id")]
    pub product_id: ProductId,

    /// Week identifier
    #[serde(rename = "Week")]
    pub week: WeekId,

    /// Units sold
    #[serde(rename = "Quantity Sold")]
    pub quantity_sold: u64,

    /// Selling price at the week's discount
    #[serde(rename = "Selling Price")]
    pub selling_price: Decimal,

    /// Revenue earned
    #[serde(rename = "Revenue")]
    pub revenue: Decimal,

    /// Cost of the units sold
    #[serde(rename = "Cost")]
    pub cost: Decimal,

    /// Demand at the week's discount
    #[serde(rename = "Demand")]
    pub demand: u64,
}

impl LedgerEntry {
    /// Revenue minus cost.
    pub fn profit(&self) -> Decimal {
        self.revenue - self.cost
    }
}

/// Ordered collection of ledger entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Create a ledger from entries.
    pub fn new(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry.
    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    /// Append all entries of another ledger.
    pub fn extend(&mut self, other: Ledger) {
        self.entries.extend(other.entries);
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Entries of one product, in insertion order.
    pub fn product(&self, id: ProductId) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |entry| entry.product_id == id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Units sold across all entries.
    pub fn total_sold(&self) -> u64 {
        self.entries.iter().map(|entry| entry.quantity_sold).sum()
    }

    /// Revenue across all entries.
    pub fn total_revenue(&self) -> Decimal {
        self.entries.iter().map(|entry| entry.revenue).sum()
    }

    /// Profit across all entries.
    pub fn total_profit(&self) -> Decimal {
        self.entries.iter().map(LedgerEntry::profit).sum()
    }

    /// Write the ledger as CSV with a header row.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if a row cannot be written.
    pub fn write_csv(&self, out: impl io::Write) -> Result<(), LedgerError> {
        let mut writer = csv::Writer::from_writer(out);

        if self.entries.is_empty() {
            writer.write_record([
                "Product Id",
                "Week",
                "Quantity Sold",
                "Selling Price",
                "Revenue",
                "Cost",
                "Demand",
            ])?;
        }

        for entry in &self.entries {
            writer.serialize(entry)?;
        }

        writer.flush()?;

        Ok(())
    }

    /// Write the ledger as CSV to a file.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the file cannot be created or written.
    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<(), LedgerError> {
        self.write_csv(File::create(path)?)
    }
}
