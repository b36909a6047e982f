//! Demand Model
//!
//! The read-only view of the planning problem shared by both engines: the planning horizon and the
//! product groups with their demand curves and eligible discount tiers.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    discounts::Discount,
    groups::ProductGroup,
    horizon::{HorizonError, PlanningHorizon, WeekId},
    input::DemandRecord,
    products::{Product, ProductId},
    settings::Settings,
};

/// Errors raised while assembling the demand model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No input rows were given.
    #[error("demand input has no rows")]
    Empty,

    /// The planning horizon could not be derived.
    #[error(transparent)]
    Horizon(#[from] HorizonError),

    /// Two rows of one product disagree on a per-product field.
    #[error("product {product} has conflicting {field} values")]
    ConflictingProduct {
        /// Product identifier
        product: ProductId,
        /// Field that differs between rows
        field: &'static str,
    },

    /// A product appears in more than one group.
    #[error("product {product} appears in groups {first} and {second}")]
    ProductInMultipleGroups {
        /// Product identifier
        product: ProductId,
        /// Group seen first
        first: String,
        /// Conflicting group
        second: String,
    },

    /// The same product, week and discount appear twice.
    #[error("duplicate row for product {product}, week {week}, discount {discount}")]
    DuplicateRow {
        /// Product identifier
        product: ProductId,
        /// Week identifier
        week: WeekId,
        /// Discount tier
        discount: Discount,
    },
}

/// Planning horizon plus product groups, built once and read by both engines.
#[derive(Debug, Clone)]
pub struct DemandModel {
    horizon: PlanningHorizon,
    groups: Vec<ProductGroup>,
}

impl DemandModel {
    /// Create a model from already assembled groups.
    pub fn new(horizon: PlanningHorizon, groups: Vec<ProductGroup>) -> Self {
        Self { horizon, groups }
    }

    /// Build a model from input rows using the product cap and week cap of `settings`.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] if the rows are empty or inconsistent.
    pub fn from_records(records: &[DemandRecord], settings: &Settings) -> Result<Self, ModelError> {
        DemandModelBuilder::new()
            .max_products(settings.max_products)
            .weeks(settings.weeks)
            .build(records)
    }

    /// Planning horizon.
    pub fn horizon(&self) -> &PlanningHorizon {
        &self.horizon
    }

    /// Product groups in input order.
    pub fn groups(&self) -> &[ProductGroup] {
        &self.groups
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&ProductGroup> {
        self.groups.iter().find(|group| group.name() == name)
    }

    /// Number of products across all groups.
    pub fn product_count(&self) -> usize {
        self.groups.iter().map(ProductGroup::len).sum()
    }

    /// Units on hand across all groups at the start of the horizon.
    pub fn total_initial_inventory(&self) -> u64 {
        self.groups
            .iter()
            .map(ProductGroup::total_initial_inventory)
            .sum()
    }
}

/// Assembles a [`DemandModel`] from input rows.
#[derive(Debug, Clone)]
pub struct DemandModelBuilder {
    max_products: usize,
    weeks: Option<usize>,
}

impl Default for DemandModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct GroupDraft {
    name: String,
    products: Vec<Product>,
    positions: FxHashMap<ProductId, usize>,
}

impl DemandModelBuilder {
    /// Builder with the default cap of 100 products per group and the full input horizon.
    pub fn new() -> Self {
        Self {
            max_products: Settings::default().max_products,
            weeks: None,
        }
    }

    /// Cap the number of products kept per group. Later products are skipped.
    #[must_use]
    pub fn max_products(mut self, max_products: usize) -> Self {
        self.max_products = max_products;
        self
    }

    /// Cap the number of planning weeks. Rows for later weeks are skipped.
    #[must_use]
    pub fn weeks(mut self, weeks: Option<usize>) -> Self {
        self.weeks = weeks;
        self
    }

    /// Build the model.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] if the rows are empty or inconsistent.
    pub fn build(&self, records: &[DemandRecord]) -> Result<DemandModel, ModelError> {
        if records.is_empty() {
            return Err(ModelError::Empty);
        }

        let mut horizon = PlanningHorizon::from_week_ids(records.iter().map(|r| r.week))?;

        if let Some(weeks) = self.weeks {
            horizon = horizon.truncated(weeks);
        }

        let week_count = horizon.len();

        let mut drafts: Vec<GroupDraft> = Vec::new();
        let mut group_positions: FxHashMap<String, usize> = FxHashMap::default();
        let mut product_groups: FxHashMap<ProductId, String> = FxHashMap::default();
        let mut skipped_products: FxHashSet<ProductId> = FxHashSet::default();

        for record in records {
            match product_groups.get(&record.product_id) {
                Some(first) if *first != record.group => {
                    return Err(ModelError::ProductInMultipleGroups {
                        product: record.product_id,
                        first: first.clone(),
                        second: record.group.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    product_groups.insert(record.product_id, record.group.clone());
                }
            }

            let group_idx = *group_positions
                .entry(record.group.clone())
                .or_insert_with(|| {
                    drafts.push(GroupDraft {
                        name: record.group.clone(),
                        products: Vec::new(),
                        positions: FxHashMap::default(),
                    });

                    drafts.len() - 1
                });

            let Some(draft) = drafts.get_mut(group_idx) else {
                continue;
            };

            let product_idx = match draft.positions.get(&record.product_id) {
                Some(idx) => *idx,
                None if draft.products.len() >= self.max_products => {
                    skipped_products.insert(record.product_id);
                    continue;
                }
                None => {
                    draft.products.push(Product::new(
                        record.product_id,
                        record.inventory,
                        record.cost,
                        record.group.clone(),
                        week_count,
                    ));

                    let idx = draft.products.len() - 1;
                    draft.positions.insert(record.product_id, idx);

                    idx
                }
            };

            let Some(product) = draft.products.get_mut(product_idx) else {
                continue;
            };

            if product.initial_inventory != record.inventory {
                return Err(ModelError::ConflictingProduct {
                    product: record.product_id,
                    field: "total_inventory",
                });
            }

            if product.cost != record.cost {
                return Err(ModelError::ConflictingProduct {
                    product: record.product_id,
                    field: "cost_price",
                });
            }

            // Weeks past a truncated horizon are dropped.
            let Some(week) = horizon.week_index(record.week) else {
                continue;
            };

            if product
                .curve
                .insert(week, record.discount, record.price_demand)
                .is_some()
            {
                return Err(ModelError::DuplicateRow {
                    product: record.product_id,
                    week: record.week,
                    discount: record.discount,
                });
            }
        }

        if !skipped_products.is_empty() {
            debug!(
                skipped = skipped_products.len(),
                max_products = self.max_products,
                "products beyond the per-group cap were skipped"
            );
        }

        let groups: Vec<ProductGroup> = drafts
            .into_iter()
            .map(|draft| ProductGroup::new(draft.name, draft.products, week_count))
            .collect();

        info!(
            groups = groups.len(),
            products = groups.iter().map(ProductGroup::len).sum::<usize>(),
            weeks = week_count,
            "demand model built"
        );

        Ok(DemandModel::new(horizon, groups))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use crate::products::PriceDemand;

    use super::*;

    fn record(product: u64, group: &str, week: WeekId, discount: u32, demand: u64) -> DemandRecord {
        DemandRecord {
            product_id: ProductId(product),
            discount: Discount::from_points(discount),
            week,
            group: group.to_string(),
            price_demand: PriceDemand::new(Decimal::TEN, demand),
            inventory: 100,
            cost: Decimal::from(4),
        }
    }

    #[test]
    fn groups_and_products_keep_input_order() -> TestResult {
        let records = [
            record(2, "b", 1, 0, 5),
            record(1, "a", 1, 0, 5),
            record(3, "b", 1, 0, 5),
            record(2, "b", 2, 0, 5),
            record(1, "a", 2, 0, 5),
            record(3, "b", 2, 0, 5),
        ];

        let model = DemandModelBuilder::new().build(&records)?;

        let names: Vec<&str> = model.groups().iter().map(ProductGroup::name).collect();
        assert_eq!(names, vec!["b", "a"]);

        let group = model.group("b").ok_or("missing group b")?;
        let ids: Vec<ProductId> = group.products().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![ProductId(2), ProductId(3)]);

        assert_eq!(model.horizon().len(), 2);
        assert_eq!(model.product_count(), 3);

        Ok(())
    }

    #[test]
    fn missing_row_removes_tier_from_the_group_week() -> TestResult {
        let records = [
            record(1, "g", 1, 0, 5),
            record(1, "g", 1, 10, 7),
            record(2, "g", 1, 0, 5),
        ];

        let model = DemandModelBuilder::new().build(&records)?;
        let group = model.group("g").ok_or("missing group")?;

        assert_eq!(group.eligible(0), &[Discount::ZERO]);
        assert_eq!(group.discounts().len(), 2);

        Ok(())
    }

    #[test]
    fn product_cap_skips_later_products() -> TestResult {
        let records = [
            record(1, "g", 1, 0, 5),
            record(2, "g", 1, 0, 5),
            record(3, "g", 1, 0, 5),
        ];

        let model = DemandModelBuilder::new().max_products(2).build(&records)?;

        assert_eq!(model.product_count(), 2);

        Ok(())
    }

    #[test]
    fn week_cap_truncates_horizon() -> TestResult {
        let records = [
            record(1, "g", 1, 0, 5),
            record(1, "g", 2, 0, 5),
            record(1, "g", 3, 0, 5),
        ];

        let model = DemandModelBuilder::new().weeks(Some(2)).build(&records)?;

        assert_eq!(model.horizon().len(), 2);
        assert_eq!(model.groups().first().map(ProductGroup::week_count), Some(2));

        Ok(())
    }

    #[test]
    fn duplicate_row_is_rejected() {
        let records = [record(1, "g", 1, 0, 5), record(1, "g", 1, 0, 6)];

        assert!(matches!(
            DemandModelBuilder::new().build(&records),
            Err(ModelError::DuplicateRow { week: 1, .. })
        ));
    }

    #[test]
    fn conflicting_inventory_is_rejected() {
        let mut second = record(1, "g", 2, 0, 5);
        second.inventory = 50;

        assert!(matches!(
            DemandModelBuilder::new().build(&[record(1, "g", 1, 0, 5), second]),
            Err(ModelError::ConflictingProduct {
                field: "total_inventory",
                ..
            })
        ));
    }

    #[test]
    fn product_in_two_groups_is_rejected() {
        assert!(matches!(
            DemandModelBuilder::new().build(&[record(1, "a", 1, 0, 5), record(1, "b", 1, 0, 5)]),
            Err(ModelError::ProductInMultipleGroups { .. })
        ));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            DemandModelBuilder::new().build(&[]),
            Err(ModelError::Empty)
        ));
    }
}
