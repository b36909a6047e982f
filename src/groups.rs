//! Product Groups

use std::collections::BTreeSet;

use smallvec::SmallVec;

use crate::{discounts::Discount, products::Product};

/// Discount tiers offered in one week, sorted ascending.
pub type TierList = SmallVec<[Discount; 8]>;

/// Products that share one weekly discount calendar.
///
/// The per-week eligible tiers are derived when the group is created and never change afterwards:
/// a tier is eligible in a week only if every member product has a price/demand point for it.
#[derive(Debug, Clone)]
pub struct ProductGroup {
    name: String,
    products: Vec<Product>,
    discounts: BTreeSet<Discount>,
    eligible: Vec<TierList>,
}

impl ProductGroup {
    /// Create a group from its member products over a horizon of `week_count` weeks.
    pub fn new(name: impl Into<String>, products: Vec<Product>, week_count: usize) -> Self {
        let discounts: BTreeSet<Discount> = products
            .iter()
            .flat_map(|product| (0..week_count).flat_map(|week| product.curve.week(week)))
            .map(|(discount, _)| *discount)
            .collect();

        let eligible = (0..week_count)
            .map(|week| {
                // BTreeSet iteration is ascending, so the filtered list stays sorted.
                discounts
                    .iter()
                    .copied()
                    .filter(|discount| {
                        products
                            .iter()
                            .all(|product| product.curve.offers(week, *discount))
                    })
                    .collect()
            })
            .collect();

        Self {
            name: name.into(),
            products,
            discounts,
            eligible,
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member products in input order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Every discount tier observed for any member product in any week.
    pub fn discounts(&self) -> &BTreeSet<Discount> {
        &self.discounts
    }

    /// Eligible discount tiers of a week, sorted ascending.
    ///
    /// Weeks outside the horizon have no eligible tiers.
    pub fn eligible(&self, week: usize) -> &[Discount] {
        self.eligible
            .get(week)
            .map(SmallVec::as_slice)
            .unwrap_or_default()
    }

    /// Number of weeks the eligible lists cover.
    pub fn week_count(&self) -> usize {
        self.eligible.len()
    }

    /// First week with no eligible tier, if any. Such a group cannot be scheduled.
    pub fn first_week_without_tiers(&self) -> Option<usize> {
        self.eligible.iter().position(SmallVec::is_empty)
    }

    /// Total units on hand across member products at the start of the horizon.
    pub fn total_initial_inventory(&self) -> u64 {
        self.products
            .iter()
            .map(|product| product.initial_inventory)
            .sum()
    }

    /// Number of member products.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether the group has no products.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::products::{PriceDemand, ProductId};

    use super::*;

    fn product(id: u64, tiers_by_week: &[&[u32]]) -> Product {
        let mut product = Product::new(ProductId(id), 10, Decimal::ONE, "g", tiers_by_week.len());

        for (week, tiers) in tiers_by_week.iter().enumerate() {
            for tier in tiers.iter() {
                product.curve.insert(
                    week,
                    Discount::from_points(*tier),
                    PriceDemand::new(Decimal::TEN, 5),
                );
            }
        }

        product
    }

    #[test]
    fn eligible_tiers_are_the_intersection_across_products() {
        let group = ProductGroup::new(
            "g",
            vec![
                product(1, &[&[0, 10, 20], &[0, 10]]),
                product(2, &[&[20, 0], &[0, 10, 30]]),
            ],
            2,
        );

        assert_eq!(
            group.eligible(0),
            &[Discount::ZERO, Discount::from_points(20)]
        );
        assert_eq!(
            group.eligible(1),
            &[Discount::ZERO, Discount::from_points(10)]
        );
        assert_eq!(group.discounts().len(), 4);
    }

    #[test]
    fn week_outside_horizon_has_no_tiers() {
        let group = ProductGroup::new("g", vec![product(1, &[&[0]])], 1);

        assert!(group.eligible(3).is_empty());
        assert_eq!(group.first_week_without_tiers(), None);
    }

    #[test]
    fn week_with_disjoint_tiers_is_reported() {
        let group = ProductGroup::new(
            "g",
            vec![product(1, &[&[0], &[5]]), product(2, &[&[0], &[10]])],
            2,
        );

        assert_eq!(group.first_week_without_tiers(), Some(1));
    }

    #[test]
    fn total_inventory_sums_members() {
        let group = ProductGroup::new(
            "g",
            vec![product(1, &[&[0]]), product(2, &[&[0]])],
            1,
        );

        assert_eq!(group.total_initial_inventory(), 20);
    }
}
