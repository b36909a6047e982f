//! Shared builders for unit tests.

use rust_decimal::Decimal;

use crate::{
    discounts::Discount,
    groups::ProductGroup,
    horizon::{HorizonError, PlanningHorizon},
    model::DemandModel,
    products::{PriceDemand, Product, ProductId},
};

/// Group with one product offering only the zero discount, one `(price, demand)` pair per week.
pub(crate) fn single_product_group(
    inventory: u64,
    weeks: &[(u32, u64)],
    cost: u32,
) -> ProductGroup {
    let mut product = Product::new(ProductId(1), inventory, Decimal::from(cost), "g", weeks.len());

    for (week, (price, demand)) in weeks.iter().copied().enumerate() {
        product.curve.insert(
            week,
            Discount::ZERO,
            PriceDemand::new(Decimal::from(price), demand),
        );
    }

    ProductGroup::new("g", vec![product], weeks.len())
}

/// Two-week horizon with week ids 1 and 2.
pub(crate) fn two_week_horizon() -> Result<PlanningHorizon, HorizonError> {
    PlanningHorizon::from_span(1, 2)
}

/// Product whose demand grows linearly with the discount, offering `tiers` in every week.
///
/// Price at discount `d` is `base_price * (100 - d) / 100`, demand is `base_demand + d`.
pub(crate) fn elastic_product(
    id: u64,
    inventory: u64,
    base_price: u32,
    base_demand: u64,
    cost: u32,
    tiers: &[u32],
    week_count: usize,
) -> Product {
    let mut product = Product::new(
        ProductId(id),
        inventory,
        Decimal::from(cost),
        "g",
        week_count,
    );

    for week in 0..week_count {
        for tier in tiers.iter().copied() {
            let price = Decimal::from(base_price) * Decimal::from(100 - tier.min(100))
                / Decimal::ONE_HUNDRED;

            product.curve.insert(
                week,
                Discount::from_points(tier),
                PriceDemand::new(price, base_demand + u64::from(tier)),
            );
        }
    }

    product
}

/// Model with one group of elastic products sharing the given tiers in every week.
pub(crate) fn elastic_model(
    products: usize,
    tiers: &[u32],
    week_count: usize,
) -> Result<DemandModel, HorizonError> {
    let members = (1..=products)
        .map(|id| {
            let id = u64::try_from(id).unwrap_or_default();
            let base_price = 20 + u32::try_from(id).unwrap_or_default();

            elastic_product(id, 60 + 10 * id, base_price, 10, 8, tiers, week_count)
        })
        .collect();

    let horizon = PlanningHorizon::from_span(1, i64::try_from(week_count).unwrap_or(1))?;

    Ok(DemandModel::new(
        horizon,
        vec![ProductGroup::new("g", members, week_count)],
    ))
}
