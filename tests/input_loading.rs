//! Loading demand files from disk into a model.

use std::{fs, path::PathBuf};

use testresult::TestResult;

use clearance::{
    discounts::Discount,
    input::{InputError, load_records},
    model::{DemandModel, DemandModelBuilder},
    settings::Settings,
};

fn fixture_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures/clearance")
        .join(file)
}

#[test]
fn reordered_columns_load_the_same_model() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("demand.csv");

    let original = fs::read_to_string(fixture_path("demand.csv"))?;
    let mut reordered = String::from(
        "cost_price,selling_price,demand,group,week,price,total_inventory,product_id\n",
    );

    for line in original.lines().skip(1) {
        let fields: Vec<&str> = line.split(',').collect();

        if let [id, price, week, group, demand, selling, inventory, cost] = fields.as_slice() {
            reordered.push_str(&format!(
                "{cost},{selling},{demand},{group},{week},{price},{inventory},{id}\n"
            ));
        }
    }

    fs::write(&path, reordered)?;

    let expected = load_records(fixture_path("demand.csv"))?;
    let loaded = load_records(&path)?;

    assert_eq!(loaded, expected);

    let model = DemandModel::from_records(&loaded, &Settings::default())?;
    let names: Vec<&str> = model.groups().iter().map(|g| g.name()).collect();

    assert_eq!(names, vec!["knitwear", "footwear"]);

    let knitwear = model.group("knitwear").ok_or("missing knitwear")?;

    assert_eq!(
        knitwear.eligible(2),
        &[
            Discount::ZERO,
            Discount::from_points(10),
            Discount::from_points(20)
        ]
    );

    Ok(())
}

#[test]
fn product_and_week_caps_shrink_the_model() -> TestResult {
    let records = load_records(fixture_path("demand.csv"))?;

    let model = DemandModelBuilder::new()
        .max_products(1)
        .weeks(Some(2))
        .build(&records)?;

    assert_eq!(model.horizon().len(), 2);
    assert_eq!(model.product_count(), 2);

    let knitwear = model.group("knitwear").ok_or("missing knitwear")?;
    let ids: Vec<u64> = knitwear.products().iter().map(|p| p.id.0).collect();

    assert_eq!(ids, vec![101]);

    Ok(())
}

#[test]
fn malformed_rows_are_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.csv");

    fs::write(
        &path,
        "product_id,price,week,group,demand,selling_price,total_inventory,cost_price\n\
         1,0,1,g,10,5.00,20,2\n\
         2,0,1,g,-3,5.00,20,2\n",
    )?;

    let error = load_records(&path).err().ok_or("expected an error")?;

    assert!(matches!(
        error,
        InputError::InvalidField {
            row: 2,
            field: "demand",
            ..
        }
    ));

    assert!(matches!(
        load_records(dir.path().join("missing.csv")),
        Err(InputError::Io(_))
    ));

    Ok(())
}
