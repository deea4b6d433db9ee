//! Walk through a small pipeline against an in-memory database.
//!
//! Run with `cargo run -p duckpipe --example pipeline`. Set `RUST_LOG=debug`
//! to see every statement sent to DuckDB.

use duckpipe::prelude::*;
use duckpipe::Config;

fn main() {
    if let Err(e) = run_pipeline() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_pipeline() -> Result<()> {
    let engine = duckpipe::open(&Config::default())?;

    let orders = Relation::query(
        &engine,
        "select * from (values (1, 'ann', 30.0), (2, 'bob', 12.5), (3, 'ann', 7.5)) t(id, customer, amount)",
    )?;
    println!("orders:\n{}", orders);

    let per_customer = orders
        .clone()
        .apply(ops!["select customer, sum(amount) as total group by customer order by customer"])?;
    if let Output::Relation(ref relation) = per_customer {
        println!("per customer:\n{}", relation);
    }

    let top = per_customer.apply(ops!["select customer order by total desc limit 1", Shape::Scalar])?;
    println!("top customer: {:?}", top.into_value());

    let customers = Relation::query(&engine, "select * from (values ('ann', 'NL'), ('bob', 'US')) t(customer, country)")?;
    let catalog = Collection::new(engine.clone(), [("orders", orders), ("customers", customers)]);
    println!("{}", catalog);

    let by_country = catalog.apply(ops![
        "select country, count(*) as n from orders join customers using (customer) group by country order by country",
        Format::Frame,
    ])?;
    if let Some(frame) = by_country.into_frame() {
        for row in frame.rows() {
            println!("{:?}", row);
        }
    }

    Ok(())
}
