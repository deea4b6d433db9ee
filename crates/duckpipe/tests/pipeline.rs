//! End-to-end pipeline tests against an in-memory DuckDB
//!
//! Each test opens its own engine, so relation names never leak between tests.

use std::fs;

use duckpipe::prelude::*;
use duckpipe::relation::SNIPPET_PREFIX;
use serde_json::json;

fn engine() -> Engine {
    Engine::open_in_memory().unwrap()
}

fn numbers(engine: &Engine, n: usize) -> Relation {
    Relation::query(engine, format!("select * from range({}) t(i)", n)).unwrap()
}

fn two_by_two(engine: &Engine) -> Relation {
    Relation::query(engine, "select 1 as a, 2 as b union all select 3, 4").unwrap()
}

fn list(out: Output) -> Vec<serde_json::Value> {
    match out.into_value() {
        Some(serde_json::Value::Array(values)) => values,
        other => panic!("expected a list, got {:?}", other),
    }
}

#[test]
fn test_identity_returns_same_relation() {
    let engine = engine();
    let r = numbers(&engine, 3);
    let name = r.handle().name().to_string();

    let out = r.apply(Vec::<Operator>::new()).unwrap();
    let same = out.into_relation().expect("identity should keep the relation");
    assert_eq!(same.handle().name(), name);
}

#[test]
fn test_identity_on_collection() {
    let engine = engine();
    let c = Collection::new(engine.clone(), [("t", numbers(&engine, 2))]);

    let out = c.apply(Vec::<Operator>::new()).unwrap();
    let same = out.into_collection().expect("identity should keep the collection");
    assert_eq!(same.names().collect::<Vec<_>>(), vec!["t"]);
}

#[test]
fn test_chain_equals_stepwise_application() {
    let engine = engine();
    let a = "select i + 1 as j";
    let b = "select j * 2 as k order by k";

    let chained = numbers(&engine, 4).apply(ops![a, b, Shape::List]).unwrap();

    let step = numbers(&engine, 4).apply(ops![a]).unwrap();
    let step = step.apply(ops![b]).unwrap();
    let stepwise = step.apply(ops![Shape::List]).unwrap();

    assert_eq!(list(chained), list(stepwise));
}

#[test]
fn test_nested_sequences_flatten() {
    let engine = engine();

    let nested = numbers(&engine, 4)
        .apply(vec![
            Operator::from(vec!["select i + 1 as j", "select max(j) as top"]),
            Operator::from(Shape::Scalar),
        ])
        .unwrap();
    let flat = numbers(&engine, 4)
        .apply(ops!["select i + 1 as j", "select max(j) as top", Shape::Scalar])
        .unwrap();

    assert_eq!(nested.into_value(), Some(json!(4)));
    assert_eq!(flat.into_value(), Some(json!(4)));
}

#[test]
fn test_alias_creates_single_entry_collection() {
    let engine = engine();
    let out = (numbers(&engine, 3) | "as foo").unwrap();

    let c = out.into_collection().expect("alias should produce a collection");
    assert_eq!(c.len(), 1);
    assert_eq!(c.names().collect::<Vec<_>>(), vec!["foo"]);
}

#[test]
fn test_alias_then_query_by_name() {
    let engine = engine();
    let count = numbers(&engine, 3)
        .apply(ops!["as foo", "select count(*) from foo", Shape::Scalar])
        .unwrap();
    assert_eq!(count.into_value(), Some(json!(3)));
}

#[test]
fn test_single_cell_scalar_matches_list() {
    let engine = engine();
    let r = Relation::query(&engine, "select 42 as answer").unwrap();

    let scalar = r.as_scalar().unwrap();
    let first = r.as_list().unwrap().remove(0);
    assert_eq!(scalar, first);
    assert_eq!(scalar, json!(42));
}

#[test]
fn test_two_by_two_rejects_list_and_scalar() {
    let engine = engine();
    let r = two_by_two(&engine);

    let err = r.as_list().unwrap_err();
    assert!(matches!(err, Error::Shape { rows: 2, columns: 2, .. }));
    assert!(err.to_string().contains("(2, 2)"));

    let err = r.clone().apply_one(Shape::Scalar).unwrap_err();
    assert!(err.to_string().contains("(2, 2)"));
}

#[test]
fn test_single_row_list_and_mapping() {
    let engine = engine();
    let r = Relation::query(&engine, "select 1 as a, 2 as b").unwrap();

    assert_eq!(list(r.clone().apply_one(Shape::List).unwrap()), vec![json!(1), json!(2)]);

    let mapping = r.apply_one(Shape::Mapping).unwrap();
    assert_eq!(mapping.into_value(), Some(json!({"a": 1, "b": 2})));
}

#[test]
fn test_mapping_rejects_two_rows() {
    let engine = engine();
    let err = two_by_two(&engine).as_mapping().unwrap_err();
    assert!(matches!(err, Error::Shape { rows: 2, .. }));
}

#[test]
fn test_collection_materialize_to_frame() {
    let engine = engine();
    let c = Collection::new(engine.clone(), [("t", numbers(&engine, 3))]);

    let out = c.apply_one("frame").unwrap();
    let materialized = out.into_collection().expect("materialize keeps the collection");

    match materialized.get("t").unwrap() {
        Raw::Frame(frame) => assert_eq!(frame.num_rows(), 3),
        other => panic!("expected a frame, got {:?}", other),
    }

    let count = materialized
        .apply(ops!["select count(*) from t", Shape::Scalar])
        .unwrap();
    assert_eq!(count.into_value(), Some(json!(3)));
}

#[test]
fn test_collection_materialize_to_arrow() {
    let engine = engine();
    let c = Collection::new(
        engine.clone(),
        [("a", numbers(&engine, 2)), ("b", numbers(&engine, 5))],
    );

    let materialized = c.materialize(Format::default()).unwrap();
    assert_eq!(materialized.names().collect::<Vec<_>>(), vec!["a", "b"]);
    match materialized.get("b").unwrap() {
        Raw::Arrow(batch) => assert_eq!(batch.num_rows(), 5),
        other => panic!("expected a record batch, got {:?}", other),
    }
}

#[test]
fn test_relation_materialize_formats() {
    let engine = engine();

    let batch = (numbers(&engine, 4) | "arrow").unwrap().into_arrow().unwrap();
    assert_eq!(batch.num_rows(), 4);

    let frame = (numbers(&engine, 4) >> Format::Frame).unwrap().into_frame().unwrap();
    assert_eq!(frame.shape(), (4, 1));
    assert_eq!(frame.columns(), vec!["i"]);
}

/// The `_tlb_<32 hex>` name a fragment was scoped under, read from the
/// statement that created the relation.
fn snippet_name(relation: &Relation) -> String {
    let sql = relation.handle().sql();
    let start = sql.find(SNIPPET_PREFIX).expect("fragment should bind a snippet name");
    sql[start..start + SNIPPET_PREFIX.len() + 32].to_string()
}

#[test]
fn test_back_to_back_fragments() {
    let engine = engine();
    let first = numbers(&engine, 5).sql("select i where i > 0").unwrap();
    let second = first.sql("select i where i > 2 order by i").unwrap();

    let (a, b) = (snippet_name(&first), snippet_name(&second));
    assert_ne!(a, b);
    for name in [&a, &b] {
        assert!(name[SNIPPET_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
    assert_eq!(second.as_list().unwrap(), vec![json!(3), json!(4)]);
}

#[test]
fn test_missing_name_is_engine_error() {
    let engine = engine();
    let c = Collection::new(engine.clone(), [("a", numbers(&engine, 1))]);

    let err = c.sql("select * from t").unwrap_err();
    assert!(matches!(err, Error::Engine(_)));
    assert!(err.to_string().contains("Table with name t does not exist"));
}

#[test]
fn test_pipe_operators_match_apply() {
    let engine = engine();

    let piped = ((numbers(&engine, 3) | "select i * 10 as x order by x").unwrap() >> Shape::List).unwrap();
    let applied = numbers(&engine, 3)
        .apply(ops!["select i * 10 as x order by x", Shape::List])
        .unwrap();

    assert_eq!(list(piped), list(applied));
}

#[test]
fn test_invoke_receives_current_value() {
    let engine = engine();
    let row_count = Operator::invoke(|out| {
        let relation = out
            .into_relation()
            .ok_or_else(|| Error::custom("expected a relation"))?;
        Ok(Output::Value(json!(relation.handle().row_count()?)))
    });

    let out = numbers(&engine, 6)
        .apply(ops!["select i where i % 2 = 0", row_count])
        .unwrap();
    assert_eq!(out.into_value(), Some(json!(3)));
}

#[test]
fn test_invoke_error_stops_pipeline() {
    let engine = engine();
    let fail = Operator::invoke(|_| Err(Error::custom("stop here")));

    let err = numbers(&engine, 2)
        .apply(ops![fail, "select 1"])
        .unwrap_err();
    assert_eq!(err.to_string(), "stop here");
}

#[test]
fn test_plain_value_rejects_sql() {
    let engine = engine();
    let err = numbers(&engine, 1)
        .apply(ops![Shape::Scalar, "select 1"])
        .unwrap_err();
    assert!(matches!(err, Error::NotAnEntity { operator: "sql", output: "value" }));
}

#[test]
fn test_collection_sql_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("count.sql");
    fs::write(&path, "select count(*) as n from t where i > 0;\n").unwrap();

    let engine = engine();
    let c = Collection::new(engine.clone(), [("t", numbers(&engine, 3))]);

    let n = c.sql(path.to_str().unwrap()).unwrap().as_scalar().unwrap();
    assert_eq!(n, json!(2));
}

#[test]
fn test_load_csv_and_query() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scores.csv");
    fs::write(&path, "name,score\nann,3\nbob,5\n").unwrap();
    let path = path.to_str().unwrap();

    let engine = engine();
    let score = Relation::load(&engine, path)
        .unwrap()
        .apply(ops!["select score where name = 'bob'", Shape::Scalar])
        .unwrap();
    assert_eq!(score.into_value(), Some(json!(5)));
}

#[test]
fn test_describe_mixed_collection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scores.csv");
    fs::write(&path, "name,score\nann,3\nbob,5\n").unwrap();
    let path = path.to_str().unwrap().to_string();

    let engine = engine();
    let c = Collection::load(
        &engine,
        [
            ("scores", Raw::Path(path.clone())),
            ("pairs", Raw::Query("select 1 as a, 2 as b union all select 3, 4".to_string())),
        ],
    )
    .unwrap();

    assert_eq!(
        c.describe().unwrap(),
        format!("Collection:\n    pairs: 2 x [a, b]\n    scores: '{}'", path)
    );
}

#[test]
fn test_collection_list_and_mapping_tags() {
    let engine = engine();
    let c = Collection::new(
        engine.clone(),
        [("b", numbers(&engine, 2)), ("a", numbers(&engine, 5))],
    );

    let names = c.clone().apply_one(Shape::List).unwrap();
    assert_eq!(names.into_value(), Some(json!(["a", "b"])));

    let summary = c.apply_one(Shape::Mapping).unwrap();
    assert_eq!(
        summary.into_value(),
        Some(json!({
            "a": {"rows": 5, "columns": ["i"]},
            "b": {"rows": 2, "columns": ["i"]}
        }))
    );
}

#[test]
fn test_collection_binds_relations_from_other_engine() {
    let home = engine();
    let away = engine();
    let c = Collection::new(
        home.clone(),
        [("local", numbers(&home, 4)), ("remote", numbers(&away, 2))],
    );

    let n = c
        .apply(ops!["select count(*) from local join remote using (i)", Shape::Scalar])
        .unwrap();
    assert_eq!(n.into_value(), Some(json!(2)));
}

#[test]
fn test_load_frame_round_trip() {
    let engine = engine();
    let frame = numbers(&engine, 3).to_frame().unwrap();

    let reloaded = Relation::load(&engine, frame)
        .unwrap()
        .apply(ops!["select i order by i desc", Shape::List])
        .unwrap();
    assert_eq!(list(reloaded), vec![json!(2), json!(1), json!(0)]);
}

#[test]
fn test_collection_frame_materialize_keeps_engine_types() {
    let engine = engine();
    let typed = Relation::query(
        &engine,
        "select interval 1 day as d, 'abc'::blob as b union all select interval 2 hour, '\\x00\\xFF'::blob",
    )
    .unwrap();
    let c = Collection::new(engine.clone(), [("t", typed)]);

    let materialized = c.materialize(Format::Frame).unwrap();
    match materialized.get("t").unwrap() {
        Raw::Frame(frame) => assert_eq!(frame.shape(), (2, 2)),
        other => panic!("expected a frame, got {:?}", other),
    }

    let types = materialized
        .clone()
        .apply(ops![
            "select typeof(d) as d, typeof(b) as b from t limit 1",
            Shape::Mapping,
        ])
        .unwrap();
    assert_eq!(types.into_value(), Some(json!({"d": "INTERVAL", "b": "BLOB"})));

    let longest = materialized
        .apply(ops!["select max(d) > interval 1 hour from t", Shape::Scalar])
        .unwrap();
    assert_eq!(longest.into_value(), Some(json!(true)));
}

#[test]
fn test_collection_statement_with_trailing_comment() {
    let engine = engine();
    let c = Collection::new(engine.clone(), [("t", numbers(&engine, 5))]);

    let n = c
        .apply(ops![
            "with x as (from t where i >= 3) select count(*) from x -- two rows",
            Shape::Scalar,
        ])
        .unwrap();
    assert_eq!(n.into_value(), Some(json!(2)));
}
