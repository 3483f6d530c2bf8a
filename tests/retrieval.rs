mod common;

use common::{person, seeded, COMPANIES};
use trellis::model::builder::fields;
use trellis::{
    Config, Constraint, Criterion, Engine, Expression, Frame, MemoryStore, Probe, Query,
    Result, SchemaError, Term, Transform, TrellisError, Value,
};

fn ids(frames: &[Frame]) -> Vec<Value> {
    frames
        .iter()
        .filter_map(|frame| frame.id().cloned().map(Value::Iri))
        .collect()
}

fn names(frames: &[Frame]) -> Vec<Value> {
    frames
        .iter()
        .flat_map(|frame| frame.scalars("name").into_iter().cloned())
        .collect()
}

#[test]
fn retrieves_scalar_fields() -> Result<()> {
    let (engine, org) = seeded()?;
    let frame = engine
        .retrieve("1702", org.employee, &fields(["name", "seniority"]))?
        .expect("employee exists");
    assert_eq!(frame.id().map(|id| id.as_str()), Some("https://example.org/people/1702"));
    assert_eq!(frame.scalars("name"), vec![&Value::from("Alan")]);
    assert_eq!(frame.scalars("seniority"), vec![&Value::Int(2)]);
    assert_eq!(engine.store().round_trips(), 1);
    Ok(())
}

#[test]
fn missing_resources_yield_none() -> Result<()> {
    let (engine, org) = seeded()?;
    let frame = engine.retrieve("9999", org.employee, &fields(["name"]))?;
    assert!(frame.is_none());
    assert_eq!(engine.store().round_trips(), 1);
    assert_eq!(engine.store().open_connections(), 0);
    Ok(())
}

#[test]
fn raw_reference_fields_return_ids() -> Result<()> {
    let (engine, org) = seeded()?;
    let frame = engine
        .retrieve("1800", org.employee, &fields(["supervisor", "employer"]))?
        .expect("employee exists");
    assert_eq!(frame.scalars("supervisor"), vec![&person("1500")]);
    assert_eq!(
        frame.scalars("employer"),
        vec![&Value::iri(format!("{COMPANIES}acme"))]
    );
    Ok(())
}

#[test]
fn nested_templates_take_one_round_per_depth() -> Result<()> {
    let (engine, org) = seeded()?;
    let model = Frame::new().with_frame(
        "employees",
        Frame::new()
            .field("name")
            .with_frame("supervisor", fields(["name"])),
    );
    let acme = engine.retrieve("acme", org.company, &model)?.expect("company exists");
    let staff: Vec<&Frame> = acme.values("employees").iter().filter_map(Term::as_frame).collect();
    assert_eq!(staff.len(), 4);

    let alan = staff
        .iter()
        .find(|frame| frame.id().map(|id| id.as_str()) == Some("https://example.org/people/1702"))
        .expect("1702 listed");
    let boss = alan.values("supervisor")[0].as_frame().expect("nested frame");
    assert_eq!(boss.scalars("name"), vec![&Value::from("Ada")]);

    let ada = staff
        .iter()
        .find(|frame| frame.id().map(|id| id.as_str()) == Some("https://example.org/people/1001"))
        .expect("1001 listed");
    assert!(ada.values("supervisor").is_empty());

    // membership, then every name and supervisor at once; supervisor names
    // were already fetched as employee names
    assert_eq!(engine.store().round_trips(), 2);
    Ok(())
}

#[test]
fn filters_and_orders_collections() -> Result<()> {
    let (engine, org) = seeded()?;
    let seniority = Expression::path(["seniority"]);
    let query = Query::new(fields(["name"]))
        .with_filter(seniority.clone(), Constraint::gte(3))
        .with_order(seniority, Criterion::Decreasing);
    let senior = engine.list("acme", org.company, "employees", query)?;
    assert_eq!(ids(&senior), vec![person("1001"), person("1500")]);
    assert_eq!(names(&senior), vec![Value::from("Ada"), Value::from("Grace")]);
    assert_eq!(engine.store().round_trips(), 2);
    Ok(())
}

#[test]
fn focus_pins_matches_to_the_front() -> Result<()> {
    let (engine, org) = seeded()?;
    let name = Expression::path(["name"]);
    let query = Query::new(fields(["name"]))
        .with_focus(name.clone(), ["Grace"])
        .with_order(name, Criterion::Increasing);
    let staff = engine.list("acme", org.company, "employees", query)?;
    assert_eq!(
        names(&staff),
        vec![
            Value::from("Grace"),
            Value::from("Ada"),
            Value::from("Alan"),
            Value::from("Edsger"),
        ]
    );
    Ok(())
}

#[test]
fn pages_with_offset_and_limit() -> Result<()> {
    let (engine, org) = seeded()?;
    let query = Query::new(Frame::new())
        .with_order(Expression::path(["seniority"]), Criterion::Increasing)
        .with_offset(1)
        .with_limit(2);
    let page = engine.list("acme", org.company, "employees", query)?;
    assert_eq!(ids(&page), vec![person("1702"), person("1500")]);
    Ok(())
}

#[test]
fn zero_limit_uses_the_page_size() -> Result<()> {
    let (engine, org) = seeded()?;
    let engine = Engine::with_config(
        engine.store().clone(),
        org.schema.clone(),
        Config::default().with_page_size(3),
    );
    let page = engine.list("acme", org.company, "employees", Query::new(Frame::new()))?;
    assert_eq!(page.len(), 3);
    Ok(())
}

#[test]
fn count_probe_yields_one_row() -> Result<()> {
    let (engine, org) = seeded()?;
    let headcount = Probe::new("headcount", Expression::new([Transform::Count], Vec::<String>::new()));
    let query = Query::new(Frame::new().with_probe(headcount));
    let rows = engine.list("acme", org.company, "employees", query)?;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].id().is_none());
    assert_eq!(rows[0].probe("headcount"), &[Term::Value(Value::Int(4))]);
    Ok(())
}

#[test]
fn grouped_probes_reduce_per_key() -> Result<()> {
    let (engine, org) = seeded()?;
    let model = Frame::new()
        .with_probe(Probe::new("boss", Expression::path(["supervisor"])))
        .with_probe(Probe::new(
            "team",
            Expression::new([Transform::Count], Vec::<String>::new()),
        ));
    let rows = engine.list("acme", org.company, "employees", Query::new(model))?;
    assert_eq!(rows.len(), 3);
    let team_of = |boss: &Value| {
        rows.iter()
            .find(|row| row.probe("boss") == [Term::Value(boss.clone())])
            .map(|row| row.probe("team").to_vec())
    };
    assert_eq!(team_of(&person("1001")), Some(vec![Term::Value(Value::Int(2))]));
    assert_eq!(team_of(&person("1500")), Some(vec![Term::Value(Value::Int(1))]));
    Ok(())
}

#[test]
fn resource_probes_fill_the_frame() -> Result<()> {
    let (engine, org) = seeded()?;
    let model = Frame::new()
        .with_probe(Probe::new("reports", Expression::new([Transform::Count], ["reports"])));
    let ada = engine.retrieve("1001", org.employee, &model)?.expect("employee exists");
    assert_eq!(ada.probe("reports"), &[Term::Value(Value::Int(2))]);
    assert_eq!(engine.store().round_trips(), 1);
    Ok(())
}

#[test]
fn nested_collections_share_rounds() -> Result<()> {
    let (engine, org) = seeded()?;
    let model = Frame::new()
        .field("name")
        .with_query("reports", Query::new(fields(["name"])));
    let staff = engine.list("acme", org.company, "employees", Query::new(model))?;
    let ada = staff
        .iter()
        .find(|frame| frame.scalars("name") == vec![&Value::from("Ada")])
        .expect("Ada listed");
    let reports: Vec<Frame> = ada
        .values("reports")
        .iter()
        .filter_map(Term::as_frame)
        .cloned()
        .collect();
    assert_eq!(names(&reports), vec![Value::from("Grace"), Value::from("Alan")]);
    assert_eq!(engine.store().round_trips(), 2);
    Ok(())
}

#[test]
fn virtual_containers_enumerate_by_class() -> Result<()> {
    let (engine, org) = seeded()?;
    let query = Query::new(fields(["name"]))
        .with_filter(Expression::path(["name"]), Constraint::like("a"))
        .with_order(Expression::path(["name"]), Criterion::Increasing);
    let people = engine.list("directory", org.directory, "people", query)?;
    assert_eq!(
        names(&people),
        vec![Value::from("Ada"), Value::from("Alan"), Value::from("Grace")]
    );
    Ok(())
}

#[test]
fn explain_renders_the_collection_program() -> Result<()> {
    let (engine, org) = seeded()?;
    let query = Query::new(fields(["name"])).with_filter(Expression::path(["seniority"]), Constraint::lt(3));
    let text = engine.explain("acme", org.company, "employees", &query)?;
    assert!(text.starts_with("SELECT DISTINCT ?v0 WHERE {"));
    assert!(text.contains("<https://example.org/companies/acme> <urn:org:employs> ?v0 ."));
    assert!(text.contains("FILTER((?v1 < 3))"));
    assert!(text.ends_with("LIMIT 100"));
    assert_eq!(engine.store().round_trips(), 0);
    Ok(())
}

#[test]
fn unknown_fields_are_schema_errors() -> Result<()> {
    let (engine, org) = seeded()?;
    let err = engine
        .retrieve("1702", org.employee, &fields(["salary"]))
        .expect_err("salary is not declared");
    assert!(matches!(
        err,
        TrellisError::Schema(SchemaError::UnknownProperty { .. })
    ));
    assert_eq!(engine.store().open_connections(), 0);
    Ok(())
}

#[test]
fn round_limit_stops_runaway_models() -> Result<()> {
    let (engine, org) = seeded()?;
    let engine = Engine::with_config(
        engine.store().clone(),
        org.schema.clone(),
        Config::default().with_max_rounds(1),
    );
    let model = Frame::new().with_frame("employees", fields(["name"]));
    let err = engine.retrieve("acme", org.company, &model).expect_err("needs two rounds");
    assert!(matches!(err, TrellisError::RoundLimit { max: 1 }));
    assert_eq!(engine.store().open_connections(), 0);
    Ok(())
}

#[test]
fn empty_stores_have_no_members() -> Result<()> {
    let org = common::org_schema();
    let engine = Engine::new(MemoryStore::new(), org.schema);
    let rows = engine.list("acme", org.company, "employees", Query::new(Frame::new()))?;
    assert!(rows.is_empty());
    Ok(())
}
