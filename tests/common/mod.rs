#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use trellis::model::builder::fields;
use trellis::{Datatype, Engine, Frame, MemoryStore, Schema, Shape, ShapeId, Value};

pub const PEOPLE: &str = "https://example.org/people/";
pub const COMPANIES: &str = "https://example.org/companies/";

pub struct Org {
    pub schema: Schema,
    pub employee: ShapeId,
    pub company: ShapeId,
    pub directory: ShapeId,
}

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn org_schema() -> Org {
    let mut schema = Schema::new();
    let string = schema.insert("string", Shape::of(Datatype::String));
    let integer = schema.insert("integer", Shape::of(Datatype::Integer));
    let employee = schema.declare("Employee");
    let company = schema.declare("Company");
    schema.define(
        employee,
        Shape::new()
            .class("urn:org:Employee")
            .base(PEOPLE)
            .field("name", "urn:org:name", string)
            .field("seniority", "urn:org:seniority", integer)
            .field("supervisor", "urn:org:supervisor", employee)
            .inverse_field("reports", "urn:org:supervisor", employee)
            .inverse_field("employer", "urn:org:employs", company),
    );
    schema.define(
        company,
        Shape::new()
            .class("urn:org:Company")
            .base(COMPANIES)
            .field("name", "urn:org:name", string)
            .field("employees", "urn:org:employs", employee),
    );
    let directory = schema.insert(
        "Directory",
        Shape::new()
            .as_virtual()
            .base("https://example.org/")
            .field("people", "urn:org:member", employee),
    );
    Org {
        schema,
        employee,
        company,
        directory,
    }
}

pub fn person(id: &str) -> Value {
    Value::iri(format!("{PEOPLE}{id}"))
}

pub fn employee_frame(id: &str, name: &str, seniority: i64, supervisor: Option<&str>) -> Frame {
    let frame = Frame::with_id(format!("{PEOPLE}{id}"))
        .with("name", [name])
        .with("seniority", [seniority]);
    match supervisor {
        Some(sup) => frame.with_frame("supervisor", Frame::with_id(format!("{PEOPLE}{sup}"))),
        None => frame,
    }
}

/// Acme with a three-level hierarchy:
/// 1001 (seniority 4) supervises 1500 (3) and 1702 (2); 1500 supervises 1800 (1).
pub fn seeded() -> trellis::Result<(Engine<MemoryStore>, Org)> {
    init_tracing();
    let org = org_schema();
    let engine = Engine::new(MemoryStore::new(), org.schema.clone());
    let staff = [
        ("1001", "Ada", 4, None),
        ("1500", "Grace", 3, Some("1001")),
        ("1702", "Alan", 2, Some("1001")),
        ("1800", "Edsger", 1, Some("1500")),
    ];
    for (id, name, seniority, supervisor) in staff {
        assert!(engine.create(id, org.employee, &employee_frame(id, name, seniority, supervisor))?);
    }
    let mut acme = Frame::with_id(format!("{COMPANIES}acme")).with("name", ["Acme"]);
    for (id, ..) in staff {
        acme = acme.with_frame("employees", Frame::with_id(format!("{PEOPLE}{id}")));
    }
    assert!(engine.create("acme", org.company, &acme)?);
    engine.store().reset_round_trips();
    Ok((engine, org))
}

pub fn name_model() -> Frame {
    fields(["name"])
}
