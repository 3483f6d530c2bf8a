//! Helpers for assembling projection models.

use std::collections::BTreeSet;

use crate::error::SchemaError;
use crate::model::frame::{Field, Frame, Term};
use crate::model::shape::{Schema, ShapeId};
use crate::model::value::Datatype;

/// Model fetching the raw values of the given fields.
pub fn fields<I, S>(labels: I) -> Frame
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .fold(Frame::new(), |model, label| model.field(label.as_ref()))
}

/// Model projecting every field of a shape.
///
/// Resource-valued fields are expanded into nested templates up to `depth`
/// hops; beyond that they yield plain ids. Shapes already on the current
/// branch are not expanded again.
pub fn shape_model(schema: &Schema, shape: ShapeId, depth: usize) -> Result<Frame, SchemaError> {
    let mut branch = BTreeSet::new();
    expand(schema, shape, depth, &mut branch)
}

fn expand(
    schema: &Schema,
    shape: ShapeId,
    depth: usize,
    branch: &mut BTreeSet<ShapeId>,
) -> Result<Frame, SchemaError> {
    branch.insert(shape);
    let mut model = Frame::new();
    for field in schema.fields(shape)? {
        let label = &field.property.label;
        let nested = depth > 0
            && !branch.contains(&field.shape)
            && !matches!(schema.datatype(field.shape)?, Some(dt) if dt != Datatype::Resource)
            && !schema.fields(field.shape)?.is_empty();
        model = if nested {
            let child = expand(schema, field.shape, depth - 1, branch)?;
            model.with_frame(label, child)
        } else {
            model.field(label)
        };
    }
    branch.remove(&shape);
    Ok(model)
}

/// Model mirroring the fields of a data frame, nested frames included.
///
/// Nested frames become templates, so id-only references come back as
/// id-only frames. Used to retrieve exactly what was written.
pub fn model_of(frame: &Frame) -> Frame {
    let mut model = Frame::new();
    for (field, terms) in frame.fields() {
        let template = terms.iter().find_map(|term| match term {
            Term::Frame(child) => Some(model_of(child)),
            _ => None,
        });
        let terms = match template {
            Some(template) => vec![Term::Frame(template)],
            None => Vec::new(),
        };
        if let Field::Property(_) = field {
            model.insert(field.clone(), terms);
        }
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shape::Shape;

    #[test]
    fn shape_models_stop_at_cycles() -> Result<(), SchemaError> {
        let mut schema = Schema::new();
        let employee = schema.declare("Employee");
        let integer = schema.add(Shape::of(Datatype::Integer));
        schema.define(
            employee,
            Shape::new()
                .field("seniority", "urn:seniority", integer)
                .field("supervisor", "urn:supervisor", employee),
        );
        let model = shape_model(&schema, employee, 3)?;
        assert_eq!(model.len(), 2);
        assert!(model.values("supervisor").is_empty());
        Ok(())
    }

    #[test]
    fn models_mirror_data_frames() {
        let frame = Frame::with_id("urn:e:1")
            .with("seniority", [2])
            .with_frame("supervisor", Frame::with_id("urn:e:2"))
            .with_frame("team", Frame::with_id("urn:t:1").with("name", ["core"]));
        let model = model_of(&frame);
        assert!(model.id().is_none());
        let supervisor = model.values("supervisor")[0].as_frame().map(Frame::is_empty);
        assert_eq!(supervisor, Some(true));
        let team = model.values("team")[0].as_frame().map(Frame::len);
        assert_eq!(team, Some(1));
        assert_eq!(fields(["a", "b"]).len(), 2);
    }
}
