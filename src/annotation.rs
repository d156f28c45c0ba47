//! `RuntimeVisibleAnnotations` payload parsing (JVMS 4.7.16).

use crate::bytes::ByteCursor;
use crate::classfile::ConstantPool;
use crate::error::{AnalysisError, Result};

/// Element value tags defined by the class file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementTag {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    String,
    Enum,
    Class,
    Annotation,
    Array,
}

impl TryFrom<u8> for ElementTag {
    type Error = AnalysisError;

    fn try_from(tag: u8) -> Result<Self> {
        let tag = match tag {
            b'B' => ElementTag::Byte,
            b'C' => ElementTag::Char,
            b'D' => ElementTag::Double,
            b'F' => ElementTag::Float,
            b'I' => ElementTag::Int,
            b'J' => ElementTag::Long,
            b'S' => ElementTag::Short,
            b'Z' => ElementTag::Boolean,
            b's' => ElementTag::String,
            b'e' => ElementTag::Enum,
            b'c' => ElementTag::Class,
            b'@' => ElementTag::Annotation,
            b'[' => ElementTag::Array,
            _ => return Err(AnalysisError::UnsupportedAnnotationTag { tag }),
        };
        Ok(tag)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface, e.g. `Ljava/lang/Deprecated;`.
    pub type_descriptor: String,
    pub elements: Vec<ElementValuePair>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementValuePair {
    pub name: String,
    pub value: ElementValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant; the pool index is kept unresolved.
    Const { tag: ElementTag, const_value_index: u16 },
    Enum { type_descriptor: String, const_name: String },
    Class { return_descriptor: String },
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl Annotation {
    /// Descriptors of every type this annotation mentions: its own type, enum
    /// constant types and class literals, recursively.
    pub fn referenced_descriptors(&self) -> Vec<&str> {
        let mut descriptors = vec![self.type_descriptor.as_str()];
        for pair in &self.elements {
            pair.value.collect_descriptors(&mut descriptors);
        }
        descriptors
    }
}

impl ElementValue {
    fn collect_descriptors<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ElementValue::Const { .. } => {}
            ElementValue::Enum {
                type_descriptor, ..
            } => out.push(type_descriptor),
            ElementValue::Class { return_descriptor } => out.push(return_descriptor),
            ElementValue::Annotation(annotation) => {
                out.extend(annotation.referenced_descriptors());
            }
            ElementValue::Array(values) => {
                for value in values {
                    value.collect_descriptors(out);
                }
            }
        }
    }
}

/// Parse a complete `RuntimeVisibleAnnotations` attribute body.
pub fn parse_annotations(data: &[u8], pool: &ConstantPool) -> Result<Vec<Annotation>> {
    let mut cursor = ByteCursor::new(data);
    let count = cursor.read_u16()?;
    let mut annotations = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        annotations.push(read_annotation(&mut cursor, pool)?);
    }
    if !cursor.is_empty() {
        return Err(AnalysisError::malformed(format!(
            "trailing bytes in annotations after offset {}",
            cursor.offset()
        )));
    }
    Ok(annotations)
}

fn read_annotation(cursor: &mut ByteCursor<'_>, pool: &ConstantPool) -> Result<Annotation> {
    let type_descriptor = pool.utf8(cursor.read_u16()?)?.to_string();
    let pair_count = cursor.read_u16()?;
    let mut elements = Vec::with_capacity(usize::from(pair_count));
    for _ in 0..pair_count {
        let name = pool.utf8(cursor.read_u16()?)?.to_string();
        let value = read_element_value(cursor, pool)?;
        elements.push(ElementValuePair { name, value });
    }
    Ok(Annotation {
        type_descriptor,
        elements,
    })
}

fn read_element_value(cursor: &mut ByteCursor<'_>, pool: &ConstantPool) -> Result<ElementValue> {
    let tag = ElementTag::try_from(cursor.read_u8()?)?;
    let value = match tag {
        ElementTag::Byte
        | ElementTag::Char
        | ElementTag::Double
        | ElementTag::Float
        | ElementTag::Int
        | ElementTag::Long
        | ElementTag::Short
        | ElementTag::Boolean
        | ElementTag::String => ElementValue::Const {
            tag,
            const_value_index: cursor.read_u16()?,
        },
        ElementTag::Enum => ElementValue::Enum {
            type_descriptor: pool.utf8(cursor.read_u16()?)?.to_string(),
            const_name: pool.utf8(cursor.read_u16()?)?.to_string(),
        },
        ElementTag::Class => ElementValue::Class {
            return_descriptor: pool.utf8(cursor.read_u16()?)?.to_string(),
        },
        ElementTag::Annotation => ElementValue::Annotation(read_annotation(cursor, pool)?),
        ElementTag::Array => {
            let count = cursor.read_u16()?;
            let mut values = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                values.push(read_element_value(cursor, pool)?);
            }
            ElementValue::Array(values)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::parse_class;
    use crate::testing::{AnnotationSpec, ClassFileBuilder, ValueSpec};

    fn parse_class_annotations(annotation: AnnotationSpec) -> Result<Vec<Annotation>> {
        let mut builder = ClassFileBuilder::new("a/Annotated");
        builder.class_annotations(vec![annotation]);
        let class = parse_class(&builder.build()).expect("parse class");
        let data = class.annotations.expect("annotation attribute");
        parse_annotations(&data, &class.constant_pool)
    }

    #[test]
    fn parses_nested_values() {
        let annotation = AnnotationSpec::new("Lx/Marker;")
            .element("count", ValueSpec::Int(3))
            .element("label", ValueSpec::Str("hi".to_string()))
            .element("mode", ValueSpec::Enum("Ly/Mode;".to_string(), "FAST".to_string()))
            .element(
                "inner",
                ValueSpec::Annotation(
                    AnnotationSpec::new("Lz/Inner;")
                        .element("type", ValueSpec::Class("[Lw/W;".to_string())),
                ),
            );

        let annotations = parse_class_annotations(annotation).expect("parse annotations");

        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].elements.len(), 4);
        assert_eq!(
            annotations[0].elements[2].value,
            ElementValue::Enum {
                type_descriptor: "Ly/Mode;".to_string(),
                const_name: "FAST".to_string()
            }
        );
        assert_eq!(
            annotations[0].referenced_descriptors(),
            vec!["Lx/Marker;", "Ly/Mode;", "Lz/Inner;", "[Lw/W;"]
        );
    }

    #[test]
    fn array_values_recurse() {
        let annotation = AnnotationSpec::new("Lq/Types;").element(
            "value",
            ValueSpec::Array(vec![
                ValueSpec::Class("Lx/A;".to_string()),
                ValueSpec::Class("Ly/B;".to_string()),
                ValueSpec::Class("Lx/C;".to_string()),
            ]),
        );

        let annotations = parse_class_annotations(annotation).expect("parse annotations");
        let ElementValue::Array(values) = &annotations[0].elements[0].value else {
            panic!("expected array value");
        };

        assert_eq!(values.len(), 3);
    }

    #[test]
    fn unknown_tag_is_reported() {
        let annotation = AnnotationSpec::new("Lx/Marker;").element("bad", ValueSpec::RawTag(b'Q'));

        let err = parse_class_annotations(annotation).expect_err("unknown tag");

        assert_eq!(err, AnalysisError::UnsupportedAnnotationTag { tag: b'Q' });
    }

    #[test]
    fn every_defined_tag_is_modeled() {
        for tag in b"BCDFIJSZsec@[" {
            assert!(ElementTag::try_from(*tag).is_ok(), "{}", *tag as char);
        }
        assert!(ElementTag::try_from(b'x').is_err());
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let class = parse_class(&ClassFileBuilder::new("a/A").build()).expect("parse class");

        let err = parse_annotations(&[0, 1, 0], &class.constant_pool).expect_err("truncated");

        assert!(matches!(err, AnalysisError::MalformedClassFile(_)));
    }
}
