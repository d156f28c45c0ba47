//! Synthesizes class file bytes for tests.

use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
struct PoolWriter {
    bytes: Vec<u8>,
    next_index: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl PoolWriter {
    fn new() -> Self {
        Self {
            next_index: 1,
            ..Self::default()
        }
    }

    fn push(&mut self, entry: &[u8], slots: u16) -> u16 {
        let index = self.next_index;
        self.bytes.extend_from_slice(entry);
        self.next_index += slots;
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8.get(value) {
            return *index;
        }
        let mut entry = vec![1];
        entry.extend_from_slice(&(value.len() as u16).to_be_bytes());
        entry.extend_from_slice(value.as_bytes());
        let index = self.push(&entry, 1);
        self.utf8.insert(value.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let name_index = self.utf8(name);
        let mut entry = vec![7];
        entry.extend_from_slice(&name_index.to_be_bytes());
        let index = self.push(&entry, 1);
        self.classes.insert(name.to_string(), index);
        index
    }

    fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&value.to_be_bytes());
        self.push(&entry, 1)
    }
}

/// Annotation element value to encode.
#[derive(Clone, Debug)]
pub(crate) enum ValueSpec {
    Int(i32),
    Str(String),
    /// Enum type descriptor and constant name.
    Enum(String, String),
    /// Class literal return descriptor.
    Class(String),
    Annotation(AnnotationSpec),
    Array(Vec<ValueSpec>),
    /// Arbitrary tag byte followed by two zero bytes.
    RawTag(u8),
}

#[derive(Clone, Debug)]
pub(crate) struct AnnotationSpec {
    type_descriptor: String,
    elements: Vec<(String, ValueSpec)>,
}

impl AnnotationSpec {
    pub(crate) fn new(type_descriptor: &str) -> Self {
        Self {
            type_descriptor: type_descriptor.to_string(),
            elements: Vec::new(),
        }
    }

    pub(crate) fn element(mut self, name: &str, value: ValueSpec) -> Self {
        self.elements.push((name.to_string(), value));
        self
    }
}

#[derive(Clone, Debug)]
pub(crate) struct MemberSpec {
    name: String,
    descriptor: String,
    signature: Option<String>,
    annotations: Vec<AnnotationSpec>,
}

impl MemberSpec {
    pub(crate) fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
            annotations: Vec::new(),
        }
    }

    pub(crate) fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    pub(crate) fn annotation(mut self, annotation: AnnotationSpec) -> Self {
        self.annotations.push(annotation);
        self
    }
}

/// Builds a minimal but well-formed class file.
#[derive(Clone, Debug)]
pub(crate) struct ClassFileBuilder {
    pool: PoolWriter,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<MemberSpec>,
    methods: Vec<MemberSpec>,
    signature: Option<String>,
    annotations: Vec<AnnotationSpec>,
    source_file: Option<String>,
}

impl ClassFileBuilder {
    pub(crate) fn new(name: &str) -> Self {
        let mut pool = PoolWriter::new();
        let this_class = pool.class(name);
        Self {
            pool,
            this_class,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            signature: None,
            annotations: Vec::new(),
            source_file: None,
        }
    }

    pub(crate) fn super_class(&mut self, name: &str) -> &mut Self {
        self.super_class = self.pool.class(name);
        self
    }

    pub(crate) fn super_class_index(&mut self, index: u16) -> &mut Self {
        self.super_class = index;
        self
    }

    pub(crate) fn interface(&mut self, name: &str) -> &mut Self {
        let index = self.pool.class(name);
        self.interfaces.push(index);
        self
    }

    pub(crate) fn class_ref(&mut self, name: &str) -> u16 {
        self.pool.class(name)
    }

    pub(crate) fn long_constant(&mut self, value: i64) -> u16 {
        let mut entry = vec![5];
        entry.extend_from_slice(&value.to_be_bytes());
        self.pool.push(&entry, 2)
    }

    pub(crate) fn double_constant(&mut self, value: f64) -> u16 {
        let mut entry = vec![6];
        entry.extend_from_slice(&value.to_bits().to_be_bytes());
        self.pool.push(&entry, 2)
    }

    pub(crate) fn float_constant(&mut self, value: f32) -> u16 {
        let mut entry = vec![4];
        entry.extend_from_slice(&value.to_bits().to_be_bytes());
        self.pool.push(&entry, 1)
    }

    pub(crate) fn raw_constant(&mut self, entry: &[u8]) -> u16 {
        self.pool.push(entry, 1)
    }

    pub(crate) fn field(&mut self, field: MemberSpec) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub(crate) fn method(&mut self, method: MemberSpec) -> &mut Self {
        self.methods.push(method);
        self
    }

    pub(crate) fn class_signature(&mut self, signature: &str) -> &mut Self {
        self.signature = Some(signature.to_string());
        self
    }

    pub(crate) fn class_annotations(&mut self, annotations: Vec<AnnotationSpec>) -> &mut Self {
        self.annotations = annotations;
        self
    }

    pub(crate) fn source_file(&mut self, source_file: &str) -> &mut Self {
        self.source_file = Some(source_file.to_string());
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut pool = self.pool.clone();
        let mut body = Vec::new();
        put_u16(&mut body, 0x0021);
        put_u16(&mut body, self.this_class);
        put_u16(&mut body, self.super_class);
        put_u16(&mut body, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            put_u16(&mut body, *interface);
        }
        for members in [&self.fields, &self.methods] {
            put_u16(&mut body, members.len() as u16);
            for member in members {
                put_u16(&mut body, 0x0001);
                put_u16(&mut body, pool.utf8(&member.name));
                put_u16(&mut body, pool.utf8(&member.descriptor));
                write_attributes(
                    &mut pool,
                    &mut body,
                    member.signature.as_deref(),
                    &member.annotations,
                    None,
                );
            }
        }
        write_attributes(
            &mut pool,
            &mut body,
            self.signature.as_deref(),
            &self.annotations,
            self.source_file.as_deref(),
        );

        let mut bytes = vec![0xca, 0xfe, 0xba, 0xbe, 0, 0, 0, 52];
        put_u16(&mut bytes, pool.next_index);
        bytes.extend_from_slice(&pool.bytes);
        bytes.extend_from_slice(&body);
        bytes
    }
}

/// Bytes of a class that references each of `references` as a class constant.
pub(crate) fn class_bytes(name: &str, references: &[&str]) -> Vec<u8> {
    let mut builder = ClassFileBuilder::new(name);
    for reference in references {
        builder.class_ref(reference);
    }
    builder.build()
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_attributes(
    pool: &mut PoolWriter,
    out: &mut Vec<u8>,
    signature: Option<&str>,
    annotations: &[AnnotationSpec],
    source_file: Option<&str>,
) {
    let mut attributes: Vec<(u16, Vec<u8>)> = Vec::new();
    if let Some(signature) = signature {
        let name = pool.utf8("Signature");
        attributes.push((name, pool.utf8(signature).to_be_bytes().to_vec()));
    }
    if !annotations.is_empty() {
        let name = pool.utf8("RuntimeVisibleAnnotations");
        let mut info = Vec::new();
        put_u16(&mut info, annotations.len() as u16);
        for annotation in annotations {
            write_annotation(pool, &mut info, annotation);
        }
        attributes.push((name, info));
    }
    if let Some(source_file) = source_file {
        let name = pool.utf8("SourceFile");
        attributes.push((name, pool.utf8(source_file).to_be_bytes().to_vec()));
    }

    put_u16(out, attributes.len() as u16);
    for (name, info) in attributes {
        put_u16(out, name);
        out.extend_from_slice(&(info.len() as u32).to_be_bytes());
        out.extend_from_slice(&info);
    }
}

fn write_annotation(pool: &mut PoolWriter, out: &mut Vec<u8>, annotation: &AnnotationSpec) {
    put_u16(out, pool.utf8(&annotation.type_descriptor));
    put_u16(out, annotation.elements.len() as u16);
    for (name, value) in &annotation.elements {
        put_u16(out, pool.utf8(name));
        write_value(pool, out, value);
    }
}

fn write_value(pool: &mut PoolWriter, out: &mut Vec<u8>, value: &ValueSpec) {
    match value {
        ValueSpec::Int(value) => {
            out.push(b'I');
            put_u16(out, pool.integer(*value));
        }
        ValueSpec::Str(value) => {
            out.push(b's');
            put_u16(out, pool.utf8(value));
        }
        ValueSpec::Enum(type_descriptor, name) => {
            out.push(b'e');
            put_u16(out, pool.utf8(type_descriptor));
            put_u16(out, pool.utf8(name));
        }
        ValueSpec::Class(descriptor) => {
            out.push(b'c');
            put_u16(out, pool.utf8(descriptor));
        }
        ValueSpec::Annotation(annotation) => {
            out.push(b'@');
            write_annotation(pool, out, annotation);
        }
        ValueSpec::Array(values) => {
            out.push(b'[');
            put_u16(out, values.len() as u16);
            for value in values {
                write_value(pool, out, value);
            }
        }
        ValueSpec::RawTag(tag) => {
            out.extend_from_slice(&[*tag, 0, 0]);
        }
    }
}
