use crate::bytes::ByteCursor;
use crate::error::{AnalysisError, Result};

const MAGIC: u32 = 0xcafe_babe;

const CONSTANT_UTF8: u8 = 1;
const CONSTANT_INTEGER: u8 = 3;
const CONSTANT_FLOAT: u8 = 4;
const CONSTANT_LONG: u8 = 5;
const CONSTANT_DOUBLE: u8 = 6;
const CONSTANT_CLASS: u8 = 7;
const CONSTANT_STRING: u8 = 8;
const CONSTANT_FIELDREF: u8 = 9;
const CONSTANT_METHODREF: u8 = 10;
const CONSTANT_INTERFACE_METHODREF: u8 = 11;
const CONSTANT_NAME_AND_TYPE: u8 = 12;
const CONSTANT_METHOD_HANDLE: u8 = 15;
const CONSTANT_METHOD_TYPE: u8 = 16;
const CONSTANT_DYNAMIC: u8 = 17;
const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
const CONSTANT_MODULE: u8 = 19;
const CONSTANT_PACKAGE: u8 = 20;

const ATTR_SIGNATURE: &str = "Signature";
const ATTR_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
const ATTR_SOURCE: &str = "SourceFile";

/// One constant pool slot.
///
/// Floating point literals keep their raw bits so parsed classes compare
/// structurally, NaN payloads included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float { bits: u32 },
    Long(i64),
    Double { bits: u64 },
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    /// Slot 0 and the slot following a `Long`/`Double` entry.
    Unusable,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double { .. })
    }
}

/// Index-addressed constant pool; slot 0 is always [`Constant::Unusable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Number of slots including the unusable slot 0 (the class file's
    /// `constant_pool_count`).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Result<&Constant> {
        let slot = usize::from(index);
        if slot == 0 || slot >= self.entries.len() {
            return Err(AnalysisError::malformed(format!(
                "illegal constant pool index {index} (pool size {})",
                self.entries.len()
            )));
        }
        match &self.entries[slot] {
            Constant::Unusable => Err(AnalysisError::malformed(format!(
                "constant pool index {index} points into a wide entry"
            ))),
            constant => Ok(constant),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            other => Err(AnalysisError::malformed(format!(
                "constant pool entry {index} is not UTF8: {other:?}"
            ))),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            other => Err(AnalysisError::malformed(format!(
                "constant pool entry {index} is not a class: {other:?}"
            ))),
        }
    }

    /// Internal names of every `CONSTANT_Class` entry, in pool order.
    pub fn class_names(&self) -> Result<Vec<&str>> {
        self.entries
            .iter()
            .filter_map(|constant| match constant {
                Constant::Class { name_index } => Some(self.utf8(*name_index)),
                _ => None,
            })
            .collect()
    }

    /// Check every index stored inside an entry: in range, not the second
    /// slot of a wide entry, and pointing at the kind of entry it requires.
    fn validate(&self) -> Result<()> {
        for (index, constant) in self.iter() {
            match *constant {
                Constant::Class { name_index }
                | Constant::Module { name_index }
                | Constant::Package { name_index } => self.expect_utf8(index, name_index)?,
                Constant::String { string_index } => self.expect_utf8(index, string_index)?,
                Constant::MethodType { descriptor_index } => {
                    self.expect_utf8(index, descriptor_index)?
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    self.expect_utf8(index, name_index)?;
                    self.expect_utf8(index, descriptor_index)?;
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    self.expect_kind(index, class_index, "class", |target| {
                        matches!(target, Constant::Class { .. })
                    })?;
                    self.expect_name_and_type(index, name_and_type_index)?;
                }
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    if !(1..=9).contains(&reference_kind) {
                        return Err(AnalysisError::malformed(format!(
                            "constant pool entry {index} has reference kind {reference_kind}"
                        )));
                    }
                    self.expect_kind(index, reference_index, "member reference", |target| {
                        matches!(
                            target,
                            Constant::FieldRef { .. }
                                | Constant::MethodRef { .. }
                                | Constant::InterfaceMethodRef { .. }
                        )
                    })?;
                }
                Constant::Dynamic {
                    name_and_type_index,
                    ..
                }
                | Constant::InvokeDynamic {
                    name_and_type_index,
                    ..
                } => self.expect_name_and_type(index, name_and_type_index)?,
                Constant::Utf8(_)
                | Constant::Integer(_)
                | Constant::Float { .. }
                | Constant::Long(_)
                | Constant::Double { .. }
                | Constant::Unusable => {}
            }
        }
        Ok(())
    }

    fn expect_utf8(&self, owner: u16, index: u16) -> Result<()> {
        self.expect_kind(owner, index, "UTF8", |target| matches!(target, Constant::Utf8(_)))
    }

    fn expect_name_and_type(&self, owner: u16, index: u16) -> Result<()> {
        self.expect_kind(owner, index, "name and type", |target| {
            matches!(target, Constant::NameAndType { .. })
        })
    }

    fn expect_kind(
        &self,
        owner: u16,
        index: u16,
        kind: &str,
        accepts: fn(&Constant) -> bool,
    ) -> Result<()> {
        let target = self.get(index)?;
        if accepts(target) {
            Ok(())
        } else {
            Err(AnalysisError::malformed(format!(
                "constant pool entry {owner} expects {kind} at index {index}, found {target:?}"
            )))
        }
    }

    /// Iterates usable `(index, constant)` pairs, never yielding the slot
    /// after a wide entry.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, constant)| !matches!(constant, Constant::Unusable))
            .map(|(index, constant)| (index as u16, constant))
    }
}

/// A field or method entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    /// Raw `RuntimeVisibleAnnotations` payload.
    pub annotations: Option<Vec<u8>>,
}

/// Structured view of one class file. Names keep the internal
/// slash-separated form (`java/lang/String`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedClass {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub signature: Option<String>,
    pub annotations: Option<Vec<u8>>,
    pub source_file: Option<String>,
}

impl ParsedClass {
    /// Fully qualified dotted name, e.g. `java.lang.String`.
    pub fn dotted_name(&self) -> String {
        self.name.replace('/', ".")
    }
}

#[derive(Default)]
struct Attributes {
    signature: Option<String>,
    annotations: Option<Vec<u8>>,
    source_file: Option<String>,
}

/// Parse one class file in a single linear pass.
pub fn parse_class(data: &[u8]) -> Result<ParsedClass> {
    let mut cursor = ByteCursor::new(data);
    let magic = cursor.read_u32()?;
    if magic != MAGIC {
        return Err(AnalysisError::malformed(format!("bad magic {magic:#010x}")));
    }
    let minor_version = cursor.read_u16()?;
    let major_version = cursor.read_u16()?;
    let constant_pool = read_constant_pool(&mut cursor)?;

    let access_flags = cursor.read_u16()?;
    let this_class = cursor.read_u16()?;
    let name = constant_pool.class_name(this_class)?.to_string();
    let super_class = cursor.read_u16()?;
    // Only java/lang/Object (and module-info) carry a zero super_class.
    let super_name = if super_class == 0 {
        None
    } else {
        Some(constant_pool.class_name(super_class)?.to_string())
    };

    let interface_count = cursor.read_u16()?;
    let mut interfaces = Vec::with_capacity(usize::from(interface_count));
    for _ in 0..interface_count {
        let index = cursor.read_u16()?;
        interfaces.push(constant_pool.class_name(index)?.to_string());
    }

    let fields = read_members(&mut cursor, &constant_pool)?;
    let methods = read_members(&mut cursor, &constant_pool)?;
    let attributes = read_attributes(&mut cursor, &constant_pool)?;

    if !cursor.is_empty() {
        return Err(AnalysisError::malformed(format!(
            "trailing bytes after offset {}",
            cursor.offset()
        )));
    }

    Ok(ParsedClass {
        minor_version,
        major_version,
        constant_pool,
        access_flags,
        name,
        super_name,
        interfaces,
        fields,
        methods,
        signature: attributes.signature,
        annotations: attributes.annotations,
        source_file: attributes.source_file,
    })
}

fn read_constant_pool(cursor: &mut ByteCursor<'_>) -> Result<ConstantPool> {
    let count = usize::from(cursor.read_u16()?);
    if count == 0 {
        return Err(AnalysisError::malformed("constant pool count is zero"));
    }
    let mut entries = Vec::with_capacity(count);
    entries.push(Constant::Unusable);
    while entries.len() < count {
        let constant = read_constant(cursor)?;
        let wide = constant.is_wide();
        entries.push(constant);
        if wide {
            // Long and Double take two slots; a pool may not end on the first.
            if entries.len() >= count {
                return Err(AnalysisError::malformed(
                    "wide constant occupies the last constant pool slot",
                ));
            }
            entries.push(Constant::Unusable);
        }
    }
    let pool = ConstantPool { entries };
    pool.validate()?;
    Ok(pool)
}

fn read_constant(cursor: &mut ByteCursor<'_>) -> Result<Constant> {
    let offset = cursor.offset();
    let tag = cursor.read_u8()?;
    let constant = match tag {
        CONSTANT_UTF8 => {
            let len = usize::from(cursor.read_u16()?);
            Constant::Utf8(decode_modified_utf8(cursor.read_bytes(len)?)?)
        }
        CONSTANT_INTEGER => Constant::Integer(cursor.read_u32()? as i32),
        CONSTANT_FLOAT => Constant::Float {
            bits: cursor.read_u32()?,
        },
        CONSTANT_LONG => Constant::Long(read_u64(cursor)? as i64),
        CONSTANT_DOUBLE => Constant::Double {
            bits: read_u64(cursor)?,
        },
        CONSTANT_CLASS => Constant::Class {
            name_index: cursor.read_u16()?,
        },
        CONSTANT_STRING => Constant::String {
            string_index: cursor.read_u16()?,
        },
        CONSTANT_FIELDREF => Constant::FieldRef {
            class_index: cursor.read_u16()?,
            name_and_type_index: cursor.read_u16()?,
        },
        CONSTANT_METHODREF => Constant::MethodRef {
            class_index: cursor.read_u16()?,
            name_and_type_index: cursor.read_u16()?,
        },
        CONSTANT_INTERFACE_METHODREF => Constant::InterfaceMethodRef {
            class_index: cursor.read_u16()?,
            name_and_type_index: cursor.read_u16()?,
        },
        CONSTANT_NAME_AND_TYPE => Constant::NameAndType {
            name_index: cursor.read_u16()?,
            descriptor_index: cursor.read_u16()?,
        },
        CONSTANT_METHOD_HANDLE => Constant::MethodHandle {
            reference_kind: cursor.read_u8()?,
            reference_index: cursor.read_u16()?,
        },
        CONSTANT_METHOD_TYPE => Constant::MethodType {
            descriptor_index: cursor.read_u16()?,
        },
        CONSTANT_DYNAMIC => Constant::Dynamic {
            bootstrap_method_attr_index: cursor.read_u16()?,
            name_and_type_index: cursor.read_u16()?,
        },
        CONSTANT_INVOKE_DYNAMIC => Constant::InvokeDynamic {
            bootstrap_method_attr_index: cursor.read_u16()?,
            name_and_type_index: cursor.read_u16()?,
        },
        CONSTANT_MODULE => Constant::Module {
            name_index: cursor.read_u16()?,
        },
        CONSTANT_PACKAGE => Constant::Package {
            name_index: cursor.read_u16()?,
        },
        _ => {
            return Err(AnalysisError::malformed(format!(
                "unknown constant pool tag {tag} at offset {offset}"
            )));
        }
    };
    Ok(constant)
}

fn read_u64(cursor: &mut ByteCursor<'_>) -> Result<u64> {
    let high = u64::from(cursor.read_u32()?);
    let low = u64::from(cursor.read_u32()?);
    Ok(high << 32 | low)
}

fn read_members(cursor: &mut ByteCursor<'_>, pool: &ConstantPool) -> Result<Vec<Member>> {
    let count = cursor.read_u16()?;
    let mut members = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let access_flags = cursor.read_u16()?;
        let name = pool.utf8(cursor.read_u16()?)?.to_string();
        let descriptor = pool.utf8(cursor.read_u16()?)?.to_string();
        let attributes = read_attributes(cursor, pool)?;
        members.push(Member {
            access_flags,
            name,
            descriptor,
            signature: attributes.signature,
            annotations: attributes.annotations,
        });
    }
    Ok(members)
}

fn read_attributes(cursor: &mut ByteCursor<'_>, pool: &ConstantPool) -> Result<Attributes> {
    let count = cursor.read_u16()?;
    let mut attributes = Attributes::default();
    for _ in 0..count {
        let name = pool.utf8(cursor.read_u16()?)?;
        let len = cursor.read_u32()? as usize;
        let info = cursor.read_bytes(len)?;
        match name {
            ATTR_SIGNATURE => attributes.signature = Some(read_utf8_ref(info, pool, name)?),
            ATTR_SOURCE => attributes.source_file = Some(read_utf8_ref(info, pool, name)?),
            ATTR_ANNOTATIONS => attributes.annotations = Some(info.to_vec()),
            _ => {}
        }
    }
    Ok(attributes)
}

fn read_utf8_ref(info: &[u8], pool: &ConstantPool, attribute: &str) -> Result<String> {
    if info.len() != 2 {
        return Err(AnalysisError::malformed(format!(
            "{attribute} attribute has length {}, expected 2",
            info.len()
        )));
    }
    let index = u16::from_be_bytes([info[0], info[1]]);
    Ok(pool.utf8(index)?.to_string())
}

/// Decode the JVM's modified UTF-8 (two-byte NUL, surrogate pairs encoded as
/// two three-byte sequences).
fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let first = bytes[index];
        let (unit, width) = match first {
            0x01..=0x7f => (u16::from(first), 1),
            0xc0..=0xdf => {
                let second = continuation(bytes, index + 1)?;
                ((u16::from(first & 0x1f) << 6) | second, 2)
            }
            0xe0..=0xef => {
                let second = continuation(bytes, index + 1)?;
                let third = continuation(bytes, index + 2)?;
                ((u16::from(first & 0x0f) << 12) | (second << 6) | third, 3)
            }
            _ => {
                return Err(AnalysisError::malformed(format!(
                    "invalid modified UTF-8 byte {first:#04x}"
                )));
            }
        };
        units.push(unit);
        index += width;
    }
    // Unpaired surrogates are legal in string constants.
    Ok(String::from_utf16_lossy(&units))
}

fn continuation(bytes: &[u8], index: usize) -> Result<u16> {
    match bytes.get(index) {
        Some(byte) if byte & 0xc0 == 0x80 => Ok(u16::from(byte & 0x3f)),
        _ => Err(AnalysisError::malformed("truncated modified UTF-8 sequence")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ClassFileBuilder, MemberSpec};

    #[test]
    fn parses_class_metadata() {
        let mut builder = ClassFileBuilder::new("com/example/App");
        builder.super_class("com/example/Base");
        builder.interface("java/lang/Runnable");
        builder.field(MemberSpec::new("count", "I"));
        builder.method(MemberSpec::new("run", "()V").signature("()V"));
        builder.source_file("App.java");

        let class = parse_class(&builder.build()).expect("parse class");

        assert_eq!(class.name, "com/example/App");
        assert_eq!(class.dotted_name(), "com.example.App");
        assert_eq!(class.super_name.as_deref(), Some("com/example/Base"));
        assert_eq!(class.interfaces, vec!["java/lang/Runnable".to_string()]);
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.fields[0].descriptor, "I");
        assert_eq!(class.methods[0].signature.as_deref(), Some("()V"));
        assert_eq!(class.source_file.as_deref(), Some("App.java"));
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut builder = ClassFileBuilder::new("a/Foo");
        let long_index = builder.long_constant(0x0100_0000_0000_0007);
        let double_index = builder.double_constant(1.5);
        let after = builder.class_ref("b/Bar");

        let class = parse_class(&builder.build()).expect("parse class");
        let pool = &class.constant_pool;

        assert_eq!(double_index, long_index + 2);
        assert_eq!(pool.get(long_index).expect("long"), &Constant::Long(0x0100_0000_0000_0007));
        assert!(pool.get(long_index + 1).is_err());
        assert!(pool.get(double_index + 1).is_err());
        assert_eq!(pool.class_name(after).expect("class after wide"), "b/Bar");
        assert!(
            pool.iter()
                .all(|(index, _)| index != long_index + 1 && index != double_index + 1)
        );
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut builder = ClassFileBuilder::new("a/Foo");
        builder.super_class_index(0x7fff);

        let err = parse_class(&builder.build()).expect_err("bad index");

        assert!(matches!(
            err,
            AnalysisError::MalformedClassFile(message) if message.contains("32767")
        ));
    }

    #[test]
    fn index_zero_is_malformed() {
        let class = parse_class(&ClassFileBuilder::new("a/Foo").build()).expect("parse class");

        assert!(class.constant_pool.get(0).is_err());
        assert!(class.constant_pool.utf8(0).is_err());
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut builder = ClassFileBuilder::new("a/Foo");
        builder.raw_constant(&[2, 0, 0]);

        let err = parse_class(&builder.build()).expect_err("unknown tag");

        assert!(matches!(
            err,
            AnalysisError::MalformedClassFile(message) if message.contains("tag 2")
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = ClassFileBuilder::new("a/Foo").build();

        for len in [0, 3, 9, bytes.len() / 2, bytes.len() - 1] {
            let err = parse_class(&bytes[..len]).expect_err("truncated");
            assert!(matches!(err, AnalysisError::MalformedClassFile(_)), "len {len}");
        }
    }

    #[test]
    fn rejects_dangling_reference_inside_pool() {
        let mut builder = ClassFileBuilder::new("a/Foo");
        builder.raw_constant(&[8, 0x03, 0xe7]);

        let err = parse_class(&builder.build()).expect_err("dangling string index");

        assert!(matches!(
            err,
            AnalysisError::MalformedClassFile(message) if message.contains("999")
        ));
    }

    #[test]
    fn rejects_reference_of_the_wrong_kind() {
        let mut builder = ClassFileBuilder::new("a/Foo");
        let class_index = builder.class_ref("b/Bar");
        let [high, low] = class_index.to_be_bytes();
        builder.raw_constant(&[8, high, low]);

        let err = parse_class(&builder.build()).expect_err("string pointing at a class");

        assert!(matches!(
            err,
            AnalysisError::MalformedClassFile(message) if message.contains("UTF8")
        ));
    }

    #[test]
    fn rejects_reference_into_wide_entry() {
        let mut builder = ClassFileBuilder::new("a/Foo");
        let long_index = builder.long_constant(7);
        let [high, low] = (long_index + 1).to_be_bytes();
        builder.raw_constant(&[16, high, low]);

        assert!(parse_class(&builder.build()).is_err());
    }

    #[test]
    fn accepts_member_references_and_handles() {
        // Slot 1 is the UTF8 "a/Foo", slot 2 its class entry.
        let mut builder = ClassFileBuilder::new("a/Foo");
        let name_and_type = builder.raw_constant(&[12, 0, 1, 0, 1]);
        let field_ref = builder.raw_constant(&[9, 0, 2, 0, name_and_type as u8]);
        builder.raw_constant(&[15, 1, 0, field_ref as u8]);
        builder.raw_constant(&[18, 0, 0, 0, name_and_type as u8]);

        let class = parse_class(&builder.build()).expect("parse class");

        assert!(matches!(
            class.constant_pool.get(field_ref).expect("field ref"),
            Constant::FieldRef { class_index: 2, .. }
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = ClassFileBuilder::new("a/Foo").build();
        bytes[0] = 0;

        assert!(parse_class(&bytes).is_err());
    }

    #[test]
    fn reparsing_is_idempotent() {
        let mut builder = ClassFileBuilder::new("a/Foo");
        builder.long_constant(-1);
        builder.float_constant(f32::NAN);
        builder.field(
            MemberSpec::new("names", "Ljava/util/List;")
                .signature("Ljava/util/List<Ljava/lang/String;>;"),
        );
        let bytes = builder.build();

        assert_eq!(parse_class(&bytes).expect("first"), parse_class(&bytes).expect("second"));
    }

    #[test]
    fn decodes_modified_utf8() {
        assert_eq!(decode_modified_utf8(&[0x61, 0xc0, 0x80, 0x62]).expect("nul"), "a\u{0}b");
        assert_eq!(decode_modified_utf8("é".as_bytes()).expect("two byte"), "é");
        // U+1F600 as a CESU-style surrogate pair.
        let emoji = [0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80];
        assert_eq!(decode_modified_utf8(&emoji).expect("surrogates"), "\u{1f600}");
        // A lone high surrogate, as javac writes for "\uD800".
        assert_eq!(decode_modified_utf8(&[0xed, 0xa0, 0x80]).expect("lone surrogate"), "\u{fffd}");
        assert!(decode_modified_utf8(&[0x00]).is_err());
        assert!(decode_modified_utf8(&[0xe0, 0x80]).is_err());
    }
}
