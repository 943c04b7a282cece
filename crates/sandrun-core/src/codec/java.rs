//! Reader for the Java Object Serialization Stream Protocol.
//!
//! Only the subset engines actually emit for process variables is turned
//! into native values: boxed primitives, strings, maps, lists and sets.
//! Everything is parsed generically first (class descriptors, field values,
//! `writeObject` annotations) and converted afterwards, so an unknown class
//! fails with its name instead of a byte offset.
//!
//! # 学習ポイント
//! - back reference は `Rc` で共有する (subtree を複製しない)
//! - 各値は深さと展開後サイズを持ち、上限を超えたら `JavaStream` エラー
//! - 再帰の深さも同じ上限で抑える (stack overflow で worker ごと落ちない)

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::domain::NativeValue;

use super::CodecError;

// stream header: magic + version 5
const STREAM_MAGIC: u16 = 0xACED;
const STREAM_VERSION: u16 = 5;
// handle 番号はここから振られる
const BASE_WIRE_HANDLE: i32 = 0x7E_0000;

// type codes (TC_*) と class descriptor flags (SC_*)
const TC_NULL: u8 = 0x70;
const TC_REFERENCE: u8 = 0x71;
const TC_CLASSDESC: u8 = 0x72;
const TC_OBJECT: u8 = 0x73;
const TC_STRING: u8 = 0x74;
const TC_ARRAY: u8 = 0x75;
const TC_CLASS: u8 = 0x76;
const TC_BLOCKDATA: u8 = 0x77;
const TC_ENDBLOCKDATA: u8 = 0x78;
const TC_RESET: u8 = 0x79;
const TC_BLOCKDATALONG: u8 = 0x7A;
const TC_EXCEPTION: u8 = 0x7B;
const TC_LONGSTRING: u8 = 0x7C;
const TC_PROXYCLASSDESC: u8 = 0x7D;
const TC_ENUM: u8 = 0x7E;

const SC_WRITE_METHOD: u8 = 0x01;
const SC_SERIALIZABLE: u8 = 0x02;
const SC_EXTERNALIZABLE: u8 = 0x04;
const SC_BLOCK_DATA: u8 = 0x08;

/// Nesting limit, for both the parser's recursion and the resulting tree.
pub const MAX_DEPTH: usize = 256;

/// Upper bound on nodes plus string bytes once back references are expanded.
pub const MAX_EXPANDED_SIZE: usize = 64 << 20;

/// Collections whose `writeObject` data is key, value, key, value, ...
const MAP_CLASSES: &[&str] = &[
    "java.util.HashMap",
    "java.util.LinkedHashMap",
    "java.util.TreeMap",
    "java.util.Hashtable",
];

/// Collections whose `writeObject` data is the elements in order.
/// Sets become lists.
const LIST_CLASSES: &[&str] = &[
    "java.util.ArrayList",
    "java.util.LinkedList",
    "java.util.HashSet",
    "java.util.LinkedHashSet",
];

/// A class descriptor. Shared by handle so back references to it are cheap.
#[derive(Debug)]
struct ClassDesc {
    name: String,
    flags: u8,
    fields: Vec<FieldDesc>,
    super_class: Option<Rc<ClassDesc>>,
}

/// `type_code` は primitive の 1 文字 (`I`, `J`, ...) か `[` / `L`
#[derive(Debug)]
struct FieldDesc {
    type_code: u8,
    name: String,
}

/// A value as it appears in the stream, before native conversion.
///
/// Arrays and objects are reference counted: a back reference shares the
/// subtree it points at.
#[derive(Debug, Clone, PartialEq)]
pub enum JavaValue {
    Null,
    Bool(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(String),
    Enum { class_name: String, constant: String },
    Array(Rc<Vec<JavaValue>>),
    Object(Rc<JavaObject>),
}

/// `TC_OBJECT` の中身。class 名、field、annotation を持つ
#[derive(Debug, Clone, PartialEq)]
pub struct JavaObject {
    pub class_name: String,
    /// Serializable fields of the whole hierarchy, by name.
    pub fields: BTreeMap<String, JavaValue>,
    /// Objects written by custom `writeObject` methods, in stream order.
    pub annotations: Vec<JavaValue>,
}

/// A parsed value with the shape of its fully expanded tree.
#[derive(Debug, Clone)]
struct Node {
    value: JavaValue,
    depth: usize,
    size: usize,
}

impl Node {
    fn leaf(value: JavaValue) -> Self {
        let size = match &value {
            JavaValue::String(s) | JavaValue::Class(s) => 1 + s.len(),
            JavaValue::Enum {
                class_name,
                constant,
            } => 1 + class_name.len() + constant.len(),
            _ => 1,
        };
        Node {
            value,
            depth: 1,
            size,
        }
    }
}

/// Depth and size of a branch whose children have been measured.
#[derive(Debug, Clone, Copy)]
struct Shape {
    depth: usize,
    size: usize,
}

impl Shape {
    fn branch() -> Self {
        Shape { depth: 1, size: 1 }
    }

    fn add(&mut self, child: &Node) -> Result<(), CodecError> {
        self.depth = self.depth.max(child.depth + 1);
        self.size = self.size.saturating_add(child.size);
        if self.depth > MAX_DEPTH {
            return Err(err(format!("values nested deeper than {MAX_DEPTH} levels")));
        }
        if self.size > MAX_EXPANDED_SIZE {
            return Err(err(format!(
                "back references expand beyond {MAX_EXPANDED_SIZE} units"
            )));
        }
        Ok(())
    }

    fn node(self, value: JavaValue) -> Node {
        Node {
            value,
            depth: self.depth,
            size: self.size,
        }
    }
}

/// handle table の 1 slot
#[derive(Debug)]
enum Handle {
    Pending,
    Class(Rc<ClassDesc>),
    Value(Node),
}

/// Cursor over the stream plus its handle table.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    handles: Vec<Handle>,
    /// Current recursion depth of `object` / `class_desc`.
    depth: usize,
}

fn err(msg: impl Into<String>) -> CodecError {
    CodecError::JavaStream(msg.into())
}

/// Parse a serialization stream holding a single top-level object.
pub fn parse(data: &[u8]) -> Result<JavaValue, CodecError> {
    let mut r = Reader {
        data,
        pos: 0,
        handles: Vec::new(),
        depth: 0,
    };
    if r.u16()? != STREAM_MAGIC {
        return Err(err("bad stream magic"));
    }
    let version = r.u16()?;
    if version != STREAM_VERSION {
        return Err(err(format!("unsupported stream version {version}")));
    }
    Ok(r.object()?.value)
}

/// Parse a stream and convert it into a native value.
pub fn to_native(data: &[u8]) -> Result<NativeValue, CodecError> {
    into_native(&parse(data)?)
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| err(format!("unexpected end of stream at offset {}", self.pos)))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn peek(&self) -> Result<u8, CodecError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| err("unexpected end of stream"))
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(i64::from_be_bytes(buf))
    }

    // 長さ prefix は utf が u16、long_utf が i64
    fn utf(&mut self) -> Result<String, CodecError> {
        let len = self.u16()? as usize;
        decode_modified_utf8(self.take(len)?)
    }

    fn long_utf(&mut self) -> Result<String, CodecError> {
        let len = usize::try_from(self.i64()?).map_err(|_| err("negative string length"))?;
        decode_modified_utf8(self.take(len)?)
    }

    /// Reserve the next handle before the value is read; a reference to a
    /// still-pending handle is a cycle.
    fn new_handle(&mut self) -> usize {
        self.handles.push(Handle::Pending);
        self.handles.len() - 1
    }

    fn handle_index(&mut self) -> Result<usize, CodecError> {
        let raw = self.i32()?;
        raw.checked_sub(BASE_WIRE_HANDLE)
            .and_then(|i| usize::try_from(i).ok())
            .filter(|i| *i < self.handles.len())
            .ok_or_else(|| err(format!("dangling handle {raw:#x}")))
    }

    /// エラー時は depth を戻さない (parse 全体がそこで終わるため)
    fn enter(&mut self) -> Result<(), CodecError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(err(format!("stream nested deeper than {MAX_DEPTH} levels")));
        }
        Ok(())
    }

    fn object(&mut self) -> Result<Node, CodecError> {
        self.enter()?;
        let node = self.object_body();
        self.depth -= 1;
        node
    }

    /// Fill a reserved handle; the clone shares arrays and objects.
    fn remember(&mut self, idx: usize, node: Node) -> Node {
        self.handles[idx] = Handle::Value(node.clone());
        node
    }

    fn object_body(&mut self) -> Result<Node, CodecError> {
        match self.u8()? {
            TC_NULL => Ok(Node::leaf(JavaValue::Null)),
            TC_REFERENCE => {
                let idx = self.handle_index()?;
                match &self.handles[idx] {
                    Handle::Value(node) => Ok(node.clone()),
                    Handle::Class(desc) => Ok(Node::leaf(JavaValue::Class(desc.name.clone()))),
                    Handle::Pending => Err(err("cyclic object references are not supported")),
                }
            }
            TC_STRING => {
                let idx = self.new_handle();
                let s = Node::leaf(JavaValue::String(self.utf()?));
                Ok(self.remember(idx, s))
            }
            TC_LONGSTRING => {
                let idx = self.new_handle();
                let s = Node::leaf(JavaValue::String(self.long_utf()?));
                Ok(self.remember(idx, s))
            }
            TC_OBJECT => {
                let desc = self
                    .class_desc()?
                    .ok_or_else(|| err("object without class descriptor"))?;
                let idx = self.new_handle();
                let (obj, shape) = self.class_data(&desc)?;
                Ok(self.remember(idx, shape.node(JavaValue::Object(Rc::new(obj)))))
            }
            TC_ARRAY => {
                let desc = self
                    .class_desc()?
                    .ok_or_else(|| err("array without class descriptor"))?;
                let idx = self.new_handle();
                let elem = desc
                    .name
                    .as_bytes()
                    .get(1)
                    .copied()
                    .ok_or_else(|| err(format!("bad array class {}", desc.name)))?;
                let len = usize::try_from(self.i32()?).map_err(|_| err("negative array size"))?;
                let mut items = Vec::with_capacity(len.min(4096));
                let mut shape = Shape::branch();
                for _ in 0..len {
                    let item = self.field_value(elem)?;
                    shape.add(&item)?;
                    items.push(item.value);
                }
                Ok(self.remember(idx, shape.node(JavaValue::Array(Rc::new(items)))))
            }
            TC_ENUM => {
                let desc = self
                    .class_desc()?
                    .ok_or_else(|| err("enum without class descriptor"))?;
                let idx = self.new_handle();
                let JavaValue::String(constant) = self.object()?.value else {
                    return Err(err("enum constant name is not a string"));
                };
                let v = Node::leaf(JavaValue::Enum {
                    class_name: desc.name.clone(),
                    constant,
                });
                Ok(self.remember(idx, v))
            }
            TC_CLASS => {
                let desc = self
                    .class_desc()?
                    .ok_or_else(|| err("class without descriptor"))?;
                let idx = self.new_handle();
                let v = Node::leaf(JavaValue::Class(desc.name.clone()));
                Ok(self.remember(idx, v))
            }
            TC_RESET => {
                self.handles.clear();
                self.object_body()
            }
            TC_EXCEPTION => Err(err("stream carries a serialized exception")),
            tc => Err(err(format!(
                "unexpected type code {tc:#04x} at offset {}",
                self.pos - 1
            ))),
        }
    }

    fn class_desc(&mut self) -> Result<Option<Rc<ClassDesc>>, CodecError> {
        self.enter()?;
        let desc = self.class_desc_body();
        self.depth -= 1;
        desc
    }

    fn class_desc_body(&mut self) -> Result<Option<Rc<ClassDesc>>, CodecError> {
        match self.u8()? {
            TC_NULL => Ok(None),
            TC_REFERENCE => {
                let idx = self.handle_index()?;
                match &self.handles[idx] {
                    Handle::Class(desc) => Ok(Some(Rc::clone(desc))),
                    _ => Err(err("reference does not point at a class descriptor")),
                }
            }
            TC_CLASSDESC => {
                let name = self.utf()?;
                let _serial_version_uid = self.i64()?;
                let idx = self.new_handle();
                let flags = self.u8()?;
                let count = self.u16()?;
                let mut fields = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let type_code = self.u8()?;
                    let name = self.utf()?;
                    if matches!(type_code, b'[' | b'L') {
                        // field class name (a string or a back reference)
                        self.object()?;
                    }
                    fields.push(FieldDesc { type_code, name });
                }
                self.annotations()?;
                let super_class = self.class_desc()?;
                let desc = Rc::new(ClassDesc {
                    name,
                    flags,
                    fields,
                    super_class,
                });
                self.handles[idx] = Handle::Class(Rc::clone(&desc));
                Ok(Some(desc))
            }
            TC_PROXYCLASSDESC => {
                let idx = self.new_handle();
                let count = self.i32()?;
                for _ in 0..count {
                    self.utf()?;
                }
                self.annotations()?;
                let super_class = self.class_desc()?;
                let desc = Rc::new(ClassDesc {
                    name: "$Proxy".to_string(),
                    flags: SC_SERIALIZABLE,
                    fields: Vec::new(),
                    super_class,
                });
                self.handles[idx] = Handle::Class(Rc::clone(&desc));
                Ok(Some(desc))
            }
            tc => Err(err(format!("expected class descriptor, found {tc:#04x}"))),
        }
    }

    /// Contents up to TC_ENDBLOCKDATA; block data is skipped, objects kept.
    fn annotations(&mut self) -> Result<Vec<Node>, CodecError> {
        let mut out = Vec::new();
        loop {
            match self.peek()? {
                TC_ENDBLOCKDATA => {
                    self.pos += 1;
                    return Ok(out);
                }
                TC_BLOCKDATA => {
                    self.pos += 1;
                    let len = self.u8()? as usize;
                    self.take(len)?;
                }
                TC_BLOCKDATALONG => {
                    self.pos += 1;
                    let len =
                        usize::try_from(self.i32()?).map_err(|_| err("negative block length"))?;
                    self.take(len)?;
                }
                _ => out.push(self.object()?),
            }
        }
    }

    /// Field values and annotations of every class in the hierarchy.
    ///
    /// Field names of a subclass shadow those of its superclasses; only the
    /// boxed-primitive `value` field is ever read back.
    fn class_data(&mut self, desc: &Rc<ClassDesc>) -> Result<(JavaObject, Shape), CodecError> {
        // superclass first
        let mut chain = Vec::new();
        let mut cur = Some(Rc::clone(desc));
        while let Some(d) = cur {
            cur = d.super_class.clone();
            chain.push(d);
        }
        chain.reverse();

        let mut obj = JavaObject {
            class_name: desc.name.clone(),
            fields: BTreeMap::new(),
            annotations: Vec::new(),
        };
        let mut shape = Shape::branch();
        for d in chain {
            // writeObject / writeExternal の中身は annotations として残す
            let write_method = if d.flags & SC_SERIALIZABLE != 0 {
                for f in &d.fields {
                    let v = self.field_value(f.type_code)?;
                    shape.add(&v)?;
                    obj.fields.insert(f.name.clone(), v.value);
                }
                d.flags & SC_WRITE_METHOD != 0
            } else if d.flags & SC_EXTERNALIZABLE != 0 {
                if d.flags & SC_BLOCK_DATA == 0 {
                    return Err(err(format!(
                        "externalizable class {} uses the pre-1.2 protocol",
                        d.name
                    )));
                }
                true
            } else {
                false
            };
            if write_method {
                for a in self.annotations()? {
                    shape.add(&a)?;
                    obj.annotations.push(a.value);
                }
            }
        }
        Ok((obj, shape))
    }

    /// One field of class data. Reference types go through `object`.
    fn field_value(&mut self, type_code: u8) -> Result<Node, CodecError> {
        if matches!(type_code, b'[' | b'L') {
            return self.object();
        }
        Ok(Node::leaf(match type_code {
            b'B' => JavaValue::Byte(self.u8()? as i8),
            b'C' => JavaValue::Char(self.u16()?),
            b'D' => JavaValue::Double(f64::from_bits(self.i64()? as u64)),
            b'F' => JavaValue::Float(f32::from_bits(self.i32()? as u32)),
            b'I' => JavaValue::Int(self.i32()?),
            b'J' => JavaValue::Long(self.i64()?),
            b'S' => JavaValue::Short(self.u16()? as i16),
            b'Z' => JavaValue::Bool(self.u8()? != 0),
            tc => return Err(err(format!("unknown field type code {:?}", tc as char))),
        }))
    }
}

/// Java の modified UTF-8 (NUL は 2 byte、補助文字は surrogate pair) を UTF-16 経由で読む
fn decode_modified_utf8(bytes: &[u8]) -> Result<String, CodecError> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as u16;
        if b & 0x80 == 0 {
            units.push(b);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push(((b & 0x1F) << 6) | (bytes[i + 1] as u16 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                ((b & 0x0F) << 12)
                    | ((bytes[i + 1] as u16 & 0x3F) << 6)
                    | (bytes[i + 2] as u16 & 0x3F),
            );
            i += 3;
        } else {
            return Err(err(format!("malformed modified UTF-8 at byte {i}")));
        }
    }
    Ok(String::from_utf16_lossy(&units))
}

/// Convert a parsed stream value into a native value.
///
/// Shared subtrees are expanded; the parser already bounded the result.
pub fn into_native(value: &JavaValue) -> Result<NativeValue, CodecError> {
    Ok(match value {
        JavaValue::Null => NativeValue::Null,
        JavaValue::Bool(b) => NativeValue::Bool(*b),
        JavaValue::Byte(i) => NativeValue::Int((*i).into()),
        JavaValue::Short(i) => NativeValue::Int((*i).into()),
        JavaValue::Int(i) => NativeValue::Int((*i).into()),
        JavaValue::Long(i) => NativeValue::Int(*i),
        JavaValue::Char(c) => NativeValue::String(String::from_utf16_lossy(&[*c])),
        JavaValue::Float(f) => NativeValue::Float((*f).into()),
        JavaValue::Double(f) => NativeValue::Float(*f),
        JavaValue::String(s) | JavaValue::Class(s) => NativeValue::String(s.clone()),
        JavaValue::Enum { constant, .. } => NativeValue::String(constant.clone()),
        JavaValue::Array(items) => NativeValue::List(list_into_native(items)?),
        JavaValue::Object(obj) => object_into_native(obj)?,
    })
}

fn list_into_native(items: &[JavaValue]) -> Result<Vec<NativeValue>, CodecError> {
    items.iter().map(into_native).collect()
}

/// Boxed primitive は中身へ、Map/List 系は annotation から組み立てる。
/// それ以外の class は `UnsupportedJavaType`
fn object_into_native(obj: &JavaObject) -> Result<NativeValue, CodecError> {
    let name = obj.class_name.as_str();
    match name {
        "java.lang.Integer" | "java.lang.Long" | "java.lang.Short" | "java.lang.Byte"
        | "java.lang.Boolean" | "java.lang.Double" | "java.lang.Float"
        | "java.lang.Character" => {
            let value = obj
                .fields
                .get("value")
                .ok_or_else(|| err(format!("{name} without a value field")))?;
            into_native(value)
        }
        _ if MAP_CLASSES.contains(&name) => {
            if obj.annotations.len() % 2 != 0 {
                return Err(err(format!("{name} has an odd number of entries")));
            }
            // key は文字列化する (native map の key は String)
            let mut map = BTreeMap::new();
            for pair in obj.annotations.chunks_exact(2) {
                let key = into_native(&pair[0])?.to_display_string();
                map.insert(key, into_native(&pair[1])?);
            }
            Ok(NativeValue::Map(map))
        }
        _ if LIST_CLASSES.contains(&name) => {
            Ok(NativeValue::List(list_into_native(&obj.annotations)?))
        }
        _ => Err(CodecError::UnsupportedJavaType(obj.class_name.clone())),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Stream;
    use super::*;

    #[test]
    fn boxed_integer() {
        let bytes = Stream::new().integer(5).bytes();
        assert_eq!(to_native(&bytes).unwrap(), NativeValue::Int(5));
    }

    #[test]
    fn plain_string() {
        let bytes = Stream::new().string("hëllo").bytes();
        assert_eq!(to_native(&bytes).unwrap(), NativeValue::String("hëllo".into()));
    }

    #[test]
    fn hash_map_with_nested_list() {
        let mut s = Stream::new();
        s.hash_map(2);
        s.string("name").string("robot");
        s.string("flags").array_list(2).boolean(true).boolean(false).end();
        s.end();

        let NativeValue::Map(m) = to_native(&s.bytes()).unwrap() else {
            panic!("expected a map");
        };
        assert_eq!(m["name"], NativeValue::String("robot".into()));
        assert_eq!(
            m["flags"],
            NativeValue::List(vec![NativeValue::Bool(true), NativeValue::Bool(false)])
        );
    }

    #[test]
    fn back_references_resolve_to_class_descriptors() {
        // ArrayList=0, its object=1, Integer desc=2, Number desc=3, first int=4
        let mut s = Stream::new();
        s.array_list(2).integer(1);
        s.u8(TC_OBJECT)
            .u8(TC_REFERENCE)
            .i32(BASE_WIRE_HANDLE + 2)
            .i32(2);
        s.end();

        assert_eq!(
            to_native(&s.bytes()).unwrap(),
            NativeValue::List(vec![NativeValue::Int(1), NativeValue::Int(2)])
        );
    }

    #[test]
    fn back_references_resolve_to_strings() {
        // HashMap desc=0, object=1, "k"=2
        let mut s = Stream::new();
        s.hash_map(1);
        s.string("k");
        s.u8(TC_REFERENCE).i32(BASE_WIRE_HANDLE + 2);
        s.end();

        let NativeValue::Map(m) = to_native(&s.bytes()).unwrap() else {
            panic!("expected a map");
        };
        assert_eq!(m["k"], NativeValue::String("k".into()));
    }

    #[test]
    fn unknown_classes_are_rejected_by_name() {
        let mut s = Stream::new();
        s.u8(TC_OBJECT)
            .class_desc("com.acme.Invoice", 0x02, &[(b'J', "amount")])
            .u8(TC_NULL);
        s.0.extend_from_slice(&42i64.to_be_bytes());

        let e = to_native(&s.bytes()).unwrap_err();
        assert!(matches!(e, CodecError::UnsupportedJavaType(ref n) if n == "com.acme.Invoice"));
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut bytes = Stream::new().integer(5).bytes();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(to_native(&bytes), Err(CodecError::JavaStream(_))));
    }

    fn object_array(s: &mut Stream, first: bool, size: i32) {
        s.u8(TC_ARRAY);
        if first {
            s.class_desc("[Ljava.lang.Object;", 0x02, &[]).u8(TC_NULL);
        } else {
            s.u8(TC_REFERENCE).i32(BASE_WIRE_HANDLE);
        }
        s.i32(size);
    }

    #[test]
    fn deeply_nested_arrays_are_rejected() {
        let mut s = Stream::new();
        for level in 0..10_000 {
            object_array(&mut s, level == 0, 1);
        }
        s.u8(TC_NULL);

        let e = to_native(&s.bytes()).unwrap_err();
        assert!(matches!(e, CodecError::JavaStream(ref m) if m.contains("nested")), "{e}");
    }

    #[test]
    fn nesting_within_the_limit_is_accepted() {
        let mut s = Stream::new();
        for level in 0..100 {
            object_array(&mut s, level == 0, 1);
        }
        s.u8(TC_NULL);

        let mut v = to_native(&s.bytes()).unwrap();
        let mut depth = 0;
        while let NativeValue::List(mut items) = v {
            depth += 1;
            v = items.remove(0);
        }
        assert_eq!(depth, 100);
        assert_eq!(v, NativeValue::Null);
    }

    #[test]
    fn shared_back_references_cannot_blow_up() {
        // desc=0, level k has handle k+1 and holds [level k+1, ref level k+1]
        const LEVELS: i32 = 40;
        let mut s = Stream::new();
        for level in 0..LEVELS {
            object_array(&mut s, level == 0, 2);
        }
        s.u8(TC_NULL).u8(TC_NULL);
        for level in (0..LEVELS - 1).rev() {
            s.u8(TC_REFERENCE).i32(BASE_WIRE_HANDLE + level + 2);
        }

        let started = std::time::Instant::now();
        let e = to_native(&s.bytes()).unwrap_err();
        assert!(matches!(e, CodecError::JavaStream(ref m) if m.contains("expand")), "{e}");
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn small_shared_subtrees_expand_normally() {
        // desc=0, outer=1, inner=2, "x"=3
        let mut s = Stream::new();
        object_array(&mut s, true, 2);
        object_array(&mut s, false, 2);
        s.string("x").u8(TC_NULL);
        s.u8(TC_REFERENCE).i32(BASE_WIRE_HANDLE + 2);

        let NativeValue::List(outer) = to_native(&s.bytes()).unwrap() else {
            panic!("expected a list");
        };
        let inner = NativeValue::List(vec![NativeValue::String("x".into()), NativeValue::Null]);
        assert_eq!(outer, vec![inner.clone(), inner]);
    }

    #[test]
    fn bad_magic_is_an_error() {
        assert!(parse(&[0xCA, 0xFE, 0x00, 0x05, TC_NULL]).is_err());
    }
}
