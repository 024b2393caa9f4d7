//! Class file decoder.
//!
//! Turns the bytes of one compiled class into a [`ClassDescriptor`]: the
//! class name, its declared interfaces and every annotation occurrence found
//! on the class, its methods, their parameters and its fields. Only the
//! declaration-level annotation attributes are read; method bodies and all
//! other attributes are skipped by length.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;

use crate::constant_pool::ConstantPool;
use crate::error::DecodeError;
use crate::reader::Reader;

pub const CLASS_MAGIC: u32 = 0xCAFEBABE;
pub const MIN_MAJOR_VERSION: u16 = 45;
pub const MAX_MAJOR_VERSION: u16 = 70;

const VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
const INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
const VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
const INVISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeInvisibleParameterAnnotations";

/// Deepest `[`/`@` element value nesting accepted inside one annotation.
pub const MAX_ELEMENT_NESTING: usize = 256;

/// Which declaration sites are decoded. A disabled site is skipped while
/// walking the class file, not filtered afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub class_annotations: bool,
    pub method_annotations: bool,
    pub parameter_annotations: bool,
    pub field_annotations: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            class_annotations: true,
            method_annotations: true,
            parameter_annotations: true,
            field_annotations: true,
        }
    }
}

impl ScanOptions {
    pub fn with_class_annotations(mut self, enabled: bool) -> Self {
        self.class_annotations = enabled;
        self
    }

    pub fn with_method_annotations(mut self, enabled: bool) -> Self {
        self.method_annotations = enabled;
        self
    }

    pub fn with_parameter_annotations(mut self, enabled: bool) -> Self {
        self.parameter_annotations = enabled;
        self
    }

    pub fn with_field_annotations(mut self, enabled: bool) -> Self {
        self.field_annotations = enabled;
        self
    }

    fn wants(&self, site: AnnotationSite) -> bool {
        match site {
            AnnotationSite::Class => self.class_annotations,
            AnnotationSite::Method => self.method_annotations,
            AnnotationSite::Parameter => self.parameter_annotations,
            AnnotationSite::Field => self.field_annotations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationSite {
    Class,
    Method,
    Parameter,
    Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationOccurrence {
    pub site: AnnotationSite,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    pub major_version: u16,
    /// As declared, in declaration order, without duplicates.
    pub interfaces: Vec<String>,
    pub annotations: Vec<AnnotationOccurrence>,
}

impl ClassDescriptor {
    /// Annotation type names used anywhere in the class, once each.
    pub fn annotation_types(&self) -> BTreeSet<String> {
        self.annotations
            .iter()
            .map(|a| a.type_name.clone())
            .collect()
    }
}

/// Reads `input` to the end and decodes it. The reader is consumed, so it is
/// released when this returns, whatever the outcome.
pub fn decode_from<R: Read>(mut input: R, options: &ScanOptions) -> Result<ClassDescriptor, DecodeError> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    decode(&bytes, options)
}

pub fn decode(bytes: &[u8], options: &ScanOptions) -> Result<ClassDescriptor, DecodeError> {
    let mut reader = Reader::new(bytes);
    let magic = reader.read_u4()?;
    if magic != CLASS_MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }

    let minor = reader.read_u2()?;
    let major = reader.read_u2()?;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major) {
        return Err(DecodeError::UnsupportedVersion { major, minor });
    }

    let cp = ConstantPool::parse(&mut reader)?;

    let _access_flags = reader.read_u2()?;
    let name = cp.class_name(reader.read_u2()?)?;
    let _super_class = reader.read_u2()?;

    let interfaces_count = reader.read_u2()? as usize;
    let mut interfaces: Vec<String> = Vec::with_capacity(interfaces_count);
    for _ in 0..interfaces_count {
        let interface = cp.class_name(reader.read_u2()?)?;
        if !interfaces.contains(&interface) {
            interfaces.push(interface);
        }
    }

    let mut annotations = Vec::new();

    let fields_count = reader.read_u2()?;
    for _ in 0..fields_count {
        reader.skip(6)?;
        read_attributes(&mut reader, &cp, options, MemberKind::Field, &mut annotations)?;
    }

    let methods_count = reader.read_u2()?;
    for _ in 0..methods_count {
        reader.skip(6)?;
        read_attributes(&mut reader, &cp, options, MemberKind::Method, &mut annotations)?;
    }

    read_attributes(&mut reader, &cp, options, MemberKind::Class, &mut annotations)?;

    Ok(ClassDescriptor {
        name,
        major_version: major,
        interfaces,
        annotations,
    })
}

#[derive(Debug, Clone, Copy)]
enum MemberKind {
    Class,
    Field,
    Method,
}

impl MemberKind {
    /// The site that plain annotation attributes on this member belong to.
    fn site(self) -> AnnotationSite {
        match self {
            MemberKind::Class => AnnotationSite::Class,
            MemberKind::Field => AnnotationSite::Field,
            MemberKind::Method => AnnotationSite::Method,
        }
    }
}

fn read_attributes(
    reader: &mut Reader<'_>,
    cp: &ConstantPool<'_>,
    options: &ScanOptions,
    kind: MemberKind,
    out: &mut Vec<AnnotationOccurrence>,
) -> Result<(), DecodeError> {
    let wants_plain = options.wants(kind.site());
    let wants_parameters =
        matches!(kind, MemberKind::Method) && options.wants(AnnotationSite::Parameter);

    let count = reader.read_u2()?;
    for _ in 0..count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        if !wants_plain && !wants_parameters {
            reader.skip(length)?;
            continue;
        }

        let name = cp.utf8(name_index)?;
        match &*name {
            VISIBLE_ANNOTATIONS | INVISIBLE_ANNOTATIONS if wants_plain => {
                let mut body = reader.sub_reader(length)?;
                read_annotations(&mut body, cp, kind.site(), attribute_label(&name), out)?;
            }
            VISIBLE_PARAMETER_ANNOTATIONS | INVISIBLE_PARAMETER_ANNOTATIONS if wants_parameters => {
                let label = attribute_label(&name);
                let mut body = reader.sub_reader(length)?;
                let parameters = body.read_u1()?;
                for _ in 0..parameters {
                    read_annotations(&mut body, cp, AnnotationSite::Parameter, label, out)?;
                }
            }
            _ => reader.skip(length)?,
        }
    }
    Ok(())
}

fn attribute_label(name: &str) -> &'static str {
    match name {
        VISIBLE_ANNOTATIONS => VISIBLE_ANNOTATIONS,
        INVISIBLE_ANNOTATIONS => INVISIBLE_ANNOTATIONS,
        VISIBLE_PARAMETER_ANNOTATIONS => VISIBLE_PARAMETER_ANNOTATIONS,
        _ => INVISIBLE_PARAMETER_ANNOTATIONS,
    }
}

/// `num_annotations` followed by that many annotations. Visible and
/// invisible tables collapse into the same occurrences here.
fn read_annotations(
    body: &mut Reader<'_>,
    cp: &ConstantPool<'_>,
    site: AnnotationSite,
    attribute: &'static str,
    out: &mut Vec<AnnotationOccurrence>,
) -> Result<(), DecodeError> {
    let count = body.read_u2()?;
    for _ in 0..count {
        let type_name = read_annotation(body, cp, attribute, 0)?;
        out.push(AnnotationOccurrence { site, type_name });
    }
    Ok(())
}

fn read_annotation(
    body: &mut Reader<'_>,
    cp: &ConstantPool<'_>,
    attribute: &'static str,
    depth: usize,
) -> Result<String, DecodeError> {
    let type_index = body.read_u2()?;
    let type_name = descriptor_to_type_name(&cp.utf8(type_index)?)
        .ok_or(DecodeError::MalformedAttribute(attribute))?;

    let pairs = body.read_u2()?;
    for _ in 0..pairs {
        body.skip(2)?;
        skip_element_value(body, cp, attribute, depth)?;
    }
    Ok(type_name)
}

fn skip_element_value(
    body: &mut Reader<'_>,
    cp: &ConstantPool<'_>,
    attribute: &'static str,
    depth: usize,
) -> Result<(), DecodeError> {
    if depth >= MAX_ELEMENT_NESTING {
        return Err(DecodeError::MalformedAttribute(attribute));
    }
    match body.read_u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => body.skip(2),
        b'e' => body.skip(4),
        b'@' => read_annotation(body, cp, attribute, depth + 1).map(|_| ()),
        b'[' => {
            let values = body.read_u2()?;
            for _ in 0..values {
                skip_element_value(body, cp, attribute, depth + 1)?;
            }
            Ok(())
        }
        _ => Err(DecodeError::MalformedAttribute(attribute)),
    }
}

/// `Lcom/example/Entity;` -> `com.example.Entity`.
fn descriptor_to_type_name(descriptor: &str) -> Option<String> {
    descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .filter(|name| !name.is_empty())
        .map(|name| name.replace('/', "."))
}
