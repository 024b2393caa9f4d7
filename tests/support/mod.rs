//! Assembles real class file bytes for tests: constant pool, fields, methods
//! with `Code`, and annotation attributes whose element values exercise every
//! value kind.

#![allow(dead_code)]

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Visible,
    Invisible,
}

pub type Ann<'a> = (&'a str, Retention);

struct Pool {
    bytes: Vec<u8>,
    next: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Pool {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            next: 1,
            utf8: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    fn utf8(&mut self, s: &str) -> u16 {
        if let Some(index) = self.utf8.get(s) {
            return *index;
        }
        let index = self.next;
        self.next += 1;
        self.bytes.push(1);
        self.bytes.extend_from_slice(&(s.len() as u16).to_be_bytes());
        self.bytes.extend_from_slice(s.as_bytes());
        self.utf8.insert(s.to_string(), index);
        index
    }

    fn class(&mut self, dotted: &str) -> u16 {
        let internal = dotted.replace('.', "/");
        if let Some(index) = self.classes.get(&internal) {
            return *index;
        }
        let name = self.utf8(&internal);
        let index = self.next;
        self.next += 1;
        self.bytes.push(7);
        self.bytes.extend_from_slice(&name.to_be_bytes());
        self.classes.insert(internal, index);
        index
    }

    fn integer(&mut self, value: i32) -> u16 {
        let index = self.next;
        self.next += 1;
        self.bytes.push(3);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        index
    }

    fn long(&mut self, value: i64) -> u16 {
        let index = self.next;
        self.next += 2;
        self.bytes.push(5);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        index
    }
}

struct Member {
    name: String,
    annotations: Vec<(String, Retention)>,
    parameters: Vec<Vec<(String, Retention)>>,
}

pub struct ClassFileBuilder {
    name: String,
    super_class: String,
    major: u16,
    interfaces: Vec<String>,
    class_annotations: Vec<(String, Retention)>,
    fields: Vec<Member>,
    methods: Vec<Member>,
}

fn owned(anns: &[Ann<'_>]) -> Vec<(String, Retention)> {
    anns.iter().map(|(t, r)| (t.to_string(), *r)).collect()
}

impl ClassFileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_class: "java.lang.Object".to_string(),
            major: 52,
            interfaces: Vec::new(),
            class_annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn major_version(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn class_annotation(mut self, type_name: &str, retention: Retention) -> Self {
        self.class_annotations.push((type_name.to_string(), retention));
        self
    }

    pub fn field(mut self, name: &str, anns: &[Ann<'_>]) -> Self {
        self.fields.push(Member {
            name: name.to_string(),
            annotations: owned(anns),
            parameters: Vec::new(),
        });
        self
    }

    pub fn method(mut self, name: &str, anns: &[Ann<'_>], parameters: &[&[Ann<'_>]]) -> Self {
        self.methods.push(Member {
            name: name.to_string(),
            annotations: owned(anns),
            parameters: parameters.iter().map(|p| owned(p)).collect(),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = Pool::new();
        let mut body = Vec::new();

        put_u2(&mut body, 0x0021);
        put_u2(&mut body, pool.class(&self.name));
        put_u2(&mut body, pool.class(&self.super_class));
        put_u2(&mut body, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            put_u2(&mut body, pool.class(interface));
        }

        put_u2(&mut body, self.fields.len() as u16);
        for field in &self.fields {
            put_u2(&mut body, 0x0002);
            put_u2(&mut body, pool.utf8(&field.name));
            put_u2(&mut body, pool.utf8("Ljava/lang/String;"));
            let attrs = annotation_attributes(&mut pool, &field.annotations);
            put_attributes(&mut body, attrs);
        }

        put_u2(&mut body, self.methods.len() as u16);
        for method in &self.methods {
            put_u2(&mut body, 0x0001);
            put_u2(&mut body, pool.utf8(&method.name));
            let descriptor = format!(
                "({})V",
                "Ljava/lang/Object;".repeat(method.parameters.len())
            );
            put_u2(&mut body, pool.utf8(&descriptor));

            let mut attrs = vec![attribute(
                &mut pool,
                "Code",
                vec![0, 1, 0, 1 + method.parameters.len() as u8, 0, 0, 0, 1, 0xB1, 0, 0, 0, 0],
            )];
            attrs.extend(annotation_attributes(&mut pool, &method.annotations));
            attrs.extend(parameter_attributes(&mut pool, &method.parameters));
            put_attributes(&mut body, attrs);
        }

        let source_file = format!(
            "{}.java",
            self.name.rsplit('.').next().unwrap_or(&self.name)
        );
        let source_index = pool.utf8(&source_file);
        let mut attrs = vec![attribute(&mut pool, "SourceFile", source_index.to_be_bytes().to_vec())];
        attrs.extend(annotation_attributes(&mut pool, &self.class_annotations));
        put_attributes(&mut body, attrs);

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        put_u2(&mut out, 0);
        put_u2(&mut out, self.major);
        put_u2(&mut out, pool.next);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_attributes(out: &mut Vec<u8>, attrs: Vec<Vec<u8>>) {
    put_u2(out, attrs.len() as u16);
    for attr in attrs {
        out.extend_from_slice(&attr);
    }
}

fn attribute(pool: &mut Pool, name: &str, info: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    put_u2(&mut out, pool.utf8(name));
    out.extend_from_slice(&(info.len() as u32).to_be_bytes());
    out.extend_from_slice(&info);
    out
}

fn annotation_attributes(pool: &mut Pool, anns: &[(String, Retention)]) -> Vec<Vec<u8>> {
    let mut attrs = Vec::new();
    for (retention, name) in [
        (Retention::Visible, "RuntimeVisibleAnnotations"),
        (Retention::Invisible, "RuntimeInvisibleAnnotations"),
    ] {
        let selected: Vec<&str> = anns
            .iter()
            .filter(|(_, r)| *r == retention)
            .map(|(t, _)| t.as_str())
            .collect();
        if selected.is_empty() {
            continue;
        }
        let info = annotation_table(pool, &selected);
        attrs.push(attribute(pool, name, info));
    }
    attrs
}

fn parameter_attributes(pool: &mut Pool, parameters: &[Vec<(String, Retention)>]) -> Vec<Vec<u8>> {
    let mut attrs = Vec::new();
    for (retention, name) in [
        (Retention::Visible, "RuntimeVisibleParameterAnnotations"),
        (Retention::Invisible, "RuntimeInvisibleParameterAnnotations"),
    ] {
        if !parameters.iter().flatten().any(|(_, r)| *r == retention) {
            continue;
        }
        let mut info = vec![parameters.len() as u8];
        for parameter in parameters {
            let selected: Vec<&str> = parameter
                .iter()
                .filter(|(_, r)| *r == retention)
                .map(|(t, _)| t.as_str())
                .collect();
            info.extend(annotation_table(pool, &selected));
        }
        attrs.push(attribute(pool, name, info));
    }
    attrs
}

fn annotation_table(pool: &mut Pool, types: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    put_u2(&mut out, types.len() as u16);
    for type_name in types {
        annotation(pool, &mut out, type_name);
    }
    out
}

/// One annotation carrying one element value of every kind, including a
/// nested `@Deprecated` that must not be indexed.
fn annotation(pool: &mut Pool, out: &mut Vec<u8>, type_name: &str) {
    put_u2(out, pool.utf8(&format!("L{};", type_name.replace('.', "/"))));
    put_u2(out, 6);

    put_u2(out, pool.utf8("value"));
    out.push(b's');
    put_u2(out, pool.utf8("some text"));

    put_u2(out, pool.utf8("flags"));
    out.push(b'[');
    put_u2(out, 2);
    for v in [7, 11] {
        out.push(b'I');
        put_u2(out, pool.integer(v));
    }

    put_u2(out, pool.utf8("since"));
    out.push(b'J');
    put_u2(out, pool.long(1_700_000_000_000));

    put_u2(out, pool.utf8("mode"));
    out.push(b'e');
    put_u2(out, pool.utf8("Lcom/example/Mode;"));
    put_u2(out, pool.utf8("FAST"));

    put_u2(out, pool.utf8("type"));
    out.push(b'c');
    put_u2(out, pool.utf8("Ljava/lang/String;"));

    put_u2(out, pool.utf8("meta"));
    out.push(b'@');
    put_u2(out, pool.utf8("Ljava/lang/Deprecated;"));
    put_u2(out, 0);
}
