use std::borrow::Cow;

use crate::error::DecodeError;
use crate::reader::Reader;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

#[derive(Debug, Clone, Copy)]
enum Entry<'a> {
    /// Slot 0 and the upper half of a Long/Double.
    Unusable,
    Utf8(&'a [u8]),
    Class(u16),
    Other(&'static str),
}

impl Entry<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Unusable => "unusable",
            Entry::Utf8(_) => "Utf8",
            Entry::Class(_) => "Class",
            Entry::Other(kind) => *kind,
        }
    }
}

/// Only the entries annotation indexing needs (Utf8 and Class) are kept;
/// everything else is validated for size and skipped.
pub(crate) struct ConstantPool<'a> {
    entries: Vec<Entry<'a>>,
}

impl<'a> ConstantPool<'a> {
    pub(crate) fn parse(reader: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let count = reader.read_u2()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Entry::Unusable);

        let mut index: u16 = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                TAG_UTF8 => {
                    let len = reader.read_u2()? as usize;
                    Entry::Utf8(reader.read_bytes(len)?)
                }
                TAG_CLASS => Entry::Class(reader.read_u2()?),
                TAG_INTEGER | TAG_FLOAT => {
                    reader.skip(4)?;
                    Entry::Other(if tag == TAG_INTEGER { "Integer" } else { "Float" })
                }
                TAG_LONG | TAG_DOUBLE => {
                    reader.skip(8)?;
                    Entry::Other(if tag == TAG_LONG { "Long" } else { "Double" })
                }
                TAG_STRING => {
                    reader.skip(2)?;
                    Entry::Other("String")
                }
                TAG_METHOD_TYPE => {
                    reader.skip(2)?;
                    Entry::Other("MethodType")
                }
                TAG_MODULE => {
                    reader.skip(2)?;
                    Entry::Other("Module")
                }
                TAG_PACKAGE => {
                    reader.skip(2)?;
                    Entry::Other("Package")
                }
                TAG_FIELDREF | TAG_METHODREF | TAG_INTERFACE_METHODREF => {
                    reader.skip(4)?;
                    Entry::Other("MemberRef")
                }
                TAG_NAME_AND_TYPE => {
                    reader.skip(4)?;
                    Entry::Other("NameAndType")
                }
                TAG_DYNAMIC | TAG_INVOKE_DYNAMIC => {
                    reader.skip(4)?;
                    Entry::Other("Dynamic")
                }
                TAG_METHOD_HANDLE => {
                    reader.skip(3)?;
                    Entry::Other("MethodHandle")
                }
                _ => return Err(DecodeError::InvalidConstantPoolTag { tag, index }),
            };
            entries.push(entry);

            if tag == TAG_LONG || tag == TAG_DOUBLE {
                entries.push(Entry::Unusable);
                index = index.saturating_add(2);
            } else {
                index += 1;
            }
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<Entry<'a>, DecodeError> {
        match self.entries.get(index as usize) {
            Some(Entry::Unusable) | None => Err(DecodeError::InvalidConstantPoolIndex(index)),
            Some(entry) => Ok(*entry),
        }
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<Cow<'a, str>, DecodeError> {
        match self.get(index)? {
            Entry::Utf8(bytes) => {
                decode_modified_utf8(bytes).ok_or(DecodeError::InvalidModifiedUtf8(index))
            }
            other => Err(DecodeError::ConstantPoolTypeMismatch {
                index,
                expected: "Utf8",
                found: other.kind(),
            }),
        }
    }

    /// Resolves a Class entry to its dotted binary name.
    pub(crate) fn class_name(&self, index: u16) -> Result<String, DecodeError> {
        match self.get(index)? {
            Entry::Class(name_index) => Ok(self.utf8(name_index)?.replace('/', ".")),
            other => Err(DecodeError::ConstantPoolTypeMismatch {
                index,
                expected: "Class",
                found: other.kind(),
            }),
        }
    }
}

/// Decodes the JVM's modified UTF-8: NUL is encoded as `C0 80` and
/// supplementary characters as surrogate pairs of three-byte sequences.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Option<Cow<'_, str>> {
    if !bytes.iter().any(|b| *b == 0 || *b >= 0xF0)
        && let Ok(s) = std::str::from_utf8(bytes)
    {
        return Some(Cow::Borrowed(s));
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            if b == 0 {
                return None;
            }
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = continuation(bytes.get(i + 1))?;
            units.push(((b as u16 & 0x1F) << 6) | b2);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = continuation(bytes.get(i + 1))?;
            let b3 = continuation(bytes.get(i + 2))?;
            units.push(((b as u16 & 0x0F) << 12) | (b2 << 6) | b3);
            i += 3;
        } else {
            return None;
        }
    }

    String::from_utf16(&units).ok().map(Cow::Owned)
}

fn continuation(byte: Option<&u8>) -> Option<u16> {
    byte.filter(|b| *b & 0xC0 == 0x80).map(|b| (*b & 0x3F) as u16)
}
