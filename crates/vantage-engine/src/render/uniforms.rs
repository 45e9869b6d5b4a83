//! Uniform block packing.
//!
//! Every non-texture uniform of a material lives in one block, sorted by
//! name. Each value occupies a 16-byte slot (`Mat4` takes four), so a WGSL
//! program declares the matching struct with `@align(16)` on every member.

use std::collections::BTreeMap;

use super::error::BackendError;
use super::spec::UniformData;

pub const SLOT_BYTES: usize = 16;

impl UniformData {
    pub fn slot_bytes(&self) -> usize {
        match self {
            UniformData::Mat4(_) => 4 * SLOT_BYTES,
            _ => SLOT_BYTES,
        }
    }

    pub fn same_kind(&self, other: &UniformData) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// WGSL member type for this value. Booleans travel as `u32`.
    pub fn wgsl_type(&self) -> &'static str {
        match self {
            UniformData::Float(_) => "f32",
            UniformData::Vec2(_) => "vec2<f32>",
            UniformData::Vec3(_) => "vec3<f32>",
            UniformData::Vec4(_) => "vec4<f32>",
            UniformData::Mat4(_) => "mat4x4<f32>",
            UniformData::UInt(_) | UniformData::Bool(_) => "u32",
        }
    }

    fn write_le(&self, out: &mut [u8]) {
        let mut put = |i: usize, bytes: [u8; 4]| out[i * 4..i * 4 + 4].copy_from_slice(&bytes);
        match self {
            UniformData::Float(v) => put(0, v.to_le_bytes()),
            UniformData::Vec2(v) => v.iter().enumerate().for_each(|(i, c)| put(i, c.to_le_bytes())),
            UniformData::Vec3(v) => v.iter().enumerate().for_each(|(i, c)| put(i, c.to_le_bytes())),
            UniformData::Vec4(v) => v.iter().enumerate().for_each(|(i, c)| put(i, c.to_le_bytes())),
            UniformData::Mat4(v) => v.iter().enumerate().for_each(|(i, c)| put(i, c.to_le_bytes())),
            UniformData::UInt(v) => put(0, v.to_le_bytes()),
            UniformData::Bool(v) => put(0, u32::from(*v).to_le_bytes()),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    offset: usize,
    value: UniformData,
}

/// Packed uniform values of one material.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    entries: BTreeMap<String, Entry>,
    bytes: Vec<u8>,
}

impl UniformBlock {
    /// Lays out `values` in name order. Later duplicates win.
    pub fn new(values: &[(&str, UniformData)]) -> Self {
        let sorted: BTreeMap<&str, UniformData> = values.iter().copied().collect();

        let mut entries = BTreeMap::new();
        let mut offset = 0;
        for (name, value) in sorted {
            entries.insert(name.to_string(), Entry { offset, value });
            offset += value.slot_bytes();
        }

        // Zero-sized uniform bindings are invalid; keep one slot.
        let mut block = Self { entries, bytes: vec![0; offset.max(SLOT_BYTES)] };
        for entry in block.entries.values() {
            entry.value.write_le(&mut block.bytes[entry.offset..entry.offset + entry.value.slot_bytes()]);
        }
        block
    }

    pub fn get(&self, name: &str) -> Option<UniformData> {
        self.entries.get(name).map(|e| e.value)
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.entries.get(name).map(|e| e.offset)
    }

    /// Updates one value in place. The value must keep its declared kind.
    pub fn set(&mut self, name: &str, value: UniformData) -> Result<(), BackendError> {
        let Some(entry) = self.entries.get_mut(name) else {
            return Err(BackendError::Unsupported(format!(
                "uniform `{name}` was not declared when the material was created"
            )));
        };
        if !entry.value.same_kind(&value) {
            return Err(BackendError::Unsupported(format!(
                "uniform `{name}` cannot change type from {} to {}",
                entry.value.wgsl_type(),
                value.wgsl_type()
            )));
        }
        entry.value = value;
        let range = entry.offset..entry.offset + value.slot_bytes();
        value.write_le(&mut self.bytes[range]);
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `(name, value)` in block order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, UniformData)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_at(bytes: &[u8], offset: usize) -> f32 {
        f32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
    }

    #[test]
    fn values_are_laid_out_in_name_order_with_16_byte_slots() {
        let block = UniformBlock::new(&[
            ("zeta", UniformData::Float(1.0)),
            ("alpha", UniformData::Mat4([0.0; 16])),
            ("mid", UniformData::Vec3([1.0, 2.0, 3.0])),
        ]);
        assert_eq!(block.offset_of("alpha"), Some(0));
        assert_eq!(block.offset_of("mid"), Some(64));
        assert_eq!(block.offset_of("zeta"), Some(80));
        assert_eq!(block.bytes().len(), 96);
        assert_eq!(f32_at(block.bytes(), 68), 2.0);
        assert_eq!(f32_at(block.bytes(), 80), 1.0);
    }

    #[test]
    fn set_rewrites_only_its_slot() {
        let mut block = UniformBlock::new(&[
            ("a", UniformData::Float(1.0)),
            ("b", UniformData::Bool(false)),
        ]);
        block.set("b", UniformData::Bool(true)).unwrap();
        assert_eq!(block.bytes()[16..20], 1u32.to_le_bytes());
        assert_eq!(f32_at(block.bytes(), 0), 1.0);
        assert_eq!(block.get("b"), Some(UniformData::Bool(true)));
    }

    #[test]
    fn set_rejects_kind_changes_and_unknown_names() {
        let mut block = UniformBlock::new(&[("a", UniformData::Float(1.0))]);
        assert!(block.set("a", UniformData::Vec2([0.0, 0.0])).is_err());
        assert!(block.set("missing", UniformData::Float(0.0)).is_err());
    }

    #[test]
    fn empty_block_keeps_one_slot() {
        assert_eq!(UniformBlock::new(&[]).bytes().len(), SLOT_BYTES);
    }
}
