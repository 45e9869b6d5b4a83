use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtoError;

/// A shader uniform as sent by the host.
///
/// The variant is fixed by the wire tag (`"type"`) when the description is
/// decoded and is never re-inferred from array lengths later on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawUniform", into = "RawUniform")]
pub enum UniformValue {
    Scalar(f32),
    UInt(u32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major 4x4 matrix.
    Mat4([f32; 16]),
    Sampler(TextureDescriptor),
}

impl UniformValue {
    pub fn tag(&self) -> &'static str {
        match self {
            UniformValue::Scalar(_) => "Scalar",
            UniformValue::UInt(_) => "UInt",
            UniformValue::Bool(_) => "Bool",
            UniformValue::Vec2(_) => "Vec2",
            UniformValue::Vec3(_) => "Vec3",
            UniformValue::Vec4(_) => "Vec4",
            UniformValue::Mat4(_) => "Mat4",
            UniformValue::Sampler(_) => "Sampler",
        }
    }

    /// Float components of a fixed-size numeric value, `None` for samplers
    /// and integer/bool scalars.
    pub fn components(&self) -> Option<&[f32]> {
        match self {
            UniformValue::Scalar(v) => Some(std::slice::from_ref(v)),
            UniformValue::Vec2(v) => Some(v),
            UniformValue::Vec3(v) => Some(v),
            UniformValue::Vec4(v) => Some(v),
            UniformValue::Mat4(v) => Some(v),
            _ => None,
        }
    }

    fn components_mut(&mut self) -> Option<&mut [f32]> {
        match self {
            UniformValue::Scalar(v) => Some(std::slice::from_mut(v)),
            UniformValue::Vec2(v) => Some(v),
            UniformValue::Vec3(v) => Some(v),
            UniformValue::Vec4(v) => Some(v),
            UniformValue::Mat4(v) => Some(v),
            _ => None,
        }
    }

    /// Copies `other` into `self` component-wise when both are fixed-size
    /// numeric values of the same shape. Returns `false` (and leaves `self`
    /// untouched) otherwise.
    pub fn copy_components_from(&mut self, other: &UniformValue) -> bool {
        if self.tag() != other.tag() {
            return false;
        }
        match (self.components_mut(), other.components()) {
            (Some(dst), Some(src)) if dst.len() == src.len() => {
                dst.copy_from_slice(src);
                true
            }
            _ => false,
        }
    }
}

/// Element type of texture data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    U8,
    F32,
}

/// Channel layout of texture data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFormat {
    Red,
    Rg,
    Rgb,
    Rgba,
}

impl TextureFormat {
    pub const fn channels(self) -> u32 {
        match self {
            TextureFormat::Red => 1,
            TextureFormat::Rg => 2,
            TextureFormat::Rgb => 3,
            TextureFormat::Rgba => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
    Mirror,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharedTexture {
    Atlas,
}

/// Where a texture's texels come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextureSource {
    /// Row-major texels, `channels` floats per texel. `u8` textures carry
    /// values in `[0, 1]`.
    Inline(Vec<f32>),
    /// Reference to the client's shared, read-only texture atlas.
    Shared(SharedTexture),
}

/// Texture/sampler uniform (`{"type": "Sampler", ...}` on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureDescriptor {
    /// One entry per dimension: `[w]`, `[w, h]` or `[w, h, d]`.
    pub size: Vec<u32>,
    pub format: TextureFormat,
    pub element_type: ElementType,
    #[serde(default)]
    pub wrap: WrapMode,
    #[serde(default)]
    pub filter: FilterMode,
    pub data: TextureSource,
}

impl TextureDescriptor {
    pub fn dimensions(&self) -> usize {
        self.size.len()
    }

    pub fn texel_count(&self) -> usize {
        self.size.iter().map(|&s| s as usize).product()
    }

    /// Number of floats the inline data must hold.
    pub fn expected_len(&self) -> usize {
        self.texel_count() * self.format.channels() as usize
    }

    pub fn inline_data(&self) -> Option<&[f32]> {
        match &self.data {
            TextureSource::Inline(d) => Some(d),
            TextureSource::Shared(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), ProtoError> {
        if !(1..=3).contains(&self.size.len()) {
            return Err(ProtoError::InvalidTexture(format!(
                "expected 1 to 3 dimensions, got {}",
                self.size.len()
            )));
        }
        if self.size.iter().any(|&s| s == 0) {
            return Err(ProtoError::InvalidTexture(format!(
                "zero-sized dimension in {:?}",
                self.size
            )));
        }
        if let Some(data) = self.inline_data() {
            if data.len() != self.expected_len() {
                return Err(ProtoError::InvalidTexture(format!(
                    "size {:?} x {} channels needs {} values, got {}",
                    self.size,
                    self.format.channels(),
                    self.expected_len(),
                    data.len()
                )));
            }
        }
        Ok(())
    }
}

// ── wire form ─────────────────────────────────────────────────────────────

/// Untyped wire form: a `"type"` tag plus the remaining fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawUniform {
    #[serde(rename = "type")]
    tag: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl RawUniform {
    fn value<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, ProtoError> {
        let raw = self.fields.remove("value").ok_or_else(|| ProtoError::InvalidUniform {
            tag: self.tag.clone(),
            reason: "missing `value`".to_string(),
        })?;
        serde_json::from_value(raw).map_err(|e| ProtoError::InvalidUniform {
            tag: self.tag.clone(),
            reason: e.to_string(),
        })
    }
}

impl TryFrom<RawUniform> for UniformValue {
    type Error = ProtoError;

    fn try_from(mut raw: RawUniform) -> Result<Self, Self::Error> {
        let value = match raw.tag.as_str() {
            "Scalar" => UniformValue::Scalar(raw.value()?),
            "UInt" => UniformValue::UInt(raw.value()?),
            "Bool" => UniformValue::Bool(raw.value()?),
            "Vec2" => UniformValue::Vec2(raw.value()?),
            "Vec3" => UniformValue::Vec3(raw.value()?),
            "Vec4" => UniformValue::Vec4(raw.value()?),
            "Mat4" => UniformValue::Mat4(raw.value()?),
            "Sampler" => {
                let desc: TextureDescriptor = serde_json::from_value(Value::Object(raw.fields))
                    .map_err(|e| ProtoError::InvalidUniform {
                        tag: "Sampler".to_string(),
                        reason: e.to_string(),
                    })?;
                desc.validate()?;
                UniformValue::Sampler(desc)
            }
            _ => return Err(ProtoError::UnknownUniformTag(raw.tag)),
        };
        Ok(value)
    }
}

impl From<UniformValue> for RawUniform {
    fn from(v: UniformValue) -> Self {
        let tag = v.tag().to_string();
        let mut fields = Map::new();
        let value = match v {
            UniformValue::Scalar(x) => Value::from(x),
            UniformValue::UInt(x) => Value::from(x),
            UniformValue::Bool(x) => Value::from(x),
            UniformValue::Vec2(x) => Value::from(x.to_vec()),
            UniformValue::Vec3(x) => Value::from(x.to_vec()),
            UniformValue::Vec4(x) => Value::from(x.to_vec()),
            UniformValue::Mat4(x) => Value::from(x.to_vec()),
            UniformValue::Sampler(desc) => {
                if let Ok(Value::Object(map)) = serde_json::to_value(desc) {
                    fields = map;
                }
                return RawUniform { tag, fields };
            }
        };
        fields.insert("value".to_string(), value);
        RawUniform { tag, fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(src: &str) -> Result<UniformValue, serde_json::Error> {
        serde_json::from_str(src)
    }

    #[test]
    fn decodes_tagged_vectors() {
        assert_eq!(decode(r#"{"type":"Scalar","value":1.5}"#).unwrap(), UniformValue::Scalar(1.5));
        assert_eq!(
            decode(r#"{"type":"Vec3","value":[1,2,3]}"#).unwrap(),
            UniformValue::Vec3([1.0, 2.0, 3.0])
        );
        assert_eq!(decode(r#"{"type":"Bool","value":true}"#).unwrap(), UniformValue::Bool(true));
    }

    #[test]
    fn shape_comes_from_the_tag_not_the_length() {
        // Four floats tagged Vec3 is malformed, not silently a Vec4.
        let err = decode(r#"{"type":"Vec3","value":[1,2,3,4]}"#).unwrap_err();
        assert!(err.to_string().contains("malformed `Vec3` uniform"));
    }

    #[test]
    fn unknown_tag_is_reported_by_name() {
        let err = decode(r#"{"type":"Quaternion","value":[0,0,0,1]}"#).unwrap_err();
        assert!(err.to_string().contains("unknown uniform type tag `Quaternion`"));
    }

    #[test]
    fn sampler_with_inline_data() {
        let v = decode(
            r#"{"type":"Sampler","size":[2,1],"format":"rg","elementType":"f32",
                "wrap":"repeat","filter":"nearest","data":[0,1,2,3]}"#,
        )
        .unwrap();
        let UniformValue::Sampler(desc) = v else { panic!("expected sampler") };
        assert_eq!(desc.dimensions(), 2);
        assert_eq!(desc.wrap, WrapMode::Repeat);
        assert_eq!(desc.inline_data().unwrap().len(), 4);
    }

    #[test]
    fn sampler_referencing_the_atlas() {
        let v = decode(
            r#"{"type":"Sampler","size":[64,64],"format":"red","elementType":"u8","data":"atlas"}"#,
        )
        .unwrap();
        let UniformValue::Sampler(desc) = v else { panic!("expected sampler") };
        assert_eq!(desc.data, TextureSource::Shared(SharedTexture::Atlas));
        assert_eq!(desc.filter, FilterMode::Linear);
    }

    #[test]
    fn sampler_data_length_is_checked() {
        let err = decode(
            r#"{"type":"Sampler","size":[2,2],"format":"rgba","elementType":"u8","data":[0,0,0]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("needs 16 values, got 3"));
    }

    #[test]
    fn component_copy_requires_matching_shape() {
        let mut v = UniformValue::Vec2([0.0, 0.0]);
        assert!(v.copy_components_from(&UniformValue::Vec2([3.0, 4.0])));
        assert_eq!(v, UniformValue::Vec2([3.0, 4.0]));
        assert!(!v.copy_components_from(&UniformValue::Vec3([1.0, 1.0, 1.0])));
        assert_eq!(v, UniformValue::Vec2([3.0, 4.0]));
    }

    #[test]
    fn encodes_back_to_the_tagged_form() {
        let json = serde_json::to_string(&UniformValue::Vec2([1.0, 2.0])).unwrap();
        assert_eq!(json, r#"{"type":"Vec2","value":[1.0,2.0]}"#);
    }
}
