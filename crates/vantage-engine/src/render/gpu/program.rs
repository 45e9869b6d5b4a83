//! WGSL generation for the reference program.
//!
//! Mirrors the CPU backend: position (+ instance `offset`) through
//! `projectionview * model`, flat `color`, and the picking encoding when the
//! `picking` uniform is set. The uniform struct is generated from the
//! material's block so it always matches the 16-byte slot layout.

use std::fmt::Write;

use crate::render::uniforms::UniformBlock;
use crate::render::{StepMode, UniformData};

use super::resources::LayoutKey;

/// Widens an attribute of `item_size` floats to `vec3<f32>`.
fn widen(expr: &str, item_size: u32) -> String {
    match item_size {
        1 => format!("vec3<f32>({expr}, 0.0, 0.0)"),
        2 => format!("vec3<f32>({expr}, 0.0)"),
        3 => expr.to_string(),
        _ => format!("{expr}.xyz"),
    }
}

fn wgsl_vec(item_size: u32) -> &'static str {
    match item_size {
        1 => "f32",
        2 => "vec2<f32>",
        3 => "vec3<f32>",
        _ => "vec4<f32>",
    }
}

/// Declaration of the group 0 uniform block for `block`.
pub(super) fn uniform_struct(block: &UniformBlock) -> String {
    let mut out = String::from("struct Uniforms {\n");
    for (name, value) in block.iter() {
        let _ = writeln!(out, "    @align(16) {name}: {},", value.wgsl_type());
    }
    // WGSL structs may not be empty.
    if block.iter().next().is_none() {
        out.push_str("    @align(16) _unused: f32,\n");
    }
    out.push_str("};\n@group(0) @binding(0) var<uniform> u: Uniforms;\n");
    out
}

/// Full reference program (`vs_main` + `fs_main`) for one material and
/// vertex layout.
pub(super) fn reference_program(block: &UniformBlock, layout: &LayoutKey) -> String {
    let has = |name: &str| block.get(name).is_some();
    let mut src = uniform_struct(block);

    src.push_str("\nstruct VsIn {\n");
    for (location, (name, item_size, _)) in layout.iter().enumerate() {
        let _ = writeln!(src, "    @location({location}) a_{name}: {},", wgsl_vec(*item_size));
    }
    src.push_str(
        "    @builtin(vertex_index) vertex_index: u32,\n    @builtin(instance_index) instance_index: u32,\n};\n",
    );
    src.push_str(
        "\nstruct VsOut {\n    @builtin(position) clip: vec4<f32>,\n    @location(0) @interpolate(flat) index: u32,\n};\n",
    );

    let position = layout.iter().find(|(n, _, step)| n == "position" && *step == StepMode::Vertex);
    let offset = layout.iter().find(|(n, _, step)| n == "offset" && *step == StepMode::Instance);
    let instanced = layout.iter().any(|(_, _, step)| *step == StepMode::Instance);

    src.push_str("\n@vertex\nfn vs_main(v: VsIn) -> VsOut {\n");
    match position {
        Some((_, size, _)) => {
            let _ = writeln!(src, "    var p = {};", widen("v.a_position", *size));
        }
        None => src.push_str("    var p = vec3<f32>(0.0);\n"),
    }
    if let Some((_, size, _)) = offset {
        let _ = writeln!(src, "    p = p + {};", widen("v.a_offset", *size));
    }
    let mut transform = String::new();
    if matches!(block.get("projectionview"), Some(UniformData::Mat4(_))) {
        transform.push_str("u.projectionview * ");
    }
    if matches!(block.get("model"), Some(UniformData::Mat4(_))) {
        transform.push_str("u.model * ");
    }
    let _ = writeln!(src, "    var out: VsOut;\n    out.clip = {transform}vec4<f32>(p, 1.0);");
    let index = if instanced { "v.instance_index" } else { "v.vertex_index" };
    let _ = writeln!(src, "    out.index = {index};\n    return out;\n}}");

    src.push_str(
        "\nfn encode_pick(id: u32, index: u32) -> vec4<f32> {\n    \
         return vec4<f32>(\n        \
         f32(id & 0xffu), f32((id >> 8u) & 0xffu),\n        \
         f32(index & 0xffu), f32((index >> 8u) & 0xffu),\n    ) / 255.0;\n}\n",
    );

    src.push_str("\n@fragment\nfn fs_main(v: VsOut) -> @location(0) vec4<f32> {\n");
    if has("picking") && has("object_id") {
        src.push_str("    if (u.picking != 0u) {\n        return encode_pick(u.object_id, v.index);\n    }\n");
    }
    let color = match block.get("color") {
        Some(UniformData::Vec4(_)) => "u.color",
        Some(UniformData::Vec3(_)) => "vec4<f32>(u.color, 1.0)",
        _ => "vec4<f32>(1.0)",
    };
    let _ = writeln!(src, "    return {color};\n}}");
    src
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> UniformBlock {
        UniformBlock::new(&[
            ("projectionview", UniformData::Mat4([0.0; 16])),
            ("color", UniformData::Vec4([1.0; 4])),
            ("object_id", UniformData::UInt(0)),
            ("picking", UniformData::Bool(false)),
        ])
    }

    #[test]
    fn uniform_struct_follows_block_order() {
        let s = uniform_struct(&block());
        let color = s.find("color").unwrap();
        let object_id = s.find("object_id").unwrap();
        let picking = s.find("picking").unwrap();
        let pv = s.find("projectionview").unwrap();
        assert!(color < object_id && object_id < picking && picking < pv);
        assert!(s.contains("@align(16) picking: u32"));
    }

    #[test]
    fn instanced_layout_reports_instance_index() {
        let layout = vec![
            ("position".to_string(), 2, StepMode::Vertex),
            ("offset".to_string(), 3, StepMode::Instance),
        ];
        let src = reference_program(&block(), &layout);
        assert!(src.contains("@location(0) a_position: vec2<f32>"));
        assert!(src.contains("@location(1) a_offset: vec3<f32>"));
        assert!(src.contains("p = p + v.a_offset;"));
        assert!(src.contains("out.index = v.instance_index;"));
        assert!(src.contains("u.projectionview * vec4<f32>(p, 1.0)"));
        assert!(src.contains("encode_pick(u.object_id, v.index)"));
    }

    #[test]
    fn missing_color_falls_back_to_white() {
        let block = UniformBlock::new(&[]);
        let layout = vec![("position".to_string(), 3, StepMode::Vertex)];
        let src = reference_program(&block, &layout);
        assert!(src.contains("return vec4<f32>(1.0);"));
        assert!(src.contains("out.index = v.vertex_index;"));
        assert!(!src.contains("u.picking"));
    }
}
