/// Straight-alpha RGBA color, components in `[0, 1]`.
///
/// Backends blend with straight alpha (`src * a + dst * (1 - a)`), so colors
/// are stored exactly as the host sends them.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    pub const fn from_array(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    #[inline]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Quantizes to 8-bit channels, clamping out-of-range components.
    #[inline]
    pub fn to_rgba8(self) -> [u8; 4] {
        self.to_array().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }

    #[inline]
    pub fn from_rgba8(v: [u8; 4]) -> Self {
        let [r, g, b, a] = v.map(|c| c as f32 / 255.0);
        Self::new(r, g, b, a)
    }

    /// Straight-alpha "over" compositing of `self` onto `dst`.
    #[inline]
    pub fn over(self, dst: Color) -> Color {
        let a = self.a.clamp(0.0, 1.0);
        let mix = |s: f32, d: f32| s * a + d * (1.0 - a);
        Color::new(
            mix(self.r, dst.r),
            mix(self.g, dst.g),
            mix(self.b, dst.b),
            a + dst.a * (1.0 - a),
        )
    }

    #[inline]
    pub fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.r as f64,
            g: self.g as f64,
            b: self.b as f64,
            a: self.a as f64,
        }
    }
}
