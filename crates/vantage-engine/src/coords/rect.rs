use glam::Vec2;

/// Axis-aligned rectangle in device pixels (bottom-left origin).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    /// From the wire `[x, y, w, h]` layout.
    #[inline]
    pub fn from_xywh(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    #[inline]
    pub fn min(self) -> Vec2 {
        self.origin
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        self.origin + self.size
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    /// Normalizes the rectangle so width/height are non-negative.
    #[inline]
    pub fn normalized(self) -> Self {
        let min = self.origin.min(self.origin + self.size);
        let max = self.origin.max(self.origin + self.size);
        Self { origin: min, size: max - min }
    }

    /// Half-open containment: [min, max).
    #[inline]
    pub fn contains(self, p: Vec2) -> bool {
        let r = self.normalized();
        p.x >= r.origin.x && p.y >= r.origin.y && p.x < r.max().x && p.y < r.max().y
    }

    #[inline]
    pub fn intersect(self, other: Rect) -> Option<Rect> {
        let a = self.normalized();
        let b = other.normalized();

        let lo = a.min().max(b.min());
        let hi = a.max().min(b.max());
        let size = hi - lo;

        if size.x <= 0.0 || size.y <= 0.0 {
            None
        } else {
            Some(Rect { origin: lo, size })
        }
    }

    /// Snaps to whole pixels. Edges round to nearest; negative extents clamp
    /// to zero.
    pub fn to_pixels(self) -> PixelRect {
        let r = self.normalized();
        let x0 = r.min().x.round().max(0.0);
        let y0 = r.min().y.round().max(0.0);
        let x1 = r.max().x.round().max(x0);
        let y1 = r.max().y.round().max(y0);
        PixelRect::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
    }
}

/// Whole-pixel rectangle in device pixels (bottom-left origin).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Full-canvas rectangle.
    #[inline]
    pub const fn canvas(size: (u32, u32)) -> Self {
        Self::new(0, 0, size.0, size.1)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn right(self) -> u32 {
        self.x.saturating_add(self.width)
    }

    #[inline]
    pub fn top(self) -> u32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub fn area(self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn contains(self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.top()
    }

    pub fn intersect(self, other: PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.top().min(other.top());
        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some(PixelRect::new(x0, y0, x1 - x0, y1 - y0))
        }
    }

    /// Clamps to a canvas of `size` pixels.
    #[inline]
    pub fn clamp_to(self, size: (u32, u32)) -> Option<PixelRect> {
        self.intersect(PixelRect::canvas(size))
    }

    /// First row of this rect counted from the top of a canvas `canvas_height`
    /// tall. Used to address top-left-origin render targets.
    #[inline]
    pub fn top_row(self, canvas_height: u32) -> u32 {
        canvas_height.saturating_sub(self.top())
    }
}
