use glam::{Vec2, Vec3};

use crate::coords::PixelRect;

/// Color + depth buffer, row 0 at the bottom.
#[derive(Debug, Clone)]
pub(super) struct Target {
    pub width: u32,
    pub height: u32,
    pub color: Vec<[u8; 4]>,
    pub depth: Vec<f32>,
}

impl Target {
    pub fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self { width, height, color: vec![[0; 4]; n], depth: vec![1.0; n] }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        (x < self.width && y < self.height).then(|| self.color[self.index(x, y)])
    }

    pub fn fill(&mut self, rect: PixelRect, color: [u8; 4]) {
        let Some(rect) = rect.clamp_to((self.width, self.height)) else {
            return;
        };
        for y in rect.y..rect.top() {
            for x in rect.x..rect.right() {
                let i = self.index(x, y);
                self.color[i] = color;
                self.depth[i] = 1.0;
            }
        }
    }

    /// Copies `rect` row by row, bottom-up. Out-of-canvas pixels read as zero.
    pub fn read(&self, rect: PixelRect) -> Vec<[u8; 4]> {
        let mut out = Vec::with_capacity(rect.area());
        for y in rect.y..rect.top() {
            for x in rect.x..rect.right() {
                out.push(self.pixel(x, y).unwrap_or([0; 4]));
            }
        }
        out
    }
}

#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Fills a window-space triangle (`x`, `y` in pixels, `z` depth in `[0, 1]`)
/// inside `scissor`, sampling at pixel centres. Both windings are filled.
/// `shade` returns the new pixel value given the old one.
pub(super) fn fill_triangle(
    target: &mut Target,
    scissor: PixelRect,
    tri: [Vec3; 3],
    mut shade: impl FnMut([u8; 4]) -> [u8; 4],
) {
    let [a, b, c] = tri.map(|v| v.truncate());
    let area = edge(a, b, c);
    if area == 0.0 || !area.is_finite() {
        return;
    }

    let Some(clip) = scissor.clamp_to((target.width, target.height)) else {
        return;
    };

    let lo = a.min(b).min(c).floor().max(Vec2::new(clip.x as f32, clip.y as f32));
    let hi = a.max(b).max(c).ceil().min(Vec2::new(clip.right() as f32, clip.top() as f32));
    if lo.x >= hi.x || lo.y >= hi.y {
        return;
    }

    for y in lo.y as u32..hi.y as u32 {
        for x in lo.x as u32..hi.x as u32 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(b, c, p) / area;
            let w1 = edge(c, a, p) / area;
            let w2 = edge(a, b, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let z = w0 * tri[0].z + w1 * tri[1].z + w2 * tri[2].z;
            if !(0.0..=1.0).contains(&z) {
                continue;
            }

            let i = target.index(x, y);
            if z > target.depth[i] {
                continue;
            }
            target.depth[i] = z;
            target.color[i] = shade(target.color[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_filled(t: &Target) -> usize {
        t.color.iter().filter(|&&c| c != [0; 4]).count()
    }

    #[test]
    fn fills_pixel_centres_inside_the_triangle() {
        let mut t = Target::new(4, 4);
        let tri = [Vec3::new(0.0, 0.0, 0.5), Vec3::new(4.0, 0.0, 0.5), Vec3::new(0.0, 4.0, 0.5)];
        fill_triangle(&mut t, PixelRect::canvas((4, 4)), tri, |_| [1; 4]);
        // Centres with x + y < 4 (strictly inside) or on the hypotenuse.
        assert_eq!(count_filled(&t), 10);
        assert_eq!(t.pixel(0, 0), Some([1; 4]));
        assert_eq!(t.pixel(3, 3), Some([0; 4]));
    }

    #[test]
    fn scissor_limits_writes() {
        let mut t = Target::new(8, 8);
        let tri = [Vec3::new(-10.0, -10.0, 0.0), Vec3::new(30.0, -10.0, 0.0), Vec3::new(-10.0, 30.0, 0.0)];
        fill_triangle(&mut t, PixelRect::new(2, 2, 3, 3), tri, |_| [9; 4]);
        assert_eq!(count_filled(&t), 9);
        assert_eq!(t.pixel(1, 2), Some([0; 4]));
        assert_eq!(t.pixel(4, 4), Some([9; 4]));
    }

    #[test]
    fn read_is_bottom_up_and_zero_outside() {
        let mut t = Target::new(2, 2);
        t.fill(PixelRect::new(0, 0, 2, 1), [7; 4]);
        let px = t.read(PixelRect::new(0, 0, 3, 2));
        assert_eq!(px.len(), 6);
        assert_eq!(&px[..3], &[[7; 4], [7; 4], [0; 4]]);
        assert_eq!(&px[3..], &[[0; 4]; 3]);
    }
}
