//! Pixel codec for the picking pass.
//!
//! Little-endian 16-bit fields: `R = id & 0xff`, `G = id >> 8`,
//! `B = index & 0xff`, `A = index >> 8`. Object id 0 is the background.
//! Values above 65535 wrap.

/// One decoded picking pixel.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct PickSample {
    pub object_id: u16,
    pub index: u16,
}

impl PickSample {
    pub fn is_background(self) -> bool {
        self.object_id == 0
    }
}

#[inline]
pub fn encode_pick(object_id: u32, index: u32) -> [u8; 4] {
    let id = (object_id & 0xffff) as u16;
    let index = (index & 0xffff) as u16;
    let [r, g] = id.to_le_bytes();
    let [b, a] = index.to_le_bytes();
    [r, g, b, a]
}

#[inline]
pub fn decode_pick(pixel: [u8; 4]) -> PickSample {
    let [r, g, b, a] = pixel;
    PickSample {
        object_id: u16::from_le_bytes([r, g]),
        index: u16::from_le_bytes([b, a]),
    }
}
