//! Packed pixel colors.
//!
//! Scene engines hand rows back as `u32` values laid out `0x00RRGGBB`,
//! i.e. the big-endian bytes `[0, r, g, b]`.

/// True-color RGB representation.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rgb {
    /// Red channel (0-255)
    pub r: u8,
    /// Green channel (0-255)
    pub g: u8,
    /// Blue channel (0-255)
    pub b: u8,
}

impl Rgb {
    /// Create a new RGB color.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Black (0, 0, 0)
    pub const BLACK: Self = Self::new(0, 0, 0);
    /// White (255, 255, 255)
    pub const WHITE: Self = Self::new(255, 255, 255);

    /// Unpack a `0x00RRGGBB` pixel. The top byte is ignored.
    #[inline]
    pub const fn from_packed(packed: u32) -> Self {
        let [_, r, g, b] = packed.to_be_bytes();
        Self::new(r, g, b)
    }

    /// Pack into `0x00RRGGBB`.
    #[inline]
    pub const fn pack(self) -> u32 {
        u32::from_be_bytes([0, self.r, self.g, self.b])
    }

    /// Parse `#rrggbb` or `rrggbb`.
    pub fn parse_hex(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#').unwrap_or(text);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(Self::from_packed)
    }

    /// Linear interpolation between two colors, `t` in `[0, 1]`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (f32::from(b) - f32::from(a)).mul_add(t, f32::from(a)).round() as u8;
        Self::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

impl std::fmt::Debug for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<(u8, u8, u8)> for Rgb {
    #[inline]
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

impl From<u32> for Rgb {
    #[inline]
    fn from(packed: u32) -> Self {
        Self::from_packed(packed)
    }
}

impl From<Rgb> for u32 {
    #[inline]
    fn from(rgb: Rgb) -> Self {
        rgb.pack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_from_packed() {
        let rgb: Rgb = 0x00FF_8000.into();
        assert_eq!(rgb.r, 255);
        assert_eq!(rgb.g, 128);
        assert_eq!(rgb.b, 0);
    }

    #[test]
    fn test_rgb_ignores_top_byte() {
        assert_eq!(Rgb::from_packed(0xAB12_3456), Rgb::new(0x12, 0x34, 0x56));
    }

    #[test]
    fn test_rgb_pack() {
        assert_eq!(Rgb::new(1, 2, 3).pack(), 0x0001_0203);
        assert_eq!(u32::from(Rgb::WHITE), 0x00FF_FFFF);
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(Rgb::parse_hex("#ff0080"), Some(Rgb::new(255, 0, 128)));
        assert_eq!(Rgb::parse_hex("00ff00"), Some(Rgb::new(0, 255, 0)));
        assert_eq!(Rgb::parse_hex("#fff"), None);
        assert_eq!(Rgb::parse_hex("#gggggg"), None);
        assert_eq!(Rgb::parse_hex("#+fffff"), None);
        assert_eq!(Rgb::parse_hex("-00000"), None);
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = Rgb::BLACK;
        let b = Rgb::new(200, 100, 50);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), Rgb::new(100, 50, 25));
    }
}
