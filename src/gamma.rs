//! Fixed gamma curve applied to every channel before it is encoded.
//!
//! LED brightness is linear in on-time while perceived brightness is not, so
//! linear 8-bit input is remapped through this table before it is split into
//! bit-planes. The table is monotonically non-decreasing, maps `0 -> 0` and
//! `255 -> 255`, and is never mutated.

use embedded_graphics::pixelcolor::RgbColor;

use crate::Color;

/// Gamma lookup table indexed by linear intensity.
#[rustfmt::skip]
pub static GAMMA: [u8; 256] = [
//    0    1    2    3    4    5    6    7    8    9    A    B    C    D    E    F
      0,   0,   0,   0,   0,   0,   0,   0,   0,   0,   0,   0,   0,   0,   0,   0, // 00
      0,   0,   0,   0,   0,   0,   0,   0,   0,   0,   0,   0,   1,   1,   1,   1, // 10
      1,   1,   1,   1,   1,   2,   2,   2,   2,   2,   2,   2,   3,   3,   3,   3, // 20
      3,   4,   4,   4,   4,   5,   5,   5,   5,   6,   6,   6,   6,   7,   7,   7, // 30
      8,   8,   8,   9,   9,   9,  10,  10,  10,  11,  11,  11,  12,  12,  13,  13, // 40
     14,  14,  14,  15,  15,  16,  16,  17,  17,  18,  18,  19,  19,  20,  21,  21, // 50
     22,  22,  23,  23,  24,  25,  25,  26,  27,  27,  28,  29,  29,  30,  31,  31, // 60
     32,  33,  34,  34,  35,  36,  37,  37,  38,  39,  40,  41,  42,  42,  43,  44, // 70
     45,  46,  47,  48,  49,  50,  51,  52,  52,  53,  54,  55,  56,  57,  59,  60, // 80
     61,  62,  63,  64,  65,  66,  67,  68,  69,  71,  72,  73,  74,  75,  77,  78, // 90
     79,  80,  82,  83,  84,  85,  87,  88,  89,  91,  92,  93,  95,  96,  98,  99, // A0
    100, 102, 103, 105, 106, 108, 109, 111, 112, 114, 115, 117, 119, 120, 122, 123, // B0
    125, 127, 128, 130, 132, 133, 135, 137, 138, 140, 142, 144, 145, 147, 149, 151, // C0
    153, 155, 156, 158, 160, 162, 164, 166, 168, 170, 172, 174, 176, 178, 180, 182, // D0
    184, 186, 188, 190, 192, 194, 197, 199, 201, 203, 205, 207, 210, 212, 214, 216, // E0
    219, 221, 223, 226, 228, 230, 233, 235, 237, 240, 242, 245, 247, 250, 252, 255, // F0
];

/// Gamma-correct a single channel value.
#[inline]
#[must_use]
pub fn correct(value: u8) -> u8 {
    GAMMA[value as usize]
}

/// Gamma-correct all three channels of a color.
#[inline]
#[must_use]
pub fn correct_color(color: Color) -> Color {
    Color::new(correct(color.r()), correct(color.g()), correct(color.b()))
}
