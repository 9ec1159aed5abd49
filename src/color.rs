use std::{fmt, ops::BitOr};

use crate::error::Error;

/// Maximum number of colors a [`Palette`] can label.
pub const MAX_COLORS: usize = 7;

/// Color tags a run of elements. Every color is a single bit, colors
/// are mutually exclusive.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(u8);

impl Color {
    /// Return the color at bit position `index`, which must be less
    /// than [`MAX_COLORS`].
    pub fn from_index(index: usize) -> Option<Color> {
        if index < MAX_COLORS {
            Some(Color(1 << index))
        } else {
            None
        }
    }

    /// Bit position of this color, also its slot in the count array.
    #[inline]
    pub fn index(self) -> usize {
        self.0.trailing_zeros() as usize
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Color({:#04x})", self.0)
    }
}

/// ColorMask selects a subset of colors. Indices and sizes passed to
/// the tree are always relative to a mask: the mask's view of the
/// sequence is the sequence with every element of other colors left
/// out.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ColorMask(u8);

impl ColorMask {
    /// Mask selecting no color.
    pub const EMPTY: ColorMask = ColorMask(0);

    pub fn from_bits(bits: u8) -> ColorMask {
        ColorMask(bits)
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn contains(self, color: Color) -> bool {
        (self.0 & color.0) != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over the bit positions set in this mask, in ascending
    /// order.
    pub fn indices(self) -> impl Iterator<Item = usize> {
        let bits = self.0;
        (0..MAX_COLORS).filter(move |i| (bits & (1 << i)) != 0)
    }
}

impl fmt::Debug for ColorMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ColorMask({:#04x})", self.0)
    }
}

impl From<Color> for ColorMask {
    fn from(color: Color) -> ColorMask {
        ColorMask(color.0)
    }
}

impl BitOr for Color {
    type Output = ColorMask;

    fn bitor(self, rhs: Color) -> ColorMask {
        ColorMask(self.0 | rhs.0)
    }
}

impl BitOr<Color> for ColorMask {
    type Output = ColorMask;

    fn bitor(self, rhs: Color) -> ColorMask {
        ColorMask(self.0 | rhs.0)
    }
}

impl BitOr for ColorMask {
    type Output = ColorMask;

    fn bitor(self, rhs: ColorMask) -> ColorMask {
        ColorMask(self.0 | rhs.0)
    }
}

/// Palette names the colors a tree is built with. The first label
/// gets bit 0, the second bit 1 and so on. Fixed for the lifetime of
/// the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    labels: Vec<String>,
}

impl Palette {
    /// Create a palette from 1 to [`MAX_COLORS`] unique labels.
    pub fn new<I, S>(labels: I) -> Result<Palette, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut palette = Palette { labels: vec![] };
        for label in labels {
            let label = label.as_ref();
            if palette.labels.iter().any(|l| l == label) {
                return Err(Error::DuplicateLabel(label.to_string()));
            }
            palette.labels.push(label.to_string());
        }
        match palette.labels.len() {
            0 => Err(Error::InvalidPalette(0)),
            n if n > MAX_COLORS => Err(Error::InvalidPalette(n)),
            _ => Ok(palette),
        }
    }

    /// Number of colors in this palette.
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Lookup color by label.
    pub fn color(&self, label: &str) -> Option<Color> {
        let index = self.labels.iter().position(|l| l == label)?;
        Color::from_index(index)
    }

    /// Lookup label by color.
    pub fn label(&self, color: Color) -> Option<&str> {
        self.labels.get(color.index()).map(String::as_str)
    }

    /// Iterate over all colors in this palette.
    pub fn colors(&self) -> impl Iterator<Item = Color> {
        (0..self.labels.len()).filter_map(Color::from_index)
    }

    /// Mask selecting every color in this palette.
    pub fn all(&self) -> ColorMask {
        ColorMask(((1_u16 << self.labels.len()) - 1) as u8)
    }

    /// Whether `color` is one of this palette's colors.
    pub fn has(&self, color: Color) -> bool {
        self.all().contains(color)
    }

    /// Whether every bit of `mask` is one of this palette's colors.
    pub fn covers(&self, mask: ColorMask) -> bool {
        (mask.bits() & !self.all().bits()) == 0
    }
}
