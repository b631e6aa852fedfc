//! Per-site field records and their wire encoding
//!
//! A site record is one color vector: three complex components. On file the
//! components are always single precision, whatever precision the caller
//! works in, so conversion to the wire is lossy for `f64` fields.

use crate::byte_order::{ByteOrder, WORD_BYTES};

/// Floating-point type used on file
pub type WireReal = f32;

/// Number of complex components in a color vector
pub const COMPONENTS: usize = 3;

/// Number of 32-bit words in one encoded color vector
pub const WORDS_PER_VECTOR: usize = 2 * COMPONENTS;

/// Encoded size of one color vector
pub const SITE_RECORD_BYTES: usize = WORDS_PER_VECTOR * WORD_BYTES;

/// Precision a caller may keep its field in
pub trait WorkingReal: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync {
    /// Convert to wire precision
    fn to_wire(self) -> WireReal;
    /// Convert from wire precision
    fn from_wire(value: WireReal) -> Self;
}

impl WorkingReal for f32 {
    fn to_wire(self) -> WireReal {
        self
    }

    fn from_wire(value: WireReal) -> Self {
        value
    }
}

impl WorkingReal for f64 {
    fn to_wire(self) -> WireReal {
        self as WireReal
    }

    fn from_wire(value: WireReal) -> Self {
        Self::from(value)
    }
}

/// Complex number
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Complex<T> {
    /// Real part
    pub re: T,
    /// Imaginary part
    pub im: T,
}

impl<T> Complex<T> {
    /// Create a complex number
    pub const fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

/// Three-component complex color vector
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColorVector<T> {
    /// Components
    pub c: [Complex<T>; COMPONENTS],
}

impl<T: WorkingReal> ColorVector<T> {
    /// Create a vector from its components
    pub const fn new(c: [Complex<T>; COMPONENTS]) -> Self {
        Self { c }
    }

    /// Convert to wire precision
    pub fn to_wire(&self) -> ColorVector<WireReal> {
        ColorVector {
            c: self.c.map(|z| Complex::new(z.re.to_wire(), z.im.to_wire())),
        }
    }

    /// Convert from wire precision
    pub fn from_wire(wire: &ColorVector<WireReal>) -> Self {
        Self {
            c: wire
                .c
                .map(|z| Complex::new(T::from_wire(z.re), T::from_wire(z.im))),
        }
    }
}

impl ColorVector<WireReal> {
    /// The 32-bit words of the record in on-file order (re, im per component)
    pub fn words(&self) -> [u32; WORDS_PER_VECTOR] {
        let mut words = [0u32; WORDS_PER_VECTOR];
        for (i, z) in self.c.iter().enumerate() {
            words[2 * i] = z.re.to_bits();
            words[2 * i + 1] = z.im.to_bits();
        }
        words
    }

    /// Rebuild a record from its words
    pub fn from_words(words: &[u32; WORDS_PER_VECTOR]) -> Self {
        let mut c = [Complex::default(); COMPONENTS];
        for (i, z) in c.iter_mut().enumerate() {
            z.re = WireReal::from_bits(words[2 * i]);
            z.im = WireReal::from_bits(words[2 * i + 1]);
        }
        Self { c }
    }

    /// Encode into `out` (exactly [`SITE_RECORD_BYTES`] long) in `order`
    pub fn encode(&self, order: ByteOrder, out: &mut [u8]) {
        for (chunk, word) in out.chunks_exact_mut(WORD_BYTES).zip(self.words()) {
            chunk.copy_from_slice(&order.write_u32(word));
        }
    }

    /// Decode from `bytes` (exactly [`SITE_RECORD_BYTES`] long) stored in `order`
    pub fn decode(bytes: &[u8], order: ByteOrder) -> Self {
        let mut words = [0u32; WORDS_PER_VECTOR];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(WORD_BYTES)) {
            let mut raw = [0u8; WORD_BYTES];
            raw.copy_from_slice(chunk);
            *word = order.read_u32(raw);
        }
        Self::from_words(&words)
    }
}
