use crate::error::DecodeError;

/// Length of the encapsulation header preceding every CDR payload.
pub const ENCAPSULATION_LEN: usize = 4;

const CDR_BE: u16 = 0x0000;
const CDR_LE: u16 = 0x0001;

macro_rules! read_primitive {
    ($($fn_name:ident => $ty:ty),+ $(,)?) => {
        $(
            pub fn $fn_name(&mut self) -> Result<$ty, DecodeError> {
                const SIZE: usize = std::mem::size_of::<$ty>();
                self.align(SIZE)?;
                let bytes = self.take(SIZE)?;
                let mut raw = [0u8; SIZE];
                raw.copy_from_slice(bytes);
                Ok(if self.little_endian {
                    <$ty>::from_le_bytes(raw)
                } else {
                    <$ty>::from_be_bytes(raw)
                })
            }
        )+
    };
}

/// Cursor over a plain (XCDR1) CDR buffer.
///
/// Alignment is measured from the end of the encapsulation header, so the
/// first body byte sits at alignment origin zero.
#[derive(Debug)]
pub struct CdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
    little_endian: bool,
}

impl<'a> CdrReader<'a> {
    /// Reads the encapsulation header and positions the cursor on the body.
    pub fn new(buf: &'a [u8]) -> Result<Self, DecodeError> {
        if buf.len() < ENCAPSULATION_LEN {
            return Err(DecodeError::Truncated {
                offset: 0,
                needed: ENCAPSULATION_LEN,
                available: buf.len(),
            });
        }
        let kind = u16::from_be_bytes([buf[0], buf[1]]);
        let little_endian = match kind {
            CDR_LE => true,
            CDR_BE => false,
            other => return Err(DecodeError::UnsupportedEncapsulation(other)),
        };
        Ok(Self {
            buf,
            pos: ENCAPSULATION_LEN,
            little_endian,
        })
    }

    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    /// Absolute offset into the buffer, header included.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn align(&mut self, size: usize) -> Result<(), DecodeError> {
        let origin = self.pos - ENCAPSULATION_LEN;
        let pad = (size - origin % size) % size;
        if pad > 0 {
            self.take(pad)?;
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    read_primitive!(
        read_u8 => u8,
        read_i8 => i8,
        read_u16 => u16,
        read_i16 => i16,
        read_u32 => u32,
        read_i32 => i32,
        read_u64 => u64,
        read_i64 => i64,
        read_f32 => f32,
        read_f64 => f64,
    );

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    /// Element count prefix of a sequence.
    pub fn read_sequence_len(&mut self) -> Result<usize, DecodeError> {
        Ok(self.read_u32()? as usize)
    }

    /// Length-prefixed string. The length counts the trailing NUL, which is
    /// dropped; a zero length is read as an empty string.
    pub fn read_string(&mut self, field: &str) -> Result<String, DecodeError> {
        let len = self.read_sequence_len()?;
        let bytes = self.take(len)?;
        let bytes = match bytes.split_last() {
            Some((&0, body)) => body,
            _ => bytes,
        };
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 {
                field: field.to_string(),
            })
    }
}
