//! Minimal big-endian binary reader for the token wire format.

use crate::CodecError;

pub(crate) struct Reader<'a> {
  buf: &'a [u8],
  pos: usize,
}

impl<'a> Reader<'a> {
  pub(crate) fn new(buf: &'a [u8]) -> Self {
    return Self { buf, pos: 0 };
  }

  fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
    if self.buf.len() - self.pos < n {
      return Err(CodecError::Truncated);
    }
    let slice = &self.buf[self.pos..self.pos + n];
    self.pos += n;
    return Ok(slice);
  }

  pub(crate) fn u8(&mut self) -> Result<u8, CodecError> {
    return Ok(self.take(1)?[0]);
  }

  pub(crate) fn u32(&mut self) -> Result<u32, CodecError> {
    let bytes: [u8; 4] = self.take(4)?.try_into().expect("exactly 4 bytes");
    return Ok(u32::from_be_bytes(bytes));
  }

  pub(crate) fn u64(&mut self) -> Result<u64, CodecError> {
    let bytes: [u8; 8] = self.take(8)?.try_into().expect("exactly 8 bytes");
    return Ok(u64::from_be_bytes(bytes));
  }

  pub(crate) fn i64(&mut self) -> Result<i64, CodecError> {
    return Ok(self.u64()? as i64);
  }

  pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
    return self.take(n);
  }

  /// Reads a length-prefixed byte string: `len:4 | bytes:len`.
  pub(crate) fn len_prefixed(&mut self) -> Result<&'a [u8], CodecError> {
    let len = self.u32()? as usize;
    return self.take(len);
  }

  /// Returns the unconsumed remainder, for primitives that hand off to a
  /// nested encrypted payload.
  pub(crate) fn remainder(&self) -> &'a [u8] {
    return &self.buf[self.pos..];
  }

  /// Errors if any bytes remain unconsumed.
  pub(crate) fn finish(self) -> Result<(), CodecError> {
    let remaining = self.buf.len() - self.pos;
    if remaining != 0 {
      return Err(CodecError::TrailingData(remaining));
    }
    return Ok(());
  }
}
